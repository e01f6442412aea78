//! Deobfuscate command - run the pipeline over a file.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use unshroud::{EcmaVersion, SourceType, StderrLogger, TransformerSpec};

use super::read_input;
use crate::config::Config;

#[derive(Args)]
pub struct DeobfuscateCommand {
    /// File to deobfuscate (`-` for stdin)
    #[arg(default_value = "-")]
    pub input: PathBuf,

    /// Write the result here instead of stdout
    #[arg(long, short = 'o', value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Rename bindings to readable names
    #[arg(long)]
    pub rename: bool,

    /// Recover from syntax errors instead of failing
    #[arg(long)]
    pub loose: bool,

    /// Grammar: module, script or both
    #[arg(long = "source-type", value_name = "TYPE")]
    pub source_type: Option<SourceType>,

    /// ECMAScript version (latest, 5, 2015, es2020, ...)
    #[arg(long = "ecma-version", value_name = "VERSION")]
    pub ecma_version: Option<EcmaVersion>,

    /// Parse with the TypeScript grammar
    #[arg(long)]
    pub typescript: bool,

    /// Run only these passes, in order (repeatable)
    #[arg(long = "transformer", short = 't', value_name = "NAME")]
    pub transformers: Vec<String>,

    /// Skip the cosmetic formatter
    #[arg(long = "no-format")]
    pub no_format: bool,

    /// Print findings as JSON to stderr
    #[arg(long)]
    pub details: bool,

    /// Print per-pass progress
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Suppress progress output
    #[arg(long, short = 'q')]
    pub quiet: bool,
}

impl DeobfuscateCommand {
    pub fn run(&self, config: Config) -> Result<()> {
        let details = self.details || config.output.details;
        let config = self.apply(config.deobfuscate);

        let source = read_input(&self.input)?;
        let start = Instant::now();
        let result = unshroud::deobfuscate_source_with_details(&source, &config)
            .with_context(|| format!("Failed to deobfuscate {}", self.input.display()))?;
        tracing::info!(
            input = %self.input.display(),
            findings = result.obfuscations.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "deobfuscated"
        );

        match &self.output {
            Some(path) => std::fs::write(path, &result.output)
                .with_context(|| format!("Failed to write {}", path.display()))?,
            None => print!("{}", result.output),
        }

        if details {
            eprintln!("{}", serde_json::to_string_pretty(&result.obfuscations)?);
        }
        Ok(())
    }

    /// Lay the command-line flags over the file configuration
    fn apply(&self, mut config: unshroud::Config) -> unshroud::Config {
        if self.rename {
            config.rename = true;
        }
        if self.loose {
            config.loose = true;
        }
        if self.typescript {
            config.typescript = true;
        }
        if let Some(source_type) = self.source_type {
            config.source_type = source_type;
        }
        if let Some(ecma_version) = self.ecma_version {
            config.ecma_version = ecma_version;
        }
        if !self.transformers.is_empty() {
            config.custom_transformers = self
                .transformers
                .iter()
                .map(TransformerSpec::named)
                .collect();
        }
        if self.no_format {
            config.format = false;
        }
        if self.quiet {
            config.quiet = true;
        }
        if self.verbose {
            config.logger = Arc::new(StderrLogger { verbose: true });
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        command: DeobfuscateCommand,
    }

    fn parse_args(args: &[&str]) -> DeobfuscateCommand {
        Cli::parse_from(std::iter::once("unshroud").chain(args.iter().copied())).command
    }

    #[test]
    fn test_flags_override_file() {
        let file: Config = toml::from_str(
            "[deobfuscate]\nsource_type = \"module\"\nformat = true\n\n[[deobfuscate.custom_transformers]]\nname = \"Simplify\"\n",
        )
        .unwrap();
        let command = parse_args(&[
            "in.js",
            "--rename",
            "--source-type",
            "script",
            "-t",
            "DeadCode",
            "--no-format",
        ]);
        let config = command.apply(file.deobfuscate);

        assert!(config.rename);
        assert_eq!(config.source_type, SourceType::Script);
        assert!(!config.format);
        assert_eq!(config.custom_transformers.len(), 1);
        assert!(matches!(
            &config.custom_transformers[0],
            TransformerSpec::Named { name, .. } if name == "DeadCode"
        ));
    }

    #[test]
    fn test_file_values_survive_without_flags() {
        let file: Config = toml::from_str("[deobfuscate]\nloose = true\nrename = true\n").unwrap();
        let config = parse_args(&["in.js"]).apply(file.deobfuscate);
        assert!(config.loose);
        assert!(config.rename);
        assert_eq!(config.source_type, SourceType::Both);
    }

    #[test]
    fn test_deobfuscate_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.js");
        let output = dir.path().join("out.js");
        std::fs::write(&input, "console['log']('a' + 'b');").unwrap();

        let command = parse_args(&[
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "--quiet",
        ]);
        command.run(Config::default()).unwrap();

        let code = std::fs::read_to_string(&output).unwrap();
        assert!(code.contains("console.log(\"ab\")"), "{code}");
    }

    #[test]
    fn test_unknown_transformer_fails() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.js");
        std::fs::write(&input, "a();").unwrap();

        let command = parse_args(&[input.to_str().unwrap(), "-t", "Uglify", "--quiet"]);
        assert!(command.run(Config::default()).is_err());
    }
}
