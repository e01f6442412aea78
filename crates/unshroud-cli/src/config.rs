//! Configuration file parsing for unshroud.toml.
//!
//! ```toml
//! [deobfuscate]
//! rename = true
//! source_type = "script"
//!
//! [[deobfuscate.custom_transformers]]
//! name = "StringDecoder"
//! options = { remove_decoders = false }
//! ```
//!
//! Command-line flags are applied on top of the file.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file names searched for, in order
const CONFIG_NAMES: &[&str] = &["unshroud.toml", ".unshroud.toml"];

/// Main configuration structure.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Pipeline settings, same keys as the library configuration
    #[serde(default)]
    pub deobfuscate: unshroud::Config,

    /// Output settings
    #[serde(default)]
    pub output: OutputConfig,
}

/// Output configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Print the findings after deobfuscating
    #[serde(default)]
    pub details: bool,
}

/// Load configuration from a file or search for a default config file
/// starting at `start`.
pub fn load_config(path: Option<&Path>, start: &Path) -> anyhow::Result<Config> {
    let config_path = match path {
        Some(path) => Some(path.to_path_buf()),
        None => find_config_file(start),
    };

    match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
            let config: Config = toml::from_str(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
            tracing::debug!(path = %path.display(), "loaded config");
            Ok(config)
        }
        None => Ok(Config::default()),
    }
}

/// Search for a configuration file in `start` and its parent directories.
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(current) = dir {
        for name in CONFIG_NAMES {
            let path = current.join(name);
            if path.is_file() {
                return Some(path);
            }
        }
        dir = current.parent();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use unshroud::{SourceType, TransformerSpec};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.deobfuscate.rename);
        assert!(config.deobfuscate.format);
        assert!(!config.output.details);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[deobfuscate]
rename = true
loose = true
source_type = "script"
ecma_version = 2020

[[deobfuscate.custom_transformers]]
name = "Simplify"

[[deobfuscate.custom_transformers]]
name = "StringDecoder"
options = { remove_decoders = false }

[output]
details = true
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.deobfuscate.rename);
        assert!(config.deobfuscate.loose);
        assert_eq!(config.deobfuscate.source_type, SourceType::Script);
        assert!(config.output.details);

        let transformers = &config.deobfuscate.custom_transformers;
        assert_eq!(transformers.len(), 2);
        match &transformers[1] {
            TransformerSpec::Named { name, options } => {
                assert_eq!(name, "StringDecoder");
                assert_eq!(options["remove_decoders"], serde_json::json!(false));
            }
            other => panic!("unexpected spec {other:?}"),
        }
    }

    #[test]
    fn test_unknown_section_is_an_error() {
        assert!(toml::from_str::<Config>("[permissions]\nallow_read = []\n").is_err());
    }

    #[test]
    fn test_find_config_in_ancestors() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(root.path().join("unshroud.toml"), "[deobfuscate]\nrename = true\n").unwrap();

        let found = find_config_file(&nested).unwrap();
        assert_eq!(found, root.path().join("unshroud.toml"));

        let config = load_config(None, &nested).unwrap();
        assert!(config.deobfuscate.rename);
    }

    #[test]
    fn test_nearest_config_wins() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("project");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(root.path().join("unshroud.toml"), "[deobfuscate]\nrename = true\n").unwrap();
        std::fs::write(nested.join(".unshroud.toml"), "[deobfuscate]\nloose = true\n").unwrap();

        let config = load_config(None, &nested).unwrap();
        assert!(config.deobfuscate.loose);
        assert!(!config.deobfuscate.rename);
    }

    #[test]
    fn test_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[output]\ndetails = true\n").unwrap();

        let config = load_config(Some(&path), dir.path()).unwrap();
        assert!(config.output.details);

        let missing = dir.path().join("missing.toml");
        assert!(load_config(Some(&missing), dir.path()).is_err());
    }
}
