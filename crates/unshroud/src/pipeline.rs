//! Pipeline orchestration.
//!
//! The main stage runs the pass list over one [`Context`]. When renaming is
//! requested a second stage follows: the rewritten tree is serialized,
//! re-parsed with the grammar resolved for the input, and handed to a fresh
//! context that only runs [`Rename`](crate::transformers::rename::Rename).
//! The round trip gives the rename pass spans that match the text it works
//! on; spans in the first-stage tree are stale after rewriting.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use swc_ecma_ast::Program;
use tracing::{debug, warn};

use crate::codegen::generate;
use crate::config::{Config, SourceType};
use crate::context::{Context, Obfuscation};
use crate::error::{DeobfuscateError, DeobfuscateResult};
use crate::format::FormatOptions;
use crate::hash::source_hash;
use crate::parser::{ParseOptions, parse};
use crate::transformer::{ResolvedTransformer, TransformerKind};

/// Default pass order. Normalizing passes are interleaved after each
/// specialized pass; the list is run once, not iterated to a fixed point.
pub const DEFAULT_TRANSFORMERS: [TransformerKind; 16] = [
    TransformerKind::Simplify,
    TransformerKind::MemberExpressionCleaner,
    TransformerKind::LiteralMap,
    TransformerKind::DeadCode,
    TransformerKind::Demangle,
    TransformerKind::StringDecoder,
    TransformerKind::Simplify,
    TransformerKind::MemberExpressionCleaner,
    TransformerKind::Desequence,
    TransformerKind::ControlFlow,
    TransformerKind::Desequence,
    TransformerKind::MemberExpressionCleaner,
    TransformerKind::Simplify,
    TransformerKind::DeadCode,
    TransformerKind::Simplify,
    TransformerKind::DeadCode,
];

/// Output of a run together with the findings of every pass
#[derive(Debug, Clone)]
pub struct Deobfuscated<T> {
    pub output: T,
    pub obfuscations: Vec<Obfuscation>,
}

/// Resolve the main pass list: the custom list if non-empty, else the default.
pub fn build_transformers(config: &Config) -> DeobfuscateResult<Arc<[ResolvedTransformer]>> {
    let resolved = if config.custom_transformers.is_empty() {
        DEFAULT_TRANSFORMERS
            .iter()
            .map(|kind| kind.build(&Value::Null))
            .collect::<Result<Vec<_>, _>>()?
    } else {
        config
            .custom_transformers
            .iter()
            .map(ResolvedTransformer::resolve)
            .collect::<Result<Vec<_>, _>>()?
    };
    Ok(resolved.into())
}

/// Run every pass of the context in order. The first failure aborts the run.
pub fn run(context: &mut Context) -> DeobfuscateResult<()> {
    let transformers = context.transformer_list();
    for transformer in transformers.iter() {
        let start = Instant::now();
        let before = context.obfuscations().len();

        transformer.instance().transform(context)?;

        let elapsed = start.elapsed();
        let found = context.obfuscations().len() - before;
        debug!(
            transformer = transformer.name(),
            elapsed_us = elapsed.as_micros() as u64,
            findings = found,
            "pass finished"
        );
        context.info(&format!(
            "{}: {} finding(s) in {:.2?}",
            transformer.name(),
            found,
            elapsed
        ));
    }
    Ok(())
}

/// Runs the pipeline with one configuration.
///
/// Holds the resolved pass list, so a `Deobfuscator` can be reused across
/// inputs without re-validating the configuration.
#[derive(Debug, Clone)]
pub struct Deobfuscator {
    config: Config,
    transformers: Arc<[ResolvedTransformer]>,
    rename: Arc<[ResolvedTransformer]>,
}

impl Deobfuscator {
    /// Validate `config` and resolve its pass lists.
    pub fn new(config: Config) -> DeobfuscateResult<Self> {
        let transformers = build_transformers(&config)?;
        let rename = vec![TransformerKind::Rename.build(&Value::Null)?].into();
        Ok(Self {
            config,
            transformers,
            rename,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Deobfuscate a tree. Never parses the input.
    pub fn deobfuscate_node(&self, program: Program) -> DeobfuscateResult<Program> {
        Ok(self.deobfuscate_node_with_details(program)?.output)
    }

    pub fn deobfuscate_node_with_details(
        &self,
        program: Program,
    ) -> DeobfuscateResult<Deobfuscated<Program>> {
        let source_type = match program {
            Program::Module(_) => SourceType::Module,
            Program::Script(_) => SourceType::Script,
        };
        let (output, obfuscations) = self.process(program, source_type)?;
        Ok(Deobfuscated {
            output,
            obfuscations,
        })
    }

    /// Parse, deobfuscate and print `source`.
    pub fn deobfuscate_source(&self, source: &str) -> DeobfuscateResult<String> {
        Ok(self.deobfuscate_source_with_details(source)?.output)
    }

    pub fn deobfuscate_source_with_details(
        &self,
        source: &str,
    ) -> DeobfuscateResult<Deobfuscated<String>> {
        let parsed = parse(source, &ParseOptions::from_config(&self.config))?;
        debug!(source_type = %parsed.source_type, "input parsed");

        let (program, obfuscations) = self.process(parsed.program, parsed.source_type)?;
        let code = generate(&program, self.config.ecma_version.es_version())?;
        let output = self.format(code, parsed.source_type);

        Ok(Deobfuscated {
            output,
            obfuscations,
        })
    }

    /// Main stage, then the rename stage if enabled
    fn process(
        &self,
        program: Program,
        source_type: SourceType,
    ) -> DeobfuscateResult<(Program, Vec<Obfuscation>)> {
        let mut context = Context::new(
            program,
            Arc::clone(&self.transformers),
            Arc::clone(&self.config.logger),
            self.config.quiet,
        );
        run(&mut context)?;
        let (program, mut obfuscations) = context.into_parts();

        if !self.config.rename {
            return Ok((program, obfuscations));
        }

        let code = generate(&program, self.config.ecma_version.es_version())?;
        drop(program);
        let options = ParseOptions::from_config(&self.config).with_source_type(source_type);
        let reparsed = parse(&code, &options).map_err(DeobfuscateError::Regenerate)?;

        let mut context = Context::new(
            reparsed.program,
            Arc::clone(&self.rename),
            Arc::clone(&self.config.logger),
            self.config.quiet,
        )
        .with_hash(source_hash(&code));
        run(&mut context)?;

        let (program, renamed) = context.into_parts();
        obfuscations.extend(renamed);
        Ok((program, obfuscations))
    }

    /// Best-effort cosmetic pass; failures keep the unformatted text
    fn format(&self, code: String, source_type: SourceType) -> String {
        if !self.config.format {
            return code;
        }
        let options = FormatOptions {
            parse: ParseOptions::from_config(&self.config).with_source_type(source_type),
            transform_chain_expressions: self.config.transform_chain_expressions,
        };
        match self.config.formatter.format(&code, &options) {
            Ok(formatted) => formatted,
            Err(err) => {
                warn!(error = %err, "formatting failed, returning unformatted output");
                if !self.config.quiet {
                    self.config
                        .logger
                        .log(&format!("Formatting failed, output left unformatted: {err}"));
                }
                code
            }
        }
    }
}
