//! unshroud - JavaScript deobfuscation pipeline.
//!
//! Obfuscated source is parsed with SWC and pushed through an ordered list of
//! AST passes, each undoing one technique: string-array indirection,
//! control-flow flattening, proxy functions, dead branches, sequence
//! expressions, computed member access. Identifiers can optionally be
//! renamed to readable names afterwards.
//!
//! # Example
//!
//! ```no_run
//! use unshroud::{Config, deobfuscate_source};
//!
//! let config = Config::default().rename(true);
//! let code = deobfuscate_source("var _0x1 = 'a' + 'b'; console['log'](_0x1);", &config)?;
//! assert!(code.contains("console.log"));
//! # Ok::<(), unshroud::DeobfuscateError>(())
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────────────────────┐   ┌──────────────┐
//! │ parser       │ → │ pipeline (main stage)         │ → │ codegen      │
//! │ module/script│   │ Context + 16 passes           │   │ + formatter  │
//! │ strict/loose │   └───────────────┬───────────────┘   └──────────────┘
//! └──────────────┘                   ↓ rename: true
//!                    ┌───────────────────────────────┐
//!                    │ codegen → re-parse → Context  │
//!                    │ hash stamp → Rename           │
//!                    └───────────────────────────────┘
//! ```

pub mod codegen;
pub mod config;
pub mod context;
pub mod error;
pub mod format;
pub mod hash;
pub mod logger;
pub mod parser;
pub mod pipeline;
pub mod transformer;
pub mod transformers;

use swc_ecma_ast::Program;

pub use codegen::generate;
pub use config::{Config, EcmaVersion, SourceType, TransformerSpec};
pub use context::{Context, Obfuscation};
pub use error::{
    CodegenError, ConfigError, DeobfuscateError, DeobfuscateResult, FormatError, ParseError,
    TransformError, TransformResult,
};
pub use format::{CodegenFormatter, FormatOptions, Formatter};
pub use hash::source_hash;
pub use logger::{Logger, NoopLogger, StderrLogger, TracingLogger};
pub use parser::{ParseOptions, Parsed, parse};
pub use pipeline::{DEFAULT_TRANSFORMERS, Deobfuscated, Deobfuscator};
pub use transformer::{ResolvedTransformer, Transformer, TransformerKind};

/// Deobfuscate an already-parsed program.
pub fn deobfuscate_node(program: Program, config: &Config) -> DeobfuscateResult<Program> {
    Deobfuscator::new(config.clone())?.deobfuscate_node(program)
}

/// Deobfuscate an already-parsed program and return the findings.
pub fn deobfuscate_node_with_details(
    program: Program,
    config: &Config,
) -> DeobfuscateResult<Deobfuscated<Program>> {
    Deobfuscator::new(config.clone())?.deobfuscate_node_with_details(program)
}

/// Deobfuscate source text.
pub fn deobfuscate_source(source: &str, config: &Config) -> DeobfuscateResult<String> {
    Deobfuscator::new(config.clone())?.deobfuscate_source(source)
}

/// Deobfuscate source text and return the findings.
pub fn deobfuscate_source_with_details(
    source: &str,
    config: &Config,
) -> DeobfuscateResult<Deobfuscated<String>> {
    Deobfuscator::new(config.clone())?.deobfuscate_source_with_details(source)
}
