//! Analysis context threaded through one pipeline run.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use swc_ecma_ast::Program;

use crate::logger::Logger;
use crate::transformer::ResolvedTransformer;

/// One detected (and undone) obfuscation technique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Obfuscation {
    /// Pass that reported it
    pub transformer: String,
    /// Short technique name, e.g. `"string-array"`
    pub technique: String,
    /// Number of rewritten sites
    pub occurrences: usize,
}

impl Obfuscation {
    pub fn new(
        transformer: impl Into<String>,
        technique: impl Into<String>,
        occurrences: usize,
    ) -> Self {
        Self {
            transformer: transformer.into(),
            technique: technique.into(),
            occurrences,
        }
    }
}

/// Per-run state: the tree, the resolved pass list and the findings.
///
/// Created once per run and consumed by [`Context::into_parts`]. Passes get
/// `&mut Context` one at a time; none may keep a reference after returning.
pub struct Context {
    /// Program being rewritten
    pub ast: Program,
    /// Whether `ast` was parsed with the module grammar
    pub is_module: bool,
    /// Identity of the source text `ast` was parsed from, if known
    pub hash: Option<u32>,
    transformers: Arc<[ResolvedTransformer]>,
    logger: Arc<dyn Logger>,
    quiet: bool,
    obfuscations: Vec<Obfuscation>,
}

impl Context {
    pub fn new(
        ast: Program,
        transformers: Arc<[ResolvedTransformer]>,
        logger: Arc<dyn Logger>,
        quiet: bool,
    ) -> Self {
        let is_module = matches!(ast, Program::Module(_));
        Self {
            ast,
            is_module,
            hash: None,
            transformers,
            logger,
            quiet,
            obfuscations: Vec::new(),
        }
    }

    /// Stamp the source-identity hash
    pub fn with_hash(mut self, hash: u32) -> Self {
        self.hash = Some(hash);
        self
    }

    /// Passes in run order
    pub fn transformers(&self) -> &[ResolvedTransformer] {
        &self.transformers
    }

    pub(crate) fn transformer_list(&self) -> Arc<[ResolvedTransformer]> {
        Arc::clone(&self.transformers)
    }

    pub fn log(&self, message: &str) {
        if !self.quiet {
            self.logger.log(message);
        }
    }

    pub fn info(&self, message: &str) {
        if !self.quiet {
            self.logger.info(message);
        }
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Record a finding. Zero-occurrence findings are dropped.
    pub fn report(&mut self, obfuscation: Obfuscation) {
        if obfuscation.occurrences > 0 {
            self.obfuscations.push(obfuscation);
        }
    }

    /// Findings in the order they were reported
    pub fn obfuscations(&self) -> &[Obfuscation] {
        &self.obfuscations
    }

    pub fn into_ast(self) -> Program {
        self.ast
    }

    pub fn into_parts(self) -> (Program, Vec<Obfuscation>) {
        (self.ast, self.obfuscations)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("is_module", &self.is_module)
            .field("hash", &self.hash)
            .field(
                "transformers",
                &self.transformers.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .field("obfuscations", &self.obfuscations)
            .finish_non_exhaustive()
    }
}
