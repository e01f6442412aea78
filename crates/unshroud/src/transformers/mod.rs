//! Built-in passes.
//!
//! Each pass lives in its own module with an options struct (merged over
//! its defaults by [`TransformerKind::build`](crate::TransformerKind::build))
//! and a [`Transformer`](crate::Transformer) implementation.

pub mod control_flow;
pub mod dead_code;
pub mod demangle;
pub mod desequence;
pub mod literal_map;
pub mod member_expression_cleaner;
pub mod rename;
pub mod scope;
pub mod simplify;
pub mod string_decoder;
pub mod utils;
pub mod value;

#[cfg(test)]
pub(crate) mod test_utils {
    use std::sync::Arc;

    use serde_json::Value;
    use swc_ecma_ast::EsVersion;

    use crate::codegen::generate;
    use crate::config::SourceType;
    use crate::context::{Context, Obfuscation};
    use crate::logger::NoopLogger;
    use crate::parser::{ParseOptions, parse};
    use crate::transformer::TransformerKind;

    /// Parse as a script and print back, so expectations share the
    /// generator's layout
    pub fn js(source: &str) -> String {
        let options = ParseOptions::default().with_source_type(SourceType::Script);
        let program = parse(source, &options).expect("expected code must parse").program;
        generate(&program, EsVersion::EsNext).expect("codegen failed")
    }

    /// Run one pass with its default options over a script
    pub fn run_pass(kind: TransformerKind, source: &str) -> String {
        run_pass_with(kind, Value::Null, source)
    }

    pub fn run_pass_with(kind: TransformerKind, options: Value, source: &str) -> String {
        run_pass_detailed(kind, options, source).0
    }

    /// Run one pass and also return its findings
    pub fn run_pass_detailed(
        kind: TransformerKind,
        options: Value,
        source: &str,
    ) -> (String, Vec<Obfuscation>) {
        let parse_options = ParseOptions::default().with_source_type(SourceType::Script);
        let program = parse(source, &parse_options).expect("input must parse").program;
        let resolved = kind.build(&options).expect("options must be valid");
        let mut context = Context::new(
            program,
            Arc::from(vec![resolved]),
            Arc::new(NoopLogger),
            true,
        );
        crate::pipeline::run(&mut context).expect("pass failed");
        let (program, findings) = context.into_parts();
        let code = generate(&program, EsVersion::EsNext).expect("codegen failed");
        (code, findings)
    }
}
