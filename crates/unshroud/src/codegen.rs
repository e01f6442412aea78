//! AST to text.

use swc_common::{GLOBALS, Globals, SourceMap, sync::Lrc};
use swc_ecma_ast::{EsVersion, Program};
use swc_ecma_codegen::{Config as CodegenConfig, Emitter, text_writer::JsWriter};
use swc_ecma_transforms_base::fixer::fixer;
use swc_ecma_visit::VisitMutWith;

use crate::error::CodegenError;

/// Serialize `program` as JavaScript (or TypeScript, if it contains type
/// syntax).
///
/// Passes may leave precedence-breaking nesting behind (a sequence inlined
/// into a call argument, a conditional into a binary operand). The fixer
/// runs on a copy so the caller's tree is left as is.
pub fn generate(program: &Program, target: EsVersion) -> Result<String, CodegenError> {
    let mut program = program.clone();
    GLOBALS.set(&Globals::default(), || {
        program.visit_mut_with(&mut fixer(None));
    });
    emit(&program, target)
}

/// Serialize without running the fixer first.
pub(crate) fn emit(program: &Program, target: EsVersion) -> Result<String, CodegenError> {
    let cm: Lrc<SourceMap> = Default::default();
    let mut buf = vec![];

    {
        let writer = JsWriter::new(cm.clone(), "\n", &mut buf, None);

        let codegen_config = CodegenConfig::default()
            .with_target(target)
            .with_ascii_only(false)
            .with_minify(false)
            .with_omit_last_semi(false);

        let mut emitter = Emitter {
            cfg: codegen_config,
            cm: cm.clone(),
            comments: None,
            wr: writer,
        };

        match program {
            Program::Module(module) => emitter.emit_module(module),
            Program::Script(script) => emitter.emit_script(script),
        }
        .map_err(|e| CodegenError(format!("Failed to emit code: {e}")))?;
    }

    String::from_utf8(buf).map_err(|e| CodegenError(format!("Invalid UTF-8 output: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceType;
    use crate::parser::{ParseOptions, parse};

    fn roundtrip(source: &str, source_type: SourceType) -> String {
        let options = ParseOptions::default().with_source_type(source_type);
        let parsed = parse(source, &options).expect("parse failed");
        generate(&parsed.program, EsVersion::EsNext).expect("codegen failed")
    }

    #[test]
    fn test_generate_module() {
        let code = roundtrip("import a from 'a';\nexport const b = a + 1;", SourceType::Module);
        assert!(code.contains("import a from"));
        assert!(code.contains("export const b = a + 1;"));
    }

    #[test]
    fn test_generate_script() {
        let code = roundtrip("var x = 1;\nreturn x;", SourceType::Script);
        assert!(code.contains("var x = 1;"));
        assert!(code.contains("return x;"));
    }

    #[test]
    fn test_generate_typescript_syntax() {
        let options = ParseOptions {
            typescript: true,
            ..ParseOptions::default()
        };
        let parsed = parse("let a: number = 1;", &options).unwrap();
        let code = generate(&parsed.program, EsVersion::EsNext).unwrap();
        assert!(code.contains("let a: number = 1;"));
    }
}
