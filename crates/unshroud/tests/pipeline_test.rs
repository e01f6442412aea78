//! Integration tests for the pipeline API

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use swc_ecma_ast::{EsVersion, Program};
use unshroud::{
    CodegenError, Config, Context, DeobfuscateError, Deobfuscator, FormatError, FormatOptions,
    Formatter, Logger, Obfuscation, ParseOptions, SourceType, TransformError, TransformResult,
    Transformer, TransformerSpec, deobfuscate_node_with_details, deobfuscate_source,
    deobfuscate_source_with_details, generate, parse, source_hash,
};

fn quiet() -> Config {
    Config::default().quiet(true)
}

/// Print `source` the way the pipeline prints an untouched tree
fn normalized(source: &str) -> String {
    let parsed = parse(source, &ParseOptions::default()).unwrap();
    generate(&parsed.program, EsVersion::EsNext).unwrap()
}

struct Noop;

impl Transformer for Noop {
    fn name(&self) -> &str {
        "Noop"
    }

    fn transform(&self, _context: &mut Context) -> TransformResult<()> {
        Ok(())
    }
}

struct Failing;

impl Transformer for Failing {
    fn name(&self) -> &str {
        "Failing"
    }

    fn transform(&self, _context: &mut Context) -> TransformResult<()> {
        Err(TransformError::new("Failing", "unsupported tree"))
    }
}

/// Records whether it ran and reports one finding
struct Tracker(Arc<AtomicBool>);

impl Transformer for Tracker {
    fn name(&self) -> &str {
        "Tracker"
    }

    fn transform(&self, context: &mut Context) -> TransformResult<()> {
        self.0.store(true, Ordering::SeqCst);
        context.report(Obfuscation::new("Tracker", "tracked", 1));
        Ok(())
    }
}

struct BrokenFormatter;

impl Formatter for BrokenFormatter {
    fn format(&self, _code: &str, _options: &FormatOptions) -> Result<String, FormatError> {
        Err(FormatError::Codegen(CodegenError("formatter crashed".into())))
    }
}

#[derive(Default)]
struct RecordingLogger(Mutex<Vec<String>>);

impl Logger for RecordingLogger {
    fn log(&self, message: &str) {
        self.0.lock().unwrap().push(message.to_string());
    }

    fn info(&self, message: &str) {
        self.0.lock().unwrap().push(message.to_string());
    }
}

/// Keeps `log` and `info` messages apart
#[derive(Default)]
struct LevelLogger {
    log: Mutex<Vec<String>>,
    info: Mutex<Vec<String>>,
}

impl Logger for LevelLogger {
    fn log(&self, message: &str) {
        self.log.lock().unwrap().push(message.to_string());
    }

    fn info(&self, message: &str) {
        self.info.lock().unwrap().push(message.to_string());
    }
}

#[test]
fn test_default_pipeline_cleans_up() {
    let code = deobfuscate_source(
        "var a = 'he' + 'llo'; if (!![]) { console['log'](a); } else { never(); }",
        &quiet().format(false),
    )
    .unwrap();
    assert!(code.contains("console.log(a)"), "{code}");
    assert!(code.contains("\"hello\""), "{code}");
    assert!(!code.contains("never"), "{code}");
}

#[test]
fn test_script_only_input_resolves_to_script() {
    let code = deobfuscate_source("return 1 + 1;", &quiet().format(false)).unwrap();
    assert!(code.contains("return 2"), "{code}");

    // The rename stage re-parses with the resolved grammar
    let code = deobfuscate_source("return 1 + 1;", &quiet().rename(true)).unwrap();
    assert!(code.contains("return 2"), "{code}");
}

#[test]
fn test_fixed_module_grammar_fails() {
    let err = deobfuscate_source("return 1;", &quiet().source_type(SourceType::Module)).unwrap_err();
    let DeobfuscateError::Parse(err) = err else {
        panic!("expected a parse error, got {err:?}");
    };
    assert_eq!(err.source_type, SourceType::Module);
}

#[test]
fn test_loose_parsing_recovers() {
    let config = quiet().loose(true).format(false);
    let code = deobfuscate_source("a();\nvar = ;\nb(1 + 2);\n", &config).unwrap();
    assert!(code.contains("a()"), "{code}");
    assert!(code.contains("b(3)"), "{code}");
    assert!(deobfuscate_source("a();\nvar = ;\n", &quiet()).is_err());
}

#[test]
fn test_custom_noop_instance() {
    let source = "var a = 1 + 2; console['log'](a);";
    let config = quiet()
        .format(false)
        .custom_transformers(vec![TransformerSpec::instance(Noop)]);
    let result = deobfuscate_source_with_details(source, &config).unwrap();
    assert_eq!(result.output, normalized(source));
    assert!(result.obfuscations.is_empty());
}

#[test]
fn test_custom_list_mixes_builtins_and_instances() {
    let ran = Arc::new(AtomicBool::new(false));
    let config = quiet().format(false).custom_transformers(vec![
        TransformerSpec::named("Simplify"),
        TransformerSpec::instance(Tracker(Arc::clone(&ran))),
    ]);
    let result = deobfuscate_source_with_details("f(1 + 2);", &config).unwrap();
    assert!(ran.load(Ordering::SeqCst));
    assert_eq!(result.output, normalized("f(3);"));

    let techniques: Vec<_> = result
        .obfuscations
        .iter()
        .map(|finding| finding.transformer.as_str())
        .collect();
    assert_eq!(techniques.last(), Some(&"Tracker"));
}

#[test]
fn test_failing_pass_aborts_run() {
    let ran = Arc::new(AtomicBool::new(false));
    let config = quiet().custom_transformers(vec![
        TransformerSpec::instance(Failing),
        TransformerSpec::instance(Tracker(Arc::clone(&ran))),
    ]);
    let err = deobfuscate_source("a();", &config).unwrap_err();
    assert!(matches!(err, DeobfuscateError::Transform(_)), "{err:?}");
    assert!(!ran.load(Ordering::SeqCst), "later passes must not run");
}

#[test]
fn test_failure_after_rewriting_passes_aborts_run() {
    let ran = Arc::new(AtomicBool::new(false));
    let config = quiet().custom_transformers(vec![
        TransformerSpec::named("Simplify"),
        TransformerSpec::named("MemberExpressionCleaner"),
        TransformerSpec::named("LiteralMap"),
        TransformerSpec::named("DeadCode"),
        TransformerSpec::named("Demangle"),
        TransformerSpec::instance(Failing),
        TransformerSpec::instance(Tracker(Arc::clone(&ran))),
    ]);
    let source = "if (!![]) { console['log']('a' + 'b'); }";

    let err = deobfuscate_source_with_details(source, &config).unwrap_err();
    assert!(matches!(err, DeobfuscateError::Transform(_)), "{err:?}");
    assert!(!ran.load(Ordering::SeqCst), "later passes must not run");

    let program = parse(source, &ParseOptions::default()).unwrap().program;
    let err = deobfuscate_node_with_details(program, &config).unwrap_err();
    assert!(matches!(err, DeobfuscateError::Transform(_)), "{err:?}");
}

#[test]
fn test_pass_summaries_go_to_info() {
    let logger = Arc::new(LevelLogger::default());
    let config = Config::default()
        .format(false)
        .logger(logger.clone())
        .custom_transformers(vec![
            TransformerSpec::named("Simplify"),
            TransformerSpec::named("DeadCode"),
        ]);
    deobfuscate_source("f(1 + 2);", &config).unwrap();

    let info = logger.info.lock().unwrap();
    assert_eq!(info.len(), 2, "{info:?}");
    assert!(info[0].starts_with("Simplify:"), "{info:?}");
    assert!(info[1].starts_with("DeadCode:"), "{info:?}");

    let quiet_logger = Arc::new(LevelLogger::default());
    let config = quiet().format(false).logger(quiet_logger.clone());
    deobfuscate_source("f(1 + 2);", &config).unwrap();
    assert!(quiet_logger.info.lock().unwrap().is_empty());
}

#[test]
fn test_invalid_options_fail_before_running() {
    let config = quiet().custom_transformers(vec![TransformerSpec::with_options(
        "Rename",
        serde_json::json!({ "unknown": true }),
    )]);
    assert!(matches!(
        Deobfuscator::new(config).unwrap_err(),
        DeobfuscateError::Config(_)
    ));
}

#[test]
fn test_formatter_failure_is_not_fatal() {
    let source = "console['log'](1 + 1); if ('a' === 'b') { x(); }";
    let unformatted = deobfuscate_source_with_details(source, &quiet().format(false)).unwrap();
    let config = quiet().formatter(Arc::new(BrokenFormatter));
    let result = deobfuscate_source_with_details(source, &config).unwrap();

    assert_eq!(result.output, unformatted.output);
    assert!(!result.obfuscations.is_empty());
    assert_eq!(result.obfuscations, unformatted.obfuscations);
}

#[test]
fn test_formatter_failure_is_logged() {
    let logger = Arc::new(RecordingLogger::default());
    let config = Config::default()
        .logger(logger.clone())
        .formatter(Arc::new(BrokenFormatter));
    deobfuscate_source("a();", &config).unwrap();
    let messages = logger.0.lock().unwrap();
    assert!(messages.iter().any(|m| m.contains("Formatting failed")));
}

#[test]
fn test_rename_is_consistent() {
    let source = "(function () { var _0x1a = 'a' + 'b'; console.log(_0x1a, _0x1a); })();";
    let result = deobfuscate_source_with_details(source, &quiet().rename(true)).unwrap();
    assert!(result.output.contains("console.log(str, str)"), "{}", result.output);
    assert!(!result.output.contains("_0x1a"), "{}", result.output);
    assert!(
        result
            .obfuscations
            .iter()
            .any(|finding| finding.transformer == "Rename")
    );
}

#[test]
fn test_rename_stage_is_stamped() {
    let logger = Arc::new(RecordingLogger::default());
    let config = Config::default().rename(true).logger(logger.clone());
    deobfuscate_source("(function (a) { return a; })(1);", &config).unwrap();
    let messages = logger.0.lock().unwrap();
    assert!(!messages.is_empty());
    assert!(!messages.iter().any(|m| m.contains("no source hash")));
}

#[test]
fn test_node_api_keeps_module_grammar() {
    let parsed = parse("export const a = 1 + 2;", &ParseOptions::default()).unwrap();
    assert_eq!(parsed.source_type, SourceType::Module);

    let result = deobfuscate_node_with_details(parsed.program, &quiet().rename(true)).unwrap();
    let Program::Module(_) = &result.output else {
        panic!("expected a module");
    };
    let code = generate(&result.output, EsVersion::EsNext).unwrap();
    assert!(code.contains("export const a = 3"), "{code}");
}

#[test]
fn test_deobfuscator_is_reusable() {
    let deobfuscator = Deobfuscator::new(quiet().format(false)).unwrap();
    let first = deobfuscator.deobfuscate_source("f(1 + 1);").unwrap();
    let second = deobfuscator.deobfuscate_source("f(1 + 1);").unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_source_hash_vectors() {
    assert_eq!(source_hash(""), 0x94a3_fa21);
    assert_eq!(source_hash("var a = 1;"), 0xadfe_a032);
}
