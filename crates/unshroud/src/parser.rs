//! Parser adapter.
//!
//! Wraps the SWC parser behind one `parse` function. Strict parsing fails on
//! any syntax error; loose parsing always yields a tree, replacing the
//! statements it cannot parse with placeholder statements.
//!
//! With [`SourceType::Both`] a module parse is attempted first and a script
//! parse second. The grammar that succeeded is returned in [`Parsed`] and
//! must be reused for every later re-parse of the same run.

use swc_common::{BytePos, DUMMY_SP, FileName, SourceMap, Span, Spanned, sync::Lrc};
use swc_ecma_ast::{Expr, ExprStmt, Invalid, Module, ModuleItem, Program, Script, Stmt};
use swc_ecma_parser::{EsSyntax, Parser, StringInput, Syntax, TsSyntax, error::Error, lexer::Lexer};

use crate::config::{Config, EcmaVersion, SourceType};
use crate::error::ParseError;

/// Parser settings, usually derived from a [`Config`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Grammar version
    pub ecma_version: EcmaVersion,
    /// Grammar selection
    pub source_type: SourceType,
    /// Error-tolerant parsing
    pub loose: bool,
    /// TypeScript grammar
    pub typescript: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            ecma_version: EcmaVersion::LATEST,
            source_type: SourceType::Both,
            loose: false,
            typescript: false,
        }
    }
}

impl ParseOptions {
    /// Parser settings for a pipeline configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            ecma_version: config.ecma_version,
            source_type: config.source_type,
            loose: config.loose,
            typescript: config.typescript,
        }
    }

    /// Same settings with the grammar pinned, used after resolution
    pub fn with_source_type(self, source_type: SourceType) -> Self {
        Self {
            source_type,
            ..self
        }
    }
}

/// A parsed program together with the grammar that produced it
#[derive(Debug, Clone)]
pub struct Parsed {
    pub program: Program,
    /// Never [`SourceType::Both`]
    pub source_type: SourceType,
}

/// Parse `source` according to `options`.
pub fn parse(source: &str, options: &ParseOptions) -> Result<Parsed, ParseError> {
    match options.source_type {
        SourceType::Module | SourceType::Script => {
            let program = parse_as(source, options, options.source_type)?;
            Ok(Parsed {
                program,
                source_type: options.source_type,
            })
        }
        SourceType::Both => {
            // Loose parsing never fails, so the strict grammars get a chance
            // before the tolerant fallback decides the mode.
            let strict = ParseOptions {
                loose: false,
                ..*options
            };
            if let Ok(program) = parse_as(source, &strict, SourceType::Module) {
                return Ok(Parsed {
                    program,
                    source_type: SourceType::Module,
                });
            }
            let program = parse_as(source, options, SourceType::Script)?;
            Ok(Parsed {
                program,
                source_type: SourceType::Script,
            })
        }
    }
}

fn parse_as(
    source: &str,
    options: &ParseOptions,
    source_type: SourceType,
) -> Result<Program, ParseError> {
    let cm: Lrc<SourceMap> = Default::default();
    let fm = cm.new_source_file(Lrc::new(FileName::Anon), source.to_string());
    let file = SourceFile {
        text: source,
        base: fm.start_pos,
        options,
        source_type,
    };

    if !options.loose {
        let (result, recovered) = file.run(0, source.len());
        let program = result.map_err(|err| file.error(&err))?;
        if let Some(err) = recovered.first() {
            return Err(file.error(err));
        }
        return Ok(program);
    }

    let mut body = Vec::new();
    let mut head = None;
    file.parse_loose(&mut body, &mut head);
    let mut program = head.unwrap_or_else(|| empty_program(source_type));
    set_body(&mut program, body, file.span(0, source.len()));
    Ok(program)
}

struct SourceFile<'a> {
    text: &'a str,
    base: BytePos,
    options: &'a ParseOptions,
    source_type: SourceType,
}

impl SourceFile<'_> {
    fn span(&self, start: usize, end: usize) -> Span {
        Span::new(
            self.base + BytePos(start as u32),
            self.base + BytePos(end as u32),
        )
    }

    fn syntax(&self) -> Syntax {
        if self.options.typescript {
            Syntax::Typescript(TsSyntax {
                decorators: true,
                ..Default::default()
            })
        } else {
            Syntax::Es(EsSyntax {
                decorators: true,
                allow_return_outside_function: self.source_type == SourceType::Script,
                ..Default::default()
            })
        }
    }

    /// Parse `text[start..end]`, returning the fatal result and any errors
    /// the parser recovered from.
    fn run(&self, start: usize, end: usize) -> (Result<Program, Error>, Vec<Error>) {
        let span = self.span(start, end);
        let input = StringInput::new(&self.text[start..end], span.lo, span.hi);
        let lexer = Lexer::new(
            self.syntax(),
            self.options.ecma_version.es_version(),
            input,
            None,
        );
        let mut parser = Parser::new_from(lexer);

        let result = if self.source_type == SourceType::Module {
            parser.parse_module().map(Program::Module)
        } else {
            parser.parse_script().map(Program::Script)
        };
        (result, parser.take_errors())
    }

    /// Tolerant parse of the whole text, appending to `body`.
    ///
    /// On a fatal error the range is split around the offending statement:
    /// the prefix and suffix are parsed on their own and the statement
    /// becomes a placeholder. Both halves are strictly shorter, so this
    /// terminates. Pending ranges live on a work list, not the call stack.
    /// `head` receives the program parsed from offset 0 (it owns the
    /// shebang). Errors the parser recovered from are accepted as is.
    fn parse_loose(&self, body: &mut Vec<ModuleItem>, head: &mut Option<Program>) {
        let mut pending = vec![Chunk::Source(0, self.text.len())];
        while let Some(chunk) = pending.pop() {
            let (start, end) = match chunk {
                Chunk::Source(start, end) if start < end => (start, end),
                Chunk::Source(..) => continue,
                Chunk::Placeholder(start, end) => {
                    tracing::debug!(start, end, "loose parse: replacing unparseable statement");
                    body.push(placeholder(self.span(start, end)));
                    continue;
                }
            };
            let err = match self.run(start, end).0 {
                Ok(mut program) => {
                    body.extend(take_body(&mut program));
                    if start == 0 {
                        *head = Some(program);
                    }
                    continue;
                }
                Err(err) => self.offset(err.span().lo),
            };

            let (bad_start, bad_end) = self.bad_region(start, end, err);
            // Popped in reverse: prefix, placeholder, suffix
            pending.push(Chunk::Source(bad_end, end));
            pending.push(Chunk::Placeholder(bad_start, bad_end));
            pending.push(Chunk::Source(start, bad_start));
        }
    }

    /// Region of `text[start..end]` to give up on for an error at `err`:
    /// the statement around it, never wider than its line
    fn bad_region(&self, start: usize, end: usize, err: usize) -> (usize, usize) {
        let bytes = self.text.as_bytes();
        let anchor = if err >= end { end - 1 } else { err.max(start) };
        let line_start = bytes[start..anchor]
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(start, |i| start + i + 1);
        let line_end = bytes[anchor..end]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(end, |i| anchor + i + 1);
        statement_bounds(bytes, line_start, anchor, line_end)
    }

    fn offset(&self, pos: BytePos) -> usize {
        (pos.0.saturating_sub(self.base.0) as usize).min(self.text.len())
    }

    fn error(&self, err: &Error) -> ParseError {
        ParseError {
            message: err.kind().msg().into_owned(),
            position: self.offset(err.span().lo) as u32,
            source_type: self.source_type,
        }
    }
}

/// Byte range still to parse, or to replace with a placeholder
enum Chunk {
    Source(usize, usize),
    Placeholder(usize, usize),
}

/// Narrow the line `[line_start, line_end)` to the statement containing
/// `anchor`. It starts after the last `;` or `}` at bracket depth zero
/// before `anchor` and ends after the first `;` at depth zero from it.
/// Strings and comments are skipped; regular expressions are not
/// recognized.
fn statement_bounds(
    bytes: &[u8],
    line_start: usize,
    anchor: usize,
    line_end: usize,
) -> (usize, usize) {
    let mut start = line_start;
    let mut depth = 0usize;
    let mut i = line_start;
    while i < anchor {
        match bytes[i] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' => depth = depth.saturating_sub(1),
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    start = i + 1;
                }
            }
            b';' if depth == 0 => start = i + 1,
            quote @ (b'\'' | b'"' | b'`') => {
                i = skip_string(bytes, i, quote, line_end);
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => break,
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = skip_comment(bytes, i, line_end);
                continue;
            }
            _ => {}
        }
        i += 1;
    }

    let mut end = line_end;
    let mut depth = 0isize;
    let mut i = anchor;
    while i < line_end {
        match bytes[i] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            b';' if depth <= 0 => {
                end = i + 1;
                break;
            }
            quote @ (b'\'' | b'"' | b'`') => {
                i = skip_string(bytes, i, quote, line_end);
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => break,
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = skip_comment(bytes, i, line_end);
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    (start, end)
}

/// Index after the string opened at `open`, or `limit` if unterminated
fn skip_string(bytes: &[u8], open: usize, quote: u8, limit: usize) -> usize {
    let mut i = open + 1;
    while i < limit {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    limit
}

/// Index after the block comment opened at `open`, or `limit`
fn skip_comment(bytes: &[u8], open: usize, limit: usize) -> usize {
    bytes[open + 2..limit.max(open + 2)]
        .windows(2)
        .position(|w| w == b"*/")
        .map_or(limit, |i| open + 2 + i + 2)
}

fn take_body(program: &mut Program) -> Vec<ModuleItem> {
    match program {
        Program::Module(module) => std::mem::take(&mut module.body),
        Program::Script(script) => std::mem::take(&mut script.body)
            .into_iter()
            .map(ModuleItem::Stmt)
            .collect(),
    }
}

fn set_body(program: &mut Program, body: Vec<ModuleItem>, span: Span) {
    match program {
        Program::Module(module) => {
            module.span = span;
            module.body = body;
        }
        Program::Script(script) => {
            script.span = span;
            script.body = body
                .into_iter()
                .filter_map(|item| match item {
                    ModuleItem::Stmt(stmt) => Some(stmt),
                    ModuleItem::ModuleDecl(_) => None,
                })
                .collect();
        }
    }
}

fn placeholder(span: Span) -> ModuleItem {
    ModuleItem::Stmt(Stmt::Expr(ExprStmt {
        span,
        expr: Box::new(Expr::Invalid(Invalid { span })),
    }))
}

/// Whether a statement is a loose-parse placeholder
pub fn is_placeholder(stmt: &Stmt) -> bool {
    matches!(stmt, Stmt::Expr(ExprStmt { expr, .. }) if matches!(**expr, Expr::Invalid(_)))
}

/// Empty program of the given grammar
pub fn empty_program(source_type: SourceType) -> Program {
    if source_type == SourceType::Module {
        Program::Module(Module {
            span: DUMMY_SP,
            body: Vec::new(),
            shebang: None,
        })
    } else {
        Program::Script(Script {
            span: DUMMY_SP,
            body: Vec::new(),
            shebang: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swc_ecma_ast::Decl;

    fn options(source_type: SourceType) -> ParseOptions {
        ParseOptions::default().with_source_type(source_type)
    }

    #[test]
    fn test_parse_module() {
        let parsed = parse("export const a = 1;", &options(SourceType::Module)).unwrap();
        assert_eq!(parsed.source_type, SourceType::Module);
        assert!(matches!(parsed.program, Program::Module(_)));
    }

    #[test]
    fn test_both_prefers_module() {
        let parsed = parse("const a = 1;", &ParseOptions::default()).unwrap();
        assert_eq!(parsed.source_type, SourceType::Module);
    }

    #[test]
    fn test_both_falls_back_to_script() {
        let parsed = parse("with (a) { b(); }", &ParseOptions::default()).unwrap();
        assert_eq!(parsed.source_type, SourceType::Script);

        let parsed = parse("return 1;", &ParseOptions::default()).unwrap();
        assert_eq!(parsed.source_type, SourceType::Script);
    }

    #[test]
    fn test_fixed_module_does_not_fall_back() {
        let err = parse("return 1;", &options(SourceType::Module)).unwrap_err();
        assert_eq!(err.source_type, SourceType::Module);
    }

    #[test]
    fn test_both_reports_script_error() {
        let err = parse("let = ;", &ParseOptions::default()).unwrap_err();
        assert_eq!(err.source_type, SourceType::Script);
    }

    #[test]
    fn test_error_position_is_relative() {
        let err = parse("a;\nb c d;", &options(SourceType::Script)).unwrap_err();
        assert!(err.position >= 3, "position {} before line 2", err.position);
    }

    #[test]
    fn test_loose_inserts_placeholder() {
        let opts = ParseOptions {
            loose: true,
            ..options(SourceType::Script)
        };
        let parsed = parse("a();\nvar = ;\nb();\n", &opts).unwrap();
        let Program::Script(script) = parsed.program else {
            panic!("expected script");
        };
        assert_eq!(script.body.len(), 3);
        assert!(!is_placeholder(&script.body[0]));
        assert!(is_placeholder(&script.body[1]));
        assert!(!is_placeholder(&script.body[2]));
    }

    fn loose_script(source: &str) -> Vec<Stmt> {
        let opts = ParseOptions {
            loose: true,
            ..options(SourceType::Script)
        };
        match parse(source, &opts).unwrap().program {
            Program::Script(script) => script.body,
            Program::Module(_) => panic!("expected script"),
        }
    }

    #[test]
    fn test_loose_keeps_recovered_tree() {
        // The missing `}` is recovered by the parser itself, so the function
        // survives and no placeholder is needed
        let body = loose_script("a();\nfunction f() {\n  b();\n");
        assert_eq!(body.len(), 2);
        assert!(matches!(body[1], Stmt::Decl(Decl::Fn(_))));
        assert!(!body.iter().any(is_placeholder));

        assert!(parse("a();\nfunction f() {\n  b();\n", &options(SourceType::Script)).is_err());
    }

    #[test]
    fn test_loose_splits_minified_line() {
        let body = loose_script(
            "var a=1;function f(){return a+1}var = ;console.log(f());var b=2;",
        );
        assert_eq!(body.len(), 5);
        assert!(matches!(body[0], Stmt::Decl(Decl::Var(_))));
        assert!(matches!(body[1], Stmt::Decl(Decl::Fn(_))));
        assert!(is_placeholder(&body[2]));
        assert!(matches!(body[3], Stmt::Expr(_)));
        assert!(matches!(body[4], Stmt::Decl(Decl::Var(_))));
    }

    #[test]
    fn test_loose_ignores_separators_in_strings() {
        let body = loose_script("f(';}'); var = ; g();");
        assert_eq!(body.len(), 3);
        assert!(is_placeholder(&body[1]));
    }

    #[test]
    fn test_loose_many_bad_lines() {
        let body = loose_script(&"f(0);\nvar = ;\n".repeat(3000));
        assert_eq!(body.len(), 6000);
        assert_eq!(body.iter().filter(|stmt| is_placeholder(stmt)).count(), 3000);
        assert!(!is_placeholder(&body[0]));
        assert!(is_placeholder(&body[5999]));
    }

    #[test]
    fn test_loose_both_uses_strict_module_first() {
        let opts = ParseOptions {
            loose: true,
            ..ParseOptions::default()
        };
        let parsed = parse("export default 1;", &opts).unwrap();
        assert_eq!(parsed.source_type, SourceType::Module);

        let parsed = parse("return 1;", &opts).unwrap();
        assert_eq!(parsed.source_type, SourceType::Script);
    }

    #[test]
    fn test_typescript_grammar() {
        let opts = ParseOptions {
            typescript: true,
            ..ParseOptions::default()
        };
        assert!(parse("const a: number = 1;", &opts).is_ok());
        assert!(parse("const a: number = 1;", &ParseOptions::default()).is_err());
    }
}
