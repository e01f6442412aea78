//! AST helpers shared by the passes.

use swc_common::{DUMMY_SP, Span};
use swc_ecma_ast::{
    BindingIdent, Bool, Decl, EmptyStmt, Expr, ExprStmt, Ident, IdentName, Lit, MemberProp,
    ModuleItem, Number, Pat, Program, PropName, Stmt, Str, UnaryExpr, UnaryOp,
    VarDecl, VarDeclKind,
};

/// Statement containers: function/script bodies and module bodies.
pub trait StmtLike: Sized {
    fn as_stmt(&self) -> Option<&Stmt>;
    fn as_stmt_mut(&mut self) -> Option<&mut Stmt>;
    fn from_stmt(stmt: Stmt) -> Self;
    /// `Err(self)` for module declarations
    fn into_stmt(self) -> Result<Stmt, Self>;
}

impl StmtLike for Stmt {
    fn as_stmt(&self) -> Option<&Stmt> {
        Some(self)
    }

    fn as_stmt_mut(&mut self) -> Option<&mut Stmt> {
        Some(self)
    }

    fn from_stmt(stmt: Stmt) -> Self {
        stmt
    }

    fn into_stmt(self) -> Result<Stmt, Self> {
        Ok(self)
    }
}

impl StmtLike for ModuleItem {
    fn as_stmt(&self) -> Option<&Stmt> {
        match self {
            ModuleItem::Stmt(stmt) => Some(stmt),
            ModuleItem::ModuleDecl(_) => None,
        }
    }

    fn as_stmt_mut(&mut self) -> Option<&mut Stmt> {
        match self {
            ModuleItem::Stmt(stmt) => Some(stmt),
            ModuleItem::ModuleDecl(_) => None,
        }
    }

    fn from_stmt(stmt: Stmt) -> Self {
        ModuleItem::Stmt(stmt)
    }

    fn into_stmt(self) -> Result<Stmt, Self> {
        match self {
            ModuleItem::Stmt(stmt) => Ok(stmt),
            other => Err(other),
        }
    }
}

/// Top-level statements of a program, module declarations skipped
pub fn top_level_stmts(program: &Program) -> Vec<&Stmt> {
    match program {
        Program::Module(module) => module
            .body
            .iter()
            .filter_map(|item| StmtLike::as_stmt(item))
            .collect(),
        Program::Script(script) => script.body.iter().collect(),
    }
}

/// Keep the top-level statements satisfying `keep`; module declarations
/// always stay
pub fn retain_top_level(program: &mut Program, mut keep: impl FnMut(&Stmt) -> bool) {
    match program {
        Program::Module(module) => module
            .body
            .retain(|item| StmtLike::as_stmt(item).is_none_or(|stmt| keep(stmt))),
        Program::Script(script) => script.body.retain(|stmt| keep(stmt)),
    }
}

pub fn empty_stmt() -> Stmt {
    Stmt::Empty(EmptyStmt { span: DUMMY_SP })
}

pub fn expr_stmt(expr: Box<Expr>) -> Stmt {
    Stmt::Expr(ExprStmt {
        span: DUMMY_SP,
        expr,
    })
}

pub fn string_expr(span: Span, value: &str) -> Expr {
    Expr::Lit(Lit::Str(Str {
        span,
        value: value.into(),
        raw: None,
    }))
}

/// Number literal; negative values become a unary minus
pub fn number_expr(span: Span, value: f64) -> Expr {
    if value < 0.0 || (value == 0.0 && value.is_sign_negative()) {
        return Expr::Unary(UnaryExpr {
            span,
            op: UnaryOp::Minus,
            arg: Box::new(number_expr(span, -value)),
        });
    }
    Expr::Lit(Lit::Num(Number {
        span,
        value,
        raw: None,
    }))
}

pub fn bool_expr(span: Span, value: bool) -> Expr {
    Expr::Lit(Lit::Bool(Bool { span, value }))
}

/// `void 0`
pub fn undefined_expr(span: Span) -> Expr {
    Expr::Unary(UnaryExpr {
        span,
        op: UnaryOp::Void,
        arg: Box::new(number_expr(span, 0.0)),
    })
}

pub fn ident(name: &str) -> Ident {
    Ident::new(name.into(), DUMMY_SP, Default::default())
}

pub fn ident_expr(name: &str) -> Expr {
    Expr::Ident(ident(name))
}

/// `var`/`let`/`const` declaration of a single name
pub fn var_decl(kind: VarDeclKind, name: &str, init: Option<Box<Expr>>) -> VarDecl {
    VarDecl {
        span: DUMMY_SP,
        ctxt: Default::default(),
        kind,
        declare: false,
        decls: vec![swc_ecma_ast::VarDeclarator {
            span: DUMMY_SP,
            name: Pat::Ident(BindingIdent {
                id: ident(name),
                type_ann: None,
            }),
            init,
            definite: false,
        }],
    }
}

/// Strip any number of parentheses
pub fn unparen(expr: &Expr) -> &Expr {
    let mut expr = expr;
    while let Expr::Paren(paren) = expr {
        expr = &paren.expr;
    }
    expr
}

/// String value of a string literal, if it is valid UTF-8 text
pub fn str_value(expr: &Expr) -> Option<&str> {
    match unparen(expr) {
        Expr::Lit(Lit::Str(s)) => s.value.as_str(),
        _ => None,
    }
}

pub fn num_value(expr: &Expr) -> Option<f64> {
    match unparen(expr) {
        Expr::Lit(Lit::Num(n)) => Some(n.value),
        Expr::Unary(UnaryExpr {
            op: UnaryOp::Minus,
            arg,
            ..
        }) => match unparen(arg) {
            Expr::Lit(Lit::Num(n)) => Some(-n.value),
            _ => None,
        },
        _ => None,
    }
}

/// Static key of a member access: `a.b` and `a["b"]` both give `b`
pub fn member_key(prop: &MemberProp) -> Option<&str> {
    match prop {
        MemberProp::Ident(name) => Some(name.sym.as_str()),
        MemberProp::Computed(computed) => str_value(&computed.expr),
        MemberProp::PrivateName(_) => None,
    }
}

/// Static key of an object property; numeric keys use their JS spelling
pub fn prop_name_key(name: &PropName) -> Option<String> {
    match name {
        PropName::Ident(IdentName { sym, .. }) => Some(sym.to_string()),
        PropName::Str(s) => s.value.as_str().map(str::to_string),
        PropName::Num(n) => crate::transformers::value::format_number(n.value),
        PropName::Computed(computed) => str_value(&computed.expr).map(str::to_string),
        PropName::BigInt(_) => None,
    }
}

/// Whether `name` can be written as `a.name`
pub fn is_identifier_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '$' || c == '_' || c.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '$' || c == '_' || c == '\u{200c}' || c == '\u{200d}' || c.is_alphanumeric())
}

const RESERVED: &[&str] = &[
    "await", "break", "case", "catch", "class", "const", "continue", "debugger", "default",
    "delete", "do", "else", "enum", "export", "extends", "false", "finally", "for", "function",
    "if", "implements", "import", "in", "instanceof", "interface", "let", "new", "null",
    "package", "private", "protected", "public", "return", "static", "super", "switch", "this",
    "throw", "true", "try", "typeof", "var", "void", "while", "with", "yield", "arguments",
    "eval", "undefined", "NaN", "Infinity",
];

/// Whether `name` cannot be used as a binding name
pub fn is_reserved_word(name: &str) -> bool {
    RESERVED.contains(&name)
}

/// Whether evaluating `expr` can have no observable effect
pub fn is_pure(expr: &Expr) -> bool {
    match unparen(expr) {
        Expr::Lit(Lit::Regex(_)) => false,
        Expr::Lit(_) => true,
        Expr::Fn(_) | Expr::Arrow(_) => true,
        Expr::Unary(UnaryExpr {
            op: UnaryOp::Minus | UnaryOp::Plus | UnaryOp::Bang | UnaryOp::Void,
            arg,
            ..
        }) => matches!(unparen(arg), Expr::Lit(_)),
        Expr::Array(array) => array
            .elems
            .iter()
            .flatten()
            .all(|elem| elem.spread.is_none() && is_pure(&elem.expr)),
        _ => false,
    }
}

/// Whether a statement declares block-scoped bindings
pub fn is_lexical_decl(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Decl(Decl::Var(var)) => var.kind != VarDeclKind::Var,
        Stmt::Decl(Decl::Class(_) | Decl::Fn(_) | Decl::Using(_)) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_names() {
        assert!(is_identifier_name("log"));
        assert!(is_identifier_name("_0x1a"));
        assert!(is_identifier_name("$"));
        assert!(is_identifier_name("default"));
        assert!(!is_identifier_name(""));
        assert!(!is_identifier_name("0abc"));
        assert!(!is_identifier_name("a-b"));
        assert!(!is_identifier_name("a b"));
    }

    #[test]
    fn test_number_expr_negative() {
        let expr = number_expr(DUMMY_SP, -3.0);
        assert_eq!(num_value(&expr), Some(-3.0));
        assert!(matches!(expr, Expr::Unary(_)));
    }

    #[test]
    fn test_purity() {
        assert!(is_pure(&number_expr(DUMMY_SP, 1.0)));
        assert!(is_pure(&string_expr(DUMMY_SP, "a")));
        assert!(!is_pure(&ident_expr("a")));
    }
}
