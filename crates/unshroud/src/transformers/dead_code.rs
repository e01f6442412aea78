//! Dead branch and unreachable statement removal.

use serde::{Deserialize, Serialize};
use swc_common::{DUMMY_SP, util::take::Take};
use swc_ecma_ast::{
    ArrowExpr, BindingIdent, BlockStmt, Class, Decl, Expr, ExprStmt, FnDecl, ForStmt, Function,
    Ident, IfStmt, Lit, ModuleItem, ObjectPatProp, Pat, Stmt, UnaryExpr, UnaryOp, VarDecl,
    VarDeclKind, VarDeclOrExpr, VarDeclarator, WhileStmt,
};
use swc_ecma_visit::{Visit, VisitMut, VisitMutWith, VisitWith};

use super::utils::{StmtLike, empty_stmt, expr_stmt, is_lexical_decl};
use super::value::truthiness;
use crate::context::{Context, Obfuscation};
use crate::error::TransformResult;
use crate::transformer::{Transformer, TransformerKind};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeadCodeOptions {}

/// Removes branches whose test is known (`if ("a" === "b")`), statements
/// after `return`/`throw`/`break`/`continue`, empty statements and
/// redundant blocks.
#[derive(Debug)]
pub struct DeadCode {
    _options: DeadCodeOptions,
}

impl DeadCode {
    pub fn new(options: DeadCodeOptions) -> Self {
        Self { _options: options }
    }
}

impl Transformer for DeadCode {
    fn name(&self) -> &str {
        TransformerKind::DeadCode.name()
    }

    fn transform(&self, context: &mut Context) -> TransformResult<()> {
        let mut eliminator = Eliminator::default();
        context.ast.visit_mut_with(&mut eliminator);

        context.report(Obfuscation::new(
            self.name(),
            "dead-branches",
            eliminator.branches,
        ));
        context.report(Obfuscation::new(
            self.name(),
            "unreachable-code",
            eliminator.unreachable,
        ));
        Ok(())
    }
}

#[derive(Default)]
struct Eliminator {
    branches: usize,
    unreachable: usize,
}

/// A block whose statements can be spliced into the enclosing list
fn is_flattenable(block: &BlockStmt) -> bool {
    !block.stmts.iter().any(is_lexical_decl)
}

fn is_terminator(stmt: &Stmt) -> bool {
    matches!(
        stmt,
        Stmt::Return(_) | Stmt::Throw(_) | Stmt::Break(_) | Stmt::Continue(_)
    )
}

/// Expression statements with nothing to evaluate. Strings are kept since
/// they may be directives.
fn is_inert_expr_stmt(stmt: &Stmt) -> bool {
    let Stmt::Expr(ExprStmt { expr, .. }) = stmt else {
        return false;
    };
    match &**expr {
        Expr::Lit(Lit::Num(_) | Lit::Bool(_) | Lit::Null(_)) => true,
        Expr::Unary(UnaryExpr {
            op: UnaryOp::Void,
            arg,
            ..
        }) => matches!(**arg, Expr::Lit(Lit::Num(_))),
        _ => false,
    }
}

/// Names a discarded statement would have hoisted to the enclosing
/// function: `var` bindings and block-level function declarations, outside
/// nested functions and classes
#[derive(Default)]
struct HoistedNames {
    names: Vec<Ident>,
}

impl HoistedNames {
    fn add(&mut self, ident: &Ident) {
        if !self.names.iter().any(|name| name.sym == ident.sym) {
            self.names.push(ident.clone());
        }
    }

    fn add_pat(&mut self, pat: &Pat) {
        match pat {
            Pat::Ident(binding) => self.add(&binding.id),
            Pat::Array(array) => {
                for elem in array.elems.iter().flatten() {
                    self.add_pat(elem);
                }
            }
            Pat::Rest(rest) => self.add_pat(&rest.arg),
            Pat::Object(object) => {
                for prop in &object.props {
                    match prop {
                        ObjectPatProp::KeyValue(kv) => self.add_pat(&kv.value),
                        ObjectPatProp::Assign(assign) => self.add(&assign.key.id),
                        ObjectPatProp::Rest(rest) => self.add_pat(&rest.arg),
                    }
                }
            }
            Pat::Assign(assign) => self.add_pat(&assign.left),
            Pat::Expr(_) | Pat::Invalid(_) => {}
        }
    }
}

impl Visit for HoistedNames {
    fn visit_var_decl(&mut self, var: &VarDecl) {
        if var.kind == VarDeclKind::Var {
            for decl in &var.decls {
                self.add_pat(&decl.name);
            }
        }
    }

    fn visit_fn_decl(&mut self, decl: &FnDecl) {
        self.add(&decl.ident);
    }

    fn visit_function(&mut self, _: &Function) {}

    fn visit_arrow_expr(&mut self, _: &ArrowExpr) {}

    fn visit_class(&mut self, _: &Class) {}
}

/// `var a, b;` for everything `stmt` hoists, if anything
fn hoisted_decl(stmt: &Stmt) -> Option<Stmt> {
    let mut hoisted = HoistedNames::default();
    stmt.visit_with(&mut hoisted);
    if hoisted.names.is_empty() {
        return None;
    }
    let decls = hoisted
        .names
        .into_iter()
        .map(|id| VarDeclarator {
            span: DUMMY_SP,
            name: Pat::Ident(BindingIdent::from(id)),
            init: None,
            definite: false,
        })
        .collect();
    Some(Stmt::Decl(Decl::Var(Box::new(VarDecl {
        span: DUMMY_SP,
        ctxt: Default::default(),
        kind: VarDeclKind::Var,
        declare: false,
        decls,
    }))))
}

/// `stmt` preceded by the hoisted declaration of a discarded sibling
fn with_hoisted(hoisted: Option<Stmt>, stmt: Stmt) -> Stmt {
    let Some(hoisted) = hoisted else {
        return stmt;
    };
    let mut stmts = vec![hoisted];
    match stmt {
        Stmt::Empty(_) => {}
        Stmt::Block(block) if is_flattenable(&block) => stmts.extend(block.stmts),
        stmt => stmts.push(stmt),
    }
    Stmt::Block(BlockStmt {
        span: DUMMY_SP,
        ctxt: Default::default(),
        stmts,
    })
}

/// Hoisted parts of an unreachable statement: function declarations as
/// they are, `var` names without their initializers
fn hoisted_remains(stmt: Stmt) -> Option<Stmt> {
    match stmt {
        Stmt::Decl(Decl::Fn(_)) => Some(stmt),
        stmt => hoisted_decl(&stmt),
    }
}

impl Eliminator {
    /// Reduce a statement whose test is known
    fn fold_stmt(&mut self, stmt: &mut Stmt) {
        match stmt {
            Stmt::If(IfStmt {
                test, cons, alt, ..
            }) => {
                let Some(value) = truthiness(test) else {
                    return;
                };
                let (taken, dropped) = if value {
                    (Some(cons.take()), alt.take())
                } else {
                    (alt.take(), Some(cons.take()))
                };
                let hoisted = dropped.and_then(|dropped| hoisted_decl(&dropped));
                *stmt = with_hoisted(hoisted, taken.map_or_else(empty_stmt, |s| *s));
                self.branches += 1;
            }
            Stmt::While(WhileStmt { test, body, .. }) if truthiness(test) == Some(false) => {
                *stmt = with_hoisted(hoisted_decl(body), empty_stmt());
                self.branches += 1;
            }
            Stmt::For(ForStmt {
                init,
                test: Some(test),
                body,
                ..
            }) if truthiness(test) == Some(false) => {
                let hoisted = hoisted_decl(body);
                let init = match init.take() {
                    Some(VarDeclOrExpr::VarDecl(var)) => Stmt::Decl(Decl::Var(var)),
                    Some(VarDeclOrExpr::Expr(expr)) => expr_stmt(expr),
                    None => empty_stmt(),
                };
                *stmt = with_hoisted(hoisted, init);
                self.branches += 1;
            }
            _ => {}
        }
    }

    fn clean_list<T: StmtLike>(&mut self, items: &mut Vec<T>) {
        let mut output = Vec::with_capacity(items.len());
        let mut reachable = true;

        for item in items.drain(..) {
            let stmt = match item.into_stmt() {
                Ok(stmt) => stmt,
                Err(module_decl) => {
                    output.push(module_decl);
                    continue;
                }
            };

            if !reachable {
                if let Some(hoisted) = hoisted_remains(stmt) {
                    output.push(T::from_stmt(hoisted));
                }
                self.unreachable += 1;
                continue;
            }

            match stmt {
                Stmt::Empty(_) => {}
                stmt if is_inert_expr_stmt(&stmt) => self.unreachable += 1,
                Stmt::Block(block) if is_flattenable(&block) => {
                    for inner in block.stmts {
                        reachable &= !is_terminator(&inner);
                        output.push(T::from_stmt(inner));
                    }
                }
                stmt => {
                    reachable = !is_terminator(&stmt);
                    output.push(T::from_stmt(stmt));
                }
            }
        }

        *items = output;
    }
}

impl VisitMut for Eliminator {
    fn visit_mut_stmt(&mut self, stmt: &mut Stmt) {
        stmt.visit_mut_children_with(self);
        self.fold_stmt(stmt);
    }

    fn visit_mut_stmts(&mut self, stmts: &mut Vec<Stmt>) {
        stmts.visit_mut_children_with(self);
        self.clean_list(stmts);
    }

    fn visit_mut_module_items(&mut self, items: &mut Vec<ModuleItem>) {
        items.visit_mut_children_with(self);
        self.clean_list(items);
    }

    fn visit_mut_if_stmt(&mut self, stmt: &mut IfStmt) {
        stmt.visit_mut_children_with(self);
        if let Some(alt) = &stmt.alt
            && matches!(**alt, Stmt::Empty(_))
        {
            stmt.alt = None;
        }
    }
}
