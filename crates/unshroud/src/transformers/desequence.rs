//! Sequence expressions split into separate statements.

use serde::{Deserialize, Serialize};
use swc_common::{DUMMY_SP, util::take::Take};
use swc_ecma_ast::{
    ArrowExpr, AssignTarget, BlockStmt, BlockStmtOrExpr, Decl, Expr, ExprStmt, ForInStmt,
    ForOfStmt, ForStmt, IfStmt, LabeledStmt, ModuleItem, ReturnStmt, SimpleAssignTarget, Stmt,
    SwitchStmt, ThrowStmt, VarDecl, VarDeclOrExpr,
};
use swc_ecma_visit::{VisitMut, VisitMutWith};

use super::utils::{StmtLike, expr_stmt, unparen};
use crate::context::{Context, Obfuscation};
use crate::error::TransformResult;
use crate::transformer::{Transformer, TransformerKind};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DesequenceOptions {}

/// `a(), b(), c();` → `a(); b(); c();`, and the same for sequences in
/// `return`, `throw`, `if`/`switch` tests, declarations, loop heads and
/// arrow bodies.
#[derive(Debug)]
pub struct Desequence {
    _options: DesequenceOptions,
}

impl Desequence {
    pub fn new(options: DesequenceOptions) -> Self {
        Self { _options: options }
    }
}

impl Transformer for Desequence {
    fn name(&self) -> &str {
        TransformerKind::Desequence.name()
    }

    fn transform(&self, context: &mut Context) -> TransformResult<()> {
        let mut splitter = Splitter { split: 0 };
        context.ast.visit_mut_with(&mut splitter);

        context.report(Obfuscation::new(
            self.name(),
            "sequence-expressions",
            splitter.split,
        ));
        Ok(())
    }
}

struct Splitter {
    split: usize,
}

/// Detach everything but the last expression of a sequence, leaving the
/// last one in place
fn take_prefix(expr: &mut Box<Expr>) -> Option<Vec<Box<Expr>>> {
    if !matches!(unparen(expr), Expr::Seq(seq) if seq.exprs.len() > 1) {
        return None;
    }
    while let Expr::Paren(paren) = &mut **expr {
        let inner = paren.expr.take();
        *expr = inner;
    }
    let Expr::Seq(seq) = &mut **expr else {
        return None;
    };
    let mut exprs = seq.exprs.take();
    *expr = exprs.pop()?;
    Some(exprs)
}

fn first_init(var: &mut VarDecl) -> Option<&mut Box<Expr>> {
    var.decls.first_mut()?.init.as_mut()
}

impl Splitter {
    /// Split one statement into the hoisted expressions followed by the
    /// statement itself; `Err` gives the statement back untouched
    fn split(&mut self, mut stmt: Stmt) -> Result<Vec<Stmt>, Stmt> {
        let prefix = match &mut stmt {
            Stmt::Expr(ExprStmt { expr, .. }) => {
                if let Expr::Assign(assign) = &mut **expr
                    && matches!(
                        assign.left,
                        AssignTarget::Simple(SimpleAssignTarget::Ident(_))
                    )
                {
                    take_prefix(&mut assign.right)
                } else {
                    take_prefix(expr)
                }
            }
            Stmt::Return(ReturnStmt { arg: Some(arg), .. }) => take_prefix(arg),
            Stmt::Throw(ThrowStmt { arg, .. }) => take_prefix(arg),
            Stmt::If(IfStmt { test, .. }) => take_prefix(test),
            Stmt::Switch(SwitchStmt { discriminant, .. }) => take_prefix(discriminant),
            Stmt::Decl(Decl::Var(var)) => first_init(var).and_then(take_prefix),
            Stmt::For(ForStmt {
                init: Some(init), ..
            }) => match init {
                VarDeclOrExpr::Expr(expr) => take_prefix(expr),
                VarDeclOrExpr::VarDecl(var) => first_init(var).and_then(take_prefix),
            },
            Stmt::ForIn(ForInStmt { right, .. }) | Stmt::ForOf(ForOfStmt { right, .. }) => {
                take_prefix(right)
            }
            _ => None,
        };

        let Some(exprs) = prefix else {
            return Err(stmt);
        };
        self.split += 1;
        let mut parts: Vec<Stmt> = exprs.into_iter().map(expr_stmt).collect();
        parts.push(stmt);
        Ok(parts)
    }

    /// Split repeatedly, since hoisted expressions may be sequences too
    fn flatten(&mut self, stmt: Stmt, out: &mut Vec<Stmt>) {
        match self.split(stmt) {
            Ok(parts) => {
                for part in parts {
                    self.flatten(part, out);
                }
            }
            Err(stmt) => out.push(stmt),
        }
    }

    fn split_list<T>(&mut self, items: &mut Vec<T>)
    where
        T: StmtLike + VisitMutWith<Self>,
    {
        let mut output = Vec::with_capacity(items.len());
        for mut item in items.drain(..) {
            // List items are spliced in place, not wrapped, so
            // `visit_mut_stmt` is bypassed for them
            match item.as_stmt_mut() {
                Some(stmt) => stmt.visit_mut_children_with(self),
                None => item.visit_mut_children_with(self),
            }
            match item.into_stmt() {
                Ok(stmt) => {
                    let mut parts = Vec::new();
                    self.flatten(stmt, &mut parts);
                    output.extend(parts.into_iter().map(T::from_stmt));
                }
                Err(module_decl) => output.push(module_decl),
            }
        }
        *items = output;
    }
}

impl VisitMut for Splitter {
    fn visit_mut_stmts(&mut self, stmts: &mut Vec<Stmt>) {
        self.split_list(stmts);
    }

    fn visit_mut_module_items(&mut self, items: &mut Vec<ModuleItem>) {
        self.split_list(items);
    }

    /// Statement in a single-statement position (`if (x) return a, b;`)
    fn visit_mut_stmt(&mut self, stmt: &mut Stmt) {
        stmt.visit_mut_children_with(self);

        let mut stmts = Vec::new();
        self.flatten(stmt.take(), &mut stmts);
        *stmt = if stmts.len() == 1 {
            stmts.remove(0)
        } else {
            Stmt::Block(BlockStmt {
                span: DUMMY_SP,
                ctxt: Default::default(),
                stmts,
            })
        };
    }

    fn visit_mut_labeled_stmt(&mut self, labeled: &mut LabeledStmt) {
        // Wrapping a labeled loop in a block would break `continue label`
        labeled.body.visit_mut_children_with(self);
    }

    fn visit_mut_arrow_expr(&mut self, arrow: &mut ArrowExpr) {
        arrow.visit_mut_children_with(self);

        let BlockStmtOrExpr::Expr(body) = &mut *arrow.body else {
            return;
        };
        let Some(exprs) = take_prefix(body) else {
            return;
        };
        self.split += 1;

        let mut stmts = Vec::new();
        for expr in exprs {
            self.flatten(expr_stmt(expr), &mut stmts);
        }
        stmts.push(Stmt::Return(ReturnStmt {
            span: DUMMY_SP,
            arg: Some(body.take()),
        }));
        *arrow.body = BlockStmtOrExpr::BlockStmt(BlockStmt {
            span: DUMMY_SP,
            ctxt: Default::default(),
            stmts,
        });
    }
}
