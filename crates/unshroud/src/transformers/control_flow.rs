//! Control flow flattening reversal.
//!
//! Flattened code runs its statements through a dispatcher loop, in an
//! order given by a string:
//!
//! ```js
//! var order = '2|0|1'.split('|'), i = 0;
//! while (true) {
//!     switch (order[i++]) {
//!         case '0': b(); continue;
//!         case '1': c(); continue;
//!         case '2': a(); continue;
//!     }
//!     break;
//! }
//! ```
//!
//! The pass replays the order and splices the case bodies back as straight
//! line code (`a(); b(); c();`). The order and counter must not be used
//! anywhere else, and case bodies may only leave through the trailing
//! `continue`, a `return` or a `throw`.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use swc_common::DUMMY_SP;
use swc_ecma_ast::{
    ArrowExpr, BlockStmt, BreakStmt, ContinueStmt, Decl, DoWhileStmt, Expr, ForInStmt, ForOfStmt,
    ForStmt, Function, Id, Lit, MemberProp, ModuleItem, Pat, Stmt, SwitchCase, SwitchStmt,
    UpdateExpr, UpdateOp, VarDecl, VarDeclOrExpr, VarDeclarator, WhileStmt,
};
use swc_ecma_visit::{Visit, VisitMut, VisitMutWith, VisitWith};

use super::scope::{count_references, resolve_scopes};
use super::utils::{StmtLike, expr_stmt, is_lexical_decl, member_key, num_value, str_value, unparen};
use super::value::{format_number, truthiness};
use crate::context::{Context, Obfuscation};
use crate::error::TransformResult;
use crate::transformer::{Transformer, TransformerKind};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControlFlowOptions {}

#[derive(Debug)]
pub struct ControlFlow {
    _options: ControlFlowOptions,
}

impl ControlFlow {
    pub fn new(options: ControlFlowOptions) -> Self {
        Self { _options: options }
    }
}

impl Transformer for ControlFlow {
    fn name(&self) -> &str {
        TransformerKind::ControlFlow.name()
    }

    fn transform(&self, context: &mut Context) -> TransformResult<()> {
        let flattened = resolve_scopes(&mut context.ast, |program, _| {
            let mut unflattener = Unflattener {
                counts: count_references(&*program),
                restored: 0,
            };
            program.visit_mut_with(&mut unflattener);
            unflattener.restored
        });

        if flattened > 0 {
            tracing::debug!(flattened, "dispatcher loops restored");
        }
        context.report(Obfuscation::new(
            self.name(),
            "control-flow-flattening",
            flattened,
        ));
        Ok(())
    }
}

/// The `switch (order[counter++])` inside an infinite loop
struct Dispatcher<'a> {
    order: Id,
    counter: Id,
    init: Option<&'a VarDeclOrExpr>,
    cases: &'a [SwitchCase],
}

fn dispatcher(stmt: &Stmt) -> Option<Dispatcher<'_>> {
    let (init, body) = match stmt {
        Stmt::While(WhileStmt { test, body, .. }) if truthiness(test) == Some(true) => (None, body),
        Stmt::For(ForStmt {
            init,
            test,
            update: None,
            body,
            ..
        }) if test.as_deref().is_none_or(|test| truthiness(test) == Some(true)) => {
            (init.as_ref(), body)
        }
        _ => return None,
    };
    let Stmt::Block(block) = &**body else {
        return None;
    };
    let [Stmt::Switch(switch), Stmt::Break(BreakStmt { label: None, .. })] = block.stmts.as_slice()
    else {
        return None;
    };

    let Expr::Member(member) = unparen(&switch.discriminant) else {
        return None;
    };
    let Expr::Ident(order) = unparen(&member.obj) else {
        return None;
    };
    let MemberProp::Computed(prop) = &member.prop else {
        return None;
    };
    let Expr::Update(UpdateExpr {
        op: UpdateOp::PlusPlus,
        prefix: false,
        arg,
        ..
    }) = unparen(&prop.expr)
    else {
        return None;
    };
    let Expr::Ident(counter) = unparen(arg) else {
        return None;
    };

    Some(Dispatcher {
        order: order.to_id(),
        counter: counter.to_id(),
        init,
        cases: &switch.cases,
    })
}

/// `'1|0|2'.split('|')` or `['1', '0', '2']`
fn order_keys(expr: &Expr) -> Option<Vec<String>> {
    match unparen(expr) {
        Expr::Call(call) => {
            let Expr::Member(member) = unparen(call.callee.as_expr()?) else {
                return None;
            };
            if member_key(&member.prop)? != "split" {
                return None;
            }
            let text = str_value(&member.obj)?;
            let [separator] = call.args.as_slice() else {
                return None;
            };
            if separator.spread.is_some() {
                return None;
            }
            let separator = str_value(&separator.expr)?;
            if separator.is_empty() {
                Some(text.chars().map(String::from).collect())
            } else {
                Some(text.split(separator).map(str::to_string).collect())
            }
        }
        Expr::Array(array) => array
            .elems
            .iter()
            .map(|elem| match elem {
                Some(elem) if elem.spread.is_none() => case_key(&elem.expr),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

/// Key a `case` test matches, as the string the order holds
fn case_key(expr: &Expr) -> Option<String> {
    match unparen(expr) {
        Expr::Lit(Lit::Str(_)) => str_value(expr).map(str::to_string),
        Expr::Lit(Lit::Num(n)) => format_number(n.value),
        _ => None,
    }
}

fn declarator<'a>(var: &'a VarDecl, id: &Id) -> Option<&'a VarDeclarator> {
    var.decls
        .iter()
        .find(|decl| matches!(&decl.name, Pat::Ident(binding) if binding.id.to_id() == *id))
}

/// How one case leaves the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    /// Trailing `continue` to the next key
    Next,
    /// `return` or `throw`
    Leave,
    /// Runs off the end of the switch into the loop's `break`
    End,
}

fn case_exit(case: &SwitchCase, is_last: bool) -> Option<Exit> {
    match case.cons.last() {
        Some(Stmt::Continue(ContinueStmt { label: None, .. })) => Some(Exit::Next),
        Some(Stmt::Return(_) | Stmt::Throw(_)) => Some(Exit::Leave),
        _ if is_last => Some(Exit::End),
        _ => None,
    }
}

/// Whether statements contain a `break` or `continue` that would target the
/// dispatcher loop or its switch
fn has_stray_jump(stmts: &[Stmt]) -> bool {
    #[derive(Default)]
    struct Finder {
        loops: usize,
        switches: usize,
        found: bool,
    }

    macro_rules! nested_loop {
        ($($method:ident: $ty:ty),* $(,)?) => {
            $(
                fn $method(&mut self, node: &$ty) {
                    self.loops += 1;
                    node.visit_children_with(self);
                    self.loops -= 1;
                }
            )*
        };
    }

    impl Visit for Finder {
        nested_loop!(
            visit_while_stmt: WhileStmt,
            visit_do_while_stmt: DoWhileStmt,
            visit_for_stmt: ForStmt,
            visit_for_in_stmt: ForInStmt,
            visit_for_of_stmt: ForOfStmt,
        );

        fn visit_switch_stmt(&mut self, switch: &SwitchStmt) {
            self.switches += 1;
            switch.visit_children_with(self);
            self.switches -= 1;
        }

        fn visit_break_stmt(&mut self, stmt: &BreakStmt) {
            if stmt.label.is_none() && self.loops == 0 && self.switches == 0 {
                self.found = true;
            }
        }

        fn visit_continue_stmt(&mut self, stmt: &ContinueStmt) {
            if stmt.label.is_none() && self.loops == 0 {
                self.found = true;
            }
        }

        fn visit_function(&mut self, _: &Function) {}

        fn visit_arrow_expr(&mut self, _: &ArrowExpr) {}
    }

    let mut finder = Finder::default();
    for stmt in stmts {
        stmt.visit_with(&mut finder);
    }
    finder.found
}

/// Detach the loop head's initializer and expose the dispatcher switch
fn dismantle(stmt: &mut Stmt) -> Option<(Option<VarDeclOrExpr>, &mut SwitchStmt)> {
    let (init, body) = match stmt {
        Stmt::While(WhileStmt { body, .. }) => (None, body),
        Stmt::For(ForStmt { init, body, .. }) => (Some(init), body),
        _ => return None,
    };
    let Stmt::Block(block) = &mut **body else {
        return None;
    };
    let Some(Stmt::Switch(switch)) = block.stmts.first_mut() else {
        return None;
    };
    Some((init.and_then(Option::take), switch))
}

/// What to do with one dispatcher loop
struct Plan {
    ids: FxHashSet<Id>,
    /// Cases to splice, in execution order
    steps: Vec<(usize, Exit)>,
}

struct Unflattener {
    counts: FxHashMap<Id, usize>,
    restored: usize,
}

impl Unflattener {
    /// Check a dispatcher loop; `preceding` are the statements before it
    /// in the same list
    fn plan<T: StmtLike>(&self, stmt: &Stmt, preceding: &[T]) -> Option<Plan> {
        let dispatcher = dispatcher(stmt)?;
        if dispatcher.order == dispatcher.counter {
            return None;
        }
        // Declaration plus the read in the switch
        for id in [&dispatcher.order, &dispatcher.counter] {
            if self.counts.get(id) != Some(&2) {
                return None;
            }
        }

        let mut decls: Vec<&VarDecl> = match dispatcher.init {
            Some(VarDeclOrExpr::VarDecl(var)) => vec![&**var],
            _ => Vec::new(),
        };
        decls.extend(
            preceding
                .iter()
                .rev()
                .map_while(|item| match item.as_stmt() {
                    Some(Stmt::Decl(Decl::Var(var))) => Some(&**var),
                    _ => None,
                }),
        );
        let find = |id: &Id| {
            decls
                .iter()
                .find_map(|var| declarator(var, id))
                .and_then(|decl| decl.init.as_deref())
        };
        let keys = order_keys(find(&dispatcher.order)?)?;
        let start = num_value(find(&dispatcher.counter)?)?;
        if start < 0.0 || start.fract() != 0.0 {
            return None;
        }

        let mut positions: FxHashMap<String, usize> = FxHashMap::default();
        for (index, case) in dispatcher.cases.iter().enumerate() {
            let key = case_key(case.test.as_deref()?)?;
            if positions.insert(key, index).is_some() {
                return None;
            }
        }

        let mut seen = FxHashSet::default();
        let mut steps = Vec::new();
        for key in keys.iter().skip(start as usize) {
            if !seen.insert(key) {
                return None;
            }
            // An unknown key falls through the switch to the `break`
            let Some(&index) = positions.get(key) else {
                break;
            };
            let case = &dispatcher.cases[index];
            let exit = case_exit(case, index + 1 == dispatcher.cases.len())?;
            let body = match exit {
                Exit::Next => &case.cons[..case.cons.len() - 1],
                Exit::Leave | Exit::End => &case.cons[..],
            };
            if has_stray_jump(body) {
                return None;
            }
            steps.push((index, exit));
            if exit != Exit::Next {
                break;
            }
        }

        Some(Plan {
            ids: FxHashSet::from_iter([dispatcher.order, dispatcher.counter]),
            steps,
        })
    }

    /// Replace the loop with its case bodies in execution order
    fn unflatten<T: StmtLike>(&mut self, mut stmt: Stmt, plan: Plan, output: &mut Vec<T>) {
        let is_planned = |decl: &VarDeclarator| {
            matches!(&decl.name, Pat::Ident(binding) if plan.ids.contains(&binding.id.to_id()))
        };
        let Some((init, switch)) = dismantle(&mut stmt) else {
            output.push(T::from_stmt(stmt));
            return;
        };

        let mut stmts = Vec::new();
        match init {
            Some(VarDeclOrExpr::VarDecl(mut var)) => {
                var.decls.retain(|decl| !is_planned(decl));
                if !var.decls.is_empty() {
                    stmts.push(Stmt::Decl(Decl::Var(var)));
                }
            }
            Some(VarDeclOrExpr::Expr(expr)) => stmts.push(expr_stmt(expr)),
            None => {}
        }
        for &(index, exit) in &plan.steps {
            let mut body = std::mem::take(&mut switch.cases[index].cons);
            if exit == Exit::Next {
                body.pop();
            }
            stmts.extend(body);
        }

        // Drop the order and counter from the declarations before the loop
        let mut first = output.len();
        while first > 0 {
            let Some(Stmt::Decl(Decl::Var(var))) = output[first - 1].as_stmt_mut() else {
                break;
            };
            var.decls.retain(|decl| !is_planned(decl));
            first -= 1;
        }
        let trailing = output.split_off(first);
        output.extend(trailing.into_iter().filter(|item| {
            !matches!(item.as_stmt(), Some(Stmt::Decl(Decl::Var(var))) if var.decls.is_empty())
        }));

        self.restored += 1;
        if stmts.iter().any(is_lexical_decl) {
            output.push(T::from_stmt(Stmt::Block(BlockStmt {
                span: DUMMY_SP,
                ctxt: Default::default(),
                stmts,
            })));
        } else {
            output.extend(stmts.into_iter().map(T::from_stmt));
        }
    }

    fn unflatten_list<T>(&mut self, items: &mut Vec<T>)
    where
        T: StmtLike + VisitMutWith<Self>,
        Vec<T>: VisitMutWith<Self>,
    {
        items.visit_mut_children_with(self);

        let mut output: Vec<T> = Vec::with_capacity(items.len());
        for item in items.drain(..) {
            let plan = item.as_stmt().and_then(|stmt| self.plan(stmt, &output));
            match (plan, item.into_stmt()) {
                (Some(plan), Ok(stmt)) => self.unflatten(stmt, plan, &mut output),
                (_, Ok(stmt)) => output.push(T::from_stmt(stmt)),
                (_, Err(item)) => output.push(item),
            }
        }
        *items = output;
    }
}

impl VisitMut for Unflattener {
    fn visit_mut_stmts(&mut self, stmts: &mut Vec<Stmt>) {
        self.unflatten_list(stmts);
    }

    fn visit_mut_module_items(&mut self, items: &mut Vec<ModuleItem>) {
        self.unflatten_list(items);
    }
}

#[cfg(test)]
mod tests {
    use crate::transformer::TransformerKind;
    use crate::transformers::test_utils::{js, run_pass, run_pass_detailed};

    fn unflatten(source: &str) -> String {
        run_pass(TransformerKind::ControlFlow, source)
    }

    #[test]
    fn test_split_order() {
        let source = "function f() {\
            var o = '2|0|1'.split('|'), i = 0;\
            while (true) { switch (o[i++]) {\
                case '0': b(); continue;\
                case '1': c(); continue;\
                case '2': a(); continue;\
            } break; }\
        }";
        assert_eq!(unflatten(source), js("function f() { a(); b(); c(); }"));
    }

    #[test]
    fn test_return_ends_sequence() {
        let source = "function f() {\
            var o = '1|0|2'.split('|'), i = 0, x = 1;\
            for (;;) { switch (o[i++]) {\
                case '0': return x;\
                case '1': x++; continue;\
                case '2': never(); continue;\
            } break; }\
        }";
        assert_eq!(
            unflatten(source),
            js("function f() { var x = 1; x++; return x; }")
        );
    }

    #[test]
    fn test_declarations_in_loop_head() {
        let source = "for (var o = ['1', '0'], i = 0;;) { switch (o[i++]) {\
                case '0': b(); continue;\
                case '1': a(); continue;\
            } break; }";
        assert_eq!(unflatten(source), js("a(); b();"));
    }

    #[test]
    fn test_lexical_bodies_stay_scoped() {
        let source = "var o = '1|0'.split('|'), i = 0;\
            while (true) { switch (o[i++]) {\
                case '0': use(x); continue;\
                case '1': let x = 1; continue;\
            } break; }\
            after();";
        assert_eq!(
            unflatten(source),
            js("{ let x = 1; use(x); } after();")
        );
    }

    #[test]
    fn test_rejects_unsafe_loops() {
        // Counter read elsewhere
        let shared = "var o = '0|1'.split('|'), i = 0;\
            while (true) { switch (o[i++]) { case '0': a(i); continue; case '1': b(); continue; } break; }";
        assert_eq!(unflatten(shared), js(shared));

        // `break` inside a case leaves the switch, not a statement list
        let breaking = "var o = '0|1'.split('|'), i = 0;\
            while (true) { switch (o[i++]) { case '0': if (a) break; continue; case '1': b(); continue; } break; }";
        assert_eq!(unflatten(breaking), js(breaking));

        // Fall-through between cases
        let falling = "var o = '0|1'.split('|'), i = 0;\
            while (true) { switch (o[i++]) { case '0': a(); case '1': b(); continue; } break; }";
        assert_eq!(unflatten(falling), js(falling));
    }

    #[test]
    fn test_nested_loops_keep_their_jumps() {
        let source = "var o = '0|1'.split('|'), i = 0;\
            while (true) { switch (o[i++]) {\
                case '0': for (;;) { if (a()) break; } continue;\
                case '1': b(); continue;\
            } break; }";
        assert_eq!(
            unflatten(source),
            js("for (;;) { if (a()) break; } b();")
        );
    }

    #[test]
    fn test_reports_findings() {
        let (_, findings) = run_pass_detailed(
            TransformerKind::ControlFlow,
            serde_json::Value::Null,
            "var o = '0'.split('|'), i = 0; while (true) { switch (o[i++]) { case '0': a(); continue; } break; }",
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].technique, "control-flow-flattening");
        assert_eq!(findings[0].occurrences, 1);
    }
}
