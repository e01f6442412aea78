//! Binding resolution for the passes that need to tell variables apart.
//!
//! Passes call [`resolve_scopes`], which runs SWC's resolver so every
//! [`Ident`] carries a [`SyntaxContext`] unique to its binding. Two idents
//! refer to the same variable exactly when their [`Id`]s are equal.
//! Contexts are stripped again afterwards, so the resolved state never
//! leaks into later passes.

use rustc_hash::{FxHashMap, FxHashSet};
use swc_common::{GLOBALS, Globals, Mark, SyntaxContext};
use swc_ecma_ast::{
    ArrowExpr, BlockStmt, CallExpr, Class, Constructor, Decl, Expr, ForStmt, Function, Id, Ident,
    ModuleItem, NewExpr, OptCall, Pat, Program, Stmt, TaggedTpl, VarDecl, VarDeclOrExpr,
};
use swc_ecma_transforms_base::resolver;
use swc_ecma_visit::{Visit, VisitMut, VisitMutWith, VisitWith};

use super::utils::{StmtLike, empty_stmt};

/// Contexts the resolver gives to free and top-level identifiers
#[derive(Debug, Clone, Copy)]
pub struct Scopes {
    unresolved: SyntaxContext,
    top_level: SyntaxContext,
}

impl Scopes {
    /// Not declared anywhere in the program (`console`, `window`)
    pub fn is_unresolved(&self, id: &Id) -> bool {
        id.1 == self.unresolved
    }

    /// Declared at the top level of the program
    pub fn is_top_level(&self, id: &Id) -> bool {
        id.1 == self.top_level
    }
}

/// Resolve bindings, run `f` over the resolved program, then strip the
/// contexts again
pub fn resolve_scopes<R>(program: &mut Program, f: impl FnOnce(&mut Program, Scopes) -> R) -> R {
    program.visit_mut_with(&mut ContextStripper);

    let result = GLOBALS.set(&Globals::default(), || {
        let unresolved_mark = Mark::new();
        let top_level_mark = Mark::new();
        program.visit_mut_with(&mut resolver(unresolved_mark, top_level_mark, false));

        let scopes = Scopes {
            unresolved: SyntaxContext::empty().apply_mark(unresolved_mark),
            top_level: SyntaxContext::empty().apply_mark(top_level_mark),
        };
        f(program, scopes)
    });

    program.visit_mut_with(&mut ContextStripper);
    result
}

/// Resets every syntax context, so the resolver treats the tree as fresh
struct ContextStripper;

macro_rules! strip {
    ($($method:ident: $ty:ty),* $(,)?) => {
        $(
            fn $method(&mut self, node: &mut $ty) {
                node.ctxt = SyntaxContext::empty();
                node.visit_mut_children_with(self);
            }
        )*
    };
}

impl VisitMut for ContextStripper {
    strip!(
        visit_mut_ident: Ident,
        visit_mut_block_stmt: BlockStmt,
        visit_mut_function: Function,
        visit_mut_arrow_expr: ArrowExpr,
        visit_mut_call_expr: CallExpr,
        visit_mut_new_expr: NewExpr,
        visit_mut_var_decl: VarDecl,
        visit_mut_class: Class,
        visit_mut_constructor: Constructor,
        visit_mut_opt_call: OptCall,
        visit_mut_tagged_tpl: TaggedTpl,
    );
}

/// Number of times each binding appears, declarations included
pub fn count_references<N: VisitWith<ReferenceCounter>>(node: &N) -> FxHashMap<Id, usize> {
    let mut counter = ReferenceCounter::default();
    node.visit_with(&mut counter);
    counter.counts
}

#[derive(Default)]
pub struct ReferenceCounter {
    counts: FxHashMap<Id, usize>,
}

impl Visit for ReferenceCounter {
    fn visit_ident(&mut self, ident: &Ident) {
        *self.counts.entry(ident.to_id()).or_default() += 1;
    }
}

/// Delete the declarations of `ids` (variable declarators and function
/// declarations), returning how many were removed
pub fn remove_declarations(program: &mut Program, ids: &FxHashSet<Id>) -> usize {
    if ids.is_empty() {
        return 0;
    }
    let mut remover = DeclarationRemover { ids, removed: 0 };
    program.visit_mut_with(&mut remover);
    remover.removed
}

struct DeclarationRemover<'a> {
    ids: &'a FxHashSet<Id>,
    removed: usize,
}

impl DeclarationRemover<'_> {
    fn clean<T: StmtLike>(&mut self, items: &mut Vec<T>) {
        let ids = self.ids;
        let mut removed = 0;
        items.retain(|item| match item.as_stmt() {
            Some(Stmt::Empty(_)) => false,
            Some(Stmt::Decl(Decl::Fn(function))) if ids.contains(&function.ident.to_id()) => {
                removed += 1;
                false
            }
            _ => true,
        });
        self.removed += removed;
    }
}

impl VisitMut for DeclarationRemover<'_> {
    fn visit_mut_var_decl(&mut self, var: &mut VarDecl) {
        var.visit_mut_children_with(self);
        let before = var.decls.len();
        let ids = self.ids;
        var.decls.retain(|decl| match &decl.name {
            Pat::Ident(binding) => !ids.contains(&binding.id.to_id()),
            _ => true,
        });
        self.removed += before - var.decls.len();
    }

    fn visit_mut_stmt(&mut self, stmt: &mut Stmt) {
        stmt.visit_mut_children_with(self);
        if let Stmt::Decl(Decl::Var(var)) = stmt
            && var.decls.is_empty()
        {
            *stmt = empty_stmt();
        }
    }

    fn visit_mut_for_stmt(&mut self, for_stmt: &mut ForStmt) {
        for_stmt.visit_mut_children_with(self);
        if let Some(VarDeclOrExpr::VarDecl(var)) = &for_stmt.init
            && var.decls.is_empty()
        {
            for_stmt.init = None;
        }
    }

    fn visit_mut_stmts(&mut self, stmts: &mut Vec<Stmt>) {
        stmts.visit_mut_children_with(self);
        self.clean(stmts);
    }

    fn visit_mut_module_items(&mut self, items: &mut Vec<ModuleItem>) {
        items.visit_mut_children_with(self);
        self.clean(items);
    }
}

/// Replace references to the given bindings with copies of their values
pub fn substitute(expr: &mut Expr, replacements: &FxHashMap<Id, Box<Expr>>) {
    struct Substituter<'a>(&'a FxHashMap<Id, Box<Expr>>);

    impl VisitMut for Substituter<'_> {
        fn visit_mut_expr(&mut self, expr: &mut Expr) {
            if let Expr::Ident(ident) = expr
                && let Some(value) = self.0.get(&ident.to_id())
            {
                *expr = *value.clone();
                return;
            }
            expr.visit_mut_children_with(self);
        }
    }

    expr.visit_mut_with(&mut Substituter(replacements));
}

/// Every identifier spelling in the program, bound or free
pub fn used_names(program: &Program) -> FxHashSet<String> {
    struct Collector(FxHashSet<String>);

    impl Visit for Collector {
        fn visit_ident(&mut self, ident: &Ident) {
            self.0.insert(ident.sym.to_string());
        }
    }

    let mut collector = Collector(FxHashSet::default());
    program.visit_with(&mut collector);
    collector.0
}

/// Whether the program calls the global `eval` directly; such code can see
/// local names, so they must not change
pub fn has_direct_eval(program: &Program) -> bool {
    struct Finder(bool);

    impl Visit for Finder {
        fn visit_call_expr(&mut self, call: &CallExpr) {
            if let Some(callee) = call.callee.as_expr()
                && let Expr::Ident(ident) = &**callee
                && ident.sym.as_str() == "eval"
            {
                self.0 = true;
            }
            call.visit_children_with(self);
        }
    }

    let mut finder = Finder(false);
    program.visit_with(&mut finder);
    finder.0
}

#[cfg(test)]
mod tests {
    use swc_ecma_ast::Program;

    use super::*;
    use crate::config::SourceType;
    use crate::parser::{ParseOptions, parse};

    fn script(source: &str) -> Program {
        let options = ParseOptions::default().with_source_type(SourceType::Script);
        parse(source, &options).expect("parse").program
    }

    #[test]
    fn test_shadowed_bindings_are_distinct() {
        let mut program = script("var a = 1; function f(a) { return a; } a;");
        let counts = resolve_scopes(&mut program, |program, _| count_references(&*program));

        let mut per_binding: Vec<usize> = counts
            .iter()
            .filter(|(id, _)| id.0.as_str() == "a")
            .map(|(_, count)| *count)
            .collect();
        per_binding.sort_unstable();
        assert_eq!(per_binding, vec![2, 2]);
    }

    #[test]
    fn test_free_and_top_level() {
        let mut program = script("var a = 1; console.log(a);");
        resolve_scopes(&mut program, |program, scopes| {
            let counts = count_references(&*program);
            let console = counts.keys().find(|id| id.0.as_str() == "console").expect("console");
            let a = counts.keys().find(|id| id.0.as_str() == "a").expect("a");
            assert!(scopes.is_unresolved(console));
            assert!(scopes.is_top_level(a));
            assert!(!scopes.is_unresolved(a));
        });
    }

    #[test]
    fn test_contexts_are_stripped() {
        let mut program = script("function f(a) { return a; }");
        resolve_scopes(&mut program, |_, _| ());
        let counts = count_references(&program);
        assert!(counts.keys().all(|id| id.1 == SyntaxContext::empty()));
    }

    #[test]
    fn test_direct_eval() {
        assert!(has_direct_eval(&script("function f() { eval('x'); }")));
        assert!(!has_direct_eval(&script("window.eval('x');")));
    }

    #[test]
    fn test_remove_declarations() {
        let mut program = script("var a = 1, b = 2; function c() {} for (var d = 0;;) {} e();");
        let removed = resolve_scopes(&mut program, |program, _| {
            let ids: FxHashSet<Id> = count_references(&*program)
                .into_keys()
                .filter(|id| matches!(id.0.as_str(), "a" | "c" | "d"))
                .collect();
            remove_declarations(program, &ids)
        });
        assert_eq!(removed, 3);
        let used = used_names(&program);
        assert!(used.contains("b") && used.contains("e"));
        assert!(!used.contains("a") && !used.contains("c") && !used.contains("d"));
    }

    #[test]
    fn test_used_names() {
        let names = used_names(&script("var a = b; function c() {}"));
        assert!(names.contains("a") && names.contains("b") && names.contains("c"));
    }
}
