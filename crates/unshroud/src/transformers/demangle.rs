//! Proxy function inlining.
//!
//! Obfuscators hide operators and calls behind tiny wrapper functions,
//! usually grouped in lookup objects:
//!
//! ```js
//! var _0x2 = { 'abc': function (a, b) { return a + b; }, 'def': function (a, b) { return a(b); } };
//! _0x2.def(alert, _0x2['abc'](1, x));
//! ```
//!
//! A call to such a wrapper is replaced by its body with the arguments
//! substituted, as long as evaluation order is kept. Wrappers with no calls
//! left are removed.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use swc_common::Span;
use swc_ecma_ast::{
    ArrowExpr, AssignExpr, AssignTarget, AwaitExpr, BinExpr, BinaryOp, BindingIdent,
    BlockStmtOrExpr, Class, CondExpr, Decl, ExportDecl, Expr, ExprOrSpread, FnDecl, ForHead,
    ForInStmt, ForOfStmt, Function, Id, Ident, Lit, MetaPropExpr, OptChainExpr, Pat, Program,
    Prop, SimpleAssignTarget, Stmt, SuperPropExpr, ThisExpr, UpdateExpr, VarDeclarator,
    YieldExpr,
};
use swc_ecma_visit::{Visit, VisitMut, VisitMutWith, VisitWith};

use super::literal_map::lookup_objects;
use super::scope::{count_references, remove_declarations, resolve_scopes, substitute};
use super::utils::{is_pure, member_key, num_value, undefined_expr, unparen};
use crate::context::{Context, Obfuscation};
use crate::error::TransformResult;
use crate::transformer::{Transformer, TransformerKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DemangleOptions {
    /// Remove wrappers once every call has been inlined
    pub remove_unused: bool,
    /// Inlining rounds; each round can expose calls nested in wrapper bodies
    pub max_rounds: usize,
}

impl Default for DemangleOptions {
    fn default() -> Self {
        Self {
            remove_unused: true,
            max_rounds: 8,
        }
    }
}

#[derive(Debug)]
pub struct Demangle {
    options: DemangleOptions,
}

impl Demangle {
    pub fn new(options: DemangleOptions) -> Self {
        Self { options }
    }
}

impl Transformer for Demangle {
    fn name(&self) -> &str {
        TransformerKind::Demangle.name()
    }

    fn transform(&self, context: &mut Context) -> TransformResult<()> {
        let options = self.options.clone();
        let (inlined, removed) = resolve_scopes(&mut context.ast, |program, _| {
            let proxies = Proxies::collect(&*program);
            if proxies.is_empty() {
                return (0, 0);
            }

            let mut inliner = CallInliner {
                proxies: &proxies,
                inlined: 0,
                used: FxHashSet::default(),
            };
            for round in 0..options.max_rounds {
                let before = inliner.inlined;
                program.visit_mut_with(&mut inliner);
                tracing::trace!(round, inlined = inliner.inlined - before, "demangle round");
                if inliner.inlined == before {
                    break;
                }
            }

            let removed = if options.remove_unused {
                let counts = count_references(&*program);
                let unused: FxHashSet<Id> = inliner
                    .used
                    .iter()
                    .filter(|id| counts.get(*id) == Some(&1) && proxies.removable.contains(*id))
                    .cloned()
                    .collect();
                remove_declarations(program, &unused)
            } else {
                0
            };
            (inliner.inlined, removed)
        });

        context.report(Obfuscation::new(self.name(), "proxy-calls", inlined));
        context.report(Obfuscation::new(self.name(), "proxy-functions", removed));
        Ok(())
    }
}

/// A wrapper whose body is a single expression over its parameters
#[derive(Debug, Clone)]
struct Proxy {
    params: Vec<Id>,
    body: Box<Expr>,
    /// Parameter index of every parameter reference, in evaluation order
    uses: Vec<usize>,
    /// The body has operators that may skip evaluating an operand
    conditional: bool,
}

/// Literals that may be duplicated or dropped freely
fn is_literal(expr: &Expr) -> bool {
    match unparen(expr) {
        Expr::Lit(lit) => !matches!(lit, Lit::Regex(_)),
        other => num_value(other).is_some(),
    }
}

impl Proxy {
    /// The body with `args` substituted, or `None` when the substitution
    /// could change what is evaluated or in which order
    fn inline(&self, args: &[ExprOrSpread], span: Span) -> Option<Expr> {
        if args.iter().any(|arg| arg.spread.is_some()) {
            return None;
        }
        let arity = self.params.len();
        if args.iter().skip(arity).any(|arg| !is_pure(&arg.expr)) {
            return None;
        }

        let simple = args
            .iter()
            .all(|arg| is_literal(&arg.expr) || matches!(unparen(&arg.expr), Expr::Ident(_)));
        for (index, arg) in args.iter().take(arity).enumerate() {
            let used = self.uses.contains(&index);
            if !used && !simple && !is_pure(&arg.expr) {
                return None;
            }
        }
        if !simple {
            if self.conditional {
                return None;
            }
            // Every non-literal argument once, in parameter order
            let mut last = None;
            for (index, arg) in args.iter().take(arity).enumerate() {
                if is_literal(&arg.expr) {
                    continue;
                }
                let positions: Vec<usize> = self
                    .uses
                    .iter()
                    .enumerate()
                    .filter(|(_, param)| **param == index)
                    .map(|(position, _)| position)
                    .collect();
                let [position] = positions.as_slice() else {
                    return None;
                };
                if last.is_some_and(|last| *position < last) {
                    return None;
                }
                last = Some(*position);
            }
        }

        let replacements: FxHashMap<Id, Box<Expr>> = self
            .params
            .iter()
            .enumerate()
            .map(|(index, id)| {
                let value = args
                    .get(index)
                    .map_or_else(|| Box::new(undefined_expr(span)), |arg| arg.expr.clone());
                (id.clone(), value)
            })
            .collect();

        let mut body = self.body.clone();
        substitute(&mut body, &replacements);
        Some(*body)
    }
}

/// Parameters and returned expression of a function made of one `return`
fn function_shape(function: &Function) -> Option<(Vec<Id>, Box<Expr>)> {
    if function.is_async || function.is_generator || !function.decorators.is_empty() {
        return None;
    }
    let params = function
        .params
        .iter()
        .map(|param| simple_param(&param.pat))
        .collect::<Option<Vec<_>>>()?;
    let body = function.body.as_ref()?;
    let [Stmt::Return(ret)] = body.stmts.as_slice() else {
        return None;
    };
    Some((params, ret.arg.clone()?))
}

fn arrow_shape(arrow: &ArrowExpr) -> Option<(Vec<Id>, Box<Expr>)> {
    if arrow.is_async || arrow.is_generator {
        return None;
    }
    let params = arrow
        .params
        .iter()
        .map(simple_param)
        .collect::<Option<Vec<_>>>()?;
    let body = match &*arrow.body {
        BlockStmtOrExpr::Expr(expr) => expr.clone(),
        BlockStmtOrExpr::BlockStmt(block) => match block.stmts.as_slice() {
            [Stmt::Return(ret)] => ret.arg.clone()?,
            _ => return None,
        },
    };
    Some((params, body))
}

fn simple_param(pat: &Pat) -> Option<Id> {
    match pat {
        Pat::Ident(binding) => Some(binding.id.to_id()),
        _ => None,
    }
}

fn expr_shape(expr: &Expr) -> Option<(Vec<Id>, Box<Expr>)> {
    match unparen(expr) {
        Expr::Fn(fn_expr) => function_shape(&fn_expr.function),
        Expr::Arrow(arrow) => arrow_shape(arrow),
        _ => None,
    }
}

/// Checks that a body only refers to its parameters and other wrapper
/// holders, recording parameter uses in order
struct BodyAnalyzer<'a> {
    params: &'a [Id],
    holders: &'a FxHashSet<Id>,
    uses: Vec<usize>,
    conditional: bool,
    valid: bool,
}

impl Visit for BodyAnalyzer<'_> {
    fn visit_ident(&mut self, ident: &Ident) {
        let id = ident.to_id();
        match self.params.iter().position(|param| *param == id) {
            Some(index) => self.uses.push(index),
            None if self.holders.contains(&id) => {}
            None => self.valid = false,
        }
    }

    fn visit_bin_expr(&mut self, bin: &BinExpr) {
        if matches!(
            bin.op,
            BinaryOp::LogicalAnd | BinaryOp::LogicalOr | BinaryOp::NullishCoalescing
        ) {
            self.conditional = true;
        }
        bin.visit_children_with(self);
    }

    fn visit_cond_expr(&mut self, cond: &CondExpr) {
        self.conditional = true;
        cond.visit_children_with(self);
    }

    fn visit_opt_chain_expr(&mut self, chain: &OptChainExpr) {
        self.conditional = true;
        chain.visit_children_with(self);
    }

    fn visit_prop(&mut self, prop: &Prop) {
        // Shorthand keys cannot take a substituted argument
        if matches!(prop, Prop::Shorthand(_)) {
            self.valid = false;
        }
        prop.visit_children_with(self);
    }

    fn visit_function(&mut self, _: &Function) {
        self.valid = false;
    }

    fn visit_arrow_expr(&mut self, _: &ArrowExpr) {
        self.valid = false;
    }

    fn visit_class(&mut self, _: &Class) {
        self.valid = false;
    }

    fn visit_this_expr(&mut self, _: &ThisExpr) {
        self.valid = false;
    }

    fn visit_super_prop_expr(&mut self, _: &SuperPropExpr) {
        self.valid = false;
    }

    fn visit_meta_prop_expr(&mut self, _: &MetaPropExpr) {
        self.valid = false;
    }

    fn visit_yield_expr(&mut self, _: &YieldExpr) {
        self.valid = false;
    }

    fn visit_await_expr(&mut self, _: &AwaitExpr) {
        self.valid = false;
    }
}

fn analyze(params: Vec<Id>, body: Box<Expr>, holders: &FxHashSet<Id>) -> Option<Proxy> {
    let distinct: FxHashSet<&Id> = params.iter().collect();
    if distinct.len() != params.len() {
        return None;
    }

    let mut analyzer = BodyAnalyzer {
        params: &params,
        holders,
        uses: Vec::new(),
        conditional: false,
        valid: true,
    };
    body.visit_with(&mut analyzer);
    if !analyzer.valid {
        return None;
    }

    let BodyAnalyzer {
        uses, conditional, ..
    } = analyzer;
    Some(Proxy {
        params,
        body,
        uses,
        conditional,
    })
}

/// Every wrapper in the program, by holder
#[derive(Default)]
struct Proxies {
    functions: FxHashMap<Id, Proxy>,
    objects: FxHashMap<Id, FxHashMap<String, Proxy>>,
    /// Holders whose declaration can go once unreferenced
    removable: FxHashSet<Id>,
}

impl Proxies {
    fn is_empty(&self) -> bool {
        self.functions.is_empty() && self.objects.is_empty()
    }

    fn collect(program: &Program) -> Self {
        let mut finder = FunctionFinder::default();
        program.visit_with(&mut finder);
        let FunctionFinder {
            shapes,
            declarations,
            written,
            exported,
        } = finder;
        let shapes: FxHashMap<Id, (Vec<Id>, Box<Expr>)> = shapes
            .into_iter()
            .filter(|(id, _)| declarations.get(id) == Some(&1) && !written.contains(id))
            .collect();

        let maps = lookup_objects(program);

        let mut holders: FxHashSet<Id> = shapes.keys().cloned().collect();
        holders.extend(maps.keys().cloned());

        let mut proxies = Proxies::default();
        for (id, (params, body)) in shapes {
            if let Some(proxy) = analyze(params, body, &holders) {
                if !exported.contains(&id) {
                    proxies.removable.insert(id.clone());
                }
                proxies.functions.insert(id, proxy);
            }
        }
        for (id, map) in maps {
            let wrappers: FxHashMap<String, Proxy> = map
                .values
                .iter()
                .filter_map(|(key, value)| {
                    let (params, body) = expr_shape(value)?;
                    Some((key.clone(), analyze(params, body, &holders)?))
                })
                .collect();
            if wrappers.is_empty() {
                continue;
            }
            if map.pure {
                proxies.removable.insert(id.clone());
            }
            proxies.objects.insert(id, wrappers);
        }
        proxies
    }
}

/// Function-valued bindings and what happens to them
#[derive(Default)]
struct FunctionFinder {
    shapes: FxHashMap<Id, (Vec<Id>, Box<Expr>)>,
    declarations: FxHashMap<Id, usize>,
    written: FxHashSet<Id>,
    exported: FxHashSet<Id>,
}

/// Names bound by a pattern
struct PatternNames<'a>(&'a mut FxHashSet<Id>);

impl Visit for PatternNames<'_> {
    fn visit_binding_ident(&mut self, binding: &BindingIdent) {
        self.0.insert(binding.id.to_id());
    }
}

impl Visit for FunctionFinder {
    fn visit_fn_decl(&mut self, decl: &FnDecl) {
        let id = decl.ident.to_id();
        *self.declarations.entry(id.clone()).or_default() += 1;
        if let Some(shape) = function_shape(&decl.function) {
            self.shapes.insert(id, shape);
        }
        decl.visit_children_with(self);
    }

    fn visit_var_declarator(&mut self, decl: &VarDeclarator) {
        if let Pat::Ident(binding) = &decl.name {
            let id = binding.id.to_id();
            *self.declarations.entry(id.clone()).or_default() += 1;
            if let Some(shape) = decl.init.as_deref().and_then(expr_shape) {
                self.shapes.insert(id, shape);
            }
        }
        decl.visit_children_with(self);
    }

    fn visit_assign_expr(&mut self, assign: &AssignExpr) {
        match &assign.left {
            AssignTarget::Simple(SimpleAssignTarget::Ident(binding)) => {
                self.written.insert(binding.id.to_id());
            }
            AssignTarget::Pat(pat) => pat.visit_with(&mut PatternNames(&mut self.written)),
            _ => {}
        }
        assign.visit_children_with(self);
    }

    fn visit_update_expr(&mut self, update: &UpdateExpr) {
        if let Expr::Ident(ident) = unparen(&update.arg) {
            self.written.insert(ident.to_id());
        }
        update.visit_children_with(self);
    }

    fn visit_for_in_stmt(&mut self, stmt: &ForInStmt) {
        self.write_head(&stmt.left);
        stmt.visit_children_with(self);
    }

    fn visit_for_of_stmt(&mut self, stmt: &ForOfStmt) {
        self.write_head(&stmt.left);
        stmt.visit_children_with(self);
    }

    fn visit_export_decl(&mut self, export: &ExportDecl) {
        match &export.decl {
            Decl::Fn(decl) => {
                self.exported.insert(decl.ident.to_id());
            }
            Decl::Var(var) => {
                for decl in &var.decls {
                    decl.name.visit_with(&mut PatternNames(&mut self.exported));
                }
            }
            _ => {}
        }
        export.visit_children_with(self);
    }
}

impl FunctionFinder {
    fn write_head(&mut self, head: &ForHead) {
        head.visit_with(&mut PatternNames(&mut self.written));
    }
}

struct CallInliner<'a> {
    proxies: &'a Proxies,
    inlined: usize,
    /// Holders with at least one inlined call
    used: FxHashSet<Id>,
}

impl CallInliner<'_> {
    fn resolve(&self, callee: &Expr) -> Option<(Id, &Proxy)> {
        match unparen(callee) {
            Expr::Ident(ident) => {
                let id = ident.to_id();
                let proxy = self.proxies.functions.get(&id)?;
                Some((id, proxy))
            }
            Expr::Member(member) => {
                let Expr::Ident(object) = unparen(&member.obj) else {
                    return None;
                };
                let id = object.to_id();
                let proxy = self.proxies.objects.get(&id)?.get(member_key(&member.prop)?)?;
                Some((id, proxy))
            }
            _ => None,
        }
    }
}

impl VisitMut for CallInliner<'_> {
    fn visit_mut_expr(&mut self, expr: &mut Expr) {
        expr.visit_mut_children_with(self);

        let Expr::Call(call) = expr else {
            return;
        };
        let Some(callee) = call.callee.as_expr() else {
            return;
        };
        let Some((holder, inlined)) = self
            .resolve(callee)
            .and_then(|(holder, proxy)| Some((holder, proxy.inline(&call.args, call.span)?)))
        else {
            return;
        };

        *expr = inlined;
        self.inlined += 1;
        self.used.insert(holder);
    }
}
