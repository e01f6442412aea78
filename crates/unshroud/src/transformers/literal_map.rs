//! Inlining of constant lookup objects.
//!
//! Obfuscators move literals into an object and read them back by key:
//!
//! ```js
//! var _0x1 = { 'abc': 'log', 'def': 0x2 };
//! console[_0x1.abc](_0x1['def']);
//! ```
//!
//! When such an object is only ever read through static keys, each read of
//! a literal-valued key is replaced by the literal. The object itself is
//! removed once nothing refers to it.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use swc_common::Spanned;
use swc_ecma_ast::{
    AssignExpr, AssignTarget, Decl, ExportDecl, Expr, Id, Ident, Lit, MemberExpr, MemberProp,
    ObjectLit, Pat, Program, Prop, PropOrSpread, SimpleAssignTarget, ThisExpr, UnaryExpr, UnaryOp,
    UpdateExpr, VarDeclarator,
};
use swc_ecma_visit::{Visit, VisitMut, VisitMutWith, VisitWith};

use super::scope::{count_references, remove_declarations, resolve_scopes};
use super::utils::{is_pure, member_key, num_value, prop_name_key, unparen};
use crate::context::{Context, Obfuscation};
use crate::error::TransformResult;
use crate::transformer::{Transformer, TransformerKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LiteralMapOptions {
    /// Remove lookup objects that have no references left
    pub remove_unused: bool,
}

impl Default for LiteralMapOptions {
    fn default() -> Self {
        Self {
            remove_unused: true,
        }
    }
}

#[derive(Debug)]
pub struct LiteralMap {
    options: LiteralMapOptions,
}

impl LiteralMap {
    pub fn new(options: LiteralMapOptions) -> Self {
        Self { options }
    }
}

impl Transformer for LiteralMap {
    fn name(&self) -> &str {
        TransformerKind::LiteralMap.name()
    }

    fn transform(&self, context: &mut Context) -> TransformResult<()> {
        let remove_unused = self.options.remove_unused;
        let (inlined, removed) = resolve_scopes(&mut context.ast, |program, _| {
            let maps = lookup_objects(&*program);
            if maps.is_empty() {
                return (0, 0);
            }

            let mut inliner = Inliner {
                maps: &maps,
                inlined: 0,
            };
            program.visit_mut_with(&mut inliner);
            let inlined = inliner.inlined;

            let removed = if remove_unused {
                let counts = count_references(&*program);
                let unused: FxHashSet<Id> = maps
                    .iter()
                    .filter(|(id, map)| map.pure && counts.get(*id) == Some(&1))
                    .map(|(id, _)| id.clone())
                    .collect();
                remove_declarations(program, &unused)
            } else {
                0
            };
            (inlined, removed)
        });

        context.report(Obfuscation::new(self.name(), "literal-map-lookups", inlined));
        context.report(Obfuscation::new(self.name(), "literal-map-objects", removed));
        Ok(())
    }
}

/// A lookup object bound to a single variable
pub(super) struct MapObject {
    pub values: FxHashMap<String, Box<Expr>>,
    /// Every value can be dropped without observable effect
    pub pure: bool,
    /// Used in a way that may read a missing key or change the object
    escapes: bool,
}

/// Lookup objects only ever read through static, known keys. Must run on a
/// resolved program.
pub(super) fn lookup_objects(program: &Program) -> FxHashMap<Id, MapObject> {
    let mut maps = find_maps(program);
    if !maps.is_empty() {
        program.visit_with(&mut UsageChecker { maps: &mut maps });
        maps.retain(|_, map| !map.escapes);
    }
    maps
}

/// Static keys and their values; `None` for anything but plain
/// `key: value` properties with distinct keys
fn static_entries(object: &ObjectLit) -> Option<FxHashMap<String, Box<Expr>>> {
    let mut values = FxHashMap::default();
    for prop in &object.props {
        let PropOrSpread::Prop(prop) = prop else {
            return None;
        };
        let Prop::KeyValue(key_value) = &**prop else {
            return None;
        };
        let key = prop_name_key(&key_value.key)?;
        if values.insert(key, key_value.value.clone()).is_some() {
            return None;
        }
    }
    Some(values)
}

/// Methods reading `this` could mutate the object when called through it
fn uses_this(values: &FxHashMap<String, Box<Expr>>) -> bool {
    struct Finder(bool);
    impl Visit for Finder {
        fn visit_this_expr(&mut self, _: &ThisExpr) {
            self.0 = true;
        }
    }

    let mut finder = Finder(false);
    for value in values.values() {
        value.visit_with(&mut finder);
    }
    finder.0
}

/// Whether a value can stand in for the lookup
fn is_inlineable(value: &Expr) -> bool {
    match unparen(value) {
        Expr::Lit(Lit::Regex(_) | Lit::JSXText(_)) => false,
        Expr::Lit(_) => true,
        Expr::Unary(UnaryExpr {
            op: UnaryOp::Void,
            arg,
            ..
        }) => matches!(**arg, Expr::Lit(Lit::Num(_))),
        other => num_value(other).is_some(),
    }
}

/// Variables initialised with a lookup object, declared exactly once
fn find_maps(program: &Program) -> FxHashMap<Id, MapObject> {
    #[derive(Default)]
    struct Finder {
        maps: FxHashMap<Id, MapObject>,
        declarations: FxHashMap<Id, usize>,
        exported: FxHashSet<Id>,
    }

    impl Visit for Finder {
        fn visit_var_declarator(&mut self, decl: &VarDeclarator) {
            decl.visit_children_with(self);
            let Pat::Ident(binding) = &decl.name else {
                return;
            };
            let id = binding.id.to_id();
            *self.declarations.entry(id.clone()).or_default() += 1;

            if let Some(init) = &decl.init
                && let Expr::Object(object) = unparen(init)
                && let Some(values) = static_entries(object)
                && !uses_this(&values)
            {
                let pure = values.values().all(|value| is_pure(value));
                self.maps.insert(
                    id,
                    MapObject {
                        values,
                        pure,
                        escapes: false,
                    },
                );
            }
        }

        fn visit_export_decl(&mut self, export: &ExportDecl) {
            if let Decl::Var(var) = &export.decl {
                for decl in &var.decls {
                    if let Pat::Ident(binding) = &decl.name {
                        self.exported.insert(binding.id.to_id());
                    }
                }
            }
            export.visit_children_with(self);
        }
    }

    let mut finder = Finder::default();
    program.visit_with(&mut finder);

    let Finder {
        mut maps,
        declarations,
        exported,
    } = finder;
    maps.retain(|id, _| declarations.get(id) == Some(&1) && !exported.contains(id));
    maps
}

/// Marks every map used other than through a static read of a known key
struct UsageChecker<'a> {
    maps: &'a mut FxHashMap<Id, MapObject>,
}

impl UsageChecker<'_> {
    fn map_of(&mut self, expr: &Expr) -> Option<&mut MapObject> {
        match unparen(expr) {
            Expr::Ident(ident) => self.maps.get_mut(&ident.to_id()),
            _ => None,
        }
    }

    /// Mark the map `expr` reads from, if any
    fn escape_member(&mut self, expr: &Expr) {
        if let Expr::Member(member) = unparen(expr)
            && let Some(map) = self.map_of(&member.obj)
        {
            map.escapes = true;
        }
    }
}

impl Visit for UsageChecker<'_> {
    fn visit_var_declarator(&mut self, decl: &VarDeclarator) {
        if let Pat::Ident(binding) = &decl.name
            && self.maps.contains_key(&binding.id.to_id())
        {
            decl.init.visit_with(self);
            return;
        }
        decl.visit_children_with(self);
    }

    fn visit_member_expr(&mut self, member: &MemberExpr) {
        if let Some(map) = self.map_of(&member.obj) {
            let known = member_key(&member.prop).is_some_and(|key| map.values.contains_key(key));
            if !known {
                map.escapes = true;
            }
            if let MemberProp::Computed(computed) = &member.prop {
                computed.visit_with(self);
            }
            return;
        }
        member.visit_children_with(self);
    }

    fn visit_assign_expr(&mut self, assign: &AssignExpr) {
        if let AssignTarget::Simple(SimpleAssignTarget::Member(member)) = &assign.left
            && let Some(map) = self.map_of(&member.obj)
        {
            map.escapes = true;
        }
        assign.visit_children_with(self);
    }

    fn visit_update_expr(&mut self, update: &UpdateExpr) {
        self.escape_member(&update.arg);
        update.visit_children_with(self);
    }

    fn visit_unary_expr(&mut self, unary: &UnaryExpr) {
        if unary.op == UnaryOp::Delete {
            self.escape_member(&unary.arg);
        }
        unary.visit_children_with(self);
    }

    fn visit_pat(&mut self, pat: &Pat) {
        if let Pat::Expr(expr) = pat {
            self.escape_member(expr);
        }
        pat.visit_children_with(self);
    }

    fn visit_ident(&mut self, ident: &Ident) {
        if let Some(map) = self.maps.get_mut(&ident.to_id()) {
            map.escapes = true;
        }
    }
}

struct Inliner<'a> {
    maps: &'a FxHashMap<Id, MapObject>,
    inlined: usize,
}

impl VisitMut for Inliner<'_> {
    fn visit_mut_expr(&mut self, expr: &mut Expr) {
        expr.visit_mut_children_with(self);

        let Expr::Member(member) = expr else {
            return;
        };
        let Expr::Ident(object) = unparen(&member.obj) else {
            return;
        };
        let Some(value) = self
            .maps
            .get(&object.to_id())
            .and_then(|map| map.values.get(member_key(&member.prop)?))
            .filter(|value| is_inlineable(value))
        else {
            return;
        };

        let span = member.span();
        let mut value = *value.clone();
        value.visit_mut_with(&mut SpanSetter(span));
        *expr = value;
        self.inlined += 1;
    }
}

/// Gives an inlined literal the position of the lookup it replaces
struct SpanSetter(swc_common::Span);

impl VisitMut for SpanSetter {
    fn visit_mut_lit(&mut self, lit: &mut Lit) {
        match lit {
            Lit::Str(s) => s.span = self.0,
            Lit::Num(n) => n.span = self.0,
            Lit::Bool(b) => b.span = self.0,
            Lit::Null(n) => n.span = self.0,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::transformer::TransformerKind;
    use crate::transformers::test_utils::{js, run_pass, run_pass_detailed, run_pass_with};

    fn literal_map(source: &str) -> String {
        run_pass(TransformerKind::LiteralMap, source)
    }

    #[test]
    fn test_inlines_and_removes() {
        assert_eq!(
            literal_map("var m = { 'abc': 'log', def: 0x2 }; console[m.abc](m['def']);"),
            js("console['log'](0x2);")
        );
    }

    #[test]
    fn test_keeps_function_values() {
        assert_eq!(
            literal_map("var m = { a: 'x', b: function (c) { return c; } }; m.b(m.a);"),
            js("var m = { a: 'x', b: function (c) { return c; } }; m.b('x');")
        );
    }

    #[test]
    fn test_escaping_objects_untouched() {
        let writes = "var m = { a: 1 }; m.a = 2; f(m.a);";
        assert_eq!(literal_map(writes), js(writes));

        let bare = "var m = { a: 1 }; f(m, m.a);";
        assert_eq!(literal_map(bare), js(bare));

        let missing = "var m = { a: 1 }; f(m.b, m.a);";
        assert_eq!(literal_map(missing), js(missing));

        let deleted = "var m = { a: 1 }; delete m.a; f(m.a);";
        assert_eq!(literal_map(deleted), js(deleted));
    }

    #[test]
    fn test_redeclared_untouched() {
        let source = "var m = { a: 1 }; var m = { a: 2 }; f(m.a);";
        assert_eq!(literal_map(source), js(source));
    }

    #[test]
    fn test_shadowing_respected() {
        assert_eq!(
            literal_map("var m = { a: 1 }; function g(m) { return m.a; } f(m.a);"),
            js("function g(m) { return m.a; } f(1);")
        );
    }

    #[test]
    fn test_keep_unused_when_disabled() {
        let output = run_pass_with(
            TransformerKind::LiteralMap,
            json!({ "remove_unused": false }),
            "var m = { a: 1 }; f(m.a);",
        );
        assert_eq!(output, js("var m = { a: 1 }; f(1);"));
    }

    #[test]
    fn test_reports_findings() {
        let (_, findings) = run_pass_detailed(
            TransformerKind::LiteralMap,
            serde_json::Value::Null,
            "var m = { a: 1, b: 2 }; f(m.a, m.b, m.a);",
        );
        let lookups = findings
            .iter()
            .find(|finding| finding.technique == "literal-map-lookups")
            .expect("lookups reported");
        assert_eq!(lookups.occurrences, 3);
    }
}
