//! Readable names for mangled bindings.
//!
//! Runs on a freshly parsed tree so binding resolution sees consistent
//! positions. Bindings are visited in source order and each gets a name
//! inferred from how it is declared (`var fs = require("fs")` keeps `fs`,
//! arrays become `arr`, parameters `arg`, ...). New names never collide with
//! any identifier already in the program, so no reference can be captured.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use swc_common::BytePos;
use swc_ecma_ast::{
    ArrowExpr, AssignPat, CatchClause, ClassDecl, ClassExpr, Decl, DefaultDecl, ExportDecl,
    ExportDefaultDecl, ExportSpecifier, Expr, FnDecl, FnExpr, Id, Ident, IdentName,
    ImportSpecifier, KeyValuePatProp, KeyValueProp, Lit, ModuleExportName, NamedExport,
    ObjectPatProp, Param, Pat, Prop, PropName, SetterProp, VarDeclarator, WithStmt,
};
use swc_ecma_visit::{Visit, VisitMut, VisitMutWith, VisitWith};

use super::scope::{has_direct_eval, resolve_scopes, used_names};
use super::utils::{is_identifier_name, is_reserved_word, str_value, unparen};
use crate::context::{Context, Obfuscation};
use crate::error::TransformResult;
use crate::transformer::{Transformer, TransformerKind};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenameOptions {
    /// Only rename `_0x`-style and one or two character names
    pub only_mangled: bool,
}

#[derive(Debug)]
pub struct Rename {
    options: RenameOptions,
}

impl Rename {
    pub fn new(options: RenameOptions) -> Self {
        Self { options }
    }
}

impl Transformer for Rename {
    fn name(&self) -> &str {
        TransformerKind::Rename.name()
    }

    fn transform(&self, context: &mut Context) -> TransformResult<()> {
        if context.hash.is_none() {
            tracing::warn!("renaming a tree with no source hash");
            context.log("Rename: no source hash, positions may not match the text");
        }
        if has_direct_eval(&context.ast) {
            context.log("Rename: direct eval found, names left as they are");
            return Ok(());
        }

        let is_module = context.is_module;
        let only_mangled = self.options.only_mangled;
        let renamed = resolve_scopes(&mut context.ast, |program, scopes| {
            let mut collector = BindingCollector::default();
            program.visit_with(&mut collector);

            let mut bindings: Vec<(Id, Binding)> = collector
                .bindings
                .into_iter()
                .filter(|(id, _)| !collector.fixed.contains(id))
                .filter(|(id, _)| is_module || !scopes.is_top_level(id))
                .filter(|(id, _)| !only_mangled || is_mangled(id.0.as_str()))
                .collect();
            bindings.sort_by(|(a_id, a), (b_id, b)| {
                a.position
                    .cmp(&b.position)
                    .then_with(|| a_id.0.as_str().cmp(b_id.0.as_str()))
            });

            let mut namer = Namer::new(used_names(program));
            let names: FxHashMap<Id, String> = bindings
                .into_iter()
                .map(|(id, binding)| (id, namer.fresh(&binding.hint)))
                .collect();

            program.visit_mut_with(&mut Renamer { names: &names });
            names.len()
        });

        tracing::debug!(hash = ?context.hash, renamed, "bindings renamed");
        context.report(Obfuscation::new(self.name(), "mangled-names", renamed));
        Ok(())
    }
}

/// `_0x3f2a`, `a`, `Ab`
fn is_mangled(name: &str) -> bool {
    let hex = name
        .strip_prefix("_0x")
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_hexdigit()));
    hex || name.chars().count() <= 2
}

/// Variable name for a `require`d module: `"./lib/event-emitter.js"` gives
/// `eventEmitter`
fn module_name(specifier: &str) -> Option<String> {
    let last = specifier.rsplit(['/', ':']).next()?;
    let stem = last.strip_suffix(".js").unwrap_or(last);

    let mut name = String::new();
    for (index, word) in stem
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .enumerate()
    {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            if index == 0 {
                name.push(first);
            } else {
                name.push(first.to_ascii_uppercase());
            }
            name.extend(chars);
        }
    }
    (is_identifier_name(&name) && !is_reserved_word(&name)).then_some(name)
}

/// Name suggested by a declarator's initializer
fn init_hint(init: Option<&Expr>) -> String {
    let Some(init) = init else {
        return "var".to_string();
    };
    let hint = match unparen(init) {
        Expr::Call(call) => {
            let module = call
                .callee
                .as_expr()
                .filter(|callee| matches!(unparen(callee), Expr::Ident(ident) if ident.sym.as_str() == "require"))
                .and_then(|_| call.args.first())
                .and_then(|arg| str_value(&arg.expr))
                .and_then(module_name);
            if let Some(module) = module {
                return module;
            }
            "var"
        }
        Expr::New(new) => {
            if let Expr::Ident(class) = unparen(&new.callee)
                && let Some(name) = lower_first(class.sym.as_str())
            {
                return name;
            }
            "obj"
        }
        Expr::Array(_) => "arr",
        Expr::Object(_) => "obj",
        Expr::Lit(Lit::Str(_)) | Expr::Tpl(_) => "str",
        Expr::Lit(Lit::Num(_)) => "num",
        Expr::Fn(_) | Expr::Arrow(_) => "func",
        Expr::Class(_) => "Class",
        _ => "var",
    };
    hint.to_string()
}

/// `Date` → `date`; `None` for names that are not PascalCase
fn lower_first(name: &str) -> Option<String> {
    let mut chars = name.chars();
    let first = chars.next()?;
    if !first.is_ascii_uppercase() {
        return None;
    }
    let lowered: String = std::iter::once(first.to_ascii_lowercase())
        .chain(chars)
        .collect();
    (!is_reserved_word(&lowered)).then_some(lowered)
}

/// Bindings declared by a pattern
fn pat_bindings<'a>(pat: &'a Pat, out: &mut Vec<&'a Ident>) {
    match pat {
        Pat::Ident(binding) => out.push(&binding.id),
        Pat::Array(array) => {
            for elem in array.elems.iter().flatten() {
                pat_bindings(elem, out);
            }
        }
        Pat::Rest(rest) => pat_bindings(&rest.arg, out),
        Pat::Object(object) => {
            for prop in &object.props {
                match prop {
                    ObjectPatProp::KeyValue(kv) => pat_bindings(&kv.value, out),
                    ObjectPatProp::Assign(assign) => out.push(&assign.key.id),
                    ObjectPatProp::Rest(rest) => pat_bindings(&rest.arg, out),
                }
            }
        }
        Pat::Assign(assign) => pat_bindings(&assign.left, out),
        Pat::Expr(_) | Pat::Invalid(_) => {}
    }
}

#[derive(Debug)]
struct Binding {
    /// Start of the first declaration
    position: BytePos,
    hint: String,
}

/// Every binding declared in the program, plus those that must keep their
/// names (imports, exports and names used inside `with` bodies)
#[derive(Default)]
struct BindingCollector {
    bindings: FxHashMap<Id, Binding>,
    fixed: FxHashSet<Id>,
}

impl BindingCollector {
    fn declare(&mut self, ident: &Ident, hint: &str) {
        let position = ident.span.lo;
        self.bindings
            .entry(ident.to_id())
            .and_modify(|binding| {
                if position < binding.position {
                    binding.position = position;
                }
            })
            .or_insert_with(|| Binding {
                position,
                hint: hint.to_string(),
            });
    }

    fn declare_pat(&mut self, pat: &Pat, hint: &str) {
        let mut idents = Vec::new();
        pat_bindings(pat, &mut idents);
        for ident in idents {
            self.declare(ident, hint);
        }
    }

    fn fix_pat(&mut self, pat: &Pat) {
        let mut idents = Vec::new();
        pat_bindings(pat, &mut idents);
        self.fixed.extend(idents.into_iter().map(Ident::to_id));
    }
}

impl Visit for BindingCollector {
    fn visit_var_declarator(&mut self, decl: &VarDeclarator) {
        let hint = match &decl.name {
            Pat::Ident(_) => init_hint(decl.init.as_deref()),
            _ => "var".to_string(),
        };
        self.declare_pat(&decl.name, &hint);
        decl.visit_children_with(self);
    }

    fn visit_fn_decl(&mut self, decl: &FnDecl) {
        self.declare(&decl.ident, "func");
        decl.visit_children_with(self);
    }

    fn visit_fn_expr(&mut self, expr: &FnExpr) {
        if let Some(ident) = &expr.ident {
            self.declare(ident, "func");
        }
        expr.visit_children_with(self);
    }

    fn visit_class_decl(&mut self, decl: &ClassDecl) {
        self.declare(&decl.ident, "Class");
        decl.visit_children_with(self);
    }

    fn visit_class_expr(&mut self, expr: &ClassExpr) {
        if let Some(ident) = &expr.ident {
            self.declare(ident, "Class");
        }
        expr.visit_children_with(self);
    }

    fn visit_param(&mut self, param: &Param) {
        self.declare_pat(&param.pat, "arg");
        param.visit_children_with(self);
    }

    fn visit_arrow_expr(&mut self, arrow: &ArrowExpr) {
        for param in &arrow.params {
            self.declare_pat(param, "arg");
        }
        arrow.visit_children_with(self);
    }

    fn visit_setter_prop(&mut self, setter: &SetterProp) {
        self.declare_pat(&setter.param, "arg");
        setter.visit_children_with(self);
    }

    fn visit_catch_clause(&mut self, clause: &CatchClause) {
        if let Some(param) = &clause.param {
            self.declare_pat(param, "err");
        }
        clause.visit_children_with(self);
    }

    fn visit_import_specifier(&mut self, specifier: &ImportSpecifier) {
        let local = match specifier {
            ImportSpecifier::Named(named) => &named.local,
            ImportSpecifier::Default(default) => &default.local,
            ImportSpecifier::Namespace(namespace) => &namespace.local,
        };
        self.fixed.insert(local.to_id());
    }

    fn visit_export_decl(&mut self, export: &ExportDecl) {
        match &export.decl {
            Decl::Fn(decl) => {
                self.fixed.insert(decl.ident.to_id());
            }
            Decl::Class(decl) => {
                self.fixed.insert(decl.ident.to_id());
            }
            Decl::Var(var) => {
                for decl in &var.decls {
                    self.fix_pat(&decl.name);
                }
            }
            _ => {}
        }
        export.visit_children_with(self);
    }

    fn visit_export_default_decl(&mut self, export: &ExportDefaultDecl) {
        let ident = match &export.decl {
            DefaultDecl::Fn(expr) => expr.ident.as_ref(),
            DefaultDecl::Class(expr) => expr.ident.as_ref(),
            DefaultDecl::TsInterfaceDecl(_) => None,
        };
        if let Some(ident) = ident {
            self.fixed.insert(ident.to_id());
        }
        export.visit_children_with(self);
    }

    fn visit_with_stmt(&mut self, with: &WithStmt) {
        with.obj.visit_with(self);
        // Inside the body a name may resolve to a property of the object
        with.body.visit_with(&mut WithNames(&mut self.fixed));
        with.body.visit_with(self);
    }

    fn visit_named_export(&mut self, export: &NamedExport) {
        if export.src.is_some() {
            return;
        }
        for specifier in &export.specifiers {
            if let ExportSpecifier::Named(named) = specifier
                && let ModuleExportName::Ident(orig) = &named.orig
            {
                self.fixed.insert(orig.to_id());
            }
        }
    }
}

struct WithNames<'a>(&'a mut FxHashSet<Id>);

impl Visit for WithNames<'_> {
    fn visit_ident(&mut self, ident: &Ident) {
        self.0.insert(ident.to_id());
    }
}

/// Hands out names that are unique across the program
struct Namer {
    taken: FxHashSet<String>,
    next_suffix: FxHashMap<String, usize>,
}

impl Namer {
    fn new(taken: FxHashSet<String>) -> Self {
        Self {
            taken,
            next_suffix: FxHashMap::default(),
        }
    }

    fn fresh(&mut self, hint: &str) -> String {
        let mut name = hint.to_string();
        let suffix = self.next_suffix.entry(hint.to_string()).or_insert(0);
        while self.taken.contains(&name) || is_reserved_word(&name) {
            *suffix += 1;
            name = format!("{hint}_{suffix}");
        }
        self.taken.insert(name.clone());
        name
    }
}

struct Renamer<'a> {
    names: &'a FxHashMap<Id, String>,
}

impl Renamer<'_> {
    fn renamed(&self, ident: &Ident) -> Option<Ident> {
        let name = self.names.get(&ident.to_id())?;
        let mut renamed = ident.clone();
        renamed.sym = name.as_str().into();
        Some(renamed)
    }
}

fn key_of(ident: &Ident) -> PropName {
    PropName::Ident(IdentName {
        span: ident.span,
        sym: ident.sym.clone(),
    })
}

impl VisitMut for Renamer<'_> {
    fn visit_mut_ident(&mut self, ident: &mut Ident) {
        if let Some(renamed) = self.renamed(ident) {
            *ident = renamed;
        }
    }

    /// `{ a }` → `{ a: renamed }`
    fn visit_mut_prop(&mut self, prop: &mut Prop) {
        if let Prop::Shorthand(ident) = prop
            && let Some(renamed) = self.renamed(ident)
        {
            *prop = Prop::KeyValue(KeyValueProp {
                key: key_of(ident),
                value: Box::new(Expr::Ident(renamed)),
            });
            return;
        }
        prop.visit_mut_children_with(self);
    }

    /// `{ a = 1 } = o` → `{ a: renamed = 1 } = o`
    fn visit_mut_object_pat_prop(&mut self, prop: &mut ObjectPatProp) {
        if let ObjectPatProp::Assign(assign) = prop
            && let Some(renamed) = self.renamed(&assign.key.id)
        {
            let mut binding = assign.key.clone();
            binding.id = renamed;
            let value = match assign.value.take() {
                Some(default) => Pat::Assign(AssignPat {
                    span: assign.span,
                    left: Box::new(Pat::Ident(binding)),
                    right: default,
                }),
                None => Pat::Ident(binding),
            };
            *prop = ObjectPatProp::KeyValue(KeyValuePatProp {
                key: key_of(&assign.key.id),
                value: Box::new(value),
            });
        }
        prop.visit_mut_children_with(self);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{Value, json};
    use swc_ecma_ast::EsVersion;

    use super::{is_mangled, module_name};
    use crate::codegen::generate;
    use crate::config::SourceType;
    use crate::context::Context;
    use crate::logger::NoopLogger;
    use crate::parser::{ParseOptions, parse};
    use crate::transformer::TransformerKind;
    use crate::transformers::test_utils::{js, run_pass, run_pass_with};

    fn rename(source: &str) -> String {
        run_pass(TransformerKind::Rename, source)
    }

    fn rename_module(source: &str) -> String {
        let options = ParseOptions::default().with_source_type(SourceType::Module);
        let program = parse(source, &options).expect("input must parse").program;
        let rename = TransformerKind::Rename.build(&Value::Null).expect("defaults");
        let mut context = Context::new(program, Arc::from(vec![rename]), Arc::new(NoopLogger), true)
            .with_hash(0);
        crate::pipeline::run(&mut context).expect("rename failed");
        generate(&context.into_ast(), EsVersion::EsNext).expect("codegen failed")
    }

    fn module(source: &str) -> String {
        let options = ParseOptions::default().with_source_type(SourceType::Module);
        let program = parse(source, &options).expect("expected code must parse").program;
        generate(&program, EsVersion::EsNext).expect("codegen failed")
    }

    #[test]
    fn test_names_from_declarations() {
        assert_eq!(
            rename(
                "function f(a, b) { var c = [1]; var d = require('fs'); var e = new Date(); \
                 return a + b + c + d + e; }"
            ),
            js("function f(arg, arg_1) { var arr = [1]; var fs = require('fs'); var date = new Date(); \
                return arg + arg_1 + arr + fs + date; }")
        );
    }

    #[test]
    fn test_script_globals_keep_names() {
        let source = "var a = 1; function b() {} b(a);";
        assert_eq!(rename(source), js(source));
    }

    #[test]
    fn test_shorthand_properties_keep_keys() {
        assert_eq!(
            rename("function f(a) { return { a }; }"),
            js("function f(arg) { return { a: arg }; }")
        );
        assert_eq!(
            rename("function f({ a, b = 1 }) { return a + b; }"),
            js("function f({ a: arg, b: arg_1 = 1 }) { return arg + arg_1; }")
        );
    }

    #[test]
    fn test_avoids_existing_names() {
        assert_eq!(
            rename("function f(a) { var arg = 1; return a + arg; }"),
            js("function f(arg_1) { var num = 1; return arg_1 + num; }")
        );
    }

    #[test]
    fn test_shadowed_bindings_get_distinct_names() {
        assert_eq!(
            rename("function f(a) { return function (a) { return a; }(a); }"),
            js("function f(arg) { return function (arg_1) { return arg_1; }(arg); }")
        );
    }

    #[test]
    fn test_catch_and_classes() {
        assert_eq!(
            rename("function f() { try { g(); } catch (e) { var x = class {}; h(e, x); } }"),
            js("function f() { try { g(); } catch (err) { var Class = class {}; h(err, Class); } }")
        );
    }

    #[test]
    fn test_direct_eval_disables_renaming() {
        let source = "function f(a) { return eval('a'); }";
        assert_eq!(rename(source), js(source));
    }

    #[test]
    fn test_names_inside_with_keep_names() {
        assert_eq!(
            rename("function f(o) { var q = 1; var r = 2; with (o) { q; } return r; }"),
            js("function f(arg) { var q = 1; var num = 2; with (arg) { q; } return num; }")
        );
    }

    #[test]
    fn test_module_imports_and_exports_keep_names() {
        assert_eq!(
            rename_module(
                "import x from 'y'; export const a = [x]; const b = {}; const c = 'c'; export { b }; use(c);"
            ),
            module(
                "import x from 'y'; export const a = [x]; const b = {}; const str = 'c'; export { b }; use(str);"
            )
        );
    }

    #[test]
    fn test_only_mangled() {
        assert_eq!(
            run_pass_with(
                TransformerKind::Rename,
                json!({ "only_mangled": true }),
                "function f(_0x1a2b, name) { return _0x1a2b + name; }",
            ),
            js("function f(arg, name) { return arg + name; }")
        );
    }

    #[test]
    fn test_mangled_names() {
        assert!(is_mangled("_0x3f2a"));
        assert!(is_mangled("a"));
        assert!(is_mangled("ab"));
        assert!(!is_mangled("abc"));
        assert!(!is_mangled("_0xzz"));
    }

    #[test]
    fn test_module_names() {
        assert_eq!(module_name("fs").as_deref(), Some("fs"));
        assert_eq!(module_name("node:path").as_deref(), Some("path"));
        assert_eq!(
            module_name("./lib/event-emitter.js").as_deref(),
            Some("eventEmitter")
        );
        assert_eq!(module_name("@scope/3d"), None);
    }
}
