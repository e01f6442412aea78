//! String array decoding.
//!
//! Obfuscators move every string into one array and read it back through
//! an accessor, often after rotating the array at startup:
//!
//! ```js
//! var _0x1 = ['log', 'Hello'];
//! (function (arr, n) { while (--n) { arr.push(arr.shift()); } })(_0x1, 0x2);
//! var _0x2 = function (i) { i = i - 0x0; return _0x1[i]; };
//! console[_0x2('0x0')](_0x2('0x1'));
//! ```
//!
//! The pass finds the array, replays the rotation (a fixed count, or the
//! `parseInt` checksum loop of newer obfuscators), learns each accessor's
//! index offset and encoding (plain, base64 or RC4), and replaces every
//! accessor call with constant arguments by the string it returns. Wrapper
//! functions and aliases around accessors are followed. Nothing is
//! executed; the supported shapes are matched structurally.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use swc_common::{DUMMY_SP, Spanned};
use swc_ecma_ast::{
    ArrayLit, AssignExpr, AssignOp, AssignTarget, BinaryOp, CallExpr, Callee, Decl, Expr, FnDecl,
    Function, Id, Ident, Lit, MemberExpr, ModuleItem, Number, Pat, Program, SimpleAssignTarget,
    Stmt, Str, UnaryOp, VarDeclarator,
};
use swc_ecma_visit::{Visit, VisitMut, VisitMutWith, VisitWith};

use super::scope::{count_references, remove_declarations, resolve_scopes, substitute};
use super::utils::{member_key, retain_top_level, string_expr, top_level_stmts, unparen};
use super::value::{Value, evaluate};
use crate::context::{Context, Obfuscation};
use crate::error::TransformResult;
use crate::transformer::{Transformer, TransformerKind};

/// Alphabet of the base64 variant used by obfuscator.io
const BASE64_ALPHABET: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789+/=";

/// Limit on alias and wrapper chains
const MAX_INDIRECTION: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StringDecoderOptions {
    /// Remove the array, rotation and accessors once nothing refers to them
    pub remove_decoders: bool,
}

impl Default for StringDecoderOptions {
    fn default() -> Self {
        Self {
            remove_decoders: true,
        }
    }
}

#[derive(Debug)]
pub struct StringDecoder {
    options: StringDecoderOptions,
}

impl StringDecoder {
    pub fn new(options: StringDecoderOptions) -> Self {
        Self { options }
    }
}

impl Transformer for StringDecoder {
    fn name(&self) -> &str {
        TransformerKind::StringDecoder.name()
    }

    fn transform(&self, context: &mut Context) -> TransformResult<()> {
        let remove_decoders = self.options.remove_decoders;
        let (decoded, removed) = resolve_scopes(&mut context.ast, |program, _| {
            let Some(tables) = Tables::collect(&*program) else {
                return (0, 0);
            };

            let mut replacer = CallReplacer {
                tables: &tables,
                decoded: 0,
            };
            replace_outside_tables(program, &tables, &mut replacer);
            let decoded = replacer.decoded;

            let removed = if remove_decoders {
                tables.remove_unused(program)
            } else {
                0
            };
            (decoded, removed)
        });

        if decoded > 0 {
            tracing::debug!(decoded, removed, "string array decoded");
        }
        context.report(Obfuscation::new(self.name(), "string-array", decoded));
        context.report(Obfuscation::new(self.name(), "string-array-decoders", removed));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Plain,
    Base64,
    Rc4,
}

#[derive(Debug)]
struct Decoder {
    array: Id,
    /// Subtracted from the index argument before the array lookup
    offset: f64,
    encoding: Encoding,
}

/// A function forwarding to another accessor with computed arguments:
/// `function w(a, b) { return d(b - 0x2f, a); }`
#[derive(Debug)]
struct Wrapper {
    params: Vec<Id>,
    target: Id,
    args: Vec<Box<Expr>>,
}

#[derive(Debug)]
enum Rotation {
    /// Rotate left a fixed number of times
    Count(f64),
    /// Rotate left until `expr` evaluates to `target`
    Checksum { expr: Box<Expr>, target: f64 },
}

/// Everything known about the string arrays of a program
#[derive(Debug, Default)]
struct Tables {
    /// Arrays after rotation
    arrays: FxHashMap<Id, Vec<String>>,
    rotations: FxHashMap<Id, Rotation>,
    decoders: FxHashMap<Id, Decoder>,
    wrappers: FxHashMap<Id, Wrapper>,
    aliases: FxHashMap<Id, Id>,
}

/// Strings of a literal array holding nothing else
fn string_elements(array: &ArrayLit) -> Option<Vec<String>> {
    array
        .elems
        .iter()
        .map(|elem| match elem {
            Some(elem) if elem.spread.is_none() => match &*elem.expr {
                Expr::Lit(Lit::Str(s)) => s.value.as_str().map(str::to_string),
                _ => None,
            },
            _ => None,
        })
        .collect()
}

fn string_array(expr: &Expr) -> Option<Vec<String>> {
    match unparen(expr) {
        Expr::Array(array) if !array.elems.is_empty() => string_elements(array),
        _ => None,
    }
}

/// `function a() { var s = [...]; a = function () { return s; }; return a(); }`
fn array_function(function: &Function) -> Option<Vec<String>> {
    let body = function.body.as_ref()?;
    if body.stmts.len() > 4 {
        return None;
    }
    body.stmts.iter().find_map(|stmt| match stmt {
        Stmt::Decl(Decl::Var(var)) => var
            .decls
            .first()
            .and_then(|decl| decl.init.as_deref())
            .and_then(string_array),
        _ => None,
    })
}

/// Identifiers a node mentions
fn mentions<N: VisitWith<IdCollector>>(node: &N) -> FxHashSet<Id> {
    let mut collector = IdCollector::default();
    node.visit_with(&mut collector);
    collector.0
}

#[derive(Default)]
struct IdCollector(FxHashSet<Id>);

impl Visit for IdCollector {
    fn visit_ident(&mut self, ident: &Ident) {
        self.0.insert(ident.to_id());
    }
}

/// Static member keys a node reads (`push`, `shift`)
fn member_keys<N: VisitWith<KeyCollector>>(node: &N) -> FxHashSet<String> {
    let mut collector = KeyCollector::default();
    node.visit_with(&mut collector);
    collector.0
}

#[derive(Default)]
struct KeyCollector(FxHashSet<String>);

impl Visit for KeyCollector {
    fn visit_member_expr(&mut self, member: &MemberExpr) {
        if let Some(key) = member_key(&member.prop) {
            self.0.insert(key.to_string());
        }
        member.visit_children_with(self);
    }
}

/// Index offset and encoding of an accessor body
fn analyze_decoder(function: &Function, array: Id) -> Decoder {
    #[derive(Default)]
    struct Analyzer {
        offset: Option<f64>,
        base64: bool,
        key_schedule: bool,
    }

    impl Visit for Analyzer {
        fn visit_assign_expr(&mut self, assign: &AssignExpr) {
            if self.offset.is_none()
                && let AssignTarget::Simple(SimpleAssignTarget::Ident(target)) = &assign.left
            {
                let number = |expr: &Expr| match unparen(expr) {
                    Expr::Lit(Lit::Num(n)) => Some(n.value),
                    _ => None,
                };
                self.offset = match (assign.op, unparen(&assign.right)) {
                    (AssignOp::SubAssign, right) => number(right),
                    (AssignOp::AddAssign, right) => number(right).map(|n| -n),
                    (AssignOp::Assign, Expr::Bin(bin)) => {
                        let same = matches!(
                            unparen(&bin.left),
                            Expr::Ident(left) if left.sym == target.id.sym
                        );
                        match bin.op {
                            BinaryOp::Sub if same => number(&bin.right),
                            BinaryOp::Add if same => number(&bin.right).map(|n| -n),
                            _ => None,
                        }
                    }
                    _ => None,
                };
            }
            assign.visit_children_with(self);
        }

        fn visit_str(&mut self, s: &Str) {
            if s.value.as_str() == Some(BASE64_ALPHABET) {
                self.base64 = true;
            }
        }

        fn visit_number(&mut self, n: &Number) {
            if n.value == 256.0 {
                self.key_schedule = true;
            }
        }
    }

    let mut analyzer = Analyzer::default();
    function.visit_with(&mut analyzer);

    let encoding = match (analyzer.base64, analyzer.key_schedule && function.params.len() >= 2) {
        (true, true) => Encoding::Rc4,
        (true, false) => Encoding::Base64,
        _ => Encoding::Plain,
    };
    Decoder {
        array,
        offset: analyzer.offset.unwrap_or(0.0),
        encoding,
    }
}

fn simple_params(function: &Function) -> Option<Vec<Id>> {
    function
        .params
        .iter()
        .map(|param| match &param.pat {
            Pat::Ident(binding) => Some(binding.id.to_id()),
            _ => None,
        })
        .collect()
}

/// `function w(a, b) { return target(<expr over a, b>, ...); }`
fn wrapper_shape(function: &Function) -> Option<Wrapper> {
    let params = simple_params(function)?;
    let body = function.body.as_ref()?;
    let [Stmt::Return(ret)] = body.stmts.as_slice() else {
        return None;
    };
    let Expr::Call(call) = unparen(ret.arg.as_deref()?) else {
        return None;
    };
    let Callee::Expr(callee) = &call.callee else {
        return None;
    };
    let Expr::Ident(target) = unparen(callee) else {
        return None;
    };
    let allowed: FxHashSet<&Id> = params.iter().collect();
    let mut args = Vec::with_capacity(call.args.len());
    for arg in &call.args {
        if arg.spread.is_some() || !mentions(&*arg.expr).iter().all(|id| allowed.contains(id)) {
            return None;
        }
        args.push(arg.expr.clone());
    }
    Some(Wrapper {
        params,
        target: target.to_id(),
        args,
    })
}

/// `(function (arr, n) { ... })(array, 0x1f4)` at the top level
fn rotation_call(stmt: &Stmt) -> Option<(Id, &Function, f64)> {
    let Stmt::Expr(expr_stmt) = stmt else {
        return None;
    };
    let Expr::Call(call) = unparen(&expr_stmt.expr) else {
        return None;
    };
    let Callee::Expr(callee) = &call.callee else {
        return None;
    };
    let Expr::Fn(function) = unparen(callee) else {
        return None;
    };
    let [array, count] = call.args.as_slice() else {
        return None;
    };
    let Expr::Ident(array) = unparen(&array.expr) else {
        return None;
    };
    let Expr::Lit(Lit::Num(count)) = unparen(&count.expr) else {
        return None;
    };
    Some((array.to_id(), &function.function, count.value))
}

/// First expression in a rotation body that calls `parseInt`
fn checksum_expr(function: &Function) -> Option<Box<Expr>> {
    #[derive(Default)]
    struct Finder(Option<Box<Expr>>);

    fn calls_parse_int(expr: &Expr) -> bool {
        struct ParseIntCall(bool);
        impl Visit for ParseIntCall {
            fn visit_call_expr(&mut self, call: &CallExpr) {
                if let Callee::Expr(callee) = &call.callee
                    && matches!(unparen(callee), Expr::Ident(ident) if ident.sym.as_str() == "parseInt")
                {
                    self.0 = true;
                }
                call.visit_children_with(self);
            }
        }
        let mut found = ParseIntCall(false);
        expr.visit_with(&mut found);
        found.0
    }

    impl Visit for Finder {
        fn visit_var_declarator(&mut self, decl: &VarDeclarator) {
            if self.0.is_none()
                && let Some(init) = &decl.init
                && calls_parse_int(init)
            {
                self.0 = Some(init.clone());
            }
            decl.visit_children_with(self);
        }

        fn visit_assign_expr(&mut self, assign: &AssignExpr) {
            if self.0.is_none() && calls_parse_int(&assign.right) {
                self.0 = Some(assign.right.clone());
            }
            assign.visit_children_with(self);
        }
    }

    let mut finder = Finder::default();
    function.visit_with(&mut finder);
    finder.0
}

impl Tables {
    fn collect(program: &Program) -> Option<Self> {
        let mut tables = Tables::default();
        let stmts = top_level_stmts(program);

        for stmt in &stmts {
            match stmt {
                Stmt::Decl(Decl::Var(var)) => {
                    if let [decl] = var.decls.as_slice()
                        && let Pat::Ident(binding) = &decl.name
                        && let Some(strings) = decl.init.as_deref().and_then(string_array)
                    {
                        tables.arrays.insert(binding.id.to_id(), strings);
                    }
                }
                Stmt::Decl(Decl::Fn(decl)) => {
                    let id = decl.ident.to_id();
                    if let Some(strings) = array_function(&decl.function)
                        && mentions(&*decl.function).contains(&id)
                    {
                        tables.arrays.insert(id, strings);
                    }
                }
                _ => {}
            }
        }
        if tables.arrays.is_empty() {
            return None;
        }

        for stmt in &stmts {
            if let Some((id, function)) = declared_function(stmt)
                && !tables.arrays.contains_key(&id)
                && let Some(array) = mentions(function)
                    .into_iter()
                    .find(|mentioned| tables.arrays.contains_key(mentioned))
            {
                tables.decoders.insert(id, analyze_decoder(function, array));
            }

            if let Some((array, function, count)) = rotation_call(stmt)
                && tables.arrays.contains_key(&array)
            {
                let keys = member_keys(function);
                if !(keys.contains("push") && keys.contains("shift")) {
                    continue;
                }
                let rotation = match checksum_expr(function) {
                    Some(expr) => Rotation::Checksum {
                        expr,
                        target: count,
                    },
                    None => Rotation::Count(count),
                };
                tables.rotations.insert(array, rotation);
            }
        }

        program.visit_with(&mut IndirectionFinder {
            tables: &mut tables,
        });

        tables.apply_rotations();
        (!tables.arrays.is_empty()).then_some(tables)
    }

    fn apply_rotations(&mut self) {
        let rotations = std::mem::take(&mut self.rotations);
        for (array, rotation) in &rotations {
            let Some(len) = self.arrays.get(array).map(Vec::len) else {
                continue;
            };
            match rotation {
                Rotation::Count(count) => {
                    if count.fract() != 0.0 || *count < 0.0 {
                        self.arrays.remove(array);
                        continue;
                    }
                    let steps = (*count % len as f64) as usize;
                    if let Some(strings) = self.arrays.get_mut(array) {
                        strings.rotate_left(steps);
                    }
                }
                Rotation::Checksum { expr, target } => {
                    let mut matched = false;
                    for _ in 0..len {
                        match self.checksum(expr) {
                            Some(value) if value == *target => {
                                matched = true;
                                break;
                            }
                            Some(_) => {}
                            None => break,
                        }
                        if let Some(strings) = self.arrays.get_mut(array) {
                            strings.rotate_left(1);
                        }
                    }
                    if !matched {
                        tracing::debug!("string array rotation checksum never matched");
                        self.arrays.remove(array);
                    }
                }
            }
        }
        self.rotations = rotations;
    }

    /// Evaluate a checksum expression; a failing decode counts as NaN, an
    /// unsupported shape as `None`
    fn checksum(&self, expr: &Expr) -> Option<f64> {
        match unparen(expr) {
            Expr::Lit(Lit::Num(n)) => Some(n.value),
            Expr::Unary(unary) => {
                let value = self.checksum(&unary.arg)?;
                match unary.op {
                    UnaryOp::Minus => Some(-value),
                    UnaryOp::Plus => Some(value),
                    _ => None,
                }
            }
            Expr::Bin(bin) => {
                let left = self.checksum(&bin.left)?;
                let right = self.checksum(&bin.right)?;
                match bin.op {
                    BinaryOp::Add => Some(left + right),
                    BinaryOp::Sub => Some(left - right),
                    BinaryOp::Mul => Some(left * right),
                    BinaryOp::Div => Some(left / right),
                    BinaryOp::Mod => Some(left % right),
                    _ => None,
                }
            }
            Expr::Call(call) => {
                let Callee::Expr(callee) = &call.callee else {
                    return None;
                };
                let Expr::Ident(callee) = unparen(callee) else {
                    return None;
                };
                if callee.sym.as_str() != "parseInt" {
                    return None;
                }
                let Expr::Call(inner) = unparen(&call.args.first()?.expr) else {
                    return None;
                };
                Some(
                    self.decode_call(inner)
                        .map_or(f64::NAN, |decoded| parse_int(&decoded)),
                )
            }
            _ => None,
        }
    }

    /// Decoded string of an accessor call with constant arguments
    fn decode_call(&self, call: &CallExpr) -> Option<String> {
        let Callee::Expr(callee) = &call.callee else {
            return None;
        };
        let Expr::Ident(callee) = unparen(callee) else {
            return None;
        };
        let args = call
            .args
            .iter()
            .map(|arg| {
                if arg.spread.is_some() {
                    return None;
                }
                evaluate(&arg.expr)
            })
            .collect::<Option<Vec<_>>>()?;
        self.invoke(&callee.to_id(), &args, 0)
    }

    fn invoke(&self, callee: &Id, args: &[Value], depth: usize) -> Option<String> {
        if depth > MAX_INDIRECTION {
            return None;
        }
        if let Some(target) = self.aliases.get(callee) {
            return self.invoke(target, args, depth + 1);
        }
        if let Some(decoder) = self.decoders.get(callee) {
            let strings = self.arrays.get(&decoder.array)?;
            let index = args.first()?.to_number();
            let key = args
                .get(1)
                .and_then(Value::to_js_string)
                .and_then(|units| String::from_utf16(&units).ok());
            return decode(decoder, strings, index, key.as_deref());
        }

        let wrapper = self.wrappers.get(callee)?;
        let replacements: FxHashMap<Id, Box<Expr>> = wrapper
            .params
            .iter()
            .enumerate()
            .map(|(index, param)| {
                let value = args.get(index).cloned().unwrap_or(Value::Undefined);
                let expr = value.to_expr(DUMMY_SP)?;
                Some((param.clone(), Box::new(expr)))
            })
            .collect::<Option<_>>()?;
        let forwarded = wrapper
            .args
            .iter()
            .map(|arg| {
                let mut arg = arg.clone();
                substitute(&mut arg, &replacements);
                evaluate(&arg)
            })
            .collect::<Option<Vec<_>>>()?;
        self.invoke(&wrapper.target, &forwarded, depth + 1)
    }

    /// Whether calling `id` may end in an accessor
    fn is_accessor(&self, id: &Id) -> bool {
        self.decoders.contains_key(id)
            || self.wrappers.contains_key(id)
            || self.aliases.contains_key(id)
    }

    /// Whether an alias or wrapper chain starting at `id` ends in an accessor
    fn reaches_decoder(&self, id: &Id, depth: usize) -> bool {
        if depth > MAX_INDIRECTION {
            return false;
        }
        if self.decoders.contains_key(id) {
            return true;
        }
        self.aliases
            .get(id)
            .or_else(|| self.wrappers.get(id).map(|wrapper| &wrapper.target))
            .is_some_and(|target| self.reaches_decoder(target, depth + 1))
    }

    /// Bindings whose top-level statements belong to the tables
    fn owned_ids(&self) -> FxHashSet<Id> {
        self.arrays
            .keys()
            .chain(self.decoders.keys())
            .cloned()
            .collect()
    }

    /// Whether a top-level statement declares or rotates one of `ids`
    fn owns(stmt: &Stmt, ids: &FxHashSet<Id>) -> bool {
        if let Some((array, _, _)) = rotation_call(stmt) {
            return ids.contains(&array);
        }
        match stmt {
            Stmt::Decl(Decl::Fn(decl)) => ids.contains(&decl.ident.to_id()),
            Stmt::Decl(Decl::Var(var)) => {
                !var.decls.is_empty()
                    && var.decls.iter().all(|decl| {
                        matches!(&decl.name, Pat::Ident(binding) if ids.contains(&binding.id.to_id()))
                    })
            }
            _ => false,
        }
    }

    /// Drop aliases and wrappers with no callers left, then each array
    /// together with its rotation and accessors once nothing else refers to
    /// them. Returns how many declarations went away.
    fn remove_unused(&self, program: &mut Program) -> usize {
        let mut removed = 0;
        loop {
            let counts = count_references(&*program);
            let unused: FxHashSet<Id> = self
                .aliases
                .keys()
                .chain(self.wrappers.keys())
                .filter(|id| counts.get(*id) == Some(&1) && self.reaches_decoder(id, 0))
                .cloned()
                .collect();
            let count = remove_declarations(program, &unused);
            if count == 0 {
                break;
            }
            removed += count;
        }

        for array in self.arrays.keys() {
            let mut ids: FxHashSet<Id> = self
                .decoders
                .iter()
                .filter(|(_, decoder)| decoder.array == *array)
                .map(|(id, _)| id.clone())
                .collect();
            ids.insert(array.clone());

            let mut candidate = program.clone();
            let before = top_level_stmts(&candidate).len();
            retain_top_level(&mut candidate, |stmt| !Self::owns(stmt, &ids));
            let after = top_level_stmts(&candidate).len();

            let counts = count_references(&candidate);
            if ids.iter().any(|id| counts.contains_key(id)) {
                continue;
            }
            *program = candidate;
            removed += before - after;
        }
        removed
    }
}

/// A top-level `function f() {}` or `var f = function () {}`
fn declared_function(stmt: &Stmt) -> Option<(Id, &Function)> {
    match stmt {
        Stmt::Decl(Decl::Fn(decl)) => Some((decl.ident.to_id(), &decl.function)),
        Stmt::Decl(Decl::Var(var)) => {
            let [decl] = var.decls.as_slice() else {
                return None;
            };
            let Pat::Ident(binding) = &decl.name else {
                return None;
            };
            match unparen(decl.init.as_deref()?) {
                Expr::Fn(function) => Some((binding.id.to_id(), &function.function)),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Aliases (`var d = decoder`) and wrapper functions, anywhere in the program
struct IndirectionFinder<'a> {
    tables: &'a mut Tables,
}

impl Visit for IndirectionFinder<'_> {
    fn visit_var_declarator(&mut self, decl: &VarDeclarator) {
        if let Pat::Ident(binding) = &decl.name
            && let Some(init) = &decl.init
        {
            match unparen(init) {
                Expr::Ident(target) => {
                    self.tables
                        .aliases
                        .insert(binding.id.to_id(), target.to_id());
                }
                Expr::Fn(function) => {
                    if let Some(wrapper) = wrapper_shape(&function.function) {
                        self.tables.wrappers.insert(binding.id.to_id(), wrapper);
                    }
                }
                _ => {}
            }
        }
        decl.visit_children_with(self);
    }

    fn visit_fn_decl(&mut self, decl: &FnDecl) {
        let id = decl.ident.to_id();
        if !self.tables.decoders.contains_key(&id)
            && let Some(wrapper) = wrapper_shape(&decl.function)
        {
            self.tables.wrappers.insert(id, wrapper);
        }
        decl.visit_children_with(self);
    }
}

fn decode(decoder: &Decoder, strings: &[String], index: f64, key: Option<&str>) -> Option<String> {
    let position = index - decoder.offset;
    if !(position >= 0.0 && position.fract() == 0.0) {
        return None;
    }
    let encoded = strings.get(position as usize)?;
    match decoder.encoding {
        Encoding::Plain => Some(encoded.clone()),
        Encoding::Base64 => String::from_utf8(base64_decode(encoded)).ok(),
        Encoding::Rc4 => rc4_decode(encoded, key?),
    }
}

/// Base64 in the obfuscator.io alphabet; unknown characters are skipped
fn base64_decode(input: &str) -> Vec<u8> {
    let alphabet = &BASE64_ALPHABET.as_bytes()[..64];
    let mut output = Vec::with_capacity(input.len() * 3 / 4);
    let mut buffer: u32 = 0;
    let mut bits = 0;
    for c in input.bytes() {
        if c == b'=' {
            break;
        }
        let Some(value) = alphabet.iter().position(|&a| a == c) else {
            continue;
        };
        buffer = (buffer << 6) | value as u32;
        bits += 6;
        if bits >= 8 {
            bits -= 8;
            output.push((buffer >> bits) as u8);
            buffer &= (1 << bits) - 1;
        }
    }
    output
}

/// RC4 over the UTF-16 units of the base64-decoded text
fn rc4_decode(input: &str, key: &str) -> Option<String> {
    let key: Vec<u16> = key.encode_utf16().collect();
    if key.is_empty() {
        return None;
    }
    let text = String::from_utf8(base64_decode(input)).ok()?;

    let mut state: Vec<usize> = (0..256).collect();
    let mut j = 0;
    for i in 0..256 {
        j = (j + state[i] + usize::from(key[i % key.len()])) % 256;
        state.swap(i, j);
    }

    let (mut i, mut j) = (0, 0);
    let units: Vec<u16> = text
        .encode_utf16()
        .map(|unit| {
            i = (i + 1) % 256;
            j = (j + state[i]) % 256;
            state.swap(i, j);
            unit ^ state[(state[i] + state[j]) % 256] as u16
        })
        .collect();
    String::from_utf16(&units).ok()
}

/// `parseInt(s)` without a radix
fn parse_int(input: &str) -> f64 {
    let trimmed = input.trim_start_matches(|c: char| c.is_whitespace() || c == '\u{feff}');
    let (negative, unsigned) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let (radix, digits) = match unsigned.get(..2) {
        Some("0x" | "0X") => (16, &unsigned[2..]),
        _ => (10, unsigned),
    };
    let mut value = None;
    for c in digits.chars() {
        let Some(digit) = c.to_digit(radix) else {
            break;
        };
        value = Some(value.unwrap_or(0.0) * f64::from(radix) + f64::from(digit));
    }
    match value {
        Some(value) if negative => -value,
        Some(value) => value,
        None => f64::NAN,
    }
}

/// Replace accessor calls everywhere but in the statements that make up
/// the tables
fn replace_outside_tables(program: &mut Program, tables: &Tables, replacer: &mut CallReplacer) {
    let owned = tables.owned_ids();
    match program {
        Program::Script(script) => {
            for stmt in &mut script.body {
                if !Tables::owns(stmt, &owned) {
                    stmt.visit_mut_with(replacer);
                }
            }
        }
        Program::Module(module) => {
            for item in &mut module.body {
                match item {
                    ModuleItem::Stmt(stmt) if Tables::owns(stmt, &owned) => {}
                    item => item.visit_mut_with(replacer),
                }
            }
        }
    }
}

struct CallReplacer<'a> {
    tables: &'a Tables,
    decoded: usize,
}

impl VisitMut for CallReplacer<'_> {
    fn visit_mut_expr(&mut self, expr: &mut Expr) {
        expr.visit_mut_children_with(self);

        let decoded = match expr {
            Expr::Call(call) => match &call.callee {
                Callee::Expr(callee)
                    if matches!(unparen(callee), Expr::Ident(ident) if self.tables.is_accessor(&ident.to_id())) =>
                {
                    self.tables.decode_call(call)
                }
                _ => None,
            },
            _ => None,
        };
        if let Some(decoded) = decoded {
            *expr = string_expr(expr.span(), &decoded);
            self.decoded += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{base64_decode, parse_int, rc4_decode};
    use crate::transformer::TransformerKind;
    use crate::transformers::test_utils::{js, run_pass, run_pass_detailed, run_pass_with};

    fn decode(source: &str) -> String {
        run_pass(TransformerKind::StringDecoder, source)
    }

    const ROTATED: &str = "var _0x1 = ['Hello', 'log'];\
        (function (arr, n) { var f = function (k) { while (--k) { arr.push(arr.shift()); } }; f(++n); })(_0x1, 0x1);\
        var _0x2 = function (i, k) { i = i - 0x0; var v = _0x1[i]; return v; };\
        console[_0x2('0x0')](_0x2('0x1'));";

    #[test]
    fn test_counted_rotation() {
        assert_eq!(decode(ROTATED), js("console[\"log\"](\"Hello\");"));
    }

    #[test]
    fn test_checksum_rotation() {
        let source = "function a() { var s = ['x', '1', '2', 'y']; a = function () { return s; }; return a(); }\
            function d(i, k) { var s = a(); return d = function (j, m) { j = j - 0x0; var v = s[j]; return v; }, d(i, k); }\
            (function (f, t) { var c = d, s = f(); while (true) { try { var e = parseInt(c(0x0)) + parseInt(c(0x1)); if (e === t) break; else s.push(s.shift()); } catch (x) { s.push(s.shift()); } } })(a, 0x3);\
            console.log(d(0x2), d(0x3));";
        assert_eq!(decode(source), js("console.log(\"y\", \"x\");"));
    }

    #[test]
    fn test_checksum_without_match_is_untouched() {
        let source = "function a() { var s = ['x', '1']; a = function () { return s; }; return a(); }\
            function d(i) { var s = a(); i = i - 0x0; return s[i]; }\
            (function (f, t) { var c = d, s = f(); while (true) { try { var e = parseInt(c(0x0)); if (e === t) break; else s.push(s.shift()); } catch (x) { s.push(s.shift()); } } })(a, 0x63);\
            g(d(0x1));";
        assert_eq!(decode(source), js(source));
    }

    #[test]
    fn test_base64_accessor() {
        let source = "var _0x1 = ['Bg9N', 'sgvSBg8='];\
            var _0x2 = function (i) { i = i - 0x0; var t = 'abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789+/='; return atob_(_0x1[i], t); };\
            console[_0x2(0x0)](_0x2(0x1));";
        assert_eq!(decode(source), js("console[\"log\"](\"Hello\");"));
    }

    #[test]
    fn test_rc4_accessor() {
        let source = "var _0x1 = ['WROgia==', 'CWzOpYe='];\
            var _0x2 = function (i, key) { i = i - 0x0; var t = 'abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789+/='; for (var n = 0x0; n < 0x100; n++) {} return rc4_(_0x1[i], key, t); };\
            console[_0x2(0x0, 'abcd')](_0x2(0x1, 'Wx1!'));";
        assert_eq!(decode(source), js("console[\"log\"](\"Hello\");"));
    }

    #[test]
    fn test_wrappers_and_aliases() {
        let source = "var _0x1 = ['a', 'b', 'c'];\
            var _0x2 = function (i) { i = i - 0x10; return _0x1[i]; };\
            function w(x, y) { return _0x2(y - 0x2, x); }\
            function g() { var h = _0x2; return h(0x12); }\
            f(w('z', 0x13), g());";
        assert_eq!(
            decode(source),
            js("function g() { return \"c\"; } f(\"b\", g());")
        );
    }

    #[test]
    fn test_keep_decoders_when_disabled() {
        let output = run_pass_with(
            TransformerKind::StringDecoder,
            json!({ "remove_decoders": false }),
            "var _0x1 = ['a']; var _0x2 = function (i) { return _0x1[i]; }; f(_0x2(0x0));",
        );
        assert_eq!(
            output,
            js("var _0x1 = ['a']; var _0x2 = function (i) { return _0x1[i]; }; f(\"a\");")
        );
    }

    #[test]
    fn test_unrelated_code_untouched() {
        let source = "var list = [1, 2]; var alias = list; function f(i) { return list[i]; } f(0);";
        assert_eq!(decode(source), js(source));
    }

    #[test]
    fn test_reports_findings() {
        let (_, findings) =
            run_pass_detailed(TransformerKind::StringDecoder, serde_json::Value::Null, ROTATED);
        assert_eq!(findings[0].technique, "string-array");
        assert_eq!(findings[0].occurrences, 2);
        assert_eq!(findings[1].occurrences, 3);
    }

    #[test]
    fn test_codecs() {
        assert_eq!(base64_decode("Bg9N"), b"log");
        assert_eq!(base64_decode("AmoPBgXV"), "h\u{e9}llo".as_bytes());
        assert_eq!(rc4_decode("WROgia==", "abcd").as_deref(), Some("log"));
        assert_eq!(rc4_decode("WROgia==", ""), None);
    }

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int("123abc"), 123.0);
        assert_eq!(parse_int("  -0x1f"), -31.0);
        assert!(parse_int("abc").is_nan());
        assert_eq!(parse_int("42.9"), 42.0);
    }
}
