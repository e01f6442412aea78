//! Constant evaluation of literal expressions.
//!
//! Evaluates unary, binary, logical and conditional operators over
//! literals with JavaScript semantics. Results that cannot be written back as
//! a plain literal (NaN, infinities, negative zero) are reported as such so
//! callers can leave the expression alone.

use swc_common::Span;
use swc_ecma_ast::{BinaryOp, Expr, Lit, UnaryOp};

use super::utils::{bool_expr, number_expr, string_expr, undefined_expr, unparen};

/// Maximum recursion depth for nested folding (e.g. `-(2 + 3)`)
const MAX_FOLD_DEPTH: usize = 64;

/// A value known without running the program.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Boolean(bool),
    /// UTF-16 code units
    String(Vec<u16>),
    Null,
    Undefined,
    /// An array literal with no elements
    EmptyArray,
}

impl Value {
    /// ToBoolean
    pub fn to_boolean(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Boolean(b) => *b,
            Value::String(s) => !s.is_empty(),
            Value::Null | Value::Undefined => false,
            Value::EmptyArray => true,
        }
    }

    /// ToNumber
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Boolean(b) => f64::from(u8::from(*b)),
            Value::Null => 0.0,
            Value::Undefined => f64::NAN,
            Value::String(s) => string_to_number(&String::from_utf16_lossy(s)),
            Value::EmptyArray => 0.0,
        }
    }

    /// ToInt32
    fn to_int32(&self) -> i32 {
        self.to_uint32() as i32
    }

    /// ToUint32
    fn to_uint32(&self) -> u32 {
        let n = self.to_number();
        if n.is_nan() || n.is_infinite() || n == 0.0 {
            return 0;
        }
        let int = n.trunc() % 4294967296.0;
        let int = if int < 0.0 { int + 4294967296.0 } else { int };
        int as u32
    }

    /// ToString; `None` for numbers whose spelling is not reproduced here
    pub fn to_js_string(&self) -> Option<Vec<u16>> {
        let s = match self {
            Value::Number(n) => format_number(*n)?,
            Value::Boolean(b) => b.to_string(),
            Value::Null => "null".to_string(),
            Value::Undefined => "undefined".to_string(),
            Value::String(s) => return Some(s.clone()),
            Value::EmptyArray => String::new(),
        };
        Some(s.encode_utf16().collect())
    }

    fn is_primitive(&self) -> bool {
        !matches!(self, Value::EmptyArray)
    }

    fn type_of(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Boolean(_) => "boolean",
            Value::String(_) => "string",
            Value::Null | Value::EmptyArray => "object",
            Value::Undefined => "undefined",
        }
    }

    /// Literal expression for this value, if one exists
    pub fn to_expr(&self, span: Span) -> Option<Expr> {
        match self {
            Value::Number(n) => {
                if n.is_finite() && !(*n == 0.0 && n.is_sign_negative()) {
                    Some(number_expr(span, *n))
                } else {
                    None
                }
            }
            Value::Boolean(b) => Some(bool_expr(span, *b)),
            Value::String(units) => String::from_utf16(units)
                .ok()
                .map(|s| string_expr(span, &s)),
            Value::Null => Some(Expr::Lit(Lit::Null(swc_ecma_ast::Null { span }))),
            Value::Undefined => Some(undefined_expr(span)),
            Value::EmptyArray => None,
        }
    }
}

/// StringToNumber for decimal, hex, octal and binary spellings
pub fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    let radix_prefixed = |prefix_lower: &str, prefix_upper: &str, radix: u32| {
        trimmed
            .strip_prefix(prefix_lower)
            .or_else(|| trimmed.strip_prefix(prefix_upper))
            .map(|digits| {
                u64::from_str_radix(digits, radix)
                    .map(|v| v as f64)
                    .unwrap_or(f64::NAN)
            })
    };
    if let Some(v) = radix_prefixed("0x", "0X", 16)
        .or_else(|| radix_prefixed("0o", "0O", 8))
        .or_else(|| radix_prefixed("0b", "0B", 2))
    {
        return v;
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    // Rust accepts "inf"/"nan" spellings JS rejects
    if trimmed
        .chars()
        .any(|c| !(c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')))
    {
        return f64::NAN;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

/// Number::toString for the values this module emits.
///
/// Integers up to 2^53 and decimals that Rust prints without an exponent
/// match JavaScript's spelling; anything else returns `None`.
pub fn format_number(n: f64) -> Option<String> {
    if n.is_nan() || n.is_infinite() {
        return None;
    }
    if n == 0.0 {
        return Some("0".to_string());
    }
    if n.fract() == 0.0 && n.abs() < 9007199254740992.0 {
        return Some(format!("{}", n as i64));
    }
    let s = format!("{n}");
    if s.contains('e') || n.abs() < 1e-6 || n.abs() >= 1e21 {
        return None;
    }
    Some(s)
}

/// Evaluate a literal or an operator tree over literals.
pub fn evaluate(expr: &Expr) -> Option<Value> {
    evaluate_depth(expr, 0)
}

fn evaluate_depth(expr: &Expr, depth: usize) -> Option<Value> {
    if depth > MAX_FOLD_DEPTH {
        return None;
    }
    match unparen(expr) {
        Expr::Lit(Lit::Num(n)) => Some(Value::Number(n.value)),
        Expr::Lit(Lit::Bool(b)) => Some(Value::Boolean(b.value)),
        Expr::Lit(Lit::Null(_)) => Some(Value::Null),
        Expr::Lit(Lit::Str(s)) => s
            .value
            .as_str()
            .map(|s| Value::String(s.encode_utf16().collect())),
        Expr::Array(array) if array.elems.is_empty() => Some(Value::EmptyArray),
        Expr::Tpl(tpl) if tpl.exprs.is_empty() => {
            let cooked = tpl.quasis.first()?.cooked.as_ref()?;
            cooked
                .as_str()
                .map(|s| Value::String(s.encode_utf16().collect()))
        }
        Expr::Unary(unary) => {
            // `typeof x` may name an undeclared global; `delete` has effects
            if matches!(unary.op, UnaryOp::Delete) {
                return None;
            }
            let operand = evaluate_depth(&unary.arg, depth + 1)?;
            fold_unary(unary.op, &operand)
        }
        Expr::Bin(bin) => {
            let lhs = evaluate_depth(&bin.left, depth + 1)?;
            match bin.op {
                BinaryOp::LogicalAnd => {
                    if lhs.to_boolean() {
                        evaluate_depth(&bin.right, depth + 1)
                    } else {
                        Some(lhs)
                    }
                }
                BinaryOp::LogicalOr => {
                    if lhs.to_boolean() {
                        Some(lhs)
                    } else {
                        evaluate_depth(&bin.right, depth + 1)
                    }
                }
                BinaryOp::NullishCoalescing => {
                    if matches!(lhs, Value::Null | Value::Undefined) {
                        evaluate_depth(&bin.right, depth + 1)
                    } else {
                        Some(lhs)
                    }
                }
                op => {
                    let rhs = evaluate_depth(&bin.right, depth + 1)?;
                    fold_binary(op, &lhs, &rhs)
                }
            }
        }
        Expr::Cond(cond) => {
            let test = evaluate_depth(&cond.test, depth + 1)?;
            if test.to_boolean() {
                evaluate_depth(&cond.cons, depth + 1)
            } else {
                evaluate_depth(&cond.alt, depth + 1)
            }
        }
        _ => None,
    }
}

/// Truthiness of a side-effect free expression whose value is known
pub fn truthiness(expr: &Expr) -> Option<bool> {
    match unparen(expr) {
        Expr::Fn(_) | Expr::Arrow(_) => Some(true),
        expr => evaluate(expr).map(|value| value.to_boolean()),
    }
}

/// Apply a unary operator to a known value.
pub fn fold_unary(op: UnaryOp, operand: &Value) -> Option<Value> {
    match op {
        UnaryOp::Minus => Some(Value::Number(-operand.to_number())),
        UnaryOp::Plus => Some(Value::Number(operand.to_number())),
        UnaryOp::Bang => Some(Value::Boolean(!operand.to_boolean())),
        UnaryOp::Tilde => Some(Value::Number(f64::from(!operand.to_int32()))),
        UnaryOp::TypeOf => Some(Value::String(operand.type_of().encode_utf16().collect())),
        UnaryOp::Void => Some(Value::Undefined),
        UnaryOp::Delete => None,
    }
}

/// Apply a binary operator to two known values.
pub fn fold_binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Option<Value> {
    let number = |f: fn(f64, f64) -> f64| Some(Value::Number(f(lhs.to_number(), rhs.to_number())));
    let int32 = |f: fn(i32, u32) -> i32| {
        Some(Value::Number(f64::from(f(lhs.to_int32(), rhs.to_uint32()))))
    };

    match op {
        BinaryOp::Add => fold_addition(lhs, rhs),
        BinaryOp::Sub => number(|l, r| l - r),
        BinaryOp::Mul => number(|l, r| l * r),
        BinaryOp::Div => number(|l, r| l / r),
        BinaryOp::Mod => number(|l, r| l % r),
        BinaryOp::Exp => number(f64::powf),

        BinaryOp::BitAnd => int32(|l, r| l & r as i32),
        BinaryOp::BitOr => int32(|l, r| l | r as i32),
        BinaryOp::BitXor => int32(|l, r| l ^ r as i32),
        BinaryOp::LShift => int32(|l, r| l.wrapping_shl(r & 0x1f)),
        BinaryOp::RShift => int32(|l, r| l.wrapping_shr(r & 0x1f)),
        BinaryOp::ZeroFillRShift => {
            let result = lhs.to_uint32() >> (rhs.to_uint32() & 0x1f);
            Some(Value::Number(f64::from(result)))
        }

        BinaryOp::EqEqEq => Some(Value::Boolean(strict_equals(lhs, rhs)?)),
        BinaryOp::NotEqEq => Some(Value::Boolean(!strict_equals(lhs, rhs)?)),
        BinaryOp::EqEq => Some(Value::Boolean(loose_equals(lhs, rhs)?)),
        BinaryOp::NotEq => Some(Value::Boolean(!loose_equals(lhs, rhs)?)),
        BinaryOp::Lt => compare(lhs, rhs, |o| o == std::cmp::Ordering::Less),
        BinaryOp::LtEq => compare(lhs, rhs, |o| o != std::cmp::Ordering::Greater),
        BinaryOp::Gt => compare(lhs, rhs, |o| o == std::cmp::Ordering::Greater),
        BinaryOp::GtEq => compare(lhs, rhs, |o| o != std::cmp::Ordering::Less),

        BinaryOp::LogicalAnd => Some(if lhs.to_boolean() { rhs.clone() } else { lhs.clone() }),
        BinaryOp::LogicalOr => Some(if lhs.to_boolean() { lhs.clone() } else { rhs.clone() }),
        BinaryOp::NullishCoalescing => Some(if matches!(lhs, Value::Null | Value::Undefined) {
            rhs.clone()
        } else {
            lhs.clone()
        }),

        // Need the runtime object model
        BinaryOp::In | BinaryOp::InstanceOf => None,
    }
}

/// `+`: concatenation when either side converts to a string
fn fold_addition(lhs: &Value, rhs: &Value) -> Option<Value> {
    let stringy = |v: &Value| matches!(v, Value::String(_) | Value::EmptyArray);
    if stringy(lhs) || stringy(rhs) {
        let mut result = lhs.to_js_string()?;
        result.extend(rhs.to_js_string()?);
        return Some(Value::String(result));
    }
    Some(Value::Number(lhs.to_number() + rhs.to_number()))
}

fn strict_equals(lhs: &Value, rhs: &Value) -> Option<bool> {
    // Two array literals are distinct objects
    if !lhs.is_primitive() || !rhs.is_primitive() {
        return Some(false);
    }
    Some(match (lhs, rhs) {
        (Value::Number(l), Value::Number(r)) => l == r,
        (Value::Boolean(l), Value::Boolean(r)) => l == r,
        (Value::String(l), Value::String(r)) => l == r,
        (Value::Null, Value::Null) | (Value::Undefined, Value::Undefined) => true,
        _ => false,
    })
}

fn loose_equals(lhs: &Value, rhs: &Value) -> Option<bool> {
    if !lhs.is_primitive() || !rhs.is_primitive() {
        return None;
    }
    let nullish = |v: &Value| matches!(v, Value::Null | Value::Undefined);
    if nullish(lhs) || nullish(rhs) {
        return Some(nullish(lhs) && nullish(rhs));
    }
    match (lhs, rhs) {
        (Value::String(l), Value::String(r)) => Some(l == r),
        _ => Some(lhs.to_number() == rhs.to_number()),
    }
}

fn compare(lhs: &Value, rhs: &Value, accept: fn(std::cmp::Ordering) -> bool) -> Option<Value> {
    if !lhs.is_primitive() || !rhs.is_primitive() {
        return None;
    }
    if let (Value::String(l), Value::String(r)) = (lhs, rhs) {
        return Some(Value::Boolean(accept(l.cmp(r))));
    }
    let ordering = lhs.to_number().partial_cmp(&rhs.to_number());
    // Comparisons with NaN are false
    Some(Value::Boolean(ordering.is_some_and(accept)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceType;
    use crate::parser::{ParseOptions, parse};
    use swc_ecma_ast::{Program, Stmt};

    fn eval(source: &str) -> Option<Value> {
        let options = ParseOptions::default().with_source_type(SourceType::Script);
        let Program::Script(script) = parse(source, &options).unwrap().program else {
            unreachable!()
        };
        match &script.body[0] {
            Stmt::Expr(stmt) => evaluate(&stmt.expr),
            other => panic!("not an expression: {other:?}"),
        }
    }

    fn string(s: &str) -> Value {
        Value::String(s.encode_utf16().collect())
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("2 + 3 * 4"), Some(Value::Number(14.0)));
        assert_eq!(eval("0x10 - 1"), Some(Value::Number(15.0)));
        assert_eq!(eval("2 ** 10"), Some(Value::Number(1024.0)));
        assert_eq!(eval("-(2 + 3)"), Some(Value::Number(-5.0)));
    }

    #[test]
    fn test_obfuscator_booleans() {
        assert_eq!(eval("!![]"), Some(Value::Boolean(true)));
        assert_eq!(eval("![]"), Some(Value::Boolean(false)));
        assert_eq!(eval("+[]"), Some(Value::Number(0.0)));
        assert_eq!(eval("[] + []"), Some(string("")));
    }

    #[test]
    fn test_string_concat() {
        assert_eq!(eval("'hello ' + 'world'"), Some(string("hello world")));
        assert_eq!(eval("'x=' + 42"), Some(string("x=42")));
        assert_eq!(eval("'a' + null"), Some(string("anull")));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(eval("'abc' === 'abc'"), Some(Value::Boolean(true)));
        assert_eq!(eval("'abc' !== 'abd'"), Some(Value::Boolean(true)));
        assert_eq!(eval("1 == '1'"), Some(Value::Boolean(true)));
        assert_eq!(eval("null == void 0"), Some(Value::Boolean(true)));
        assert_eq!(eval("1 < 2"), Some(Value::Boolean(true)));
        assert_eq!(eval("'b' > 'a'"), Some(Value::Boolean(true)));
        assert_eq!(eval("[] === []"), Some(Value::Boolean(false)));
    }

    #[test]
    fn test_bitwise() {
        assert_eq!(eval("0xff & 0x0f"), Some(Value::Number(15.0)));
        assert_eq!(eval("1 << 8"), Some(Value::Number(256.0)));
        assert_eq!(eval("-1 >>> 0"), Some(Value::Number(4294967295.0)));
        assert_eq!(eval("~0"), Some(Value::Number(-1.0)));
    }

    #[test]
    fn test_logical_and_conditional() {
        assert_eq!(eval("0 || 'x'"), Some(string("x")));
        assert_eq!(eval("1 && 2"), Some(Value::Number(2.0)));
        assert_eq!(eval("null ?? 3"), Some(Value::Number(3.0)));
        assert_eq!(eval("true ? 'a' : 'b'"), Some(string("a")));
    }

    #[test]
    fn test_not_constant() {
        assert_eq!(eval("a + 1"), None);
        assert_eq!(eval("'a' in b"), None);
        assert_eq!(eval("delete a.b"), None);
    }

    #[test]
    fn test_typeof() {
        assert_eq!(eval("typeof 1"), Some(string("number")));
        assert_eq!(eval("typeof null"), Some(string("object")));
        assert_eq!(eval("typeof x"), None);
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(42.0).as_deref(), Some("42"));
        assert_eq!(format_number(-3.0).as_deref(), Some("-3"));
        assert_eq!(format_number(0.5).as_deref(), Some("0.5"));
        assert_eq!(format_number(f64::NAN), None);
        assert_eq!(format_number(1e300), None);
    }

    #[test]
    fn test_string_to_number() {
        assert_eq!(string_to_number(" 12 "), 12.0);
        assert_eq!(string_to_number("0x1f"), 31.0);
        assert_eq!(string_to_number(""), 0.0);
        assert!(string_to_number("12px").is_nan());
        assert!(string_to_number("inf").is_nan());
    }

    #[test]
    fn test_to_expr_skips_unrepresentable() {
        use swc_common::DUMMY_SP;
        assert!(Value::Number(f64::NAN).to_expr(DUMMY_SP).is_none());
        assert!(Value::Number(-0.0).to_expr(DUMMY_SP).is_none());
        assert!(Value::EmptyArray.to_expr(DUMMY_SP).is_none());
        assert!(Value::Number(-2.0).to_expr(DUMMY_SP).is_some());
    }
}
