//! Constant folding and literal normalization.

use serde::{Deserialize, Serialize};
use swc_common::{Spanned, util::take::Take};
use swc_ecma_ast::{BinaryOp, Expr, Lit, Number, Str, UnaryExpr, UnaryOp};
use swc_ecma_visit::{VisitMut, VisitMutWith};

use super::utils::unparen;
use super::value::{Value, evaluate, format_number, truthiness};
use crate::context::{Context, Obfuscation};
use crate::error::TransformResult;
use crate::transformer::{Transformer, TransformerKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimplifyOptions {
    /// Longest string (in UTF-16 units) a concatenation may fold into
    pub max_string_length: usize,
}

impl Default for SimplifyOptions {
    fn default() -> Self {
        Self {
            max_string_length: 1024,
        }
    }
}

/// Folds operator trees over literals (`0x1 + 0x2`, `!![]`, `'a' + 'b'`),
/// short-circuits logical and conditional expressions with known tests,
/// drops redundant parentheses and escape-heavy literal spellings.
#[derive(Debug)]
pub struct Simplify {
    options: SimplifyOptions,
}

impl Simplify {
    pub fn new(options: SimplifyOptions) -> Self {
        Self { options }
    }
}

impl Transformer for Simplify {
    fn name(&self) -> &str {
        TransformerKind::Simplify.name()
    }

    fn transform(&self, context: &mut Context) -> TransformResult<()> {
        let mut simplifier = Simplifier {
            max_string_length: self.options.max_string_length,
            folded: 0,
            escaped: 0,
        };
        context.ast.visit_mut_with(&mut simplifier);

        context.report(Obfuscation::new(
            self.name(),
            "constant-expressions",
            simplifier.folded,
        ));
        context.report(Obfuscation::new(
            self.name(),
            "escaped-literals",
            simplifier.escaped,
        ));
        Ok(())
    }
}

struct Simplifier {
    max_string_length: usize,
    folded: usize,
    escaped: usize,
}

/// Already as simple as folding can make it
fn is_canonical(expr: &Expr) -> bool {
    match expr {
        Expr::Lit(_) => true,
        Expr::Unary(UnaryExpr {
            op: UnaryOp::Minus | UnaryOp::Void,
            arg,
            ..
        }) => matches!(**arg, Expr::Lit(Lit::Num(_))),
        _ => false,
    }
}

impl Simplifier {
    fn fold(&mut self, expr: &mut Expr) {
        if is_canonical(expr)
            || !matches!(
                expr,
                Expr::Unary(_) | Expr::Bin(_) | Expr::Cond(_) | Expr::Tpl(_)
            )
        {
            return;
        }

        if let Some(value) = evaluate(expr) {
            if let Value::String(units) = &value
                && units.len() > self.max_string_length
            {
                return;
            }
            if let Some(folded) = value.to_expr(expr.span()) {
                *expr = folded;
                self.folded += 1;
            }
            return;
        }

        // Partial folds: the deciding operand is known, the other is not
        match expr {
            Expr::Bin(bin)
                if matches!(
                    bin.op,
                    BinaryOp::LogicalAnd | BinaryOp::LogicalOr | BinaryOp::NullishCoalescing
                ) =>
            {
                let Some(left) = evaluate(&bin.left) else {
                    return;
                };
                let take_right = match bin.op {
                    BinaryOp::LogicalAnd => left.to_boolean(),
                    BinaryOp::LogicalOr => !left.to_boolean(),
                    _ => matches!(left, Value::Null | Value::Undefined),
                };
                *expr = if take_right {
                    *bin.right.take()
                } else {
                    *bin.left.take()
                };
                self.folded += 1;
            }
            Expr::Cond(cond) => {
                let Some(test) = truthiness(&cond.test) else {
                    return;
                };
                *expr = if test {
                    *cond.cons.take()
                } else {
                    *cond.alt.take()
                };
                self.folded += 1;
            }
            _ => {}
        }
    }
}

impl VisitMut for Simplifier {
    fn visit_mut_expr(&mut self, expr: &mut Expr) {
        expr.visit_mut_children_with(self);

        // Parentheses around an optional chain end its short-circuit
        if let Expr::Paren(paren) = expr
            && !matches!(unparen(&paren.expr), Expr::OptChain(_))
        {
            *expr = *paren.expr.take();
            while let Expr::Paren(inner) = expr {
                if matches!(*inner.expr, Expr::OptChain(_)) {
                    break;
                }
                *expr = *inner.expr.take();
            }
        }

        self.fold(expr);
    }

    fn visit_mut_str(&mut self, s: &mut Str) {
        if let Some(raw) = &s.raw
            && (raw.contains("\\x") || raw.contains("\\u"))
        {
            s.raw = None;
            self.escaped += 1;
        }
    }

    fn visit_mut_number(&mut self, n: &mut Number) {
        if let Some(raw) = &n.raw
            && let Some(plain) = format_number(n.value)
            && raw.as_str() != plain
        {
            n.raw = None;
            self.escaped += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::transformer::TransformerKind;
    use crate::transformers::test_utils::{js, run_pass};

    fn simplify(source: &str) -> String {
        run_pass(TransformerKind::Simplify, source)
    }

    #[test]
    fn test_folds_arithmetic() {
        assert_eq!(simplify("x = 0x1 + 0x2 * 0x3;"), js("x = 7;"));
        assert_eq!(simplify("x = -0x1 - 0x1;"), js("x = -2;"));
    }

    #[test]
    fn test_folds_obfuscated_booleans() {
        assert_eq!(simplify("x = !![];"), js("x = true;"));
        assert_eq!(simplify("x = ![];"), js("x = false;"));
        assert_eq!(simplify("while (!![]) {}"), js("while (true) {}"));
    }

    #[test]
    fn test_folds_string_comparisons() {
        assert_eq!(
            simplify("if ('abc' !== 'abc') { a(); } else { b(); }"),
            js("if (false) { a(); } else { b(); }")
        );
    }

    #[test]
    fn test_concatenates_strings() {
        assert_eq!(simplify("x = 'he' + 'llo';"), js("x = \"hello\";"));
    }

    #[test]
    fn test_respects_max_string_length() {
        let output = crate::transformers::test_utils::run_pass_with(
            TransformerKind::Simplify,
            serde_json::json!({ "max_string_length": 3 }),
            "x = 'he' + 'llo';",
        );
        assert_eq!(output, js("x = 'he' + 'llo';"));
    }

    #[test]
    fn test_partial_logical() {
        assert_eq!(simplify("x = true && y;"), js("x = y;"));
        assert_eq!(simplify("x = 0 || y;"), js("x = y;"));
        assert_eq!(simplify("x = 1 ? y : z;"), js("x = y;"));
        assert_eq!(simplify("x = function () {} ? y : z;"), js("x = y;"));
    }

    #[test]
    fn test_leaves_unknowns() {
        assert_eq!(simplify("x = a + 1;"), js("x = a + 1;"));
        assert_eq!(simplify("x = typeof a;"), js("x = typeof a;"));
        assert_eq!(simplify("x = -0;"), js("x = -0;"));
        assert_eq!(simplify("x = 1 / 0;"), js("x = 1 / 0;"));
    }

    #[test]
    fn test_normalizes_escapes_and_hex() {
        assert_eq!(simplify("x = '\\x61\\x62';"), js("x = \"ab\";"));
        assert_eq!(simplify("x = 0x10;"), js("x = 16;"));
    }

    #[test]
    fn test_keeps_chain_parens() {
        assert_eq!(simplify("x = (a?.b).c;"), js("x = (a?.b).c;"));
        assert_eq!(simplify("x = ((a)).b;"), js("x = a.b;"));
    }
}
