//! Cosmetic formatting of generated code.
//!
//! The default [`CodegenFormatter`] re-parses the generated text in the
//! resolved grammar, applies the optional-chaining compatibility rewrite and
//! literal canonicalization, and re-emits. Formatting is best effort: the
//! pipeline logs a [`FormatError`] and keeps the unformatted text.

use swc_common::util::take::Take;
use swc_ecma_ast::{
    Callee, Expr, MemberExpr, NewExpr, Number, OptCall, OptChainBase, OptChainExpr, Str,
    TaggedTpl,
};
use swc_ecma_visit::{VisitMut, VisitMutWith};

use crate::codegen;
use crate::error::FormatError;
use crate::parser::{ParseOptions, parse};

/// Settings handed to a [`Formatter`]
#[derive(Debug, Clone, Copy)]
pub struct FormatOptions {
    /// Parse settings with the grammar already resolved
    pub parse: ParseOptions,
    /// Apply the optional-chaining compatibility rewrite
    pub transform_chain_expressions: bool,
}

/// Reformats generated code
pub trait Formatter: Send + Sync {
    fn format(&self, code: &str, options: &FormatOptions) -> Result<String, FormatError>;
}

/// Re-parse and re-emit with canonical spellings
#[derive(Debug, Clone, Copy, Default)]
pub struct CodegenFormatter;

impl Formatter for CodegenFormatter {
    fn format(&self, code: &str, options: &FormatOptions) -> Result<String, FormatError> {
        let mut program = parse(code, &options.parse)?.program;

        if options.transform_chain_expressions {
            let mut shim = ChainExpressionShim::default();
            program.visit_mut_with(&mut shim);
            tracing::trace!(
                calls = shim.optional_calls,
                members = shim.optional_members,
                "chain expression shim"
            );
        }
        program.visit_mut_with(&mut LiteralCanonicalizer);

        Ok(codegen::emit(
            &program,
            options.parse.ecma_version.es_version(),
        )?)
    }
}

/// Normalizes optional-chaining nodes.
///
/// Every chain is classified by its base (optional call or optional member
/// access) and its span is re-stamped from that inner node. Parentheses
/// directly around a chain are dropped unless they end the short-circuit,
/// which is the case when the parenthesized chain is the object of a member
/// access, a callee, or a template tag.
#[derive(Debug, Default)]
pub struct ChainExpressionShim {
    /// Chains whose base is an optional call
    pub optional_calls: usize,
    /// Chains whose base is an optional member access
    pub optional_members: usize,
}

impl ChainExpressionShim {
    /// Visit `expr` without unwrapping parentheses at its root
    fn visit_guarded(&mut self, expr: &mut Box<Expr>) {
        expr.visit_mut_children_with(self);
    }
}

impl VisitMut for ChainExpressionShim {
    fn visit_mut_expr(&mut self, expr: &mut Expr) {
        expr.visit_mut_children_with(self);

        if let Expr::Paren(paren) = expr
            && matches!(*paren.expr, Expr::OptChain(_))
        {
            *expr = *paren.expr.take();
        }
    }

    fn visit_mut_opt_chain_expr(&mut self, chain: &mut OptChainExpr) {
        chain.visit_mut_children_with(self);

        chain.span = match &*chain.base {
            OptChainBase::Call(call) => {
                self.optional_calls += 1;
                call.span
            }
            OptChainBase::Member(member) => {
                self.optional_members += 1;
                member.span
            }
        };
    }

    fn visit_mut_member_expr(&mut self, member: &mut MemberExpr) {
        self.visit_guarded(&mut member.obj);
        member.prop.visit_mut_with(self);
    }

    fn visit_mut_callee(&mut self, callee: &mut Callee) {
        match callee {
            Callee::Expr(expr) => self.visit_guarded(expr),
            _ => callee.visit_mut_children_with(self),
        }
    }

    fn visit_mut_opt_call(&mut self, call: &mut OptCall) {
        self.visit_guarded(&mut call.callee);
        call.args.visit_mut_with(self);
    }

    fn visit_mut_tagged_tpl(&mut self, tagged: &mut TaggedTpl) {
        self.visit_guarded(&mut tagged.tag);
        tagged.tpl.visit_mut_with(self);
    }

    fn visit_mut_new_expr(&mut self, new: &mut NewExpr) {
        self.visit_guarded(&mut new.callee);
        new.args.visit_mut_with(self);
    }
}

/// Drops the source spelling of string and number literals so the emitter
/// writes them canonically (`0x10` → `16`, `'\x61'` → `"a"`).
pub struct LiteralCanonicalizer;

impl VisitMut for LiteralCanonicalizer {
    fn visit_mut_str(&mut self, s: &mut Str) {
        s.raw = None;
    }

    fn visit_mut_number(&mut self, n: &mut Number) {
        n.raw = None;
    }
}
