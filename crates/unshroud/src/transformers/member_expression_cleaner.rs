//! Computed member access with string keys back to dot access.

use serde::{Deserialize, Serialize};
use swc_ecma_ast::{IdentName, MemberExpr, MemberProp, PropName, SuperProp, SuperPropExpr};
use swc_ecma_visit::{VisitMut, VisitMutWith};

use super::utils::{is_identifier_name, str_value};
use crate::context::{Context, Obfuscation};
use crate::error::TransformResult;
use crate::transformer::{Transformer, TransformerKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemberExpressionCleanerOptions {
    /// Also turn quoted object and class keys into plain ones
    pub object_keys: bool,
}

impl Default for MemberExpressionCleanerOptions {
    fn default() -> Self {
        Self { object_keys: true }
    }
}

/// `a["log"]` → `a.log`, `{ "key": 1 }` → `{ key: 1 }`
#[derive(Debug)]
pub struct MemberExpressionCleaner {
    options: MemberExpressionCleanerOptions,
}

impl MemberExpressionCleaner {
    pub fn new(options: MemberExpressionCleanerOptions) -> Self {
        Self { options }
    }
}

impl Transformer for MemberExpressionCleaner {
    fn name(&self) -> &str {
        TransformerKind::MemberExpressionCleaner.name()
    }

    fn transform(&self, context: &mut Context) -> TransformResult<()> {
        let mut cleaner = Cleaner {
            object_keys: self.options.object_keys,
            members: 0,
            keys: 0,
        };
        context.ast.visit_mut_with(&mut cleaner);

        context.report(Obfuscation::new(
            self.name(),
            "computed-member-access",
            cleaner.members,
        ));
        context.report(Obfuscation::new(self.name(), "quoted-keys", cleaner.keys));
        Ok(())
    }
}

struct Cleaner {
    object_keys: bool,
    members: usize,
    keys: usize,
}

fn identifier_key(expr: &swc_ecma_ast::Expr) -> Option<IdentName> {
    let key = str_value(expr)?;
    is_identifier_name(key).then(|| IdentName::new(key.into(), swc_common::DUMMY_SP))
}

impl VisitMut for Cleaner {
    fn visit_mut_member_expr(&mut self, member: &mut MemberExpr) {
        member.visit_mut_children_with(self);

        if let MemberProp::Computed(computed) = &member.prop
            && let Some(mut name) = identifier_key(&computed.expr)
        {
            name.span = computed.span;
            member.prop = MemberProp::Ident(name);
            self.members += 1;
        }
    }

    fn visit_mut_super_prop_expr(&mut self, super_prop: &mut SuperPropExpr) {
        super_prop.visit_mut_children_with(self);

        if let SuperProp::Computed(computed) = &super_prop.prop
            && let Some(mut name) = identifier_key(&computed.expr)
        {
            name.span = computed.span;
            super_prop.prop = SuperProp::Ident(name);
            self.members += 1;
        }
    }

    fn visit_mut_prop_name(&mut self, prop: &mut PropName) {
        prop.visit_mut_children_with(self);
        if !self.object_keys {
            return;
        }

        let replacement = match prop {
            PropName::Str(s) => s
                .value
                .as_str()
                .filter(|key| is_identifier_name(key))
                .map(|key| IdentName::new(key.into(), s.span)),
            // Computed `__proto__`/`constructor` keys define plain properties
            PropName::Computed(computed) => identifier_key(&computed.expr)
                .filter(|name| !matches!(name.sym.as_str(), "__proto__" | "constructor")),
            _ => None,
        };
        if let Some(name) = replacement {
            *prop = PropName::Ident(name);
            self.keys += 1;
        }
    }
}
