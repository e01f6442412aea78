//! Transformer contract and the built-in pass registry.
//!
//! Built-in passes form a closed set ([`TransformerKind`]). A pass is built
//! from a `(name, options)` pair: the caller's options are laid over the
//! pass defaults and the result is validated against the pass's option
//! struct, so unknown names and unknown option keys fail while the pipeline
//! is being built rather than halfway through a run.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::TransformerSpec;
use crate::context::Context;
use crate::error::{ConfigError, TransformResult};
use crate::transformers::{
    control_flow::{ControlFlow, ControlFlowOptions},
    dead_code::{DeadCode, DeadCodeOptions},
    demangle::{Demangle, DemangleOptions},
    desequence::{Desequence, DesequenceOptions},
    literal_map::{LiteralMap, LiteralMapOptions},
    member_expression_cleaner::{MemberExpressionCleaner, MemberExpressionCleanerOptions},
    rename::{Rename, RenameOptions},
    simplify::{Simplify, SimplifyOptions},
    string_decoder::{StringDecoder, StringDecoderOptions},
};

/// A pipeline pass.
///
/// A pass mutates `context.ast` in place and may report findings. It must
/// cope with trees already rewritten by earlier passes and with being run
/// more than once per pipeline. Returning an error aborts the whole run.
pub trait Transformer: Send + Sync {
    /// Stable pass name
    fn name(&self) -> &str;

    /// Apply the pass to the context's tree
    fn transform(&self, context: &mut Context) -> TransformResult<()>;
}

/// Built-in passes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformerKind {
    Simplify,
    MemberExpressionCleaner,
    LiteralMap,
    DeadCode,
    Demangle,
    StringDecoder,
    Desequence,
    ControlFlow,
    Rename,
}

impl TransformerKind {
    pub const ALL: [TransformerKind; 9] = [
        TransformerKind::Simplify,
        TransformerKind::MemberExpressionCleaner,
        TransformerKind::LiteralMap,
        TransformerKind::DeadCode,
        TransformerKind::Demangle,
        TransformerKind::StringDecoder,
        TransformerKind::Desequence,
        TransformerKind::ControlFlow,
        TransformerKind::Rename,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TransformerKind::Simplify => "Simplify",
            TransformerKind::MemberExpressionCleaner => "MemberExpressionCleaner",
            TransformerKind::LiteralMap => "LiteralMap",
            TransformerKind::DeadCode => "DeadCode",
            TransformerKind::Demangle => "Demangle",
            TransformerKind::StringDecoder => "StringDecoder",
            TransformerKind::Desequence => "Desequence",
            TransformerKind::ControlFlow => "ControlFlow",
            TransformerKind::Rename => "Rename",
        }
    }

    /// Default options as a JSON object
    pub fn default_options(self) -> Value {
        let value = match self {
            TransformerKind::Simplify => serde_json::to_value(SimplifyOptions::default()),
            TransformerKind::MemberExpressionCleaner => {
                serde_json::to_value(MemberExpressionCleanerOptions::default())
            }
            TransformerKind::LiteralMap => serde_json::to_value(LiteralMapOptions::default()),
            TransformerKind::DeadCode => serde_json::to_value(DeadCodeOptions::default()),
            TransformerKind::Demangle => serde_json::to_value(DemangleOptions::default()),
            TransformerKind::StringDecoder => {
                serde_json::to_value(StringDecoderOptions::default())
            }
            TransformerKind::Desequence => serde_json::to_value(DesequenceOptions::default()),
            TransformerKind::ControlFlow => serde_json::to_value(ControlFlowOptions::default()),
            TransformerKind::Rename => serde_json::to_value(RenameOptions::default()),
        };
        value.unwrap_or_else(|_| Value::Object(Default::default()))
    }

    /// Build the pass with `options` merged over its defaults.
    ///
    /// `options` must be `null` or a JSON object.
    pub fn build(self, options: &Value) -> Result<ResolvedTransformer, ConfigError> {
        let name = self.name();
        let (instance, merged): (Arc<dyn Transformer>, Value) = match self {
            TransformerKind::Simplify => {
                let (opts, merged) = merge::<SimplifyOptions>(name, options)?;
                (Arc::new(Simplify::new(opts)), merged)
            }
            TransformerKind::MemberExpressionCleaner => {
                let (opts, merged) = merge::<MemberExpressionCleanerOptions>(name, options)?;
                (Arc::new(MemberExpressionCleaner::new(opts)), merged)
            }
            TransformerKind::LiteralMap => {
                let (opts, merged) = merge::<LiteralMapOptions>(name, options)?;
                (Arc::new(LiteralMap::new(opts)), merged)
            }
            TransformerKind::DeadCode => {
                let (opts, merged) = merge::<DeadCodeOptions>(name, options)?;
                (Arc::new(DeadCode::new(opts)), merged)
            }
            TransformerKind::Demangle => {
                let (opts, merged) = merge::<DemangleOptions>(name, options)?;
                (Arc::new(Demangle::new(opts)), merged)
            }
            TransformerKind::StringDecoder => {
                let (opts, merged) = merge::<StringDecoderOptions>(name, options)?;
                (Arc::new(StringDecoder::new(opts)), merged)
            }
            TransformerKind::Desequence => {
                let (opts, merged) = merge::<DesequenceOptions>(name, options)?;
                (Arc::new(Desequence::new(opts)), merged)
            }
            TransformerKind::ControlFlow => {
                let (opts, merged) = merge::<ControlFlowOptions>(name, options)?;
                (Arc::new(ControlFlow::new(opts)), merged)
            }
            TransformerKind::Rename => {
                let (opts, merged) = merge::<RenameOptions>(name, options)?;
                (Arc::new(Rename::new(opts)), merged)
            }
        };

        Ok(ResolvedTransformer {
            name: name.to_string(),
            options: merged,
            instance,
        })
    }
}

impl fmt::Display for TransformerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TransformerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| ConfigError::UnknownTransformer(s.to_string()))
    }
}

/// Lay `user` over the defaults of `T` and validate the result.
fn merge<T>(name: &str, user: &Value) -> Result<(T, Value), ConfigError>
where
    T: Default + Serialize + DeserializeOwned,
{
    let invalid = |message: String| ConfigError::InvalidOptions {
        transformer: name.to_string(),
        message,
    };

    let mut merged = serde_json::to_value(T::default()).map_err(|e| invalid(e.to_string()))?;
    match (user, &mut merged) {
        (Value::Null, _) => {}
        (Value::Object(overrides), Value::Object(base)) => {
            for (key, value) in overrides {
                base.insert(key.clone(), value.clone());
            }
        }
        (other, _) => {
            return Err(invalid(format!("expected an object, got {other}")));
        }
    }

    let options = T::deserialize(&merged).map_err(|e| invalid(e.to_string()))?;
    Ok((options, merged))
}

/// A pass ready to run: name, effective options and instance.
#[derive(Clone)]
pub struct ResolvedTransformer {
    name: String,
    options: Value,
    instance: Arc<dyn Transformer>,
}

impl ResolvedTransformer {
    /// Resolve one entry of a pass list
    pub fn resolve(spec: &TransformerSpec) -> Result<Self, ConfigError> {
        match spec {
            TransformerSpec::Named { name, options } => name.parse::<TransformerKind>()?.build(options),
            TransformerSpec::Instance(instance) => Ok(Self::from_instance(Arc::clone(instance))),
        }
    }

    /// Wrap a caller-supplied pass. Its options are opaque to the pipeline.
    pub fn from_instance(instance: Arc<dyn Transformer>) -> Self {
        Self {
            name: instance.name().to_string(),
            options: Value::Object(Default::default()),
            instance,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Effective options after merging
    pub fn options(&self) -> &Value {
        &self.options
    }

    pub fn instance(&self) -> &Arc<dyn Transformer> {
        &self.instance
    }
}

impl fmt::Debug for ResolvedTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedTransformer")
            .field("name", &self.name)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
