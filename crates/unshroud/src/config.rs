//! Configuration types for the deobfuscation pipeline.
//!
//! [`Config`] is a flat record read by the pipeline. It is never mutated by a
//! run, so a single value can be shared across many invocations.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use swc_ecma_ast::EsVersion;

use crate::error::ConfigError;
use crate::format::{CodegenFormatter, Formatter};
use crate::logger::{Logger, default_logger};
use crate::transformer::Transformer;

/// Grammar used to parse the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// ES module grammar (strict mode, import/export allowed)
    Module,
    /// Classic script grammar
    Script,
    /// Try module first, fall back to script
    #[default]
    Both,
}

impl SourceType {
    /// Whether this is the module grammar
    pub fn is_module(self) -> bool {
        self == SourceType::Module
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourceType::Module => "module",
            SourceType::Script => "script",
            SourceType::Both => "both",
        })
    }
}

impl FromStr for SourceType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "module" => Ok(SourceType::Module),
            "script" => Ok(SourceType::Script),
            "both" => Ok(SourceType::Both),
            _ => Err(ConfigError::InvalidSourceType(s.to_string())),
        }
    }
}

/// ECMAScript grammar version.
///
/// Accepts `latest`, edition numbers (`3`, `5`, `6`..`16`), years
/// (`2015`..) and `esNNNN` spellings. Editions newer than the parser knows
/// map to the newest grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "EcmaVersionRepr", into = "String")]
pub struct EcmaVersion(EsVersion);

impl EcmaVersion {
    /// The newest grammar the parser supports
    pub const LATEST: EcmaVersion = EcmaVersion(EsVersion::EsNext);

    /// The SWC target this version maps to
    pub fn es_version(self) -> EsVersion {
        self.0
    }
}

impl Default for EcmaVersion {
    fn default() -> Self {
        Self::LATEST
    }
}

impl From<EsVersion> for EcmaVersion {
    fn from(version: EsVersion) -> Self {
        Self(version)
    }
}

impl FromStr for EcmaVersion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        if normalized == "latest" || normalized == "esnext" {
            return Ok(Self::LATEST);
        }
        let digits = normalized.strip_prefix("es").unwrap_or(&normalized);
        let number: u32 = digits
            .parse()
            .map_err(|_| ConfigError::InvalidEcmaVersion(s.to_string()))?;
        Self::from_number(number).ok_or_else(|| ConfigError::InvalidEcmaVersion(s.to_string()))
    }
}

impl EcmaVersion {
    fn from_number(number: u32) -> Option<Self> {
        // Editions 6+ are numbered by year from 2015 onwards
        let year = match number {
            3 => return Some(Self(EsVersion::Es3)),
            5 => return Some(Self(EsVersion::Es5)),
            6..=99 => 2009 + number,
            2015.. => number,
            _ => return None,
        };
        let version = match year {
            2015 => EsVersion::Es2015,
            2016 => EsVersion::Es2016,
            2017 => EsVersion::Es2017,
            2018 => EsVersion::Es2018,
            2019 => EsVersion::Es2019,
            2020 => EsVersion::Es2020,
            2021 => EsVersion::Es2021,
            2022 => EsVersion::Es2022,
            _ => EsVersion::EsNext,
        };
        Some(Self(version))
    }
}

impl fmt::Display for EcmaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.0 {
            EsVersion::Es3 => "es3",
            EsVersion::Es5 => "es5",
            EsVersion::Es2015 => "es2015",
            EsVersion::Es2016 => "es2016",
            EsVersion::Es2017 => "es2017",
            EsVersion::Es2018 => "es2018",
            EsVersion::Es2019 => "es2019",
            EsVersion::Es2020 => "es2020",
            EsVersion::Es2021 => "es2021",
            EsVersion::Es2022 => "es2022",
            _ => "latest",
        };
        f.write_str(name)
    }
}

impl From<EcmaVersion> for String {
    fn from(version: EcmaVersion) -> Self {
        version.to_string()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EcmaVersionRepr {
    Number(u32),
    Text(String),
}

impl TryFrom<EcmaVersionRepr> for EcmaVersion {
    type Error = ConfigError;

    fn try_from(repr: EcmaVersionRepr) -> Result<Self, Self::Error> {
        match repr {
            EcmaVersionRepr::Number(n) => {
                Self::from_number(n).ok_or_else(|| ConfigError::InvalidEcmaVersion(n.to_string()))
            }
            EcmaVersionRepr::Text(s) => s.parse(),
        }
    }
}

/// One entry of a custom pass list.
#[derive(Clone, Deserialize)]
#[serde(from = "NamedTransformer")]
pub enum TransformerSpec {
    /// A built-in pass looked up by name, with options merged over its defaults
    Named {
        /// Pass name, e.g. `"Simplify"`
        name: String,
        /// Caller options (a JSON object; `null` means "defaults")
        options: Value,
    },
    /// A caller-supplied pass instance
    Instance(Arc<dyn Transformer>),
}

impl TransformerSpec {
    /// A built-in pass with default options
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named {
            name: name.into(),
            options: Value::Null,
        }
    }

    /// A built-in pass with caller options
    pub fn with_options(name: impl Into<String>, options: Value) -> Self {
        Self::Named {
            name: name.into(),
            options,
        }
    }

    /// A caller-supplied pass
    pub fn instance(transformer: impl Transformer + 'static) -> Self {
        Self::Instance(Arc::new(transformer))
    }
}

impl fmt::Debug for TransformerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformerSpec::Named { name, options } => f
                .debug_struct("Named")
                .field("name", name)
                .field("options", options)
                .finish(),
            TransformerSpec::Instance(t) => f.debug_tuple("Instance").field(&t.name()).finish(),
        }
    }
}

#[derive(Deserialize)]
struct NamedTransformer {
    name: String,
    #[serde(default)]
    options: Map<String, Value>,
}

impl From<NamedTransformer> for TransformerSpec {
    fn from(named: NamedTransformer) -> Self {
        TransformerSpec::Named {
            name: named.name,
            options: Value::Object(named.options),
        }
    }
}

/// Pipeline configuration.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Parser grammar version.
    /// Default: latest
    pub ecma_version: EcmaVersion,

    /// Rewrite optional chains for the formatter (deprecated, kept for compatibility).
    /// Default: true
    pub transform_chain_expressions: bool,

    /// Replaces the default pass list when non-empty.
    /// Default: empty
    pub custom_transformers: Vec<TransformerSpec>,

    /// Run the rename sub-pipeline after the main passes.
    /// Default: false
    pub rename: bool,

    /// Grammar selection.
    /// Default: both
    pub source_type: SourceType,

    /// Use the error-tolerant parser.
    /// Default: false
    pub loose: bool,

    /// Parse with the TypeScript grammar.
    /// Default: false
    pub typescript: bool,

    /// Run the cosmetic formatter on text output.
    /// Default: true
    pub format: bool,

    /// Suppress logger output.
    /// Default: false
    pub quiet: bool,

    /// Logging capability handed to every pass.
    #[serde(skip, default = "default_logger")]
    pub logger: Arc<dyn Logger>,

    /// Formatter used for text output.
    #[serde(skip, default = "default_formatter")]
    pub formatter: Arc<dyn Formatter>,
}

fn default_formatter() -> Arc<dyn Formatter> {
    Arc::new(CodegenFormatter)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ecma_version: EcmaVersion::LATEST,
            transform_chain_expressions: true,
            custom_transformers: Vec::new(),
            rename: false,
            source_type: SourceType::Both,
            loose: false,
            typescript: false,
            format: true,
            quiet: false,
            logger: default_logger(),
            formatter: default_formatter(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("ecma_version", &self.ecma_version)
            .field("transform_chain_expressions", &self.transform_chain_expressions)
            .field("custom_transformers", &self.custom_transformers)
            .field("rename", &self.rename)
            .field("source_type", &self.source_type)
            .field("loose", &self.loose)
            .field("typescript", &self.typescript)
            .field("format", &self.format)
            .field("quiet", &self.quiet)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Create a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the parser grammar version.
    pub fn ecma_version(mut self, version: impl Into<EcmaVersion>) -> Self {
        self.ecma_version = version.into();
        self
    }

    /// Enable or disable the chain-expression compatibility rewrite.
    pub fn transform_chain_expressions(mut self, enabled: bool) -> Self {
        self.transform_chain_expressions = enabled;
        self
    }

    /// Replace the default pass list.
    pub fn custom_transformers(mut self, transformers: Vec<TransformerSpec>) -> Self {
        self.custom_transformers = transformers;
        self
    }

    /// Enable or disable the rename sub-pipeline.
    pub fn rename(mut self, enabled: bool) -> Self {
        self.rename = enabled;
        self
    }

    /// Set the grammar selection.
    pub fn source_type(mut self, source_type: SourceType) -> Self {
        self.source_type = source_type;
        self
    }

    /// Enable or disable loose parsing.
    pub fn loose(mut self, enabled: bool) -> Self {
        self.loose = enabled;
        self
    }

    /// Enable or disable the TypeScript grammar.
    pub fn typescript(mut self, enabled: bool) -> Self {
        self.typescript = enabled;
        self
    }

    /// Enable or disable cosmetic formatting of text output.
    pub fn format(mut self, enabled: bool) -> Self {
        self.format = enabled;
        self
    }

    /// Suppress logger output.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Inject a logger.
    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Inject a formatter.
    pub fn formatter(mut self, formatter: Arc<dyn Formatter>) -> Self {
        self.formatter = formatter;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.ecma_version, EcmaVersion::LATEST);
        assert!(config.transform_chain_expressions);
        assert!(config.custom_transformers.is_empty());
        assert!(!config.rename);
        assert_eq!(config.source_type, SourceType::Both);
        assert!(!config.loose);
        assert!(config.format);
        assert!(!config.quiet);
    }

    #[test]
    fn test_builder_pattern() {
        let config = Config::new()
            .rename(true)
            .loose(true)
            .source_type(SourceType::Script)
            .ecma_version(EsVersion::Es2020);

        assert!(config.rename);
        assert!(config.loose);
        assert_eq!(config.source_type, SourceType::Script);
        assert_eq!(config.ecma_version.es_version(), EsVersion::Es2020);
    }

    #[test]
    fn test_ecma_version_spellings() {
        assert_eq!("latest".parse::<EcmaVersion>().unwrap(), EcmaVersion::LATEST);
        assert_eq!(
            "5".parse::<EcmaVersion>().unwrap().es_version(),
            EsVersion::Es5
        );
        assert_eq!(
            "6".parse::<EcmaVersion>().unwrap().es_version(),
            EsVersion::Es2015
        );
        assert_eq!(
            "es2019".parse::<EcmaVersion>().unwrap().es_version(),
            EsVersion::Es2019
        );
        assert_eq!(
            "2030".parse::<EcmaVersion>().unwrap().es_version(),
            EsVersion::EsNext
        );
        assert!("4".parse::<EcmaVersion>().is_err());
        assert!("modern".parse::<EcmaVersion>().is_err());
    }

    #[test]
    fn test_source_type_parse() {
        assert_eq!("Module".parse::<SourceType>().unwrap(), SourceType::Module);
        assert_eq!("script".parse::<SourceType>().unwrap(), SourceType::Script);
        assert!(matches!(
            "esm".parse::<SourceType>(),
            Err(ConfigError::InvalidSourceType(_))
        ));
    }

    #[test]
    fn test_deserialize_from_json() {
        let config: Config = serde_json::from_value(serde_json::json!({
            "ecma_version": 2020,
            "rename": true,
            "source_type": "script",
            "custom_transformers": [
                { "name": "Simplify" },
                { "name": "MemberExpressionCleaner", "options": { "object_keys": false } }
            ]
        }))
        .unwrap();

        assert_eq!(config.ecma_version.es_version(), EsVersion::Es2020);
        assert!(config.rename);
        assert_eq!(config.source_type, SourceType::Script);
        assert_eq!(config.custom_transformers.len(), 2);
        match &config.custom_transformers[1] {
            TransformerSpec::Named { name, options } => {
                assert_eq!(name, "MemberExpressionCleaner");
                assert_eq!(options["object_keys"], Value::Bool(false));
            }
            other => panic!("unexpected spec {other:?}"),
        }
        // Unset fields keep their defaults
        assert!(config.format);
        assert!(config.transform_chain_expressions);
    }
}
