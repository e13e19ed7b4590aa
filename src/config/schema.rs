use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Per-attribute options. Opaque to the scorer; each attribute interprets its own keys.
pub type AttributeOptions = Map<String, Value>;

/// Top-level configuration document.
///
/// Example JSON:
/// ```json
/// {
///   "options": {
///     "datasource": { "database": "ghtorrent.db" },
///     "on_attribute_error": "skip"
///   },
///   "attributes": [
///     { "name": "loc", "enabled": true, "weight": 2, "options": { "extensions": ["rs"] } },
///     { "name": "license", "enabled": false, "weight": 1 }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Config {
    pub options: Options,
    pub attributes: Vec<AttributeSpec>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Options {
    /// Connection parameters, handed to the datasource connector untouched
    pub datasource: Value,

    /// What to do when an attribute fails while scoring
    #[serde(default)]
    pub on_attribute_error: FailurePolicy,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log the failure, count the attribute as 0 and keep going
    #[default]
    Skip,
    /// Stop scoring and report the failure
    Abort,
}

/// A declared attribute. `weight` only matters when `enabled` is true.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AttributeSpec {
    pub name: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_weight")]
    pub weight: f64,

    #[serde(default)]
    pub options: AttributeOptions,
}

fn default_enabled() -> bool {
    true
}

fn default_weight() -> f64 {
    1.0
}

impl AttributeSpec {
    pub fn new(name: impl Into<String>, weight: f64) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            weight,
            options: AttributeOptions::new(),
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}
