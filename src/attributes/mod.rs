//! Pluggable attribute calculators.
//!
//! An attribute measures one property of a repository and returns a raw,
//! unweighted number. Attributes are looked up by name in an
//! [`AttributeRegistry`]; the scorer applies weights and sums the results.
//!
//! ```
//! use repo_score::attributes::{Attribute, AttributeRegistry};
//! use repo_score::config::AttributeOptions;
//! use repo_score::datasource::Cursor;
//! use repo_score::repository::RepositoryTarget;
//!
//! struct Constant;
//!
//! impl Attribute for Constant {
//!     fn run(
//!         &self,
//!         _target: &RepositoryTarget,
//!         _cursor: &mut Cursor<'_>,
//!         _options: &AttributeOptions,
//!     ) -> anyhow::Result<f64> {
//!         Ok(1.0)
//!     }
//! }
//!
//! let mut registry = AttributeRegistry::with_builtins();
//! registry.register("constant", || Box::new(Constant));
//! assert!(registry.contains("constant"));
//! ```

mod license;
mod loc;
mod registry;
mod stars;

pub use license::License;
pub use loc::Loc;
pub use registry::{AttributeFactory, AttributeRegistry, ResolvedAttribute, UnknownAttribute};
pub use stars::Stars;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::AttributeOptions;
use crate::datasource::Cursor;
use crate::repository::RepositoryTarget;

/// The contract every attribute implements.
///
/// `cursor` is fresh for this call and is released when the call returns.
/// `options` is the attribute's own section of the config, passed through
/// without validation; the implementation decides what it accepts.
pub trait Attribute {
    fn run(
        &self,
        target: &RepositoryTarget,
        cursor: &mut Cursor<'_>,
        options: &AttributeOptions,
    ) -> Result<f64>;
}

/// Deserialize an attribute's options into its own settings type
pub fn parse_options<T: DeserializeOwned>(attribute: &str, options: &AttributeOptions) -> Result<T> {
    serde_json::from_value(Value::Object(options.clone()))
        .with_context(|| format!("Invalid options for the {} attribute", attribute))
}
