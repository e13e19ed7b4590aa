use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

use super::{parse_options, Attribute};
use crate::config::AttributeOptions;
use crate::datasource::Cursor;
use crate::repository::RepositoryTarget;

const DEFAULT_NAMES: &[&str] = &["LICENSE", "LICENCE", "COPYING"];

/// 1.0 if a license file sits at the repository root, 0.0 otherwise.
///
/// File names are matched case-insensitively by prefix, so `LICENSE-MIT` and
/// `license.txt` both count. `names` overrides the accepted prefixes.
pub struct License;

impl License {
    pub const NAME: &'static str = "license";
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LicenseOptions {
    #[serde(default)]
    names: Option<Vec<String>>,
}

impl Attribute for License {
    fn run(
        &self,
        target: &RepositoryTarget,
        _cursor: &mut Cursor<'_>,
        options: &AttributeOptions,
    ) -> Result<f64> {
        let options: LicenseOptions = parse_options(Self::NAME, options)?;
        let prefixes: Vec<String> = match options.names {
            Some(names) => names.iter().map(|n| n.to_ascii_uppercase()).collect(),
            None => DEFAULT_NAMES.iter().map(|n| n.to_string()).collect(),
        };

        let root = target.path();
        let entries = fs::read_dir(root)
            .with_context(|| format!("Failed to list {}", root.display()))?;

        for entry in entries {
            let entry = entry.with_context(|| format!("Failed to list {}", root.display()))?;
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_ascii_uppercase();
            if prefixes.iter().any(|prefix| name.starts_with(prefix.as_str())) {
                tracing::debug!(file = %name, "Found license file");
                return Ok(1.0);
            }
        }

        Ok(0.0)
    }
}
