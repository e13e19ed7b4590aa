use anyhow::{bail, Context, Result};
use serde::Deserialize;

use super::{parse_options, Attribute};
use crate::config::AttributeOptions;
use crate::datasource::Cursor;
use crate::repository::RepositoryTarget;

/// Number of watchers (stars) recorded for the repository id.
///
/// With `threshold` set the count is normalized to `min(count / threshold, 1.0)`.
/// `table` and `column` point the query at a different schema.
pub struct Stars;

impl Stars {
    pub const NAME: &'static str = "stars";
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StarsOptions {
    #[serde(default = "default_table")]
    table: String,

    #[serde(default = "default_column")]
    column: String,

    #[serde(default)]
    threshold: Option<f64>,
}

fn default_table() -> String {
    "watchers".to_string()
}

fn default_column() -> String {
    "repo_id".to_string()
}

/// Table and column names are spliced into SQL, so only plain identifiers are allowed
fn check_identifier(kind: &str, value: &str) -> Result<()> {
    let valid = !value.is_empty()
        && !value.starts_with(|c: char| c.is_ascii_digit())
        && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        bail!("Invalid {} name '{}'", kind, value);
    }
    Ok(())
}

impl Attribute for Stars {
    fn run(
        &self,
        target: &RepositoryTarget,
        cursor: &mut Cursor<'_>,
        options: &AttributeOptions,
    ) -> Result<f64> {
        let options: StarsOptions = parse_options(Self::NAME, options)?;
        check_identifier("table", &options.table)?;
        check_identifier("column", &options.column)?;
        if let Some(threshold) = options.threshold {
            if !(threshold.is_finite() && threshold > 0.0) {
                bail!("stars threshold must be a positive number, got {}", threshold);
            }
        }

        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?1",
            options.table, options.column
        );
        let count: i64 = cursor
            .query_row(&sql, [target.id], |row| row.get(0))
            .with_context(|| format!("Failed to count rows in {}", options.table))?;

        let count = count as f64;
        Ok(match options.threshold {
            Some(threshold) => (count / threshold).min(1.0),
            None => count,
        })
    }
}
