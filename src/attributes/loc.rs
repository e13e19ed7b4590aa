use anyhow::{Context, Result};
use glob::Pattern;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

use super::{parse_options, Attribute};
use crate::config::AttributeOptions;
use crate::datasource::Cursor;
use crate::repository::RepositoryTarget;

/// Counts non-blank lines of source under the repository path.
///
/// Hidden files and directories (including `.git`) are skipped.
///
/// Options:
/// - `extensions`: only count files with these extensions (without the dot)
/// - `exclude`: glob patterns, matched against the path relative to the repository root
pub struct Loc;

impl Loc {
    pub const NAME: &'static str = "loc";
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LocOptions {
    #[serde(default)]
    extensions: Option<Vec<String>>,

    #[serde(default)]
    exclude: Vec<String>,
}

impl Attribute for Loc {
    fn run(
        &self,
        target: &RepositoryTarget,
        _cursor: &mut Cursor<'_>,
        options: &AttributeOptions,
    ) -> Result<f64> {
        let options: LocOptions = parse_options(Self::NAME, options)?;
        let exclude = options
            .exclude
            .iter()
            .map(|p| Pattern::new(p).with_context(|| format!("Invalid exclude pattern '{}'", p)))
            .collect::<Result<Vec<_>>>()?;

        let root = target.path();
        let mut lines = 0u64;

        for entry in WalkDir::new(root)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
        {
            let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            if exclude.iter().any(|p| p.matches_path(relative)) {
                continue;
            }
            if !has_wanted_extension(entry.path(), options.extensions.as_deref()) {
                continue;
            }

            lines += count_lines(entry.path())?;
        }

        tracing::debug!(path = %root.display(), lines, "Counted lines of code");
        Ok(lines as f64)
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

fn has_wanted_extension(path: &Path, extensions: Option<&[String]>) -> bool {
    let Some(extensions) = extensions else {
        return true;
    };
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|wanted| wanted.trim_start_matches('.') == ext))
        .unwrap_or(false)
}

fn count_lines(path: &Path) -> Result<u64> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(text.lines().filter(|line| !line.trim().is_empty()).count() as u64)
}
