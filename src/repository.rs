use std::path::{Path, PathBuf};

/// The repository being scored: its id in the datasource and its checkout on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryTarget {
    pub id: i64,
    pub path: PathBuf,
}

impl RepositoryTarget {
    pub fn new(id: i64, path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Argument parser for the repository path: it must exist on disk
pub fn parse_repository_path(s: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(s);
    if path.exists() {
        Ok(path)
    } else {
        Err(format!("{} does not exist", s))
    }
}
