//! A read-only view over the files a [`crate::fetch::Fetcher`] produced,
//! backed by a directory on disk. Readers, the metadata parser, and the
//! archive generator all consume a [`FileTree`] rather than touching the
//! filesystem directly, so the rest of the crate stays fetcher-agnostic.

use std::io;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug)]
pub struct FileTree {
    prefix: PathBuf,
    files: Vec<PathBuf>,
}

impl FileTree {
    pub fn new(prefix: impl Into<PathBuf>, mut files: Vec<PathBuf>) -> Self {
        files.sort();
        Self {
            prefix: prefix.into(),
            files,
        }
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    /// Relative paths, in sorted order, excluding dotfiles at any depth.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn abs_path(&self, rel: &Path) -> PathBuf {
        self.prefix.join(rel)
    }

    pub fn contains(&self, rel: &Path) -> bool {
        self.files.iter().any(|f| f == rel)
    }

    pub fn read(&self, rel: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(self.abs_path(rel))
    }

    pub fn read_to_string(&self, rel: &Path) -> io::Result<String> {
        std::fs::read_to_string(self.abs_path(rel))
    }

    /// Files whose relative path starts with `dir/`.
    pub fn files_under(&self, dir: &str) -> Vec<&PathBuf> {
        let prefix = format!("{dir}/");
        self.files
            .iter()
            .filter(|f| f.to_string_lossy().starts_with(&prefix))
            .collect()
    }
}
