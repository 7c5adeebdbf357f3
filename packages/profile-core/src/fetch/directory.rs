use std::path::Path;

use tracing::instrument;
use walkdir::WalkDir;

use super::{FetchError, Fetcher};
use crate::tree::FileTree;

/// Fetches a profile from an already-extracted directory on disk.
#[derive(Debug)]
pub struct DirectoryFetcher;

impl Fetcher for DirectoryFetcher {
    fn handles(&self, target: &str) -> bool {
        Path::new(target).is_dir()
    }

    #[instrument(skip(self))]
    fn fetch(&self, target: &str) -> Result<FileTree, FetchError> {
        let root = Path::new(target);
        if !root.is_dir() {
            return Err(FetchError::NotFound(target.to_string()));
        }
        let mut files = Vec::new();
        for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
            files.push(rel.to_path_buf());
        }
        Ok(FileTree::new(root, files))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetches_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("inspec.yml"), "name: x\n").unwrap();
        std::fs::create_dir(dir.path().join("controls")).unwrap();
        std::fs::write(dir.path().join("controls/a.rb"), "").unwrap();

        let fetcher = DirectoryFetcher;
        let target = dir.path().to_string_lossy().to_string();
        assert!(fetcher.handles(&target));
        let tree = fetcher.fetch(&target).unwrap();
        assert_eq!(tree.files().len(), 2);
    }
}
