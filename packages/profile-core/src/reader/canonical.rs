use std::path::PathBuf;

use tracing::warn;

use super::{LibraryFile, Reader, StructureError};
use crate::metadata::Metadata;
use crate::report::Diagnostic;
use crate::tree::FileTree;

const MANIFEST_PREFERRED: &str = "inspec.yml";
const MANIFEST_LEGACY: &str = "metadata.rb";

/// Recognizes the canonical InSpec-style profile layout: a manifest at
/// the tree root (`inspec.yml`, or the deprecated `metadata.rb`),
/// control files under `controls/` (or the deprecated `test/`), and
/// support code under `libraries/`.
#[derive(Debug)]
pub struct CanonicalReader;

impl CanonicalReader {
    fn manifest_path(&self, tree: &FileTree) -> Option<&'static str> {
        if tree.contains(&PathBuf::from(MANIFEST_PREFERRED)) {
            Some(MANIFEST_PREFERRED)
        } else if tree.contains(&PathBuf::from(MANIFEST_LEGACY)) {
            Some(MANIFEST_LEGACY)
        } else {
            None
        }
    }
}

impl Reader for CanonicalReader {
    fn handles(&self, tree: &FileTree) -> bool {
        self.manifest_path(tree).is_some()
    }

    fn metadata(&self, tree: &FileTree) -> Result<Metadata, StructureError> {
        let Some(path) = self.manifest_path(tree) else {
            return Err(StructureError::Unrecognized);
        };
        let raw = tree.read_to_string(&PathBuf::from(path))?;
        if path == MANIFEST_LEGACY {
            Ok(Metadata::from_legacy_rb(&raw)?)
        } else {
            Ok(Metadata::from_yaml(&raw)?)
        }
    }

    fn control_files(&self, tree: &FileTree) -> Vec<(PathBuf, String)> {
        let mut files: Vec<&PathBuf> = tree.files_under("controls");
        if files.is_empty() {
            files = tree.files_under("test");
        }
        files.sort();
        files
            .into_iter()
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("rb"))
            .filter_map(|p| tree.read_to_string(p).ok().map(|s| (p.clone(), s)))
            .collect()
    }

    fn libraries(&self, tree: &FileTree) -> Vec<LibraryFile> {
        let mut files: Vec<&PathBuf> = tree.files_under("libraries");
        files.sort();
        files
            .into_iter()
            .filter_map(|p| {
                let bytes = tree.read(p).ok()?;
                Some(LibraryFile {
                    logical_path: p
                        .strip_prefix("libraries")
                        .unwrap_or(p)
                        .with_extension("")
                        .to_string_lossy()
                        .to_string(),
                    bytes,
                    source_ref: p.to_string_lossy().to_string(),
                })
            })
            .collect()
    }

    fn warnings(&self, tree: &FileTree) -> Vec<Diagnostic> {
        let mut warnings = Vec::new();
        if self.manifest_path(tree) == Some(MANIFEST_LEGACY) {
            warnings.push(Diagnostic::new(
                "using deprecated metadata.rb manifest; migrate to inspec.yml",
            ));
            warn!("profile uses deprecated metadata.rb manifest");
        }
        if !tree.files_under("test").is_empty() {
            warnings.push(Diagnostic::new(
                "legacy test/ directory present; migrate control files to controls/",
            ));
        }
        warnings
    }
}
