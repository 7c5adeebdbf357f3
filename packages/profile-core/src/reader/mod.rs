//! Source Reader Registry (C2): recognizes a [`FileTree`]'s on-disk
//! layout and exposes its manifest, control files, and library files in
//! a normalized shape regardless of which (preferred or deprecated) form
//! was used to author them.

pub mod canonical;

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::metadata::{Metadata, MetadataError};
use crate::report::Diagnostic;
use crate::tree::FileTree;

#[derive(Debug, Error)]
pub enum StructureError {
    #[error("no reader recognizes this profile's layout")]
    Unrecognized,
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct LibraryFile {
    pub logical_path: String,
    pub bytes: Vec<u8>,
    pub source_ref: String,
}

pub trait Reader: fmt::Debug {
    fn handles(&self, tree: &FileTree) -> bool;
    fn metadata(&self, tree: &FileTree) -> Result<Metadata, StructureError>;
    /// Control-file contents, in the order they should be evaluated
    /// (alphabetical by relative path per the ordering guarantee).
    fn control_files(&self, tree: &FileTree) -> Vec<(PathBuf, String)>;
    fn libraries(&self, tree: &FileTree) -> Vec<LibraryFile>;
    /// Layout-level warnings (deprecated manifest form, legacy `test/`
    /// directory present) independent of metadata content warnings.
    fn warnings(&self, tree: &FileTree) -> Vec<Diagnostic>;
}

#[derive(Debug, Default)]
pub struct ReaderRegistry {
    readers: Vec<Box<dyn Reader>>,
}

impl ReaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(canonical::CanonicalReader));
        registry
    }

    pub fn register(&mut self, reader: Box<dyn Reader>) {
        self.readers.push(reader);
    }

    pub fn resolve<'a>(&'a self, tree: &FileTree) -> Result<&'a dyn Reader, StructureError> {
        self.readers
            .iter()
            .find(|r| r.handles(tree))
            .map(|r| r.as_ref())
            .ok_or(StructureError::Unrecognized)
    }
}
