//! Fetcher Registry (C1): turns a target string into a [`FileTree`].
//! Built-in fetchers handle local directories and local archives; the
//! [`Fetcher`] trait is the contract a remote (URL/git) fetcher would
//! implement, but no such fetcher ships in this crate (§"Non-goals").

pub mod archive;
pub mod directory;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

use thiserror::Error;
use tracing::{debug, instrument};

use crate::tree::FileTree;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("target {0:?} does not exist")]
    NotFound(String),
    #[error("no fetcher handles target {0:?}")]
    Unhandled(String),
    #[error("archive error reading {target:?}: {msg}")]
    Archive { target: String, msg: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub trait Fetcher: fmt::Debug {
    fn handles(&self, target: &str) -> bool;
    fn fetch(&self, target: &str) -> Result<FileTree, FetchError>;
}

/// Resolves a target string to a [`FileTree`] using the first fetcher
/// that claims it, memoizing the result per target for the registry's
/// lifetime (fetchers are expected to be idempotent and cheap to re-run,
/// but memoizing avoids redundant disk walks within one process).
#[derive(Debug, Default)]
pub struct FetcherRegistry {
    fetchers: Vec<Box<dyn Fetcher>>,
    cache: RefCell<HashMap<String, FileTree>>,
}

impl FetcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the two built-in fetchers registered, in the
    /// order a caller would usually want them tried: directories first
    /// (cheapest to check), then archives.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(directory::DirectoryFetcher));
        registry.register(Box::new(archive::ArchiveFetcher));
        registry
    }

    pub fn register(&mut self, fetcher: Box<dyn Fetcher>) {
        self.fetchers.push(fetcher);
    }

    #[instrument(skip(self))]
    pub fn resolve(&self, target: &str) -> Result<FileTree, FetchError> {
        if let Some(tree) = self.cache.borrow().get(target) {
            debug!("fetch cache hit");
            return Ok(tree.clone());
        }
        let fetcher = self
            .fetchers
            .iter()
            .find(|f| f.handles(target))
            .ok_or_else(|| FetchError::Unhandled(target.to_string()))?;
        let tree = fetcher.fetch(target)?;
        self.cache.borrow_mut().insert(target.to_string(), tree.clone());
        Ok(tree)
    }
}

/// Marker placed where a real implementation would need to speak HTTP(S)
/// or the git wire protocol. Any caller needing remote fetch support
/// implements [`Fetcher`] themselves and registers it with
/// [`FetcherRegistry::register`]; this crate intentionally ships none.
pub mod remote {
    use super::Fetcher;

    /// Returns `true` for strings that look like a URL or git ref, purely
    /// so [`super::FetcherRegistry::resolve`] can report a clear
    /// `FetchError::Unhandled` instead of a confusing `NotFound`.
    pub fn looks_remote(target: &str) -> bool {
        target.starts_with("http://")
            || target.starts_with("https://")
            || target.starts_with("git://")
            || target.ends_with(".git")
    }

    pub trait RemoteFetcherContract: Fetcher {}
}
