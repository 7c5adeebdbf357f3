//! Vendor Index (C6): a local, content-addressed cache of resolved
//! dependency profiles. Entries are named `{name}-{version}-{sha256prefix}`
//! and written via write-to-temp-then-rename so a reader never observes a
//! partially-written entry.

use std::fs;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use semver::Version;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::instrument;

use crate::fetch::archive::extract_archive_bytes;
use crate::metadata::Requirement;

const HASH_PREFIX_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("vendor cache root {0:?} is not a directory")]
    NotADirectory(PathBuf),
    #[error("cache entry {0:?} has a malformed name")]
    MalformedEntry(String),
    #[error("failed to extract archive into cache entry: {0}")]
    Corrupt(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Debug)]
pub struct LocalSpec {
    pub name: String,
    pub version: Version,
    pub dir: PathBuf,
}

pub struct VendorIndex {
    root: PathBuf,
}

impl VendorIndex {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns every cached entry matching `req`'s name whose version
    /// satisfies its constraint, ascending by version.
    #[instrument(skip(self))]
    pub fn find(&self, req: &Requirement) -> Result<Vec<LocalSpec>, CacheError> {
        let mut matches = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let dirname = entry.file_name().to_string_lossy().to_string();
            let Some((name, version)) = parse_entry_name(&dirname) else {
                continue;
            };
            if name != req.name {
                continue;
            }
            if !req.constraint.satisfied_by(&version) {
                continue;
            }
            matches.push(LocalSpec {
                name,
                version,
                dir: entry.path(),
            });
        }
        matches.sort_by(|a, b| a.version.cmp(&b.version));
        Ok(matches)
    }

    pub fn entries(&self) -> Result<Vec<LocalSpec>, CacheError> {
        let mut all = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let dirname = entry.file_name().to_string_lossy().to_string();
            if let Some((name, version)) = parse_entry_name(&dirname) {
                all.push(LocalSpec {
                    name,
                    version,
                    dir: entry.path(),
                });
            }
        }
        Ok(all
            .into_iter()
            .sorted_by(|a, b| (a.name.as_str(), &a.version).cmp(&(b.name.as_str(), &b.version)))
            .collect())
    }

    /// Materializes `bytes` (a zip or tar.gz archive, sniffed by magic
    /// bytes) under a deterministic directory name. Idempotent: storing
    /// the same bytes twice produces the same directory name and leaves
    /// the existing entry untouched.
    #[instrument(skip(self, bytes))]
    pub fn store(&self, name: &str, version: &Version, bytes: &[u8]) -> Result<LocalSpec, CacheError> {
        let hash = hex::encode(Sha256::digest(bytes));
        let prefix = &hash[..HASH_PREFIX_LEN.min(hash.len())];
        let dirname = format!("{name}-{version}-{prefix}");
        let dest = self.root.join(&dirname);
        if dest.is_dir() {
            return Ok(LocalSpec {
                name: name.to_string(),
                version: version.clone(),
                dir: dest,
            });
        }

        let staging = self.root.join(format!(".staging-{dirname}-{}", std::process::id()));
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        extract_archive_bytes(bytes, &staging).map_err(CacheError::Corrupt)?;
        fs::rename(&staging, &dest)?;

        Ok(LocalSpec {
            name: name.to_string(),
            version: version.clone(),
            dir: dest,
        })
    }

    pub fn reset(&self) -> Result<(), CacheError> {
        if self.root.is_dir() {
            fs::remove_dir_all(&self.root)?;
        }
        fs::create_dir_all(&self.root)?;
        Ok(())
    }
}

fn parse_entry_name(dirname: &str) -> Option<(String, Version)> {
    let parts: Vec<&str> = dirname.rsplitn(3, '-').collect();
    if parts.len() != 3 {
        return None;
    }
    let (_hash, version_str, name) = (parts[0], parts[1], parts[2]);
    let version = Version::parse(version_str).ok()?;
    Some((name.to_string(), version))
}
