//! Top-level error type for the library. Each component defines its own
//! leaf `thiserror` enum; [`ProfileError`] only wraps them so callers can
//! match on a single type without losing the specific kind.

use thiserror::Error;

use crate::archive_gen::ArchiveError;
use crate::fetch::FetchError;
use crate::metadata::MetadataError;
use crate::reader::StructureError;
use crate::resolver::ResolveError;
use crate::vendor::CacheError;

pub type Result<T> = std::result::Result<T, ProfileError>;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Structure(#[from] StructureError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
