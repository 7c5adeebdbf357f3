pub mod archive;
pub mod cache;
pub mod check;
pub mod info;
pub mod locked_dependencies;

use profile_core::fetch::FetcherRegistry;
use profile_core::reader::ReaderRegistry;
use profile_core::{Profile, ProfileOpts};

pub fn open_profile(target: &str) -> Result<Profile, profile_core::ProfileError> {
    let fetchers = FetcherRegistry::with_defaults();
    let readers = ReaderRegistry::with_defaults();
    Profile::for_target(target, &fetchers, &readers, ProfileOpts::default())
}
