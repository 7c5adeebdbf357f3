use std::path::Path;

use color_eyre::eyre::Result;
use profile_core::vendor::VendorIndex;

use super::open_profile;

pub fn run(target: &str, vendor_dir: &Path) -> Result<()> {
    let profile = open_profile(target)?;
    let vendor = VendorIndex::open(vendor_dir)?;
    let graph = profile.locked_dependencies(&vendor)?;

    if graph.is_empty() {
        println!("no dependencies");
        return Ok(());
    }
    for (name, spec) in graph.iter() {
        println!("{name} {}", spec.version);
    }
    Ok(())
}
