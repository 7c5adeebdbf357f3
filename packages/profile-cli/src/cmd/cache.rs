use std::path::Path;

use color_eyre::eyre::Result;
use profile_core::vendor::VendorIndex;

pub fn show(vendor_dir: &Path) -> Result<()> {
    let vendor = VendorIndex::open(vendor_dir)?;
    let entries = vendor.entries()?;
    if entries.is_empty() {
        println!("vendor cache at {} is empty", vendor_dir.display());
        return Ok(());
    }
    for entry in entries {
        println!("{} {} -> {}", entry.name, entry.version, entry.dir.display());
    }
    Ok(())
}

pub fn reset(vendor_dir: &Path) -> Result<()> {
    let vendor = VendorIndex::open(vendor_dir)?;
    vendor.reset()?;
    println!("cleared vendor cache at {}", vendor_dir.display());
    Ok(())
}
