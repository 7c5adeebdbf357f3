use std::path::PathBuf;

use clap::ValueEnum;
use color_eyre::eyre::Result;
use profile_core::archive_gen::ArchiveFormat;

use super::open_profile;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Format {
    Zip,
    TarGz,
}

impl From<Format> for ArchiveFormat {
    fn from(f: Format) -> Self {
        match f {
            Format::Zip => ArchiveFormat::Zip,
            Format::TarGz => ArchiveFormat::TarGz,
        }
    }
}

pub fn run(target: &str, destination: Option<PathBuf>, format: Format, overwrite: bool) -> Result<()> {
    let profile = open_profile(target)?;
    let archive_format: ArchiveFormat = format.into();
    let destination = destination.unwrap_or_else(|| PathBuf::from(profile.archive_name(archive_format)));
    profile.archive(destination.clone(), archive_format, overwrite)?;
    println!("wrote {}", destination.display());
    Ok(())
}
