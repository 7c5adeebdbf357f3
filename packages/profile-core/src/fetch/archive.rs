use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tracing::instrument;
use walkdir::WalkDir;

use super::{FetchError, Fetcher};
use crate::tree::FileTree;

/// Fetches a profile packaged as `.tar`, `.tar.gz`/`.tgz`, or `.zip`,
/// extracting it into a fresh temporary directory.
#[derive(Debug)]
pub struct ArchiveFetcher;

impl Fetcher for ArchiveFetcher {
    fn handles(&self, target: &str) -> bool {
        let path = Path::new(target);
        path.is_file() && detect_format(path).is_some()
    }

    #[instrument(skip(self))]
    fn fetch(&self, target: &str) -> Result<FileTree, FetchError> {
        let path = Path::new(target);
        if !path.is_file() {
            return Err(FetchError::NotFound(target.to_string()));
        }
        let dest = tempfile::tempdir()
            .map_err(FetchError::Io)?
            .keep();
        let bytes = std::fs::read(path)?;
        extract_archive_bytes(&bytes, &dest).map_err(|msg| FetchError::Archive {
            target: target.to_string(),
            msg,
        })?;

        let mut files = Vec::new();
        for entry in WalkDir::new(&dest).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry.path().strip_prefix(&dest).unwrap_or(entry.path());
            files.push(rel.to_path_buf());
        }
        Ok(FileTree::new(dest, files))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Format {
    Tar,
    TarGz,
    Zip,
}

fn detect_format(path: &Path) -> Option<Format> {
    let name = path.file_name()?.to_string_lossy().to_lowercase();
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Some(Format::TarGz)
    } else if name.ends_with(".tar") {
        Some(Format::Tar)
    } else if name.ends_with(".zip") {
        Some(Format::Zip)
    } else {
        None
    }
}

/// Shared extraction routine used both by [`ArchiveFetcher`] and
/// [`crate::vendor::VendorIndex::store`], which receives archive bytes
/// directly rather than a path. Format is sniffed from magic bytes since
/// vendor-cache callers don't necessarily have a filename to go by.
pub fn extract_archive_bytes(bytes: &[u8], dest: &Path) -> Result<(), String> {
    std::fs::create_dir_all(dest).map_err(|e| e.to_string())?;
    if bytes.starts_with(b"PK\x03\x04") || bytes.starts_with(b"PK\x05\x06") {
        extract_zip(bytes, dest).map_err(|e| e.to_string())
    } else if bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b {
        extract_tar_gz(bytes, dest).map_err(|e| e.to_string())
    } else {
        extract_tar(bytes, dest).map_err(|e| e.to_string())
    }
}

fn extract_tar(bytes: &[u8], dest: &Path) -> io::Result<()> {
    let mut archive = tar::Archive::new(bytes);
    archive.unpack(dest)
}

fn extract_tar_gz(bytes: &[u8], dest: &Path) -> io::Result<()> {
    let gz = flate2::read::GzDecoder::new(bytes);
    let mut archive = tar::Archive::new(gz);
    archive.unpack(dest)
}

fn extract_zip(bytes: &[u8], dest: &Path) -> io::Result<()> {
    let reader = io::Cursor::new(bytes);
    let mut zip = zip::ZipArchive::new(reader).map_err(io::Error::other)?;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(io::Error::other)?;
        let Some(name) = entry.enclosed_name() else {
            continue;
        };
        let out_path: PathBuf = dest.join(name);
        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&out_path)?;
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf)?;
        io::Write::write_all(&mut out, &buf)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_test_tar_gz(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let enc = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(enc);
        for (name, content) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *content).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn fetches_tar_gz_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("profile.tar.gz");
        write_test_tar_gz(&archive_path, &[("inspec.yml", b"name: x\n")]);

        let fetcher = ArchiveFetcher;
        let target = archive_path.to_string_lossy().to_string();
        assert!(fetcher.handles(&target));
        let tree = fetcher.fetch(&target).unwrap();
        assert_eq!(tree.files().len(), 1);
    }

    #[test]
    fn non_archive_file_is_unhandled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readme.txt");
        std::fs::write(&path, "hi").unwrap();
        let fetcher = ArchiveFetcher;
        assert!(!fetcher.handles(&path.to_string_lossy()));
    }
}
