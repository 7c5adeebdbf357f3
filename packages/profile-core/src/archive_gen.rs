//! Archive Generator (C9): packages a [`FileTree`] into a `.zip` or
//! `.tar.gz` deterministically — every entry's mtime is normalized to the
//! Unix epoch and entries are written in exactly the tree's file order,
//! never re-sorted, so two runs over the same tree produce byte-identical
//! output.

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use thiserror::Error;
use tracing::instrument;

use crate::tree::FileTree;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("destination {0:?} already exists; pass overwrite to replace it")]
    Exists(PathBuf),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

#[derive(Debug)]
pub struct ArchiveOptions {
    pub destination: PathBuf,
    pub format: ArchiveFormat,
    pub overwrite: bool,
}

fn is_excluded(rel: &std::path::Path) -> bool {
    rel.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

#[instrument(skip(tree))]
pub fn generate(tree: &FileTree, opts: &ArchiveOptions) -> Result<(), ArchiveError> {
    if opts.destination.exists() {
        if !opts.overwrite {
            return Err(ArchiveError::Exists(opts.destination.clone()));
        }
        std::fs::remove_file(&opts.destination)?;
    }
    match opts.format {
        ArchiveFormat::Zip => write_zip(tree, &opts.destination),
        ArchiveFormat::TarGz => write_tar_gz(tree, &opts.destination),
    }
}

fn write_zip(tree: &FileTree, destination: &std::path::Path) -> Result<(), ArchiveError> {
    let file = File::create(destination)?;
    let mut zip = zip::ZipWriter::new(file);
    // zip's DOS-date format can't represent 1970-01-01; `DateTime::default()`
    // is the format's own fixed epoch (1980-01-01), which is what every
    // entry gets regardless of the source file's real mtime.
    let epoch = zip::DateTime::default();
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .last_modified_time(epoch)
        .unix_permissions(0o644);

    for rel in tree.files() {
        if is_excluded(rel) {
            continue;
        }
        let name = rel.to_string_lossy().replace('\\', "/");
        zip.start_file(name, options)?;
        let bytes = tree.read(rel)?;
        zip.write_all(&bytes)?;
    }
    zip.finish()?;
    Ok(())
}

fn write_tar_gz(tree: &FileTree, destination: &std::path::Path) -> Result<(), ArchiveError> {
    let file = File::create(destination)?;
    let enc = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut builder = tar::Builder::new(enc);

    for rel in tree.files() {
        if is_excluded(rel) {
            continue;
        }
        let bytes = tree.read(rel)?;
        let mut header = tar::Header::new_gnu();
        header.set_size(bytes.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_cksum();
        let name = rel.to_string_lossy().replace('\\', "/");
        builder.append_data(&mut header, name, io::Cursor::new(bytes))?;
    }
    builder.into_inner()?.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sample_tree(dir: &std::path::Path) -> FileTree {
        std::fs::write(dir.join("inspec.yml"), b"name: x\n").unwrap();
        std::fs::create_dir_all(dir.join("controls")).unwrap();
        std::fs::write(dir.join("controls/a.rb"), b"").unwrap();
        std::fs::write(dir.join(".hidden"), b"x").unwrap();
        FileTree::new(
            dir,
            vec![
                PathBuf::from("inspec.yml"),
                PathBuf::from("controls/a.rb"),
                PathBuf::from(".hidden"),
            ],
        )
    }

    #[test]
    fn zip_excludes_dotfiles() {
        let src = tempfile::tempdir().unwrap();
        let tree = sample_tree(src.path());
        let dest_dir = tempfile::tempdir().unwrap();
        let dest = dest_dir.path().join("out.zip");
        generate(
            &tree,
            &ArchiveOptions {
                destination: dest.clone(),
                format: ArchiveFormat::Zip,
                overwrite: false,
            },
        )
        .unwrap();

        let file = File::open(&dest).unwrap();
        let mut zip = zip::ZipArchive::new(file).unwrap();
        assert_eq!(zip.len(), 2);
        assert!(zip.by_name(".hidden").is_err());
    }

    #[test]
    fn refuses_to_overwrite_without_flag() {
        let src = tempfile::tempdir().unwrap();
        let tree = sample_tree(src.path());
        let dest_dir = tempfile::tempdir().unwrap();
        let dest = dest_dir.path().join("out.zip");
        std::fs::write(&dest, b"existing").unwrap();

        let err = generate(
            &tree,
            &ArchiveOptions {
                destination: dest.clone(),
                format: ArchiveFormat::Zip,
                overwrite: false,
            },
        )
        .unwrap_err();
        assert!(matches!(err, ArchiveError::Exists(_)));
    }

    #[test]
    fn tar_gz_round_trips() {
        let src = tempfile::tempdir().unwrap();
        let tree = sample_tree(src.path());
        let dest_dir = tempfile::tempdir().unwrap();
        let dest = dest_dir.path().join("out.tar.gz");
        generate(
            &tree,
            &ArchiveOptions {
                destination: dest.clone(),
                format: ArchiveFormat::TarGz,
                overwrite: false,
            },
        )
        .unwrap();
        let file = File::open(&dest).unwrap();
        let gz = flate2::read::GzDecoder::new(file);
        let mut archive = tar::Archive::new(gz);
        let entries: Vec<_> = archive.entries().unwrap().map(|e| e.unwrap().path().unwrap().to_path_buf()).collect();
        assert_eq!(entries.len(), 2);
    }
}
