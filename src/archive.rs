//! Tile archive round trip
//!
//! A tile is a zip archive. [`unpack`] extracts it into a working directory and
//! [`pack`] builds a new archive from that directory once the pipeline has
//! rewritten it.
//!
//! ## Permissions
//!
//! - Every unpacked directory gets [`UNPACKED_DIR_MODE`].
//! - Every unpacked file gets the Unix mode stored in its zip entry header, or
//!   [`DEFAULT_FILE_MODE`] when the header has none.
//! - Packing records each file's and directory's permission bits in its entry
//!   header, so `unpack(pack(tree))` reproduces file modes bit for bit.
//!
//! ## Atomicity
//!
//! [`pack`] writes into a temporary file next to the destination and renames
//! it into place only after the archive is complete. A failed pack leaves
//! whatever was at the destination before untouched.

use std::fs;
use std::io;
use std::path::Path;

use log::debug;
use tempfile::NamedTempFile;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::defaults::{DEFAULT_FILE_MODE, UNPACKED_DIR_MODE};
use crate::error::{Error, Result};

/// Trait for the archive round trip - allows recording fakes in tests
pub trait Archiver: Send + Sync {
    /// Extracts `archive_path` into `dest_dir`.
    fn unpack(&self, archive_path: &Path, dest_dir: &Path) -> Result<()>;

    /// Archives everything below `source_dir` into `archive_path`.
    fn pack(&self, source_dir: &Path, archive_path: &Path) -> Result<()>;
}

/// The default implementation of `Archiver`, reading and writing zip files.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipArchiver;

impl Archiver for ZipArchiver {
    fn unpack(&self, archive_path: &Path, dest_dir: &Path) -> Result<()> {
        unpack(archive_path, dest_dir)
    }

    fn pack(&self, source_dir: &Path, archive_path: &Path) -> Result<()> {
        pack(source_dir, archive_path)
    }
}

fn archive_error(path: &Path, err: impl std::fmt::Display) -> Error {
    Error::Archive {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// Extracts every entry of the zip archive at `archive_path` into `dest_dir`.
///
/// `dest_dir` is created if needed. Entries whose names would land outside
/// `dest_dir` are rejected.
pub fn unpack(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let file = fs::File::open(archive_path).map_err(|e| archive_error(archive_path, e))?;
    let mut archive = ZipArchive::new(file).map_err(|e| archive_error(archive_path, e))?;

    create_dir(dest_dir)?;
    debug!(
        "Unpacking {} entries from {} into {}",
        archive.len(),
        archive_path.display(),
        dest_dir.display()
    );

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| archive_error(archive_path, e))?;

        let Some(relative) = entry.enclosed_name() else {
            return Err(archive_error(
                archive_path,
                format!("entry '{}' escapes the destination directory", entry.name()),
            ));
        };
        if relative.as_os_str().is_empty() {
            continue;
        }
        let target = dest_dir.join(relative);

        if entry.is_dir() {
            create_dir(&target)?;
            set_mode(&target, UNPACKED_DIR_MODE)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            create_dir(parent)?;
        }
        let mut out = fs::File::create(&target).map_err(|e| Error::file_access(&target, e))?;
        io::copy(&mut entry, &mut out).map_err(|e| Error::file_access(&target, e))?;

        let mode = entry
            .unix_mode()
            .map(|mode| mode & 0o777)
            .unwrap_or(DEFAULT_FILE_MODE);
        set_mode(&target, mode)?;
    }

    Ok(())
}

/// Archives every file and directory below `source_dir` into a new zip
/// archive at `archive_path`, using paths relative to `source_dir`.
///
/// The parent directory of `archive_path` must already exist.
pub fn pack(source_dir: &Path, archive_path: &Path) -> Result<()> {
    let parent = match archive_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let temp = NamedTempFile::new_in(parent).map_err(|e| archive_error(archive_path, e))?;

    debug!(
        "Packing {} into {}",
        source_dir.display(),
        archive_path.display()
    );

    let mut writer = ZipWriter::new(temp.as_file());
    for entry in WalkDir::new(source_dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| archive_error(source_dir, e))?;
        let relative = entry
            .path()
            .strip_prefix(source_dir)
            .map_err(|e| archive_error(entry.path(), e))?;
        let name = entry_name(relative);
        let metadata = entry
            .metadata()
            .map_err(|e| archive_error(entry.path(), e))?;

        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(mode_of(&metadata))
            .large_file(metadata.len() >= u64::from(u32::MAX));

        if entry.file_type().is_dir() {
            writer
                .add_directory(format!("{}/", name), options)
                .map_err(|e| archive_error(archive_path, e))?;
        } else {
            writer
                .start_file(name, options)
                .map_err(|e| archive_error(archive_path, e))?;
            let mut source =
                fs::File::open(entry.path()).map_err(|e| archive_error(entry.path(), e))?;
            io::copy(&mut source, &mut writer).map_err(|e| archive_error(entry.path(), e))?;
        }
    }
    writer
        .finish()
        .map_err(|e| archive_error(archive_path, e))?;

    temp.as_file()
        .sync_all()
        .map_err(|e| archive_error(archive_path, e))?;
    set_mode(temp.path(), DEFAULT_FILE_MODE)?;
    temp.persist(archive_path)
        .map_err(|e| archive_error(archive_path, e.error))?;

    Ok(())
}

/// Zip entry names always use `/`, whatever the host separator is.
fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(unix)]
fn create_dir(path: &Path) -> Result<()> {
    use std::os::unix::fs::DirBuilderExt;

    fs::DirBuilder::new()
        .recursive(true)
        .mode(UNPACKED_DIR_MODE)
        .create(path)
        .map_err(|e| Error::file_access(path, e))
}

#[cfg(not(unix))]
fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| Error::file_access(path, e))
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|e| Error::file_access(path, e))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn mode_of(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;

    metadata.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn mode_of(metadata: &fs::Metadata) -> u32 {
    if metadata.is_dir() {
        0o755
    } else {
        DEFAULT_FILE_MODE
    }
}
