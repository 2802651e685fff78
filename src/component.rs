//! Embedded component discovery
//!
//! A tile that still needs injecting carries exactly one pre-built release
//! under `embed/`. This module finds it and reads the three facts the
//! pipeline needs from it:
//!
//! - the release version, from the plain-text `VERSION` file;
//! - the release name, from the `name` field of `config/final.yml`;
//! - the root file system image tag, from the blob keys of `config/blobs.yml`.
//!
//! All reads go through a [`TileFilesystem`], so the logic can be exercised
//! against an in-memory tree.

use std::path::{Path, PathBuf};
use std::process::Command;

use regex::Regex;
use serde::Deserialize;

use crate::defaults::{
    BLOBS_CONFIG_FILE, EMBED_DIR, FINAL_CONFIG_FILE, ROOTFS_BLOB_PATTERN, VERSION_FILE,
};
use crate::error::{Error, Result};
use crate::filesystem::TileFilesystem;

/// The embedded release slated for replacement, with the metadata read from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedComponent {
    /// Location of the release directory inside the working tree
    pub directory: PathBuf,
    /// Release name from `config/final.yml`
    pub name: String,
    /// Release version from `VERSION`
    pub version: String,
    /// Root file system image tag from `config/blobs.yml`
    pub image_reference: String,
}

impl EmbeddedComponent {
    /// Reads version, name and image reference from `directory`, in that order.
    pub fn load(fs: &dyn TileFilesystem, directory: &Path) -> Result<Self> {
        let version = extract_version(fs, directory)?;
        let name = extract_name(fs, directory)?;
        let image_reference = extract_image_reference(fs, directory)?;

        Ok(Self {
            directory: directory.to_path_buf(),
            name,
            version,
            image_reference,
        })
    }
}

/// Locates the single embedded release directory under `<tile_dir>/embed`.
///
/// Returns `Ok(None)` when the embed directory is empty, which means the tile
/// was already injected. Fails when the embed directory cannot be listed, holds
/// more than one entry, or its only entry is not a directory.
pub fn find_embedded_component(
    fs: &dyn TileFilesystem,
    tile_dir: &Path,
) -> Result<Option<PathBuf>> {
    let embed_dir = tile_dir.join(EMBED_DIR);
    let entries = fs.read_dir(&embed_dir)?;

    match entries.as_slice() {
        [] => Ok(None),
        [entry] if entry.is_dir => Ok(Some(embed_dir.join(&entry.name))),
        [_] => Err(Error::structure(
            "the embedded file system is not a directory; please contact the tile authors to fix",
        )),
        _ => Err(Error::structure(
            "there is more than one file system embedded in the tile; please contact the tile authors to fix",
        )),
    }
}

/// Reads `VERSION` inside `component_dir`, dropping a single trailing newline.
pub fn extract_version(fs: &dyn TileFilesystem, component_dir: &Path) -> Result<String> {
    let raw = fs.read_file(&component_dir.join(VERSION_FILE))?;
    let version = String::from_utf8_lossy(&raw);
    Ok(version.strip_suffix('\n').unwrap_or(&version).to_string())
}

#[derive(Debug, Deserialize)]
struct ReleaseDescriptor {
    name: Option<String>,
}

/// Reads the release `name` from `config/final.yml` inside `component_dir`.
pub fn extract_name(fs: &dyn TileFilesystem, component_dir: &Path) -> Result<String> {
    let path = component_dir.join(FINAL_CONFIG_FILE);
    let raw = fs.read_file(&path)?;
    let descriptor: Option<ReleaseDescriptor> =
        serde_yaml::from_slice(&raw).map_err(|source| Error::Parse {
            path: path.clone(),
            source,
        })?;

    match descriptor.and_then(|d| d.name) {
        Some(name) if !name.is_empty() => Ok(name),
        _ => Err(Error::structure(format!(
            "the release descriptor '{}' does not declare a name",
            path.display()
        ))),
    }
}

/// Reads the root file system image tag from `config/blobs.yml` inside
/// `component_dir`.
///
/// The blob manifest maps blob paths to blob metadata. Keys are scanned in
/// document order and the first one matching [`ROOTFS_BLOB_PATTERN`] wins; its
/// `<major>.<minor>.<patch>` group is the tag.
pub fn extract_image_reference(fs: &dyn TileFilesystem, component_dir: &Path) -> Result<String> {
    let path = component_dir.join(BLOBS_CONFIG_FILE);
    let raw = fs.read_file(&path)?;
    let blobs: Option<serde_yaml::Mapping> =
        serde_yaml::from_slice(&raw).map_err(|source| Error::Parse {
            path: path.clone(),
            source,
        })?;
    let pattern = Regex::new(ROOTFS_BLOB_PATTERN)?;

    blobs
        .iter()
        .flat_map(|blobs| blobs.keys())
        .filter_map(|key| key.as_str())
        .find_map(|key| pattern.captures(key))
        .and_then(|captures| captures.get(1))
        .map(|tag| tag.as_str().to_string())
        .ok_or(Error::ImageReference { path })
}

/// Makes git ignore file mode changes inside the release directory.
///
/// Release directories checked out on Windows lose their executable bits,
/// which `bosh create-release` would otherwise report as a dirty tree. The
/// pipeline only calls this on Windows hosts.
pub fn disable_git_filemode(component_dir: &Path) -> Result<()> {
    let commands: [&[&str]; 2] = [
        &["config", "core.filemode", "false"],
        &["submodule", "foreach", "git", "config", "core.filemode", "false"],
    ];
    for args in commands {
        let command = format!("git {}", args.join(" "));
        let output = Command::new("git")
            .args(args)
            .current_dir(component_dir)
            .output()
            .map_err(|e| Error::ReleaseCreation {
                command: command.clone(),
                message: format!("unable to fix file permissions for windows: {}", e),
            })?;
        if !output.status.success() {
            return Err(Error::ReleaseCreation {
                command,
                message: format!(
                    "unable to fix file permissions for windows: {}{}",
                    String::from_utf8_lossy(&output.stdout),
                    String::from_utf8_lossy(&output.stderr)
                ),
            });
        }
    }
    Ok(())
}
