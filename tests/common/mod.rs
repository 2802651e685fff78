//! Shared test utilities for integration and E2E tests.
//!
//! This module provides tile fixtures and a recording release creator so the
//! pipeline can be exercised end to end without the external packaging tools.
//!
//! ## Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let fixture = TileFixture::new();
//!     let input = fixture.write_tile(&TileSpec::windows2019());
//!     // ... test code
//! }
//! ```

#![allow(dead_code)]

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use assert_fs::TempDir;
use zip::write::SimpleFileOptions;

use winfs_injector::error::Result;
use winfs_injector::release::{ReleaseCreator, ReleaseRequest};

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    #[allow(unused_imports)]
    pub use assert_cmd::cargo::cargo_bin_cmd;
    #[allow(unused_imports)]
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::snippets;
    #[allow(unused_imports)]
    pub use super::{entry_names, read_entry, RecordingReleaseCreator, TileFixture, TileSpec};
}

/// Common metadata and release config snippets.
pub mod snippets {
    pub const METADATA: &str = "releases: []\ncustomField: x\n";

    pub const METADATA_WITH_RELEASES: &str = r#"name: pas-windows
releases:
- name: hwc-buildpack
  version: 3.1.2
  file: hwc-buildpack-3.1.2.tgz
product_version: 2.7.0
"#;

    pub const FINAL_CONFIG: &str = "name: windows2019fs\n";

    pub const BLOBS_CONFIG: &str = r#"windows2019fs/windows2016fs-2019.0.43.tgz:
  size: 3
  object_id: ""
  sha: abc
"#;
}

/// Contents of a tile to build.
#[derive(Debug, Clone)]
pub struct TileSpec {
    /// Entries as (path inside the tile, content, unix mode).
    pub files: Vec<(String, Vec<u8>, u32)>,
}

impl TileSpec {
    /// A tile with nothing but the given product metadata.
    pub fn metadata_only(metadata: &str) -> Self {
        Self {
            files: vec![(
                "metadata/product.yml".to_string(),
                metadata.as_bytes().to_vec(),
                0o644,
            )],
        }
    }

    /// A tile embedding one windows2019fs release at version 9.3.6.
    pub fn windows2019() -> Self {
        Self::metadata_only(snippets::METADATA).with_release("some-release")
    }

    /// Adds an embedded release directory with the standard config files.
    pub fn with_release(mut self, dir: &str) -> Self {
        let root = format!("embed/{}", dir);
        self.files.extend([
            (format!("{}/VERSION", root), b"9.3.6\n".to_vec(), 0o644),
            (
                format!("{}/config/final.yml", root),
                snippets::FINAL_CONFIG.as_bytes().to_vec(),
                0o644,
            ),
            (
                format!("{}/config/blobs.yml", root),
                snippets::BLOBS_CONFIG.as_bytes().to_vec(),
                0o644,
            ),
            (
                format!("{}/packages/windows2019fs/packaging", root),
                b"#!/bin/sh\n".to_vec(),
                0o755,
            ),
        ]);
        self
    }

    /// Adds an arbitrary entry.
    pub fn with_file(mut self, path: &str, content: &str, mode: u32) -> Self {
        self.files
            .push((path.to_string(), content.as_bytes().to_vec(), mode));
        self
    }
}

/// A scratch directory holding tiles and the run's working directory.
pub struct TileFixture {
    pub temp: TempDir,
}

impl TileFixture {
    pub fn new() -> Self {
        Self {
            temp: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    /// Writes `spec` as `input.pivotal` and returns its path.
    pub fn write_tile(&self, spec: &TileSpec) -> PathBuf {
        let path = self.path().join("input.pivotal");
        write_zip(&path, spec);
        path
    }

    pub fn output_tile(&self) -> PathBuf {
        self.path().join("output.pivotal")
    }

    /// Creates and returns an empty working directory for one run.
    pub fn working_dir(&self) -> PathBuf {
        let dir = self.path().join("work");
        fs::create_dir_all(&dir).expect("Failed to create working dir");
        dir
    }
}

/// Writes `spec` as a zip archive at `path`.
pub fn write_zip(path: &Path, spec: &TileSpec) {
    let file = fs::File::create(path).expect("Failed to create tile");
    let mut writer = zip::ZipWriter::new(file);
    for (name, content, mode) in &spec.files {
        let options = SimpleFileOptions::default().unix_permissions(*mode);
        if name.ends_with('/') {
            writer
                .add_directory(name.as_str(), options)
                .expect("Failed to add directory");
            continue;
        }
        writer
            .start_file(name.as_str(), options)
            .expect("Failed to start entry");
        writer.write_all(content).expect("Failed to write entry");
    }
    writer.finish().expect("Failed to finish tile");
}

/// Reads one entry of a zip archive as a string, if present.
pub fn read_entry(archive: &Path, name: &str) -> Option<String> {
    let file = fs::File::open(archive).expect("Failed to open tile");
    let mut zip = zip::ZipArchive::new(file).expect("Failed to read tile");
    let mut entry = zip.by_name(name).ok()?;
    let mut content = String::new();
    entry
        .read_to_string(&mut content)
        .expect("Failed to read entry");
    Some(content)
}

/// Reads the unix mode bits of one entry of a zip archive, if present.
pub fn entry_mode(archive: &Path, name: &str) -> Option<u32> {
    let file = fs::File::open(archive).expect("Failed to open tile");
    let mut zip = zip::ZipArchive::new(file).expect("Failed to read tile");
    let entry = zip.by_name(name).ok()?;
    entry.unix_mode().map(|mode| mode & 0o777)
}

/// Lists the entry names of a zip archive.
pub fn entry_names(archive: &Path) -> Vec<String> {
    let file = fs::File::open(archive).expect("Failed to open tile");
    let zip = zip::ZipArchive::new(file).expect("Failed to read tile");
    zip.file_names().map(str::to_string).collect()
}

/// A release creator that records each request and writes a placeholder
/// tarball where the real tools would.
#[derive(Debug, Clone, Default)]
pub struct RecordingReleaseCreator {
    pub requests: Arc<Mutex<Vec<ReleaseRequest>>>,
}

impl RecordingReleaseCreator {
    pub fn requests(&self) -> Vec<ReleaseRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl ReleaseCreator for RecordingReleaseCreator {
    fn create_release(&self, request: &ReleaseRequest) -> Result<()> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(parent) = request.tarball_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&request.tarball_path, b"release tarball")?;
        Ok(())
    }
}
