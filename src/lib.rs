//! # winfs-injector Library
//!
//! This library repackages a tile (a zip bundle distributed to Ops Manager) by
//! replacing the pre-built release embedded in it with a freshly packaged
//! release tarball, and recording that tarball in the tile's product metadata.
//!
//! ## Quick Example
//!
//! ```
//! use std::path::Path;
//! use winfs_injector::component::find_embedded_component;
//! use winfs_injector::filesystem::MemoryFS;
//!
//! let fs = MemoryFS::new();
//! fs.add_file_string("/tile/embed/windowsfs-release/VERSION", "9.3.6\n").unwrap();
//!
//! let found = find_embedded_component(&fs, Path::new("/tile")).unwrap();
//! assert_eq!(found.unwrap(), Path::new("/tile/embed/windowsfs-release"));
//! ```
//!
//! ## Core Concepts
//!
//! - **Archive (`archive`)**: unpacks a tile into a working tree and packs the
//!   tree back, keeping file modes.
//! - **Component (`component`)**: finds the single release under `embed/` and
//!   reads its name, version and root file system image tag.
//! - **Metadata (`metadata`)**: appends a release record to the product
//!   metadata file without disturbing any other field.
//! - **Release (`release`)**: builds the release tarball with external tools.
//! - **Orchestrator (`orchestrator`)**: sequences the above for one run.
//!
//! Collaborators sit behind traits (`Archiver`, `MetadataInjector`,
//! `ReleaseCreator`, `TileFilesystem`) so the orchestrator can be tested with
//! fakes and an in-memory filesystem.

pub mod archive;
pub mod component;
pub mod defaults;
pub mod error;
pub mod filesystem;
pub mod metadata;
pub mod orchestrator;
pub mod release;

#[cfg(all(test, unix))]
mod archive_proptest;
