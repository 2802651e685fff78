//! Orchestrator for the complete injection run
//!
//! [`Application::run`] drives one tile through the pipeline:
//!
//! 1. **Unpacking**: the input tile is unpacked into `<working_dir>/extracted-tile`.
//! 2. **Locating**: the single release under `embed/` is found and its name,
//!    version and image tag are read. An empty `embed/` means the tile was
//!    already injected, and the run stops there successfully.
//! 3. **Packaging**: the release is built into
//!    `releases/<name>-<version>.tgz` by the release creator.
//! 4. **Injecting**: the new tarball is recorded in the product metadata.
//! 5. **Cleaning**: the embedded release directory is removed.
//! 6. **Packing**: the working tree is packed into the output tile.
//!
//! Stages run strictly in order and nothing is retried. The first failure
//! aborts the run and is returned to the caller unchanged; in particular a
//! failed cleanup stops the run before an output tile that still carries the
//! stale embedded release could be produced.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;

use crate::archive::Archiver;
use crate::component::{self, EmbeddedComponent};
use crate::defaults::{release_tarball_name, EXTRACTED_TILE_DIR, IMAGE_NAME, RELEASES_DIR};
use crate::error::{Error, Result};
use crate::filesystem::{HostFilesystem, TileFilesystem};
use crate::metadata::{MetadataInjector, ReleaseRecord};
use crate::release::{ReleaseCreator, ReleaseRequest};

/// A stage of the injection run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Unpacking,
    Locating,
    Packaging,
    Injecting,
    Cleaning,
    Packing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Unpacking => "unpacking",
            Stage::Locating => "locating",
            Stage::Packaging => "packaging",
            Stage::Injecting => "injecting",
            Stage::Cleaning => "cleaning",
            Stage::Packing => "packing",
        };
        f.write_str(name)
    }
}

/// How a successful run ended
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The tile had no embedded release; nothing was built or packed
    AlreadyInjected,
    /// The release was built, recorded and the output tile written
    Injected {
        /// Record appended to the product metadata
        release: ReleaseRecord,
        /// Path of the written output tile
        output_tile: PathBuf,
    },
}

/// Runs `body` as `stage`, logging the transition and any failure. The error
/// itself is passed through untouched.
fn in_stage<T>(stage: Stage, body: impl FnOnce() -> Result<T>) -> Result<T> {
    debug!("Entering stage: {}", stage);
    body().inspect_err(|err| debug!("Run failed during {}: {}", stage, err))
}

/// Checks that both tile paths were given. Runs before anything touches the
/// filesystem.
pub fn validate_inputs(input_tile: &Path, output_tile: &Path) -> Result<()> {
    if input_tile.as_os_str().is_empty() {
        return Err(Error::usage("--input-tile is required"));
    }
    if output_tile.as_os_str().is_empty() {
        return Err(Error::usage("--output-tile is required"));
    }
    Ok(())
}

/// The tile injection pipeline and its collaborators
pub struct Application {
    release_creator: Box<dyn ReleaseCreator>,
    injector: Box<dyn MetadataInjector>,
    archiver: Box<dyn Archiver>,
    fs: Arc<dyn TileFilesystem>,
    image_name: String,
}

impl Application {
    /// Creates an application working on the host filesystem.
    pub fn new(
        release_creator: Box<dyn ReleaseCreator>,
        injector: Box<dyn MetadataInjector>,
        archiver: Box<dyn Archiver>,
    ) -> Self {
        Self {
            release_creator,
            injector,
            archiver,
            fs: Arc::new(HostFilesystem),
            image_name: IMAGE_NAME.to_string(),
        }
    }

    /// Replaces the filesystem used to inspect and clean the working tree.
    pub fn with_filesystem(mut self, fs: Arc<dyn TileFilesystem>) -> Self {
        self.fs = fs;
        self
    }

    /// Replaces the root file system image name handed to the release creator.
    pub fn with_image_name(mut self, image_name: impl Into<String>) -> Self {
        self.image_name = image_name.into();
        self
    }

    /// Injects the embedded release of `input_tile` and writes the result to
    /// `output_tile`.
    ///
    /// `working_dir` must be a private directory owned by this run; the caller
    /// removes it afterwards.
    pub fn run(
        &self,
        input_tile: &Path,
        output_tile: &Path,
        registry: &str,
        working_dir: &Path,
    ) -> Result<Outcome> {
        validate_inputs(input_tile, output_tile)?;

        let tile_dir = working_dir.join(EXTRACTED_TILE_DIR);

        in_stage(Stage::Unpacking, || {
            self.archiver.unpack(input_tile, &tile_dir)
        })?;

        let Some(component) = in_stage(Stage::Locating, || self.locate(&tile_dir))? else {
            return Ok(Outcome::AlreadyInjected);
        };

        let tarball_name = release_tarball_name(&component.name, &component.version);
        let tarball_path = tile_dir.join(RELEASES_DIR).join(&tarball_name);

        in_stage(Stage::Packaging, || {
            self.release_creator.create_release(&ReleaseRequest {
                release_name: component.name.clone(),
                image_name: self.image_name.clone(),
                release_dir: component.directory.clone(),
                tarball_path: tarball_path.clone(),
                image_reference: component.image_reference.clone(),
                registry: registry.to_string(),
                version: component.version.clone(),
            })
        })?;

        in_stage(Stage::Injecting, || {
            self.injector.inject_release(
                &tile_dir,
                &tarball_name,
                &component.name,
                &component.version,
            )
        })?;

        in_stage(Stage::Cleaning, || self.fs.remove_all(&component.directory))?;

        in_stage(Stage::Packing, || self.archiver.pack(&tile_dir, output_tile))?;

        Ok(Outcome::Injected {
            release: ReleaseRecord::new(component.name, component.version, tarball_name),
            output_tile: output_tile.to_path_buf(),
        })
    }

    fn locate(&self, tile_dir: &Path) -> Result<Option<EmbeddedComponent>> {
        let Some(directory) = component::find_embedded_component(self.fs.as_ref(), tile_dir)?
        else {
            return Ok(None);
        };
        debug!("Found embedded release at {}", directory.display());

        #[cfg(windows)]
        component::disable_git_filemode(&directory)?;

        EmbeddedComponent::load(self.fs.as_ref(), &directory).map(Some)
    }
}
