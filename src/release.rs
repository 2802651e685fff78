//! Release tarball creation
//!
//! Packaging the embedded release is delegated to two external tools:
//!
//! 1. an image fetcher (`hydrate` by default) that downloads the root file
//!    system image from the registry into the release's `blobs/` directory;
//! 2. the BOSH CLI, whose `create-release` turns the release directory into a
//!    versioned tarball.
//!
//! The pipeline only depends on the [`ReleaseCreator`] trait, so tests can
//! swap in a fake that records its arguments.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::info;

use crate::defaults::{DEFAULT_BOSH_CLI, DEFAULT_IMAGE_FETCHER};
use crate::error::{Error, Result};

/// Everything needed to build one release tarball
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseRequest {
    /// Release name, also the blob directory the image is fetched into
    pub release_name: String,
    /// Container image holding the root file system
    pub image_name: String,
    /// Release source directory
    pub release_dir: PathBuf,
    /// Where the finished tarball must be written
    pub tarball_path: PathBuf,
    /// Image tag to fetch
    pub image_reference: String,
    /// Registry to fetch the image from
    pub registry: String,
    /// Version to stamp on the release
    pub version: String,
}

/// Trait for release creation - allows recording fakes in tests
pub trait ReleaseCreator: Send + Sync {
    /// Builds the tarball described by `request` at `request.tarball_path`.
    fn create_release(&self, request: &ReleaseRequest) -> Result<()>;
}

/// The default implementation of `ReleaseCreator`, which shells out to the
/// image fetcher and the BOSH CLI.
#[derive(Debug, Clone)]
pub struct CommandReleaseCreator {
    image_fetcher: OsString,
    bosh_cli: OsString,
}

impl Default for CommandReleaseCreator {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_FETCHER, DEFAULT_BOSH_CLI)
    }
}

impl CommandReleaseCreator {
    pub fn new(image_fetcher: impl Into<OsString>, bosh_cli: impl Into<OsString>) -> Self {
        Self {
            image_fetcher: image_fetcher.into(),
            bosh_cli: bosh_cli.into(),
        }
    }

    /// Builds the image fetch command for `request`.
    pub fn fetch_image_command(&self, request: &ReleaseRequest) -> Command {
        let blob_dir = request
            .release_dir
            .join("blobs")
            .join(&request.release_name);
        let mut command = Command::new(&self.image_fetcher);
        command
            .arg("download")
            .args(["-image", request.image_name.as_str()])
            .args(["-tag", request.image_reference.as_str()])
            .args(["-registry", request.registry.as_str()])
            .arg("-outputDir")
            .arg(blob_dir);
        command
    }

    /// Builds the `bosh create-release` command for `request`.
    ///
    /// `home` becomes the command's `HOME`: create-release leaves several
    /// gigabytes of cache behind under it.
    pub fn create_release_command(
        &self,
        request: &ReleaseRequest,
        tarball_path: &Path,
        home: &Path,
    ) -> Command {
        let mut command = Command::new(&self.bosh_cli);
        command
            .arg("create-release")
            .arg("--dir")
            .arg(&request.release_dir)
            .args(["--version", request.version.as_str()])
            .arg("--tarball")
            .arg(tarball_path)
            .env("HOME", home);
        command
    }
}

fn describe(command: &Command) -> String {
    let mut parts = vec![command.get_program().to_string_lossy().into_owned()];
    parts.extend(command.get_args().map(|arg| arg.to_string_lossy().into_owned()));
    parts.join(" ")
}

fn run(mut command: Command) -> Result<()> {
    let description = describe(&command);
    let output = command.output().map_err(|e| Error::ReleaseCreation {
        command: description.clone(),
        message: e.to_string(),
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let message = if stderr.trim().is_empty() {
            format!("{} ({})", stdout.trim(), output.status)
        } else {
            format!("{} ({})", stderr.trim(), output.status)
        };
        return Err(Error::ReleaseCreation {
            command: description,
            message,
        });
    }

    Ok(())
}

impl ReleaseCreator for CommandReleaseCreator {
    fn create_release(&self, request: &ReleaseRequest) -> Result<()> {
        info!(
            "Fetching {}:{} from {}",
            request.image_name, request.image_reference, request.registry
        );
        run(self.fetch_image_command(request))?;

        let tarball_path = std::path::absolute(&request.tarball_path)
            .map_err(|e| Error::file_access(&request.tarball_path, e))?;
        if let Some(parent) = tarball_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::file_access(parent, e))?;
        }

        let home = tempfile::Builder::new()
            .prefix("winfs-create-release")
            .tempdir()?;

        info!(
            "Creating release {} {} at {}",
            request.release_name,
            request.version,
            tarball_path.display()
        );
        run(self.create_release_command(request, &tarball_path, home.path()))
    }
}
