//! Default values and fixed layout names for winfs-injector.
//!
//! This module centralizes the names of the directories and files the
//! injector expects inside a tile and inside the embedded release, so the
//! pipeline stages agree on them.

/// Registry the root file system image is fetched from when `--registry` is
/// not given.
pub const DEFAULT_REGISTRY: &str = "https://registry.hub.docker.com";

/// Container image holding the Windows root file system.
pub const IMAGE_NAME: &str = "cloudfoundry/windows2016fs";

/// Directory (relative to the working directory) the input tile is unpacked into.
pub const EXTRACTED_TILE_DIR: &str = "extracted-tile";

/// Directory inside the tile holding the single embedded release.
pub const EMBED_DIR: &str = "embed";

/// Directory inside the tile holding packaged release tarballs.
pub const RELEASES_DIR: &str = "releases";

/// Directory inside the tile holding the product metadata file.
pub const METADATA_DIR: &str = "metadata";

/// File name pattern for the product metadata file inside [`METADATA_DIR`].
pub const METADATA_FILE_PATTERN: &str = "*.yml";

/// Plain-text release version file inside the embedded release.
pub const VERSION_FILE: &str = "VERSION";

/// Release descriptor inside the embedded release, relative to its root.
pub const FINAL_CONFIG_FILE: &str = "config/final.yml";

/// Blob manifest inside the embedded release, relative to its root.
pub const BLOBS_CONFIG_FILE: &str = "config/blobs.yml";

/// Blob key layout naming the root file system image, for example
/// `windows2019fs/windows2016fs-2019.0.43.tgz`. The single capture group is the
/// image tag. This is a compatibility contract with the release authors: a
/// tile whose blob keys no longer follow it needs a newer injector.
pub const ROOTFS_BLOB_PATTERN: &str = r"windows.*fs/windows.*fs-(\d+\.\d+\.\d+)\.tgz";

/// Mode given to every directory created while unpacking a tile.
pub const UNPACKED_DIR_MODE: u32 = 0o700;

/// Mode given to unpacked files whose archive entry carries no Unix mode.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Default external command used to fetch the root file system image.
pub const DEFAULT_IMAGE_FETCHER: &str = "hydrate";

/// Default external command used to build the release tarball.
pub const DEFAULT_BOSH_CLI: &str = "bosh";

/// Returns the tarball file name for a release, `<name>-<version>.tgz`.
pub fn release_tarball_name(name: &str, version: &str) -> String {
    format!("{}-{}.tgz", name, version)
}
