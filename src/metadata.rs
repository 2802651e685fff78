//! Product metadata rewriting
//!
//! Every tile carries exactly one product metadata file under `metadata/`.
//! Its top-level `releases` sequence lists the release tarballs shipped in the
//! tile. After the embedded release has been packaged, the injector appends a
//! record for the new tarball to that sequence.
//!
//! The metadata file has many more top-level fields than `releases`
//! (`name`, `product_version`, `property_blueprints`, ...). None of them are
//! interpreted here: they are carried through [`ManifestDocument::other`]
//! untouched, in their original order. Existing release records keep any
//! fields beyond `name`, `version` and `file` as well.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use glob::Pattern;
use log::debug;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::{Mapping, Value};
use tempfile::NamedTempFile;

use crate::defaults::{METADATA_DIR, METADATA_FILE_PATTERN};
use crate::error::{Error, Result};

/// A `{name, version, file}` entry of the `releases` sequence
///
/// The three known fields are read as the raw scalar text, so `version: 1.10`
/// stays `"1.10"` and a null becomes the empty string.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReleaseRecord {
    pub name: String,
    pub version: String,
    /// Base file name of the release tarball inside the tile's `releases/`
    pub file: String,
    /// Any other fields of an existing record
    #[serde(flatten)]
    pub extra: Mapping,
}

impl ReleaseRecord {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        file: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            file: file.into(),
            extra: Mapping::new(),
        }
    }
}

/// The parsed product metadata file
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ManifestDocument {
    /// Release records, in file order
    pub releases: Vec<ReleaseRecord>,
    /// Every other top-level field, preserved verbatim
    #[serde(flatten)]
    pub other: Mapping,
}

impl ManifestDocument {
    /// Parses a metadata document. An empty document parses as one with no
    /// releases and no other fields.
    pub fn parse(data: &[u8]) -> std::result::Result<Self, serde_yaml::Error> {
        let document: Option<ManifestDocument> = serde_yaml::from_slice(data)?;
        Ok(document.unwrap_or_default())
    }

    /// Serializes the document back to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Appends a release record after the existing ones.
    pub fn append_release(&mut self, release: ReleaseRecord) {
        self.releases.push(release);
    }
}

/// A scalar taken as its source text. Nulls read as the empty string.
struct RawScalar(String);

impl<'de> Deserialize<'de> for RawScalar {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(RawScalar(
            Option::<String>::deserialize(deserializer)?.unwrap_or_default(),
        ))
    }
}

// No `#[serde(flatten)]` on the read side: it buffers `1.10` as the float 1.1.

impl<'de> Deserialize<'de> for ReleaseRecord {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct RecordVisitor;

        impl<'de> Visitor<'de> for RecordVisitor {
            type Value = ReleaseRecord;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a release record mapping")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<ReleaseRecord, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut record = ReleaseRecord::default();
                while let Some(key) = map.next_key::<Value>()? {
                    match key.as_str() {
                        Some("name") => record.name = map.next_value::<RawScalar>()?.0,
                        Some("version") => record.version = map.next_value::<RawScalar>()?.0,
                        Some("file") => record.file = map.next_value::<RawScalar>()?.0,
                        _ => {
                            let value = map.next_value::<Value>()?;
                            record.extra.insert(key, value);
                        }
                    }
                }
                Ok(record)
            }
        }

        deserializer.deserialize_map(RecordVisitor)
    }
}

impl<'de> Deserialize<'de> for ManifestDocument {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DocumentVisitor;

        impl<'de> Visitor<'de> for DocumentVisitor {
            type Value = ManifestDocument;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a product metadata mapping")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<ManifestDocument, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut document = ManifestDocument::default();
                while let Some(key) = map.next_key::<Value>()? {
                    if key.as_str() == Some("releases") {
                        document.releases = map
                            .next_value::<Option<Vec<ReleaseRecord>>>()?
                            .unwrap_or_default();
                    } else {
                        let value = map.next_value::<Value>()?;
                        document.other.insert(key, value);
                    }
                }
                Ok(document)
            }
        }

        deserializer.deserialize_map(DocumentVisitor)
    }
}

/// Trait for the metadata rewrite - allows recording fakes in tests
pub trait MetadataInjector: Send + Sync {
    /// Appends `{name, version, file: release_file}` to the `releases` of the
    /// single product metadata file inside `tile_dir`.
    fn inject_release(
        &self,
        tile_dir: &Path,
        release_file: &str,
        release_name: &str,
        release_version: &str,
    ) -> Result<()>;
}

/// The default implementation of `MetadataInjector`, editing the metadata file
/// on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct TileMetadataInjector;

impl MetadataInjector for TileMetadataInjector {
    fn inject_release(
        &self,
        tile_dir: &Path,
        release_file: &str,
        release_name: &str,
        release_version: &str,
    ) -> Result<()> {
        inject_release(tile_dir, release_file, release_name, release_version)
    }
}

/// Resolves the single product metadata file `<tile_dir>/metadata/*.yml`.
pub fn find_metadata_file(tile_dir: &Path) -> Result<PathBuf> {
    let display_pattern = tile_dir.join(METADATA_DIR).join(METADATA_FILE_PATTERN);
    let pattern = format!(
        "{}/{}/{}",
        Pattern::escape(&tile_dir.to_string_lossy()),
        METADATA_DIR,
        METADATA_FILE_PATTERN
    );

    let mut matches = Vec::new();
    for entry in glob::glob(&pattern)? {
        let path = entry.map_err(|e| {
            let path = e.path().to_path_buf();
            Error::file_access(path, std::io::Error::from(e))
        })?;
        matches.push(path);
    }

    match matches.len() {
        0 => Err(Error::structure(format!(
            "expected to find a product metadata file matching path '{}', but found none",
            display_pattern.display()
        ))),
        1 => Ok(matches.remove(0)),
        _ => Err(Error::structure(format!(
            "expected to find a single metadata file matching path '{}', but found multiple",
            display_pattern.display()
        ))),
    }
}

/// Appends a release record to the product metadata file inside `tile_dir`.
///
/// The file is rewritten through a temporary sibling that is renamed over it,
/// so a failure never leaves a truncated metadata file behind. The file keeps
/// its permissions.
pub fn inject_release(
    tile_dir: &Path,
    release_file: &str,
    release_name: &str,
    release_version: &str,
) -> Result<()> {
    let metadata_path = find_metadata_file(tile_dir)?;
    let data = fs::read(&metadata_path).map_err(|e| Error::file_access(&metadata_path, e))?;

    let mut document = ManifestDocument::parse(&data).map_err(|source| Error::Parse {
        path: metadata_path.clone(),
        source,
    })?;
    document.append_release(ReleaseRecord::new(release_name, release_version, release_file));

    debug!(
        "Adding release {} {} ({}) to {}",
        release_name,
        release_version,
        release_file,
        metadata_path.display()
    );
    write_atomically(&metadata_path, document.to_yaml()?.as_bytes())
}

fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    let permissions = fs::metadata(path)
        .map_err(|e| Error::file_access(path, e))?
        .permissions();
    let parent = path.parent().unwrap_or_else(|| Path::new("."));

    let mut temp = NamedTempFile::new_in(parent).map_err(|e| Error::file_access(path, e))?;
    temp.write_all(contents)
        .map_err(|e| Error::file_access(path, e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| Error::file_access(path, e))?;
    fs::set_permissions(temp.path(), permissions).map_err(|e| Error::file_access(path, e))?;
    temp.persist(path)
        .map_err(|e| Error::file_access(path, e.error))?;
    Ok(())
}
