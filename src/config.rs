use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{de, Deserialize, Deserializer};

use crate::errors::{Error, Result};
use crate::registry::{RegistryName, Tag};
use crate::snapshot::{OutputFormat, SnapshotPlan};

/// Run configuration for a single snapshot. Read-only once the run starts.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct Options {
    /// `csv` or `yaml`, case-insensitive.
    pub output_format: String,
    /// Registry to snapshot by reading it directly.
    pub snapshot: Option<RegistryName>,
    /// Registry to snapshot from the promotion edges declared by manifests.
    pub manifest_based_snapshot_of: Option<RegistryName>,
    /// Promoter manifest appended to the snapshot manifests.
    pub manifest: Option<PathBuf>,
    /// Only keep images carrying this tag (direct snapshots only).
    #[serde(deserialize_with = "deserialize_snapshot_tag")]
    pub snapshot_tag: Option<Tag>,
    /// Drop untagged manifest list children from the snapshot.
    pub minimal_snapshot: bool,
    pub snapshot_service_account: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            output_format: String::from("yaml"),
            snapshot: None,
            manifest_based_snapshot_of: None,
            manifest: None,
            snapshot_tag: None,
            minimal_snapshot: false,
            snapshot_service_account: String::new(),
        }
    }
}

fn non_empty(name: &Option<RegistryName>) -> Option<&RegistryName> {
    name.as_ref().filter(|n| !n.as_str().is_empty())
}

/// Parse a snapshot tag; an empty tag means no tag filter.
pub fn parse_snapshot_tag(s: &str) -> Result<Option<Tag>> {
    if s.is_empty() {
        return Ok(None);
    }
    Ok(Some(Tag::try_from(s)?))
}

fn deserialize_snapshot_tag<'de, D>(d: D) -> std::result::Result<Option<Tag>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(d)? {
        Some(s) => parse_snapshot_tag(&s).map_err(de::Error::custom),
        None => Ok(None),
    }
}

impl Options {
    /// Load options from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut f = File::open(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let mut s = String::new();
        f.read_to_string(&mut s).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&s).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Registry named for a direct snapshot, ignoring empty names.
    pub fn snapshot_source(&self) -> Option<&RegistryName> {
        non_empty(&self.snapshot)
    }

    /// Registry named for a manifest-based snapshot, ignoring empty names.
    pub fn manifest_based_source(&self) -> Option<&RegistryName> {
        non_empty(&self.manifest_based_snapshot_of)
    }

    /// Check everything that can be checked before touching manifests or registries.
    pub fn validate(&self) -> Result<()> {
        self.output_format.parse::<OutputFormat>()?;
        SnapshotPlan::from_options(self)?;
        Ok(())
    }
}
