//! Reading live registry state.
//!
//! [`RegistryReader`] is the seam between snapshot construction and whatever actually talks to a
//! registry. Implementations may crawl repositories concurrently; callers only await the final
//! [`RegistryInventory`].
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use oci_spec::image::ImageIndex;
use serde::Deserialize;

use super::types::{Image, ImageName, RegInvImage, RegistryContext, RegistryName};
use crate::errors::{Error, Result};
use crate::oci_digest::OciDigest;

/// Location of a manifest list (OCI image index) discovered while reading a registry.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ManifestListRef {
    pub registry: RegistryName,
    pub image: ImageName,
    pub digest: OciDigest,
}

/// Registry contents observed by a [`RegistryReader`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegistryInventory {
    pub inv: BTreeMap<RegistryName, RegInvImage>,
    pub manifest_lists: BTreeSet<ManifestListRef>,
}

impl RegistryInventory {
    /// Inventory of a single registry that was read.
    pub fn get(&self, registry: &RegistryName) -> Result<&RegInvImage> {
        self.inv
            .get(registry)
            .ok_or_else(|| Error::RegistryUnknown(registry.clone()))
    }
}

/// Which digests are referenced as children of a manifest list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ManifestListMembership {
    /// child digest -> digests of manifest lists referencing it
    parents: BTreeMap<OciDigest, BTreeSet<OciDigest>>,
}

impl ManifestListMembership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every manifest referenced by `index` as a child of `parent`.
    pub fn add_index(&mut self, parent: &OciDigest, index: &ImageIndex) -> Result<()> {
        for descriptor in index.manifests() {
            let child = OciDigest::try_from(descriptor.digest().as_str())?;
            self.add_child(parent.clone(), child);
        }
        Ok(())
    }

    pub fn add_child(&mut self, parent: OciDigest, child: OciDigest) {
        self.parents.entry(child).or_default().insert(parent);
    }

    pub fn is_child(&self, digest: &OciDigest) -> bool {
        self.parents.contains_key(digest)
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}

/// Reads image inventories and manifest lists from registries.
#[async_trait]
pub trait RegistryReader: Send + Sync {
    /// Read the inventory of every given registry. With `recursive` set, images nested at any depth
    /// below the registry name are included; otherwise only top-level images are.
    async fn read_registries(
        &self,
        registries: &[RegistryContext],
        recursive: bool,
    ) -> Result<RegistryInventory>;

    /// Fetch the contents of every manifest list recorded in `inventory`.
    async fn read_manifest_lists(
        &self,
        inventory: &RegistryInventory,
    ) -> Result<ManifestListMembership>;
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RegistryDumpFile {
    #[serde(default)]
    registries: BTreeMap<RegistryName, Vec<Image>>,
    #[serde(default)]
    manifest_lists: BTreeMap<OciDigest, ImageIndex>,
}

/// Offline [`RegistryReader`] backed by a YAML dump of registry contents.
///
/// ```yaml
/// registries:
///   gcr.io/foo:
///   - name: bar
///     dmap:
///       "sha256:...": ["v1"]
/// manifest-lists:
///   "sha256:...":
///     schemaVersion: 2
///     manifests:
///     - mediaType: application/vnd.oci.image.manifest.v1+json
///       digest: "sha256:..."
///       size: 525
/// ```
#[derive(Debug, Default)]
pub struct RegistryDump {
    path: PathBuf,
    dump: RegistryDumpFile,
}

impl RegistryDump {
    pub async fn load(path: &Path) -> Result<Self> {
        let s = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| Error::RegistryDumpRead {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_yaml(&s, path)
    }

    pub fn from_yaml(s: &str, path: &Path) -> Result<Self> {
        let dump = serde_yaml::from_str(s).map_err(|source| Error::RegistryDumpParse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            dump,
        })
    }
}

#[async_trait]
impl RegistryReader for RegistryDump {
    async fn read_registries(
        &self,
        registries: &[RegistryContext],
        recursive: bool,
    ) -> Result<RegistryInventory> {
        let mut inventory = RegistryInventory::default();
        for rc in registries {
            tracing::debug!(
                "reading registry {} from {:?} (service account {:?})",
                rc.name,
                self.path,
                rc.service_account
            );
            let images = self
                .dump
                .registries
                .get(&rc.name)
                .ok_or_else(|| Error::RegistryUnknown(rc.name.clone()))?;

            let mut rii = RegInvImage::new();
            for image in images {
                if !recursive && image.name.as_str().contains('/') {
                    continue;
                }
                let dmap = rii.entry(image.name.clone()).or_default();
                for (digest, tags) in &image.dmap {
                    dmap.entry(digest.clone())
                        .or_default()
                        .extend(tags.iter().cloned());
                    if self.dump.manifest_lists.contains_key(digest) {
                        inventory.manifest_lists.insert(ManifestListRef {
                            registry: rc.name.clone(),
                            image: image.name.clone(),
                            digest: digest.clone(),
                        });
                    }
                }
            }
            inventory.inv.insert(rc.name.clone(), rii);
        }
        Ok(inventory)
    }

    async fn read_manifest_lists(
        &self,
        inventory: &RegistryInventory,
    ) -> Result<ManifestListMembership> {
        let mut membership = ManifestListMembership::new();
        for list in &inventory.manifest_lists {
            let index = self.dump.manifest_lists.get(&list.digest).ok_or_else(|| {
                Error::RegistryRead(format!(
                    "manifest list {}/{}@{} missing from {:?}",
                    list.registry, list.image, list.digest, self.path
                ))
            })?;
            membership.add_index(&list.digest, index)?;
        }
        tracing::debug!(
            "read {} manifest lists referencing {} child digests",
            inventory.manifest_lists.len(),
            membership.len()
        );
        Ok(membership)
    }
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::*;

    fn digest(c: char) -> String {
        format!("sha256:{}", c.to_string().repeat(64))
    }

    fn dump() -> RegistryDump {
        let yaml = format!(
            r#"
registries:
  gcr.io/foo:
  - name: bar
    dmap:
      "{a}": ["v1", "v2"]
      "{b}": []
  - name: nested/baz
    dmap:
      "{c}": ["latest"]
manifest-lists:
  "{a}":
    schemaVersion: 2
    mediaType: application/vnd.oci.image.index.v1+json
    manifests:
    - mediaType: application/vnd.oci.image.manifest.v1+json
      digest: "{b}"
      size: 525
"#,
            a = digest('a'),
            b = digest('b'),
            c = digest('c'),
        );
        RegistryDump::from_yaml(&yaml, Path::new("dump.yaml")).unwrap()
    }

    fn source(name: &str) -> RegistryContext {
        RegistryContext {
            name: RegistryName::from(name),
            service_account: String::new(),
            src: true,
        }
    }

    #[rstest]
    #[case::recursive(true, &["bar", "nested/baz"])]
    #[case::top_level(false, &["bar"])]
    #[tokio::test]
    async fn read_registry(#[case] recursive: bool, #[case] expected: &[&str]) {
        let reader = dump();
        let inventory = reader
            .read_registries(&[source("gcr.io/foo")], recursive)
            .await
            .unwrap();

        let rii = inventory.get(&RegistryName::from("gcr.io/foo")).unwrap();
        let names: Vec<&str> = rii.keys().map(ImageName::as_str).collect();
        assert_eq!(names, expected);
        assert_eq!(inventory.manifest_lists.len(), 1);
    }

    #[tokio::test]
    async fn unknown_registry() {
        let res = dump().read_registries(&[source("quay.io/nope")], true).await;
        assert!(matches!(res, Err(Error::RegistryUnknown(_))), "{res:?}");
    }

    #[tokio::test]
    async fn manifest_list_children() {
        let reader = dump();
        let inventory = reader
            .read_registries(&[source("gcr.io/foo")], true)
            .await
            .unwrap();
        let membership = reader.read_manifest_lists(&inventory).await.unwrap();

        let a = OciDigest::try_from(digest('a')).unwrap();
        let b = OciDigest::try_from(digest('b')).unwrap();
        assert!(membership.is_child(&b));
        assert!(!membership.is_child(&a));
        assert_eq!(membership.len(), 1);
    }

    #[test]
    fn malformed_dump() {
        let res = RegistryDump::from_yaml("registries: [", Path::new("dump.yaml"));
        assert!(matches!(res, Err(Error::RegistryDumpParse { .. })));
    }
}
