use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;

use super::types::{Manifest, Tag};
use crate::errors::{Error, Result};

/// Loads a [`Manifest`] from storage.
#[async_trait]
pub trait ManifestParser: Send + Sync {
    async fn parse_manifest(&self, path: &Path) -> Result<Manifest>;
}

/// Reads promoter manifests from YAML files on the local filesystem.
#[derive(Clone, Debug, Default)]
pub struct YamlManifestParser;

#[async_trait]
impl ManifestParser for YamlManifestParser {
    async fn parse_manifest(&self, path: &Path) -> Result<Manifest> {
        let s = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| Error::ManifestRead {
                path: path.to_path_buf(),
                source,
            })?;
        parse_manifest_yaml(&s, path)
    }
}

/// Parse and validate manifest YAML that was read from `path`.
pub fn parse_manifest_yaml(s: &str, path: &Path) -> Result<Manifest> {
    let mut manifest: Manifest =
        serde_yaml::from_str(s).map_err(|source| Error::ManifestParse {
            path: path.to_path_buf(),
            source,
        })?;
    manifest.filepath = Some(path.to_path_buf());
    validate(&manifest)?;
    tracing::debug!(
        "parsed manifest {path:?} with {} registries and {} images",
        manifest.registries.len(),
        manifest.images.len()
    );
    Ok(manifest)
}

fn validate(manifest: &Manifest) -> Result<()> {
    let path = manifest.filepath.clone().unwrap_or_default();
    let invalid = |reason: String| Error::ManifestInvalid {
        path: path.clone(),
        reason,
    };

    if manifest.registries.is_empty() {
        return Err(invalid(String::from("no registries defined")));
    }
    if let Some(r) = manifest.registries.iter().find(|r| r.name.as_str().is_empty()) {
        return Err(invalid(format!("registry with empty name: {r:?}")));
    }
    match manifest.registries.iter().filter(|r| r.src).count() {
        1 => {}
        0 => return Err(invalid(String::from("source registry must be set"))),
        n => return Err(invalid(format!("{n} registries marked as source"))),
    }

    for image in &manifest.images {
        if image.name.as_str().is_empty() {
            return Err(invalid(String::from("image with empty name")));
        }

        // a tag may only point at one digest per image
        let mut seen: HashMap<&Tag, String> = HashMap::new();
        for (digest, tags) in &image.dmap {
            for tag in tags {
                if let Some(other) = seen.insert(tag, digest.to_string()) {
                    return Err(invalid(format!(
                        "tag {tag} of image {} points to both {other} and {digest}",
                        image.name
                    )));
                }
            }
        }
    }
    Ok(())
}
