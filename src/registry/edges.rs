//! Promotion edges: the source -> destination image relationships declared by manifests.
use std::collections::{BTreeMap, BTreeSet};

use super::types::{ImageName, Manifest, RegInvImage, RegistryContext, RegistryName, Tag};
use crate::errors::{Error, Result};
use crate::oci_digest::OciDigest;

/// An image name and optional tag within a registry. `tag` is `None` for tagless promotions.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImageTag {
    pub name: ImageName,
    pub tag: Option<Tag>,
}

/// A single image digest copied from a source registry to a destination registry.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PromotionEdge {
    pub src_registry: RegistryContext,
    pub src_image_tag: ImageTag,
    pub digest: OciDigest,
    pub dst_registry: RegistryContext,
    pub dst_image_tag: ImageTag,
}

/// Converts manifests into promotion edges and edges into registry inventories.
pub trait EdgeBuilder: Send + Sync {
    fn to_promotion_edges(&self, manifests: &[Manifest]) -> Result<BTreeSet<PromotionEdge>>;

    fn edges_to_inventory(
        &self,
        edges: &BTreeSet<PromotionEdge>,
        registry: &RegistryName,
    ) -> RegInvImage {
        edges_to_reg_inv_image(edges, registry)
    }
}

#[derive(Clone, Debug, Default)]
pub struct DefaultEdgeBuilder;

impl EdgeBuilder for DefaultEdgeBuilder {
    fn to_promotion_edges(&self, manifests: &[Manifest]) -> Result<BTreeSet<PromotionEdge>> {
        let mut edges = BTreeSet::new();
        for manifest in manifests {
            if manifest.images.is_empty() {
                continue;
            }
            let src = manifest
                .src_registry()
                .ok_or_else(|| Error::MissingSourceRegistry(manifest.filepath.clone()))?;

            for image in &manifest.images {
                for (digest, tags) in &image.dmap {
                    for dst in manifest.registries.iter().filter(|r| *r != src) {
                        let edge = |tag: Option<&Tag>| PromotionEdge {
                            src_registry: src.clone(),
                            src_image_tag: ImageTag {
                                name: image.name.clone(),
                                tag: tag.cloned(),
                            },
                            digest: digest.clone(),
                            dst_registry: dst.clone(),
                            dst_image_tag: ImageTag {
                                name: image.name.clone(),
                                tag: tag.cloned(),
                            },
                        };
                        if tags.is_empty() {
                            edges.insert(edge(None));
                        } else {
                            for tag in tags {
                                edges.insert(edge(Some(tag)));
                            }
                        }
                    }
                }
            }
        }
        tracing::debug!("converted {} manifests into {} edges", manifests.len(), edges.len());

        check_overlapping_edges(&edges)?;
        Ok(edges)
    }
}

/// Fail if two edges would write different digests to the same destination tag.
fn check_overlapping_edges(edges: &BTreeSet<PromotionEdge>) -> Result<()> {
    let mut destinations: BTreeMap<(&RegistryName, &ImageName, &Tag), BTreeSet<&OciDigest>> =
        BTreeMap::new();
    for edge in edges {
        // tagless edges never collide
        if let Some(tag) = &edge.dst_image_tag.tag {
            destinations
                .entry((&edge.dst_registry.name, &edge.dst_image_tag.name, tag))
                .or_default()
                .insert(&edge.digest);
        }
    }

    match destinations.into_iter().find(|(_, digests)| digests.len() > 1) {
        Some(((registry, image, tag), digests)) => Err(Error::OverlappingEdges {
            registry: registry.clone(),
            image: image.clone(),
            tag: tag.clone(),
            digests: digests.into_iter().map(String::from).collect(),
        }),
        None => Ok(()),
    }
}

/// Build the inventory that `registry` would hold once every edge targeting it is promoted.
///
/// Edges whose destination registry is `registry` or nested below it are kept; for nested
/// destinations the remaining registry path becomes part of the image name.
pub fn edges_to_reg_inv_image(
    edges: &BTreeSet<PromotionEdge>,
    registry: &RegistryName,
) -> RegInvImage {
    let registry = registry.as_str().trim_end_matches('/');
    let mut rii = RegInvImage::new();

    for edge in edges {
        let prefix = match edge.dst_registry.name.as_str().strip_prefix(registry) {
            Some(p) if p.is_empty() || p.starts_with('/') => p.trim_matches('/'),
            _ => continue,
        };
        let name = if prefix.is_empty() {
            edge.dst_image_tag.name.clone()
        } else {
            ImageName::from(format!("{}/{}", prefix, edge.dst_image_tag.name))
        };

        let tags = rii
            .entry(name)
            .or_default()
            .entry(edge.digest.clone())
            .or_default();
        if let Some(tag) = &edge.dst_image_tag.tag {
            tags.insert(tag.clone());
        }
    }
    rii
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::*;
    use crate::registry::types::{DigestTags, Image};

    fn digest(c: char) -> OciDigest {
        OciDigest::try_from(format!("sha256:{}", c.to_string().repeat(64))).unwrap()
    }

    fn registry(name: &str, src: bool) -> RegistryContext {
        RegistryContext {
            name: RegistryName::from(name),
            service_account: String::new(),
            src,
        }
    }

    fn image(name: &str, dmap: &[(char, &[&str])]) -> Image {
        let dmap: DigestTags = dmap
            .iter()
            .map(|(c, tags)| {
                (
                    digest(*c),
                    tags.iter().map(|t| Tag::try_from(*t).unwrap()).collect(),
                )
            })
            .collect();
        Image {
            name: ImageName::from(name),
            dmap,
        }
    }

    fn manifest(registries: Vec<RegistryContext>, images: Vec<Image>) -> Manifest {
        Manifest {
            registries,
            images,
            filepath: None,
        }
    }

    #[test]
    fn one_edge_per_tag_and_destination() {
        let m = manifest(
            vec![
                registry("gcr.io/src", true),
                registry("us.gcr.io/dst", false),
                registry("eu.gcr.io/dst", false),
            ],
            vec![image("foo", &[('a', &["v1", "v2"]), ('b', &[])])],
        );

        let edges = DefaultEdgeBuilder.to_promotion_edges(&[m]).unwrap();
        // (2 tags + 1 tagless) x 2 destinations
        assert_eq!(edges.len(), 6);
        assert!(edges.iter().all(|e| e.src_registry.name.as_str() == "gcr.io/src"));
        assert_eq!(
            edges.iter().filter(|e| e.dst_image_tag.tag.is_none()).count(),
            2
        );
    }

    #[test]
    fn scaffold_manifest_contributes_nothing() {
        let scaffold = manifest(vec![registry("gcr.io/src", true)], vec![]);
        let edges = DefaultEdgeBuilder.to_promotion_edges(&[scaffold]).unwrap();
        assert!(edges.is_empty());
    }

    #[test]
    fn missing_source_registry() {
        let m = manifest(
            vec![registry("gcr.io/dst", false)],
            vec![image("foo", &[('a', &["v1"])])],
        );
        let res = DefaultEdgeBuilder.to_promotion_edges(&[m]);
        assert!(matches!(res, Err(Error::MissingSourceRegistry(None))), "{res:?}");
    }

    #[test]
    fn overlapping_edges() {
        let registries = vec![registry("gcr.io/src", true), registry("gcr.io/dst", false)];
        let a = manifest(registries.clone(), vec![image("foo", &[('a', &["v1"])])]);
        let b = manifest(registries, vec![image("foo", &[('b', &["v1"])])]);

        let res = DefaultEdgeBuilder.to_promotion_edges(&[a, b]);
        match res {
            Err(Error::OverlappingEdges { image, tag, digests, .. }) => {
                assert_eq!(image.as_str(), "foo");
                assert_eq!(tag.as_str(), "v1");
                assert_eq!(digests.len(), 2);
            }
            r => assert!(false, "expected overlapping edges error got {r:?}"),
        }
    }

    #[rstest]
    #[case::exact("gcr.io/dst", &["foo"])]
    #[case::trailing_slash("gcr.io/dst/", &["foo"])]
    #[case::parent("gcr.io", &["dst/foo"])]
    #[case::sibling_prefix("gcr.io/ds", &[])]
    #[case::other("quay.io", &[])]
    fn inventory_keeps_edges_below_registry(#[case] source: &str, #[case] expected: &[&str]) {
        let m = manifest(
            vec![registry("gcr.io/src", true), registry("gcr.io/dst", false)],
            vec![image("foo", &[('a', &["v1"])])],
        );
        let edges = DefaultEdgeBuilder.to_promotion_edges(&[m]).unwrap();

        let rii = DefaultEdgeBuilder.edges_to_inventory(&edges, &RegistryName::from(source));
        let names: Vec<&str> = rii.keys().map(ImageName::as_str).collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn inventory_images_are_exactly_edge_destinations() {
        let m = manifest(
            vec![registry("gcr.io/src", true), registry("gcr.io/dst", false)],
            vec![
                image("foo", &[('a', &["v1", "v2"]), ('b', &[])]),
                image("bar/baz", &[('c', &["latest"])]),
            ],
        );
        let edges = DefaultEdgeBuilder.to_promotion_edges(&[m]).unwrap();
        let rii = DefaultEdgeBuilder.edges_to_inventory(&edges, &RegistryName::from("gcr.io/dst"));

        let from_edges: BTreeSet<&ImageName> =
            edges.iter().map(|e| &e.dst_image_tag.name).collect();
        let from_rii: BTreeSet<&ImageName> = rii.keys().collect();
        assert_eq!(from_edges, from_rii);

        let foo = &rii[&ImageName::from("foo")];
        assert_eq!(foo[&digest('a')].len(), 2);
        assert!(foo[&digest('b')].is_empty());
    }
}
