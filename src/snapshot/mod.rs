//! # Snapshots
//!
//! Builds a point-in-time [`RegInvImage`] of a registry and renders it.
//!
//! A snapshot run is strictly sequential:
//!
//! 1. [`source_registry`] picks the registry to snapshot from [`Options`]
//! 2. [`snapshot_manifests`] wraps it in a scaffold manifest, to which
//!    [`Snapshotter::append_manifest_to_snapshot`] appends the user manifest, if any
//! 3. [`Snapshotter::registry_image_inventory`] derives the inventory along the
//!    [`SnapshotPlan`] selected by the options
//! 4. the inventory is reduced by the [`filters`] and rendered by [`Snapshotter::snapshot`]
use std::io::Write;

use crate::config::Options;
use crate::errors::{Error, Result, ResultExt};
use crate::registry::{
    DefaultEdgeBuilder, EdgeBuilder, Manifest, ManifestParser, RegInvImage, RegistryContext,
    RegistryName, RegistryReader, Tag, YamlManifestParser,
};

pub mod filters;
pub use filters::{filter_by_tag, remove_child_digest_entries};

mod serialize;
pub use serialize::{serialize_snapshot, to_csv, to_yaml, OutputFormat};

/// How the inventory of a snapshot is obtained. Selected once per run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SnapshotPlan {
    /// Derive the inventory `source` should hold from the promotion edges declared in manifests.
    /// The registry itself is only read to find manifest list children for minimal snapshots.
    ManifestBased { source: RegistryName },
    /// Read `source` directly, optionally keeping only images carrying `tag`.
    Direct {
        source: RegistryName,
        tag: Option<Tag>,
    },
}

impl SnapshotPlan {
    pub fn from_options(opts: &Options) -> Result<Self> {
        match (opts.snapshot_source(), opts.manifest_based_source()) {
            (Some(source), None) => Ok(SnapshotPlan::Direct {
                source: source.clone(),
                tag: opts.snapshot_tag.clone(),
            }),
            (None, Some(source)) => {
                if let Some(tag) = &opts.snapshot_tag {
                    tracing::warn!("ignoring snapshot tag {tag} for manifest-based snapshot");
                }
                Ok(SnapshotPlan::ManifestBased {
                    source: source.clone(),
                })
            }
            (Some(_), Some(_)) => Err(Error::ConflictingSources),
            (None, None) => Err(Error::SourceNotSpecified),
        }
    }

    /// Name of the registry being snapshotted.
    pub fn source(&self) -> &RegistryName {
        match self {
            SnapshotPlan::ManifestBased { source } => source,
            SnapshotPlan::Direct { source, .. } => source,
        }
    }

    /// Context of the snapshotted registry, marked as a source registry.
    pub fn source_registry(&self, opts: &Options) -> RegistryContext {
        RegistryContext {
            name: self.source().clone(),
            service_account: opts.snapshot_service_account.clone(),
            src: true,
        }
    }
}

/// The registry a snapshot is taken of, marked as a source registry.
pub fn source_registry(opts: &Options) -> Result<RegistryContext> {
    Ok(SnapshotPlan::from_options(opts)?.source_registry(opts))
}

/// Scaffold manifest list for a snapshot: a single manifest holding only the source registry.
pub fn snapshot_manifests(opts: &Options) -> Result<Vec<Manifest>> {
    let src = source_registry(opts).context("building source registry for snapshot")?;
    Ok(vec![Manifest {
        registries: vec![src],
        images: Vec::new(),
        filepath: None,
    }])
}

/// Builds snapshots using the given collaborators.
pub struct Snapshotter<R, P = YamlManifestParser, E = DefaultEdgeBuilder> {
    reader: R,
    parser: P,
    edges: E,
}

impl<R: RegistryReader> Snapshotter<R> {
    /// Snapshotter parsing YAML manifests from disk with the default edge builder.
    pub fn with_reader(reader: R) -> Self {
        Self::new(reader, YamlManifestParser, DefaultEdgeBuilder)
    }
}

impl<R, P, E> Snapshotter<R, P, E>
where
    R: RegistryReader,
    P: ManifestParser,
    E: EdgeBuilder,
{
    pub fn new(reader: R, parser: P, edges: E) -> Self {
        Self {
            reader,
            parser,
            edges,
        }
    }

    /// Append the manifest configured in `opts`, if any, after the scaffold manifests.
    pub async fn append_manifest_to_snapshot(
        &self,
        opts: &Options,
        mut manifests: Vec<Manifest>,
    ) -> Result<Vec<Manifest>> {
        let path = match &opts.manifest {
            Some(path) => path,
            None => {
                tracing::info!("No manifest defined, not appending to snapshot");
                return Ok(manifests);
            }
        };

        let manifest = self
            .parser
            .parse_manifest(path)
            .await
            .context("parsing specified manifest")?;
        manifests.push(manifest);
        Ok(manifests)
    }

    /// Produce the inventory of the snapshotted registry.
    pub async fn registry_image_inventory(
        &self,
        opts: &Options,
        manifests: &[Manifest],
    ) -> Result<RegInvImage> {
        let plan = SnapshotPlan::from_options(opts)
            .context("creating source registry for image inventory")?;
        let src = plan.source_registry(opts);
        tracing::debug!("building inventory of {} using {plan:?}", src.name);

        let rii = match plan {
            SnapshotPlan::ManifestBased { source } => {
                let edges = self
                    .edges
                    .to_promotion_edges(manifests)
                    .context("converting list of manifests to edges for promotion")?;
                let rii = self.edges.edges_to_inventory(&edges, &source);

                if opts.minimal_snapshot {
                    self.remove_child_digests(&src, rii).await?
                } else {
                    rii
                }
            }
            SnapshotPlan::Direct { tag, .. } => {
                // Read recursively, a snapshot covers the whole registry.
                let inventory = self
                    .reader
                    .read_registries(std::slice::from_ref(&src), true)
                    .await
                    .context("reading source registry")?;

                let target = manifests
                    .first()
                    .and_then(|m| m.registries.first())
                    .map(|r| &r.name)
                    .ok_or(Error::SourceNotSpecified)
                    .context("extracting registry inventory")?;
                let mut rii = inventory
                    .get(target)
                    .context("extracting registry inventory")?
                    .clone();

                if let Some(tag) = &tag {
                    rii = filter_by_tag(&rii, tag);
                }

                if opts.minimal_snapshot {
                    tracing::info!("removing tagless child digests of manifest lists");
                    let membership = self
                        .reader
                        .read_manifest_lists(&inventory)
                        .await
                        .context("reading manifest lists")?;
                    rii = remove_child_digest_entries(&rii, &membership);
                }
                rii
            }
        };

        tracing::debug!("inventory of {} holds {} images", src.name, rii.len());
        Ok(rii)
    }

    async fn remove_child_digests(
        &self,
        src: &RegistryContext,
        rii: RegInvImage,
    ) -> Result<RegInvImage> {
        let inventory = self
            .reader
            .read_registries(std::slice::from_ref(src), true)
            .await
            .context("reading source registry")?;
        let membership = self
            .reader
            .read_manifest_lists(&inventory)
            .await
            .context("reading manifest lists")?;
        Ok(remove_child_digest_entries(&rii, &membership))
    }

    /// Assemble manifests and build the (possibly reduced) inventory for `opts`.
    pub async fn build_snapshot(&self, opts: &Options) -> Result<RegInvImage> {
        let manifests = snapshot_manifests(opts)?;
        let manifests = self.append_manifest_to_snapshot(opts, manifests).await?;
        self.registry_image_inventory(opts, &manifests).await
    }

    /// Render `rii` in the configured output format and write it to `out`.
    ///
    /// Nothing is written when the format is not supported.
    pub fn snapshot<W: Write>(&self, opts: &Options, rii: &RegInvImage, out: &mut W) -> Result<()> {
        let snapshot = serialize_snapshot(rii, &opts.output_format)?;
        writeln!(out, "{snapshot}")?;
        Ok(())
    }
}
