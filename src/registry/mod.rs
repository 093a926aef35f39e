//! # Registry Abstractions
//!
//! Data model shared by snapshot construction plus the collaborators it consumes:
//!
//! * [`ManifestParser`] loads declarative promoter manifests
//! * [`EdgeBuilder`] turns manifests into [`PromotionEdge`]s and edges into inventories
//! * [`RegistryReader`] reads live registry contents and manifest lists
pub mod types;
pub use types::{
    DigestTags, Image, ImageName, Manifest, RegInvImage, RegistryContext, RegistryName, Tag,
};

pub mod manifests;
pub use manifests::{ManifestParser, YamlManifestParser};

pub mod edges;
pub use edges::{DefaultEdgeBuilder, EdgeBuilder, ImageTag, PromotionEdge};

pub mod reader;
pub use reader::{
    ManifestListMembership, ManifestListRef, RegistryDump, RegistryInventory, RegistryReader,
};
