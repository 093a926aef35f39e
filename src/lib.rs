//! # promo-snapshot
//!
//! Point-in-time inventory snapshots of container image registries, used to drive image promotion
//! decisions. See [`snapshot`] for how a snapshot is built.
mod config;
pub use config::{parse_snapshot_tag, Options};

pub mod errors;
pub use errors::{Error, Result};

mod oci_digest;
pub use oci_digest::OciDigest;

pub mod registry;

pub mod snapshot;
pub use snapshot::{OutputFormat, SnapshotPlan, Snapshotter};
