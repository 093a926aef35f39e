use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};
use crate::oci_digest::OciDigest;

macro_rules! name_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(String::from(s))
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

name_type!(
    /// Opaque identifier of a registry endpoint, eg `gcr.io/k8s-staging-foo`.
    RegistryName
);

name_type!(
    /// Image path relative to the registry it lives in.
    ImageName
);

/// Image tag as defined by the [OCI Distribution
/// Spec](https://github.com/opencontainers/distribution-spec/blob/main/spec.md#pulling-manifests):
///
/// > `<reference>` as a tag MUST be at most 128 characters in length and MUST match the following
/// > regular expression: `[a-zA-Z0-9_][a-zA-Z0-9._-]{0,127}`
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Tag(String);

impl Tag {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Tag {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        static RE: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_][a-zA-Z0-9._-]{0,127}$").unwrap());

        if RE.is_match(s) {
            return Ok(Self(String::from(s)));
        }
        Err(Error::InvalidTag(String::from(s)))
    }
}

impl TryFrom<String> for Tag {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Tag::try_from(s.as_str())
    }
}

impl From<Tag> for String {
    fn from(t: Tag) -> String {
        t.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tags associated with each digest of an image. An empty set means the digest is untagged.
pub type DigestTags = BTreeMap<OciDigest, BTreeSet<Tag>>;

/// Registry image inventory: every image known in a registry with its digests and tags.
///
/// Ordered maps keep the inventory free of duplicate images and digests and give serialized
/// snapshots a stable ordering.
pub type RegInvImage = BTreeMap<ImageName, DigestTags>;

/// Identity and credentials of one registry endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RegistryContext {
    pub name: RegistryName,
    #[serde(default)]
    pub service_account: String,
    /// Whether this is the registry images are promoted from.
    #[serde(default)]
    pub src: bool,
}

/// An image declared in a manifest along with the digests and tags it should carry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub name: ImageName,
    #[serde(default)]
    pub dmap: DigestTags,
}

/// Declarative description of the images that should exist across a set of registries.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub registries: Vec<RegistryContext>,
    #[serde(default)]
    pub images: Vec<Image>,

    /// File this manifest was parsed from, if any.
    #[serde(skip)]
    pub filepath: Option<PathBuf>,
}

impl Manifest {
    /// The registry images are promoted from, ie the one marked `src: true`.
    pub fn src_registry(&self) -> Option<&RegistryContext> {
        self.registries.iter().find(|r| r.src)
    }
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::*;

    #[rstest]
    #[case::simple("v1.2.3", true)]
    #[case::underscore_lead("_foo", true)]
    #[case::dash_lead("-foo", false)]
    #[case::dot_lead(".foo", false)]
    #[case::empty("", false)]
    #[case::slash("foo/bar", false)]
    #[case::max_len(&"a".repeat(128), true)]
    #[case::too_long(&"a".repeat(129), false)]
    fn validate_tag(#[case] input: &str, #[case] valid: bool) {
        assert_eq!(Tag::try_from(input).is_ok(), valid, "tag {input:?}");
    }

    #[test]
    fn manifest_from_yaml() {
        let digest = format!("sha256:{}", "a".repeat(64));
        let yaml = format!(
            r#"
registries:
- name: gcr.io/src
  service-account: sa@example.com
  src: true
- name: us.gcr.io/dst
images:
- name: foo
  dmap:
    "{digest}": ["1.0", "latest"]
"#
        );
        let m: Manifest = serde_yaml::from_str(&yaml).unwrap();

        let src = m.src_registry().unwrap();
        assert_eq!(src.name.as_str(), "gcr.io/src");
        assert_eq!(src.service_account, "sa@example.com");
        assert!(!m.registries[1].src);
        assert_eq!(m.images.len(), 1);

        let tags = &m.images[0].dmap[&OciDigest::try_from(digest.as_str()).unwrap()];
        let tags: Vec<&str> = tags.iter().map(Tag::as_str).collect();
        assert_eq!(tags, vec!["1.0", "latest"]);
    }
}
