//! Reductions applied to a finished inventory. Both only ever drop entries.
use crate::registry::{ManifestListMembership, RegInvImage, Tag};

/// Keep only digests carrying `tag`, stripped of every other tag. Images left without any digest
/// are dropped.
pub fn filter_by_tag(rii: &RegInvImage, tag: &Tag) -> RegInvImage {
    let mut filtered = RegInvImage::new();
    for (image, dmap) in rii {
        for (digest, tags) in dmap {
            if tags.contains(tag) {
                filtered
                    .entry(image.clone())
                    .or_default()
                    .entry(digest.clone())
                    .or_default()
                    .insert(tag.clone());
            }
        }
    }
    filtered
}

/// Remove untagged digests that are children of a manifest list. Tagged children are kept since
/// they can be pulled on their own.
pub fn remove_child_digest_entries(
    rii: &RegInvImage,
    membership: &ManifestListMembership,
) -> RegInvImage {
    let mut filtered = RegInvImage::new();
    for (image, dmap) in rii {
        for (digest, tags) in dmap {
            if tags.is_empty() && membership.is_child(digest) {
                tracing::debug!("dropping manifest list child {image}@{digest}");
                continue;
            }
            filtered
                .entry(image.clone())
                .or_default()
                .insert(digest.clone(), tags.clone());
        }
    }
    filtered
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::*;
    use crate::oci_digest::OciDigest;
    use crate::registry::{DigestTags, ImageName};

    fn digest(c: char) -> OciDigest {
        OciDigest::try_from(format!("sha256:{}", c.to_string().repeat(64))).unwrap()
    }

    fn tag(t: &str) -> Tag {
        Tag::try_from(t).unwrap()
    }

    fn inventory(images: &[(&str, &[(char, &[&str])])]) -> RegInvImage {
        images
            .iter()
            .map(|(name, dmap)| {
                let dmap: DigestTags = dmap
                    .iter()
                    .map(|(c, tags)| (digest(*c), tags.iter().map(|t| tag(t)).collect()))
                    .collect();
                (ImageName::from(*name), dmap)
            })
            .collect()
    }

    #[fixture]
    fn rii() -> RegInvImage {
        inventory(&[
            ("foo", &[('a', &["v1", "latest"]), ('b', &["v2"]), ('c', &[])]),
            ("bar", &[('d', &["v2"])]),
            ("baz", &[('e', &["v1"])]),
        ])
    }

    #[rstest]
    #[case::v1("v1", inventory(&[("foo", &[('a', &["v1"])]), ("baz", &[('e', &["v1"])])]))]
    #[case::v2("v2", inventory(&[("foo", &[('b', &["v2"])]), ("bar", &[('d', &["v2"])])]))]
    #[case::absent("v3", RegInvImage::new())]
    fn by_tag(rii: RegInvImage, #[case] t: &str, #[case] expected: RegInvImage) {
        let filtered = filter_by_tag(&rii, &tag(t));
        assert_eq!(filtered, expected);
        assert_eq!(filter_by_tag(&filtered, &tag(t)), filtered);
    }

    #[rstest]
    fn child_digests(rii: RegInvImage) {
        let mut membership = ManifestListMembership::new();
        // untagged child, dropped
        membership.add_child(digest('a'), digest('c'));
        // tagged child, kept
        membership.add_child(digest('a'), digest('b'));

        let filtered = remove_child_digest_entries(&rii, &membership);
        let foo = &filtered[&ImageName::from("foo")];
        assert!(!foo.contains_key(&digest('c')));
        assert!(foo.contains_key(&digest('b')));
        assert_eq!(filtered.len(), 3);

        assert_eq!(remove_child_digest_entries(&filtered, &membership), filtered);
    }

    #[test]
    fn image_emptied_by_child_filter_is_dropped() {
        let rii = inventory(&[("foo", &[('a', &["v1"])]), ("bar", &[('b', &[])])]);
        let mut membership = ManifestListMembership::new();
        membership.add_child(digest('a'), digest('b'));

        let filtered = remove_child_digest_entries(&rii, &membership);
        assert_eq!(filtered, inventory(&[("foo", &[('a', &["v1"])])]));
    }
}
