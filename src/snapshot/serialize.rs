use serde::Serialize;

use crate::errors::{Error, Result};
use crate::registry::{DigestTags, ImageName, RegInvImage};

/// Rendering of a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Yaml,
}

impl std::str::FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "yaml" => Ok(OutputFormat::Yaml),
            _ => Err(Error::UnsupportedFormat(String::from(s))),
        }
    }
}

impl OutputFormat {
    pub fn render(&self, rii: &RegInvImage) -> Result<String> {
        match self {
            OutputFormat::Csv => Ok(to_csv(rii)),
            OutputFormat::Yaml => to_yaml(rii),
        }
    }
}

/// Render `rii` in the named format (`csv` or `yaml`, case-insensitive).
pub fn serialize_snapshot(rii: &RegInvImage, format: &str) -> Result<String> {
    format.parse::<OutputFormat>()?.render(rii)
}

/// One `image,digest,tag` line per tag, `image,digest,` for untagged digests.
pub fn to_csv(rii: &RegInvImage) -> String {
    let mut s = String::new();
    for (image, dmap) in rii {
        for (digest, tags) in dmap {
            if tags.is_empty() {
                s.push_str(&format!("{image},{digest},\n"));
            }
            for tag in tags {
                s.push_str(&format!("{image},{digest},{tag}\n"));
            }
        }
    }
    s
}

#[derive(Serialize)]
struct ImageEntry<'a> {
    name: &'a ImageName,
    dmap: &'a DigestTags,
}

pub fn to_yaml(rii: &RegInvImage) -> Result<String> {
    let images: Vec<ImageEntry> = rii
        .iter()
        .map(|(name, dmap)| ImageEntry { name, dmap })
        .collect();
    Ok(serde_yaml::to_string(&images)?)
}
