use std::path::PathBuf;

use thiserror;

use crate::registry::{ImageName, RegistryName, Tag};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    // configuration errors
    #[error("when snapshotting, snapshot or manifest-based-snapshot-of have to be set")]
    SourceNotSpecified,
    #[error("snapshot and manifest-based-snapshot-of are mutually exclusive")]
    ConflictingSources,
    #[error("invalid snapshot output format: {0}")]
    UnsupportedFormat(String),
    #[error("invalid tag: {0}")]
    InvalidTag(String),
    #[error("unable to read config file {path:?}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to parse config file {path:?}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    // manifest errors
    #[error("unable to read manifest {path:?}")]
    ManifestRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to parse manifest {path:?}: {source}")]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid manifest {path:?}: {reason}")]
    ManifestInvalid { path: PathBuf, reason: String },
    #[error("invalid digest: {0}")]
    InvalidDigest(String),
    #[error("unsupported digest algorithm: {0}")]
    UnsupportedDigestAlgorithm(String),

    // edge conversion errors
    #[error("manifest {0:?} lists images but has no source registry")]
    MissingSourceRegistry(Option<PathBuf>),
    #[error("overlapping edges detected: {registry}/{image}:{tag} is claimed by {digests:?}")]
    OverlappingEdges {
        registry: RegistryName,
        image: ImageName,
        tag: Tag,
        digests: Vec<String>,
    },

    // registry read errors
    #[error("registry read error: {0}")]
    RegistryRead(String),
    #[error("registry {0} not found in registry inventory")]
    RegistryUnknown(RegistryName),
    #[error("unable to read registry dump {path:?}")]
    RegistryDumpRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to parse registry dump {path:?}: {source}")]
    RegistryDumpParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("error serializing snapshot")]
    SerializeError(#[from] serde_yaml::Error),
    #[error("io error")]
    IOError(#[from] std::io::Error),

    #[error("{context}: {source}")]
    Context {
        context: &'static str,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap this error with a description of the pipeline stage that produced it.
    pub fn context(self, context: &'static str) -> Error {
        Error::Context {
            context,
            source: Box::new(self),
        }
    }

    /// The innermost error, with all stage context peeled away.
    pub fn root(&self) -> &Error {
        match self {
            Error::Context { source, .. } => source.root(),
            e => e,
        }
    }
}

pub trait ResultExt<T> {
    fn context(self, context: &'static str) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: &'static str) -> Result<T> {
        self.map_err(|e| e.context(context))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn context_chains_into_message() {
        let res: Result<()> = Err(Error::SourceNotSpecified);
        let err = res
            .context("building source registry for snapshot")
            .context("assembling snapshot manifests")
            .unwrap_err();

        assert_eq!(
            format!("{err}"),
            "assembling snapshot manifests: building source registry for snapshot: \
             when snapshotting, snapshot or manifest-based-snapshot-of have to be set"
        );
        assert!(matches!(err.root(), Error::SourceNotSpecified));
    }
}
