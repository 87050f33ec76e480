use std::path::PathBuf;

use crate::ObjectId;

/// error type for strata operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("repository not found at {0}")]
    NoRepo(PathBuf),

    #[error("repository already exists at {0}")]
    RepoExists(PathBuf),

    #[error("ref not found: {0}")]
    RefNotFound(String),

    #[error("invalid ref name: {0}")]
    InvalidRef(String),

    #[error("object not found: {0}")]
    ObjectNotFound(ObjectId),

    #[error("corrupt object: hash mismatch for {0}")]
    CorruptObject(ObjectId),

    #[error("invalid object id: {0}")]
    InvalidObjectId(String),

    #[error("malformed payload: {0}")]
    Format(String),

    /// the source repository's shallow boundary was reached before the
    /// requested history could be satisfied
    #[error("source history is too shallow to complete the transfer")]
    HistoryTooShallow,

    /// the remote is already up to date with the pushed ref
    #[error("nothing to push, remote is up to date")]
    NothingToPush,

    /// pushing would discard commits the remote has and we do not
    #[error("remote has changes that are not in the local history")]
    RemoteHasChanges,

    /// transfers where both endpoints hold partial history are not defined
    #[error("synchronizing two shallow repositories is not supported")]
    ShallowUnsupported,

    #[error("remote not found: {0}")]
    RemoteNotFound(String),

    #[error("remote already exists: {0}")]
    RemoteExists(String),

    #[error("remote connection failed: {0}")]
    RemoteConnection(String),

    #[error("lock contention on repository")]
    LockContention,

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cbor serialization error: {0}")]
    CborEncode(#[from] ciborium::ser::Error<std::io::Error>),

    #[error("cbor deserialization error: {0}")]
    CborDecode(#[from] ciborium::de::Error<std::io::Error>),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("config serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// helper to wrap io errors with path context
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::Io {
            path: path.into(),
            source,
        })
    }
}
