//! strata - distributed version control for feature collections
//!
//! a git-like content-addressed revision store for large geospatial and
//! tabular datasets, with a commit-graph synchronization engine that moves
//! history incrementally between repositories.
//!
//! # Core concepts
//!
//! - **RevFeature / RevFeatureType**: a row of attribute values and the
//!   schema describing it (CBOR + zstd)
//! - **RevTree**: a snapshot of a feature collection; large collections
//!   shard into hash-addressed buckets so node breadth stays bounded
//! - **RevCommit**: a tree snapshot with its ancestry and authorship
//! - **Ref**: a named pointer to a commit (hierarchical, like git branches)
//!
//! every object is identified by the SHA-256 (truncated to 20 bytes) of its
//! canonical serialized form, so identical content always converges to the
//! same id and unchanged subtrees are never re-transferred.
//!
//! # Example usage
//!
//! ```no_run
//! use std::path::Path;
//! use strata::{sync, ProgressListener};
//!
//! // clone a remote repository, shallow at 10 generations
//! let repo = sync::clone_repository(
//!     "http://example.com/repo",
//!     Path::new("/data/clone"),
//!     Some(10),
//!     &mut ProgressListener::noop(),
//! )
//! .unwrap();
//!
//! // later: top the history up from the same remote
//! let mut repo = repo;
//! sync::fetch(
//!     &mut repo,
//!     "origin",
//!     &sync::FetchOptions::default(),
//!     &mut ProgressListener::noop(),
//! )
//! .unwrap();
//! ```

mod config;
mod error;
mod id;
mod repo;

pub mod graph;
pub mod object;
pub mod progress;
pub mod refs;
pub mod remote;
pub mod sync;
pub mod traverse;

pub use config::{Config, Remote};
pub use error::{Error, IoResultExt, Result};
pub use id::{ObjectId, OBJECT_ID_LEN};
pub use object::{
    FileObjectStore, ObjectKind, ObjectStore, RevCommit, RevFeature, RevFeatureType, RevObject,
    RevTag, RevTree, TreeBuilder,
};
pub use progress::ProgressListener;
pub use refs::Ref;
pub use remote::{check_push, connect, RemoteRepo};
pub use repo::{RepoLock, Repository};
pub use traverse::{CommitNode, Evaluation, Traversal};
