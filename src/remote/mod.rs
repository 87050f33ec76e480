//! remote repository access
//!
//! a uniform interface over same-machine and HTTP-accessible repositories,
//! used by the synchronization engine to move history and update refs.

pub mod http;
pub mod local;
pub mod pack;

use std::path::PathBuf;

use url::Url;

use crate::error::{Error, Result};
use crate::graph;
use crate::id::ObjectId;
use crate::object::ObjectStore;
use crate::progress::ProgressListener;
use crate::refs::Ref;
use crate::repo::Repository;

pub use http::HttpRemote;
pub use local::LocalRemote;

/// a repository reachable for fetch and push
pub trait RemoteRepo {
    fn open(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
    /// the remote's HEAD ref
    fn head_ref(&mut self) -> Result<Ref>;
    /// refs in the heads and/or tags namespaces
    fn list_refs(&mut self, heads: bool, tags: bool) -> Result<Vec<Ref>>;
    /// resolve a single refspec, None when absent
    fn ref_by_name(&mut self, refspec: &str) -> Result<Option<Ref>>;
    /// copy all new history reachable from `reference` into `local`,
    /// bounded by an optional depth limit, then advance the local ref
    fn fetch_new_data(
        &mut self,
        local: &Repository,
        reference: &Ref,
        depth_limit: Option<u64>,
        progress: &mut ProgressListener,
    ) -> Result<()>;
    /// copy all new history reachable from the local `reference` to the
    /// remote and update the remote ref named by `refspec`
    fn push_new_data(
        &mut self,
        local: &Repository,
        reference: &Ref,
        refspec: &str,
        progress: &mut ProgressListener,
    ) -> Result<()>;
    fn delete_ref(&mut self, refspec: &str) -> Result<()>;
    /// the remote's shallow depth, None for complete repositories
    fn depth(&mut self) -> Result<Option<u64>>;
}

/// resolve a remote location to a transport
///
/// `http(s)://` urls go over the wire; everything else is treated as a
/// same-machine path (including `file://` urls).
pub fn connect(location: &str) -> Result<Box<dyn RemoteRepo>> {
    if let Ok(url) = Url::parse(location) {
        match url.scheme() {
            "http" | "https" => return Ok(Box::new(HttpRemote::new(location))),
            "file" => {
                let path = url.to_file_path().map_err(|_| {
                    Error::RemoteConnection(format!("invalid file url: {}", location))
                })?;
                return Ok(Box::new(LocalRemote::new(path)));
            }
            scheme if scheme.len() > 1 => {
                return Err(Error::RemoteConnection(format!(
                    "unsupported remote scheme: {}",
                    scheme
                )))
            }
            // single-letter schemes are windows drive prefixes, fall through
            _ => {}
        }
    }
    Ok(Box::new(LocalRemote::new(PathBuf::from(location))))
}

/// fast-forward check performed before a push is accepted
///
/// a push is safe when the remote ref is absent (or NULL), or when the
/// remote's current value is a strict ancestor of the pushed ref. equal
/// refs and an ancestor equal to the pushed ref are `NothingToPush`; any
/// other relation would discard remote history and is `RemoteHasChanges`.
pub fn check_push(
    local: &dyn ObjectStore,
    reference: &Ref,
    remote_ref: Option<&Ref>,
) -> Result<()> {
    let remote_ref = match remote_ref {
        None => return Ok(()),
        Some(r) => r,
    };
    if remote_ref.id().is_null() {
        return Ok(());
    }
    if remote_ref.id() == reference.id() {
        return Err(Error::NothingToPush);
    }
    if !local.exists(&remote_ref.id()) {
        // the remote has commits we have never seen
        return Err(Error::RemoteHasChanges);
    }

    match graph::common_ancestor(local, &remote_ref.id(), &reference.id())? {
        None => Err(Error::RemoteHasChanges),
        Some(ancestor) if ancestor == reference.id() => Err(Error::NothingToPush),
        Some(ancestor) if ancestor != remote_ref.id() => Err(Error::RemoteHasChanges),
        Some(_) => Ok(()),
    }
}

/// records every object written during a transfer and deletes them all if
/// the transfer does not complete
///
/// the object store has no native transactions; this guard enforces the
/// invariant that a failed transfer leaves no partial commit chain behind.
pub struct TransferGuard<'a> {
    store: &'a dyn ObjectStore,
    touched: Vec<ObjectId>,
    committed: bool,
}

impl<'a> TransferGuard<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self {
            store,
            touched: Vec::new(),
            committed: false,
        }
    }

    /// record an id written to the destination store
    pub fn record(&mut self, id: ObjectId) {
        self.touched.push(id);
    }

    /// number of objects recorded so far
    pub fn len(&self) -> usize {
        self.touched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.touched.is_empty()
    }

    /// mark the transfer complete, keeping all written objects
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for TransferGuard<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        tracing::debug!(objects = self.touched.len(), "rolling back partial transfer");
        // best effort: remove everything written during the failed transfer
        for id in self.touched.iter().rev() {
            let _ = self.store.delete(id);
        }
    }
}
