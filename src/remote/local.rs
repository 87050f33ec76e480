//! same-machine remote repository
//!
//! walks directly over both repositories' object graphs, copying commits,
//! trees and feature objects store-to-store. an object-existence check
//! short-circuits entire subtrees the destination already holds, so
//! unchanged shards of large collections are never re-copied.

use std::path::PathBuf;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::graph;
use crate::id::ObjectId;
use crate::object::{ObjectStore, RevObject};
use crate::progress::ProgressListener;
use crate::refs::{self, Ref};
use crate::remote::{check_push, RemoteRepo, TransferGuard};
use crate::repo::Repository;
use crate::traverse::{
    self, FullPolicy, ShallowPolicy, ShallowToFullPolicy, StoreGraph, Traversal,
};

/// a remote repository on the local filesystem
pub struct LocalRemote {
    path: PathBuf,
    repo: Option<Repository>,
}

impl LocalRemote {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            repo: None,
        }
    }

    fn repo(&self) -> Result<&Repository> {
        self.repo
            .as_ref()
            .ok_or_else(|| Error::RemoteConnection("remote repository is not open".to_string()))
    }
}

impl RemoteRepo for LocalRemote {
    fn open(&mut self) -> Result<()> {
        if self.repo.is_none() {
            self.repo = Some(Repository::open(&self.path)?);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.repo = None;
        Ok(())
    }

    fn head_ref(&mut self) -> Result<Ref> {
        refs::head_ref(self.repo()?)
    }

    fn list_refs(&mut self, heads: bool, tags: bool) -> Result<Vec<Ref>> {
        refs::list_refs(self.repo()?, heads, tags)
    }

    fn ref_by_name(&mut self, refspec: &str) -> Result<Option<Ref>> {
        match refs::read_ref(self.repo()?, refspec) {
            Ok(r) => Ok(Some(r)),
            Err(Error::RefNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn fetch_new_data(
        &mut self,
        local: &Repository,
        reference: &Ref,
        depth_limit: Option<u64>,
        progress: &mut ProgressListener,
    ) -> Result<()> {
        let remote_repo = self.repo()?;
        if reference.id().is_null() {
            return Err(Error::RefNotFound(reference.name().to_string()));
        }

        let source = remote_repo.store();
        let destination = local.store();

        let into_shallow = local.depth().is_some() || depth_limit.is_some();
        let from_shallow = remote_repo.depth().is_some();

        let traversal = if into_shallow && from_shallow {
            return Err(Error::ShallowUnsupported);
        } else if into_shallow {
            let mut policy = ShallowPolicy::new(
                depth_limit,
                |id: &ObjectId| Ok(source.exists(id)),
                |id: &ObjectId| Ok(destination.exists(id)),
                |id: &ObjectId| graph::history_depth(&destination, id),
            );
            run(reference.id(), &mut policy, &source, &destination)?
        } else if from_shallow {
            let mut policy = ShallowToFullPolicy::new(
                |id: &ObjectId| Ok(source.exists(id)),
                |id: &ObjectId| Ok(destination.exists(id)),
            );
            run(reference.id(), &mut policy, &source, &destination)?
        } else {
            let mut policy = FullPolicy::new(|id: &ObjectId| Ok(destination.exists(id)));
            run(reference.id(), &mut policy, &source, &destination)?
        };

        debug!(
            reference = reference.name(),
            commits = traversal.commits.len(),
            boundary = traversal.have.len(),
            "fetching from local remote"
        );

        copy_all(&traversal, &source, &destination, progress)?;

        refs::update_ref(local, reference.name(), reference.id())?;
        progress.complete();
        info!(
            reference = reference.name(),
            commits = traversal.commits.len(),
            "fetch complete"
        );
        Ok(())
    }

    fn push_new_data(
        &mut self,
        local: &Repository,
        reference: &Ref,
        refspec: &str,
        progress: &mut ProgressListener,
    ) -> Result<()> {
        let remote_ref = self.ref_by_name(refspec)?;
        let remote_repo = self.repo()?;
        check_push(&local.store(), reference, remote_ref.as_ref())?;

        let source = local.store();
        let destination = remote_repo.store();

        let from_shallow = local.depth().is_some();
        let into_shallow = remote_repo.depth().is_some();

        let traversal = if from_shallow && into_shallow {
            return Err(Error::ShallowUnsupported);
        } else if from_shallow || into_shallow {
            let mut policy = ShallowToFullPolicy::new(
                |id: &ObjectId| Ok(source.exists(id)),
                |id: &ObjectId| Ok(destination.exists(id)),
            );
            run(reference.id(), &mut policy, &source, &destination)?
        } else {
            let mut policy = FullPolicy::new(|id: &ObjectId| Ok(destination.exists(id)));
            run(reference.id(), &mut policy, &source, &destination)?
        };

        debug!(
            refspec,
            commits = traversal.commits.len(),
            "pushing to local remote"
        );

        copy_all(&traversal, &source, &destination, progress)?;

        let updated = refs::update_ref(remote_repo, refspec, reference.id())?;

        // when the remote has the pushed branch checked out, advance its
        // working and staging snapshots to the new tree
        let head = refs::head_ref(remote_repo)?;
        if head.target() == Some(updated.name()) {
            let commit = destination
                .get(&reference.id())?
                .as_commit()
                .map(|c| c.tree_id)
                .ok_or_else(|| {
                    Error::Format(format!("ref {} does not point at a commit", refspec))
                })?;
            refs::write_ref(remote_repo, refs::WORK_HEAD, &commit)?;
            refs::write_ref(remote_repo, refs::STAGE_HEAD, &commit)?;
        }

        progress.complete();
        info!(refspec, "push complete");
        Ok(())
    }

    fn delete_ref(&mut self, refspec: &str) -> Result<()> {
        refs::delete_ref(self.repo()?, refspec)
    }

    fn depth(&mut self) -> Result<Option<u64>> {
        Ok(self.repo()?.depth())
    }
}

fn run<P: crate::traverse::TraversalPolicy>(
    start: ObjectId,
    policy: &mut P,
    source: &dyn ObjectStore,
    destination: &dyn ObjectStore,
) -> Result<Traversal> {
    let mut graph = StoreGraph {
        source,
        destination,
    };
    traverse::traverse(start, policy, &mut graph)
}

/// copy every commit in apply order under a rollback guard
fn copy_all(
    traversal: &Traversal,
    source: &dyn ObjectStore,
    destination: &dyn ObjectStore,
    progress: &mut ProgressListener,
) -> Result<()> {
    let mut guard = TransferGuard::new(destination);
    let total = traversal.commits.len();
    for (index, commit_id) in traversal.apply_order().enumerate() {
        copy_commit(source, destination, &mut guard, commit_id)?;
        if total > 0 {
            progress.progress((index + 1) as f32 / total as f32 * 100.0);
        }
    }
    guard.commit();
    Ok(())
}

/// copy a commit: its tree contents first, the commit object last
fn copy_commit(
    source: &dyn ObjectStore,
    destination: &dyn ObjectStore,
    guard: &mut TransferGuard,
    commit_id: &ObjectId,
) -> Result<()> {
    let object = source.get(commit_id)?;
    let commit = object
        .as_commit()
        .ok_or_else(|| Error::Format(format!("expected commit at {}", commit_id)))?;

    copy_tree(source, destination, guard, &commit.tree_id)?;

    destination.put(&object)?;
    guard.record(*commit_id);
    Ok(())
}

/// copy a tree and everything beneath it, children before the tree itself
///
/// a tree already present at the destination implies its whole subtree is
/// present, so the copy returns immediately.
fn copy_tree(
    source: &dyn ObjectStore,
    destination: &dyn ObjectStore,
    guard: &mut TransferGuard,
    tree_id: &ObjectId,
) -> Result<()> {
    if destination.exists(tree_id) {
        return Ok(());
    }

    let object = source.get(tree_id)?;
    let tree = object
        .as_tree()
        .ok_or_else(|| Error::Format(format!("expected tree at {}", tree_id)))?;

    if !tree.is_leaf() {
        for bucket in tree.buckets().values() {
            copy_tree(source, destination, guard, &bucket.id)?;
        }
    } else {
        for node in tree.trees() {
            copy_tree(source, destination, guard, &node.object_id)?;
            if let Some(metadata_id) = node.metadata() {
                copy_object(source, destination, guard, &metadata_id)?;
            }
        }
        for node in tree.features() {
            copy_object(source, destination, guard, &node.object_id)?;
            if let Some(metadata_id) = node.metadata() {
                copy_object(source, destination, guard, &metadata_id)?;
            }
        }
    }

    destination.put(&object)?;
    guard.record(*tree_id);
    Ok(())
}

/// copy a feature or feature-type object
fn copy_object(
    source: &dyn ObjectStore,
    destination: &dyn ObjectStore,
    guard: &mut TransferGuard,
    id: &ObjectId,
) -> Result<()> {
    if destination.exists(id) {
        return Ok(());
    }
    let object = source.get(id)?;
    if let RevObject::Tree(_) = object {
        return copy_tree(source, destination, guard, id);
    }
    destination.put(&object)?;
    guard.record(*id);
    Ok(())
}
