//! commit graph queries over an object store

use std::collections::{HashSet, VecDeque};

use crate::error::{Error, Result};
use crate::id::ObjectId;
use crate::object::{ObjectStore, RevObject};

/// parent ids of a commit
pub fn parents(store: &dyn ObjectStore, id: &ObjectId) -> Result<Vec<ObjectId>> {
    match store.get(id)? {
        RevObject::Commit(commit) => Ok(commit.parent_ids),
        other => Err(Error::Format(format!(
            "expected commit at {}, found {}",
            id,
            other.kind().name()
        ))),
    }
}

/// number of generations of history locally present beneath a commit
///
/// counts the commit itself; the walk ends at a root commit or at the
/// shallow boundary (a commit whose parent is absent from the store).
/// used to top up a shallow clone to exactly the depth needed to connect
/// to already-known history.
pub fn history_depth(store: &dyn ObjectStore, id: &ObjectId) -> Result<u64> {
    let mut queue = VecDeque::new();
    let mut seen = HashSet::new();
    queue.push_back((*id, 1u64));
    seen.insert(*id);

    let mut shallowest: Option<u64> = None;

    while let Some((commit_id, depth)) = queue.pop_front() {
        if let Some(limit) = shallowest {
            if depth >= limit {
                continue;
            }
        }

        let commit_parents = parents(store, &commit_id)?;
        if commit_parents.is_empty() || commit_parents.iter().any(|p| !store.exists(p)) {
            shallowest = Some(shallowest.map_or(depth, |d| d.min(depth)));
            continue;
        }
        for parent in commit_parents {
            if seen.insert(parent) {
                queue.push_back((parent, depth + 1));
            }
        }
    }

    // the BFS always terminates at a root or boundary
    shallowest.ok_or(Error::ObjectNotFound(*id))
}

/// lowest common ancestor of two commits
///
/// the most recent commit reachable from both sides, or None when the
/// histories are unrelated. absent commits (shallow boundaries) end the
/// walk on that path.
pub fn common_ancestor(
    store: &dyn ObjectStore,
    left: &ObjectId,
    right: &ObjectId,
) -> Result<Option<ObjectId>> {
    let left_ancestors = ancestors_of(store, left)?;

    let mut queue = VecDeque::new();
    let mut seen = HashSet::new();
    queue.push_back(*right);
    seen.insert(*right);

    while let Some(id) = queue.pop_front() {
        if left_ancestors.contains(&id) {
            return Ok(Some(id));
        }
        if !store.exists(&id) {
            continue;
        }
        for parent in parents(store, &id)? {
            if seen.insert(parent) {
                queue.push_back(parent);
            }
        }
    }

    Ok(None)
}

/// all commits reachable from a start commit, inclusive
fn ancestors_of(store: &dyn ObjectStore, start: &ObjectId) -> Result<HashSet<ObjectId>> {
    let mut result = HashSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(*start);
    result.insert(*start);

    while let Some(id) = queue.pop_front() {
        if !store.exists(&id) {
            continue;
        }
        for parent in parents(store, &id)? {
            if result.insert(parent) {
                queue.push_back(parent);
            }
        }
    }

    Ok(result)
}
