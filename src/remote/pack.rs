//! bulk object transfer format
//!
//! a pack is a bounded batch of serialized objects: each record is the raw
//! 20-byte object id followed by the codec payload. objects are written in
//! post-order (a commit's reachable new objects precede it), so a pack
//! prefix is always self-contained. the number of commits per pack is
//! capped to bound message size; callers resume by issuing further calls
//! with the shared `sent` set.

use std::collections::HashSet;
use std::io::{Read, Write};

use tracing::debug;

use crate::error::{Error, Result};
use crate::graph;
use crate::id::{ObjectId, OBJECT_ID_LEN};
use crate::object::{codec, ObjectCodec, ObjectKind, ObjectStore, RevObject};
use crate::traverse::{self, FullPolicy, GraphSource};

/// maximum number of commits emitted per pack
pub const COMMIT_CAP: usize = 100;

/// outcome of a pack write or ingest
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PackStats {
    /// objects written to the stream / newly inserted into the store
    pub objects: usize,
    /// commits among them
    pub commits: usize,
    /// false when the commit cap cut the write short
    pub complete: bool,
}

/// graph accessors for pack-bounding traversals: the "destination" is the
/// set of commits the receiver is known to hold
struct BoundaryGraph<'a> {
    store: &'a dyn ObjectStore,
    boundary: &'a HashSet<ObjectId>,
}

impl GraphSource for BoundaryGraph<'_> {
    fn parents(&mut self, id: &ObjectId) -> Result<Vec<ObjectId>> {
        graph::parents(self.store, id)
    }

    fn exists_in_destination(&mut self, id: &ObjectId) -> Result<bool> {
        Ok(self.boundary.contains(id))
    }
}

/// write a pack of every object reachable from `want` and absent below
/// `have`, at most `cap` commits per call
///
/// `sent` records every object already written across calls; pass the same
/// set when resuming. with `traverse_commits` false, only the `want`
/// commits themselves are packed, without walking their ancestry.
pub fn write_pack(
    store: &dyn ObjectStore,
    out: &mut dyn Write,
    want: &[ObjectId],
    have: &[ObjectId],
    sent: &mut HashSet<ObjectId>,
    wire: &dyn ObjectCodec,
    cap: usize,
) -> Result<PackStats> {
    write_pack_opts(store, out, want, have, sent, wire, cap, true)
}

#[allow(clippy::too_many_arguments)]
pub fn write_pack_opts(
    store: &dyn ObjectStore,
    out: &mut dyn Write,
    want: &[ObjectId],
    have: &[ObjectId],
    sent: &mut HashSet<ObjectId>,
    wire: &dyn ObjectCodec,
    cap: usize,
    traverse_commits: bool,
) -> Result<PackStats> {
    for id in want {
        if !store.exists(id) {
            return Err(Error::ObjectNotFound(*id));
        }
    }

    let ordered = if traverse_commits {
        commits_to_pack(store, want, have)?
    } else {
        want.to_vec()
    };

    let mut stats = PackStats {
        complete: true,
        ..PackStats::default()
    };

    for commit_id in &ordered {
        if sent.contains(commit_id) {
            continue;
        }
        if stats.commits == cap {
            stats.complete = false;
            break;
        }

        let object = store.get(commit_id)?;
        if let Some(commit) = object.as_commit() {
            emit_tree(store, out, wire, sent, &commit.tree_id, &mut stats)?;
        }
        emit_object(out, wire, sent, commit_id, &object, &mut stats)?;
        stats.commits += 1;
    }

    debug!(
        objects = stats.objects,
        commits = stats.commits,
        complete = stats.complete,
        "pack written"
    );
    Ok(stats)
}

/// commit ids to pack, oldest first, bounded below by `have`
fn commits_to_pack(
    store: &dyn ObjectStore,
    want: &[ObjectId],
    have: &[ObjectId],
) -> Result<Vec<ObjectId>> {
    let mut boundary: HashSet<ObjectId> = have.iter().copied().collect();
    let mut ordered = Vec::new();

    for start in want {
        let traversal = {
            let mut policy = FullPolicy::new(|id: &ObjectId| Ok(boundary.contains(id)));
            let mut graph = BoundaryGraph { store, boundary: &boundary };
            traverse::traverse(*start, &mut policy, &mut graph)?
        };
        let new_commits: Vec<ObjectId> = traversal.apply_order().copied().collect();
        boundary.extend(new_commits.iter().copied());
        ordered.extend(new_commits);
    }

    Ok(ordered)
}

/// emit a tree and everything beneath it, children first
fn emit_tree(
    store: &dyn ObjectStore,
    out: &mut dyn Write,
    wire: &dyn ObjectCodec,
    sent: &mut HashSet<ObjectId>,
    tree_id: &ObjectId,
    stats: &mut PackStats,
) -> Result<()> {
    if sent.contains(tree_id) {
        return Ok(());
    }

    let object = store.get(tree_id)?;
    let tree = object
        .as_tree()
        .ok_or_else(|| Error::Format(format!("expected tree at {}", tree_id)))?;

    if !tree.is_leaf() {
        for bucket in tree.buckets().values() {
            emit_tree(store, out, wire, sent, &bucket.id, stats)?;
        }
    } else {
        for node in tree.trees() {
            emit_tree(store, out, wire, sent, &node.object_id, stats)?;
            if let Some(metadata_id) = node.metadata() {
                emit_leaf(store, out, wire, sent, &metadata_id, stats)?;
            }
        }
        for node in tree.features() {
            emit_leaf(store, out, wire, sent, &node.object_id, stats)?;
            if let Some(metadata_id) = node.metadata() {
                emit_leaf(store, out, wire, sent, &metadata_id, stats)?;
            }
        }
    }

    emit_object(out, wire, sent, tree_id, &object, stats)
}

/// emit a feature or feature-type object
fn emit_leaf(
    store: &dyn ObjectStore,
    out: &mut dyn Write,
    wire: &dyn ObjectCodec,
    sent: &mut HashSet<ObjectId>,
    id: &ObjectId,
    stats: &mut PackStats,
) -> Result<()> {
    if sent.contains(id) {
        return Ok(());
    }
    let object = store.get(id)?;
    if object.kind() == ObjectKind::Tree {
        return emit_tree(store, out, wire, sent, id, stats);
    }
    emit_object(out, wire, sent, id, &object, stats)
}

fn emit_object(
    out: &mut dyn Write,
    wire: &dyn ObjectCodec,
    sent: &mut HashSet<ObjectId>,
    id: &ObjectId,
    object: &RevObject,
    stats: &mut PackStats,
) -> Result<()> {
    out.write_all(id.as_bytes()).map_err(|e| Error::Io {
        path: std::path::PathBuf::from("<pack>"),
        source: e,
    })?;
    wire.encode(object, out)?;
    sent.insert(*id);
    stats.objects += 1;
    Ok(())
}

/// read a pack stream and insert every missing object into the store
///
/// a clean end-of-stream terminates the ingest normally. each payload must
/// hash to its declared id. already-present objects are skipped, which
/// makes re-ingesting a stream a no-op; `on_inserted` is invoked once per
/// newly inserted object.
pub fn ingest_pack(
    store: &dyn ObjectStore,
    input: &mut dyn Read,
    wire: &dyn ObjectCodec,
    mut on_inserted: impl FnMut(&RevObject),
) -> Result<PackStats> {
    let mut stats = PackStats {
        complete: true,
        ..PackStats::default()
    };

    while let Some(id) = read_object_id(input)? {
        let object = wire.decode(input)?;
        if codec::object_id(&object)? != id {
            return Err(Error::Format(format!(
                "pack payload does not hash to declared id {}",
                id
            )));
        }

        if !store.exists(&id) {
            on_inserted(&object);
            store.put(&object)?;
            stats.objects += 1;
            if object.kind() == ObjectKind::Commit {
                stats.commits += 1;
            }
        }
    }

    debug!(objects = stats.objects, "pack ingested");
    Ok(stats)
}

/// read the next record's object id; None at a clean end of stream
fn read_object_id(input: &mut dyn Read) -> Result<Option<ObjectId>> {
    let mut raw = [0u8; OBJECT_ID_LEN];
    let mut filled = 0;

    while filled < raw.len() {
        let n = input.read(&mut raw[filled..]).map_err(|e| Error::Io {
            path: std::path::PathBuf::from("<pack>"),
            source: e,
        })?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(Error::Format("truncated pack stream".to_string()));
        }
        filled += n;
    }

    Ok(Some(ObjectId::from_bytes(raw)))
}
