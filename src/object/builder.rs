//! tree construction with bucket fan-out
//!
//! builds a `RevTree` from a set of child nodes. small sets produce a leaf
//! tree; sets above the normalization limit are partitioned into buckets by
//! a hash of each child's name and built recursively, which bounds node
//! breadth regardless of collection size. children are keyed by name, so
//! insertion order never affects the resulting tree id.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::id::ObjectId;
use crate::object::model::RevObject;
use crate::object::store::ObjectStore;
use crate::object::tree::{
    BoundingBox, Bucket, Node, NodeType, RevTree, MAX_BUCKETS, NORMALIZATION_LIMIT,
};

/// builds hash-addressed revision trees over an object store
///
/// bucket subtrees created during a build are stored immediately (they are
/// referenced by id); the returned root tree is left for the caller to
/// store.
pub struct TreeBuilder<'a> {
    store: &'a dyn ObjectStore,
    children: BTreeMap<String, Node>,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self {
            store,
            children: BTreeMap::new(),
        }
    }

    /// add or replace a child node, keyed by name
    pub fn insert(&mut self, node: Node) -> &mut Self {
        self.children.insert(node.name.clone(), node);
        self
    }

    /// remove a child by name
    pub fn remove(&mut self, name: &str) -> &mut Self {
        self.children.remove(name);
        self
    }

    /// number of pending children
    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// build the tree; bucket subtrees are written to the store
    pub fn build(&self) -> Result<RevTree> {
        let children: Vec<Node> = self.children.values().cloned().collect();
        self.build_level(children, 0)
    }

    fn build_level(&self, children: Vec<Node>, depth: usize) -> Result<RevTree> {
        if children.len() <= NORMALIZATION_LIMIT {
            return self.build_leaf(children);
        }

        let mut partitions: BTreeMap<u8, Vec<Node>> = BTreeMap::new();
        for node in children {
            let index = bucket_index(&node.name, depth);
            partitions.entry(index).or_default().push(node);
        }

        let mut buckets = BTreeMap::new();
        let mut size = 0u64;
        for (index, group) in partitions {
            let bounds = group
                .iter()
                .fold(None, |acc, n| BoundingBox::union_opt(acc, n.bounds));
            let subtree = self.build_level(group, depth + 1)?;
            size += subtree.size();
            let id = self.store.put(&RevObject::Tree(subtree))?;
            buckets.insert(index, Bucket::new(id, bounds));
        }

        RevTree::with_buckets(size, buckets)
    }

    fn build_leaf(&self, children: Vec<Node>) -> Result<RevTree> {
        let mut trees = Vec::new();
        let mut features = Vec::new();
        let mut size = 0u64;

        for node in children {
            match node.kind {
                NodeType::Feature => {
                    size += 1;
                    features.push(node);
                }
                NodeType::Tree => {
                    size += self.subtree_size(&node.object_id)?;
                    trees.push(node);
                }
            }
        }

        RevTree::leaf(size, trees, features)
    }

    fn subtree_size(&self, id: &ObjectId) -> Result<u64> {
        let object = self.store.get(id)?;
        match object.as_tree() {
            Some(tree) => Ok(tree.size()),
            None => Err(Error::Format(format!(
                "tree node references non-tree object {}",
                id
            ))),
        }
    }
}

/// bucket index for a child name at a recursion depth
///
/// distinct names have distinct digests, so any group splits within 32
/// levels and recursion terminates.
fn bucket_index(name: &str, depth: usize) -> u8 {
    let digest = Sha256::digest(name.as_bytes());
    digest[depth % digest.len()] % MAX_BUCKETS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::codec;
    use crate::object::store::FileObjectStore;
    use tempfile::tempdir;

    fn test_store() -> (tempfile::TempDir, FileObjectStore) {
        let dir = tempdir().unwrap();
        let objects = dir.path().join("objects");
        let tmp = dir.path().join("tmp");
        std::fs::create_dir_all(&objects).unwrap();
        std::fs::create_dir_all(&tmp).unwrap();
        (dir, FileObjectStore::new(objects, tmp))
    }

    fn feature_node(i: usize) -> Node {
        Node::feature(
            format!("feature.{}", i),
            ObjectId::hash_of(format!("payload-{}", i).as_bytes()),
        )
    }

    #[test]
    fn test_small_set_builds_leaf() {
        let (_dir, store) = test_store();
        let mut builder = TreeBuilder::new(&store);
        for i in 0..10 {
            builder.insert(feature_node(i));
        }

        let tree = builder.build().unwrap();
        assert!(tree.is_leaf());
        assert_eq!(tree.size(), 10);
        assert_eq!(tree.features().len(), 10);
    }

    #[test]
    fn test_large_set_builds_buckets() {
        let (_dir, store) = test_store();
        let mut builder = TreeBuilder::new(&store);
        let count = NORMALIZATION_LIMIT + 100;
        for i in 0..count {
            builder.insert(feature_node(i));
        }

        let tree = builder.build().unwrap();
        assert!(!tree.is_leaf());
        assert!(!tree.buckets().is_empty());
        assert!(tree.buckets().len() <= MAX_BUCKETS as usize);

        // size is conserved across the bucket form
        assert_eq!(tree.size(), count as u64);

        // every bucket subtree was stored
        for bucket in tree.buckets().values() {
            assert!(store.exists(&bucket.id));
        }
    }

    #[test]
    fn test_threshold_boundary() {
        let (_dir, store) = test_store();

        let mut at_limit = TreeBuilder::new(&store);
        for i in 0..NORMALIZATION_LIMIT {
            at_limit.insert(feature_node(i));
        }
        assert!(at_limit.build().unwrap().is_leaf());

        let mut over_limit = TreeBuilder::new(&store);
        for i in 0..NORMALIZATION_LIMIT + 1 {
            over_limit.insert(feature_node(i));
        }
        assert!(!over_limit.build().unwrap().is_leaf());
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let (_dir, store) = test_store();
        let count = NORMALIZATION_LIMIT + 50;

        let mut forward = TreeBuilder::new(&store);
        for i in 0..count {
            forward.insert(feature_node(i));
        }

        let mut backward = TreeBuilder::new(&store);
        for i in (0..count).rev() {
            backward.insert(feature_node(i));
        }

        let id1 = codec::object_id(&RevObject::Tree(forward.build().unwrap())).unwrap();
        let id2 = codec::object_id(&RevObject::Tree(backward.build().unwrap())).unwrap();
        assert_eq!(id1, id2);
    }

    #[test]
    fn test_insert_replaces_by_name() {
        let (_dir, store) = test_store();
        let mut builder = TreeBuilder::new(&store);
        builder.insert(Node::feature("road.1", ObjectId::hash_of(b"v1")));
        builder.insert(Node::feature("road.1", ObjectId::hash_of(b"v2")));

        let tree = builder.build().unwrap();
        assert_eq!(tree.size(), 1);
        assert_eq!(
            tree.features()[0].object_id,
            ObjectId::hash_of(b"v2")
        );
    }

    #[test]
    fn test_subtree_sizes_roll_up() {
        let (_dir, store) = test_store();

        // build and store a subtree holding three features
        let mut sub = TreeBuilder::new(&store);
        for i in 0..3 {
            sub.insert(feature_node(i));
        }
        let subtree = sub.build().unwrap();
        let sub_id = store.put(&RevObject::Tree(subtree)).unwrap();

        let mut root = TreeBuilder::new(&store);
        root.insert(Node::tree("roads", sub_id));
        root.insert(feature_node(99));

        let tree = root.build().unwrap();
        assert_eq!(tree.size(), 4);
        assert_eq!(tree.trees().len(), 1);
        assert_eq!(tree.features().len(), 1);
    }

    #[test]
    fn test_bounds_roll_up_into_buckets() {
        let (_dir, store) = test_store();
        let mut builder = TreeBuilder::new(&store);
        for i in 0..NORMALIZATION_LIMIT + 10 {
            let node = feature_node(i)
                .with_bounds(BoundingBox::new(i as f64, 0.0, i as f64 + 1.0, 1.0));
            builder.insert(node);
        }

        let tree = builder.build().unwrap();
        for bucket in tree.buckets().values() {
            assert!(bucket.bounds.is_some());
        }
    }

    #[test]
    fn test_empty_builder_builds_empty_tree() {
        let (_dir, store) = test_store();
        let tree = TreeBuilder::new(&store).build().unwrap();
        assert_eq!(tree, RevTree::empty());
    }
}
