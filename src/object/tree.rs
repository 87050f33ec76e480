use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::id::ObjectId;

/// maximum number of buckets a bucket tree may fan out into
pub const MAX_BUCKETS: u8 = 32;

/// maximum number of direct children a leaf tree may hold; one more and
/// the tree is split into buckets
pub const NORMALIZATION_LIMIT: usize = 512;

/// a hash-addressed snapshot of a feature collection
///
/// either a leaf tree (name-ordered feature and subtree nodes) or a bucket
/// tree (a sparse index-to-bucket map), never both. `size` caches the total
/// number of leaf features reachable beneath this tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RevTree {
    size: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    trees: Vec<Node>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    features: Vec<Node>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    buckets: BTreeMap<u8, Bucket>,
}

impl RevTree {
    /// the canonical empty tree
    pub fn empty() -> Self {
        Self {
            size: 0,
            trees: vec![],
            features: vec![],
            buckets: BTreeMap::new(),
        }
    }

    /// create a leaf tree, sorting nodes by name and rejecting duplicates
    pub fn leaf(size: u64, mut trees: Vec<Node>, mut features: Vec<Node>) -> Result<Self> {
        trees.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));
        features.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));

        for list in [&trees, &features] {
            for window in list.windows(2) {
                if window[0].name == window[1].name {
                    return Err(Error::Format(format!(
                        "duplicate node name in tree: {}",
                        window[0].name
                    )));
                }
            }
        }

        Ok(Self {
            size,
            trees,
            features,
            buckets: BTreeMap::new(),
        })
    }

    /// create a bucket tree from a sparse index map
    pub fn with_buckets(size: u64, buckets: BTreeMap<u8, Bucket>) -> Result<Self> {
        if let Some(index) = buckets.keys().find(|i| **i >= MAX_BUCKETS) {
            return Err(Error::Format(format!(
                "bucket index {} out of range",
                index
            )));
        }
        Ok(Self {
            size,
            trees: vec![],
            features: vec![],
            buckets,
        })
    }

    /// total number of leaf features reachable beneath this tree
    pub fn size(&self) -> u64 {
        self.size
    }

    /// is this tree in leaf form (including the empty tree)
    pub fn is_leaf(&self) -> bool {
        self.buckets.is_empty()
    }

    /// subtree nodes of a leaf tree, ordered by name
    pub fn trees(&self) -> &[Node] {
        &self.trees
    }

    /// feature nodes of a leaf tree, ordered by name
    pub fn features(&self) -> &[Node] {
        &self.features
    }

    /// sparse bucket map of a bucket tree
    pub fn buckets(&self) -> &BTreeMap<u8, Bucket> {
        &self.buckets
    }

    /// look up a direct child node by name (leaf form only)
    pub fn get(&self, name: &str) -> Option<&Node> {
        let by_name = |n: &Node| n.name.as_bytes().cmp(name.as_bytes());
        self.features
            .binary_search_by(by_name)
            .ok()
            .map(|i| &self.features[i])
            .or_else(|| {
                self.trees
                    .binary_search_by(by_name)
                    .ok()
                    .map(|i| &self.trees[i])
            })
    }

    /// number of direct children (leaf form only)
    pub fn child_count(&self) -> usize {
        self.trees.len() + self.features.len()
    }
}

/// kind of node held by a leaf tree
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Feature,
    Tree,
}

/// a named reference to a feature or subtree object
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub object_id: ObjectId,
    /// feature type governing this node; NULL means "inherit the tree default"
    pub metadata_id: ObjectId,
    pub kind: NodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<BoundingBox>,
}

impl Node {
    pub fn feature(name: impl Into<String>, object_id: ObjectId) -> Self {
        Self {
            name: name.into(),
            object_id,
            metadata_id: ObjectId::NULL,
            kind: NodeType::Feature,
            bounds: None,
        }
    }

    pub fn tree(name: impl Into<String>, object_id: ObjectId) -> Self {
        Self {
            name: name.into(),
            object_id,
            metadata_id: ObjectId::NULL,
            kind: NodeType::Tree,
            bounds: None,
        }
    }

    pub fn with_metadata(mut self, metadata_id: ObjectId) -> Self {
        self.metadata_id = metadata_id;
        self
    }

    pub fn with_bounds(mut self, bounds: BoundingBox) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// the feature type id, or None when the tree default applies
    pub fn metadata(&self) -> Option<ObjectId> {
        if self.metadata_id.is_null() {
            None
        } else {
            Some(self.metadata_id)
        }
    }
}

/// one shard of a bucket tree: a child subtree plus the bounds of
/// everything beneath it, used to prune spatial queries
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub id: ObjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<BoundingBox>,
}

impl Bucket {
    pub fn new(id: ObjectId, bounds: Option<BoundingBox>) -> Self {
        Self { id, bounds }
    }
}

/// axis-aligned bounding rectangle
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// smallest box covering both operands
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// union of an optional pair, when either side may be unbounded
    pub fn union_opt(a: Option<BoundingBox>, b: Option<BoundingBox>) -> Option<BoundingBox> {
        match (a, b) {
            (Some(a), Some(b)) => Some(a.union(&b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }

    /// do the two boxes overlap
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tree() {
        let t = RevTree::empty();
        assert!(t.is_leaf());
        assert_eq!(t.size(), 0);
        assert_eq!(t.child_count(), 0);
    }

    #[test]
    fn test_leaf_sorting() {
        let features = vec![
            Node::feature("zebra", ObjectId::NULL),
            Node::feature("alpha", ObjectId::NULL),
            Node::feature("beta", ObjectId::NULL),
        ];
        let tree = RevTree::leaf(3, vec![], features).unwrap();
        let names: Vec<_> = tree.features().iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta", "zebra"]);
    }

    #[test]
    fn test_leaf_rejects_duplicates() {
        let features = vec![
            Node::feature("same", ObjectId::NULL),
            Node::feature("same", ObjectId::NULL),
        ];
        assert!(RevTree::leaf(2, vec![], features).is_err());
    }

    #[test]
    fn test_leaf_get() {
        let tree = RevTree::leaf(
            2,
            vec![Node::tree("sub", ObjectId::hash_of(b"sub"))],
            vec![
                Node::feature("a", ObjectId::hash_of(b"a")),
                Node::feature("b", ObjectId::hash_of(b"b")),
            ],
        )
        .unwrap();

        assert_eq!(tree.get("a").map(|n| n.kind), Some(NodeType::Feature));
        assert_eq!(tree.get("sub").map(|n| n.kind), Some(NodeType::Tree));
        assert!(tree.get("missing").is_none());
    }

    #[test]
    fn test_bucket_index_range() {
        let mut buckets = BTreeMap::new();
        buckets.insert(0u8, Bucket::new(ObjectId::hash_of(b"b0"), None));
        buckets.insert(31u8, Bucket::new(ObjectId::hash_of(b"b31"), None));
        assert!(RevTree::with_buckets(10, buckets.clone()).is_ok());

        buckets.insert(32u8, Bucket::new(ObjectId::hash_of(b"b32"), None));
        assert!(RevTree::with_buckets(10, buckets).is_err());
    }

    #[test]
    fn test_bucket_tree_is_not_leaf() {
        let mut buckets = BTreeMap::new();
        buckets.insert(3u8, Bucket::new(ObjectId::hash_of(b"x"), None));
        let tree = RevTree::with_buckets(5, buckets).unwrap();
        assert!(!tree.is_leaf());
        assert_eq!(tree.size(), 5);
        assert_eq!(tree.buckets().len(), 1);
    }

    #[test]
    fn test_metadata_inheritance_sentinel() {
        let plain = Node::feature("f", ObjectId::NULL);
        assert!(plain.metadata().is_none());

        let typed = plain.with_metadata(ObjectId::hash_of(b"ft"));
        assert!(typed.metadata().is_some());
    }

    #[test]
    fn test_bbox_union() {
        let a = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        let b = BoundingBox::new(2.0, -1.0, 3.0, 0.5);
        let u = a.union(&b);
        assert_eq!(u, BoundingBox::new(0.0, -1.0, 3.0, 1.0));
    }

    #[test]
    fn test_bbox_union_opt() {
        let a = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        assert_eq!(BoundingBox::union_opt(Some(a), None), Some(a));
        assert_eq!(BoundingBox::union_opt(None, None), None);
    }

    #[test]
    fn test_bbox_intersects() {
        let a = BoundingBox::new(0.0, 0.0, 2.0, 2.0);
        let b = BoundingBox::new(1.0, 1.0, 3.0, 3.0);
        let c = BoundingBox::new(5.0, 5.0, 6.0, 6.0);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_tree_cbor_determinism() {
        // same logical content in different insertion order encodes identically
        let t1 = RevTree::leaf(
            2,
            vec![],
            vec![
                Node::feature("b", ObjectId::NULL),
                Node::feature("a", ObjectId::NULL),
            ],
        )
        .unwrap();
        let t2 = RevTree::leaf(
            2,
            vec![],
            vec![
                Node::feature("a", ObjectId::NULL),
                Node::feature("b", ObjectId::NULL),
            ],
        )
        .unwrap();

        let mut bytes1 = Vec::new();
        let mut bytes2 = Vec::new();
        ciborium::into_writer(&t1, &mut bytes1).unwrap();
        ciborium::into_writer(&t2, &mut bytes2).unwrap();

        assert_eq!(bytes1, bytes2);
    }

    #[test]
    fn test_tree_cbor_roundtrip() {
        let mut buckets = BTreeMap::new();
        buckets.insert(
            7u8,
            Bucket::new(
                ObjectId::hash_of(b"shard"),
                Some(BoundingBox::new(-10.0, -10.0, 10.0, 10.0)),
            ),
        );
        let tree = RevTree::with_buckets(1000, buckets).unwrap();

        let mut bytes = Vec::new();
        ciborium::into_writer(&tree, &mut bytes).unwrap();
        let parsed: RevTree = ciborium::from_reader(&bytes[..]).unwrap();
        assert_eq!(tree, parsed);
    }
}
