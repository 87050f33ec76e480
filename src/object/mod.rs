pub mod builder;
pub mod codec;
pub mod feature;
pub mod model;
pub mod store;
pub mod tree;

pub use builder::TreeBuilder;
pub use codec::{canonical_bytes, from_canonical_bytes, object_id, BinaryCodec, ObjectCodec};
pub use feature::{
    AttributeDescriptor, AttributeKind, AttributeValue, RevFeature, RevFeatureType,
};
pub use model::{ObjectKind, RevCommit, RevObject, RevTag, Signature};
pub use store::{FileObjectStore, ObjectStore};
pub use tree::{
    BoundingBox, Bucket, Node, NodeType, RevTree, MAX_BUCKETS, NORMALIZATION_LIMIT,
};
