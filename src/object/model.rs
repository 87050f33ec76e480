use serde::{Deserialize, Serialize};

use crate::id::ObjectId;
use crate::object::codec;
use crate::object::feature::{RevFeature, RevFeatureType};
use crate::object::tree::RevTree;

/// kind discriminant for revision objects
///
/// the numeric value is the wire tag and must never change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ObjectKind {
    Commit = 1,
    Tree = 2,
    Feature = 3,
    FeatureType = 4,
    Tag = 5,
}

impl ObjectKind {
    /// wire tag byte for this kind
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// parse a wire tag byte
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(ObjectKind::Commit),
            2 => Some(ObjectKind::Tree),
            3 => Some(ObjectKind::Feature),
            4 => Some(ObjectKind::FeatureType),
            5 => Some(ObjectKind::Tag),
            _ => None,
        }
    }

    /// kind name for error messages
    pub fn name(self) -> &'static str {
        match self {
            ObjectKind::Commit => "commit",
            ObjectKind::Tree => "tree",
            ObjectKind::Feature => "feature",
            ObjectKind::FeatureType => "featuretype",
            ObjectKind::Tag => "tag",
        }
    }
}

/// immutable revision object, the unit of content-addressed storage
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RevObject {
    Commit(RevCommit),
    Tree(RevTree),
    Feature(RevFeature),
    FeatureType(RevFeatureType),
    Tag(RevTag),
}

impl RevObject {
    /// kind of this object
    pub fn kind(&self) -> ObjectKind {
        match self {
            RevObject::Commit(_) => ObjectKind::Commit,
            RevObject::Tree(_) => ObjectKind::Tree,
            RevObject::Feature(_) => ObjectKind::Feature,
            RevObject::FeatureType(_) => ObjectKind::FeatureType,
            RevObject::Tag(_) => ObjectKind::Tag,
        }
    }

    /// content hash of the canonical serialized form
    pub fn id(&self) -> crate::Result<ObjectId> {
        codec::object_id(self)
    }

    /// view as a commit, if it is one
    pub fn as_commit(&self) -> Option<&RevCommit> {
        match self {
            RevObject::Commit(c) => Some(c),
            _ => None,
        }
    }

    /// view as a tree, if it is one
    pub fn as_tree(&self) -> Option<&RevTree> {
        match self {
            RevObject::Tree(t) => Some(t),
            _ => None,
        }
    }
}

impl From<RevCommit> for RevObject {
    fn from(commit: RevCommit) -> Self {
        RevObject::Commit(commit)
    }
}

impl From<RevTree> for RevObject {
    fn from(tree: RevTree) -> Self {
        RevObject::Tree(tree)
    }
}

impl From<RevFeature> for RevObject {
    fn from(feature: RevFeature) -> Self {
        RevObject::Feature(feature)
    }
}

impl From<RevFeatureType> for RevObject {
    fn from(ftype: RevFeatureType) -> Self {
        RevObject::FeatureType(ftype)
    }
}

impl From<RevTag> for RevObject {
    fn from(tag: RevTag) -> Self {
        RevObject::Tag(tag)
    }
}

/// author or committer identity; every field may be absent
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// unix timestamp (seconds since epoch)
    pub timestamp: i64,
    /// offset from UTC in minutes
    pub tz_offset_mins: i32,
}

impl Signature {
    pub fn new(name: impl Into<String>, email: impl Into<String>, timestamp: i64) -> Self {
        Self {
            name: Some(name.into()),
            email: Some(email.into()),
            timestamp,
            tz_offset_mins: 0,
        }
    }

    /// identity with no name or email
    pub fn anonymous(timestamp: i64) -> Self {
        Self {
            name: None,
            email: None,
            timestamp,
            tz_offset_mins: 0,
        }
    }
}

/// a commit: a snapshot of a feature collection with its ancestry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevCommit {
    /// root tree of this commit
    pub tree_id: ObjectId,
    /// parent commits (empty for root commits, more than one for merges)
    pub parent_ids: Vec<ObjectId>,
    pub author: Signature,
    pub committer: Signature,
    pub message: String,
}

impl RevCommit {
    pub fn new(
        tree_id: ObjectId,
        parent_ids: Vec<ObjectId>,
        author: Signature,
        message: impl Into<String>,
    ) -> Self {
        Self {
            tree_id,
            parent_ids,
            committer: author.clone(),
            author,
            message: message.into(),
        }
    }

    /// is this an initial commit (no parents)
    pub fn is_root(&self) -> bool {
        self.parent_ids.is_empty()
    }

    /// is this a merge commit (multiple parents)
    pub fn is_merge(&self) -> bool {
        self.parent_ids.len() > 1
    }
}

/// an annotated tag pointing at a commit
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevTag {
    pub name: String,
    pub commit_id: ObjectId,
    pub message: String,
    pub tagger: Signature,
}

impl RevTag {
    pub fn new(
        name: impl Into<String>,
        commit_id: ObjectId,
        message: impl Into<String>,
        tagger: Signature,
    ) -> Self {
        Self {
            name: name.into(),
            commit_id,
            message: message.into(),
            tagger,
        }
    }
}
