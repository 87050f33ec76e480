use serde::{Deserialize, Serialize};

/// a schema for features: ordered attribute descriptors
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevFeatureType {
    pub name: String,
    pub descriptors: Vec<AttributeDescriptor>,
}

impl RevFeatureType {
    pub fn new(name: impl Into<String>, descriptors: Vec<AttributeDescriptor>) -> Self {
        Self {
            name: name.into(),
            descriptors,
        }
    }

    /// index of the descriptor with the given name
    pub fn index_of(&self, attribute: &str) -> Option<usize> {
        self.descriptors.iter().position(|d| d.name == attribute)
    }
}

/// one attribute of a feature type
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    pub name: String,
    pub kind: AttributeKind,
    pub nullable: bool,
    pub min_occurs: u32,
    pub max_occurs: u32,
    /// coordinate reference system authority code, geometry kinds only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crs: Option<String>,
}

impl AttributeDescriptor {
    pub fn new(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: true,
            min_occurs: 0,
            max_occurs: 1,
            crs: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.nullable = false;
        self.min_occurs = 1;
        self
    }

    pub fn with_crs(mut self, crs: impl Into<String>) -> Self {
        self.crs = Some(crs.into());
        self
    }
}

/// value kind of an attribute
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    Bool,
    Int,
    Long,
    Float,
    Double,
    Text,
    Bytes,
    Point,
    LineString,
    Polygon,
    Geometry,
}

impl AttributeKind {
    /// is this a geometry-valued kind
    pub fn is_geometry(self) -> bool {
        matches!(
            self,
            AttributeKind::Point
                | AttributeKind::LineString
                | AttributeKind::Polygon
                | AttributeKind::Geometry
        )
    }
}

/// an attribute value; geometries are carried as WKT text, the concrete
/// geometry encoding being a codec concern
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeValue {
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
    Geometry(String),
}

/// feature data: an ordered list of optional attribute values, positionally
/// aligned with a `RevFeatureType`'s descriptors
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RevFeature {
    pub values: Vec<Option<AttributeValue>>,
}

impl RevFeature {
    pub fn new(values: Vec<Option<AttributeValue>>) -> Self {
        Self { values }
    }

    /// value at a descriptor position, None when absent or out of range
    pub fn get(&self, index: usize) -> Option<&AttributeValue> {
        self.values.get(index).and_then(|v| v.as_ref())
    }
}
