//! Attribute descriptions, plug addresses and raw stored values

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::handle::NodeHandle;

/// Index of an attribute within its node's attribute table
pub type AttrId = u32;

/// Storage type of a numeric attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NumericType {
    Boolean,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Addr,
}

impl NumericType {
    pub fn is_integral(self) -> bool {
        matches!(self, Self::Byte | Self::Short | Self::Int | Self::Long)
    }
}

/// Payload type of a typed attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    String,
    Matrix,
    Any,
    ComponentList,
    NurbsCurve,
    Invalid,
}

/// What kind of data an attribute carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttrKind {
    Numeric(NumericType),
    Enum,
    Typed(DataType),
    Matrix,
    Distance,
    Angle,
    Time,
    Message,
    Compound,
    /// Packed double array, stored but not decodable
    DoubleArray,
    /// Generic attribute with no fixed type
    Generic,
}

/// Dimension of a unit-bearing attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Angle,
    Distance,
    Time,
}

impl AttrKind {
    /// Whether values of this kind are a single number
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::Numeric(_) | Self::Enum | Self::Distance | Self::Angle | Self::Time
        )
    }

    pub fn is_matrix(self) -> bool {
        matches!(self, Self::Matrix | Self::Typed(DataType::Matrix))
    }

    pub fn dimension(self) -> Option<Dimension> {
        match self {
            Self::Angle => Some(Dimension::Angle),
            Self::Distance => Some(Dimension::Distance),
            Self::Time => Some(Dimension::Time),
            _ => None,
        }
    }

    /// Whether a connection from `self` into `other` is well-typed
    pub fn connects_to(self, other: AttrKind) -> bool {
        match (self, other) {
            (a, b) if a.is_numeric() && b.is_numeric() => true,
            (a, b) if a.is_matrix() && b.is_matrix() => true,
            (Self::Typed(DataType::String), Self::Typed(DataType::String)) => true,
            (Self::Typed(_), Self::Typed(DataType::Any)) | (Self::Typed(DataType::Any), Self::Typed(_)) => true,
            (Self::Message, Self::Message) => true,
            (Self::Compound, Self::Compound) => true,
            (Self::DoubleArray, Self::DoubleArray) => true,
            (Self::Generic, _) | (_, Self::Generic) => true,
            _ => false,
        }
    }
}

impl fmt::Display for AttrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(n) => write!(f, "numeric({n:?})"),
            Self::Enum => write!(f, "enum"),
            Self::Typed(t) => write!(f, "typed({t:?})"),
            Self::Matrix => write!(f, "matrix"),
            Self::Distance => write!(f, "distance"),
            Self::Angle => write!(f, "angle"),
            Self::Time => write!(f, "time"),
            Self::Message => write!(f, "message"),
            Self::Compound => write!(f, "compound"),
            Self::DoubleArray => write!(f, "doubleArray"),
            Self::Generic => write!(f, "generic"),
        }
    }
}

/// What happens to a destination plug when its incoming connection goes away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DisconnectBehavior {
    /// Keep the last value that flowed through the connection
    #[default]
    Nothing,
    /// Return to the default value
    Reset,
    /// Remove the array element altogether
    Delete,
}

/// A value as stored by the host, in internal units
///
/// Angles are radians, distances centimeters and times seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Matrix([f64; 16]),
}

pub const IDENTITY_MATRIX: [f64; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

impl RawValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Int(i) => Some(*i as f64),
            Self::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::Matrix(_) => "matrix",
        }
    }

    /// Zero value for an attribute kind
    pub fn default_for(kind: AttrKind) -> Self {
        match kind {
            AttrKind::Numeric(NumericType::Boolean) => Self::Bool(false),
            AttrKind::Numeric(n) if n.is_integral() => Self::Int(0),
            AttrKind::Enum => Self::Int(0),
            AttrKind::Numeric(_) | AttrKind::Distance | AttrKind::Angle | AttrKind::Time => Self::Double(0.0),
            AttrKind::Typed(DataType::String) => Self::String(String::new()),
            AttrKind::Matrix | AttrKind::Typed(DataType::Matrix) => Self::Matrix(IDENTITY_MATRIX),
            _ => Self::Null,
        }
    }

    /// Coerce into the storage representation of `kind`
    pub fn coerce(self, kind: AttrKind) -> Option<Self> {
        match kind {
            AttrKind::Numeric(NumericType::Boolean) => self.as_f64().map(|v| Self::Bool(v != 0.0)),
            AttrKind::Numeric(n) if n.is_integral() => self.as_f64().map(|v| Self::Int(v as i64)),
            AttrKind::Enum => self.as_f64().map(|v| Self::Int(v as i64)),
            AttrKind::Numeric(_) | AttrKind::Distance | AttrKind::Angle | AttrKind::Time => {
                self.as_f64().map(Self::Double)
            }
            AttrKind::Typed(DataType::String) => match self {
                Self::String(_) => Some(self),
                _ => None,
            },
            AttrKind::Matrix | AttrKind::Typed(DataType::Matrix) => match self {
                Self::Matrix(_) => Some(self),
                _ => None,
            },
            AttrKind::Typed(_) | AttrKind::Generic | AttrKind::DoubleArray => Some(self),
            AttrKind::Message | AttrKind::Compound => None,
        }
    }
}

/// Description of an attribute to create
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttrSpec {
    pub name: String,
    pub short_name: Option<String>,
    pub kind: AttrKind,
    pub default: RawValue,
    pub array: bool,
    pub keyable: bool,
    pub disconnect: DisconnectBehavior,
    pub enum_fields: Vec<(String, i64)>,
    pub children: Vec<AttrSpec>,
}

impl AttrSpec {
    pub fn new(name: impl Into<String>, kind: AttrKind) -> Self {
        Self {
            name: name.into(),
            short_name: None,
            kind,
            default: RawValue::default_for(kind),
            array: false,
            keyable: false,
            disconnect: DisconnectBehavior::Nothing,
            enum_fields: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn double(name: impl Into<String>) -> Self {
        Self::new(name, AttrKind::Numeric(NumericType::Double))
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, AttrKind::Numeric(NumericType::Float))
    }

    pub fn long(name: impl Into<String>) -> Self {
        Self::new(name, AttrKind::Numeric(NumericType::Long))
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, AttrKind::Numeric(NumericType::Boolean))
    }

    pub fn distance(name: impl Into<String>) -> Self {
        Self::new(name, AttrKind::Distance)
    }

    pub fn angle(name: impl Into<String>) -> Self {
        Self::new(name, AttrKind::Angle)
    }

    pub fn time(name: impl Into<String>) -> Self {
        Self::new(name, AttrKind::Time)
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, AttrKind::Typed(DataType::String))
    }

    pub fn matrix(name: impl Into<String>) -> Self {
        Self::new(name, AttrKind::Matrix)
    }

    pub fn message(name: impl Into<String>) -> Self {
        Self::new(name, AttrKind::Message)
    }

    pub fn enumeration(name: impl Into<String>, fields: &[(&str, i64)]) -> Self {
        let mut spec = Self::new(name, AttrKind::Enum);
        spec.enum_fields = fields.iter().map(|(n, v)| (n.to_string(), *v)).collect();
        if let Some((_, first)) = spec.enum_fields.first() {
            spec.default = RawValue::Int(*first);
        }
        spec
    }

    pub fn compound(name: impl Into<String>, children: Vec<AttrSpec>) -> Self {
        let mut spec = Self::new(name, AttrKind::Compound);
        spec.children = children;
        spec
    }

    /// Three-child compound suffixed X, Y and Z
    pub fn triple(name: impl Into<String>, kind: AttrKind) -> Self {
        let name = name.into();
        let children = ["X", "Y", "Z"]
            .iter()
            .map(|axis| Self::new(format!("{name}{axis}"), kind))
            .collect();
        Self::compound(name, children)
    }

    pub fn double3(name: impl Into<String>) -> Self {
        Self::triple(name, AttrKind::Numeric(NumericType::Double))
    }

    pub fn short(mut self, short_name: impl Into<String>) -> Self {
        self.short_name = Some(short_name.into());
        self
    }

    pub fn default(mut self, value: RawValue) -> Self {
        self.default = value;
        self
    }

    /// Make this an array attribute. Elements are deleted on disconnect.
    pub fn array(mut self) -> Self {
        self.array = true;
        self.disconnect = DisconnectBehavior::Delete;
        self
    }

    pub fn keyable(mut self, keyable: bool) -> Self {
        self.keyable = keyable;
        self
    }

    pub fn disconnect_behavior(mut self, behavior: DisconnectBehavior) -> Self {
        self.disconnect = behavior;
        self
    }

    /// Short names for the children of a compound, in order
    pub fn child_short_names(mut self, names: &[&str]) -> Self {
        for (child, name) in self.children.iter_mut().zip(names) {
            child.short_name = Some(name.to_string());
        }
        self
    }
}

/// Read-only description of an existing attribute
#[derive(Debug, Clone, PartialEq)]
pub struct AttrInfo {
    pub id: AttrId,
    pub name: String,
    pub short_name: String,
    pub kind: AttrKind,
    pub array: bool,
    pub keyable: bool,
    pub dynamic: bool,
    pub disconnect: DisconnectBehavior,
    pub parent: Option<AttrId>,
    pub children: Vec<AttrId>,
    pub enum_fields: Vec<(String, i64)>,
}

/// Address of a plug: an attribute on a node plus the logical indices
/// of every array attribute on the way down to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlugHandle {
    pub node: NodeHandle,
    pub attr: AttrId,
    pub indices: Vec<u32>,
}

impl PlugHandle {
    pub fn new(node: NodeHandle, attr: AttrId) -> Self {
        Self {
            node,
            attr,
            indices: Vec::new(),
        }
    }

    pub fn with_indices(node: NodeHandle, attr: AttrId, indices: Vec<u32>) -> Self {
        Self { node, attr, indices }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_numeric() {
        let kind = AttrKind::Numeric(NumericType::Boolean);
        assert_eq!(RawValue::Double(2.0).coerce(kind), Some(RawValue::Bool(true)));
        assert_eq!(RawValue::Int(0).coerce(kind), Some(RawValue::Bool(false)));

        let kind = AttrKind::Numeric(NumericType::Long);
        assert_eq!(RawValue::Double(2.7).coerce(kind), Some(RawValue::Int(2)));

        assert_eq!(RawValue::Int(3).coerce(AttrKind::Distance), Some(RawValue::Double(3.0)));
        assert_eq!(RawValue::String("x".into()).coerce(AttrKind::Angle), None);
        assert_eq!(RawValue::Double(1.0).coerce(AttrKind::Compound), None);
    }

    #[test]
    fn test_triple_builder() {
        let spec = AttrSpec::triple("translate", AttrKind::Distance)
            .short("t")
            .child_short_names(&["tx", "ty", "tz"]);
        assert_eq!(spec.kind, AttrKind::Compound);
        assert_eq!(spec.children.len(), 3);
        assert_eq!(spec.children[1].name, "translateY");
        assert_eq!(spec.children[2].short_name.as_deref(), Some("tz"));
    }

    #[test]
    fn test_array_defaults_to_delete() {
        let spec = AttrSpec::double("input").array();
        assert!(spec.array);
        assert_eq!(spec.disconnect, DisconnectBehavior::Delete);
    }

    #[test]
    fn test_connection_compatibility() {
        assert!(AttrKind::Distance.connects_to(AttrKind::Numeric(NumericType::Double)));
        assert!(AttrKind::Matrix.connects_to(AttrKind::Typed(DataType::Matrix)));
        assert!(!AttrKind::Message.connects_to(AttrKind::Distance));
        assert!(!AttrKind::Typed(DataType::String).connects_to(AttrKind::Angle));
    }
}
