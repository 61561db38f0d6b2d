//! Generic values read from and written to plugs
//!
//! A read returns the most natural shape for the plug: scalars for simple
//! attributes, tuples for compounds and arrays, and 16 doubles for
//! matrices. Writes accept the same shapes plus a few richer ones
//! (vectors, rotations, quantities in explicit units, time series).

use serde::{Deserialize, Serialize};

use crate::units::Unit;

/// Axis order of an euler rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RotateOrder {
    #[default]
    Xyz,
    Yzx,
    Zxy,
    Xzy,
    Yxz,
    Zyx,
}

/// A dynamic value that can represent any plug data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    /// Null/None value
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// A number in an explicit unit of angle, distance or time
    Quantity { value: f64, unit: Unit },
    /// 3D vector
    Vector([f64; 3]),
    /// Rotation in radians
    Euler { angles: [f64; 3], order: RotateOrder },
    /// Rotation as x, y, z, w
    Quaternion([f64; 4]),
    /// 4x4 matrix, row major
    Matrix([f64; 16]),
    /// Time series of (seconds, value) pairs
    Keys(Vec<(f64, f64)>),
    /// Compound children or array elements
    Tuple(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn quantity(value: f64, unit: Unit) -> Self {
        Self::Quantity { value, unit }
    }

    pub fn degrees(value: f64) -> Self {
        Self::quantity(value, Unit::DEGREES)
    }

    pub fn radians(value: f64) -> Self {
        Self::quantity(value, Unit::RADIANS)
    }

    pub fn centimeters(value: f64) -> Self {
        Self::quantity(value, Unit::CENTIMETERS)
    }

    pub fn meters(value: f64) -> Self {
        Self::quantity(value, Unit::METERS)
    }

    pub fn seconds(value: f64) -> Self {
        Self::quantity(value, Unit::SECONDS)
    }

    pub fn euler(angles: [f64; 3]) -> Self {
        Self::Euler {
            angles,
            order: RotateOrder::Xyz,
        }
    }

    pub fn keys(keys: &[(f64, f64)]) -> Self {
        Self::Keys(keys.to_vec())
    }

    /// Try to get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    /// Try to get as i64
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Bool(b) => Some(*b as i64),
            Self::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    /// Try to get as f64
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Quantity { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as a 3D vector
    pub fn as_vector(&self) -> Option<[f64; 3]> {
        match self {
            Self::Vector(v) => Some(*v),
            Self::Euler { angles, .. } => Some(*angles),
            Self::Tuple(items) if items.len() == 3 => {
                Some([items[0].as_float()?, items[1].as_float()?, items[2].as_float()?])
            }
            _ => None,
        }
    }

    pub fn as_matrix(&self) -> Option<[f64; 16]> {
        match self {
            Self::Matrix(m) => Some(*m),
            Self::Tuple(items) if items.len() == 16 => {
                let mut out = [0.0; 16];
                for (slot, item) in out.iter_mut().zip(items) {
                    *slot = item.as_float()?;
                }
                Some(out)
            }
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[Value]> {
        match self {
            Self::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// Structural equality with floats compared within `tolerance`
    pub fn approx_eq(&self, other: &Value, tolerance: f64) -> bool {
        let close = |a: f64, b: f64| (a - b).abs() <= tolerance;
        match (self, other) {
            (Self::Tuple(a), Self::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.approx_eq(y, tolerance))
            }
            (Self::Matrix(a), Self::Matrix(b)) => a.iter().zip(b).all(|(x, y)| close(*x, *y)),
            (Self::Vector(a), Self::Vector(b)) => a.iter().zip(b).all(|(x, y)| close(*x, *y)),
            (Self::Keys(a), Self::Keys(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| close(x.0, y.0) && close(x.1, y.1))
            }
            (Self::Float(_) | Self::Int(_), Self::Float(_) | Self::Int(_)) => match (self.as_float(), other.as_float()) {
                (Some(a), Some(b)) => close(a, b),
                _ => false,
            },
            (Self::Vector(_), Self::Tuple(_)) | (Self::Tuple(_), Self::Vector(_)) => {
                match (self.as_vector(), other.as_vector()) {
                    (Some(a), Some(b)) => a.iter().zip(&b).all(|(x, y)| close(*x, *y)),
                    _ => false,
                }
            }
            _ => self == other,
        }
    }
}

/// Convert a quaternion (x, y, z, w) into XYZ euler angles in radians
pub fn quaternion_to_euler(q: [f64; 4]) -> [f64; 3] {
    let [x, y, z, w] = q;
    let norm = (x * x + y * y + z * z + w * w).sqrt();
    let (x, y, z, w) = if norm > 0.0 {
        (x / norm, y / norm, z / norm, w / norm)
    } else {
        (0.0, 0.0, 0.0, 1.0)
    };

    let rx = (2.0 * (w * x + y * z)).atan2(1.0 - 2.0 * (x * x + y * y));
    let ry = (2.0 * (w * y - z * x)).clamp(-1.0, 1.0).asin();
    let rz = (2.0 * (w * z + x * y)).atan2(1.0 - 2.0 * (y * y + z * z));
    [rx, ry, rz]
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(v as f64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<[f64; 3]> for Value {
    fn from(v: [f64; 3]) -> Self {
        Self::Vector(v)
    }
}

impl From<[f64; 16]> for Value {
    fn from(v: [f64; 16]) -> Self {
        Self::Matrix(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::Tuple(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_6;

    #[test]
    fn test_accessors() {
        assert_eq!(Value::from(3).as_float(), Some(3.0));
        assert_eq!(Value::from(true).as_int(), Some(1));
        assert_eq!(Value::from("x").as_str(), Some("x"));
        assert_eq!(Value::degrees(90.0).as_float(), Some(90.0));
        assert!(Value::default().is_null());
    }

    #[test]
    fn test_tuple_as_vector() {
        let value = Value::Tuple(vec![1.0.into(), 2.into(), 3.0.into()]);
        assert_eq!(value.as_vector(), Some([1.0, 2.0, 3.0]));
        assert!(value.approx_eq(&Value::Vector([1.0, 2.0, 3.0]), 1e-9));
    }

    #[test]
    fn test_approx_eq_tolerance() {
        let a = Value::Tuple(vec![Value::Float(1.0), Value::Float(2.0)]);
        let b = Value::Tuple(vec![Value::Float(1.0 + 1e-7), Value::Float(2.0)]);
        assert!(a.approx_eq(&b, 1e-6));
        assert!(!a.approx_eq(&b, 1e-9));
    }

    #[test]
    fn test_quaternion_to_euler() {
        // 60 degrees about Z
        let half = FRAC_PI_6;
        let euler = quaternion_to_euler([0.0, 0.0, half.sin(), half.cos()]);
        assert!(euler[0].abs() < 1e-9);
        assert!(euler[1].abs() < 1e-9);
        assert!((euler[2] - 2.0 * half).abs() < 1e-9);
    }

    #[test]
    fn test_serialize_untagged() {
        let json = serde_json::to_string(&Value::Tuple(vec![1.5.into(), "a".into(), Value::Null])).unwrap();
        assert_eq!(json, "[1.5,\"a\",null]");
    }
}
