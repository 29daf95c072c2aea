//! Property value model

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// A property value as stored on an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Boolean
    Bool(bool),
    /// 8-bit signed integer
    Byte(i8),
    /// 16-bit signed integer
    Short(i16),
    /// Unicode scalar value
    Char(char),
    /// 32-bit signed integer
    Int(i32),
    /// 64-bit signed integer
    Long(i64),
    /// 32-bit float
    Float(f32),
    /// 64-bit float
    Double(f64),
    /// UTF-8 string
    String(String),
    /// Homogeneous array
    Array(ArrayValue),
    /// Spatial point
    Point(Point),
    /// Date, time, datetime or duration
    Temporal(TemporalValue),
}

impl Value {
    /// Short name of the value's type, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Byte(_) => "byte",
            Value::Short(_) => "short",
            Value::Char(_) => "char",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Point(_) => "point",
            Value::Temporal(_) => "temporal",
        }
    }

    /// String contents, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer contents widened to i64, if this is an integral value
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Byte(v) => Some(v as i64),
            Value::Short(v) => Some(v as i64),
            Value::Int(v) => Some(v as i64),
            Value::Long(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

/// Homogeneous array value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArrayValue {
    /// Boolean array
    Bool(Vec<bool>),
    /// Byte array
    Byte(Vec<i8>),
    /// Short array
    Short(Vec<i16>),
    /// Char array
    Char(Vec<char>),
    /// Int array
    Int(Vec<i32>),
    /// Long array
    Long(Vec<i64>),
    /// Float array
    Float(Vec<f32>),
    /// Double array
    Double(Vec<f64>),
    /// String array
    String(Vec<String>),
    /// Point array; every point shares one coordinate system and dimension
    Point(Vec<Point>),
    /// Temporal array; every element has the same temporal kind
    Temporal(Vec<TemporalValue>),
}

impl ArrayValue {
    /// Number of elements
    pub fn len(&self) -> usize {
        match self {
            ArrayValue::Bool(v) => v.len(),
            ArrayValue::Byte(v) => v.len(),
            ArrayValue::Short(v) => v.len(),
            ArrayValue::Char(v) => v.len(),
            ArrayValue::Int(v) => v.len(),
            ArrayValue::Long(v) => v.len(),
            ArrayValue::Float(v) => v.len(),
            ArrayValue::Double(v) => v.len(),
            ArrayValue::String(v) => v.len(),
            ArrayValue::Point(v) => v.len(),
            ArrayValue::Temporal(v) => v.len(),
        }
    }

    /// Whether the array has no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Coordinate system for points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinateSystem {
    /// Cartesian coordinate system (x, y, z)
    Cartesian,
    /// WGS84 geographic coordinate system (longitude, latitude, height)
    WGS84,
}

/// Point in 2D or 3D space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// X coordinate (or longitude for WGS84)
    pub x: f64,
    /// Y coordinate (or latitude for WGS84)
    pub y: f64,
    /// Z coordinate (or height for WGS84), None for 2D points
    pub z: Option<f64>,
    /// Coordinate system
    pub coordinate_system: CoordinateSystem,
}

impl Point {
    /// Create a 2D point
    pub fn new_2d(x: f64, y: f64, coordinate_system: CoordinateSystem) -> Self {
        Self {
            x,
            y,
            z: None,
            coordinate_system,
        }
    }

    /// Create a 3D point
    pub fn new_3d(x: f64, y: f64, z: f64, coordinate_system: CoordinateSystem) -> Self {
        Self {
            x,
            y,
            z: Some(z),
            coordinate_system,
        }
    }

    /// Number of coordinates
    pub fn dimension(&self) -> usize {
        if self.z.is_some() { 3 } else { 2 }
    }

    /// Coordinates in order
    pub fn coordinates(&self) -> Vec<f64> {
        let mut coords = vec![self.x, self.y];
        coords.extend(self.z);
        coords
    }
}

/// Temporal value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TemporalValue {
    /// Calendar date
    Date(NaiveDate),
    /// Time of day without zone
    LocalTime(NaiveTime),
    /// Date and time without zone
    LocalDateTime(NaiveDateTime),
    /// Time of day with a fixed offset in seconds east of UTC
    Time {
        /// Time of day
        time: NaiveTime,
        /// Offset from UTC in seconds
        offset_seconds: i32,
    },
    /// Instant with a fixed offset
    DateTime(DateTime<FixedOffset>),
    /// Calendar-aware duration
    Duration {
        /// Months
        months: i64,
        /// Days
        days: i64,
        /// Seconds
        seconds: i64,
        /// Nanoseconds, 0..1_000_000_000
        nanos: i32,
    },
}
