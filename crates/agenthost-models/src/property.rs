use serde::{Deserialize, Serialize};

/// A user-tunable agent parameter: name, display label and default value.
///
/// The value type of a property is whatever shape its default has.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropertyInfo {
    pub name: String,
    pub label: String,
    pub default: PropertyValue,
}

impl PropertyInfo {
    pub fn new(name: &str, label: &str, default: impl Into<PropertyValue>) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            default: default.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PropertyValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl PropertyValue {
    pub fn kind(&self) -> &'static str {
        match self {
            PropertyValue::Integer(_) => "integer",
            PropertyValue::Float(_) => "float",
            PropertyValue::Text(_) => "text",
        }
    }

    /// Whether `other` may replace a property whose default is `self`.
    /// Integers are accepted where a float is expected.
    pub fn accepts(&self, other: &PropertyValue) -> bool {
        matches!(
            (self, other),
            (PropertyValue::Integer(_), PropertyValue::Integer(_))
                | (PropertyValue::Float(_), PropertyValue::Float(_))
                | (PropertyValue::Float(_), PropertyValue::Integer(_))
                | (PropertyValue::Text(_), PropertyValue::Text(_))
        )
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Integer(v) => Some(*v as f64),
            PropertyValue::Float(v) => Some(*v),
            PropertyValue::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Integer(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Float(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::Text(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::Text(v)
    }
}
