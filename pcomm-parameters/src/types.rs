//!
//! Parameter data model.
//!
//! A parameter is a name bound to a typed value.  The value's variant is
//! the authoritative record of its type.
//!

use std::fmt;

/// The type of a parameter value.
///
/// The display form of each type matches the `type` tag used in
/// parameter files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterType {
    /// A single boolean
    Bool,
    /// A single signed 64-bit integer
    Integer,
    /// A single 64-bit float
    Double,
    /// A single string
    String,
    /// A sequence of booleans
    BoolArray,
    /// A sequence of signed 64-bit integers
    IntegerArray,
    /// A sequence of 64-bit floats
    DoubleArray,
    /// A sequence of strings
    StringArray,
}

impl ParameterType {
    /// Every parameter type, in declaration order
    pub const ALL: [ParameterType; 8] = [
        ParameterType::Bool,
        ParameterType::Integer,
        ParameterType::Double,
        ParameterType::String,
        ParameterType::BoolArray,
        ParameterType::IntegerArray,
        ParameterType::DoubleArray,
        ParameterType::StringArray,
    ];

    /// The tag naming this type in parameter files
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Integer => "integer",
            Self::Double => "double",
            Self::String => "string",
            Self::BoolArray => "bool_array",
            Self::IntegerArray => "integer_array",
            Self::DoubleArray => "double_array",
            Self::StringArray => "string_array",
        }
    }

    /// Look a type up by its parameter file tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    /// A single boolean
    Bool(bool),
    /// A single signed 64-bit integer
    Integer(i64),
    /// A single 64-bit float
    Double(f64),
    /// A single string
    String(String),
    /// A sequence of booleans
    BoolArray(Vec<bool>),
    /// A sequence of signed 64-bit integers
    IntegerArray(Vec<i64>),
    /// A sequence of 64-bit floats
    DoubleArray(Vec<f64>),
    /// A sequence of strings
    StringArray(Vec<String>),
}

impl ParameterValue {
    /// Returns the parameter type of this value.
    pub fn parameter_type(&self) -> ParameterType {
        match self {
            Self::Bool(_) => ParameterType::Bool,
            Self::Integer(_) => ParameterType::Integer,
            Self::Double(_) => ParameterType::Double,
            Self::String(_) => ParameterType::String,
            Self::BoolArray(_) => ParameterType::BoolArray,
            Self::IntegerArray(_) => ParameterType::IntegerArray,
            Self::DoubleArray(_) => ParameterType::DoubleArray,
            Self::StringArray(_) => ParameterType::StringArray,
        }
    }

    /// The number of elements held by an array value, or None for scalars
    pub fn array_len(&self) -> Option<usize> {
        match self {
            Self::BoolArray(v) => Some(v.len()),
            Self::IntegerArray(v) => Some(v.len()),
            Self::DoubleArray(v) => Some(v.len()),
            Self::StringArray(v) => Some(v.len()),
            Self::Bool(_) | Self::Integer(_) | Self::Double(_) | Self::String(_) => None,
        }
    }

    /// The longest string held by this value, or None when it holds no strings
    pub fn longest_string(&self) -> Option<usize> {
        match self {
            Self::String(v) => Some(v.len()),
            Self::StringArray(v) => v.iter().map(String::len).max(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool_array(&self) -> Option<&[bool]> {
        match self {
            Self::BoolArray(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_integer_array(&self) -> Option<&[i64]> {
        match self {
            Self::IntegerArray(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_double_array(&self) -> Option<&[f64]> {
        match self {
            Self::DoubleArray(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_string_array(&self) -> Option<&[String]> {
        match self {
            Self::StringArray(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::BoolArray(v) => write!(f, "{v:?}"),
            Self::IntegerArray(v) => write!(f, "{v:?}"),
            Self::DoubleArray(v) => write!(f, "{v:?}"),
            Self::StringArray(v) => write!(f, "{v:?}"),
        }
    }
}

macro_rules! parameter_value_from {
    ($source: ty, $variant: ident) => {
        impl From<$source> for ParameterValue {
            fn from(value: $source) -> Self {
                Self::$variant(value.into())
            }
        }
    };
}

parameter_value_from!(bool, Bool);
parameter_value_from!(i64, Integer);
parameter_value_from!(i32, Integer);
parameter_value_from!(f64, Double);
parameter_value_from!(String, String);
parameter_value_from!(&str, String);
parameter_value_from!(Vec<bool>, BoolArray);
parameter_value_from!(Vec<i64>, IntegerArray);
parameter_value_from!(Vec<f64>, DoubleArray);
parameter_value_from!(Vec<String>, StringArray);

/// A parameter with its name and value.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// The name of the parameter, unique within a node
    pub name: String,
    /// The current value of the parameter
    pub value: ParameterValue,
}

impl Parameter {
    /// Create a new parameter from anything convertible into a value
    pub fn new(name: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// The type of this parameter's value
    pub fn parameter_type(&self) -> ParameterType {
        self.value.parameter_type()
    }
}

/// Result of setting or deleting a single parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetParametersResult {
    /// Whether the operation was applied
    pub successful: bool,
    /// Why the operation was not applied (empty on success)
    pub reason: String,
}

impl SetParametersResult {
    pub fn success() -> Self {
        Self {
            successful: true,
            reason: String::new(),
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            successful: false,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_tags_round_trip() {
        for kind in ParameterType::ALL {
            assert_eq!(ParameterType::from_tag(kind.as_str()), Some(kind));
        }
        assert_eq!(ParameterType::from_tag("byte_array"), None);
        assert_eq!(ParameterType::IntegerArray.to_string(), "integer_array");
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Parameter::new("a", true).parameter_type(), ParameterType::Bool);
        assert_eq!(Parameter::new("b", 3i64).value, ParameterValue::Integer(3));
        assert_eq!(Parameter::new("c", 2.5).value.as_double(), Some(2.5));
        assert_eq!(Parameter::new("d", "hi").value.as_str(), Some("hi"));
        assert_eq!(
            Parameter::new("e", vec![1i64, 2]).value.as_integer_array(),
            Some(&[1i64, 2][..])
        );
        assert_eq!(Parameter::new("f", 1i64).value.as_bool(), None);
    }

    #[test]
    fn test_value_sizes() {
        let strings = ParameterValue::from(vec!["a".to_string(), "abc".to_string()]);
        assert_eq!(strings.array_len(), Some(2));
        assert_eq!(strings.longest_string(), Some(3));
        assert_eq!(ParameterValue::Integer(1).array_len(), None);
        assert_eq!(ParameterValue::DoubleArray(vec![]).longest_string(), None);
    }

    #[test]
    fn test_results() {
        assert!(SetParametersResult::success().successful);
        assert!(SetParametersResult::success().reason.is_empty());
        let failure = SetParametersResult::failure("too long");
        assert!(!failure.successful);
        assert_eq!(failure.reason, "too long");
    }
}
