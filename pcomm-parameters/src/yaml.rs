//!
//! Loading initial parameters from YAML.
//!
//! A parameter file is a mapping with one `parameters` sequence.  Each
//! entry names a parameter, tags its type, and gives a value of that type:
//!
//! ```yaml
//! parameters:
//!   - name: camera.fps
//!     type: integer
//!     value: 30
//!   - name: camera.gains
//!     type: double_array
//!     value: [0.5, 1, 2.25]
//! ```
//!
//! Integer literals are accepted where doubles are expected.  Loading is all
//! or nothing: the first bad entry fails the whole file.
//!

use std::{fs, path::Path};

use serde::{de::DeserializeOwned, Deserialize};

use crate::error::LoadError;
use crate::types::{Parameter, ParameterType, ParameterValue};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ParameterFile {
    #[serde(default)]
    parameters: Vec<ParameterEntry>,
}

#[derive(Debug, Deserialize)]
struct ParameterEntry {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    value: serde_yaml::Value,
}

impl ParameterEntry {
    fn into_parameter(self) -> Result<Parameter, LoadError> {
        let kind = ParameterType::from_tag(&self.kind).ok_or_else(|| LoadError::UnknownType {
            name: self.name.clone(),
            kind: self.kind.clone(),
        })?;

        let value = match kind {
            ParameterType::Bool => ParameterValue::Bool(self.decode()?),
            ParameterType::Integer => ParameterValue::Integer(self.decode()?),
            ParameterType::Double => ParameterValue::Double(self.decode()?),
            ParameterType::String => ParameterValue::String(self.decode()?),
            ParameterType::BoolArray => ParameterValue::BoolArray(self.decode()?),
            ParameterType::IntegerArray => ParameterValue::IntegerArray(self.decode()?),
            ParameterType::DoubleArray => ParameterValue::DoubleArray(self.decode()?),
            ParameterType::StringArray => ParameterValue::StringArray(self.decode()?),
        };

        Ok(Parameter {
            name: self.name,
            value,
        })
    }

    fn decode<T: DeserializeOwned>(&self) -> Result<T, LoadError> {
        serde_yaml::from_value(self.value.clone()).map_err(|err| LoadError::InvalidValue {
            name: self.name.clone(),
            kind: self.kind.clone(),
            reason: err.to_string(),
        })
    }
}

/// Parse parameters from a YAML document
pub fn load_from_str(yaml: &str) -> Result<Vec<Parameter>, LoadError> {
    if yaml.trim().is_empty() {
        return Ok(Vec::new());
    }

    let file: ParameterFile = serde_yaml::from_str(yaml)?;
    file.parameters
        .into_iter()
        .map(ParameterEntry::into_parameter)
        .collect()
}

/// Read and parse a YAML parameter file
pub fn load_from_yaml(path: impl AsRef<Path>) -> Result<Vec<Parameter>, LoadError> {
    let path = path.as_ref();
    let yaml = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&yaml)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_type() {
        let yaml = r#"
parameters:
  - name: enabled
    type: bool
    value: true
  - name: retries
    type: integer
    value: -3
  - name: gain
    type: double
    value: 2
  - name: mode
    type: string
    value: auto
  - name: flags
    type: bool_array
    value: [true, false]
  - name: ids
    type: integer_array
    value: [1, 2, 3]
  - name: weights
    type: double_array
    value: [0.5, 1, 2.25]
  - name: names
    type: string_array
    value: [left, right]
"#;

        let parameters = load_from_str(yaml).unwrap();
        assert_eq!(
            parameters,
            vec![
                Parameter::new("enabled", true),
                Parameter::new("retries", -3i64),
                Parameter::new("gain", 2.0),
                Parameter::new("mode", "auto"),
                Parameter::new("flags", vec![true, false]),
                Parameter::new("ids", vec![1i64, 2, 3]),
                Parameter::new("weights", vec![0.5, 1.0, 2.25]),
                Parameter::new(
                    "names",
                    vec![String::from("left"), String::from("right")]
                ),
            ]
        );
    }

    #[test]
    fn test_empty_documents() {
        assert!(load_from_str("").unwrap().is_empty());
        assert!(load_from_str("parameters: []").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_type() {
        let yaml = "parameters:\n  - {name: blob, type: byte_array, value: [1, 2]}\n";
        assert!(matches!(
            load_from_str(yaml),
            Err(LoadError::UnknownType { name, kind }) if name == "blob" && kind == "byte_array"
        ));
    }

    #[test]
    fn test_mismatched_value() {
        let yaml = "parameters:\n  - {name: ok, type: bool, value: true}\n  - {name: rate, type: integer, value: 1.5}\n";
        assert!(matches!(
            load_from_str(yaml),
            Err(LoadError::InvalidValue { name, kind, .. }) if name == "rate" && kind == "integer"
        ));

        let yaml = "parameters:\n  - {name: ids, type: integer_array, value: [1, two]}\n";
        assert!(matches!(
            load_from_str(yaml),
            Err(LoadError::InvalidValue { name, .. }) if name == "ids"
        ));
    }

    #[test]
    fn test_malformed_file() {
        assert!(matches!(
            load_from_str("parameters:\n  - name: missing_fields\n"),
            Err(LoadError::Yaml(_))
        ));
        assert!(matches!(load_from_str("- 1\n- 2\n"), Err(LoadError::Yaml(_))));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_from_yaml("/nonexistent/parameters.yaml"),
            Err(LoadError::Io { .. })
        ));
    }
}
