//! File specs: the declarative description of what to upload and where.
//!
//! A [`SpecFiles`] is deserialised from a JSON document of the form
//! `{"files": [{"pattern": "...", "target": "...", ...}]}`. Boolean overrides are kept as
//! strings, as they appear in spec documents, and are only parsed when upload parameters are
//! built, so that one malformed entry cannot spoil the others.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// An ordered list of upload entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecFiles {
    #[serde(default)]
    pub files: Vec<File>,
}

impl SpecFiles {
    pub fn new(files: Vec<File>) -> Self {
        Self { files }
    }
}

/// One source-pattern to target mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    pub pattern: String,
    pub target: String,
    /// Semicolon-separated `key=value` properties attached to every uploaded file.
    #[serde(default)]
    pub props: String,
    /// Wildcard patterns of local paths to leave out.
    #[serde(default)]
    pub exclusions: Vec<String>,
    #[serde(default)]
    pub recursive: Option<String>,
    #[serde(default)]
    pub regexp: Option<String>,
    #[serde(default)]
    pub include_dirs: Option<String>,
    #[serde(default)]
    pub flat: Option<String>,
    #[serde(default)]
    pub explode: Option<String>,
}

/// The path and property parameters shared by every kind of repository operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommonParams {
    pub pattern: String,
    pub target: String,
    pub props: String,
    pub exclusions: Vec<String>,
}

impl File {
    pub fn new(pattern: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            target: target.into(),
            ..Self::default()
        }
    }

    pub fn to_common_params(&self) -> CommonParams {
        CommonParams {
            pattern: self.pattern.clone(),
            target: self.target.clone(),
            props: self.props.clone(),
            exclusions: self.exclusions.clone(),
        }
    }

    pub fn is_recursive(&self, default: bool) -> Result<bool, ConfigError> {
        bool_or_default("recursive", self.recursive.as_deref(), default)
    }

    pub fn is_regexp(&self, default: bool) -> Result<bool, ConfigError> {
        bool_or_default("regexp", self.regexp.as_deref(), default)
    }

    pub fn is_include_dirs(&self, default: bool) -> Result<bool, ConfigError> {
        bool_or_default("includeDirs", self.include_dirs.as_deref(), default)
    }

    pub fn is_flat(&self, default: bool) -> Result<bool, ConfigError> {
        bool_or_default("flat", self.flat.as_deref(), default)
    }

    pub fn is_explode(&self, default: bool) -> Result<bool, ConfigError> {
        bool_or_default("explode", self.explode.as_deref(), default)
    }
}

/// Resolves an optional boolean override. Absent and empty values fall back to `default`.
pub fn bool_or_default(
    field: &'static str,
    raw: Option<&str>,
    default: bool,
) -> Result<bool, ConfigError> {
    match raw {
        None | Some("") => Ok(default),
        Some(value) => parse_bool(value).ok_or_else(|| ConfigError::InvalidBoolean {
            field,
            value: value.to_string(),
        }),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_and_empty_overrides_use_default() {
        assert!(bool_or_default("flat", None, true).unwrap());
        assert!(!bool_or_default("flat", Some(""), false).unwrap());
    }

    #[test]
    fn accepts_all_boolean_spellings() {
        for raw in ["1", "t", "T", "TRUE", "true", "True"] {
            assert!(bool_or_default("recursive", Some(raw), false).unwrap(), "{raw}");
        }
        for raw in ["0", "f", "F", "FALSE", "false", "False"] {
            assert!(!bool_or_default("recursive", Some(raw), true).unwrap(), "{raw}");
        }
    }

    #[test]
    fn rejects_non_boolean_override() {
        let err = bool_or_default("regexp", Some("yes"), false).unwrap_err();
        match err {
            ConfigError::InvalidBoolean { field, value } => {
                assert_eq!(field, "regexp");
                assert_eq!(value, "yes");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn deserialises_spec_document() {
        let json = r#"{
            "files": [
                {"pattern": "build/*.jar", "target": "libs/", "props": "a=1", "includeDirs": "true"},
                {"pattern": "docs/(*).md", "target": "docs/{1}.md", "exclusions": ["*draft*"]}
            ]
        }"#;
        let spec: SpecFiles = serde_json::from_str(json).unwrap();
        assert_eq!(spec.files.len(), 2);
        assert_eq!(spec.files[0].include_dirs.as_deref(), Some("true"));
        assert_eq!(spec.files[0].props, "a=1");
        assert_eq!(spec.files[1].exclusions, vec!["*draft*".to_string()]);
        assert_eq!(spec.files[1].recursive, None);
    }
}
