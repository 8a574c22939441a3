use serde_yaml::{Mapping, Value};

use crate::error::{Error, Result};
use crate::types::KeyRecord;

const NAME_FIELD: &str = "name";
const FINGERPRINT_FIELD: &str = "fingerprint";

/// Loosely parsed declaration, before any field is required.
///
/// A field is `None` when it is absent; present fields of the wrong type are
/// kept as `Some(Err(type))` so callers can tell the two cases apart.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub name: Option<std::result::Result<String, &'static str>>,
    pub fingerprint: Option<std::result::Result<String, &'static str>>,
}

impl Declaration {
    /// Parses a YAML document. Returns `None` if it is not a YAML mapping.
    pub fn parse(text: &str) -> Option<Self> {
        let value: Value = serde_yaml::from_str(text).ok()?;
        let mapping = value.as_mapping()?;
        Some(Self {
            name: string_field(mapping, NAME_FIELD),
            fingerprint: string_field(mapping, FINGERPRINT_FIELD),
        })
    }

    /// Whether the document carries either of the key declaration fields.
    pub fn looks_like_key(&self) -> bool {
        self.name.is_some() || self.fingerprint.is_some()
    }
}

/// Loads the key record declared in `text`.
///
/// Unknown fields are ignored. Both `name` and `fingerprint` must be present
/// and be strings.
pub fn parse_record(source: &str, text: &str) -> Result<KeyRecord> {
    let malformed = |reason: String| Error::MalformedInput {
        file: source.to_string(),
        reason,
    };

    let value: Value =
        serde_yaml::from_str(text).map_err(|e| malformed(format!("invalid YAML: {e}")))?;
    let mapping = value
        .as_mapping()
        .ok_or_else(|| malformed("expected a mapping of fields".to_string()))?;

    let fingerprint = require(mapping, FINGERPRINT_FIELD).map_err(&malformed)?;
    let name = require(mapping, NAME_FIELD).map_err(&malformed)?;

    Ok(KeyRecord {
        source: source.to_string(),
        name,
        fingerprint,
    })
}

fn require(mapping: &Mapping, field: &str) -> std::result::Result<String, String> {
    match string_field(mapping, field) {
        Some(Ok(value)) => Ok(value),
        Some(Err(kind)) => Err(format!("field '{field}' must be a string, found {kind}")),
        None => Err(format!("missing field '{field}'")),
    }
}

fn string_field(mapping: &Mapping, field: &str) -> Option<std::result::Result<String, &'static str>> {
    let value = mapping.get(field)?;
    Some(match value {
        Value::String(s) => Ok(s.clone()),
        Value::Null => Err("null"),
        Value::Bool(_) => Err("a boolean"),
        Value::Number(_) => Err("a number"),
        Value::Sequence(_) => Err("a list"),
        Value::Mapping(_) => Err("a mapping"),
        Value::Tagged(_) => Err("a tagged value"),
    })
}
