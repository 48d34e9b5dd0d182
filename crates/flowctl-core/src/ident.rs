use std::fmt;

use crate::error::{FlowError, Result};

/// A key used for volumes, images, jobs, and actions.
///
/// Must be non-empty and match the common identifier grammar: an
/// alphabetic or underscore lead character, followed by any run of
/// alphanumerics/underscores.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    pub fn new(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        if !is_identifier(&s) {
            return Err(FlowError::SchemaError(format!(
                "'{s}' is not a valid identifier"
            )));
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

impl TryFrom<String> for Identifier {
    type Error = FlowError;

    fn try_from(value: String) -> Result<Self> {
        Identifier::new(value)
    }
}

impl From<Identifier> for String {
    fn from(value: Identifier) -> Self {
        value.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
