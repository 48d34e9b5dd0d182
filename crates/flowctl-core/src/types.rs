use std::fmt;

use crate::error::{FlowError, Result};

/// A local filesystem path, taken literally at parse time. No existence
/// check is performed — the path may not exist until a volume/image
/// operation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalPath(String);

impl LocalPath {
    pub fn parse(s: &str) -> Result<Self> {
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A POSIX-style remote path. Must be non-empty; no further validation
/// is performed since the remote filesystem layout is opaque to us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePath(String);

impl RemotePath {
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(FlowError::SchemaError(
                "remote path must be non-empty".into(),
            ));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A scheme-qualified URI, e.g. `storage:/proj/data` or `image:banana1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uri(url::Url);

impl Uri {
    pub fn parse(s: &str) -> Result<Self> {
        let url = url::Url::parse(s)
            .map_err(|e| FlowError::SchemaError(format!("'{s}' is not a valid URI: {e}")))?;
        if url.scheme().is_empty() {
            return Err(FlowError::SchemaError(format!(
                "'{s}' is missing a URI scheme"
            )));
        }
        Ok(Self(url))
    }

    pub fn scheme(&self) -> &str {
        self.0.scheme()
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_requires_scheme() {
        assert!(Uri::parse("storage:/proj/data").is_ok());
        assert!(Uri::parse("image:banana1").is_ok());
        assert!(Uri::parse("not a uri").is_err());
    }

    #[test]
    fn remote_path_rejects_empty() {
        assert!(RemotePath::parse("").is_err());
        assert!(RemotePath::parse("/data/out").is_ok());
    }
}
