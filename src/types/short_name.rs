// ABOUTME: Filesystem-safe project directory name validation.
// ABOUTME: Ensures short names can be used as a single path component under apps/.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShortNameError {
    #[error("short name cannot be empty")]
    Empty,

    #[error("short name exceeds maximum length of 100 characters")]
    TooLong,

    #[error("short name cannot start with a dot")]
    StartsWithDot,

    #[error("invalid character in short name: '{0}'")]
    InvalidChar(char),
}

/// Name of a project's directory under `<root>/apps/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShortName(String);

impl ShortName {
    pub fn new(value: &str) -> Result<Self, ShortNameError> {
        if value.is_empty() {
            return Err(ShortNameError::Empty);
        }

        if value.len() > 100 {
            return Err(ShortNameError::TooLong);
        }

        // Rules out "." and ".." as well as hidden directories.
        if value.starts_with('.') {
            return Err(ShortNameError::StartsWithDot);
        }

        for c in value.chars() {
            if !c.is_ascii_alphanumeric() && c != '-' && c != '_' && c != '.' {
                return Err(ShortNameError::InvalidChar(c));
            }
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShortName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<std::path::Path> for ShortName {
    fn as_ref(&self) -> &std::path::Path {
        std::path::Path::new(&self.0)
    }
}
