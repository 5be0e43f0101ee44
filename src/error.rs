use std::error::Error;
use std::fmt;

/// Raised when a conversion is asked to copy a source sequence that is absent.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct InvalidInput;

impl fmt::Display for InvalidInput {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "invalid input: source sequence is absent")
    }
}

impl Error for InvalidInput {}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ConfigError {
    key: String,
    reason: String,
}

impl ConfigError {
    pub fn new(key: &str, reason: impl Into<String>) -> Self {
        ConfigError {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "bad config value for `{}`: {}", self.key, self.reason)
    }
}

impl Error for ConfigError {}
