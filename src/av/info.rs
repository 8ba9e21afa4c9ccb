//! Stream identity

use std::fmt;

use uuid::Uuid;

/// Identifies one logical stream and the endpoint attached to it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct StreamInfo {
    /// Registry key, `"<app>/<name>"`
    pub key: String,
    /// Full URL the endpoint was opened with
    pub url: String,
    /// Unique id of the endpoint
    pub uid: String,
    /// Relay-originated rather than directly published/played
    pub inter: bool,
}

impl StreamInfo {
    /// Identity for a directly connected endpoint
    pub fn new(key: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            url: url.into(),
            uid: Uuid::new_v4().to_string(),
            inter: false,
        }
    }

    /// Identity for a relay-originated endpoint
    pub fn interval(key: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            inter: true,
            ..Self::new(key, url)
        }
    }

    pub fn is_interval(&self) -> bool {
        self.inter
    }
}

impl fmt::Display for StreamInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<key: {}, URL: {}, UID: {}, Inter: {}>",
            self.key, self.url, self.uid, self.inter
        )
    }
}
