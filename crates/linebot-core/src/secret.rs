//! Channel secret
//!
//! The shared key the platform signs webhook bodies with. The type can be
//! loaded from configuration but has no `Serialize` or
//! `Display` implementation, and its `Debug` output is redacted.

use serde::Deserialize;
use std::fmt;

/// Opaque channel secret bytes.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub struct ChannelSecret(Vec<u8>);

impl ChannelSecret {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self(secret.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ChannelSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChannelSecret(<redacted>)")
    }
}

impl From<String> for ChannelSecret {
    fn from(secret: String) -> Self {
        Self(secret.into_bytes())
    }
}

impl From<&str> for ChannelSecret {
    fn from(secret: &str) -> Self {
        Self(secret.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for ChannelSecret {
    fn from(secret: Vec<u8>) -> Self {
        Self(secret)
    }
}
