use std::fmt;

use serde::{Deserialize, Serialize};

/// A wallet-style address used as the sole profile key.
///
/// Always stored lowercased, so `0xABC` and `0xabc` are the same identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid identity {0:?}: expected a non-empty alphanumeric address")]
pub struct InvalidIdentity(pub String);

impl Identity {
    pub fn parse(raw: &str) -> Result<Self, InvalidIdentity> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(InvalidIdentity(raw.to_string()));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Display name given to profiles created without one: `User_` plus the
    /// first six characters of the address.
    pub fn default_display_name(&self) -> String {
        let prefix: String = self.0.chars().take(6).collect();
        format!("User_{}", prefix)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Identity {
    type Error = InvalidIdentity;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Identity> for String {
    fn from(id: Identity) -> Self {
        id.0
    }
}
