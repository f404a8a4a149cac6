//! Identifier types for accounts, keysets and keyboxes.
//!
//! Server-assigned identifiers (`AccountId`, `KeysetId`, `ActionId`) are opaque
//! strings owned by the co-signer. Locally assigned identifiers are UUIDs
//! derived from their inputs so replays produce the same ids.

use crate::errors::{KeywardError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

fn derived_uuid(parts: &[&[u8]]) -> Uuid {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part);
    }
    let digest = hasher.finalize();
    let mut uuid_bytes = [0u8; 16];
    uuid_bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(uuid_bytes)
}

/// Server account identifier.
///
/// Opaque to the client; only guaranteed non-empty and free of path separators
/// so it can be embedded in storage keys and request paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

impl AccountId {
    /// Validate and wrap a server account id.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(KeywardError::invalid("account id cannot be empty"));
        }
        if id.contains('/') || id.chars().any(char::is_whitespace) {
            return Err(KeywardError::invalid(format!(
                "account id contains reserved characters: {id:?}"
            )));
        }
        // Account ids become storage path segments
        if id == "." || id == ".." {
            return Err(KeywardError::invalid(format!(
                "account id cannot be a relative path segment: {id:?}"
            )));
        }
        Ok(Self(id))
    }

    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AccountId {
    type Err = KeywardError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for AccountId {
    type Error = KeywardError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<AccountId> for String {
    fn from(id: AccountId) -> Self {
        id.0
    }
}

/// Server-side spending keyset identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeysetId(pub String);

impl KeysetId {
    /// Wrap a server keyset id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeysetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Privileged action identifier issued by the co-signer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(pub String);

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Local keybox identifier.
///
/// A keybox revision gets a new id whenever any of its keys change, so an
/// archived keybox is never confused with the active one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyboxId(pub Uuid);

impl KeyboxId {
    /// Derive a keybox id for an account revision.
    pub fn derive(account_id: &AccountId, revision_ms: u64, salt: &[u8]) -> Self {
        Self(derived_uuid(&[
            b"keybox",
            account_id.as_str().as_bytes(),
            &revision_ms.to_be_bytes(),
            salt,
        ]))
    }

    /// Create from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for KeyboxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "keybox-{}", self.0)
    }
}

/// Local spending keyset identifier (distinct from the server's `KeysetId`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalKeysetId(pub Uuid);

impl LocalKeysetId {
    /// Derive a local id from the server keyset id it mirrors.
    pub fn for_server_keyset(keyset_id: &KeysetId) -> Self {
        Self(derived_uuid(&[b"spending-keyset", keyset_id.as_str().as_bytes()]))
    }
}

impl fmt::Display for LocalKeysetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "keyset-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_id_rejects_empty_and_reserved() {
        assert!(AccountId::new("").is_err());
        assert!(AccountId::new("a/b").is_err());
        assert!(AccountId::new("a b").is_err());
        assert!(AccountId::new(".").is_err());
        assert!(AccountId::new("..").is_err());
        assert!(serde_json::from_str::<AccountId>("\"..\"").is_err());
        assert_eq!(AccountId::new("...").unwrap().as_str(), "...");
        assert_eq!(
            AccountId::new("urn:wallet-account:01").unwrap().as_str(),
            "urn:wallet-account:01"
        );
    }

    #[test]
    fn account_id_deserialization_validates() {
        let ok: AccountId = serde_json::from_str("\"acct-1\"").unwrap();
        assert_eq!(ok.to_string(), "acct-1");
        assert!(serde_json::from_str::<AccountId>("\"\"").is_err());
    }

    #[test]
    fn keybox_id_derivation_is_stable() {
        let account = AccountId::new("acct-1").unwrap();
        let a = KeyboxId::derive(&account, 42, b"x");
        let b = KeyboxId::derive(&account, 42, b"x");
        let c = KeyboxId::derive(&account, 43, b"x");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
