//! Typed public keys and signatures.
//!
//! Every key role gets its own type so an app spending key can never be passed
//! where a hardware auth key is expected. Keys are compressed secp256k1 points
//! carried as lowercase hex; the curve arithmetic itself lives behind the
//! signing effect traits.

use crate::errors::{KeywardError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of a compressed secp256k1 public key.
pub const COMPRESSED_PUBKEY_LEN: usize = 33;

fn parse_compressed_pubkey(label: &str, hex_str: &str) -> Result<String> {
    let bytes = hex::decode(hex_str)
        .map_err(|e| KeywardError::invalid(format!("{label}: invalid hex: {e}")))?;
    if bytes.len() != COMPRESSED_PUBKEY_LEN {
        return Err(KeywardError::invalid(format!(
            "{label}: expected {COMPRESSED_PUBKEY_LEN} bytes, got {}",
            bytes.len()
        )));
    }
    if bytes[0] != 0x02 && bytes[0] != 0x03 {
        return Err(KeywardError::invalid(format!(
            "{label}: not a compressed point (prefix {:#04x})",
            bytes[0]
        )));
    }
    Ok(hex::encode(bytes))
}

macro_rules! public_key_type {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Parse a compressed public key from hex.
            pub fn from_hex(hex_str: &str) -> Result<Self> {
                parse_compressed_pubkey($label, hex_str).map(Self)
            }

            /// Parse from raw compressed bytes.
            pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
                Self::from_hex(&hex::encode(bytes))
            }

            /// Lowercase hex encoding.
            pub fn as_hex(&self) -> &str {
                &self.0
            }

            /// Compressed point bytes.
            pub fn to_bytes(&self) -> Vec<u8> {
                // Validated at construction
                hex::decode(&self.0).unwrap_or_default()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = KeywardError;

            fn try_from(value: String) -> Result<Self> {
                Self::from_hex(&value)
            }
        }

        impl From<$name> for String {
            fn from(key: $name) -> Self {
                key.0
            }
        }
    };
}

public_key_type!(
    /// App global authentication key; authenticates the app for everyday calls.
    AppGlobalAuthPublicKey,
    "app global auth key"
);
public_key_type!(
    /// App recovery authentication key; authenticates recovery-scoped calls.
    AppRecoveryAuthPublicKey,
    "app recovery auth key"
);
public_key_type!(
    /// Hardware authentication key held by the physical device.
    HwAuthPublicKey,
    "hardware auth key"
);
public_key_type!(
    /// App spending key for the multisig descriptor.
    AppSpendingPublicKey,
    "app spending key"
);
public_key_type!(
    /// Hardware spending key for the multisig descriptor.
    HwSpendingPublicKey,
    "hardware spending key"
);
public_key_type!(
    /// Server (co-signer) spending key for the multisig descriptor.
    ServerSpendingPublicKey,
    "server spending key"
);

/// Detached signature produced by one of the factors, hex encoded.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(pub String);

impl Signature {
    /// Wrap raw signature bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }

    /// Hex encoding.
    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = self.0.get(..16).unwrap_or(&self.0);
        write!(f, "Signature({shown}..)")
    }
}

/// Hardware signature over the account id, proving current possession of the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HwFactorProofOfPossession(pub Signature);

/// App signature over the account id with an app auth key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppFactorProofOfPossession(pub Signature);

/// Proof of possession attached to privileged co-signer calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofOfPossession {
    /// App factor proof, if the call is app-authorized
    pub app: Option<AppFactorProofOfPossession>,
    /// Hardware factor proof, if the call is hardware-authorized
    pub hw: Option<HwFactorProofOfPossession>,
}

impl ProofOfPossession {
    /// Proof from both factors.
    pub fn both(app: AppFactorProofOfPossession, hw: HwFactorProofOfPossession) -> Self {
        Self {
            app: Some(app),
            hw: Some(hw),
        }
    }

    /// Proof from the hardware only.
    pub fn hardware(hw: HwFactorProofOfPossession) -> Self {
        Self {
            app: None,
            hw: Some(hw),
        }
    }

    /// Proof from the app only.
    pub fn app(app: AppFactorProofOfPossession) -> Self {
        Self {
            app: Some(app),
            hw: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "02a1633cafcc01ebfb6d78e39f687a1f0995c62fc95f51ead10a02ee0be551b5dc";

    #[test]
    fn parses_compressed_keys() {
        let key = HwAuthPublicKey::from_hex(KEY).unwrap();
        assert_eq!(key.as_hex(), KEY);
        assert_eq!(key.to_bytes().len(), COMPRESSED_PUBKEY_LEN);
    }

    #[test]
    fn canonicalizes_to_lowercase() {
        let key = AppGlobalAuthPublicKey::from_hex(&KEY.to_uppercase()).unwrap();
        assert_eq!(key.as_hex(), KEY);
    }

    #[test]
    fn rejects_malformed_keys() {
        assert!(HwAuthPublicKey::from_hex("zz").is_err());
        assert!(HwAuthPublicKey::from_hex("0201").is_err());
        let uncompressed_prefix = format!("04{}", &KEY[2..]);
        assert!(HwAuthPublicKey::from_hex(&uncompressed_prefix).is_err());
    }

    #[test]
    fn serde_round_trip_validates() {
        let key = AppSpendingPublicKey::from_hex(KEY).unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{KEY}\""));
        assert!(serde_json::from_str::<AppSpendingPublicKey>("\"0201\"").is_err());
    }
}
