//! Deterministic keys and the fake signature scheme.
//!
//! Test keys are well-formed compressed-point encodings derived from a seed;
//! they are not real curve points. A fake signature is
//! `sha256(pubkey_hex || message)`, which lets the fake co-signer check which
//! key signed a message without any curve arithmetic.

use keyward_core::{KeywardError, Signature};
use sha2::{Digest, Sha256};

/// Deterministic public key of any role, e.g. `test_key::<HwAuthPublicKey>("hw-1")`.
pub fn test_key<K>(seed: &str) -> K
where
    K: TryFrom<String, Error = KeywardError>,
{
    let digest = Sha256::digest(seed.as_bytes());
    let hex = format!("02{}", hex::encode(&digest[..32]));
    K::try_from(hex).expect("derived keys are well formed")
}

/// Sign `message` under the fake scheme.
pub fn fake_sign(public_key_hex: &str, message: &[u8]) -> Signature {
    let mut hasher = Sha256::new();
    hasher.update(public_key_hex.as_bytes());
    hasher.update(message);
    Signature::from_bytes(&hasher.finalize())
}

/// Check a fake signature.
pub fn fake_verify(public_key_hex: &str, message: &[u8], signature: &Signature) -> bool {
    fake_sign(public_key_hex, message) == *signature
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyward_core::{AppGlobalAuthPublicKey, HwAuthPublicKey};

    #[test]
    fn keys_are_deterministic_per_seed() {
        let a: HwAuthPublicKey = test_key("hw-1");
        let b: HwAuthPublicKey = test_key("hw-1");
        let c: HwAuthPublicKey = test_key("hw-2");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn signatures_bind_key_and_message() {
        let key: AppGlobalAuthPublicKey = test_key("app");
        let other: AppGlobalAuthPublicKey = test_key("other");
        let sig = fake_sign(key.as_hex(), b"msg");
        assert!(fake_verify(key.as_hex(), b"msg", &sig));
        assert!(!fake_verify(other.as_hex(), b"msg", &sig));
        assert!(!fake_verify(key.as_hex(), b"msh", &sig));
    }
}
