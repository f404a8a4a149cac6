//! Delay-notify challenges.
//!
//! A challenge commits to the keys that become active when a recovery
//! completes. The bytes are the action tag followed by the hardware auth key,
//! the app global auth key and the app recovery auth key (empty when absent),
//! as UTF-8 hex text. The tag keeps a signature for one protocol from being
//! replayed against another.

use keyward_core::effects::DestinationAuthKeys;
use keyward_core::{
    AccountId, AppAuthPublicKeys, AppGlobalAuthPublicKey, AppRecoveryAuthPublicKey,
    HwAuthPublicKey,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const RECOVERY_TAG: &str = "CompleteDelayNotify";
const INHERITANCE_TAG: &str = "LockInheritanceClaim";
const AUTH_ROTATION_TAG: &str = "RotateAuthKeys";

/// Protocol a challenge is signed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChallengeType {
    Recovery,
    Inheritance,
}

impl ChallengeType {
    pub fn tag(self) -> &'static str {
        match self {
            ChallengeType::Recovery => RECOVERY_TAG,
            ChallengeType::Inheritance => INHERITANCE_TAG,
        }
    }
}

/// Serialized challenge bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DelayNotifyChallenge {
    bytes: Vec<u8>,
}

impl DelayNotifyChallenge {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Hex of the bytes, as sent to the co-signer.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Stable SHA-256 reference persisted with the attempt.
    pub fn reference(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }
}

/// Builds challenges. Pure and deterministic.
pub struct ChallengeBuilder;

impl ChallengeBuilder {
    pub fn build(
        challenge_type: ChallengeType,
        app_global_auth: &AppGlobalAuthPublicKey,
        app_recovery_auth: Option<&AppRecoveryAuthPublicKey>,
        hw_auth: &HwAuthPublicKey,
    ) -> DelayNotifyChallenge {
        let recovery = app_recovery_auth.map_or("", |key| key.as_hex());
        let text = format!(
            "{}{}{}{}",
            challenge_type.tag(),
            hw_auth.as_hex(),
            app_global_auth.as_hex(),
            recovery
        );
        DelayNotifyChallenge {
            bytes: text.into_bytes(),
        }
    }

    /// Recovery challenge over a recovery's destination keys.
    pub fn for_destination(destination: &DestinationAuthKeys) -> DelayNotifyChallenge {
        Self::build(
            ChallengeType::Recovery,
            &destination.app_global_auth,
            destination.app_recovery_auth.as_ref(),
            &destination.hw_auth,
        )
    }

    /// Challenge committing an account to a new set of app auth keys.
    pub fn auth_key_rotation(
        account_id: &AccountId,
        new_keys: &AppAuthPublicKeys,
        hw_auth: &HwAuthPublicKey,
    ) -> DelayNotifyChallenge {
        let recovery = new_keys
            .app_recovery_auth
            .as_ref()
            .map_or("", |key| key.as_hex());
        let text = format!(
            "{AUTH_ROTATION_TAG}{account_id}{}{}{recovery}",
            hw_auth.as_hex(),
            new_keys.app_global_auth.as_hex(),
        );
        DelayNotifyChallenge {
            bytes: text.into_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyward_testkit::test_key;
    use proptest::prelude::*;

    #[test]
    fn layout_is_tag_then_hw_app_recovery() {
        let app: AppGlobalAuthPublicKey = test_key("app");
        let rec: AppRecoveryAuthPublicKey = test_key("rec");
        let hw: HwAuthPublicKey = test_key("hw");

        let challenge = ChallengeBuilder::build(ChallengeType::Recovery, &app, Some(&rec), &hw);
        let expected = format!(
            "CompleteDelayNotify{}{}{}",
            hw.as_hex(),
            app.as_hex(),
            rec.as_hex()
        );
        assert_eq!(challenge.as_bytes(), expected.as_bytes());

        let without = ChallengeBuilder::build(ChallengeType::Inheritance, &app, None, &hw);
        let expected = format!("LockInheritanceClaim{}{}", hw.as_hex(), app.as_hex());
        assert_eq!(without.as_bytes(), expected.as_bytes());
    }

    #[test]
    fn tags_separate_protocols() {
        let app: AppGlobalAuthPublicKey = test_key("app");
        let hw: HwAuthPublicKey = test_key("hw");
        let recovery = ChallengeBuilder::build(ChallengeType::Recovery, &app, None, &hw);
        let inheritance = ChallengeBuilder::build(ChallengeType::Inheritance, &app, None, &hw);
        assert_ne!(recovery, inheritance);
        assert_ne!(recovery.reference(), inheritance.reference());
    }

    proptest! {
        #[test]
        fn build_is_deterministic(app_seed in "[a-z]{1,12}", hw_seed in "[a-z]{1,12}", with_recovery: bool) {
            let app: AppGlobalAuthPublicKey = test_key(&app_seed);
            let rec: AppRecoveryAuthPublicKey = test_key(&format!("{app_seed}-rec"));
            let hw: HwAuthPublicKey = test_key(&hw_seed);
            let rec = with_recovery.then_some(&rec);

            let a = ChallengeBuilder::build(ChallengeType::Recovery, &app, rec, &hw);
            let b = ChallengeBuilder::build(ChallengeType::Recovery, &app, rec, &hw);
            prop_assert_eq!(a.as_bytes(), b.as_bytes());
            prop_assert_eq!(a.reference(), b.reference());
            prop_assert_eq!(a.reference().len(), 64);
        }
    }
}
