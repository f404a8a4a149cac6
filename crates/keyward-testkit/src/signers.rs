//! Fake app keystore and hardware device.

use crate::keys::fake_sign;
use async_trait::async_trait;
use keyward_core::effects::{
    AppKeyEffects, AppKeyError, HardwareError, HardwareSession, HardwareSignedChallenge,
    HardwareSigner,
};
use keyward_core::{
    AccountId, AppGlobalAuthPublicKey, AppRecoveryAuthPublicKey, HwAuthPublicKey,
    HwFactorProofOfPossession, Signature,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// App keystore holding an explicit set of keys. Clones share the set.
#[derive(Debug, Clone, Default)]
pub struct FakeAppKeys {
    known: Arc<Mutex<HashSet<String>>>,
}

impl FakeAppKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_global(self, key: &AppGlobalAuthPublicKey) -> Self {
        self.add_global(key);
        self
    }

    pub fn with_recovery(self, key: &AppRecoveryAuthPublicKey) -> Self {
        self.known.lock().insert(key.as_hex().to_string());
        self
    }

    pub fn add_global(&self, key: &AppGlobalAuthPublicKey) {
        self.known.lock().insert(key.as_hex().to_string());
    }

    /// Forget a key, as if the app was reinstalled.
    pub fn forget(&self, key_hex: &str) {
        self.known.lock().remove(key_hex);
    }

    fn sign(&self, key_hex: &str, message: &[u8]) -> Result<Signature, AppKeyError> {
        if !self.known.lock().contains(key_hex) {
            return Err(AppKeyError::KeyNotFound {
                public_key: key_hex.to_string(),
            });
        }
        Ok(fake_sign(key_hex, message))
    }
}

#[async_trait]
impl AppKeyEffects for FakeAppKeys {
    async fn sign_with_global_auth_key(
        &self,
        key: &AppGlobalAuthPublicKey,
        message: &[u8],
    ) -> Result<Signature, AppKeyError> {
        self.sign(key.as_hex(), message)
    }

    async fn sign_with_recovery_auth_key(
        &self,
        key: &AppRecoveryAuthPublicKey,
        message: &[u8],
    ) -> Result<Signature, AppKeyError> {
        self.sign(key.as_hex(), message)
    }
}

/// Hardware device holding one auth key.
#[derive(Debug, Clone)]
pub struct FakeHardware {
    auth_key: HwAuthPublicKey,
    cancel_next: Arc<AtomicBool>,
    taps: Arc<AtomicUsize>,
}

impl FakeHardware {
    pub fn new(auth_key: HwAuthPublicKey) -> Self {
        Self {
            auth_key,
            cancel_next: Arc::new(AtomicBool::new(false)),
            taps: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn auth_key(&self) -> &HwAuthPublicKey {
        &self.auth_key
    }

    /// The next exchange fails as if the user dismissed the prompt.
    pub fn cancel_next_tap(&self) {
        self.cancel_next.store(true, Ordering::SeqCst);
    }

    /// Number of completed exchanges.
    pub fn taps(&self) -> usize {
        self.taps.load(Ordering::SeqCst)
    }

    fn tap(&self) -> Result<(), HardwareError> {
        if self.cancel_next.swap(false, Ordering::SeqCst) {
            return Err(HardwareError::Canceled);
        }
        self.taps.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl HardwareSigner for FakeHardware {
    async fn sign_challenge(
        &self,
        challenge: &[u8],
        _session: HardwareSession,
    ) -> Result<HardwareSignedChallenge, HardwareError> {
        self.tap()?;
        Ok(HardwareSignedChallenge {
            signature: fake_sign(self.auth_key.as_hex(), challenge),
            hw_auth_key: self.auth_key.clone(),
        })
    }

    async fn prove_possession(
        &self,
        account_id: &AccountId,
        _session: HardwareSession,
    ) -> Result<HwFactorProofOfPossession, HardwareError> {
        self.tap()?;
        Ok(HwFactorProofOfPossession(fake_sign(
            self.auth_key.as_hex(),
            account_id.as_str().as_bytes(),
        )))
    }
}
