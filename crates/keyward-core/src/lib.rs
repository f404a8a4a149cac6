//! # Keyward Core - Layer 1: Foundation
//!
//! Shared vocabulary for the delay-and-notify recovery core of a 2-of-3
//! multisig wallet (app key, hardware key, server-held key).
//!
//! ## What Belongs Here
//!
//! - Identifiers, typed public keys and signatures
//! - Keyset and keybox value types
//! - The unified error type and configuration
//! - Effect trait definitions (time, storage, co-signer, app keys, hardware)
//!
//! ## What Does NOT Belong Here
//!
//! - Effect handler implementations (`keyward-effects`, `keyward-cosigner`)
//! - Recovery and rotation logic (`keyward-recovery`)
//! - Risk evaluation (`keyward-risk`)
//! - Test doubles (`keyward-testkit`)

#![forbid(unsafe_code)]

pub mod config;
pub mod effects;
pub mod errors;
pub mod factor;
pub mod identifiers;
pub mod keybox;
pub mod keys;
pub mod time;

pub use config::{BuildVariant, KeywardConfig, RetryConfig, SyncConfig};
pub use errors::{KeywardError, Result};
pub use factor::PhysicalFactor;
pub use identifiers::{AccountId, ActionId, KeyboxId, KeysetId, LocalKeysetId};
pub use keybox::{AppAuthPublicKeys, BitcoinNetwork, Keybox, SpendingKeyset};
pub use keys::{
    AppFactorProofOfPossession, AppGlobalAuthPublicKey, AppRecoveryAuthPublicKey,
    AppSpendingPublicKey, HwAuthPublicKey, HwFactorProofOfPossession, HwSpendingPublicKey,
    ProofOfPossession, ServerSpendingPublicKey, Signature,
};
pub use time::PhysicalTime;
