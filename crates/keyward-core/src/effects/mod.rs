//! Layer 1: effect trait definitions.
//!
//! Pure trait definitions for every side effect the recovery core performs.
//! This module defines **what** effects exist; handlers in `keyward-effects`,
//! `keyward-cosigner` and `keyward-testkit` define **how**.
//!
//! All effect-using code is parameterized by these traits, which keeps the
//! state machine deterministic under test and lets production swap transports.

pub mod app_keys;
pub mod cosigner;
pub mod hardware;
pub mod storage;
pub mod task;
pub mod time;

pub use app_keys::{AppKeyEffects, AppKeyError};
pub use cosigner::{
    AccountStatus, AuthKeyEffects, CompleteRecoveryRequest, CosignerEffects, CosignerError,
    CreateKeysetRequest, CreatedKeyset, DelayNotifyEffects, DestinationAuthKeys,
    InitiateRecoveryRequest, KeysetEffects, RecoveryNotification, RotateAuthKeysRequest,
    ServerRecovery,
};
pub use hardware::{HardwareError, HardwareSession, HardwareSignedChallenge, HardwareSigner};
pub use storage::{StorageEffects, StorageError};
pub use task::CancellationToken;
pub use time::{PhysicalTimeEffects, TimeError};
