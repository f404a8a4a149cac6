//! # Keyward Recovery - Layer 5: Feature Implementation
//!
//! Delay-and-notify recovery of a lost wallet factor, spending keyset
//! rotation and app auth key rotation, all sequenced per account.
//!
//! ## Architecture Constraints
//!
//! This crate depends on:
//! - **Layer 1** (keyward-core): identifiers, keys, keyboxes, effect traits
//!
//! Handlers are injected through [`RecoveryEffects`]; the crate never talks
//! to the network, filesystem or clock directly.
//!
//! ## What Belongs Here
//!
//! - Challenge construction ([`ChallengeBuilder`])
//! - Single-flight command sequencing ([`SyncSequencer`])
//! - Keyset creation and activation ([`KeyRotator`])
//! - Persisted records ([`RecoveryDao`], [`KeyboxDao`], [`AuthKeyRotationAttemptDao`])
//! - The recovery state machine and its sync worker
//! - App auth key rotation ([`AuthKeyRotationService`])
//!
//! ## What Does NOT Belong Here
//!
//! - Transport implementations (`keyward-cosigner`)
//! - Risk evaluation (`keyward-risk`)
//!
//! ## Design Principles
//!
//! - At most one non-terminal recovery attempt per account
//! - Every mutating command runs inside [`SyncSequencer::run`]
//! - Deadlines are compared against the wall clock on every observation
//! - Completion resumes from its last recorded step after a crash

#![allow(missing_docs)]
#![forbid(unsafe_code)]

pub mod attempt;
pub mod auth_rotation;
pub mod challenge;
pub mod dao;
pub mod effects;
pub mod error;
pub mod key_rotation;
pub mod machine;
pub mod retry;
pub mod sequencer;
pub mod sync_worker;

pub use attempt::{
    ArchivedAttempt, AttemptOutcome, AttemptPhase, CompletionProgress, CompletionStep,
    NewSpendingKeys, RecoveryAttempt, RecoveryState,
};
pub use auth_rotation::{AuthKeyRotationService, RotationSettlement};
pub use challenge::{ChallengeBuilder, ChallengeType, DelayNotifyChallenge};
pub use dao::{
    AuthKeyRotationAttemptDao, KeyboxDao, PendingAuthKeyRotation, RecoveryDao, RotationState,
};
pub use effects::RecoveryEffects;
pub use error::{RecoveryError, Result, CONFLICT_USER_MESSAGE};
pub use key_rotation::KeyRotator;
pub use machine::{CancelingFactor, ReconcileOutcome, RecoveryEvent, RecoveryStateMachine};
pub use sequencer::SyncSequencer;
pub use sync_worker::RecoverySyncWorker;
