//! # Keyward Risk - Layer 5: Feature Implementation
//!
//! Decides whether an account could lose funds if the user lost a device
//! today, and keeps that answer current in the background.
//!
//! ## Architecture Constraints
//!
//! This crate depends on:
//! - **Layer 1** (keyward-core): identifiers, keyboxes, effect traits
//! - **Layer 5** (keyward-recovery): the keybox store
//!
//! Evaluation is read-only. Nothing here writes to storage or the co-signer.
//!
//! ## Design Principles
//!
//! - [`FundsLostRiskEngine::evaluate`] is a pure function of [`RiskSignals`]
//! - One cause is reported, the most severe that applies
//! - An unknown server keyset is never treated as a mismatch

#![allow(missing_docs)]
#![forbid(unsafe_code)]

pub mod engine;
pub mod error;
pub mod level;
pub mod signals;
pub mod worker;

pub use engine::FundsLostRiskEngine;
pub use error::RiskError;
pub use level::{AtRiskCause, FundsLostRiskLevel};
pub use signals::{
    CloudBackupHealth, ContactKind, ContactMethod, RiskSignalSource, RiskSignals,
    StaticRiskSignals,
};
pub use worker::{FundsLostRiskWorker, RiskEffects};
