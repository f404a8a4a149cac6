//! Recovery attempt records and the states observed from them.

use keyward_core::effects::{DestinationAuthKeys, ServerRecovery};
use keyward_core::{
    AccountId, ActionId, AppSpendingPublicKey, BitcoinNetwork, HwFactorProofOfPossession,
    HwSpendingPublicKey, PhysicalFactor, PhysicalTime, Signature, SpendingKeyset,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Spending keys for the keyset created when a recovery completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSpendingKeys {
    pub network: BitcoinNetwork,
    pub app_spending: AppSpendingPublicKey,
    pub hw_spending: HwSpendingPublicKey,
}

/// Server-stamped delay window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayWindow {
    pub delay_start: PhysicalTime,
    pub delay_end: PhysicalTime,
    pub action_id: ActionId,
}

impl From<&ServerRecovery> for DelayWindow {
    fn from(recovery: &ServerRecovery) -> Self {
        Self {
            delay_start: recovery.delay_start,
            delay_end: recovery.delay_end,
            action_id: recovery.action_id.clone(),
        }
    }
}

/// Completion steps, each persisted before the next one starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum CompletionProgress {
    /// Signed completion request built; may or may not have reached the server
    AttemptingCompletion {
        challenge: String,
        app_signature: Signature,
        hw_signature: Signature,
    },
    /// Server switched the account to the destination auth keys
    CompletedServerRecovery,
    /// Local auth keys match the server
    RotatedAuthKeys,
    /// Replacement keyset exists on the server but is not active
    CreatedSpendingKeyset { keyset: SpendingKeyset },
    /// Replacement keyset is active on the server
    ActivatedSpendingKeyset { keyset: SpendingKeyset },
}

impl CompletionProgress {
    pub fn step(&self) -> CompletionStep {
        match self {
            Self::AttemptingCompletion { .. } => CompletionStep::AttemptingCompletion,
            Self::CompletedServerRecovery => CompletionStep::CompletedServerRecovery,
            Self::RotatedAuthKeys => CompletionStep::RotatedAuthKeys,
            Self::CreatedSpendingKeyset { .. } => CompletionStep::CreatedSpendingKeyset,
            Self::ActivatedSpendingKeyset { .. } => CompletionStep::ActivatedSpendingKeyset,
        }
    }
}

/// Data-free view of [`CompletionProgress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStep {
    AttemptingCompletion,
    CompletedServerRecovery,
    RotatedAuthKeys,
    CreatedSpendingKeyset,
    ActivatedSpendingKeyset,
}

/// Material needed to finish a completion after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub progress: CompletionProgress,
    pub spending: NewSpendingKeys,
    /// Hardware proof captured at completion time; refreshed on every
    /// `complete` call and rejected by the server once stale
    pub hw_proof: HwFactorProofOfPossession,
}

/// Persisted phase of a non-terminal attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum AttemptPhase {
    /// Persisted locally; the server may not have it yet
    Initiated,
    /// Accepted by the server; waiting out the delay
    Delaying { window: DelayWindow },
    /// Completion in progress
    Completing {
        window: DelayWindow,
        completion: Completion,
    },
}

/// The single active recovery attempt of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryAttempt {
    pub account_id: AccountId,
    pub lost_factor: PhysicalFactor,
    pub destination: DestinationAuthKeys,
    pub challenge_ref: String,
    /// Opposing factor's signature over the initiation challenge, kept so an
    /// unsubmitted attempt can be resubmitted after a restart
    pub challenge_signature: Signature,
    pub requested_delay_secs: Option<u64>,
    pub phase: AttemptPhase,
    #[serde(default)]
    pub ready_notified: bool,
    pub created_at: PhysicalTime,
}

impl RecoveryAttempt {
    pub fn window(&self) -> Option<&DelayWindow> {
        match &self.phase {
            AttemptPhase::Initiated => None,
            AttemptPhase::Delaying { window } | AttemptPhase::Completing { window, .. } => {
                Some(window)
            }
        }
    }

    /// Whether `server` is this attempt as the co-signer sees it.
    pub fn matches(&self, server: &ServerRecovery) -> bool {
        server.lost_factor == self.lost_factor && server.destination == self.destination
    }

    /// Observable state at `now`.
    pub fn state_at(&self, now: PhysicalTime) -> RecoveryState {
        match &self.phase {
            AttemptPhase::Initiated => RecoveryState::Initiated {
                lost_factor: self.lost_factor,
            },
            AttemptPhase::Delaying { window } if !now.has_reached(window.delay_end) => {
                RecoveryState::Delaying {
                    lost_factor: self.lost_factor,
                    delay_end: window.delay_end,
                    remaining: now.until(window.delay_end),
                }
            }
            AttemptPhase::Delaying { window } => RecoveryState::ReadyToComplete {
                lost_factor: self.lost_factor,
                delay_end: window.delay_end,
                progress: None,
            },
            AttemptPhase::Completing { window, completion } => RecoveryState::ReadyToComplete {
                lost_factor: self.lost_factor,
                delay_end: window.delay_end,
                progress: Some(completion.progress.step()),
            },
        }
    }
}

/// Recovery state as observed by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RecoveryState {
    Initiated {
        lost_factor: PhysicalFactor,
    },
    Delaying {
        lost_factor: PhysicalFactor,
        delay_end: PhysicalTime,
        remaining: Duration,
    },
    /// Delay elapsed; `progress` is set once completion has started
    ReadyToComplete {
        lost_factor: PhysicalFactor,
        delay_end: PhysicalTime,
        progress: Option<CompletionStep>,
    },
    Completed,
    Canceled,
    Conflicted,
}

impl RecoveryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Canceled | Self::Conflicted)
    }
}

/// How an archived attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Completed,
    Canceled,
    Conflicted,
}

impl From<AttemptOutcome> for RecoveryState {
    fn from(outcome: AttemptOutcome) -> Self {
        match outcome {
            AttemptOutcome::Completed => RecoveryState::Completed,
            AttemptOutcome::Canceled => RecoveryState::Canceled,
            AttemptOutcome::Conflicted => RecoveryState::Conflicted,
        }
    }
}

/// Attempt moved out of the active slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedAttempt {
    pub attempt: RecoveryAttempt,
    pub outcome: AttemptOutcome,
    pub archived_at: PhysicalTime,
}
