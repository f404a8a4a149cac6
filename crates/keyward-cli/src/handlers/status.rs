//! `keyward status`

use anyhow::Result;
use keyward_core::{
    AccountId, BitcoinNetwork, Keybox, KeyboxId, KeysetId, PhysicalTime, RetryConfig,
};
use keyward_recovery::{
    AttemptOutcome, AuthKeyRotationService, ReconcileOutcome, RecoveryEffects, RecoveryState,
    RecoveryStateMachine, RotationState,
};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Serialize)]
pub struct KeyboxSummary {
    pub id: KeyboxId,
    pub keyset_id: KeysetId,
    pub network: BitcoinNetwork,
    pub app_global_auth: String,
    pub hw_auth: String,
    pub created_at: PhysicalTime,
}

impl From<&Keybox> for KeyboxSummary {
    fn from(keybox: &Keybox) -> Self {
        Self {
            id: keybox.id,
            keyset_id: keybox.spending_keyset.keyset_id.clone(),
            network: keybox.spending_keyset.network,
            app_global_auth: keybox.app_auth_keys.app_global_auth.as_hex().to_string(),
            hw_auth: keybox.hw_auth_key.as_hex().to_string(),
            created_at: keybox.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub account: AccountId,
    pub keybox: Option<KeyboxSummary>,
    pub onboarding_keybox: Option<KeyboxId>,
    pub recovery: Option<RecoveryState>,
    /// Set when `--sync` reconciled with the co-signer
    pub reconciled: Option<ReconcileOutcome>,
    pub archived_attempts: Vec<AttemptOutcome>,
    pub pending_rotation: Option<RotationState>,
}

/// Gather the report from local state, reconciling first if `sync` is set.
pub async fn collect<E: RecoveryEffects>(
    machine: &RecoveryStateMachine<E>,
    rotations: &AuthKeyRotationService<E>,
    account: &AccountId,
    sync: bool,
) -> Result<StatusReport> {
    let reconciled = if sync {
        Some(machine.reconcile(account).await?)
    } else {
        None
    };
    let keyboxes = machine.keyboxes();
    Ok(StatusReport {
        account: account.clone(),
        keybox: keyboxes.active(account).await?.as_ref().map(KeyboxSummary::from),
        onboarding_keybox: keyboxes.onboarding(account).await?.map(|keybox| keybox.id),
        recovery: machine.status(account).await?,
        reconciled,
        archived_attempts: machine
            .history(account)
            .await?
            .into_iter()
            .map(|archived| archived.outcome)
            .collect(),
        pending_rotation: rotations.pending(account).await?.map(|pending| pending.state),
    })
}

/// Rotation service for read-only use; it is only asked for pending state.
pub fn rotation_reader<E: RecoveryEffects>(
    machine: &RecoveryStateMachine<E>,
    retry: RetryConfig,
) -> AuthKeyRotationService<E> {
    AuthKeyRotationService::new(machine.effects().clone(), retry, machine.sequencer().clone())
}

fn describe(state: &RecoveryState) -> String {
    match state {
        RecoveryState::Initiated { lost_factor } => {
            format!("initiated, lost {lost_factor}, not yet accepted by the co-signer")
        }
        RecoveryState::Delaying {
            lost_factor,
            delay_end,
            remaining,
        } => format!(
            "delaying, lost {lost_factor}, {}s remaining (ends at {delay_end})",
            remaining.as_secs()
        ),
        RecoveryState::ReadyToComplete {
            lost_factor,
            progress: None,
            ..
        } => format!("ready to complete, lost {lost_factor}"),
        RecoveryState::ReadyToComplete {
            lost_factor,
            progress: Some(step),
            ..
        } => format!("completing, lost {lost_factor}, last step {step:?}"),
        RecoveryState::Completed => "completed".to_string(),
        RecoveryState::Canceled => "canceled".to_string(),
        RecoveryState::Conflicted => "conflicted".to_string(),
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "account           {}", self.account)?;
        match &self.keybox {
            Some(keybox) => writeln!(
                f,
                "keybox            {} (keyset {}, {:?})",
                keybox.id, keybox.keyset_id, keybox.network
            )?,
            None => writeln!(f, "keybox            none")?,
        }
        if let Some(id) = &self.onboarding_keybox {
            writeln!(f, "onboarding        {id}")?;
        }
        match &self.recovery {
            Some(state) => writeln!(f, "recovery          {}", describe(state))?,
            None => writeln!(f, "recovery          none")?,
        }
        if let Some(ReconcileOutcome::SomeoneElseIsRecovering {
            lost_factor,
            delay_end,
        }) = &self.reconciled
        {
            writeln!(
                f,
                "server            recovery of lost {lost_factor} started elsewhere, ends at {delay_end}"
            )?;
        }
        writeln!(f, "past attempts     {}", self.archived_attempts.len())?;
        match self.pending_rotation {
            Some(state) => write!(f, "auth rotation     {state:?}"),
            None => write!(f, "auth rotation     none"),
        }
    }
}
