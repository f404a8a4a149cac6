//! Delay-and-notify recovery state machine.
//!
//! One [`RecoveryAttempt`] per account lives in the active slot of the
//! [`RecoveryDao`]. Every command that changes it runs inside the
//! [`SyncSequencer`], so transitions for an account are totally ordered.
//! `ReadyToComplete` is never stored: it is derived from the wall clock each
//! time the attempt is observed.
//!
//! Completion is a sequence of co-signer calls. The attempt records the last
//! finished step before the next one starts, and a restart resumes from
//! there; every step is idempotent on the server.

use crate::attempt::{
    ArchivedAttempt, AttemptOutcome, AttemptPhase, Completion, CompletionProgress, CompletionStep,
    DelayWindow, NewSpendingKeys, RecoveryAttempt, RecoveryState,
};
use crate::challenge::ChallengeBuilder;
use crate::dao::{KeyboxDao, RecoveryDao};
use crate::effects::RecoveryEffects;
use crate::error::{RecoveryError, Result};
use crate::key_rotation::KeyRotator;
use crate::retry::with_retry;
use crate::sequencer::SyncSequencer;
use keyward_core::effects::{
    CompleteRecoveryRequest, CosignerError, DestinationAuthKeys, HardwareSession, HardwareSigner,
    InitiateRecoveryRequest, RecoveryNotification, ServerRecovery,
};
use keyward_core::{
    AccountId, AppFactorProofOfPossession, BuildVariant, Keybox, KeywardConfig, PhysicalFactor,
    PhysicalTime, ProofOfPossession, RetryConfig,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 64;

/// A state change of an account's recovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryEvent {
    pub account: AccountId,
    pub state: RecoveryState,
}

/// Result of reconciling local state with the co-signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// No recovery anywhere
    Idle,
    /// Our attempt, after reconciliation
    Local(RecoveryState),
    /// The server holds a recovery this install did not start
    SomeoneElseIsRecovering {
        lost_factor: PhysicalFactor,
        delay_end: PhysicalTime,
    },
}

/// Factor authorizing a cancellation.
#[derive(Clone, Copy)]
pub enum CancelingFactor<'a> {
    /// This install's app key
    App,
    /// A hardware device held by the user
    Hardware(&'a dyn HardwareSigner),
}

/// Drives recovery attempts for accounts on this install.
pub struct RecoveryStateMachine<E: RecoveryEffects> {
    effects: Arc<E>,
    build_variant: BuildVariant,
    delay_window: Duration,
    retry: RetryConfig,
    sequencer: Arc<SyncSequencer>,
    recoveries: RecoveryDao<E>,
    keyboxes: KeyboxDao<E>,
    rotator: KeyRotator<E>,
    events: broadcast::Sender<RecoveryEvent>,
}

impl<E: RecoveryEffects> RecoveryStateMachine<E> {
    pub fn new(effects: Arc<E>, config: &KeywardConfig, sequencer: Arc<SyncSequencer>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            recoveries: RecoveryDao::new(effects.clone()),
            keyboxes: KeyboxDao::new(effects.clone()),
            rotator: KeyRotator::new(effects.clone(), config.retry.clone()),
            effects,
            build_variant: config.build_variant,
            delay_window: config.effective_delay_window(),
            retry: config.retry.clone(),
            sequencer,
            events,
        }
    }

    pub fn effects(&self) -> &Arc<E> {
        &self.effects
    }

    /// Sequencer to share with other services for the same process.
    pub fn sequencer(&self) -> &Arc<SyncSequencer> {
        &self.sequencer
    }

    /// Keybox store backing this machine.
    pub fn keyboxes(&self) -> &KeyboxDao<E> {
        &self.keyboxes
    }

    /// Receive every state change from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RecoveryEvent> {
        self.events.subscribe()
    }

    /// Current state of the active attempt, derived at the current time.
    pub async fn status(&self, account: &AccountId) -> Result<Option<RecoveryState>> {
        let Some(attempt) = self.recoveries.get(account).await? else {
            return Ok(None);
        };
        let now = self.now().await?;
        Ok(Some(attempt.state_at(now)))
    }

    /// Finished attempts, oldest first.
    pub async fn history(&self, account: &AccountId) -> Result<Vec<ArchivedAttempt>> {
        self.recoveries.archived(account).await
    }

    /// Start a recovery of `lost_factor`.
    ///
    /// The factor that is not lost signs the challenge: the app's current
    /// global auth key for a lost hardware device, `hardware` for a lost app.
    pub async fn initiate(
        &self,
        account: &AccountId,
        lost_factor: PhysicalFactor,
        destination: DestinationAuthKeys,
        hardware: Option<&dyn HardwareSigner>,
    ) -> Result<RecoveryState> {
        self.sequencer
            .run(account, || {
                self.initiate_locked(account, lost_factor, destination, hardware)
            })
            .await
    }

    /// Bring the local attempt in line with the server.
    pub async fn reconcile(&self, account: &AccountId) -> Result<ReconcileOutcome> {
        self.sequencer
            .run(account, || self.reconcile_locked(account))
            .await
    }

    /// Complete a recovery whose delay has elapsed, or resume an interrupted
    /// completion. `hardware` must hold the destination hardware auth key.
    pub async fn complete(
        &self,
        account: &AccountId,
        hardware: &dyn HardwareSigner,
        spending: NewSpendingKeys,
    ) -> Result<RecoveryState> {
        self.sequencer
            .run(account, || self.complete_locked(account, hardware, spending))
            .await
    }

    /// Cancel the active attempt before its completion reaches the server.
    pub async fn cancel(
        &self,
        account: &AccountId,
        factor: CancelingFactor<'_>,
    ) -> Result<RecoveryState> {
        self.sequencer
            .run(account, || self.cancel_locked(account, factor))
            .await
    }

    /// Shorten or extend the delay of the active attempt. Not available in
    /// customer builds.
    pub async fn override_delay(
        &self,
        account: &AccountId,
        delay: Duration,
    ) -> Result<RecoveryState> {
        if !self.build_variant.allows_delay_override() {
            tracing::warn!(account = %account, "delay override refused in customer build");
            return Err(RecoveryError::invalid_state(
                "delay override is not available in customer builds",
            ));
        }
        self.sequencer
            .run(account, || self.override_delay_locked(account, delay))
            .await
    }

    async fn initiate_locked(
        &self,
        account: &AccountId,
        lost_factor: PhysicalFactor,
        destination: DestinationAuthKeys,
        hardware: Option<&dyn HardwareSigner>,
    ) -> Result<RecoveryState> {
        if self.recoveries.get(account).await?.is_some() {
            return Err(RecoveryError::AttemptInProgress {
                account: account.clone(),
            });
        }

        let challenge = ChallengeBuilder::for_destination(&destination);
        let challenge_signature = match lost_factor {
            PhysicalFactor::Hardware => {
                let keybox = self.keyboxes.active(account).await?.ok_or_else(|| {
                    RecoveryError::invalid_state(
                        "recovering the hardware requires the app's active keybox",
                    )
                })?;
                self.effects
                    .sign_with_global_auth_key(
                        &keybox.app_auth_keys.app_global_auth,
                        challenge.as_bytes(),
                    )
                    .await?
            }
            PhysicalFactor::App => {
                let hardware = hardware.ok_or_else(|| {
                    RecoveryError::invalid_state("recovering the app requires the hardware")
                })?;
                hardware
                    .sign_challenge(challenge.as_bytes(), HardwareSession::default())
                    .await?
                    .signature
            }
        };

        let now = self.now().await?;
        let attempt = RecoveryAttempt {
            account_id: account.clone(),
            lost_factor,
            destination,
            challenge_ref: challenge.reference(),
            challenge_signature,
            requested_delay_secs: Some(self.delay_window.as_secs()),
            phase: AttemptPhase::Initiated,
            ready_notified: false,
            created_at: now,
        };
        self.recoveries.insert_new(&attempt).await?;
        tracing::info!(account = %account, factor = ?lost_factor, "recovery initiated");
        self.publish(account, attempt.state_at(now));

        self.submit(attempt).await
    }

    /// Send an `Initiated` attempt to the server.
    async fn submit(&self, attempt: RecoveryAttempt) -> Result<RecoveryState> {
        let account = attempt.account_id.clone();
        let request = InitiateRecoveryRequest {
            lost_factor: attempt.lost_factor,
            destination: attempt.destination.clone(),
            challenge: ChallengeBuilder::for_destination(&attempt.destination).to_hex(),
            challenge_signature: attempt.challenge_signature.clone(),
            requested_delay_secs: attempt.requested_delay_secs,
        };

        let submitted = with_retry(&*self.effects, &self.retry, "initiate_delay_notify", || {
            self.effects.initiate_delay_notify(&account, request.clone())
        })
        .await;

        match submitted {
            Ok(server) => self.enter_delaying(attempt, &server).await,
            Err(err @ CosignerError::Network { .. }) => {
                tracing::warn!(
                    account = %account,
                    error = %err,
                    "recovery not yet accepted by the server; will resubmit"
                );
                Err(err.into())
            }
            Err(CosignerError::Conflict { code, message }) => {
                let reason = format!("server refused the recovery ({code}: {message})");
                self.conflicted(attempt, &reason).await?;
                Err(RecoveryError::conflict(reason))
            }
            Err(err) => {
                // The server never accepted it; nothing to cancel remotely
                self.recoveries.remove(&account).await?;
                tracing::warn!(account = %account, error = %err, "recovery rejected by the server");
                Err(err.into())
            }
        }
    }

    async fn enter_delaying(
        &self,
        mut attempt: RecoveryAttempt,
        server: &ServerRecovery,
    ) -> Result<RecoveryState> {
        attempt.phase = AttemptPhase::Delaying {
            window: DelayWindow::from(server),
        };
        self.recoveries.update(&attempt).await?;

        let account = &attempt.account_id;
        tracing::info!(
            account = %account,
            factor = ?attempt.lost_factor,
            delay_end = %server.delay_end,
            "recovery accepted, delay started"
        );
        let state = attempt.state_at(self.now().await?);
        self.publish(account, state.clone());
        self.notify(
            account,
            RecoveryNotification::RecoveryInitiated {
                lost_factor: attempt.lost_factor,
                delay_end: server.delay_end,
            },
        )
        .await;
        Ok(state)
    }

    async fn reconcile_locked(&self, account: &AccountId) -> Result<ReconcileOutcome> {
        let local = self.recoveries.get(account).await?;
        let server = with_retry(&*self.effects, &self.retry, "active_recovery", || {
            self.effects.active_recovery(account)
        })
        .await?;

        let Some(attempt) = local else {
            return Ok(match server {
                None => ReconcileOutcome::Idle,
                Some(server) => {
                    tracing::info!(
                        account = %account,
                        factor = ?server.lost_factor,
                        "server holds a recovery not started here"
                    );
                    ReconcileOutcome::SomeoneElseIsRecovering {
                        lost_factor: server.lost_factor,
                        delay_end: server.delay_end,
                    }
                }
            });
        };

        if let AttemptPhase::Completing { .. } = attempt.phase {
            return self.run_completion(attempt).await.map(ReconcileOutcome::Local);
        }
        let initiated = matches!(attempt.phase, AttemptPhase::Initiated);

        let state = match server {
            Some(server) if attempt.matches(&server) => {
                if initiated {
                    self.enter_delaying(attempt, &server).await?
                } else {
                    self.refresh_delay(attempt, &server).await?
                }
            }
            Some(_) => {
                self.conflicted(attempt, "server holds a recovery with other destination keys")
                    .await?
            }
            None if initiated => self.submit(attempt).await?,
            None => {
                tracing::info!(account = %account, "recovery no longer on the server");
                self.finish(attempt, AttemptOutcome::Canceled).await?
            }
        };
        Ok(ReconcileOutcome::Local(state))
    }

    async fn refresh_delay(
        &self,
        mut attempt: RecoveryAttempt,
        server: &ServerRecovery,
    ) -> Result<RecoveryState> {
        let now = self.now().await?;
        let before = attempt.state_at(now);
        let window = DelayWindow::from(server);
        let mut changed = attempt.window() != Some(&window);
        attempt.phase = AttemptPhase::Delaying { window };

        if now.has_reached(server.delay_end) && !attempt.ready_notified {
            self.notify(
                &attempt.account_id,
                RecoveryNotification::RecoveryReadyToComplete {
                    lost_factor: attempt.lost_factor,
                },
            )
            .await;
            attempt.ready_notified = true;
            changed = true;
        }
        if changed {
            self.recoveries.update(&attempt).await?;
        }

        let state = attempt.state_at(now);
        if state != before {
            tracing::debug!(
                account = %attempt.account_id,
                state = ?state,
                "recovery state refreshed"
            );
            self.publish(&attempt.account_id, state.clone());
        }
        Ok(state)
    }

    async fn complete_locked(
        &self,
        account: &AccountId,
        hardware: &dyn HardwareSigner,
        spending: NewSpendingKeys,
    ) -> Result<RecoveryState> {
        let mut attempt =
            self.recoveries
                .get(account)
                .await?
                .ok_or_else(|| RecoveryError::NoActiveAttempt {
                    account: account.clone(),
                })?;
        let now = self.now().await?;

        match attempt.phase.clone() {
            AttemptPhase::Initiated => Err(RecoveryError::invalid_state(
                "recovery has not been accepted by the server yet",
            )),
            AttemptPhase::Delaying { window } => {
                if !now.has_reached(window.delay_end) {
                    return Err(RecoveryError::DelayNotElapsed {
                        remaining: now.until(window.delay_end),
                    });
                }

                let server = with_retry(&*self.effects, &self.retry, "active_recovery", || {
                    self.effects.active_recovery(account)
                })
                .await?;
                match server {
                    None => {
                        tracing::info!(account = %account, "recovery was canceled before completion");
                        return self.finish(attempt, AttemptOutcome::Canceled).await;
                    }
                    Some(server) if !attempt.matches(&server) => {
                        let reason = "server holds a recovery with other destination keys";
                        self.conflicted(attempt, reason).await?;
                        return Err(RecoveryError::conflict(reason));
                    }
                    Some(server) if !now.has_reached(server.delay_end) => {
                        // Server extended the delay since we last looked
                        attempt.phase = AttemptPhase::Delaying {
                            window: DelayWindow::from(&server),
                        };
                        self.recoveries.update(&attempt).await?;
                        return Err(RecoveryError::DelayNotElapsed {
                            remaining: now.until(server.delay_end),
                        });
                    }
                    Some(_) => {}
                }

                let challenge = ChallengeBuilder::for_destination(&attempt.destination);
                let app_signature = self
                    .effects
                    .sign_with_global_auth_key(
                        &attempt.destination.app_global_auth,
                        challenge.as_bytes(),
                    )
                    .await?;
                let signed = hardware
                    .sign_challenge(challenge.as_bytes(), HardwareSession::default())
                    .await?;
                if signed.hw_auth_key != attempt.destination.hw_auth {
                    return Err(RecoveryError::invalid_state(
                        "hardware does not hold the destination auth key",
                    ));
                }
                let hw_proof = hardware
                    .prove_possession(account, HardwareSession::default())
                    .await?;

                attempt.phase = AttemptPhase::Completing {
                    window,
                    completion: Completion {
                        progress: CompletionProgress::AttemptingCompletion {
                            challenge: challenge.to_hex(),
                            app_signature,
                            hw_signature: signed.signature,
                        },
                        spending,
                        hw_proof,
                    },
                };
                self.recoveries.update(&attempt).await?;
                tracing::info!(account = %account, "recovery completion started");
                self.publish(account, attempt.state_at(now));
                self.run_completion(attempt).await
            }
            AttemptPhase::Completing { completion, .. } => {
                if completion.spending != spending {
                    tracing::debug!(
                        account = %account,
                        "resuming completion with the spending keys recorded at its start"
                    );
                }
                let hw_proof = hardware
                    .prove_possession(account, HardwareSession::default())
                    .await?;
                if let AttemptPhase::Completing { completion, .. } = &mut attempt.phase {
                    completion.hw_proof = hw_proof;
                }
                self.recoveries.update(&attempt).await?;
                tracing::info!(
                    account = %account,
                    step = ?completion.progress.step(),
                    "resuming recovery completion"
                );
                self.run_completion(attempt).await
            }
        }
    }

    /// Run completion steps from the recorded one to the end.
    async fn run_completion(&self, mut attempt: RecoveryAttempt) -> Result<RecoveryState> {
        let account = attempt.account_id.clone();
        loop {
            let AttemptPhase::Completing { completion, .. } = &attempt.phase else {
                return Err(RecoveryError::invariant(
                    "completion resumed outside the completing phase",
                ));
            };
            let Completion {
                progress,
                spending,
                hw_proof,
            } = completion.clone();
            let destination = attempt.destination.clone();

            let next = match progress {
                CompletionProgress::AttemptingCompletion {
                    challenge,
                    app_signature,
                    hw_signature,
                } => {
                    let server = with_retry(&*self.effects, &self.retry, "active_recovery", || {
                        self.effects.active_recovery(&account)
                    })
                    .await?;
                    match server {
                        Some(server) if !attempt.matches(&server) => {
                            let reason = "server holds a recovery with other destination keys";
                            self.conflicted(attempt, reason).await?;
                            return Err(RecoveryError::conflict(reason));
                        }
                        Some(_) => {
                            let request = CompleteRecoveryRequest {
                                challenge,
                                app_signature,
                                hw_signature,
                            };
                            let completed = with_retry(
                                &*self.effects,
                                &self.retry,
                                "complete_delay_notify",
                                || self.effects.complete_delay_notify(&account, request.clone()),
                            )
                            .await;
                            match completed {
                                Ok(()) | Err(CosignerError::NotFound { .. }) => {}
                                Err(err @ CosignerError::Conflict { .. }) => {
                                    return self.abandon_conflicted(attempt, err.into()).await;
                                }
                                Err(err) => return Err(err.into()),
                            }
                        }
                        None => {
                            tracing::debug!(
                                account = %account,
                                "no server recovery left; completion already applied"
                            );
                        }
                    }
                    CompletionProgress::CompletedServerRecovery
                }
                CompletionProgress::CompletedServerRecovery => {
                    let status = with_retry(&*self.effects, &self.retry, "account_status", || {
                        self.effects.account_status(&account)
                    })
                    .await?;
                    if status.auth_keys != destination.app_auth_keys()
                        || status.hw_auth_key != destination.hw_auth
                    {
                        let reason = "server auth keys differ from the recovery destination";
                        self.conflicted(attempt, reason).await?;
                        return Err(RecoveryError::conflict(reason));
                    }
                    if self.keyboxes.active(&account).await?.is_some() {
                        let now = self.now().await?;
                        self.keyboxes
                            .rotate_keybox_auth_keys(
                                &account,
                                destination.app_auth_keys(),
                                destination.hw_auth.clone(),
                                now,
                            )
                            .await?;
                    }
                    CompletionProgress::RotatedAuthKeys
                }
                CompletionProgress::RotatedAuthKeys => {
                    let created = self
                        .rotator
                        .create_spending_keyset(
                            &account,
                            &destination.app_global_auth,
                            &hw_proof,
                            &spending.app_spending,
                            &spending.hw_spending,
                            spending.network,
                        )
                        .await;
                    match created {
                        Ok(keyset) => CompletionProgress::CreatedSpendingKeyset { keyset },
                        Err(err @ RecoveryError::Conflict { .. }) => {
                            return self.abandon_conflicted(attempt, err).await;
                        }
                        Err(err) => return Err(err),
                    }
                }
                CompletionProgress::CreatedSpendingKeyset { keyset } => {
                    let activated = self
                        .rotator
                        .activate_spending_keyset(
                            &account,
                            &keyset,
                            &destination.app_global_auth,
                            &hw_proof,
                        )
                        .await;
                    match activated {
                        Ok(()) => CompletionProgress::ActivatedSpendingKeyset { keyset },
                        Err(err @ RecoveryError::Conflict { .. }) => {
                            return self.abandon_conflicted(attempt, err).await;
                        }
                        Err(err) => return Err(err),
                    }
                }
                CompletionProgress::ActivatedSpendingKeyset { keyset } => {
                    let now = self.now().await?;
                    let auth_keys = destination.app_auth_keys();
                    let current = self.keyboxes.active(&account).await?;
                    let up_to_date = current.is_some_and(|keybox| {
                        keybox.spending_keyset == keyset
                            && keybox.app_auth_keys == auth_keys
                            && keybox.hw_auth_key == destination.hw_auth
                    });
                    if !up_to_date {
                        let keybox = Keybox::new(
                            account.clone(),
                            keyset,
                            auth_keys,
                            destination.hw_auth.clone(),
                            now,
                        );
                        self.keyboxes.activate(&keybox).await?;
                    }
                    tracing::info!(account = %account, "recovery completed");
                    return self.finish(attempt, AttemptOutcome::Completed).await;
                }
            };

            tracing::debug!(account = %account, step = ?next.step(), "completion step recorded");
            if let AttemptPhase::Completing { completion, .. } = &mut attempt.phase {
                completion.progress = next;
            }
            self.recoveries.update(&attempt).await?;
            let now = self.now().await?;
            self.publish(&account, attempt.state_at(now));
        }
    }

    async fn cancel_locked(
        &self,
        account: &AccountId,
        factor: CancelingFactor<'_>,
    ) -> Result<RecoveryState> {
        let attempt =
            self.recoveries
                .get(account)
                .await?
                .ok_or_else(|| RecoveryError::NoActiveAttempt {
                    account: account.clone(),
                })?;

        let step = match &attempt.phase {
            AttemptPhase::Completing { completion, .. } => Some(completion.progress.step()),
            _ => None,
        };
        if step.is_some_and(|step| step != CompletionStep::AttemptingCompletion) {
            return Err(RecoveryError::invalid_state(
                "completion already reached the server and can no longer be canceled",
            ));
        }

        let proof = match factor {
            CancelingFactor::App => {
                let key = match self.keyboxes.active(account).await? {
                    Some(keybox) => keybox.app_auth_keys.app_global_auth,
                    None => attempt.destination.app_global_auth.clone(),
                };
                let signature = self
                    .effects
                    .sign_with_global_auth_key(&key, account.as_str().as_bytes())
                    .await?;
                ProofOfPossession::app(AppFactorProofOfPossession(signature))
            }
            CancelingFactor::Hardware(hardware) => ProofOfPossession::hardware(
                hardware
                    .prove_possession(account, HardwareSession::default())
                    .await?,
            ),
        };

        let canceled = with_retry(&*self.effects, &self.retry, "cancel_delay_notify", || {
            self.effects.cancel_delay_notify(account, &proof)
        })
        .await;
        match canceled {
            Ok(()) => {}
            Err(CosignerError::NotFound { .. }) if step.is_none() => {
                tracing::debug!(account = %account, "no server recovery to cancel");
            }
            Err(CosignerError::NotFound { .. }) => {
                return Err(RecoveryError::invalid_state(
                    "completion may already have been applied; reconcile instead",
                ));
            }
            Err(err) => return Err(err.into()),
        }

        tracing::info!(account = %account, factor = ?attempt.lost_factor, "recovery canceled");
        self.finish(attempt, AttemptOutcome::Canceled).await
    }

    async fn override_delay_locked(
        &self,
        account: &AccountId,
        delay: Duration,
    ) -> Result<RecoveryState> {
        let mut attempt =
            self.recoveries
                .get(account)
                .await?
                .ok_or_else(|| RecoveryError::NoActiveAttempt {
                    account: account.clone(),
                })?;
        let AttemptPhase::Delaying { window } = &attempt.phase else {
            return Err(RecoveryError::invalid_state(
                "the delay can only be overridden while delaying",
            ));
        };
        let action_id = window.action_id.clone();

        let server = with_retry(&*self.effects, &self.retry, "override_delay", || {
            self.effects.override_delay(account, &action_id, delay)
        })
        .await?;
        attempt.phase = AttemptPhase::Delaying {
            window: DelayWindow::from(&server),
        };
        self.recoveries.update(&attempt).await?;

        tracing::info!(
            account = %account,
            delay_secs = delay.as_secs(),
            delay_end = %server.delay_end,
            "recovery delay overridden"
        );
        let state = attempt.state_at(self.now().await?);
        self.publish(account, state.clone());
        Ok(state)
    }

    async fn conflicted(&self, attempt: RecoveryAttempt, reason: &str) -> Result<RecoveryState> {
        tracing::warn!(account = %attempt.account_id, reason, "recovery conflicted");
        self.finish(attempt, AttemptOutcome::Conflicted).await
    }

    /// Conflicts are final: archive the attempt and hand `err` back.
    async fn abandon_conflicted(
        &self,
        attempt: RecoveryAttempt,
        err: RecoveryError,
    ) -> Result<RecoveryState> {
        self.conflicted(attempt, &err.to_string()).await?;
        Err(err)
    }

    async fn finish(
        &self,
        attempt: RecoveryAttempt,
        outcome: AttemptOutcome,
    ) -> Result<RecoveryState> {
        let account = attempt.account_id.clone();
        let now = self.now().await?;
        self.recoveries.archive(attempt, outcome, now).await?;
        let state = RecoveryState::from(outcome);
        self.publish(&account, state.clone());
        Ok(state)
    }

    async fn notify(&self, account: &AccountId, notification: RecoveryNotification) {
        if let Err(err) = self
            .effects
            .notify_opposing_factor(account, notification)
            .await
        {
            tracing::warn!(account = %account, error = %err, "failed to notify opposing factor");
        }
    }

    fn publish(&self, account: &AccountId, state: RecoveryState) {
        // No subscribers is fine
        let _ = self.events.send(RecoveryEvent {
            account: account.clone(),
            state,
        });
    }

    async fn now(&self) -> Result<PhysicalTime> {
        Ok(self.effects.physical_time().await?)
    }
}
