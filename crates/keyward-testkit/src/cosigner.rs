//! In-memory co-signer server.
//!
//! Follows the server rules the recovery core relies on:
//!
//! - one active delay-notify recovery per account; a new initiation for the
//!   same lost factor replaces the existing one, an initiation for the other
//!   factor is a conflict
//! - the delay window is stamped from the shared mock clock, honouring the
//!   requested delay
//! - keyset activation and auth key rotation are idempotent
//! - proofs of possession and challenge signatures are checked under the
//!   fake signature scheme
//!
//! Failures can be injected per operation to simulate outages and crashes.

use crate::keys::{fake_verify, test_key};
use crate::time::MockTimeHandler;
use async_trait::async_trait;
use keyward_core::effects::{
    AccountStatus, AuthKeyEffects, CompleteRecoveryRequest, CosignerError, CreateKeysetRequest,
    CreatedKeyset, DelayNotifyEffects, InitiateRecoveryRequest, KeysetEffects,
    RecoveryNotification, RotateAuthKeysRequest, ServerRecovery,
};
use keyward_core::{
    AccountId, ActionId, AppAuthPublicKeys, HwAuthPublicKey, KeysetId, PhysicalFactor,
    ProofOfPossession, ServerSpendingPublicKey,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Co-signer operations, for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CosignerOp {
    CreateKeyset,
    ActivateKeyset,
    AccountStatus,
    InitiateDelayNotify,
    ActiveRecovery,
    CancelDelayNotify,
    CompleteDelayNotify,
    OverrideDelay,
    NotifyOpposingFactor,
    RotateAuthKeys,
}

#[derive(Debug, Clone)]
struct ServerAccount {
    keysets: HashMap<KeysetId, ServerSpendingPublicKey>,
    active_keyset: KeysetId,
    auth_keys: AppAuthPublicKeys,
    hw_auth_key: HwAuthPublicKey,
    recovery: Option<ServerRecovery>,
    notifications: Vec<RecoveryNotification>,
}

#[derive(Debug, Default)]
struct ServerState {
    accounts: HashMap<AccountId, ServerAccount>,
    failures: HashMap<CosignerOp, Vec<CosignerError>>,
    calls: HashMap<CosignerOp, usize>,
    next_id: u64,
}

impl ServerState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn account_mut(&mut self, account_id: &AccountId) -> Result<&mut ServerAccount, CosignerError> {
        self.accounts
            .get_mut(account_id)
            .ok_or_else(|| CosignerError::not_found(format!("account {account_id}")))
    }
}

/// Fake co-signer shared by every install in a test.
#[derive(Debug, Clone)]
pub struct FakeCosigner {
    time: MockTimeHandler,
    default_window: Duration,
    stale_proofs: Arc<AtomicBool>,
    state: Arc<Mutex<ServerState>>,
}

impl FakeCosigner {
    pub fn new(time: MockTimeHandler, default_window: Duration) -> Self {
        Self {
            time,
            default_window,
            stale_proofs: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(ServerState::default())),
        }
    }

    /// Register an onboarded account with its first (active) keyset.
    pub fn register_account(
        &self,
        account_id: &AccountId,
        keyset_id: KeysetId,
        server_key: ServerSpendingPublicKey,
        auth_keys: AppAuthPublicKeys,
        hw_auth_key: HwAuthPublicKey,
    ) {
        let mut keysets = HashMap::new();
        keysets.insert(keyset_id.clone(), server_key);
        self.state.lock().accounts.insert(
            account_id.clone(),
            ServerAccount {
                keysets,
                active_keyset: keyset_id,
                auth_keys,
                hw_auth_key,
                recovery: None,
                notifications: Vec::new(),
            },
        );
    }

    /// Queue `error` for the next call to `op`.
    pub fn fail_next(&self, op: CosignerOp, error: CosignerError) {
        self.fail_times(op, 1, error);
    }

    /// Queue `error` for the next `times` calls to `op`.
    pub fn fail_times(&self, op: CosignerOp, times: usize, error: CosignerError) {
        let mut state = self.state.lock();
        let queue = state.failures.entry(op).or_default();
        queue.extend(std::iter::repeat(error).take(times));
    }

    /// Reject every proof of possession until reset.
    pub fn set_proofs_stale(&self, stale: bool) {
        self.stale_proofs.store(stale, Ordering::SeqCst);
    }

    pub fn calls(&self, op: CosignerOp) -> usize {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn active_keyset(&self, account_id: &AccountId) -> Option<KeysetId> {
        let state = self.state.lock();
        state
            .accounts
            .get(account_id)
            .map(|account| account.active_keyset.clone())
    }

    pub fn recovery(&self, account_id: &AccountId) -> Option<ServerRecovery> {
        let state = self.state.lock();
        state.accounts.get(account_id).and_then(|a| a.recovery.clone())
    }

    pub fn auth_keys(
        &self,
        account_id: &AccountId,
    ) -> Option<(AppAuthPublicKeys, HwAuthPublicKey)> {
        let state = self.state.lock();
        state
            .accounts
            .get(account_id)
            .map(|a| (a.auth_keys.clone(), a.hw_auth_key.clone()))
    }

    pub fn notifications(&self, account_id: &AccountId) -> Vec<RecoveryNotification> {
        let state = self.state.lock();
        state
            .accounts
            .get(account_id)
            .map(|a| a.notifications.clone())
            .unwrap_or_default()
    }

    /// Count the call and pop an injected failure, if any.
    fn enter(
        &self,
        op: CosignerOp,
    ) -> Result<parking_lot::MutexGuard<'_, ServerState>, CosignerError> {
        let mut state = self.state.lock();
        *state.calls.entry(op).or_default() += 1;
        if let Some(queue) = state.failures.get_mut(&op) {
            if !queue.is_empty() {
                return Err(queue.remove(0));
            }
        }
        Ok(state)
    }

    fn check_proof(
        &self,
        account_id: &AccountId,
        proof: &ProofOfPossession,
        app_keys: &[&AppAuthPublicKeys],
        hw_keys: &[&HwAuthPublicKey],
        require_both: bool,
    ) -> Result<(), CosignerError> {
        if self.stale_proofs.load(Ordering::SeqCst) {
            return Err(CosignerError::unauthorized("proof of possession expired"));
        }
        let message = account_id.as_str().as_bytes();
        let app_ok = proof.app.as_ref().map(|app| {
            app_keys
                .iter()
                .any(|keys| fake_verify(keys.app_global_auth.as_hex(), message, &app.0))
        });
        let hw_ok = proof
            .hw
            .as_ref()
            .map(|hw| hw_keys.iter().any(|key| fake_verify(key.as_hex(), message, &hw.0)));

        let valid = match (app_ok, hw_ok) {
            (Some(app), Some(hw)) => app && hw,
            (Some(app), None) => !require_both && app,
            (None, Some(hw)) => !require_both && hw,
            (None, None) => false,
        };
        if valid {
            Ok(())
        } else {
            Err(CosignerError::unauthorized("invalid proof of possession"))
        }
    }
}

fn decode_challenge(hex_str: &str) -> Result<Vec<u8>, CosignerError> {
    hex::decode(hex_str).map_err(|e| CosignerError::Rejected {
        status: 400,
        message: format!("challenge is not hex: {e}"),
    })
}

#[async_trait]
impl KeysetEffects for FakeCosigner {
    async fn create_spending_keyset(
        &self,
        account_id: &AccountId,
        _request: CreateKeysetRequest,
        proof: &ProofOfPossession,
    ) -> Result<CreatedKeyset, CosignerError> {
        let mut state = self.enter(CosignerOp::CreateKeyset)?;
        let (auth_keys, hw_key) = {
            let account = state.account_mut(account_id)?;
            (account.auth_keys.clone(), account.hw_auth_key.clone())
        };
        self.check_proof(account_id, proof, &[&auth_keys], &[&hw_key], true)?;

        let keyset_id = KeysetId::new(format!("keyset-{}", state.next_id()));
        let server_key: ServerSpendingPublicKey = test_key(keyset_id.as_str());
        state
            .account_mut(account_id)?
            .keysets
            .insert(keyset_id.clone(), server_key.clone());
        Ok(CreatedKeyset {
            keyset_id,
            server_key,
        })
    }

    async fn activate_spending_keyset(
        &self,
        account_id: &AccountId,
        keyset_id: &KeysetId,
        proof: &ProofOfPossession,
    ) -> Result<(), CosignerError> {
        let mut state = self.enter(CosignerOp::ActivateKeyset)?;
        let account = state.account_mut(account_id)?;
        let (auth_keys, hw_key) = (account.auth_keys.clone(), account.hw_auth_key.clone());
        self.check_proof(account_id, proof, &[&auth_keys], &[&hw_key], true)?;
        if !account.keysets.contains_key(keyset_id) {
            return Err(CosignerError::not_found(format!("keyset {keyset_id}")));
        }
        account.active_keyset = keyset_id.clone();
        Ok(())
    }

    async fn account_status(&self, account_id: &AccountId) -> Result<AccountStatus, CosignerError> {
        let mut state = self.enter(CosignerOp::AccountStatus)?;
        let account = state.account_mut(account_id)?;
        Ok(AccountStatus {
            account_id: account_id.clone(),
            active_keyset_id: account.active_keyset.clone(),
            auth_keys: account.auth_keys.clone(),
            hw_auth_key: account.hw_auth_key.clone(),
        })
    }
}

#[async_trait]
impl DelayNotifyEffects for FakeCosigner {
    async fn initiate_delay_notify(
        &self,
        account_id: &AccountId,
        request: InitiateRecoveryRequest,
    ) -> Result<ServerRecovery, CosignerError> {
        let mut state = self.enter(CosignerOp::InitiateDelayNotify)?;
        let action_id = ActionId(format!("action-{}", state.next_id()));
        let account = state.account_mut(account_id)?;

        let challenge = decode_challenge(&request.challenge)?;
        // The factor that is not lost signs for the recovery
        let signer_key = match request.lost_factor {
            PhysicalFactor::Hardware => account.auth_keys.app_global_auth.as_hex().to_string(),
            PhysicalFactor::App => account.hw_auth_key.as_hex().to_string(),
        };
        if self.stale_proofs.load(Ordering::SeqCst)
            || !fake_verify(&signer_key, &challenge, &request.challenge_signature)
        {
            return Err(CosignerError::unauthorized(
                "challenge not signed by the opposing factor",
            ));
        }

        if let Some(existing) = &account.recovery {
            if existing.lost_factor != request.lost_factor {
                return Err(CosignerError::conflict(
                    "RECOVERY_ALREADY_EXISTS",
                    format!("a {} recovery is already pending", existing.lost_factor),
                ));
            }
        }

        let delay_start = self.time.now();
        let window = request
            .requested_delay_secs
            .map(Duration::from_secs)
            .unwrap_or(self.default_window);
        let recovery = ServerRecovery {
            account_id: account_id.clone(),
            lost_factor: request.lost_factor,
            delay_start,
            delay_end: delay_start.saturating_add(window),
            destination: request.destination,
            action_id,
        };
        account.recovery = Some(recovery.clone());
        Ok(recovery)
    }

    async fn active_recovery(
        &self,
        account_id: &AccountId,
    ) -> Result<Option<ServerRecovery>, CosignerError> {
        let mut state = self.enter(CosignerOp::ActiveRecovery)?;
        Ok(state.account_mut(account_id)?.recovery.clone())
    }

    async fn cancel_delay_notify(
        &self,
        account_id: &AccountId,
        proof: &ProofOfPossession,
    ) -> Result<(), CosignerError> {
        let mut state = self.enter(CosignerOp::CancelDelayNotify)?;
        let account = state.account_mut(account_id)?;
        let Some(recovery) = account.recovery.clone() else {
            return Err(CosignerError::not_found("no active recovery"));
        };
        // Either the current factors or the recovering party may cancel
        let destination_app = recovery.destination.app_auth_keys();
        self.check_proof(
            account_id,
            proof,
            &[&account.auth_keys, &destination_app],
            &[&account.hw_auth_key, &recovery.destination.hw_auth],
            false,
        )?;
        account.recovery = None;
        Ok(())
    }

    async fn complete_delay_notify(
        &self,
        account_id: &AccountId,
        request: CompleteRecoveryRequest,
    ) -> Result<(), CosignerError> {
        let mut state = self.enter(CosignerOp::CompleteDelayNotify)?;
        let now = self.time.now();
        let account = state.account_mut(account_id)?;
        let Some(recovery) = account.recovery.clone() else {
            return Err(CosignerError::not_found("no active recovery"));
        };
        if !now.has_reached(recovery.delay_end) {
            return Err(CosignerError::Rejected {
                status: 400,
                message: "delay period has not elapsed".to_string(),
            });
        }

        let challenge = decode_challenge(&request.challenge)?;
        let destination = &recovery.destination;
        let app_ok = fake_verify(
            destination.app_global_auth.as_hex(),
            &challenge,
            &request.app_signature,
        );
        let hw_ok = fake_verify(destination.hw_auth.as_hex(), &challenge, &request.hw_signature);
        if self.stale_proofs.load(Ordering::SeqCst) || !app_ok || !hw_ok {
            return Err(CosignerError::unauthorized(
                "completion challenge not signed by the destination keys",
            ));
        }

        account.auth_keys = destination.app_auth_keys();
        account.hw_auth_key = destination.hw_auth.clone();
        account.recovery = None;
        Ok(())
    }

    async fn override_delay(
        &self,
        account_id: &AccountId,
        action_id: &ActionId,
        delay: Duration,
    ) -> Result<ServerRecovery, CosignerError> {
        let mut state = self.enter(CosignerOp::OverrideDelay)?;
        let account = state.account_mut(account_id)?;
        match account.recovery.as_mut() {
            Some(recovery) if &recovery.action_id == action_id => {
                recovery.delay_end = recovery.delay_start.saturating_add(delay);
                Ok(recovery.clone())
            }
            _ => Err(CosignerError::not_found(format!("privileged action {action_id}"))),
        }
    }

    async fn notify_opposing_factor(
        &self,
        account_id: &AccountId,
        notification: RecoveryNotification,
    ) -> Result<(), CosignerError> {
        let mut state = self.enter(CosignerOp::NotifyOpposingFactor)?;
        state
            .account_mut(account_id)?
            .notifications
            .push(notification);
        Ok(())
    }
}

#[async_trait]
impl AuthKeyEffects for FakeCosigner {
    async fn rotate_auth_keys(
        &self,
        account_id: &AccountId,
        request: RotateAuthKeysRequest,
    ) -> Result<(), CosignerError> {
        let mut state = self.enter(CosignerOp::RotateAuthKeys)?;
        let account = state.account_mut(account_id)?;
        if account.auth_keys == request.new_keys {
            return Ok(());
        }
        let (auth_keys, hw_key) = (account.auth_keys.clone(), account.hw_auth_key.clone());
        self.check_proof(account_id, &request.hw_proof, &[&auth_keys], &[&hw_key], true)?;

        let challenge = decode_challenge(&request.challenge)?;
        if !fake_verify(
            request.new_keys.app_global_auth.as_hex(),
            &challenge,
            &request.new_app_signature,
        ) {
            return Err(CosignerError::unauthorized(
                "rotation challenge not signed by the new key",
            ));
        }
        account.auth_keys = request.new_keys;
        Ok(())
    }
}
