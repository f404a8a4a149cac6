//! Inputs to risk evaluation and the collaborators that provide them.
//!
//! Hardware pairing, cloud backup health and contact methods live outside
//! this workspace. They are read through [`RiskSignalSource`]; the keyset
//! comparison is gathered by the worker from the keybox store and the
//! co-signer.

use async_trait::async_trait;
use keyward_core::{AccountId, KeysetId, KeywardError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// State of the account's cloud backup.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CloudBackupHealth {
    Healthy,
    #[default]
    Missing,
    /// A backup exists but cannot be relied on (stale, unreadable, wrong keys)
    Problem { reason: String },
}

impl CloudBackupHealth {
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactKind {
    Email,
    Phone,
}

/// A channel the co-signer notifies when a recovery starts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactMethod {
    pub kind: ContactKind,
    pub verified: bool,
}

impl ContactMethod {
    pub fn verified(kind: ContactKind) -> Self {
        Self {
            kind,
            verified: true,
        }
    }

    pub fn unverified(kind: ContactKind) -> Self {
        Self {
            kind,
            verified: false,
        }
    }
}

/// Everything the engine looks at.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RiskSignals {
    /// Keyset of the local active keybox, if onboarding finished
    pub local_keyset: Option<KeysetId>,
    /// Latest active keyset reported by the server, if ever fetched
    pub server_keyset: Option<KeysetId>,
    pub hardware_linked: bool,
    pub cloud_backup: CloudBackupHealth,
    pub contact_methods: Vec<ContactMethod>,
}

impl RiskSignals {
    /// True when both keysets are known and differ.
    pub fn keyset_mismatch(&self) -> Option<(&KeysetId, &KeysetId)> {
        match (&self.local_keyset, &self.server_keyset) {
            (Some(local), Some(server)) if local != server => Some((local, server)),
            _ => None,
        }
    }

    pub fn has_critical_contact(&self) -> bool {
        self.contact_methods.iter().any(|method| method.verified)
    }
}

/// Source of the signals that live outside the wallet core.
#[async_trait]
pub trait RiskSignalSource: Send + Sync {
    /// Whether a hardware device is paired with the account.
    async fn hardware_linked(&self, account: &AccountId) -> Result<bool, KeywardError>;

    async fn cloud_backup(&self, account: &AccountId) -> Result<CloudBackupHealth, KeywardError>;

    async fn contact_methods(&self, account: &AccountId)
        -> Result<Vec<ContactMethod>, KeywardError>;
}

#[derive(Debug, Clone, Default)]
struct StaticState {
    hardware_linked: bool,
    cloud_backup: CloudBackupHealth,
    contact_methods: Vec<ContactMethod>,
    /// Set while the source should fail every query
    outage: Option<String>,
}

impl StaticState {
    fn check(&self) -> Result<(), KeywardError> {
        match &self.outage {
            Some(reason) => Err(KeywardError::unavailable(reason.clone())),
            None => Ok(()),
        }
    }
}

/// Fixed answers, changeable at runtime. Backs the CLI and tests.
#[derive(Debug, Default)]
pub struct StaticRiskSignals {
    state: Mutex<StaticState>,
}

impl StaticRiskSignals {
    pub fn new(
        hardware_linked: bool,
        cloud_backup: CloudBackupHealth,
        contact_methods: Vec<ContactMethod>,
    ) -> Self {
        Self {
            state: Mutex::new(StaticState {
                hardware_linked,
                cloud_backup,
                contact_methods,
                outage: None,
            }),
        }
    }

    /// Hardware paired, backup healthy, verified email on file.
    pub fn fully_protected() -> Self {
        Self::new(
            true,
            CloudBackupHealth::Healthy,
            vec![ContactMethod::verified(ContactKind::Email)],
        )
    }

    pub fn set_hardware_linked(&self, linked: bool) {
        self.state.lock().hardware_linked = linked;
    }

    pub fn set_cloud_backup(&self, health: CloudBackupHealth) {
        self.state.lock().cloud_backup = health;
    }

    pub fn set_contact_methods(&self, methods: Vec<ContactMethod>) {
        self.state.lock().contact_methods = methods;
    }

    /// Fail every query with `reason` until cleared with `None`.
    pub fn set_outage(&self, reason: Option<String>) {
        self.state.lock().outage = reason;
    }
}

#[async_trait]
impl RiskSignalSource for StaticRiskSignals {
    async fn hardware_linked(&self, _account: &AccountId) -> Result<bool, KeywardError> {
        let state = self.state.lock();
        state.check()?;
        Ok(state.hardware_linked)
    }

    async fn cloud_backup(&self, _account: &AccountId) -> Result<CloudBackupHealth, KeywardError> {
        let state = self.state.lock();
        state.check()?;
        Ok(state.cloud_backup.clone())
    }

    async fn contact_methods(
        &self,
        _account: &AccountId,
    ) -> Result<Vec<ContactMethod>, KeywardError> {
        let state = self.state.lock();
        state.check()?;
        Ok(state.contact_methods.clone())
    }
}
