//! Keyset and keybox value types.
//!
//! A keybox is immutable once activated. Changing any key produces a new
//! revision with a new [`KeyboxId`]; the previous revision is archived by the
//! keybox store.

use crate::identifiers::{AccountId, KeyboxId, KeysetId, LocalKeysetId};
use crate::keys::{
    AppGlobalAuthPublicKey, AppRecoveryAuthPublicKey, AppSpendingPublicKey, HwAuthPublicKey,
    HwSpendingPublicKey, ServerSpendingPublicKey,
};
use crate::time::PhysicalTime;
use serde::{Deserialize, Serialize};

/// Bitcoin network a keyset is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BitcoinNetwork {
    /// Mainnet
    Bitcoin,
    /// Testnet3
    Testnet,
    /// Signet
    Signet,
    /// Local regtest
    Regtest,
}

/// Spending keyset: the three public keys of the 2-of-3 descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendingKeyset {
    /// Local identifier
    pub local_id: LocalKeysetId,
    /// Server-side keyset identifier
    pub keyset_id: KeysetId,
    /// Network the keyset spends on
    pub network: BitcoinNetwork,
    /// App spending key
    pub app_key: AppSpendingPublicKey,
    /// Hardware spending key
    pub hardware_key: HwSpendingPublicKey,
    /// Server spending key
    pub server_key: ServerSpendingPublicKey,
}

impl SpendingKeyset {
    /// Build a keyset from the server's answer to a create request.
    pub fn from_server(
        keyset_id: KeysetId,
        network: BitcoinNetwork,
        app_key: AppSpendingPublicKey,
        hardware_key: HwSpendingPublicKey,
        server_key: ServerSpendingPublicKey,
    ) -> Self {
        Self {
            local_id: LocalKeysetId::for_server_keyset(&keyset_id),
            keyset_id,
            network,
            app_key,
            hardware_key,
            server_key,
        }
    }
}

/// App authentication public keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppAuthPublicKeys {
    /// Global auth key
    pub app_global_auth: AppGlobalAuthPublicKey,
    /// Recovery auth key, absent on accounts created before it existed
    pub app_recovery_auth: Option<AppRecoveryAuthPublicKey>,
}

/// Active key configuration of an account at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keybox {
    /// Revision identifier
    pub id: KeyboxId,
    /// Owning account
    pub account_id: AccountId,
    /// Spending keyset
    pub spending_keyset: SpendingKeyset,
    /// App auth keys
    pub app_auth_keys: AppAuthPublicKeys,
    /// Hardware auth key
    pub hw_auth_key: HwAuthPublicKey,
    /// When this revision was created
    pub created_at: PhysicalTime,
}

impl Keybox {
    /// Create the first revision of an account's keybox.
    pub fn new(
        account_id: AccountId,
        spending_keyset: SpendingKeyset,
        app_auth_keys: AppAuthPublicKeys,
        hw_auth_key: HwAuthPublicKey,
        created_at: PhysicalTime,
    ) -> Self {
        let id = KeyboxId::derive(
            &account_id,
            created_at.ts_ms,
            spending_keyset.keyset_id.as_str().as_bytes(),
        );
        Self {
            id,
            account_id,
            spending_keyset,
            app_auth_keys,
            hw_auth_key,
            created_at,
        }
    }

    /// New revision with rotated auth keys.
    pub fn with_auth_keys(
        &self,
        app_auth_keys: AppAuthPublicKeys,
        hw_auth_key: HwAuthPublicKey,
        now: PhysicalTime,
    ) -> Self {
        let salt = format!(
            "{}:{}",
            app_auth_keys.app_global_auth.as_hex(),
            hw_auth_key.as_hex()
        );
        Self {
            id: KeyboxId::derive(&self.account_id, now.ts_ms, salt.as_bytes()),
            account_id: self.account_id.clone(),
            spending_keyset: self.spending_keyset.clone(),
            app_auth_keys,
            hw_auth_key,
            created_at: now,
        }
    }

    /// New revision with a replacement spending keyset.
    pub fn with_spending_keyset(&self, spending_keyset: SpendingKeyset, now: PhysicalTime) -> Self {
        Self {
            id: KeyboxId::derive(
                &self.account_id,
                now.ts_ms,
                spending_keyset.keyset_id.as_str().as_bytes(),
            ),
            account_id: self.account_id.clone(),
            spending_keyset,
            app_auth_keys: self.app_auth_keys.clone(),
            hw_auth_key: self.hw_auth_key.clone(),
            created_at: now,
        }
    }

    /// Server keyset id of the active spending keyset.
    pub fn active_keyset_id(&self) -> &KeysetId {
        &self.spending_keyset.keyset_id
    }
}
