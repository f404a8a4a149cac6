//! Onboarded wallet fixture.

use crate::cosigner::FakeCosigner;
use crate::effects::TestEffects;
use crate::keys::test_key;
use crate::signers::{FakeAppKeys, FakeHardware};
use crate::time::MockTimeHandler;
use keyward_core::effects::DestinationAuthKeys;
use keyward_core::{
    AccountId, AppAuthPublicKeys, AppSpendingPublicKey, BitcoinNetwork, HwSpendingPublicKey,
    Keybox, KeysetId, SpendingKeyset,
};
use std::time::Duration;

/// An account onboarded on the fake server, with one install holding its keys.
///
/// The keybox is not persisted; tests activate it through the keybox store of
/// the crate under test.
#[derive(Debug, Clone)]
pub struct WalletFixture {
    pub account_id: AccountId,
    pub time: MockTimeHandler,
    pub cosigner: FakeCosigner,
    pub hardware: FakeHardware,
    pub keybox: Keybox,
    pub effects: TestEffects,
}

impl WalletFixture {
    pub fn new(default_window: Duration) -> Self {
        Self::with_seed("wallet", default_window)
    }

    pub fn with_seed(seed: &str, default_window: Duration) -> Self {
        let time = MockTimeHandler::default();
        let cosigner = FakeCosigner::new(time.clone(), default_window);
        let account_id =
            AccountId::new(format!("urn:wallet-account:{seed}")).expect("valid account id");

        let auth_keys = AppAuthPublicKeys {
            app_global_auth: test_key(&format!("{seed}/app-global")),
            app_recovery_auth: Some(test_key(&format!("{seed}/app-recovery"))),
        };
        let hardware = FakeHardware::new(test_key(&format!("{seed}/hw-auth")));
        let keyset = SpendingKeyset::from_server(
            KeysetId::new(format!("{seed}-keyset-0")),
            BitcoinNetwork::Signet,
            test_key(&format!("{seed}/app-spending-0")),
            test_key(&format!("{seed}/hw-spending-0")),
            test_key(&format!("{seed}/server-spending-0")),
        );
        cosigner.register_account(
            &account_id,
            keyset.keyset_id.clone(),
            keyset.server_key.clone(),
            auth_keys.clone(),
            hardware.auth_key().clone(),
        );

        let mut app_keys = FakeAppKeys::new().with_global(&auth_keys.app_global_auth);
        if let Some(recovery) = &auth_keys.app_recovery_auth {
            app_keys = app_keys.with_recovery(recovery);
        }
        let keybox = Keybox::new(
            account_id.clone(),
            keyset,
            auth_keys,
            hardware.auth_key().clone(),
            time.now(),
        );
        let effects = TestEffects::new(time.clone(), cosigner.clone(), app_keys);

        Self {
            account_id,
            time,
            cosigner,
            hardware,
            keybox,
            effects,
        }
    }

    /// Fresh app auth keys registered in this fixture's keystore.
    pub fn rotated_app_keys(&self, seed: &str) -> AppAuthPublicKeys {
        let keys = AppAuthPublicKeys {
            app_global_auth: test_key(&format!("{seed}/app-global")),
            app_recovery_auth: Some(test_key(&format!("{seed}/app-recovery"))),
        };
        self.effects.app_keys.add_global(&keys.app_global_auth);
        keys
    }

    /// Destination for a lost-hardware recovery: new app keys in this
    /// install's keystore and a replacement device.
    pub fn lost_hardware_destination(&self, seed: &str) -> (DestinationAuthKeys, FakeHardware) {
        let app_keys = self.rotated_app_keys(seed);
        let hardware = FakeHardware::new(test_key(&format!("{seed}/hw-auth")));
        let destination = DestinationAuthKeys {
            app_global_auth: app_keys.app_global_auth,
            app_recovery_auth: app_keys.app_recovery_auth,
            hw_auth: hardware.auth_key().clone(),
        };
        (destination, hardware)
    }

    /// A fresh install (empty storage) for a lost-app recovery, holding new
    /// app keys and keeping the existing hardware.
    pub fn new_app_install(&self, seed: &str) -> (TestEffects, DestinationAuthKeys) {
        let app_global = test_key(&format!("{seed}/app-global"));
        let app_keys = FakeAppKeys::new().with_global(&app_global);
        let destination = DestinationAuthKeys {
            app_global_auth: app_global,
            app_recovery_auth: None,
            hw_auth: self.hardware.auth_key().clone(),
        };
        (self.effects.other_install(app_keys), destination)
    }
}

/// Spending keys for a replacement keyset.
pub fn spending_keys(seed: &str) -> (AppSpendingPublicKey, HwSpendingPublicKey) {
    (
        test_key(&format!("{seed}/app-spending")),
        test_key(&format!("{seed}/hw-spending")),
    )
}
