//! HTTP co-signer client.

use crate::auth::{AccessTokenProvider, AuthScope};
use crate::status::{classify_status, classify_transport};
use async_trait::async_trait;
use keyward_core::config::CosignerConfig;
use keyward_core::effects::{
    AccountStatus, AuthKeyEffects, CompleteRecoveryRequest, CosignerError, CreateKeysetRequest,
    CreatedKeyset, DelayNotifyEffects, InitiateRecoveryRequest, KeysetEffects,
    RecoveryNotification, RotateAuthKeysRequest, ServerRecovery,
};
use keyward_core::{AccountId, ActionId, KeysetId, ProofOfPossession, ServerSpendingPublicKey};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Header carrying the app factor proof of possession.
pub const APP_SIGNATURE_HEADER: &str = "X-App-Signature";
/// Header carrying the hardware factor proof of possession.
pub const HW_SIGNATURE_HEADER: &str = "X-Hw-Signature";

/// Endpoint paths relative to the base URL.
pub mod paths {
    use keyward_core::{AccountId, ActionId, KeysetId};

    pub fn account(account_id: &AccountId) -> String {
        format!("/api/accounts/{account_id}")
    }

    pub fn keysets(account_id: &AccountId) -> String {
        format!("/api/accounts/{account_id}/keysets")
    }

    pub fn activate_keyset(account_id: &AccountId, keyset_id: &KeysetId) -> String {
        format!("/api/accounts/{account_id}/keysets/{keyset_id}/activate")
    }

    pub fn delay_notify(account_id: &AccountId) -> String {
        format!("/api/accounts/{account_id}/delay-notify")
    }

    pub fn complete_delay_notify(account_id: &AccountId) -> String {
        format!("/api/accounts/{account_id}/delay-notify/complete")
    }

    pub fn recovery(account_id: &AccountId) -> String {
        format!("/api/accounts/{account_id}/recovery")
    }

    pub fn authentication_keys(account_id: &AccountId) -> String {
        format!("/api/accounts/{account_id}/authentication-keys")
    }

    pub fn privileged_action(account_id: &AccountId, action_id: &ActionId) -> String {
        format!("/api/accounts/{account_id}/privileged-actions/{action_id}")
    }

    pub fn delay_notify_notification(account_id: &AccountId) -> String {
        format!("/api/accounts/{account_id}/notifications/delay-notify")
    }
}

#[derive(Debug, Deserialize)]
struct CreateKeysetResponse {
    keyset_id: KeysetId,
    server_pubkey: ServerSpendingPublicKey,
}

#[derive(Debug, Deserialize)]
struct ActiveRecoveryResponse {
    #[serde(default)]
    active_recovery: Option<ServerRecovery>,
}

#[derive(Debug, Serialize)]
struct OverrideDelayRequest {
    delay_secs: u64,
}

/// reqwest-backed implementation of the co-signer effect traits.
///
/// Keyset and auth key endpoints authenticate with the global scope token;
/// delay-notify endpoints use the recovery scope.
#[derive(Clone)]
pub struct HttpCosignerClient {
    base_url: String,
    client: reqwest::Client,
    tokens: Arc<dyn AccessTokenProvider>,
}

impl HttpCosignerClient {
    pub fn new(
        config: &CosignerConfig,
        tokens: Arc<dyn AccessTokenProvider>,
    ) -> Result<Self, CosignerError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| CosignerError::network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            tokens,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn request(
        &self,
        method: Method,
        account_id: &AccountId,
        path: &str,
        scope: AuthScope,
        proof: Option<&ProofOfPossession>,
    ) -> Result<RequestBuilder, CosignerError> {
        let token = self.tokens.access_token(account_id, scope).await?;
        let mut builder = self
            .client
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(token);
        if let Some(proof) = proof {
            if let Some(app) = &proof.app {
                builder = builder.header(APP_SIGNATURE_HEADER, app.0.as_hex());
            }
            if let Some(hw) = &proof.hw {
                builder = builder.header(HW_SIGNATURE_HEADER, hw.0.as_hex());
            }
        }
        Ok(builder)
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<reqwest::Response, CosignerError> {
        let response = builder
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let err = classify_status(status.as_u16(), &body);
        tracing::debug!(status = status.as_u16(), error = %err, "co-signer request failed");
        Err(err)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, CosignerError> {
        self.execute(builder)
            .await?
            .json::<T>()
            .await
            .map_err(|e| CosignerError::Serialization {
                message: e.to_string(),
            })
    }

    async fn send_empty(&self, builder: RequestBuilder) -> Result<(), CosignerError> {
        self.execute(builder).await.map(|_| ())
    }
}

impl std::fmt::Debug for HttpCosignerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCosignerClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl KeysetEffects for HttpCosignerClient {
    async fn create_spending_keyset(
        &self,
        account_id: &AccountId,
        request: CreateKeysetRequest,
        proof: &ProofOfPossession,
    ) -> Result<CreatedKeyset, CosignerError> {
        let builder = self
            .request(
                Method::POST,
                account_id,
                &paths::keysets(account_id),
                AuthScope::Global,
                Some(proof),
            )
            .await?
            .json(&request);
        let response: CreateKeysetResponse = self.send_json(builder).await?;
        Ok(CreatedKeyset {
            keyset_id: response.keyset_id,
            server_key: response.server_pubkey,
        })
    }

    async fn activate_spending_keyset(
        &self,
        account_id: &AccountId,
        keyset_id: &KeysetId,
        proof: &ProofOfPossession,
    ) -> Result<(), CosignerError> {
        let builder = self
            .request(
                Method::PUT,
                account_id,
                &paths::activate_keyset(account_id, keyset_id),
                AuthScope::Global,
                Some(proof),
            )
            .await?;
        self.send_empty(builder).await
    }

    async fn account_status(&self, account_id: &AccountId) -> Result<AccountStatus, CosignerError> {
        let builder = self
            .request(
                Method::GET,
                account_id,
                &paths::account(account_id),
                AuthScope::Global,
                None,
            )
            .await?;
        self.send_json(builder).await
    }
}

#[async_trait]
impl DelayNotifyEffects for HttpCosignerClient {
    async fn initiate_delay_notify(
        &self,
        account_id: &AccountId,
        request: InitiateRecoveryRequest,
    ) -> Result<ServerRecovery, CosignerError> {
        let builder = self
            .request(
                Method::POST,
                account_id,
                &paths::delay_notify(account_id),
                AuthScope::Recovery,
                None,
            )
            .await?
            .json(&request);
        self.send_json(builder).await
    }

    async fn active_recovery(
        &self,
        account_id: &AccountId,
    ) -> Result<Option<ServerRecovery>, CosignerError> {
        let builder = self
            .request(
                Method::GET,
                account_id,
                &paths::recovery(account_id),
                AuthScope::Recovery,
                None,
            )
            .await?;
        match self.send_json::<ActiveRecoveryResponse>(builder).await {
            Ok(response) => Ok(response.active_recovery),
            Err(CosignerError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn cancel_delay_notify(
        &self,
        account_id: &AccountId,
        proof: &ProofOfPossession,
    ) -> Result<(), CosignerError> {
        let builder = self
            .request(
                Method::DELETE,
                account_id,
                &paths::delay_notify(account_id),
                AuthScope::Recovery,
                Some(proof),
            )
            .await?;
        self.send_empty(builder).await
    }

    async fn complete_delay_notify(
        &self,
        account_id: &AccountId,
        request: CompleteRecoveryRequest,
    ) -> Result<(), CosignerError> {
        let builder = self
            .request(
                Method::POST,
                account_id,
                &paths::complete_delay_notify(account_id),
                AuthScope::Recovery,
                None,
            )
            .await?
            .json(&request);
        self.send_empty(builder).await
    }

    async fn override_delay(
        &self,
        account_id: &AccountId,
        action_id: &ActionId,
        delay: Duration,
    ) -> Result<ServerRecovery, CosignerError> {
        let builder = self
            .request(
                Method::PUT,
                account_id,
                &paths::privileged_action(account_id, action_id),
                AuthScope::Recovery,
                None,
            )
            .await?
            .json(&OverrideDelayRequest {
                delay_secs: delay.as_secs(),
            });
        self.send_json(builder).await
    }

    async fn notify_opposing_factor(
        &self,
        account_id: &AccountId,
        notification: RecoveryNotification,
    ) -> Result<(), CosignerError> {
        let builder = self
            .request(
                Method::POST,
                account_id,
                &paths::delay_notify_notification(account_id),
                AuthScope::Recovery,
                None,
            )
            .await?
            .json(&notification);
        self.send_empty(builder).await
    }
}

#[async_trait]
impl AuthKeyEffects for HttpCosignerClient {
    async fn rotate_auth_keys(
        &self,
        account_id: &AccountId,
        request: RotateAuthKeysRequest,
    ) -> Result<(), CosignerError> {
        let builder = self
            .request(
                Method::POST,
                account_id,
                &paths::authentication_keys(account_id),
                AuthScope::Global,
                Some(&request.hw_proof),
            )
            .await?
            .json(&request);
        self.send_empty(builder).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenProvider;
    use assert_matches::assert_matches;

    fn account() -> AccountId {
        AccountId::new("urn:wallet-account:01").unwrap()
    }

    #[test]
    fn paths_follow_account_layout() {
        let account = account();
        assert_eq!(
            paths::activate_keyset(&account, &KeysetId::new("ks-2")),
            "/api/accounts/urn:wallet-account:01/keysets/ks-2/activate"
        );
        assert_eq!(
            paths::complete_delay_notify(&account),
            "/api/accounts/urn:wallet-account:01/delay-notify/complete"
        );
        assert_eq!(
            paths::privileged_action(&account, &ActionId("act-9".into())),
            "/api/accounts/urn:wallet-account:01/privileged-actions/act-9"
        );
    }

    #[test]
    fn base_url_is_normalized() {
        let config = CosignerConfig {
            base_url: "https://cosigner.test/".to_string(),
            request_timeout_ms: 1_000,
        };
        let client =
            HttpCosignerClient::new(&config, Arc::new(StaticTokenProvider::new())).unwrap();
        assert_eq!(client.base_url(), "https://cosigner.test");
    }

    #[test]
    fn decodes_wire_responses() {
        let created: CreateKeysetResponse = serde_json::from_str(
            r#"{"keyset_id":"ks-1","server_pubkey":"02a1633cafcc01ebfb6d78e39f687a1f0995c62fc95f51ead10a02ee0be551b5dc"}"#,
        )
        .unwrap();
        assert_eq!(created.keyset_id, KeysetId::new("ks-1"));

        let none: ActiveRecoveryResponse = serde_json::from_str("{}").unwrap();
        assert!(none.active_recovery.is_none());
    }

    #[tokio::test]
    async fn missing_token_fails_before_any_request() {
        let config = CosignerConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            request_timeout_ms: 1_000,
        };
        let client =
            HttpCosignerClient::new(&config, Arc::new(StaticTokenProvider::new())).unwrap();
        assert_matches!(
            client.account_status(&account()).await,
            Err(CosignerError::Unauthorized { .. })
        );
    }
}
