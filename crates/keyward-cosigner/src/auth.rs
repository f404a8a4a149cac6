//! Access tokens for co-signer requests.
//!
//! The co-signer issues one bearer token per account and auth scope. Token
//! acquisition (the challenge/response login) belongs to the platform; the
//! client only asks for the current token before each request.

use async_trait::async_trait;
use keyward_core::effects::CosignerError;
use keyward_core::AccountId;
use std::collections::HashMap;

/// Which app auth key the token was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthScope {
    /// Token minted with the app global auth key
    Global,
    /// Token minted with the app recovery auth key
    Recovery,
}

/// Source of bearer tokens.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    /// Current token for `account_id` in `scope`.
    async fn access_token(
        &self,
        account_id: &AccountId,
        scope: AuthScope,
    ) -> Result<String, CosignerError>;
}

/// Fixed token table, for tooling and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider {
    tokens: HashMap<(AccountId, AuthScope), String>,
}

impl StaticTokenProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(
        mut self,
        account_id: AccountId,
        scope: AuthScope,
        token: impl Into<String>,
    ) -> Self {
        self.tokens.insert((account_id, scope), token.into());
        self
    }
}

#[async_trait]
impl AccessTokenProvider for StaticTokenProvider {
    async fn access_token(
        &self,
        account_id: &AccountId,
        scope: AuthScope,
    ) -> Result<String, CosignerError> {
        self.tokens
            .get(&(account_id.clone(), scope))
            .cloned()
            .ok_or_else(|| {
                CosignerError::unauthorized(format!("no {scope:?} token for account {account_id}"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let account = AccountId::new("acct-1").unwrap();
        let provider =
            StaticTokenProvider::new().with_token(account.clone(), AuthScope::Global, "t-1");

        assert_eq!(
            provider
                .access_token(&account, AuthScope::Global)
                .await
                .unwrap(),
            "t-1"
        );
        assert_matches!(
            provider.access_token(&account, AuthScope::Recovery).await,
            Err(CosignerError::Unauthorized { .. })
        );
    }
}
