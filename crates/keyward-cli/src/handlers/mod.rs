//! CLI command handlers.
//!
//! Handlers are generic over the effect traits they read through, so they
//! run against the production [`KeywardEffects`] from `main` and against the
//! testkit in tests.

use anyhow::{Context, Result};
use keyward_core::{AccountId, KeywardConfig};
use keyward_cosigner::{AuthScope, HttpCosignerClient, StaticTokenProvider};
use keyward_effects::{KeywardEffects, UnavailableAppKeys};
use serde::Serialize;
use std::fmt::Display;
use std::sync::Arc;

pub mod config;
pub mod risk;
pub mod status;
pub mod watch;

/// Production effects for one account. Signing always fails.
///
/// Must be called inside a tokio runtime.
pub fn production_effects(
    config: &KeywardConfig,
    account: &AccountId,
    token: Option<&str>,
) -> Result<KeywardEffects> {
    let mut tokens = StaticTokenProvider::new();
    if let Some(token) = token {
        tokens = tokens
            .with_token(account.clone(), AuthScope::Global, token)
            .with_token(account.clone(), AuthScope::Recovery, token);
    }
    let client = HttpCosignerClient::new(&config.cosigner, Arc::new(tokens))
        .context("failed to build co-signer client")?;
    tracing::debug!(
        account = %account,
        base_url = client.base_url(),
        authenticated = token.is_some(),
        "co-signer client ready"
    );
    Ok(KeywardEffects::production(
        config,
        Arc::new(client),
        Arc::new(UnavailableAppKeys),
    ))
}

/// Render a report as text or pretty JSON.
pub fn render<T: Serialize + Display>(report: &T, json: bool) -> Result<String> {
    if json {
        Ok(serde_json::to_string_pretty(report)?)
    } else {
        Ok(report.to_string())
    }
}
