//! `keyward risk`

use anyhow::Result;
use keyward_core::AccountId;
use keyward_risk::{
    AtRiskCause, FundsLostRiskEngine, FundsLostRiskLevel, FundsLostRiskWorker, RiskEffects,
    RiskSignalSource,
};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Serialize)]
pub struct RiskReport {
    pub account: AccountId,
    pub level: FundsLostRiskLevel,
    /// Every applicable cause, most severe first
    pub causes: Vec<AtRiskCause>,
    /// False when the co-signer could not be asked for its active keyset
    pub server_keyset_known: bool,
}

/// One evaluation. The co-signer is optional: without it no mismatch is reported.
pub async fn evaluate<E: RiskEffects>(
    effects: Arc<E>,
    source: Arc<dyn RiskSignalSource>,
    account: &AccountId,
) -> Result<RiskReport> {
    let worker = FundsLostRiskWorker::new(effects, source, account.clone(), Duration::MAX);
    let signals = worker.gather().await?;
    Ok(RiskReport {
        account: account.clone(),
        level: FundsLostRiskEngine::evaluate(&signals),
        causes: FundsLostRiskEngine::causes(&signals),
        server_keyset_known: signals.server_keyset.is_some(),
    })
}

impl fmt::Display for RiskReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "account   {}", self.account)?;
        write!(f, "risk      {}", self.level)?;
        for cause in self.causes.iter().skip(1) {
            write!(f, "\n          also: {cause}")?;
        }
        if !self.server_keyset_known {
            write!(f, "\n          (server keyset unknown; mismatch not checked)")?;
        }
        Ok(())
    }
}
