//! Funds-lost risk evaluation.

use crate::level::{AtRiskCause, FundsLostRiskLevel};
use crate::signals::RiskSignals;

/// Stateless evaluator.
pub struct FundsLostRiskEngine;

impl FundsLostRiskEngine {
    /// The most severe applicable cause, or `Protected` when none apply.
    pub fn evaluate(signals: &RiskSignals) -> FundsLostRiskLevel {
        match Self::causes(signals).into_iter().next() {
            Some(cause) => FundsLostRiskLevel::AtRisk(cause),
            None => FundsLostRiskLevel::Protected,
        }
    }

    /// Every applicable cause, most severe first.
    pub fn causes(signals: &RiskSignals) -> Vec<AtRiskCause> {
        let mut causes = Vec::new();
        if let Some((local, server)) = signals.keyset_mismatch() {
            causes.push(AtRiskCause::ActiveSpendingKeysetMismatch {
                local: local.clone(),
                server: server.clone(),
            });
        }
        if !signals.hardware_linked {
            causes.push(AtRiskCause::MissingHardware);
        }
        if !signals.cloud_backup.is_usable() {
            causes.push(AtRiskCause::MissingCloudBackup);
        }
        if !signals.has_critical_contact() {
            causes.push(AtRiskCause::MissingContactMethod);
        }
        causes
    }
}
