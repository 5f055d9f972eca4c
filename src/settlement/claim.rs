// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Claim step: turns a settled payment into locally held records.
//!
//! The default [`BookkeepingClaimer`] does not move funds between ledgers.
//! It credits one record per settlement with a deterministic id, so even a
//! lost processed-set cannot produce a second record for the same payment.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::models::{SettlementEvent, UnspentRecord};

const RECORD_ID_PREFIX: &str = "settlement:";

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ClaimError {
    #[error("backing ledger rejected claim for {external_id}: {reason}")]
    Rejected { external_id: String, reason: String },

    #[error("backing ledger unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait LedgerClaimer: Send + Sync {
    /// Claim `settlement` against `ledger_url`. An error leaves the
    /// settlement un-applied.
    async fn claim(
        &self,
        settlement: &SettlementEvent,
        ledger_url: &str,
    ) -> Result<Vec<UnspentRecord>, ClaimError>;
}

#[derive(Debug, Default, Clone)]
pub struct BookkeepingClaimer;

#[async_trait]
impl LedgerClaimer for BookkeepingClaimer {
    async fn claim(
        &self,
        settlement: &SettlementEvent,
        ledger_url: &str,
    ) -> Result<Vec<UnspentRecord>, ClaimError> {
        if settlement.amount == 0 {
            return Err(ClaimError::Rejected {
                external_id: settlement.external_id.clone(),
                reason: "zero amount".to_string(),
            });
        }

        let mut record = UnspentRecord::new(
            settlement_record_id(&settlement.external_id),
            settlement.amount,
            Some(ledger_url.to_string()),
        );
        record.extra.insert(
            "settlement_id".to_string(),
            settlement.external_id.clone().into(),
        );
        Ok(vec![record])
    }
}

/// Deterministic record id for a settlement: hex sha256 of `settlement:<id>`.
pub fn settlement_record_id(external_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(RECORD_ID_PREFIX.as_bytes());
    hasher.update(external_id.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SettlementSource, SettlementStatus};

    #[test]
    fn record_id_is_stable_per_settlement() {
        assert_eq!(settlement_record_id("q1"), settlement_record_id("q1"));
        assert_ne!(settlement_record_id("q1"), settlement_record_id("q2"));
        assert_eq!(settlement_record_id("q1").len(), 64);
    }

    #[tokio::test]
    async fn bookkeeping_claim_credits_one_record_at_ledger() {
        let event = SettlementEvent::new("q1", 21, SettlementStatus::Settled, SettlementSource::Poll);
        let records = BookkeepingClaimer
            .claim(&event, "https://mint.example")
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].amount, 21);
        assert_eq!(records[0].id, settlement_record_id("q1"));
        assert_eq!(records[0].mint.as_deref(), Some("https://mint.example"));
    }

    #[tokio::test]
    async fn zero_amount_is_rejected() {
        let event = SettlementEvent::new("q0", 0, SettlementStatus::Settled, SettlementSource::Push);
        assert!(matches!(
            BookkeepingClaimer.claim(&event, "https://mint.example").await,
            Err(ClaimError::Rejected { .. })
        ));
    }
}
