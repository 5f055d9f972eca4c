// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Settlement Sweeper
//!
//! Background task that periodically asks the payment-status service which
//! payments have settled and folds the new ones into the wallet balance.
//!
//! ## Strategy
//!
//! Each cycle moves `Idle → Querying → Merging → Idle`:
//! 1. Without a usable signing identity the cycle is skipped. The warning is
//!    logged once per process, later skips log at debug level.
//! 2. Authenticate with a NIP-98 assertion and list every payment record.
//! 3. Keep settled records in service order, dropping repeated ids, ids
//!    already applied and amounts outside `1..=MAX_SETTLEMENT_AMOUNT`.
//! 4. If their total reaches `min_balance_to_sweep`, submit each to the
//!    merge worker. A failed claim is logged and retried next cycle.
//!
//! Errors never escape a cycle.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken`, shared with the autosave and
//! listener tasks. No new cycle starts once the token is cancelled.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::{SettlementEvent, SettlementSource, SettlementStatus, MAX_SETTLEMENT_AMOUNT};
use crate::providers::{PaymentStatusSource, SettlementRecord};
use crate::settlement::{MergeError, MergeHandle};
use crate::signing::{IdentityStatus, SigningIdentity};
use crate::state::{BridgeState, MergeOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepPhase {
    Idle,
    Querying,
    Merging,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    /// No usable signing identity.
    Skipped,
    /// Querying failed; nothing was merged.
    Failed(String),
    /// Nothing settled that is not already applied.
    NothingNew,
    /// New settlements exist but their total is under the threshold.
    BelowThreshold { pending: u64 },
    Merged {
        credited: u64,
        applied: usize,
        already_applied: usize,
        failed: usize,
    },
}

/// Periodic poller that feeds settled payments to the merge worker.
pub struct Sweeper {
    identity: IdentityStatus,
    payments: Arc<dyn PaymentStatusSource>,
    merge: MergeHandle,
    state: BridgeState,
    min_balance: u64,
    interval: Duration,
    missing_identity_reported: Arc<AtomicBool>,
    phase: watch::Sender<SweepPhase>,
}

impl Sweeper {
    /// Sweeper merging into `state` through `merge`, holding totals under
    /// `min_balance` back.
    pub fn new(
        identity: IdentityStatus,
        payments: Arc<dyn PaymentStatusSource>,
        merge: MergeHandle,
        state: BridgeState,
        min_balance: u64,
        interval: Duration,
    ) -> Self {
        Self {
            identity,
            payments,
            merge,
            state,
            min_balance,
            interval,
            missing_identity_reported: Arc::new(AtomicBool::new(false)),
            phase: watch::Sender::new(SweepPhase::Idle),
        }
    }

    /// Share a report-once flag for the missing-identity warning, so it
    /// stays quiet across restarts of the bridge.
    pub fn with_report_flag(mut self, reported: Arc<AtomicBool>) -> Self {
        self.missing_identity_reported = reported;
        self
    }

    /// Whether cycles can query at all.
    pub fn is_enabled(&self) -> bool {
        self.identity.identity().is_some()
    }

    pub fn phase(&self) -> SweepPhase {
        *self.phase.borrow()
    }

    /// Run cycles every `interval` until the token is cancelled. The first
    /// cycle runs after one interval; callers run the startup pass.
    ///
    /// ```rust,ignore
    /// tokio::spawn(sweeper.clone().run(shutdown.clone()));
    /// ```
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "Settlement sweeper starting"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Settlement sweeper shutting down");
                    return;
                }
            }

            if shutdown.is_cancelled() {
                info!("Settlement sweeper shutting down");
                return;
            }

            self.sweep_once().await;
        }
    }

    /// Execute one cycle.
    pub async fn sweep_once(&self) -> SweepOutcome {
        let Some(signer) = self.identity.identity() else {
            let reason = self.identity.reason().unwrap_or_default();
            if !self.missing_identity_reported.swap(true, Ordering::Relaxed) {
                warn!(reason = %reason, "Sweeper disabled: no usable signing identity");
            } else {
                debug!("Sweep skipped: no usable signing identity");
            }
            return SweepOutcome::Skipped;
        };

        self.phase.send_replace(SweepPhase::Querying);
        let records = match self.query(signer).await {
            Ok(records) => records,
            Err(reason) => {
                warn!(error = %reason, "Sweep failed while querying payments");
                self.phase.send_replace(SweepPhase::Idle);
                return SweepOutcome::Failed(reason);
            }
        };

        let fresh = self.new_settlements(records).await;
        if fresh.is_empty() {
            debug!("Sweep found no new settlements");
            self.phase.send_replace(SweepPhase::Idle);
            return SweepOutcome::NothingNew;
        }

        let pending = fresh
            .iter()
            .fold(0u64, |total, r| total.saturating_add(r.amount));
        if pending < self.min_balance {
            info!(
                pending,
                threshold = self.min_balance,
                "Settled total below sweep threshold, waiting"
            );
            self.phase.send_replace(SweepPhase::Idle);
            return SweepOutcome::BelowThreshold { pending };
        }

        self.phase.send_replace(SweepPhase::Merging);
        let outcome = self.merge_all(fresh).await;
        self.phase.send_replace(SweepPhase::Idle);
        outcome
    }

    async fn query(
        &self,
        signer: &SigningIdentity,
    ) -> Result<Vec<SettlementRecord>, String> {
        let auth = self
            .payments
            .authenticate(signer)
            .await
            .map_err(|e| e.to_string())?;
        self.payments
            .list_settlements(&auth)
            .await
            .map_err(|e| e.to_string())
    }

    /// Settled records in service order, first occurrence of each id, minus
    /// those already applied or carrying an impossible amount.
    async fn new_settlements(&self, records: Vec<SettlementRecord>) -> Vec<SettlementRecord> {
        let wallet = self.state.wallet.read().await;
        let mut seen = HashSet::new();
        records
            .into_iter()
            .filter(|r| r.status == SettlementStatus::Settled)
            .filter(|r| {
                let in_range = (1..=MAX_SETTLEMENT_AMOUNT).contains(&r.amount);
                if !in_range {
                    warn!(external_id = %r.id, amount = r.amount, "Ignoring settlement with invalid amount");
                }
                in_range
            })
            .filter(|r| seen.insert(r.id.clone()))
            .filter(|r| !wallet.is_applied(&r.id))
            .collect()
    }

    async fn merge_all(&self, records: Vec<SettlementRecord>) -> SweepOutcome {
        let mut credited = 0u64;
        let mut applied = 0;
        let mut already_applied = 0;
        let mut failed = 0;

        for record in records {
            let event = SettlementEvent::new(
                record.id.clone(),
                record.amount,
                record.status,
                SettlementSource::Poll,
            );
            match self.merge.submit(event).await {
                Ok(MergeOutcome::Credited { amount }) => {
                    credited = credited.saturating_add(amount);
                    applied += 1;
                }
                Ok(MergeOutcome::AlreadyApplied) => already_applied += 1,
                Ok(MergeOutcome::NotSettled) => {}
                Err(MergeError::WorkerStopped) => {
                    warn!("Merge worker stopped mid-sweep");
                    failed += 1;
                    break;
                }
                Err(e) => {
                    warn!(external_id = %record.id, error = %e, "Sweep could not merge settlement");
                    failed += 1;
                }
            }
        }

        if applied > 0 {
            info!(applied, credited, "Sweep merged settlements");
        }
        SweepOutcome::Merged {
            credited,
            applied,
            already_applied,
            failed,
        }
    }
}
