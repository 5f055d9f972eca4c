// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Merge Worker
//!
//! The single writer of balance and processed-set. The sweeper and the push
//! listener submit [`SettlementEvent`]s over a bounded channel; the worker
//! handles them one at a time:
//!
//! 1. Not settled → [`MergeOutcome::NotSettled`]. An amount of zero or
//!    above [`MAX_SETTLEMENT_AMOUNT`] → [`MergeError::InvalidAmount`].
//! 2. Id already in the processed-set → [`MergeOutcome::AlreadyApplied`].
//! 3. Claim against the backing ledger. On error nothing is recorded and the
//!    settlement stays eligible for the next delivery.
//! 4. Apply records and mark the id under one write guard, then flush.
//!
//! Because events are handled serially, a poll and a push for the same id
//! can never both pass step 2.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::claim::{ClaimError, LedgerClaimer};
use crate::models::{SettlementEvent, SettlementStatus, MAX_SETTLEMENT_AMOUNT};
use crate::state::{BridgeState, MergeOutcome};
use crate::storage::StateStore;

/// Pending submissions before senders wait.
const QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum MergeError {
    #[error(transparent)]
    Claim(#[from] ClaimError),

    #[error("merge worker is not running")]
    WorkerStopped,

    #[error("settlement {0} carries no usable amount")]
    InvalidAmount(String),
}

struct MergeRequest {
    event: SettlementEvent,
    reply: oneshot::Sender<Result<MergeOutcome, MergeError>>,
}

/// Cloneable submission handle.
#[derive(Clone)]
pub struct MergeHandle {
    tx: mpsc::Sender<MergeRequest>,
}

impl MergeHandle {
    /// Submit one event and wait for its outcome.
    pub async fn submit(&self, event: SettlementEvent) -> Result<MergeOutcome, MergeError> {
        let (reply, outcome) = oneshot::channel();
        self.tx
            .send(MergeRequest { event, reply })
            .await
            .map_err(|_| MergeError::WorkerStopped)?;
        outcome.await.map_err(|_| MergeError::WorkerStopped)?
    }
}

/// Serial merger of settlements into the wallet. Reached only through a
/// [`MergeHandle`].
pub struct MergeWorker {
    state: BridgeState,
    claimer: Arc<dyn LedgerClaimer>,
    store: Arc<dyn StateStore>,
    ledger_url: String,
    rx: mpsc::Receiver<MergeRequest>,
}

impl MergeWorker {
    /// Spawn the worker. It exits when `shutdown` fires or every handle is
    /// dropped.
    pub fn spawn(
        state: BridgeState,
        claimer: Arc<dyn LedgerClaimer>,
        store: Arc<dyn StateStore>,
        ledger_url: impl Into<String>,
        shutdown: CancellationToken,
    ) -> (MergeHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let worker = Self {
            state,
            claimer,
            store,
            ledger_url: ledger_url.into(),
            rx,
        };
        let task = tokio::spawn(worker.run(shutdown));
        (MergeHandle { tx }, task)
    }

    async fn run(mut self, shutdown: CancellationToken) {
        debug!("Merge worker starting");
        loop {
            let request = tokio::select! {
                _ = shutdown.cancelled() => break,
                request = self.rx.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };

            let result = self.merge(&request.event).await;
            // The submitter may have given up; the merge still stands.
            let _ = request.reply.send(result);
        }
        debug!("Merge worker stopped");
    }

    async fn merge(&self, event: &SettlementEvent) -> Result<MergeOutcome, MergeError> {
        if event.status != SettlementStatus::Settled {
            return Ok(MergeOutcome::NotSettled);
        }
        if !(1..=MAX_SETTLEMENT_AMOUNT).contains(&event.amount) {
            return Err(MergeError::InvalidAmount(event.external_id.clone()));
        }
        if self.state.wallet.read().await.is_applied(&event.external_id) {
            debug!(external_id = %event.external_id, source = ?event.source, "Settlement already applied");
            return Ok(MergeOutcome::AlreadyApplied);
        }

        let records = self
            .claimer
            .claim(event, &self.ledger_url)
            .await
            .inspect_err(|e| {
                warn!(
                    external_id = %event.external_id,
                    error = %e,
                    "Claim failed, settlement left for retry"
                );
            })?;

        let (outcome, snapshot) = {
            let mut wallet = self.state.wallet.write().await;
            let outcome = wallet.apply_settlement(&event.external_id, records);
            (outcome, wallet.snapshot())
        };

        if let MergeOutcome::Credited { amount } = outcome {
            info!(
                external_id = %event.external_id,
                source = ?event.source,
                amount,
                balance = snapshot.balance(),
                "Settlement credited"
            );
            if let Err(e) = self.store.save(&snapshot) {
                warn!(error = %e, "Flush after merge failed, autosave will retry");
            }
        }

        Ok(outcome)
    }
}
