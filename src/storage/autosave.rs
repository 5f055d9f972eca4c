// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Periodic snapshot flush.
//!
//! Runs as a background task and writes the working copy to the state store
//! every `interval`. Shares the lifecycle's `CancellationToken`; the final
//! flush on shutdown is done by the lifecycle controller, not here.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::StateStore;
use crate::state::BridgeState;

pub struct Autosave {
    state: BridgeState,
    store: Arc<dyn StateStore>,
    interval: Duration,
}

impl Autosave {
    /// Flush `state` to `store` every `interval`.
    pub fn new(state: BridgeState, store: Arc<dyn StateStore>, interval: Duration) -> Self {
        Self {
            state,
            store,
            interval,
        }
    }

    /// Flush every `interval` until the token is cancelled.
    ///
    /// ```rust,ignore
    /// tokio::spawn(autosave.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_ms = self.interval.as_millis() as u64, "Autosave starting");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Autosave shutting down");
                    return;
                }
            }

            let snapshot = self.state.snapshot().await;
            match self.store.save(&snapshot) {
                Ok(()) => debug!(utxos = snapshot.utxos.len(), "Autosaved wallet state"),
                Err(e) => warn!(error = %e, "Autosave failed, will retry"),
            }
        }
    }
}
