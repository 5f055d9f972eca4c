// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Connection manager: brings the session registry to life at startup.
//!
//! ## Strategy
//!
//! - **Empty registry**: provision exactly one session against the default
//!   mint and relay, insert it, and flush the state store immediately so the
//!   new credential is never lost to a crash.
//! - **Non-empty registry**: re-establish every recorded session with the
//!   same identity, mint, permissions and relay. A session that is already
//!   live is skipped, so reconciling twice is harmless. A session that fails
//!   is logged and left out of the live set; the others still come up.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::protocol::{ExistingSession, RemoteControlProtocol, SessionOutcome, SessionRequest};
use super::registry::RegistryError;
use crate::state::BridgeState;
use crate::storage::StateStore;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("provisioning failed: {0}")]
    Provision(#[from] super::protocol::ProtocolError),

    #[error("provisioning returned a reconnect for an unknown identity {0}")]
    UnexpectedReconnect(String),

    #[error("registry rejected new session: {0}")]
    Registry(#[from] RegistryError),
}

/// Mint, relay and permissions used when provisioning.
#[derive(Debug, Clone)]
pub struct SessionDefaults {
    pub mint_url: String,
    pub relay: String,
    pub permissions: Vec<String>,
}

/// What one reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Connection string of a newly provisioned session.
    pub provisioned: Option<String>,
    pub restored: Vec<String>,
    pub already_live: Vec<String>,
    /// `(identity, reason)` for sessions that could not be re-established.
    pub failed: Vec<(String, String)>,
}

pub struct ConnectionManager {
    protocol: Arc<dyn RemoteControlProtocol>,
    defaults: SessionDefaults,
    live: Mutex<BTreeSet<String>>,
}

impl ConnectionManager {
    /// Manager provisioning through `protocol` with `defaults`.
    pub fn new(protocol: Arc<dyn RemoteControlProtocol>, defaults: SessionDefaults) -> Self {
        Self {
            protocol,
            defaults,
            live: Mutex::new(BTreeSet::new()),
        }
    }

    pub async fn live_identities(&self) -> Vec<String> {
        self.live.lock().await.iter().cloned().collect()
    }

    /// Reconcile the registry with the live set.
    ///
    /// Holds the live-set lock for the whole pass, so concurrent callers
    /// cannot both observe an empty registry and provision twice.
    pub async fn reconcile(
        &self,
        state: &BridgeState,
        store: &dyn StateStore,
    ) -> Result<ReconcileReport, SessionError> {
        let mut live = self.live.lock().await;
        let mut report = ReconcileReport::default();

        let recorded = state.wallet.read().await.sessions().to_entries();

        if recorded.is_empty() {
            info!("No NWC connection found, creating one");
            let connection_string = self.provision(state, store).await?;
            if let Some((identity, _)) = state.wallet.read().await.sessions().primary() {
                live.insert(identity.clone());
            }
            report.provisioned = Some(connection_string);
            return Ok(report);
        }

        info!(count = recorded.len(), "Restoring NWC connections");
        for (identity, descriptor) in recorded {
            if live.contains(&identity) {
                report.already_live.push(identity);
                continue;
            }

            let request = SessionRequest {
                mint_url: descriptor.mymint.clone(),
                permissions: descriptor.permissions.clone(),
                relay: descriptor.relay.clone(),
                existing: Some(ExistingSession {
                    identity: identity.clone(),
                    descriptor,
                }),
            };

            match self.protocol.create_session(request).await {
                Ok(SessionOutcome::Reconnected { .. }) => {
                    live.insert(identity.clone());
                    report.restored.push(identity);
                }
                Ok(SessionOutcome::Provisioned { .. }) => {
                    // The registry keeps the original credential either way.
                    warn!(identity = %identity, "Reconnect minted a new credential, discarding it");
                    report
                        .failed
                        .push((identity, "reconnect minted a new credential".to_string()));
                }
                Err(e) => {
                    warn!(identity = %identity, error = %e, "Failed to restore NWC connection");
                    report.failed.push((identity, e.to_string()));
                }
            }
        }

        Ok(report)
    }

    async fn provision(
        &self,
        state: &BridgeState,
        store: &dyn StateStore,
    ) -> Result<String, SessionError> {
        let request = SessionRequest {
            mint_url: self.defaults.mint_url.clone(),
            permissions: self.defaults.permissions.clone(),
            relay: self.defaults.relay.clone(),
            existing: None,
        };

        let (identity, descriptor) = match self.protocol.create_session(request).await? {
            SessionOutcome::Provisioned {
                identity,
                descriptor,
            } => (identity, descriptor),
            SessionOutcome::Reconnected { identity } => {
                return Err(SessionError::UnexpectedReconnect(identity));
            }
        };

        let connection_string = descriptor.nwc_string.clone();
        let snapshot = {
            let mut wallet = state.wallet.write().await;
            wallet.sessions_mut().insert_new(identity.clone(), descriptor)?;
            wallet.snapshot()
        };

        if let Err(e) = store.save(&snapshot) {
            error!(identity = %identity, error = %e, "New NWC credential could not be persisted");
        }

        Ok(connection_string)
    }

    /// Release every live session.
    pub async fn shutdown(&self) {
        let mut live = self.live.lock().await;
        for identity in live.iter() {
            if let Err(e) = self.protocol.close_session(identity).await {
                warn!(identity = %identity, error = %e, "Failed to close NWC session");
            }
        }
        live.clear();
    }
}
