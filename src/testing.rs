// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory fakes of the bridge's collaborators, shared by unit tests.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::BridgeConfig;
use crate::models::{SessionDescriptor, SettlementEvent, Snapshot, UnspentRecord};
use crate::nwc::protocol::connection_string;
use crate::nwc::{ProtocolError, RemoteControlProtocol, SessionOutcome, SessionRequest};
use crate::providers::{AuthHandle, PaymentSourceError, PaymentStatusSource, SettlementRecord};
use crate::settlement::{BookkeepingClaimer, ClaimError, LedgerClaimer};
use crate::signing::SigningIdentity;
use crate::storage::{StateStore, StorageResult};

/// Snapshot store that keeps the last save in memory and counts saves.
#[derive(Default)]
pub struct MemoryStore {
    snapshot: Mutex<Option<Snapshot>>,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot)),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Snapshot {
        self.snapshot.lock().unwrap().clone().unwrap_or_default()
    }

    fn save(&self, snapshot: &Snapshot) -> StorageResult<()> {
        *self.snapshot.lock().unwrap() = Some(snapshot.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Remote-control protocol that mints deterministic strings and records
/// every reconnect request.
#[derive(Default)]
pub struct CountingProtocol {
    provisioned: AtomicUsize,
    closed: AtomicUsize,
    reconnects: Mutex<Vec<SessionRequest>>,
    failing: HashSet<String>,
    delay: Option<Duration>,
}

impl CountingProtocol {
    /// Reconnects for these identities fail.
    pub fn failing_for<'a>(identities: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            failing: identities.into_iter().map(str::to_string).collect(),
            ..Self::default()
        }
    }

    /// Provisioning takes `delay`, widening race windows.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn provisioned(&self) -> usize {
        self.provisioned.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn reconnect_requests(&self) -> Vec<SessionRequest> {
        self.reconnects.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteControlProtocol for CountingProtocol {
    async fn create_session(
        &self,
        request: SessionRequest,
    ) -> Result<SessionOutcome, ProtocolError> {
        if let Some(existing) = &request.existing {
            if self.failing.contains(&existing.identity) {
                return Err(ProtocolError::Relay(format!(
                    "{} unreachable",
                    request.relay
                )));
            }
            let identity = existing.identity.clone();
            self.reconnects.lock().unwrap().push(request);
            return Ok(SessionOutcome::Reconnected { identity });
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let n = self.provisioned.fetch_add(1, Ordering::SeqCst) + 1;
        let identity = format!("{n:064x}");
        Ok(SessionOutcome::Provisioned {
            descriptor: SessionDescriptor {
                mymint: request.mint_url,
                permissions: request.permissions,
                nwc_string: connection_string(&identity, &request.relay, "00"),
                relay: request.relay,
                ..SessionDescriptor::default()
            },
            identity,
        })
    }

    async fn close_session(&self, _identity: &str) -> Result<(), ProtocolError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Payment-status service returning a scripted record list.
#[derive(Default)]
pub struct ScriptedPaymentSource {
    records: Mutex<Vec<SettlementRecord>>,
    failures: AtomicUsize,
    auth_calls: AtomicUsize,
}

impl ScriptedPaymentSource {
    pub fn with_records(records: Vec<SettlementRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Self::default()
        }
    }

    pub fn push_record(&self, record: SettlementRecord) {
        self.records.lock().unwrap().push(record);
    }

    /// The next `n` authentications fail.
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn auth_calls(&self) -> usize {
        self.auth_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentStatusSource for ScriptedPaymentSource {
    async fn authenticate(
        &self,
        signer: &SigningIdentity,
    ) -> Result<AuthHandle, PaymentSourceError> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PaymentSourceError::Auth("scripted failure".to_string()));
        }
        Ok(AuthHandle {
            pubkey: signer.public_key_hex(),
            token: "token".to_string(),
        })
    }

    async fn list_settlements(
        &self,
        _auth: &AuthHandle,
    ) -> Result<Vec<SettlementRecord>, PaymentSourceError> {
        Ok(self.records.lock().unwrap().clone())
    }
}

/// Claimer that fails a fixed number of times, then books normally.
pub struct FailingClaimer {
    remaining: AtomicUsize,
}

impl FailingClaimer {
    pub fn failing_times(n: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(n),
        }
    }
}

#[async_trait]
impl LedgerClaimer for FailingClaimer {
    async fn claim(
        &self,
        settlement: &SettlementEvent,
        ledger_url: &str,
    ) -> Result<Vec<UnspentRecord>, ClaimError> {
        let failing = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ClaimError::Unavailable(format!("{ledger_url} timed out")));
        }
        BookkeepingClaimer.claim(settlement, ledger_url).await
    }
}

/// Config with fast timers, no sweep threshold and a fresh identity, writing
/// state under `dir`.
pub fn test_config(dir: &Path) -> BridgeConfig {
    BridgeConfig {
        npub_privkey: Some(SigningIdentity::generate().secret_hex()),
        sweep_interval_ms: 50,
        persist_interval_ms: 20,
        min_balance_to_sweep: 0,
        state_path: dir.join("db.json"),
        ..BridgeConfig::default()
    }
}
