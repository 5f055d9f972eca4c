// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Bridge Lifecycle
//!
//! `Stopped → Starting → Running → Stopped`.
//!
//! `start()` loads the snapshot, reconciles remote-control sessions, starts
//! the merge worker and payment listener, schedules autosave and the
//! sweeper, runs one sweep immediately, then enters `Running`. Concurrent
//! calls serialize on one async mutex, so only the first provisions.
//!
//! `stop()` cancels the shared token, releases the listener subscription and
//! live sessions, and performs exactly one final save.
//!
//! No collaborator failure makes `start()` fail: the affected feature is
//! reported inactive in the [`StartReport`] and a log line names the cause.

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::BridgeConfig;
use crate::error::BridgeResult;
use crate::listener::PaymentListener;
use crate::models::BridgeStatus;
use crate::nwc::{
    ConnectionManager, NwcProvisioner, RemoteControlProtocol, SessionDefaults, DEFAULT_PERMISSIONS,
};
use crate::providers::{ChannelPushSource, NpubCashClient, PaymentPushSource, PaymentStatusSource};
use crate::settlement::{BookkeepingClaimer, LedgerClaimer, MergeWorker};
use crate::signing::IdentityStatus;
use crate::state::BridgeState;
use crate::storage::{Autosave, JsonFileStore, StateStore, StoragePaths};
use crate::sweeper::Sweeper;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Starting,
    Running,
}

/// What `start()` brought up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartReport {
    /// Set only when a new session was provisioned during this start.
    pub provisioned_connection_string: Option<String>,
    pub restored_sessions: Vec<String>,
    /// `(identity, reason)` for sessions left out of the live set.
    pub failed_sessions: Vec<(String, String)>,
    pub listener_active: bool,
    pub sweeper_active: bool,
}

/// External collaborators, injected so embedders and tests can swap them.
#[derive(Clone)]
pub struct Collaborators {
    pub protocol: Arc<dyn RemoteControlProtocol>,
    pub payments: Arc<dyn PaymentStatusSource>,
    pub push: Arc<dyn PaymentPushSource>,
    pub claimer: Arc<dyn LedgerClaimer>,
    pub store: Arc<dyn StateStore>,
}

impl Collaborators {
    /// NWC provisioner, npub.cash client, in-process push feed, bookkeeping
    /// claimer and the JSON file store at `config.state_path`.
    pub fn with_defaults(config: &BridgeConfig, push: ChannelPushSource) -> BridgeResult<Self> {
        Ok(Self {
            protocol: Arc::new(NwcProvisioner::new()),
            payments: Arc::new(NpubCashClient::new(&config.npub_cash_url)?),
            push: Arc::new(push),
            claimer: Arc::new(BookkeepingClaimer),
            store: Arc::new(file_store(&config.state_path)),
        })
    }
}

struct Runtime {
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    report: StartReport,
}

pub struct Bridge {
    config: BridgeConfig,
    identity: IdentityStatus,
    collaborators: Collaborators,
    wallet: BridgeState,
    sessions: ConnectionManager,
    runtime: Mutex<Option<Runtime>>,
    lifecycle: watch::Sender<LifecycleState>,
    missing_identity_reported: Arc<AtomicBool>,
}

impl Bridge {
    /// Stopped bridge over `collaborators`. Nothing is loaded until `start`.
    pub fn new(config: BridgeConfig, collaborators: Collaborators) -> Self {
        let identity = IdentityStatus::resolve(config.npub_privkey.as_deref());
        let sessions = ConnectionManager::new(
            Arc::clone(&collaborators.protocol),
            SessionDefaults {
                mint_url: config.mint_url.clone(),
                relay: config.nwc_relay.clone(),
                permissions: DEFAULT_PERMISSIONS.iter().map(|p| p.to_string()).collect(),
            },
        );

        Self {
            config,
            identity,
            collaborators,
            wallet: BridgeState::default(),
            sessions,
            runtime: Mutex::new(None),
            lifecycle: watch::Sender::new(LifecycleState::Stopped),
            missing_identity_reported: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Bridge with the default collaborators. Returns the push feed so the
    /// embedding token layer can emit redeemed payments into it.
    pub fn with_defaults(config: BridgeConfig) -> BridgeResult<(Self, ChannelPushSource)> {
        let push = ChannelPushSource::new();
        let collaborators = Collaborators::with_defaults(&config, push.clone())?;
        Ok((Self::new(config, collaborators), push))
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        *self.lifecycle.borrow()
    }

    /// Shared working copy of the wallet.
    pub fn wallet(&self) -> &BridgeState {
        &self.wallet
    }

    pub async fn start(&self) -> StartReport {
        let mut runtime = self.runtime.lock().await;
        if let Some(running) = runtime.as_ref() {
            debug!("Bridge already running");
            return running.report.clone();
        }

        self.lifecycle.send_replace(LifecycleState::Starting);
        info!(
            state_path = %self.config.state_path.display(),
            mint = %self.config.mint_url,
            "Bridge starting"
        );

        let store = Arc::clone(&self.collaborators.store);
        self.wallet.restore(store.load()).await;

        let mut report = StartReport::default();
        match self.sessions.reconcile(&self.wallet, store.as_ref()).await {
            Ok(reconciled) => {
                report.provisioned_connection_string = reconciled.provisioned;
                report.restored_sessions = reconciled.restored;
                report.failed_sessions = reconciled.failed;
            }
            Err(e) => error!(error = %e, "Session reconciliation failed"),
        }

        let shutdown = CancellationToken::new();
        let mut tasks = Vec::new();

        let (merge, merge_task) = MergeWorker::spawn(
            self.wallet.clone(),
            Arc::clone(&self.collaborators.claimer),
            Arc::clone(&store),
            self.config.mint_url.clone(),
            shutdown.clone(),
        );
        tasks.push(merge_task);

        let listener = PaymentListener::new(
            self.identity.clone(),
            Arc::clone(&self.collaborators.push),
            merge.clone(),
        );
        if let Some(task) = listener.start(shutdown.clone()).await {
            report.listener_active = true;
            tasks.push(task);
        }

        let autosave = Autosave::new(
            self.wallet.clone(),
            Arc::clone(&store),
            self.config.persist_interval(),
        );
        tasks.push(tokio::spawn(autosave.run(shutdown.clone())));

        let sweeper = Arc::new(
            Sweeper::new(
                self.identity.clone(),
                Arc::clone(&self.collaborators.payments),
                merge,
                self.wallet.clone(),
                self.config.min_balance_to_sweep,
                self.config.sweep_interval(),
            )
            .with_report_flag(Arc::clone(&self.missing_identity_reported)),
        );
        report.sweeper_active = sweeper.is_enabled();
        tasks.push(tokio::spawn(Arc::clone(&sweeper).run(shutdown.clone())));
        sweeper.sweep_once().await;

        info!(
            sessions = self.wallet.wallet.read().await.sessions().len(),
            balance = self.wallet.balance().await,
            listener = report.listener_active,
            sweeper = report.sweeper_active,
            "Bridge running"
        );

        *runtime = Some(Runtime {
            shutdown,
            tasks,
            report: report.clone(),
        });
        self.lifecycle.send_replace(LifecycleState::Running);
        report
    }

    /// Stop background work and flush once. A no-op when not running.
    pub async fn stop(&self) -> BridgeResult<()> {
        let mut runtime = self.runtime.lock().await;
        let Some(running) = runtime.take() else {
            debug!("Bridge not running, nothing to stop");
            return Ok(());
        };

        info!("Bridge stopping");
        running.shutdown.cancel();
        for task in running.tasks {
            // In-flight network calls are abandoned rather than awaited.
            task.abort();
            let _ = task.await;
        }
        self.sessions.shutdown().await;

        let snapshot = self.wallet.snapshot().await;
        let saved = self.collaborators.store.save(&snapshot);
        self.lifecycle.send_replace(LifecycleState::Stopped);

        saved?;
        info!(balance = snapshot.balance(), "Bridge stopped, state saved");
        Ok(())
    }

    /// Status from the working copy when running, otherwise read from the
    /// store without changing it.
    pub async fn status(&self) -> BridgeStatus {
        let snapshot = if self.state() == LifecycleState::Running {
            self.wallet.snapshot().await
        } else {
            self.collaborators.store.peek()
        };
        BridgeStatus::from_snapshot(&snapshot, &self.config.mint_url)
    }
}

/// Read-only status of the state file named by `config`; nothing is started.
pub fn bridge_status(config: &BridgeConfig) -> BridgeStatus {
    let snapshot = file_store(&config.state_path).peek();
    BridgeStatus::from_snapshot(&snapshot, &config.mint_url)
}

fn file_store(path: &Path) -> JsonFileStore {
    JsonFileStore::new(StoragePaths::new(path))
}
