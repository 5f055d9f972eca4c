// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Working copy of the wallet: unspent records, session registry and the
//! set of settlements already folded into the balance.
//!
//! [`BridgeState`] is owned by the lifecycle controller and handed to each
//! component. Every read-mutate-mark sequence happens under a single write
//! guard with no await in between.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::models::{Snapshot, UnspentRecord};
use crate::nwc::SessionRegistry;

/// Result of folding one settlement into the wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// New records were added; `amount` is what the balance grew by.
    Credited { amount: u64 },
    /// The settlement id was already applied; nothing changed.
    AlreadyApplied,
    /// The settlement is not in the settled state; nothing changed.
    NotSettled,
}

/// In-memory wallet. Mutated only under the [`BridgeState`] write guard.
#[derive(Debug, Default)]
pub struct WalletState {
    utxos: Vec<UnspentRecord>,
    sessions: SessionRegistry,
    processed: BTreeSet<String>,
}

impl WalletState {
    /// Empty wallet with no sessions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a snapshot. Records are kept exactly as loaded: proofs
    /// from the same keyset share an `id`, so ids are only checked for
    /// records added later through [`WalletState::insert_utxo`].
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            utxos: snapshot.utxos,
            sessions: SessionRegistry::from_entries(snapshot.nwc_info),
            processed: snapshot.processed_settlements,
        }
    }

    /// Copy out the durable form.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            utxos: self.utxos.clone(),
            nwc_info: self.sessions.to_entries(),
            processed_settlements: self.processed.clone(),
        }
    }

    /// Sum of held amounts, saturating at `u64::MAX`.
    pub fn balance(&self) -> u64 {
        self.utxos
            .iter()
            .fold(0u64, |total, u| total.saturating_add(u.amount))
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn sessions_mut(&mut self) -> &mut SessionRegistry {
        &mut self.sessions
    }

    /// Whether a settlement id has already been folded in.
    pub fn is_applied(&self, external_id: &str) -> bool {
        self.processed.contains(external_id)
    }

    /// Add a record. Returns `false` when the id is already held or the
    /// amount is zero.
    pub fn insert_utxo(&mut self, record: UnspentRecord) -> bool {
        if record.amount == 0 || self.utxos.iter().any(|u| u.id == record.id) {
            return false;
        }
        self.utxos.push(record);
        true
    }

    /// Remove a spent record.
    pub fn spend_utxo(&mut self, id: &str) -> Option<UnspentRecord> {
        let index = self.utxos.iter().position(|u| u.id == id)?;
        Some(self.utxos.remove(index))
    }

    /// Fold a claimed settlement into the balance exactly once.
    ///
    /// Records whose id is already held are skipped; the settlement id is
    /// marked applied in the same step.
    pub fn apply_settlement(
        &mut self,
        external_id: &str,
        records: Vec<UnspentRecord>,
    ) -> MergeOutcome {
        if self.processed.contains(external_id) {
            return MergeOutcome::AlreadyApplied;
        }

        let mut amount = 0u64;
        for record in records {
            let value = record.amount;
            if self.insert_utxo(record) {
                amount = amount.saturating_add(value);
            }
        }
        self.processed.insert(external_id.to_string());
        MergeOutcome::Credited { amount }
    }
}

/// Handle to the shared wallet state.
#[derive(Clone, Default)]
pub struct BridgeState {
    pub wallet: Arc<RwLock<WalletState>>,
}

impl BridgeState {
    /// Share `wallet` behind a new lock.
    pub fn new(wallet: WalletState) -> Self {
        Self {
            wallet: Arc::new(RwLock::new(wallet)),
        }
    }

    /// Replace the working copy with a freshly loaded snapshot.
    pub async fn restore(&self, snapshot: Snapshot) {
        *self.wallet.write().await = WalletState::from_snapshot(snapshot);
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.wallet.read().await.snapshot()
    }

    pub async fn balance(&self) -> u64 {
        self.wallet.read().await.balance()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, amount: u64) -> UnspentRecord {
        UnspentRecord::new(id, amount, None)
    }

    #[test]
    fn repeated_settlement_credits_once() {
        let mut snapshot = Snapshot::default();
        snapshot.utxos.push(record("a", 10));
        let mut wallet = WalletState::from_snapshot(snapshot);
        assert_eq!(wallet.balance(), 10);

        let first = wallet.apply_settlement("b", vec![record("b", 5)]);
        assert_eq!(first, MergeOutcome::Credited { amount: 5 });
        assert_eq!(wallet.balance(), 15);

        let second = wallet.apply_settlement("b", vec![record("b", 5)]);
        assert_eq!(second, MergeOutcome::AlreadyApplied);
        assert_eq!(wallet.balance(), 15);
    }

    #[test]
    fn settlement_never_duplicates_held_record_ids() {
        let mut wallet = WalletState::new();
        wallet.insert_utxo(record("x", 7));

        let outcome = wallet.apply_settlement("quote-1", vec![record("x", 7), record("y", 3)]);
        assert_eq!(outcome, MergeOutcome::Credited { amount: 3 });
        assert_eq!(wallet.balance(), 10);
        assert!(wallet.is_applied("quote-1"));
    }

    #[test]
    fn loaded_proofs_sharing_a_keyset_id_are_all_kept() {
        let mut snapshot = Snapshot::default();
        snapshot.utxos.push(record("009a1f293253e41e", 8));
        snapshot.utxos.push(record("009a1f293253e41e", 2));
        snapshot.utxos.push(record("00ad268c4d1f5826", 0));

        let wallet = WalletState::from_snapshot(snapshot.clone());
        assert_eq!(wallet.balance(), 10);
        assert_eq!(wallet.snapshot(), snapshot);
    }

    #[test]
    fn insert_rejects_ids_already_held() {
        let mut snapshot = Snapshot::default();
        snapshot.utxos.push(record("009a1f293253e41e", 8));
        let mut wallet = WalletState::from_snapshot(snapshot);

        assert!(!wallet.insert_utxo(record("009a1f293253e41e", 4)));
        assert!(!wallet.insert_utxo(record("fresh", 0)));
        assert!(wallet.insert_utxo(record("fresh", 4)));
        assert_eq!(wallet.balance(), 12);
    }

    #[test]
    fn huge_credits_saturate_instead_of_overflowing() {
        let mut wallet = WalletState::new();
        let outcome = wallet.apply_settlement(
            "q1",
            vec![record("r1", u64::MAX / 2 + 1), record("r2", u64::MAX / 2 + 1)],
        );
        assert_eq!(outcome, MergeOutcome::Credited { amount: u64::MAX });
        assert_eq!(wallet.balance(), u64::MAX);
    }

    #[test]
    fn snapshot_round_trips_processed_set() {
        let mut wallet = WalletState::new();
        wallet.apply_settlement("q1", vec![record("r1", 21)]);

        let restored = WalletState::from_snapshot(wallet.snapshot());
        assert!(restored.is_applied("q1"));
        assert_eq!(restored.balance(), 21);
    }

    #[test]
    fn spend_removes_record() {
        let mut wallet = WalletState::new();
        wallet.insert_utxo(record("a", 4));
        assert_eq!(wallet.spend_utxo("a").map(|r| r.amount), Some(4));
        assert!(wallet.spend_utxo("a").is_none());
        assert_eq!(wallet.balance(), 0);
    }

    #[tokio::test]
    async fn restore_replaces_working_copy() {
        let state = BridgeState::default();
        let mut snapshot = Snapshot::default();
        snapshot.utxos.push(record("a", 10));

        state.restore(snapshot.clone()).await;
        assert_eq!(state.balance().await, 10);
        assert_eq!(state.snapshot().await, snapshot);
    }
}
