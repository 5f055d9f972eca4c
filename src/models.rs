// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet state types shared by persistence, reconciliation and the
//! lifecycle controller.
//!
//! The on-disk layout is the JSON snapshot:
//!
//! ```text
//! { "utxos": [ { "id": "...", "amount": 10, ... } ],
//!   "nwc_info": { "<remote-identity-hex>": { "mymint": "...", "permissions": [...],
//!                 "relay": "...", "nwc_string": "..." } },
//!   "processed_settlements": [ "<external-id>", ... ] }
//! ```
//!
//! Fields written by other layers (proof secrets, signatures, per-app
//! bookkeeping) are kept in flattened maps so they survive a load/save cycle.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Largest amount a single settlement may carry: 21 million BTC in sats.
/// Anything above it cannot be real and is refused before it reaches a sum.
pub const MAX_SETTLEMENT_AMOUNT: u64 = 2_100_000_000_000_000;

/// One locally held unit of value redeemable at a backing mint.
///
/// Never mutated in place: spending removes the record, minting adds a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnspentRecord {
    /// Opaque token/commitment identifier, unique within the local set.
    pub id: String,
    /// Amount in the smallest settlement unit (sats).
    pub amount: u64,
    /// Mint the record is valid against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mint: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UnspentRecord {
    /// Build a record with no extra fields.
    pub fn new(id: impl Into<String>, amount: u64, mint: Option<String>) -> Self {
        Self {
            id: id.into(),
            amount,
            mint,
            extra: Map::new(),
        }
    }
}

/// Persisted descriptor of one authorized remote-control binding.
///
/// Keyed by remote identity in [`Snapshot::nwc_info`]. The `nwc_string` is
/// generated once at provisioning and must never be regenerated.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionDescriptor {
    #[serde(default)]
    pub mymint: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub relay: String,
    #[serde(default)]
    pub nwc_string: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Full durable state: the recovery copy of the in-memory wallet.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub utxos: Vec<UnspentRecord>,
    #[serde(default)]
    pub nwc_info: BTreeMap<String, SessionDescriptor>,
    #[serde(default)]
    pub processed_settlements: BTreeSet<String>,
}

impl Snapshot {
    /// Sum of all record amounts, saturating at `u64::MAX`.
    pub fn balance(&self) -> u64 {
        self.utxos
            .iter()
            .fold(0u64, |total, u| total.saturating_add(u.amount))
    }
}

/// Settlement state as reported by the payment-status service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Settled,
    Pending,
    Unknown,
}

impl SettlementStatus {
    /// Map a raw provider status string onto the settlement state.
    pub fn from_raw(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "paid" | "issued" | "settled" => SettlementStatus::Settled,
            "unpaid" | "pending" => SettlementStatus::Pending,
            _ => SettlementStatus::Unknown,
        }
    }
}

/// Delivery path a settlement was observed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementSource {
    Poll,
    Push,
}

/// An externally reported settlement. Its effect is folded into
/// [`UnspentRecord`]s; the event itself is never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementEvent {
    pub external_id: String,
    pub amount: u64,
    pub status: SettlementStatus,
    pub source: SettlementSource,
    pub observed_at: DateTime<Utc>,
}

impl SettlementEvent {
    /// Stamp a settlement observed now.
    pub fn new(
        external_id: impl Into<String>,
        amount: u64,
        status: SettlementStatus,
        source: SettlementSource,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            amount,
            status,
            source,
            observed_at: Utc::now(),
        }
    }
}

/// Read-only status derived from the persisted snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgeStatus {
    pub connected: bool,
    pub primary_connection_string: Option<String>,
    pub backing_ledger_url: String,
    pub utxo_count: usize,
    pub session_count: usize,
    pub balance: u64,
}

impl BridgeStatus {
    /// Summarize a snapshot. The primary session is the first by identity;
    /// its mint wins over `default_mint` when present.
    pub fn from_snapshot(snapshot: &Snapshot, default_mint: &str) -> Self {
        let primary = snapshot
            .nwc_info
            .values()
            .find(|descriptor| !descriptor.nwc_string.is_empty());

        let backing_ledger_url = primary
            .map(|d| d.mymint.as_str())
            .filter(|mint| !mint.is_empty())
            .unwrap_or(default_mint)
            .to_string();

        Self {
            connected: primary.is_some(),
            primary_connection_string: primary.map(|d| d.nwc_string.clone()),
            backing_ledger_url,
            utxo_count: snapshot.utxos.len(),
            session_count: snapshot.nwc_info.len(),
            balance: snapshot.balance(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_parses_legacy_layout_and_keeps_unknown_fields() {
        let raw = r#"{
            "utxos": [ { "id": "token1", "amount": 10, "secret": "s", "C": "02ab" } ],
            "nwc_info": { "pubkey1": { "balance": 100 } }
        }"#;
        let snapshot: Snapshot = serde_json::from_str(raw).unwrap();

        assert_eq!(snapshot.balance(), 10);
        assert_eq!(snapshot.utxos[0].extra.get("secret"), Some(&Value::from("s")));
        assert!(snapshot.processed_settlements.is_empty());

        let descriptor = &snapshot.nwc_info["pubkey1"];
        assert!(descriptor.nwc_string.is_empty());
        assert_eq!(descriptor.extra.get("balance"), Some(&Value::from(100)));

        let written = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(written["utxos"][0]["C"], "02ab");
        assert_eq!(written["nwc_info"]["pubkey1"]["balance"], 100);
    }

    #[test]
    fn settlement_status_mapping_is_stable() {
        assert_eq!(SettlementStatus::from_raw("PAID"), SettlementStatus::Settled);
        assert_eq!(SettlementStatus::from_raw("settled"), SettlementStatus::Settled);
        assert_eq!(SettlementStatus::from_raw("UNPAID"), SettlementStatus::Pending);
        assert_eq!(SettlementStatus::from_raw("EXPIRED"), SettlementStatus::Unknown);
    }

    #[test]
    fn status_prefers_primary_session_mint() {
        let mut snapshot = Snapshot::default();
        snapshot.utxos.push(UnspentRecord::new("a", 10, None));
        snapshot.nwc_info.insert(
            "aa".to_string(),
            SessionDescriptor {
                mymint: "https://mint.example".to_string(),
                nwc_string: "nostr+walletconnect://x".to_string(),
                ..SessionDescriptor::default()
            },
        );

        let status = BridgeStatus::from_snapshot(&snapshot, "https://default.example");
        assert!(status.connected);
        assert_eq!(status.backing_ledger_url, "https://mint.example");
        assert_eq!(status.utxo_count, 1);
        assert_eq!(status.session_count, 1);
        assert_eq!(status.balance, 10);
    }

    #[test]
    fn balance_of_oversized_file_saturates() {
        let mut snapshot = Snapshot::default();
        snapshot.utxos.push(UnspentRecord::new("a", u64::MAX / 2 + 1, None));
        snapshot.utxos.push(UnspentRecord::new("b", u64::MAX / 2 + 1, None));

        assert_eq!(snapshot.balance(), u64::MAX);
        let status = BridgeStatus::from_snapshot(&snapshot, "https://default.example");
        assert_eq!(status.balance, u64::MAX);
    }

    #[test]
    fn status_of_empty_snapshot_is_disconnected() {
        let status = BridgeStatus::from_snapshot(&Snapshot::default(), "https://default.example");
        assert!(!status.connected);
        assert!(status.primary_connection_string.is_none());
        assert_eq!(status.backing_ledger_url, "https://default.example");
    }
}
