// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Push delivery of redeemed payments.
//!
//! A subscription is a bounded channel plus an unsubscribe hook. Dropping
//! the subscription unsubscribes as well, so a listener that exits for any
//! reason releases its registration.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::npubcash::PaymentSourceError;
use crate::signing::SigningIdentity;

/// Event emitted by the receiver when a payment quote has been redeemed.
pub const PAYMENT_REDEEMED_EVENT: &str = "mint-quote:redeemed";

const SUBSCRIPTION_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedeemedPayment {
    pub external_id: String,
    pub amount: u64,
}

type UnsubscribeFn = Box<dyn FnOnce() + Send + Sync>;

pub struct PushSubscription {
    receiver: mpsc::Receiver<RedeemedPayment>,
    unsubscribe: Option<UnsubscribeFn>,
}

impl PushSubscription {
    /// Wrap `receiver`; `unsubscribe` runs once, on release or drop.
    pub fn new(
        receiver: mpsc::Receiver<RedeemedPayment>,
        unsubscribe: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            receiver,
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Next delivered payment; `None` once the source has gone away.
    pub async fn recv(&mut self) -> Option<RedeemedPayment> {
        self.receiver.recv().await
    }

    /// Release the subscription now.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for PushSubscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait]
pub trait PaymentPushSource: Send + Sync {
    /// Register a handler for `event_name` on behalf of `identity`.
    async fn subscribe(
        &self,
        event_name: &str,
        identity: &SigningIdentity,
    ) -> Result<PushSubscription, PaymentSourceError>;
}

struct Subscriber {
    id: u64,
    event_name: String,
    pubkey: String,
    tx: mpsc::Sender<RedeemedPayment>,
}

#[derive(Default)]
struct Subscribers {
    next_id: AtomicU64,
    entries: Mutex<Vec<Subscriber>>,
}

/// In-process push source. The token layer (or a test) calls
/// [`ChannelPushSource::emit`] when a quote is redeemed.
#[derive(Clone, Default)]
pub struct ChannelPushSource {
    subscribers: Arc<Subscribers>,
}

impl ChannelPushSource {
    /// Source with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .entries
            .lock()
            .map(|entries| entries.len())
            .unwrap_or(0)
    }

    /// Deliver `payment` to every subscriber of `event_name`. Returns how
    /// many subscribers accepted it.
    pub fn emit(&self, event_name: &str, payment: RedeemedPayment) -> usize {
        let Ok(entries) = self.subscribers.entries.lock() else {
            return 0;
        };

        let mut delivered = 0;
        for subscriber in entries.iter().filter(|s| s.event_name == event_name) {
            match subscriber.tx.try_send(payment.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    pubkey = %subscriber.pubkey,
                    error = %e,
                    "Dropped pushed payment"
                ),
            }
        }
        delivered
    }
}

#[async_trait]
impl PaymentPushSource for ChannelPushSource {
    async fn subscribe(
        &self,
        event_name: &str,
        identity: &SigningIdentity,
    ) -> Result<PushSubscription, PaymentSourceError> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        let id = self.subscribers.next_id.fetch_add(1, Ordering::Relaxed);

        self.subscribers
            .entries
            .lock()
            .map_err(|_| PaymentSourceError::Request("subscriber list poisoned".to_string()))?
            .push(Subscriber {
                id,
                event_name: event_name.to_string(),
                pubkey: identity.public_key_hex(),
                tx,
            });
        debug!(event = event_name, subscription = id, "Push subscription registered");

        let subscribers = Arc::clone(&self.subscribers);
        Ok(PushSubscription::new(rx, move || {
            if let Ok(mut entries) = subscribers.entries.lock() {
                entries.retain(|s| s.id != id);
            }
            debug!(subscription = id, "Push subscription released");
        }))
    }
}
