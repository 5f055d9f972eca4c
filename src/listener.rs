// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Push listener for redeemed payments.
//!
//! Subscribes once to [`PAYMENT_REDEEMED_EVENT`] and forwards every delivery
//! to the merge worker, so a payment seen here and by the sweeper is
//! credited once. The subscription is released when the task ends.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::{SettlementEvent, SettlementSource, SettlementStatus};
use crate::providers::{PaymentPushSource, PushSubscription, PAYMENT_REDEEMED_EVENT};
use crate::settlement::MergeHandle;
use crate::signing::IdentityStatus;
use crate::state::MergeOutcome;

/// Forwards pushed redemptions to the merge worker.
pub struct PaymentListener {
    identity: IdentityStatus,
    push: Arc<dyn PaymentPushSource>,
    merge: MergeHandle,
}

impl PaymentListener {
    pub fn new(
        identity: IdentityStatus,
        push: Arc<dyn PaymentPushSource>,
        merge: MergeHandle,
    ) -> Self {
        Self {
            identity,
            push,
            merge,
        }
    }

    /// Subscribe and spawn the forwarding task. Returns `None` when the
    /// listener cannot start; the bridge keeps running without it.
    pub async fn start(self, shutdown: CancellationToken) -> Option<JoinHandle<()>> {
        let Some(identity) = self.identity.identity() else {
            let reason = self.identity.reason().unwrap_or_default();
            warn!(reason = %reason, "Payment listener not started");
            return None;
        };

        let subscription = match self.push.subscribe(PAYMENT_REDEEMED_EVENT, identity).await {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!(error = %e, "Payment listener could not subscribe");
                return None;
            }
        };

        info!(
            event = PAYMENT_REDEEMED_EVENT,
            pubkey = %identity.public_key_hex(),
            "Payment listener subscribed"
        );
        Some(tokio::spawn(forward(subscription, self.merge, shutdown)))
    }
}

async fn forward(
    mut subscription: PushSubscription,
    merge: MergeHandle,
    shutdown: CancellationToken,
) {
    loop {
        let payment = tokio::select! {
            _ = shutdown.cancelled() => break,
            payment = subscription.recv() => match payment {
                Some(payment) => payment,
                None => {
                    info!("Push source closed");
                    break;
                }
            },
        };

        let event = SettlementEvent::new(
            payment.external_id.clone(),
            payment.amount,
            SettlementStatus::Settled,
            SettlementSource::Push,
        );
        match merge.submit(event).await {
            Ok(MergeOutcome::Credited { amount }) => {
                info!(external_id = %payment.external_id, amount, "Pushed payment credited");
            }
            Ok(outcome) => {
                debug!(external_id = %payment.external_id, ?outcome, "Pushed payment ignored");
            }
            Err(e) => {
                warn!(external_id = %payment.external_id, error = %e, "Pushed payment not merged");
            }
        }
    }

    subscription.unsubscribe();
    debug!("Payment listener stopped");
}
