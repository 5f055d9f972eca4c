// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! External payment collaborators: the pull-style status service and the
//! push-style redeemed-payment feed.

pub mod npubcash;
pub mod push;

pub use npubcash::{
    AuthHandle, NpubCashClient, PaymentSourceError, PaymentStatusSource, SettlementRecord,
};
pub use push::{
    ChannelPushSource, PaymentPushSource, PushSubscription, RedeemedPayment,
    PAYMENT_REDEEMED_EVENT,
};
