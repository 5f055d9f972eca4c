// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Crate-level error wrapping each component's error type.
//!
//! Inside a running bridge none of these are fatal: components log them and
//! degrade. They surface to callers only from construction and `stop()`.

use crate::config::ConfigError;
use crate::nwc::SessionError;
use crate::providers::PaymentSourceError;
use crate::settlement::{ClaimError, MergeError};
use crate::signing::SigningError;
use crate::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("state store error: {0}")]
    Storage(#[from] StorageError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("signing error: {0}")]
    Signing(#[from] SigningError),

    #[error("payment service error: {0}")]
    PaymentSource(#[from] PaymentSourceError),

    #[error("claim error: {0}")]
    Claim(#[from] ClaimError),

    #[error("merge error: {0}")]
    Merge(#[from] MergeError),
}

pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_component_errors_with_context() {
        let err: BridgeError = ConfigError::ZeroInterval {
            field: "sweep_interval_ms",
        }
        .into();
        assert_eq!(
            err.to_string(),
            "configuration error: sweep_interval_ms must be greater than zero"
        );

        let err: BridgeError = MergeError::WorkerStopped.into();
        assert!(matches!(err, BridgeError::Merge(MergeError::WorkerStopped)));
    }
}
