// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::process::ExitCode;

use cashu_nwc_bridge::config::LOG_FORMAT_ENV;
use cashu_nwc_bridge::{Bridge, BridgeConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let config = match BridgeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    // The push feed stays open for the lifetime of the process.
    let (bridge, _push) = match Bridge::with_defaults(config) {
        Ok(built) => built,
        Err(e) => {
            error!(error = %e, "Failed to build bridge");
            return ExitCode::FAILURE;
        }
    };

    let report = bridge.start().await;
    if let Some(connection_string) = &report.provisioned_connection_string {
        println!();
        println!("New NWC connection created. Paste this into your app:");
        println!();
        println!("{connection_string}");
        println!();
    } else if let Some(primary) = bridge.status().await.primary_connection_string {
        info!(connection_string = %primary, "Using existing NWC connection");
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }

    match bridge.stop().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Final save failed");
            ExitCode::FAILURE
        }
    }
}

/// `LOG_FORMAT=json` selects JSON lines; `RUST_LOG` sets the filter.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|format| format.trim().eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }
}
