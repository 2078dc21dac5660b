// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cmmt-pc-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! This module provides utility functions for working with configuration
//! settings, including validation and schema management.

use anyhow::{Context, Result};
use log::{debug, warn};

use super::Config;

/// Output the embedded JSON schema to the console.
///
/// Called when the `--show-config-schema` flag is given on the command line.
///
/// ```bash
/// ./cmmt_pc_control --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    let schema_str = include_str!("../../resources/config.schema.json");

    let schema: serde_json::Value =
        serde_json::from_str(schema_str).context("Failed to parse JSON schema")?;

    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;

    println!("{}", formatted_schema);

    Ok(())
}

/// Check if a string is a valid IPv4 or IPv6 address
pub fn is_valid_ip_address(addr: &str) -> bool {
    addr.parse::<std::net::IpAddr>().is_ok()
}

/// Longest jog or update interval accepted, in milliseconds
pub const MAX_INTERVAL_MS: u64 = 60_000;

/// Validates the configuration against rules the JSON schema does not cover.
///
/// - **Scale factor**: must be strictly positive
/// - **Timing**: request timeout, update and jog intervals must be non-zero,
///   and at most [`MAX_INTERVAL_MS`], the update interval shorter than the
///   request timeout
/// - **Address**: a malformed drive address only produces a warning, the
///   operator can still type another one in the console
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    debug!("Performing additional validation checks");

    if config.positioning.scale_factor <= 0 {
        anyhow::bail!(
            "Invalid positioning scale factor: {}",
            config.positioning.scale_factor
        );
    }

    if config.drive.timeout_ms == 0 {
        anyhow::bail!("Drive timeout must not be zero");
    }

    if config.drive.update_interval_ms == 0 {
        anyhow::bail!("Drive update interval must not be zero");
    }

    if config.drive.update_interval_ms >= config.drive.timeout_ms {
        anyhow::bail!(
            "Drive update interval ({} ms) must be shorter than the timeout ({} ms)",
            config.drive.update_interval_ms,
            config.drive.timeout_ms
        );
    }

    if config.jog.interval_ms == 0 {
        anyhow::bail!("Jog interval must not be zero");
    }

    for (name, value) in [
        ("Jog interval", config.jog.interval_ms),
        ("Drive update interval", config.drive.update_interval_ms),
    ] {
        if value > MAX_INTERVAL_MS {
            anyhow::bail!(
                "{} ({} ms) must not exceed {} ms",
                name,
                value,
                MAX_INTERVAL_MS
            );
        }
    }

    if !is_valid_ip_address(&config.drive.address) {
        warn!(
            "Configured drive address '{}' is not a valid IP address",
            config.drive.address
        );
    }

    Ok(())
}
