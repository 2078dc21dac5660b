// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cmmt-pc-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;

use cmmt_pc_control::modbus::{drive_server::DEFAULT_JOG_STEP, serve, DriveModel};

/// Simulated CMMT drive answering telegram 111 over Modbus TCP
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Listen address
    #[clap(long, default_value = "127.0.0.1")]
    address: String,

    /// Listen port
    #[clap(long, default_value = "502")]
    port: u16,

    /// First holding register of the setpoint words
    #[clap(long, default_value = "0")]
    output_register: u16,

    /// First input register of the status words
    #[clap(long, default_value = "0")]
    input_register: u16,

    /// Distance moved per setpoint write while jogging, in device units
    #[clap(long, default_value_t = DEFAULT_JOG_STEP)]
    jog_step: i32,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let args = Args::parse();

    let socket_addr: SocketAddr = format!("{}:{}", args.address, args.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", args.address, args.port))?;
    let listener = TcpListener::bind(socket_addr)
        .await
        .with_context(|| format!("Failed to listen on {}", socket_addr))?;

    let model = DriveModel::new(args.output_register, args.input_register)
        .with_jog_step(args.jog_step);
    serve(listener, Arc::new(Mutex::new(model))).await?;
    Ok(())
}
