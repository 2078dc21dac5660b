// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cmmt-pc-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point of the CMMT control panel
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::{error, info};
use tokio::io::{stdin, BufReader};
use tokio::runtime::Builder;
use tokio::sync::mpsc;

use cmmt_pc_control::config::{output_config_schema, Config};
use cmmt_pc_control::console::Console;
use cmmt_pc_control::drive::create_connector;
use cmmt_pc_control::{Panel, PanelEvent};

/// Operator control panel for a CMMT servo drive
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (YAML), created with defaults if missing
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Drive IP address, overrides the configuration
    #[arg(short, long)]
    address: Option<String>,

    /// Modbus TCP port of the drive, overrides the configuration
    #[arg(short, long)]
    port: Option<u16>,

    /// Use an in-memory drive instead of the Modbus link
    #[arg(long)]
    simulate: bool,

    /// Connect to the configured address on startup
    #[arg(long)]
    connect: bool,

    /// Print the configuration JSON schema and exit
    #[arg(long)]
    show_config_schema: bool,
}

fn main() -> Result<()> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );
    let args = Args::parse();

    if args.show_config_schema {
        output_config_schema()?;
        return Ok(());
    }

    let mut config = Config::from_file(&args.config)?;
    config.apply_args(args.address, args.port, args.simulate);

    // stdin is read on the blocking pool, don't wait for it on exit
    let runtime = Builder::new_current_thread().enable_all().build()?;
    let result = runtime.block_on(run(config, args.connect));
    runtime.shutdown_background();
    result
}

async fn run(config: Config, connect: bool) -> Result<()> {
    let (events, receiver) = mpsc::channel(32);
    if connect {
        events
            .send(PanelEvent::Connect(config.drive.address.clone()))
            .await?;
    }

    let panel = Panel::new(create_connector(&config.drive), &config);
    let console = Console::new(&config);

    println!("CMMT control panel, type 'help' for the list of commands");
    tokio::spawn(async move {
        if let Err(err) = console.run(BufReader::new(stdin()), events).await {
            error!("Console input failed: {}", err);
        }
    });

    panel.run(receiver).await?;
    info!("Bye");
    Ok(())
}
