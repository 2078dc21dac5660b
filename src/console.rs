// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cmmt-pc-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Operator console
//!
//! Reads one command per line and turns it into [`PanelEvent`]s for the
//! panel loop. Jog controls are pressed and released with separate commands,
//! or held for a given time with `hold+`/`hold-`.

use std::time::Duration;

use log::debug;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::time;

use crate::config::Config;
use crate::jog::JogDirection;
use crate::panel::PanelEvent;

pub const HELP: &str = "\
Commands:
  connect [ip]             connect to the drive (default: configured address)
  ack                      acknowledge drive faults
  enable | disable         enable or disable the power stage
  home                     run the homing procedure
  jog+ | jog-              press a jog control
  release+ | release-      release a jog control
  hold+ <ms> | hold- <ms>  hold a jog control for <ms> milliseconds
  abs | rel                absolute or relative position tasks
  move [mm] [mm/s] [abs|rel]
                           move to position (default: configured values)
  status                   show connection and jog state
  help                     show this help
  quit                     leave";

/// Errors in an operator command line
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command '{0}', type 'help' for the list of commands")]
    Unknown(String),

    #[error("Missing {0}")]
    MissingArgument(&'static str),

    #[error("Invalid {argument} '{value}'")]
    InvalidNumber {
        argument: &'static str,
        value: String,
    },

    #[error("Unexpected argument '{0}'")]
    UnexpectedArgument(String),
}

/// A parsed command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Send(PanelEvent),
    /// Press, wait, release
    Hold(JogDirection, Duration),
    Help,
}

/// Line oriented front end of the panel
#[derive(Debug, Clone)]
pub struct Console {
    default_address: String,
    default_position: i64,
    default_velocity: i64,
}

impl Console {
    pub fn new(config: &Config) -> Self {
        Self {
            default_address: config.drive.address.clone(),
            default_position: config.positioning.default_position,
            default_velocity: config.positioning.default_velocity,
        }
    }

    /// Parse one line, `None` for a blank line
    pub fn parse(&self, line: &str) -> Result<Option<ConsoleCommand>, CommandError> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();

        let command = match name.to_ascii_lowercase().as_str() {
            "connect" => {
                let address = args.first().copied().unwrap_or(&self.default_address);
                no_more(&args, 1)?;
                ConsoleCommand::Send(PanelEvent::Connect(address.to_string()))
            }
            "ack" => simple(&args, PanelEvent::AcknowledgeFaults)?,
            "enable" => simple(&args, PanelEvent::EnablePowerstage)?,
            "disable" => simple(&args, PanelEvent::DisablePowerstage)?,
            "home" => simple(&args, PanelEvent::Reference)?,
            "jog+" => simple(&args, PanelEvent::JogPressed(JogDirection::Positive))?,
            "jog-" => simple(&args, PanelEvent::JogPressed(JogDirection::Negative))?,
            "release+" => simple(&args, PanelEvent::JogReleased(JogDirection::Positive))?,
            "release-" => simple(&args, PanelEvent::JogReleased(JogDirection::Negative))?,
            "hold+" => hold(&args, JogDirection::Positive)?,
            "hold-" => hold(&args, JogDirection::Negative)?,
            "abs" => simple(&args, PanelEvent::SetAbsolute(true))?,
            "rel" => simple(&args, PanelEvent::SetAbsolute(false))?,
            "move" => {
                let position = match args.first() {
                    Some(value) => number("position", value)?,
                    None => self.default_position,
                };
                let velocity = match args.get(1) {
                    Some(value) => number("velocity", value)?,
                    None => self.default_velocity,
                };
                let absolute = match args.get(2).copied() {
                    Some("abs") => Some(true),
                    Some("rel") => Some(false),
                    Some(other) => return Err(CommandError::UnexpectedArgument(other.to_string())),
                    None => None,
                };
                no_more(&args, 3)?;
                ConsoleCommand::Send(PanelEvent::MoveToPosition {
                    position,
                    velocity,
                    absolute,
                })
            }
            "status" => simple(&args, PanelEvent::Status)?,
            "help" | "?" => ConsoleCommand::Help,
            "quit" | "exit" => simple(&args, PanelEvent::Quit)?,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }

    /// Read commands from `input` until end of input, `quit` or the panel
    /// going away.
    pub async fn run<R>(self, input: R, events: mpsc::Sender<PanelEvent>) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await? {
            let command = match self.parse(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(err) => {
                    println!("{}", err);
                    continue;
                }
            };
            debug!("Console command {:?}", command);

            match command {
                ConsoleCommand::Help => println!("{}", HELP),
                ConsoleCommand::Send(event) => {
                    let quit = event == PanelEvent::Quit;
                    if events.send(event).await.is_err() || quit {
                        return Ok(());
                    }
                }
                ConsoleCommand::Hold(direction, duration) => {
                    if events.send(PanelEvent::JogPressed(direction)).await.is_err() {
                        return Ok(());
                    }
                    time::sleep(duration).await;
                    if events.send(PanelEvent::JogReleased(direction)).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }

        // end of input
        let _ = events.send(PanelEvent::Quit).await;
        Ok(())
    }
}

fn simple(args: &[&str], event: PanelEvent) -> Result<ConsoleCommand, CommandError> {
    no_more(args, 0)?;
    Ok(ConsoleCommand::Send(event))
}

fn hold(args: &[&str], direction: JogDirection) -> Result<ConsoleCommand, CommandError> {
    let value = args
        .first()
        .ok_or(CommandError::MissingArgument("hold time in milliseconds"))?;
    let millis = value
        .parse::<u64>()
        .map_err(|_| CommandError::InvalidNumber {
            argument: "hold time",
            value: value.to_string(),
        })?;
    no_more(args, 1)?;
    Ok(ConsoleCommand::Hold(direction, Duration::from_millis(millis)))
}

fn number(argument: &'static str, value: &str) -> Result<i64, CommandError> {
    value.parse().map_err(|_| CommandError::InvalidNumber {
        argument,
        value: value.to_string(),
    })
}

fn no_more(args: &[&str], expected: usize) -> Result<(), CommandError> {
    match args.get(expected) {
        Some(extra) => Err(CommandError::UnexpectedArgument(extra.to_string())),
        None => Ok(()),
    }
}
