// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cmmt-pc-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Drive session management
//!
//! The [`SessionManager`] owns the link to the drive, if any, and gates every
//! command behind two checks:
//! - a session must exist, otherwise [`PanelError::NotConnected`]
//! - motion commands also need the drive to report readiness, otherwise
//!   [`PanelError::NotReady`]
//!
//! Both gate errors are meant to be dropped silently by the caller, see
//! [`PanelError::is_silent`].

use std::net::IpAddr;

use log::{debug, error, info};

use crate::drive::{DriveConnector, DriveLink};
use crate::error::PanelError;
use crate::jog::JogRequest;
use crate::positioning::PositionCommand;

/// An open link to the drive
pub struct Session {
    link: Box<dyn DriveLink + Send>,
    address: IpAddr,
}

impl Session {
    pub fn address(&self) -> IpAddr {
        self.address
    }
}

/// Owns the drive session and the readiness gate
pub struct SessionManager {
    connector: Box<dyn DriveConnector + Send + Sync>,
    session: Option<Session>,
    continuous_update: bool,
}

impl SessionManager {
    /// Create a manager without session.
    ///
    /// `continuous_update` is applied to every link opened by [`connect`].
    ///
    /// [`connect`]: SessionManager::connect
    pub fn new(connector: Box<dyn DriveConnector + Send + Sync>, continuous_update: bool) -> Self {
        Self {
            connector,
            session: None,
            continuous_update,
        }
    }

    /// Open a session to the drive at `address`.
    ///
    /// The address must be a literal IPv4 or IPv6 address. A malformed
    /// address is logged and rejected before any connection attempt, and the
    /// current session is kept. A successful connection replaces the current
    /// session.
    pub async fn connect(&mut self, address: &str) -> Result<IpAddr, PanelError> {
        let ip: IpAddr = match address.parse() {
            Ok(ip) => ip,
            Err(_) => {
                error!("The IP address '{}' is not valid", address);
                return Err(PanelError::InvalidAddress(address.to_string()));
            }
        };

        let mut link = self.connector.open(ip).await?;
        link.configure_continuous_update(self.continuous_update);

        if let Some(previous) = self.session.replace(Session { link, address: ip }) {
            info!(
                "Replaced session to {} with a new session to {}",
                previous.address, ip
            );
        } else {
            info!("Connected to drive at {}", ip);
        }
        Ok(ip)
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Address of the current session
    pub fn address(&self) -> Option<IpAddr> {
        self.session.as_ref().map(Session::address)
    }

    /// Readiness reported by the drive, `false` without session
    pub async fn is_ready(&mut self) -> Result<bool, PanelError> {
        match self.session.as_mut() {
            Some(session) => Ok(session.link.is_ready_for_motion().await?),
            None => Ok(false),
        }
    }

    fn connected_link(&mut self) -> Result<&mut (dyn DriveLink + Send), PanelError> {
        match self.session.as_mut() {
            Some(session) => Ok(session.link.as_mut()),
            None => Err(PanelError::NotConnected),
        }
    }

    async fn ready_link(&mut self) -> Result<&mut (dyn DriveLink + Send), PanelError> {
        let session = self.session.as_mut().ok_or(PanelError::NotConnected)?;
        if !session.link.is_ready_for_motion().await? {
            return Err(PanelError::NotReady);
        }
        Ok(session.link.as_mut())
    }

    pub async fn acknowledge_faults(&mut self) -> Result<(), PanelError> {
        self.connected_link()?.acknowledge_faults().await?;
        Ok(())
    }

    pub async fn disable_powerstage(&mut self) -> Result<(), PanelError> {
        self.connected_link()?.disable_powerstage().await?;
        Ok(())
    }

    pub async fn enable_powerstage(&mut self) -> Result<(), PanelError> {
        self.ready_link().await?.enable_powerstage().await?;
        Ok(())
    }

    /// Enable the power stage and run the homing procedure
    pub async fn reference(&mut self) -> Result<(), PanelError> {
        let link = self.ready_link().await?;
        link.enable_powerstage().await?;
        link.reference_axis().await?;
        Ok(())
    }

    /// Enable the power stage and run one position task
    pub async fn position_move(&mut self, command: PositionCommand) -> Result<(), PanelError> {
        let link = self.ready_link().await?;
        link.enable_powerstage().await?;
        link.move_to(command.position, command.velocity, command.absolute)
            .await?;
        Ok(())
    }

    /// Enable the power stage and send the first jog request of a hold
    pub(crate) async fn start_jog(&mut self, request: JogRequest) -> Result<(), PanelError> {
        let link = self.ready_link().await?;
        link.enable_powerstage().await?;
        request.submit(link).await?;
        Ok(())
    }

    /// Send a follow-up jog request while a hold lasts
    pub(crate) async fn jog(&mut self, request: JogRequest) -> Result<(), PanelError> {
        request.submit(self.ready_link().await?).await?;
        Ok(())
    }

    /// Stop motion and disable the power stage, regardless of readiness
    pub async fn stop_and_disable(&mut self) -> Result<(), PanelError> {
        let link = self.connected_link()?;
        link.stop_motion().await?;
        link.disable_powerstage().await?;
        Ok(())
    }

    /// One process data exchange, nothing without session
    pub async fn refresh(&mut self) -> Result<(), PanelError> {
        if let Some(session) = self.session.as_mut() {
            session.link.refresh().await?;
        } else {
            debug!("No session to refresh");
        }
        Ok(())
    }
}
