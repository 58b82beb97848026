//! Connection lifecycle and player identity.
//!
//! The session tracks where the connection stands and owns the outbound half
//! of the transport. Sending never blocks and never queues: anything sent
//! while the connection is not open fails right away with
//! [`SessionError::NotConnected`].

use crate::error::SessionError;
use log::{debug, warn};
use shared::ClientAction;
use std::fmt;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Open,
    Closed,
    Errored,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Open => "open",
            ConnectionStatus::Closed => "closed",
            ConnectionStatus::Errored => "errored",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct Session {
    status: ConnectionStatus,
    player_id: Option<u32>,
    token: Option<String>,
    outbound: Option<UnboundedSender<String>>,
    last_error: Option<String>,
}

impl Session {
    /// A fresh session, optionally carrying a token from an earlier run.
    pub fn new(stored_token: Option<String>) -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            player_id: None,
            token: stored_token,
            outbound: None,
            last_error: None,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_open(&self) -> bool {
        self.status == ConnectionStatus::Open
    }

    pub fn player_id(&self) -> Option<u32> {
        self.player_id
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Identity needed for intents that act on behalf of the player.
    pub fn credentials(&self) -> Result<(u32, String), SessionError> {
        match (self.player_id, &self.token) {
            (Some(id), Some(token)) => Ok((id, token.clone())),
            _ => Err(SessionError::NotJoined),
        }
    }

    /// Starts a new connection attempt over the given outbound channel.
    ///
    /// Allowed from every state except `Connecting` and `Open`; reconnecting a
    /// closed or failed session keeps the player identity so the next Join
    /// can resume it.
    pub fn begin_connect(&mut self, outbound: UnboundedSender<String>) -> bool {
        match self.status {
            ConnectionStatus::Connecting | ConnectionStatus::Open => {
                warn!("Ignoring connect request, session is already {}", self.status);
                false
            }
            _ => {
                self.outbound = Some(outbound);
                self.last_error = None;
                self.transition(ConnectionStatus::Connecting);
                true
            }
        }
    }

    pub fn on_open(&mut self) -> bool {
        if self.status != ConnectionStatus::Connecting {
            warn!("Unexpected open while session is {}", self.status);
            return false;
        }
        self.transition(ConnectionStatus::Open);
        true
    }

    pub fn on_close(&mut self, reason: Option<String>) {
        self.outbound = None;
        if let Some(reason) = reason {
            self.last_error = Some(reason);
        }
        self.transition(ConnectionStatus::Closed);
    }

    pub fn on_error(&mut self, error: String) {
        self.outbound = None;
        self.last_error = Some(error);
        self.transition(ConnectionStatus::Errored);
    }

    /// Records the identity handed out by the server on Join.
    pub fn adopt(&mut self, player_id: u32, token: String) {
        self.player_id = Some(player_id);
        self.token = Some(token);
    }

    /// Encodes and hands one intent to the transport.
    pub fn send(&mut self, action: &ClientAction) -> Result<(), SessionError> {
        if self.status != ConnectionStatus::Open {
            return Err(SessionError::NotConnected {
                status: self.status,
            });
        }
        let outbound = self.outbound.as_ref().ok_or(SessionError::TransportClosed)?;
        let text = serde_json::to_string(action)?;
        if outbound.send(text).is_err() {
            self.on_error("transport task stopped".to_string());
            return Err(SessionError::TransportClosed);
        }
        debug!("Sent {} intent", action.name());
        Ok(())
    }

    fn transition(&mut self, next: ConnectionStatus) {
        debug!("Session {} -> {}", self.status, next);
        self.status = next;
    }
}
