//! Error types for the client core.
//!
//! None of these are fatal. Callers log them and carry on with the next
//! event, which keeps a bad frame or a dropped socket from taking down the
//! game loop.

use crate::session::ConnectionStatus;
use shared::{DecodeError, MessageKind, TilePos};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("not connected (connection is {status})")]
    NotConnected { status: ConnectionStatus },
    #[error("no player identity yet, waiting for Joined")]
    NotJoined,
    #[error("transport task is gone")]
    TransportClosed,
    #[error("failed to encode intent: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("no handler registered for {0}")]
    Unhandled(MessageKind),
}

/// Which immutable tile fact a delta tried to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileField {
    IsMine,
    AdjacentMines,
    Owner,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsistencyError {
    #[error("tile {pos} already has a different {field:?}, keeping the first value")]
    TileConflict { pos: TilePos, field: TileField },
    #[error("player {player_id} is not in the registry")]
    MissingPlayer { player_id: u32 },
    #[error("player id 0 is not a valid identity")]
    InvalidPlayerId,
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ViewportError {
    #[error("viewport must have positive width and height, got {width}x{height}")]
    Degenerate { width: f64, height: f64 },
    #[error("viewport edges must be finite")]
    NonFinite,
}
