//! # Sweeper Client Library
//!
//! Client side of a multiplayer minesweeper played on an unbounded board.
//! The server owns the board; this crate keeps a sparse local copy of the
//! tiles it has been told about, tracks the players that own them and keeps
//! the local viewport in sync over a WebSocket that carries JSON intents and
//! responses.
//!
//! ## Architecture Overview
//!
//! All game state lives on the UI thread. A tokio task owns the socket and
//! talks to the UI thread over two unbounded channels: outbound intents as
//! encoded text, inbound frames as [`network::TransportEvent`]s. The UI thread
//! drains those events once per frame, so state is only ever touched from
//! one place and in the order frames arrived.
//!
//! ### Sparse Tile Cache
//! The board has no edges, so tiles are stored by position in a map. Server
//! deltas only ever add facts: a known field is never overwritten, and a
//! delta that disagrees with a known field is reported as a
//! [`error::ConsistencyError`] instead of being applied.
//!
//! ### Viewport Sync
//! The viewport is kept in pixels. Every request to the server and every
//! render pass derives its tile bounds from the same conversion in
//! [`coords`], so the client draws exactly what it asked for.
//!
//! ## Module Organization
//!
//! ### Model (`tiles`, `players`, `game`, `viewport`, `coords`)
//! - Tile store with conflict-reporting merges and area queries
//! - Player registry with scores and play time
//! - The single [`game::GameState`] container
//!
//! ### Wire (`protocol`, `session`, `network`, `token`)
//! - Per-message handlers behind one common merge step
//! - Connection status and fail-fast sending
//! - The WebSocket transport task and the [`network::Client`] core
//! - Reconnect token persistence
//!
//! ### Presentation (`rendering`, `input`, `leaderboard`)
//! - Full and incremental repaints onto a [`rendering::TileSurface`]
//! - Drag versus click pointer handling
//! - Leaderboard row selection around the current player
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{spawn_transport, Client, ClientConfig};
//! use client::token::MemoryTokenStore;
//!
//! let runtime = tokio::runtime::Runtime::new().unwrap();
//! let mut client = Client::new(ClientConfig::default(), Box::new(MemoryTokenStore::default())).unwrap();
//!
//! let mut transport = spawn_transport(runtime.handle(), "ws://127.0.0.1:3030/ws");
//! client.connect(transport.outbound.clone());
//!
//! // Once per frame
//! while let Ok(event) = transport.events.try_recv() {
//!     client.handle_transport_event(event);
//! }
//! ```

pub mod coords;
pub mod error;
pub mod game;
pub mod input;
pub mod leaderboard;
pub mod network;
pub mod players;
pub mod protocol;
pub mod rendering;
pub mod session;
pub mod tiles;
pub mod token;
pub mod viewport;
