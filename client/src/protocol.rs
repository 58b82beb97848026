//! Inbound message routing.
//!
//! Every frame is decoded once into a typed [`ServerMessage`]. Before the
//! type-specific handler runs, the common merge step folds the message's tile
//! and player deltas into the game state, so handlers only deal with what is
//! specific to their message type. Messages are routed strictly one at a time
//! in arrival order.

use crate::error::{ConsistencyError, ProtocolError};
use crate::game::GameState;
use crate::session::Session;
use log::{debug, error, info, warn};
use shared::{MessageKind, ServerMessage};
use std::collections::HashMap;

/// How much of the screen a message invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Repaint the whole visible rectangle.
    Full,
    /// Repaint known tiles on top of what is already drawn.
    Incremental,
}

impl RenderMode {
    /// Combines two pending requests; a full repaint wins.
    pub fn merge(current: Option<RenderMode>, next: RenderMode) -> RenderMode {
        match (current, next) {
            (Some(RenderMode::Full), _) | (_, RenderMode::Full) => RenderMode::Full,
            _ => RenderMode::Incremental,
        }
    }
}

/// Follow-up work a handler asks the client to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reaction {
    pub render: Option<RenderMode>,
    pub refresh_leaderboard: bool,
    pub user_error: Option<String>,
}

/// Mutable state a handler may touch.
pub struct RouteContext<'a> {
    pub state: &'a mut GameState,
    pub session: &'a mut Session,
}

pub type Handler = Box<dyn FnMut(&mut RouteContext<'_>, &ServerMessage) -> Reaction>;

/// Result of routing one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routed {
    pub kind: MessageKind,
    pub reaction: Reaction,
    pub inconsistencies: Vec<ConsistencyError>,
}

pub struct ProtocolRouter {
    handlers: HashMap<MessageKind, Handler>,
}

impl Default for ProtocolRouter {
    fn default() -> Self {
        Self::with_default_handlers()
    }
}

impl ProtocolRouter {
    /// A router with no handlers; every message is reported as unhandled.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// A router wired with the standard handler for each message type.
    pub fn with_default_handlers() -> Self {
        let mut router = Self::empty();
        router.register(MessageKind::Joined, on_joined);
        router.register(MessageKind::Updated, on_updated);
        router.register(MessageKind::Uncovered, on_uncovered);
        router.register(MessageKind::NicknameUpdated, on_nickname_updated);
        router.register(MessageKind::Error, on_error);
        router
    }

    /// Installs or replaces the handler for one message type.
    pub fn register<F>(&mut self, kind: MessageKind, handler: F)
    where
        F: FnMut(&mut RouteContext<'_>, &ServerMessage) -> Reaction + 'static,
    {
        self.handlers.insert(kind, Box::new(handler));
    }

    pub fn is_registered(&self, kind: MessageKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Decodes, merges and dispatches one raw text frame.
    pub fn route_text(
        &mut self,
        ctx: &mut RouteContext<'_>,
        text: &str,
    ) -> Result<Routed, ProtocolError> {
        debug!("Received {} bytes", text.len());
        let message = ServerMessage::decode(text)?;
        self.route(ctx, &message)
    }

    /// Merges an already decoded message and dispatches it.
    pub fn route(
        &mut self,
        ctx: &mut RouteContext<'_>,
        message: &ServerMessage,
    ) -> Result<Routed, ProtocolError> {
        let kind = message.kind();
        let inconsistencies = merge_step(ctx.state, message);
        for problem in &inconsistencies {
            warn!("Inconsistent {} delta: {}", kind, problem);
        }

        let handler = self
            .handlers
            .get_mut(&kind)
            .ok_or(ProtocolError::Unhandled(kind))?;
        let reaction = handler(ctx, message);
        Ok(Routed {
            kind,
            reaction,
            inconsistencies,
        })
    }
}

/// The common pre-dispatch step: tiles first, then players.
fn merge_step(state: &mut GameState, message: &ServerMessage) -> Vec<ConsistencyError> {
    let mut problems = Vec::new();
    if let Some(tiles) = message.tiles() {
        if !tiles.is_empty() {
            let report = state.merge_tiles(tiles);
            debug!(
                "Merged tiles: {} new, {} filled, {} unchanged",
                report.inserted, report.filled, report.unchanged
            );
            problems.extend(report.conflicts);
        }
    }
    if let Some(players) = message.players() {
        if !players.is_empty() {
            problems.extend(state.merge_players(players));
        }
    }
    problems
}

fn on_joined(ctx: &mut RouteContext<'_>, message: &ServerMessage) -> Reaction {
    let ServerMessage::Joined(joined) = message else {
        return Reaction::default();
    };
    if joined.player_id == 0 {
        warn!("Refusing join reply: {}", ConsistencyError::InvalidPlayerId);
        return Reaction::default();
    }
    info!("Joined as player {}", joined.player_id);
    ctx.session.adopt(joined.player_id, joined.token.clone());
    if let Err(e) = ctx.state.seed_viewport(&joined.update_area) {
        warn!("Ignoring join area {:?}: {}", joined.update_area, e);
    }
    ctx.state.start_playing();
    Reaction {
        render: Some(RenderMode::Full),
        refresh_leaderboard: true,
        user_error: None,
    }
}

fn on_updated(_ctx: &mut RouteContext<'_>, _message: &ServerMessage) -> Reaction {
    Reaction {
        render: Some(RenderMode::Full),
        refresh_leaderboard: true,
        user_error: None,
    }
}

fn on_uncovered(_ctx: &mut RouteContext<'_>, _message: &ServerMessage) -> Reaction {
    Reaction {
        render: Some(RenderMode::Incremental),
        refresh_leaderboard: true,
        user_error: None,
    }
}

fn on_nickname_updated(ctx: &mut RouteContext<'_>, message: &ServerMessage) -> Reaction {
    let ServerMessage::NicknameUpdated(update) = message else {
        return Reaction::default();
    };
    if let Err(e) = ctx.state.rename_player(update.player_id, &update.new_name) {
        warn!("Cannot apply nickname: {}", e);
        return Reaction::default();
    }
    Reaction {
        refresh_leaderboard: true,
        ..Default::default()
    }
}

fn on_error(_ctx: &mut RouteContext<'_>, message: &ServerMessage) -> Reaction {
    let ServerMessage::Error(payload) = message else {
        return Reaction::default();
    };
    error!("Server error: {}", payload.message);
    Reaction {
        user_error: Some(payload.message.clone()),
        ..Default::default()
    }
}
