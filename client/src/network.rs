use crate::coords::DEFAULT_TILE_SIZE;
use crate::error::{SessionError, ViewportError};
use crate::game::GameState;
use crate::leaderboard::{Leaderboard, LeaderboardRow, SortKey};
use crate::protocol::{ProtocolRouter, RenderMode, RouteContext};
use crate::rendering::{RenderScheduler, RenderStats, TileSurface};
use crate::session::{ConnectionStatus, Session};
use crate::token::TokenStore;
use crate::viewport::Viewport;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{ClientAction, MessageKind};
use std::time::SystemTime;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Something that happened on the socket, delivered in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Message(String),
    Closed(Option<String>),
    Failed(String),
}

/// Both ends the UI thread needs from a running transport task.
pub struct Transport {
    pub outbound: UnboundedSender<String>,
    pub events: UnboundedReceiver<TransportEvent>,
}

/// Starts a WebSocket connection on the given runtime.
///
/// The task reports progress through `events` and writes whatever text
/// arrives on `outbound`. Dropping the sender closes the socket.
pub fn spawn_transport(runtime: &Handle, url: &str) -> Transport {
    let (outbound, outbound_rx) = mpsc::unbounded_channel();
    let (events_tx, events) = mpsc::unbounded_channel();
    runtime.spawn(run_transport(url.to_string(), outbound_rx, events_tx));
    Transport { outbound, events }
}

async fn run_transport(
    url: String,
    mut outbound: UnboundedReceiver<String>,
    events: UnboundedSender<TransportEvent>,
) {
    info!("Connecting to {}", url);
    let (ws, _response) = match connect_async(url.as_str()).await {
        Ok(pair) => pair,
        Err(e) => {
            let _ = events.send(TransportEvent::Failed(e.to_string()));
            return;
        }
    };
    if events.send(TransportEvent::Opened).is_err() {
        return;
    }
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if events.send(TransportEvent::Message(text.to_string())).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .filter(|reason| !reason.is_empty());
                    let _ = events.send(TransportEvent::Closed(reason));
                    break;
                }
                Some(Ok(other)) => debug!("Ignoring non-text frame: {:?}", other),
                Some(Err(e)) => {
                    let _ = events.send(TransportEvent::Failed(e.to_string()));
                    break;
                }
                None => {
                    let _ = events.send(TransportEvent::Closed(None));
                    break;
                }
            },

            text = outbound.recv() => match text {
                Some(text) => {
                    if let Err(e) = write.send(Message::text(text)).await {
                        let _ = events.send(TransportEvent::Failed(e.to_string()));
                        break;
                    }
                }
                None => {
                    debug!("Outbound channel dropped, closing socket");
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub tile_size: f32,
    pub width: f32,
    pub height: f32,
    /// Sent as an `UpdateNickname` intent after every successful Join.
    pub nickname: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            width: 800.0,
            height: 600.0,
            nickname: None,
        }
    }
}

/// The client core: game state, session, router and render scheduling.
///
/// Every method runs on the UI thread and returns without waiting on the
/// network. Transport events are fed in with
/// [`handle_transport_event`](Client::handle_transport_event) in the order
/// they arrived.
pub struct Client {
    state: GameState,
    session: Session,
    router: ProtocolRouter,
    scheduler: RenderScheduler,
    leaderboard: Leaderboard,
    token_store: Box<dyn TokenStore>,
    nickname: Option<String>,

    pending_render: Option<RenderMode>,
    leaderboard_stale: bool,
    user_error: Option<String>,
}

impl Client {
    pub fn new(config: ClientConfig, token_store: Box<dyn TokenStore>) -> Result<Self, ViewportError> {
        let viewport = Viewport::centered(f64::from(config.width), f64::from(config.height))?;
        let stored_token = token_store.load();
        if stored_token.is_some() {
            info!("Found a reconnect token, will try to resume the previous player");
        }

        Ok(Client {
            state: GameState::new(viewport, config.tile_size),
            session: Session::new(stored_token),
            router: ProtocolRouter::with_default_handlers(),
            scheduler: RenderScheduler::new(),
            leaderboard: Leaderboard::default(),
            token_store,
            nickname: config.nickname,
            pending_render: Some(RenderMode::Full),
            leaderboard_stale: false,
            user_error: None,
        })
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn leaderboard(&self) -> &Leaderboard {
        &self.leaderboard
    }

    /// Re-sorts the leaderboard; the active key again flips the order.
    pub fn sort_leaderboard(&mut self, key: SortKey) {
        self.leaderboard.sort_by(key);
        debug!(
            "Leaderboard sorted by {:?} ({:?})",
            self.leaderboard.sort_key, self.leaderboard.order
        );
        self.leaderboard_stale = true;
    }

    /// Last message for the user-visible error channel.
    pub fn user_error(&self) -> Option<&str> {
        self.user_error.as_deref()
    }

    pub fn pending_render(&self) -> Option<RenderMode> {
        self.pending_render
    }

    /// Attaches a freshly spawned transport.
    pub fn connect(&mut self, outbound: UnboundedSender<String>) -> bool {
        self.session.begin_connect(outbound)
    }

    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => {
                if self.session.on_open() {
                    info!("Connection open, joining");
                    self.send_join();
                }
            }
            TransportEvent::Message(text) => {
                self.handle_message(&text);
            }
            TransportEvent::Closed(reason) => {
                match &reason {
                    Some(reason) => warn!("Connection closed: {}", reason),
                    None => info!("Connection closed"),
                }
                self.session.on_close(reason);
            }
            TransportEvent::Failed(e) => {
                error!("Connection error: {}", e);
                self.session.on_error(e);
            }
        }
    }

    /// Routes one inbound frame. Bad frames are logged and dropped.
    pub fn handle_message(&mut self, text: &str) -> Option<MessageKind> {
        let mut ctx = RouteContext {
            state: &mut self.state,
            session: &mut self.session,
        };
        let routed = match self.router.route_text(&mut ctx, text) {
            Ok(routed) => routed,
            Err(e) => {
                warn!("Dropping message: {}", e);
                return None;
            }
        };

        let reaction = routed.reaction;
        if let Some(mode) = reaction.render {
            self.pending_render = Some(RenderMode::merge(self.pending_render, mode));
        }
        self.leaderboard_stale |= reaction.refresh_leaderboard;
        if let Some(message) = reaction.user_error {
            self.user_error = Some(message);
        }
        if routed.kind == MessageKind::Joined && self.session.player_id().is_some() {
            self.after_join();
        }
        Some(routed.kind)
    }

    fn after_join(&mut self) {
        if let Some(token) = self.session.token() {
            if let Err(e) = self.token_store.save(token) {
                warn!("Could not persist reconnect token: {}", e);
            }
        }
        if let Some(name) = self.nickname.clone() {
            let _ = self.rename(&name);
        }
    }

    fn send_join(&mut self) {
        let action = ClientAction::Join {
            visible_area: self.state.visible_area(),
            token: self.session.token().map(str::to_string),
        };
        let _ = self.send(&action);
    }

    /// Sends an intent, logging failures.
    pub fn send(&mut self, action: &ClientAction) -> Result<(), SessionError> {
        self.session.send(action).map_err(|e| {
            warn!("Cannot send {}: {}", action.name(), e);
            e
        })
    }

    /// Asks the server for the tiles under the current viewport.
    pub fn request_update(&mut self) -> Result<(), SessionError> {
        let action = ClientAction::Update {
            area_to_update: self.state.visible_area(),
        };
        self.send(&action)
    }

    /// Pans by a drag delta, repaints and requests the newly visible area.
    pub fn pan(&mut self, dx: f32, dy: f32) {
        if let Err(e) = self.state.pan(dx, dy) {
            warn!("Ignoring pan: {}", e);
            return;
        }
        self.pending_render = Some(RenderMode::Full);
        self.leaderboard_stale = true;
        let _ = self.request_update();
    }

    pub fn resize(&mut self, width: f32, height: f32) {
        if let Err(e) = self.state.resize(width, height) {
            warn!("Ignoring resize: {}", e);
            return;
        }
        self.pending_render = Some(RenderMode::Full);
        let _ = self.request_update();
    }

    /// Uncovers the tile under a window position.
    pub fn reveal_at(&mut self, x: f32, y: f32) -> Result<(), SessionError> {
        self.ensure_open()?;
        let (player_id, token) = self.session.credentials()?;
        let position = self.state.tile_at_pointer(x, y);
        debug!("Uncovering {}", position);
        let action = ClientAction::Uncover {
            player_id,
            token,
            position,
            visible_area: self.state.visible_area(),
        };
        self.send(&action)
    }

    pub fn rename(&mut self, name: &str) -> Result<(), SessionError> {
        self.ensure_open()?;
        let (player_id, token) = self.session.credentials()?;
        let action = ClientAction::UpdateNickname {
            player_id,
            token,
            new_name: name.to_string(),
        };
        self.send(&action)
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        match self.session.status() {
            ConnectionStatus::Open => Ok(()),
            status => {
                warn!("Not connected (connection is {})", status);
                Err(SessionError::NotConnected { status })
            }
        }
    }

    /// Paints whatever is pending, if anything.
    pub fn render_pending<S: TileSurface>(&mut self, surface: &mut S) -> Option<RenderStats> {
        let mode = self.pending_render.take()?;
        Some(self.scheduler.render(&self.state, surface, mode))
    }

    /// Returns true once after anything that changes the leaderboard.
    pub fn take_leaderboard_refresh(&mut self) -> bool {
        std::mem::take(&mut self.leaderboard_stale)
    }

    pub fn leaderboard_rows(&self, now: SystemTime) -> Vec<LeaderboardRow> {
        self.leaderboard.rows(
            self.state.players(),
            self.state.tiles(),
            self.session.player_id(),
            &self.state.visible_area(),
            now,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaderboard::SortOrder;
    use crate::rendering::TileFill;
    use crate::token::MemoryTokenStore;
    use std::time::{Duration, UNIX_EPOCH};
    use serde_json::{json, Value};
    use shared::{TileArea, TilePos};

    #[derive(Default)]
    struct CountingSurface {
        clears: usize,
        tiles: usize,
    }

    impl TileSurface for CountingSurface {
        fn size(&self) -> (f32, f32) {
            (800.0, 600.0)
        }

        fn clear(&mut self, _x: f32, _y: f32, _tile_size: f32) {
            self.clears += 1;
        }

        fn draw_tile(&mut self, _l: f32, _t: f32, _s: f32, _fill: &TileFill, _danger: Option<u8>) {
            self.tiles += 1;
        }
    }

    fn client_with(store: MemoryTokenStore, nickname: Option<&str>) -> Client {
        let config = ClientConfig {
            nickname: nickname.map(str::to_string),
            ..Default::default()
        };
        Client::new(config, Box::new(store)).unwrap()
    }

    fn open(client: &mut Client) -> UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        assert!(client.connect(tx));
        client.handle_transport_event(TransportEvent::Opened);
        rx
    }

    fn next_sent(rx: &mut UnboundedReceiver<String>) -> Value {
        serde_json::from_str(&rx.try_recv().expect("an intent was sent")).unwrap()
    }

    fn joined_text() -> String {
        json!({
            "Joined": {
                "player_id": 7,
                "token": "abc",
                "update_area": [[-5, -4], [5, 4]],
                "tiles": {
                    "0,0": {"is_mine": false, "adjacent_mines": 1, "player_id": 7},
                    "1,0": {"is_mine": true, "player_id": 7}
                },
                "players": {"7": {"name": "Ann", "color": "#FF0000", "score": 1, "join_time": 1700000000}}
            }
        })
        .to_string()
    }

    #[test]
    fn test_open_sends_join_with_visible_area() {
        let mut client = client_with(MemoryTokenStore::default(), None);
        let mut rx = open(&mut client);
        let join = next_sent(&mut rx);
        assert_eq!(join["action_type"], "Join");
        assert_eq!(join["visible_area"], json!([[-20, -15], [20, 15]]));
        assert_eq!(join["token"], Value::Null);
    }

    #[test]
    fn test_join_carries_stored_token() {
        let mut client = client_with(MemoryTokenStore::with_token("resume-me"), None);
        let mut rx = open(&mut client);
        assert_eq!(next_sent(&mut rx)["token"], "resume-me");
    }

    #[test]
    fn test_joined_updates_session_and_persists_token() {
        let mut client = client_with(MemoryTokenStore::default(), Some("Ann"));
        let mut rx = open(&mut client);
        next_sent(&mut rx);

        assert_eq!(client.handle_message(&joined_text()), Some(MessageKind::Joined));
        assert_eq!(client.session().player_id(), Some(7));
        assert_eq!(client.session().token(), Some("abc"));
        assert_eq!(client.state().tiles().len(), 2);
        assert_eq!(client.pending_render(), Some(RenderMode::Full));
        assert!(client.take_leaderboard_refresh());
        assert!(!client.take_leaderboard_refresh());

        let rename = next_sent(&mut rx);
        assert_eq!(rename["action_type"], "UpdateNickname");
        assert_eq!(rename["new_name"], "Ann");
        assert_eq!(rename["token"], "abc");
    }

    #[test]
    fn test_joined_as_player_zero_sends_nothing() {
        let mut client = client_with(MemoryTokenStore::with_token("old"), Some("Ann"));
        let mut rx = open(&mut client);
        next_sent(&mut rx);

        let mut reply: Value = serde_json::from_str(&joined_text()).unwrap();
        reply["Joined"]["player_id"] = json!(0);
        assert_eq!(client.handle_message(&reply.to_string()), Some(MessageKind::Joined));
        assert_eq!(client.session().player_id(), None);
        assert!(!client.state().is_playing());
        assert!(rx.try_recv().is_err());
        assert!(client.reveal_at(400.0, 300.0).is_err());
    }

    #[test]
    fn test_reveal_requires_connection_and_identity() {
        let mut client = client_with(MemoryTokenStore::default(), None);
        assert!(matches!(
            client.reveal_at(10.0, 10.0),
            Err(SessionError::NotConnected {
                status: ConnectionStatus::Disconnected
            })
        ));
        assert!(client.state().tiles().is_empty());

        let mut rx = open(&mut client);
        next_sent(&mut rx);
        assert!(matches!(
            client.reveal_at(10.0, 10.0),
            Err(SessionError::NotJoined)
        ));

        client.handle_message(&joined_text());
        client.reveal_at(105.0, 85.0).unwrap();
        let uncover = next_sent(&mut rx);
        assert_eq!(uncover["action_type"], "Uncover");
        assert_eq!(uncover["position"], json!([0, 0]));
        assert_eq!(uncover["player_id"], 7);
        assert_eq!(uncover["visible_area"], json!([[-5, -4], [5, 4]]));
    }

    #[test]
    fn test_pan_moves_view_and_requests_area() {
        let mut client = client_with(MemoryTokenStore::default(), None);
        let mut rx = open(&mut client);
        next_sent(&mut rx);
        client.handle_message(&joined_text());
        client.render_pending(&mut CountingSurface::default());

        client.pan(-20.0, 0.0);
        assert_eq!(client.state().visible_area(), TileArea::from_corners(-4, -4, 6, 4));
        let update = next_sent(&mut rx);
        assert_eq!(update["action_type"], "Update");
        assert_eq!(update["area_to_update"], json!([[-4, -4], [6, 4]]));
        assert_eq!(client.pending_render(), Some(RenderMode::Full));
    }

    #[test]
    fn test_pan_while_disconnected_is_local_only() {
        let mut client = client_with(MemoryTokenStore::default(), None);
        client.pan(40.0, 0.0);
        assert_eq!(client.state().viewport().left(), -440.0);
        assert_eq!(client.session().status(), ConnectionStatus::Disconnected);
        assert!(client.state().tiles().is_empty());
    }

    #[test]
    fn test_render_pending_consumes_request() {
        let mut client = client_with(MemoryTokenStore::default(), None);
        let mut rx = open(&mut client);
        next_sent(&mut rx);
        client.handle_message(&joined_text());

        let mut surface = CountingSurface::default();
        let stats = client.render_pending(&mut surface).unwrap();
        assert_eq!(surface.clears, 1);
        assert_eq!(stats.drawn, 2);
        assert!(client.render_pending(&mut surface).is_none());

        client.handle_message(
            &json!({"Uncovered": {"tiles": {"2,2": {"is_mine": false, "adjacent_mines": 0, "player_id": 7}}}})
                .to_string(),
        );
        assert_eq!(client.pending_render(), Some(RenderMode::Incremental));
        client.render_pending(&mut surface).unwrap();
        assert_eq!(surface.clears, 1);
        assert!(client.state().tiles().get(TilePos::new(2, 2)).is_some());
    }

    #[test]
    fn test_bad_frames_do_not_break_the_client() {
        let mut client = client_with(MemoryTokenStore::default(), None);
        let mut rx = open(&mut client);
        next_sent(&mut rx);

        assert_eq!(client.handle_message("{not json"), None);
        assert_eq!(client.handle_message(r#"{"Mystery": {}}"#), None);
        assert_eq!(client.handle_message(&joined_text()), Some(MessageKind::Joined));
        assert!(client.session().is_open());
    }

    #[test]
    fn test_server_error_reaches_user_channel() {
        let mut client = client_with(MemoryTokenStore::default(), None);
        client.handle_message(r#"{"Error": {"message": "Tile already uncovered"}}"#);
        assert_eq!(client.user_error(), Some("Tile already uncovered"));
    }

    #[test]
    fn test_close_and_failure_update_status() {
        let mut client = client_with(MemoryTokenStore::default(), None);
        let _rx = open(&mut client);
        client.handle_transport_event(TransportEvent::Closed(Some("bye".to_string())));
        assert_eq!(client.session().status(), ConnectionStatus::Closed);
        assert!(client.request_update().is_err());

        let _rx = open(&mut client);
        assert!(client.session().is_open());
        client.handle_transport_event(TransportEvent::Failed("reset".to_string()));
        assert_eq!(client.session().status(), ConnectionStatus::Errored);
    }

    #[test]
    fn test_resize_keeps_corner() {
        let mut client = client_with(MemoryTokenStore::default(), None);
        client.resize(1000.0, 700.0);
        assert_eq!(client.state().viewport().left(), -400.0);
        assert_eq!(client.state().viewport().right(), 600.0);
        client.resize(0.0, 700.0);
        assert_eq!(client.state().viewport().right(), 600.0);
    }

    #[test]
    fn test_leaderboard_rows_follow_state() {
        let mut client = client_with(MemoryTokenStore::default(), None);
        let mut rx = open(&mut client);
        next_sent(&mut rx);
        client.handle_message(&joined_text());
        let rows = client.leaderboard_rows(SystemTime::now());
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_current);
        assert_eq!(rows[0].name, "Ann");
    }

    #[test]
    fn test_sort_leaderboard_refreshes_rows() {
        let mut client = client_with(MemoryTokenStore::default(), None);
        let mut rx = open(&mut client);
        next_sent(&mut rx);
        client.handle_message(
            &json!({
                "Updated": {
                    "tiles": {
                        "0,0": {"is_mine": false, "adjacent_mines": 1, "player_id": 1},
                        "1,0": {"is_mine": false, "adjacent_mines": 1, "player_id": 2}
                    },
                    "players": {
                        "1": {"name": "Slow", "color": "#111111", "score": 10, "join_time": 0},
                        "2": {"name": "Fast", "color": "#222222", "score": 5, "join_time": 1700000000}
                    }
                }
            })
            .to_string(),
        );
        client.take_leaderboard_refresh();
        let now = UNIX_EPOCH + Duration::from_secs(1_700_003_600);
        let ids = |client: &Client| -> Vec<u32> {
            client.leaderboard_rows(now).iter().map(|row| row.player_id).collect()
        };
        assert_eq!(ids(&client), vec![1, 2]);

        client.sort_leaderboard(SortKey::TilesPerHour);
        assert!(client.take_leaderboard_refresh());
        assert_eq!(client.leaderboard().sort_key, SortKey::TilesPerHour);
        assert_eq!(ids(&client), vec![2, 1]);

        client.sort_leaderboard(SortKey::TilesPerHour);
        assert_eq!(client.leaderboard().order, SortOrder::Ascending);
        assert_eq!(ids(&client), vec![1, 2]);
    }

    #[test]
    fn test_transport_reports_connection_failure() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut transport = spawn_transport(runtime.handle(), "ws://127.0.0.1:1/ws");
        let event = tokio_test::block_on(transport.events.recv());
        assert!(matches!(event, Some(TransportEvent::Failed(_))));
    }
}
