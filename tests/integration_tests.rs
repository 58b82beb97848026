//! Integration tests for the client against a real WebSocket peer
//!
//! Each test starts a scripted server on a local port, drives the client
//! through the transport task and checks the resulting state.

use assert_approx_eq::assert_approx_eq;
use client::network::{spawn_transport, Client, ClientConfig, Transport};
use client::token::{FileTokenStore, MemoryTokenStore, TokenStore};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::future::Future;
use std::time::{Duration, UNIX_EPOCH};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

type ServerSocket = WebSocketStream<TcpStream>;

/// Accepts one connection and hands it to `script`. Returns the URL to dial.
async fn serve_once<F, Fut>(script: F) -> String
where
    F: FnOnce(ServerSocket) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        script(ws).await;
    });
    format!("ws://{}/ws", addr)
}

async fn next_intent(ws: &mut ServerSocket) -> Option<Value> {
    while let Some(frame) = ws.next().await {
        match frame {
            Ok(Message::Text(text)) => return serde_json::from_str(&text).ok(),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
    None
}

async fn reply(ws: &mut ServerSocket, body: Value) {
    ws.send(Message::text(body.to_string())).await.unwrap();
}

/// Forwards every intent to the test until the client goes away.
async fn drain_into(ws: &mut ServerSocket, seen: &UnboundedSender<Value>) {
    while let Some(intent) = next_intent(ws).await {
        let _ = seen.send(intent);
    }
}

async fn pump_until(client: &mut Client, transport: &mut Transport, done: impl Fn(&Client) -> bool) {
    timeout(Duration::from_secs(5), async {
        while !done(client) {
            match transport.events.recv().await {
                Some(event) => client.handle_transport_event(event),
                None => break,
            }
        }
    })
    .await
    .expect("client did not reach the expected state in time");
}

async fn next_seen(seen: &mut UnboundedReceiver<Value>) -> Value {
    timeout(Duration::from_secs(5), seen.recv())
        .await
        .expect("server saw no intent in time")
        .expect("server script ended")
}

fn joined() -> Value {
    json!({
        "Joined": {
            "player_id": 4,
            "token": "secret-4",
            "update_area": [[-5, -4], [5, 4]],
            "tiles": {
                "0,0": {"is_mine": false, "adjacent_mines": 2, "player_id": 4},
                "-1,3": {"is_mine": true, "player_id": 4}
            },
            "players": {
                "4": {"name": "Ann", "color": "#00FF00", "score": 2, "join_time": 1700000000.0}
            }
        }
    })
}

fn connect(client: &mut Client, url: &str) -> Transport {
    let transport = spawn_transport(&Handle::current(), url);
    assert!(client.connect(transport.outbound.clone()));
    transport
}

/// HANDSHAKE TESTS
mod handshake_tests {
    use super::*;

    /// Tests that opening the socket sends Join and the reply seeds the client
    #[tokio::test]
    async fn join_handshake_populates_state() {
        let (seen_tx, mut seen) = mpsc::unbounded_channel();
        let url = serve_once(move |mut ws| async move {
            let join = next_intent(&mut ws).await.unwrap();
            let _ = seen_tx.send(join);
            reply(&mut ws, joined()).await;
            drain_into(&mut ws, &seen_tx).await;
        })
        .await;

        let dir = std::env::temp_dir().join(format!("sweeper-it-{}", std::process::id()));
        let token_path = dir.join("playerToken");
        let mut client = Client::new(
            ClientConfig::default(),
            Box::new(FileTokenStore::new(&token_path)),
        )
        .unwrap();
        let mut transport = connect(&mut client, &url);

        pump_until(&mut client, &mut transport, |c| c.session().player_id().is_some()).await;

        let join = next_seen(&mut seen).await;
        assert_eq!(join["action_type"], "Join");
        assert_eq!(join["visible_area"], json!([[-20, -15], [20, 15]]));
        assert_eq!(join["token"], Value::Null);

        assert!(client.state().is_playing());
        assert_eq!(client.session().token(), Some("secret-4"));
        assert_eq!(client.state().tiles().len(), 2);
        assert_eq!(client.state().players().get(4).unwrap().name, "Ann");
        assert_eq!(client.state().viewport().left(), -100.0);
        assert_eq!(client.state().viewport().bottom(), 80.0);
        assert_eq!(FileTokenStore::new(&token_path).load(), Some("secret-4".to_string()));

        let an_hour_in = UNIX_EPOCH + Duration::from_secs(1_700_003_600);
        let rows = client.leaderboard_rows(an_hour_in);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_current);
        assert_approx_eq!(rows[0].tiles_per_hour, 2.0, 1e-9);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    /// Tests that a stored token is offered on Join and the nickname follows
    #[tokio::test]
    async fn reconnect_token_and_nickname() {
        let (seen_tx, mut seen) = mpsc::unbounded_channel();
        let url = serve_once(move |mut ws| async move {
            let join = next_intent(&mut ws).await.unwrap();
            let _ = seen_tx.send(join);
            reply(&mut ws, joined()).await;
            drain_into(&mut ws, &seen_tx).await;
        })
        .await;

        let config = ClientConfig {
            nickname: Some("Annie".to_string()),
            ..Default::default()
        };
        let mut client = Client::new(config, Box::new(MemoryTokenStore::with_token("secret-4"))).unwrap();
        let mut transport = connect(&mut client, &url);
        pump_until(&mut client, &mut transport, |c| c.session().player_id().is_some()).await;

        assert_eq!(next_seen(&mut seen).await["token"], "secret-4");
        let rename = next_seen(&mut seen).await;
        assert_eq!(rename["action_type"], "UpdateNickname");
        assert_eq!(rename["player_id"], 4);
        assert_eq!(rename["new_name"], "Annie");
    }
}

/// GAMEPLAY TESTS
mod gameplay_tests {
    use super::*;

    /// Tests a full reveal round trip
    #[tokio::test]
    async fn reveal_round_trip() {
        let (seen_tx, mut seen) = mpsc::unbounded_channel();
        let url = serve_once(move |mut ws| async move {
            next_intent(&mut ws).await.unwrap();
            reply(&mut ws, joined()).await;

            let uncover = next_intent(&mut ws).await.unwrap();
            let _ = seen_tx.send(uncover);
            reply(
                &mut ws,
                json!({
                    "Uncovered": {
                        "tiles": {"1,1": {"is_mine": false, "adjacent_mines": 0, "player_id": 4}},
                        "players": {"4": {"name": "Ann", "color": "#00FF00", "score": 3, "join_time": 1700000000.0}}
                    }
                }),
            )
            .await;
            drain_into(&mut ws, &seen_tx).await;
        })
        .await;

        let mut client = Client::new(ClientConfig::default(), Box::new(MemoryTokenStore::default())).unwrap();
        let mut transport = connect(&mut client, &url);
        pump_until(&mut client, &mut transport, |c| c.state().is_playing()).await;

        // (1,1) sits at pixel (20,20) in world space, (120,100) on screen.
        client.reveal_at(125.0, 105.0).unwrap();
        let uncover = next_seen(&mut seen).await;
        assert_eq!(uncover["action_type"], "Uncover");
        assert_eq!(uncover["position"], json!([1, 1]));
        assert_eq!(uncover["token"], "secret-4");

        pump_until(&mut client, &mut transport, |c| c.state().tiles().len() == 3).await;
        assert_eq!(client.state().players().get(4).unwrap().score, 3);
    }

    /// Tests that bad frames are dropped without disturbing the session
    #[tokio::test]
    async fn malformed_frames_are_skipped() {
        let url = serve_once(|mut ws| async move {
            next_intent(&mut ws).await.unwrap();
            ws.send(Message::text("not json")).await.unwrap();
            reply(&mut ws, json!({"Teleported": {}})).await;
            reply(&mut ws, json!({"Joined": {}, "Updated": {}})).await;
            reply(&mut ws, joined()).await;
            while next_intent(&mut ws).await.is_some() {}
        })
        .await;

        let mut client = Client::new(ClientConfig::default(), Box::new(MemoryTokenStore::default())).unwrap();
        let mut transport = connect(&mut client, &url);
        pump_until(&mut client, &mut transport, |c| c.state().is_playing()).await;

        assert!(client.session().is_open());
        assert_eq!(client.state().tiles().len(), 2);
    }
}

/// CONNECTION LIFECYCLE TESTS
mod lifecycle_tests {
    use super::*;
    use client::error::SessionError;
    use client::session::ConnectionStatus;

    /// Tests that a server close is reported with its reason
    #[tokio::test]
    async fn server_close_is_reported() {
        let url = serve_once(|mut ws| async move {
            next_intent(&mut ws).await.unwrap();
            let frame = CloseFrame {
                code: CloseCode::Away,
                reason: "server restarting".into(),
            };
            let _ = ws.close(Some(frame)).await;
        })
        .await;

        let mut client = Client::new(ClientConfig::default(), Box::new(MemoryTokenStore::default())).unwrap();
        let mut transport = connect(&mut client, &url);
        pump_until(&mut client, &mut transport, |c| {
            c.session().status() == ConnectionStatus::Closed
        })
        .await;

        assert_eq!(client.session().last_error(), Some("server restarting"));
        assert!(matches!(
            client.request_update(),
            Err(SessionError::NotConnected {
                status: ConnectionStatus::Closed
            })
        ));
    }

    /// Tests that an unreachable server leaves the session errored
    #[tokio::test]
    async fn unreachable_server_errors() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut client = Client::new(ClientConfig::default(), Box::new(MemoryTokenStore::default())).unwrap();
        let mut transport = connect(&mut client, &format!("ws://{}/ws", addr));
        pump_until(&mut client, &mut transport, |c| {
            c.session().status() == ConnectionStatus::Errored
        })
        .await;

        assert!(client.session().last_error().is_some());
        assert!(client.reveal_at(0.0, 0.0).is_err());
        assert!(client.state().tiles().is_empty());
    }
}
