use clap::Parser;
use client::coords::DEFAULT_TILE_SIZE;
use client::input::{InputEvent, InputManager};
use client::network::{spawn_transport, Client, ClientConfig, Transport};
use client::rendering::MacroquadSurface;
use client::session::ConnectionStatus;
use client::token::{FileTokenStore, TOKEN_KEY};
use log::{error, info, warn};
use macroquad::prelude::*;
use std::time::SystemTime;
use tokio::runtime::Runtime;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket endpoint of the game server
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:3030/ws")]
    server: String,

    /// Window width
    #[arg(short = 'w', long, default_value = "800")]
    width: u32,

    /// Window height (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "600")]
    height: u32,

    /// Pixel size of one tile
    #[arg(short = 't', long, default_value_t = DEFAULT_TILE_SIZE)]
    tile_size: f32,

    /// Nickname to claim after joining
    #[arg(short = 'n', long)]
    name: Option<String>,

    /// Where the reconnect token is kept between runs
    #[arg(long, default_value = TOKEN_KEY)]
    token_file: String,
}

fn window_conf() -> Conf {
    let args = Args::parse();
    Conf {
        window_title: "Sweeper".to_string(),
        window_width: args.width as i32,
        window_height: args.height as i32,
        window_resizable: true,
        ..Default::default()
    }
}

fn connect(client: &mut Client, runtime: &Runtime, server: &str) -> Option<Transport> {
    let transport = spawn_transport(runtime.handle(), server);
    if client.connect(transport.outbound.clone()) {
        Some(transport)
    } else {
        warn!("Already connected");
        None
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    if let Err(e) = run(Args::parse()).await {
        error!("Client stopped: {}", e);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    if args.tile_size.is_nan() || args.tile_size <= 0.0 {
        return Err(format!("tile size must be positive, got {}", args.tile_size).into());
    }

    // macroquad keeps the main thread; the socket runs on a worker thread.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()?;

    let (width, height) = (screen_width(), screen_height());
    let config = ClientConfig {
        tile_size: args.tile_size,
        width,
        height,
        nickname: args.name.clone(),
    };
    let token_store = FileTokenStore::new(&args.token_file);
    let mut client = Client::new(config, Box::new(token_store))?;

    info!("Starting client...");
    info!("Connecting to: {}", args.server);
    info!("Controls: drag to pan, click to uncover, R to reconnect, Esc to quit");
    info!("Press S/T to sort the leaderboard by score/tiles per hour");

    let mut transport = connect(&mut client, &runtime, &args.server);
    let mut surface = MacroquadSurface::new(width, height);
    let mut input = InputManager::new(width, height);
    let mut rows = Vec::new();

    loop {
        if let Some(active) = transport.as_mut() {
            while let Ok(event) = active.events.try_recv() {
                client.handle_transport_event(event);
            }
        }

        for event in input.update() {
            match event {
                InputEvent::Quit => return Ok(()),
                InputEvent::Pan { dx, dy } => client.pan(dx, dy),
                InputEvent::SortBy(key) => client.sort_leaderboard(key),
                InputEvent::Reveal { x, y } => {
                    let _ = client.reveal_at(x, y);
                }
                InputEvent::Resize { width, height } => {
                    surface.resize(width, height);
                    client.resize(width, height);
                }
                InputEvent::Reconnect => match client.session().status() {
                    ConnectionStatus::Closed | ConnectionStatus::Errored => {
                        info!("Reconnecting to {}", args.server);
                        transport = connect(&mut client, &runtime, &args.server);
                    }
                    status => info!("Connection is {}, not reconnecting", status),
                },
            }
        }

        client.render_pending(&mut surface);
        if client.take_leaderboard_refresh() {
            rows = client.leaderboard_rows(SystemTime::now());
        }

        surface.present();
        let status = format!("Connection: {}", client.session().status());
        let message = client.user_error().or(client.session().last_error());
        surface.draw_overlay(&rows, &status, message);

        next_frame().await;
    }
}
