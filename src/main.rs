use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use livecast_server::cast::caster::CasterSession;
use livecast_server::config::ServerConfig;
use livecast_server::game::context::GameContext;
use livecast_server::game::creature::{CreatureState, Outfit};
use livecast_server::game::dispatcher::{spawn_game_thread, task_queue};
use livecast_server::game::item::Item;
use livecast_server::game::player::Player;
use livecast_server::game::position::Position;
use livecast_server::game::tile::Tile;
use livecast_server::game::world::{GameState, ServerStatus};
use livecast_server::metrics::{self, Metrics};
use livecast_server::net::connection::ConnectionServices;
use livecast_server::net::crypto::{PlaintextKeyExchange, SessionKey};
use livecast_server::net::protocol::ServerMessage;
use livecast_server::net::transport::{SpectatorServer, Transport};

/// Stands in for the demo caster's own game connection
struct DetachedTransport;

impl Transport for DetachedTransport {
    fn send(&self, _messages: Vec<ServerMessage>) {}

    fn install_session_key(&self, _key: SessionKey) {}

    fn close(&self) {}

    fn is_closed(&self) -> bool {
        false
    }
}

/// World with a single casting player standing on one tile
fn demo_world(ctx: &mut GameContext, name: &str, password: &str, known_creature_limit: usize) {
    let position = Position::new(100, 100, 7);
    ctx.world.add_tile(Tile::new(position, Some(Item::new(4526))));
    ctx.world
        .add_player(Player::new(CreatureState::new(1, name, 150, Outfit::look(128))));
    ctx.world.place_creature(1, position);

    let caster = ctx.attach_caster(CasterSession::new(1, Arc::new(DetachedTransport), known_creature_limit));
    if let Some(caster) = caster.get() {
        caster.note_creature_known(1);
        if !caster.start_cast(password) {
            warn!("DEMO_CAST_PASSWORD is empty, '{}' is not casting", name);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Live Cast Server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::load_or_default();
    config.validate()?;
    info!(
        "Configuration loaded: {}:{}, max_text_len={}",
        config.bind_address, config.port, config.max_spectator_text_len
    );

    let metrics = Arc::new(Metrics::new());
    let metrics_clone = metrics.clone();
    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = metrics::start_metrics_server(metrics_clone, metrics_port).await {
            error!("Metrics server error: {}", e);
        }
    });

    let status = Arc::new(ServerStatus::new(GameState::Startup));
    let (tasks, queue) = task_queue();

    let game_status = status.clone();
    let game_metrics = metrics.clone();
    let settings = config.cast_settings();
    let demo = config
        .demo_caster
        .clone()
        .map(|name| (name, config.demo_cast_password.clone()));
    let game_thread = spawn_game_thread(queue, move || {
        let mut ctx = GameContext::new(game_status, game_metrics);
        if let Some((name, password)) = demo {
            demo_world(&mut ctx, &name, &password, settings.caster_known_creature_limit);
            info!("Demo caster '{}' ready", name);
        }
        ctx
    })?;

    let services = ConnectionServices {
        tasks,
        status: status.clone(),
        metrics: metrics.clone(),
        key_exchange: Arc::new(PlaintextKeyExchange),
        settings,
    };
    let server = SpectatorServer::new(config, services);
    status.set_state(GameState::Normal);

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    };

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = shutdown => {
            info!("Shutting down...");
        }
    }

    // Connections still open drop their packets from here on
    status.set_state(GameState::Shutdown);
    drop(game_thread);
    info!("Server stopped");

    Ok(())
}
