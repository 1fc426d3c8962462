//! Game-thread half of a spectator session
//!
//! Created by the login task, bound to a caster on success and kept in the
//! context's spectator registry until torn down. Every entry point is a
//! task submitted by the I/O half; each one looks the session up by id and
//! does nothing if it is already gone.

use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::cast::caster::CasterSession;
use crate::cast::known::{KnownCheck, KnownCreatureSet};
use crate::game::constants::{cast, messages};
use crate::game::context::GameContext;
use crate::game::creature::{Creature, CreatureId};
use crate::game::player::Player;
use crate::game::position::Position;
use crate::game::tile::Tile;
use crate::metrics::Metrics;
use crate::net::connection::{ClientCapabilities, SessionState};
use crate::net::protocol::{
    CacheState, ClientCommand, ContainerDescription, CreatureDescription, ServerMessage,
    TileDescription, TileThing,
};
use crate::net::session::SpectatorId;
use crate::net::transport::Transport;
use crate::util::SharedHandle;

/// Credentials from the handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub account: String,
    /// Name of the player to watch
    pub character: String,
    pub password: String,
}

/// Everything the I/O half hands over when submitting the login
pub struct SpectatorInit {
    pub id: SpectatorId,
    pub transport: Arc<dyn Transport>,
    pub platform: u16,
    pub version: u16,
    pub capabilities: ClientCapabilities,
    pub accept_packets: Arc<AtomicBool>,
}

/// The caster's surroundings cannot be described
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("no tile at caster position {0}")]
    MissingTile(Position),
    #[error("tile at {0} has no ground")]
    MissingGround(Position),
}

pub struct SpectatorSession {
    id: SpectatorId,
    transport: Arc<dyn Transport>,
    platform: u16,
    version: u16,
    capabilities: ClientCapabilities,
    accept_packets: Arc<AtomicBool>,
    state: Cell<SessionState>,
    caster: RefCell<SharedHandle<CasterSession>>,
    player: RefCell<SharedHandle<Player>>,
    known_creatures: RefCell<KnownCreatureSet>,
}

impl SpectatorSession {
    pub fn new(init: SpectatorInit) -> Self {
        Self {
            id: init.id,
            transport: init.transport,
            platform: init.platform,
            version: init.version,
            capabilities: init.capabilities,
            accept_packets: init.accept_packets,
            state: Cell::new(SessionState::AwaitingLogin),
            caster: RefCell::new(SharedHandle::empty()),
            player: RefCell::new(SharedHandle::empty()),
            known_creatures: RefCell::new(KnownCreatureSet::unbounded()),
        }
    }

    pub fn id(&self) -> SpectatorId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    pub fn is_bound(&self) -> bool {
        self.player.borrow().is_some()
    }

    pub fn knows_creature(&self, id: u32) -> bool {
        self.known_creatures.borrow().contains(id)
    }

    /// Resolve the cast, check the password and send the initial view
    pub fn login(ctx: &mut GameContext, init: SpectatorInit, request: LoginRequest) {
        if let Some(existing) = ctx.spectator(init.id) {
            if existing.get().is_some_and(|s| s.state() != SessionState::Disconnected) {
                debug!("{} already logged in", init.id);
                return;
            }
        }

        let handle = SharedHandle::new(SpectatorSession::new(init));
        let Some(session) = handle.get() else {
            return;
        };
        ctx.register_spectator(session.id, handle.clone());

        if ctx.world.is_shutting_down() {
            session.teardown(ctx);
            return;
        }

        let player = match ctx.world.player_by_name(&request.character) {
            Some(player) if player.get().is_some_and(|p| !p.is_removed()) => player,
            _ => return session.reject(ctx, messages::CAST_UNAVAILABLE),
        };
        let Some(caster) = player.get().and_then(|p| ctx.caster_of(p)) else {
            return session.reject(ctx, messages::CAST_UNAVAILABLE);
        };
        let (Some(player_ref), Some(caster_ref)) = (player.get(), caster.get()) else {
            return session.reject(ctx, messages::CAST_UNAVAILABLE);
        };
        if !caster_ref.is_live_caster() {
            return session.reject(ctx, messages::CAST_UNAVAILABLE);
        }
        if !caster_ref.password_matches(&request.password) {
            return session.reject(ctx, messages::WRONG_PASSWORD);
        }

        *session.player.borrow_mut() = player.clone();
        *session.caster.borrow_mut() = caster.clone();
        session.state.set(SessionState::Active);
        session.accept_packets.store(true, Ordering::Release);
        Metrics::incr(&ctx.metrics.spectators_active);

        let mut burst = vec![ServerMessage::SelfAppear {
            player_id: player_ref.id(),
        }];
        if let Err(e) = session.sync_known_creature_sets(ctx, player_ref, caster_ref, &mut burst) {
            info!("{} sync failed: {}", session.id, e);
            session.disconnect(ctx, messages::SYNC_ERROR);
            return;
        }
        session.sync_chat_channels(ctx, player_ref, &mut burst);
        session.sync_open_containers(player_ref, &mut burst);

        caster_ref.add_spectator(session.id, session.transport.clone());
        Metrics::incr(&ctx.metrics.logins_accepted);
        ctx.metrics.record_sync_burst(burst.len());
        session.transport.send(burst);

        info!(
            "{} now watching '{}' (platform {}, version {})",
            session.id,
            player_ref.name(),
            session.platform,
            session.version
        );
    }

    /// Replay the caster's creature cache into this client's cache.
    ///
    /// Every creature goes out as an add at stack position 1 immediately
    /// followed by its removal, which fills the client cache without
    /// changing what is drawn.
    pub fn sync_known_creature_sets(
        &self,
        ctx: &GameContext,
        player: &Player,
        caster: &CasterSession,
        out: &mut Vec<ServerMessage>,
    ) -> Result<(), SyncError> {
        let position = player.position();
        let tile = ctx
            .world
            .tile(position)
            .ok_or(SyncError::MissingTile(position))?;
        let tile = tile.get().ok_or(SyncError::MissingTile(position))?;
        let ground = tile.ground().ok_or(SyncError::MissingGround(position))?;

        out.push(ServerMessage::EmptyTile { position, ground });

        let outfit = player.state().outfit();
        {
            let mut known = self.known_creatures.borrow_mut();
            for id in caster.known_creature_ids() {
                if known.contains(id) {
                    continue;
                }

                let creature = ctx.world.creature(id);
                let creature = creature.as_ref().and_then(|c| c.get()).filter(|c| !c.is_removed());
                let description = match creature {
                    Some(creature) => {
                        let cache = cache_state(known.check_as_known(id));
                        CreatureDescription::from_creature(creature, cache)
                    }
                    None if self.capabilities.needs_creature_placeholders => {
                        known.check_as_known(id);
                        CreatureDescription::placeholder(id, outfit)
                    }
                    None => continue,
                };

                out.push(ServerMessage::AddTileCreature {
                    position,
                    stack_pos: cast::CREATURE_STACK_POS,
                    creature: description,
                });
                out.push(ServerMessage::RemoveTileThing {
                    position,
                    stack_pos: cast::CREATURE_STACK_POS,
                });
            }
        }

        out.push(ServerMessage::UpdateTile {
            position,
            tile: Some(self.describe_tile(ctx, tile)),
        });
        Ok(())
    }

    /// Tile contents bottom-up, marking any creature on it as known
    fn describe_tile(&self, ctx: &GameContext, tile: &Tile) -> TileDescription {
        let mut description = TileDescription::default();
        if let Some(ground) = tile.ground() {
            description.push(TileThing::Item(ground));
        }
        for item in tile.items() {
            if !description.push(TileThing::Item(item)) {
                return description;
            }
        }

        let mut known = self.known_creatures.borrow_mut();
        for id in tile.creature_ids() {
            let Some(creature) = ctx.world.creature(id) else {
                continue;
            };
            let Some(creature) = creature.get().filter(|c| !c.is_removed()) else {
                continue;
            };
            let cache = cache_state(known.check_as_known(id));
            if !description.push(TileThing::Creature(CreatureDescription::from_creature(creature, cache))) {
                break;
            }
        }
        description
    }

    /// Channels the caster is in, plus the cast channel
    pub fn sync_chat_channels(&self, ctx: &GameContext, player: &Player, out: &mut Vec<ServerMessage>) {
        let name_of = |id: CreatureId| {
            ctx.world
                .creature(id)
                .and_then(|c| c.get().map(|c| c.name().to_string()))
        };

        for channel in ctx.chat.channel_list(player) {
            if !channel.has_user(player.id()) {
                continue;
            }
            out.push(ServerMessage::Channel {
                id: channel.id(),
                name: channel.name().to_string(),
                users: channel.users().iter().filter_map(|&id| name_of(id)).collect(),
                invited: channel.invited().iter().filter_map(|&id| name_of(id)).collect(),
            });
        }

        out.push(ServerMessage::Channel {
            id: cast::CHANNEL_ID,
            name: cast::CHANNEL_NAME.to_string(),
            users: Vec::new(),
            invited: Vec::new(),
        });
    }

    pub fn sync_open_containers(&self, player: &Player, out: &mut Vec<ServerMessage>) {
        for (cid, open) in player.open_containers() {
            if let Some(container) = open.container.get() {
                out.push(ServerMessage::OpenContainer {
                    cid,
                    container: ContainerDescription::from_container(container, open.index),
                });
            }
        }
    }

    /// Run a decoded command for the session `id`
    pub fn dispatch(ctx: &mut GameContext, id: SpectatorId, command: ClientCommand) {
        let Some(handle) = ctx.spectator(id) else {
            return;
        };
        let Some(session) = handle.get() else {
            return;
        };
        if session.state() == SessionState::Disconnected {
            return;
        }

        let player = session.player.borrow().clone();
        let Some(player) = player.get() else {
            if command == ClientCommand::LeaveGame {
                session.teardown(ctx);
            }
            return;
        };

        if player.is_removed() || player.health() <= 0 {
            debug!("{} caster gone, disconnecting", id);
            session.teardown(ctx);
            return;
        }

        match command {
            ClientCommand::LeaveGame => {}
            ClientCommand::Logout => session.logout(ctx),
            ClientCommand::PingBack => session.transport.send(vec![ServerMessage::PingBack]),
            ClientCommand::Ping => session.transport.send(vec![ServerMessage::Ping]),
            ClientCommand::SpectatorSay { text } => {
                let caster = session.caster.borrow().clone();
                match caster.get() {
                    Some(caster) => {
                        caster.broadcast_spectator_message(&text);
                        Metrics::incr(&ctx.metrics.broadcasts_sent);
                    }
                    None => debug!("{} say dropped, no caster bound", id),
                }
            }
        }
    }

    /// Tear down the session `id` if it still exists
    pub fn release(ctx: &mut GameContext, id: SpectatorId) {
        if let Some(handle) = ctx.spectator(id) {
            if let Some(session) = handle.get() {
                session.teardown(ctx);
            }
        }
    }

    pub fn logout(&self, ctx: &mut GameContext) {
        debug!("{} logged out", self.id);
        self.teardown(ctx);
    }

    /// Tell the client why, then tear down
    pub fn disconnect(&self, ctx: &mut GameContext, message: &str) {
        if self.state() == SessionState::Disconnected {
            return;
        }
        self.transport.send(vec![ServerMessage::disconnect(message)]);
        self.teardown(ctx);
    }

    fn reject(&self, ctx: &mut GameContext, message: &str) {
        Metrics::incr(&ctx.metrics.logins_rejected);
        debug!("{} login rejected: {}", self.id, message);
        self.disconnect(ctx, message);
    }

    /// Unbind from the caster and drop out of the registry. Safe to call
    /// any number of times.
    pub fn teardown(&self, ctx: &mut GameContext) {
        let previous = self.state.replace(SessionState::Disconnected);
        if previous == SessionState::Disconnected {
            return;
        }

        self.accept_packets.store(false, Ordering::Release);
        let caster = self.caster.borrow_mut().take();
        if let Some(caster) = caster.get() {
            caster.remove_spectator(self.id);
        }
        self.player.borrow_mut().reset();

        if !self.transport.is_closed() {
            self.transport.close();
        }
        ctx.unregister_spectator(self.id);

        if previous == SessionState::Active {
            Metrics::decr(&ctx.metrics.spectators_active);
        }
    }
}

fn cache_state(check: KnownCheck) -> CacheState {
    match check {
        KnownCheck::Known => CacheState::Known,
        KnownCheck::Added { evicted } => CacheState::Unknown {
            evict: evicted.unwrap_or(0),
        },
    }
}
