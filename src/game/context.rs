//! Everything the game thread owns
//!
//! Passed explicitly into every task instead of living in globals, so tests
//! can build a small world and drive sessions against it directly.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::info;

use crate::cast::caster::CasterSession;
use crate::cast::spectator::SpectatorSession;
use crate::game::chat::Chat;
use crate::game::constants::messages;
use crate::game::creature::{Creature, CreatureId};
use crate::game::player::Player;
use crate::game::world::{ServerStatus, World};
use crate::metrics::Metrics;
use crate::net::session::SpectatorId;
use crate::util::SharedHandle;

pub struct GameContext {
    pub world: World,
    pub chat: Chat,
    pub metrics: Arc<Metrics>,
    /// Game sessions of players, keyed by player id
    casters: FxHashMap<CreatureId, SharedHandle<CasterSession>>,
    /// Spectator sessions that have reached the game thread
    spectators: FxHashMap<SpectatorId, SharedHandle<SpectatorSession>>,
}

impl GameContext {
    pub fn new(status: Arc<ServerStatus>, metrics: Arc<Metrics>) -> Self {
        Self {
            world: World::new(status),
            chat: Chat::new(),
            metrics,
            casters: FxHashMap::default(),
            spectators: FxHashMap::default(),
        }
    }

    /// Attach a player's game session so it can be spectated
    pub fn attach_caster(&mut self, caster: CasterSession) -> SharedHandle<CasterSession> {
        let player_id = caster.player_id();
        let handle = SharedHandle::new(caster);
        self.casters.insert(player_id, handle.clone());
        handle
    }

    /// Game session of `player`, if it has one
    pub fn caster_of(&self, player: &Player) -> Option<SharedHandle<CasterSession>> {
        self.casters.get(&player.id()).cloned()
    }

    /// Stop a cast and disconnect every spectator watching it.
    ///
    /// Returns the number of spectators that were disconnected.
    pub fn end_cast(&mut self, player_id: CreatureId) -> usize {
        let Some(caster) = self.casters.get(&player_id).cloned() else {
            return 0;
        };
        let Some(watching) = caster.get().map(CasterSession::stop_cast) else {
            return 0;
        };

        let count = watching.len();
        for id in watching {
            if let Some(session) = self.spectator(id) {
                if let Some(session) = session.get() {
                    session.disconnect(self, messages::CAST_ENDED);
                }
            }
        }
        info!("Cast of player {} ended, {} spectators disconnected", player_id, count);
        count
    }

    pub fn spectator(&self, id: SpectatorId) -> Option<SharedHandle<SpectatorSession>> {
        self.spectators.get(&id).cloned()
    }

    pub(crate) fn register_spectator(&mut self, id: SpectatorId, session: SharedHandle<SpectatorSession>) {
        self.spectators.insert(id, session);
    }

    pub(crate) fn unregister_spectator(&mut self, id: SpectatorId) -> Option<SharedHandle<SpectatorSession>> {
        self.spectators.remove(&id)
    }

    pub fn spectator_count(&self) -> usize {
        self.spectators.len()
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self::new(Arc::new(ServerStatus::default()), Arc::new(Metrics::new()))
    }
}
