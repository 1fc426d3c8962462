//! World state owned by the game thread

use std::rc::Rc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::game::creature::{Creature, CreatureId};
use crate::game::player::Player;
use crate::game::position::Position;
use crate::game::tile::Tile;
use crate::util::SharedHandle;

/// Server lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GameState {
    Startup = 0,
    Normal = 1,
    Closing = 2,
    Shutdown = 3,
}

impl GameState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => GameState::Startup,
            1 => GameState::Normal,
            2 => GameState::Closing,
            _ => GameState::Shutdown,
        }
    }
}

/// Lifecycle phase readable from any thread
#[derive(Debug)]
pub struct ServerStatus {
    state: AtomicU8,
}

impl ServerStatus {
    pub fn new(state: GameState) -> Self {
        Self {
            state: AtomicU8::new(state as u8),
        }
    }

    pub fn state(&self) -> GameState {
        GameState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: GameState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state() == GameState::Shutdown
    }
}

impl Default for ServerStatus {
    fn default() -> Self {
        Self::new(GameState::Normal)
    }
}

/// Creatures, players and tiles
pub struct World {
    status: Arc<ServerStatus>,
    creatures: FxHashMap<CreatureId, SharedHandle<dyn Creature>>,
    /// Keyed by lowercase name
    players: FxHashMap<String, SharedHandle<Player>>,
    tiles: FxHashMap<Position, SharedHandle<Tile>>,
}

impl World {
    pub fn new(status: Arc<ServerStatus>) -> Self {
        Self {
            status,
            creatures: FxHashMap::default(),
            players: FxHashMap::default(),
            tiles: FxHashMap::default(),
        }
    }

    pub fn status(&self) -> &Arc<ServerStatus> {
        &self.status
    }

    pub fn is_shutting_down(&self) -> bool {
        self.status.is_shutting_down()
    }

    pub fn add_tile(&mut self, tile: Tile) -> SharedHandle<Tile> {
        let handle = SharedHandle::new(tile);
        if let Some(position) = handle.get().map(Tile::position) {
            self.tiles.insert(position, handle.clone());
        }
        handle
    }

    pub fn tile(&self, position: Position) -> Option<SharedHandle<Tile>> {
        self.tiles.get(&position).cloned()
    }

    /// Register a creature and return a typed handle to it
    pub fn add_creature<C: Creature>(&mut self, creature: C) -> SharedHandle<C> {
        let handle = SharedHandle::new(creature);
        let id = handle.get().map(|c| c.id()).unwrap_or_default();
        self.creatures
            .insert(id, handle.clone().coerce(|rc| rc as Rc<dyn Creature>));
        handle
    }

    pub fn add_player(&mut self, player: Player) -> SharedHandle<Player> {
        let handle = self.add_creature(player);
        if let Some(name) = handle.get().map(|p| p.name().to_lowercase()) {
            self.players.insert(name, handle.clone());
        }
        handle
    }

    pub fn creature(&self, id: CreatureId) -> Option<SharedHandle<dyn Creature>> {
        self.creatures.get(&id).cloned()
    }

    pub fn player_by_id(&self, id: CreatureId) -> Option<SharedHandle<Player>> {
        self.creatures.get(&id).and_then(|c| c.as_player())
    }

    pub fn player_by_name(&self, name: &str) -> Option<SharedHandle<Player>> {
        self.players.get(&name.to_lowercase()).cloned()
    }

    /// Place a creature on a tile, moving it off its previous tile
    pub fn place_creature(&mut self, id: CreatureId, position: Position) -> bool {
        let Some(creature) = self.creatures.get(&id).cloned() else {
            return false;
        };
        let Some(creature) = creature.get() else {
            return false;
        };
        let Some(target) = self.tiles.get(&position).cloned() else {
            return false;
        };

        if let Some(previous) = self.tiles.get(&creature.position()) {
            if let Some(tile) = previous.get() {
                tile.remove_creature(id);
            }
        }
        creature.state().set_position(position);
        if let Some(tile) = target.get() {
            tile.add_creature(id);
        }
        true
    }

    /// Remove a creature from the world. Handles held elsewhere stay valid
    /// and report the creature as removed.
    pub fn remove_creature(&mut self, id: CreatureId) -> Option<SharedHandle<dyn Creature>> {
        let handle = self.creatures.remove(&id)?;
        if let Some(creature) = handle.get() {
            creature.state().mark_removed();
            if let Some(tile) = self.tiles.get(&creature.position()).and_then(|t| t.get()) {
                tile.remove_creature(id);
            }
            self.players.remove(&creature.name().to_lowercase());
        }
        Some(handle)
    }

    pub fn creature_count(&self) -> usize {
        self.creatures.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::creature::{CreatureState, Monster, Outfit};
    use crate::game::item::Item;

    fn world() -> World {
        World::new(Arc::new(ServerStatus::default()))
    }

    #[test]
    fn test_status_transitions() {
        let status = ServerStatus::default();
        assert_eq!(status.state(), GameState::Normal);
        assert!(!status.is_shutting_down());
        status.set_state(GameState::Shutdown);
        assert!(status.is_shutting_down());
    }

    #[test]
    fn test_player_lookup_is_case_insensitive() {
        let mut world = world();
        let player = world.add_player(Player::new(CreatureState::new(101, "Caster", 100, Outfit::look(128))));

        let found = world.player_by_name("CASTER").expect("player by name");
        assert!(found.ptr_eq(&player));
        assert!(world.player_by_id(101).is_some());
    }

    #[test]
    fn test_monster_is_not_a_player() {
        let mut world = world();
        world.add_creature(Monster::new(CreatureState::new(0x4000_0001, "Rat", 20, Outfit::look(21))));
        assert!(world.creature(0x4000_0001).is_some());
        assert!(world.player_by_id(0x4000_0001).is_none());
    }

    #[test]
    fn test_place_and_remove_creature() {
        let mut world = world();
        let a = Position::new(100, 100, 7);
        let b = Position::new(101, 100, 7);
        let tile_a = world.add_tile(Tile::new(a, Some(Item::new(4526))));
        let tile_b = world.add_tile(Tile::new(b, Some(Item::new(4526))));
        let player = world.add_player(Player::new(CreatureState::new(101, "Caster", 100, Outfit::look(128))));

        assert!(world.place_creature(101, a));
        assert!(world.place_creature(101, b));
        assert!(tile_a.get().unwrap().creature_ids().is_empty());
        assert_eq!(tile_b.get().unwrap().creature_ids(), vec![101]);

        world.remove_creature(101);
        assert!(player.get().unwrap().is_removed());
        assert!(world.creature(101).is_none());
        assert!(world.player_by_name("caster").is_none());
        assert!(tile_b.get().unwrap().creature_ids().is_empty());
    }
}
