//! Creature hierarchy
//!
//! `Creature` is the polymorphic root: the world stores every creature as a
//! `SharedHandle<dyn Creature>` and recovers concrete types (e.g. `Player`)
//! through `SharedHandle::downcast`. State the game thread mutates lives in
//! `Cell`s so shared holders see updates without exclusive access.

use std::any::Any;
use std::cell::Cell;
use std::rc::Rc;

use crate::game::constants::creature_ids;
use crate::game::player::Player;
use crate::game::position::Position;
use crate::util::SharedHandle;

pub type CreatureId = u32;

/// Creature type tag as sent to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CreatureType {
    Player = 0,
    Monster = 1,
    Npc = 2,
}

impl CreatureType {
    /// Best-effort guess of a creature's type from its id range.
    ///
    /// Only good enough for cosmetic placeholders; real id allocation does
    /// not follow these ranges strictly.
    pub fn guess_from_id(id: CreatureId) -> Self {
        if id <= creature_ids::PLAYER_MAX {
            CreatureType::Player
        } else if id <= creature_ids::MONSTER_MAX {
            CreatureType::Monster
        } else {
            CreatureType::Npc
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Direction {
    #[default]
    North = 0,
    East = 1,
    South = 2,
    West = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Outfit {
    pub look_type: u16,
    /// Item sprite shown instead of a creature outfit when `look_type` is 0
    pub look_type_ex: u16,
    pub head: u8,
    pub body: u8,
    pub legs: u8,
    pub feet: u8,
    pub addons: u8,
    pub mount: u16,
}

impl Outfit {
    pub const fn look(look_type: u16) -> Self {
        Self {
            look_type,
            look_type_ex: 0,
            head: 0,
            body: 0,
            legs: 0,
            feet: 0,
            addons: 0,
            mount: 0,
        }
    }
}

/// State shared by every creature kind
#[derive(Debug)]
pub struct CreatureState {
    id: CreatureId,
    name: String,
    position: Cell<Position>,
    direction: Cell<Direction>,
    health: Cell<i32>,
    max_health: i32,
    outfit: Cell<Outfit>,
    speed: Cell<u16>,
    removed: Cell<bool>,
}

impl CreatureState {
    pub fn new(id: CreatureId, name: impl Into<String>, max_health: i32, outfit: Outfit) -> Self {
        Self {
            id,
            name: name.into(),
            position: Cell::new(Position::default()),
            direction: Cell::new(Direction::South),
            health: Cell::new(max_health),
            max_health,
            outfit: Cell::new(outfit),
            speed: Cell::new(220),
            removed: Cell::new(false),
        }
    }

    pub fn id(&self) -> CreatureId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> Position {
        self.position.get()
    }

    pub fn set_position(&self, position: Position) {
        self.position.set(position);
    }

    pub fn direction(&self) -> Direction {
        self.direction.get()
    }

    pub fn set_direction(&self, direction: Direction) {
        self.direction.set(direction);
    }

    pub fn health(&self) -> i32 {
        self.health.get()
    }

    pub fn set_health(&self, health: i32) {
        self.health.set(health.min(self.max_health));
    }

    pub fn max_health(&self) -> i32 {
        self.max_health
    }

    pub fn outfit(&self) -> Outfit {
        self.outfit.get()
    }

    pub fn set_outfit(&self, outfit: Outfit) {
        self.outfit.set(outfit);
    }

    pub fn speed(&self) -> u16 {
        self.speed.get()
    }

    pub fn is_removed(&self) -> bool {
        self.removed.get()
    }

    pub fn mark_removed(&self) {
        self.removed.set(true);
    }
}

/// Root of the creature hierarchy
pub trait Creature: Any {
    fn state(&self) -> &CreatureState;

    fn creature_type(&self) -> CreatureType;

    fn into_any(self: Rc<Self>) -> Rc<dyn Any>;

    fn id(&self) -> CreatureId {
        self.state().id()
    }

    fn name(&self) -> &str {
        self.state().name()
    }

    fn position(&self) -> Position {
        self.state().position()
    }

    fn health(&self) -> i32 {
        self.state().health()
    }

    fn is_removed(&self) -> bool {
        self.state().is_removed()
    }

    /// Health as a 0-100 percentage for the health bar
    fn health_percent(&self) -> u8 {
        let max = self.state().max_health();
        if max <= 0 {
            return 0;
        }
        let health = self.state().health().clamp(0, max) as i64;
        ((health * 100) / max as i64) as u8
    }
}

impl SharedHandle<dyn Creature> {
    /// Recover the `Player` behind a generic creature handle
    pub fn as_player(&self) -> Option<SharedHandle<Player>> {
        self.clone()
            .coerce(|rc| rc.into_any())
            .downcast::<Player>()
            .ok()
    }
}

#[derive(Debug)]
pub struct Monster {
    state: CreatureState,
}

impl Monster {
    pub fn new(state: CreatureState) -> Self {
        Self { state }
    }
}

impl Creature for Monster {
    fn state(&self) -> &CreatureState {
        &self.state
    }

    fn creature_type(&self) -> CreatureType {
        CreatureType::Monster
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

#[derive(Debug)]
pub struct Npc {
    state: CreatureState,
}

impl Npc {
    pub fn new(state: CreatureState) -> Self {
        Self { state }
    }
}

impl Creature for Npc {
    fn state(&self) -> &CreatureState {
        &self.state
    }

    fn creature_type(&self) -> CreatureType {
        CreatureType::Npc
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_type_from_id() {
        assert_eq!(CreatureType::guess_from_id(101), CreatureType::Player);
        assert_eq!(CreatureType::guess_from_id(0x1000_0000), CreatureType::Player);
        assert_eq!(CreatureType::guess_from_id(0x1000_0001), CreatureType::Monster);
        assert_eq!(CreatureType::guess_from_id(0x4000_0000), CreatureType::Monster);
        assert_eq!(CreatureType::guess_from_id(0x8000_0000), CreatureType::Npc);
    }

    #[test]
    fn test_health_percent() {
        let rat = Monster::new(CreatureState::new(0x4000_0001, "Rat", 20, Outfit::look(21)));
        assert_eq!(rat.health_percent(), 100);
        rat.state().set_health(5);
        assert_eq!(rat.health_percent(), 25);
        rat.state().set_health(-3);
        assert_eq!(rat.health_percent(), 0);
    }

    #[test]
    fn test_generic_handle_is_not_a_player() {
        let npc: SharedHandle<dyn Creature> =
            SharedHandle::new(Npc::new(CreatureState::new(0x8000_0001, "Sam", 100, Outfit::look(128))))
                .coerce(|rc| rc as Rc<dyn Creature>);
        assert!(npc.as_player().is_none());
        assert_eq!(npc.holders(), 1);
    }
}
