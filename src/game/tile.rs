use std::cell::RefCell;

use crate::game::creature::CreatureId;
use crate::game::item::Item;
use crate::game::position::Position;

/// A single map square: ground, items, and the creatures standing on it
#[derive(Debug)]
pub struct Tile {
    position: Position,
    ground: RefCell<Option<Item>>,
    items: RefCell<Vec<Item>>,
    creatures: RefCell<Vec<CreatureId>>,
}

impl Tile {
    pub fn new(position: Position, ground: Option<Item>) -> Self {
        Self {
            position,
            ground: RefCell::new(ground),
            items: RefCell::new(Vec::new()),
            creatures: RefCell::new(Vec::new()),
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn ground(&self) -> Option<Item> {
        *self.ground.borrow()
    }

    pub fn set_ground(&self, ground: Option<Item>) {
        *self.ground.borrow_mut() = ground;
    }

    pub fn add_item(&self, item: Item) {
        self.items.borrow_mut().push(item);
    }

    pub fn items(&self) -> Vec<Item> {
        self.items.borrow().clone()
    }

    /// Creatures in stack order (most recent arrival first)
    pub fn creature_ids(&self) -> Vec<CreatureId> {
        self.creatures.borrow().clone()
    }

    pub fn add_creature(&self, id: CreatureId) {
        let mut creatures = self.creatures.borrow_mut();
        if !creatures.contains(&id) {
            creatures.insert(0, id);
        }
    }

    pub fn remove_creature(&self, id: CreatureId) -> bool {
        let mut creatures = self.creatures.borrow_mut();
        let before = creatures.len();
        creatures.retain(|c| *c != id);
        creatures.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creature_stack_order() {
        let tile = Tile::new(Position::new(1, 1, 7), Some(Item::new(4526)));
        tile.add_creature(1);
        tile.add_creature(2);
        tile.add_creature(1);
        assert_eq!(tile.creature_ids(), vec![2, 1]);

        assert!(tile.remove_creature(2));
        assert!(!tile.remove_creature(2));
        assert_eq!(tile.creature_ids(), vec![1]);
    }

    #[test]
    fn test_ground_can_be_cleared() {
        let tile = Tile::new(Position::new(1, 1, 7), Some(Item::new(4526)));
        tile.set_ground(None);
        assert!(tile.ground().is_none());
    }
}
