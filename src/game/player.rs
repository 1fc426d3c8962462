use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::game::creature::{Creature, CreatureState, CreatureType};
use crate::game::item::Container;
use crate::util::SharedHandle;

/// A container slot in a player's view
#[derive(Debug, Clone)]
pub struct OpenContainer {
    pub container: SharedHandle<Container>,
    /// First item index shown (pagination)
    pub index: u16,
}

#[derive(Debug)]
pub struct Player {
    state: CreatureState,
    open_containers: RefCell<BTreeMap<u8, OpenContainer>>,
}

impl Player {
    pub fn new(state: CreatureState) -> Self {
        Self {
            state,
            open_containers: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn open_container(&self, cid: u8, container: SharedHandle<Container>) {
        self.open_containers
            .borrow_mut()
            .insert(cid, OpenContainer { container, index: 0 });
    }

    pub fn close_container(&self, cid: u8) -> Option<OpenContainer> {
        self.open_containers.borrow_mut().remove(&cid)
    }

    /// Open containers ordered by client container id
    pub fn open_containers(&self) -> Vec<(u8, OpenContainer)> {
        self.open_containers
            .borrow()
            .iter()
            .map(|(cid, open)| (*cid, open.clone()))
            .collect()
    }
}

impl Creature for Player {
    fn state(&self) -> &CreatureState {
        &self.state
    }

    fn creature_type(&self) -> CreatureType {
        CreatureType::Player
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::creature::Outfit;
    use crate::game::item::Item;

    fn player() -> Player {
        Player::new(CreatureState::new(101, "Caster", 150, Outfit::look(128)))
    }

    #[test]
    fn test_open_containers_sorted_by_cid() {
        let player = player();
        let bag = SharedHandle::new(Container::new(Item::new(1987), "bag", 8));
        let backpack = SharedHandle::new(Container::new(Item::new(2854), "backpack", 20));

        player.open_container(3, bag);
        player.open_container(0, backpack.clone());

        let open = player.open_containers();
        assert_eq!(open.len(), 2);
        assert_eq!(open[0].0, 0);
        assert!(open[0].1.container.ptr_eq(&backpack));
        assert_eq!(open[1].0, 3);
    }

    #[test]
    fn test_player_round_trips_through_creature_handle() {
        let handle = SharedHandle::new(player());
        let creature: SharedHandle<dyn Creature> = handle.clone().coerce(|rc| rc as Rc<dyn Creature>);

        let recovered = creature.as_player().expect("player handle");
        assert!(recovered.ptr_eq(&handle));
        assert_eq!(handle.holders(), 3);
    }

    #[test]
    fn test_close_container() {
        let player = player();
        player.open_container(1, SharedHandle::new(Container::new(Item::new(1987), "bag", 8)));
        assert!(player.close_container(1).is_some());
        assert!(player.close_container(1).is_none());
        assert!(player.open_containers().is_empty());
    }
}
