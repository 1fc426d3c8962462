use std::cell::RefCell;

use crate::util::{SharedHandle, WeakHandle};

/// A plain item as the client sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Item {
    /// Client-side sprite/type id
    pub client_id: u16,
    /// Stack size (only transmitted for stackable items)
    pub count: u8,
    pub stackable: bool,
}

impl Item {
    pub const fn new(client_id: u16) -> Self {
        Self {
            client_id,
            count: 1,
            stackable: false,
        }
    }

    pub const fn stack(client_id: u16, count: u8) -> Self {
        Self {
            client_id,
            count,
            stackable: true,
        }
    }
}

/// A container open in some player's view
#[derive(Debug)]
pub struct Container {
    pub item: Item,
    pub name: String,
    pub capacity: u8,
    items: RefCell<Vec<Item>>,
    parent: WeakHandle<Container>,
}

impl Container {
    pub fn new(item: Item, name: impl Into<String>, capacity: u8) -> Self {
        Self {
            item,
            name: name.into(),
            capacity,
            items: RefCell::new(Vec::new()),
            parent: WeakHandle::empty(),
        }
    }

    /// A container nested inside `parent`
    pub fn nested(item: Item, name: impl Into<String>, capacity: u8, parent: &SharedHandle<Container>) -> Self {
        Self {
            parent: parent.downgrade(),
            ..Self::new(item, name, capacity)
        }
    }

    /// Add an item; returns false when the container is full
    pub fn add_item(&self, item: Item) -> bool {
        let mut items = self.items.borrow_mut();
        if items.len() >= self.capacity as usize {
            return false;
        }
        items.push(item);
        true
    }

    pub fn items(&self) -> Vec<Item> {
        self.items.borrow().clone()
    }

    pub fn size(&self) -> usize {
        self.items.borrow().len()
    }

    /// True while the enclosing container still exists
    pub fn has_parent(&self) -> bool {
        self.parent.is_alive()
    }
}
