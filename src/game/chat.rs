//! Chat channel directory
//!
//! Read-only from the spectator's point of view: channels are listed and
//! described to a new spectator, never modified by it.

use std::collections::{BTreeMap, BTreeSet};

use crate::game::creature::{Creature, CreatureId};
use crate::game::player::Player;

pub type ChannelId = u16;

#[derive(Debug, Clone)]
pub struct ChatChannel {
    id: ChannelId,
    name: String,
    public: bool,
    users: BTreeSet<CreatureId>,
    invited: BTreeSet<CreatureId>,
}

impl ChatChannel {
    pub fn new(id: ChannelId, name: impl Into<String>, public: bool) -> Self {
        Self {
            id,
            name: name.into(),
            public,
            users: BTreeSet::new(),
            invited: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn users(&self) -> &BTreeSet<CreatureId> {
        &self.users
    }

    pub fn invited(&self) -> &BTreeSet<CreatureId> {
        &self.invited
    }

    pub fn has_user(&self, id: CreatureId) -> bool {
        self.users.contains(&id)
    }

    /// Public channels are listed to everyone; private ones only to
    /// members and invitees
    pub fn is_listed_for(&self, id: CreatureId) -> bool {
        self.public || self.users.contains(&id) || self.invited.contains(&id)
    }
}

/// All chat channels known to the server
#[derive(Debug, Default)]
pub struct Chat {
    channels: BTreeMap<ChannelId, ChatChannel>,
}

impl Chat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_channel(&mut self, id: ChannelId, name: impl Into<String>, public: bool) -> &mut ChatChannel {
        self.channels
            .entry(id)
            .or_insert_with(|| ChatChannel::new(id, name, public))
    }

    pub fn channel(&self, id: ChannelId) -> Option<&ChatChannel> {
        self.channels.get(&id)
    }

    pub fn join(&mut self, id: ChannelId, user: CreatureId) -> bool {
        match self.channels.get_mut(&id) {
            Some(channel) => {
                channel.invited.remove(&user);
                channel.users.insert(user)
            }
            None => false,
        }
    }

    pub fn leave(&mut self, id: ChannelId, user: CreatureId) -> bool {
        self.channels
            .get_mut(&id)
            .is_some_and(|channel| channel.users.remove(&user))
    }

    pub fn invite(&mut self, id: ChannelId, user: CreatureId) -> bool {
        self.channels
            .get_mut(&id)
            .is_some_and(|channel| channel.invited.insert(user))
    }

    /// Channels the player may see in its channel list
    pub fn channel_list(&self, player: &Player) -> Vec<&ChatChannel> {
        let id = player.id();
        self.channels
            .values()
            .filter(|channel| channel.is_listed_for(id))
            .collect()
    }
}
