//! Game wire messages for the spectator protocol
//!
//! Outbound records are built as typed `ServerMessage`s and only turned into
//! bytes by `encode`/`encode_batch`, so sessions and tests deal in values.
//! Inbound payloads are decoded into `ClientCommand`s.

use smallvec::SmallVec;

use crate::game::constants::{cast, protocol, talk};
use crate::game::creature::{Creature, CreatureId, CreatureType, Direction, Outfit};
use crate::game::item::{Container, Item};
use crate::game::position::Position;
use crate::net::framing::{FrameBuilder, FrameReader, WireError};

/// Whether the client already has a creature cached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Known,
    /// First announcement; `evict` names a cached creature the client should
    /// drop to make room (0 for none)
    Unknown { evict: CreatureId },
}

/// Everything the client needs to render a creature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatureDescription {
    pub cache: CacheState,
    pub id: CreatureId,
    pub creature_type: CreatureType,
    pub name: String,
    pub health_percent: u8,
    pub direction: Direction,
    pub outfit: Outfit,
    pub speed: u16,
}

impl CreatureDescription {
    pub fn from_creature(creature: &dyn Creature, cache: CacheState) -> Self {
        let state = creature.state();
        Self {
            cache,
            id: creature.id(),
            creature_type: creature.creature_type(),
            name: creature.name().to_string(),
            health_percent: creature.health_percent(),
            direction: state.direction(),
            outfit: state.outfit(),
            speed: state.speed(),
        }
    }

    /// Stand-in for a creature that no longer resolves. Keeps a legacy
    /// client's cache slot filled with something obviously fake.
    pub fn placeholder(id: CreatureId, outfit: Outfit) -> Self {
        Self {
            cache: CacheState::Unknown { evict: 0 },
            id,
            creature_type: CreatureType::guess_from_id(id),
            name: "Dummy".to_string(),
            health_percent: 0,
            direction: Direction::North,
            outfit,
            speed: 200,
        }
    }
}

/// A thing stacked on a tile, bottom-up after the ground
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileThing {
    Item(Item),
    Creature(CreatureDescription),
}

/// Contents of one tile as sent in a tile update
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TileDescription {
    pub things: SmallVec<[TileThing; protocol::MAX_TILE_THINGS]>,
}

impl TileDescription {
    /// Push a thing unless the tile is already full
    pub fn push(&mut self, thing: TileThing) -> bool {
        if self.things.len() >= protocol::MAX_TILE_THINGS {
            return false;
        }
        self.things.push(thing);
        true
    }
}

/// Container window contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDescription {
    pub item: Item,
    pub name: String,
    pub capacity: u8,
    pub has_parent: bool,
    pub size: u16,
    pub first_index: u16,
    pub items: Vec<Item>,
}

impl ContainerDescription {
    /// Describe the page of `container` starting at `first_index`
    pub fn from_container(container: &Container, first_index: u16) -> Self {
        let items: Vec<Item> = container
            .items()
            .into_iter()
            .skip(first_index as usize)
            .take(container.capacity as usize)
            .collect();
        Self {
            item: container.item,
            name: container.name.clone(),
            capacity: container.capacity,
            has_parent: container.has_parent(),
            size: container.size().min(u16::MAX as usize) as u16,
            first_index,
            items,
        }
    }
}

/// Messages from server to spectator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Login challenge the client must echo back
    Challenge { timestamp: u32, random: u8 },
    /// Acknowledges extended opcode support
    OpcodeNegotiation,
    /// Human-readable reason, client closes afterwards
    Disconnect { message: String },
    /// Puts the client in game as the watched player
    SelfAppear { player_id: CreatureId },
    /// Tile with nothing but its ground item
    EmptyTile { position: Position, ground: Item },
    /// Full tile contents; `None` clears the tile
    UpdateTile { position: Position, tile: Option<TileDescription> },
    AddTileCreature { position: Position, stack_pos: u8, creature: CreatureDescription },
    RemoveTileThing { position: Position, stack_pos: u8 },
    /// Chat channel the caster is in
    Channel { id: u16, name: String, users: Vec<String>, invited: Vec<String> },
    OpenContainer { cid: u8, container: ContainerDescription },
    /// Talk in a channel
    ChannelMessage { author: String, talk_type: u8, channel_id: u16, text: String },
    Ping,
    PingBack,
}

impl ServerMessage {
    pub fn disconnect(message: impl Into<String>) -> Self {
        ServerMessage::Disconnect {
            message: message.into(),
        }
    }

    /// Spectator chat line in the cast channel
    pub fn spectator_talk(text: impl Into<String>) -> Self {
        ServerMessage::ChannelMessage {
            author: cast::SPECTATOR_AUTHOR.to_string(),
            talk_type: talk::CHANNEL_YELLOW,
            channel_id: cast::CHANNEL_ID,
            text: text.into(),
        }
    }

    /// Append this message's bytes
    pub fn encode_into(&self, out: &mut FrameBuilder) {
        match self {
            ServerMessage::Challenge { timestamp, random } => {
                out.write_u8(0x1F).write_u32(*timestamp).write_u8(*random);
            }
            ServerMessage::OpcodeNegotiation => {
                out.write_u8(0x32).write_u8(0x00).write_u16(0x0000);
            }
            ServerMessage::Disconnect { message } => {
                out.write_u8(0x14).write_string(message);
            }
            ServerMessage::SelfAppear { player_id } => {
                out.write_u8(0x0A)
                    .write_u32(*player_id)
                    .write_u16(protocol::SERVER_BEAT)
                    .write_u8(0x00);
            }
            ServerMessage::EmptyTile { position, ground } => {
                out.write_u8(0x69).write_position(*position).write_u16(0x0000);
                write_item(out, ground);
                out.write_u8(0x00).write_u8(0xFF);
            }
            ServerMessage::UpdateTile { position, tile } => {
                out.write_u8(0x69).write_position(*position);
                match tile {
                    Some(tile) => {
                        out.write_u16(0x0000);
                        for thing in &tile.things {
                            match thing {
                                TileThing::Item(item) => write_item(out, item),
                                TileThing::Creature(creature) => write_creature(out, creature),
                            }
                        }
                        out.write_u8(0x00).write_u8(0xFF);
                    }
                    None => {
                        out.write_u8(0x01).write_u8(0xFF);
                    }
                }
            }
            ServerMessage::AddTileCreature { position, stack_pos, creature } => {
                out.write_u8(0x6A).write_position(*position).write_u8(*stack_pos);
                write_creature(out, creature);
            }
            ServerMessage::RemoveTileThing { position, stack_pos } => {
                out.write_u8(0x6C).write_position(*position).write_u8(*stack_pos);
            }
            ServerMessage::Channel { id, name, users, invited } => {
                out.write_u8(0xAC).write_u16(*id).write_string(name);
                write_name_list(out, users);
                write_name_list(out, invited);
            }
            ServerMessage::OpenContainer { cid, container } => {
                out.write_u8(0x6E).write_u8(*cid);
                write_item(out, &container.item);
                out.write_string(&container.name)
                    .write_u8(container.capacity)
                    .write_u8(container.has_parent as u8)
                    .write_u8(0x01)
                    .write_u8(0x00)
                    .write_u16(container.size)
                    .write_u16(container.first_index)
                    .write_u8(container.items.len().min(u8::MAX as usize) as u8);
                for item in container.items.iter().take(u8::MAX as usize) {
                    write_item(out, item);
                }
            }
            ServerMessage::ChannelMessage { author, talk_type, channel_id, text } => {
                out.write_u8(0xAA)
                    .write_u32(0)
                    .write_string(author)
                    .write_u16(0)
                    .write_u8(*talk_type)
                    .write_u16(*channel_id)
                    .write_string(text);
            }
            ServerMessage::Ping => {
                out.write_u8(0x1D);
            }
            ServerMessage::PingBack => {
                out.write_u8(0x1E);
            }
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = FrameBuilder::new();
        self.encode_into(&mut out);
        out.build()
    }
}

/// Encode several messages into a single payload
pub fn encode_batch(messages: &[ServerMessage]) -> Vec<u8> {
    let mut out = FrameBuilder::new();
    for message in messages {
        message.encode_into(&mut out);
    }
    out.build()
}

fn write_item(out: &mut FrameBuilder, item: &Item) {
    out.write_u16(item.client_id).write_u8(protocol::MARK_UNMARKED);
    if item.stackable {
        out.write_u8(item.count);
    }
}

fn write_outfit(out: &mut FrameBuilder, outfit: &Outfit) {
    out.write_u16(outfit.look_type);
    if outfit.look_type != 0 {
        out.write_u8(outfit.head)
            .write_u8(outfit.body)
            .write_u8(outfit.legs)
            .write_u8(outfit.feet)
            .write_u8(outfit.addons);
    } else {
        out.write_u16(outfit.look_type_ex);
    }
    out.write_u16(outfit.mount);
}

fn write_creature(out: &mut FrameBuilder, creature: &CreatureDescription) {
    let known = match creature.cache {
        CacheState::Known => {
            out.write_u16(0x62).write_u32(creature.id);
            true
        }
        CacheState::Unknown { evict } => {
            out.write_u16(0x61)
                .write_u32(evict)
                .write_u32(creature.id)
                .write_u8(creature.creature_type as u8)
                .write_string(&creature.name);
            false
        }
    };

    out.write_u8(creature.health_percent).write_u8(creature.direction as u8);
    write_outfit(out, &creature.outfit);
    // light level, light color
    out.write_u8(0).write_u8(0);
    out.write_u16(creature.speed);
    // skull, party shield
    out.write_u8(0).write_u8(0);
    if !known {
        // guild emblem
        out.write_u8(0);
    }
    out.write_u8(creature.creature_type as u8)
        .write_u8(0)
        .write_u8(protocol::MARK_UNMARKED)
        .write_u16(0)
        .write_u8(0);
}

/// Names past `NAME_LIST_BUDGET` bytes are left out
fn write_name_list(out: &mut FrameBuilder, names: &[String]) {
    let mut used = 0;
    let count = names
        .iter()
        .take(u16::MAX as usize)
        .take_while(|name| {
            used += 2 + name.chars().count().min(u16::MAX as usize);
            used <= protocol::NAME_LIST_BUDGET
        })
        .count();
    out.write_u16(count as u16);
    for name in &names[..count] {
        out.write_string(name);
    }
}

/// Requests a spectator may send once logged in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// Leave before the session has bound to a cast
    LeaveGame,
    Logout,
    /// Client answered our ping
    PingBack,
    /// Client pinged us
    Ping,
    SpectatorSay { text: String },
}

/// Decode one command from a payload.
///
/// `Ok(None)` means the payload was well formed but carries nothing to act
/// on: an unknown opcode, or a say that fails validation. An `Err` means the
/// payload was read past its end.
pub fn decode_command(
    reader: &mut FrameReader<'_>,
    max_text_len: usize,
) -> Result<Option<ClientCommand>, WireError> {
    let opcode = reader.read_u8()?;
    let command = match opcode {
        0x0F => Some(ClientCommand::LeaveGame),
        0x14 => Some(ClientCommand::Logout),
        0x1D => Some(ClientCommand::PingBack),
        0x1E => Some(ClientCommand::Ping),
        0x96 => decode_spectator_say(reader, max_text_len)?,
        _ => None,
    };
    Ok(command)
}

fn decode_spectator_say(
    reader: &mut FrameReader<'_>,
    max_text_len: usize,
) -> Result<Option<ClientCommand>, WireError> {
    let speak_class = reader.read_u8()?;
    if speak_class != talk::CHANNEL_YELLOW {
        return Ok(None);
    }

    let channel_id = reader.read_u16()?;
    let text = reader.read_string()?;

    if text.chars().count() > max_text_len || channel_id != cast::CHANNEL_ID {
        return Ok(None);
    }
    Ok(Some(ClientCommand::SpectatorSay { text }))
}
