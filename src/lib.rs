//! Live Cast Spectator Server Library
//!
//! Lets spectators watch a player's game session in real time. A spectator
//! connects over TCP, picks a cast by character name, proves the cast
//! password and then receives a snapshot of the caster's view followed by
//! the live stream.
//!
//! Connection I/O runs on tokio; everything touching game state runs on a
//! single game thread fed through `game::dispatcher`.

pub mod cast;
pub mod config;
pub mod game;
pub mod metrics;
pub mod net;
pub mod util;
