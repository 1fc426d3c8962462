//! Live casting: a player's session as seen by spectators, and the
//! spectators themselves

pub mod caster;
pub mod known;
pub mod spectator;
