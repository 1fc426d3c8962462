pub mod chat;
pub mod constants;
pub mod context;
pub mod creature;
pub mod dispatcher;
pub mod item;
pub mod player;
pub mod position;
pub mod tile;
pub mod world;
