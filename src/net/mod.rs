pub mod connection;
pub mod crypto;
pub mod framing;
pub mod protocol;
pub mod session;
pub mod transport;
