//! I/O half of a spectator session
//!
//! Runs on the connection task. Decodes the handshake and inbound packets,
//! which touches no shared game state, and hands everything else to the
//! game thread as tasks keyed by `SpectatorId`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::cast::spectator::{LoginRequest, SpectatorInit, SpectatorSession};
use crate::config::CastSettings;
use crate::game::constants::{client_os, messages, protocol};
use crate::game::dispatcher::TaskSender;
use crate::game::world::ServerStatus;
use crate::metrics::Metrics;
use crate::net::crypto::{KeyExchange, SessionKey};
use crate::net::framing::{FrameReader, WireError};
use crate::net::protocol::{decode_command, ServerMessage};
use crate::net::session::{Challenge, SpectatorId};
use crate::net::transport::Transport;

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Challenge sent, waiting for the handshake
    Connected,
    /// Key exchange done, reading login fields
    HandshakePending,
    /// Login submitted to the game thread
    AwaitingLogin,
    /// Bound to a cast
    Active,
    Disconnected,
}

/// What the client can handle, resolved once from its platform tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientCapabilities {
    /// Understands the extended opcode negotiation
    pub extended_opcodes: bool,
    /// Freezes when a bulk announcement references creatures it never
    /// receives; needs a placeholder in their place
    pub needs_creature_placeholders: bool,
}

impl ClientCapabilities {
    pub fn from_platform(platform: u16) -> Self {
        Self {
            extended_opcodes: platform >= client_os::OTCLIENT_LINUX,
            needs_creature_placeholders: platform <= client_os::FLASH,
        }
    }
}

/// Why a handshake was refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    #[error("server is shutting down")]
    ShuttingDown,
    #[error("handshake received twice")]
    UnexpectedHandshake,
    #[error("key exchange block could not be decrypted")]
    Decrypt,
    #[error("truncated handshake: {0}")]
    Truncated(#[from] WireError),
    #[error("challenge mismatch")]
    ChallengeMismatch,
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u16),
}

/// Shared services every connection needs
#[derive(Clone)]
pub struct ConnectionServices {
    pub tasks: TaskSender,
    pub status: Arc<ServerStatus>,
    pub metrics: Arc<Metrics>,
    pub key_exchange: Arc<dyn KeyExchange>,
    pub settings: CastSettings,
}

/// Fields decoded from a successful handshake
#[derive(Debug, Clone, PartialEq, Eq)]
struct Handshake {
    platform: u16,
    version: u16,
    capabilities: ClientCapabilities,
    login: LoginRequest,
}

pub struct SpectatorConnection {
    id: SpectatorId,
    transport: Arc<dyn Transport>,
    services: ConnectionServices,
    challenge: Challenge,
    state: SessionState,
    /// Set by the game thread once the session is bound
    accept_packets: Arc<AtomicBool>,
}

impl SpectatorConnection {
    pub fn new(transport: Arc<dyn Transport>, services: ConnectionServices) -> Self {
        Self {
            id: SpectatorId::next(),
            transport,
            services,
            challenge: Challenge::generate(),
            state: SessionState::Connected,
            accept_packets: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> SpectatorId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn challenge(&self) -> Challenge {
        self.challenge
    }

    pub fn accepts_packets(&self) -> bool {
        self.accept_packets.load(Ordering::Acquire)
    }

    /// Send the login challenge, or close right away during shutdown
    pub fn on_connect(&mut self) {
        if self.services.status.is_shutting_down() {
            self.close();
            return;
        }
        self.transport.send(vec![ServerMessage::Challenge {
            timestamp: self.challenge.timestamp,
            random: self.challenge.random,
        }]);
    }

    /// Handle the handshake and submit the login
    pub fn on_recv_first_message(&mut self, mut payload: Vec<u8>) {
        let handshake = match self.read_handshake(&mut payload) {
            Ok(handshake) => handshake,
            Err(e) => {
                self.reject_handshake(e);
                return;
            }
        };

        self.state = SessionState::AwaitingLogin;
        debug!(
            "{} handshake ok (platform {}, version {}), casting '{}'",
            self.id, handshake.platform, handshake.version, handshake.login.character
        );

        let init = SpectatorInit {
            id: self.id,
            transport: self.transport.clone(),
            platform: handshake.platform,
            version: handshake.version,
            capabilities: handshake.capabilities,
            accept_packets: self.accept_packets.clone(),
        };
        let login = handshake.login;
        if !self
            .services
            .tasks
            .submit(move |ctx| SpectatorSession::login(ctx, init, login))
        {
            self.close();
        }
    }

    fn read_handshake(&mut self, payload: &mut [u8]) -> Result<Handshake, HandshakeError> {
        if self.services.status.is_shutting_down() {
            return Err(HandshakeError::ShuttingDown);
        }
        if self.state != SessionState::Connected {
            return Err(HandshakeError::UnexpectedHandshake);
        }

        let (platform, version, block_start) = {
            let mut reader = FrameReader::new(payload);
            let platform = reader.read_u16()?;
            let version = reader.read_u16()?;
            reader.skip(protocol::HANDSHAKE_RESERVED_BYTES)?;
            (platform, version, reader.position())
        };

        let block_end = block_start + protocol::KEY_EXCHANGE_BLOCK_SIZE;
        if payload.len() < block_end {
            return Err(HandshakeError::Truncated(WireError::Overrun {
                needed: protocol::KEY_EXCHANGE_BLOCK_SIZE,
                remaining: payload.len() - block_start,
            }));
        }
        if !self
            .services
            .key_exchange
            .decrypt(&mut payload[block_start..block_end])
        {
            return Err(HandshakeError::Decrypt);
        }

        let mut reader = FrameReader::new(&payload[block_start..]);
        reader.skip(1)?;
        let key: SessionKey = [
            reader.read_u32()?,
            reader.read_u32()?,
            reader.read_u32()?,
            reader.read_u32()?,
        ];
        self.transport.install_session_key(key);

        let capabilities = ClientCapabilities::from_platform(platform);
        self.state = SessionState::HandshakePending;
        if capabilities.extended_opcodes {
            self.transport.send(vec![ServerMessage::OpcodeNegotiation]);
        }

        // gamemaster flag
        reader.skip(1)?;
        let account = reader.read_string()?;
        let character = reader.read_string()?;
        let password = reader.read_string()?;
        let timestamp = reader.read_u32()?;
        let random = reader.read_u8()?;

        if !self.challenge.matches(timestamp, random) {
            return Err(HandshakeError::ChallengeMismatch);
        }
        if !(protocol::CLIENT_VERSION_MIN..=protocol::CLIENT_VERSION_MAX).contains(&version) {
            return Err(HandshakeError::UnsupportedVersion(version));
        }

        Ok(Handshake {
            platform,
            version,
            capabilities,
            login: LoginRequest {
                account,
                character,
                password,
            },
        })
    }

    fn reject_handshake(&mut self, error: HandshakeError) {
        Metrics::incr(&self.services.metrics.handshake_failures);
        match &error {
            HandshakeError::UnsupportedVersion(_) => {
                info!("{} rejected: {}", self.id, error);
                self.transport
                    .send(vec![ServerMessage::disconnect(messages::VERSION_MISMATCH)]);
            }
            _ => debug!("{} closed during handshake: {}", self.id, error),
        }
        self.close();
    }

    /// Decode one packet and queue the command it carries
    pub fn parse_packet(&mut self, payload: Vec<u8>) {
        if !self.accepts_packets() || self.services.status.is_shutting_down() || payload.is_empty() {
            return;
        }

        let mut reader = FrameReader::new(&payload);
        match decode_command(&mut reader, self.services.settings.max_spectator_text_len) {
            Ok(Some(command)) => {
                Metrics::incr(&self.services.metrics.commands_received);
                let id = self.id;
                self.services
                    .tasks
                    .submit(move |ctx| SpectatorSession::dispatch(ctx, id, command));
            }
            Ok(None) => {
                debug!("{} dropped packet with opcode {:#04x}", self.id, payload[0]);
            }
            Err(e) => {
                debug!("{} sent a malformed packet: {}", self.id, e);
                self.disconnect();
            }
        }
    }

    /// The socket is gone; release the game-side session
    pub fn on_transport_closed(&mut self) {
        self.disconnect();
    }

    fn disconnect(&mut self) {
        if self.state == SessionState::Disconnected {
            return;
        }
        let submitted = self.state == SessionState::AwaitingLogin;
        self.close();
        if submitted {
            let id = self.id;
            self.services
                .tasks
                .submit(move |ctx| SpectatorSession::release(ctx, id));
        }
    }

    fn close(&mut self) {
        self.state = SessionState::Disconnected;
        self.accept_packets.store(false, Ordering::Release);
        if !self.transport.is_closed() {
            self.transport.close();
        }
    }
}
