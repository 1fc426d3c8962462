//! TCP transport for spectator connections
//!
//! Each accepted socket gets a writer task fed through a bounded mpsc
//! channel, so the game thread can queue outbound messages without touching
//! the socket. A connection that falls too far behind is closed.
//! The read side runs in the connection task and hands payloads to the
//! `SpectatorConnection`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};

use crate::config::ServerConfig;
use crate::game::constants::protocol::{MAX_MESSAGE_SIZE, OUTBOUND_QUEUE_FRAMES};
use crate::metrics::Metrics;
use crate::net::connection::{ConnectionServices, SpectatorConnection};
use crate::net::crypto::SessionKey;
use crate::net::framing::{read_message, write_message, FrameBuilder, FramingError};
use crate::net::protocol::ServerMessage;

/// Outbound side of a connection as the session sees it
pub trait Transport: Send + Sync {
    /// Queue messages for delivery. Everything passed in one call is
    /// delivered back to back. Ignored once closed.
    fn send(&self, messages: Vec<ServerMessage>);

    /// Hand over the symmetric key negotiated in the handshake
    fn install_session_key(&self, key: SessionKey);

    /// Close the connection. Closing twice is a no-op.
    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Transport over a tokio TCP stream.
///
/// The session key is recorded but frames are written in the clear, the
/// same plaintext seam `net::crypto` provides for the key exchange.
pub struct TcpTransport {
    peer: SocketAddr,
    outbound: mpsc::Sender<Vec<u8>>,
    closed: AtomicBool,
    close_signal: watch::Sender<bool>,
    session_key: Mutex<Option<SessionKey>>,
    metrics: Arc<Metrics>,
}

impl TcpTransport {
    fn new(
        peer: SocketAddr,
        outbound: mpsc::Sender<Vec<u8>>,
        metrics: Arc<Metrics>,
    ) -> (Self, watch::Receiver<bool>) {
        let (close_signal, close_rx) = watch::channel(false);
        let transport = Self {
            peer,
            outbound,
            closed: AtomicBool::new(false),
            close_signal,
            session_key: Mutex::new(None),
            metrics,
        };
        (transport, close_rx)
    }

    /// Key installed by the handshake, if any
    pub fn session_key(&self) -> Option<SessionKey> {
        *self.session_key.lock()
    }
}

impl Transport for TcpTransport {
    fn send(&self, messages: Vec<ServerMessage>) {
        if self.is_closed() {
            return;
        }
        for frame in pack_frames(&messages) {
            if frame.len() > MAX_MESSAGE_SIZE {
                tracing::warn!("Dropping {}: {} byte message exceeds frame limit", self.peer, frame.len());
                self.close();
                return;
            }
            let len = frame.len() as u64;
            match self.outbound.try_send(frame) {
                Ok(()) => {
                    self.metrics.bytes_sent.fetch_add(len, Ordering::Relaxed);
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!("Dropping {}: outbound queue full", self.peer);
                    self.close();
                    return;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    self.close();
                    return;
                }
            }
        }
    }

    fn install_session_key(&self, key: SessionKey) {
        *self.session_key.lock() = Some(key);
        tracing::debug!("Session key installed for {}", self.peer);
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let _ = self.close_signal.send(true);
            tracing::debug!("Closing connection to {}", self.peer);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Encode messages into as few frames as fit under the size limit.
/// A single message is never split.
fn pack_frames(messages: &[ServerMessage]) -> Vec<Vec<u8>> {
    let mut frames = Vec::new();
    let mut current = FrameBuilder::new();

    for message in messages {
        let encoded = message.encode();
        if !current.is_empty() && current.len() + encoded.len() > MAX_MESSAGE_SIZE {
            frames.push(std::mem::take(&mut current).build());
        }
        current.write(&encoded);
    }
    if !current.is_empty() {
        frames.push(current.build());
    }
    frames
}

/// Accepts spectator connections
pub struct SpectatorServer {
    config: ServerConfig,
    services: ConnectionServices,
}

impl SpectatorServer {
    pub fn new(config: ServerConfig, services: ConnectionServices) -> Self {
        Self { config, services }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.config.bind_address, self.config.port)
    }

    /// Run the accept loop
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.bind_addr()).await?;
        tracing::info!("Spectator server listening on {}", self.bind_addr());

        loop {
            let (stream, peer) = listener.accept().await?;
            if let Err(e) = stream.set_nodelay(true) {
                tracing::debug!("Failed to set TCP_NODELAY for {}: {}", peer, e);
            }

            let services = self.services.clone();
            tokio::spawn(async move {
                handle_connection(stream, peer, services).await;
            });
        }
    }
}

/// Drive one spectator connection until either side closes it
async fn handle_connection(stream: TcpStream, peer: SocketAddr, services: ConnectionServices) {
    let metrics = services.metrics.clone();
    Metrics::incr(&metrics.connections_total);
    Metrics::incr(&metrics.connections_active);
    tracing::debug!("New connection from {}", peer);

    let (mut reader, writer) = stream.into_split();
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_FRAMES);
    let (transport, mut close_rx) = TcpTransport::new(peer, outbound_tx, metrics.clone());
    let transport = Arc::new(transport);

    tokio::spawn(write_loop(writer, outbound_rx, transport.clone()));

    let mut connection = SpectatorConnection::new(transport.clone(), services);
    connection.on_connect();

    let mut first_message = true;
    while !transport.is_closed() {
        tokio::select! {
            result = read_message(&mut reader) => match result {
                Ok(payload) => {
                    if first_message {
                        first_message = false;
                        connection.on_recv_first_message(payload);
                    } else {
                        connection.parse_packet(payload);
                    }
                }
                Err(FramingError::ConnectionClosed) => break,
                Err(e) => {
                    tracing::debug!("Read error from {}: {}", peer, e);
                    break;
                }
            },
            _ = close_rx.changed() => break,
        }
    }

    connection.on_transport_closed();
    Metrics::decr(&metrics.connections_active);
    tracing::debug!("Connection closed: {}", peer);
}

/// Write queued frames until closed, flushing whatever was queued before
/// the close so a final disconnect notice still goes out. A failed write
/// closes the transport, which ends the connection task.
async fn write_loop<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut outbound: mpsc::Receiver<Vec<u8>>,
    transport: Arc<TcpTransport>,
) {
    let mut close_rx = transport.close_signal.subscribe();
    loop {
        if transport.is_closed() {
            while let Ok(frame) = outbound.try_recv() {
                if write_message(&mut writer, &frame).await.is_err() {
                    break;
                }
            }
            break;
        }
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = write_message(&mut writer, &frame).await {
                        tracing::debug!("Write error to {}: {}", transport.peer, e);
                        transport.close();
                    }
                }
                None => break,
            },
            _ = close_rx.changed() => {}
        }
    }
    let _ = writer.shutdown().await;
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::protocol::encode_batch;

    fn test_transport_with_queue(
        frames: usize,
    ) -> (TcpTransport, mpsc::Receiver<Vec<u8>>, watch::Receiver<bool>) {
        let (tx, rx) = mpsc::channel(frames);
        let peer: SocketAddr = "127.0.0.1:7173".parse().unwrap();
        let (transport, close_rx) = TcpTransport::new(peer, tx, Arc::new(Metrics::new()));
        (transport, rx, close_rx)
    }

    fn test_transport() -> (TcpTransport, mpsc::Receiver<Vec<u8>>, watch::Receiver<bool>) {
        test_transport_with_queue(OUTBOUND_QUEUE_FRAMES)
    }

    #[test]
    fn test_small_batch_is_one_frame() {
        let messages = vec![ServerMessage::Ping, ServerMessage::disconnect("bye")];
        let frames = pack_frames(&messages);
        assert_eq!(frames, vec![encode_batch(&messages)]);
    }

    #[test]
    fn test_large_batch_is_split_between_messages() {
        let text = "x".repeat(200);
        let messages: Vec<_> = (0..200).map(|_| ServerMessage::spectator_talk(text.clone())).collect();
        let frames = pack_frames(&messages);

        assert!(frames.len() > 1);
        assert!(frames.iter().all(|f| f.len() <= MAX_MESSAGE_SIZE));
        assert_eq!(frames.concat(), encode_batch(&messages));
    }

    #[test]
    fn test_send_counts_bytes_and_stops_after_close() {
        let (transport, mut rx, _close_rx) = test_transport();
        transport.send(vec![ServerMessage::Ping]);
        assert_eq!(rx.try_recv().unwrap(), vec![0x1D]);
        assert_eq!(transport.metrics.bytes_sent.load(Ordering::Relaxed), 1);

        transport.close();
        transport.send(vec![ServerMessage::Ping]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_oversized_message_closes_transport() {
        let (transport, mut rx, close_rx) = test_transport();
        transport.send(vec![ServerMessage::spectator_talk("x".repeat(MAX_MESSAGE_SIZE))]);

        assert!(rx.try_recv().is_err());
        assert!(transport.is_closed());
        assert!(*close_rx.borrow());
        assert_eq!(transport.metrics.bytes_sent.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_full_queue_closes_transport() {
        let (transport, mut rx, _close_rx) = test_transport_with_queue(2);
        transport.send(vec![ServerMessage::Ping]);
        transport.send(vec![ServerMessage::Ping]);
        assert!(!transport.is_closed());

        transport.send(vec![ServerMessage::Ping]);
        assert!(transport.is_closed());
        assert_eq!(rx.try_recv().unwrap(), vec![0x1D]);
        assert_eq!(rx.try_recv().unwrap(), vec![0x1D]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_close_is_idempotent_and_signals() {
        let (transport, _rx, close_rx) = test_transport();
        assert!(!*close_rx.borrow());

        transport.close();
        transport.close();
        assert!(transport.is_closed());
        assert!(*close_rx.borrow());
    }

    #[test]
    fn test_install_session_key() {
        let (transport, _rx, _close_rx) = test_transport();
        transport.install_session_key([1, 2, 3, 4]);
        assert_eq!(transport.session_key(), Some([1, 2, 3, 4]));
    }

    #[tokio::test]
    async fn test_write_loop_flushes_before_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let (server_side, peer) = listener.accept().await.unwrap();
        let mut client = client.await.unwrap();

        let (_reader, writer) = server_side.into_split();
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_FRAMES);
        let (transport, _close_rx) = TcpTransport::new(peer, tx, Arc::new(Metrics::new()));
        let transport = Arc::new(transport);
        let task = tokio::spawn(write_loop(writer, rx, transport.clone()));

        transport.send(vec![ServerMessage::disconnect("bye")]);
        transport.close();
        task.await.unwrap();

        let frame = read_message(&mut client).await.unwrap();
        assert_eq!(frame, ServerMessage::disconnect("bye").encode());
        assert!(matches!(read_message(&mut client).await, Err(FramingError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_write_error_closes_transport() {
        let writer = tokio_test::io::Builder::new()
            .write_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "peer gone"))
            .build();
        let (transport, rx, close_rx) = test_transport();
        let transport = Arc::new(transport);
        let task = tokio::spawn(write_loop(writer, rx, transport.clone()));

        transport.send(vec![ServerMessage::Ping]);
        task.await.unwrap();

        assert!(transport.is_closed());
        assert!(*close_rx.borrow());
    }
}
