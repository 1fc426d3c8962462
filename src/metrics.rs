//! Prometheus-compatible metrics endpoint
//!
//! Exposes live-cast server metrics in Prometheus format.
//! Default endpoint: http://localhost:9090/metrics

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Number of sync bursts kept for percentile calculation
const SYNC_HISTORY_LEN: usize = 256;

/// Metrics registry for the cast server
#[derive(Debug)]
pub struct Metrics {
    // Connections
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub handshake_failures: AtomicU64,

    // Spectators
    pub spectators_active: AtomicU64,
    pub logins_accepted: AtomicU64,
    pub logins_rejected: AtomicU64,

    // Traffic
    pub commands_received: AtomicU64,
    pub broadcasts_sent: AtomicU64,
    pub bytes_sent: AtomicU64,

    // Sync burst sizes (messages per burst)
    pub sync_burst_p95: AtomicU64,
    pub sync_burst_max: AtomicU64,

    start_time: Instant,

    sync_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            handshake_failures: AtomicU64::new(0),
            spectators_active: AtomicU64::new(0),
            logins_accepted: AtomicU64::new(0),
            logins_rejected: AtomicU64::new(0),
            commands_received: AtomicU64::new(0),
            broadcasts_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            sync_burst_p95: AtomicU64::new(0),
            sync_burst_max: AtomicU64::new(0),
            start_time: Instant::now(),
            sync_history: RwLock::new(VecDeque::with_capacity(SYNC_HISTORY_LEN)),
        }
    }

    #[inline]
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement a gauge, saturating at zero
    #[inline]
    pub fn decr(gauge: &AtomicU64) {
        let _ = gauge.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }

    /// Record the size of one sync burst and update percentiles
    pub fn record_sync_burst(&self, messages: usize) {
        let mut history = self.sync_history.write();
        history.push_back(messages as u64);
        while history.len() > SYNC_HISTORY_LEN {
            history.pop_front();
        }

        let mut sorted: Vec<u64> = history.iter().copied().collect();
        sorted.sort_unstable();
        let p95_idx = (sorted.len() as f32 * 0.95) as usize;
        self.sync_burst_p95
            .store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
        self.sync_burst_max
            .store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!("livecast_connections_total", "Connections accepted", "counter",
            self.connections_total.load(Ordering::Relaxed));
        metric!("livecast_connections_active", "Open spectator connections", "gauge",
            self.connections_active.load(Ordering::Relaxed));
        metric!("livecast_handshake_failures_total", "Handshakes rejected", "counter",
            self.handshake_failures.load(Ordering::Relaxed));

        metric!("livecast_spectators_active", "Spectators bound to a cast", "gauge",
            self.spectators_active.load(Ordering::Relaxed));
        metric!("livecast_logins_accepted_total", "Spectator logins accepted", "counter",
            self.logins_accepted.load(Ordering::Relaxed));
        metric!("livecast_logins_rejected_total", "Spectator logins rejected", "counter",
            self.logins_rejected.load(Ordering::Relaxed));

        metric!("livecast_commands_received_total", "Spectator commands decoded", "counter",
            self.commands_received.load(Ordering::Relaxed));
        metric!("livecast_broadcasts_total", "Spectator chat lines broadcast", "counter",
            self.broadcasts_sent.load(Ordering::Relaxed));
        metric!("livecast_bytes_sent_total", "Payload bytes sent", "counter",
            self.bytes_sent.load(Ordering::Relaxed));

        metric!("livecast_sync_burst_p95_messages", "95th percentile sync burst size", "gauge",
            self.sync_burst_p95.load(Ordering::Relaxed));
        metric!("livecast_sync_burst_max_messages", "Largest recent sync burst", "gauge",
            self.sync_burst_max.load(Ordering::Relaxed));

        metric!("livecast_uptime_seconds", "Server uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Serve `/metrics` and `/health` over plain HTTP
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];
            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);
                    let response = http_response(&request, &metrics);
                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}

fn http_response(request: &str, metrics: &Metrics) -> String {
    let (content_type, body) = if request.starts_with("GET /metrics") {
        ("text/plain; version=0.0.4", metrics.to_prometheus())
    } else if request.starts_with("GET /health") || request.starts_with("GET / ") {
        ("text/plain", "OK".to_string())
    } else {
        return "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string();
    };

    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        content_type,
        body.len(),
        body
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.spectators_active.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.connections_total.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_decr_saturates() {
        let metrics = Metrics::new();
        Metrics::incr(&metrics.spectators_active);
        Metrics::decr(&metrics.spectators_active);
        Metrics::decr(&metrics.spectators_active);
        assert_eq!(metrics.spectators_active.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_sync_burst() {
        let metrics = Metrics::new();
        for i in 1..=100 {
            metrics.record_sync_burst(i);
        }
        assert_eq!(metrics.sync_burst_max.load(Ordering::Relaxed), 100);
        assert!(metrics.sync_burst_p95.load(Ordering::Relaxed) >= 95);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.spectators_active.store(3, Ordering::Relaxed);
        metrics.logins_rejected.store(7, Ordering::Relaxed);

        let output = metrics.to_prometheus();
        assert!(output.contains("livecast_spectators_active 3"));
        assert!(output.contains("livecast_logins_rejected_total 7"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE livecast_bytes_sent_total counter"));
    }

    #[test]
    fn test_http_routes() {
        let metrics = Metrics::new();
        assert!(http_response("GET /metrics HTTP/1.1\r\n", &metrics).contains("livecast_uptime_seconds"));
        assert!(http_response("GET /health HTTP/1.1\r\n", &metrics).ends_with("OK"));
        assert!(http_response("GET /nope HTTP/1.1\r\n", &metrics).starts_with("HTTP/1.1 404"));
    }
}
