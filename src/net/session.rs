use rand::Rng;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Identifies a spectator connection across the I/O and game threads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpectatorId(u64);

static NEXT_SPECTATOR_ID: AtomicU64 = AtomicU64::new(1);

impl SpectatorId {
    /// Allocate a process-unique id
    pub fn next() -> Self {
        Self(NEXT_SPECTATOR_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for SpectatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "spectator#{}", self.0)
    }
}

/// Login challenge issued when a connection opens.
/// The client must echo both fields in its handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Challenge {
    pub timestamp: u32,
    pub random: u8,
}

impl Challenge {
    /// Current unix time plus a random byte
    pub fn generate() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or_default();
        Self {
            timestamp,
            random: rand::thread_rng().gen(),
        }
    }

    pub fn matches(&self, timestamp: u32, random: u8) -> bool {
        self.timestamp == timestamp && self.random == random
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spectator_ids_are_unique() {
        let a = SpectatorId::next();
        let b = SpectatorId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn test_challenge_matching() {
        let challenge = Challenge {
            timestamp: 1_700_000_000,
            random: 42,
        };
        assert!(challenge.matches(1_700_000_000, 42));
        assert!(!challenge.matches(1_700_000_000, 43));
        assert!(!challenge.matches(1_700_000_001, 42));
    }

    #[test]
    fn test_generated_challenge_uses_current_time() {
        let challenge = Challenge::generate();
        assert!(challenge.timestamp > 1_600_000_000);
    }
}
