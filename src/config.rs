use std::net::{IpAddr, Ipv4Addr};

use crate::game::constants::cast;

/// Reasons a loaded configuration cannot be used
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Port cannot be 0")]
    ZeroPort,
    #[error("Metrics port {0} clashes with the game port")]
    PortClash(u16),
    #[error("max_spectator_text_len must be 1-{max}, got {got}")]
    TextLimit { got: usize, max: usize },
    #[error("caster_known_creature_limit must be at least 1")]
    KnownCreatureLimit,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_address: IpAddr,
    /// Port spectators connect to
    pub port: u16,
    /// Port for the Prometheus endpoint
    pub metrics_port: u16,
    /// Longest accepted spectator chat line
    pub max_spectator_text_len: usize,
    /// How many creatures a caster's client keeps cached
    pub caster_known_creature_limit: usize,
    /// Name of a demo player to start casting at boot
    pub demo_caster: Option<String>,
    /// Password for the demo cast; casting stays off when empty
    pub demo_cast_password: String,
}

/// The part of the configuration sessions need at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CastSettings {
    pub max_spectator_text_len: usize,
    pub caster_known_creature_limit: usize,
}

impl Default for CastSettings {
    fn default() -> Self {
        Self {
            max_spectator_text_len: cast::MAX_TEXT_LEN,
            caster_known_creature_limit: cast::CASTER_KNOWN_CREATURE_LIMIT,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 7173,
            metrics_port: 9090,
            max_spectator_text_len: cast::MAX_TEXT_LEN,
            caster_known_creature_limit: cast::CASTER_KNOWN_CREATURE_LIMIT,
            demo_caster: None,
            demo_cast_password: String::new(),
        }
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("BIND_ADDRESS") {
            if let Ok(parsed) = addr.parse() {
                config.bind_address = parsed;
            } else {
                tracing::warn!("Invalid BIND_ADDRESS '{}', using default", addr);
            }
        }

        if let Some(port) = parse_port("PORT") {
            config.port = port;
        }

        if let Some(port) = parse_port("METRICS_PORT") {
            config.metrics_port = port;
        }

        if let Ok(len) = std::env::var("MAX_SPECTATOR_TEXT_LEN") {
            match len.parse::<usize>() {
                Ok(parsed) if parsed > 0 && parsed <= cast::MAX_TEXT_LEN => {
                    config.max_spectator_text_len = parsed;
                }
                Ok(_) => {
                    tracing::warn!("MAX_SPECTATOR_TEXT_LEN must be 1-{}, using default", cast::MAX_TEXT_LEN);
                }
                Err(_) => {
                    tracing::warn!("Invalid MAX_SPECTATOR_TEXT_LEN '{}', using default", len);
                }
            }
        }

        if let Ok(limit) = std::env::var("CASTER_KNOWN_CREATURE_LIMIT") {
            match limit.parse::<usize>() {
                Ok(parsed) if parsed > 0 => config.caster_known_creature_limit = parsed,
                Ok(_) => tracing::warn!("CASTER_KNOWN_CREATURE_LIMIT must be > 0, using default"),
                Err(_) => tracing::warn!("Invalid CASTER_KNOWN_CREATURE_LIMIT '{}', using default", limit),
            }
        }

        if let Ok(name) = std::env::var("DEMO_CASTER") {
            let name = name.trim();
            if !name.is_empty() {
                config.demo_caster = Some(name.to_string());
            }
        }

        if let Ok(password) = std::env::var("DEMO_CAST_PASSWORD") {
            config.demo_cast_password = password;
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 || self.metrics_port == 0 {
            return Err(ConfigError::ZeroPort);
        }
        if self.metrics_port == self.port {
            return Err(ConfigError::PortClash(self.metrics_port));
        }
        if self.max_spectator_text_len == 0 || self.max_spectator_text_len > cast::MAX_TEXT_LEN {
            return Err(ConfigError::TextLimit {
                got: self.max_spectator_text_len,
                max: cast::MAX_TEXT_LEN,
            });
        }
        if self.caster_known_creature_limit == 0 {
            return Err(ConfigError::KnownCreatureLimit);
        }
        Ok(())
    }

    pub fn cast_settings(&self) -> CastSettings {
        CastSettings {
            max_spectator_text_len: self.max_spectator_text_len,
            caster_known_creature_limit: self.caster_known_creature_limit,
        }
    }
}

fn parse_port(var: &str) -> Option<u16> {
    let value = std::env::var(var).ok()?;
    match value.parse::<u16>() {
        Ok(parsed) if parsed > 0 => Some(parsed),
        Ok(_) => {
            tracing::warn!("{} must be > 0, using default", var);
            None
        }
        Err(_) => {
            tracing::warn!("Invalid {} '{}', using default", var, value);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 7173);
        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.max_spectator_text_len, 255);
        assert_eq!(config.caster_known_creature_limit, 1300);
        assert!(config.demo_caster.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_or_default() {
        let config = ServerConfig::load_or_default();
        assert!(config.port > 0);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ServerConfig::default();
        config.metrics_port = config.port;
        assert_eq!(config.validate(), Err(ConfigError::PortClash(7173)));

        let mut config = ServerConfig::default();
        config.max_spectator_text_len = 1000;
        assert!(matches!(config.validate(), Err(ConfigError::TextLimit { got: 1000, .. })));

        let mut config = ServerConfig::default();
        config.caster_known_creature_limit = 0;
        assert_eq!(config.validate(), Err(ConfigError::KnownCreatureLimit));
    }

    #[test]
    fn test_cast_settings_follow_config() {
        let mut config = ServerConfig::default();
        config.max_spectator_text_len = 100;
        let settings = config.cast_settings();
        assert_eq!(settings.max_spectator_text_len, 100);
        assert_eq!(settings.caster_known_creature_limit, 1300);
    }
}
