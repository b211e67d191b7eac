use std::net::{IpAddr, SocketAddr};

use crate::error::ConfigError;
use crate::protocol::DEFAULT_PORT;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_MAX_CLIENTS: usize = 10;
pub const DEFAULT_RELAY_CAPACITY: usize = 64;
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 32;
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    /// 0 lets the OS pick a port.
    pub port: u16,
    /// Upper bound on registered connections, logged in or not.
    pub max_clients: usize,
    /// Relay events that may be queued ahead of the broadcaster.
    pub relay_capacity: usize,
    /// Per-recipient deliveries buffered before broadcasts to it are skipped.
    pub outbound_capacity: usize,
    pub log_filter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::from(DEFAULT_HOST),
            port: DEFAULT_PORT,
            max_clients: DEFAULT_MAX_CLIENTS,
            relay_capacity: DEFAULT_RELAY_CAPACITY,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            log_filter: String::from(DEFAULT_LOG_FILTER),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;

        for (field, value) in [
            ("max_clients", self.max_clients),
            ("relay_capacity", self.relay_capacity),
            ("outbound_capacity", self.outbound_capacity),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
        }

        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self.host.parse().map_err(|e: std::net::AddrParseError| {
            ConfigError::Host {
                host: self.host.clone(),
                reason: e.to_string(),
            }
        })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}
