use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::Decoy;
use crate::config::Config;
use crate::error::{HoneypotError, Result, ValidationError};
use crate::protocol::mysql::{
    validate_banner, MySqlSession, ThreadIdAllocator, DEFAULT_BANNER, DEFAULT_PORT, SERVICE_NAME,
};
use crate::protocol::Emulator;
use crate::utils::timeout::idle_timeout_from_secs;

/// Key of the listen address shared by every decoy
pub const LISTEN_ADDR_KEY: &str = "device.listen_addr";

/// MySQL decoy parameters
#[derive(Debug)]
pub struct MySqlDecoy {
    bind_addr: SocketAddr,
    banner: Arc<str>,
    idle_timeout: Duration,
    thread_ids: ThreadIdAllocator,
}

impl MySqlDecoy {
    /// Read and check `mysql.*` settings
    ///
    /// Fails when the banner does not look like a MySQL version, so a bad
    /// banner never reaches the wire.
    pub fn from_config(config: &Config) -> Result<Self> {
        let port = config.get_as::<u16>("mysql.port", DEFAULT_PORT)?;
        let banner = config.get_as::<String>("mysql.banner", DEFAULT_BANNER.to_string())?;
        let timeout = config.get_as::<Option<u64>>("mysql.timeout", None)?;
        let listen_addr = config.get_as::<String>(LISTEN_ADDR_KEY, String::new())?;

        validate_banner(&banner)?;
        let ip = parse_listen_addr(&listen_addr)?;

        debug!(port, banner = %banner, "MySQL decoy configured");
        Ok(Self::new(
            SocketAddr::new(ip, port),
            &banner,
            idle_timeout_from_secs(timeout),
        ))
    }

    pub fn new(bind_addr: SocketAddr, banner: &str, idle_timeout: Duration) -> Self {
        Self {
            bind_addr,
            banner: Arc::from(banner),
            idle_timeout,
            thread_ids: ThreadIdAllocator::new(),
        }
    }

    pub fn banner(&self) -> &str {
        &self.banner
    }
}

/// Empty means every interface
pub(crate) fn parse_listen_addr(listen_addr: &str) -> Result<IpAddr> {
    if listen_addr.is_empty() {
        return Ok(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }
    listen_addr.parse::<IpAddr>().map_err(|e| {
        HoneypotError::Validation(ValidationError::new(
            LISTEN_ADDR_KEY,
            format!("Invalid listen address ({listen_addr}): {e}"),
        ))
    })
}

impl Decoy for MySqlDecoy {
    fn name(&self) -> &'static str {
        SERVICE_NAME
    }

    fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    fn new_session(&self, peer: SocketAddr) -> Box<dyn Emulator> {
        Box::new(MySqlSession::new(
            Arc::clone(&self.banner),
            self.thread_ids.next_id(),
            peer,
        ))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_apply_when_keys_missing() {
        let config = Config::from_value(json!({ "mysql.enabled": true })).unwrap();
        let decoy = MySqlDecoy::from_config(&config).unwrap();
        assert_eq!(decoy.bind_addr(), "0.0.0.0:3306".parse().unwrap());
        assert_eq!(decoy.banner(), DEFAULT_BANNER);
        assert_eq!(decoy.idle_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn configured_values_are_used() {
        let config = Config::from_value(json!({
            "mysql.port": 13306,
            "mysql.banner": "5.7.44-log",
            "mysql.timeout": 3,
            "device.listen_addr": "127.0.0.1",
        }))
        .unwrap();
        let decoy = MySqlDecoy::from_config(&config).unwrap();
        assert_eq!(decoy.bind_addr(), "127.0.0.1:13306".parse().unwrap());
        assert_eq!(decoy.banner(), "5.7.44-log");
        assert_eq!(decoy.idle_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn bad_banner_refuses_to_build() {
        let config = Config::from_value(json!({ "mysql.banner": "MariaDB\r\nX" })).unwrap();
        assert!(matches!(
            MySqlDecoy::from_config(&config),
            Err(HoneypotError::InvalidBanner { .. })
        ));
    }

    #[test]
    fn bad_listen_addr_refuses_to_build() {
        let config = Config::from_value(json!({ "device.listen_addr": "not-an-ip" })).unwrap();
        assert!(matches!(
            MySqlDecoy::from_config(&config),
            Err(HoneypotError::Validation(err)) if err.key == LISTEN_ADDR_KEY
        ));
    }

    #[test]
    fn sessions_get_distinct_thread_ids() {
        let decoy = MySqlDecoy::new("127.0.0.1:0".parse().unwrap(), DEFAULT_BANNER, Duration::from_secs(1));
        let peer = "127.0.0.1:5000".parse().unwrap();
        // header (4) + protocol version (1) + banner + NUL
        let id_at = 6 + DEFAULT_BANNER.len();
        let a = decoy.new_session(peer).greeting().unwrap();
        let b = decoy.new_session(peer).greeting().unwrap();
        assert_ne!(a[id_at..id_at + 4], b[id_at..id_at + 4]);
    }
}
