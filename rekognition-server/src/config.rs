//! Server configuration module
//!
//! Handles loading configuration from environment variables with sensible defaults.
//! The platform configuration (cameras, AWS, saving) is loaded separately by
//! `rekognition-core` from the file named by `REKOGNITION_CONFIG`.

use std::net::SocketAddr;

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 3000)
    pub port: u16,
    /// Server host (default: 127.0.0.1)
    pub host: [u8; 4],
    /// Allowed CORS origins, comma-separated (default: allow all)
    pub allowed_origins: Option<Vec<String>>,
    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,
    /// Use the mock Rekognition client instead of AWS (default: false)
    pub use_mock_client: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            host: [127, 0, 0, 1],
            allowed_origins: None,
            timeout_secs: 30,
            use_mock_client: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let port = lookup("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port);

        let host = lookup("HOST")
            .and_then(|h| h.parse::<std::net::Ipv4Addr>().ok())
            .map(|ip| ip.octets())
            .unwrap_or(defaults.host);

        let allowed_origins = lookup("ALLOWED_ORIGINS").map(|origins| {
            origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        let timeout_secs = lookup("REQUEST_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.timeout_secs);

        let use_mock_client = lookup("REKOGNITION_MOCK")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            port,
            host,
            allowed_origins,
            timeout_secs,
            use_mock_client,
        }
    }

    /// Get socket address from config
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_env() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:3000");
        assert_eq!(config.timeout_secs, 30);
        assert!(config.allowed_origins.is_none());
        assert!(!config.use_mock_client);
    }

    #[test]
    fn test_env_values() {
        let config = Config::from_lookup(|key| match key {
            "PORT" => Some("8099".into()),
            "HOST" => Some("0.0.0.0".into()),
            "REQUEST_TIMEOUT_SECS" => Some("5".into()),
            "ALLOWED_ORIGINS" => Some("http://a.local, ,http://b.local".into()),
            "REKOGNITION_MOCK" => Some("TRUE".into()),
            _ => None,
        });
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:8099");
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(
            config.allowed_origins.unwrap(),
            vec!["http://a.local".to_string(), "http://b.local".to_string()]
        );
        assert!(config.use_mock_client);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = Config::from_lookup(|key| match key {
            "PORT" => Some("not-a-port".into()),
            "HOST" => Some("localhost".into()),
            _ => None,
        });
        assert_eq!(config.port, 3000);
        assert_eq!(config.host, [127, 0, 0, 1]);
    }
}
