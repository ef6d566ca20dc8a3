use std::net::SocketAddr;

use niptuck_common::gemini::GeminiClientConfig;

use crate::error::AppError;

/// Application configuration loaded explicitly from environment variables.
///
/// Credential storage is configured separately by `KeyValueStore::from_env`
/// (`REDIS_URL`, `NIPTUCK_STORE_PATH`).
#[derive(Debug, Clone)]
pub struct Config {
    /// Serve MCP over TCP on this address instead of stdio.
    pub tcp_listen_addr: Option<SocketAddr>,
    pub gemini: GeminiClientConfig,
}

impl Config {
    /// Optional:
    /// - `MCP_TCP_LISTEN_ADDR`: e.g. "127.0.0.1:7070"
    /// - `GEMINI_BASE_URL`, `GEMINI_MODEL`, `GEMINI_TIMEOUT_SECS`, `GEMINI_TEMPERATURE`,
    ///   `GEMINI_MAX_ERROR_BODY_BYTES`
    pub fn from_env() -> Result<Self, AppError> {
        let tcp_listen_addr = match std::env::var("MCP_TCP_LISTEN_ADDR") {
            Ok(raw) => Some(raw.trim().parse::<SocketAddr>().map_err(|e| {
                AppError::Config(format!("MCP_TCP_LISTEN_ADDR '{raw}' is not a socket address: {e}"))
            })?),
            Err(_) => None,
        };

        Ok(Self {
            tcp_listen_addr,
            gemini: GeminiClientConfig::from_env(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "MCP_TCP_LISTEN_ADDR",
            "GEMINI_BASE_URL",
            "GEMINI_MODEL",
            "GEMINI_TIMEOUT_SECS",
            "GEMINI_TEMPERATURE",
            "GEMINI_MAX_ERROR_BODY_BYTES",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = Config::from_env().expect("config loads with defaults");
        assert!(config.tcp_listen_addr.is_none());
        assert_eq!(config.gemini.model, "gemini-2.5-flash");
        assert_eq!(config.gemini.default_timeout.as_secs(), 120);
        assert_eq!(
            config.gemini.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn trailing_slash_and_overrides() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        std::env::set_var("GEMINI_BASE_URL", "http://localhost:9000/v1beta/");
        std::env::set_var("GEMINI_MODEL", "gemini-test");
        std::env::set_var("GEMINI_TEMPERATURE", "not-a-number");
        std::env::set_var("MCP_TCP_LISTEN_ADDR", "127.0.0.1:7070");
        let config = Config::from_env().expect("config loads");
        assert_eq!(
            config.gemini.endpoint(),
            "http://localhost:9000/v1beta/models/gemini-test:generateContent"
        );
        assert_eq!(config.gemini.temperature, 0.2);
        assert_eq!(config.tcp_listen_addr, Some("127.0.0.1:7070".parse().unwrap()));
        reset_env();
    }

    #[test]
    fn rejects_bad_listen_addr() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        std::env::set_var("MCP_TCP_LISTEN_ADDR", "localhost");
        assert!(matches!(Config::from_env(), Err(AppError::Config(_))));
        reset_env();
    }
}
