use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub http_addr: String,
    pub database_url: String,
    pub redis_url: String,
    pub db_max_connections: u32,
    pub db_connect_timeout_seconds: u64,
    pub db_idle_timeout_seconds: u64,
    pub db_max_lifetime_seconds: u64,
    pub cache_after_upvotes: i64,
    pub cache_lookup_timeout_ms: u64,
    pub body_limit_bytes: usize,
    pub paseto_access_key: [u8; 32],
}

/// When snapshots are written and how long a lookup may take before it is
/// treated as a miss.
#[derive(Clone, Copy, Debug)]
pub struct CachePolicy {
    pub promote_at_score: i64,
    pub lookup_timeout: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            promote_at_score: 1,
            lookup_timeout: Duration::from_millis(250),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let http_addr = env_or("HTTP_ADDR", "0.0.0.0:8080");
        let _parsed_http_addr = SocketAddr::from_str(&http_addr)
            .map_err(|err| anyhow!("invalid HTTP_ADDR: {}", err))?;

        Ok(Self {
            http_addr,
            database_url: env_or_err("DATABASE_URL")?,
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1/"),
            db_max_connections: env_or_parse("DB_MAX_CONNECTIONS", "25")?,
            db_connect_timeout_seconds: env_or_parse("DB_CONNECT_TIMEOUT_SECONDS", "5")?,
            db_idle_timeout_seconds: env_or_parse("DB_IDLE_TIMEOUT_SECONDS", "300")?,
            db_max_lifetime_seconds: env_or_parse("DB_MAX_LIFETIME_SECONDS", "1800")?,
            cache_after_upvotes: env_or_parse("CACHE_AFTER_UPVOTES", "1")?,
            cache_lookup_timeout_ms: env_or_parse("CACHE_LOOKUP_TIMEOUT_MS", "250")?,
            body_limit_bytes: env_or_parse("BODY_LIMIT_BYTES", "65536")?,
            paseto_access_key: env_key_32("PASETO_ACCESS_KEY")?,
        })
    }

    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy {
            promote_at_score: self.cache_after_upvotes,
            lookup_timeout: Duration::from_millis(self.cache_lookup_timeout_ms),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_err(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| anyhow!("missing required env var: {}", key))
}

fn env_or_parse<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    let value = std::env::var(key).unwrap_or_else(|_| default.to_string());
    value
        .parse::<T>()
        .map_err(|err| anyhow!("invalid {}: {}", key, err))
}

pub fn decode_key_32(key: &str, value: &str) -> Result<[u8; 32]> {
    let decoded = STANDARD
        .decode(value.as_bytes())
        .map_err(|err| anyhow!("invalid {}: {}", key, err))?;
    if decoded.len() != 32 {
        return Err(anyhow!("invalid {}: expected 32 bytes", key));
    }
    let mut key_bytes = [0u8; 32];
    key_bytes.copy_from_slice(&decoded);
    Ok(key_bytes)
}

fn env_key_32(key: &str) -> Result<[u8; 32]> {
    let value = env_or_err(key)?;
    decode_key_32(key, &value)
}
