//! Configuration module for the Team Sport Finder backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key for administrative endpoints
    pub admin_api_key: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Path to Tantivy search index directory
    pub index_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    pub log_format: LogFormat,
    /// Identity provider key-set endpoint
    pub jwks_url: String,
    /// Secret sent as bearer credential when fetching the key set
    pub idp_secret_key: Option<String>,
    /// Expected `iss` claim, checked only when set
    pub jwt_issuer: Option<String>,
    pub jwks_ttl: Duration,
    pub idp_timeout: Duration,
}

/// A configuration variable held a value that could not be parsed.
#[derive(Debug)]
pub struct ConfigError {
    pub variable: &'static str,
    pub value: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid value for {}: {:?}", self.variable, self.value)
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let admin_api_key = non_empty("TEAMFINDER_ADMIN_KEY");

        let db_path = env::var("TEAMFINDER_DB_PATH")
            .unwrap_or_else(|_| "./data/app.sqlite".to_string())
            .into();

        let index_path = env::var("TEAMFINDER_INDEX_PATH")
            .unwrap_or_else(|_| "./data/index".to_string())
            .into();

        let bind_addr = parse_or("TEAMFINDER_BIND_ADDR", "127.0.0.1:8080")?;

        let log_level = env::var("TEAMFINDER_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let log_format = match env::var("TEAMFINDER_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("pretty") | Err(_) => LogFormat::Pretty,
            Ok(other) => {
                return Err(ConfigError {
                    variable: "TEAMFINDER_LOG_FORMAT",
                    value: other.to_string(),
                })
            }
        };

        let jwks_url = env::var("TEAMFINDER_JWKS_URL")
            .unwrap_or_else(|_| "https://api.clerk.com/v1/jwks".to_string());

        let jwks_ttl_secs: u64 = parse_or("TEAMFINDER_JWKS_TTL_SECS", "3600")?;
        let idp_timeout_secs: u64 = parse_or("TEAMFINDER_IDP_TIMEOUT_SECS", "10")?;

        Ok(Self {
            admin_api_key,
            db_path,
            index_path,
            bind_addr,
            log_level,
            log_format,
            jwks_url,
            idp_secret_key: non_empty("TEAMFINDER_IDP_SECRET_KEY"),
            jwt_issuer: non_empty("TEAMFINDER_JWT_ISSUER"),
            jwks_ttl: Duration::from_secs(jwks_ttl_secs),
            idp_timeout: Duration::from_secs(idp_timeout_secs),
        })
    }
}

fn non_empty(variable: &str) -> Option<String> {
    env::var(variable).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T: std::str::FromStr>(
    variable: &'static str,
    default: &str,
) -> Result<T, ConfigError> {
    let value = env::var(variable).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|_| ConfigError { variable, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARIABLES: [&str; 11] = [
        "TEAMFINDER_ADMIN_KEY",
        "TEAMFINDER_DB_PATH",
        "TEAMFINDER_INDEX_PATH",
        "TEAMFINDER_BIND_ADDR",
        "TEAMFINDER_LOG_LEVEL",
        "TEAMFINDER_LOG_FORMAT",
        "TEAMFINDER_JWKS_URL",
        "TEAMFINDER_IDP_SECRET_KEY",
        "TEAMFINDER_JWT_ISSUER",
        "TEAMFINDER_JWKS_TTL_SECS",
        "TEAMFINDER_IDP_TIMEOUT_SECS",
    ];

    // Both cases run in one test so they never race on the process environment.
    #[test]
    fn test_config_from_env() {
        for variable in VARIABLES {
            env::remove_var(variable);
        }

        let config = Config::from_env().unwrap();

        assert!(config.admin_api_key.is_none());
        assert_eq!(config.db_path, PathBuf::from("./data/app.sqlite"));
        assert_eq!(config.index_path, PathBuf::from("./data/index"));
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.jwks_url, "https://api.clerk.com/v1/jwks");
        assert!(config.jwt_issuer.is_none());
        assert_eq!(config.jwks_ttl, Duration::from_secs(3600));
        assert_eq!(config.idp_timeout, Duration::from_secs(10));

        env::set_var("TEAMFINDER_JWKS_TTL_SECS", "an hour");
        let err = Config::from_env().unwrap_err();
        assert_eq!(err.variable, "TEAMFINDER_JWKS_TTL_SECS");
        env::remove_var("TEAMFINDER_JWKS_TTL_SECS");
    }
}
