//! Configuration loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

/// Selected storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Postgres,
}

/// Selected authentication mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Jwt,
    Dev,
}

/// JWT verification against a JWKS endpoint. Deployment-provided.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub issuer: String,
    pub audience: String,
    pub jwks_url: String,
    pub clock_skew: Duration,
    /// Periodic refresh picks up key rotation even for cached kids.
    pub jwks_refresh_interval: Duration,
    /// Bounds refresh frequency on unknown kids.
    pub jwks_min_refresh_interval: Duration,
    pub http_timeout: Duration,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to bind the server to (from `PORT`, default 8080).
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub storage_backend: StorageBackend,
    /// Required when the backend is postgres.
    pub database_url: Option<String>,
    pub auth_mode: AuthMode,
    /// Dev-mode fallback when `X-Debug-Subject` is absent.
    pub dev_default_subject: Option<String>,
    /// Present iff `auth_mode == Jwt`.
    pub jwt: Option<JwtConfig>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let port = env::var("PORT").unwrap_or_else(|_| "8080".to_string());
        let bind_addr = format!("0.0.0.0:{port}")
            .parse()
            .expect("PORT must be a valid port number");

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let storage_backend = match env::var("STORAGE_BACKEND").as_deref() {
            Ok("postgres") => StorageBackend::Postgres,
            Ok("memory") | Err(_) => StorageBackend::Memory,
            Ok(other) => panic!("STORAGE_BACKEND must be memory or postgres, got {other:?}"),
        };
        let database_url = env::var("DATABASE_URL").ok();
        if storage_backend == StorageBackend::Postgres && database_url.is_none() {
            panic!("DATABASE_URL is required when STORAGE_BACKEND=postgres");
        }

        let auth_mode = match env::var("AUTH_MODE").as_deref() {
            Ok("dev") => AuthMode::Dev,
            Ok("jwt") | Err(_) => AuthMode::Jwt,
            Ok(other) => panic!("AUTH_MODE must be jwt or dev, got {other:?}"),
        };
        let dev_default_subject = env::var("DEV_DEFAULT_SUBJECT").ok();

        let jwt = match auth_mode {
            AuthMode::Jwt => Some(load_jwt_config()),
            AuthMode::Dev => None,
        };

        Self {
            bind_addr,
            log_level,
            storage_backend,
            database_url,
            auth_mode,
            dev_default_subject,
            jwt,
        }
    }
}

fn load_jwt_config() -> JwtConfig {
    let issuer = env::var("JWT_ISSUER").expect("JWT_ISSUER is required when AUTH_MODE=jwt");
    let audience = env::var("JWT_AUDIENCE").expect("JWT_AUDIENCE is required when AUTH_MODE=jwt");
    let jwks_url = env::var("JWT_JWKS_URL").expect("JWT_JWKS_URL is required when AUTH_MODE=jwt");

    JwtConfig {
        issuer,
        audience,
        jwks_url,
        clock_skew: duration_secs("JWT_CLOCK_SKEW", 30),
        jwks_refresh_interval: duration_secs("JWT_JWKS_REFRESH_INTERVAL", 300),
        jwks_min_refresh_interval: duration_secs("JWT_JWKS_MIN_REFRESH_INTERVAL", 10),
        http_timeout: Duration::from_secs(5),
    }
}

fn duration_secs(var: &str, default_secs: u64) -> Duration {
    match env::var(var) {
        Ok(raw) => {
            let secs: u64 = raw
                .parse()
                .unwrap_or_else(|_| panic!("{var} must be a number of seconds, got {raw:?}"));
            Duration::from_secs(secs)
        }
        Err(_) => Duration::from_secs(default_secs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_memory_backend_and_dev_free_jwt_off() {
        env::remove_var("PORT");
        env::remove_var("STORAGE_BACKEND");
        env::remove_var("DATABASE_URL");
        env::set_var("AUTH_MODE", "dev");
        env::remove_var("LOG_LEVEL");

        let config = Config::from_env();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.storage_backend, StorageBackend::Memory);
        assert_eq!(config.auth_mode, AuthMode::Dev);
        assert!(config.jwt.is_none());
        assert_eq!(config.log_level, "info");
    }
}
