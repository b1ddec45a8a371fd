// Server configuration.
//
// Centralizes environment variable parsing with defaults for local
// development. The database pool reads its own tuning vars — this module
// covers the core server settings.

use std::net::SocketAddr;

/// Core server configuration.
///
/// Constructed via [`ServerConfig::from_env`] which reads environment
/// variables and falls back to development defaults.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address (host:port).
    pub listen_addr: SocketAddr,
    /// JWT signing secret for access tokens.
    pub jwt_secret: String,
    /// PostgreSQL connection string.
    pub database_url: Option<String>,
    /// Comma-separated CORS origins (or `"*"` for any).
    pub cors_origins: Option<String>,
    /// Log filter directive (e.g. `info`, `tabula_server=debug`).
    pub log_filter: String,
}

const DEV_JWT_SECRET: &str = "tabula_local_development_jwt_secret_must_be_32_chars";

impl ServerConfig {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `TABULA_HOST` | `0.0.0.0` |
    /// | `TABULA_PORT` | `8080` |
    /// | `TABULA_JWT_SECRET` | dev-only placeholder |
    /// | `TABULA_DATABASE_URL` | *(none — in-memory store)* |
    /// | `TABULA_CORS_ORIGINS` | *(none — cors.rs uses dev defaults)* |
    /// | `TABULA_LOG_FILTER` | `info` |
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    /// Testable constructor that accepts an environment lookup function.
    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let host = env("TABULA_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 =
            env("TABULA_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(8080);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));

        let jwt_secret = env("TABULA_JWT_SECRET").unwrap_or_else(|_| DEV_JWT_SECRET.into());
        let database_url = env("TABULA_DATABASE_URL").ok();
        let cors_origins = env("TABULA_CORS_ORIGINS").ok();
        let log_filter = env("TABULA_LOG_FILTER").unwrap_or_else(|_| "info".into());

        Self { listen_addr, jwt_secret, database_url, cors_origins, log_filter }
    }

    /// Returns true when using the development-only JWT secret.
    pub fn is_dev_jwt_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}
