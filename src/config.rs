//! Runtime configuration.
//!
//! Resolved from environment variables with sensible defaults; the `serve`
//! and `rebuild` CLI commands layer their flag overrides on top.

use std::path::PathBuf;
use std::time::Duration;

use retina_vision::EMBEDDING_DIM;

#[derive(Debug, Clone)]
pub struct Config {
    /// Storefront catalog database (read-only from this service).
    pub database_path: PathBuf,
    /// Directory holding the persisted index artifacts.
    pub index_dir: PathBuf,
    /// Directory holding the staged embedding model.
    pub model_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    /// Result count for visual search.
    pub top_k: usize,
    /// Per-image acquisition timeout during rebuilds.
    pub fetch_timeout: Duration,
    /// Embedding dimensionality; fixed for the process lifetime.
    pub dim: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_path: env_path("RETINA_DATABASE", "catalog.sqlite3"),
            index_dir: env_path("RETINA_INDEX_DIR", "index"),
            model_dir: env_path("RETINA_MODEL_DIR", "models"),
            host: std::env::var("RETINA_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parse("RETINA_PORT", 8001),
            allowed_origins: env_origins(),
            top_k: env_parse("RETINA_TOP_K", 10),
            fetch_timeout: Duration::from_secs(env_parse("RETINA_FETCH_TIMEOUT_SECS", 10)),
            dim: EMBEDDING_DIM,
        }
    }
}

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_origins() -> Vec<String> {
    match std::env::var("RETINA_ALLOWED_ORIGINS") {
        Ok(value) => value
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Err(_) => vec![
            "http://localhost:3000".to_string(),
            "http://localhost:3001".to_string(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        // Env vars are process-global; only assert on fields no test mutates.
        let config = Config::from_env();
        assert_eq!(config.dim, 512);
        assert!(config.top_k >= 1);
        assert!(config.fetch_timeout >= Duration::from_secs(1));
    }

    #[test]
    fn env_parse_falls_back_on_garbage() {
        std::env::set_var("RETINA_TEST_PORT_GARBAGE", "not-a-number");
        let value: u16 = env_parse("RETINA_TEST_PORT_GARBAGE", 8001);
        assert_eq!(value, 8001);
        std::env::remove_var("RETINA_TEST_PORT_GARBAGE");
    }
}
