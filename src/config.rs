//! Runtime configuration, resolved once at startup from environment variables.

use std::path::PathBuf;

use crate::api::SecurityConfig;

/// Result-size limits for list and search requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PagingConfig {
    /// Page size when the request has no `limit` (from COHORT_REST_DEFAULT_LIMIT)
    pub default_limit: usize,
    /// Largest page a request may ask for (from COHORT_REST_MAX_LIMIT)
    pub max_limit: usize,
}

impl PagingConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_limit: env_usize("COHORT_REST_DEFAULT_LIMIT").unwrap_or(defaults.default_limit),
            max_limit: env_usize("COHORT_REST_MAX_LIMIT").unwrap_or(defaults.max_limit),
        }
    }
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            default_limit: 50,
            max_limit: 100,
        }
    }
}

/// Everything the server needs to start.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// SQLite file (from COHORT_REST_DB_PATH). `None` uses the platform data directory.
    pub database_path: Option<PathBuf>,
    pub security: SecurityConfig,
    pub paging: PagingConfig,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            database_path: std::env::var("COHORT_REST_DB_PATH").ok().map(PathBuf::from),
            security: SecurityConfig::from_env(),
            paging: PagingConfig::from_env(),
        }
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paging_defaults_match_rest_limits() {
        let config = PagingConfig::default();
        assert_eq!(config.default_limit, 50);
        assert_eq!(config.max_limit, 100);
    }
}
