//! Client configuration
//!
//! Fixed at client construction. The lifetime applies to every session the
//! client creates or touches.
//!
//! ```json
//! { "addr": "127.0.0.1:6379", "db": 0, "lifetime_secs": 1800 }
//! ```
//!
//! `addr` may also be a full URL. A URL that already selects a database
//! must select `db`; one that does not gets `db` added.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::MAX_TTL_SECS;
use crate::session::{SessionError, SessionResult, DEFAULT_MAX_RETRIES};

/// Session store client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Store address, `host:port` or a full `redis://` URL (default: "127.0.0.1:6379")
    #[serde(default = "default_addr")]
    pub addr: String,

    /// Logical database index (default: 0)
    #[serde(default)]
    pub db: i64,

    /// Session lifetime in seconds (default: 600)
    #[serde(default = "default_lifetime_secs")]
    pub lifetime_secs: u64,

    /// Optimistic commit attempts per field mutation (default: 10)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_addr() -> String {
    "127.0.0.1:6379".to_string()
}

fn default_lifetime_secs() -> u64 {
    600
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            db: 0,
            lifetime_secs: default_lifetime_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl ClientConfig {
    /// Config for `addr` and `db` with default lifetime and retries
    pub fn new(addr: impl Into<String>, db: i64) -> Self {
        Self {
            addr: addr.into(),
            db,
            ..Self::default()
        }
    }

    pub fn with_lifetime_secs(mut self, lifetime_secs: u64) -> Self {
        self.lifetime_secs = lifetime_secs;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> SessionResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| SessionError::Config(format!("Failed to read config: {}", e)))?;

        let config: ClientConfig = serde_json::from_str(&content)
            .map_err(|e| SessionError::Config(format!("Invalid config JSON: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Reject values the store cannot honor
    pub fn validate(&self) -> SessionResult<()> {
        if self.addr.trim().is_empty() {
            return Err(SessionError::Config("addr must not be empty".to_string()));
        }

        if self.db < 0 {
            return Err(SessionError::Config("db must be >= 0".to_string()));
        }

        if let Some(selected) = self.addr_db() {
            if selected.parse::<i64>() != Ok(self.db) {
                return Err(SessionError::Config(format!(
                    "addr selects database {} but db is {}",
                    selected, self.db
                )));
            }
        }

        if self.lifetime_secs == 0 {
            return Err(SessionError::Config("lifetime_secs must be > 0".to_string()));
        }

        if self.lifetime_secs > MAX_TTL_SECS {
            return Err(SessionError::Config(format!(
                "lifetime_secs must be <= {}",
                MAX_TTL_SECS
            )));
        }

        if self.max_retries == 0 {
            return Err(SessionError::Config("max_retries must be > 0".to_string()));
        }

        Ok(())
    }

    /// Session lifetime as a duration
    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(self.lifetime_secs)
    }

    /// Connection URL for the Redis backend
    pub fn redis_url(&self) -> String {
        let Some((scheme, _)) = self.addr.split_once("://") else {
            return format!("redis://{}/{}", self.addr, self.db);
        };
        if self.addr_db().is_some() {
            return self.addr.clone();
        }

        let (location, query) = split_query(&self.addr);
        match query {
            Some(query) if is_unix_scheme(scheme) => {
                format!("{}?{}&db={}", location, query, self.db)
            }
            None if is_unix_scheme(scheme) => format!("{}?db={}", location, self.db),
            Some(query) => format!("{}/{}?{}", location.trim_end_matches('/'), self.db, query),
            None => format!("{}/{}", location.trim_end_matches('/'), self.db),
        }
    }

    /// Database selector already present in a URL `addr`
    fn addr_db(&self) -> Option<&str> {
        let (scheme, rest) = self.addr.split_once("://")?;
        let (location, query) = split_query(rest);

        if is_unix_scheme(scheme) {
            // The path names the socket; the database goes in the query
            return query?.split('&').find_map(|pair| pair.strip_prefix("db="));
        }

        let (_, path) = location.split_once('/')?;
        let path = path.trim_matches('/');
        (!path.is_empty()).then_some(path)
    }
}

fn split_query(url: &str) -> (&str, Option<&str>) {
    match url.split_once('?') {
        Some((location, query)) if !query.is_empty() => (location, Some(query)),
        Some((location, _)) => (location, None),
        None => (url, None),
    }
}

fn is_unix_scheme(scheme: &str) -> bool {
    scheme == "unix" || scheme.ends_with("+unix")
}
