use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::info;

use parley_db::{Database, MemoryStore, Passwords};
use parley_types::store::Store;

pub const DEFAULT_PORT: u16 = 8080;

/// Where accounts, messages and sessions live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    /// `memory:`; everything is lost on exit.
    Memory,
    /// `sqlite://<path>` or a bare path.
    Sqlite(PathBuf),
}

impl StoreConfig {
    pub fn parse(url: &str) -> Result<Self> {
        let url = url.trim();
        if url.is_empty() {
            bail!("DATABASE_URL is empty");
        }
        if url == "memory:" {
            return Ok(Self::Memory);
        }
        let path = url.strip_prefix("sqlite://").unwrap_or(url);
        if path.is_empty() {
            bail!("DATABASE_URL {:?} has no database path", url);
        }
        Ok(Self::Sqlite(PathBuf::from(path)))
    }

    pub fn open(&self) -> Result<Arc<dyn Store>> {
        match self {
            Self::Memory => {
                info!("Using in-memory store");
                Ok(Arc::new(MemoryStore::new(Passwords::default())))
            }
            Self::Sqlite(path) => {
                info!("Using SQLite store at {}", path.display());
                let db = Database::open(path)
                    .with_context(|| format!("failed to open database {}", path.display()))?;
                Ok(Arc::new(db))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub store: StoreConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let port = std::env::var("PORT").ok();
        let database_url = std::env::var("DATABASE_URL").ok();
        Self::from_vars(port.as_deref(), database_url.as_deref())
    }

    pub fn from_vars(port: Option<&str>, database_url: Option<&str>) -> Result<Self> {
        let port = match port {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("PORT {:?} is not a valid port", raw))?,
            None => DEFAULT_PORT,
        };
        let Some(database_url) = database_url else {
            bail!("DATABASE_URL must be set (use \"memory:\" for a throwaway store)");
        };
        Ok(Self {
            port,
            store: StoreConfig::parse(database_url)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_defaults_to_8080() {
        let config = Config::from_vars(None, Some("memory:")).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.store, StoreConfig::Memory);
    }

    #[test]
    fn database_url_is_required() {
        assert!(Config::from_vars(Some("9000"), None).is_err());
        assert!(Config::from_vars(None, Some("  ")).is_err());
    }

    #[test]
    fn bad_port_is_rejected() {
        assert!(Config::from_vars(Some("eighty"), Some("memory:")).is_err());
        assert!(Config::from_vars(Some("70000"), Some("memory:")).is_err());
    }

    #[test]
    fn sqlite_urls() {
        assert_eq!(
            StoreConfig::parse("sqlite://data/parley.db").unwrap(),
            StoreConfig::Sqlite(PathBuf::from("data/parley.db"))
        );
        assert_eq!(
            StoreConfig::parse("parley.db").unwrap(),
            StoreConfig::Sqlite(PathBuf::from("parley.db"))
        );
        assert!(StoreConfig::parse("sqlite://").is_err());
    }
}
