// Runtime configuration shared by the CLI and the web server

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Rows per batch write when nothing else is configured
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Records per page for paginated listings
pub const DEFAULT_PAGE_SIZE: u32 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Where uploaded files are spooled before ingestion
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Static assets served at `/`
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Upper bound for the `limit` parameter of the plain listing
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("transfers.db")
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_max_page_size() -> u32 {
    500
}

fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            upload_dir: default_upload_dir(),
            static_dir: default_static_dir(),
            bind_addr: default_bind_addr(),
            batch_size: default_batch_size(),
            page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Config {
    /// Reject settings that would make ingestion or pagination meaningless
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("batch_size must be greater than zero".to_string());
        }
        if self.page_size == 0 {
            return Err("page_size must be greater than zero".to_string());
        }
        if self.max_page_size < self.page_size {
            return Err(format!(
                "max_page_size ({}) must be at least page_size ({})",
                self.max_page_size, self.page_size
            ));
        }
        if self.max_upload_bytes == 0 {
            return Err("max_upload_bytes must be greater than zero".to_string());
        }
        Ok(())
    }

    /// Replace the port of `bind_addr`, keeping the host
    pub fn with_port(mut self, port: u16) -> Self {
        let host = self
            .bind_addr
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| self.bind_addr.clone());
        self.bind_addr = format!("{}:{}", host, port);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.page_size, 10);
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: Config = serde_json::from_str(r#"{"batch_size": 250}"#).unwrap();

        assert_eq!(config.batch_size, 250);
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        let config = Config {
            batch_size: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            page_size: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_with_port() {
        let config = Config::default().with_port(8080);
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
    }
}
