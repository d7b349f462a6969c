//! Runtime configuration, read from TOML.
//!
//! ```toml
//! storage_path = "data/bookstore"
//! namespace = "BookStore_"
//! map_size = 10485760
//!
//! [catalog]
//! base_url = "https://www.googleapis.com/books/v1"
//! api_key = "..."
//! timeout_secs = 10
//! placeholder_cover = "images/NoImage.svg"
//! ```
//!
//! Every field is optional.

use std::fs;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::app_response::AppResponse;
use crate::commerce_store::DEFAULT_NAMESPACE;

pub const ENV_STORAGE_PATH: &str = "BOOKSTORE_STORAGE_PATH";
pub const ENV_CATALOG_API_KEY: &str = "BOOKSTORE_CATALOG_API_KEY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base name of the LMDB environment; the directory is `<storage_path>.lmdb`.
    pub storage_path: String,
    /// Prefix of the snapshot key.
    pub namespace: String,
    pub map_size: usize,
    pub catalog: CatalogConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            storage_path: "bookstore".to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            map_size: 10 * 1024 * 1024,
            catalog: CatalogConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub placeholder_cover: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        CatalogConfig {
            base_url: "https://www.googleapis.com/books/v1".to_string(),
            api_key: None,
            timeout_secs: 10,
            placeholder_cover: "images/NoImage.svg".to_string(),
        }
    }
}

impl StoreConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, AppResponse> {
        let config: StoreConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, AppResponse> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            AppResponse::ConfigError(format!("Cannot read {}: {e}", path.display()))
        })?;
        info!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&text)
    }

    /// Applies `BOOKSTORE_STORAGE_PATH` and `BOOKSTORE_CATALOG_API_KEY`.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(path) = lookup(ENV_STORAGE_PATH).filter(|v| !v.trim().is_empty()) {
            self.storage_path = path;
        }
        if let Some(key) = lookup(ENV_CATALOG_API_KEY).filter(|v| !v.trim().is_empty()) {
            self.catalog.api_key = Some(key);
        }
        self
    }

    fn validate(&self) -> Result<(), AppResponse> {
        if self.storage_path.trim().is_empty() {
            return Err(AppResponse::ConfigError("storage_path must not be empty".to_string()));
        }
        if self.map_size == 0 {
            return Err(AppResponse::ConfigError("map_size must be positive".to_string()));
        }
        if self.catalog.timeout_secs == 0 {
            return Err(AppResponse::ConfigError("catalog.timeout_secs must be positive".to_string()));
        }
        Ok(())
    }
}
