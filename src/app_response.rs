use std::fmt::{Display, Formatter};

use lmdb::Error as LmdbError;
use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeError;

/// Outcome envelope shared by the Rust API (as the error type) and the FFI
/// layer (serialized to JSON for the host UI).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AppResponse {
    StorageError(String),
    SerializationError(String),
    NotFound(String),
    ValidationError(String),
    BadRequest(String),
    CatalogError(String),
    ConfigError(String),
    Ok(String),
}

impl Display for AppResponse {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AppResponse::StorageError(msg) => write!(f, "Storage error: {}", msg),
            AppResponse::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            AppResponse::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppResponse::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppResponse::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            AppResponse::CatalogError(msg) => write!(f, "Catalog error: {}", msg),
            AppResponse::ConfigError(msg) => write!(f, "Config error: {}", msg),
            AppResponse::Ok(msg) => write!(f, "Ok: {}", msg),
        }
    }
}

impl std::error::Error for AppResponse {}

impl From<LmdbError> for AppResponse {
    fn from(err: LmdbError) -> Self {
        match err {
            LmdbError::NotFound => AppResponse::NotFound("Key not found in storage".to_string()),
            LmdbError::MapFull => {
                AppResponse::StorageError("Storage is full (LMDB map size reached)".to_string())
            }
            LmdbError::Corrupted => AppResponse::StorageError("Storage is corrupted".to_string()),
            _ => AppResponse::StorageError(format!("LMDB error: {}", err)),
        }
    }
}

impl From<SerdeError> for AppResponse {
    fn from(err: SerdeError) -> Self {
        AppResponse::SerializationError(format!("JSON serialization error: {}", err))
    }
}

impl From<std::io::Error> for AppResponse {
    fn from(err: std::io::Error) -> Self {
        AppResponse::StorageError(format!("IO error: {}", err))
    }
}

impl From<toml::de::Error> for AppResponse {
    fn from(err: toml::de::Error) -> Self {
        AppResponse::ConfigError(format!("Invalid TOML: {}", err))
    }
}

impl From<reqwest::Error> for AppResponse {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppResponse::CatalogError(format!("Catalog request timed out: {}", err))
        } else if err.is_decode() {
            AppResponse::SerializationError(format!("Unreadable catalog response: {}", err))
        } else {
            AppResponse::CatalogError(format!("Catalog request failed: {}", err))
        }
    }
}

impl AppResponse {
    pub fn success(msg: impl Into<String>) -> Self {
        AppResponse::Ok(msg.into())
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, AppResponse::Ok(_))
    }
}
