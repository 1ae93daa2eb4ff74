//! Source-of-truth loaders for cache domains.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Loader errors.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unexpected source shape: {0}")]
    Shape(String),

    #[error("Source unavailable: {0}")]
    Source(String),
}

/// Produces the authoritative rows for one cache domain.
#[async_trait]
pub trait DomainLoader: Send + Sync {
    async fn load(&self) -> Result<Vec<Value>, LoaderError>;
}

/// Fixed rows, e.g. compiled-in defaults.
#[derive(Debug, Clone, Default)]
pub struct StaticLoader {
    rows: Vec<Value>,
}

impl StaticLoader {
    pub fn new(rows: Vec<Value>) -> Self {
        Self { rows }
    }
}

#[async_trait]
impl DomainLoader for StaticLoader {
    async fn load(&self) -> Result<Vec<Value>, LoaderError> {
        Ok(self.rows.clone())
    }
}

/// Reads a JSON array of rows from a file on every load.
#[derive(Debug, Clone)]
pub struct JsonFileLoader {
    path: PathBuf,
}

impl JsonFileLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DomainLoader for JsonFileLoader {
    async fn load(&self) -> Result<Vec<Value>, LoaderError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| LoaderError::Io {
                path: self.path.clone(),
                source,
            })?;
        let value: Value = serde_json::from_str(&raw).map_err(|source| LoaderError::Parse {
            path: self.path.clone(),
            source,
        })?;
        match value {
            Value::Array(rows) => Ok(rows),
            other => Err(LoaderError::Shape(format!(
                "{} must contain a JSON array, found {}",
                self.path.display(),
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
