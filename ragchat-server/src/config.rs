//! Server configuration read from the environment.

use std::str::FromStr;

use ragchat_rag::DEFAULT_COLLECTION;
use ragchat_rag::chroma::DEFAULT_CHROMA_URL;
use ragchat_rag::ollama::{DEFAULT_EMBEDDING_MODEL, DEFAULT_OLLAMA_URL};
use thiserror::Error;

/// Default generation model.
pub const DEFAULT_MODEL: &str = "mistral";

/// Default upper bound for an uploaded file.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// A configuration value that could not be used.
#[derive(Debug, Error)]
#[error("invalid value for {name}: {value:?} ({reason})")]
pub struct ConfigError {
    /// Environment variable name.
    pub name: &'static str,
    /// The rejected value.
    pub value: String,
    /// Why it was rejected.
    pub reason: String,
}

/// Which vector store backend to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorStoreKind {
    Chroma,
    Memory,
}

impl FromStr for VectorStoreKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "chroma" => Ok(Self::Chroma),
            "memory" | "in-memory" | "inmemory" => Ok(Self::Memory),
            other => Err(format!("unknown vector store {other:?}, expected chroma or memory")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub ollama_url: String,
    pub model: String,
    pub embedding_model: String,
    pub chroma_url: String,
    pub vector_store: VectorStoreKind,
    pub collection: String,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            chroma_url: DEFAULT_CHROMA_URL.to_string(),
            vector_store: VectorStoreKind::Chroma,
            collection: DEFAULT_COLLECTION.to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl ServerConfig {
    /// Read the configuration from process environment variables.
    ///
    /// Unset variables keep their defaults; set but unparsable ones are errors.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let text = |name: &str, default: String| {
            lookup(name).filter(|v| !v.trim().is_empty()).unwrap_or(default)
        };

        Ok(Self {
            host: text("HOST", defaults.host),
            port: parsed(&lookup, "PORT", defaults.port)?,
            ollama_url: text("OLLAMA_API_URL", defaults.ollama_url),
            model: text("OLLAMA_MODEL", defaults.model),
            embedding_model: text("EMBEDDING_MODEL", defaults.embedding_model),
            chroma_url: text("CHROMA_DB_PATH", defaults.chroma_url),
            vector_store: parsed(&lookup, "VECTOR_STORE", defaults.vector_store)?,
            collection: defaults.collection,
            max_upload_bytes: parsed(&lookup, "MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
        })
    }
}

fn parsed<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    match lookup(name).filter(|v| !v.trim().is_empty()) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError {
            name,
            reason: e.to_string(),
            value,
        }),
    }
}
