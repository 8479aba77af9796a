// ── xmemory Atoms: Error Types ─────────────────────────────────────────────
// Single canonical error enum for the engine, built with `thiserror`.
//
// Design rules:
//   • Variants are coarse-grained by domain (I/O, JSON, YAML, Store…).
//   • The `#[from]` attribute wires std/external error conversions automatically.
//   • Retrieval paths absorb collaborator failures (log + empty result); only
//     persistence writes and explicit `try_load*` calls surface these errors.

use thiserror::Error;

// ── Primary error enum ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum MemoryError {
    /// Filesystem or OS-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization failure (embeddings, graph).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization / deserialization failure (theme index).
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML configuration could not be parsed.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A persisted document was readable but structurally unusable.
    #[error("Corrupt document {path}: {message}")]
    Corrupt { path: String, message: String },

    /// Semantic store collaborator failure.
    #[error("Store error: {store}: {message}")]
    Store { store: String, message: String },

    /// Embedding provider failure.
    #[error("Embedding error: {provider}: {message}")]
    Embedding { provider: String, message: String },

    /// Engine configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catch-all for errors that do not yet have a dedicated variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenience constructors ───────────────────────────────────────────────

impl MemoryError {
    /// Create a corrupt-document error with path and message.
    pub fn corrupt(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Corrupt { path: path.into(), message: message.into() }
    }

    /// Create a store error with name and message.
    pub fn store(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store { store: store.into(), message: message.into() }
    }

    /// Create an embedding error with provider name and message.
    pub fn embedding(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Embedding { provider: provider.into(), message: message.into() }
    }
}

impl From<String> for MemoryError {
    fn from(s: String) -> Self {
        MemoryError::Other(s)
    }
}

impl From<&str> for MemoryError {
    fn from(s: &str) -> Self {
        MemoryError::Other(s.to_string())
    }
}

// ── Convenience alias ──────────────────────────────────────────────────────

/// All engine operations that can fail return this type.
pub type MemoryResult<T> = Result<T, MemoryError>;

// ── Conversion: MemoryError → String ──────────────────────────────────────
// Lets string-typed boundaries call `.map_err(MemoryError::into)` directly.

impl From<MemoryError> for String {
    fn from(e: MemoryError) -> Self {
        e.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_convert_with_question_mark() {
        fn read() -> MemoryResult<()> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))?;
            Ok(())
        }
        let err = read().unwrap_err();
        assert!(matches!(err, MemoryError::Io(_)));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn constructors_format_context() {
        let err = MemoryError::store("in-memory", "offline");
        assert_eq!(err.to_string(), "Store error: in-memory: offline");
        let as_string: String = MemoryError::corrupt("themes/index.yaml", "bad").into();
        assert!(as_string.starts_with("Corrupt document themes/index.yaml"));
    }
}
