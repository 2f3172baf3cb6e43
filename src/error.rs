//! Error taxonomy for the storage, registry, chunking, and retrieval core.
//!
//! Every fallible core operation returns [`Result<T>`] = `Result<T, Error>`.
//! Callers at the edges (CLI, a host application) are free to wrap this in
//! `anyhow` as the teacher's own binary layer does; the library itself
//! never does, so the error kind is always recoverable by match.

use thiserror::Error;

/// Convenience alias used throughout the core.
pub type Result<T> = std::result::Result<T, Error>;

/// The error kinds named in the storage/registry/chunking/retrieval contract.
#[derive(Debug, Error)]
pub enum Error {
    /// A data operation was attempted on an adapter that was never
    /// initialized, or was already closed.
    #[error("adapter is not initialized or has been closed")]
    NotInitialized,

    /// An embedding's length did not equal the store's configured dimension.
    #[error("embedding has dimension {actual}, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// `get`/`update`/`delete` targeted an id that does not exist.
    #[error("no record found for id {0:?}")]
    NotFound(String),

    /// A provider name was registered twice in the same [`crate::registry::Registry`].
    #[error("provider {0:?} is already registered")]
    AlreadyRegistered(String),

    /// [`crate::registry::Factory::create`] was asked for an unregistered provider.
    #[error("no provider registered under {0:?}")]
    ProviderMissing(String),

    /// The SQL backend's vector extension failed to load.
    #[error("vector extension unavailable: {0}")]
    ExtensionUnavailable(String),

    /// A filter key, or a partial update missing a required field, failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Acquiring an input's bytes failed (network, filesystem, or validation).
    #[error("failed to acquire source: {0}")]
    Acquisition(String),

    /// The external embedder failed for one or more texts.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The underlying SQL engine returned an error.
    #[error("backend error: {0}")]
    Backend(#[from] sqlx::Error),

    /// A custom adapter factory file did not expose a recognized entry point.
    #[error("custom adapter {0:?} exposes no recognized factory entry point")]
    InvalidAdapterModule(String),

    /// Loading a dynamic custom adapter library failed.
    #[error("failed to load custom adapter from {path:?}: {source}")]
    AdapterLoad {
        path: String,
        #[source]
        source: libloading::Error,
    },
}
