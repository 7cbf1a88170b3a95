//! Pluggable destination for downloaded files (C3).
//!
//! Only the handle contract the orchestrator and download engine need is
//! specified here; the local-filesystem implementation in [`local`] is the
//! default, but object-store-backed implementations are a drop-in swap since
//! every consumer is generic over `dyn FileStore`.

mod local;

pub use local::LocalFileStore;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use thiserror::Error;

/// Error from a file-store operation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The destination directory already exists.
    #[error("destination already exists: {0}")]
    AlreadyExists(String),

    /// An I/O failure creating a directory or writing a file.
    #[error("store I/O error at {path}: {source}")]
    Io {
        /// The path the operation was acting on.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// An open, writable destination for a single file's bytes.
#[async_trait]
pub trait FileHandle: Send + Sync {
    /// The handle's file name, relative to its parent store.
    fn name(&self) -> &str;

    /// Consumes a byte stream into the file, returning the total bytes
    /// written. Streaming rather than buffering keeps memory flat for
    /// arbitrarily large NDJSON outputs.
    async fn write_stream(
        &mut self,
        stream: std::pin::Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    ) -> Result<u64, StoreError>;
}

/// A destination directory: creates children and reports on existing state.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Whether the store's root already exists.
    async fn exists(&self) -> Result<bool, StoreError>;

    /// Creates the store's root directory. Errors if it already exists.
    async fn create_dir(&self) -> Result<(), StoreError>;

    /// Opens a new child file for writing, creating it if absent.
    async fn child(&self, name: &str) -> Result<Box<dyn FileHandle>, StoreError>;

    /// Writes a zero-byte completion marker named `_SUCCESS`.
    async fn write_success_marker(&self) -> Result<(), StoreError>;

    /// A human-readable identifier for the store's root, used in logs.
    fn uri(&self) -> String;
}
