//! Local-filesystem [`FileStore`] implementation, the default destination.

use std::path::PathBuf;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use super::{FileHandle, FileStore, StoreError};

/// Writes downloaded files beneath a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    /// Creates a store rooted at `root`. No filesystem access happens here.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn exists(&self) -> Result<bool, StoreError> {
        Ok(tokio::fs::try_exists(&self.root)
            .await
            .map_err(|source| io_error(&self.root, source))?)
    }

    async fn create_dir(&self) -> Result<(), StoreError> {
        if self.exists().await? {
            return Err(StoreError::AlreadyExists(self.root.display().to_string()));
        }
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| io_error(&self.root, source))
    }

    async fn child(&self, name: &str) -> Result<Box<dyn FileHandle>, StoreError> {
        let path = self.root.join(name);
        let file = File::create(&path)
            .await
            .map_err(|source| io_error(&path, source))?;
        debug!(path = %path.display(), "opened file handle");
        Ok(Box::new(LocalFileHandle {
            name: name.to_string(),
            path,
            writer: BufWriter::new(file),
        }))
    }

    async fn write_success_marker(&self) -> Result<(), StoreError> {
        let path = self.root.join("_SUCCESS");
        File::create(&path)
            .await
            .map_err(|source| io_error(&path, source))?;
        Ok(())
    }

    fn uri(&self) -> String {
        format!("file://{}", self.root.display())
    }
}

struct LocalFileHandle {
    name: String,
    path: PathBuf,
    writer: BufWriter<File>,
}

#[async_trait]
impl FileHandle for LocalFileHandle {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write_stream(
        &mut self,
        mut stream: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    ) -> Result<u64, StoreError> {
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| io_error(&self.path, std::io::Error::other(source)))?;
            self.writer
                .write_all(&chunk)
                .await
                .map_err(|source| io_error(&self.path, source))?;
            written += chunk.len() as u64;
        }
        self.writer
            .flush()
            .await
            .map_err(|source| io_error(&self.path, source))?;
        Ok(written)
    }
}

fn io_error(path: &std::path::Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[tokio::test]
    async fn create_dir_then_exists_true() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("export-out");
        let store = LocalFileStore::new(&root);
        assert!(!store.exists().await.unwrap());
        store.create_dir().await.unwrap();
        assert!(store.exists().await.unwrap());
    }

    #[tokio::test]
    async fn create_dir_twice_errors() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("export-out");
        let store = LocalFileStore::new(&root);
        store.create_dir().await.unwrap();
        assert!(matches!(
            store.create_dir().await,
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn child_writes_stream_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());
        let mut handle = store.child("Patient.0000.ndjson").await.unwrap();
        let chunks: Vec<reqwest::Result<Bytes>> =
            vec![Ok(Bytes::from_static(b"a")), Ok(Bytes::from_static(b"bc"))];
        let written = handle
            .write_stream(Box::pin(stream::iter(chunks)))
            .await
            .unwrap();
        assert_eq!(written, 3);
        let contents = std::fs::read(dir.path().join("Patient.0000.ndjson")).unwrap();
        assert_eq!(contents, b"abc");
    }

    #[tokio::test]
    async fn success_marker_is_zero_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());
        store.write_success_marker().await.unwrap();
        let meta = std::fs::metadata(dir.path().join("_SUCCESS")).unwrap();
        assert_eq!(meta.len(), 0);
    }
}
