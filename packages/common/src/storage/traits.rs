use std::io::Cursor;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::error::StorageError;

/// Type alias for a boxed async reader.
pub type BoxReader = Box<dyn AsyncRead + Unpin + Send>;

/// Hierarchical, path-addressed blob storage.
///
/// Paths are absolute-looking (`/workspaces/1/assignments/2/...`) and always
/// interpreted relative to the store root.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write the reader's bytes at `path`, starting at byte `offset`.
    ///
    /// An offset of zero replaces whatever was stored at `path`.
    async fn upload(&self, reader: BoxReader, offset: u64, path: &str) -> Result<(), StorageError>;

    /// Convenience wrapper around [`BlobStore::upload`] for in-memory data.
    async fn upload_bytes(&self, data: &[u8], path: &str) -> Result<(), StorageError> {
        let reader: BoxReader = Box::new(Cursor::new(data.to_vec()));
        self.upload(reader, 0, path).await
    }

    /// Retrieve all bytes stored at `path`.
    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let mut reader = self.read_stream(path).await?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(buf)
    }

    /// Retrieve the blob at `path` as a streaming async reader.
    async fn read_stream(&self, path: &str) -> Result<BoxReader, StorageError>;

    /// Check whether a blob exists at `path`.
    async fn exists(&self, path: &str) -> Result<bool, StorageError>;

    /// Recursively delete everything under `path`.
    ///
    /// Deleting a directory that does not exist is not an error.
    async fn delete_directory(&self, path: &str) -> Result<(), StorageError>;
}
