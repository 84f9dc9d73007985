use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};

use super::error::StorageError;
use super::traits::{BlobStore, BoxReader};

/// Filesystem-backed blob store.
///
/// A blob path `/workspaces/1/assignments/2/testcase/1.in` lives at
/// `{base_path}/workspaces/1/assignments/2/testcase/1.in`. Writes go to a
/// temporary file first and are renamed into place, so readers never see a
/// partially written blob.
pub struct FilesystemBlobStore {
    base_path: PathBuf,
    max_size: u64,
}

impl FilesystemBlobStore {
    /// Create a new filesystem blob store.
    pub async fn new(base_path: PathBuf, max_size: u64) -> Result<Self, StorageError> {
        fs::create_dir_all(&base_path).await?;
        fs::create_dir_all(base_path.join(".tmp")).await?;
        Ok(Self {
            base_path,
            max_size,
        })
    }

    /// Map a blob path onto the filesystem, rejecting anything that could escape the root.
    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(path.trim_start_matches('/'));
        let mut resolved = self.base_path.clone();
        let mut depth = 0usize;

        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    if part == ".tmp" && depth == 0 {
                        return Err(StorageError::InvalidPath(format!(
                            "{path}: reserved directory"
                        )));
                    }
                    resolved.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                _ => {
                    return Err(StorageError::InvalidPath(format!(
                        "{path}: only plain path segments are allowed"
                    )));
                }
            }
        }

        if depth == 0 {
            return Err(StorageError::InvalidPath(format!("{path}: empty path")));
        }
        Ok(resolved)
    }

    /// Path for a temporary file during writes.
    fn temp_path(&self) -> PathBuf {
        self.base_path
            .join(".tmp")
            .join(uuid::Uuid::new_v4().to_string())
    }

    async fn write_temp(
        &self,
        temp_path: &Path,
        mut reader: BoxReader,
        offset: u64,
    ) -> Result<(), StorageError> {
        let mut temp_file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(temp_path)
            .await?;
        temp_file.seek(SeekFrom::Start(offset)).await?;

        let mut total_bytes = offset;
        let mut buf = vec![0u8; 64 * 1024]; // 64KB read buffer

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }

            total_bytes += n as u64;
            if total_bytes > self.max_size {
                return Err(StorageError::SizeLimitExceeded {
                    actual: total_bytes,
                    limit: self.max_size,
                });
            }

            temp_file.write_all(&buf[..n]).await?;
        }

        temp_file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn upload(&self, reader: BoxReader, offset: u64, path: &str) -> Result<(), StorageError> {
        let blob_path = self.resolve(path)?;
        let temp_path = self.temp_path();

        // Partial writes start from a copy of the current blob.
        if offset > 0 && fs::try_exists(&blob_path).await? {
            fs::copy(&blob_path, &temp_path).await?;
        }

        if let Err(e) = self.write_temp(&temp_path, reader, offset).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }

        if let Some(parent) = blob_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        if let Err(e) = fs::rename(&temp_path, &blob_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        Ok(())
    }

    async fn read_stream(&self, path: &str) -> Result<BoxReader, StorageError> {
        let blob_path = self.resolve(path)?;
        match fs::File::open(&blob_path).await {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let blob_path = self.resolve(path)?;
        Ok(fs::try_exists(&blob_path).await?)
    }

    async fn delete_directory(&self, path: &str) -> Result<(), StorageError> {
        let dir_path = self.resolve(path)?;
        let metadata = match fs::metadata(&dir_path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        if metadata.is_dir() {
            fs::remove_dir_all(&dir_path).await?;
        } else {
            fs::remove_file(&dir_path).await?;
        }
        Ok(())
    }
}
