use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to create staging directory {}: {source}", .path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    /// The upload body itself failed while being read.
    #[error("failed to read upload body: {0}")]
    Read(#[source] io::Error),

    #[error("failed to write staged file {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to remove staged file {}: {source}", .path.display())]
    Remove { path: PathBuf, source: io::Error },
}

/// Transient on-disk home for uploads while they are being transcribed.
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

/// An upload written into the staging area.
///
/// Owned by exactly one request. If it is dropped without going through
/// [`StagingArea::unstage`] (for instance because the request future was
/// cancelled), the file is removed synchronously on drop.
#[derive(Debug)]
pub struct StagedFile {
    key: Uuid,
    path: PathBuf,
    size: u64,
    removed: bool,
}

impl StagedFile {
    pub fn key(&self) -> Uuid {
        self.key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("Removed abandoned staged file {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                "Failed to remove abandoned staged file {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

impl StagingArea {
    /// Opens the staging area, creating the directory if it does not exist yet.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|source| StorageError::CreateDir {
                path: root.clone(),
                source,
            })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Streams `reader` into a fresh file named `<uuid>.<extension>`.
    ///
    /// The name never derives from client input, so concurrent requests
    /// cannot overwrite or delete each other's files. A partial file is
    /// removed before the error is returned.
    pub async fn stage<R>(&self, extension: &str, mut reader: R) -> Result<StagedFile, StorageError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let key = Uuid::new_v4();
        let path = self.root.join(format!("{}.{}", key, extension));

        let result: Result<u64, StorageError> = async {
            let mut file =
                tokio::fs::File::create(&path)
                    .await
                    .map_err(|source| StorageError::Write {
                        path: path.clone(),
                        source,
                    })?;

            let mut buffer = vec![0u8; CHUNK_SIZE];
            let mut size = 0u64;
            loop {
                let n = reader.read(&mut buffer).await.map_err(StorageError::Read)?;
                if n == 0 {
                    break;
                }
                file.write_all(&buffer[..n])
                    .await
                    .map_err(|source| StorageError::Write {
                        path: path.clone(),
                        source,
                    })?;
                size += n as u64;
            }

            file.flush().await.map_err(|source| StorageError::Write {
                path: path.clone(),
                source,
            })?;
            Ok(size)
        }
        .await;

        match result {
            Ok(size) => {
                tracing::debug!("Staged {} bytes at {}", size, path.display());
                Ok(StagedFile {
                    key,
                    path,
                    size,
                    removed: false,
                })
            }
            Err(e) => {
                let _ = remove_path(&path).await;
                Err(e)
            }
        }
    }

    /// Deletes a staged file. Already-missing files count as removed.
    pub async fn unstage(&self, mut staged: StagedFile) -> Result<(), StorageError> {
        remove_path(&staged.path).await?;
        staged.removed = true;
        Ok(())
    }
}

/// Idempotent delete: a file that is already gone is not an error.
pub async fn remove_path(path: &Path) -> Result<(), StorageError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StorageError::Remove {
            path: path.to_path_buf(),
            source,
        }),
    }
}
