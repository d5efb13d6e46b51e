use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::{ErrorKind, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::sync::Mutex;

use super::{ChatMessage, HISTORY_PREFIX, HistoryError, HistoryStore, kib};

/// One JSON document per user under `dir`.
///
/// Writes for one user are serialised; each write lands in its own temp file
/// and is renamed over the document.
#[derive(Debug, Clone)]
pub struct FileHistoryStore {
    dir: PathBuf,
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl FileHistoryStore {
    /// Use `dir`, creating it if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, HistoryError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            locks: Arc::default(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path for `user_id`.
    ///
    /// `[A-Za-z0-9-]` is kept; every other byte, `_` included, becomes `_XX`
    /// (uppercase hex), so distinct ids never share a file.
    pub fn path_for(&self, user_id: &str) -> PathBuf {
        let mut safe = String::with_capacity(user_id.len());
        for byte in user_id.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' {
                safe.push(char::from(byte));
            } else {
                let _ = write!(safe, "_{byte:02X}");
            }
        }
        self.dir.join(format!("{HISTORY_PREFIX}{safe}.json"))
    }

    async fn lock_for(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(user_id.to_string())
            .or_default()
            .clone()
    }

    async fn read(&self, user_id: &str) -> Result<Option<Vec<u8>>, HistoryError> {
        match fs::read(self.path_for(user_id)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Caller holds the user's lock.
    async fn write(&self, user_id: &str, messages: &[ChatMessage]) -> Result<(), HistoryError> {
        let bytes = serde_json::to_vec(messages)?;
        let dir = self.dir.clone();
        let path = self.path_for(user_id);
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(&bytes)?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(std::io::Error::other)??;
        Ok(())
    }
}

#[async_trait::async_trait]
impl HistoryStore for FileHistoryStore {
    async fn save(&self, user_id: &str, messages: &[ChatMessage]) -> Result<(), HistoryError> {
        let lock = self.lock_for(user_id).await;
        let _guard = lock.lock().await;
        self.write(user_id, messages).await
    }

    async fn load(&self, user_id: &str) -> Result<Vec<ChatMessage>, HistoryError> {
        match self.read(user_id).await? {
            Some(bytes) => match serde_json::from_slice(&bytes) {
                Ok(messages) => Ok(messages),
                Err(e) => {
                    tracing::warn!(
                        name: "history.load.corrupt",
                        user_id,
                        error = %e,
                        "Discarding unreadable chat history"
                    );
                    Ok(Vec::new())
                }
            },
            None => Ok(Vec::new()),
        }
    }

    async fn clear(&self, user_id: &str) -> Result<(), HistoryError> {
        let lock = self.lock_for(user_id).await;
        let _guard = lock.lock().await;
        match fs::remove_file(self.path_for(user_id)).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    async fn clear_all(&self) -> Result<(), HistoryError> {
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with(HISTORY_PREFIX) {
                match fs::remove_file(entry.path()).await {
                    Err(e) if e.kind() != ErrorKind::NotFound => return Err(e.into()),
                    _ => {}
                }
            }
        }
        Ok(())
    }

    async fn size_kb(&self, user_id: &str) -> Result<f64, HistoryError> {
        Ok(self
            .read(user_id)
            .await?
            .map_or(0.0, |bytes| kib(bytes.len())))
    }

    async fn append(
        &self,
        user_id: &str,
        new: &[ChatMessage],
        max_messages: usize,
    ) -> Result<(), HistoryError> {
        let lock = self.lock_for(user_id).await;
        let _guard = lock.lock().await;
        let mut messages = self.load(user_id).await?;
        messages.extend_from_slice(new);
        let skip = messages.len().saturating_sub(max_messages);
        self.write(user_id, &messages[skip..]).await
    }
}
