//! Destinations for synthesized audio.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::errors::{TTSError, TTSResult};

/// Append-only audio destination owned by one session.
#[async_trait]
pub trait AudioSink: Send {
    async fn append(&mut self, chunk: &[u8]) -> TTSResult<()>;

    /// Flush once the exchange has finished successfully.
    async fn finish(&mut self) -> TTSResult<()> {
        Ok(())
    }

    /// Discard whatever was written once the exchange has failed.
    async fn abort(&mut self) -> TTSResult<()> {
        Ok(())
    }
}

#[async_trait]
impl AudioSink for Vec<u8> {
    async fn append(&mut self, chunk: &[u8]) -> TTSResult<()> {
        self.extend_from_slice(chunk);
        Ok(())
    }
}

/// Writes audio chunks to a file as they arrive.
///
/// The file is created on the first write (or on `finish` for an exchange
/// without audio) and removed again by `abort`, so a failed exchange
/// leaves nothing behind.
pub struct FileAudioSink {
    path: PathBuf,
    file: Option<File>,
    written: u64,
}

impl FileAudioSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            file: None,
            written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    async fn file(&mut self) -> TTSResult<&mut File> {
        if self.file.is_none() {
            let file = File::create(&self.path).await.map_err(|e| {
                TTSError::AudioSink(format!("Failed to create {}: {e}", self.path.display()))
            })?;
            self.file = Some(file);
        }
        self.file
            .as_mut()
            .ok_or_else(|| TTSError::AudioSink(format!("{} is not open", self.path.display())))
    }
}

#[async_trait]
impl AudioSink for FileAudioSink {
    async fn append(&mut self, chunk: &[u8]) -> TTSResult<()> {
        let path = self.path.clone();
        self.file()
            .await?
            .write_all(chunk)
            .await
            .map_err(|e| TTSError::AudioSink(format!("Failed to write {}: {e}", path.display())))?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    async fn finish(&mut self) -> TTSResult<()> {
        let path = self.path.clone();
        self.file()
            .await?
            .flush()
            .await
            .map_err(|e| TTSError::AudioSink(format!("Failed to flush {}: {e}", path.display())))?;
        debug!("Wrote {} bytes to {}", self.written, self.path.display());
        Ok(())
    }

    async fn abort(&mut self) -> TTSResult<()> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };
        drop(file);
        self.written = 0;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!("Removed partial output {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TTSError::AudioSink(format!(
                "Failed to remove {}: {e}",
                self.path.display()
            ))),
        }
    }
}
