//! Artifact Sinks - Where Rendered Decks Go

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Invalid request id: {0}")]
    InvalidKey(String),

    #[error("Storage write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable storage for serialized documents. Returns a location string the
/// caller can hand back to its users.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn store(&self, request_id: &str, bytes: &[u8], content_type: &str) -> Result<String, SinkError>;
}

fn file_name(request_id: &str, content_type: &str) -> Result<String, SinkError> {
    let valid = !request_id.is_empty()
        && request_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(SinkError::InvalidKey(request_id.to_string()));
    }
    let extension = match content_type {
        PDF_CONTENT_TYPE => "pdf",
        "application/json" => "json",
        _ => "bin",
    };
    Ok(format!("{}.{}", request_id, extension))
}

/// In-memory sink, mostly for tests and dry runs.
#[derive(Clone, Default)]
pub struct MemorySink {
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, location: &str) -> Option<Vec<u8>> {
        let key = location.strip_prefix("memory://").unwrap_or(location);
        self.files.lock().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.files.lock().await.len()
    }
}

#[async_trait]
impl ArtifactSink for MemorySink {
    async fn store(&self, request_id: &str, bytes: &[u8], content_type: &str) -> Result<String, SinkError> {
        let name = file_name(request_id, content_type)?;
        self.files.lock().await.insert(name.clone(), bytes.to_vec());
        Ok(format!("memory://{}", name))
    }
}

/// Writes `<root>/<request_id>.<ext>`. The file is written under a temporary
/// name first and renamed, so readers never observe a partial artifact.
#[derive(Debug, Clone)]
pub struct FsSink {
    root: PathBuf,
}

impl FsSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ArtifactSink for FsSink {
    async fn store(&self, request_id: &str, bytes: &[u8], content_type: &str) -> Result<String, SinkError> {
        let name = file_name(request_id, content_type)?;
        tokio::fs::create_dir_all(&self.root).await?;
        let target = self.root.join(&name);
        let partial = self.root.join(format!(".{}.partial", name));
        tokio::fs::write(&partial, bytes).await?;
        tokio::fs::rename(&partial, &target).await?;
        tracing::debug!(path = %target.display(), bytes = bytes.len(), "artifact stored");
        Ok(target.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_sink_round_trips() {
        let sink = MemorySink::new();
        let location = sink.store("req-1", b"%PDF", PDF_CONTENT_TYPE).await.unwrap();
        assert_eq!(location, "memory://req-1.pdf");
        assert_eq!(sink.get(&location).await.unwrap(), b"%PDF");
    }

    #[tokio::test]
    async fn fs_sink_writes_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FsSink::new(dir.path().join("out"));
        let location = sink.store("req_2", b"data", PDF_CONTENT_TYPE).await.unwrap();
        assert_eq!(std::fs::read(&location).unwrap(), b"data");
        assert!(location.ends_with("req_2.pdf"));
    }

    #[tokio::test]
    async fn rejects_path_like_ids() {
        let sink = MemorySink::new();
        assert!(matches!(
            sink.store("../etc", b"", PDF_CONTENT_TYPE).await,
            Err(SinkError::InvalidKey(_))
        ));
    }
}
