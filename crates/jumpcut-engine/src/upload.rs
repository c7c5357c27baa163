//! Chunked upload sessions.
//!
//! Large inputs (8GB+) arrive as sequential chunks against a session
//! created with a declared total size. Finalize succeeds only when the
//! received byte count matches the declaration exactly; a mismatch leaves
//! the session open so the missing chunks can still arrive.

use std::collections::HashMap;
use std::path::PathBuf;

use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};

/// State of one in-flight chunked upload.
#[derive(Debug, Clone)]
pub struct UploadSession {
    /// Original filename as declared by the caller
    pub filename: String,
    /// Assembly path on disk
    pub path: PathBuf,
    /// Declared total size in bytes
    pub declared_size: u64,
    /// Bytes appended so far
    pub bytes_received: u64,
}

/// Store of in-flight chunked uploads.
pub struct UploadStore {
    dir: PathBuf,
    sessions: RwLock<HashMap<String, UploadSession>>,
}

impl UploadStore {
    /// Create a store assembling files under `dir`.
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Start a new upload session, creating an empty assembly file.
    pub async fn init(&self, filename: &str, declared_size: u64) -> EngineResult<String> {
        if declared_size == 0 {
            return Err(EngineError::invalid_input("declared size must be non-zero"));
        }

        let session_id = Uuid::new_v4().to_string();
        let safe_name = sanitize_filename(filename);
        let path = self.dir.join(format!("{}_{}", session_id, safe_name));

        tokio::fs::File::create(&path)
            .await
            .map_err(|e| EngineError::processing("upload", e.to_string()))?;

        let session = UploadSession {
            filename: safe_name,
            path,
            declared_size,
            bytes_received: 0,
        };

        debug!(session_id = %session_id, declared_size, "Upload session initialized");
        self.sessions
            .write()
            .await
            .insert(session_id.clone(), session);
        Ok(session_id)
    }

    /// Append a chunk to the session's assembly file.
    pub async fn append(&self, session_id: &str, chunk: &[u8]) -> EngineResult<u64> {
        let path = {
            let sessions = self.sessions.read().await;
            let session = sessions
                .get(session_id)
                .ok_or_else(|| EngineError::not_found(format!("upload {}", session_id)))?;
            session.path.clone()
        };

        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .await
            .map_err(|e| EngineError::processing("upload", e.to_string()))?;
        file.write_all(chunk)
            .await
            .map_err(|e| EngineError::processing("upload", e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| EngineError::processing("upload", e.to_string()))?;

        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| EngineError::not_found(format!("upload {}", session_id)))?;
        session.bytes_received += chunk.len() as u64;
        Ok(session.bytes_received)
    }

    /// Complete a session, returning the assembled file.
    ///
    /// Fails with `IncompleteUpload` unless the received byte count equals
    /// the declared size; the session stays open on mismatch.
    pub async fn finalize(&self, session_id: &str) -> EngineResult<UploadSession> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get(session_id)
            .ok_or_else(|| EngineError::not_found(format!("upload {}", session_id)))?;

        if session.bytes_received != session.declared_size {
            return Err(EngineError::IncompleteUpload {
                received: session.bytes_received,
                declared: session.declared_size,
            });
        }

        let session = sessions.remove(session_id).expect("checked above");
        info!(
            session_id = %session_id,
            bytes = session.bytes_received,
            "Upload finalized"
        );
        Ok(session)
    }

    /// Look up a session's current state.
    pub async fn get(&self, session_id: &str) -> EngineResult<UploadSession> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("upload {}", session_id)))
    }
}

/// Strip path components from a caller-supplied filename.
fn sanitize_filename(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name)
        .trim()
        .to_string();
    if base.is_empty() || base == "." || base == ".." {
        "upload.bin".to_string()
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store(dir: &tempfile::TempDir) -> UploadStore {
        UploadStore::new(dir.path().to_path_buf())
    }

    #[tokio::test]
    async fn test_finalize_exact_size() {
        let dir = tempdir().unwrap();
        let store = store(&dir);

        let id = store.init("video.mp4", 10).await.unwrap();
        store.append(&id, b"hello").await.unwrap();
        store.append(&id, b"world").await.unwrap();

        let session = store.finalize(&id).await.unwrap();
        assert_eq!(session.bytes_received, 10);
        assert_eq!(
            tokio::fs::read(&session.path).await.unwrap(),
            b"helloworld"
        );
    }

    #[tokio::test]
    async fn test_finalize_incomplete_rejected() {
        let dir = tempdir().unwrap();
        let store = store(&dir);

        let id = store.init("video.mp4", 10).await.unwrap();
        store.append(&id, b"hello").await.unwrap();

        let err = store.finalize(&id).await.unwrap_err();
        assert_eq!(
            err,
            EngineError::IncompleteUpload {
                received: 5,
                declared: 10
            }
        );

        // Session survives the failed finalize; the rest can still arrive
        store.append(&id, b"world").await.unwrap();
        assert!(store.finalize(&id).await.is_ok());
    }

    #[tokio::test]
    async fn test_finalize_consumes_session() {
        let dir = tempdir().unwrap();
        let store = store(&dir);

        let id = store.init("a.bin", 1).await.unwrap();
        store.append(&id, b"x").await.unwrap();
        store.finalize(&id).await.unwrap();

        assert!(matches!(
            store.finalize(&id).await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        assert!(matches!(
            store.append("nope", b"x").await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_zero_declared_size_rejected() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        assert!(matches!(
            store.init("a.bin", 0).await,
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("video.mp4"), "video.mp4");
        assert_eq!(sanitize_filename("/etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("..\\..\\evil.exe"), "evil.exe");
        assert_eq!(sanitize_filename(".."), "upload.bin");
        assert_eq!(sanitize_filename(""), "upload.bin");
    }
}
