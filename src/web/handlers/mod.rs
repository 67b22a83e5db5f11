//! API handlers for the web interface.

use std::io;
use std::sync::Arc;

use axum::body::Body;
use futures::stream::{self, Stream};
use tokio::io::AsyncReadExt;

use crate::archive::ArchiveSupervisor;
use crate::storage::StorageService;
use crate::web::error::ApiError;

pub mod archive;
pub mod files;

pub use archive::*;
pub use files::*;

/// Read size for streamed downloads.
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Sandboxed file storage.
    pub storage: StorageService,
    /// Background archive jobs.
    pub archives: Arc<ArchiveSupervisor>,
}

impl AppState {
    /// Create a new application state.
    pub fn new(storage: StorageService, archives: Arc<ArchiveSupervisor>) -> Self {
        Self { storage, archives }
    }
}

/// Run blocking filesystem work off the async executor.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> crate::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            tracing::error!("Blocking task failed: {}", e);
            ApiError::internal("An internal error occurred")
        })?
        .map_err(ApiError::from)
}

/// Stream an open file as a response body.
///
/// `guard` lives exactly as long as the body; it is dropped when the last
/// chunk is sent, on a read error, or when the client goes away.
pub(crate) fn file_body<G>(file: tokio::fs::File, guard: G) -> Body
where
    G: Send + 'static,
{
    Body::from_stream(chunks(file, guard))
}

fn chunks<G>(file: tokio::fs::File, guard: G) -> impl Stream<Item = io::Result<Vec<u8>>> + Send
where
    G: Send + 'static,
{
    stream::try_unfold((file, guard), |(mut file, guard)| async move {
        let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
        let n = file.read(&mut buf).await?;
        if n == 0 {
            return Ok::<_, io::Error>(None);
        }
        buf.truncate(n);
        Ok(Some((buf, (file, guard))))
    })
}

/// Build a safe Content-Disposition header value for downloads.
///
/// Control characters are dropped, quotes and backslashes replaced in the
/// plain `filename` parameter, and non-ASCII names are carried in an RFC
/// 5987 `filename*` parameter.
pub(crate) fn content_disposition_header(filename: &str) -> String {
    let sanitized: String = filename
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '"' | '\\' => '_',
            _ => c,
        })
        .collect();

    if filename.is_ascii() && !filename.chars().any(|c| c.is_control() || c == '"' || c == '\\') {
        return format!("attachment; filename=\"{}\"", filename);
    }

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        sanitized,
        urlencoding::encode(filename)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use futures::StreamExt;

    #[test]
    fn test_content_disposition_header_simple_ascii() {
        let result = content_disposition_header("report 2024.zip");
        assert_eq!(result, "attachment; filename=\"report 2024.zip\"");
    }

    #[test]
    fn test_content_disposition_header_unicode() {
        let result = content_disposition_header("写真.zip");
        assert!(result.contains("filename*=UTF-8''"));
        assert!(result.contains("%E5%86%99%E7%9C%9F"));
    }

    #[test]
    fn test_content_disposition_header_injection() {
        let result = content_disposition_header("a\"\r\nX-Evil: 1\\.zip");
        assert!(!result.contains('\r'));
        assert!(!result.contains('\n'));
        assert!(result.starts_with("attachment; filename=\"a_X-Evil: 1_.zip\""));
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_chunks_drops_guard_at_end() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("data.bin");
        let content = vec![7u8; STREAM_CHUNK_SIZE + 10];
        std::fs::write(&path, &content).unwrap();

        let dropped = Arc::new(AtomicBool::new(false));
        let file = tokio::fs::File::open(&path).await.unwrap();
        let mut stream = Box::pin(chunks(file, DropFlag(dropped.clone())));

        let mut read = Vec::new();
        while let Some(chunk) = stream.next().await {
            read.extend(chunk.unwrap());
        }

        assert_eq!(read, content);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_chunks_drops_guard_when_abandoned() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("data.bin");
        std::fs::write(&path, vec![1u8; STREAM_CHUNK_SIZE * 3]).unwrap();

        let dropped = Arc::new(AtomicBool::new(false));
        let file = tokio::fs::File::open(&path).await.unwrap();
        let mut stream = Box::pin(chunks(file, DropFlag(dropped.clone())));

        stream.next().await.unwrap().unwrap();
        assert!(!dropped.load(Ordering::SeqCst));

        drop(stream);
        assert!(dropped.load(Ordering::SeqCst));
    }
}
