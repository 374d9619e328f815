//! Persistence of error response bodies returned by the replay target.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

/// Writes error response bodies to
/// `<dir>/<METHOD>-<service>-<timestamp>-<id>.txt`.
///
/// The short random id keeps two responses logged within the same
/// timestamp from sharing a file.
#[derive(Debug, Clone)]
pub struct ResponseLog {
    dir: PathBuf,
    service: String,
}

impl ResponseLog {
    pub fn new(dir: impl Into<PathBuf>, service: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            service: service.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for a response to `method` received at `at`.
    pub fn file_name(&self, method: &str, at: DateTime<Utc>, id: &str) -> String {
        format!(
            "{method}-{}-{}-{id}.txt",
            sanitize(&self.service),
            at.format("%Y-%m-%dT%H-%M-%S%.6fZ")
        )
    }

    /// Write `body` for a response to `method`, returning the file path.
    ///
    /// Never replaces an existing file.
    pub async fn persist(&self, method: &str, body: &[u8]) -> io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let id = Uuid::new_v4().simple().to_string();
        let path = self.dir.join(self.file_name(method, Utc::now(), &id[..8]));
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        file.write_all(body).await?;
        file.flush().await?;
        debug!(path = %path.display(), bytes = body.len(), "Response body persisted");
        Ok(path)
    }
}

/// Keep the service name usable as a single path component.
fn sanitize(service: &str) -> String {
    service
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect()
}
