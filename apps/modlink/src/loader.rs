//! # Loader
//!
//! The binary's side of the loader collaborator.
//!
//! - [`ChannelLoader`] is what the core calls; it only queues identifiers
//! - [`Fetcher`] obtains the source behind an identifier (`file://` through
//!   `tokio::fs`, `http(s)://` through `reqwest`)
//!
//! The driver owns the receiving end and decides when fetched code runs.

use crate::config::LoaderConfig;
use crate::error::AppError;
use modlink_core::{Identifier, Loader};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use url::Url;

/// Upper bound on a single HTTP fetch.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// CHANNEL LOADER
// =============================================================================

/// Queues load requests for the driver.
#[derive(Debug, Clone)]
pub struct ChannelLoader {
    requests: UnboundedSender<Identifier>,
}

/// Create a loader and the receiver its requests arrive on.
pub fn channel() -> (ChannelLoader, UnboundedReceiver<Identifier>) {
    let (requests, receiver) = mpsc::unbounded_channel();
    (ChannelLoader { requests }, receiver)
}

impl Loader for ChannelLoader {
    fn load(&mut self, id: &Identifier) {
        tracing::debug!(module = %id, "load requested");
        if self.requests.send(id.clone()).is_err() {
            tracing::warn!(module = %id, "load request dropped: driver has stopped");
        }
    }
}

// =============================================================================
// FETCHER
// =============================================================================

/// Fetches unit sources. Cheap to clone; one clone per fetch task.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    max_source_bytes: u64,
}

impl Fetcher {
    /// Build a fetcher from the `[loader]` settings.
    pub fn new(config: &LoaderConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(HTTP_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            max_source_bytes: config.max_source_bytes,
        })
    }

    /// Fetch the source text behind `id`.
    ///
    /// Errors are plain reasons; they end up in the module's failed state.
    pub async fn fetch(&self, id: &Identifier) -> Result<String, String> {
        let url = Url::parse(id.as_str()).map_err(|e| e.to_string())?;
        match url.scheme() {
            "file" => self.fetch_file(&url).await,
            "http" | "https" => self.fetch_http(url).await,
            other => Err(format!("no loader for scheme '{other}'")),
        }
    }

    async fn fetch_file(&self, url: &Url) -> Result<String, String> {
        let path = url
            .to_file_path()
            .map_err(|()| format!("'{url}' is not a local file path"))?;
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| format!("cannot stat {}: {e}", path.display()))?;
        if !metadata.is_file() {
            return Err(format!("{} is not a regular file", path.display()));
        }
        self.check_size(metadata.len())?;

        // The file may grow after the stat; never read past the cap.
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| format!("cannot open {}: {e}", path.display()))?;
        let mut source = Vec::new();
        file.take(self.max_source_bytes.saturating_add(1))
            .read_to_end(&mut source)
            .await
            .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
        self.check_size(source.len() as u64)?;
        into_text(source)
    }

    async fn fetch_http(&self, url: Url) -> Result<String, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| e.to_string())?;
        if let Some(length) = response.content_length() {
            self.check_size(length)?;
        }

        // Chunked bodies carry no length up front: stop once past the cap.
        let mut response = response;
        let mut source = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| e.to_string())? {
            source.extend_from_slice(&chunk);
            self.check_size(source.len() as u64)?;
        }
        into_text(source)
    }

    fn check_size(&self, len: u64) -> Result<(), String> {
        if len > self.max_source_bytes {
            return Err(format!(
                "source size {} bytes exceeds maximum allowed {} bytes",
                len, self.max_source_bytes
            ));
        }
        Ok(())
    }
}

fn into_text(source: Vec<u8>) -> Result<String, String> {
    String::from_utf8(source).map_err(|e| format!("source is not UTF-8: {e}"))
}

// =============================================================================
// TESTS
// =============================================================================
