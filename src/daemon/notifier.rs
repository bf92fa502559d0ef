use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::errors::ArchiverError;

/// Asks the media server to rescan its library. Best effort: implementations
/// log failures and never return them.
#[async_trait]
pub trait LibraryNotifier: Send + Sync {
    async fn notify_scan(&self);
}

/// Used when no media server is configured.
pub struct DisabledNotifier;

#[async_trait]
impl LibraryNotifier for DisabledNotifier {
    async fn notify_scan(&self) {
        tracing::debug!("No media server configured, skipping rescan");
    }
}

/// Posts a library update to Jellyfin's `/Library/Media/Updated` endpoint.
pub struct JellyfinNotifier {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    media_path: String,
}

impl JellyfinNotifier {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        media_path: String,
        timeout: Duration,
    ) -> Result<Self, ArchiverError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ArchiverError::Notify(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            media_path,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/Library/Media/Updated", self.base_url)
    }
}

#[async_trait]
impl LibraryNotifier for JellyfinNotifier {
    async fn notify_scan(&self) {
        let body = json!({
            "dto": {
                "Updates": [{ "Path": self.media_path, "UpdateType": "scan" }]
            }
        });

        let mut request = self.client.post(self.endpoint()).json(&body);
        if let Some(token) = &self.token {
            request = request.header("X-MediaBrowser-Token", token);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                let bytes = response.bytes().await.map(|b| b.len()).unwrap_or(0);
                if status.is_success() {
                    tracing::info!("Jellyfin rescan: HTTP {} | bytes={}", status.as_u16(), bytes);
                } else {
                    tracing::warn!("Jellyfin rescan: HTTP {} | bytes={}", status.as_u16(), bytes);
                }
            }
            Err(e) => {
                tracing::warn!("Jellyfin rescan failed: {}", e);
            }
        }
    }
}

/// Counts rescan requests.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingNotifier {
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Poll until `expected` notifications arrived or a second passed.
    pub async fn wait_for(&self, expected: usize) -> usize {
        for _ in 0..200 {
            if self.count() >= expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.count()
    }
}

#[cfg(test)]
#[async_trait]
impl LibraryNotifier for RecordingNotifier {
    async fn notify_scan(&self) {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }
}
