use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Jellyfin base URL. Rescan notifications are skipped when unset.
    #[serde(default)]
    pub media_server_url: Option<String>,
    #[serde(default)]
    pub media_server_token: Option<String>,
    /// Library path downloads land in; also the path named in rescan requests.
    #[serde(default = "default_media_path")]
    pub media_path: String,
    #[serde(default)]
    pub watches_file: Option<PathBuf>,
    #[serde(default)]
    pub archives_dir: Option<PathBuf>,
    #[serde(default = "default_downloader_bin")]
    pub downloader_bin: String,
    /// Extra yt-dlp config file used for ad-hoc downloads.
    #[serde(default)]
    pub downloader_config: Option<PathBuf>,
    #[serde(default = "default_scheduler_interval_secs")]
    pub scheduler_interval_secs: u64,
    #[serde(default = "default_stream_poll_millis")]
    pub stream_poll_millis: u64,
    #[serde(default = "default_notify_timeout_secs")]
    pub notify_timeout_secs: u64,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_media_path() -> String {
    "/mnt/media/YouTube/".to_string()
}

fn default_downloader_bin() -> String {
    "yt-dlp".to_string()
}

fn default_scheduler_interval_secs() -> u64 {
    300
}

fn default_stream_poll_millis() -> u64 {
    500
}

fn default_notify_timeout_secs() -> u64 {
    5
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            media_server_url: None,
            media_server_token: None,
            media_path: default_media_path(),
            watches_file: None,
            archives_dir: None,
            downloader_bin: default_downloader_bin(),
            downloader_config: None,
            scheduler_interval_secs: default_scheduler_interval_secs(),
            stream_poll_millis: default_stream_poll_millis(),
            notify_timeout_secs: default_notify_timeout_secs(),
            log_dir: None,
        }
    }
}

impl ServerConfig {
    /// Apply environment overrides, reading variables through `lookup`.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("JELLYFIN_URL") {
            self.media_server_url = Some(url);
        }
        if let Some(token) = lookup("JELLYFIN_TOKEN") {
            self.media_server_token = Some(token);
        }
        if let Some(path) = lookup("ARCHIVER_MEDIA_PATH") {
            self.media_path = path;
        }
        if let Some(path) = lookup("ARCHIVER_WATCHES_FILE") {
            self.watches_file = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("ARCHIVER_ARCHIVES_DIR") {
            self.archives_dir = Some(PathBuf::from(path));
        }
        if let Some(bin) = lookup("ARCHIVER_DOWNLOADER") {
            self.downloader_bin = bin;
        }
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok().filter(|v| !v.is_empty()));
    }
}
