use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use crate::daemon::notifier::LibraryNotifier;
use crate::daemon::tracker::Job;
use crate::errors::ArchiverError;
use crate::models::Watch;

/// Longest title kept from an `[info]` line, in characters.
pub const TITLE_MAX_CHARS: usize = 120;

const LINE_CHANNEL_CAPACITY: usize = 256;

/// Percentage from a `[download]  42.3% of ...` progress line.
pub fn parse_progress(line: &str) -> Option<f64> {
    static PROGRESS_RE: OnceLock<Regex> = OnceLock::new();
    let re = PROGRESS_RE
        .get_or_init(|| Regex::new(r"\[download\]\s+([\d.]+)%").expect("valid progress regex"));
    re.captures(line)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Title from an `[info] <id>: <title>` line: the text after the first colon,
/// trimmed and cut to [`TITLE_MAX_CHARS`].
pub fn extract_title(line: &str) -> Option<String> {
    if !line.starts_with("[info]") {
        return None;
    }
    let (_, rest) = line.split_once(':')?;
    Some(rest.trim().chars().take(TITLE_MAX_CHARS).collect())
}

// ---------------------------------------------------------------------------
// ToolRunner: the subprocess seam
// ---------------------------------------------------------------------------

/// Runs the external download tool. Implementations return the exit code;
/// an `Err` means the tool could not be run at all.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run with merged stdout/stderr sent line by line to `lines`.
    async fn run_streaming(
        &self,
        args: &[String],
        lines: mpsc::Sender<String>,
    ) -> Result<i32, ArchiverError>;

    /// Run to completion, logging output at debug level.
    async fn run(&self, args: &[String]) -> Result<i32, ArchiverError> {
        let (tx, mut rx) = mpsc::channel::<String>(LINE_CHANNEL_CAPACITY);
        let drain = async {
            while let Some(line) = rx.recv().await {
                tracing::debug!(target: "downloader", "{}", line);
            }
        };
        let (result, ()) = tokio::join!(self.run_streaming(args, tx), drain);
        result
    }
}

/// Runs the real yt-dlp binary (or a compatible one) without a shell.
pub struct YtDlpRunner {
    program: String,
}

impl YtDlpRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl ToolRunner for YtDlpRunner {
    async fn run_streaming(
        &self,
        args: &[String],
        lines: mpsc::Sender<String>,
    ) -> Result<i32, ArchiverError> {
        tracing::info!("Running: {} {}", self.program, args.join(" "));

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ArchiverError::Downloader(format!("Failed to start {}: {}", self.program, e))
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_task = stdout.map(|out| tokio::spawn(forward_lines(out, lines.clone())));
        let stderr_task = stderr.map(|err| tokio::spawn(forward_lines(err, lines)));

        let status = child
            .wait()
            .await
            .map_err(|e| ArchiverError::Downloader(format!("Failed to wait on {}: {}", self.program, e)))?;

        // Drain whatever is still buffered before reporting the exit.
        for task in [stdout_task, stderr_task].into_iter().flatten() {
            let _ = task.await;
        }

        Ok(status.code().unwrap_or(-1))
    }
}

/// Forward each line of `reader` to `tx`, lossily decoded with trailing
/// `\r`/`\n` removed. Stops at EOF or when the receiver is gone.
async fn forward_lines<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!("Error reading downloader output: {}", e);
                break;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Mock runner for tests
// ---------------------------------------------------------------------------

/// Configuration for a [`MockToolRunner`].
#[derive(Clone, Default)]
pub struct MockRunConfig {
    /// Lines emitted, in order, before exiting
    pub lines: Vec<String>,
    /// Exit code to report
    pub exit_code: i32,
    /// If set, every run fails to start with this message
    pub spawn_error: Option<String>,
    /// If set, each run waits for a notification before exiting
    pub gate: Option<Arc<Notify>>,
}

/// Scripted stand-in for the download tool. Records every argument list.
pub struct MockToolRunner {
    config: MockRunConfig,
    calls: Mutex<Vec<Vec<String>>>,
}

impl MockToolRunner {
    pub fn new(config: MockRunConfig) -> Self {
        Self {
            config,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Emit `lines` and exit with `exit_code`.
    pub fn with_output_and_exit(lines: &[&str], exit_code: i32) -> Self {
        Self::new(MockRunConfig {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            exit_code,
            ..Default::default()
        })
    }

    /// Fail every run as if the binary were missing.
    pub fn with_spawn_error(error: &str) -> Self {
        Self::new(MockRunConfig {
            spawn_error: Some(error.to_string()),
            ..Default::default()
        })
    }

    /// Hold every run open until `gate` is notified.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.config.gate = Some(gate);
        self
    }

    /// Argument lists of all runs so far.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl ToolRunner for MockToolRunner {
    async fn run_streaming(
        &self,
        args: &[String],
        lines: mpsc::Sender<String>,
    ) -> Result<i32, ArchiverError> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(args.to_vec());

        if let Some(error) = &self.config.spawn_error {
            return Err(ArchiverError::Downloader(error.clone()));
        }

        for line in &self.config.lines {
            if lines.send(line.clone()).await.is_err() {
                break;
            }
        }
        if let Some(gate) = &self.config.gate {
            gate.notified().await;
        }
        Ok(self.config.exit_code)
    }
}

// ---------------------------------------------------------------------------
// Downloader
// ---------------------------------------------------------------------------

/// Builds downloader invocations for watches and ad-hoc jobs, runs them,
/// and triggers a library rescan after each success.
pub struct Downloader {
    runner: Arc<dyn ToolRunner>,
    notifier: Arc<dyn LibraryNotifier>,
    archives_dir: PathBuf,
    media_path: String,
    stream_config: Option<PathBuf>,
    rescans: Mutex<Vec<JoinHandle<()>>>,
}

impl Downloader {
    pub fn new(
        runner: Arc<dyn ToolRunner>,
        notifier: Arc<dyn LibraryNotifier>,
        archives_dir: PathBuf,
        media_path: String,
        stream_config: Option<PathBuf>,
    ) -> Self {
        Self {
            runner,
            notifier,
            archives_dir,
            media_path,
            stream_config,
            rescans: Mutex::new(Vec::new()),
        }
    }

    /// Argument list for a batch run of `watch`. The URL comes last.
    pub fn batch_args(&self, watch: &Watch) -> Vec<String> {
        let archive = self.archives_dir.join(format!("{}.txt", watch.id));
        let mut output = self.media_path.clone();
        if !output.ends_with('/') {
            output.push('/');
        }
        output.push_str("%(uploader)s/%(playlist_title)s/%(title)s.%(ext)s");

        let mut args: Vec<String> = vec![
            "--download-archive".into(),
            archive.to_string_lossy().into_owned(),
            "--dateafter".into(),
            watch.start_date.format("%Y%m%d").to_string(),
            "--datebefore".into(),
            watch.end_date.format("%Y%m%d").to_string(),
            "--write-thumbnail".into(),
            "--format".into(),
            "bestvideo+bestaudio/best".into(),
            "--merge-output-format".into(),
            "mp4".into(),
            "--parse-metadata".into(),
            "%(upload_date>%Y)s:%(meta_date)s".into(),
            "--embed-metadata".into(),
            "--embed-thumbnail".into(),
            "--embed-subs".into(),
            "--sub-langs".into(),
            "en,en-US".into(),
            "--ignore-errors".into(),
            "--no-overwrites".into(),
            "--output".into(),
            output,
        ];
        if !watch.title_filter.is_empty() {
            args.push("--match-title".into());
            args.push(watch.title_filter.clone());
        }
        args.push(watch.playlist_url.clone());
        args
    }

    /// Argument list for a streamed ad-hoc download of `url`.
    pub fn stream_args(&self, url: &str) -> Vec<String> {
        let mut args = vec!["--newline".to_string()];
        if let Some(config) = &self.stream_config {
            args.push("--config-locations".into());
            args.push(config.to_string_lossy().into_owned());
        }
        args.push(url.to_string());
        args
    }

    /// Send the rescan notification in the background.
    fn spawn_rescan(&self) {
        let notifier = Arc::clone(&self.notifier);
        let handle = tokio::spawn(async move {
            notifier.notify_scan().await;
        });
        let mut rescans = self
            .rescans
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        rescans.retain(|h| !h.is_finished());
        rescans.push(handle);
    }

    /// Wait for every rescan notification sent so far. Used by one-shot
    /// commands before the runtime shuts down.
    pub async fn wait_for_rescans(&self) {
        let pending = std::mem::take(
            &mut *self
                .rescans
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        for handle in pending {
            if let Err(e) = handle.await {
                tracing::warn!("Rescan task failed: {}", e);
            }
        }
    }

    /// Run `watch` to completion. Returns true on exit code 0; the rescan
    /// notification is then on its way but not awaited.
    pub async fn run_watch(&self, watch: &Watch) -> bool {
        if let Err(e) = tokio::fs::create_dir_all(&self.archives_dir).await {
            tracing::error!(
                "Cannot create archive dir {}: {}",
                self.archives_dir.display(),
                e
            );
            return false;
        }

        tracing::info!("Running watch '{}' ({})", watch.name, watch.id);
        let args = self.batch_args(watch);
        match self.runner.run(&args).await {
            Ok(0) => {
                tracing::info!("Watch '{}' finished", watch.name);
                self.spawn_rescan();
                true
            }
            Ok(code) => {
                tracing::warn!("Watch '{}' exited with code {}", watch.name, code);
                false
            }
            Err(e) => {
                tracing::error!("Watch '{}' failed: {}", watch.name, e);
                false
            }
        }
    }

    /// Stream a download of `url` into `job` until the tool exits.
    pub async fn run_job(&self, job: Arc<Job>, url: String) {
        tracing::info!("Job {} started for {}", job.id(), url);
        let args = self.stream_args(&url);
        let (tx, mut rx) = mpsc::channel::<String>(LINE_CHANNEL_CAPACITY);

        let record = async {
            while let Some(line) = rx.recv().await {
                tracing::debug!(target: "downloader", "[{}] {}", job.id(), line);
                job.record_line(&line).await;
            }
        };
        let (result, ()) = tokio::join!(self.runner.run_streaming(&args, tx), record);

        match result {
            Ok(0) => {
                job.finish_success().await;
                tracing::info!("Job {} done", job.id());
                self.spawn_rescan();
            }
            Ok(code) => {
                tracing::warn!("Job {} exited with code {}", job.id(), code);
                job.fail(None).await;
            }
            Err(e) => {
                tracing::error!("Job {} failed: {}", job.id(), e);
                job.fail(Some(e.to_string())).await;
            }
        }
    }
}
