use std::path::{Path, PathBuf};

use tokio::sync::{Mutex, MutexGuard};

use crate::errors::ArchiverError;
use crate::models::Watch;

/// JSON-file backed collection of watches.
///
/// Every read-modify-write must happen through one [`WatchStoreGuard`] so the
/// whole round trip is serialized against other callers in this process.
pub struct JsonWatchStore {
    file_path: PathBuf,
    lock: Mutex<()>,
}

/// Exclusive access to the watches file for the lifetime of the guard.
pub struct WatchStoreGuard<'a> {
    file_path: &'a Path,
    _lock: MutexGuard<'a, ()>,
}

impl JsonWatchStore {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Take the store lock. Hold the guard across load, mutate and save.
    pub async fn lock(&self) -> WatchStoreGuard<'_> {
        WatchStoreGuard {
            file_path: &self.file_path,
            _lock: self.lock.lock().await,
        }
    }

    /// Load the collection under a short-lived lock.
    pub async fn load(&self) -> Vec<Watch> {
        self.lock().await.load().await
    }

    /// Overwrite the collection under a short-lived lock.
    pub async fn save(&self, watches: &[Watch]) -> Result<(), ArchiverError> {
        self.lock().await.save(watches).await
    }

    /// Number of readable watches, without creating, locking or backing up
    /// the file.
    pub async fn count(&self) -> usize {
        match tokio::fs::read_to_string(&self.file_path).await {
            Ok(content) if !content.trim().is_empty() => decode_watches(&content)
                .map(|(watches, _)| watches.len())
                .unwrap_or(0),
            _ => 0,
        }
    }

    /// Append a watch.
    pub async fn insert(&self, watch: Watch) -> Result<(), ArchiverError> {
        let guard = self.lock().await;
        let mut watches = guard.load().await;
        watches.push(watch);
        guard.save(&watches).await
    }

    /// Replace the user-editable fields of watch `id` with those of `updated`,
    /// keeping its id, position and `last_run`. Returns false if `id` is unknown.
    pub async fn replace(&self, id: &str, updated: Watch) -> Result<bool, ArchiverError> {
        let guard = self.lock().await;
        let mut watches = guard.load().await;
        let Some(existing) = watches.iter_mut().find(|w| w.id == id) else {
            return Ok(false);
        };
        *existing = Watch {
            id: existing.id.clone(),
            last_run: existing.last_run.take(),
            ..updated
        };
        guard.save(&watches).await?;
        Ok(true)
    }

    /// Remove watch `id`. Returns false if it was not present.
    pub async fn remove(&self, id: &str) -> Result<bool, ArchiverError> {
        let guard = self.lock().await;
        let mut watches = guard.load().await;
        let before = watches.len();
        watches.retain(|w| w.id != id);
        let removed = watches.len() != before;
        guard.save(&watches).await?;
        Ok(removed)
    }

    /// Set `last_run` for each `(id, timestamp)` pair in one round trip.
    /// Ids deleted in the meantime are ignored. Returns how many were updated.
    pub async fn record_runs(&self, runs: &[(String, String)]) -> Result<usize, ArchiverError> {
        if runs.is_empty() {
            return Ok(0);
        }
        let guard = self.lock().await;
        let mut watches = guard.load().await;
        let mut updated = 0;
        for (id, ts) in runs {
            if let Some(watch) = watches.iter_mut().find(|w| &w.id == id) {
                watch.last_run = Some(ts.clone());
                updated += 1;
            }
        }
        if updated > 0 {
            guard.save(&watches).await?;
        }
        Ok(updated)
    }
}

impl WatchStoreGuard<'_> {
    /// Read the collection. A missing file is created empty; an unreadable or
    /// corrupt one is backed up and treated as empty. Records that do not
    /// decode are skipped one by one, after the same backup.
    pub async fn load(&self) -> Vec<Watch> {
        if !self.file_path.exists() {
            if let Err(e) = self.save(&[]).await {
                tracing::error!(
                    "Failed to create {}: {}",
                    self.file_path.display(),
                    e
                );
            }
            return Vec::new();
        }

        let content = match tokio::fs::read_to_string(self.file_path).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", self.file_path.display(), e);
                return Vec::new();
            }
        };
        if content.trim().is_empty() {
            return Vec::new();
        }

        match decode_watches(&content) {
            Ok((watches, 0)) => watches,
            Ok((watches, skipped)) => {
                tracing::warn!(
                    "Skipped {} malformed watch record(s) in {}, keeping a backup",
                    skipped,
                    self.file_path.display()
                );
                self.back_up().await;
                watches
            }
            Err(e) => {
                tracing::warn!(
                    "{} is corrupted ({}), keeping a backup and starting empty",
                    self.file_path.display(),
                    e
                );
                self.back_up().await;
                Vec::new()
            }
        }
    }

    /// Copy the current file to `<file>.bak` before its contents are lost.
    async fn back_up(&self) {
        let backup_path = self.file_path.with_extension("json.bak");
        if let Err(e) = tokio::fs::copy(self.file_path, &backup_path).await {
            tracing::error!("Failed to back up watches file: {}", e);
        }
    }

    /// Atomically write the collection: temp file first, then rename.
    pub async fn save(&self, watches: &[Watch]) -> Result<(), ArchiverError> {
        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp_path = self.file_path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(watches)?;

        tokio::fs::write(&tmp_path, json.as_bytes()).await?;
        tokio::fs::rename(&tmp_path, self.file_path).await?;

        Ok(())
    }
}

/// Decode the file as a JSON array, keeping every record that parses as a
/// watch. Returns the watches and how many records were skipped.
fn decode_watches(content: &str) -> Result<(Vec<Watch>, usize), serde_json::Error> {
    let records: Vec<serde_json::Value> = serde_json::from_str(content)?;
    let total = records.len();
    let mut watches = Vec::with_capacity(total);
    for (index, record) in records.into_iter().enumerate() {
        match serde_json::from_value::<Watch>(record) {
            Ok(watch) => watches.push(watch),
            Err(e) => tracing::warn!("Watch record #{} is malformed: {}", index, e),
        }
    }
    let skipped = total - watches.len();
    Ok((watches, skipped))
}

/// Look up a watch by id.
pub fn find_watch<'a>(watches: &'a [Watch], id: &str) -> Option<&'a Watch> {
    watches.iter().find(|w| w.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn make_watch(id: &str, name: &str) -> Watch {
        Watch {
            id: id.to_string(),
            name: name.to_string(),
            playlist_url: "https://youtube.com/playlist?list=TEST".to_string(),
            title_filter: "test.*".to_string(),
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2027, 12, 31).unwrap(),
            interval_hours: 4,
            enabled: true,
            last_run: None,
        }
    }

    fn setup_store() -> (JsonWatchStore, TempDir) {
        let tmp_dir = TempDir::new().expect("create temp dir");
        let store = JsonWatchStore::new(tmp_dir.path().join("watches.json"));
        (store, tmp_dir)
    }

    #[test]
    fn test_find_watch_found() {
        let watches = vec![make_watch("a", "A"), make_watch("b", "B")];
        let found = find_watch(&watches, "b").expect("found");
        assert_eq!(found.name, "B");
    }

    #[test]
    fn test_find_watch_not_found() {
        let watches = vec![make_watch("a", "A")];
        assert!(find_watch(&watches, "nonexistent").is_none());
    }

    #[test]
    fn test_find_watch_empty_list() {
        assert!(find_watch(&[], "any").is_none());
    }

    #[tokio::test]
    async fn test_load_missing_file_creates_empty_array() {
        let (store, tmp) = setup_store();
        let watches = store.load().await;
        assert!(watches.is_empty());

        let content = tokio::fs::read_to_string(tmp.path().join("watches.json"))
            .await
            .expect("file created");
        let parsed: Vec<Watch> = serde_json::from_str(&content).expect("valid JSON");
        assert!(parsed.is_empty());
    }

    #[tokio::test]
    async fn test_load_creates_missing_parent_directory() {
        let tmp_dir = TempDir::new().expect("create temp dir");
        let path = tmp_dir.path().join("nested").join("watches.json");
        let store = JsonWatchStore::new(path.clone());
        assert!(store.load().await.is_empty());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_load_corrupt_file_returns_empty() {
        let (store, tmp) = setup_store();
        tokio::fs::write(tmp.path().join("watches.json"), b"{bad json!!")
            .await
            .expect("write corrupted file");
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_load_corrupt_file_creates_backup() {
        let (store, tmp) = setup_store();
        let corrupted = b"corrupted data!!!";
        tokio::fs::write(tmp.path().join("watches.json"), corrupted)
            .await
            .expect("write corrupted file");

        let _ = store.load().await;

        let backup = tokio::fs::read(tmp.path().join("watches.json.bak"))
            .await
            .expect("backup exists");
        assert_eq!(backup, corrupted);
    }

    fn mixed_records_file(good: &Watch) -> String {
        let bad = serde_json::json!({
            "id": "legacy",
            "name": "Legacy",
            "playlist_url": "https://youtube.com/playlist?list=OLD",
            "start_date": "2025-01-01",
            "end_date": "",
            "interval_hours": -1,
            "enabled": true,
            "last_run": null
        });
        serde_json::to_string_pretty(&vec![serde_json::to_value(good).unwrap(), bad]).unwrap()
    }

    #[tokio::test]
    async fn test_malformed_record_does_not_hide_valid_ones() {
        let (store, tmp) = setup_store();
        let good = make_watch("good", "Good");
        let content = mixed_records_file(&good);
        tokio::fs::write(tmp.path().join("watches.json"), &content)
            .await
            .expect("write");

        assert_eq!(store.load().await, vec![good.clone()]);
        assert_eq!(store.count().await, 1);

        store.insert(make_watch("new", "New")).await.expect("insert");
        let ids: Vec<String> = store.load().await.into_iter().map(|w| w.id).collect();
        assert_eq!(ids, vec!["good", "new"]);

        let backup = tokio::fs::read_to_string(tmp.path().join("watches.json.bak"))
            .await
            .expect("backup exists");
        assert_eq!(backup, content);
    }

    #[tokio::test]
    async fn test_count_has_no_side_effects() {
        let (store, tmp) = setup_store();
        let path = tmp.path().join("watches.json");

        assert_eq!(store.count().await, 0);
        assert!(!path.exists());

        tokio::fs::write(&path, b"{bad json!!").await.expect("write");
        assert_eq!(store.count().await, 0);
        assert!(!tmp.path().join("watches.json.bak").exists());
    }

    #[tokio::test]
    async fn test_load_blank_file_returns_empty() {
        let (store, tmp) = setup_store();
        tokio::fs::write(tmp.path().join("watches.json"), b"  \n")
            .await
            .expect("write");
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load_roundtrips() {
        let (store, _tmp) = setup_store();
        let mut watch = make_watch("test-id-123", "Test Watch");
        watch.last_run = Some("2026-02-22T10:00:00Z".to_string());
        store.save(&[watch.clone()]).await.expect("save");

        let loaded = store.load().await;
        assert_eq!(loaded, vec![watch]);
    }

    #[tokio::test]
    async fn test_save_writes_pretty_json() {
        let (store, tmp) = setup_store();
        store
            .save(&[make_watch("test-id-123", "Test Watch")])
            .await
            .expect("save");

        let content = tokio::fs::read_to_string(tmp.path().join("watches.json"))
            .await
            .expect("read");
        assert!(content.contains("\n  {"));
        let data: serde_json::Value = serde_json::from_str(&content).expect("parse");
        assert_eq!(data[0]["id"], "test-id-123");
    }

    #[tokio::test]
    async fn test_no_tmp_file_left_after_save() {
        let (store, tmp) = setup_store();
        store.save(&[make_watch("a", "A")]).await.expect("save");
        assert!(!tmp.path().join("watches.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_insert_preserves_order() {
        let (store, _tmp) = setup_store();
        store.insert(make_watch("a", "A")).await.expect("insert");
        store.insert(make_watch("b", "B")).await.expect("insert");
        store.insert(make_watch("c", "C")).await.expect("insert");

        let ids: Vec<String> = store.load().await.into_iter().map(|w| w.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_replace_keeps_id_position_and_last_run() {
        let (store, _tmp) = setup_store();
        let mut first = make_watch("a", "A");
        first.last_run = Some("2026-02-22T10:00:00Z".to_string());
        store
            .save(&[first, make_watch("b", "B")])
            .await
            .expect("save");

        let mut edited = make_watch("fresh-id", "Renamed");
        edited.interval_hours = 12;
        assert!(store.replace("a", edited).await.expect("replace"));

        let watches = store.load().await;
        assert_eq!(watches[0].id, "a");
        assert_eq!(watches[0].name, "Renamed");
        assert_eq!(watches[0].interval_hours, 12);
        assert_eq!(watches[0].last_run.as_deref(), Some("2026-02-22T10:00:00Z"));
        assert_eq!(watches[1].id, "b");
    }

    #[tokio::test]
    async fn test_replace_unknown_id_is_noop() {
        let (store, _tmp) = setup_store();
        store.save(&[make_watch("a", "A")]).await.expect("save");
        assert!(!store
            .replace("missing", make_watch("x", "X"))
            .await
            .expect("replace"));
        assert_eq!(store.load().await[0].name, "A");
    }

    #[tokio::test]
    async fn test_remove() {
        let (store, _tmp) = setup_store();
        store
            .save(&[make_watch("a", "A"), make_watch("b", "B")])
            .await
            .expect("save");

        assert!(store.remove("a").await.expect("remove"));
        assert!(!store.remove("a").await.expect("remove again"));

        let watches = store.load().await;
        assert_eq!(watches.len(), 1);
        assert_eq!(watches[0].id, "b");
    }

    #[tokio::test]
    async fn test_record_runs_ignores_deleted_ids() {
        let (store, _tmp) = setup_store();
        store.save(&[make_watch("a", "A")]).await.expect("save");

        let updated = store
            .record_runs(&[
                ("a".to_string(), "2026-02-22T10:00:00Z".to_string()),
                ("gone".to_string(), "2026-02-22T10:00:00Z".to_string()),
            ])
            .await
            .expect("record");
        assert_eq!(updated, 1);
        assert_eq!(
            store.load().await[0].last_run.as_deref(),
            Some("2026-02-22T10:00:00Z")
        );
    }

    #[tokio::test]
    async fn test_concurrent_inserts_lose_nothing() {
        let (store, _tmp) = setup_store();
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .insert(make_watch(&format!("w{}", i), "W"))
                    .await
                    .expect("insert");
            }));
        }
        for handle in handles {
            handle.await.expect("join");
        }

        assert_eq!(store.load().await.len(), 20);
    }

    #[tokio::test]
    async fn test_persistence_across_instances() {
        let tmp_dir = TempDir::new().expect("create temp dir");
        let path = tmp_dir.path().join("watches.json");

        {
            let store = JsonWatchStore::new(path.clone());
            store.insert(make_watch("a", "Persistent")).await.expect("insert");
        }

        let store = JsonWatchStore::new(path);
        let watches = store.load().await;
        assert_eq!(watches.len(), 1);
        assert_eq!(watches[0].name, "Persistent");
    }
}
