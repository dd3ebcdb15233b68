//! Per-user, day-partitioned JSONL event log.
//!
//! Entries are sent over a bounded channel to a single flusher task, which owns the
//! pending queue. The queue is flushed when it reaches `max_queue` entries or when the
//! flush deadline armed by its first entry expires. Files live at
//! `<base>/<user>/<YYYY>/<MM>/<DD>.jsonl`, partitioned by the UTC date of each entry.
//!
//! Delivery is at-most-once: a failed write is reported and the batch is dropped.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::LogError;
use crate::models::{LogEntry, LogEvent, LoggingConfig};

pub const FLUSH_INTERVAL: Duration = Duration::from_millis(1000);
pub const MAX_QUEUE_SIZE: usize = 100;
pub const CHANNEL_CAPACITY: usize = 4096;
pub const ROTATION_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct LogSettings {
    pub base_dir: PathBuf,
    pub flush_interval: Duration,
    pub max_queue: usize,
    pub channel_capacity: usize,
}

impl LogSettings {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            flush_interval: FLUSH_INTERVAL,
            max_queue: MAX_QUEUE_SIZE,
            channel_capacity: CHANNEL_CAPACITY,
        }
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn with_max_queue(mut self, max_queue: usize) -> Self {
        self.max_queue = max_queue.max(1);
        self
    }
}

enum Command {
    Entry(LogEntry),
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable handle to the event log. All clones feed the same flusher task.
#[derive(Debug, Clone)]
pub struct EventLog {
    sender: Option<mpsc::Sender<Command>>,
    store: Option<LogStore>,
}

impl EventLog {
    /// Start the flusher task. Must be called from within a tokio runtime.
    pub fn spawn(settings: LogSettings) -> Self {
        let (tx, rx) = mpsc::channel(settings.channel_capacity.max(1));
        let store = LogStore::new(&settings.base_dir);

        tokio::spawn(run_flusher(
            rx,
            store.clone(),
            settings.max_queue.max(1),
            settings.flush_interval,
        ));

        Self {
            sender: Some(tx),
            store: Some(store),
        }
    }

    pub fn from_config(config: &LoggingConfig) -> Self {
        if config.enabled {
            Self::spawn(LogSettings::new(&config.base_log_dir))
        } else {
            Self::disabled()
        }
    }

    /// A log that accepts and discards everything.
    pub fn disabled() -> Self {
        Self {
            sender: None,
            store: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }

    pub fn base_dir(&self) -> Option<&Path> {
        self.store.as_ref().map(|s| s.base_dir.as_path())
    }

    /// Stamp, validate and enqueue. Never blocks and never fails the caller.
    pub fn log(&self, event: LogEvent) {
        let Some(sender) = &self.sender else {
            return;
        };

        let entry = event.stamp(Utc::now());
        if let Err(e) = entry.validate() {
            tracing::warn!(error = %e, kind = ?entry.kind, "dropping invalid log entry");
            return;
        }

        match sender.try_send(Command::Entry(entry)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("event log queue full, dropping entry");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("event log closed, dropping entry");
            }
        }
    }

    /// Force a flush of everything queued so far and wait for it.
    pub async fn flush(&self) {
        self.send_and_wait(Command::Flush).await;
    }

    /// Flush and stop the flusher task. Later entries are discarded.
    pub async fn shutdown(&self) {
        self.send_and_wait(Command::Shutdown).await;
    }

    async fn send_and_wait(&self, command: impl FnOnce(oneshot::Sender<()>) -> Command) {
        let Some(sender) = &self.sender else {
            return;
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        if sender.send(command(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Entries for `user_id` from day-files dated within `[start, end]`, oldest first.
    pub fn get_logs(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LogEntry>, LogError> {
        match &self.store {
            Some(store) => store.read(user_id, start.date_naive(), end.date_naive()),
            None => Ok(Vec::new()),
        }
    }

    /// Delete `user_id`'s day-files older than `keep_days`. Returns the number removed.
    pub fn rotate(&self, user_id: &str, keep_days: u32) -> usize {
        self.store
            .as_ref()
            .map_or(0, |s| s.rotate_before(user_id, cutoff(keep_days)))
    }

    pub fn rotate_before(&self, user_id: &str, cutoff: NaiveDate) -> usize {
        self.store
            .as_ref()
            .map_or(0, |s| s.rotate_before(user_id, cutoff))
    }

    pub fn rotate_all(&self, keep_days: u32) -> usize {
        self.store.as_ref().map_or(0, |s| s.rotate_all(keep_days))
    }

    /// Run [`EventLog::rotate_all`] now and then every 24 hours on a blocking thread.
    /// `keep_days` is asked again on every run.
    pub fn spawn_rotation<F>(&self, keep_days: F) -> Option<JoinHandle<()>>
    where
        F: Fn() -> u32 + Send + 'static,
    {
        self.spawn_rotation_every(ROTATION_INTERVAL, keep_days)
    }

    fn spawn_rotation_every<F>(&self, period: Duration, keep_days: F) -> Option<JoinHandle<()>>
    where
        F: Fn() -> u32 + Send + 'static,
    {
        let store = self.store.clone()?;

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let days = keep_days();
                let store = store.clone();
                match tokio::task::spawn_blocking(move || store.rotate_all(days)).await {
                    Ok(removed) if removed > 0 => {
                        tracing::info!(removed, keep_days = days, "rotated event logs");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "log rotation task failed"),
                }
            }
        }))
    }
}

fn cutoff(keep_days: u32) -> NaiveDate {
    (Utc::now() - chrono::Duration::days(i64::from(keep_days))).date_naive()
}

async fn run_flusher(
    mut rx: mpsc::Receiver<Command>,
    store: LogStore,
    max_queue: usize,
    flush_interval: Duration,
) {
    let mut queue: Vec<LogEntry> = Vec::new();
    let mut deadline: Option<Instant> = None;

    loop {
        let command = match deadline {
            Some(at) => tokio::select! {
                command = rx.recv() => command,
                _ = tokio::time::sleep_until(at) => {
                    flush_queue(&store, &mut queue).await;
                    deadline = None;
                    continue;
                }
            },
            None => rx.recv().await,
        };

        match command {
            Some(Command::Entry(entry)) => {
                queue.push(entry);
                if queue.len() >= max_queue {
                    flush_queue(&store, &mut queue).await;
                    deadline = None;
                } else if deadline.is_none() {
                    deadline = Some(Instant::now() + flush_interval);
                }
            }
            Some(Command::Flush(ack)) => {
                flush_queue(&store, &mut queue).await;
                deadline = None;
                let _ = ack.send(());
            }
            Some(Command::Shutdown(ack)) => {
                flush_queue(&store, &mut queue).await;
                let _ = ack.send(());
                break;
            }
            None => {
                flush_queue(&store, &mut queue).await;
                break;
            }
        }
    }
}

async fn flush_queue(store: &LogStore, queue: &mut Vec<LogEntry>) {
    if queue.is_empty() {
        return;
    }

    let batch = std::mem::take(queue);
    let store = store.clone();
    match tokio::task::spawn_blocking(move || store.append(&batch)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "failed to write event log batch"),
        Err(e) => tracing::error!(error = %e, "event log writer panicked"),
    }
}

/// Filesystem side of the event log.
#[derive(Debug, Clone)]
struct LogStore {
    base_dir: PathBuf,
}

impl LogStore {
    fn new(base_dir: &Path) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
        }
    }

    fn user_dir(&self, user_id: &str) -> PathBuf {
        self.base_dir.join(encode_user_dir(user_id))
    }

    fn day_file(&self, user_id: &str, date: NaiveDate) -> PathBuf {
        self.user_dir(user_id)
            .join(format!("{:04}", date.year()))
            .join(format!("{:02}", date.month()))
            .join(format!("{:02}.jsonl", date.day()))
    }

    /// One `write_all` per (user, day) group.
    fn append(&self, entries: &[LogEntry]) -> Result<(), LogError> {
        let mut groups: BTreeMap<(&str, NaiveDate), String> = BTreeMap::new();
        for entry in entries {
            let line = serde_json::to_string(entry)?;
            let buf = groups
                .entry((entry.user_id.as_str(), entry.timestamp.date_naive()))
                .or_default();
            buf.push_str(&line);
            buf.push('\n');
        }

        for ((user_id, date), lines) in groups {
            let path = self.day_file(user_id, date);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
            file.write_all(lines.as_bytes())?;
        }

        Ok(())
    }

    /// Entries written for exactly `user_id`. Unreadable files and undecodable lines are
    /// skipped.
    fn read(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<LogEntry>, LogError> {
        let mut entries = Vec::new();

        for (date, path) in self.day_files(&self.user_dir(user_id))? {
            if date < start || date > end {
                continue;
            }

            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable log file");
                    continue;
                }
            };

            for line in bytes.split(|b| *b == b'\n') {
                let line = line.trim_ascii();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_slice::<LogEntry>(line) {
                    Ok(entry) if entry.validate().is_ok() && entry.user_id == user_id => {
                        entries.push(entry)
                    }
                    _ => tracing::debug!(path = %path.display(), "skipping malformed log line"),
                }
            }
        }

        entries.sort_by_key(|e| e.timestamp);
        Ok(entries)
    }

    /// Every `(date, path)` day-file under one user directory.
    fn day_files(&self, user_dir: &Path) -> Result<Vec<(NaiveDate, PathBuf)>, LogError> {
        if !user_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for year_dir in subdirs(user_dir)? {
            let Some(year) = dir_number::<i32>(&year_dir) else {
                continue;
            };
            for month_dir in subdirs(&year_dir)? {
                let Some(month) = dir_number::<u32>(&month_dir) else {
                    continue;
                };
                for entry in fs::read_dir(&month_dir)? {
                    let path = entry?.path();
                    if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                        continue;
                    }
                    let day = path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .and_then(|s| s.parse::<u32>().ok());
                    if let Some(date) = day.and_then(|d| NaiveDate::from_ymd_opt(year, month, d)) {
                        files.push((date, path));
                    }
                }
            }
        }

        files.sort();
        Ok(files)
    }

    fn rotate_before(&self, user_id: &str, cutoff: NaiveDate) -> usize {
        self.rotate_dir(&self.user_dir(user_id), cutoff)
    }

    fn rotate_dir(&self, user_dir: &Path, cutoff: NaiveDate) -> usize {
        let files = match self.day_files(user_dir) {
            Ok(files) => files,
            Err(e) => {
                tracing::error!(path = %user_dir.display(), error = %e, "failed to scan log directory");
                return 0;
            }
        };

        let mut removed = 0;
        for (date, path) in files {
            if date >= cutoff {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => tracing::error!(path = %path.display(), error = %e, "failed to delete log file"),
            }
        }

        self.prune_empty_dirs(user_dir);
        removed
    }

    fn rotate_all(&self, keep_days: u32) -> usize {
        let cutoff = cutoff(keep_days);
        let users = match subdirs(&self.base_dir) {
            Ok(users) => users,
            Err(e) => {
                tracing::debug!(error = %e, "no log directory to rotate");
                return 0;
            }
        };

        users
            .iter()
            .map(|user_dir| self.rotate_dir(user_dir, cutoff))
            .sum()
    }

    /// Remove empty month directories, then empty year directories.
    fn prune_empty_dirs(&self, user_dir: &Path) {
        let Ok(years) = subdirs(user_dir) else {
            return;
        };
        for year_dir in years {
            if let Ok(months) = subdirs(&year_dir) {
                for month_dir in months {
                    remove_if_empty(&month_dir);
                }
            }
            remove_if_empty(&year_dir);
        }
    }
}

fn subdirs(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    Ok(dirs)
}

fn dir_number<T: std::str::FromStr>(dir: &Path) -> Option<T> {
    dir.file_name()?.to_str()?.parse().ok()
}

fn remove_if_empty(dir: &Path) {
    let is_empty = fs::read_dir(dir).is_ok_and(|mut entries| entries.next().is_none());
    if is_empty && let Err(e) = fs::remove_dir(dir) {
        tracing::error!(path = %dir.display(), error = %e, "failed to remove empty log directory");
    }
}

/// Reversible directory name for a user id: ASCII alphanumerics and `-_.@` are kept, every
/// other byte becomes `%XX`. Dot-only names are fully escaped so they never resolve to `.`
/// or `..`.
fn encode_user_dir(user_id: &str) -> String {
    let mut encoded = String::with_capacity(user_id.len());
    for byte in user_id.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'@') {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }

    if encoded.bytes().all(|b| b == b'.') {
        encoded.replace('.', "%2E")
    } else {
        encoded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LogType;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn today_file(base: &Path, user: &str) -> PathBuf {
        LogStore::new(base).day_file(user, Utc::now().date_naive())
    }

    async fn wait_for(path: &Path) -> bool {
        for _ in 0..100 {
            if path.exists() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    fn entry_at(user: &str, ts: DateTime<Utc>, method: &str) -> LogEntry {
        LogEvent::new(user, LogType::System).method(method).stamp(ts)
    }

    #[tokio::test]
    async fn test_flush_writes_day_file() {
        let dir = TempDir::new().unwrap();
        let log = EventLog::spawn(LogSettings::new(dir.path()));

        log.log(LogEvent::new("alice", LogType::System).method("server_start"));
        log.flush().await;

        let path = today_file(dir.path(), "alice");
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
        let value: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(value["type"], "system");
        assert_eq!(value["method"], "server_start");
    }

    #[tokio::test]
    async fn test_invalid_entries_never_written() {
        let dir = TempDir::new().unwrap();
        let log = EventLog::spawn(LogSettings::new(dir.path()));

        log.log(LogEvent::new("", LogType::System));
        log.log(LogEvent::new("bob", LogType::SearchResult).cost(-1.0, 3));
        log.flush().await;

        assert!(fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_size_trigger_flushes_without_waiting() {
        let dir = TempDir::new().unwrap();
        let settings = LogSettings::new(dir.path())
            .with_flush_interval(Duration::from_secs(3600))
            .with_max_queue(3);
        let log = EventLog::spawn(settings);

        for _ in 0..3 {
            log.log(LogEvent::new("carol", LogType::System).method("tick"));
        }

        let path = today_file(dir.path(), "carol");
        assert!(wait_for(&path).await);
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 3);
    }

    #[tokio::test]
    async fn test_timer_trigger_flushes() {
        let dir = TempDir::new().unwrap();
        let settings = LogSettings::new(dir.path()).with_flush_interval(Duration::from_millis(50));
        let log = EventLog::spawn(settings);

        log.log(LogEvent::new("dave", LogType::System).method("tick"));

        assert!(wait_for(&today_file(dir.path(), "dave")).await);
    }

    #[tokio::test]
    async fn test_shutdown_flushes_pending() {
        let dir = TempDir::new().unwrap();
        let settings = LogSettings::new(dir.path()).with_flush_interval(Duration::from_secs(3600));
        let log = EventLog::spawn(settings);

        log.log(LogEvent::new("erin", LogType::System).method("a"));
        log.log(LogEvent::new("frank", LogType::System).method("b"));
        log.shutdown().await;

        assert!(today_file(dir.path(), "erin").exists());
        assert!(today_file(dir.path(), "frank").exists());

        log.log(LogEvent::new("erin", LogType::System).method("late"));
        log.flush().await;
        let content = fs::read_to_string(today_file(dir.path(), "erin")).unwrap();
        assert_eq!(content.lines().count(), 1);
    }

    #[test]
    fn test_append_partitions_by_entry_date() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::new(dir.path());
        let first = Utc.with_ymd_and_hms(2024, 6, 14, 23, 59, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2024, 6, 15, 0, 1, 0).unwrap();

        store
            .append(&[entry_at("gina", first, "a"), entry_at("gina", second, "b")])
            .unwrap();

        assert!(dir.path().join("gina/2024/06/14.jsonl").exists());
        assert!(dir.path().join("gina/2024/06/15.jsonl").exists());
    }

    #[test]
    fn test_get_logs_sorts_and_skips_malformed() {
        let dir = TempDir::new().unwrap();
        let log = EventLog {
            sender: None,
            store: Some(LogStore::new(dir.path())),
        };

        let early = Utc.with_ymd_and_hms(2024, 6, 15, 8, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 6, 15, 9, 0, 0).unwrap();
        let path = dir.path().join("hank/2024/06/15.jsonl");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let lines = [
            serde_json::to_string(&entry_at("hank", late, "second")).unwrap(),
            "{not json".to_string(),
            r#"{"timestamp":"2024-06-15T08:30:00Z","userId":"","type":"system"}"#.to_string(),
            serde_json::to_string(&entry_at("hank", early, "first")).unwrap(),
        ];
        fs::write(&path, lines.join("\n")).unwrap();

        let outside = dir.path().join("hank/2024/07/01.jsonl");
        fs::create_dir_all(outside.parent().unwrap()).unwrap();
        fs::write(
            &outside,
            serde_json::to_string(&entry_at("hank", late, "outside")).unwrap(),
        )
        .unwrap();

        let entries = log
            .get_logs(
                "hank",
                Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 6, 30, 0, 0, 0).unwrap(),
            )
            .unwrap();

        let methods: Vec<_> = entries.iter().filter_map(|e| e.method.as_deref()).collect();
        assert_eq!(methods, vec!["first", "second"]);
    }

    #[test]
    fn test_rotation_removes_old_files_and_empty_dirs() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::new(dir.path());
        let now = Utc::now();
        let old = now - chrono::Duration::days(40);
        let recent = now - chrono::Duration::days(5);

        store
            .append(&[entry_at("ivan", old, "old"), entry_at("ivan", recent, "recent")])
            .unwrap();
        let old_file = store.day_file("ivan", old.date_naive());
        let recent_file = store.day_file("ivan", recent.date_naive());
        assert!(old_file.exists());

        let log = EventLog {
            sender: None,
            store: Some(store),
        };
        assert_eq!(log.rotate("ivan", 30), 1);

        assert!(!old_file.exists());
        assert!(!old_file.parent().unwrap().exists());
        assert!(recent_file.exists());
        assert_eq!(log.rotate_all(30), 0);
    }

    #[tokio::test]
    async fn test_disabled_log_is_inert() {
        let log = EventLog::disabled();
        log.log(LogEvent::new("judy", LogType::System));
        log.flush().await;
        assert!(!log.is_enabled());
        assert!(
            log.get_logs("judy", Utc::now(), Utc::now())
                .unwrap()
                .is_empty()
        );
        assert_eq!(log.rotate_all(1), 0);
        assert!(log.spawn_rotation(|| 1).is_none());
    }

    #[tokio::test]
    async fn test_rotation_reads_retention_each_run() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicU32, Ordering};

        let dir = TempDir::new().unwrap();
        let store = LogStore::new(dir.path());
        let old = Utc::now() - chrono::Duration::days(10);
        store.append(&[entry_at("nora", old, "old")]).unwrap();
        let old_file = store.day_file("nora", old.date_naive());

        let log = EventLog {
            sender: None,
            store: Some(store),
        };
        let keep = Arc::new(AtomicU32::new(30));
        let runs = Arc::new(AtomicU32::new(0));
        let (keep_reader, runs_counter) = (Arc::clone(&keep), Arc::clone(&runs));
        let handle = log
            .spawn_rotation_every(Duration::from_millis(50), move || {
                runs_counter.fetch_add(1, Ordering::SeqCst);
                keep_reader.load(Ordering::SeqCst)
            })
            .unwrap();

        for _ in 0..100 {
            if runs.load(Ordering::SeqCst) >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(old_file.exists());

        keep.store(5, Ordering::SeqCst);
        let mut removed = false;
        for _ in 0..100 {
            if !old_file.exists() {
                removed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        handle.abort();
        assert!(removed);
    }

    #[test]
    fn test_encode_user_dir() {
        assert_eq!(encode_user_dir("alice@example.com"), "alice@example.com");
        assert_eq!(encode_user_dir("../etc"), "..%2Fetc");
        assert_eq!(encode_user_dir(".."), "%2E%2E");
        assert_eq!(encode_user_dir("a/b"), "a%2Fb");
        assert_eq!(encode_user_dir("a%2Fb"), "a%252Fb");
        assert_ne!(encode_user_dir("a/b"), encode_user_dir("a_b"));
        assert_ne!(encode_user_dir("a?b"), encode_user_dir("a_b"));
    }

    #[test]
    fn test_users_with_similar_ids_stay_apart() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::new(dir.path());
        let at = Utc.with_ymd_and_hms(2024, 6, 15, 8, 0, 0).unwrap();
        store
            .append(&[entry_at("a/b", at, "slash"), entry_at("a_b", at, "underscore")])
            .unwrap();

        let day = at.date_naive();
        let slash = store.read("a/b", day, day).unwrap();
        let underscore = store.read("a_b", day, day).unwrap();
        let question = store.read("a?b", day, day).unwrap();

        assert_eq!(slash.len(), 1);
        assert_eq!(slash[0].method.as_deref(), Some("slash"));
        assert_eq!(underscore.len(), 1);
        assert_eq!(underscore[0].method.as_deref(), Some("underscore"));
        assert!(question.is_empty());
    }

    #[test]
    fn test_foreign_entries_in_user_file_are_ignored() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::new(dir.path());
        let at = Utc.with_ymd_and_hms(2024, 6, 15, 8, 0, 0).unwrap();
        let path = store.day_file("kim", at.date_naive());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let lines = [
            serde_json::to_string(&entry_at("kim", at, "own")).unwrap(),
            serde_json::to_string(&entry_at("lee", at, "foreign")).unwrap(),
        ];
        fs::write(&path, lines.join("\n")).unwrap();

        let entries = store.read("kim", at.date_naive(), at.date_naive()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].method.as_deref(), Some("own"));
    }

    #[test]
    fn test_non_utf8_line_is_skipped() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::new(dir.path());
        let early = Utc.with_ymd_and_hms(2024, 6, 15, 8, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 6, 15, 9, 0, 0).unwrap();
        let path = store.day_file("mia", early.date_naive());
        fs::create_dir_all(path.parent().unwrap()).unwrap();

        let mut bytes = serde_json::to_vec(&entry_at("mia", early, "first")).unwrap();
        bytes.extend_from_slice(b"\n\xff\xfe x\n");
        bytes.extend_from_slice(&serde_json::to_vec(&entry_at("mia", late, "second")).unwrap());
        bytes.push(b'\n');
        fs::write(&path, bytes).unwrap();

        let entries = store
            .read("mia", early.date_naive(), early.date_naive())
            .unwrap();
        let methods: Vec<_> = entries.iter().filter_map(|e| e.method.as_deref()).collect();
        assert_eq!(methods, vec!["first", "second"]);
    }

    #[test]
    fn test_rotate_all_handles_escaped_user_dirs() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::new(dir.path());
        let old = Utc::now() - chrono::Duration::days(40);
        store.append(&[entry_at("team/ops", old, "old")]).unwrap();
        let old_file = store.day_file("team/ops", old.date_naive());
        assert!(old_file.exists());

        assert_eq!(store.rotate_all(30), 1);
        assert!(!old_file.exists());
    }
}
