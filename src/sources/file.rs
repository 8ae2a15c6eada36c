//! File event source.
//!
//! Polls a single file for trigger events (one object, an array, or
//! newline-delimited objects).
//!
//! - With `delete_on_success`, every non-empty read is dispatched and the file
//!   is deleted afterwards.
//! - Otherwise the file is dispatched only when its (length, mtime) signature
//!   changes.
//! - A missing file is silent until it appears.

use std::fs;
use std::time::{Duration, SystemTime};

use tokio::{
    fs as afs,
    sync::mpsc::Sender,
    task::JoinHandle,
    time::{Instant, sleep},
};
use tracing::{error, info, trace, warn};

use super::{EventSource, TriggerEvent, decode_events};

/// Source that polls a single file for trigger events.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: String,
    poll_ms: u64,
    delete_on_success: bool,
}

impl FileSource {
    /// Create a source polling `path`.
    ///
    /// - `poll_ms`: interval between reads. Defaults to 100ms and is clamped
    ///   to at least 10ms.
    /// - `delete_on_success`: dispatch every non-empty read and delete the
    ///   file afterwards. When unset or `false` the file is only dispatched
    ///   when its signature changes.
    pub fn new(path: String, poll_ms: Option<u64>, delete_on_success: Option<bool>) -> Self {
        Self {
            path,
            poll_ms: poll_ms.unwrap_or(100).max(10),
            delete_on_success: delete_on_success.unwrap_or(false),
        }
    }

    /// (length, mtime in whole seconds). An unreadable mtime counts as 0.
    fn file_signature(meta: &fs::Metadata) -> (u64, u64) {
        let len = meta.len();
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        (len, mtime)
    }
}

impl EventSource for FileSource {
    fn name(&self) -> &'static str {
        "file"
    }

    fn start(&self, sender: Sender<TriggerEvent>) -> JoinHandle<()> {
        let path = self.path.clone();
        let poll_ms = self.poll_ms;
        let delete_on_success = self.delete_on_success;

        tokio::spawn(async move {
            info!(
                target: "uiflow::sources",
                %path, poll_ms, delete_on_success,
                "FileSource task started"
            );

            let mut last_sig: Option<(u64, u64)> = None;
            let interval = Duration::from_millis(poll_ms);
            let mut next_tick = Instant::now();

            'poll: loop {
                let now = Instant::now();
                if now < next_tick {
                    sleep(next_tick - now).await;
                }
                next_tick += interval;

                let meta = match fs::metadata(&path) {
                    Ok(m) if m.is_file() => m,
                    Ok(_) => {
                        warn!(target: "uiflow::sources", %path, "Path exists but is not a regular file");
                        continue;
                    }
                    Err(_) => continue,
                };

                let sig = Self::file_signature(&meta);
                if !delete_on_success && last_sig == Some(sig) {
                    trace!(target: "uiflow::sources", %path, "File unchanged; skipping");
                    continue;
                }

                let content = match afs::read_to_string(&path).await {
                    Ok(content) => content,
                    Err(e) => {
                        warn!(target: "uiflow::sources", %path, error = %e, "Failed to read file");
                        continue;
                    }
                };
                let events = decode_events(&content);
                if events.is_empty() {
                    trace!(target: "uiflow::sources", %path, "No events in file");
                    last_sig = Some(sig);
                    continue;
                }

                let count = events.len();
                for event in events {
                    if let Err(e) = sender.send(event).await {
                        error!(target: "uiflow::sources", %path, error = %e, "Channel closed; FileSource terminating");
                        break 'poll;
                    }
                }
                info!(target: "uiflow::sources", %path, count, "Dispatched events from file");

                if delete_on_success {
                    if let Err(e) = afs::remove_file(&path).await {
                        warn!(target: "uiflow::sources", %path, error = %e, "Failed to delete file after dispatch");
                    }
                } else {
                    last_sig = Some(sig);
                }
            }

            info!(target: "uiflow::sources", %path, "FileSource task ended");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    #[test]
    fn test_poll_interval_minimum() {
        assert_eq!(FileSource::new("x".into(), Some(50), Some(false)).poll_ms, 50);
        assert_eq!(FileSource::new("y".into(), Some(1), None).poll_ms, 10);
    }

    #[tokio::test]
    async fn test_dispatches_and_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        std::fs::write(
            &path,
            r#"[{"triggerId": "a", "event": "onClick"}, {"triggerId": "b", "event": "onClick"}]"#,
        )
        .unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let source = FileSource::new(path.to_string_lossy().into_owned(), Some(10), Some(true));
        let handle = source.start(tx);

        let first = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        let second = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!((first.trigger_id.as_str(), second.trigger_id.as_str()), ("a", "b"));

        timeout(Duration::from_secs(5), async {
            while path.exists() {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        handle.abort();
    }
}
