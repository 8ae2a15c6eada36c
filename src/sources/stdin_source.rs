//! Stdin event source.
//!
//! Reads newline-delimited trigger events from standard input, e.g.:
//!     echo '{"triggerId":"save-button","event":"onClick","payload":{}}' | uiflow -c config.json
//!
//! Malformed lines are logged and skipped. EOF or a closed channel ends the
//! task.

use tokio::{
    io::{self, AsyncBufRead, AsyncBufReadExt, BufReader},
    sync::mpsc::Sender,
    task::JoinHandle,
};
use tracing::{error, info, trace, warn};

use super::{EventSource, TriggerEvent, decode_events};

/// Source that reads newline-delimited trigger events from stdin.
#[derive(Debug, Clone, Default)]
pub struct StdinSource;

impl StdinSource {
    /// Source over the process's standard input.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Forward every event read from `reader` until EOF.
///
/// Each line may hold one event, an array of events or nothing usable; see
/// [`decode_events`]. Stops early when the receiver is gone or a read fails.
async fn pump<R: AsyncBufRead + Unpin>(reader: R, sender: Sender<TriggerEvent>) {
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(None) => {
                info!(target: "uiflow::sources", "EOF on stdin; StdinSource exiting");
                break;
            }
            Ok(Some(line)) => {
                for event in decode_events(&line) {
                    trace!(target: "uiflow::sources", trigger_id = %event.trigger_id, event = %event.event, "Read event");
                    if let Err(e) = sender.send(event).await {
                        error!(
                            target: "uiflow::sources",
                            error = %e,
                            "Channel closed while sending stdin event; terminating task"
                        );
                        return;
                    }
                }
            }
            Err(e) => {
                warn!(
                    target: "uiflow::sources",
                    error = %e,
                    "Error reading from stdin; terminating task"
                );
                break;
            }
        }
    }
}

impl EventSource for StdinSource {
    fn name(&self) -> &'static str {
        "stdin"
    }

    fn start(&self, sender: Sender<TriggerEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(target: "uiflow::sources", "StdinSource task started (reading lines)");
            pump(BufReader::new(io::stdin()), sender).await;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_pump_forwards_valid_lines() {
        let input: &[u8] = b"{\"triggerId\":\"a\",\"event\":\"onClick\"}\ngarbage\n\n{\"triggerId\":\"b\",\"event\":\"onChange\",\"payload\":{\"value\":\"x\"}}\n";
        let (tx, mut rx) = mpsc::channel(8);
        pump(input, tx).await;

        let first = rx.recv().await.unwrap();
        assert_eq!(first.trigger_id, "a");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.payload["value"], "x");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_pump_stops_when_receiver_dropped() {
        let input: &[u8] = b"{\"triggerId\":\"a\",\"event\":\"onClick\"}\n{\"triggerId\":\"b\",\"event\":\"onClick\"}\n";
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        pump(input, tx).await;
    }
}
