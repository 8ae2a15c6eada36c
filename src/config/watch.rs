//! Reload the runtime configuration when its file changes.
//!
//! The parent directory is watched rather than the file itself so that
//! editors which save by rename are still picked up.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::Sender;
use tracing::{debug, info, warn};

use super::loader::load_from_path;
use super::models::RuntimeConfig;

/// Keeps the underlying watcher alive; dropping it stops reloads.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    path: PathBuf,
}

impl ConfigWatcher {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Watch `path` and send every successfully reloaded configuration to `tx`.
/// Invalid intermediate states are logged and skipped.
pub fn watch_config(path: impl AsRef<Path>, tx: Sender<RuntimeConfig>) -> Result<ConfigWatcher> {
    let path = path
        .as_ref()
        .canonicalize()
        .with_context(|| format!("Cannot watch config file {}", path.as_ref().display()))?;
    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .context("Config file has no parent directory")?;

    let target = path.clone();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) if touches(&event, &target) => {
            debug!(target: "uiflow::config", kind = ?event.kind, "Config file changed");
            match load_from_path(&target) {
                Ok(cfg) => {
                    if tx.blocking_send(cfg).is_err() {
                        debug!(target: "uiflow::config", "Reload receiver dropped");
                    }
                }
                Err(e) => warn!(target: "uiflow::config", error = %format!("{e:#}"), "Ignoring invalid config"),
            }
        }
        Ok(_) => {}
        Err(e) => warn!(target: "uiflow::config", error = %e, "Watch error"),
    })
    .context("Failed to create file watcher")?;
    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch {}", dir.display()))?;

    info!(target: "uiflow::config", path = %path.display(), "Watching configuration");
    Ok(ConfigWatcher {
        _watcher: watcher,
        path,
    })
}

/// Whether `event` is a content change of `target`.
fn touches(event: &Event, target: &Path) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event.paths.iter().any(|p| p == target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind};

    #[test]
    fn test_touches_filters_kind_and_path() {
        let target = PathBuf::from("/tmp/uiflow/config.json");
        let modify = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(target.clone());
        assert!(touches(&modify, &target));

        let create = Event::new(EventKind::Create(CreateKind::File)).add_path(target.clone());
        assert!(touches(&create, &target));

        let other = Event::new(EventKind::Modify(ModifyKind::Any)).add_path("/tmp/uiflow/other.json".into());
        assert!(!touches(&other, &target));

        let access = Event::new(EventKind::Access(AccessKind::Any)).add_path(target.clone());
        assert!(!touches(&access, &target));
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        assert!(watch_config("/definitely/not/here.json", tx).is_err());
    }
}
