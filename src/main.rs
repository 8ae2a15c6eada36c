use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use uiflow::config::{self as cfg, LogLevel, RuntimeConfig};
use uiflow::host::{ConsoleHost, HostServices};
use uiflow::manager::AutomationManager;
use uiflow::remote::{HttpRemoteClient, OfflineRemoteClient, RemoteClient};
use uiflow::runtime::{AutomationError, DEFAULT_DEBOUNCE, Debouncer, Runtime, TriggerGuard, TriggerOutcome};
use uiflow::sources::{self, TriggerEvent};

/// uiflow CLI
#[derive(Debug, Parser)]
#[command(
    name = uiflow::PKG_NAME,
    version = uiflow::PKG_VERSION,
    about = "Runs executor/action automation chains for UI trigger events"
)]
struct Args {
    /// Path to the JSON configuration file
    #[arg(short = 'c', long = "config", default_value = "config/default.json")]
    config: PathBuf,

    /// Set log level. Overrides RUST_LOG.
    #[arg(long = "log-level", value_enum)]
    log_level: Option<LogLevel>,

    /// Print the JSON Schema for the configuration and exit
    #[arg(long = "print-schema")]
    print_schema: bool,

    /// Reload component automations when the configuration file changes
    #[arg(long = "watch")]
    watch: bool,

    /// Base URL of the remote data service (overrides `remote.baseUrl`)
    #[arg(long = "remote-url")]
    remote_url: Option<String>,
}

/// Per-trigger re-entrancy guards and `onChange` debouncers.
struct Dispatcher {
    runtime: Arc<Runtime>,
    quiet: Duration,
    guards: HashMap<String, TriggerGuard>,
    debouncers: HashMap<String, Arc<Debouncer>>,
    pending: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    fn new(runtime: Arc<Runtime>, debounce_ms: Option<u64>) -> Self {
        Self {
            runtime,
            quiet: debounce_ms.map(Duration::from_millis).unwrap_or(DEFAULT_DEBOUNCE),
            guards: HashMap::new(),
            debouncers: HashMap::new(),
            pending: Vec::new(),
        }
    }

    fn dispatch(&mut self, event: TriggerEvent) {
        self.pending.retain(|h| !h.is_finished());
        event.record_position();
        let trigger_id = event.trigger_id.clone();
        let debounced = event.event == "onChange";
        let guard = self.guards.entry(trigger_id.clone()).or_default().clone();
        let runtime = self.runtime.clone();
        let fire = async move {
            let outcome = runtime
                .trigger_guarded(&guard, &event.trigger_id, &event.event, event.payload)
                .await;
            log_outcome(&event.trigger_id, &event.event, outcome);
        };

        if debounced {
            let quiet = self.quiet;
            let debouncer = self
                .debouncers
                .entry(trigger_id)
                .or_insert_with(|| Arc::new(Debouncer::new(quiet)));
            let handle = debouncer.call(move || fire);
            self.pending.push(tokio::spawn(async move {
                settle(handle).await;
            }));
        } else {
            self.pending.push(tokio::spawn(fire));
        }
    }

    /// Wait for every dispatched automation, including debounced ones.
    async fn drain(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        if !pending.is_empty() {
            debug!(count = pending.len(), "Waiting for running automations");
        }
        for result in join_all(pending).await {
            if let Err(e) = result {
                error!(error = %e, "Automation task failed");
            }
        }
    }
}

/// Await a debounced call, logging a task that panicked or was aborted.
async fn settle(handle: JoinHandle<bool>) -> bool {
    match handle.await {
        Ok(ran) => {
            trace!(ran, "Debounced call settled");
            true
        }
        Err(e) => {
            error!(error = %e, "Debounced automation task failed");
            false
        }
    }
}

fn log_outcome(trigger_id: &str, event: &str, outcome: Result<TriggerOutcome, AutomationError>) {
    match outcome {
        Ok(TriggerOutcome::NotConfigured) => {
            debug!(%trigger_id, %event, "No automation bound for event")
        }
        Ok(TriggerOutcome::Completed(report)) => match serde_json::to_string(&report) {
            Ok(json) => info!(%trigger_id, %event, report = %json, "Automation finished"),
            Err(e) => warn!(%trigger_id, %event, error = %e, "Failed to serialize report"),
        },
        Ok(TriggerOutcome::Cancelled { step }) => info!(%trigger_id, %event, step, "Automation cancelled"),
        Ok(TriggerOutcome::Aborted { step, error }) => {
            warn!(%trigger_id, %event, step, %error, "Automation aborted")
        }
        Err(AutomationError::Busy(_)) => debug!(%trigger_id, %event, "Trigger busy; event dropped"),
        Err(err) => error!(%trigger_id, %event, error = %err, "Failed to handle event"),
    }
}

fn build_remote(config: &RuntimeConfig, override_url: Option<&str>) -> anyhow::Result<Arc<dyn RemoteClient>> {
    let url = override_url.or(config.remote.as_ref().map(|r| r.base_url.as_str()));
    let Some(url) = url else {
        info!("No remote service configured; running offline");
        return Ok(Arc::new(OfflineRemoteClient));
    };
    let mut client = HttpRemoteClient::new(url).with_context(|| format!("Invalid remote URL '{url}'"))?;
    if let Some(retries) = config.remote.as_ref().and_then(|r| r.retries) {
        client = client.with_retries(retries);
    }
    info!(base_url = %client.base_url(), "Using remote service");
    Ok(Arc::new(client))
}

/// Bind every configured component, warning about types and events the
/// trigger registry does not know.
fn bind_components(manager: &AutomationManager, runtime: &Runtime, config: &RuntimeConfig) {
    let bindings = config
        .components
        .iter()
        .map(|(trigger_id, component)| {
            if let Some(kind) = &component.component {
                match manager.triggers().get(kind) {
                    Some(def) => {
                        for event in component.automation.event_configs.keys() {
                            if !def.supports(event) {
                                warn!(%trigger_id, component = %kind, %event, "Component type does not fire this event");
                            }
                        }
                    }
                    None => warn!(%trigger_id, component = %kind, "Unknown trigger component type"),
                }
            }
            (trigger_id.clone(), component.automation.clone())
        })
        .collect();
    runtime.replace_bindings(bindings);
    info!(triggers = ?runtime.bound_triggers(), "Component automations bound");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    uiflow::init_tracing(args.log_level.map(Into::into));

    if args.print_schema {
        cfg::write_schema_to_writer(std::io::stdout())?;
        return Ok(());
    }

    info!(
        version = uiflow::PKG_VERSION,
        config = %args.config.display(),
        watch = args.watch,
        "Starting uiflow"
    );

    let config = cfg::load_from_path_async(&args.config).await?;
    let manager = AutomationManager::new();
    cfg::validate_keys(&config, manager.executors(), manager.actions())?;
    debug!(status = ?manager.status(), "Registries ready");

    let host = Arc::new(ConsoleHost::with_form_values(config.form.clone().into_iter().collect()));
    let remote = build_remote(&config, args.remote_url.as_deref())?;
    let runtime = Arc::new(manager.runtime(HostServices::from_host(host)).with_remote(remote));
    bind_components(&manager, &runtime, &config);

    let sources = sources::build_sources_from_config(&config);
    if sources.is_empty() {
        warn!("No event sources configured. The runtime will wait for Ctrl+C and then exit.");
    }
    let (tx, mut rx) = mpsc::channel::<TriggerEvent>(256);
    let _handles = sources::spawn_all_sources(&sources, tx);

    let (reload_tx, mut reload_rx) = mpsc::channel::<RuntimeConfig>(4);
    let _watcher = if args.watch {
        Some(cfg::watch_config(&args.config, reload_tx)?)
    } else {
        None
    };

    let mut dispatcher = Dispatcher::new(runtime.clone(), config.debounce_ms);
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => dispatcher.dispatch(event),
                None => {
                    info!("All event sources finished");
                    dispatcher.drain().await;
                    break;
                }
            },
            Some(reloaded) = reload_rx.recv() => {
                match cfg::validate_keys(&reloaded, manager.executors(), manager.actions()) {
                    Ok(()) => bind_components(&manager, &runtime, &reloaded),
                    Err(e) => warn!(error = %e, "Reloaded configuration rejected; keeping previous bindings"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    info!("uiflow exited");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn runtime() -> Arc<Runtime> {
        let host = Arc::new(ConsoleHost::new());
        Arc::new(AutomationManager::new().runtime(HostServices::from_host(host)))
    }

    #[tokio::test]
    async fn test_settle_reports_failed_task() {
        let failed = tokio::spawn(async { panic!("automation blew up") });
        assert!(!settle(failed).await);
        let ran = tokio::spawn(async { true });
        assert!(settle(ran).await);
    }

    #[tokio::test]
    async fn test_drain_waits_for_debounced_events() {
        let mut dispatcher = Dispatcher::new(runtime(), Some(10));
        for value in ["a", "ab"] {
            dispatcher.dispatch(TriggerEvent::new("name-input", "onChange", json!({ "value": value })));
        }
        dispatcher.dispatch(TriggerEvent::new("save-button", "onClick", json!({})));
        assert_eq!(dispatcher.pending.len(), 3);
        dispatcher.drain().await;
        assert!(dispatcher.pending.is_empty());
        assert_eq!(dispatcher.debouncers.len(), 1);
    }
}
