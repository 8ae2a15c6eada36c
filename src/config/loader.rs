use anyhow::{Context, Result, bail};
use schemars::{Schema, schema_for};
use serde_valid::Validate;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;

use super::models::{AutomationConfig, RuntimeConfig};
use crate::action::ActionRegistry;
use crate::executor::ExecutorRegistry;

/// Load configuration from a string slice.
pub fn load_from_str(s: &str) -> Result<RuntimeConfig> {
    let cfg: RuntimeConfig =
        serde_json::from_str(s).context("Failed to parse JSON config string into RuntimeConfig")?;
    validate_config(&cfg)?;
    Ok(cfg)
}

/// Load configuration from any reader (e.g., a file).
pub fn load_from_reader<R: Read>(reader: R) -> Result<RuntimeConfig> {
    let cfg: RuntimeConfig =
        serde_json::from_reader(reader).context("Failed to parse JSON config from reader")?;
    validate_config(&cfg)?;
    Ok(cfg)
}

/// Load configuration from a file path synchronously.
pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<RuntimeConfig> {
    let path_ref = path.as_ref();
    let file = File::open(path_ref)
        .with_context(|| format!("Failed to open config file {}", path_ref.display()))?;
    let cfg = load_from_reader(file)?;
    debug!(target: "uiflow::config", "Loaded config from {}", path_ref.display());
    Ok(cfg)
}

/// Load configuration from a file path asynchronously (Tokio).
pub async fn load_from_path_async<P: AsRef<Path>>(path: P) -> Result<RuntimeConfig> {
    use tokio::fs;
    let path_ref = path.as_ref();
    let bytes = fs::read(path_ref)
        .await
        .with_context(|| format!("Failed to read config file {}", path_ref.display()))?;
    let cfg: RuntimeConfig = serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse JSON config from {}", path_ref.display()))?;
    validate_config(&cfg)?;
    debug!(target: "uiflow::config", "Loaded config from {}", path_ref.display());
    Ok(cfg)
}

/// JSON Schema of [`RuntimeConfig`].
pub fn generate_schema() -> Schema {
    schema_for!(RuntimeConfig)
}

/// Write the JSON Schema for the config model to any writer (pretty-printed).
pub fn write_schema_to_writer<W: Write>(mut writer: W) -> Result<()> {
    let schema = generate_schema();
    let json = serde_json::to_string_pretty(&schema).context("Failed to serialize schema")?;
    writer
        .write_all(json.as_bytes())
        .context("Failed to write schema to writer")?;
    Ok(())
}

/// Structural checks: every step has a non-empty key and the remote base URL
/// parses.
pub fn validate_config(cfg: &RuntimeConfig) -> Result<()> {
    for (trigger_id, component) in &cfg.components {
        validate_automation(&component.automation)
            .with_context(|| format!("Invalid automation for component '{trigger_id}'"))?;
    }
    if let Some(remote) = &cfg.remote {
        url::Url::parse(&remote.base_url)
            .with_context(|| format!("Invalid remote base URL '{}'", remote.base_url))?;
    }
    Ok(())
}

fn validate_automation(automation: &AutomationConfig) -> Result<()> {
    for (event, config) in &automation.event_configs {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("Invalid steps for event '{event}'"))?;
    }
    Ok(())
}

/// Check that every referenced executor and action key is registered.
pub fn validate_keys(
    cfg: &RuntimeConfig,
    executors: &ExecutorRegistry,
    actions: &ActionRegistry,
) -> Result<()> {
    for (trigger_id, component) in &cfg.components {
        for (event, config) in &component.automation.event_configs {
            for (idx, step) in config.executors.iter().enumerate() {
                if !executors.has(&step.key) {
                    bail!(
                        "Component '{trigger_id}' event '{event}' executor {idx} refers to unknown executor '{}'",
                        step.key
                    );
                }
            }
            for (idx, step) in config.actions.iter().enumerate() {
                if !actions.has(&step.key) {
                    bail!(
                        "Component '{trigger_id}' event '{event}' action {idx} refers to unknown action '{}'",
                        step.key
                    );
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    const SAMPLE: &str = r#"{
        "sources": [{"type": "stdin"}],
        "remote": {"baseUrl": "http://localhost:13000/api/"},
        "components": {
            "save-button": {
                "component": "GeneralActionComponent",
                "automation": {
                    "eventConfigs": {
                        "onClick": {
                            "executors": [{"key": "echo", "params": {"a": 1}}],
                            "actions": [{"key": "message", "params": {"content": "ok"}}]
                        }
                    }
                }
            }
        }
    }"#;

    #[test]
    fn test_load_from_str() {
        let cfg = load_from_str(SAMPLE).unwrap();
        assert_eq!(cfg.sources.len(), 1);
        let component = &cfg.components["save-button"];
        assert_eq!(component.component.as_deref(), Some("GeneralActionComponent"));
        assert!(component.automation.event("onClick").is_some());
    }

    #[test]
    fn test_rejects_empty_step_key() {
        let bad = SAMPLE.replace(r#""key": "echo""#, r#""key": """#);
        let err = load_from_str(&bad).unwrap_err();
        assert!(format!("{err:#}").contains("save-button"));
    }

    #[test]
    fn test_rejects_bad_remote_url() {
        let bad = SAMPLE.replace("http://localhost:13000/api/", "not a url");
        assert!(load_from_str(&bad).is_err());
    }

    #[test]
    fn test_validate_keys() {
        let cfg = load_from_str(SAMPLE).unwrap();
        let executors = ExecutorRegistry::with_builtins();
        let actions = ActionRegistry::with_builtins();
        assert!(validate_keys(&cfg, &executors, &actions).is_ok());

        let cfg = load_from_str(&SAMPLE.replace(r#""key": "message""#, r#""key": "fireworks""#)).unwrap();
        let err = validate_keys(&cfg, &executors, &actions).unwrap_err();
        assert!(err.to_string().contains("fireworks"));
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let cfg = load_from_path(file.path()).unwrap();
        assert_eq!(cfg.components.len(), 1);
        assert!(load_from_path("/definitely/not/here.json").is_err());
    }

    #[test]
    fn test_bundled_default_config() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/default.json");
        let cfg = load_from_path(path).unwrap();
        assert_eq!(cfg.sources.len(), 2);
        assert_eq!(cfg.debounce_ms, Some(300));
        validate_keys(&cfg, &ExecutorRegistry::with_builtins(), &ActionRegistry::with_builtins()).unwrap();
    }

    #[tokio::test]
    async fn test_load_from_path_async() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let cfg = load_from_path_async(file.path()).await.unwrap();
        assert!(cfg.remote.is_some());
    }

    #[test]
    fn test_schema_mentions_components() {
        let mut out = Vec::new();
        write_schema_to_writer(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("components"));
        assert!(text.contains("eventConfigs"));
    }
}
