use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as Json;
use tracing::{debug, warn};

use super::{ActionDefinition, ActionError, raw_config};
use crate::expression::compile;
use crate::registry::Keyed;
use crate::runtime::ExecutionContext;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FormValueConfig {
    field_mappings: Vec<FieldMapping>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FieldMapping {
    field_name: String,
    value_expression: Json,
}

impl FieldMapping {
    fn is_valid(&self) -> bool {
        !self.field_name.trim().is_empty()
            && match &self.value_expression {
                Json::Null => false,
                Json::String(s) => !s.is_empty(),
                _ => true,
            }
    }
}

/// Writes compiled values into fields of the host form. Each mapping is
/// compiled on its own; a failing field does not stop the others.
pub struct FormValueSetterAction;

#[async_trait]
impl ActionDefinition for FormValueSetterAction {
    fn label(&self) -> &str {
        "Set Form Values"
    }

    fn description(&self) -> Option<&str> {
        Some("Set form field values from expressions")
    }

    async fn execute(&self, _trigger: &Json, ctx: &ExecutionContext) -> Result<(), ActionError> {
        let config: FormValueConfig = raw_config(self.key(), ctx)?;
        if config.field_mappings.is_empty() {
            warn!(target: "uiflow::actions", action = "form-value-setter", "No field mappings configured");
            return Ok(());
        }
        let Some(form) = ctx.form() else {
            return Err(ActionError::failed("no form available to set values on"));
        };

        for mapping in &config.field_mappings {
            if !mapping.is_valid() {
                warn!(target: "uiflow::actions", action = "form-value-setter", ?mapping, "Skipping invalid mapping");
                continue;
            }
            let value = compile(&mapping.value_expression, ctx);
            debug!(target: "uiflow::actions", field = %mapping.field_name, %value, "Setting field");
            if let Err(e) = form.set_value(&mapping.field_name, value) {
                warn!(target: "uiflow::actions", field = %mapping.field_name, error = %e, "Failed to set field");
            }
        }
        Ok(())
    }
}

impl Keyed for FormValueSetterAction {
    fn key(&self) -> &str {
        "form-value-setter"
    }
}
