use registrar_core::config::LoadOptions;
use serde_json::{json, Value};

use crate::commands::{load_config, CommandResult};

/// Lists the approver chain of every request type that is currently offered.
pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match load_config("workflows", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let registry = match config.workflow_registry() {
        Ok(registry) => registry,
        Err(error) => {
            return CommandResult::failure("workflows", "config_validation", error.to_string(), 2)
        }
    };

    let workflows: Vec<Value> = registry
        .definitions()
        .map(|definition| {
            json!({
                "request_type": definition.request_type,
                "title": definition.request_type.title(),
                "number_prefix": definition.request_type.number_prefix(),
                "roles": definition.roles,
            })
        })
        .collect();

    CommandResult::success_with_data(
        "workflows",
        format!("{} workflow(s) active", workflows.len()),
        Value::Array(workflows),
    )
}
