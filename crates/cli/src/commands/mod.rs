pub mod cancel;
pub mod config;
pub mod decide;
pub mod doctor;
pub mod execute;
pub mod inspect;
pub mod migrate;
pub mod submit;
pub mod workflows;

use std::future::Future;

use registrar_core::config::{AppConfig, LoadOptions};
use registrar_core::errors::{ErrorClass, WorkflowError};
use registrar_core::services::WorkflowServices;
use serde::Serialize;
use serde_json::{json, Value};

use crate::bootstrap::bootstrap;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandOutcome {
    fn new(command: &str, status: &str, message: String) -> Self {
        Self {
            command: command.to_string(),
            status: status.to_string(),
            error_class: None,
            message,
            user_message: None,
            correlation_id: None,
            data: None,
        }
    }
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome::new(command, "ok", message.into());
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn success_with_data(command: &str, message: impl Into<String>, data: Value) -> Self {
        let mut payload = CommandOutcome::new(command, "ok", message.into());
        payload.data = Some(data);
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let mut payload = CommandOutcome::new(command, "error", message.into());
        payload.error_class = Some(error_class.to_string());
        Self { exit_code, output: serialize_payload(payload) }
    }

    /// Renders a core error through its interface shape. Field errors from a
    /// failed validation travel in `data.field_errors`.
    pub fn workflow_failure(command: &str, error: WorkflowError) -> Self {
        let data = match &error {
            WorkflowError::ValidationFailed(field_errors) => {
                Some(json!({ "field_errors": field_errors }))
            }
            _ => None,
        };
        let interface = error.into_interface(uuid::Uuid::new_v4().to_string());
        tracing::warn!(
            event_name = "cli.command_failed",
            command,
            error_class = interface.class.as_str(),
            correlation_id = %interface.correlation_id,
            error = %interface.message,
            "command failed"
        );

        let mut payload = CommandOutcome::new(command, "error", interface.message);
        payload.error_class = Some(interface.class.as_str().to_string());
        payload.user_message = Some(interface.user_message.to_string());
        payload.correlation_id = Some(interface.correlation_id);
        payload.data = data;
        Self { exit_code: exit_code_for(interface.class), output: serialize_payload(payload) }
    }

    pub fn bad_request(command: &str, message: impl Into<String>) -> Self {
        let class = ErrorClass::BadRequest;
        Self::failure(command, class.as_str(), message, exit_code_for(class))
    }
}

pub fn exit_code_for(class: ErrorClass) -> u8 {
    match class {
        ErrorClass::BadRequest => 10,
        ErrorClass::Forbidden => 11,
        ErrorClass::NotFound => 12,
        ErrorClass::Conflict => 13,
        ErrorClass::Unavailable => 14,
        ErrorClass::Internal => 15,
    }
}

pub(crate) fn load_config(command: &str, options: &LoadOptions) -> Result<AppConfig, CommandResult> {
    AppConfig::load(options.clone()).map_err(|error| {
        CommandResult::failure(command, "config_validation", format!("configuration issue: {error}"), 2)
    })
}

pub(crate) fn build_runtime(command: &str) -> Result<tokio::runtime::Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            3,
        )
    })
}

/// Message and payload of a successful request command.
pub(crate) type Outcome = Result<(String, Value), WorkflowError>;

/// Bootstraps the services, runs `action` against them and closes the pool.
pub(crate) fn with_services<F, Fut>(command: &str, options: &LoadOptions, action: F) -> CommandResult
where
    F: FnOnce(WorkflowServices) -> Fut,
    Fut: Future<Output = Outcome>,
{
    let config = match load_config(command, options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime(command) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    runtime.block_on(async {
        let app = match bootstrap(config).await {
            Ok(app) => app,
            Err(error) => {
                let (error_class, exit_code) = error.classify();
                return CommandResult::failure(command, error_class, error.to_string(), exit_code);
            }
        };

        let outcome = action(app.services.clone()).await;
        app.db_pool.close().await;

        match outcome {
            Ok((message, data)) => CommandResult::success_with_data(command, message, data),
            Err(error) => CommandResult::workflow_failure(command, error),
        }
    })
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value)
        .unwrap_or_else(|error| json!({ "serialization_error": error.to_string() }))
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
