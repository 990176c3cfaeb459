use thiserror::Error;

use crate::domain::request::{RequestId, UnknownRequestType};
use crate::flows::TransitionError;
use crate::registry::RegistryError;
use crate::schema::FieldErrors;
use crate::store::StoreError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("unknown request type `{0}`")]
    UnknownRequestType(String),
    #[error("validation failed for {}", field_list(.0))]
    ValidationFailed(FieldErrors),
    #[error("request `{0}` not found")]
    NotFound(RequestId),
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("request `{id}` was modified concurrently (expected version {expected}, found {actual})")]
    ConcurrentModification { id: RequestId, expected: u64, actual: u64 },
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
}

fn field_list(errors: &FieldErrors) -> String {
    errors.keys().map(String::as_str).collect::<Vec<_>>().join(", ")
}

impl WorkflowError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::UnknownRequestType(_) => "This kind of request is not offered.",
            Self::ValidationFailed(_) => "Some form fields are missing or invalid. Fix them and submit again.",
            Self::NotFound(_) => "The request could not be found.",
            Self::InvalidTransition(_) => "This request can no longer be changed in that way.",
            Self::Unauthorized(_) => "You are not allowed to act on this request at its current step.",
            Self::ConcurrentModification { .. } => {
                "Someone else already updated this request. Refresh and try again."
            }
            Self::ExecutionFailed(_) => {
                "The approved request could not be applied. It stays approved; try again later."
            }
            Self::Persistence(_) => "The service is temporarily unavailable. Please retry shortly.",
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let class = match &self {
            Self::UnknownRequestType(_) | Self::ValidationFailed(_) => ErrorClass::BadRequest,
            Self::Unauthorized(_) => ErrorClass::Forbidden,
            Self::NotFound(_) => ErrorClass::NotFound,
            Self::InvalidTransition(_) | Self::ConcurrentModification { .. } => ErrorClass::Conflict,
            Self::ExecutionFailed(_) | Self::Persistence(_) => ErrorClass::Unavailable,
        };
        InterfaceError {
            class,
            message: self.to_string(),
            user_message: self.user_message(),
            correlation_id: correlation_id.into(),
        }
    }
}

impl From<UnknownRequestType> for WorkflowError {
    fn from(value: UnknownRequestType) -> Self {
        Self::UnknownRequestType(value.0)
    }
}

impl From<RegistryError> for WorkflowError {
    fn from(value: RegistryError) -> Self {
        match value {
            RegistryError::UnknownRequestType(name) => Self::UnknownRequestType(name),
            other => Self::Persistence(format!("workflow registry is inconsistent: {other}")),
        }
    }
}

impl From<TransitionError> for WorkflowError {
    fn from(value: TransitionError) -> Self {
        match value {
            TransitionError::WrongRole { .. } | TransitionError::NotOwner { .. } => {
                Self::Unauthorized(value.to_string())
            }
            TransitionError::StaleVersion { id, expected, actual } => {
                Self::ConcurrentModification { id, expected, actual }
            }
            TransitionError::MissingReason => {
                let mut errors = FieldErrors::new();
                errors.insert("reason".to_string(), "is required when rejecting".to_string());
                Self::ValidationFailed(errors)
            }
            TransitionError::NotDecidable { .. }
            | TransitionError::AlreadyDecided { .. }
            | TransitionError::NotCancellable { .. }
            | TransitionError::NotExecutable { .. }
            | TransitionError::ExecutionInProgress { .. }
            | TransitionError::ClaimNotHeld { .. }
            | TransitionError::NoExecutionClaim { .. }
            | TransitionError::ClaimStillFresh { .. }
            | TransitionError::Invariant(_) => Self::InvalidTransition(value.to_string()),
        }
    }
}

impl From<StoreError> for WorkflowError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::VersionConflict { id, expected, actual } => {
                Self::ConcurrentModification { id, expected, actual }
            }
            other => Self::Persistence(other.to_string()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    BadRequest,
    Forbidden,
    NotFound,
    Conflict,
    Unavailable,
    Internal,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "bad_request",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Unavailable => "unavailable",
            Self::Internal => "internal",
        }
    }
}

/// Error shape handed to whatever surface invoked the core.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{}: {message}", .class.as_str())]
pub struct InterfaceError {
    pub class: ErrorClass,
    pub message: String,
    pub user_message: &'static str,
    pub correlation_id: String,
}

impl InterfaceError {
    pub fn internal(message: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Internal,
            message: message.into(),
            user_message: "An unexpected internal error occurred.",
            correlation_id: correlation_id.into(),
        }
    }
}
