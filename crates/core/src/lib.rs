pub mod config;
pub mod domain;
pub mod errors;
pub mod execution;
pub mod flows;
pub mod notify;
pub mod registry;
pub mod schema;
pub mod services;
pub mod store;

pub use domain::approval::{ApprovalStep, ApproverRole, StepStatus};
pub use domain::request::{
    AcademicRequest, AttachmentKind, AttachmentRef, ExecutionClaim, FormFields, RequestId,
    RequestNumber, RequestStatus, RequestType, RequesterId,
};
pub use errors::{ErrorClass, InterfaceError, WorkflowError};
pub use flows::{Decision, DecisionInput};
pub use notify::{Notification, NotificationEvent, NotificationHook};
pub use registry::{WorkflowDefinition, WorkflowRegistry};
pub use services::{ServiceDependencies, SubmissionInput, WorkflowServices};
pub use store::{RequestStatistics, RequestStore, StoreError};
