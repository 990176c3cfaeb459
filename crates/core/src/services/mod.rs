//! Use cases invoked by outer surfaces. Each one reads a snapshot from the
//! store, computes the next state with the pure functions in `flows`, writes it
//! back conditionally on the version it read, then signals the hook.

use std::sync::Arc;

use chrono::Duration;

use crate::domain::request::AcademicRequest;
use crate::execution::ExecutionHandlerRegistry;
use crate::notify::{dispatch, Notification, NotificationEvent, NotificationHook};
use crate::registry::WorkflowRegistry;
use crate::schema::FormSchemaValidator;
use crate::store::RequestStore;

pub mod cancellation;
pub mod decision;
pub mod execution;
pub mod queries;
pub mod submission;

pub use cancellation::CancellationService;
pub use decision::DecisionService;
pub use execution::ExecutionService;
pub use queries::RequestQueries;
pub use submission::{SubmissionInput, SubmissionService};

/// Collaborators shared by every service.
#[derive(Clone)]
pub struct ServiceDependencies {
    pub registry: Arc<WorkflowRegistry>,
    pub validator: Arc<dyn FormSchemaValidator>,
    pub store: Arc<dyn RequestStore>,
    pub hook: Arc<dyn NotificationHook>,
    pub handlers: Arc<ExecutionHandlerRegistry>,
    pub claim_timeout: Duration,
}

#[derive(Clone)]
pub struct WorkflowServices {
    pub submission: SubmissionService,
    pub decisions: DecisionService,
    pub execution: ExecutionService,
    pub cancellation: CancellationService,
    pub queries: RequestQueries,
}

impl WorkflowServices {
    pub fn new(deps: ServiceDependencies) -> Self {
        Self {
            submission: SubmissionService::new(
                Arc::clone(&deps.registry),
                Arc::clone(&deps.validator),
                Arc::clone(&deps.store),
                Arc::clone(&deps.hook),
            ),
            decisions: DecisionService::new(Arc::clone(&deps.store), Arc::clone(&deps.hook)),
            execution: ExecutionService::new(
                Arc::clone(&deps.store),
                Arc::clone(&deps.hook),
                Arc::clone(&deps.handlers),
                deps.claim_timeout,
            ),
            cancellation: CancellationService::new(Arc::clone(&deps.store), Arc::clone(&deps.hook)),
            queries: RequestQueries::new(deps.store),
        }
    }
}

pub(crate) fn signal(
    hook: &dyn NotificationHook,
    request: &AcademicRequest,
    event: NotificationEvent,
    actor: &str,
) {
    let mut notification = Notification::new(request.id.clone(), event, actor, request.updated_at)
        .with_metadata("request_number", request.request_number.0.clone())
        .with_metadata("request_type", request.request_type.as_str())
        .with_metadata("requester_id", request.requester_id.0.clone())
        .with_metadata("status", request.status.label())
        .with_metadata("current_step", request.current_step.to_string());
    if let Some(reason) = &request.rejection_reason {
        notification = notification.with_metadata("rejection_reason", reason.clone());
    }
    if let Some(fingerprint) = &request.execution_fingerprint {
        notification = notification.with_metadata("execution_fingerprint", fingerprint.clone());
    }
    dispatch(hook, notification);
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Duration;
    use serde_json::json;
    use tokio::sync::Mutex;

    use super::{ServiceDependencies, WorkflowServices};
    use crate::domain::approval::ApproverRole;
    use crate::domain::request::{
        AcademicRequest, FormFields, RequestId, RequestType, RequesterId,
    };
    use crate::execution::{ExecutionHandler, ExecutionHandlerRegistry};
    use crate::notify::InMemoryNotificationHook;
    use crate::registry::{WorkflowDefinition, WorkflowRegistry};
    use crate::schema::StaticFormSchemaValidator;
    use crate::services::SubmissionInput;
    use crate::store::{InMemoryRequestStore, RequestStatistics, RequestStore, StoreError};

    pub struct Harness {
        pub services: WorkflowServices,
        pub store: Arc<InMemoryRequestStore>,
        pub hook: InMemoryNotificationHook,
    }

    pub fn harness() -> Harness {
        harness_with(WorkflowRegistry::builtin(), ExecutionHandlerRegistry::with_summary_handlers())
    }

    pub fn harness_with(registry: WorkflowRegistry, handlers: ExecutionHandlerRegistry) -> Harness {
        let store = Arc::new(InMemoryRequestStore::new());
        let hook = InMemoryNotificationHook::default();
        let services = WorkflowServices::new(ServiceDependencies {
            registry: Arc::new(registry),
            validator: Arc::new(StaticFormSchemaValidator::builtin()),
            store: store.clone(),
            hook: Arc::new(hook.clone()),
            handlers: Arc::new(handlers),
            claim_timeout: Duration::seconds(300),
        });
        Harness { services, store, hook }
    }

    pub fn single_step_registry() -> WorkflowRegistry {
        WorkflowRegistry::new([WorkflowDefinition::new(
            RequestType::GradeReview,
            vec![ApproverRole::DeptHead],
        )
        .expect("single role workflow")])
    }

    pub fn with_handler(request_type: RequestType, handler: Arc<dyn ExecutionHandler>) -> ExecutionHandlerRegistry {
        ExecutionHandlerRegistry::new().with_handler(request_type, handler)
    }

    pub fn postpone_input(requester: &str) -> SubmissionInput {
        let fields: FormFields = serde_json::from_value(json!({
            "program_id": 1,
            "department_id": 4,
            "semester_id": "2026-FALL",
            "previous_postponements_count": 0,
            "postponement_reason_type": "MEDICAL",
            "reason": "hospitalised for six weeks",
            "phone": "0791234567"
        }))
        .expect("object literal");
        SubmissionInput {
            request_type: RequestType::SemesterPostpone,
            requester_id: RequesterId(requester.to_string()),
            fields,
            attachments: Vec::new(),
        }
    }

    pub fn grade_review_input(requester: &str) -> SubmissionInput {
        let fields: FormFields = serde_json::from_value(json!({
            "course_id": 12,
            "exam_type": "FINAL",
            "objection_reason": "question 4 was not graded",
            "phone": "0791234567"
        }))
        .expect("object literal");
        SubmissionInput {
            request_type: RequestType::GradeReview,
            requester_id: RequesterId(requester.to_string()),
            fields,
            attachments: Vec::new(),
        }
    }

    /// Lets a test run a competing write between a service's read and its
    /// conditional write.
    pub struct InterleavingStore {
        pub inner: Arc<InMemoryRequestStore>,
        pub before_write: Mutex<Option<AcademicRequest>>,
    }

    #[async_trait]
    impl RequestStore for InterleavingStore {
        async fn insert(&self, request: &AcademicRequest) -> Result<(), StoreError> {
            self.inner.insert(request).await
        }

        async fn find_by_id(&self, id: &RequestId) -> Result<Option<AcademicRequest>, StoreError> {
            self.inner.find_by_id(id).await
        }

        async fn compare_and_swap(
            &self,
            request: &AcademicRequest,
            expected_version: u64,
        ) -> Result<(), StoreError> {
            if let Some(competing) = self.before_write.lock().await.take() {
                let competing_expected = competing.version - 1;
                self.inner.compare_and_swap(&competing, competing_expected).await?;
            }
            self.inner.compare_and_swap(request, expected_version).await
        }

        async fn next_request_sequence(
            &self,
            request_type: RequestType,
            year: i32,
        ) -> Result<u32, StoreError> {
            self.inner.next_request_sequence(request_type, year).await
        }

        async fn pending_for_role(
            &self,
            role: ApproverRole,
        ) -> Result<Vec<AcademicRequest>, StoreError> {
            self.inner.pending_for_role(role).await
        }

        async fn list_for_requester(
            &self,
            requester_id: &RequesterId,
        ) -> Result<Vec<AcademicRequest>, StoreError> {
            self.inner.list_for_requester(requester_id).await
        }

        async fn list_all(&self) -> Result<Vec<AcademicRequest>, StoreError> {
            self.inner.list_all().await
        }

        async fn statistics(&self) -> Result<RequestStatistics, StoreError> {
            self.inner.statistics().await
        }
    }
}
