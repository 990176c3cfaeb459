use std::sync::Arc;

use chrono::{Datelike, Utc};
use uuid::Uuid;

use crate::domain::request::{
    AcademicRequest, AttachmentRef, FormFields, RequestId, RequestNumber, RequestType, RequesterId,
};
use crate::errors::WorkflowError;
use crate::flows::{open_request, NewRequest};
use crate::notify::{NotificationEvent, NotificationHook};
use crate::registry::WorkflowRegistry;
use crate::schema::FormSchemaValidator;
use crate::store::RequestStore;

use super::signal;

#[derive(Clone, Debug, PartialEq)]
pub struct SubmissionInput {
    pub request_type: RequestType,
    pub requester_id: RequesterId,
    pub fields: FormFields,
    pub attachments: Vec<AttachmentRef>,
}

#[derive(Clone)]
pub struct SubmissionService {
    registry: Arc<WorkflowRegistry>,
    validator: Arc<dyn FormSchemaValidator>,
    store: Arc<dyn RequestStore>,
    hook: Arc<dyn NotificationHook>,
}

impl SubmissionService {
    pub fn new(
        registry: Arc<WorkflowRegistry>,
        validator: Arc<dyn FormSchemaValidator>,
        store: Arc<dyn RequestStore>,
        hook: Arc<dyn NotificationHook>,
    ) -> Self {
        Self { registry, validator, store, hook }
    }

    pub async fn submit(&self, input: SubmissionInput) -> Result<AcademicRequest, WorkflowError> {
        let workflow = self.registry.lookup(input.request_type)?;

        let fields = self
            .validator
            .validate(input.request_type, &input.fields, &input.attachments)
            .map_err(|errors| {
                tracing::info!(
                    event_name = "submission.validation_failed",
                    request_type = %input.request_type,
                    requester_id = %input.requester_id,
                    invalid_fields = errors.len(),
                    "submission rejected by form schema"
                );
                WorkflowError::ValidationFailed(errors)
            })?;

        let now = Utc::now();
        let sequence = self.store.next_request_sequence(input.request_type, now.year()).await?;
        let request = open_request(
            RequestId(Uuid::new_v4().to_string()),
            RequestNumber::format(input.request_type, now.year(), sequence),
            NewRequest {
                request_type: input.request_type,
                requester_id: input.requester_id,
                fields,
                attachments: input.attachments,
            },
            workflow,
            now,
        );

        self.store.insert(&request).await?;

        tracing::info!(
            event_name = "submission.created",
            request_id = %request.id,
            request_number = %request.request_number.0,
            request_type = %request.request_type,
            requester_id = %request.requester_id,
            steps = request.approvals.len(),
            "request submitted"
        );
        let requester = request.requester_id.0.clone();
        signal(self.hook.as_ref(), &request, NotificationEvent::RequestSubmitted, &requester);

        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Utc};

    use crate::domain::approval::{ApproverRole, StepStatus};
    use crate::domain::request::{RequestStatus, RequestType};
    use crate::errors::WorkflowError;
    use crate::notify::NotificationEvent;
    use crate::registry::WorkflowRegistry;
    use crate::services::test_support::{harness, harness_with, postpone_input};
    use crate::execution::ExecutionHandlerRegistry;
    use crate::store::RequestStore;

    #[tokio::test]
    async fn submission_creates_one_pending_step_per_role() {
        let harness = harness();
        let request =
            harness.services.submission.submit(postpone_input("student-7")).await.expect("submit");

        assert_eq!(request.status, RequestStatus::Submitted);
        assert_eq!(request.current_step, 1);
        assert_eq!(request.version, 1);
        let roles: Vec<_> = request.approvals.iter().map(|step| step.approver_role).collect();
        assert_eq!(
            roles,
            vec![
                ApproverRole::StudentAffairs,
                ApproverRole::DeptHead,
                ApproverRole::Finance,
                ApproverRole::AcademicAffairs,
            ]
        );
        assert!(request.approvals.iter().all(|step| step.status == StepStatus::Pending));
        assert_eq!(
            request.request_number.0,
            format!("SP-{}-00001", Utc::now().year())
        );

        let stored = harness.store.find_by_id(&request.id).await.expect("find").expect("stored");
        assert_eq!(stored, request);
        assert_eq!(harness.hook.events(), vec![NotificationEvent::RequestSubmitted]);
    }

    #[tokio::test]
    async fn invalid_form_writes_nothing() {
        let harness = harness();
        let mut input = postpone_input("student-7");
        input.fields.remove("phone");

        let error = harness.services.submission.submit(input).await.expect_err("missing phone");
        match error {
            WorkflowError::ValidationFailed(fields) => assert!(fields.contains_key("phone")),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(harness.store.list_all().await.expect("list").is_empty());
        assert!(harness.hook.events().is_empty());
    }

    #[tokio::test]
    async fn unregistered_type_is_unknown() {
        let registry = WorkflowRegistry::new(Vec::new());
        let harness = harness_with(registry, ExecutionHandlerRegistry::new());

        let error =
            harness.services.submission.submit(postpone_input("student-7")).await.expect_err("no workflow");
        assert_eq!(error, WorkflowError::UnknownRequestType(RequestType::SemesterPostpone.to_string()));
        assert!(harness.store.list_all().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn request_numbers_increase_per_type() {
        let harness = harness();
        let first = harness.services.submission.submit(postpone_input("s-1")).await.expect("first");
        let second = harness.services.submission.submit(postpone_input("s-2")).await.expect("second");

        assert!(first.request_number.0.ends_with("-00001"));
        assert!(second.request_number.0.ends_with("-00002"));
        assert_ne!(first.id, second.id);
    }
}
