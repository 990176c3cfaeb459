//! Type-specific side effects applied once a request is fully approved.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::domain::request::{AcademicRequest, RequestId, RequestType};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub summary: String,
    pub details: BTreeMap<String, String>,
}

impl ExecutionReport {
    pub fn new(summary: impl Into<String>) -> Self {
        Self { summary: summary.into(), details: BTreeMap::new() }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Stable sha256 over the request identity, the version the handler ran
    /// against and the report contents.
    pub fn fingerprint(&self, request: &AcademicRequest) -> String {
        let mut hasher = Sha256::new();
        hasher.update(request.id.0.as_bytes());
        hasher.update([0u8]);
        hasher.update(request.request_type.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(request.version.to_be_bytes());
        hasher.update([0u8]);
        hasher.update(self.summary.as_bytes());
        for (key, value) in &self.details {
            hasher.update([0u8]);
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[async_trait]
pub trait ExecutionHandler: Send + Sync {
    async fn execute(&self, request: &AcademicRequest) -> Result<ExecutionReport, HandlerError>;
}

/// One handler per request type.
#[derive(Clone, Default)]
pub struct ExecutionHandlerRegistry {
    handlers: HashMap<RequestType, Arc<dyn ExecutionHandler>>,
}

impl ExecutionHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the summary handler for every request type.
    pub fn with_summary_handlers() -> Self {
        let handler: Arc<dyn ExecutionHandler> = Arc::new(SummaryExecutionHandler);
        let mut registry = Self::new();
        for request_type in RequestType::ALL {
            registry.register(request_type, Arc::clone(&handler));
        }
        registry
    }

    pub fn register(&mut self, request_type: RequestType, handler: Arc<dyn ExecutionHandler>) {
        self.handlers.insert(request_type, handler);
    }

    pub fn with_handler(
        mut self,
        request_type: RequestType,
        handler: Arc<dyn ExecutionHandler>,
    ) -> Self {
        self.register(request_type, handler);
        self
    }

    pub fn handler_for(&self, request_type: RequestType) -> Option<Arc<dyn ExecutionHandler>> {
        self.handlers.get(&request_type).cloned()
    }
}

/// Describes the effect of the request from its form fields without touching
/// any external system.
#[derive(Clone, Copy, Debug, Default)]
pub struct SummaryExecutionHandler;

#[async_trait]
impl ExecutionHandler for SummaryExecutionHandler {
    async fn execute(&self, request: &AcademicRequest) -> Result<ExecutionReport, HandlerError> {
        let field = |name: &str| {
            request.fields.get(name).map(|value| match value {
                serde_json::Value::String(text) => text.clone(),
                other => other.to_string(),
            })
        };

        let summary = match request.request_type {
            RequestType::ExceptionalRegistration => "late registration recorded",
            RequestType::SemesterPostpone => "semester postponed",
            RequestType::SemesterFreeze => "semester frozen",
            RequestType::SemesterWithdrawal => "semester withdrawal recorded",
            RequestType::ReEnrollment => "student re-enrolled",
            RequestType::CourseEquivalency => "course equivalency recorded",
            RequestType::ExamRetake => "exam retake scheduled",
            RequestType::GradeReview => "grade review closed",
            RequestType::MajorChange => "major changed",
            RequestType::StudyPlanExtension => "study plan extended",
        };

        let mut report = ExecutionReport::new(summary)
            .with_detail("request_number", request.request_number.0.clone())
            .with_detail("requester_id", request.requester_id.0.clone());

        let keys: &[&str] = match request.request_type {
            RequestType::SemesterPostpone
            | RequestType::SemesterFreeze
            | RequestType::SemesterWithdrawal => &["semester_id"],
            RequestType::ReEnrollment => &["return_semester_id"],
            RequestType::ExamRetake | RequestType::GradeReview => &["course_id", "exam_type"],
            RequestType::MajorChange => &["current_department_id", "requested_department_id"],
            RequestType::StudyPlanExtension => &["requested_study_plan"],
            RequestType::ExceptionalRegistration | RequestType::CourseEquivalency => &[],
        };
        for &key in keys {
            if let Some(value) = field(key) {
                report = report.with_detail(key, value);
            }
        }

        Ok(report)
    }
}

/// Records every invocation and can be told to fail.
#[derive(Clone, Default)]
pub struct InMemoryExecutionHandler {
    executed: Arc<Mutex<Vec<RequestId>>>,
    failure: Option<String>,
}

impl InMemoryExecutionHandler {
    pub fn failing(message: impl Into<String>) -> Self {
        Self { executed: Arc::default(), failure: Some(message.into()) }
    }

    pub fn executed(&self) -> Vec<RequestId> {
        match self.executed.lock() {
            Ok(executed) => executed.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl ExecutionHandler for InMemoryExecutionHandler {
    async fn execute(&self, request: &AcademicRequest) -> Result<ExecutionReport, HandlerError> {
        match self.executed.lock() {
            Ok(mut executed) => executed.push(request.id.clone()),
            Err(poisoned) => poisoned.into_inner().push(request.id.clone()),
        }
        match &self.failure {
            Some(message) => Err(HandlerError::new(message.clone())),
            None => Ok(ExecutionReport::new(format!("{} applied", request.request_type))),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::{ExecutionHandler, ExecutionHandlerRegistry, ExecutionReport, SummaryExecutionHandler};
    use crate::domain::request::{
        AcademicRequest, FormFields, RequestId, RequestNumber, RequestType, RequesterId,
    };
    use crate::flows::{open_request, NewRequest};
    use crate::registry::WorkflowRegistry;

    fn request(request_type: RequestType, fields: FormFields) -> AcademicRequest {
        let registry = WorkflowRegistry::builtin();
        open_request(
            RequestId("req-9".to_string()),
            RequestNumber::format(request_type, 2026, 9),
            NewRequest {
                request_type,
                requester_id: RequesterId("student-1".to_string()),
                fields,
                attachments: Vec::new(),
            },
            registry.lookup(request_type).expect("builtin workflow"),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn summary_handler_reports_relevant_fields() {
        let mut fields = FormFields::new();
        fields.insert("semester_id".to_string(), json!("2026-FALL"));
        fields.insert("reason".to_string(), json!("family"));

        let report = SummaryExecutionHandler
            .execute(&request(RequestType::SemesterFreeze, fields))
            .await
            .expect("summary never fails");

        assert_eq!(report.summary, "semester frozen");
        assert_eq!(report.details.get("semester_id").map(String::as_str), Some("2026-FALL"));
        assert_eq!(report.details.get("request_number").map(String::as_str), Some("SF-2026-00009"));
        assert!(!report.details.contains_key("reason"));
    }

    #[test]
    fn fingerprint_is_stable_and_sensitive_to_details() {
        let request = request(RequestType::GradeReview, FormFields::new());
        let report = ExecutionReport::new("grade review closed").with_detail("course_id", "7");

        assert_eq!(report.fingerprint(&request), report.clone().fingerprint(&request));
        assert_eq!(report.fingerprint(&request).len(), 64);
        assert_ne!(
            report.fingerprint(&request),
            report.clone().with_detail("exam_type", "FINAL").fingerprint(&request)
        );

        let mut later = request.clone();
        later.version += 2;
        assert_ne!(report.fingerprint(&request), report.fingerprint(&later));
    }

    #[test]
    fn registry_resolves_handlers_by_type() {
        let registry = ExecutionHandlerRegistry::with_summary_handlers();
        assert!(registry.handler_for(RequestType::MajorChange).is_some());
        assert!(ExecutionHandlerRegistry::new().handler_for(RequestType::MajorChange).is_none());
    }
}
