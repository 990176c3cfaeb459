use std::sync::Arc;

use crate::domain::approval::ApproverRole;
use crate::domain::request::{AcademicRequest, RequestId, RequesterId};
use crate::errors::WorkflowError;
use crate::store::{RequestStatistics, RequestStore};

/// Read side. Results always come straight from the store.
#[derive(Clone)]
pub struct RequestQueries {
    store: Arc<dyn RequestStore>,
}

impl RequestQueries {
    pub fn new(store: Arc<dyn RequestStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self, request_id: &RequestId) -> Result<AcademicRequest, WorkflowError> {
        self.store
            .find_by_id(request_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(request_id.clone()))
    }

    pub async fn pending_for_role(
        &self,
        role: ApproverRole,
    ) -> Result<Vec<AcademicRequest>, WorkflowError> {
        let pending = self.store.pending_for_role(role).await?;
        tracing::debug!(
            event_name = "queries.pending_for_role",
            role = %role,
            count = pending.len(),
            "loaded approval queue"
        );
        Ok(pending)
    }

    pub async fn for_requester(
        &self,
        requester_id: &RequesterId,
    ) -> Result<Vec<AcademicRequest>, WorkflowError> {
        Ok(self.store.list_for_requester(requester_id).await?)
    }

    pub async fn statistics(&self) -> Result<RequestStatistics, WorkflowError> {
        Ok(self.store.statistics().await?)
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::approval::ApproverRole;
    use crate::domain::request::{RequestId, RequestType, RequesterId};
    use crate::errors::WorkflowError;
    use crate::flows::DecisionInput;
    use crate::services::test_support::{grade_review_input, harness, postpone_input};

    #[tokio::test]
    async fn approval_queue_moves_with_the_current_step() {
        let harness = harness();
        let services = &harness.services;
        let request = services.submission.submit(postpone_input("student-7")).await.expect("submit");

        let queue = services.queries.pending_for_role(ApproverRole::StudentAffairs).await.expect("queue");
        assert_eq!(queue.len(), 1);
        assert!(services.queries.pending_for_role(ApproverRole::DeptHead).await.expect("queue").is_empty());

        services
            .decisions
            .decide(&request.id, DecisionInput::approve(ApproverRole::StudentAffairs, "sa-1", 1))
            .await
            .expect("approve");

        assert!(services
            .queries
            .pending_for_role(ApproverRole::StudentAffairs)
            .await
            .expect("queue")
            .is_empty());
        let dept = services.queries.pending_for_role(ApproverRole::DeptHead).await.expect("queue");
        assert_eq!(dept.iter().map(|r| r.id.clone()).collect::<Vec<_>>(), vec![request.id]);
    }

    #[tokio::test]
    async fn statistics_bucket_by_status_and_type() {
        let harness = harness();
        let services = &harness.services;
        let first = services.submission.submit(postpone_input("student-7")).await.expect("submit");
        services.submission.submit(grade_review_input("student-7")).await.expect("submit");
        services.submission.submit(grade_review_input("student-9")).await.expect("submit");
        services
            .decisions
            .decide(
                &first.id,
                DecisionInput::reject(ApproverRole::StudentAffairs, "sa-1", "duplicate", 1),
            )
            .await
            .expect("reject");

        let statistics = services.queries.statistics().await.expect("statistics");
        assert_eq!(statistics.total, 3);
        assert_eq!(statistics.pending, 2);
        assert_eq!(statistics.rejected, 1);
        assert_eq!(statistics.by_type.get(&RequestType::GradeReview), Some(&2));

        let mine = services
            .queries
            .for_requester(&RequesterId("student-7".to_string()))
            .await
            .expect("requester list");
        assert_eq!(mine.len(), 2);
    }

    #[tokio::test]
    async fn get_unknown_request_is_not_found() {
        let harness = harness();
        let error = harness
            .services
            .queries
            .get(&RequestId("nope".to_string()))
            .await
            .expect_err("missing");
        assert!(matches!(error, WorkflowError::NotFound(_)));
    }
}
