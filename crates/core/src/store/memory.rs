use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::approval::{ApproverRole, StepStatus};
use crate::domain::request::{AcademicRequest, RequestId, RequestType, RequesterId};

use super::{RequestStore, StoreError};

#[derive(Default)]
pub struct InMemoryRequestStore {
    requests: RwLock<HashMap<String, AcademicRequest>>,
    sequences: RwLock<HashMap<(RequestType, i32), u32>>,
}

impl InMemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn insert(&self, request: &AcademicRequest) -> Result<(), StoreError> {
        let mut requests = self.requests.write().await;
        if requests.contains_key(&request.id.0) {
            return Err(StoreError::AlreadyExists(request.id.clone()));
        }
        requests.insert(request.id.0.clone(), request.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &RequestId) -> Result<Option<AcademicRequest>, StoreError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id.0).cloned())
    }

    async fn compare_and_swap(
        &self,
        request: &AcademicRequest,
        expected_version: u64,
    ) -> Result<(), StoreError> {
        let mut requests = self.requests.write().await;
        let stored = requests
            .get_mut(&request.id.0)
            .ok_or_else(|| StoreError::NotFound(request.id.clone()))?;
        if stored.version != expected_version {
            return Err(StoreError::VersionConflict {
                id: request.id.clone(),
                expected: expected_version,
                actual: stored.version,
            });
        }
        *stored = request.clone();
        Ok(())
    }

    async fn next_request_sequence(
        &self,
        request_type: RequestType,
        year: i32,
    ) -> Result<u32, StoreError> {
        let mut sequences = self.sequences.write().await;
        let sequence = sequences.entry((request_type, year)).or_insert(0);
        *sequence += 1;
        Ok(*sequence)
    }

    async fn pending_for_role(&self, role: ApproverRole) -> Result<Vec<AcademicRequest>, StoreError> {
        let requests = self.requests.read().await;
        let mut pending: Vec<_> = requests
            .values()
            .filter(|request| request.status.accepts_decisions())
            .filter(|request| {
                request.current_approval().is_some_and(|step| {
                    step.approver_role == role && step.status == StepStatus::Pending
                })
            })
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at).then_with(|| a.id.cmp(&b.id)));
        Ok(pending)
    }

    async fn list_for_requester(
        &self,
        requester_id: &RequesterId,
    ) -> Result<Vec<AcademicRequest>, StoreError> {
        let requests = self.requests.read().await;
        let mut owned: Vec<_> =
            requests.values().filter(|request| request.requester_id == *requester_id).cloned().collect();
        owned.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at).then_with(|| b.id.cmp(&a.id)));
        Ok(owned)
    }

    async fn list_all(&self) -> Result<Vec<AcademicRequest>, StoreError> {
        let requests = self.requests.read().await;
        let mut all: Vec<_> = requests.values().cloned().collect();
        all.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::InMemoryRequestStore;
    use crate::domain::approval::ApproverRole;
    use crate::domain::request::{
        AcademicRequest, FormFields, RequestId, RequestNumber, RequestStatus, RequestType,
        RequesterId,
    };
    use crate::flows::{apply_decision, open_request, DecisionInput, NewRequest};
    use crate::registry::WorkflowRegistry;
    use crate::store::{RequestStore, StoreError};

    fn request(id: &str, request_type: RequestType, requester: &str, age_minutes: i64) -> AcademicRequest {
        let registry = WorkflowRegistry::builtin();
        open_request(
            RequestId(id.to_string()),
            RequestNumber::format(request_type, 2026, 1),
            NewRequest {
                request_type,
                requester_id: RequesterId(requester.to_string()),
                fields: FormFields::new(),
                attachments: Vec::new(),
            },
            registry.lookup(request_type).expect("builtin workflow"),
            Utc::now() - Duration::minutes(age_minutes),
        )
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_ids() {
        let store = InMemoryRequestStore::new();
        let first = request("req-1", RequestType::GradeReview, "s-1", 0);
        store.insert(&first).await.expect("first insert");

        let error = store.insert(&first).await.expect_err("duplicate insert");
        assert!(matches!(error, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn compare_and_swap_requires_matching_version() {
        let store = InMemoryRequestStore::new();
        let original = request("req-1", RequestType::GradeReview, "s-1", 0);
        store.insert(&original).await.expect("insert");

        let advanced = apply_decision(
            &original,
            &DecisionInput::approve(ApproverRole::CourseInstructor, "inst-1", 1),
            Utc::now(),
        )
        .expect("instructor approves")
        .request;

        store.compare_and_swap(&advanced, 1).await.expect("first writer wins");
        let error = store.compare_and_swap(&advanced, 1).await.expect_err("second writer loses");
        assert!(matches!(error, StoreError::VersionConflict { expected: 1, actual: 2, .. }));

        let stored = store.find_by_id(&original.id).await.expect("find").expect("present");
        assert_eq!(stored.status, RequestStatus::Pending(ApproverRole::DeptHead));
    }

    #[tokio::test]
    async fn queries_follow_current_step_and_ordering() {
        let store = InMemoryRequestStore::new();
        let older = request("req-old", RequestType::GradeReview, "s-1", 30);
        let newer = request("req-new", RequestType::ExamRetake, "s-1", 5);
        let other = request("req-other", RequestType::SemesterPostpone, "s-2", 10);
        for item in [&older, &newer, &other] {
            store.insert(item).await.expect("insert");
        }

        let instructor_queue =
            store.pending_for_role(ApproverRole::CourseInstructor).await.expect("pending");
        let ids: Vec<_> = instructor_queue.iter().map(|r| r.id.0.as_str()).collect();
        assert_eq!(ids, vec!["req-old", "req-new"]);

        assert!(store.pending_for_role(ApproverRole::DeptHead).await.expect("pending").is_empty());

        let mine = store
            .list_for_requester(&RequesterId("s-1".to_string()))
            .await
            .expect("requester list");
        let ids: Vec<_> = mine.iter().map(|r| r.id.0.as_str()).collect();
        assert_eq!(ids, vec!["req-new", "req-old"]);

        let statistics = store.statistics().await.expect("statistics");
        assert_eq!(statistics.total, 3);
        assert_eq!(statistics.pending, 3);
        assert_eq!(statistics.by_type.get(&RequestType::GradeReview), Some(&1));
    }

    #[tokio::test]
    async fn sequences_are_per_type_and_year() {
        let store = InMemoryRequestStore::new();
        assert_eq!(store.next_request_sequence(RequestType::GradeReview, 2026).await.ok(), Some(1));
        assert_eq!(store.next_request_sequence(RequestType::GradeReview, 2026).await.ok(), Some(2));
        assert_eq!(store.next_request_sequence(RequestType::GradeReview, 2027).await.ok(), Some(1));
        assert_eq!(store.next_request_sequence(RequestType::MajorChange, 2026).await.ok(), Some(1));
    }
}
