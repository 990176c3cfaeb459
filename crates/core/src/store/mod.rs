use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::domain::approval::ApproverRole;
use crate::domain::request::{AcademicRequest, RequestId, RequestStatus, RequestType, RequesterId};

pub mod memory;

pub use memory::InMemoryRequestStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request `{0}` already exists")]
    AlreadyExists(RequestId),
    #[error("request `{0}` not found")]
    NotFound(RequestId),
    #[error("request `{id}` is at version {actual}, expected {expected}")]
    VersionConflict { id: RequestId, expected: u64, actual: u64 },
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("decode error: {0}")]
    Decode(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RequestStatistics {
    pub total: u64,
    /// Non-terminal and not yet approved.
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
    pub cancelled: u64,
    pub completed: u64,
    pub by_type: BTreeMap<RequestType, u64>,
}

impl RequestStatistics {
    pub fn record(&mut self, request_type: RequestType, status: RequestStatus) {
        self.record_many(request_type, status, 1);
    }

    pub fn record_many(&mut self, request_type: RequestType, status: RequestStatus, count: u64) {
        self.total += count;
        *self.by_type.entry(request_type).or_default() += count;
        let bucket = match status {
            RequestStatus::Submitted | RequestStatus::Pending(_) => &mut self.pending,
            RequestStatus::Approved => &mut self.approved,
            RequestStatus::Rejected => &mut self.rejected,
            RequestStatus::Cancelled => &mut self.cancelled,
            RequestStatus::Completed => &mut self.completed,
        };
        *bucket += count;
    }
}

/// Single source of truth for requests and their approval steps.
///
/// Every mutation after `insert` goes through `compare_and_swap`, which
/// persists the request and all of its steps only if the stored version still
/// equals `expected_version`.
#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn insert(&self, request: &AcademicRequest) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: &RequestId) -> Result<Option<AcademicRequest>, StoreError>;

    async fn compare_and_swap(
        &self,
        request: &AcademicRequest,
        expected_version: u64,
    ) -> Result<(), StoreError>;

    /// Allocates the next serial for `(request_type, year)`, starting at 1.
    async fn next_request_sequence(
        &self,
        request_type: RequestType,
        year: i32,
    ) -> Result<u32, StoreError>;

    /// Requests waiting on `role` at their current step, oldest first.
    async fn pending_for_role(&self, role: ApproverRole) -> Result<Vec<AcademicRequest>, StoreError>;

    /// Requests owned by `requester_id`, newest first.
    async fn list_for_requester(
        &self,
        requester_id: &RequesterId,
    ) -> Result<Vec<AcademicRequest>, StoreError>;

    async fn list_all(&self) -> Result<Vec<AcademicRequest>, StoreError>;

    async fn statistics(&self) -> Result<RequestStatistics, StoreError> {
        let mut statistics = RequestStatistics::default();
        for request in self.list_all().await? {
            statistics.record(request.request_type, request.status);
        }
        Ok(statistics)
    }
}
