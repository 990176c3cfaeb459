use std::sync::Arc;

use chrono::Utc;

use crate::domain::request::{AcademicRequest, RequestId, RequesterId};
use crate::errors::WorkflowError;
use crate::flows::cancel;
use crate::notify::NotificationHook;
use crate::store::RequestStore;

use super::signal;

#[derive(Clone)]
pub struct CancellationService {
    store: Arc<dyn RequestStore>,
    hook: Arc<dyn NotificationHook>,
}

impl CancellationService {
    pub fn new(store: Arc<dyn RequestStore>, hook: Arc<dyn NotificationHook>) -> Self {
        Self { store, hook }
    }

    pub async fn cancel(
        &self,
        request_id: &RequestId,
        requester_id: &RequesterId,
    ) -> Result<AcademicRequest, WorkflowError> {
        let current = self
            .store
            .find_by_id(request_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(request_id.clone()))?;

        let outcome = cancel(&current, requester_id, Utc::now())?;
        self.store.compare_and_swap(&outcome.request, current.version).await?;

        let request = outcome.request;
        tracing::info!(
            event_name = "cancellation.applied",
            request_id = %request.id,
            requester_id = %requester_id,
            from = %outcome.from,
            "request cancelled by requester"
        );
        if let Some(event) = outcome.event {
            signal(self.hook.as_ref(), &request, event, &requester_id.0);
        }

        Ok(request)
    }
}
