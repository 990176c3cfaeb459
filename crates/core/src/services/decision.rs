use std::sync::Arc;

use chrono::Utc;

use crate::domain::request::{AcademicRequest, RequestId};
use crate::errors::WorkflowError;
use crate::flows::{apply_decision, DecisionInput};
use crate::notify::NotificationHook;
use crate::store::RequestStore;

use super::signal;

#[derive(Clone)]
pub struct DecisionService {
    store: Arc<dyn RequestStore>,
    hook: Arc<dyn NotificationHook>,
}

impl DecisionService {
    pub fn new(store: Arc<dyn RequestStore>, hook: Arc<dyn NotificationHook>) -> Self {
        Self { store, hook }
    }

    pub async fn decide(
        &self,
        request_id: &RequestId,
        input: DecisionInput,
    ) -> Result<AcademicRequest, WorkflowError> {
        let current = self
            .store
            .find_by_id(request_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(request_id.clone()))?;

        let outcome = apply_decision(&current, &input, Utc::now()).map_err(|error| {
            tracing::info!(
                event_name = "decision.refused",
                request_id = %request_id,
                acting_role = %input.acting_role,
                actor = %input.actor,
                error = %error,
                "decision refused"
            );
            WorkflowError::from(error)
        })?;

        self.store.compare_and_swap(&outcome.request, current.version).await.map_err(|error| {
            tracing::warn!(
                event_name = "decision.write_conflict",
                request_id = %request_id,
                expected_version = current.version,
                error = %error,
                "conditional write failed"
            );
            WorkflowError::from(error)
        })?;

        let request = outcome.request;
        tracing::info!(
            event_name = "decision.applied",
            request_id = %request.id,
            decision = ?input.decision,
            acting_role = %input.acting_role,
            actor = %input.actor,
            from = %outcome.from,
            to = %request.status,
            version = request.version,
            "decision applied"
        );
        if let Some(event) = outcome.event {
            signal(self.hook.as_ref(), &request, event, &input.actor);
        }

        Ok(request)
    }
}
