use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::domain::request::{AcademicRequest, RequestId, RequestStatus};
use crate::errors::WorkflowError;
use crate::execution::ExecutionHandlerRegistry;
use crate::flows::{
    claim_execution, complete_execution, release_abandoned_claim, release_execution_claim,
    TransitionError,
};
use crate::notify::NotificationHook;
use crate::store::RequestStore;

use super::signal;

/// Applies the side effect of an approved request at most once.
///
/// The claim write happens before the handler runs, so a competing executor
/// either loses the conditional write or sees the claim. A claim is only ever
/// cleared by its holder or by an operator through
/// [`ExecutionService::release_abandoned_claim`].
#[derive(Clone)]
pub struct ExecutionService {
    store: Arc<dyn RequestStore>,
    hook: Arc<dyn NotificationHook>,
    handlers: Arc<ExecutionHandlerRegistry>,
    claim_timeout: Duration,
}

impl ExecutionService {
    pub fn new(
        store: Arc<dyn RequestStore>,
        hook: Arc<dyn NotificationHook>,
        handlers: Arc<ExecutionHandlerRegistry>,
        claim_timeout: Duration,
    ) -> Self {
        Self { store, hook, handlers, claim_timeout }
    }

    pub async fn execute(
        &self,
        request_id: &RequestId,
        actor: &str,
        execution_notes: Option<String>,
    ) -> Result<AcademicRequest, WorkflowError> {
        let current = self
            .store
            .find_by_id(request_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(request_id.clone()))?;

        if current.status != RequestStatus::Approved {
            return Err(TransitionError::NotExecutable {
                id: current.id.clone(),
                status: current.status,
            }
            .into());
        }

        let handler = self.handlers.handler_for(current.request_type).ok_or_else(|| {
            WorkflowError::ExecutionFailed(format!(
                "no execution handler registered for {}",
                current.request_type
            ))
        })?;

        let claim = claim_execution(&current, actor, Utc::now())?;
        self.store.compare_and_swap(&claim.request, current.version).await?;
        let claimed = claim.request;

        tracing::info!(
            event_name = "execution.started",
            request_id = %claimed.id,
            request_type = %claimed.request_type,
            actor = %actor,
            "execution claimed"
        );

        let report = match handler.execute(&claimed).await {
            Ok(report) => report,
            Err(error) => {
                self.release(&claimed, actor).await;
                tracing::warn!(
                    event_name = "execution.handler_failed",
                    request_id = %claimed.id,
                    request_type = %claimed.request_type,
                    error = %error,
                    "execution handler failed; request stays approved"
                );
                return Err(WorkflowError::ExecutionFailed(error.message));
            }
        };

        let fingerprint = report.fingerprint(&claimed);
        let notes = execution_notes
            .map(|notes| notes.trim().to_string())
            .filter(|notes| !notes.is_empty())
            .or_else(|| Some(report.summary.clone()));
        let outcome = complete_execution(&claimed, actor, notes, fingerprint.clone(), Utc::now())?;
        if let Err(error) = self.store.compare_and_swap(&outcome.request, claimed.version).await {
            tracing::error!(
                event_name = "execution.completion_unrecorded",
                request_id = %claimed.id,
                request_type = %claimed.request_type,
                actor = %actor,
                fingerprint = %fingerprint,
                error = %error,
                "handler ran but completion was not recorded; claim kept"
            );
            return Err(error.into());
        }

        let request = outcome.request;
        tracing::info!(
            event_name = "execution.completed",
            request_id = %request.id,
            request_type = %request.request_type,
            actor = %actor,
            summary = %report.summary,
            fingerprint = request.execution_fingerprint.as_deref().unwrap_or_default(),
            "request completed"
        );
        if let Some(event) = outcome.event {
            signal(self.hook.as_ref(), &request, event, actor);
        }

        Ok(request)
    }

    /// Clears a claim left behind by an executor that never recorded an
    /// outcome. The operator asserts the side effect did not happen; claims
    /// younger than the configured timeout are refused.
    pub async fn release_abandoned_claim(
        &self,
        request_id: &RequestId,
        operator: &str,
    ) -> Result<AcademicRequest, WorkflowError> {
        let current = self
            .store
            .find_by_id(request_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(request_id.clone()))?;

        let outcome = release_abandoned_claim(&current, self.claim_timeout, Utc::now())?;
        self.store.compare_and_swap(&outcome.request, current.version).await?;

        tracing::warn!(
            event_name = "execution.claim_released",
            request_id = %current.id,
            previous_holder = current
                .execution_claim
                .as_ref()
                .map(|claim| claim.claimed_by.as_str())
                .unwrap_or_default(),
            operator = %operator,
            "abandoned execution claim released by operator"
        );

        Ok(outcome.request)
    }

    async fn release(&self, claimed: &AcademicRequest, actor: &str) {
        let released = match release_execution_claim(claimed, actor, Utc::now()) {
            Ok(outcome) => outcome.request,
            Err(error) => {
                tracing::warn!(
                    event_name = "execution.release_refused",
                    request_id = %claimed.id,
                    error = %error,
                    "could not release execution claim"
                );
                return;
            }
        };
        if let Err(error) = self.store.compare_and_swap(&released, claimed.version).await {
            tracing::warn!(
                event_name = "execution.release_failed",
                request_id = %claimed.id,
                error = %error,
                "execution claim left in place until an operator releases it"
            );
        }
    }
}
