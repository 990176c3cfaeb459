use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::approval::{ApprovalStep, ApproverRole, StepStatus};
use crate::domain::request::{
    AcademicRequest, AttachmentRef, ExecutionClaim, FormFields, InvariantViolation, RequestId,
    RequestNumber, RequestStatus, RequestType, RequesterId,
};
use crate::notify::NotificationEvent;
use crate::registry::WorkflowDefinition;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("request `{id}` is {status} and does not accept decisions")]
    NotDecidable { id: RequestId, status: RequestStatus },
    #[error("role {acting_role} cannot act on step {step_number}, which belongs to {owner}")]
    WrongRole { acting_role: ApproverRole, owner: ApproverRole, step_number: u32 },
    #[error("role {role} already decided step {step_number}")]
    AlreadyDecided { role: ApproverRole, step_number: u32 },
    #[error("request `{id}` is at version {actual}, expected {expected}")]
    StaleVersion { id: RequestId, expected: u64, actual: u64 },
    #[error("a rejection needs a non-empty reason")]
    MissingReason,
    #[error("requester `{requester_id}` does not own request `{id}`")]
    NotOwner { id: RequestId, requester_id: RequesterId },
    #[error("request `{id}` is {status}; only submitted or pending requests can be cancelled")]
    NotCancellable { id: RequestId, status: RequestStatus },
    #[error("request `{id}` is {status}; only approved requests can be executed")]
    NotExecutable { id: RequestId, status: RequestStatus },
    #[error("request `{id}` is already being executed by `{claimed_by}`")]
    ExecutionInProgress { id: RequestId, claimed_by: String },
    #[error("request `{id}` has no execution claim held by `{actor}`")]
    ClaimNotHeld { id: RequestId, actor: String },
    #[error("request `{id}` has no execution claim to release")]
    NoExecutionClaim { id: RequestId },
    #[error("execution claim on `{id}` held by `{claimed_by}` has not timed out yet")]
    ClaimStillFresh { id: RequestId, claimed_by: String },
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Approve,
    Reject,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecisionInput {
    pub decision: Decision,
    pub acting_role: ApproverRole,
    pub actor: String,
    pub notes: Option<String>,
    pub reason: Option<String>,
    pub expected_version: u64,
}

impl DecisionInput {
    pub fn approve(acting_role: ApproverRole, actor: impl Into<String>, expected_version: u64) -> Self {
        Self {
            decision: Decision::Approve,
            acting_role,
            actor: actor.into(),
            notes: None,
            reason: None,
            expected_version,
        }
    }

    pub fn reject(
        acting_role: ApproverRole,
        actor: impl Into<String>,
        reason: impl Into<String>,
        expected_version: u64,
    ) -> Self {
        Self {
            decision: Decision::Reject,
            acting_role,
            actor: actor.into(),
            notes: None,
            reason: Some(reason.into()),
            expected_version,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Input of a submission after the form has been validated.
#[derive(Clone, Debug, PartialEq)]
pub struct NewRequest {
    pub request_type: RequestType,
    pub requester_id: RequesterId,
    pub fields: FormFields,
    pub attachments: Vec<AttachmentRef>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TransitionOutcome {
    pub request: AcademicRequest,
    pub from: RequestStatus,
    pub event: Option<NotificationEvent>,
}

impl TransitionOutcome {
    /// Version the persisted row must still carry for this outcome to apply.
    pub fn expected_version(&self) -> u64 {
        self.request.version.saturating_sub(1)
    }
}

pub fn open_request(
    id: RequestId,
    request_number: RequestNumber,
    input: NewRequest,
    workflow: &WorkflowDefinition,
    now: DateTime<Utc>,
) -> AcademicRequest {
    let approvals = (1u32..)
        .zip(&workflow.roles)
        .map(|(step_number, role)| ApprovalStep::pending(step_number, *role))
        .collect();

    AcademicRequest {
        id,
        request_number,
        request_type: input.request_type,
        requester_id: input.requester_id,
        status: RequestStatus::Submitted,
        current_step: 1,
        fields: input.fields,
        attachments: input.attachments,
        approvals,
        rejection_reason: None,
        execution_claim: None,
        execution_notes: None,
        execution_fingerprint: None,
        version: 1,
        submitted_at: now,
        updated_at: now,
        completed_at: None,
    }
}

/// Applies one approve/reject decision to the snapshot it was read from.
///
/// Checks run in a fixed order: decidable status, acting role, version,
/// then the rejection reason. Nothing is mutated on failure.
pub fn apply_decision(
    request: &AcademicRequest,
    input: &DecisionInput,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, TransitionError> {
    if !request.status.accepts_decisions() {
        return Err(TransitionError::NotDecidable { id: request.id.clone(), status: request.status });
    }

    let step = request.current_approval().ok_or_else(|| InvariantViolation {
        request_id: request.id.clone(),
        detail: format!("current_step {} has no approval step", request.current_step),
    })?;

    if step.approver_role != input.acting_role {
        let already_decided = request.approvals.iter().find(|earlier| {
            earlier.step_number < request.current_step
                && earlier.approver_role == input.acting_role
                && earlier.status != StepStatus::Pending
        });
        return Err(match already_decided {
            Some(earlier) => TransitionError::AlreadyDecided {
                role: input.acting_role,
                step_number: earlier.step_number,
            },
            None => TransitionError::WrongRole {
                acting_role: input.acting_role,
                owner: step.approver_role,
                step_number: step.step_number,
            },
        });
    }

    if request.version != input.expected_version {
        return Err(TransitionError::StaleVersion {
            id: request.id.clone(),
            expected: input.expected_version,
            actual: request.version,
        });
    }

    let reason = match input.decision {
        Decision::Approve => None,
        Decision::Reject => Some(
            input
                .reason
                .as_deref()
                .map(str::trim)
                .filter(|reason| !reason.is_empty())
                .ok_or(TransitionError::MissingReason)?
                .to_string(),
        ),
    };

    let mut next = request.clone();
    let is_last_step = next.is_last_step();
    let notes = input.notes.as_deref().map(str::trim).filter(|n| !n.is_empty()).map(String::from);

    if let Some(step) = next.current_approval_mut() {
        step.status = match input.decision {
            Decision::Approve => StepStatus::Approved,
            Decision::Reject => StepStatus::Rejected,
        };
        step.decided_by = Some(input.actor.clone());
        step.decided_at = Some(now);
        step.notes = notes;
    }

    let event = match (input.decision, reason) {
        (Decision::Reject, reason) => {
            next.status = RequestStatus::Rejected;
            next.rejection_reason = reason;
            NotificationEvent::RequestRejected
        }
        (Decision::Approve, _) if is_last_step => {
            next.status = RequestStatus::Approved;
            NotificationEvent::RequestApproved
        }
        (Decision::Approve, _) => {
            next.current_step += 1;
            let role = next.current_approval().map(|step| step.approver_role).ok_or_else(|| {
                InvariantViolation {
                    request_id: request.id.clone(),
                    detail: format!("no approval step after step {}", request.current_step),
                }
            })?;
            next.status = RequestStatus::Pending(role);
            NotificationEvent::StepApproved
        }
    };

    next.version += 1;
    next.updated_at = now;

    Ok(TransitionOutcome { request: next, from: request.status, event: Some(event) })
}

pub fn cancel(
    request: &AcademicRequest,
    requester_id: &RequesterId,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, TransitionError> {
    if request.requester_id != *requester_id {
        return Err(TransitionError::NotOwner {
            id: request.id.clone(),
            requester_id: requester_id.clone(),
        });
    }
    if !request.status.accepts_decisions() {
        return Err(TransitionError::NotCancellable {
            id: request.id.clone(),
            status: request.status,
        });
    }

    let mut next = request.clone();
    next.status = RequestStatus::Cancelled;
    next.version += 1;
    next.updated_at = now;

    Ok(TransitionOutcome {
        request: next,
        from: request.status,
        event: Some(NotificationEvent::RequestCancelled),
    })
}

/// Marks an approved request as being executed by `actor`. Any existing claim
/// blocks a new one: the holder may still be running its handler, or may have
/// run it without recording completion.
pub fn claim_execution(
    request: &AcademicRequest,
    actor: &str,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, TransitionError> {
    if request.status != RequestStatus::Approved {
        return Err(TransitionError::NotExecutable {
            id: request.id.clone(),
            status: request.status,
        });
    }
    if let Some(claim) = &request.execution_claim {
        return Err(TransitionError::ExecutionInProgress {
            id: request.id.clone(),
            claimed_by: claim.claimed_by.clone(),
        });
    }

    let mut next = request.clone();
    next.execution_claim = Some(ExecutionClaim { claimed_by: actor.to_string(), claimed_at: now });
    next.version += 1;
    next.updated_at = now;

    Ok(TransitionOutcome { request: next, from: request.status, event: None })
}

/// Clears a claim whose holder never recorded an outcome, once an operator has
/// confirmed the side effect did not happen. Claims younger than
/// `claim_timeout` may still belong to a running handler and are refused.
pub fn release_abandoned_claim(
    request: &AcademicRequest,
    claim_timeout: Duration,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, TransitionError> {
    if request.status != RequestStatus::Approved {
        return Err(TransitionError::NotExecutable {
            id: request.id.clone(),
            status: request.status,
        });
    }
    let Some(claim) = &request.execution_claim else {
        return Err(TransitionError::NoExecutionClaim { id: request.id.clone() });
    };
    if now.signed_duration_since(claim.claimed_at) < claim_timeout {
        return Err(TransitionError::ClaimStillFresh {
            id: request.id.clone(),
            claimed_by: claim.claimed_by.clone(),
        });
    }

    let mut next = request.clone();
    next.execution_claim = None;
    next.version += 1;
    next.updated_at = now;

    Ok(TransitionOutcome { request: next, from: request.status, event: None })
}

pub fn release_execution_claim(
    request: &AcademicRequest,
    actor: &str,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, TransitionError> {
    ensure_claim_held(request, actor)?;

    let mut next = request.clone();
    next.execution_claim = None;
    next.version += 1;
    next.updated_at = now;

    Ok(TransitionOutcome { request: next, from: request.status, event: None })
}

pub fn complete_execution(
    request: &AcademicRequest,
    actor: &str,
    execution_notes: Option<String>,
    fingerprint: String,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, TransitionError> {
    ensure_claim_held(request, actor)?;

    let mut next = request.clone();
    next.status = RequestStatus::Completed;
    next.execution_claim = None;
    next.execution_notes = execution_notes;
    next.execution_fingerprint = Some(fingerprint);
    next.completed_at = Some(now);
    next.version += 1;
    next.updated_at = now;

    Ok(TransitionOutcome {
        request: next,
        from: request.status,
        event: Some(NotificationEvent::RequestCompleted),
    })
}

fn ensure_claim_held(request: &AcademicRequest, actor: &str) -> Result<(), TransitionError> {
    if request.status != RequestStatus::Approved {
        return Err(TransitionError::NotExecutable {
            id: request.id.clone(),
            status: request.status,
        });
    }
    match &request.execution_claim {
        Some(claim) if claim.claimed_by == actor => Ok(()),
        _ => Err(TransitionError::ClaimNotHeld { id: request.id.clone(), actor: actor.to_string() }),
    }
}
