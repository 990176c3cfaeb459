use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::approval::{ApprovalStep, ApproverRole, StepStatus};

/// Raw or normalized form data attached to a request.
pub type FormFields = BTreeMap<String, serde_json::Value>;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequesterId(pub String);

impl fmt::Display for RequesterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestNumber(pub String);

impl RequestNumber {
    pub fn format(request_type: RequestType, year: i32, sequence: u32) -> Self {
        Self(format!("{}-{year}-{sequence:05}", request_type.number_prefix()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("unknown request type `{0}`")]
pub struct UnknownRequestType(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    ExceptionalRegistration,
    SemesterPostpone,
    SemesterFreeze,
    SemesterWithdrawal,
    ReEnrollment,
    CourseEquivalency,
    ExamRetake,
    GradeReview,
    MajorChange,
    StudyPlanExtension,
}

impl RequestType {
    pub const ALL: [RequestType; 10] = [
        Self::ExceptionalRegistration,
        Self::SemesterPostpone,
        Self::SemesterFreeze,
        Self::SemesterWithdrawal,
        Self::ReEnrollment,
        Self::CourseEquivalency,
        Self::ExamRetake,
        Self::GradeReview,
        Self::MajorChange,
        Self::StudyPlanExtension,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExceptionalRegistration => "EXCEPTIONAL_REGISTRATION",
            Self::SemesterPostpone => "SEMESTER_POSTPONE",
            Self::SemesterFreeze => "SEMESTER_FREEZE",
            Self::SemesterWithdrawal => "SEMESTER_WITHDRAWAL",
            Self::ReEnrollment => "RE_ENROLLMENT",
            Self::CourseEquivalency => "COURSE_EQUIVALENCY",
            Self::ExamRetake => "EXAM_RETAKE",
            Self::GradeReview => "GRADE_REVIEW",
            Self::MajorChange => "MAJOR_CHANGE",
            Self::StudyPlanExtension => "STUDY_PLAN_EXTENSION",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        Self::ALL.into_iter().find(|request_type| request_type.as_str() == normalized)
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::ExceptionalRegistration => "Exceptional/Late Registration Request",
            Self::SemesterPostpone => "Semester Postponement Request",
            Self::SemesterFreeze => "Semester Freeze Request",
            Self::SemesterWithdrawal => "Full Semester Withdrawal",
            Self::ReEnrollment => "Re-enrollment Request",
            Self::CourseEquivalency => "Course Equivalency Request",
            Self::ExamRetake => "Exam Retake Request",
            Self::GradeReview => "Grade Review Request",
            Self::MajorChange => "Major Change Request",
            Self::StudyPlanExtension => "Study Plan Extension Request",
        }
    }

    pub fn number_prefix(&self) -> &'static str {
        match self {
            Self::ExceptionalRegistration => "ER",
            Self::SemesterPostpone => "SP",
            Self::SemesterFreeze => "SF",
            Self::SemesterWithdrawal => "SW",
            Self::ReEnrollment => "RE",
            Self::CourseEquivalency => "CE",
            Self::ExamRetake => "EX",
            Self::GradeReview => "GR",
            Self::MajorChange => "MC",
            Self::StudyPlanExtension => "PE",
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestType {
    type Err = UnknownRequestType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value).ok_or_else(|| UnknownRequestType(value.to_string()))
    }
}

/// Lifecycle status of a request.
///
/// `Pending` carries the role holding the current step. The role is derived
/// from `current_step` and is never stored on its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "role", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Submitted,
    Pending(ApproverRole),
    Approved,
    Rejected,
    Cancelled,
    Completed,
}

impl RequestStatus {
    /// Storage encoding; drops the pending role.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::Pending(_) => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Cancelled => "CANCELLED",
            Self::Completed => "COMPLETED",
        }
    }

    pub fn from_storage(kind: &str, pending_role: Option<ApproverRole>) -> Option<Self> {
        match kind.trim().to_ascii_uppercase().as_str() {
            "SUBMITTED" => Some(Self::Submitted),
            "PENDING" => pending_role.map(Self::Pending),
            "APPROVED" => Some(Self::Approved),
            "REJECTED" => Some(Self::Rejected),
            "CANCELLED" => Some(Self::Cancelled),
            "COMPLETED" => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending(role) => role.pending_label(),
            other => other.kind(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Cancelled | Self::Completed)
    }

    /// True while a step is genuinely waiting on a decision.
    pub fn accepts_decisions(&self) -> bool {
        matches!(self, Self::Submitted | Self::Pending(_))
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttachmentKind {
    InstructorSupportLetter,
    DepartmentSupportLetter,
    PaymentReceipt,
    MedicalReport,
    OfficialDocument,
    Transcript,
    CourseDescription,
    IdCopy,
    Other,
}

impl AttachmentKind {
    pub const ALL: [AttachmentKind; 9] = [
        Self::InstructorSupportLetter,
        Self::DepartmentSupportLetter,
        Self::PaymentReceipt,
        Self::MedicalReport,
        Self::OfficialDocument,
        Self::Transcript,
        Self::CourseDescription,
        Self::IdCopy,
        Self::Other,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|kind| kind.as_str() == normalized)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InstructorSupportLetter => "INSTRUCTOR_SUPPORT_LETTER",
            Self::DepartmentSupportLetter => "DEPARTMENT_SUPPORT_LETTER",
            Self::PaymentReceipt => "PAYMENT_RECEIPT",
            Self::MedicalReport => "MEDICAL_REPORT",
            Self::OfficialDocument => "OFFICIAL_DOCUMENT",
            Self::Transcript => "TRANSCRIPT",
            Self::CourseDescription => "COURSE_DESCRIPTION",
            Self::IdCopy => "ID_COPY",
            Self::Other => "OTHER",
        }
    }
}

/// Reference to a file held by the attachment store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub id: String,
    pub kind: AttachmentKind,
    pub filename: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionClaim {
    pub claimed_by: String,
    pub claimed_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("request `{request_id}` violates invariant: {detail}")]
pub struct InvariantViolation {
    pub request_id: RequestId,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AcademicRequest {
    pub id: RequestId,
    pub request_number: RequestNumber,
    pub request_type: RequestType,
    pub requester_id: RequesterId,
    pub status: RequestStatus,
    pub current_step: u32,
    pub fields: FormFields,
    pub attachments: Vec<AttachmentRef>,
    pub approvals: Vec<ApprovalStep>,
    pub rejection_reason: Option<String>,
    pub execution_claim: Option<ExecutionClaim>,
    pub execution_notes: Option<String>,
    pub execution_fingerprint: Option<String>,
    pub version: u64,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AcademicRequest {
    pub fn current_approval(&self) -> Option<&ApprovalStep> {
        let index = usize::try_from(self.current_step).ok()?.checked_sub(1)?;
        self.approvals.get(index)
    }

    pub fn current_approval_mut(&mut self) -> Option<&mut ApprovalStep> {
        let index = usize::try_from(self.current_step).ok()?.checked_sub(1)?;
        self.approvals.get_mut(index)
    }

    pub fn is_last_step(&self) -> bool {
        usize::try_from(self.current_step).map(|step| step == self.approvals.len()).unwrap_or(false)
    }

    /// Checks the structural invariants against the workflow the request was
    /// opened with.
    pub fn verify_invariants(&self, workflow: &[ApproverRole]) -> Result<(), InvariantViolation> {
        let violation = |detail: String| InvariantViolation { request_id: self.id.clone(), detail };

        if self.approvals.len() != workflow.len() {
            return Err(violation(format!(
                "{} approval steps for a workflow of {} roles",
                self.approvals.len(),
                workflow.len()
            )));
        }

        for (index, (step, role)) in self.approvals.iter().zip(workflow).enumerate() {
            let expected_number = u32::try_from(index + 1).unwrap_or(u32::MAX);
            if step.step_number != expected_number || step.approver_role != *role {
                return Err(violation(format!(
                    "step {} is ({}, {}) but the workflow expects ({expected_number}, {role})",
                    index + 1,
                    step.step_number,
                    step.approver_role
                )));
            }
        }

        if self.current_step == 0 || self.current_approval().is_none() {
            return Err(violation(format!("current_step {} is out of range", self.current_step)));
        }

        for step in &self.approvals {
            let ok = match step.step_number.cmp(&self.current_step) {
                std::cmp::Ordering::Less => step.status == StepStatus::Approved,
                std::cmp::Ordering::Equal => true,
                std::cmp::Ordering::Greater => step.is_undecided(),
            };
            if !ok {
                return Err(violation(format!(
                    "step {} has status {} relative to current step {}",
                    step.step_number,
                    step.status.as_str(),
                    self.current_step
                )));
            }
        }

        let current_status = self.current_approval().map(|step| step.status);
        let consistent = match self.status {
            RequestStatus::Submitted => {
                self.current_step == 1 && current_status == Some(StepStatus::Pending)
            }
            RequestStatus::Pending(role) => {
                current_status == Some(StepStatus::Pending)
                    && self.current_approval().map(|step| step.approver_role) == Some(role)
            }
            RequestStatus::Approved | RequestStatus::Completed => {
                self.approvals.iter().all(|step| step.status == StepStatus::Approved)
            }
            RequestStatus::Rejected => current_status == Some(StepStatus::Rejected),
            RequestStatus::Cancelled => current_status == Some(StepStatus::Pending),
        };
        if !consistent {
            return Err(violation(format!(
                "status {} disagrees with step {} ({:?})",
                self.status, self.current_step, current_status
            )));
        }

        let has_reason = self.rejection_reason.as_deref().is_some_and(|r| !r.trim().is_empty());
        if has_reason != (self.status == RequestStatus::Rejected) {
            return Err(violation("rejection_reason must be set iff status is REJECTED".into()));
        }

        Ok(())
    }
}
