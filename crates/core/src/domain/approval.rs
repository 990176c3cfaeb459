use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApproverRole {
    DeptHead,
    CurrentDeptHead,
    NewDeptHead,
    Dean,
    AcademicAffairs,
    StudentAffairs,
    Finance,
    Admissions,
    CourseInstructor,
}

impl ApproverRole {
    pub const ALL: [ApproverRole; 9] = [
        Self::DeptHead,
        Self::CurrentDeptHead,
        Self::NewDeptHead,
        Self::Dean,
        Self::AcademicAffairs,
        Self::StudentAffairs,
        Self::Finance,
        Self::Admissions,
        Self::CourseInstructor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeptHead => "DEPT_HEAD",
            Self::CurrentDeptHead => "CURRENT_DEPT_HEAD",
            Self::NewDeptHead => "NEW_DEPT_HEAD",
            Self::Dean => "DEAN",
            Self::AcademicAffairs => "ACADEMIC_AFFAIRS",
            Self::StudentAffairs => "STUDENT_AFFAIRS",
            Self::Finance => "FINANCE",
            Self::Admissions => "ADMISSIONS",
            Self::CourseInstructor => "COURSE_INSTRUCTOR",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        Self::ALL.into_iter().find(|role| role.as_str() == normalized)
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::DeptHead => "Department Head",
            Self::CurrentDeptHead => "Current Department Head",
            Self::NewDeptHead => "New Department Head",
            Self::Dean => "College Dean",
            Self::AcademicAffairs => "Academic Affairs",
            Self::StudentAffairs => "Student Affairs",
            Self::Finance => "Finance",
            Self::Admissions => "Admissions & Registration",
            Self::CourseInstructor => "Course Instructor",
        }
    }

    /// Display label used while a request waits on this role.
    pub fn pending_label(&self) -> &'static str {
        match self {
            Self::DeptHead | Self::CurrentDeptHead | Self::NewDeptHead => "PENDING_DEPT",
            Self::Dean => "PENDING_DEAN",
            Self::AcademicAffairs => "PENDING_ACADEMIC",
            Self::StudentAffairs => "PENDING_STUDENT_AFFAIRS",
            Self::Finance => "PENDING_FINANCE",
            Self::Admissions => "PENDING_ADMISSIONS",
            Self::CourseInstructor => "UNDER_REVIEW",
        }
    }
}

impl fmt::Display for ApproverRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    Approved,
    Rejected,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(Self::Pending),
            "APPROVED" => Some(Self::Approved),
            "REJECTED" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStep {
    pub step_number: u32,
    pub approver_role: ApproverRole,
    pub status: StepStatus,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl ApprovalStep {
    pub fn pending(step_number: u32, approver_role: ApproverRole) -> Self {
        Self {
            step_number,
            approver_role,
            status: StepStatus::Pending,
            decided_by: None,
            decided_at: None,
            notes: None,
        }
    }

    pub fn is_undecided(&self) -> bool {
        self.status == StepStatus::Pending
            && self.decided_by.is_none()
            && self.decided_at.is_none()
            && self.notes.is_none()
    }
}
