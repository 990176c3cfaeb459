use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use crate::domain::approval::ApproverRole;
use crate::domain::request::RequestType;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("unknown request type `{0}`")]
    UnknownRequestType(String),
    #[error("unknown approver role `{role}` in workflow `{request_type}`")]
    UnknownRole { request_type: String, role: String },
    #[error("workflow `{0}` has no approver roles")]
    EmptyWorkflow(RequestType),
    #[error("workflow `{request_type}` lists role `{role}` more than once")]
    DuplicateRole { request_type: RequestType, role: ApproverRole },
}

/// Ordered approver chain for one request type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WorkflowDefinition {
    pub request_type: RequestType,
    pub roles: Vec<ApproverRole>,
}

impl WorkflowDefinition {
    pub fn new(request_type: RequestType, roles: Vec<ApproverRole>) -> Result<Self, RegistryError> {
        if roles.is_empty() {
            return Err(RegistryError::EmptyWorkflow(request_type));
        }
        for (index, role) in roles.iter().enumerate() {
            if roles[..index].contains(role) {
                return Err(RegistryError::DuplicateRole { request_type, role: *role });
            }
        }
        Ok(Self { request_type, roles })
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    pub fn role_at(&self, step_number: u32) -> Option<ApproverRole> {
        let index = usize::try_from(step_number).ok()?.checked_sub(1)?;
        self.roles.get(index).copied()
    }
}

/// Read-only mapping from request type to its workflow, built once at startup.
#[derive(Clone, Debug, Default)]
pub struct WorkflowRegistry {
    definitions: BTreeMap<RequestType, WorkflowDefinition>,
}

impl WorkflowRegistry {
    pub fn new(definitions: impl IntoIterator<Item = WorkflowDefinition>) -> Self {
        Self {
            definitions: definitions
                .into_iter()
                .map(|definition| (definition.request_type, definition))
                .collect(),
        }
    }

    pub fn builtin() -> Self {
        use ApproverRole::*;
        use RequestType::*;

        let table: [(RequestType, &[ApproverRole]); 10] = [
            (ExceptionalRegistration, &[DeptHead, Dean]),
            (SemesterPostpone, &[StudentAffairs, DeptHead, Finance, AcademicAffairs]),
            (SemesterFreeze, &[StudentAffairs, DeptHead, Finance, AcademicAffairs]),
            (SemesterWithdrawal, &[DeptHead, AcademicAffairs, StudentAffairs, Finance]),
            (ReEnrollment, &[Admissions, AcademicAffairs]),
            (CourseEquivalency, &[AcademicAffairs, Finance, Dean]),
            (ExamRetake, &[CourseInstructor, StudentAffairs]),
            (GradeReview, &[CourseInstructor, DeptHead]),
            (MajorChange, &[CurrentDeptHead, NewDeptHead, AcademicAffairs, StudentAffairs, Finance]),
            (StudyPlanExtension, &[DeptHead, AcademicAffairs]),
        ];

        Self::new(table.into_iter().map(|(request_type, roles)| WorkflowDefinition {
            request_type,
            roles: roles.to_vec(),
        }))
    }

    /// Starts from the built-in table, replaces overridden chains and drops
    /// disabled types. Keys and role names are parsed here, at the boundary.
    pub fn from_overrides(
        overrides: &BTreeMap<String, Vec<String>>,
        disabled: &[String],
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::builtin();

        for (raw_type, raw_roles) in overrides {
            let request_type = RequestType::parse(raw_type)
                .ok_or_else(|| RegistryError::UnknownRequestType(raw_type.clone()))?;
            let roles = raw_roles
                .iter()
                .map(|raw_role| {
                    ApproverRole::parse(raw_role).ok_or_else(|| RegistryError::UnknownRole {
                        request_type: raw_type.clone(),
                        role: raw_role.clone(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            registry.definitions.insert(request_type, WorkflowDefinition::new(request_type, roles)?);
        }

        for raw_type in disabled {
            let request_type = RequestType::parse(raw_type)
                .ok_or_else(|| RegistryError::UnknownRequestType(raw_type.clone()))?;
            registry.definitions.remove(&request_type);
        }

        Ok(registry)
    }

    pub fn lookup(&self, request_type: RequestType) -> Result<&WorkflowDefinition, RegistryError> {
        self.definitions
            .get(&request_type)
            .ok_or_else(|| RegistryError::UnknownRequestType(request_type.as_str().to_string()))
    }

    pub fn definitions(&self) -> impl Iterator<Item = &WorkflowDefinition> {
        self.definitions.values()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
