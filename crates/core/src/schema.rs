use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::Value;

use crate::domain::request::{AttachmentKind, AttachmentRef, FormFields, RequestType};

/// Field name → human readable reason.
pub type FieldErrors = BTreeMap<String, String>;

/// Validates raw form data for a request type and returns the normalized
/// fields that get persisted.
pub trait FormSchemaValidator: Send + Sync {
    fn validate(
        &self,
        request_type: RequestType,
        fields: &FormFields,
        attachments: &[AttachmentRef],
    ) -> Result<FormFields, FieldErrors>;
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldKind {
    /// Empty option list accepts any non-empty identifier.
    Select { options: &'static [&'static str] },
    Text,
    Textarea,
    Number { min: Option<f64>, max: Option<f64> },
    Boolean,
    Tel,
    Date,
    CourseSelector,
    EquivalencyTable,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldSpec {
    const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind, required: true }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FormSchema {
    pub fields: Vec<FieldSpec>,
    pub required_attachments: Vec<AttachmentKind>,
}

const REASON_TYPES: &[&str] = &["MEDICAL", "SOCIAL", "FINANCIAL", "MILITARY", "WORK", "OTHER"];
const RETAKE_EXAM_TYPES: &[&str] = &["FIRST", "MIDTERM", "FINAL"];
const REVIEW_EXAM_TYPES: &[&str] = &["QUIZ", "MIDTERM", "FINAL"];

const ID_SELECT: FieldKind = FieldKind::Select { options: &[] };
const COUNT: FieldKind = FieldKind::Number { min: Some(0.0), max: None };

fn schema_for(request_type: RequestType) -> FormSchema {
    use FieldKind::*;

    let program = FieldSpec::required("program_id", ID_SELECT);
    let department = FieldSpec::required("department_id", ID_SELECT);
    let semester = FieldSpec::required("semester_id", ID_SELECT);
    let reason = FieldSpec::required("reason", Textarea);
    let phone = FieldSpec::required("phone", Tel);

    let (fields, required_attachments) = match request_type {
        RequestType::ExceptionalRegistration => (
            vec![
                program,
                department,
                semester,
                FieldSpec::required("requested_courses", CourseSelector),
                reason,
                FieldSpec::required("fees_paid", Boolean),
                phone,
            ],
            vec![],
        ),
        RequestType::SemesterPostpone | RequestType::SemesterFreeze => (
            vec![
                program,
                department,
                semester,
                FieldSpec::required("previous_postponements_count", COUNT),
                FieldSpec::required("postponement_reason_type", Select { options: REASON_TYPES }),
                reason,
                phone,
            ],
            vec![],
        ),
        RequestType::SemesterWithdrawal => (
            vec![
                program,
                department,
                semester,
                reason,
                FieldSpec::required("previous_withdrawals_count", COUNT),
                FieldSpec::required("return_next_semester", Boolean),
                phone,
            ],
            vec![],
        ),
        RequestType::ReEnrollment => (
            vec![
                department,
                FieldSpec::required("return_semester_id", ID_SELECT),
                FieldSpec::required("postponement_date", Date),
                phone,
            ],
            vec![],
        ),
        RequestType::CourseEquivalency => (
            vec![
                program,
                department,
                FieldSpec::required("previous_institution", Text),
                FieldSpec::required("courses_to_equate", EquivalencyTable),
                phone,
            ],
            vec![AttachmentKind::Transcript, AttachmentKind::CourseDescription],
        ),
        RequestType::ExamRetake => (
            vec![
                FieldSpec::required("course_id", ID_SELECT),
                FieldSpec::required("exam_type", Select { options: RETAKE_EXAM_TYPES }),
                FieldSpec::required("absence_reason", Textarea),
                phone,
            ],
            vec![AttachmentKind::MedicalReport],
        ),
        RequestType::GradeReview => (
            vec![
                FieldSpec::required("course_id", ID_SELECT),
                FieldSpec::required("exam_type", Select { options: REVIEW_EXAM_TYPES }),
                FieldSpec::required("objection_reason", Textarea),
                phone,
            ],
            vec![],
        ),
        RequestType::MajorChange => (
            vec![
                FieldSpec::required("current_department_id", ID_SELECT),
                FieldSpec::required("requested_department_id", ID_SELECT),
                reason,
                FieldSpec::required("earned_credits", COUNT),
                FieldSpec::required("current_gpa", Number { min: Some(0.0), max: Some(4.0) }),
                phone,
            ],
            vec![],
        ),
        RequestType::StudyPlanExtension => (
            vec![
                program,
                department,
                FieldSpec::required("current_study_plan", Text),
                FieldSpec::required("requested_study_plan", Text),
                reason,
                phone,
            ],
            vec![],
        ),
    };

    FormSchema { fields, required_attachments }
}

/// Per-type schemas compiled into the binary.
#[derive(Clone, Debug)]
pub struct StaticFormSchemaValidator {
    schemas: BTreeMap<RequestType, FormSchema>,
}

impl StaticFormSchemaValidator {
    pub fn builtin() -> Self {
        Self {
            schemas: RequestType::ALL
                .into_iter()
                .map(|request_type| (request_type, schema_for(request_type)))
                .collect(),
        }
    }

    pub fn schema(&self, request_type: RequestType) -> Option<&FormSchema> {
        self.schemas.get(&request_type)
    }
}

impl Default for StaticFormSchemaValidator {
    fn default() -> Self {
        Self::builtin()
    }
}

impl FormSchemaValidator for StaticFormSchemaValidator {
    fn validate(
        &self,
        request_type: RequestType,
        fields: &FormFields,
        attachments: &[AttachmentRef],
    ) -> Result<FormFields, FieldErrors> {
        let mut errors = FieldErrors::new();
        let mut normalized = FormFields::new();

        let Some(schema) = self.schemas.get(&request_type) else {
            errors.insert("request_type".to_string(), "no form schema for this type".to_string());
            return Err(errors);
        };

        for spec in &schema.fields {
            match fields.get(spec.name).filter(|value| !is_blank(value)) {
                None if spec.required => {
                    errors.insert(spec.name.to_string(), "is required".to_string());
                }
                None => {}
                Some(value) => match normalize_value(&spec.kind, value) {
                    Ok(value) => {
                        normalized.insert(spec.name.to_string(), value);
                    }
                    Err(reason) => {
                        errors.insert(spec.name.to_string(), reason);
                    }
                },
            }
        }

        for kind in &schema.required_attachments {
            if !attachments.iter().any(|attachment| attachment.kind == *kind) {
                errors.insert(
                    format!("attachments.{}", kind.as_str()),
                    "required attachment is missing".to_string(),
                );
            }
        }

        if errors.is_empty() {
            Ok(normalized)
        } else {
            Err(errors)
        }
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        _ => false,
    }
}

fn normalize_value(kind: &FieldKind, value: &Value) -> Result<Value, String> {
    match kind {
        FieldKind::Select { options } => normalize_select(options, value),
        FieldKind::Text | FieldKind::Textarea => match value {
            Value::String(text) => Ok(Value::String(text.trim().to_string())),
            _ => Err("must be text".to_string()),
        },
        FieldKind::Number { min, max } => {
            let number = match value {
                Value::Number(number) => number.as_f64(),
                Value::String(text) => text.trim().parse::<f64>().ok(),
                _ => None,
            }
            .filter(|number| number.is_finite())
            .ok_or_else(|| "must be a number".to_string())?;

            if let Some(min) = min.filter(|min| number < *min) {
                return Err(format!("must be at least {min}"));
            }
            if let Some(max) = max.filter(|max| number > *max) {
                return Err(format!("must be at most {max}"));
            }
            Ok(number_value(number))
        }
        FieldKind::Boolean => match value {
            Value::Bool(flag) => Ok(Value::Bool(*flag)),
            Value::Number(number) if number.as_i64() == Some(1) => Ok(Value::Bool(true)),
            Value::Number(number) if number.as_i64() == Some(0) => Ok(Value::Bool(false)),
            Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(Value::Bool(true)),
                "false" | "0" | "no" => Ok(Value::Bool(false)),
                _ => Err("must be true or false".to_string()),
            },
            _ => Err("must be true or false".to_string()),
        },
        FieldKind::Tel => {
            let Value::String(text) = value else {
                return Err("must be a phone number".to_string());
            };
            let text = text.trim();
            let allowed = text.chars().all(|c| c.is_ascii_digit() || "+- ()".contains(c));
            let digits = text.chars().filter(char::is_ascii_digit).count();
            if allowed && (7..=15).contains(&digits) {
                Ok(Value::String(text.to_string()))
            } else {
                Err("must be a phone number".to_string())
            }
        }
        FieldKind::Date => {
            let Value::String(text) = value else {
                return Err("must be a date (YYYY-MM-DD)".to_string());
            };
            NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
                .map(|date| Value::String(date.format("%Y-%m-%d").to_string()))
                .map_err(|_| "must be a date (YYYY-MM-DD)".to_string())
        }
        FieldKind::CourseSelector => match value {
            Value::Array(items) if !items.is_empty() => Ok(value.clone()),
            _ => Err("select at least one course".to_string()),
        },
        FieldKind::EquivalencyTable => match value {
            Value::Array(rows) if !rows.is_empty() && rows.iter().all(Value::is_object) => {
                Ok(value.clone())
            }
            _ => Err("list at least one course to equate".to_string()),
        },
    }
}

fn normalize_select(options: &[&str], value: &Value) -> Result<Value, String> {
    if options.is_empty() {
        return match value {
            Value::Number(number) if number.is_i64() || number.is_u64() => Ok(value.clone()),
            Value::String(text) => Ok(Value::String(text.trim().to_string())),
            _ => Err("must be an identifier".to_string()),
        };
    }

    let Value::String(text) = value else {
        return Err(format!("must be one of {}", options.join(", ")));
    };
    let candidate = text.trim().to_ascii_uppercase();
    if options.contains(&candidate.as_str()) {
        Ok(Value::String(candidate))
    } else {
        Err(format!("must be one of {}", options.join(", ")))
    }
}

fn number_value(number: f64) -> Value {
    if number.fract() == 0.0 && number.abs() < i64::MAX as f64 {
        Value::from(number as i64)
    } else {
        Value::from(number)
    }
}
