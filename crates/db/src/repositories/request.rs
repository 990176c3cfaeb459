use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;

use registrar_core::domain::approval::{ApprovalStep, ApproverRole, StepStatus};
use registrar_core::domain::request::{
    AcademicRequest, AttachmentRef, ExecutionClaim, FormFields, RequestId, RequestNumber,
    RequestStatus, RequestType, RequesterId,
};
use registrar_core::store::{RequestStatistics, RequestStore, StoreError};

use super::RepositoryError;
use crate::DbPool;

const REQUEST_COLUMNS: &str = "r.id, r.request_number, r.request_type, r.requester_id, r.status,
     r.current_step, r.fields_json, r.attachments_json, r.rejection_reason,
     r.execution_claim_json, r.execution_notes, r.execution_fingerprint, r.version,
     r.submitted_at, r.updated_at, r.completed_at";

/// SQLite-backed request store. A request row and its approval steps are
/// always written, and read back, in one transaction.
pub struct SqlRequestStore {
    pool: DbPool,
}

impl SqlRequestStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert_request(&self, request: &AcademicRequest) -> Result<(), RepositoryError> {
        let fields_json = encode_json(&request.fields)?;
        let attachments_json = encode_json(&request.attachments)?;
        let claim_json = request.execution_claim.as_ref().map(encode_json).transpose()?;
        let version = encode_version(request.version)?;

        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            "INSERT INTO academic_request (id, request_number, request_type, requester_id, status,
                                           current_step, fields_json, attachments_json,
                                           rejection_reason, execution_claim_json, execution_notes,
                                           execution_fingerprint, version, submitted_at,
                                           updated_at, completed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(&request.request_number.0)
        .bind(request.request_type.as_str())
        .bind(&request.requester_id.0)
        .bind(request.status.kind())
        .bind(i64::from(request.current_step))
        .bind(&fields_json)
        .bind(&attachments_json)
        .bind(request.rejection_reason.as_deref())
        .bind(claim_json.as_deref())
        .bind(request.execution_notes.as_deref())
        .bind(request.execution_fingerprint.as_deref())
        .bind(version)
        .bind(encode_timestamp(&request.submitted_at))
        .bind(encode_timestamp(&request.updated_at))
        .bind(request.completed_at.as_ref().map(encode_timestamp))
        .execute(&mut *tx)
        .await;

        match inserted {
            Err(sqlx::Error::Database(error)) if error.is_unique_violation() => {
                return Err(RepositoryError::Duplicate(request.id.clone()));
            }
            other => {
                other?;
            }
        }

        for step in &request.approvals {
            sqlx::query(
                "INSERT INTO approval_step (request_id, step_number, approver_role, status,
                                            decided_by, decided_at, notes)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&request.id.0)
            .bind(i64::from(step.step_number))
            .bind(step.approver_role.as_str())
            .bind(step.status.as_str())
            .bind(step.decided_by.as_deref())
            .bind(step.decided_at.as_ref().map(encode_timestamp))
            .bind(step.notes.as_deref())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn swap_request(
        &self,
        request: &AcademicRequest,
        expected_version: u64,
    ) -> Result<(), RepositoryError> {
        let fields_json = encode_json(&request.fields)?;
        let attachments_json = encode_json(&request.attachments)?;
        let claim_json = request.execution_claim.as_ref().map(encode_json).transpose()?;

        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            "UPDATE academic_request SET
                 status = ?,
                 current_step = ?,
                 fields_json = ?,
                 attachments_json = ?,
                 rejection_reason = ?,
                 execution_claim_json = ?,
                 execution_notes = ?,
                 execution_fingerprint = ?,
                 version = ?,
                 updated_at = ?,
                 completed_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(request.status.kind())
        .bind(i64::from(request.current_step))
        .bind(&fields_json)
        .bind(&attachments_json)
        .bind(request.rejection_reason.as_deref())
        .bind(claim_json.as_deref())
        .bind(request.execution_notes.as_deref())
        .bind(request.execution_fingerprint.as_deref())
        .bind(encode_version(request.version)?)
        .bind(encode_timestamp(&request.updated_at))
        .bind(request.completed_at.as_ref().map(encode_timestamp))
        .bind(&request.id.0)
        .bind(encode_version(expected_version)?)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let actual: Option<i64> =
                sqlx::query_scalar("SELECT version FROM academic_request WHERE id = ?")
                    .bind(&request.id.0)
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.rollback().await?;
            return Err(match actual {
                Some(actual) => RepositoryError::StaleVersion {
                    id: request.id.clone(),
                    expected: expected_version,
                    actual: decode_version(actual)?,
                },
                None => RepositoryError::Missing(request.id.clone()),
            });
        }

        for step in &request.approvals {
            sqlx::query(
                "UPDATE approval_step SET status = ?, decided_by = ?, decided_at = ?, notes = ?
                 WHERE request_id = ? AND step_number = ?",
            )
            .bind(step.status.as_str())
            .bind(step.decided_by.as_deref())
            .bind(step.decided_at.as_ref().map(encode_timestamp))
            .bind(step.notes.as_deref())
            .bind(&request.id.0)
            .bind(i64::from(step.step_number))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn allocate_sequence(
        &self,
        request_type: RequestType,
        year: i32,
    ) -> Result<u32, RepositoryError> {
        let next: i64 = sqlx::query_scalar(
            "INSERT INTO request_sequence (request_type, year, last_value)
             VALUES (?, ?, 1)
             ON CONFLICT(request_type, year) DO UPDATE SET last_value = last_value + 1
             RETURNING last_value",
        )
        .bind(request_type.as_str())
        .bind(year)
        .fetch_one(&self.pool)
        .await?;

        u32::try_from(next).map_err(|e| RepositoryError::Decode(format!("sequence {next}: {e}")))
    }

    async fn fetch_one_request(
        &self,
        id: &RequestId,
    ) -> Result<Option<AcademicRequest>, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!("SELECT {REQUEST_COLUMNS} FROM academic_request r WHERE r.id = ?"))
            .bind(&id.0)
            .fetch_optional(&mut *tx)
            .await?;

        let request = match row {
            Some(row) => hydrate(&mut tx, vec![row]).await?.pop(),
            None => None,
        };
        tx.commit().await?;
        Ok(request)
    }

    async fn fetch_pending(&self, role: ApproverRole) -> Result<Vec<AcademicRequest>, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS}
             FROM academic_request r
             JOIN approval_step s ON s.request_id = r.id AND s.step_number = r.current_step
             WHERE r.status IN ('SUBMITTED', 'PENDING')
               AND s.approver_role = ?
               AND s.status = 'PENDING'
             ORDER BY r.submitted_at ASC, r.id ASC"
        ))
        .bind(role.as_str())
        .fetch_all(&mut *tx)
        .await?;

        let requests = hydrate(&mut tx, rows).await?;
        tx.commit().await?;
        Ok(requests)
    }

    async fn fetch_for_requester(
        &self,
        requester_id: &RequesterId,
    ) -> Result<Vec<AcademicRequest>, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS}
             FROM academic_request r
             WHERE r.requester_id = ?
             ORDER BY r.submitted_at DESC, r.id DESC"
        ))
        .bind(&requester_id.0)
        .fetch_all(&mut *tx)
        .await?;

        let requests = hydrate(&mut tx, rows).await?;
        tx.commit().await?;
        Ok(requests)
    }

    async fn fetch_all(&self) -> Result<Vec<AcademicRequest>, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM academic_request r ORDER BY r.submitted_at ASC, r.id ASC"
        ))
        .fetch_all(&mut *tx)
        .await?;

        let requests = hydrate(&mut tx, rows).await?;
        tx.commit().await?;
        Ok(requests)
    }

    async fn count_by_type_and_status(&self) -> Result<RequestStatistics, RepositoryError> {
        let rows: Vec<SqliteRow> = sqlx::query(
            "SELECT request_type, status, COUNT(*) AS count
             FROM academic_request
             GROUP BY request_type, status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut statistics = RequestStatistics::default();
        for row in &rows {
            let request_type: String = row.try_get("request_type").map_err(decode_err)?;
            let status: String = row.try_get("status").map_err(decode_err)?;
            let count: i64 = row.try_get("count").map_err(decode_err)?;

            let request_type = parse_request_type(&request_type)?;
            // Counted together with SUBMITTED; the pending role is not needed here.
            let status = if status == "PENDING" {
                RequestStatus::Submitted
            } else {
                RequestStatus::from_storage(&status, None)
                    .ok_or_else(|| RepositoryError::Decode(format!("unknown status `{status}`")))?
            };
            statistics.record_many(request_type, status, decode_version(count)?);
        }
        Ok(statistics)
    }
}

async fn steps_for(
    conn: &mut SqliteConnection,
    request_id: &str,
) -> Result<Vec<ApprovalStep>, RepositoryError> {
    let rows: Vec<SqliteRow> = sqlx::query(
        "SELECT step_number, approver_role, status, decided_by, decided_at, notes
         FROM approval_step WHERE request_id = ? ORDER BY step_number ASC",
    )
    .bind(request_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(row_to_step).collect()
}

/// Attaches approval steps to request rows using the connection the rows were
/// read on, so both come from the same snapshot.
async fn hydrate(
    conn: &mut SqliteConnection,
    rows: Vec<SqliteRow>,
) -> Result<Vec<AcademicRequest>, RepositoryError> {
    let mut requests = Vec::with_capacity(rows.len());
    for row in &rows {
        let id: String = row.try_get("id").map_err(decode_err)?;
        let approvals = steps_for(conn, &id).await?;
        requests.push(row_to_request(row, approvals)?);
    }
    Ok(requests)
}

fn decode_err(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|e| RepositoryError::Encode(e.to_string()))
}

fn decode_json<T: serde::de::DeserializeOwned>(column: &str, raw: &str) -> Result<T, RepositoryError> {
    serde_json::from_str(raw).map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}

/// Fixed-width UTC so lexical order in SQL matches chronological order.
fn encode_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}

fn encode_version(version: u64) -> Result<i64, RepositoryError> {
    i64::try_from(version).map_err(|e| RepositoryError::Encode(format!("version {version}: {e}")))
}

fn decode_version(raw: i64) -> Result<u64, RepositoryError> {
    u64::try_from(raw).map_err(|e| RepositoryError::Decode(format!("counter {raw}: {e}")))
}

fn parse_request_type(raw: &str) -> Result<RequestType, RepositoryError> {
    RequestType::parse(raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown request type `{raw}`")))
}

fn row_to_step(row: &SqliteRow) -> Result<ApprovalStep, RepositoryError> {
    let step_number: i64 = row.try_get("step_number").map_err(decode_err)?;
    let approver_role: String = row.try_get("approver_role").map_err(decode_err)?;
    let status: String = row.try_get("status").map_err(decode_err)?;
    let decided_by: Option<String> = row.try_get("decided_by").map_err(decode_err)?;
    let decided_at: Option<String> = row.try_get("decided_at").map_err(decode_err)?;
    let notes: Option<String> = row.try_get("notes").map_err(decode_err)?;

    Ok(ApprovalStep {
        step_number: u32::try_from(step_number)
            .map_err(|e| RepositoryError::Decode(format!("step_number {step_number}: {e}")))?,
        approver_role: ApproverRole::parse(&approver_role).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown approver role `{approver_role}`"))
        })?,
        status: StepStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown step status `{status}`")))?,
        decided_by,
        decided_at: decided_at.as_deref().map(|raw| parse_timestamp("decided_at", raw)).transpose()?,
        notes,
    })
}

fn row_to_request(
    row: &SqliteRow,
    approvals: Vec<ApprovalStep>,
) -> Result<AcademicRequest, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_err)?;
    let request_number: String = row.try_get("request_number").map_err(decode_err)?;
    let request_type: String = row.try_get("request_type").map_err(decode_err)?;
    let requester_id: String = row.try_get("requester_id").map_err(decode_err)?;
    let status: String = row.try_get("status").map_err(decode_err)?;
    let current_step: i64 = row.try_get("current_step").map_err(decode_err)?;
    let fields_json: String = row.try_get("fields_json").map_err(decode_err)?;
    let attachments_json: String = row.try_get("attachments_json").map_err(decode_err)?;
    let rejection_reason: Option<String> = row.try_get("rejection_reason").map_err(decode_err)?;
    let claim_json: Option<String> = row.try_get("execution_claim_json").map_err(decode_err)?;
    let execution_notes: Option<String> = row.try_get("execution_notes").map_err(decode_err)?;
    let execution_fingerprint: Option<String> =
        row.try_get("execution_fingerprint").map_err(decode_err)?;
    let version: i64 = row.try_get("version").map_err(decode_err)?;
    let submitted_at: String = row.try_get("submitted_at").map_err(decode_err)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode_err)?;
    let completed_at: Option<String> = row.try_get("completed_at").map_err(decode_err)?;

    let current_step = u32::try_from(current_step)
        .map_err(|e| RepositoryError::Decode(format!("current_step {current_step}: {e}")))?;
    let owner = approvals
        .iter()
        .find(|step| step.step_number == current_step)
        .map(|step| step.approver_role);
    let status = RequestStatus::from_storage(&status, owner).ok_or_else(|| {
        RepositoryError::Decode(format!("request `{id}` has status `{status}` at step {current_step}"))
    })?;

    let fields: FormFields = decode_json("fields_json", &fields_json)?;
    let attachments: Vec<AttachmentRef> = decode_json("attachments_json", &attachments_json)?;
    let execution_claim: Option<ExecutionClaim> = claim_json
        .as_deref()
        .map(|raw| decode_json("execution_claim_json", raw))
        .transpose()?;

    Ok(AcademicRequest {
        id: RequestId(id),
        request_number: RequestNumber(request_number),
        request_type: parse_request_type(&request_type)?,
        requester_id: RequesterId(requester_id),
        status,
        current_step,
        fields,
        attachments,
        approvals,
        rejection_reason,
        execution_claim,
        execution_notes,
        execution_fingerprint,
        version: decode_version(version)?,
        submitted_at: parse_timestamp("submitted_at", &submitted_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
        completed_at: completed_at.as_deref().map(|raw| parse_timestamp("completed_at", raw)).transpose()?,
    })
}

#[async_trait]
impl RequestStore for SqlRequestStore {
    async fn insert(&self, request: &AcademicRequest) -> Result<(), StoreError> {
        Ok(self.insert_request(request).await?)
    }

    async fn find_by_id(&self, id: &RequestId) -> Result<Option<AcademicRequest>, StoreError> {
        Ok(self.fetch_one_request(id).await?)
    }

    async fn compare_and_swap(
        &self,
        request: &AcademicRequest,
        expected_version: u64,
    ) -> Result<(), StoreError> {
        self.swap_request(request, expected_version).await.map_err(|error| {
            tracing::debug!(
                event_name = "db.request_swap_refused",
                request_id = %request.id,
                expected_version,
                error = %error,
                "conditional update did not apply"
            );
            StoreError::from(error)
        })
    }

    async fn next_request_sequence(
        &self,
        request_type: RequestType,
        year: i32,
    ) -> Result<u32, StoreError> {
        Ok(self.allocate_sequence(request_type, year).await?)
    }

    async fn pending_for_role(&self, role: ApproverRole) -> Result<Vec<AcademicRequest>, StoreError> {
        Ok(self.fetch_pending(role).await?)
    }

    async fn list_for_requester(
        &self,
        requester_id: &RequesterId,
    ) -> Result<Vec<AcademicRequest>, StoreError> {
        Ok(self.fetch_for_requester(requester_id).await?)
    }

    async fn list_all(&self) -> Result<Vec<AcademicRequest>, StoreError> {
        Ok(self.fetch_all().await?)
    }

    async fn statistics(&self) -> Result<RequestStatistics, StoreError> {
        Ok(self.count_by_type_and_status().await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use serde_json::json;

    use registrar_core::domain::approval::{ApproverRole, StepStatus};
    use registrar_core::domain::request::{
        AcademicRequest, AttachmentKind, AttachmentRef, FormFields, RequestId, RequestNumber,
        RequestStatus, RequestType, RequesterId,
    };
    use registrar_core::execution::ExecutionHandlerRegistry;
    use registrar_core::flows::{apply_decision, open_request, DecisionInput, NewRequest};
    use registrar_core::notify::InMemoryNotificationHook;
    use registrar_core::registry::WorkflowRegistry;
    use registrar_core::schema::StaticFormSchemaValidator;
    use registrar_core::services::{ServiceDependencies, SubmissionInput, WorkflowServices};
    use registrar_core::store::{RequestStore, StoreError};

    use super::{hydrate, SqlRequestStore, REQUEST_COLUMNS};
    use crate::{connect_with_settings, migrations};

    async fn store() -> SqlRequestStore {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlRequestStore::new(pool)
    }

    fn request(id: &str, request_type: RequestType, requester: &str, age_minutes: i64) -> AcademicRequest {
        let registry = WorkflowRegistry::builtin();
        let fields: FormFields = serde_json::from_value(json!({
            "course_id": 12,
            "reason": "clash with a final exam",
        }))
        .expect("object literal");
        open_request(
            RequestId(id.to_string()),
            RequestNumber(format!("{}-2026-{id}", request_type.number_prefix())),
            NewRequest {
                request_type,
                requester_id: RequesterId(requester.to_string()),
                fields,
                attachments: vec![AttachmentRef {
                    id: format!("att-{id}"),
                    kind: AttachmentKind::MedicalReport,
                    filename: "report.pdf".to_string(),
                }],
            },
            registry.lookup(request_type).expect("builtin workflow"),
            Utc::now() - Duration::minutes(age_minutes),
        )
    }

    #[tokio::test]
    async fn insert_then_find_returns_the_same_request() {
        let store = store().await;
        let original = request("req-1", RequestType::SemesterPostpone, "s-1", 0);
        store.insert(&original).await.expect("insert");

        let loaded = store.find_by_id(&original.id).await.expect("find").expect("present");
        assert_eq!(loaded, original);
        assert_eq!(loaded.approvals.len(), 4);

        assert!(store
            .find_by_id(&RequestId("absent".to_string()))
            .await
            .expect("find")
            .is_none());
    }

    #[tokio::test]
    async fn duplicate_insert_is_already_exists() {
        let store = store().await;
        let original = request("req-1", RequestType::GradeReview, "s-1", 0);
        store.insert(&original).await.expect("first insert");

        let error = store.insert(&original).await.expect_err("duplicate");
        assert!(matches!(error, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn compare_and_swap_persists_steps_and_rejects_stale_writers() {
        let store = store().await;
        let original = request("req-1", RequestType::GradeReview, "s-1", 0);
        store.insert(&original).await.expect("insert");

        let advanced = apply_decision(
            &original,
            &DecisionInput::approve(ApproverRole::CourseInstructor, "inst-1", 1).with_notes("ok"),
            Utc::now(),
        )
        .expect("instructor approves")
        .request;

        store.compare_and_swap(&advanced, 1).await.expect("first writer wins");
        let error = store.compare_and_swap(&advanced, 1).await.expect_err("second writer loses");
        assert!(matches!(error, StoreError::VersionConflict { expected: 1, actual: 2, .. }));

        let stored = store.find_by_id(&original.id).await.expect("find").expect("present");
        assert_eq!(stored, advanced);
        assert_eq!(stored.status, RequestStatus::Pending(ApproverRole::DeptHead));
        assert_eq!(stored.approvals[0].status, StepStatus::Approved);
        assert_eq!(stored.approvals[0].decided_by.as_deref(), Some("inst-1"));
    }

    #[tokio::test]
    async fn request_and_steps_are_read_from_one_snapshot() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let url = format!("sqlite://{}", dir.path().join("snapshot.db").display());
        let pool = connect_with_settings(&url, 2, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let store = SqlRequestStore::new(pool.clone());
        let original = request("req-1", RequestType::GradeReview, "s-1", 0);
        store.insert(&original).await.expect("insert");

        let mut reader = pool.begin().await.expect("read transaction");
        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM academic_request r WHERE r.id = ?"
        ))
        .bind(&original.id.0)
        .fetch_all(&mut *reader)
        .await
        .expect("request row");

        let advanced = apply_decision(
            &original,
            &DecisionInput::approve(ApproverRole::CourseInstructor, "inst-1", 1),
            Utc::now(),
        )
        .expect("instructor approves")
        .request;
        store.compare_and_swap(&advanced, 1).await.expect("decision commits meanwhile");

        let seen = hydrate(&mut reader, rows).await.expect("hydrate");
        reader.commit().await.expect("end read");
        assert_eq!(seen, vec![original.clone()]);
        assert_eq!(seen[0].approvals[0].status, StepStatus::Pending);

        let latest = store.find_by_id(&original.id).await.expect("find").expect("present");
        assert_eq!(latest, advanced);
        pool.close().await;
    }

    #[tokio::test]
    async fn compare_and_swap_on_missing_request_is_not_found() {
        let store = store().await;
        let never_inserted = request("req-ghost", RequestType::GradeReview, "s-1", 0);

        let error = store.compare_and_swap(&never_inserted, 1).await.expect_err("missing");
        assert!(matches!(error, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn sequences_are_scoped_by_type_and_year() {
        let store = store().await;

        assert_eq!(store.next_request_sequence(RequestType::CourseEquivalency, 2026).await.expect("seq"), 1);
        assert_eq!(store.next_request_sequence(RequestType::CourseEquivalency, 2026).await.expect("seq"), 2);
        assert_eq!(store.next_request_sequence(RequestType::CourseEquivalency, 2027).await.expect("seq"), 1);
        assert_eq!(store.next_request_sequence(RequestType::GradeReview, 2026).await.expect("seq"), 1);
    }

    #[tokio::test]
    async fn queries_follow_current_step_and_ordering() {
        let store = store().await;
        let older = request("req-old", RequestType::GradeReview, "s-1", 30);
        let newer = request("req-new", RequestType::ExamRetake, "s-1", 5);
        let other = request("req-other", RequestType::SemesterPostpone, "s-2", 10);
        for item in [&older, &newer, &other] {
            store.insert(item).await.expect("insert");
        }

        let queue = store.pending_for_role(ApproverRole::CourseInstructor).await.expect("pending");
        let ids: Vec<_> = queue.iter().map(|r| r.id.0.as_str()).collect();
        assert_eq!(ids, vec!["req-old", "req-new"]);

        let rejected = apply_decision(
            &older,
            &DecisionInput::reject(ApproverRole::CourseInstructor, "inst-1", "late objection", 1),
            Utc::now(),
        )
        .expect("reject")
        .request;
        store.compare_and_swap(&rejected, 1).await.expect("swap");

        let queue = store.pending_for_role(ApproverRole::CourseInstructor).await.expect("pending");
        let ids: Vec<_> = queue.iter().map(|r| r.id.0.as_str()).collect();
        assert_eq!(ids, vec!["req-new"]);

        let mine = store
            .list_for_requester(&RequesterId("s-1".to_string()))
            .await
            .expect("requester list");
        let ids: Vec<_> = mine.iter().map(|r| r.id.0.as_str()).collect();
        assert_eq!(ids, vec!["req-new", "req-old"]);

        assert_eq!(store.list_all().await.expect("all").len(), 3);

        let statistics = store.statistics().await.expect("statistics");
        assert_eq!(statistics.total, 3);
        assert_eq!(statistics.pending, 2);
        assert_eq!(statistics.rejected, 1);
        assert_eq!(statistics.by_type.get(&RequestType::GradeReview), Some(&1));
    }

    #[tokio::test]
    async fn services_run_end_to_end_on_sqlite() {
        let store: Arc<dyn RequestStore> = Arc::new(store().await);
        let hook = InMemoryNotificationHook::default();
        let services = WorkflowServices::new(ServiceDependencies {
            registry: Arc::new(WorkflowRegistry::builtin()),
            validator: Arc::new(StaticFormSchemaValidator::builtin()),
            store: Arc::clone(&store),
            hook: Arc::new(hook.clone()),
            handlers: Arc::new(ExecutionHandlerRegistry::with_summary_handlers()),
            claim_timeout: Duration::seconds(300),
        });

        let fields: FormFields = serde_json::from_value(json!({
            "course_id": 12,
            "exam_type": "FINAL",
            "objection_reason": "question 4 was not graded",
            "phone": "0791234567"
        }))
        .expect("object literal");
        let submitted = services
            .submission
            .submit(SubmissionInput {
                request_type: RequestType::GradeReview,
                requester_id: RequesterId("student-3".to_string()),
                fields,
                attachments: Vec::new(),
            })
            .await
            .expect("submit");
        assert!(submitted.request_number.0.starts_with(RequestType::GradeReview.number_prefix()));

        let after_instructor = services
            .decisions
            .decide(&submitted.id, DecisionInput::approve(ApproverRole::CourseInstructor, "inst-1", 1))
            .await
            .expect("instructor approves");
        services
            .decisions
            .decide(
                &submitted.id,
                DecisionInput::approve(ApproverRole::DeptHead, "head-1", after_instructor.version),
            )
            .await
            .expect("dept head approves");

        let completed = services
            .execution
            .execute(&submitted.id, "registrar-1", None)
            .await
            .expect("execute");
        assert_eq!(completed.status, RequestStatus::Completed);

        let stored = services.queries.get(&submitted.id).await.expect("stored");
        assert_eq!(stored, completed);
        assert!(stored.execution_fingerprint.is_some());
        assert_eq!(stored.execution_claim, None);
    }
}
