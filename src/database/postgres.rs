use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use crate::database::store::{ensure_status, page_offset, AssessmentStore};
use crate::error::{Error, Result};
use crate::models::audit_log::AuditLog;
use crate::models::question::Question;
use crate::models::submission::{
    FinalResult, Submission, SubmissionAnswer, SubmissionFilter, SubmissionStatus,
};
use crate::models::test::{Test, TestFilter};
use crate::services::grading_service::GradingService;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct TestRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    duration_minutes: i32,
    pass_threshold_percent: Decimal,
    show_results_to_candidate: bool,
    questions: Json<Vec<Question>>,
    is_archived: bool,
    archived_at: Option<DateTime<Utc>>,
    version: i32,
    previous_version_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TestRow> for Test {
    fn from(row: TestRow) -> Self {
        Test {
            id: row.id,
            name: row.name,
            description: row.description,
            duration_minutes: row.duration_minutes,
            pass_threshold_percent: row.pass_threshold_percent,
            show_results_to_candidate: row.show_results_to_candidate,
            questions: row.questions.0,
            is_archived: row.is_archived,
            archived_at: row.archived_at,
            version: row.version,
            previous_version_id: row.previous_version_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct SubmissionRow {
    id: Uuid,
    test_id: Uuid,
    candidate_id: Uuid,
    candidate_name: String,
    candidate_email: String,
    access_token: String,
    status: String,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    final_raw_score: Decimal,
    total_possible_score: Decimal,
    final_percent_score: Decimal,
    final_result: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubmissionRow> for Submission {
    type Error = Error;

    fn try_from(row: SubmissionRow) -> Result<Self> {
        let status = row.status.parse::<SubmissionStatus>().map_err(Error::Internal)?;
        let final_result = row
            .final_result
            .as_deref()
            .map(str::parse::<FinalResult>)
            .transpose()
            .map_err(Error::Internal)?;

        Ok(Submission {
            id: row.id,
            test_id: row.test_id,
            candidate_id: row.candidate_id,
            candidate_name: row.candidate_name,
            candidate_email: row.candidate_email,
            access_token: row.access_token,
            status,
            start_time: row.start_time,
            end_time: row.end_time,
            final_raw_score: row.final_raw_score,
            total_possible_score: row.total_possible_score,
            final_percent_score: row.final_percent_score,
            final_result,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct AnswerRow {
    id: Uuid,
    submission_id: Uuid,
    question_id: Uuid,
    selected_answer_ids: Json<Vec<Uuid>>,
    open_text_answer: Option<String>,
    assigned_score: Decimal,
    is_reviewed: bool,
}

impl From<AnswerRow> for SubmissionAnswer {
    fn from(row: AnswerRow) -> Self {
        SubmissionAnswer {
            id: row.id,
            submission_id: row.submission_id,
            question_id: row.question_id,
            selected_answer_ids: row.selected_answer_ids.0,
            open_text_answer: row.open_text_answer,
            assigned_score: row.assigned_score,
            is_reviewed: row.is_reviewed,
        }
    }
}

fn search_pattern(search: &Option<String>) -> Option<String> {
    search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", s))
}

async fn lock_submission(conn: &mut PgConnection, submission_id: Uuid) -> Result<Submission> {
    sqlx::query_as::<_, SubmissionRow>(r#"SELECT * FROM submissions WHERE id = $1 FOR UPDATE"#)
        .bind(submission_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Submission {} not found", submission_id)))?
        .try_into()
}

async fn upsert_answer(
    conn: &mut PgConnection,
    submission_id: Uuid,
    answer: &SubmissionAnswer,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO submission_answers (
            id, submission_id, question_id, selected_answer_ids, open_text_answer,
            assigned_score, is_reviewed
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (submission_id, question_id) DO UPDATE SET
            selected_answer_ids = EXCLUDED.selected_answer_ids,
            open_text_answer = EXCLUDED.open_text_answer,
            assigned_score = EXCLUDED.assigned_score,
            is_reviewed = EXCLUDED.is_reviewed,
            updated_at = NOW()
        "#,
    )
    .bind(answer.id)
    .bind(submission_id)
    .bind(answer.question_id)
    .bind(Json(&answer.selected_answer_ids))
    .bind(&answer.open_text_answer)
    .bind(answer.assigned_score)
    .bind(answer.is_reviewed)
    .execute(conn)
    .await?;
    Ok(())
}

async fn answers_for(
    conn: &mut PgConnection,
    submission_id: Uuid,
) -> Result<Vec<SubmissionAnswer>> {
    let rows = sqlx::query_as::<_, AnswerRow>(
        r#"
        SELECT id, submission_id, question_id, selected_answer_ids, open_text_answer,
               assigned_score, is_reviewed
        FROM submission_answers
        WHERE submission_id = $1
        ORDER BY created_at, id
        "#,
    )
    .bind(submission_id)
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().map(SubmissionAnswer::from).collect())
}

#[async_trait]
impl AssessmentStore for PgStore {
    async fn insert_test(&self, test: &Test) -> Result<Test> {
        let row = sqlx::query_as::<_, TestRow>(
            r#"
            INSERT INTO tests (
                id, name, description, duration_minutes, pass_threshold_percent,
                show_results_to_candidate, questions, is_archived, archived_at,
                version, previous_version_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(test.id)
        .bind(&test.name)
        .bind(&test.description)
        .bind(test.duration_minutes)
        .bind(test.pass_threshold_percent)
        .bind(test.show_results_to_candidate)
        .bind(Json(&test.questions))
        .bind(test.is_archived)
        .bind(test.archived_at)
        .bind(test.version)
        .bind(test.previous_version_id)
        .bind(test.created_at)
        .bind(test.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn get_test(&self, test_id: Uuid) -> Result<Test> {
        let row = sqlx::query_as::<_, TestRow>(r#"SELECT * FROM tests WHERE id = $1"#)
            .bind(test_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Test {} not found", test_id)))?;
        Ok(row.into())
    }

    async fn update_test(&self, test: &Test, structural: bool) -> Result<Test> {
        let mut tx = self.pool.begin().await?;

        // Holds off submission inserts until the edit commits.
        sqlx::query("SELECT id FROM tests WHERE id = $1 FOR UPDATE")
            .bind(test.id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Test {} not found", test.id)))?;

        if structural {
            let submissions: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM submissions WHERE test_id = $1")
                    .bind(test.id)
                    .fetch_one(&mut *tx)
                    .await?;
            if submissions > 0 {
                return Err(Error::Conflict(
                    "Cannot modify test with existing submissions".to_string(),
                ));
            }
        }

        let row = sqlx::query_as::<_, TestRow>(
            r#"
            UPDATE tests
            SET
                name = $2,
                description = $3,
                duration_minutes = $4,
                pass_threshold_percent = $5,
                show_results_to_candidate = $6,
                questions = $7,
                is_archived = $8,
                archived_at = $9,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(test.id)
        .bind(&test.name)
        .bind(&test.description)
        .bind(test.duration_minutes)
        .bind(test.pass_threshold_percent)
        .bind(test.show_results_to_candidate)
        .bind(Json(&test.questions))
        .bind(test.is_archived)
        .bind(test.archived_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.into())
    }

    async fn delete_test(&self, test_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tests WHERE id = $1")
            .bind(test_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_tests(
        &self,
        filter: &TestFilter,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<Test>, i64)> {
        let search = search_pattern(&filter.search);

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM tests
            WHERE ($1 OR is_archived = FALSE)
              AND ($2::text IS NULL OR name ILIKE $2 OR description ILIKE $2)
            "#,
        )
        .bind(filter.include_archived)
        .bind(&search)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query_as::<_, TestRow>(
            r#"
            SELECT * FROM tests
            WHERE ($1 OR is_archived = FALSE)
              AND ($2::text IS NULL OR name ILIKE $2 OR description ILIKE $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(filter.include_archived)
        .bind(&search)
        .bind(per_page)
        .bind(page_offset(page, per_page))
        .fetch_all(&self.pool)
        .await?;

        Ok((rows.into_iter().map(Test::from).collect(), total))
    }

    async fn count_submissions(&self, test_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM submissions WHERE test_id = $1")
            .bind(test_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn count_submissions_by_test(&self, test_ids: &[Uuid]) -> Result<HashMap<Uuid, i64>> {
        let rows: Vec<(Uuid, i64)> = sqlx::query_as(
            "SELECT test_id, COUNT(*) FROM submissions WHERE test_id = ANY($1) GROUP BY test_id",
        )
        .bind(test_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    async fn insert_submission(&self, submission: &Submission) -> Result<Submission> {
        let mut tx = self.pool.begin().await?;

        let archived: bool =
            sqlx::query_scalar("SELECT is_archived FROM tests WHERE id = $1 FOR SHARE")
                .bind(submission.test_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| {
                    Error::NotFound(format!("Test {} not found", submission.test_id))
                })?;
        if archived {
            return Err(Error::Conflict(
                "Archived tests cannot receive new submissions".to_string(),
            ));
        }

        let row = sqlx::query_as::<_, SubmissionRow>(
            r#"
            INSERT INTO submissions (
                id, test_id, candidate_id, candidate_name, candidate_email, access_token,
                status, start_time, end_time, final_raw_score, total_possible_score,
                final_percent_score, final_result, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *
            "#,
        )
        .bind(submission.id)
        .bind(submission.test_id)
        .bind(submission.candidate_id)
        .bind(&submission.candidate_name)
        .bind(&submission.candidate_email)
        .bind(&submission.access_token)
        .bind(submission.status.as_str())
        .bind(submission.start_time)
        .bind(submission.end_time)
        .bind(submission.final_raw_score)
        .bind(submission.total_possible_score)
        .bind(submission.final_percent_score)
        .bind(submission.final_result.map(FinalResult::as_str))
        .bind(submission.created_at)
        .bind(submission.updated_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn get_submission(&self, submission_id: Uuid) -> Result<Submission> {
        sqlx::query_as::<_, SubmissionRow>(r#"SELECT * FROM submissions WHERE id = $1"#)
            .bind(submission_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Submission {} not found", submission_id)))?
            .try_into()
    }

    async fn get_submission_by_token(&self, access_token: &str) -> Result<Submission> {
        sqlx::query_as::<_, SubmissionRow>(r#"SELECT * FROM submissions WHERE access_token = $1"#)
            .bind(access_token)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound("Submission not found".to_string()))?
            .try_into()
    }

    async fn list_submissions(
        &self,
        filter: &SubmissionFilter,
        page: i64,
        limit: i64,
    ) -> Result<(Vec<Submission>, i64)> {
        let status = filter.status.map(SubmissionStatus::as_str);
        let needs_review = filter.needs_review;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM submissions
            WHERE ($1::uuid IS NULL OR test_id = $1)
              AND ($2::text IS NULL OR status = $2)
              AND ($3::bool IS NULL OR (status = 'COMPLETED') = $3)
            "#,
        )
        .bind(filter.test_id)
        .bind(status)
        .bind(needs_review)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query_as::<_, SubmissionRow>(
            r#"
            SELECT * FROM submissions
            WHERE ($1::uuid IS NULL OR test_id = $1)
              AND ($2::text IS NULL OR status = $2)
              AND ($3::bool IS NULL OR (status = 'COMPLETED') = $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(filter.test_id)
        .bind(status)
        .bind(needs_review)
        .bind(limit)
        .bind(page_offset(page, limit))
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .into_iter()
            .map(Submission::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok((items, total))
    }

    async fn list_answers(&self, submission_id: Uuid) -> Result<Vec<SubmissionAnswer>> {
        let mut conn = self.pool.acquire().await?;
        answers_for(&mut conn, submission_id).await
    }

    async fn save_submission(
        &self,
        expected: SubmissionStatus,
        submission: &Submission,
        answers: &[SubmissionAnswer],
    ) -> Result<Submission> {
        let mut tx = self.pool.begin().await?;

        let stored = lock_submission(&mut tx, submission.id).await?;
        ensure_status(submission.id, stored.status, expected)?;

        for answer in answers {
            upsert_answer(&mut tx, submission.id, answer).await?;
        }

        let row = sqlx::query_as::<_, SubmissionRow>(
            r#"
            UPDATE submissions
            SET status = $2,
                start_time = $3,
                end_time = $4,
                final_raw_score = $5,
                total_possible_score = $6,
                final_percent_score = $7,
                final_result = $8,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(submission.id)
        .bind(submission.status.as_str())
        .bind(submission.start_time)
        .bind(submission.end_time)
        .bind(submission.final_raw_score)
        .bind(submission.total_possible_score)
        .bind(submission.final_percent_score)
        .bind(submission.final_result.map(FinalResult::as_str))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn record_answer(
        &self,
        test: &Test,
        submission_id: Uuid,
        answer: &SubmissionAnswer,
    ) -> Result<Submission> {
        let mut tx = self.pool.begin().await?;

        let mut submission = lock_submission(&mut tx, submission_id).await?;
        ensure_status(submission_id, submission.status, SubmissionStatus::InProgress)?;

        upsert_answer(&mut tx, submission_id, answer).await?;
        let rows = answers_for(&mut tx, submission_id).await?;
        GradingService::refresh_aggregate(&mut submission, test, &rows);

        let row = sqlx::query_as::<_, SubmissionRow>(
            r#"
            UPDATE submissions
            SET final_raw_score = $2,
                total_possible_score = $3,
                final_percent_score = $4,
                final_result = $5,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(submission_id)
        .bind(submission.final_raw_score)
        .bind(submission.total_possible_score)
        .bind(submission.final_percent_score)
        .bind(submission.final_result.map(FinalResult::as_str))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn status_counts(&self) -> Result<HashMap<SubmissionStatus, i64>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM submissions GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut counts = HashMap::new();
        for (status, count) in rows {
            let status = status.parse::<SubmissionStatus>().map_err(Error::Internal)?;
            counts.insert(status, count);
        }
        Ok(counts)
    }

    async fn insert_audit_log(&self, entry: &AuditLog) -> Result<AuditLog> {
        let row = sqlx::query_as::<_, AuditLog>(
            r#"
            INSERT INTO audit_logs (id, actor, action, entity_type, entity_id, changes, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(entry.id)
        .bind(&entry.actor)
        .bind(&entry.action)
        .bind(&entry.entity_type)
        .bind(entry.entity_id)
        .bind(&entry.changes)
        .bind(entry.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_audit_logs(&self, entity_id: Option<Uuid>, limit: i64) -> Result<Vec<AuditLog>> {
        let rows = sqlx::query_as::<_, AuditLog>(
            r#"
            SELECT * FROM audit_logs
            WHERE ($1::uuid IS NULL OR entity_id = $1)
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(entity_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
