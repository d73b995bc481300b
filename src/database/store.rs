use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::audit_log::AuditLog;
use crate::models::submission::{Submission, SubmissionAnswer, SubmissionFilter, SubmissionStatus};
use crate::models::test::{Test, TestFilter};

/// Persistence seam for tests, submissions and the audit trail.
///
/// `save_submission` and `record_answer` are the only grading write paths.
/// Both persist answers and the submission aggregate atomically and re-check
/// the stored status under the submission lock, so readers never observe a
/// raw score that disagrees with its answers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AssessmentStore: Send + Sync {
    async fn insert_test(&self, test: &Test) -> Result<Test>;

    async fn get_test(&self, test_id: Uuid) -> Result<Test>;

    /// Overwrites a test. A `structural` write is refused with `Conflict`
    /// once the test has submissions; the check runs under the test lock.
    async fn update_test(&self, test: &Test, structural: bool) -> Result<Test>;

    async fn delete_test(&self, test_id: Uuid) -> Result<bool>;

    async fn list_tests(
        &self,
        filter: &TestFilter,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<Test>, i64)>;

    async fn count_submissions(&self, test_id: Uuid) -> Result<i64>;

    async fn count_submissions_by_test(&self, test_ids: &[Uuid]) -> Result<HashMap<Uuid, i64>>;

    /// Refuses archived tests under the same lock `update_test` takes.
    async fn insert_submission(&self, submission: &Submission) -> Result<Submission>;

    async fn get_submission(&self, submission_id: Uuid) -> Result<Submission>;

    async fn get_submission_by_token(&self, access_token: &str) -> Result<Submission>;

    async fn list_submissions(
        &self,
        filter: &SubmissionFilter,
        page: i64,
        limit: i64,
    ) -> Result<(Vec<Submission>, i64)>;

    async fn list_answers(&self, submission_id: Uuid) -> Result<Vec<SubmissionAnswer>>;

    /// Upserts `answers` (keyed by submission and question) and overwrites the
    /// submission's status, timestamps and aggregate in one transaction.
    /// Fails with `Conflict` unless the stored status is still `expected`.
    async fn save_submission(
        &self,
        expected: SubmissionStatus,
        submission: &Submission,
        answers: &[SubmissionAnswer],
    ) -> Result<Submission>;

    /// Upserts one answer of an `IN_PROGRESS` submission and recomputes the
    /// aggregate from every stored answer. Status and timestamps are left alone.
    async fn record_answer(
        &self,
        test: &Test,
        submission_id: Uuid,
        answer: &SubmissionAnswer,
    ) -> Result<Submission>;

    async fn status_counts(&self) -> Result<HashMap<SubmissionStatus, i64>>;

    async fn insert_audit_log(&self, entry: &AuditLog) -> Result<AuditLog>;

    async fn list_audit_logs(&self, entity_id: Option<Uuid>, limit: i64) -> Result<Vec<AuditLog>>;
}

pub(crate) fn ensure_status(
    submission_id: Uuid,
    stored: SubmissionStatus,
    expected: SubmissionStatus,
) -> Result<()> {
    if stored != expected {
        return Err(Error::Conflict(format!(
            "Submission {} is {}, expected {}",
            submission_id, stored, expected
        )));
    }
    Ok(())
}

pub(crate) fn page_offset(page: i64, per_page: i64) -> i64 {
    (page.max(1) - 1) * per_page.max(0)
}
