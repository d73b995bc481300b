use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::database::store::{ensure_status, page_offset, AssessmentStore};
use crate::error::{Error, Result};
use crate::models::audit_log::AuditLog;
use crate::models::submission::{Submission, SubmissionAnswer, SubmissionFilter, SubmissionStatus};
use crate::models::test::{Test, TestFilter};
use crate::services::grading_service::GradingService;

#[derive(Debug, Default)]
struct MemoryState {
    tests: HashMap<Uuid, Test>,
    submissions: HashMap<Uuid, Submission>,
    answers: HashMap<Uuid, Vec<SubmissionAnswer>>,
    audit_logs: Vec<AuditLog>,
}

/// Process-local store. Every operation runs under a single lock, which
/// gives `save_submission` the same all-or-nothing visibility as a database
/// transaction.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| Error::Internal("memory store lock poisoned".to_string()))
    }
}

fn paginate<T>(mut items: Vec<T>, page: i64, per_page: i64) -> Vec<T> {
    let offset = page_offset(page, per_page) as usize;
    if offset >= items.len() {
        return Vec::new();
    }
    items.drain(..offset);
    items.truncate(per_page.max(0) as usize);
    items
}

fn upsert_row(rows: &mut Vec<SubmissionAnswer>, submission_id: Uuid, answer: &SubmissionAnswer) {
    match rows.iter_mut().find(|r| r.question_id == answer.question_id) {
        Some(existing) => {
            existing.selected_answer_ids = answer.selected_answer_ids.clone();
            existing.open_text_answer = answer.open_text_answer.clone();
            existing.assigned_score = answer.assigned_score;
            existing.is_reviewed = answer.is_reviewed;
        }
        None => rows.push(SubmissionAnswer {
            submission_id,
            ..answer.clone()
        }),
    }
}

fn matches_search(test: &Test, search: &str) -> bool {
    let needle = search.to_lowercase();
    test.name.to_lowercase().contains(&needle)
        || test
            .description
            .as_deref()
            .is_some_and(|d| d.to_lowercase().contains(&needle))
}

#[async_trait]
impl AssessmentStore for MemoryStore {
    async fn insert_test(&self, test: &Test) -> Result<Test> {
        let mut state = self.state()?;
        if state.tests.contains_key(&test.id) {
            return Err(Error::Conflict(format!("Test {} already exists", test.id)));
        }
        state.tests.insert(test.id, test.clone());
        Ok(test.clone())
    }

    async fn get_test(&self, test_id: Uuid) -> Result<Test> {
        self.state()?
            .tests
            .get(&test_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Test {} not found", test_id)))
    }

    async fn update_test(&self, test: &Test, structural: bool) -> Result<Test> {
        let mut guard = self.state()?;
        let state = &mut *guard;
        if structural && state.submissions.values().any(|s| s.test_id == test.id) {
            return Err(Error::Conflict(
                "Cannot modify test with existing submissions".to_string(),
            ));
        }
        let stored = state
            .tests
            .get_mut(&test.id)
            .ok_or_else(|| Error::NotFound(format!("Test {} not found", test.id)))?;
        *stored = Test {
            updated_at: Utc::now(),
            ..test.clone()
        };
        Ok(stored.clone())
    }

    async fn delete_test(&self, test_id: Uuid) -> Result<bool> {
        Ok(self.state()?.tests.remove(&test_id).is_some())
    }

    async fn list_tests(
        &self,
        filter: &TestFilter,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<Test>, i64)> {
        let state = self.state()?;
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let mut items: Vec<Test> = state
            .tests
            .values()
            .filter(|t| filter.include_archived || !t.is_archived)
            .filter(|t| search.map_or(true, |s| matches_search(t, s)))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        let total = items.len() as i64;
        Ok((paginate(items, page, per_page), total))
    }

    async fn count_submissions(&self, test_id: Uuid) -> Result<i64> {
        let state = self.state()?;
        Ok(state
            .submissions
            .values()
            .filter(|s| s.test_id == test_id)
            .count() as i64)
    }

    async fn count_submissions_by_test(&self, test_ids: &[Uuid]) -> Result<HashMap<Uuid, i64>> {
        let state = self.state()?;
        let mut counts = HashMap::new();
        for submission in state.submissions.values() {
            if test_ids.contains(&submission.test_id) {
                *counts.entry(submission.test_id).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn insert_submission(&self, submission: &Submission) -> Result<Submission> {
        let mut state = self.state()?;
        let test = state
            .tests
            .get(&submission.test_id)
            .ok_or_else(|| Error::NotFound(format!("Test {} not found", submission.test_id)))?;
        if test.is_archived {
            return Err(Error::Conflict(
                "Archived tests cannot receive new submissions".to_string(),
            ));
        }
        state.submissions.insert(submission.id, submission.clone());
        state.answers.entry(submission.id).or_default();
        Ok(submission.clone())
    }

    async fn get_submission(&self, submission_id: Uuid) -> Result<Submission> {
        self.state()?
            .submissions
            .get(&submission_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Submission {} not found", submission_id)))
    }

    async fn get_submission_by_token(&self, access_token: &str) -> Result<Submission> {
        self.state()?
            .submissions
            .values()
            .find(|s| s.access_token == access_token)
            .cloned()
            .ok_or_else(|| Error::NotFound("Submission not found".to_string()))
    }

    async fn list_submissions(
        &self,
        filter: &SubmissionFilter,
        page: i64,
        limit: i64,
    ) -> Result<(Vec<Submission>, i64)> {
        let state = self.state()?;
        let mut items: Vec<Submission> = state
            .submissions
            .values()
            .filter(|s| filter.test_id.map_or(true, |id| s.test_id == id))
            .filter(|s| filter.status.map_or(true, |status| s.status == status))
            .filter(|s| {
                filter
                    .needs_review
                    .map_or(true, |flag| (s.status == SubmissionStatus::Completed) == flag)
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        let total = items.len() as i64;
        Ok((paginate(items, page, limit), total))
    }

    async fn list_answers(&self, submission_id: Uuid) -> Result<Vec<SubmissionAnswer>> {
        Ok(self
            .state()?
            .answers
            .get(&submission_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_submission(
        &self,
        expected: SubmissionStatus,
        submission: &Submission,
        answers: &[SubmissionAnswer],
    ) -> Result<Submission> {
        let mut guard = self.state()?;
        let state = &mut *guard;
        let stored = state
            .submissions
            .get_mut(&submission.id)
            .ok_or_else(|| Error::NotFound(format!("Submission {} not found", submission.id)))?;
        ensure_status(submission.id, stored.status, expected)?;

        let rows = state.answers.entry(submission.id).or_default();
        for answer in answers {
            upsert_row(rows, submission.id, answer);
        }

        *stored = Submission {
            updated_at: Utc::now(),
            ..submission.clone()
        };
        Ok(stored.clone())
    }

    async fn record_answer(
        &self,
        test: &Test,
        submission_id: Uuid,
        answer: &SubmissionAnswer,
    ) -> Result<Submission> {
        let mut guard = self.state()?;
        let state = &mut *guard;
        let stored = state
            .submissions
            .get_mut(&submission_id)
            .ok_or_else(|| Error::NotFound(format!("Submission {} not found", submission_id)))?;
        ensure_status(submission_id, stored.status, SubmissionStatus::InProgress)?;

        let rows = state.answers.entry(submission_id).or_default();
        upsert_row(rows, submission_id, answer);
        GradingService::refresh_aggregate(stored, test, rows.as_slice());
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn status_counts(&self) -> Result<HashMap<SubmissionStatus, i64>> {
        let state = self.state()?;
        let mut counts = HashMap::new();
        for submission in state.submissions.values() {
            *counts.entry(submission.status).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn insert_audit_log(&self, entry: &AuditLog) -> Result<AuditLog> {
        self.state()?.audit_logs.push(entry.clone());
        Ok(entry.clone())
    }

    async fn list_audit_logs(&self, entity_id: Option<Uuid>, limit: i64) -> Result<Vec<AuditLog>> {
        let state = self.state()?;
        Ok(state
            .audit_logs
            .iter()
            .rev()
            .filter(|e| entity_id.map_or(true, |id| e.entity_id == id))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}
