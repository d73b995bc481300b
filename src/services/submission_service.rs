use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use crate::database::AssessmentStore;
use crate::dto::admin_dto::{CreateSubmissionPayload, DashboardStats, ManualScoresPayload};
use crate::dto::public_dto::{
    AnswerPayload, CandidateResultResponse, GetSubmissionByTokenResponse, SubmitAnswersRequest,
};
use crate::error::{Error, Result};
use crate::models::submission::{
    Submission, SubmissionAnswer, SubmissionDetail, SubmissionFilter, SubmissionStatus,
};
use crate::models::test::Test;
use crate::services::grading_service::GradingService;
use crate::utils::token::generate_access_token;

const ACCESS_TOKEN_LENGTH: usize = 32;
/// Matches the `NUMERIC(12, 2)` score columns.
const SCORE_DECIMALS: u32 = 2;

#[derive(Debug, serde::Serialize)]
pub struct PaginatedSubmissions {
    pub items: Vec<Submission>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

#[derive(Clone)]
pub struct SubmissionService {
    store: Arc<dyn AssessmentStore>,
}

impl SubmissionService {
    pub fn new(store: Arc<dyn AssessmentStore>) -> Self {
        Self { store }
    }

    pub async fn create_submission(&self, payload: CreateSubmissionPayload) -> Result<Submission> {
        let test = self.store.get_test(payload.test_id).await?;
        if test.is_archived {
            return Err(Error::Conflict(
                "Archived tests cannot receive new submissions".to_string(),
            ));
        }

        let now = Utc::now();
        let submission = Submission {
            id: Uuid::new_v4(),
            test_id: test.id,
            candidate_id: payload.candidate.id.unwrap_or_else(Uuid::new_v4),
            candidate_name: payload.candidate.name.trim().to_string(),
            candidate_email: payload.candidate.email.trim().to_lowercase(),
            access_token: generate_access_token(ACCESS_TOKEN_LENGTH),
            status: SubmissionStatus::PendingApproval,
            start_time: None,
            end_time: None,
            final_raw_score: Decimal::ZERO,
            total_possible_score: test.total_possible_score(),
            final_percent_score: Decimal::ZERO,
            final_result: None,
            created_at: now,
            updated_at: now,
        };

        let submission = self.store.insert_submission(&submission).await?;
        tracing::info!(submission_id = %submission.id, test_id = %test.id, "submission created");
        Ok(submission)
    }

    pub async fn approve_submission(&self, submission_id: Uuid) -> Result<Submission> {
        let mut submission = self.store.get_submission(submission_id).await?;
        if submission.status != SubmissionStatus::PendingApproval {
            return Err(Error::Conflict(format!(
                "Cannot approve a submission in status {}",
                submission.status
            )));
        }
        submission.status = SubmissionStatus::InProgress;
        submission.start_time = Some(Utc::now());
        self.store
            .save_submission(SubmissionStatus::PendingApproval, &submission, &[])
            .await
    }

    pub async fn cancel_submission(&self, submission_id: Uuid) -> Result<Submission> {
        let mut submission = self.store.get_submission(submission_id).await?;
        let current = submission.status;
        if !matches!(
            submission.status,
            SubmissionStatus::PendingApproval | SubmissionStatus::InProgress
        ) {
            return Err(Error::Conflict(format!(
                "Cannot cancel a submission in status {}",
                submission.status
            )));
        }
        submission.status = SubmissionStatus::Canceled;
        submission.end_time = Some(Utc::now());
        self.store.save_submission(current, &submission, &[]).await
    }

    /// Submission with its answers in question order.
    pub async fn get_submission_detail(&self, submission_id: Uuid) -> Result<SubmissionDetail> {
        let submission = self.store.get_submission(submission_id).await?;
        let test = self.store.get_test(submission.test_id).await?;
        let answers = ordered_answers(&test, self.store.list_answers(submission_id).await?);
        Ok(SubmissionDetail {
            submission,
            answers,
        })
    }

    pub async fn list_submissions(
        &self,
        filter: SubmissionFilter,
        page: i64,
        limit: i64,
    ) -> Result<PaginatedSubmissions> {
        let page = page.max(1);
        let limit = limit.clamp(1, 100);
        let (items, total) = self.store.list_submissions(&filter, page, limit).await?;
        let total_pages = ((total as f64) / (limit as f64)).ceil() as i64;
        Ok(PaginatedSubmissions {
            items,
            total,
            page,
            limit,
            total_pages,
        })
    }

    pub async fn get_by_token(&self, token: &str) -> Result<GetSubmissionByTokenResponse> {
        let submission = self.store.get_submission_by_token(token).await?;
        let test = self.store.get_test(submission.test_id).await?;
        let answers = ordered_answers(&test, self.store.list_answers(submission.id).await?);
        let deadline = deadline(&submission, &test);
        Ok(GetSubmissionByTokenResponse::new(
            &submission,
            &test,
            &answers,
            deadline,
        ))
    }

    /// Records and scores one answer while the candidate is working. The
    /// stored aggregate is recomputed with it, so the running raw score is
    /// always the sum of the saved answers.
    pub async fn save_answer(&self, token: &str, payload: AnswerPayload) -> Result<DateTime<Utc>> {
        let submission = self.store.get_submission_by_token(token).await?;
        let test = self.store.get_test(submission.test_id).await?;
        ensure_in_progress(&submission)?;

        let now = Utc::now();
        if deadline(&submission, &test).is_some_and(|d| now > d) {
            return Err(Error::Conflict("Time limit for this test has expired".to_string()));
        }

        let question = test.question(payload.question_id).ok_or_else(|| {
            Error::BadRequest(format!(
                "Question {} is not part of this test",
                payload.question_id
            ))
        })?;
        GradingService::validate_answer(question, &payload)?;

        let mut row = SubmissionAnswer::blank(submission.id, question.id);
        GradingService::apply_answer(question, &mut row, &payload);
        let saved = self.store.record_answer(&test, submission.id, &row).await?;

        tracing::debug!(
            submission_id = %saved.id,
            question_id = %question.id,
            raw_score = %saved.final_raw_score,
            "answer saved"
        );
        Ok(now)
    }

    /// Finalizes a submission: merges the payload over saved answers, fills
    /// unanswered questions, scores closed answers and derives the aggregate.
    pub async fn submit_answers(
        &self,
        token: &str,
        payload: SubmitAnswersRequest,
    ) -> Result<Submission> {
        let submission = self.store.get_submission_by_token(token).await?;
        let test = self.store.get_test(submission.test_id).await?;
        ensure_in_progress(&submission)?;

        let now = Utc::now();
        let late = deadline(&submission, &test).is_some_and(|d| now > d);
        let incoming = if late {
            tracing::warn!(
                submission_id = %submission.id,
                ignored_answers = payload.answers.len(),
                "submission received after the time limit; keeping saved answers only"
            );
            Vec::new()
        } else {
            GradingService::validate_answers(&test, &payload.answers)?;
            payload.answers
        };

        let mut by_question: HashMap<Uuid, SubmissionAnswer> = self
            .store
            .list_answers(submission.id)
            .await?
            .into_iter()
            .map(|a| (a.question_id, a))
            .collect();

        let mut rows = Vec::with_capacity(test.questions.len());
        for question in &test.questions {
            let mut row = by_question
                .remove(&question.id)
                .unwrap_or_else(|| GradingService::unanswered(question, submission.id));
            if let Some(answer) = incoming.iter().find(|a| a.question_id == question.id) {
                GradingService::apply_answer(question, &mut row, answer);
            } else if !question.question_type.is_open() {
                // rescore saved closed answers against the current options
                row.assigned_score =
                    GradingService::score_closed(question, &row.selected_answer_ids);
                row.is_reviewed = true;
            }
            rows.push(row);
        }

        let mut finished = submission.clone();
        finished.end_time = Some(now);
        finished.status = if test.has_open_questions() {
            SubmissionStatus::Completed
        } else {
            SubmissionStatus::Evaluated
        };
        GradingService::refresh_aggregate(&mut finished, &test, &rows);

        let saved = self
            .store
            .save_submission(SubmissionStatus::InProgress, &finished, &rows)
            .await?;
        tracing::info!(
            submission_id = %saved.id,
            status = %saved.status,
            raw_score = %saved.final_raw_score,
            "submission finalized"
        );
        Ok(saved)
    }

    /// Applies reviewer scores to open text answers. Every entry is checked
    /// before anything is written.
    pub async fn update_manual_scores(
        &self,
        submission_id: Uuid,
        payload: ManualScoresPayload,
    ) -> Result<Submission> {
        if payload.scores.is_empty() {
            return Err(Error::BadRequest("No scores provided".to_string()));
        }

        let submission = self.store.get_submission(submission_id).await?;
        if !submission.status.accepts_manual_scores() {
            return Err(Error::Conflict(format!(
                "Cannot score a submission in status {}",
                submission.status
            )));
        }
        let test = self.store.get_test(submission.test_id).await?;
        let mut rows = self.store.list_answers(submission_id).await?;

        for (answer_id, score) in &payload.scores {
            let row = rows.iter().find(|r| r.id == *answer_id).ok_or_else(|| {
                Error::NotFound(format!(
                    "Answer {} does not belong to submission {}",
                    answer_id, submission_id
                ))
            })?;
            let question = test.question(row.question_id).ok_or_else(|| {
                Error::Internal(format!(
                    "Answer {} references question {} missing from test {}",
                    answer_id, row.question_id, test.id
                ))
            })?;
            if !question.question_type.is_open() {
                return Err(Error::BadRequest(format!(
                    "Answer {} belongs to an auto-scored question",
                    answer_id
                )));
            }
            if *score < Decimal::ZERO || *score > Decimal::from(question.max_score) {
                return Err(Error::BadRequest(format!(
                    "Score {} for answer {} must be between 0 and {}",
                    score, answer_id, question.max_score
                )));
            }
            if score.normalize().scale() > SCORE_DECIMALS {
                return Err(Error::BadRequest(format!(
                    "Score {} for answer {} has more than {} decimal places",
                    score, answer_id, SCORE_DECIMALS
                )));
            }
        }

        for row in rows.iter_mut() {
            if let Some(score) = payload.scores.get(&row.id) {
                row.assigned_score = *score;
                row.is_reviewed = true;
            }
        }

        let mut updated = submission.clone();
        updated.status = if rows.iter().all(|r| r.is_reviewed) {
            SubmissionStatus::Evaluated
        } else {
            SubmissionStatus::Completed
        };
        GradingService::refresh_aggregate(&mut updated, &test, &rows);

        let saved = self
            .store
            .save_submission(submission.status, &updated, &rows)
            .await?;
        tracing::info!(
            submission_id = %saved.id,
            status = %saved.status,
            percent = %saved.final_percent_score,
            "manual scores applied"
        );
        Ok(saved)
    }

    pub async fn candidate_result(&self, token: &str) -> Result<CandidateResultResponse> {
        let submission = self.store.get_submission_by_token(token).await?;
        let test = self.store.get_test(submission.test_id).await?;
        Ok(CandidateResultResponse::new(&submission, &test))
    }

    pub async fn dashboard_stats(&self) -> Result<DashboardStats> {
        let counts = self.store.status_counts().await?;
        let by_status: BTreeMap<String, i64> = SubmissionStatus::ALL
            .into_iter()
            .map(|s| (s.as_str().to_string(), counts.get(&s).copied().unwrap_or(0)))
            .collect();
        Ok(DashboardStats {
            total_submissions: counts.values().sum(),
            awaiting_review: counts
                .get(&SubmissionStatus::Completed)
                .copied()
                .unwrap_or(0),
            by_status,
        })
    }
}

/// Latest moment answers are accepted. None until the submission starts.
pub fn deadline(submission: &Submission, test: &Test) -> Option<DateTime<Utc>> {
    submission
        .start_time
        .map(|start| start + Duration::minutes(i64::from(test.duration_minutes)))
}

fn ensure_in_progress(submission: &Submission) -> Result<()> {
    if submission.status != SubmissionStatus::InProgress {
        return Err(Error::Conflict(format!(
            "Answers cannot be recorded while the submission is {}",
            submission.status
        )));
    }
    Ok(())
}

fn ordered_answers(test: &Test, mut answers: Vec<SubmissionAnswer>) -> Vec<SubmissionAnswer> {
    let position: HashMap<Uuid, usize> = test
        .questions
        .iter()
        .enumerate()
        .map(|(i, q)| (q.id, i))
        .collect();
    answers.sort_by_key(|a| position.get(&a.question_id).copied().unwrap_or(usize::MAX));
    answers
}
