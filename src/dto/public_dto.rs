use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::question::{Question, QuestionType};
use crate::models::submission::{FinalResult, Submission, SubmissionAnswer, SubmissionStatus};
use crate::models::test::Test;

/// One candidate answer as sent by the test client.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AnswerPayload {
    pub question_id: Uuid,
    #[serde(default)]
    pub selected_answer_ids: Vec<Uuid>,
    #[validate(length(max = 20000, message = "Answer text is too long"))]
    pub open_text_answer: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct SubmitAnswersRequest {
    #[serde(default)]
    #[validate(nested)]
    pub answers: Vec<AnswerPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicAnswerOption {
    pub id: Uuid,
    pub text: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicQuestion {
    pub id: Uuid,
    pub title: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub max_score: i32,
    pub media_url: Option<String>,
    pub answers: Vec<PublicAnswerOption>,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id,
            title: q.title.clone(),
            question_type: q.question_type,
            max_score: q.max_score,
            media_url: q.media_url.clone(),
            answers: q
                .answers
                .iter()
                .map(|a| PublicAnswerOption {
                    id: a.id,
                    text: a.text.clone(),
                    image_url: a.image_url.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicTestView {
    pub name: String,
    pub description: Option<String>,
    pub duration_minutes: i32,
    pub total_questions: usize,
    pub pass_threshold_percent: Decimal,
    pub questions: Vec<PublicQuestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicSavedAnswer {
    pub question_id: Uuid,
    pub selected_answer_ids: Vec<Uuid>,
    pub open_text_answer: Option<String>,
}

impl From<&SubmissionAnswer> for PublicSavedAnswer {
    fn from(a: &SubmissionAnswer) -> Self {
        Self {
            question_id: a.question_id,
            selected_answer_ids: a.selected_answer_ids.clone(),
            open_text_answer: a.open_text_answer.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicSubmissionSummary {
    pub id: Uuid,
    pub status: SubmissionStatus,
    pub candidate_name: String,
    pub start_time: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetSubmissionByTokenResponse {
    pub test: PublicTestView,
    pub submission: PublicSubmissionSummary,
    pub saved_answers: Vec<PublicSavedAnswer>,
}

impl GetSubmissionByTokenResponse {
    /// Questions are only revealed once the submission is running.
    pub fn new(
        submission: &Submission,
        test: &Test,
        answers: &[SubmissionAnswer],
        deadline: Option<DateTime<Utc>>,
    ) -> Self {
        let questions = if submission.status == SubmissionStatus::InProgress {
            test.questions.iter().map(PublicQuestion::from).collect()
        } else {
            Vec::new()
        };
        Self {
            test: PublicTestView {
                name: test.name.clone(),
                description: test.description.clone(),
                duration_minutes: test.duration_minutes,
                total_questions: test.questions.len(),
                pass_threshold_percent: test.pass_threshold_percent,
                questions,
            },
            submission: PublicSubmissionSummary {
                id: submission.id,
                status: submission.status,
                candidate_name: submission.candidate_name.clone(),
                start_time: submission.start_time,
                deadline,
            },
            saved_answers: answers.iter().map(PublicSavedAnswer::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveAnswerResponse {
    pub saved: bool,
    pub question_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

/// Outcome shown to the candidate. Scores stay hidden unless the test
/// allows it and grading is finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateResultResponse {
    pub submission_id: Uuid,
    pub status: SubmissionStatus,
    pub show_results: bool,
    pub final_raw_score: Option<Decimal>,
    pub total_possible_score: Option<Decimal>,
    pub final_percent_score: Option<Decimal>,
    pub final_result: Option<FinalResult>,
    pub message: String,
}

impl CandidateResultResponse {
    pub fn new(submission: &Submission, test: &Test) -> Self {
        let show_results =
            test.show_results_to_candidate && submission.status == SubmissionStatus::Evaluated;
        let message = match submission.status {
            SubmissionStatus::PendingApproval => "Your test is waiting for approval",
            SubmissionStatus::InProgress => "Your test is in progress",
            SubmissionStatus::Completed => "Your answers were submitted and are awaiting review",
            SubmissionStatus::Evaluated if show_results => "Your test has been evaluated",
            SubmissionStatus::Evaluated => "Your test has been evaluated. HR will contact you",
            SubmissionStatus::Canceled => "This test was canceled",
        };

        Self {
            submission_id: submission.id,
            status: submission.status,
            show_results,
            final_raw_score: show_results.then_some(submission.final_raw_score),
            total_possible_score: show_results.then_some(submission.total_possible_score),
            final_percent_score: show_results.then_some(submission.final_percent_score),
            final_result: if show_results { submission.final_result } else { None },
            message: message.to_string(),
        }
    }
}
