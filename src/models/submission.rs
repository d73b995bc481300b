use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    PendingApproval,
    InProgress,
    Completed,
    Evaluated,
    Canceled,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalResult {
    Pass,
    Fail,
}

impl SubmissionStatus {
    pub const ALL: [SubmissionStatus; 5] = [
        SubmissionStatus::PendingApproval,
        SubmissionStatus::InProgress,
        SubmissionStatus::Completed,
        SubmissionStatus::Evaluated,
        SubmissionStatus::Canceled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionStatus::PendingApproval => "PENDING_APPROVAL",
            SubmissionStatus::InProgress => "IN_PROGRESS",
            SubmissionStatus::Completed => "COMPLETED",
            SubmissionStatus::Evaluated => "EVALUATED",
            SubmissionStatus::Canceled => "CANCELED",
        }
    }

    /// Statuses in which a reviewer may (re)score open text answers.
    pub fn accepts_manual_scores(self) -> bool {
        matches!(self, SubmissionStatus::Completed | SubmissionStatus::Evaluated)
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        SubmissionStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown submission status '{}'", s))
    }
}

impl FinalResult {
    pub fn as_str(self) -> &'static str {
        match self {
            FinalResult::Pass => "PASS",
            FinalResult::Fail => "FAIL",
        }
    }
}

impl FromStr for FinalResult {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "PASS" => Ok(FinalResult::Pass),
            "FAIL" => Ok(FinalResult::Fail),
            other => Err(format!("unknown final result '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Submission {
    pub id: Uuid,
    pub test_id: Uuid,
    pub candidate_id: Uuid,
    pub candidate_name: String,
    pub candidate_email: String,
    #[serde(skip_serializing, default)]
    pub access_token: String,
    pub status: SubmissionStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub final_raw_score: Decimal,
    pub total_possible_score: Decimal,
    pub final_percent_score: Decimal,
    pub final_result: Option<FinalResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmissionAnswer {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub question_id: Uuid,
    pub selected_answer_ids: Vec<Uuid>,
    pub open_text_answer: Option<String>,
    pub assigned_score: Decimal,
    pub is_reviewed: bool,
}

impl SubmissionAnswer {
    pub fn blank(submission_id: Uuid, question_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            submission_id,
            question_id,
            selected_answer_ids: Vec::new(),
            open_text_answer: None,
            assigned_score: Decimal::ZERO,
            is_reviewed: false,
        }
    }
}

/// A submission together with its per-question answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionDetail {
    #[serde(flatten)]
    pub submission: Submission,
    pub answers: Vec<SubmissionAnswer>,
}

#[derive(Debug, Clone, Default)]
pub struct SubmissionFilter {
    pub test_id: Option<Uuid>,
    pub status: Option<SubmissionStatus>,
    pub needs_review: Option<bool>,
}
