use crate::models::question::QuestionType;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateAnswerOption {
    pub id: Option<Uuid>,
    #[validate(length(max = 2000))]
    pub text: Option<String>,
    #[validate(length(max = 2048))]
    pub image_url: Option<String>,
    #[serde(default)]
    pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateQuestion {
    pub id: Option<Uuid>,
    #[validate(length(min = 1, message = "Question title cannot be empty"))]
    pub title: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[validate(range(min = 1, message = "Max score must be a positive integer"))]
    pub max_score: i32,
    pub media_url: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub answers: Vec<CreateAnswerOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateTestPayload {
    #[validate(length(min = 1, message = "Test name cannot be empty"))]
    pub name: String,
    pub description: Option<String>,
    #[validate(range(min = 1, message = "Duration must be at least 1 minute"))]
    pub duration_minutes: i32,
    #[validate(range(
        min = 0.0,
        max = 100.0,
        message = "Pass threshold must be between 0 and 100"
    ))]
    pub pass_threshold_percent: f64,
    pub show_results_to_candidate: Option<bool>,
    #[serde(default)]
    #[validate(nested)]
    pub questions: Vec<CreateQuestion>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateTestPayload {
    #[serde(default, deserialize_with = "trim_optional_string")]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "trim_optional_string")]
    pub description: Option<String>,

    #[validate(range(min = 1, message = "Duration must be at least 1 minute"))]
    pub duration_minutes: Option<i32>,

    #[validate(range(
        min = 0.0,
        max = 100.0,
        message = "Pass threshold must be between 0 and 100"
    ))]
    pub pass_threshold_percent: Option<f64>,

    pub show_results_to_candidate: Option<bool>,

    #[validate(nested)]
    pub questions: Option<Vec<CreateQuestion>>,
}

impl UpdateTestPayload {
    /// Edits that change how existing submissions would be graded.
    pub fn is_structural(&self) -> bool {
        self.questions.is_some() || self.pass_threshold_percent.is_some()
    }
}

// Trims strings and turns empty ones into None
fn trim_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }))
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CandidatePayload {
    pub id: Option<Uuid>,
    #[validate(length(min = 1, message = "Candidate name cannot be empty"))]
    pub name: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateSubmissionPayload {
    pub test_id: Uuid,
    #[validate(nested)]
    pub candidate: CandidatePayload,
}

/// Reviewer scores keyed by submission answer id.
#[derive(Debug, Clone, Deserialize)]
pub struct ManualScoresPayload {
    pub scores: HashMap<Uuid, Decimal>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ListTestsQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub include_archived: Option<bool>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ListSubmissionsQuery {
    pub test_id: Option<Uuid>,
    pub status: Option<String>,
    pub needs_review: Option<bool>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ListAuditLogsQuery {
    pub entity_id: Option<Uuid>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_submissions: i64,
    pub awaiting_review: i64,
    pub by_status: std::collections::BTreeMap<String, i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_payload_trims_blank_strings() {
        let payload: UpdateTestPayload =
            serde_json::from_str(r#"{"name": "   ", "description": " Notes "}"#).unwrap();
        assert_eq!(payload.name, None);
        assert_eq!(payload.description.as_deref(), Some("Notes"));
        assert!(!payload.is_structural());
    }

    #[test]
    fn threshold_and_questions_are_structural() {
        let payload: UpdateTestPayload =
            serde_json::from_str(r#"{"pass_threshold_percent": 60}"#).unwrap();
        assert!(payload.is_structural());

        let payload: UpdateTestPayload = serde_json::from_str(r#"{"questions": []}"#).unwrap();
        assert!(payload.is_structural());
    }

    #[test]
    fn create_payload_rejects_out_of_range_threshold() {
        let payload: CreateTestPayload = serde_json::from_value(serde_json::json!({
            "name": "Backend",
            "duration_minutes": 30,
            "pass_threshold_percent": 120.0,
        }))
        .unwrap();
        assert!(payload.validate().is_err());
    }

    #[test]
    fn nested_question_validation_applies() {
        let payload: CreateTestPayload = serde_json::from_value(serde_json::json!({
            "name": "Backend",
            "duration_minutes": 30,
            "pass_threshold_percent": 70.0,
            "questions": [{ "title": "Explain", "type": "OPEN_TEXT", "max_score": 0 }],
        }))
        .unwrap();
        assert!(payload.validate().is_err());
    }

    #[test]
    fn manual_scores_accept_numbers() {
        let id = Uuid::new_v4();
        let payload: ManualScoresPayload =
            serde_json::from_value(serde_json::json!({ "scores": { id.to_string(): 4 } })).unwrap();
        assert_eq!(payload.scores[&id], Decimal::from(4));
    }
}
