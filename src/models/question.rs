use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Question {
    pub id: Uuid,
    pub title: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub max_score: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(default)]
    pub answers: Vec<AnswerOption>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionType {
    SingleChoiceText,
    MultipleChoiceText,
    SingleChoiceImage,
    MultipleChoiceImage,
    OpenText,
}

/// A selectable option of a closed question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerOption {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub is_correct: bool,
}

impl QuestionType {
    pub fn is_open(self) -> bool {
        matches!(self, QuestionType::OpenText)
    }

    pub fn is_single_choice(self) -> bool {
        matches!(
            self,
            QuestionType::SingleChoiceText | QuestionType::SingleChoiceImage
        )
    }

    pub fn is_multiple_choice(self) -> bool {
        matches!(
            self,
            QuestionType::MultipleChoiceText | QuestionType::MultipleChoiceImage
        )
    }

    pub fn uses_images(self) -> bool {
        matches!(
            self,
            QuestionType::SingleChoiceImage | QuestionType::MultipleChoiceImage
        )
    }
}

impl Question {
    pub fn correct_answer_ids(&self) -> HashSet<Uuid> {
        self.answers
            .iter()
            .filter(|a| a.is_correct)
            .map(|a| a.id)
            .collect()
    }

    pub fn has_answer(&self, answer_id: Uuid) -> bool {
        self.answers.iter().any(|a| a.id == answer_id)
    }

    /// Checks the authoring rules for this question type.
    pub fn validate_structure(&self) -> Result<()> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(Error::BadRequest("Question title cannot be empty".to_string()));
        }
        if self.max_score < 1 {
            return Err(Error::BadRequest(format!(
                "Question '{}' must have a positive max score",
                title
            )));
        }

        if self.question_type.is_open() {
            if !self.answers.is_empty() {
                return Err(Error::BadRequest(format!(
                    "Open text question '{}' cannot have answer options",
                    title
                )));
            }
            return Ok(());
        }

        if self.answers.len() < 2 {
            return Err(Error::BadRequest(format!(
                "Question '{}' needs at least two answer options",
                title
            )));
        }

        let mut seen = HashSet::new();
        for answer in &self.answers {
            if !seen.insert(answer.id) {
                return Err(Error::BadRequest(format!(
                    "Question '{}' has duplicate answer id {}",
                    title, answer.id
                )));
            }
            if self.question_type.uses_images() {
                if answer.image_url.as_deref().map_or(true, |u| u.trim().is_empty()) {
                    return Err(Error::BadRequest(format!(
                        "Image question '{}' has an option without an image",
                        title
                    )));
                }
            } else if answer.text.as_deref().map_or(true, |t| t.trim().is_empty()) {
                return Err(Error::BadRequest(format!(
                    "Question '{}' has an option without text",
                    title
                )));
            }
        }

        let correct = self.answers.iter().filter(|a| a.is_correct).count();
        if self.question_type.is_single_choice() && correct != 1 {
            return Err(Error::BadRequest(format!(
                "Single choice question '{}' must have exactly one correct answer, found {}",
                title, correct
            )));
        }
        if self.question_type.is_multiple_choice() && correct == 0 {
            return Err(Error::BadRequest(format!(
                "Multiple choice question '{}' must have at least one correct answer",
                title
            )));
        }

        Ok(())
    }

    /// Same question content under fresh ids.
    pub fn duplicate(&self) -> Question {
        Question {
            id: Uuid::new_v4(),
            title: self.title.clone(),
            question_type: self.question_type,
            max_score: self.max_score,
            media_url: self.media_url.clone(),
            answers: self
                .answers
                .iter()
                .map(|a| AnswerOption {
                    id: Uuid::new_v4(),
                    text: a.text.clone(),
                    image_url: a.image_url.clone(),
                    is_correct: a.is_correct,
                })
                .collect(),
        }
    }
}
