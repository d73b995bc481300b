use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashSet;
use uuid::Uuid;

use crate::dto::public_dto::AnswerPayload;
use crate::error::{Error, Result};
use crate::models::question::Question;
use crate::models::submission::{FinalResult, Submission, SubmissionAnswer, SubmissionStatus};
use crate::models::test::Test;

pub struct GradingService;

impl GradingService {
    /// Rejects answers that do not fit their question. Runs before anything
    /// is scored, so an invalid selection never turns into a silent zero.
    pub fn validate_answer(question: &Question, answer: &AnswerPayload) -> Result<()> {
        if question.question_type.is_open() {
            if !answer.selected_answer_ids.is_empty() {
                return Err(Error::BadRequest(format!(
                    "Question {} is open text and does not accept selected answers",
                    question.id
                )));
            }
            return Ok(());
        }

        if answer.open_text_answer.is_some() {
            return Err(Error::BadRequest(format!(
                "Question {} is a choice question and does not accept free text",
                question.id
            )));
        }

        let mut seen = HashSet::new();
        for selected in &answer.selected_answer_ids {
            if !question.has_answer(*selected) {
                return Err(Error::BadRequest(format!(
                    "Answer {} does not belong to question {}",
                    selected, question.id
                )));
            }
            if !seen.insert(*selected) {
                return Err(Error::BadRequest(format!(
                    "Answer {} was selected more than once",
                    selected
                )));
            }
        }

        if question.question_type.is_single_choice() && answer.selected_answer_ids.len() > 1 {
            return Err(Error::BadRequest(format!(
                "Question {} accepts a single answer",
                question.id
            )));
        }

        Ok(())
    }

    /// Validates a whole batch: unknown or repeated questions fail the batch.
    pub fn validate_answers(test: &Test, answers: &[AnswerPayload]) -> Result<()> {
        let mut seen = HashSet::new();
        for answer in answers {
            let question = test.question(answer.question_id).ok_or_else(|| {
                Error::BadRequest(format!(
                    "Question {} is not part of this test",
                    answer.question_id
                ))
            })?;
            if !seen.insert(answer.question_id) {
                return Err(Error::BadRequest(format!(
                    "Question {} was answered more than once",
                    answer.question_id
                )));
            }
            Self::validate_answer(question, answer)?;
        }
        Ok(())
    }

    /// All-or-nothing score for a closed question.
    pub fn score_closed(question: &Question, selected: &[Uuid]) -> Decimal {
        let selected: HashSet<Uuid> = selected.iter().copied().collect();
        let correct = question.correct_answer_ids();
        if !selected.is_empty() && selected == correct {
            Decimal::from(question.max_score)
        } else {
            Decimal::ZERO
        }
    }

    /// Writes a candidate answer onto its row. Closed questions are scored and
    /// marked reviewed; open text waits for a reviewer at zero.
    pub fn apply_answer(question: &Question, row: &mut SubmissionAnswer, answer: &AnswerPayload) {
        if question.question_type.is_open() {
            row.selected_answer_ids.clear();
            row.open_text_answer = answer.open_text_answer.clone();
            row.assigned_score = Decimal::ZERO;
            row.is_reviewed = false;
        } else {
            row.selected_answer_ids = answer.selected_answer_ids.clone();
            row.open_text_answer = None;
            row.assigned_score = Self::score_closed(question, &row.selected_answer_ids);
            row.is_reviewed = true;
        }
    }

    /// Row for a question the candidate never answered.
    pub fn unanswered(question: &Question, submission_id: Uuid) -> SubmissionAnswer {
        let mut row = SubmissionAnswer::blank(submission_id, question.id);
        row.is_reviewed = !question.question_type.is_open();
        row
    }

    pub fn raw_score(answers: &[SubmissionAnswer]) -> Decimal {
        answers.iter().map(|a| a.assigned_score).sum()
    }

    /// `100 * raw / total`, rounded half-up to two decimals. Zero when the
    /// test has nothing to score.
    pub fn percent(raw: Decimal, total: Decimal) -> Decimal {
        if total <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        (raw * Decimal::ONE_HUNDRED / total)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }

    pub fn result_for(percent: Decimal, threshold: Decimal) -> FinalResult {
        if percent >= threshold {
            FinalResult::Pass
        } else {
            FinalResult::Fail
        }
    }

    /// Re-derives every aggregate field from the given rows. The result is
    /// only set once the submission is evaluated.
    pub fn refresh_aggregate(submission: &mut Submission, test: &Test, answers: &[SubmissionAnswer]) {
        let raw = Self::raw_score(answers);
        let total = test.total_possible_score();
        let percent = Self::percent(raw, total);

        submission.final_raw_score = raw;
        submission.total_possible_score = total;
        submission.final_percent_score = percent;
        submission.final_result = if submission.status == SubmissionStatus::Evaluated {
            Some(Self::result_for(percent, test.pass_threshold_percent))
        } else {
            None
        };
    }
}
