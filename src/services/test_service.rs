use chrono::Utc;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::database::AssessmentStore;
use crate::dto::admin_dto::{CreateQuestion, CreateTestPayload, UpdateTestPayload};
use crate::error::{Error, Result};
use crate::models::question::{AnswerOption, Question};
use crate::models::test::{Test, TestFilter, TestSummary};

#[derive(Debug, serde::Serialize)]
pub struct PaginatedTests {
    pub items: Vec<TestSummary>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

#[derive(Clone)]
pub struct TestService {
    store: Arc<dyn AssessmentStore>,
}

impl TestService {
    pub fn new(store: Arc<dyn AssessmentStore>) -> Self {
        Self { store }
    }

    pub async fn create_test(&self, payload: CreateTestPayload) -> Result<Test> {
        let now = Utc::now();
        let test = Test {
            id: Uuid::new_v4(),
            name: payload.name.trim().to_string(),
            description: payload.description,
            duration_minutes: payload.duration_minutes,
            pass_threshold_percent: threshold_from_f64(payload.pass_threshold_percent)?,
            show_results_to_candidate: payload.show_results_to_candidate.unwrap_or(false),
            questions: build_questions(payload.questions)?,
            is_archived: false,
            archived_at: None,
            version: 1,
            previous_version_id: None,
            created_at: now,
            updated_at: now,
        };
        let test = self.store.insert_test(&test).await?;
        tracing::info!(test_id = %test.id, questions = test.questions.len(), "test created");
        Ok(test)
    }

    pub async fn get_test(&self, test_id: Uuid) -> Result<Test> {
        self.store.get_test(test_id).await
    }

    /// The test together with how many submissions reference it.
    pub async fn get_test_with_count(&self, test_id: Uuid) -> Result<(Test, i64)> {
        let test = self.store.get_test(test_id).await?;
        let count = self.store.count_submissions(test_id).await?;
        Ok((test, count))
    }

    pub async fn list_tests(
        &self,
        filter: TestFilter,
        page: i64,
        per_page: i64,
    ) -> Result<PaginatedTests> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);
        let (tests, total) = self.store.list_tests(&filter, page, per_page).await?;

        let ids: Vec<Uuid> = tests.iter().map(|t| t.id).collect();
        let counts = self.store.count_submissions_by_test(&ids).await?;
        let items = tests
            .iter()
            .map(|t| TestSummary::from_test(t, counts.get(&t.id).copied().unwrap_or(0)))
            .collect();

        let total_pages = ((total as f64) / (per_page as f64)).ceil() as i64;

        Ok(PaginatedTests {
            items,
            total,
            page,
            per_page,
            total_pages,
        })
    }

    /// Applies an edit. Once a test has submissions its questions and pass
    /// threshold are frozen; use `archive_and_duplicate` to change them.
    pub async fn update_test(&self, test_id: Uuid, payload: UpdateTestPayload) -> Result<Test> {
        let mut test = self.store.get_test(test_id).await?;
        if test.is_archived {
            return Err(Error::Conflict("Archived tests are read-only".to_string()));
        }

        let structural = payload.is_structural();

        if let Some(name) = payload.name {
            test.name = name;
        }
        if let Some(description) = payload.description {
            test.description = Some(description);
        }
        if let Some(duration) = payload.duration_minutes {
            test.duration_minutes = duration;
        }
        if let Some(show) = payload.show_results_to_candidate {
            test.show_results_to_candidate = show;
        }
        if let Some(threshold) = payload.pass_threshold_percent {
            test.pass_threshold_percent = threshold_from_f64(threshold)?;
        }
        if let Some(questions) = payload.questions {
            test.questions = build_questions(questions)?;
        }

        self.store.update_test(&test, structural).await
    }

    /// Marks a test read-only. Archiving twice keeps the first timestamp.
    pub async fn archive_test(&self, test_id: Uuid) -> Result<Test> {
        let mut test = self.store.get_test(test_id).await?;
        if test.is_archived {
            return Ok(test);
        }
        test.is_archived = true;
        test.archived_at = Some(Utc::now());
        let test = self.store.update_test(&test, false).await?;
        tracing::info!(test_id = %test.id, "test archived");
        Ok(test)
    }

    /// Independent copy of a test under fresh ids, starting its own version line.
    pub async fn duplicate_test(&self, test_id: Uuid) -> Result<Test> {
        let source = self.store.get_test(test_id).await?;
        let mut copy = fresh_copy(&source);
        copy.name = format!("{} (copy)", source.name);
        self.store.insert_test(&copy).await
    }

    /// Creates the next version of a test and archives the current one.
    /// Existing submissions keep pointing at the archived original.
    pub async fn archive_and_duplicate(&self, test_id: Uuid) -> Result<Test> {
        let source = self.store.get_test(test_id).await?;
        if source.is_archived {
            return Err(Error::Conflict(
                "Test is already archived; duplicate its latest version instead".to_string(),
            ));
        }

        let mut next = fresh_copy(&source);
        next.version = source.version + 1;
        next.previous_version_id = Some(source.id);
        let next = self.store.insert_test(&next).await?;

        self.archive_test(source.id).await?;
        tracing::info!(
            test_id = %source.id,
            new_test_id = %next.id,
            version = next.version,
            "test archived and duplicated"
        );
        Ok(next)
    }

    pub async fn delete_test(&self, test_id: Uuid) -> Result<()> {
        self.store.get_test(test_id).await?;
        if self.store.count_submissions(test_id).await? > 0 {
            return Err(Error::Conflict(
                "Cannot delete test with existing submissions; archive it instead".to_string(),
            ));
        }
        if !self.store.delete_test(test_id).await? {
            return Err(Error::NotFound(format!("Test {} not found", test_id)));
        }
        Ok(())
    }
}

fn threshold_from_f64(value: f64) -> Result<Decimal> {
    let threshold = Decimal::from_f64(value)
        .ok_or_else(|| Error::BadRequest("Invalid pass threshold".to_string()))?
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    if threshold < Decimal::ZERO || threshold > Decimal::ONE_HUNDRED {
        return Err(Error::BadRequest(
            "Pass threshold must be between 0 and 100".to_string(),
        ));
    }
    Ok(threshold)
}

fn build_questions(payload: Vec<CreateQuestion>) -> Result<Vec<Question>> {
    let mut seen = HashSet::new();
    let mut questions = Vec::with_capacity(payload.len());
    for q in payload {
        let question = Question {
            id: q.id.unwrap_or_else(Uuid::new_v4),
            title: q.title.trim().to_string(),
            question_type: q.question_type,
            max_score: q.max_score,
            media_url: q.media_url,
            answers: q
                .answers
                .into_iter()
                .map(|a| AnswerOption {
                    id: a.id.unwrap_or_else(Uuid::new_v4),
                    text: a.text,
                    image_url: a.image_url,
                    is_correct: a.is_correct,
                })
                .collect(),
        };
        question.validate_structure()?;
        if !seen.insert(question.id) {
            return Err(Error::BadRequest(format!(
                "Duplicate question id {}",
                question.id
            )));
        }
        questions.push(question);
    }
    Ok(questions)
}

fn fresh_copy(source: &Test) -> Test {
    let now = Utc::now();
    Test {
        id: Uuid::new_v4(),
        name: source.name.clone(),
        description: source.description.clone(),
        duration_minutes: source.duration_minutes,
        pass_threshold_percent: source.pass_threshold_percent,
        show_results_to_candidate: source.show_results_to_candidate,
        questions: source.questions.iter().map(Question::duplicate).collect(),
        is_archived: false,
        archived_at: None,
        version: 1,
        previous_version_id: None,
        created_at: now,
        updated_at: now,
    }
}
