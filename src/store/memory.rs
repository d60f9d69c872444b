//! In-memory `RecordStore` for tests.
//!
//! Transactions run against a staged copy of the tables that replaces the live copy
//! only on success. `fail_on_answer` makes the n-th answer insert of every
//! transaction fail so rollback paths can be exercised.

use std::sync::{Mutex, MutexGuard};

use uuid::Uuid;

use crate::domain::{
    GridAnswer, NewGridAnswer, NewOption, NewQuestion, NewResponse, NewResponseAnswer, Question,
    QuestionCategory, QuestionChanges, QuestionOption, QuestionSummary, Response, ResponseAnswer,
    ShareToken,
};
use crate::error::{StoreError, StoreResult};

use super::{RecordStore, SubmissionTx};

#[derive(Clone, Default)]
struct Tables {
    categories: Vec<QuestionCategory>,
    questions: Vec<Question>,
    options: Vec<QuestionOption>,
    responses: Vec<NewResponse>,
    answers: Vec<NewResponseAnswer>,
    grid_answers: Vec<NewGridAnswer>,
    tokens: Vec<ShareToken>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_on_answer: Option<usize>,
    fail_token_update: bool,
    fail_load: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `n`-th (0-based) answer insert within each transaction.
    pub fn fail_on_answer(mut self, n: usize) -> Self {
        self.fail_on_answer = Some(n);
        self
    }

    pub fn fail_token_update(mut self) -> Self {
        self.fail_token_update = true;
        self
    }

    /// Make every response read fail while writes keep working.
    pub fn fail_load(mut self) -> Self {
        self.fail_load = true;
        self
    }

    pub fn add_token(&self, survey_id: &str, token_hash: &str, recipient_email: Option<&str>) {
        if let Ok(mut t) = self.tables.lock() {
            t.tokens.push(ShareToken {
                id: Uuid::new_v4().to_string(),
                survey_id: survey_id.into(),
                token_hash: token_hash.into(),
                recipient_email: recipient_email.map(str::to_string),
                recipient_mobile: None,
                used: false,
            });
        }
    }

    /// (responses, answers, grid answers) currently visible.
    pub fn row_counts(&self) -> (usize, usize, usize) {
        let t = self.tables.lock().expect("lock");
        (t.responses.len(), t.answers.len(), t.grid_answers.len())
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn with_category(mut q: Question, categories: &[QuestionCategory]) -> Question {
    q.category_type_name = q
        .category_id
        .as_deref()
        .and_then(|id| categories.iter().find(|c| c.id == id))
        .map(|c| c.type_name.clone());
    q
}

fn response_tree(t: &Tables, head: &NewResponse) -> Response {
    let response_answers = t
        .answers
        .iter()
        .filter(|a| a.response_id == head.id)
        .map(|a| ResponseAnswer {
            id: a.id.clone(),
            response_id: a.response_id.clone(),
            question_id: a.question_id.clone(),
            answer_type: a.answer_type.clone(),
            answer_value: a.answer_value.clone(),
            selected_option_ids: a.selected_option_ids.clone(),
            scale_rating_value: a.scale_rating_value,
            media: a.media.clone(),
            grid_answers: t
                .grid_answers
                .iter()
                .filter(|g| g.response_answer_id == a.id)
                .map(|g| GridAnswer {
                    id: g.id.clone(),
                    response_answer_id: g.response_answer_id.clone(),
                    row_option_id: g.row_option_id.clone(),
                    column_option_id: g.column_option_id.clone(),
                    selected: g.selected,
                })
                .collect(),
            question: t.questions.iter().find(|q| q.id == a.question_id).map(|q| {
                QuestionSummary {
                    id: q.id.clone(),
                    question_text: q.question_text.clone(),
                    question_type: q.question_type.clone(),
                    category_type_name: with_category(q.clone(), &t.categories).category_type_name,
                }
            }),
        })
        .collect();
    Response {
        id: head.id.clone(),
        survey_id: head.survey_id.clone(),
        user_metadata: head.user_metadata.clone(),
        created_at: head.created_at.clone(),
        response_answers,
    }
}

struct MemoryTx<'a> {
    staged: &'a mut Tables,
    answers_written: usize,
    fail_on_answer: Option<usize>,
}

impl SubmissionTx for MemoryTx<'_> {
    fn create_response(&mut self, response: &NewResponse) -> StoreResult<()> {
        self.staged.responses.push(response.clone());
        Ok(())
    }

    fn create_answer(&mut self, answer: &NewResponseAnswer) -> StoreResult<()> {
        if self.fail_on_answer == Some(self.answers_written) {
            return Err(StoreError::Unavailable(format!(
                "injected failure on answer {}",
                self.answers_written
            )));
        }
        self.answers_written += 1;
        self.staged.answers.push(answer.clone());
        Ok(())
    }

    fn create_grid_answers(&mut self, cells: &[NewGridAnswer]) -> StoreResult<usize> {
        self.staged.grid_answers.extend_from_slice(cells);
        Ok(cells.len())
    }
}

impl RecordStore for MemoryStore {
    fn create_category(&self, type_name: &str) -> StoreResult<QuestionCategory> {
        let category = QuestionCategory {
            id: Uuid::new_v4().to_string(),
            type_name: type_name.into(),
        };
        self.lock()?.categories.push(category.clone());
        Ok(category)
    }

    fn category_type_name(&self, category_id: &str) -> StoreResult<Option<String>> {
        let t = self.lock()?;
        Ok(t.categories
            .iter()
            .find(|c| c.id == category_id)
            .map(|c| c.type_name.clone()))
    }

    fn insert_question(&self, question: &NewQuestion) -> StoreResult<Question> {
        let mut t = self.lock()?;
        let q = Question {
            id: Uuid::new_v4().to_string(),
            survey_id: question.survey_id.clone(),
            question_text: question.question_text.clone(),
            question_type: question.question_type.clone(),
            order_index: question.order_index,
            required: question.required,
            category_id: question.category_id.clone(),
            media_id: question.media_id.clone(),
            category_type_name: None,
            created_at: "2026-01-01T00:00:00Z".into(),
        };
        t.questions.push(q.clone());
        Ok(with_category(q, &t.categories))
    }

    fn update_question(&self, id: &str, changes: &QuestionChanges) -> StoreResult<Option<Question>> {
        let mut t = self.lock()?;
        let Some(q) = t.questions.iter_mut().find(|q| q.id == id) else {
            return Ok(None);
        };
        if let Some(v) = &changes.question_text {
            q.question_text = v.clone();
        }
        if let Some(v) = &changes.question_type {
            q.question_type = Some(v.clone());
        }
        if let Some(v) = changes.order_index {
            q.order_index = v;
        }
        if let Some(v) = changes.required {
            q.required = v;
        }
        if let Some(v) = &changes.category_id {
            q.category_id = Some(v.clone());
        }
        if let Some(v) = &changes.media_id {
            q.media_id = Some(v.clone());
        }
        let q = q.clone();
        Ok(Some(with_category(q, &t.categories)))
    }

    fn delete_question(&self, id: &str) -> StoreResult<bool> {
        let mut t = self.lock()?;
        t.options.retain(|o| o.question_id != id);
        let before = t.questions.len();
        t.questions.retain(|q| q.id != id);
        Ok(t.questions.len() < before)
    }

    fn find_question(&self, id: &str) -> StoreResult<Option<Question>> {
        let t = self.lock()?;
        Ok(t.questions
            .iter()
            .find(|q| q.id == id)
            .cloned()
            .map(|q| with_category(q, &t.categories)))
    }

    fn list_questions(&self, survey_id: &str) -> StoreResult<Vec<Question>> {
        let t = self.lock()?;
        let mut questions: Vec<Question> = t
            .questions
            .iter()
            .filter(|q| q.survey_id == survey_id)
            .cloned()
            .map(|q| with_category(q, &t.categories))
            .collect();
        // Stable sort keeps insertion order between equal indexes.
        questions.sort_by_key(|q| q.order_index);
        Ok(questions)
    }

    fn insert_options(&self, options: &[NewOption]) -> StoreResult<usize> {
        let mut t = self.lock()?;
        for option in options {
            let position = t.options.iter().filter(|o| o.question_id == option.question_id).count() as i64;
            t.options.push(QuestionOption {
                id: Uuid::new_v4().to_string(),
                question_id: option.question_id.clone(),
                position,
                shape: option.shape.clone(),
            });
        }
        Ok(options.len())
    }

    fn delete_options(&self, question_id: &str) -> StoreResult<usize> {
        let mut t = self.lock()?;
        let before = t.options.len();
        t.options.retain(|o| o.question_id != question_id);
        Ok(before - t.options.len())
    }

    fn list_options(&self, question_id: &str) -> StoreResult<Vec<QuestionOption>> {
        let t = self.lock()?;
        Ok(t.options.iter().filter(|o| o.question_id == question_id).cloned().collect())
    }

    fn in_transaction(
        &self,
        work: &mut dyn FnMut(&mut dyn SubmissionTx) -> StoreResult<()>,
    ) -> StoreResult<()> {
        let mut live = self.lock()?;
        let mut staged = live.clone();
        let mut tx = MemoryTx {
            staged: &mut staged,
            answers_written: 0,
            fail_on_answer: self.fail_on_answer,
        };
        work(&mut tx)?;
        *live = staged;
        Ok(())
    }

    fn load_response(&self, id: &str) -> StoreResult<Option<Response>> {
        if self.fail_load {
            return Err(StoreError::Unavailable("responses table is unreadable".into()));
        }
        let t = self.lock()?;
        Ok(t.responses.iter().find(|r| r.id == id).map(|head| response_tree(&t, head)))
    }

    fn list_responses(&self, survey_id: &str) -> StoreResult<Vec<Response>> {
        let t = self.lock()?;
        Ok(t.responses
            .iter()
            .filter(|r| r.survey_id == survey_id)
            .map(|head| response_tree(&t, head))
            .collect())
    }

    fn find_unused_token(&self, token_hash: &str) -> StoreResult<Option<ShareToken>> {
        let t = self.lock()?;
        Ok(t.tokens
            .iter()
            .find(|tok| tok.token_hash == token_hash && !tok.used)
            .cloned())
    }

    fn mark_token_used(&self, token_hash: &str) -> StoreResult<usize> {
        if self.fail_token_update {
            return Err(StoreError::Unavailable("token table is read-only".into()));
        }
        let mut t = self.lock()?;
        let mut changed = 0;
        for tok in t.tokens.iter_mut().filter(|tok| tok.token_hash == token_hash) {
            tok.used = true;
            changed += 1;
        }
        Ok(changed)
    }
}
