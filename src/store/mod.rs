//! Record store capability.
//!
//! The intake operations never touch a concrete database; they receive a
//! `&dyn RecordStore`. `SqliteStore` is the durable implementation and
//! `MemoryStore` an in-process fake with failure injection for tests.

use crate::domain::{
    NewGridAnswer, NewOption, NewQuestion, NewResponse, NewResponseAnswer, Question,
    QuestionCategory, QuestionChanges, QuestionOption, Response, ShareToken,
};
use crate::error::StoreResult;

pub mod sqlite;
#[cfg(test)]
pub mod memory;

pub use sqlite::SqliteStore;

/// Writes available inside one submission transaction.
pub trait SubmissionTx {
    fn create_response(&mut self, response: &NewResponse) -> StoreResult<()>;
    fn create_answer(&mut self, answer: &NewResponseAnswer) -> StoreResult<()>;
    fn create_grid_answers(&mut self, cells: &[NewGridAnswer]) -> StoreResult<usize>;
}

pub trait RecordStore: Send + Sync {
    fn create_category(&self, type_name: &str) -> StoreResult<QuestionCategory>;
    fn category_type_name(&self, category_id: &str) -> StoreResult<Option<String>>;

    fn insert_question(&self, question: &NewQuestion) -> StoreResult<Question>;
    /// Returns `None` when the question does not exist.
    fn update_question(&self, id: &str, changes: &QuestionChanges) -> StoreResult<Option<Question>>;
    /// Returns whether a question was deleted.
    fn delete_question(&self, id: &str) -> StoreResult<bool>;
    /// Question joined with its category type name.
    fn find_question(&self, id: &str) -> StoreResult<Option<Question>>;
    /// Questions of one survey ordered by `order_index`.
    fn list_questions(&self, survey_id: &str) -> StoreResult<Vec<Question>>;

    /// Bulk insert; records keep their slice order as `position`.
    fn insert_options(&self, options: &[NewOption]) -> StoreResult<usize>;
    fn delete_options(&self, question_id: &str) -> StoreResult<usize>;
    fn list_options(&self, question_id: &str) -> StoreResult<Vec<QuestionOption>>;

    /// Run `work` atomically: commit if it returns `Ok`, roll back every write otherwise.
    fn in_transaction(
        &self,
        work: &mut dyn FnMut(&mut dyn SubmissionTx) -> StoreResult<()>,
    ) -> StoreResult<()>;
    fn load_response(&self, id: &str) -> StoreResult<Option<Response>>;
    /// Every response tree of one survey, oldest first.
    fn list_responses(&self, survey_id: &str) -> StoreResult<Vec<Response>>;

    fn find_unused_token(&self, token_hash: &str) -> StoreResult<Option<ShareToken>>;
    fn mark_token_used(&self, token_hash: &str) -> StoreResult<usize>;
}
