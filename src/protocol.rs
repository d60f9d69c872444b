//! Public request/response DTOs for the HTTP API (serde ready).
//! Inbound shapes follow the field names survey clients already send.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{NewQuestion, QuestionCategory, QuestionChanges, QuestionWithOptions, Response};

#[derive(Debug, Deserialize)]
pub struct CategoryIn {
    pub type_name: String,
}
#[derive(Serialize)]
pub struct CategoryOut {
    pub message: &'static str,
    pub category: QuestionCategory,
}

/// `options` is a list of loosely-shaped descriptors; which fields matter depends
/// on the question's category.
#[derive(Debug, Deserialize)]
pub struct CreateQuestionIn {
    #[serde(flatten)]
    pub question: NewQuestion,
    #[serde(default)]
    pub options: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuestionIn {
    #[serde(flatten)]
    pub changes: QuestionChanges,
    #[serde(default)]
    pub options: Vec<Value>,
}

#[derive(Serialize)]
pub struct QuestionOut {
    pub message: &'static str,
    pub question: QuestionWithOptions,
}

/// `answers` entries are kept as raw JSON here and read one by one during ingestion,
/// so a malformed entry cannot reject the whole body.
#[derive(Debug, Deserialize)]
pub struct SubmitResponseIn {
    #[serde(rename = "surveyId", alias = "survey_id")]
    pub survey_id: String,
    #[serde(default)]
    pub user_metadata: Option<Map<String, Value>>,
    #[serde(default)]
    pub answers: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct TokenSubmitIn {
    pub token: String,
    #[serde(default)]
    pub user_metadata: Option<Map<String, Value>>,
    #[serde(default)]
    pub answers: Vec<Value>,
}

#[derive(Serialize)]
pub struct SubmitOut {
    pub message: &'static str,
    pub response: Response,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_question_ids: Vec<String>,
}

#[derive(Serialize)]
pub struct ResponseOut {
    pub message: &'static str,
    pub data: Response,
}

#[derive(Serialize)]
pub struct QuestionListOut {
    pub message: &'static str,
    pub questions: Vec<QuestionWithOptions>,
}

#[derive(Serialize)]
pub struct ResponseListOut {
    pub message: &'static str,
    pub data: Vec<Response>,
}

#[derive(Serialize)]
pub struct MessageOut {
    pub message: &'static str,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}
