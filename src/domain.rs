//! Domain records: questions with their category-shaped options, responses with
//! their answers and grid cells, and share tokens.
//!
//! Field names on the wire follow the survey API the frontend already speaks
//! (`surveyId`, `answer_value`, `scaleRatingValue`, ...).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A question category as stored by the resolver table.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct QuestionCategory {
  pub id: String,
  pub type_name: String,
}

/// Fields supplied when a question is created.
#[derive(Clone, Debug, Deserialize)]
pub struct NewQuestion {
  #[serde(rename = "surveyId", alias = "survey_id")]
  pub survey_id: String,
  pub question_text: String,
  #[serde(default)] pub question_type: Option<String>,
  #[serde(default)] pub order_index: i64,
  #[serde(default = "default_required")] pub required: bool,
  #[serde(default, rename = "categoryId", alias = "category_id")]
  pub category_id: Option<String>,
  #[serde(default, rename = "mediaId", alias = "media_id")]
  pub media_id: Option<String>,
}

fn default_required() -> bool { true }

/// Partial update: absent fields keep their stored value.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct QuestionChanges {
  #[serde(default)] pub question_text: Option<String>,
  #[serde(default)] pub question_type: Option<String>,
  #[serde(default)] pub order_index: Option<i64>,
  #[serde(default)] pub required: Option<bool>,
  #[serde(default, rename = "categoryId", alias = "category_id")]
  pub category_id: Option<String>,
  #[serde(default, rename = "mediaId", alias = "media_id")]
  pub media_id: Option<String>,
}

/// A stored question. `category_type_name` is filled from the category table on read.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Question {
  pub id: String,
  #[serde(rename = "surveyId")] pub survey_id: String,
  pub question_text: String,
  pub question_type: Option<String>,
  pub order_index: i64,
  pub required: bool,
  #[serde(rename = "categoryId")] pub category_id: Option<String>,
  #[serde(rename = "mediaId")] pub media_id: Option<String>,
  pub category_type_name: Option<String>,
  pub created_at: String,
}

/// Category-derived shape of one option record. All records of a question share one
/// family: choice, scale, grid (rows + columns) or plain.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum OptionShape {
  Choice {
    text: String,
    #[serde(rename = "mediaId")] media_id: Option<String>,
  },
  Scale {
    #[serde(rename = "rangeFrom")] range_from: Option<i64>,
    #[serde(rename = "rangeTo")] range_to: Option<i64>,
    #[serde(rename = "fromLabel")] from_label: Option<String>,
    #[serde(rename = "toLabel")] to_label: Option<String>,
    icon: Option<String>,
  },
  GridRow { text: String },
  GridColumn { text: String },
  Plain { text: String },
}

impl OptionShape {
  /// Role tag persisted next to the flat option columns.
  pub fn tag(&self) -> &'static str {
    match self {
      Self::Choice { .. } => "choice",
      Self::Scale { .. } => "scale",
      Self::GridRow { .. } => "grid_row",
      Self::GridColumn { .. } => "grid_column",
      Self::Plain { .. } => "plain",
    }
  }
}

/// An option record ready to be bulk-inserted.
#[derive(Clone, Debug, PartialEq)]
pub struct NewOption {
  pub question_id: String,
  pub shape: OptionShape,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct QuestionOption {
  pub id: String,
  #[serde(rename = "questionId")] pub question_id: String,
  pub position: i64,
  #[serde(flatten)] pub shape: OptionShape,
}

/// Read model returned by the authoring operations. Grid questions additionally expose
/// their rows and columns as two separate collections.
#[derive(Clone, Debug, Serialize)]
pub struct QuestionWithOptions {
  #[serde(flatten)] pub question: Question,
  pub options: Vec<QuestionOption>,
  #[serde(rename = "rowOptions", skip_serializing_if = "Vec::is_empty")]
  pub row_options: Vec<QuestionOption>,
  #[serde(rename = "columnOptions", skip_serializing_if = "Vec::is_empty")]
  pub column_options: Vec<QuestionOption>,
}

impl QuestionWithOptions {
  pub fn new(question: Question, options: Vec<QuestionOption>) -> Self {
    let row_options = options.iter().filter(|o| matches!(o.shape, OptionShape::GridRow { .. })).cloned().collect();
    let column_options = options.iter().filter(|o| matches!(o.shape, OptionShape::GridColumn { .. })).cloned().collect();
    Self { question, options, row_options, column_options }
  }
}

/// Response row as created inside the submission transaction.
#[derive(Clone, Debug, PartialEq)]
pub struct NewResponse {
  pub id: String,
  pub survey_id: String,
  pub user_metadata: Map<String, Value>,
  pub created_at: String,
}

/// Answer row as created inside the submission transaction.
#[derive(Clone, Debug, PartialEq)]
pub struct NewResponseAnswer {
  pub id: String,
  pub response_id: String,
  pub question_id: String,
  pub position: i64,
  pub answer_type: String,
  pub answer_value: Option<String>,
  pub selected_option_ids: Option<Vec<String>>,
  pub scale_rating_value: Option<f64>,
  pub media: Vec<Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewGridAnswer {
  pub id: String,
  pub response_answer_id: String,
  pub row_option_id: String,
  pub column_option_id: String,
  pub selected: bool,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct GridAnswer {
  pub id: String,
  #[serde(rename = "responseAnswerId")] pub response_answer_id: String,
  #[serde(rename = "rowOptionId")] pub row_option_id: String,
  #[serde(rename = "columnOptionId")] pub column_option_id: String,
  pub selected: bool,
}

/// Question metadata attached to each answer of a read-back response.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct QuestionSummary {
  pub id: String,
  pub question_text: String,
  pub question_type: Option<String>,
  pub category_type_name: Option<String>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ResponseAnswer {
  pub id: String,
  #[serde(rename = "responseId")] pub response_id: String,
  #[serde(rename = "questionId")] pub question_id: String,
  pub answer_type: String,
  pub answer_value: Option<String>,
  pub selected_option_ids: Option<Vec<String>>,
  #[serde(rename = "scaleRatingValue")] pub scale_rating_value: Option<f64>,
  pub media: Vec<Value>,
  pub grid_answers: Vec<GridAnswer>,
  pub question: Option<QuestionSummary>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Response {
  pub id: String,
  #[serde(rename = "surveyId")] pub survey_id: String,
  pub user_metadata: Map<String, Value>,
  pub created_at: String,
  pub response_answers: Vec<ResponseAnswer>,
}

/// Single-use credential for anonymous submission against one survey.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ShareToken {
  pub id: String,
  #[serde(rename = "surveyId")] pub survey_id: String,
  pub token_hash: String,
  pub recipient_email: Option<String>,
  pub recipient_mobile: Option<String>,
  pub used: bool,
}

impl ShareToken {
  /// Personalized tokens (sent to a recipient) are consumed on first use; public ones are not.
  pub fn is_personalized(&self) -> bool {
    let present = |v: &Option<String>| v.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false);
    present(&self.recipient_email) || present(&self.recipient_mobile)
  }
}
