//! Answer normalization: one raw submitted answer + its question's category kind
//! → a storage-ready answer. Pure; no I/O.
//!
//! Exactly one output field is meaningful per kind and the others stay empty.
//! Malformed input (a grid payload that is not an array, a rating that is not a
//! number) degrades to the empty result rather than failing the submission.

use serde_json::Value;

use crate::category::CategoryKind;

/// One answer as submitted by a respondent.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawAnswer {
    /// `None` when the submitted id is missing, blank or not a string.
    pub question_id: Option<String>,
    pub answer_value: Value,
    pub option_id: Option<Value>,
    pub media: Vec<Value>,
}

impl RawAnswer {
    /// Read one submitted answer entry. Never fails: mistyped fields take their
    /// defaults so a bad entry cannot take its siblings down with it.
    pub fn from_value(raw: &Value) -> Self {
        Self {
            question_id: field(raw, &["questionId", "question_id"])
                .and_then(Value::as_str)
                .filter(|id| !id.trim().is_empty())
                .map(str::to_string),
            answer_value: field(raw, &["answer_value", "answerValue"]).cloned().unwrap_or(Value::Null),
            option_id: field(raw, &["optionId", "option_id"]).cloned(),
            media: field(raw, &["media"]).and_then(Value::as_array).cloned().unwrap_or_default(),
        }
    }
}

pub fn read_answers(raw: &[Value]) -> Vec<RawAnswer> {
    raw.iter().map(RawAnswer::from_value).collect()
}

/// First non-null value under any of `names`.
fn field<'a>(raw: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names.iter().filter_map(|name| raw.get(*name)).find(|v| !v.is_null())
}

/// One checked cell of a grid question, before ids are assigned.
#[derive(Clone, Debug, PartialEq)]
pub struct GridSelection {
    pub row_option_id: String,
    pub column_option_id: String,
    pub selected: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NormalizedAnswer {
    pub answer_value: Option<String>,
    pub selected_option_ids: Option<Vec<String>>,
    pub scale_rating_value: Option<f64>,
    pub media: Vec<Value>,
    pub grid_answers: Vec<GridSelection>,
}

pub fn normalize_answer(kind: CategoryKind, raw: &RawAnswer) -> NormalizedAnswer {
    let mut out = NormalizedAnswer::default();
    match kind {
        CategoryKind::FreeText | CategoryKind::Unknown => {
            out.answer_value = Some(scalar_text(&raw.answer_value).unwrap_or_default());
        }
        CategoryKind::SingleChoice => {
            // Only the first element is kept, even when several were sent. A first
            // element that is not an id means no selection.
            out.selected_option_ids = match &raw.answer_value {
                Value::Array(items) => items.first().and_then(choice_id),
                other => choice_id(other),
            }
            .map(|id| vec![id]);
        }
        CategoryKind::MultiChoice => {
            let ids = choice_ids(&raw.answer_value);
            out.selected_option_ids = (!ids.is_empty()).then_some(ids);
        }
        CategoryKind::Scale => match raw
            .option_id
            .as_ref()
            .and_then(scalar_text)
            .filter(|id| !id.trim().is_empty())
        {
            Some(option_id) => out.selected_option_ids = Some(vec![option_id]),
            None => out.scale_rating_value = parse_number(&raw.answer_value),
        },
        CategoryKind::Grid => {
            out.grid_answers = expand_grid(&raw.answer_value);
        }
        CategoryKind::FileUpload => {
            out.media = raw.media.clone();
        }
        CategoryKind::DateTime => {
            out.answer_value = scalar_text(&raw.answer_value).filter(|v| !v.is_empty());
        }
    }
    out
}

/// Strings as-is, numbers and booleans in their display form, arrays and objects as
/// compact JSON. `null` has no text.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value).ok(),
    }
}

/// Scalar or array of scalars → option ids; a bare scalar becomes a one-element list.
/// Nulls and nested values are not ids and are dropped.
fn choice_ids(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(choice_id).collect(),
        other => choice_id(other).into_iter().collect(),
    }
}

fn choice_id(value: &Value) -> Option<String> {
    match value {
        Value::Array(_) | Value::Object(_) => None,
        other => scalar_text(other),
    }
}

fn parse_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

/// `[{rowOptionId, selectedColumns: [..]}, ..]` → one selected cell per (row, column).
fn expand_grid(value: &Value) -> Vec<GridSelection> {
    let Some(rows) = value.as_array() else {
        return Vec::new();
    };
    let mut cells = Vec::new();
    for row in rows {
        let Some(row_id) = row.get("rowOptionId").and_then(scalar_text) else {
            continue;
        };
        let Some(columns) = row.get("selectedColumns").and_then(Value::as_array) else {
            continue;
        };
        for column_id in columns.iter().filter_map(scalar_text) {
            cells.push(GridSelection {
                row_option_id: row_id.clone(),
                column_option_id: column_id,
                selected: true,
            });
        }
    }
    cells
}
