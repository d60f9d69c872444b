//! Option building and question authoring.
//!
//! `build_option_records` turns loosely-shaped option descriptors into records of
//! the shape the question's category calls for. The authoring operations around it
//! persist questions and replace their options wholesale on update.
//!
//! Raw descriptors are read leniently: a missing or mistyped field takes its default.

use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::category::CategoryKind;
use crate::domain::{NewOption, NewQuestion, OptionShape, QuestionChanges, QuestionWithOptions};
use crate::error::Error;
use crate::store::RecordStore;

pub fn build_option_records(question_id: &str, kind: CategoryKind, raw_options: &[Value]) -> Vec<NewOption> {
    let record = |shape: OptionShape| NewOption {
        question_id: question_id.to_string(),
        shape,
    };

    match kind {
        CategoryKind::SingleChoice | CategoryKind::MultiChoice | CategoryKind::FileUpload => raw_options
            .iter()
            .map(|raw| {
                record(OptionShape::Choice {
                    text: text_of(raw),
                    media_id: media_of(raw),
                })
            })
            .collect(),

        // One record per question, taken from the first descriptor.
        CategoryKind::Scale => raw_options
            .first()
            .map(|scale| {
                record(OptionShape::Scale {
                    range_from: int_field(scale, "rangeFrom"),
                    range_to: int_field(scale, "rangeTo"),
                    from_label: str_field(scale, "fromLabel"),
                    to_label: str_field(scale, "toLabel"),
                    icon: str_field(scale, "icon"),
                })
            })
            .into_iter()
            .collect(),

        // Rows and columns both come from the first descriptor; later entries are ignored.
        CategoryKind::Grid => {
            let Some(grid) = raw_options.first() else {
                return Vec::new();
            };
            let rows = array_field(grid, "rowOptions")
                .iter()
                .map(|raw| record(OptionShape::GridRow { text: text_of(raw) }));
            let columns = array_field(grid, "columnOptions")
                .iter()
                .map(|raw| record(OptionShape::GridColumn { text: text_of(raw) }));
            rows.chain(columns).collect()
        }

        CategoryKind::DateTime | CategoryKind::FreeText | CategoryKind::Unknown => raw_options
            .iter()
            .map(|raw| record(OptionShape::Plain { text: text_of(raw) }))
            .collect(),
    }
}

fn text_of(raw: &Value) -> String {
    // Grid labels and plain options are sometimes sent as bare strings.
    if let Some(s) = raw.as_str() {
        return s.to_string();
    }
    raw.get("text").and_then(Value::as_str).unwrap_or("").to_string()
}

fn media_of(raw: &Value) -> Option<String> {
    raw.get("mediaId")
        .or_else(|| raw.get("media_id"))
        .and_then(Value::as_str)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn str_field(raw: &Value, key: &str) -> Option<String> {
    raw.get(key).and_then(Value::as_str).map(str::to_string)
}

fn int_field(raw: &Value, key: &str) -> Option<i64> {
    let v = raw.get(key)?;
    v.as_i64()
        .or_else(|| v.as_f64().and_then(integral))
        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
}

/// Whole-number floats only; `1.5` is not a scale bound.
fn integral(f: f64) -> Option<i64> {
    (f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64).then_some(f as i64)
}

fn array_field<'a>(raw: &'a Value, key: &str) -> &'a [Value] {
    raw.get(key).and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
}

fn category_kind(store: &dyn RecordStore, category_id: Option<&str>) -> Result<CategoryKind, Error> {
    let type_name = match category_id {
        Some(id) => store.category_type_name(id)?,
        None => None,
    };
    Ok(CategoryKind::from_type_name(type_name.as_deref()))
}

/// Resolve the category, build the records and bulk-insert them. Returns how many
/// records were written; an empty build writes nothing.
fn write_options(
    store: &dyn RecordStore,
    question_id: &str,
    category_id: Option<&str>,
    raw_options: &[Value],
) -> Result<usize, Error> {
    if raw_options.is_empty() {
        return Ok(0);
    }
    let kind = category_kind(store, category_id)?;
    let records = build_option_records(question_id, kind, raw_options);
    if records.is_empty() {
        return Ok(0);
    }
    let written = store.insert_options(&records)?;
    debug!(target: "options", %question_id, ?kind, written, "Option records written");
    Ok(written)
}

fn read_back(store: &dyn RecordStore, question_id: &str) -> Result<QuestionWithOptions, Error> {
    let question = store
        .find_question(question_id)?
        .ok_or_else(|| Error::QuestionNotFound(question_id.to_string()))?;
    let options = store.list_options(question_id)?;
    Ok(QuestionWithOptions::new(question, options))
}

#[instrument(level = "info", skip(store, question, raw_options), fields(survey_id = %question.survey_id, options = raw_options.len()))]
pub fn create_question(
    store: &dyn RecordStore,
    question: &NewQuestion,
    raw_options: &[Value],
) -> Result<QuestionWithOptions, Error> {
    let created = store.insert_question(question)?;
    let written = write_options(store, &created.id, created.category_id.as_deref(), raw_options)?;
    info!(target: "options", id = %created.id, written, "Question created");
    read_back(store, &created.id)
}

/// Update the question, drop every existing option and rebuild from `raw_options`.
/// The delete and the rebuild are separate writes: a failed rebuild leaves the
/// question without options.
#[instrument(level = "info", skip(store, changes, raw_options), fields(options = raw_options.len()))]
pub fn update_question(
    store: &dyn RecordStore,
    id: &str,
    changes: &QuestionChanges,
    raw_options: &[Value],
) -> Result<QuestionWithOptions, Error> {
    let updated = store
        .update_question(id, changes)?
        .ok_or_else(|| Error::QuestionNotFound(id.to_string()))?;
    let removed = store.delete_options(id)?;
    let written = write_options(store, id, updated.category_id.as_deref(), raw_options)?;
    info!(target: "options", %id, removed, written, "Question options rebuilt");
    read_back(store, id)
}

#[instrument(level = "info", skip(store))]
pub fn delete_question(store: &dyn RecordStore, id: &str) -> Result<(), Error> {
    if store.find_question(id)?.is_none() {
        return Err(Error::QuestionNotFound(id.to_string()));
    }
    store.delete_options(id)?;
    store.delete_question(id)?;
    info!(target: "options", %id, "Question deleted");
    Ok(())
}

pub fn get_question(store: &dyn RecordStore, id: &str) -> Result<QuestionWithOptions, Error> {
    read_back(store, id)
}

/// Every question of a survey with its options, in `order_index` order. An unknown
/// survey has no questions.
#[instrument(level = "debug", skip(store))]
pub fn list_questions(store: &dyn RecordStore, survey_id: &str) -> Result<Vec<QuestionWithOptions>, Error> {
    let questions = store.list_questions(survey_id)?;
    let mut out = Vec::with_capacity(questions.len());
    for question in questions {
        let options = store.list_options(&question.id)?;
        out.push(QuestionWithOptions::new(question, options));
    }
    debug!(target: "options", %survey_id, count = out.len(), "Questions listed");
    Ok(out)
}
