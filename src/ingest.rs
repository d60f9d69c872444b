//! Response ingestion.
//!
//! Questions are looked up one answer at a time before any write. The response, its
//! answers and their grid cells are then created inside a single store transaction
//! and read back as one tree. The share-token variant consumes personalized tokens
//! after the commit; that write is best-effort and never fails the submission.

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::category::{canonical_type_name, CategoryKind, DEFAULT_TYPE_NAME};
use crate::domain::{NewGridAnswer, NewResponse, NewResponseAnswer, Response};
use crate::error::Error;
use crate::normalize::{normalize_answer, NormalizedAnswer, RawAnswer};
use crate::store::RecordStore;

#[derive(Debug, Serialize)]
pub struct Submission {
    pub response: Response,
    /// Answers dropped because their question could not be found, in submission
    /// order. An answer that carried no usable id shows up as an empty string.
    pub skipped_question_ids: Vec<String>,
}

struct PreparedAnswer {
    question_id: String,
    answer_type: String,
    normalized: NormalizedAnswer,
}

fn prepare_answers(
    store: &dyn RecordStore,
    raw_answers: &[RawAnswer],
) -> Result<(Vec<PreparedAnswer>, Vec<String>), Error> {
    let mut prepared = Vec::with_capacity(raw_answers.len());
    let mut skipped = Vec::new();
    for (index, raw) in raw_answers.iter().enumerate() {
        let Some(question_id) = raw.question_id.as_deref() else {
            warn!(target: "ingest", index, "Answer without a usable question id; skipped");
            skipped.push(String::new());
            continue;
        };
        let Some(question) = store.find_question(question_id)? else {
            warn!(target: "ingest", %question_id, "Question not found; answer skipped");
            skipped.push(question_id.to_string());
            continue;
        };
        let type_name = question.category_type_name.as_deref();
        let kind = CategoryKind::from_type_name(type_name);
        prepared.push(PreparedAnswer {
            question_id: question.id,
            answer_type: type_name
                .map(canonical_type_name)
                .unwrap_or_else(|| DEFAULT_TYPE_NAME.to_string()),
            normalized: normalize_answer(kind, raw),
        });
    }
    Ok((prepared, skipped))
}

#[instrument(level = "info", skip(store, user_metadata, raw_answers), fields(%survey_id, answers = raw_answers.len()))]
pub fn submit_response(
    store: &dyn RecordStore,
    survey_id: &str,
    user_metadata: Option<Map<String, Value>>,
    raw_answers: &[RawAnswer],
) -> Result<Submission, Error> {
    let (prepared, skipped_question_ids) = prepare_answers(store, raw_answers)?;

    let response = NewResponse {
        id: Uuid::new_v4().to_string(),
        survey_id: survey_id.to_string(),
        user_metadata: user_metadata.unwrap_or_default(),
        created_at: Utc::now().to_rfc3339(),
    };

    let mut cells_written = 0usize;
    store
        .in_transaction(&mut |tx| {
            tx.create_response(&response)?;
            for (position, answer) in prepared.iter().enumerate() {
                let answer_id = Uuid::new_v4().to_string();
                let n = &answer.normalized;
                tx.create_answer(&NewResponseAnswer {
                    id: answer_id.clone(),
                    response_id: response.id.clone(),
                    question_id: answer.question_id.clone(),
                    position: position as i64,
                    answer_type: answer.answer_type.clone(),
                    answer_value: n.answer_value.clone(),
                    selected_option_ids: n.selected_option_ids.clone(),
                    scale_rating_value: n.scale_rating_value,
                    media: n.media.clone(),
                })?;
                if !n.grid_answers.is_empty() {
                    let cells: Vec<NewGridAnswer> = n
                        .grid_answers
                        .iter()
                        .map(|cell| NewGridAnswer {
                            id: Uuid::new_v4().to_string(),
                            response_answer_id: answer_id.clone(),
                            row_option_id: cell.row_option_id.clone(),
                            column_option_id: cell.column_option_id.clone(),
                            selected: cell.selected,
                        })
                        .collect();
                    cells_written += tx.create_grid_answers(&cells)?;
                }
            }
            Ok(())
        })
        .map_err(Error::Transaction)?;

    let persisted = match store.load_response(&response.id) {
        Ok(Some(persisted)) => persisted,
        Ok(None) => {
            error!(target: "ingest", response_id = %response.id, "Committed response could not be found on read-back");
            return Err(Error::ResponseNotFound(response.id.clone()));
        }
        Err(e) => {
            error!(target: "ingest", response_id = %response.id, error = %e, "Committed response could not be read back");
            return Err(e.into());
        }
    };
    info!(
        target: "ingest",
        response_id = %persisted.id,
        answers = persisted.response_answers.len(),
        grid_cells = cells_written,
        skipped = skipped_question_ids.len(),
        "Response committed"
    );
    Ok(Submission {
        response: persisted,
        skipped_question_ids,
    })
}

#[instrument(level = "info", skip(store, token_hash, user_metadata, raw_answers), fields(answers = raw_answers.len()))]
pub fn submit_response_with_token(
    store: &dyn RecordStore,
    token_hash: &str,
    user_metadata: Option<Map<String, Value>>,
    raw_answers: &[RawAnswer],
) -> Result<Submission, Error> {
    let token = store.find_unused_token(token_hash)?.ok_or(Error::InvalidToken)?;
    let submission = submit_response(store, &token.survey_id, user_metadata, raw_answers)?;

    if token.is_personalized() {
        // The response is already committed; a failed consumption is only logged.
        if let Err(e) = store.mark_token_used(&token.token_hash) {
            error!(target: "ingest", token_id = %token.id, error = %e, "Failed to mark share token used");
        }
    }
    Ok(submission)
}

pub fn get_response(store: &dyn RecordStore, id: &str) -> Result<Response, Error> {
    store
        .load_response(id)?
        .ok_or_else(|| Error::ResponseNotFound(id.to_string()))
}

pub fn list_responses(store: &dyn RecordStore, survey_id: &str) -> Result<Vec<Response>, Error> {
    Ok(store.list_responses(survey_id)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewQuestion;
    use crate::store::memory::MemoryStore;
    use crate::store::SqliteStore;
    use serde_json::json;

    fn question(store: &dyn RecordStore, type_name: Option<&str>) -> String {
        let category_id = type_name.map(|n| store.create_category(n).expect("category").id);
        store
            .insert_question(&NewQuestion {
                survey_id: "s1".into(),
                question_text: format!("{type_name:?}?"),
                question_type: None,
                order_index: 0,
                required: true,
                category_id,
                media_id: None,
            })
            .expect("question")
            .id
    }

    fn answer(question_id: &str, value: Value) -> RawAnswer {
        RawAnswer {
            question_id: Some(question_id.into()),
            answer_value: value,
            ..RawAnswer::default()
        }
    }

    fn mixed_submission(store: &dyn RecordStore) -> Vec<RawAnswer> {
        let text = question(store, Some("Short Answer"));
        let choice = question(store, Some("Checkboxes"));
        let grid = question(store, Some("checkbox grid"));
        vec![
            answer(&text, json!("fine")),
            answer(&choice, json!(["a", "b"])),
            answer(&grid, json!([{"rowOptionId": "r1", "selectedColumns": ["c1", "c2"]}])),
        ]
    }

    #[test]
    fn commits_answers_and_grid_rows_together() {
        let store = MemoryStore::new();
        let answers = mixed_submission(&store);
        let mut meta = Map::new();
        meta.insert("device".into(), json!("mobile"));

        let submission = submit_response(&store, "s1", Some(meta), &answers).expect("submit");
        let response = submission.response;
        assert_eq!(response.survey_id, "s1");
        assert_eq!(response.user_metadata["device"], "mobile");
        assert_eq!(response.response_answers.len(), 3);

        let text = &response.response_answers[0];
        assert_eq!(text.answer_type, "short answer");
        assert_eq!(text.answer_value.as_deref(), Some("fine"));

        let choice = &response.response_answers[1];
        assert_eq!(choice.selected_option_ids, Some(vec!["a".to_string(), "b".to_string()]));

        let grid = &response.response_answers[2];
        assert_eq!(grid.grid_answers.len(), 2);
        assert!(grid.grid_answers.iter().all(|g| g.selected && g.response_answer_id == grid.id));
        assert!(grid.question.is_some());
        assert_eq!(store.row_counts(), (1, 3, 2));
    }

    #[test]
    fn failure_mid_commit_leaves_nothing_visible() {
        let store = MemoryStore::new().fail_on_answer(2);
        let answers = mixed_submission(&store);
        let err = submit_response(&store, "s1", None, &answers).expect_err("must roll back");
        assert!(matches!(err, Error::Transaction(_)));
        assert_eq!(store.row_counts(), (0, 0, 0));
    }

    #[test]
    fn sqlite_rolls_back_when_an_answer_insert_aborts() {
        let store = SqliteStore::open_in_memory().expect("open");
        let answers = mixed_submission(&store);
        let grid_question = answers[2].question_id.clone().expect("question id");
        store
            .execute_batch(&format!(
                "CREATE TRIGGER reject_answer BEFORE INSERT ON response_answers \
                WHEN NEW.question_id = '{grid_question}' BEGIN SELECT RAISE(ABORT, 'rejected'); END;"
            ))
            .expect("trigger");

        let err = submit_response(&store, "s1", None, &answers).expect_err("must roll back");
        assert!(matches!(err, Error::Transaction(_)));
        for table in ["responses", "response_answers", "grid_answers"] {
            assert_eq!(store.count_rows(table).expect("count"), 0, "{table}");
        }
    }

    #[test]
    fn sqlite_round_trip_preserves_the_tree() {
        let store = SqliteStore::open_in_memory().expect("open");
        let scale = question(&store, Some("Linear Scale"));
        let answers = vec![answer(&scale, json!("4"))];
        let submission = submit_response(&store, "s1", None, &answers).expect("submit");
        let read = get_response(&store, &submission.response.id).expect("read back");
        assert_eq!(read, submission.response);
        assert_eq!(read.response_answers[0].scale_rating_value, Some(4.0));
        assert_eq!(read.response_answers[0].selected_option_ids, None);
    }

    #[test]
    fn unknown_questions_are_skipped_not_fatal() {
        let store = MemoryStore::new();
        let known = question(&store, None);
        let answers = vec![answer("ghost", json!("boo")), answer(&known, json!("hi"))];
        let submission = submit_response(&store, "s1", None, &answers).expect("submit");
        assert_eq!(submission.skipped_question_ids, vec!["ghost".to_string()]);
        assert_eq!(submission.response.response_answers.len(), 1);
        assert_eq!(submission.response.response_answers[0].answer_type, "text");
    }

    #[test]
    fn personalized_token_is_consumed_after_commit() {
        let store = MemoryStore::new();
        store.add_token("s7", "tok", Some("ana@example.org"));
        let q = question(&store, None);
        let submission = submit_response_with_token(&store, "tok", None, &[answer(&q, json!("x"))]).expect("submit");
        assert_eq!(submission.response.survey_id, "s7");
        assert!(matches!(
            submit_response_with_token(&store, "tok", None, &[]),
            Err(Error::InvalidToken)
        ));
    }

    #[test]
    fn public_token_stays_usable() {
        let store = MemoryStore::new();
        store.add_token("s7", "public", None);
        submit_response_with_token(&store, "public", None, &[]).expect("first");
        submit_response_with_token(&store, "public", None, &[]).expect("second");
        assert_eq!(store.row_counts().0, 2);
    }

    #[test]
    fn token_consumption_failure_does_not_fail_the_submission() {
        let store = MemoryStore::new().fail_token_update();
        store.add_token("s7", "tok", Some("ana@example.org"));
        let submission = submit_response_with_token(&store, "tok", None, &[]).expect("submit");
        assert_eq!(submission.response.survey_id, "s7");
        assert_eq!(store.row_counts().0, 1);
    }

    #[test]
    fn unknown_token_writes_nothing() {
        let store = MemoryStore::new();
        assert!(matches!(
            submit_response_with_token(&store, "nope", None, &[]),
            Err(Error::InvalidToken)
        ));
        assert_eq!(store.row_counts(), (0, 0, 0));
    }

    #[test]
    fn malformed_entry_does_not_take_siblings_down() {
        let store = SqliteStore::open_in_memory().expect("open");
        let text = question(&store, Some("paragraph"));
        let upload = question(&store, Some("File Upload"));
        let answers = crate::normalize::read_answers(&[
            json!({"questionId": text, "answer_value": "kept"}),
            json!({"questionId": upload, "media": "not-a-list"}),
            json!({"answer_value": "no id"}),
            json!({"questionId": 12}),
        ]);

        let submission = submit_response(&store, "s1", None, &answers).expect("submit");
        let stored = &submission.response.response_answers;
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].answer_value.as_deref(), Some("kept"));
        assert!(stored[1].media.is_empty());
        assert_eq!(submission.skipped_question_ids, vec![String::new(), String::new()]);
    }

    #[test]
    fn sqlite_token_flow_commits_then_consumes() {
        let store = SqliteStore::open_in_memory().expect("open");
        store
            .insert_share_token("s9", "tok-9", Some("ana@example.org"), None)
            .expect("token");
        let q = question(&store, Some("Multiple Choice"));

        let submission =
            submit_response_with_token(&store, "tok-9", None, &[answer(&q, json!(["o1", "o2"]))]).expect("submit");
        assert_eq!(submission.response.survey_id, "s9");
        assert_eq!(
            submission.response.response_answers[0].selected_option_ids,
            Some(vec!["o1".to_string()])
        );
        assert!(store.find_unused_token("tok-9").expect("lookup").is_none());
        assert!(matches!(
            submit_response_with_token(&store, "tok-9", None, &[]),
            Err(Error::InvalidToken)
        ));
        assert_eq!(store.count_rows("responses").expect("count"), 1);
    }

    #[test]
    fn failed_read_back_surfaces_after_commit() {
        let store = MemoryStore::new().fail_load();
        let q = question(&store, None);
        let err = submit_response(&store, "s1", None, &[answer(&q, json!("x"))]).expect_err("read-back fails");
        assert!(matches!(err, Error::Store(_)));
        assert_eq!(store.row_counts(), (1, 1, 0));
    }

    #[test]
    fn survey_responses_are_listed_per_survey() {
        let store = SqliteStore::open_in_memory().expect("open");
        let q = question(&store, None);
        let first = submit_response(&store, "s1", None, &[answer(&q, json!("a"))]).expect("first");
        let second = submit_response(&store, "s1", None, &[answer(&q, json!("b"))]).expect("second");
        submit_response(&store, "s2", None, &[]).expect("other survey");

        let listed = list_responses(&store, "s1").expect("list");
        let ids: Vec<_> = listed.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![first.response.id.as_str(), second.response.id.as_str()]);
        assert_eq!(listed[1].response_answers[0].answer_value.as_deref(), Some("b"));
        assert!(list_responses(&store, "none").expect("list").is_empty());
    }
}
