//! SQLite-backed record store.
//!
//! One connection behind a mutex; callers run on blocking threads. The schema is
//! created on open. Submissions go through `Connection::transaction`, so a failed
//! write anywhere in the batch rolls back the response, its answers and grid rows.

use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::domain::{
    GridAnswer, NewGridAnswer, NewOption, NewQuestion, NewResponse, NewResponseAnswer, OptionShape,
    Question, QuestionCategory, QuestionChanges, QuestionOption, QuestionSummary, Response,
    ResponseAnswer, ShareToken,
};
use crate::error::{StoreError, StoreResult};

use super::{RecordStore, SubmissionTx};

const SCHEMA: &str = "PRAGMA foreign_keys = ON;
    CREATE TABLE IF NOT EXISTS question_categories (
        id TEXT PRIMARY KEY,
        type_name TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS questions (
        id TEXT PRIMARY KEY,
        survey_id TEXT NOT NULL,
        question_text TEXT NOT NULL,
        question_type TEXT,
        order_index INTEGER NOT NULL DEFAULT 0,
        required INTEGER NOT NULL DEFAULT 1,
        category_id TEXT,
        media_id TEXT,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_questions_survey ON questions(survey_id);
    CREATE TABLE IF NOT EXISTS options (
        id TEXT PRIMARY KEY,
        question_id TEXT NOT NULL,
        position INTEGER NOT NULL,
        shape TEXT NOT NULL,
        text TEXT,
        media_id TEXT,
        range_from INTEGER,
        range_to INTEGER,
        from_label TEXT,
        to_label TEXT,
        icon TEXT,
        FOREIGN KEY(question_id) REFERENCES questions(id) ON DELETE CASCADE
    );
    CREATE INDEX IF NOT EXISTS idx_options_question ON options(question_id);
    CREATE TABLE IF NOT EXISTS responses (
        id TEXT PRIMARY KEY,
        survey_id TEXT NOT NULL,
        user_metadata TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_responses_survey ON responses(survey_id);
    CREATE TABLE IF NOT EXISTS response_answers (
        id TEXT PRIMARY KEY,
        response_id TEXT NOT NULL,
        question_id TEXT NOT NULL,
        position INTEGER NOT NULL,
        answer_type TEXT NOT NULL,
        answer_value TEXT,
        selected_option_ids TEXT,
        scale_rating_value REAL,
        media TEXT NOT NULL,
        FOREIGN KEY(response_id) REFERENCES responses(id) ON DELETE CASCADE
    );
    CREATE INDEX IF NOT EXISTS idx_answers_response ON response_answers(response_id);
    CREATE TABLE IF NOT EXISTS grid_answers (
        id TEXT PRIMARY KEY,
        response_answer_id TEXT NOT NULL,
        row_option_id TEXT NOT NULL,
        column_option_id TEXT NOT NULL,
        selected INTEGER NOT NULL,
        FOREIGN KEY(response_answer_id) REFERENCES response_answers(id) ON DELETE CASCADE
    );
    CREATE INDEX IF NOT EXISTS idx_grid_answer ON grid_answers(response_answer_id);
    CREATE TABLE IF NOT EXISTS share_tokens (
        id TEXT PRIMARY KEY,
        survey_id TEXT NOT NULL,
        token_hash TEXT NOT NULL UNIQUE,
        recipient_email TEXT,
        recipient_mobile TEXT,
        used INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    );";

const QUESTION_SELECT: &str = "SELECT q.id, q.survey_id, q.question_text, q.question_type, q.order_index, \
    q.required, q.category_id, q.media_id, c.type_name, q.created_at \
    FROM questions q LEFT JOIN question_categories c ON c.id = q.category_id";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`; `":memory:"` gives a private in-memory db.
    #[instrument(level = "info")]
    pub fn open(path: &str) -> StoreResult<Self> {
        if path.trim().is_empty() {
            return Err(StoreError::Unavailable("database path is empty".into()));
        }
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        let store = Self::from_connection(conn)?;
        info!(target: "store", %path, "SQLite store ready");
        Ok(store)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> StoreResult<()> {
        self.lock()?.execute_batch(sql)?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn count_rows(&self, table: &str) -> StoreResult<i64> {
        let conn = self.lock()?;
        let n = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        Ok(n)
    }

    #[cfg(test)]
    pub(crate) fn insert_share_token(
        &self,
        survey_id: &str,
        token_hash: &str,
        recipient_email: Option<&str>,
        recipient_mobile: Option<&str>,
    ) -> StoreResult<()> {
        self.lock()?.execute(
            "INSERT INTO share_tokens (id, survey_id, token_hash, recipient_email, recipient_mobile, used, created_at) \
            VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
            params![
                Uuid::new_v4().to_string(),
                survey_id,
                token_hash,
                recipient_email,
                recipient_mobile,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }
}

fn question_from_row(row: &Row<'_>) -> rusqlite::Result<Question> {
    Ok(Question {
        id: row.get(0)?,
        survey_id: row.get(1)?,
        question_text: row.get(2)?,
        question_type: row.get(3)?,
        order_index: row.get(4)?,
        required: row.get(5)?,
        category_id: row.get(6)?,
        media_id: row.get(7)?,
        category_type_name: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn query_question(conn: &Connection, id: &str) -> StoreResult<Option<Question>> {
    let q = conn
        .query_row(
            &format!("{QUESTION_SELECT} WHERE q.id = ?1"),
            params![id],
            question_from_row,
        )
        .optional()?;
    Ok(q)
}

/// Flat columns for one option: text, media_id, range_from, range_to, from_label, to_label, icon.
type OptionColumns<'a> = (
    Option<&'a str>,
    Option<&'a str>,
    Option<i64>,
    Option<i64>,
    Option<&'a str>,
    Option<&'a str>,
    Option<&'a str>,
);

fn option_columns(shape: &OptionShape) -> OptionColumns<'_> {
    match shape {
        OptionShape::Choice { text, media_id } => {
            (Some(text.as_str()), media_id.as_deref(), None, None, None, None, None)
        }
        OptionShape::Scale {
            range_from,
            range_to,
            from_label,
            to_label,
            icon,
        } => (
            None,
            None,
            *range_from,
            *range_to,
            from_label.as_deref(),
            to_label.as_deref(),
            icon.as_deref(),
        ),
        OptionShape::GridRow { text } | OptionShape::GridColumn { text } | OptionShape::Plain { text } => {
            (Some(text.as_str()), None, None, None, None, None, None)
        }
    }
}

fn option_from_row(row: &Row<'_>) -> rusqlite::Result<QuestionOption> {
    let tag: String = row.get(3)?;
    let text: String = row.get::<_, Option<String>>(4)?.unwrap_or_default();
    let shape = match tag.as_str() {
        "choice" => OptionShape::Choice {
            text,
            media_id: row.get(5)?,
        },
        "scale" => OptionShape::Scale {
            range_from: row.get(6)?,
            range_to: row.get(7)?,
            from_label: row.get(8)?,
            to_label: row.get(9)?,
            icon: row.get(10)?,
        },
        "grid_row" => OptionShape::GridRow { text },
        "grid_column" => OptionShape::GridColumn { text },
        _ => OptionShape::Plain { text },
    };
    Ok(QuestionOption {
        id: row.get(0)?,
        question_id: row.get(1)?,
        position: row.get(2)?,
        shape,
    })
}

/// Response tree: head row, answers in submission order, their grid cells and question summaries.
fn read_response(conn: &Connection, id: &str) -> StoreResult<Option<Response>> {
    let head = conn
        .query_row(
            "SELECT id, survey_id, user_metadata, created_at FROM responses WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()?;
    let Some((id, survey_id, metadata_raw, created_at)) = head else {
        return Ok(None);
    };
    let user_metadata: Map<String, Value> = serde_json::from_str(&metadata_raw)?;

    let mut answer_stmt = conn.prepare(
        "SELECT a.id, a.response_id, a.question_id, a.answer_type, a.answer_value, a.selected_option_ids, \
        a.scale_rating_value, a.media, q.id, q.question_text, q.question_type, c.type_name \
        FROM response_answers a \
        LEFT JOIN questions q ON q.id = a.question_id \
        LEFT JOIN question_categories c ON c.id = q.category_id \
        WHERE a.response_id = ?1 ORDER BY a.position",
    )?;
    let rows = answer_stmt.query_map(params![id], |row| {
        let question = match row.get::<_, Option<String>>(8)? {
            Some(qid) => Some(QuestionSummary {
                id: qid,
                question_text: row.get(9)?,
                question_type: row.get(10)?,
                category_type_name: row.get(11)?,
            }),
            None => None,
        };
        Ok(AnswerRow {
            id: row.get(0)?,
            response_id: row.get(1)?,
            question_id: row.get(2)?,
            answer_type: row.get(3)?,
            answer_value: row.get(4)?,
            selected_option_ids: row.get(5)?,
            scale_rating_value: row.get(6)?,
            media: row.get(7)?,
            question,
        })
    })?;
    let mut answer_rows = Vec::new();
    for row in rows {
        answer_rows.push(row?);
    }

    let mut grid_stmt = conn.prepare(
        "SELECT id, response_answer_id, row_option_id, column_option_id, selected \
        FROM grid_answers WHERE response_answer_id = ?1 ORDER BY rowid",
    )?;
    let mut response_answers = Vec::with_capacity(answer_rows.len());
    for a in answer_rows {
        let cells = grid_stmt.query_map(params![a.id], |row| {
            Ok(GridAnswer {
                id: row.get(0)?,
                response_answer_id: row.get(1)?,
                row_option_id: row.get(2)?,
                column_option_id: row.get(3)?,
                selected: row.get(4)?,
            })
        })?;
        let mut grid_answers = Vec::new();
        for cell in cells {
            grid_answers.push(cell?);
        }
        let selected_option_ids = a
            .selected_option_ids
            .as_deref()
            .map(serde_json::from_str::<Vec<String>>)
            .transpose()?;
        response_answers.push(ResponseAnswer {
            id: a.id,
            response_id: a.response_id,
            question_id: a.question_id,
            answer_type: a.answer_type,
            answer_value: a.answer_value,
            selected_option_ids,
            scale_rating_value: a.scale_rating_value,
            media: serde_json::from_str(&a.media)?,
            grid_answers,
            question: a.question,
        });
    }

    Ok(Some(Response {
        id,
        survey_id,
        user_metadata,
        created_at,
        response_answers,
    }))
}

struct SqliteTx<'a> {
    conn: &'a Connection,
}

impl SubmissionTx for SqliteTx<'_> {
    fn create_response(&mut self, response: &NewResponse) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO responses (id, survey_id, user_metadata, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                response.id,
                response.survey_id,
                serde_json::to_string(&response.user_metadata)?,
                response.created_at
            ],
        )?;
        Ok(())
    }

    fn create_answer(&mut self, answer: &NewResponseAnswer) -> StoreResult<()> {
        let selected = answer
            .selected_option_ids
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.conn.execute(
            "INSERT INTO response_answers (id, response_id, question_id, position, answer_type, answer_value, \
            selected_option_ids, scale_rating_value, media) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                answer.id,
                answer.response_id,
                answer.question_id,
                answer.position,
                answer.answer_type,
                answer.answer_value,
                selected,
                answer.scale_rating_value,
                serde_json::to_string(&answer.media)?
            ],
        )?;
        Ok(())
    }

    fn create_grid_answers(&mut self, cells: &[NewGridAnswer]) -> StoreResult<usize> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO grid_answers (id, response_answer_id, row_option_id, column_option_id, selected) \
            VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for cell in cells {
            stmt.execute(params![
                cell.id,
                cell.response_answer_id,
                cell.row_option_id,
                cell.column_option_id,
                cell.selected
            ])?;
        }
        Ok(cells.len())
    }
}

struct AnswerRow {
    id: String,
    response_id: String,
    question_id: String,
    answer_type: String,
    answer_value: Option<String>,
    selected_option_ids: Option<String>,
    scale_rating_value: Option<f64>,
    media: String,
    question: Option<QuestionSummary>,
}

impl RecordStore for SqliteStore {
    #[instrument(level = "debug", skip(self))]
    fn create_category(&self, type_name: &str) -> StoreResult<QuestionCategory> {
        let category = QuestionCategory {
            id: Uuid::new_v4().to_string(),
            type_name: type_name.to_string(),
        };
        self.lock()?.execute(
            "INSERT INTO question_categories (id, type_name) VALUES (?1, ?2)",
            params![category.id, category.type_name],
        )?;
        Ok(category)
    }

    fn category_type_name(&self, category_id: &str) -> StoreResult<Option<String>> {
        let name = self
            .lock()?
            .query_row(
                "SELECT type_name FROM question_categories WHERE id = ?1",
                params![category_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name)
    }

    #[instrument(level = "debug", skip(self, question), fields(survey_id = %question.survey_id))]
    fn insert_question(&self, question: &NewQuestion) -> StoreResult<Question> {
        let conn = self.lock()?;
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO questions (id, survey_id, question_text, question_type, order_index, required, \
            category_id, media_id, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                question.survey_id,
                question.question_text,
                question.question_type,
                question.order_index,
                question.required,
                question.category_id,
                question.media_id,
                Utc::now().to_rfc3339()
            ],
        )?;
        query_question(&conn, &id)?.ok_or(StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }

    #[instrument(level = "debug", skip(self, changes))]
    fn update_question(&self, id: &str, changes: &QuestionChanges) -> StoreResult<Option<Question>> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE questions SET question_text = COALESCE(?1, question_text), \
            question_type = COALESCE(?2, question_type), order_index = COALESCE(?3, order_index), \
            required = COALESCE(?4, required), category_id = COALESCE(?5, category_id), \
            media_id = COALESCE(?6, media_id) WHERE id = ?7",
            params![
                changes.question_text,
                changes.question_type,
                changes.order_index,
                changes.required,
                changes.category_id,
                changes.media_id,
                id
            ],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        query_question(&conn, id)
    }

    #[instrument(level = "debug", skip(self))]
    fn delete_question(&self, id: &str) -> StoreResult<bool> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM options WHERE question_id = ?1", params![id])?;
        let deleted = conn.execute("DELETE FROM questions WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    fn find_question(&self, id: &str) -> StoreResult<Option<Question>> {
        query_question(&*self.lock()?, id)
    }

    #[instrument(level = "debug", skip(self, options), fields(count = options.len()))]
    fn insert_options(&self, options: &[NewOption]) -> StoreResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut next_position = tx.prepare_cached(
                "SELECT COALESCE(MAX(position) + 1, 0) FROM options WHERE question_id = ?1",
            )?;
            let mut insert = tx.prepare_cached(
                "INSERT INTO options (id, question_id, position, shape, text, media_id, range_from, range_to, \
                from_label, to_label, icon) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for option in options {
                let position: i64 =
                    next_position.query_row(params![option.question_id], |row| row.get(0))?;
                let (text, media_id, range_from, range_to, from_label, to_label, icon) =
                    option_columns(&option.shape);
                insert.execute(params![
                    Uuid::new_v4().to_string(),
                    option.question_id,
                    position,
                    option.shape.tag(),
                    text,
                    media_id,
                    range_from,
                    range_to,
                    from_label,
                    to_label,
                    icon
                ])?;
            }
        }
        tx.commit()?;
        debug!(target: "store", count = options.len(), "Options inserted");
        Ok(options.len())
    }

    fn delete_options(&self, question_id: &str) -> StoreResult<usize> {
        let deleted = self
            .lock()?
            .execute("DELETE FROM options WHERE question_id = ?1", params![question_id])?;
        Ok(deleted)
    }

    fn list_options(&self, question_id: &str) -> StoreResult<Vec<QuestionOption>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, question_id, position, shape, text, media_id, range_from, range_to, from_label, \
            to_label, icon FROM options WHERE question_id = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map(params![question_id], option_from_row)?;
        let mut options = Vec::new();
        for row in rows {
            options.push(row?);
        }
        Ok(options)
    }

    fn in_transaction(
        &self,
        work: &mut dyn FnMut(&mut dyn SubmissionTx) -> StoreResult<()>,
    ) -> StoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut writer = SqliteTx { conn: &tx };
        // Dropping `tx` on the error path rolls the whole batch back.
        work(&mut writer)?;
        tx.commit()?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    fn load_response(&self, id: &str) -> StoreResult<Option<Response>> {
        read_response(&*self.lock()?, id)
    }

    #[instrument(level = "debug", skip(self))]
    fn list_questions(&self, survey_id: &str) -> StoreResult<Vec<Question>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{QUESTION_SELECT} WHERE q.survey_id = ?1 ORDER BY q.order_index, q.created_at, q.rowid"
        ))?;
        let rows = stmt.query_map(params![survey_id], question_from_row)?;
        let mut questions = Vec::new();
        for row in rows {
            questions.push(row?);
        }
        Ok(questions)
    }

    #[instrument(level = "debug", skip(self))]
    fn list_responses(&self, survey_id: &str) -> StoreResult<Vec<Response>> {
        let conn = self.lock()?;
        let ids = {
            let mut stmt =
                conn.prepare("SELECT id FROM responses WHERE survey_id = ?1 ORDER BY created_at, rowid")?;
            let rows = stmt.query_map(params![survey_id], |row| row.get::<_, String>(0))?;
            let mut ids = Vec::new();
            for row in rows {
                ids.push(row?);
            }
            ids
        };
        let mut responses = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(response) = read_response(&conn, &id)? {
                responses.push(response);
            }
        }
        Ok(responses)
    }

    fn find_unused_token(&self, token_hash: &str) -> StoreResult<Option<ShareToken>> {
        let token = self
            .lock()?
            .query_row(
                "SELECT id, survey_id, token_hash, recipient_email, recipient_mobile, used \
                FROM share_tokens WHERE token_hash = ?1 AND used = 0",
                params![token_hash],
                |row| {
                    Ok(ShareToken {
                        id: row.get(0)?,
                        survey_id: row.get(1)?,
                        token_hash: row.get(2)?,
                        recipient_email: row.get(3)?,
                        recipient_mobile: row.get(4)?,
                        used: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(token)
    }

    #[instrument(level = "debug", skip(self))]
    fn mark_token_used(&self, token_hash: &str) -> StoreResult<usize> {
        let changed = self.lock()?.execute(
            "UPDATE share_tokens SET used = 1 WHERE token_hash = ?1",
            params![token_hash],
        )?;
        Ok(changed)
    }
}
