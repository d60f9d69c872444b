//! HTTP endpoint handlers. These are thin wrappers that forward to the intake operations.
//! Store work runs on the blocking pool through `AppState::run`.

use std::sync::Arc;
use axum::{extract::{Path, State}, http::StatusCode, Json, response::IntoResponse};
use tracing::{info, instrument};

use crate::error::Error;
use crate::ingest::{get_response, list_responses, submit_response, submit_response_with_token};
use crate::normalize::read_answers;
use crate::options::{create_question, delete_question, get_question, list_questions, update_question};
use crate::protocol::*;
use crate::state::AppState;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state, body), fields(type_name = %body.type_name))]
pub async fn http_post_category(
  State(state): State<Arc<AppState>>,
  Json(body): Json<CategoryIn>,
) -> Result<impl IntoResponse, Error> {
  let category = state.run(move |store| Ok(store.create_category(&body.type_name)?)).await?;
  info!(target: "category", id = %category.id, "HTTP category created");
  Ok((StatusCode::CREATED, Json(CategoryOut { message: "Category created successfully", category })))
}

#[instrument(level = "info", skip(state, body), fields(survey_id = %body.question.survey_id, options = body.options.len()))]
pub async fn http_post_question(
  State(state): State<Arc<AppState>>,
  Json(body): Json<CreateQuestionIn>,
) -> Result<impl IntoResponse, Error> {
  let question = state
    .run(move |store| create_question(store, &body.question, &body.options))
    .await?;
  Ok((StatusCode::CREATED, Json(QuestionOut { message: "Question created successfully", question })))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_question(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<impl IntoResponse, Error> {
  let question = state.run(move |store| get_question(store, &id)).await?;
  Ok(Json(QuestionOut { message: "Question fetched successfully", question }))
}

#[instrument(level = "info", skip(state, body), fields(options = body.options.len()))]
pub async fn http_put_question(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<UpdateQuestionIn>,
) -> Result<impl IntoResponse, Error> {
  let question = state
    .run(move |store| update_question(store, &id, &body.changes, &body.options))
    .await?;
  Ok(Json(QuestionOut { message: "Question updated successfully", question }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_delete_question(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<impl IntoResponse, Error> {
  state.run(move |store| delete_question(store, &id)).await?;
  Ok(Json(MessageOut { message: "Question deleted successfully" }))
}

#[instrument(level = "info", skip(state, body), fields(survey_id = %body.survey_id, answers = body.answers.len()))]
pub async fn http_post_response(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SubmitResponseIn>,
) -> Result<impl IntoResponse, Error> {
  let submission = state
    .run(move |store| submit_response(store, &body.survey_id, body.user_metadata, &read_answers(&body.answers)))
    .await?;
  info!(target: "ingest", id = %submission.response.id, "HTTP response submitted");
  Ok((
    StatusCode::CREATED,
    Json(SubmitOut {
      message: "Response submitted",
      response: submission.response,
      skipped_question_ids: submission.skipped_question_ids,
    }),
  ))
}

#[instrument(level = "info", skip(state, body), fields(answers = body.answers.len()))]
pub async fn http_post_response_with_token(
  State(state): State<Arc<AppState>>,
  Json(body): Json<TokenSubmitIn>,
) -> Result<impl IntoResponse, Error> {
  let submission = state
    .run(move |store| {
      submit_response_with_token(store, &body.token, body.user_metadata, &read_answers(&body.answers))
    })
    .await?;
  info!(target: "ingest", id = %submission.response.id, "HTTP token response submitted");
  Ok((
    StatusCode::CREATED,
    Json(SubmitOut {
      message: "Response submitted",
      response: submission.response,
      skipped_question_ids: submission.skipped_question_ids,
    }),
  ))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_response(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<impl IntoResponse, Error> {
  let data = state.run(move |store| get_response(store, &id)).await?;
  Ok(Json(ResponseOut { message: "Response fetched successfully", data }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_survey_questions(
  State(state): State<Arc<AppState>>,
  Path(survey_id): Path<String>,
) -> Result<impl IntoResponse, Error> {
  let questions = state.run(move |store| list_questions(store, &survey_id)).await?;
  Ok(Json(QuestionListOut { message: "Questions fetched successfully", questions }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_survey_responses(
  State(state): State<Arc<AppState>>,
  Path(survey_id): Path<String>,
) -> Result<impl IntoResponse, Error> {
  let data = state.run(move |store| list_responses(store, &survey_id)).await?;
  info!(target: "ingest", count = data.len(), "HTTP survey responses listed");
  Ok(Json(ResponseListOut { message: "Responses fetched successfully", data }))
}
