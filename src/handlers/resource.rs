//! Resource CRUD handlers. Each is registered only for resources exposing its operation.

use crate::error::AppError;
use crate::filter::{Filter, Pagination};
use crate::model::{BodyMode, Row};
use crate::state::ResourceState;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::Value;

/// Query string of a list route without filter parameters.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub skip: Option<String>,
    pub limit: Option<String>,
}

fn one(state: &ResourceState, row: Row) -> Json<Value> {
    Json(Value::Object(state.model.shape_row(row)))
}

fn many(state: &ResourceState, rows: Vec<Row>) -> Json<Vec<Value>> {
    Json(
        rows.into_iter()
            .map(|r| Value::Object(state.model.shape_row(r)))
            .collect(),
    )
}

fn not_found(state: &ResourceState, id: &str) -> AppError {
    AppError::NotFound(format!("{} '{}'", state.model.name, id))
}

/// GET /R for resources without filter parameters.
pub async fn list(
    State(state): State<ResourceState>,
    Query(q): Query<PageQuery>,
) -> Result<Json<Vec<Value>>, AppError> {
    let page = Pagination::parse(q.skip.as_deref(), q.limit.as_deref(), state.model.paginate)?;
    let rows = state.store.list(&state.model, &Filter::default(), page).await?;
    Ok(many(&state, rows))
}

/// GET /R with repeatable filter parameters.
pub async fn list_filtered(
    State(state): State<ResourceState>,
    Query(q): Query<Vec<(String, String)>>,
) -> Result<Json<Vec<Value>>, AppError> {
    let page = Pagination::from_query(&q, state.model.paginate)?;
    let filter = state.filters.parse(&q)?;
    let rows = state.store.list(&state.model, &filter, page).await?;
    Ok(many(&state, rows))
}

pub async fn read_one(
    State(state): State<ResourceState>,
    Path(id_str): Path<String>,
) -> Result<Json<Value>, AppError> {
    let id = state.model.parse_id(&id_str)?;
    let row = state
        .store
        .get(&state.model, &id)
        .await?
        .ok_or_else(|| not_found(&state, &id_str))?;
    Ok(one(&state, row))
}

pub async fn create(
    State(state): State<ResourceState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let Json(body) = body?;
    let row = state.model.validate_body(body, BodyMode::Create, None)?;
    let row = state.store.insert(&state.model, row).await?;
    Ok((StatusCode::CREATED, one(&state, row)))
}

pub async fn update(
    State(state): State<ResourceState>,
    Path(id_str): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(body) = body?;
    let id = state.model.parse_id(&id_str)?;
    let row = state.model.validate_body(body, BodyMode::Update, Some(&id))?;
    let row = state
        .store
        .update(&state.model, &id, row)
        .await?
        .ok_or_else(|| not_found(&state, &id_str))?;
    Ok(one(&state, row))
}

pub async fn delete_one(
    State(state): State<ResourceState>,
    Path(id_str): Path<String>,
) -> Result<Json<Value>, AppError> {
    let id = state.model.parse_id(&id_str)?;
    let row = state
        .store
        .delete_one(&state.model, &id)
        .await?
        .ok_or_else(|| not_found(&state, &id_str))?;
    Ok(one(&state, row))
}

/// DELETE /R: returns the remaining (empty) collection.
pub async fn delete_all(State(state): State<ResourceState>) -> Result<Json<Vec<Value>>, AppError> {
    let n = state.store.delete_all(&state.model).await?;
    tracing::info!(resource = %state.model.name, rows = n, "deleted all rows");
    let page = Pagination::parse(None, None, state.model.paginate)?;
    let rows = state.store.list(&state.model, &Filter::default(), page).await?;
    Ok(many(&state, rows))
}
