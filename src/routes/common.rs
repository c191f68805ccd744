//! Auxiliary routes: health, info, API description.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Ok,
    /// No resources configured for checking.
    NoChecks,
    Failed,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum TableCheck {
    Passed { count: i64 },
    Failed { error: String },
}

#[derive(Debug, Serialize)]
pub struct HealthBody {
    pub status: HealthStatus,
    pub passed: usize,
    pub failed: usize,
    pub checks: BTreeMap<String, TableCheck>,
}

/// Count rows of every checked resource's table. Any failure turns the response into a 503.
async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthBody>) {
    let mut checks = BTreeMap::new();
    let (mut passed, mut failed) = (0, 0);
    for model in state.health_checks.iter() {
        let check = match state.store.count(model).await {
            Ok(count) => {
                passed += 1;
                TableCheck::Passed { count }
            }
            Err(e) => {
                failed += 1;
                tracing::warn!(resource = %model.name, table = %model.table, error = %e, "health check failed");
                TableCheck::Failed { error: e.to_string() }
            }
        };
        checks.insert(model.name.clone(), check);
    }
    let (code, status) = if checks.is_empty() {
        (StatusCode::OK, HealthStatus::NoChecks)
    } else if failed > 0 {
        (StatusCode::SERVICE_UNAVAILABLE, HealthStatus::Failed)
    } else {
        (StatusCode::OK, HealthStatus::Ok)
    };
    (
        code,
        Json(HealthBody {
            status,
            passed,
            failed,
            checks,
        }),
    )
}

async fn info(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "app": {
            "title": state.info.title,
            "version": state.info.version,
        },
        "resources": state.models.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
    }))
}

async fn openapi(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(state.openapi.as_ref().clone())
}

/// GET /health, GET /info, GET /openapi.json.
pub fn common_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/info", get(info))
        .route("/openapi.json", get(openapi))
        .with_state(state)
}
