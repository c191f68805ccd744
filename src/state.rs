//! Shared state for the generated routes.

use crate::config::AppInfo;
use crate::filter::FilterSpec;
use crate::model::ResourceModel;
use crate::store::ResourceStore;
use std::sync::Arc;

/// State of one resource's router.
#[derive(Clone)]
pub struct ResourceState {
    pub store: Arc<dyn ResourceStore>,
    pub model: Arc<ResourceModel>,
    pub filters: Arc<FilterSpec>,
}

/// State of the auxiliary routes (`/health`, `/info`, `/openapi.json`).
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ResourceStore>,
    pub models: Arc<Vec<Arc<ResourceModel>>>,
    /// Resources counted by `/health`.
    pub health_checks: Arc<Vec<Arc<ResourceModel>>>,
    pub info: Arc<AppInfo>,
    pub openapi: Arc<serde_json::Value>,
}
