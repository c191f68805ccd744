//! Assemble the application: load every resource's schema, build the models (all of
//! them, before any route exists), then mount resource and auxiliary routes.

use crate::auth::{authenticator_for, require_basic};
use crate::config::{normalize_prefix, read_app_config, validate, AppConfig, SchemaSpec};
use crate::error::{AppError, ConfigError};
use crate::ids::IdRegistry;
use crate::model::{build_model, ResourceModel};
use crate::openapi::{build_openapi, openapi_json};
use crate::prepare::adopt_table_key;
use crate::routes::{common_routes, resource_routes};
use crate::schema::{read_schema, Schema};
use crate::state::AppState;
use crate::store::{ensure_database_exists, PgStore, ResourceStore};
use axum::{middleware, Router};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;

/// Request bodies larger than this are rejected with 413.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Schema of every configured resource, keyed by resource name. Database-table resources
/// are reflected through `store`, which is then required.
pub async fn load_schemas(config: &AppConfig, store: Option<&PgStore>) -> Result<BTreeMap<String, Schema>, AppError> {
    let mut schemas = BTreeMap::new();
    for (name, table) in &config.datarest.datatables {
        let schema = match table.spec()? {
            SchemaSpec::DataResource { schema } => read_schema(&config.resolve_path(&schema))?.schema,
            SchemaSpec::DatabaseTable => {
                let store = store.ok_or_else(|| {
                    ConfigError::Validation(format!("resource '{}': database table schema needs a connection", name))
                })?;
                let mut schema = store.reflect_table(&table.dbtable).await?;
                adopt_table_key(&mut schema)?;
                schema
            }
        };
        schemas.insert(name.clone(), schema);
    }
    Ok(schemas)
}

/// Build every resource model. Any failure aborts the whole set.
pub fn build_models(
    config: &AppConfig,
    registry: &IdRegistry,
    schemas: &BTreeMap<String, Schema>,
) -> Result<Vec<Arc<ResourceModel>>, ConfigError> {
    config
        .datarest
        .datatables
        .iter()
        .map(|(name, table)| {
            let schema = schemas.get(name).ok_or_else(|| ConfigError::UnknownField {
                field: name.clone(),
                context: "loaded schemas".into(),
            })?;
            build_model(name, table, schema, registry, config.datarest.exclude_none).map(Arc::new)
        })
        .collect()
}

/// Mount the resource routers (behind authentication when configured) and the auxiliary
/// routes, all under the configured prefix.
pub fn build_router(
    config: &AppConfig,
    models: Vec<Arc<ResourceModel>>,
    store: Arc<dyn ResourceStore>,
) -> Result<Router, ConfigError> {
    validate(config)?;
    let d = &config.datarest;
    let health_checks: Vec<Arc<ResourceModel>> = match d.health.as_ref().and_then(|h| h.tables.as_ref()) {
        Some(tables) => models.iter().filter(|m| tables.contains(&m.name)).cloned().collect(),
        None => models.clone(),
    };
    let auth = d.authn.as_ref().map(authenticator_for);
    let prefix = d.app.prefix.as_deref().and_then(normalize_prefix);
    let prefix = prefix.as_deref();

    let description = d.app.description_text(&config.base_dir);
    let openapi = openapi_json(&build_openapi(&d.app, &description, prefix, &models, auth.is_some()))?;

    let mut resources = Router::new();
    for model in &models {
        resources = resources.merge(resource_routes(store.clone(), model.clone()));
    }
    let has_routes = models.iter().any(|m| !m.operations.is_empty());
    if let (Some(auth), true) = (auth, has_routes) {
        resources = resources.route_layer(middleware::from_fn_with_state(auth, require_basic));
    }

    let state = AppState {
        store,
        models: Arc::new(models),
        health_checks: Arc::new(health_checks),
        info: Arc::new(d.app.clone()),
        openapi: Arc::new(openapi),
    };
    let app = resources.merge(common_routes(state));
    let app = match prefix {
        Some(p) => Router::new().nest(p, app),
        None => app,
    };
    Ok(app.layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES)))
}

/// `run`: load config, build all models, ensure backing tables exist, serve.
pub async fn serve(config_path: &Path, bind: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = read_app_config(config_path)?;
    let database_url = config.datarest.database.url();
    ensure_database_exists(&database_url).await?;
    let store = PgStore::connect(&database_url).await?;

    let registry = IdRegistry::standard();
    let schemas = load_schemas(&config, Some(&store)).await?;
    let models = build_models(&config, &registry, &schemas)?;
    for model in &models {
        store.ensure_table(model).await?;
    }

    let app = build_router(&config, models, Arc::new(store))?;
    let listener = TcpListener::bind(bind).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
