#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use datarest::config::{parse_app_config, AppConfig};
use datarest::error::AppError;
use datarest::filter::{Filter, Pagination};
use datarest::ids::{IdRegistry, IdType};
use datarest::model::{ResourceModel, Row};
use datarest::schema::{primary_key_step, Field, FieldType, PrimaryKeyOptions, Schema};
use datarest::store::ResourceStore;
use datarest::{build_models, build_router};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

/// In-memory rows per table, kept in key order.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<BTreeMap<String, Vec<Row>>>,
    failing: bool,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(MemoryStore::default())
    }

    /// Every call fails with a database error.
    pub fn failing() -> Arc<Self> {
        Arc::new(MemoryStore {
            failing: true,
            ..Default::default()
        })
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables.lock().unwrap().get(table).cloned().unwrap_or_default()
    }

    fn check(&self) -> Result<(), AppError> {
        if self.failing {
            return Err(AppError::Db(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

fn cmp_values(a: &Value, b: &Value) -> Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

fn same_key(row: &Row, model: &ResourceModel, id: &Value) -> bool {
    row.get(&model.primary_key)
        .map(|v| cmp_values(v, id) == Ordering::Equal)
        .unwrap_or(false)
}

/// Every model field present, missing ones null, like a stored row read back.
fn complete(model: &ResourceModel, mut row: Row) -> Row {
    for f in &model.fields {
        row.entry(f.name.clone()).or_insert(Value::Null);
    }
    row
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn list(&self, model: &ResourceModel, filter: &Filter, page: Pagination) -> Result<Vec<Row>, AppError> {
        self.check()?;
        Ok(self
            .rows(&model.table)
            .into_iter()
            .filter(|r| filter.matches(r))
            .skip(page.skip as usize)
            .take(page.limit as usize)
            .collect())
    }

    async fn get(&self, model: &ResourceModel, id: &Value) -> Result<Option<Row>, AppError> {
        self.check()?;
        Ok(self.rows(&model.table).into_iter().find(|r| same_key(r, model, id)))
    }

    async fn insert(&self, model: &ResourceModel, mut row: Row) -> Result<Row, AppError> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(model.table.clone()).or_default();
        let pk = model.primary_key.clone();
        if !row.contains_key(&pk) && model.storage_assigns_key() {
            let next = rows.iter().filter_map(|r| r.get(&pk).and_then(Value::as_i64)).max().unwrap_or(0) + 1;
            row.insert(pk.clone(), Value::from(next));
        }
        let id = row.get(&pk).cloned().unwrap_or(Value::Null);
        if rows.iter().any(|r| same_key(r, model, &id)) {
            return Err(AppError::Conflict(format!("{} {} exists", model.name, id)));
        }
        let row = complete(model, row);
        rows.push(row.clone());
        rows.sort_by(|a, b| cmp_values(&a[&pk], &b[&pk]));
        Ok(row)
    }

    async fn update(&self, model: &ResourceModel, id: &Value, row: Row) -> Result<Option<Row>, AppError> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(model.table.clone()).or_default();
        Ok(rows.iter_mut().find(|r| same_key(r, model, id)).map(|stored| {
            stored.extend(row);
            stored.clone()
        }))
    }

    async fn delete_one(&self, model: &ResourceModel, id: &Value) -> Result<Option<Row>, AppError> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(model.table.clone()).or_default();
        Ok(rows
            .iter()
            .position(|r| same_key(r, model, id))
            .map(|i| rows.remove(i)))
    }

    async fn delete_all(&self, model: &ResourceModel) -> Result<u64, AppError> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();
        Ok(tables.remove(&model.table).map(|r| r.len() as u64).unwrap_or(0))
    }

    async fn count(&self, model: &ResourceModel) -> Result<i64, AppError> {
        self.check()?;
        Ok(self.rows(&model.table).len() as i64)
    }
}

/// name, city, age; keyed per `id_type` on the given fields.
pub fn people_schema(id_type: IdType, pk: &[&str]) -> Schema {
    let mut s = Schema::new(vec![
        Field::new("name", FieldType::String).required(),
        Field::new("city", FieldType::String),
        Field::new("age", FieldType::Integer),
    ]);
    let opts = PrimaryKeyOptions::new(id_type)
        .primary_key(pk.iter().copied())
        .create_exposed(true);
    primary_key_step(&s, &IdRegistry::standard(), &opts)
        .unwrap()
        .apply(&mut s);
    s
}

/// App config for a single `people` resource. `extra` is appended under `datarest:`,
/// `table` under the resource entry; both indented by the caller's YAML.
pub fn people_config(table: &str, extra: &str) -> AppConfig {
    let yaml = format!(
        "datarest:\n  app:\n    title: People\n    version: 0.1.0\n  database:\n    connect_string: postgres://localhost/test\n{extra}  datatables:\n    people:\n      schema_spec: https://specs.frictionlessdata.io/data-resource/\n      schema: people.yaml\n      dbtable: people\n{table}",
    );
    parse_app_config(&yaml, Path::new(".")).unwrap()
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub model: Arc<ResourceModel>,
}

pub fn test_app_with(config: &AppConfig, schema: Schema, store: Arc<MemoryStore>) -> TestApp {
    let schemas = BTreeMap::from([("people".to_string(), schema)]);
    let models = build_models(config, &IdRegistry::standard(), &schemas).unwrap();
    let model = models[0].clone();
    let router = build_router(config, models, store.clone()).unwrap();
    TestApp { router, store, model }
}

pub fn test_app(config: &AppConfig, schema: Schema) -> TestApp {
    test_app_with(config, schema, MemoryStore::new())
}

impl TestApp {
    pub async fn seed(&self, rows: Value) {
        for row in rows.as_array().unwrap() {
            let row = self
                .model
                .validate_body(row.clone(), datarest::model::BodyMode::Create, None)
                .unwrap();
            self.store.insert(&self.model, row).await.unwrap();
        }
    }

    pub async fn send(&self, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, headers, body)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let (status, _, body) = self.send(Request::get(uri).body(Body::empty()).unwrap()).await;
        (status, body)
    }

    pub async fn json(&self, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, _, body) = self.send(req).await;
        (status, body)
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        let (status, _, body) = self.send(Request::delete(uri).body(Body::empty()).unwrap()).await;
        (status, body)
    }
}
