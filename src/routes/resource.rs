//! Per-resource CRUD routes generated from the resource model.
//! Only exposed operations get a route; everything else is left unregistered.

use crate::config::Operation;
use crate::filter::FilterSpec;
use crate::handlers::resource::{create, delete_all, delete_one, list, list_filtered, read_one, update};
use crate::model::ResourceModel;
use crate::state::ResourceState;
use crate::store::ResourceStore;
use axum::http::Method;
use axum::routing::{delete, get, post, put, MethodRouter};
use axum::Router;
use std::sync::Arc;

/// One registered operation: method and path (OpenAPI `{id}` form).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteSpec {
    pub operation: Operation,
    pub method: Method,
    pub path: String,
}

pub fn collection_path(model: &ResourceModel) -> String {
    format!("/{}", model.name)
}

pub fn item_path(model: &ResourceModel) -> String {
    format!("/{}/{{id}}", model.name)
}

/// The routes a resource gets, in its configured operation order.
pub fn route_table(model: &ResourceModel) -> Vec<RouteSpec> {
    model
        .operations
        .iter()
        .map(|&operation| {
            let (method, path) = match operation {
                Operation::GetAll => (Method::GET, collection_path(model)),
                Operation::Create => (Method::POST, collection_path(model)),
                Operation::DeleteAll => (Method::DELETE, collection_path(model)),
                Operation::GetOne => (Method::GET, item_path(model)),
                Operation::Update => (Method::PUT, item_path(model)),
                Operation::DeleteOne => (Method::DELETE, item_path(model)),
            };
            RouteSpec { operation, method, path }
        })
        .collect()
}

fn add(slot: &mut Option<MethodRouter<ResourceState>>, m: MethodRouter<ResourceState>) {
    *slot = Some(match slot.take() {
        Some(existing) => existing.merge(m),
        None => m,
    });
}

pub fn resource_routes(store: Arc<dyn ResourceStore>, model: Arc<ResourceModel>) -> Router {
    let filters = Arc::new(FilterSpec::for_model(&model));
    let mut collection = None;
    let mut item = None;
    for op in &model.operations {
        match op {
            Operation::GetAll if filters.is_empty() => add(&mut collection, get(list)),
            Operation::GetAll => add(&mut collection, get(list_filtered)),
            Operation::Create => add(&mut collection, post(create)),
            Operation::DeleteAll => add(&mut collection, delete(delete_all)),
            Operation::GetOne => add(&mut item, get(read_one)),
            Operation::Update => add(&mut item, put(update)),
            Operation::DeleteOne => add(&mut item, delete(delete_one)),
        }
    }

    let mut router = Router::new();
    if let Some(m) = collection {
        router = router.route(&collection_path(&model), m);
    }
    if let Some(m) = item {
        router = router.route(&format!("/{}/:id", model.name), m);
    }
    tracing::info!(
        resource = %model.name,
        table = %model.table,
        operations = ?model.operations,
        filters = ?filters.params.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
        "registered resource routes"
    );
    router.with_state(ResourceState { store, model, filters })
}
