//! datarest: turn a delimited data file or a database table into a CRUD REST API
//! over PostgreSQL, driven by a YAML app config.

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod ids;
pub mod model;
pub mod openapi;
pub mod prepare;
pub mod routes;
pub mod schema;
pub mod sql;
pub mod state;
pub mod store;

pub use app::{build_models, build_router, load_schemas, serve};
pub use config::{read_app_config, AppConfig, Operation, TableConfig};
pub use error::{AppError, ConfigError};
pub use ids::{IdRegistry, IdType};
pub use model::{build_model, ResourceModel, Row};
pub use prepare::{init_table, load_datafile, prepare_datafile, DatafileOptions, TableOptions};
pub use state::AppState;
pub use store::{ensure_database_exists, PgStore, ResourceStore};
