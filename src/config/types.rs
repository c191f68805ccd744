//! Raw config types matching the app.yaml document.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

pub const DATA_RESOURCE_SPEC: &str = "https://specs.frictionlessdata.io/data-resource/";
pub const DATABASE_TABLE_SPEC: &str = "https://www.sqlalchemy.org/";

pub const DEFAULT_PAGINATE: u32 = 10;
pub const DEFAULT_CONNECT_STRING: &str = "postgres://localhost/datarest";

/// Exposable CRUD operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    GetAll,
    GetOne,
    DeleteAll,
    DeleteOne,
    Create,
    Update,
}

impl Operation {
    pub const ALL: [Operation; 6] = [
        Operation::GetAll,
        Operation::GetOne,
        Operation::DeleteAll,
        Operation::DeleteOne,
        Operation::Create,
        Operation::Update,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::GetAll => "get_all",
            Operation::GetOne => "get_one",
            Operation::DeleteAll => "delete_all",
            Operation::DeleteOne => "delete_one",
            Operation::Create => "create",
            Operation::Update => "update",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Operation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|o| o.as_str() == s)
            .ok_or_else(|| ConfigError::Validation(format!("unknown operation '{}'", s)))
    }
}

/// Where a resource's schema comes from, dispatched once when models are built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SchemaSpec {
    /// A persisted data resource descriptor file.
    DataResource { schema: PathBuf },
    /// Reflected from the existing database table.
    DatabaseTable,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableConfig {
    pub schema_spec: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub dbtable: String,
    #[serde(default = "default_paginate")]
    pub paginate: u32,
    #[serde(default = "default_expose_routes")]
    pub expose_routes: Vec<Operation>,
    #[serde(default)]
    pub query_params: Vec<String>,
    /// Overrides the router-wide null suppression setting for this resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_none: Option<bool>,
}

fn default_paginate() -> u32 {
    DEFAULT_PAGINATE
}

fn default_expose_routes() -> Vec<Operation> {
    vec![Operation::GetOne]
}

fn default_true() -> bool {
    true
}

impl TableConfig {
    pub fn data_resource(dbtable: &str, schema: &str) -> Self {
        TableConfig {
            schema_spec: DATA_RESOURCE_SPEC.to_string(),
            schema: Some(schema.to_string()),
            dbtable: dbtable.to_string(),
            paginate: DEFAULT_PAGINATE,
            expose_routes: default_expose_routes(),
            query_params: Vec::new(),
            exclude_none: None,
        }
    }

    pub fn exposes(&self, op: Operation) -> bool {
        self.expose_routes.contains(&op)
    }

    pub fn spec(&self) -> Result<SchemaSpec, ConfigError> {
        match self.schema_spec.as_str() {
            DATA_RESOURCE_SPEC => {
                let schema = self.schema.as_ref().ok_or_else(|| {
                    ConfigError::Validation(format!("table '{}': data resource spec requires 'schema'", self.dbtable))
                })?;
                Ok(SchemaSpec::DataResource {
                    schema: PathBuf::from(schema),
                })
            }
            DATABASE_TABLE_SPEC => Ok(SchemaSpec::DatabaseTable),
            other => Err(ConfigError::UnsupportedSchemaSpec(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppInfo {
    pub title: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// Literal text, or the path of a file holding it.
    #[serde(default)]
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub connect_string: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "authn_type")]
pub enum AuthnConfig {
    /// HTTP Basic frontend validated against a static user table.
    #[serde(rename = "HTTPBasic")]
    HttpBasic {
        #[serde(default)]
        users: BTreeMap<String, String>,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Resources to check; all configured resources when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tables: Option<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Datarest {
    pub app: AppInfo,
    pub database: DatabaseConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authn: Option<AuthnConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthConfig>,
    #[serde(default = "default_true")]
    pub exclude_none: bool,
    pub datatables: BTreeMap<String, TableConfig>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub datarest: Datarest,
    /// Directory relative schema paths are resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Inputs for generating a fresh single-resource app config.
#[derive(Clone, Debug)]
pub struct AppConfigOptions {
    pub table: String,
    pub schema_spec: SchemaSpec,
    pub description: String,
    pub prefix: Option<String>,
    pub connect_string: String,
    pub expose_routes: Vec<Operation>,
    pub query_params: Vec<String>,
    pub paginate: u32,
}

impl AppConfigOptions {
    pub fn new(table: &str) -> Self {
        AppConfigOptions {
            table: table.to_string(),
            schema_spec: SchemaSpec::DataResource {
                schema: PathBuf::from(format!("{}.yaml", table)),
            },
            description: String::new(),
            prefix: None,
            connect_string: DEFAULT_CONNECT_STRING.to_string(),
            expose_routes: default_expose_routes(),
            query_params: Vec::new(),
            paginate: DEFAULT_PAGINATE,
        }
    }
}

/// Lowercase, whitespace runs to `-`, surrounding slashes dropped, single leading `/`.
pub fn normalize_prefix(prefix: &str) -> Option<String> {
    let p = prefix.to_lowercase().split_whitespace().collect::<Vec<_>>().join("-");
    let p = p.trim_matches('/');
    if p.is_empty() {
        None
    } else {
        Some(format!("/{}", p))
    }
}

/// "people_data" -> "People_Data"
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut upper_next = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if upper_next {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            upper_next = false;
        } else {
            out.push(c);
            upper_next = true;
        }
    }
    out
}

impl AppConfig {
    pub fn for_table(opts: AppConfigOptions) -> Self {
        let (schema_spec, schema) = match &opts.schema_spec {
            SchemaSpec::DataResource { schema } => (DATA_RESOURCE_SPEC, Some(schema.display().to_string())),
            SchemaSpec::DatabaseTable => (DATABASE_TABLE_SPEC, None),
        };
        let table = TableConfig {
            schema_spec: schema_spec.to_string(),
            schema,
            dbtable: opts.table.clone(),
            paginate: opts.paginate,
            expose_routes: opts.expose_routes,
            query_params: opts.query_params,
            exclude_none: None,
        };
        AppConfig {
            datarest: Datarest {
                app: AppInfo {
                    title: title_case(&opts.table),
                    version: "0.1.0".into(),
                    prefix: opts.prefix.as_deref().and_then(normalize_prefix),
                    description: opts.description,
                },
                database: DatabaseConfig {
                    connect_string: opts.connect_string,
                },
                authn: None,
                health: None,
                exclude_none: true,
                datatables: BTreeMap::from([(opts.table, table)]),
            },
            base_dir: PathBuf::from("."),
        }
    }
}
