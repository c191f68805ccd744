//! Resource models: the runtime descriptor of one exposed table, built from its
//! persisted schema (or a reflected table) and its app config entry.

use crate::config::{title_case, Operation, TableConfig};
use crate::error::{AppError, ConfigError};
use crate::ids::{IdFn, IdRegistry, IdType};
use crate::schema::{FieldType, Schema};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;

/// One JSON object per table row.
pub type Row = Map<String, Value>;

/// Computes a primary key value at insert time from other fields of the same row.
#[derive(Clone)]
pub struct IdDefault {
    pub id_type: IdType,
    pub id_fn: IdFn,
    pub src_fields: Vec<String>,
    pub sep: String,
}

impl IdDefault {
    pub fn generate(&self, row: &Row) -> String {
        let values: Vec<Value> = self
            .src_fields
            .iter()
            .map(|f| row.get(f).cloned().unwrap_or(Value::Null))
            .collect();
        (self.id_fn)(&values, &self.sep)
    }
}

impl fmt::Debug for IdDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdDefault")
            .field("id_type", &self.id_type)
            .field("src_fields", &self.src_fields)
            .field("sep", &self.sep)
            .finish()
    }
}

// Function pointers are compared by the strategy that selected them.
impl PartialEq for IdDefault {
    fn eq(&self, other: &Self) -> bool {
        self.id_type == other.id_type && self.src_fields == other.src_fields && self.sep == other.sep
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModelField {
    pub name: String,
    pub ty: FieldType,
    pub nullable: bool,
    pub primary_key: bool,
    pub description: Option<String>,
    pub example: Option<Value>,
    pub default: Option<IdDefault>,
    /// Column type of a reflected table; derived from `ty` otherwise.
    pub sql_type: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResourceModel {
    /// Resource name; also the route segment.
    pub name: String,
    /// Component name in the API description, e.g. `People`.
    pub title: String,
    pub table: String,
    pub fields: Vec<ModelField>,
    pub primary_key: String,
    pub id_type: IdType,
    pub paginate: u32,
    pub query_params: Vec<String>,
    pub operations: Vec<Operation>,
    pub exclude_none: bool,
}

/// Whether a request body is for an insert or an overwrite.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyMode {
    Create,
    Update,
}

/// Build the runtime model for one resource. Every check that could otherwise fail at
/// request time happens here.
pub fn build_model(
    name: &str,
    table: &TableConfig,
    schema: &Schema,
    registry: &IdRegistry,
    exclude_none_default: bool,
) -> Result<ResourceModel, ConfigError> {
    schema.validate()?;
    if schema.fields.is_empty() {
        return Err(ConfigError::Validation(format!("resource '{}': schema has no fields", name)));
    }
    let pk = match schema.primary_key.as_slice() {
        [] => {
            return Err(ConfigError::Validation(format!(
                "resource '{}': schema has no primary key",
                name
            )))
        }
        [pk] => pk.clone(),
        many => return Err(ConfigError::CompositeKey(many.to_vec())),
    };
    let pk_field = schema
        .field(&pk)
        .ok_or_else(|| ConfigError::UnknownField {
            field: pk.clone(),
            context: format!("resource '{}' primary key", name),
        })?;

    let (id_type, default) = match &schema.identity {
        None => (IdType::BizKey, None),
        Some(info) => {
            let id_type = info.id_type()?;
            let default = registry.get(id_type)?.map(|id_fn| IdDefault {
                id_type,
                id_fn,
                src_fields: info.id_src_fields.clone(),
                sep: info.id_sep.clone(),
            });
            (id_type, default)
        }
    };

    if default.is_none() && table.exposes(Operation::Create) && !pk_field.ty.is_integer() {
        return Err(ConfigError::NonNumericKey {
            field: pk.clone(),
            ty: pk_field.ty.to_string(),
        });
    }

    let mut fields = Vec::with_capacity(schema.fields.len());
    for f in &schema.fields {
        if f.ty == FieldType::Any {
            return Err(ConfigError::Validation(format!(
                "resource '{}': field '{}' has unresolved type 'any'",
                name, f.name
            )));
        }
        let primary_key = f.name == pk;
        fields.push(ModelField {
            name: f.name.clone(),
            ty: f.ty,
            nullable: f.nullable() && !primary_key,
            primary_key,
            description: f.description.clone(),
            example: f.example.clone(),
            default: if primary_key { default.clone() } else { None },
            sql_type: f.sql_type.clone(),
        });
    }

    let names: HashSet<&str> = fields.iter().map(|f| f.name.as_str()).collect();
    for q in &table.query_params {
        if !names.contains(q.as_str()) {
            return Err(ConfigError::UnknownField {
                field: q.clone(),
                context: format!("resource '{}' query_params", name),
            });
        }
    }

    Ok(ResourceModel {
        name: name.to_string(),
        title: title_case(name),
        table: table.dbtable.clone(),
        fields,
        primary_key: pk,
        id_type,
        paginate: table.paginate,
        query_params: table.query_params.clone(),
        operations: table.expose_routes.clone(),
        exclude_none: table.exclude_none.unwrap_or(exclude_none_default),
    })
}

impl ResourceModel {
    pub fn field(&self, name: &str) -> Option<&ModelField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn pk_field(&self) -> Option<&ModelField> {
        self.field(&self.primary_key)
    }

    pub fn exposes(&self, op: Operation) -> bool {
        self.operations.contains(&op)
    }

    pub fn collection_title(&self) -> String {
        format!("{}CollectionModel", self.title)
    }

    /// The database assigns the key (auto-increment) when the body omits it.
    pub fn storage_assigns_key(&self) -> bool {
        self.pk_field()
            .map(|f| f.default.is_none() && f.ty.is_integer())
            .unwrap_or(false)
    }

    /// Parse a path id into the key field's JSON type.
    pub fn parse_id(&self, raw: &str) -> Result<Value, AppError> {
        let ty = self.pk_field().map(|f| f.ty).unwrap_or_default();
        ty.parse_str(raw)
            .ok_or_else(|| AppError::Validation(format!("{}: '{}' is not a valid {}", self.primary_key, raw, ty)))
    }

    /// Check a request body against the model. For creates, missing keys are generated
    /// and required fields enforced; for updates, the key field is dropped after checking
    /// it is unchanged.
    pub fn validate_body(&self, body: Value, mode: BodyMode, id: Option<&Value>) -> Result<Row, AppError> {
        let mut row = match body {
            Value::Object(m) => m,
            _ => return Err(AppError::Validation("body must be a JSON object".into())),
        };
        for (k, v) in &row {
            let field = self
                .field(k)
                .ok_or_else(|| AppError::Validation(format!("unknown field '{}'", k)))?;
            if v.is_null() && !field.nullable && !(field.primary_key && mode == BodyMode::Create) {
                return Err(AppError::Validation(format!("{} may not be null", k)));
            }
            if !field.ty.accepts(v) {
                return Err(AppError::Validation(format!("{} must be of type {}", k, field.ty)));
            }
        }
        match mode {
            BodyMode::Create => {
                for f in &self.fields {
                    let present = row.get(&f.name).map(|v| !v.is_null()).unwrap_or(false);
                    if present {
                        continue;
                    }
                    if let Some(default) = &f.default {
                        let id = default.generate(&row);
                        row.insert(f.name.clone(), Value::String(id));
                    } else if f.primary_key && self.storage_assigns_key() {
                        row.remove(&f.name);
                    } else if !f.nullable {
                        return Err(AppError::Validation(format!("{} is required", f.name)));
                    }
                }
            }
            BodyMode::Update => {
                if let Some(given) = row.remove(&self.primary_key) {
                    if id.map(|id| id != &given).unwrap_or(false) {
                        return Err(AppError::Validation(format!("{} may not be changed", self.primary_key)));
                    }
                }
            }
        }
        Ok(row)
    }

    /// Drop null fields when suppression is on.
    pub fn shape_row(&self, mut row: Row) -> Row {
        if self.exclude_none {
            row.retain(|_, v| !v.is_null());
        }
        row
    }
}

/// The list response wrapper: a single field named after the resource holding all rows.
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceCollection {
    pub name: String,
    pub items: Vec<Row>,
}

impl Serialize for ResourceCollection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.name, &self.items)?;
        map.end()
    }
}
