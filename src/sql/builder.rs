//! Builds parameterized SELECT, INSERT, UPDATE, DELETE and DDL from a resource model.

use crate::filter::{Filter, Pagination};
use crate::model::{ModelField, ResourceModel, Row};
use crate::schema::FieldType;
use serde_json::Value;

/// Quote identifier for PostgreSQL (safe: only from config).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// `schema.table` or `table`, each part quoted.
pub fn qualified_table(table: &str) -> String {
    table.split('.').map(quoted).collect::<Vec<_>>().join(".")
}

#[derive(Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }
}

/// Type rows are read back as, so decoding depends only on the field type.
fn read_type(ty: FieldType) -> &'static str {
    match ty {
        FieldType::Integer => "bigint",
        FieldType::Number => "double precision",
        FieldType::Boolean => "boolean",
        FieldType::String | FieldType::Complex | FieldType::Any => "text",
    }
}

/// Column type for DDL and write casts.
pub fn column_type(field: &ModelField) -> String {
    if let Some(t) = &field.sql_type {
        return t.clone();
    }
    match field.ty {
        FieldType::Integer => "BIGINT".into(),
        FieldType::Number => "DOUBLE PRECISION".into(),
        FieldType::Boolean => "BOOLEAN".into(),
        FieldType::String | FieldType::Complex | FieldType::Any => "TEXT".into(),
    }
}

fn write_placeholder(field: &ModelField, n: u32) -> String {
    format!("${}::{}", n, column_type(field))
}

fn select_column_list(model: &ResourceModel) -> String {
    model
        .fields
        .iter()
        .map(|f| {
            let q = quoted(&f.name);
            format!("{}::{} AS {}", q, read_type(f.ty), q)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn pk_field(model: &ResourceModel) -> (&str, &'static str) {
    let ty = model.pk_field().map(|f| f.ty).unwrap_or_default();
    (model.primary_key.as_str(), read_type(ty))
}

/// `"pk"::T = $n::T`, comparing in the read type.
fn pk_predicate(model: &ResourceModel, n: u32) -> String {
    let (pk, t) = pk_field(model);
    format!("{}::{} = ${}::{}", quoted(pk), t, n, t)
}

/// SELECT by primary key. Caller adds id as sole param.
pub fn select_by_id(model: &ResourceModel, id: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let n = q.push_param(id.clone());
    q.sql = format!(
        "SELECT {} FROM {} WHERE {}",
        select_column_list(model),
        qualified_table(&model.table),
        pk_predicate(model, n)
    );
    q
}

/// SELECT with the AND-of-OR filter, ORDER BY pk, LIMIT/OFFSET.
pub fn select_list(model: &ResourceModel, filter: &Filter, page: Pagination) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut where_parts = Vec::new();
    for term in &filter.terms {
        let Some(field) = model.field(&term.field) else { continue };
        let t = read_type(field.ty);
        let alternatives: Vec<String> = term
            .values
            .iter()
            .map(|v| {
                let n = q.push_param(v.clone());
                format!("{}::{} = ${}::{}", quoted(&field.name), t, n, t)
            })
            .collect();
        if alternatives.is_empty() {
            continue;
        }
        where_parts.push(format!("({})", alternatives.join(" OR ")));
    }
    let where_clause = if where_parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", where_parts.join(" AND "))
    };
    q.sql = format!(
        "SELECT {} FROM {}{} ORDER BY {} LIMIT {} OFFSET {}",
        select_column_list(model),
        qualified_table(&model.table),
        where_clause,
        quoted(&model.primary_key),
        page.limit,
        page.skip
    );
    q
}

pub fn count(model: &ResourceModel) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.sql = format!("SELECT COUNT(*) FROM {}", qualified_table(&model.table));
    q
}

/// INSERT the fields present in `row`, in model order. Returns the stored row.
pub fn insert(model: &ResourceModel, row: &Row) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for f in &model.fields {
        let Some(val) = row.get(&f.name) else { continue };
        let n = q.push_param(val.clone());
        cols.push(quoted(&f.name));
        placeholders.push(write_placeholder(f, n));
    }
    let table = qualified_table(&model.table);
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, select_column_list(model))
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table,
            cols.join(", "),
            placeholders.join(", "),
            select_column_list(model)
        )
    };
    q
}

/// UPDATE by id: SET only non-key model fields present in `row`.
pub fn update(model: &ResourceModel, id: &Value, row: &Row) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for f in model.fields.iter().filter(|f| !f.primary_key) {
        let Some(val) = row.get(&f.name) else { continue };
        let n = q.push_param(val.clone());
        sets.push(format!("{} = {}", quoted(&f.name), write_placeholder(f, n)));
    }
    if sets.is_empty() {
        return select_by_id(model, id);
    }
    let n = q.push_param(id.clone());
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} RETURNING {}",
        qualified_table(&model.table),
        sets.join(", "),
        pk_predicate(model, n),
        select_column_list(model)
    );
    q
}

/// DELETE by id, returning the deleted row.
pub fn delete_one(model: &ResourceModel, id: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let n = q.push_param(id.clone());
    q.sql = format!(
        "DELETE FROM {} WHERE {} RETURNING {}",
        qualified_table(&model.table),
        pk_predicate(model, n),
        select_column_list(model)
    );
    q
}

pub fn delete_all(model: &ResourceModel) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.sql = format!("DELETE FROM {}", qualified_table(&model.table));
    q
}

/// CREATE TABLE IF NOT EXISTS. A storage-assigned integer key becomes BIGSERIAL.
pub fn create_table(model: &ResourceModel) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut defs: Vec<String> = model
        .fields
        .iter()
        .map(|f| {
            let ty = if f.primary_key && model.storage_assigns_key() && f.sql_type.is_none() {
                "BIGSERIAL".to_string()
            } else {
                column_type(f)
            };
            let null = if f.nullable { "" } else { " NOT NULL" };
            format!("{} {}{}", quoted(&f.name), ty, null)
        })
        .collect();
    defs.push(format!("PRIMARY KEY ({})", quoted(&model.primary_key)));
    q.sql = format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        qualified_table(&model.table),
        defs.join(", ")
    );
    q
}

/// Move a serial key's sequence past the largest stored key (after loading explicit ids).
pub fn sync_key_sequence(model: &ResourceModel) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(&model.table);
    q.push_param(Value::String(table.clone()));
    q.push_param(Value::String(model.primary_key.clone()));
    q.sql = format!(
        "SELECT setval(pg_get_serial_sequence($1::text, $2::text), COALESCE((SELECT MAX({}) FROM {}), 0) + 1, false)",
        quoted(&model.primary_key),
        table
    );
    q
}
