//! Row storage behind the generated routes: the `ResourceStore` interface and its
//! PostgreSQL implementation, plus table creation, bulk loading and reflection.

use crate::error::AppError;
use crate::filter::{Filter, Pagination};
use crate::model::{ResourceModel, Row};
use crate::schema::{Field, FieldType, Schema};
use crate::sql::{self, PgBindValue, QueryBuf};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{ConnectOptions, Row as _};
use std::str::FromStr;

/// Generic query interface used by the route handlers. Each call acquires and
/// releases its own connection.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Rows matching `filter`, ordered by primary key, paged.
    async fn list(&self, model: &ResourceModel, filter: &Filter, page: Pagination) -> Result<Vec<Row>, AppError>;

    async fn get(&self, model: &ResourceModel, id: &Value) -> Result<Option<Row>, AppError>;

    /// Insert one row; returns it as stored (including storage-assigned keys).
    async fn insert(&self, model: &ResourceModel, row: Row) -> Result<Row, AppError>;

    /// Overwrite the given non-key fields. `None` when `id` does not exist.
    async fn update(&self, model: &ResourceModel, id: &Value, row: Row) -> Result<Option<Row>, AppError>;

    /// Delete one row, returning it. `None` when `id` does not exist.
    async fn delete_one(&self, model: &ResourceModel, id: &Value) -> Result<Option<Row>, AppError>;

    /// Delete every row; returns the number deleted.
    async fn delete_all(&self, model: &ResourceModel) -> Result<u64, AppError>;

    async fn count(&self, model: &ResourceModel) -> Result<i64, AppError>;
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(PgStore { pool })
    }

    /// CREATE TABLE IF NOT EXISTS for the model's backing table.
    pub async fn ensure_table(&self, model: &ResourceModel) -> Result<(), AppError> {
        let q = sql::create_table(model);
        tracing::debug!(sql = %q.sql, "ddl");
        sqlx::query(&q.sql).execute(&self.pool).await?;
        Ok(())
    }

    /// Insert rows as they arrive, all in one transaction. A bad row rolls back the load.
    /// A serial key's sequence is moved past the loaded ids.
    pub async fn load_rows<I, E>(&self, model: &ResourceModel, rows: I) -> Result<u64, AppError>
    where
        I: IntoIterator<Item = Result<Row, E>>,
        AppError: From<E>,
    {
        let mut tx = self.pool.begin().await?;
        let mut n = 0u64;
        for row in rows {
            let q = sql::insert(model, &row?);
            bind_all(sqlx::query(&q.sql), &q.params).execute(&mut *tx).await?;
            n += 1;
        }
        if model.storage_assigns_key() {
            let q = sql::sync_key_sequence(model);
            tracing::debug!(sql = %q.sql, params = ?q.params, "query (tx)");
            bind_all(sqlx::query(&q.sql), &q.params).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        tracing::info!(table = %model.table, rows = n, "loaded rows");
        Ok(n)
    }

    /// Describe an existing table: columns in order, types, nullability and primary key.
    pub async fn reflect_table(&self, table: &str) -> Result<Schema, AppError> {
        let qualified = sql::qualified_table(table);
        let columns = sqlx::query(
            "SELECT a.attname::text AS name, format_type(a.atttypid, a.atttypmod) AS sql_type, a.attnotnull AS not_null \
             FROM pg_attribute a WHERE a.attrelid = $1::regclass AND a.attnum > 0 AND NOT a.attisdropped \
             ORDER BY a.attnum",
        )
        .bind(&qualified)
        .fetch_all(&self.pool)
        .await?;
        if columns.is_empty() {
            return Err(AppError::NotFound(format!("table {}", table)));
        }
        let mut fields = Vec::with_capacity(columns.len());
        for c in &columns {
            let name: String = c.try_get("name")?;
            let sql_type: String = c.try_get("sql_type")?;
            let not_null: bool = c.try_get("not_null")?;
            let mut field = Field::new(name, field_type_for_sql(&sql_type));
            field.constraints.required = not_null;
            field.sql_type = Some(sql_type);
            fields.push(field);
        }
        let primary_key: Vec<String> = sqlx::query_scalar(
            "SELECT a.attname::text FROM pg_index i \
             JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey) \
             WHERE i.indrelid = $1::regclass AND i.indisprimary ORDER BY array_position(i.indkey, a.attnum)",
        )
        .bind(&qualified)
        .fetch_all(&self.pool)
        .await?;
        tracing::debug!(table = %table, columns = fields.len(), primary_key = ?primary_key, "reflected table");
        let mut schema = Schema::new(fields);
        schema.primary_key = primary_key;
        Ok(schema)
    }

    async fn fetch_optional(&self, model: &ResourceModel, q: &QueryBuf) -> Result<Option<Row>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let row = bind_all(sqlx::query(&q.sql), &q.params)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_json(model, &r)).transpose()
    }
}

/// Column type name to field type; unknown and temporal types are read as strings.
pub fn field_type_for_sql(sql_type: &str) -> FieldType {
    let t = sql_type.to_lowercase();
    if t.ends_with("[]") {
        return FieldType::String;
    }
    if ["smallint", "integer", "bigint", "smallserial", "serial", "bigserial"]
        .iter()
        .any(|p| t == *p)
    {
        FieldType::Integer
    } else if t == "real" || t == "double precision" || t.starts_with("numeric") {
        FieldType::Number
    } else if t == "boolean" {
        FieldType::Boolean
    } else {
        FieldType::String
    }
}

fn bind_all<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    params: &[Value],
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    for p in params {
        query = query.bind(PgBindValue::from_json(p));
    }
    query
}

/// Decode a row selected with the builder's select list; each column arrives in its field's read type.
fn row_to_json(model: &ResourceModel, row: &PgRow) -> Result<Row, AppError> {
    let mut map = Row::new();
    for f in &model.fields {
        let name = f.name.as_str();
        let v = match f.ty {
            FieldType::Integer => row.try_get::<Option<i64>, _>(name)?.map(Value::from),
            FieldType::Number => row
                .try_get::<Option<f64>, _>(name)?
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number),
            FieldType::Boolean => row.try_get::<Option<bool>, _>(name)?.map(Value::Bool),
            FieldType::String | FieldType::Complex | FieldType::Any => {
                row.try_get::<Option<String>, _>(name)?.map(Value::String)
            }
        };
        map.insert(f.name.clone(), v.unwrap_or(Value::Null));
    }
    Ok(map)
}

#[async_trait]
impl ResourceStore for PgStore {
    async fn list(&self, model: &ResourceModel, filter: &Filter, page: Pagination) -> Result<Vec<Row>, AppError> {
        let q = sql::select_list(model, filter, page);
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let rows = bind_all(sqlx::query(&q.sql), &q.params)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(|r| row_to_json(model, r)).collect()
    }

    async fn get(&self, model: &ResourceModel, id: &Value) -> Result<Option<Row>, AppError> {
        self.fetch_optional(model, &sql::select_by_id(model, id)).await
    }

    async fn insert(&self, model: &ResourceModel, row: Row) -> Result<Row, AppError> {
        self.fetch_optional(model, &sql::insert(model, &row))
            .await?
            .ok_or(AppError::Db(sqlx::Error::RowNotFound))
    }

    async fn update(&self, model: &ResourceModel, id: &Value, row: Row) -> Result<Option<Row>, AppError> {
        self.fetch_optional(model, &sql::update(model, id, &row)).await
    }

    async fn delete_one(&self, model: &ResourceModel, id: &Value) -> Result<Option<Row>, AppError> {
        self.fetch_optional(model, &sql::delete_one(model, id)).await
    }

    async fn delete_all(&self, model: &ResourceModel) -> Result<u64, AppError> {
        let q = sql::delete_all(model);
        tracing::debug!(sql = %q.sql, "query");
        let done = sqlx::query(&q.sql).execute(&self.pool).await?;
        Ok(done.rows_affected())
    }

    async fn count(&self, model: &ResourceModel) -> Result<i64, AppError> {
        let q = sql::count(model);
        tracing::debug!(sql = %q.sql, "query");
        let n: i64 = sqlx::query_scalar(&q.sql).fetch_one(&self.pool).await?;
        Ok(n)
    }
}

/// Create the database named in `database_url` when missing (connects to `postgres` on the same server).
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)
        .map_err(|e| AppError::BadRequest(format!("invalid database url: {}", e)))?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        tracing::info!(database = %db_name, "creating database");
        sqlx::query(&format!("CREATE DATABASE {}", sql::quoted(&db_name)))
            .execute(&mut conn)
            .await?;
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), AppError> {
    let scheme_end = url.find("://").map(|i| i + 3).unwrap_or(0);
    let path_start = url
        .get(scheme_end..)
        .and_then(|rest| rest.find('/'))
        .map(|i| scheme_end + i + 1)
        .ok_or_else(|| AppError::BadRequest("database url: no database path".into()))?;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let (db_name, query) = match path_and_query.split_once('?') {
        Some((db, q)) => (db.trim(), Some(q)),
        None => (path_and_query.trim(), None),
    };
    let base = url.get(..path_start).unwrap_or(url);
    let admin_url = match query {
        Some(q) => format!("{}postgres?{}", base, q),
        None => format!("{}postgres", base),
    };
    Ok((admin_url, db_name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sql_types_map_to_field_types() {
        assert_eq!(field_type_for_sql("integer"), FieldType::Integer);
        assert_eq!(field_type_for_sql("bigint"), FieldType::Integer);
        assert_eq!(field_type_for_sql("numeric(10,2)"), FieldType::Number);
        assert_eq!(field_type_for_sql("boolean"), FieldType::Boolean);
        assert_eq!(field_type_for_sql("character varying(20)"), FieldType::String);
        assert_eq!(field_type_for_sql("timestamp without time zone"), FieldType::String);
        assert_eq!(field_type_for_sql("integer[]"), FieldType::String);
    }

    #[test]
    fn admin_url_targets_postgres_db() {
        let (admin, db) = parse_db_name_from_url("postgres://u:p@host:5432/people?sslmode=disable").unwrap();
        assert_eq!(admin, "postgres://u:p@host:5432/postgres?sslmode=disable");
        assert_eq!(db, "people");
        assert!(parse_db_name_from_url("postgres://host").is_err());
    }
}
