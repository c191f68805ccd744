//! Convert serde_json::Value to types that sqlx can bind.

use serde_json::Value;
use sqlx::encode::{Encode, IsNull};
use sqlx::postgres::{PgTypeInfo, Postgres};
use sqlx::Database;

/// A value that can be bound to a PostgreSQL query. Converts from serde_json::Value.
/// Each value declares its own parameter type; the SQL casts it to the column type.
#[derive(Clone, Debug, PartialEq)]
pub enum PgBindValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
}

impl PgBindValue {
    pub fn from_json(v: &Value) -> Self {
        match v {
            Value::Null => PgBindValue::Null,
            Value::Bool(b) => PgBindValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    PgBindValue::I64(i)
                } else {
                    PgBindValue::F64(n.as_f64().unwrap_or_default())
                }
            }
            Value::String(s) => PgBindValue::String(s.clone()),
            Value::Array(_) | Value::Object(_) => PgBindValue::String(v.to_string()),
        }
    }
}

impl<'q> Encode<'q, Postgres> for PgBindValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Postgres as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        Ok(match self {
            PgBindValue::Null => IsNull::Yes,
            PgBindValue::Bool(b) => <bool as Encode<Postgres>>::encode_by_ref(b, buf)?,
            PgBindValue::I64(n) => <i64 as Encode<Postgres>>::encode_by_ref(n, buf)?,
            PgBindValue::F64(n) => <f64 as Encode<Postgres>>::encode_by_ref(n, buf)?,
            PgBindValue::String(s) => {
                let s_ref: &str = s.as_str();
                <&str as Encode<Postgres>>::encode_by_ref(&s_ref, buf)?
            }
        })
    }

    fn produces(&self) -> Option<PgTypeInfo> {
        Some(match self {
            PgBindValue::Null | PgBindValue::String(_) => PgTypeInfo::with_name("TEXT"),
            PgBindValue::Bool(_) => PgTypeInfo::with_name("BOOL"),
            PgBindValue::I64(_) => PgTypeInfo::with_name("INT8"),
            PgBindValue::F64(_) => PgTypeInfo::with_name("FLOAT8"),
        })
    }
}

impl sqlx::Type<Postgres> for PgBindValue {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("TEXT")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_values_map_to_bind_values() {
        assert_eq!(PgBindValue::from_json(&json!(28)), PgBindValue::I64(28));
        assert_eq!(PgBindValue::from_json(&json!(2.5)), PgBindValue::F64(2.5));
        assert_eq!(PgBindValue::from_json(&json!("a")), PgBindValue::String("a".into()));
        assert_eq!(PgBindValue::from_json(&Value::Null), PgBindValue::Null);
    }
}
