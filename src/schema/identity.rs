//! Primary key injection: pick or synthesize the resource id field and record
//! identity metadata for the model builder.

use crate::error::ConfigError;
use crate::ids::{IdFn, IdRegistry, IdType, DEFAULT_CONCAT_SEP};
use crate::schema::infer::RawRow;
use crate::schema::types::{Field, FieldType, IdentityInfo, Schema};
use serde_json::Value;
use std::collections::HashSet;

pub const DEFAULT_ID_FIELD_NAME: &str = "id_";
pub const ID_FIELD_DESCRIPTION: &str = "Unique resource id";

#[derive(Clone, Debug)]
pub struct PrimaryKeyOptions {
    pub id_type: IdType,
    /// Natural key fields; empty means "choose a default".
    pub primary_key: Vec<String>,
    pub create_exposed: bool,
    pub id_field_name: String,
    pub concat_sep: String,
}

impl PrimaryKeyOptions {
    pub fn new(id_type: IdType) -> Self {
        PrimaryKeyOptions {
            id_type,
            primary_key: Vec::new(),
            create_exposed: false,
            id_field_name: DEFAULT_ID_FIELD_NAME.to_string(),
            concat_sep: DEFAULT_CONCAT_SEP.to_string(),
        }
    }

    pub fn primary_key<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn create_exposed(mut self, exposed: bool) -> Self {
        self.create_exposed = exposed;
        self
    }
}

/// A validated schema transformation. Build with [`primary_key_step`].
#[derive(Clone, Debug)]
pub enum PrimaryKeyStep {
    /// An existing field becomes the key; the database assigns new values.
    Existing { id_type: IdType, primary_key: Vec<String> },
    /// A new string id field is prepended and derived from `source_fields`.
    Synthetic {
        id_type: IdType,
        id_fn: IdFn,
        source_fields: Vec<String>,
        source_indexes: Vec<usize>,
        id_field_name: String,
        concat_sep: String,
    },
}

/// Validate the key choice against `schema` and return the transformation to apply.
pub fn primary_key_step(
    schema: &Schema,
    registry: &IdRegistry,
    opts: &PrimaryKeyOptions,
) -> Result<PrimaryKeyStep, ConfigError> {
    let field_names = schema.field_names();
    let mut primary_key = opts.primary_key.clone();

    if opts.id_type.uses_business_key() && primary_key.is_empty() {
        let first = schema
            .fields
            .first()
            .ok_or_else(|| ConfigError::Validation("schema has no fields to use as primary key".into()))?;
        primary_key = vec![first.name.clone()];
    }

    let available: HashSet<&str> = field_names.iter().map(String::as_str).collect();
    if !primary_key.iter().all(|f| available.contains(f.as_str())) {
        return Err(ConfigError::PrimaryKeyNotSubset {
            fields: primary_key,
            available: field_names,
        });
    }

    if opts.id_type == IdType::BizKey {
        if primary_key.len() > 1 {
            return Err(ConfigError::CompositeKey(primary_key));
        }
        let pk_field = schema
            .field(&primary_key[0])
            .ok_or_else(|| ConfigError::Validation(format!("missing key field '{}'", primary_key[0])))?;
        if opts.create_exposed && !pk_field.ty.is_integer() {
            return Err(ConfigError::NonNumericKey {
                field: pk_field.name.clone(),
                ty: pk_field.ty.to_string(),
            });
        }
        return Ok(PrimaryKeyStep::Existing {
            id_type: opts.id_type,
            primary_key,
        });
    }

    if available.contains(opts.id_field_name.as_str()) {
        return Err(ConfigError::IdFieldCollision(opts.id_field_name.clone()));
    }
    let id_fn = registry
        .get(opts.id_type)?
        .ok_or_else(|| ConfigError::UnknownIdType(opts.id_type.to_string()))?;
    let source_indexes = primary_key
        .iter()
        .filter_map(|name| schema.index_of(name))
        .collect();

    Ok(PrimaryKeyStep::Synthetic {
        id_type: opts.id_type,
        id_fn,
        source_fields: primary_key,
        source_indexes,
        id_field_name: opts.id_field_name.clone(),
        concat_sep: opts.concat_sep.clone(),
    })
}

impl PrimaryKeyStep {
    pub fn id_type(&self) -> IdType {
        match self {
            PrimaryKeyStep::Existing { id_type, .. } | PrimaryKeyStep::Synthetic { id_type, .. } => *id_type,
        }
    }

    /// Set primary key and identity metadata; prepend the id field for synthetic keys.
    pub fn apply(&self, schema: &mut Schema) {
        match self {
            PrimaryKeyStep::Existing { id_type, primary_key } => {
                schema.primary_key = primary_key.clone();
                schema.identity = Some(IdentityInfo::new(*id_type, primary_key.clone()));
            }
            PrimaryKeyStep::Synthetic {
                id_type,
                source_fields,
                id_field_name,
                concat_sep,
                ..
            } => {
                schema.fields.insert(
                    0,
                    Field::new(id_field_name.clone(), FieldType::String)
                        .required()
                        .with_description(ID_FIELD_DESCRIPTION),
                );
                schema.primary_key = vec![id_field_name.clone()];
                schema.identity =
                    Some(IdentityInfo::new(*id_type, source_fields.clone()).with_sep(concat_sep.clone()));
            }
        }
    }

    /// Id for a row laid out in the pre-injection field order. `None` for existing keys.
    pub fn id_for_row(&self, row: &[Value]) -> Option<String> {
        match self {
            PrimaryKeyStep::Existing { .. } => None,
            PrimaryKeyStep::Synthetic {
                id_fn,
                source_indexes,
                concat_sep,
                ..
            } => {
                let fields: Vec<Value> = source_indexes
                    .iter()
                    .map(|&i| row.get(i).cloned().unwrap_or(Value::Null))
                    .collect();
                Some(id_fn(&fields, concat_sep))
            }
        }
    }

    /// Lazily prepend the computed id to each row's source cells, which pass through as read.
    /// Rows are unchanged for existing keys.
    pub fn rewrite_rows<'a, I>(&'a self, rows: I) -> impl Iterator<Item = Result<Vec<String>, ConfigError>> + 'a
    where
        I: IntoIterator<Item = Result<RawRow, ConfigError>>,
        I::IntoIter: 'a,
    {
        rows.into_iter().map(move |row| {
            let (mut cells, typed) = row?;
            if let Some(id) = self.id_for_row(&typed) {
                cells.insert(0, id);
            }
            Ok(cells)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema(fields: &[(&str, FieldType)]) -> Schema {
        Schema::new(fields.iter().map(|(n, t)| Field::new(*n, *t)).collect())
    }

    #[test]
    fn uuid_injects_leading_id_field() {
        let mut s = schema(&[("name", FieldType::String), ("city", FieldType::String)]);
        let step = primary_key_step(&s, &IdRegistry::standard(), &PrimaryKeyOptions::new(IdType::Uuid4Base64)).unwrap();
        step.apply(&mut s);
        assert_eq!(s.field_names(), vec!["id_", "name", "city"]);
        assert_eq!(s.primary_key, vec!["id_"]);
        assert!(!s.fields[0].nullable());
        assert_eq!(s.fields[0].description.as_deref(), Some("Unique resource id"));
        assert_eq!(s.identity, Some(IdentityInfo::new(IdType::Uuid4Base64, vec![])));
        s.validate().unwrap();
    }

    #[test]
    fn composite_key_rows_are_rewritten_lazily() {
        let s = schema(&[("no", FieldType::Integer), ("name", FieldType::String)]);
        let opts = PrimaryKeyOptions::new(IdType::BizKeyComposite).primary_key(["no"]);
        let step = primary_key_step(&s, &IdRegistry::standard(), &opts).unwrap();
        let rows = vec![
            Ok((vec!["01".to_string(), "a".to_string()], vec![json!(1), json!("a")])),
            Ok((vec!["2".to_string(), "b".to_string()], vec![json!(2), json!("b")])),
        ];
        let out: Vec<_> = step.rewrite_rows(rows).collect::<Result<_, _>>().unwrap();
        assert_eq!(out[0], vec!["1", "01", "a"]);
        assert_eq!(out[1][0], "2");
    }

    #[test]
    fn separator_is_recorded_with_identity() {
        let mut s = schema(&[("a", FieldType::String), ("b", FieldType::String)]);
        let mut opts = PrimaryKeyOptions::new(IdType::BizKeyComposite).primary_key(["a", "b"]);
        opts.concat_sep = "-".into();
        let step = primary_key_step(&s, &IdRegistry::standard(), &opts).unwrap();
        assert_eq!(step.id_for_row(&[json!("x"), json!("y")]).as_deref(), Some("x-y"));
        step.apply(&mut s);
        assert_eq!(s.identity.unwrap().id_sep, "-");
    }

    #[test]
    fn source_order_follows_given_key_order() {
        let s = schema(&[("a", FieldType::String), ("b", FieldType::String)]);
        let opts = PrimaryKeyOptions::new(IdType::BizKeyComposite).primary_key(["b", "a"]);
        let step = primary_key_step(&s, &IdRegistry::standard(), &opts).unwrap();
        assert_eq!(step.id_for_row(&[json!("x"), json!("y")]).as_deref(), Some("y.x"));
    }

    #[test]
    fn business_keys_default_to_first_field() {
        let mut s = schema(&[("no", FieldType::Integer), ("name", FieldType::String)]);
        let step = primary_key_step(&s, &IdRegistry::standard(), &PrimaryKeyOptions::new(IdType::BizKey)).unwrap();
        step.apply(&mut s);
        assert_eq!(s.field_names(), vec!["no", "name"]);
        assert_eq!(s.primary_key, vec!["no"]);
        assert_eq!(s.identity.unwrap().id_type, "biz_key");
    }

    #[test]
    fn key_must_be_subset_of_fields() {
        let s = schema(&[("a", FieldType::String)]);
        let opts = PrimaryKeyOptions::new(IdType::BizHashMd5).primary_key(["a", "zz"]);
        let err = primary_key_step(&s, &IdRegistry::standard(), &opts).unwrap_err();
        assert!(matches!(err, ConfigError::PrimaryKeyNotSubset { .. }));
        assert!(err.to_string().contains("zz"));
    }

    #[test]
    fn biz_key_rejects_composite() {
        let s = schema(&[("a", FieldType::Integer), ("b", FieldType::Integer)]);
        let opts = PrimaryKeyOptions::new(IdType::BizKey).primary_key(["a", "b"]);
        assert!(matches!(
            primary_key_step(&s, &IdRegistry::standard(), &opts),
            Err(ConfigError::CompositeKey(_))
        ));
    }

    #[test]
    fn biz_key_with_create_requires_integer() {
        let s = schema(&[("code", FieldType::String)]);
        let opts = PrimaryKeyOptions::new(IdType::BizKey).create_exposed(true);
        assert!(matches!(
            primary_key_step(&s, &IdRegistry::standard(), &opts),
            Err(ConfigError::NonNumericKey { .. })
        ));
        let opts = PrimaryKeyOptions::new(IdType::BizKey);
        assert!(primary_key_step(&s, &IdRegistry::standard(), &opts).is_ok());
    }

    #[test]
    fn synthetic_name_collision_is_rejected() {
        let s = schema(&[("id_", FieldType::String)]);
        assert!(matches!(
            primary_key_step(&s, &IdRegistry::standard(), &PrimaryKeyOptions::new(IdType::Uuid4Base64)),
            Err(ConfigError::IdFieldCollision(n)) if n == "id_"
        ));
    }
}
