//! Field normalization: valid identifier names, resolved types, descriptions and examples.

use crate::error::ConfigError;
use crate::schema::types::{FieldType, Schema};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

pub const DEFAULT_FIELD_PREFIX: &str = "f_";

static NON_IDENT_CHAR: Lazy<Regex> = Lazy::new(|| Regex::new("[^0-9a-zA-Z_]").expect("static regex"));

pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_alphabetic() => chars.all(|c| c == '_' || c.is_alphanumeric()),
        _ => false,
    }
}

/// Turn a field name into a valid identifier. Valid identifiers are returned unchanged.
pub fn identifier_field_name(name: &str, prefix: &str) -> String {
    if is_identifier(name) {
        return name.to_string();
    }
    let substituted = NON_IDENT_CHAR.replace_all(name, "_").into_owned();
    if is_identifier(&substituted) {
        substituted
    } else {
        // leading digit (or empty name)
        format!("{}{}", prefix, substituted)
    }
}

#[derive(Clone, Debug)]
pub struct NormalizeOptions {
    pub prefix: String,
    /// Fields marked non-nullable regardless of inference.
    pub required: Vec<String>,
    /// Explicit name -> type mapping; wins over `coerce`.
    pub type_overrides: BTreeMap<String, FieldType>,
    /// Blanket inferred-type -> type mapping for fields without an override.
    pub coerce: HashMap<FieldType, FieldType>,
    pub descriptions: BTreeMap<String, String>,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        NormalizeOptions {
            prefix: DEFAULT_FIELD_PREFIX.to_string(),
            required: Vec::new(),
            type_overrides: BTreeMap::new(),
            coerce: HashMap::from([(FieldType::Any, FieldType::String)]),
            descriptions: BTreeMap::new(),
        }
    }
}

/// Rename every field to a valid identifier. Fails if two fields end up with the same name.
/// Primary key and identity source references are renamed along with their fields.
pub fn normalize_field_names(schema: &mut Schema, prefix: &str) -> Result<(), ConfigError> {
    let mut sources: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut renames: HashMap<String, String> = HashMap::new();
    for field in &schema.fields {
        let normalized = identifier_field_name(&field.name, prefix);
        sources.entry(normalized.clone()).or_default().push(field.name.clone());
        renames.insert(field.name.clone(), normalized);
    }
    if let Some((normalized, sources)) = sources.into_iter().find(|(_, s)| s.len() > 1) {
        return Err(ConfigError::NameCollision { normalized, sources });
    }
    for field in &mut schema.fields {
        if let Some(new) = renames.get(&field.name) {
            if *new != field.name {
                tracing::debug!(from = %field.name, to = %new, "normalized field name");
                field.name = new.clone();
            }
        }
    }
    let rename = |n: &mut String| {
        if let Some(new) = renames.get(n.as_str()) {
            *n = new.clone();
        }
    };
    schema.primary_key.iter_mut().for_each(rename);
    if let Some(info) = schema.identity.as_mut() {
        info.id_src_fields.iter_mut().for_each(rename);
    }
    Ok(())
}

fn unknown(field: &str, context: &str) -> ConfigError {
    ConfigError::UnknownField {
        field: field.to_string(),
        context: context.to_string(),
    }
}

/// Run the normalization stages in order: names, required overrides, type overrides,
/// blanket coercion, descriptions.
pub fn normalize(schema: &mut Schema, opts: &NormalizeOptions) -> Result<(), ConfigError> {
    normalize_field_names(schema, &opts.prefix)?;

    for name in &opts.required {
        let field = schema.field_mut(name).ok_or_else(|| unknown(name, "required fields"))?;
        field.constraints.required = true;
    }

    for (name, ty) in &opts.type_overrides {
        let field = schema.field_mut(name).ok_or_else(|| unknown(name, "field types"))?;
        field.ty = *ty;
    }

    for field in &mut schema.fields {
        if opts.type_overrides.contains_key(&field.name) {
            continue;
        }
        if let Some(to) = opts.coerce.get(&field.ty) {
            field.ty = *to;
        }
    }

    add_descriptions(schema, &opts.descriptions);
    Ok(())
}

/// Set descriptions from a name -> description map. Fields absent from the map keep theirs.
pub fn add_descriptions(schema: &mut Schema, descriptions: &BTreeMap<String, String>) {
    for (name, description) in descriptions {
        match schema.field_mut(name) {
            Some(field) => field.description = Some(description.clone()),
            None => tracing::warn!(field = %name, "description given for unknown field"),
        }
    }
}

/// Use a data row (normally the first) as field examples.
pub fn add_examples(schema: &mut Schema, row: &[Value]) {
    for (field, value) in schema.fields.iter_mut().zip(row) {
        if !value.is_null() {
            field.example = Some(value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::Field;
    use serde_json::json;

    #[test]
    fn valid_identifiers_are_unchanged() {
        for n in ["name", "_x", "city_2", "Größe"] {
            assert_eq!(identifier_field_name(n, "f_"), n);
        }
    }

    #[test]
    fn invalid_characters_are_substituted() {
        assert_eq!(identifier_field_name("first name", "f_"), "first_name");
        assert_eq!(identifier_field_name("a-b.c", "f_"), "a_b_c");
        assert_eq!(identifier_field_name("1st", "f_"), "f_1st");
        assert_eq!(identifier_field_name("2 nd", "p_"), "p_2_nd");
    }

    #[test]
    fn normalizing_is_idempotent() {
        for n in ["first name", "1st", "x-y", "ok", "", "9"] {
            let once = identifier_field_name(n, "f_");
            assert_eq!(identifier_field_name(&once, "f_"), once);
            assert!(is_identifier(&once));
        }
    }

    #[test]
    fn collisions_fail_fast() {
        let mut s = Schema::new(vec![Field::new("a b", FieldType::String), Field::new("a-b", FieldType::String)]);
        let err = normalize_field_names(&mut s, "f_").unwrap_err();
        match err {
            ConfigError::NameCollision { normalized, sources } => {
                assert_eq!(normalized, "a_b");
                assert_eq!(sources, vec!["a b", "a-b"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn stages_apply_in_order() {
        let mut s = Schema::new(vec![
            Field::new("no.", FieldType::Integer),
            Field::new("x", FieldType::Any),
            Field::new("y", FieldType::Any),
        ]);
        let opts = NormalizeOptions {
            required: vec!["no_".into()],
            type_overrides: BTreeMap::from([("y".to_string(), FieldType::Number)]),
            descriptions: BTreeMap::from([("x".to_string(), "An x".to_string())]),
            ..NormalizeOptions::default()
        };
        normalize(&mut s, &opts).unwrap();
        assert_eq!(s.field_names(), vec!["no_", "x", "y"]);
        assert!(!s.fields[0].nullable());
        assert_eq!(s.fields[1].ty, FieldType::String);
        assert_eq!(s.fields[2].ty, FieldType::Number);
        assert_eq!(s.fields[1].description.as_deref(), Some("An x"));
        assert_eq!(s.fields[2].description, None);
    }

    #[test]
    fn override_naming_missing_field_fails() {
        let mut s = Schema::new(vec![Field::new("a", FieldType::String)]);
        let opts = NormalizeOptions {
            required: vec!["b".into()],
            ..NormalizeOptions::default()
        };
        assert!(matches!(normalize(&mut s, &opts), Err(ConfigError::UnknownField { .. })));
    }

    #[test]
    fn examples_from_row() {
        let mut s = Schema::new(vec![Field::new("a", FieldType::String), Field::new("b", FieldType::Integer)]);
        add_examples(&mut s, &[json!("Patrick"), Value::Null]);
        assert_eq!(s.fields[0].example, Some(json!("Patrick")));
        assert_eq!(s.fields[1].example, None);
    }
}
