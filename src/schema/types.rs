//! Schema types matching the persisted data resource descriptor.

use crate::error::ConfigError;
use crate::ids::{IdType, DEFAULT_CONCAT_SEP};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FieldType {
    #[default]
    String,
    Integer,
    Number,
    Boolean,
    Complex,
    /// Unresolved inferred type; coerced away during normalization.
    Any,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Complex => "complex",
            FieldType::Any => "any",
        }
    }

    /// Wire name to type. Temporal and other textual tableschema types are kept as strings.
    pub fn from_wire(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "integer" | "int" => FieldType::Integer,
            "number" | "float" => FieldType::Number,
            "boolean" | "bool" => FieldType::Boolean,
            "complex" => FieldType::Complex,
            "any" => FieldType::Any,
            _ => FieldType::String,
        }
    }

    /// Strict variant of [`FieldType::from_wire`] for user-supplied overrides.
    pub fn parse_override(s: &str) -> Result<Self, ConfigError> {
        match s.to_lowercase().as_str() {
            "string" | "integer" | "number" | "boolean" | "complex" | "any" => Ok(Self::from_wire(s)),
            other => Err(ConfigError::Validation(format!("unknown field type '{}'", other))),
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, FieldType::Integer)
    }

    /// Types usable as query filter parameters.
    pub fn is_filterable(&self) -> bool {
        matches!(
            self,
            FieldType::String | FieldType::Integer | FieldType::Number | FieldType::Boolean
        )
    }

    /// Parse a textual cell or query value. `None` if the text does not fit the type.
    pub fn parse_str(&self, s: &str) -> Option<Value> {
        match self {
            FieldType::Integer => s.trim().parse::<i64>().ok().map(Value::from),
            FieldType::Number => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number),
            FieldType::Boolean => match s.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" => Some(Value::Bool(true)),
                "false" | "0" | "no" => Some(Value::Bool(false)),
                _ => None,
            },
            FieldType::String | FieldType::Complex | FieldType::Any => Some(Value::String(s.to_string())),
        }
    }

    /// Whether a JSON value is acceptable for a field of this type. Null is checked separately.
    pub fn accepts(&self, v: &Value) -> bool {
        match (self, v) {
            (_, Value::Null) => true,
            (FieldType::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (FieldType::Number, Value::Number(_)) => true,
            (FieldType::Boolean, Value::Bool(_)) => true,
            (FieldType::String | FieldType::Complex, Value::String(_)) => true,
            (FieldType::Any, _) => true,
            _ => false,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FieldType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(FieldType::from_wire(&s))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl Constraints {
    fn is_empty(&self) -> bool {
        !self.required
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type", default)]
    pub ty: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
    #[serde(default, skip_serializing_if = "Constraints::is_empty")]
    pub constraints: Constraints,
    /// Database column type, recorded when the field was reflected from a table.
    #[serde(rename = "x_sql_type", default, skip_serializing_if = "Option::is_none")]
    pub sql_type: Option<String>,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Field {
            name: name.into(),
            ty,
            description: None,
            example: None,
            constraints: Constraints::default(),
            sql_type: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.constraints.required = true;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn nullable(&self) -> bool {
        !self.constraints.required
    }
}

/// Identity metadata: which strategy produced the key and from which fields.
/// The tag stays a string so an unknown strategy is reported when the model is built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityInfo {
    pub id_type: String,
    #[serde(default)]
    pub id_src_fields: Vec<String>,
    /// Joins source field values for composite and hash ids.
    #[serde(default = "default_id_sep", skip_serializing_if = "is_default_id_sep")]
    pub id_sep: String,
}

fn default_id_sep() -> String {
    DEFAULT_CONCAT_SEP.to_string()
}

fn is_default_id_sep(sep: &str) -> bool {
    sep == DEFAULT_CONCAT_SEP
}

impl IdentityInfo {
    pub fn new(id_type: IdType, id_src_fields: Vec<String>) -> Self {
        IdentityInfo {
            id_type: id_type.to_string(),
            id_src_fields,
            id_sep: default_id_sep(),
        }
    }

    pub fn with_sep(mut self, sep: impl Into<String>) -> Self {
        self.id_sep = sep.into();
        self
    }

    pub fn id_type(&self) -> Result<IdType, ConfigError> {
        self.id_type.parse()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PrimaryKeyConfig {
    Single(String),
    Composite(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match PrimaryKeyConfig::deserialize(deserializer)? {
        PrimaryKeyConfig::Single(s) => vec![s],
        PrimaryKeyConfig::Composite(v) => v,
    })
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
    #[serde(
        rename = "primaryKey",
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub primary_key: Vec<String>,
    #[serde(rename = "x_datarest_primary_key_info", default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentityInfo>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Schema {
            fields,
            primary_key: Vec::new(),
            identity: None,
        }
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields.iter_mut().find(|f| f.name == name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Names unique; primary key and identity source fields reference existing fields.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for f in &self.fields {
            if !seen.insert(f.name.as_str()) {
                return Err(ConfigError::Validation(format!("duplicate field name '{}'", f.name)));
            }
        }
        let referenced = self
            .primary_key
            .iter()
            .chain(self.identity.iter().flat_map(|i| i.id_src_fields.iter()));
        for name in referenced {
            if !seen.contains(name.as_str()) {
                return Err(ConfigError::UnknownField {
                    field: name.clone(),
                    context: "schema primary key".into(),
                });
            }
        }
        Ok(())
    }
}

/// The persisted per-resource document: a schema plus where its data came from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataResource {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub schema: Schema,
}
