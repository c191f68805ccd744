//! Read and write the per-resource schema description (YAML).

use crate::error::ConfigError;
use crate::schema::types::DataResource;
use std::path::Path;

pub fn schema_to_yaml(resource: &DataResource) -> Result<String, ConfigError> {
    Ok(serde_yaml::to_string(resource)?)
}

pub fn schema_from_yaml(s: &str) -> Result<DataResource, ConfigError> {
    let resource: DataResource = serde_yaml::from_str(s)?;
    resource.schema.validate()?;
    Ok(resource)
}

pub fn write_schema(path: &Path, resource: &DataResource) -> Result<(), ConfigError> {
    std::fs::write(path, schema_to_yaml(resource)?)?;
    tracing::info!(path = %path.display(), resource = %resource.name, "wrote schema description");
    Ok(())
}

pub fn read_schema(path: &Path) -> Result<DataResource, ConfigError> {
    let s = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    schema_from_yaml(&s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::IdType;
    use crate::schema::types::{Field, FieldType, IdentityInfo, Schema};
    use serde_json::json;

    #[test]
    fn descriptor_round_trips() {
        let mut schema = Schema::new(vec![
            Field::new("id_", FieldType::String).required().with_description("Unique resource id"),
            Field::new("name", FieldType::String),
            Field::new("income", FieldType::Number),
        ]);
        schema.fields[1].example = Some(json!("Patrick"));
        schema.fields[2].example = Some(json!(3550.5));
        schema.primary_key = vec!["id_".into()];
        schema.identity = Some(IdentityInfo::new(IdType::Uuid4Base64, vec![]));
        let res = DataResource {
            name: "people".into(),
            path: Some("people.csv".into()),
            schema,
        };
        let yaml = schema_to_yaml(&res).unwrap();
        assert!(yaml.contains("x_datarest_primary_key_info"));
        assert!(yaml.contains("primaryKey"));
        assert_eq!(schema_from_yaml(&yaml).unwrap(), res);
    }

    #[test]
    fn read_rejects_dangling_primary_key() {
        let yaml = "name: t\nschema:\n  fields: [{name: a}]\n  primaryKey: b\n";
        assert!(schema_from_yaml(yaml).is_err());
    }
}
