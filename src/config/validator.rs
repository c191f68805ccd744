//! Config validation: table settings and cross references.

use crate::config::types::{AppConfig, AuthnConfig};
use crate::error::ConfigError;
use std::collections::HashSet;

/// Paths served next to the resources; a resource may not shadow them.
pub const RESERVED_NAMES: [&str; 3] = ["health", "info", "openapi.json"];

fn valid_resource_name(name: &str) -> bool {
    !name.is_empty()
        && !RESERVED_NAMES.contains(&name)
        && !name.contains(|c: char| matches!(c, '/' | ':' | '*' | '{' | '}' | '?' | '#') || c.is_whitespace())
}

pub fn validate(config: &AppConfig) -> Result<(), ConfigError> {
    let d = &config.datarest;
    if d.datatables.is_empty() {
        return Err(ConfigError::Validation("at least one entry under 'datatables' required".into()));
    }

    let mut dbtables = HashSet::new();
    for (name, t) in &d.datatables {
        if !valid_resource_name(name) {
            return Err(ConfigError::Validation(format!("invalid resource name '{}'", name)));
        }
        if t.dbtable.trim().is_empty() {
            return Err(ConfigError::Validation(format!("resource '{}': empty dbtable", name)));
        }
        if !dbtables.insert(t.dbtable.as_str()) {
            return Err(ConfigError::Validation(format!(
                "dbtable '{}' used by more than one resource",
                t.dbtable
            )));
        }
        if t.paginate == 0 {
            return Err(ConfigError::Validation(format!("resource '{}': paginate must be positive", name)));
        }
        let mut ops = HashSet::new();
        for op in &t.expose_routes {
            if !ops.insert(op) {
                return Err(ConfigError::Validation(format!(
                    "resource '{}': operation '{}' listed twice",
                    name, op
                )));
            }
        }
        t.spec()?;
    }

    if let Some(health) = &d.health {
        for name in health.tables.iter().flatten() {
            if !d.datatables.contains_key(name) {
                return Err(ConfigError::UnknownField {
                    field: name.clone(),
                    context: "health tables".into(),
                });
            }
        }
    }

    if let Some(AuthnConfig::HttpBasic { users }) = &d.authn {
        if users.is_empty() {
            tracing::warn!("HTTPBasic authentication configured without users; every request will be rejected");
        }
    }

    Ok(())
}
