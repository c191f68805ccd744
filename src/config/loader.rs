//! Load app.yaml from disk; resolve env references and relative paths.

use crate::config::types::{AppConfig, AppInfo, DatabaseConfig};
use crate::config::validate;
use crate::error::ConfigError;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::path::{Path, PathBuf};

pub const DEFAULT_APP_CONFIG: &str = "app.yaml";

/// Overrides `database.connect_string` when set.
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

static ENV_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)").expect("static regex"));

/// Replace `${VAR}` and `$VAR` with environment values. Unset variables are left as written.
pub fn expand_env(s: &str) -> String {
    ENV_REF
        .replace_all(s, |caps: &Captures| {
            let name = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()).unwrap_or_default();
            std::env::var(name).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

impl DatabaseConfig {
    pub fn url(&self) -> String {
        match std::env::var(DATABASE_URL_ENV) {
            Ok(url) if !url.is_empty() => url,
            _ => expand_env(&self.connect_string),
        }
    }
}

impl AppInfo {
    /// The description text; a value naming an existing file is replaced by its contents.
    pub fn description_text(&self, base_dir: &Path) -> String {
        let d = self.description.trim();
        if d.is_empty() || d.contains('\n') {
            return self.description.clone();
        }
        let path = base_dir.join(d);
        match std::fs::read_to_string(&path) {
            Ok(contents) if path.is_file() => contents,
            _ => self.description.clone(),
        }
    }
}

impl AppConfig {
    pub fn resolve_path(&self, p: &Path) -> PathBuf {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.base_dir.join(p)
        }
    }
}

pub fn parse_app_config(s: &str, base_dir: &Path) -> Result<AppConfig, ConfigError> {
    let mut config: AppConfig = serde_yaml::from_str(s)?;
    config.base_dir = base_dir.to_path_buf();
    validate(&config)?;
    Ok(config)
}

pub fn read_app_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let s = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    let base_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let config = parse_app_config(&s, base_dir)?;
    tracing::info!(
        path = %path.display(),
        resources = config.datarest.datatables.len(),
        "loaded app config"
    );
    Ok(config)
}

pub fn write_app_config(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    validate(config)?;
    std::fs::write(path, serde_yaml::to_string(config)?)?;
    tracing::info!(path = %path.display(), "wrote app config");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::Operation;

    const APP: &str = r#"
datarest:
  app:
    title: People
    version: 0.1.0
    prefix: /api
  database:
    connect_string: postgres://${DATAREST_TEST_USER}@localhost/db
  datatables:
    people:
      schema_spec: https://specs.frictionlessdata.io/data-resource/
      schema: people.yaml
      dbtable: people
      expose_routes: [get_all, get_one]
      query_params: [name, age]
"#;

    #[test]
    fn parses_app_yaml() {
        let cfg = parse_app_config(APP, Path::new("/srv/app")).unwrap();
        let t = &cfg.datarest.datatables["people"];
        assert_eq!(t.expose_routes, vec![Operation::GetAll, Operation::GetOne]);
        assert_eq!(t.query_params, vec!["name", "age"]);
        assert!(cfg.datarest.exclude_none);
        assert!(cfg.datarest.authn.is_none());
        assert_eq!(cfg.resolve_path(Path::new("people.yaml")), PathBuf::from("/srv/app/people.yaml"));
    }

    #[test]
    fn env_references_expand() {
        std::env::set_var("DATAREST_TEST_EXPAND", "bob");
        assert_eq!(expand_env("u=${DATAREST_TEST_EXPAND}/$DATAREST_TEST_EXPAND"), "u=bob/bob");
        assert_eq!(expand_env("${DATAREST_TEST_UNSET_VAR}"), "${DATAREST_TEST_UNSET_VAR}");
    }

    #[test]
    fn description_may_name_a_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("about.md"), "Long text").unwrap();
        let mut info = AppInfo {
            title: "t".into(),
            version: "1".into(),
            prefix: None,
            description: "about.md".into(),
        };
        assert_eq!(info.description_text(dir.path()), "Long text");
        info.description = "inline".into();
        assert_eq!(info.description_text(dir.path()), "inline");
    }

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_APP_CONFIG);
        let cfg = parse_app_config(APP, dir.path()).unwrap();
        write_app_config(&path, &cfg).unwrap();
        assert_eq!(read_app_config(&path).unwrap().datarest, cfg.datarest);
    }
}
