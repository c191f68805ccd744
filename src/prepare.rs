//! One-shot preparation behind `init datafile` and `init db`: turn a data file or an
//! existing table into a schema description plus a single-resource `app.yaml`.

use crate::config::{write_app_config, AppConfig, AppConfigOptions, Operation, DEFAULT_APP_CONFIG};
use crate::error::{AppError, ConfigError};
use crate::filter::{Filter, Pagination};
use crate::ids::{IdRegistry, IdType, DEFAULT_CONCAT_SEP};
use crate::model::{build_model, ResourceModel, Row};
use crate::schema::{
    add_descriptions, add_examples, describe_datafile, first_row, identifier_field_name, normalize,
    primary_key_step, read_records, read_rows, write_rows, write_schema, DataFileFormat, DataResource, FieldType,
    IdentityInfo, NormalizeOptions, PrimaryKeyOptions, PrimaryKeyStep, Schema,
};
use crate::store::{PgStore, ResourceStore};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const TABLE_PREFIX: &str = "t_";

/// Resource and table name for a data file: its lowercased stem as an identifier.
pub fn table_name_for(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("data")
        .to_lowercase();
    identifier_field_name(&stem, TABLE_PREFIX)
}

fn guard_uninitialized(out_dir: &Path) -> Result<PathBuf, ConfigError> {
    let app_yaml = out_dir.join(DEFAULT_APP_CONFIG);
    if app_yaml.exists() {
        return Err(ConfigError::AlreadyInitialized(app_yaml.display().to_string()));
    }
    Ok(app_yaml)
}

#[derive(Clone, Debug)]
pub struct DatafileOptions {
    pub datafile: PathBuf,
    /// Where `app.yaml` and `<table>.yaml` are written.
    pub out_dir: PathBuf,
    pub id_type: IdType,
    /// Key fields, by normalized name.
    pub primary_key: Vec<String>,
    pub normalize: NormalizeOptions,
    pub app: AppConfigOptions,
    /// Back up the data file and rewrite it with the id column prepended.
    pub rewrite_datafile: bool,
    /// Joins key field values for composite and hash ids.
    pub concat_sep: String,
}

impl DatafileOptions {
    pub fn new(datafile: impl Into<PathBuf>, id_type: IdType) -> Self {
        let datafile = datafile.into();
        let out_dir = datafile.parent().map(Path::to_path_buf).unwrap_or_default();
        let table = table_name_for(&datafile);
        DatafileOptions {
            datafile,
            out_dir,
            id_type,
            primary_key: Vec::new(),
            normalize: NormalizeOptions::default(),
            app: AppConfigOptions::new(&table),
            rewrite_datafile: false,
            concat_sep: DEFAULT_CONCAT_SEP.to_string(),
        }
    }

    pub fn table(&self) -> &str {
        &self.app.table
    }
}

/// Result of preparing a data file. Files are written; rows can still be streamed for loading.
#[derive(Debug)]
pub struct PreparedDatafile {
    pub resource: DataResource,
    pub config: AppConfig,
    pub model: ResourceModel,
    pub schema_path: PathBuf,
    pub config_path: PathBuf,
    pub datafile: PathBuf,
    pub backup: Option<PathBuf>,
    step: PrimaryKeyStep,
    /// Column types of the data file as it is now on disk.
    types: Vec<FieldType>,
    /// The data file still lacks the id column; compute ids while reading.
    inject_ids: bool,
}

impl PreparedDatafile {
    /// Data rows as field maps, id computed per row. Empty cells are left out.
    pub fn rows(&self) -> Result<impl Iterator<Item = Result<Row, ConfigError>> + '_, ConfigError> {
        let names = self.resource.schema.field_names();
        let rows = read_rows(&self.datafile, self.types.clone())?;
        Ok(rows.map(move |row| {
            let mut row = row?;
            if self.inject_ids {
                if let Some(id) = self.step.id_for_row(&row) {
                    row.insert(0, Value::String(id));
                }
            }
            Ok(names
                .iter()
                .cloned()
                .zip(row)
                .filter(|(_, v)| !v.is_null())
                .collect())
        }))
    }
}

/// Describe, normalize and key the data file, then write its schema description and
/// `app.yaml`. Nothing is written when any step fails.
pub fn prepare_datafile(opts: &DatafileOptions, registry: &IdRegistry) -> Result<PreparedDatafile, ConfigError> {
    let config_path = guard_uninitialized(&opts.out_dir)?;
    let table = opts.table().to_string();

    let mut resource = describe_datafile(&opts.datafile)?;
    resource.name = table.clone();
    let schema = &mut resource.schema;
    normalize(schema, &opts.normalize)?;
    let types: Vec<FieldType> = schema.fields.iter().map(|f| f.ty).collect();
    if let Some(row) = first_row(&opts.datafile, types.clone())? {
        add_examples(schema, &row);
    }

    let mut pk_opts = PrimaryKeyOptions::new(opts.id_type)
        .primary_key(opts.primary_key.iter().cloned())
        .create_exposed(opts.app.expose_routes.contains(&Operation::Create));
    pk_opts.concat_sep = opts.concat_sep.clone();
    let step = primary_key_step(schema, registry, &pk_opts)?;
    step.apply(schema);
    tracing::info!(
        table = %table,
        id_type = %step.id_type(),
        primary_key = ?schema.primary_key,
        fields = schema.fields.len(),
        "prepared schema"
    );

    let mut config = AppConfig::for_table(opts.app.clone());
    config.base_dir = opts.out_dir.clone();
    let table_config = config
        .datarest
        .datatables
        .get(&table)
        .ok_or_else(|| ConfigError::Validation(format!("no table config for '{}'", table)))?;
    let model = build_model(&table, table_config, &resource.schema, registry, config.datarest.exclude_none)?;

    let schema_path = opts.out_dir.join(format!("{}.yaml", table));
    write_schema(&schema_path, &resource)?;
    write_app_config(&config_path, &config)?;

    let (types, backup) = if opts.rewrite_datafile {
        let backup = rewrite_datafile(&opts.datafile, &resource.schema, &step, types)?;
        (resource.schema.fields.iter().map(|f| f.ty).collect(), Some(backup))
    } else {
        (types, None)
    };
    let inject_ids = backup.is_none();

    Ok(PreparedDatafile {
        resource,
        config,
        model,
        schema_path,
        config_path,
        datafile: opts.datafile.clone(),
        backup,
        step,
        types,
        inject_ids,
    })
}

/// Copy the file to `<file>.<unix-ts>.bak`, then stream it into a sibling file with the
/// id column prepended and move that over the original. Returns the backup path.
fn rewrite_datafile(
    datafile: &Path,
    schema: &Schema,
    step: &PrimaryKeyStep,
    types: Vec<FieldType>,
) -> Result<PathBuf, ConfigError> {
    let backup = PathBuf::from(format!("{}.{}.bak", datafile.display(), chrono::Utc::now().timestamp()));
    let staged = PathBuf::from(format!("{}.tmp", datafile.display()));
    let format = DataFileFormat::detect(datafile)?;
    std::fs::copy(datafile, &backup)?;
    let records = read_records(datafile, types)?;
    let n = match write_rows(&staged, format, &schema.field_names(), step.rewrite_rows(records)) {
        Ok(n) => n,
        Err(e) => {
            let _ = std::fs::remove_file(&staged);
            return Err(e);
        }
    };
    std::fs::rename(&staged, datafile)?;
    tracing::info!(path = %datafile.display(), backup = %backup.display(), rows = n, "rewrote data file with id column");
    Ok(backup)
}

/// Create the backing table and stream every data row into it.
pub async fn load_datafile(prepared: &PreparedDatafile, store: &PgStore) -> Result<u64, AppError> {
    store.ensure_table(&prepared.model).await?;
    store.load_rows(&prepared.model, prepared.rows()?).await
}

/// Record identity metadata for a reflected table: a string key gets random surrogate ids,
/// any other key is reused as is.
pub fn adopt_table_key(schema: &mut Schema) -> Result<IdType, ConfigError> {
    let pk = match schema.primary_key.as_slice() {
        [] => return Err(ConfigError::Validation("table has no primary key".into())),
        [pk] => pk.clone(),
        many => return Err(ConfigError::CompositeKey(many.to_vec())),
    };
    let ty = schema
        .field(&pk)
        .map(|f| f.ty)
        .ok_or_else(|| ConfigError::UnknownField {
            field: pk.clone(),
            context: "table primary key".into(),
        })?;
    let (id_type, sources) = if ty == FieldType::String {
        (IdType::Uuid4Base64, Vec::new())
    } else {
        (IdType::BizKey, vec![pk])
    };
    schema.identity = Some(IdentityInfo::new(id_type, sources));
    Ok(id_type)
}

#[derive(Clone, Debug)]
pub struct TableOptions {
    pub out_dir: PathBuf,
    pub app: AppConfigOptions,
    /// Field descriptions by column name.
    pub descriptions: BTreeMap<String, String>,
}

impl TableOptions {
    pub fn new(table: &str) -> Self {
        TableOptions {
            out_dir: PathBuf::new(),
            app: AppConfigOptions::new(table),
            descriptions: BTreeMap::new(),
        }
    }
}

/// Descriptions from the options, examples from a stored row when the table has one.
pub fn annotate_table_schema(schema: &mut Schema, descriptions: &BTreeMap<String, String>, first: Option<&Row>) {
    add_descriptions(schema, descriptions);
    if let Some(row) = first {
        let values: Vec<Value> = schema
            .fields
            .iter()
            .map(|f| row.get(&f.name).cloned().unwrap_or(Value::Null))
            .collect();
        add_examples(schema, &values);
    }
}

/// Reflect an existing table and write its schema description and `app.yaml`.
pub async fn init_table(opts: &TableOptions, store: &PgStore, registry: &IdRegistry) -> Result<AppConfig, AppError> {
    let config_path = guard_uninitialized(&opts.out_dir)?;
    let table = opts.app.table.clone();
    let mut schema = store.reflect_table(&table).await?;
    let id_type = adopt_table_key(&mut schema)?;

    let mut config = AppConfig::for_table(opts.app.clone());
    config.base_dir = opts.out_dir.clone();
    let table_config = config
        .datarest
        .datatables
        .get(&table)
        .ok_or_else(|| ConfigError::Validation(format!("no table config for '{}'", table)))?;
    let model = build_model(&table, table_config, &schema, registry, config.datarest.exclude_none)?;
    let first = store
        .list(&model, &Filter::default(), Pagination { skip: 0, limit: 1 })
        .await?;
    annotate_table_schema(&mut schema, &opts.descriptions, first.first());

    let resource = DataResource {
        name: table.clone(),
        path: None,
        schema,
    };
    write_schema(&opts.out_dir.join(format!("{}.yaml", table)), &resource)?;
    write_app_config(&config_path, &config)?;
    tracing::info!(table = %table, id_type = %id_type, "initialized from database table");
    Ok(config)
}
