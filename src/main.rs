//! datarest CLI: prepare a data file or table, then serve it.

use clap::{Args, Parser, Subcommand};
use datarest::config::{AppConfigOptions, Operation, DEFAULT_APP_CONFIG, DEFAULT_CONNECT_STRING, DEFAULT_PAGINATE};
use datarest::error::ConfigError;
use datarest::ids::{IdRegistry, IdType, DEFAULT_CONCAT_SEP};
use datarest::prepare::{init_table, load_datafile, prepare_datafile, DatafileOptions, TableOptions};
use datarest::schema::FieldType;
use datarest::store::{ensure_database_exists, PgStore};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate app.yaml and a schema description
    #[command(subcommand)]
    Init(InitCommand),
    /// Serve the API described by an app config
    Run {
        #[arg(short, long, default_value = DEFAULT_APP_CONFIG)]
        config: PathBuf,
        #[arg(long, env = "DATAREST_BIND", default_value = "127.0.0.1:8000")]
        bind: String,
    },
}

#[derive(Subcommand)]
enum InitCommand {
    /// From a CSV/TSV data file
    Datafile {
        file: PathBuf,
        /// Id type: biz_key, biz_key_composite, biz_hash_md5, biz_hash_sha256, uuid4_base64
        #[arg(long, default_value = "uuid4_base64")]
        id_type: IdType,
        /// Key field (repeatable, by normalized name)
        #[arg(long = "pk")]
        primary_key: Vec<String>,
        /// Field that may not be null (repeatable)
        #[arg(long)]
        required: Vec<String>,
        /// name:type override (repeatable)
        #[arg(long = "type")]
        types: Vec<String>,
        /// name:description pair (repeatable)
        #[arg(long = "describe")]
        descriptions: Vec<String>,
        /// Separator joining key field values in composite and hash ids
        #[arg(long, default_value = DEFAULT_CONCAT_SEP)]
        sep: String,
        /// Back up the data file and rewrite it with the id column
        #[arg(long)]
        rewrite: bool,
        /// Create the table and load the data rows
        #[arg(long)]
        load: bool,
        /// Resource and table name (defaults to the data file's name)
        #[arg(long)]
        table: Option<String>,
        #[command(flatten)]
        app: AppArgs,
    },
    /// From an existing database table
    Db {
        table: String,
        /// name:description pair (repeatable)
        #[arg(long = "describe")]
        descriptions: Vec<String>,
        #[command(flatten)]
        app: AppArgs,
    },
}

#[derive(Args)]
struct AppArgs {
    /// Directory for app.yaml and the schema description
    #[arg(long)]
    out_dir: Option<PathBuf>,
    #[arg(long)]
    prefix: Option<String>,
    /// Exposed operation (repeatable): get_all, get_one, create, update, delete_one, delete_all
    #[arg(long = "expose")]
    expose: Vec<Operation>,
    /// Field usable as a list filter (repeatable)
    #[arg(long = "query-param")]
    query_params: Vec<String>,
    #[arg(long, default_value_t = DEFAULT_PAGINATE)]
    paginate: u32,
    #[arg(long, env = "DATAREST_CONNECT", default_value = DEFAULT_CONNECT_STRING)]
    connect: String,
    /// API description text, or a file holding it
    #[arg(long, default_value = "")]
    description: String,
}

impl AppArgs {
    fn apply(&self, opts: &mut AppConfigOptions) {
        opts.prefix = self.prefix.clone();
        if !self.expose.is_empty() {
            opts.expose_routes = self.expose.clone();
        }
        opts.query_params = self.query_params.clone();
        opts.paginate = self.paginate;
        opts.connect_string = self.connect.clone();
        opts.description = self.description.clone();
    }
}

fn pairs(values: &[String], what: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    values
        .iter()
        .map(|v| {
            v.split_once(':')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .ok_or_else(|| ConfigError::Validation(format!("{} '{}' is not of the form name:value", what, v)))
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("datarest=info")))
        .init();

    let cli = Cli::parse();
    let registry = IdRegistry::standard();
    match cli.command {
        Commands::Init(InitCommand::Datafile {
            file,
            id_type,
            primary_key,
            required,
            types,
            descriptions,
            sep,
            rewrite,
            load,
            table,
            app,
        }) => {
            let mut opts = DatafileOptions::new(file, id_type);
            if let Some(table) = &table {
                opts.app = AppConfigOptions::new(table);
            }
            opts.primary_key = primary_key;
            opts.concat_sep = sep;
            opts.rewrite_datafile = rewrite;
            opts.normalize.required = required;
            opts.normalize.descriptions = pairs(&descriptions, "description")?;
            for (name, ty) in pairs(&types, "type")? {
                opts.normalize.type_overrides.insert(name, FieldType::parse_override(&ty)?);
            }
            if let Some(dir) = &app.out_dir {
                opts.out_dir = dir.clone();
            }
            app.apply(&mut opts.app);

            let prepared = prepare_datafile(&opts, &registry)?;
            tracing::info!(config = %prepared.config_path.display(), schema = %prepared.schema_path.display(), "initialized");
            if load {
                let url = prepared.config.datarest.database.url();
                ensure_database_exists(&url).await?;
                let store = PgStore::connect(&url).await?;
                load_datafile(&prepared, &store).await?;
            }
        }
        Commands::Init(InitCommand::Db {
            table,
            descriptions,
            app,
        }) => {
            let mut opts = TableOptions::new(&table);
            opts.descriptions = pairs(&descriptions, "description")?;
            if let Some(dir) = &app.out_dir {
                opts.out_dir = dir.clone();
            }
            app.apply(&mut opts.app);
            let url = datarest::config::DatabaseConfig {
                connect_string: opts.app.connect_string.clone(),
            }
            .url();
            let store = PgStore::connect(&url).await?;
            init_table(&opts, &store, &registry).await?;
        }
        Commands::Run { config, bind } => datarest::serve(&config, &bind).await?,
    }
    Ok(())
}
