//! Rowbind CLI - inspect and initialize Rowbind databases

use clap::{Parser, Subcommand, ValueEnum};
use rowbind::config::{self, DatabaseConfig};
use rowbind::storage::sqlite::schema_statements;
use rowbind::tables::{self, ServerPropertyCategory};
use rowbind::ui::{self, ColumnTable, CountTable, Icons};
use rowbind::ObjectDatabase;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "rowbind")]
#[command(version)]
#[command(about = "Metadata-driven object persistence for relational databases")]
#[command(long_about = r#"
Rowbind maps plain records to relational tables, deriving columns, keys,
unique constraints and indexes from declared record metadata.

Example usage:
  rowbind init
  rowbind schema --format json
  rowbind tables --database .rowbind/rowbind.db
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Print the derived schema and DDL of the built-in tables
    Schema {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Create the built-in tables and print their row counts
    Tables {
        /// Path to the database file (overrides the configuration)
        #[arg(short, long)]
        database: Option<PathBuf>,
    },

    /// List server property categories
    Categories {
        /// Path to the database file (overrides the configuration)
        #[arg(short, long)]
        database: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Init { force } => {
            ui::header("Initializing rowbind");
            let root = std::env::current_dir()?;
            let config_path = cli.config.unwrap_or_else(config::default_config_path);
            let database_path = config::default_database_path_in(&root);

            let mut settings = DatabaseConfig::default();
            settings.connection.path = Some(
                database_path
                    .strip_prefix(&root)
                    .unwrap_or(&database_path)
                    .to_string_lossy()
                    .to_string(),
            );

            config::write_config(&config_path, &settings, force)?;
            config::ensure_db_dir(&database_path)?;
            config::ensure_gitignore(&root)?;

            ui::success(&format!("Wrote {}", config_path.display()));
            ui::status(Icons::DATABASE, "Database", &database_path.display().to_string());
        }

        Commands::Schema { format } => {
            let schemas = tables::builtin_schemas()?;
            match format {
                Format::Json => {
                    let output: Vec<serde_json::Value> = schemas
                        .iter()
                        .map(|schema| {
                            serde_json::json!({
                                "schema": schema,
                                "statements": schema_statements(schema),
                            })
                        })
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                Format::Text => {
                    for schema in &schemas {
                        ui::section(schema.table_name());
                        println!("{}", ColumnTable::from_schema(schema).build());
                        for constraint in schema.unique_constraints() {
                            ui::summary_row("unique", &format!("{} ({})", constraint.name, constraint.columns.join(", ")));
                        }
                        for index in schema.indexes() {
                            ui::summary_row("index", &format!("{} ({})", index.name, index.columns.join(", ")));
                        }
                        println!();
                        for statement in schema_statements(schema) {
                            println!("{};", ui::muted(&statement));
                        }
                    }
                }
            }
        }

        Commands::Tables { database } => {
            let db = open_database(cli.config, database)?;
            tables::register_builtin(&db)?;

            let mut counts = CountTable::new();
            for schema in db.registry().schemas() {
                counts.add_row(schema.table_name(), db.backend().count_rows(&schema)?);
            }
            println!("{}", counts.build());
        }

        Commands::Categories { database } => {
            let db = open_database(cli.config, database)?;
            tables::register_builtin(&db)?;

            let selection = db.select_all_report::<ServerPropertyCategory>()?;
            for e in &selection.relation_errors {
                ui::warn(&e.to_string());
            }
            if selection.records.is_empty() {
                ui::info("Categories", "none");
                return Ok(());
            }

            let mut categories = selection.records;
            categories.sort_by(|a, b| (&a.base_category, &a.display_name).cmp(&(&b.base_category, &b.display_name)));
            for category in &categories {
                let parent = category.parent_category.as_deref().unwrap_or("-");
                println!(
                    "{} {} {}",
                    category.display_name,
                    ui::dim(&format!("[{}]", category.base_category)),
                    ui::muted(&format!("parent: {}", parent))
                );
            }
            ui::summary_row("Total", &categories.len().to_string());
        }
    }

    Ok(())
}

/// Open the configured SQLite database, `database` overriding the configured path.
fn open_database(
    config_path: Option<PathBuf>,
    database: Option<PathBuf>,
) -> anyhow::Result<ObjectDatabase<rowbind::SqlBackend<rowbind::SqliteDialect>>> {
    let mut settings = config::load_config(config_path.as_deref())?.unwrap_or_default();
    if let Some(path) = database {
        settings.connection.path = Some(path.to_string_lossy().to_string());
    }

    match settings.connection.path.as_deref() {
        Some(path) => {
            config::ensure_db_dir(std::path::Path::new(path))?;
            ui::status(Icons::DATABASE, "Database", path);
        }
        None => ui::warn("No database path configured, using an in-memory database"),
    }

    Ok(ObjectDatabase::open_sqlite(&settings)?)
}
