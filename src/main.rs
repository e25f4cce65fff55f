//! data-manager CLI - inspect a database of computation results

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use data_manager::collection::KEY_KIND;
use data_manager::config::{self, DataManagerConfig};
use data_manager::storage::OpenOptions;
use data_manager::ui::{self, Icons, StepRow};
use data_manager::{
    CollectionSerializer, Database, ReferenceStore, ResultStore, StepGraph, StepId, StepStore,
};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "data-manager")]
#[command(version)]
#[command(about = "Relational store for scientific computation results")]
#[command(long_about = r#"
data-manager keeps the results of computational workflows in SQLite:
  • Scalar results, lists and matrices per processing step
  • Free-form properties on results, steps, hosts and systems
  • A dependency graph between processing steps

Example usage:
  data-manager init --database results
  data-manager steps --project Dummy
  data-manager result --step 3 --kind Energy --format json
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the database file (overrides the config file)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config file and create the database
    Init {
        /// Overwrite an existing config file
        #[arg(short, long)]
        force: bool,
    },

    /// Show row counts per table
    Stats,

    /// List the steps of a project in dependency order
    Steps {
        /// Project name
        #[arg(short, long)]
        project: String,
    },

    /// Show a single processing step
    Step {
        /// Step id
        #[arg(short, long)]
        id: i64,
    },

    /// Show the results of one kind for a step
    #[command(name = "result")]
    Results {
        /// Step id
        #[arg(short, long)]
        step: i64,

        /// Result kind, e.g. "Energy"
        #[arg(short, long)]
        kind: String,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let loaded = config::load_config(Some(&config_path))
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let settings = loaded.unwrap_or_default();
    let database = database_path(cli.database.as_deref(), &settings);

    match cli.command {
        Commands::Init { force } => {
            let written = DataManagerConfig {
                database: Some(database.to_string_lossy().to_string()),
                create_as_needed: Some(settings.create_as_needed.unwrap_or(true)),
            };
            config::write_config(&config_path, &written, force)?;
            config::ensure_db_dir(&database)?;
            let db = Database::open_with(&database, OpenOptions { create_as_needed: true })?;

            ui::header("Initialized data-manager");
            ui::status(Icons::FILE, "Config", &config_path.display().to_string());
            ui::status(Icons::DATABASE, "Database", &database.display().to_string());
            ui::success(&format!("{} tables ready", db.stats()?.tables.len()));
        }

        Commands::Stats => {
            let db = open(&database, &settings)?;
            let stats = db.stats()?;

            ui::header(&format!("{} Database statistics", Icons::STATS));
            ui::status(Icons::DATABASE, "Database", &database.display().to_string());
            println!("{}", ui::stats_table(&stats.tables));
        }

        Commands::Steps { project } => {
            let db = open(&database, &settings)?;
            let conn = db.connection();
            let project = ReferenceStore::new(conn)
                .find_project(&project)?
                .with_context(|| format!("no project named '{}'", project))?;

            let dag = StepGraph::new(conn).load(project.id)?;
            let results = ResultStore::new(conn);
            let mut rows = Vec::new();
            for step in dag.topological_order() {
                let preceding: Vec<String> =
                    dag.preceding(step.id).map(|id| id.to_string()).collect();
                rows.push(StepRow {
                    id: step.id.0,
                    kind: step.kind.clone(),
                    preceding: if preceding.is_empty() { "-".into() } else { preceding.join(", ") },
                    results: results.count(Some(step.id))?,
                    output: step.output_path.clone().unwrap_or_else(|| "-".into()),
                });
            }

            ui::header(&format!("Project {}", project.name.style(ui::theme().kind.clone())));
            if let Some(description) = &project.description {
                ui::summary_row("Description:", description);
            }
            if rows.is_empty() {
                ui::warn("No processing steps");
            } else {
                println!("{}", ui::steps_table(&rows));
            }
            if !data_manager::output::is_quiet() {
                print!("{}", dag.stats());
            }
        }

        Commands::Step { id } => {
            let db = open(&database, &settings)?;
            let conn = db.connection();
            let step_id = StepId(id);
            let steps = StepStore::new(conn);
            let step = steps
                .get(step_id)?
                .with_context(|| format!("no processing step with id {}", id))?;

            let kind = step.kind.style(ui::theme().kind.clone());
            ui::header(&format!("Step {} ({})", step.id, kind));
            ui::info("Project", &step.project.to_string());
            if let Some(path) = &step.output_path {
                ui::status(Icons::FILE, "Output", path);
            }

            let graph = StepGraph::new(conn);
            ui::status(Icons::UP, "Depends on", &join_ids(graph.preceding_steps(step_id)?));
            ui::status(Icons::DOWN, "Needed by", &join_ids(graph.dependent_steps(step_id)?));

            let keywords: Vec<String> =
                steps.keywords(step_id)?.into_iter().map(|k| k.name).collect();
            if !keywords.is_empty() {
                ui::status(Icons::LINK, "Keywords", &keywords.join(", "));
            }

            let properties = steps.properties(step_id).all()?;
            if !properties.is_empty() {
                ui::section("Properties");
                for (key, value) in &properties {
                    ui::summary_row(&format!("{}:", key), value);
                }
            }

            let results = ResultStore::new(conn);
            ui::section("Results");
            for kind in results.kinds(step_id)? {
                let count = results.find(step_id, &kind)?.len();
                ui::summary_row(&format!("{}:", kind), &ui::muted(&format!("{} rows", count)));
            }
        }

        Commands::Results { step, kind, format } => {
            let db = open(&database, &settings)?;
            let conn = db.connection();
            let step_id = StepId(step);
            let results = ResultStore::new(conn);
            let rows = results.find(step_id, &kind)?;
            let Some(first) = rows.first() else {
                anyhow::bail!("no '{}' results for step {}", kind, step);
            };

            // Collections carry structural properties, plain scalars do not
            if results.properties(first.id).contains(KEY_KIND)? {
                let collection = CollectionSerializer::new(conn).get_collection(&kind, step_id)?;
                match format {
                    Format::Json => println!("{}", serde_json::to_string_pretty(&collection)?),
                    Format::Text => {
                        ui::header(&format!("{} {} of step {}", collection.shape(), kind, step));
                        println!("{}", collection);
                    }
                }
            } else {
                match format {
                    Format::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
                    Format::Text => {
                        ui::header(&format!("{} of step {}", kind, step));
                        for row in &rows {
                            println!("  {} {}", ui::dim(&format!("#{}", row.id)), row.value);
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

/// The `--database` flag wins over the config file
fn database_path(flag: Option<&Path>, settings: &DataManagerConfig) -> PathBuf {
    match (flag, settings.database.as_deref()) {
        (Some(path), _) => config::resolve_database_path(&path.to_string_lossy()),
        (None, Some(name)) => config::resolve_database_path(name),
        (None, None) => config::default_database_path(),
    }
}

fn open(path: &Path, settings: &DataManagerConfig) -> anyhow::Result<Database> {
    tracing::debug!("Opening database {}", path.display());
    Database::open_with(path, settings.open_options())
        .with_context(|| format!("failed to open {}", path.display()))
}

fn join_ids(ids: impl IntoIterator<Item = StepId>) -> String {
    let ids: Vec<String> = ids.into_iter().map(|id| id.to_string()).collect();
    if ids.is_empty() {
        "-".into()
    } else {
        ids.join(", ")
    }
}
