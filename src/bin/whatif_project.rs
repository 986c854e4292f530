//! whatif-project - runs one projection against a universe database and
//! prints the rounded report as JSON.
//!
//! Logs go to stderr; set `RUST_LOG` to change the filter.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use whatif::{
    plan_from_params, EngineConfig, QueryParams, SchemaDescriptor, SqliteUniverse, UniverseHandle,
    WhatIfResult,
};

#[derive(Parser, Debug)]
#[command(name = "whatif-project")]
#[command(about = "Project catalog prices and revenue under scheduled events")]
struct Cli {
    /// Path to the universe database
    db: PathBuf,

    /// Comma-separated object ids to simulate
    #[arg(long)]
    ids: Option<String>,

    /// Simulate every object of this family (ignored when --ids is given)
    #[arg(long)]
    family: Option<String>,

    /// Simulate every object of this type (ignored when --ids or --family is given)
    #[arg(long = "type")]
    object_type: Option<String>,

    /// First simulated year
    #[arg(long)]
    start_year: Option<i32>,

    /// Horizon in years; above the configured limit the run is refused
    #[arg(long)]
    years: Option<u32>,

    /// Event schedule, `event:year:price_coef:revenue_coef` blocks separated by commas
    #[arg(long, default_value = "")]
    schedule: String,

    /// Engine configuration as a JSON file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Catalog table whose columns are discovered
    #[arg(long, default_value = SchemaDescriptor::DEFAULT_TABLE)]
    table: String,

    /// Pretty-print the JSON report
    #[arg(long)]
    pretty: bool,
}

impl Cli {
    fn query(&self) -> QueryParams {
        let mut params = QueryParams::new().with("planning", self.schedule.as_str());
        let optional = [
            ("selection_ids", self.ids.clone()),
            ("famille", self.family.clone()),
            ("type", self.object_type.clone()),
            ("annee_depart", self.start_year.map(|y| y.to_string())),
            ("nb_annees", self.years.map(|y| y.to_string())),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                params = params.with(key, value);
            }
        }
        params
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig, String> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    EngineConfig::from_json_str(&text).map_err(|e| e.to_string())
}

fn open_universe(cli: &Cli, config: EngineConfig) -> WhatIfResult<UniverseHandle> {
    if cli.table == SchemaDescriptor::DEFAULT_TABLE {
        return UniverseHandle::open_sqlite(&cli.db, None, config);
    }
    let store = Arc::new(SqliteUniverse::open_discovering(&cli.db, &cli.table)?);
    UniverseHandle::new(store.clone(), store.clone(), store.clone(), store, config)
}

fn run(cli: &Cli) -> Result<String, String> {
    let config = load_config(cli.config.as_ref())?;
    let plan = plan_from_params(&cli.query(), &config);

    let universe = open_universe(cli, config).map_err(|e| e.to_string())?;
    info!(db = %cli.db.display(), years = plan.years, "running projection");
    let report = universe.project(&plan).map_err(|e| e.to_string())?.rounded();

    let json = if cli.pretty {
        serde_json::to_string_pretty(&report)
    } else {
        serde_json::to_string(&report)
    };
    json.map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,whatif=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(message) => {
            error!("{message}");
            ExitCode::FAILURE
        }
    }
}
