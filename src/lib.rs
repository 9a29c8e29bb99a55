pub mod cli;
pub mod columns;
pub mod config;
pub mod db;
pub mod error;
pub mod geojson;
pub mod identifier;
pub mod ingest;
pub mod io_utils;
pub mod mapping;
pub mod sanitize;
pub mod schema;
pub mod sql;
pub mod table;
pub mod upsert;
pub mod value;
pub mod writer;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{Cli, Commands, NormalizeArgs, TablesArgs, TargetArgs},
    config::Config,
    db::{Database, PostgresDatabase, SqliteDatabase},
    identifier::{NormalizeOptions, SeparatorPolicy},
    table::TextTable,
};

pub use crate::{
    error::{DbError, DbErrorKind, RowError, WriterError},
    geojson::GeoJsonDbWriter,
    value::{FieldValue, Record},
    writer::{SchemaHook, StructuredDbWriter, WriteSummary, WriterOptions},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("structured_writer", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Ingest(args) => ingest::execute(&args),
        Commands::Normalize(args) => handle_normalize(&args),
        Commands::Columns(args) => columns::execute(&args),
        Commands::Tables(args) => handle_tables(&args),
    }
}

/// Resolves the database named on the command line and the optional config
/// file. `--sqlite` wins over `--dsn`, which wins over the config file.
pub(crate) fn open_target(target: &TargetArgs) -> Result<(Box<dyn Database>, Config)> {
    let config = match &target.config {
        Some(path) => Config::load(path).with_context(|| format!("Loading config from {path:?}"))?,
        None => Config::default(),
    };
    let db: Box<dyn Database> = if let Some(path) = &target.sqlite {
        debug!("Using SQLite database {path:?}");
        Box::new(SqliteDatabase::open(path))
    } else if let Some(dsn) = &target.dsn {
        Box::new(PostgresDatabase::new(dsn.clone()))
    } else if let Some(database) = &config.database {
        debug!("Using PostgreSQL database '{}' on {}", database.dbname, database.host);
        Box::new(PostgresDatabase::new(database.conninfo()))
    } else {
        bail!("No database given; pass --sqlite, --dsn or a config with a `database` section");
    };
    Ok((db, config))
}

fn handle_normalize(args: &NormalizeArgs) -> Result<()> {
    let options = NormalizeOptions {
        maxlen: args.maxlen,
        make_snake: !args.no_snake,
        ensure_leading_alpha: !args.allow_leading_digit,
        separator_policy: if args.remove_separators {
            SeparatorPolicy::Remove
        } else {
            SeparatorPolicy::Underscore
        },
    };
    for value in &args.values {
        println!("{}", identifier::normalize_identifier(value, &options));
    }
    Ok(())
}

fn handle_tables(args: &TablesArgs) -> Result<()> {
    let (db, _) = open_target(&args.target)?;
    let mut session = db.connect().context("Connecting to database")?;

    let Some(table) = &args.show else {
        let tables = schema::list_tables(session.as_mut())?;
        for table in &tables {
            println!("{table}");
        }
        info!("Found {} table(s)", tables.len());
        return Ok(());
    };

    let (columns, rows) = schema::fetch_rows(session.as_mut(), table)
        .with_context(|| format!("Reading rows of '{table}'"))?;
    if columns.is_empty() {
        bail!("Table '{table}' does not exist");
    }
    let mut listing = TextTable::new(columns);
    for row in rows.iter().take(args.limit) {
        listing.push_db_row(row);
    }
    listing.print();
    info!(
        "Showed {} of {} row(s) from '{table}'",
        listing.len(),
        rows.len()
    );
    Ok(())
}
