use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{identifier::MAX_IDENTIFIER_LEN, io_utils::InputFormat};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Write semi-structured records into evolving SQL tables",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Load records from a CSV, JSON or GeoJSON file into a table
    Ingest(IngestArgs),
    /// Print the SQL identifier each argument normalizes to
    Normalize(NormalizeArgs),
    /// Show the stored original-key to column mappings of a table
    Columns(ColumnsArgs),
    /// List tables in the target database, or print one table's rows
    Tables(TablesArgs),
}

/// Where to write: a SQLite file, a PostgreSQL DSN, or the `database`
/// section of a config file, in that order of precedence.
#[derive(Debug, Clone, Args)]
pub struct TargetArgs {
    /// PostgreSQL connection string
    #[arg(long, env = "STRUCTURED_WRITER_DSN", hide_env_values = true)]
    pub dsn: Option<String>,
    /// YAML config file with `database` and `writer` sections
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Write to this SQLite database file instead of PostgreSQL
    #[arg(long)]
    pub sqlite: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Input file (`-` for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Input format (detected from the extension when omitted)
    #[arg(short, long, value_enum)]
    pub format: Option<InputFormat>,
    #[command(flatten)]
    pub target: TargetArgs,
    /// Destination table (overrides `writer.table` from the config file)
    #[arg(short, long)]
    pub table: Option<String>,
    /// Append `__<suffix>` to the table name
    #[arg(long)]
    pub suffix: Option<String>,
    /// Persist original-key mappings in `<table>__columns`
    #[arg(long = "mapping-table")]
    pub mapping_table: bool,
    /// Reverse keys split on this separator before sanitizing
    #[arg(long = "reverse-separator")]
    pub reverse_separator: Option<String>,
    /// Literal key replacement `FROM=TO`; replaces the default `/=__`
    #[arg(long = "replace", value_parser = parse_replacement, action = clap::ArgAction::Append)]
    pub replacements: Vec<(String, String)>,
    /// Maximum column name length
    #[arg(long)]
    pub maxlen: Option<usize>,
    /// CSV column that supplies `_id` (row numbers are used when absent)
    #[arg(long = "id-column", default_value = "_id")]
    pub id_column: String,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Delete the input file after a run with no failed records
    #[arg(long = "delete-input")]
    pub delete_input: bool,
}

#[derive(Debug, Args)]
pub struct NormalizeArgs {
    /// Raw names to normalize
    #[arg(required = true)]
    pub values: Vec<String>,
    /// Maximum identifier length
    #[arg(long, default_value_t = MAX_IDENTIFIER_LEN)]
    pub maxlen: usize,
    /// Keep case instead of converting to snake_case
    #[arg(long = "no-snake")]
    pub no_snake: bool,
    /// Do not prefix names that start with a digit
    #[arg(long = "allow-leading-digit")]
    pub allow_leading_digit: bool,
    /// Drop separators instead of turning them into underscores
    #[arg(long = "remove-separators")]
    pub remove_separators: bool,
}

#[derive(Debug, Args)]
pub struct ColumnsArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    /// Main table whose mappings are listed
    #[arg(short, long)]
    pub table: String,
    /// Suffix the table was written with
    #[arg(long)]
    pub suffix: Option<String>,
}

#[derive(Debug, Args)]
pub struct TablesArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    /// Print the rows of this table instead of listing tables
    #[arg(long)]
    pub show: Option<String>,
    /// Maximum number of rows to print with --show
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

pub fn parse_replacement(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((from, _)) if from.is_empty() => Err("Replacement source cannot be empty".to_string()),
        Some((from, to)) => Ok((from.to_string(), to.to_string())),
        None => Err(format!("Replacement '{value}' must look like FROM=TO")),
    }
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
