//! SQL text construction.
//!
//! Identifiers only ever reach SQL text through [`Ident`], which double-quotes
//! and escapes them. Values never do: every statement here uses positional
//! placeholders rendered for the target [`Dialect`].

use std::{collections::BTreeMap, fmt};

use itertools::Itertools;

use crate::value::ID_FIELD;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    /// Positional placeholder for the 1-based parameter `index`.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Sqlite => format!("?{index}"),
        }
    }

    /// Whether an upsert can report insert-vs-update on its own.
    pub fn reports_insert(self) -> bool {
        matches!(self, Dialect::Postgres)
    }

    /// Statement that opens a write transaction.
    pub fn begin(self) -> &'static str {
        match self {
            Dialect::Postgres => "BEGIN",
            Dialect::Sqlite => "BEGIN IMMEDIATE",
        }
    }
}

/// Declared type of each column whose values must be cast from text, keyed
/// by column name. Columns absent from the map take the text value as is.
pub type ColumnTypes = BTreeMap<String, String>;

/// Placeholder for a value bound as text and converted server-side to the
/// column's declared type.
fn value_placeholder(dialect: Dialect, index: usize, column_type: Option<&String>) -> String {
    match (dialect, column_type) {
        (Dialect::Postgres, Some(column_type)) => format!("${index}::text::{column_type}"),
        _ => dialect.placeholder(index),
    }
}

/// A quoted SQL identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ident<'a>(pub &'a str);

impl fmt::Display for Ident<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.0.replace('"', "\"\""))
    }
}

fn column_list<'a>(columns: impl IntoIterator<Item = &'a str>) -> String {
    columns.into_iter().map(Ident).join(", ")
}

pub fn create_table(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({ID_FIELD} TEXT PRIMARY KEY)",
        Ident(table)
    )
}

pub fn add_column(table: &str, column: &str) -> String {
    format!("ALTER TABLE {} ADD COLUMN {} TEXT", Ident(table), Ident(column))
}

pub fn create_mapping_table(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (original_column VARCHAR(128) NULL, sql_column VARCHAR(64) NOT NULL)",
        Ident(table)
    )
}

/// Stored pairs in insertion order; the mapping table is append-only, so
/// physical order is the order pairs were recorded in.
pub fn select_mappings(dialect: Dialect, table: &str) -> String {
    let order = match dialect {
        Dialect::Postgres => "ctid",
        Dialect::Sqlite => "rowid",
    };
    format!(
        "SELECT original_column, sql_column FROM {} ORDER BY {order}",
        Ident(table)
    )
}

pub fn insert_mapping(dialect: Dialect, table: &str) -> String {
    format!(
        "INSERT INTO {} (original_column, sql_column) VALUES ({}, {})",
        Ident(table),
        dialect.placeholder(1),
        dialect.placeholder(2)
    )
}

/// Column names of `$1` in the current schema, as text.
pub fn catalog_columns(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Postgres => {
            "SELECT column_name::text FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name::text = $1 \
             ORDER BY ordinal_position"
        }
        Dialect::Sqlite => "SELECT name FROM pragma_table_info(?1) ORDER BY cid",
    }
}

/// Name and declared type of every column of `$1` that is not stored as
/// plain text. SQLite accepts text in any column, so it has no query.
pub fn catalog_column_types(dialect: Dialect) -> Option<&'static str> {
    match dialect {
        Dialect::Postgres => Some(
            "SELECT a.attname::text, format_type(a.atttypid, a.atttypmod) \
             FROM pg_catalog.pg_attribute a \
             WHERE a.attrelid = to_regclass(quote_ident(current_schema()) || '.' || quote_ident($1)) \
             AND a.attnum > 0 AND NOT a.attisdropped \
             AND a.atttypid NOT IN ('text'::regtype, 'varchar'::regtype, 'bpchar'::regtype)",
        ),
        Dialect::Sqlite => None,
    }
}

pub fn catalog_table_exists(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Postgres => {
            "SELECT table_name::text FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name::text = $1"
        }
        Dialect::Sqlite => "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
    }
}

pub fn catalog_tables(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Postgres => {
            "SELECT table_name::text FROM information_schema.tables \
             WHERE table_schema = current_schema() ORDER BY table_name"
        }
        Dialect::Sqlite => {
            "SELECT name FROM sqlite_master WHERE type = 'table' \
             AND name NOT LIKE 'sqlite_%' ORDER BY name"
        }
    }
}

fn text_fields<'a>(dialect: Dialect, columns: impl IntoIterator<Item = &'a str>) -> String {
    columns
        .into_iter()
        .map(|column| match dialect {
            Dialect::Postgres => format!("{}::text", Ident(column)),
            Dialect::Sqlite => Ident(column).to_string(),
        })
        .join(", ")
}

/// Every column of every row, as text.
pub fn select_all(dialect: Dialect, table: &str, columns: &[String]) -> String {
    format!(
        "SELECT {} FROM {} ORDER BY {ID_FIELD}",
        text_fields(dialect, columns.iter().map(String::as_str)),
        Ident(table)
    )
}

pub fn select_row(dialect: Dialect, table: &str, columns: &[&str], types: &ColumnTypes) -> String {
    format!(
        "SELECT {} FROM {} WHERE {ID_FIELD} = {}",
        text_fields(dialect, columns.iter().copied()),
        Ident(table),
        value_placeholder(dialect, 1, types.get(ID_FIELD))
    )
}

/// `INSERT ... ON CONFLICT (_id) DO UPDATE` for `columns`, in order.
pub fn upsert(dialect: Dialect, table: &str, columns: &[&str], types: &ColumnTypes) -> String {
    let placeholders = columns
        .iter()
        .enumerate()
        .map(|(idx, column)| value_placeholder(dialect, idx + 1, types.get(*column)))
        .join(", ");
    let updates = columns
        .iter()
        .filter(|column| **column != ID_FIELD)
        .map(|column| format!("{0} = EXCLUDED.{0}", Ident(column)))
        .join(", ");
    let conflict = if updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {updates}")
    };
    let returning = if dialect.reports_insert() {
        " RETURNING (xmax = 0)::text"
    } else {
        ""
    };
    format!(
        "INSERT INTO {} ({}) VALUES ({placeholders}) ON CONFLICT ({ID_FIELD}) {conflict}{returning}",
        Ident(table),
        column_list(columns.iter().copied()),
    )
}
