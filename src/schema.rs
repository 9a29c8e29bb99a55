//! Live table schema inspection and additive evolution.
//!
//! Tables only ever grow: a [`SchemaPlan`] lists what is missing and
//! [`evolve`] applies it one statement at a time in autocommit mode, so a
//! concurrent writer adding the same column is logged and ignored instead of
//! aborting the batch.

use std::collections::BTreeSet;

use log::{debug, info};

use crate::{
    db::{Row, Session},
    error::DbError,
    sql::{self, ColumnTypes},
    value::ID_FIELD,
};

/// Columns a table needs beyond what it already has.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaPlan {
    pub create_table: bool,
    pub add_columns: Vec<String>,
}

impl SchemaPlan {
    /// Pure diff of the required names against `existing`. An empty
    /// `existing` set means the table has to be created.
    pub fn diff<'a>(
        existing: &BTreeSet<String>,
        required: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let mut seen = BTreeSet::new();
        let add_columns = required
            .into_iter()
            .filter(|column| *column != ID_FIELD && !existing.contains(*column))
            .filter(|column| seen.insert(*column))
            .map(str::to_string)
            .collect();
        Self {
            create_table: existing.is_empty(),
            add_columns,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.create_table && self.add_columns.is_empty()
    }
}

/// What [`evolve`] actually did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaChanges {
    pub created_table: bool,
    pub added: Vec<String>,
    /// Columns another writer created between inspection and `ALTER`.
    pub already_present: Vec<String>,
}

/// Column names of `table`; empty when the table does not exist.
pub fn inspect_columns(session: &mut dyn Session, table: &str) -> Result<BTreeSet<String>, DbError> {
    Ok(inspect_columns_ordered(session, table)?.into_iter().collect())
}

pub fn evolve<'a>(
    session: &mut dyn Session,
    table: &str,
    existing: &BTreeSet<String>,
    required: impl IntoIterator<Item = &'a str>,
) -> Result<SchemaChanges, DbError> {
    let plan = SchemaPlan::diff(existing, required);
    apply(session, table, &plan)
}

/// Applies `plan`, treating "already exists" races as success.
pub fn apply(
    session: &mut dyn Session,
    table: &str,
    plan: &SchemaPlan,
) -> Result<SchemaChanges, DbError> {
    let mut changes = SchemaChanges::default();
    if plan.create_table {
        match session.batch(&sql::create_table(table)) {
            Ok(()) => {
                info!("Created table '{table}'");
                changes.created_table = true;
            }
            Err(err) if err.kind.is_already_applied() => {
                debug!("Table '{table}' already exists: {}", err.message);
            }
            Err(err) => return Err(err.with_context(format!("creating table '{table}'"))),
        }
    }
    for column in &plan.add_columns {
        match session.batch(&sql::add_column(table, column)) {
            Ok(()) => {
                info!("Added column '{column}' to '{table}'");
                changes.added.push(column.clone());
            }
            Err(err) if err.kind.is_already_applied() => {
                debug!("Column '{column}' already present on '{table}': {}", err.message);
                changes.already_present.push(column.clone());
            }
            Err(err) => {
                return Err(err.with_context(format!("adding column '{column}' to '{table}'")));
            }
        }
    }
    Ok(changes)
}

/// Columns of `table` declared with a type other than text, such as those a
/// predefined schema creates. Values bound to them are cast server-side.
pub fn column_types(session: &mut dyn Session, table: &str) -> Result<ColumnTypes, DbError> {
    let Some(statement) = sql::catalog_column_types(session.dialect()) else {
        return Ok(ColumnTypes::new());
    };
    let rows = session
        .query(statement, &[Some(table)])
        .map_err(|err| err.with_context(format!("reading column types of '{table}'")))?;
    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let mut cells = row.into_iter().flatten();
            Some((cells.next()?, cells.next()?))
        })
        .collect())
}

pub fn table_exists(session: &mut dyn Session, table: &str) -> Result<bool, DbError> {
    let dialect = session.dialect();
    let row = session
        .query_opt(sql::catalog_table_exists(dialect), &[Some(table)])
        .map_err(|err| err.with_context(format!("checking for table '{table}'")))?;
    Ok(row.is_some())
}

pub fn list_tables(session: &mut dyn Session) -> Result<Vec<String>, DbError> {
    let dialect = session.dialect();
    let rows = session
        .query(sql::catalog_tables(dialect), &[])
        .map_err(|err| err.with_context("listing tables"))?;
    Ok(rows.into_iter().filter_map(first_cell).collect())
}

/// Every row of `table` as text, ordered by `_id`, with the column order of
/// the catalog.
pub fn fetch_rows(
    session: &mut dyn Session,
    table: &str,
) -> Result<(Vec<String>, Vec<Row>), DbError> {
    let columns = inspect_columns_ordered(session, table)?;
    if columns.is_empty() {
        return Ok((columns, Vec::new()));
    }
    let dialect = session.dialect();
    let data = session
        .query(&sql::select_all(dialect, table, &columns), &[])
        .map_err(|err| err.with_context(format!("reading rows of '{table}'")))?;
    Ok((columns, data))
}

fn inspect_columns_ordered(session: &mut dyn Session, table: &str) -> Result<Vec<String>, DbError> {
    let dialect = session.dialect();
    let rows = session
        .query(sql::catalog_columns(dialect), &[Some(table)])
        .map_err(|err| err.with_context(format!("inspecting columns of '{table}'")))?;
    Ok(rows.into_iter().filter_map(first_cell).collect())
}

fn first_cell(row: Row) -> Option<String> {
    row.into_iter().next().flatten()
}
