//! Change-detecting row upsert keyed on `_id`.

use log::{trace, warn};

use crate::{
    db::Session,
    error::{DbError, DbErrorKind},
    sql::{self, ColumnTypes},
    value::{ID_FIELD, Record},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// The stored row already held exactly these values; nothing was written.
    Unchanged,
}

/// Writes `row` into `table` inside its own transaction.
///
/// Values are compared in their stored text form, so `1` and `"1"` are the
/// same value. Columns listed in `types` receive their value cast from text
/// to the declared type. The row must carry a non-null `_id`.
pub fn upsert(
    session: &mut dyn Session,
    table: &str,
    types: &ColumnTypes,
    row: &Record,
) -> Result<UpsertOutcome, DbError> {
    let id = row
        .get(ID_FIELD)
        .and_then(|value| value.to_stored())
        .ok_or_else(|| DbError::new(DbErrorKind::Other, "upsert", "row has no usable _id"))?;
    let columns: Vec<&str> = row.keys().collect();
    let values: Vec<Option<String>> = row.iter().map(|(_, value)| value.to_stored()).collect();

    session.begin()?;
    match write_row(session, table, types, &id, &columns, &values) {
        Ok(outcome) => {
            session.commit()?;
            Ok(outcome)
        }
        Err(err) => {
            if let Err(rollback) = session.rollback() {
                warn!("Rollback after failed write of _id={id} failed: {rollback}");
            }
            Err(err)
        }
    }
}

fn write_row(
    session: &mut dyn Session,
    table: &str,
    types: &ColumnTypes,
    id: &str,
    columns: &[&str],
    values: &[Option<String>],
) -> Result<UpsertOutcome, DbError> {
    let dialect = session.dialect();
    let existing = session
        .query_opt(&sql::select_row(dialect, table, columns, types), &[Some(id)])
        .map_err(|err| err.with_context(format!("reading _id={id} from '{table}'")))?;
    if existing.as_deref() == Some(values) {
        trace!("Row _id={id} unchanged");
        return Ok(UpsertOutcome::Unchanged);
    }

    let params: Vec<Option<&str>> = values.iter().map(Option::as_deref).collect();
    let statement = sql::upsert(dialect, table, columns, types);
    let context = || format!("upserting _id={id} into '{table}'");
    if dialect.reports_insert() {
        let returned = session
            .query_opt(&statement, &params)
            .map_err(|err| err.with_context(context()))?;
        return Ok(match returned.and_then(|row| row.into_iter().next().flatten()) {
            Some(flag) if flag == "true" => UpsertOutcome::Inserted,
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Unchanged,
        });
    }

    session
        .execute(&statement, &params)
        .map_err(|err| err.with_context(context()))?;
    Ok(if existing.is_some() {
        UpsertOutcome::Updated
    } else {
        UpsertOutcome::Inserted
    })
}
