//! Batch writer for heterogeneous records.
//!
//! [`StructuredDbWriter::handle_output`] runs the whole pipeline for one
//! batch: inspect the live table, load stored column mappings, sanitize every
//! record, grow the schema, persist new mappings, then upsert row by row.
//! Each phase uses its own short-lived session.

use std::{collections::BTreeSet, fmt, sync::Arc};

use log::{debug, info, warn};

use crate::{
    db::{Database, Session},
    error::{DbError, RowError, WriterError},
    identifier::{MAX_IDENTIFIER_LEN, table_name},
    mapping::MappingStore,
    sanitize::{ColumnMapping, ColumnSanitizer, SanitizeOptions},
    schema,
    upsert::{UpsertOutcome, upsert},
    value::{FieldValue, ID_FIELD, Record},
};

type SchemaFn = dyn Fn(&mut dyn Session, &str) -> Result<(), DbError> + Send + Sync;

/// Caller-supplied DDL that replaces dynamic schema evolution. It receives a
/// session and the final table name.
#[derive(Clone)]
pub struct SchemaHook(Arc<SchemaFn>);

impl SchemaHook {
    pub fn new<F>(hook: F) -> Self
    where
        F: Fn(&mut dyn Session, &str) -> Result<(), DbError> + Send + Sync + 'static,
    {
        Self(Arc::new(hook))
    }

    fn apply(&self, session: &mut dyn Session, table: &str) -> Result<(), DbError> {
        (self.0)(session, table)
    }
}

impl fmt::Debug for SchemaHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SchemaHook(..)")
    }
}

#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Appended as `__<suffix>` to the table name.
    pub suffix: Option<String>,
    pub use_mapping_table: bool,
    pub reverse_separator: Option<String>,
    pub replacements: Vec<(String, String)>,
    pub maxlen: usize,
    pub predefined_schema: Option<SchemaHook>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            suffix: None,
            use_mapping_table: false,
            reverse_separator: None,
            replacements: vec![("/".to_string(), "__".to_string())],
            maxlen: MAX_IDENTIFIER_LEN,
            predefined_schema: None,
        }
    }
}

impl WriterOptions {
    pub fn sanitize_options(&self) -> SanitizeOptions {
        SanitizeOptions {
            reverse_separator: self.reverse_separator.clone(),
            replacements: self.replacements.clone(),
            maxlen: self.maxlen,
        }
    }
}

/// Outcome of one batch.
#[derive(Debug, Default)]
pub struct WriteSummary {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
    /// Columns this batch added to the table.
    pub new_columns: Vec<String>,
    pub errors: Vec<RowError>,
}

impl WriteSummary {
    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.unchanged + self.failed
    }

    pub fn has_inserts(&self) -> bool {
        self.inserted > 0
    }

    fn count(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }

    pub(crate) fn reject(&mut self, error: RowError) {
        warn!("Skipping record: {error}");
        self.failed += 1;
        self.errors.push(error);
    }

    pub(crate) fn log(&self, table: &str) {
        info!(
            "Wrote {} record(s) to '{table}': {} inserted, {} updated, {} unchanged, {} failed",
            self.total(),
            self.inserted,
            self.updated,
            self.unchanged,
            self.failed
        );
    }
}

pub struct StructuredDbWriter<D> {
    db: D,
    table: String,
    options: WriterOptions,
}

impl<D: Database> StructuredDbWriter<D> {
    pub fn new(db: D, table: &str, options: WriterOptions) -> Self {
        let table = table_name(table, options.suffix.as_deref());
        debug!("Writer targets table '{table}'");
        Self { db, table, options }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    pub fn mapping_store(&self) -> MappingStore {
        MappingStore::for_table(&self.table)
    }

    pub fn handle_output(&self, records: Vec<Record>) -> Result<WriteSummary, WriterError> {
        let mut summary = WriteSummary::default();
        if records.is_empty() {
            info!("No records to write to '{}'", self.table);
            return Ok(summary);
        }

        let store = self.mapping_store();
        let (existing, mapping) = {
            let mut session = self.db.connect()?;
            let existing = schema::inspect_columns(session.as_mut(), &self.table)?;
            let mapping = if self.options.use_mapping_table {
                store.ensure(session.as_mut())?;
                store.load(session.as_mut())?
            } else {
                ColumnMapping::new()
            };
            (existing, mapping)
        };

        let mut sanitizer = ColumnSanitizer::new(mapping, self.options.sanitize_options());
        let mut rows = Vec::with_capacity(records.len());
        for (index, record) in records.into_iter().enumerate() {
            match check_id(index, &record) {
                Ok(()) => rows.push((index, sanitizer.sanitize(record))),
                Err(err) => summary.reject(err),
            }
        }
        let (mapping, added) = sanitizer.into_parts();

        {
            let mut required: Vec<&str> = rows.iter().flat_map(|(_, row)| row.keys()).collect();
            if self.options.use_mapping_table {
                // Mapped columns can be missing when the table was recreated.
                required.extend(mapping.columns());
            }
            summary.new_columns = prepare_schema(
                &self.db,
                &self.table,
                self.options.predefined_schema.as_ref(),
                &existing,
                required,
            )?;
        }

        if self.options.use_mapping_table && !added.is_empty() {
            info!("Recording {} new column mapping(s) in '{}'", added.len(), store.table());
            let mut session = self.db.connect()?;
            store.record(session.as_mut(), &added)?;
        }

        write_rows(&self.db, &self.table, rows, &mut summary)?;
        summary.log(&self.table);
        Ok(summary)
    }
}

/// Rejects records whose `_id` is absent or null.
pub(crate) fn check_id(index: usize, record: &Record) -> Result<(), RowError> {
    match record.get(ID_FIELD) {
        None => Err(RowError::MissingId { index }),
        Some(FieldValue::Null) => Err(RowError::NullId { index }),
        Some(_) => Ok(()),
    }
}

/// Runs the predefined schema hook, or evolves the table to hold `required`.
/// Returns the columns that were added.
pub(crate) fn prepare_schema<'a>(
    db: &impl Database,
    table: &str,
    hook: Option<&SchemaHook>,
    existing: &BTreeSet<String>,
    required: impl IntoIterator<Item = &'a str>,
) -> Result<Vec<String>, WriterError> {
    let mut session = db.connect()?;
    if let Some(hook) = hook {
        debug!("Applying predefined schema to '{table}'");
        hook.apply(session.as_mut(), table)
            .map_err(|source| WriterError::PredefinedSchema {
                table: table.to_string(),
                source,
            })?;
        return Ok(Vec::new());
    }
    let plan = schema::SchemaPlan::diff(existing, required);
    if plan.is_empty() {
        return Ok(Vec::new());
    }
    if !plan.add_columns.is_empty() {
        info!(
            "{} new field(s) missing from '{table}'",
            plan.add_columns.len()
        );
    }
    let changes = schema::apply(session.as_mut(), table, &plan)?;
    Ok(changes.added)
}

/// Upserts every row in one session. Row failures are collected; a lost
/// connection aborts the batch.
pub(crate) fn write_rows(
    db: &impl Database,
    table: &str,
    rows: Vec<(usize, Record)>,
    summary: &mut WriteSummary,
) -> Result<(), WriterError> {
    if rows.is_empty() {
        return Ok(());
    }
    info!("Writing {} record(s) to '{table}'", rows.len());
    let mut session = db.connect()?;
    let types = schema::column_types(session.as_mut(), table)?;
    if !types.is_empty() {
        debug!("Casting {} typed column(s) of '{table}' from text", types.len());
    }
    for (index, row) in rows {
        match upsert(session.as_mut(), table, &types, &row) {
            Ok(outcome) => summary.count(outcome),
            Err(err) if err.is_connection() => return Err(err.into()),
            Err(source) => {
                let id = row
                    .get(ID_FIELD)
                    .map(FieldValue::to_string)
                    .unwrap_or_default();
                summary.reject(RowError::Write { index, id, source });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn default_options_replace_slashes() {
        let options = WriterOptions::default();
        assert!(!options.use_mapping_table);
        assert_eq!(options.replacements, vec![("/".to_string(), "__".to_string())]);
        assert_eq!(options.sanitize_options().maxlen, 63);
    }

    #[test]
    fn id_checks() {
        let ok = Record::from_json(json!({"_id": 1})).expect("object");
        let null = Record::from_json(json!({"_id": null})).expect("object");
        let missing = Record::from_json(json!({"name": "x"})).expect("object");
        assert!(check_id(0, &ok).is_ok());
        assert!(matches!(check_id(1, &null), Err(RowError::NullId { index: 1 })));
        assert!(matches!(check_id(2, &missing), Err(RowError::MissingId { index: 2 })));
    }

    #[test]
    fn summary_totals() {
        let mut summary = WriteSummary::default();
        summary.count(UpsertOutcome::Inserted);
        summary.count(UpsertOutcome::Unchanged);
        summary.reject(RowError::MissingId { index: 3 });
        assert_eq!(summary.total(), 3);
        assert!(summary.has_inserts());
        assert_eq!(summary.errors[0].index(), 3);
    }
}
