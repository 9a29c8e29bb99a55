//! Persistent `<table>__columns` store of original-key → column-name pairs.

use log::{debug, info};

use crate::{db::Session, error::DbError, identifier::table_name, sanitize::ColumnMapping, sql};

pub const MAPPING_SUFFIX: &str = "columns";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingStore {
    table: String,
}

impl MappingStore {
    /// Store belonging to the main table `table`.
    pub fn for_table(table: &str) -> Self {
        Self {
            table: table_name(table, Some(MAPPING_SUFFIX)),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn ensure(&self, session: &mut dyn Session) -> Result<(), DbError> {
        match session.batch(&sql::create_mapping_table(&self.table)) {
            Err(err) if err.kind.is_already_applied() => {
                debug!("Mapping table '{}' already exists", self.table);
                Ok(())
            }
            other => other.map_err(|err| {
                err.with_context(format!("creating mapping table '{}'", self.table))
            }),
        }
    }

    /// Loads every stored pair in the order it was recorded. Rows with a NULL
    /// original are skipped and the earliest pair for an original wins.
    pub fn load(&self, session: &mut dyn Session) -> Result<ColumnMapping, DbError> {
        let dialect = session.dialect();
        let rows = session
            .query(&sql::select_mappings(dialect, &self.table), &[])
            .map_err(|err| err.with_context(format!("loading mappings from '{}'", self.table)))?;
        let mut mapping = ColumnMapping::new();
        for row in rows {
            let mut cells = row.into_iter();
            if let (Some(Some(original)), Some(Some(column))) = (cells.next(), cells.next()) {
                mapping.insert(original, column);
            }
        }
        debug!("Loaded {} mapping(s) from '{}'", mapping.len(), self.table);
        Ok(mapping)
    }

    /// Inserts each new pair; duplicates written by a concurrent writer are
    /// skipped. Returns how many rows were inserted.
    pub fn record(
        &self,
        session: &mut dyn Session,
        pairs: &[(String, String)],
    ) -> Result<usize, DbError> {
        let statement = sql::insert_mapping(session.dialect(), &self.table);
        let mut inserted = 0;
        for (original, column) in pairs {
            match session.execute(&statement, &[Some(original.as_str()), Some(column.as_str())]) {
                Ok(_) => inserted += 1,
                Err(err) if err.kind.is_already_applied() => {
                    info!(
                        "Mapping '{original}' -> '{column}' already recorded in '{}'",
                        self.table
                    );
                }
                Err(err) => {
                    return Err(err.with_context(format!(
                        "recording mapping '{original}' in '{}'",
                        self.table
                    )));
                }
            }
        }
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::db::{Database, SqliteDatabase};

    #[test]
    fn mapping_table_name_keeps_suffix() {
        let store = MappingStore::for_table(
            "this_is_an_extremely_long_table_name_that_exceeds_postgresql_limits_significantly_2023",
        );
        assert_eq!(
            store.table(),
            "this_is_an_extremely_long_table_name_that_exceeds_post__columns"
        );
        assert_eq!(MappingStore::for_table("forms").table(), "forms__columns");
    }

    #[test]
    fn records_and_reloads_pairs() {
        let dir = tempdir().expect("temp dir");
        let db = SqliteDatabase::open(dir.path().join("mapping.sqlite"));
        let mut session = db.connect().expect("connect");
        let store = MappingStore::for_table("forms");

        store.ensure(session.as_mut()).expect("ensure");
        store.ensure(session.as_mut()).expect("ensure twice");
        let pairs = vec![
            ("Cultura/col3".to_string(), "col3__Cultura".to_string()),
            ("col.1".to_string(), "col1".to_string()),
        ];
        assert_eq!(store.record(session.as_mut(), &pairs).expect("record"), 2);

        let mapping = store.load(session.as_mut()).expect("load");
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping.get("Cultura/col3"), Some("col3__Cultura"));
        assert!(mapping.contains_column("col1"));
    }

    #[test]
    fn earliest_recorded_pair_wins() {
        let dir = tempdir().expect("temp dir");
        let db = SqliteDatabase::open(dir.path().join("mapping.sqlite"));
        let mut session = db.connect().expect("connect");
        let store = MappingStore::for_table("forms");
        store.ensure(session.as_mut()).expect("ensure");

        for column in ["question", "question_001", "question_002"] {
            store
                .record(session.as_mut(), &[("Question?".to_string(), column.to_string())])
                .expect("record");
        }
        let mapping = store.load(session.as_mut()).expect("load");
        assert_eq!(mapping.get("Question?"), Some("question"));
    }
}
