//! Database access seam.
//!
//! A [`Database`] hands out short-lived [`Session`]s; the writer opens one per
//! phase (inspect, evolve, mappings, row loop) and drops it afterwards. Every
//! value crossing this boundary is text or NULL, matching the all-TEXT table
//! model.

pub mod postgres;
pub mod sqlite;

use crate::{error::DbError, sql::Dialect};

pub use self::{postgres::PostgresDatabase, sqlite::SqliteDatabase};

/// One result row; `None` is SQL NULL.
pub type Row = Vec<Option<String>>;

pub trait Session {
    fn dialect(&self) -> Dialect;

    /// Runs a statement and returns the affected row count.
    fn execute(&mut self, sql: &str, params: &[Option<&str>]) -> Result<u64, DbError>;

    fn query(&mut self, sql: &str, params: &[Option<&str>]) -> Result<Vec<Row>, DbError>;

    /// Runs parameterless SQL, possibly several statements.
    fn batch(&mut self, sql: &str) -> Result<(), DbError>;

    fn query_opt(&mut self, sql: &str, params: &[Option<&str>]) -> Result<Option<Row>, DbError> {
        Ok(self.query(sql, params)?.into_iter().next())
    }

    fn begin(&mut self) -> Result<(), DbError> {
        let statement = self.dialect().begin();
        self.batch(statement)
    }

    fn commit(&mut self) -> Result<(), DbError> {
        self.batch("COMMIT")
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        self.batch("ROLLBACK")
    }
}

pub trait Database {
    fn dialect(&self) -> Dialect;

    /// Opens a fresh connection.
    fn connect(&self) -> Result<Box<dyn Session>, DbError>;
}

impl<D: Database + ?Sized> Database for &D {
    fn dialect(&self) -> Dialect {
        (**self).dialect()
    }

    fn connect(&self) -> Result<Box<dyn Session>, DbError> {
        (**self).connect()
    }
}

impl<D: Database + ?Sized> Database for Box<D> {
    fn dialect(&self) -> Dialect {
        (**self).dialect()
    }

    fn connect(&self) -> Result<Box<dyn Session>, DbError> {
        (**self).connect()
    }
}
