use std::error::Error as _;

use log::debug;
use postgres::{Client, NoTls, error::SqlState, types::ToSql};

use super::{Database, Row, Session};
use crate::{
    error::{DbError, DbErrorKind},
    sql::Dialect,
};

/// PostgreSQL reached through a libpq-style connection string.
#[derive(Debug, Clone)]
pub struct PostgresDatabase {
    conninfo: String,
}

impl PostgresDatabase {
    pub fn new(conninfo: impl Into<String>) -> Self {
        Self {
            conninfo: conninfo.into(),
        }
    }
}

impl Database for PostgresDatabase {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn connect(&self) -> Result<Box<dyn Session>, DbError> {
        let client = Client::connect(&self.conninfo, NoTls).map_err(|err| {
            DbError::new(DbErrorKind::Connection, "connecting to PostgreSQL", err.to_string())
        })?;
        debug!("Opened PostgreSQL session");
        Ok(Box::new(PostgresSession { client }))
    }
}

struct PostgresSession {
    client: Client,
}

fn bind<'a>(params: &'a [Option<&'a str>]) -> Vec<&'a (dyn ToSql + Sync)> {
    params
        .iter()
        .map(|param| param as &(dyn ToSql + Sync))
        .collect()
}

fn classify(err: &postgres::Error) -> DbErrorKind {
    if err.is_closed() {
        return DbErrorKind::Connection;
    }
    match err.code() {
        Some(code) if *code == SqlState::DUPLICATE_COLUMN => DbErrorKind::DuplicateColumn,
        Some(code) if *code == SqlState::DUPLICATE_TABLE => DbErrorKind::DuplicateTable,
        Some(code) if *code == SqlState::UNIQUE_VIOLATION => DbErrorKind::UniqueViolation,
        Some(_) => DbErrorKind::Other,
        None => {
            let io_failure = err
                .source()
                .is_some_and(|source| source.downcast_ref::<std::io::Error>().is_some());
            if io_failure {
                DbErrorKind::Connection
            } else {
                DbErrorKind::Other
            }
        }
    }
}

fn convert(err: postgres::Error, sql: &str) -> DbError {
    let message = match err.as_db_error() {
        Some(db) => db.message().to_string(),
        None => err.to_string(),
    };
    DbError::new(classify(&err), sql, message)
}

impl Session for PostgresSession {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn execute(&mut self, sql: &str, params: &[Option<&str>]) -> Result<u64, DbError> {
        self.client
            .execute(sql, &bind(params))
            .map_err(|err| convert(err, sql))
    }

    fn query(&mut self, sql: &str, params: &[Option<&str>]) -> Result<Vec<Row>, DbError> {
        let rows = self
            .client
            .query(sql, &bind(params))
            .map_err(|err| convert(err, sql))?;
        rows.iter()
            .map(|row| {
                (0..row.len())
                    .map(|idx| row.try_get::<_, Option<String>>(idx))
                    .collect::<Result<Row, _>>()
                    .map_err(|err| convert(err, sql))
            })
            .collect()
    }

    fn batch(&mut self, sql: &str) -> Result<(), DbError> {
        self.client
            .batch_execute(sql)
            .map_err(|err| convert(err, sql))
    }
}
