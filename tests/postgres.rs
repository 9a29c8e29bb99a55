//! Runs against a live PostgreSQL only when `STRUCTURED_WRITER_TEST_DSN` is set.

mod common;

use std::env;

use common::records;
use serde_json::json;
use structured_writer::{
    DbErrorKind, GeoJsonDbWriter, SchemaHook, StructuredDbWriter, WriterOptions,
    db::{Database, PostgresDatabase, Session},
    schema,
    sql::Ident,
};

fn database() -> Option<PostgresDatabase> {
    match env::var("STRUCTURED_WRITER_TEST_DSN") {
        Ok(dsn) if !dsn.trim().is_empty() => Some(PostgresDatabase::new(dsn)),
        _ => {
            eprintln!("STRUCTURED_WRITER_TEST_DSN not set; skipping");
            None
        }
    }
}

fn scratch_table(name: &str) -> String {
    format!("sw_{}_{name}", std::process::id())
}

fn drop_tables(db: &PostgresDatabase, tables: &[&str]) {
    let mut session = db.connect().expect("connect");
    for table in tables {
        session
            .batch(&format!("DROP TABLE IF EXISTS {}", Ident(table)))
            .expect("drop table");
    }
}

#[test]
fn upserts_report_inserts_updates_and_no_ops() {
    let Some(db) = database() else { return };
    let table = scratch_table("trees");
    drop_tables(&db, &[table.as_str()]);

    let writer = StructuredDbWriter::new(db.clone(), &table, WriterOptions::default());
    let first = writer
        .handle_output(records(json!([{"_id": "1", "name": "Pine Tree"}])))
        .expect("first write");
    assert_eq!((first.inserted, first.updated), (1, 0));

    let second = writer
        .handle_output(records(json!([{"_id": "1", "name": "Pine Tree"}])))
        .expect("second write");
    assert_eq!((second.inserted, second.updated, second.unchanged), (0, 0, 1));

    let third = writer
        .handle_output(records(json!([{"_id": "1", "name": "Fir", "height": 9}])))
        .expect("third write");
    assert_eq!((third.updated, third.new_columns.len()), (1, 1));

    drop_tables(&db, &[table.as_str()]);
}

#[test]
fn mapping_table_and_catalog_are_scoped_to_current_schema() {
    let Some(db) = database() else { return };
    let table = scratch_table("forms");
    let options = WriterOptions {
        use_mapping_table: true,
        reverse_separator: Some("/".to_string()),
        ..WriterOptions::default()
    };
    let writer = StructuredDbWriter::new(db.clone(), &table, options);
    let mapping_table = writer.mapping_store().table().to_string();
    drop_tables(&db, &[table.as_str(), mapping_table.as_str()]);

    writer
        .handle_output(records(json!([{"_id": "1", "Cultura/col3": 3}])))
        .expect("write");

    let mut session = db.connect().expect("connect");
    assert!(schema::table_exists(session.as_mut(), &mapping_table).expect("exists"));
    let columns = schema::inspect_columns(session.as_mut(), &table).expect("inspect");
    assert!(columns.contains("col3__Cultura"));

    let err = session
        .batch(&structured_writer::sql::add_column(&table, "col3__Cultura"))
        .expect_err("duplicate column");
    assert_eq!(err.kind, DbErrorKind::DuplicateColumn);

    drop(session);
    drop_tables(&db, &[table.as_str(), mapping_table.as_str()]);
}

#[test]
fn geojson_features_round_trip() {
    let Some(db) = database() else { return };
    let table = scratch_table("places");
    drop_tables(&db, &[table.as_str()]);

    let writer = GeoJsonDbWriter::new(db.clone(), &table, None);
    let collection = json!({"type": "FeatureCollection", "features": [
        {"type": "Feature", "geometry": {"type": "Point", "coordinates": [1, 2]}, "properties": {"name": "Camp"}}
    ]});
    assert_eq!(writer.handle_collection(collection.clone()).expect("first").inserted, 1);
    assert_eq!(writer.handle_collection(collection).expect("second").unchanged, 1);

    drop_tables(&db, &[table.as_str()]);
}

#[test]
fn predefined_schema_with_typed_columns_accepts_text_values() {
    let Some(db) = database() else { return };
    let table = scratch_table("alerts");
    drop_tables(&db, &[table.as_str()]);

    let hook = SchemaHook::new(|session: &mut dyn Session, table: &str| {
        session.batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (_id uuid PRIMARY KEY, name text, \
             count bigint, area real, lat double precision, label varchar(32))",
            Ident(table)
        ))
    });
    let options = WriterOptions {
        predefined_schema: Some(hook),
        ..WriterOptions::default()
    };
    let writer = StructuredDbWriter::new(db.clone(), &table, options);
    let alert = |count: i64| {
        records(json!([{
            "_id": "0b6f3c1e-54f2-4a8e-9a57-3f5d2c9e7b10",
            "name": "Deforestation",
            "count": count,
            "area": 1.5,
            "lat": -3.25,
            "label": "north"
        }]))
    };

    let first = writer.handle_output(alert(3)).expect("first write");
    assert_eq!((first.inserted, first.failed), (1, 0), "{:?}", first.errors);
    let second = writer.handle_output(alert(3)).expect("second write");
    assert_eq!((second.unchanged, second.failed), (1, 0), "{:?}", second.errors);
    let third = writer.handle_output(alert(4)).expect("third write");
    assert_eq!((third.updated, third.failed), (1, 0), "{:?}", third.errors);

    let mut session = db.connect().expect("connect");
    let (columns, rows) = schema::fetch_rows(session.as_mut(), &table).expect("fetch");
    let count = columns.iter().position(|column| column == "count").expect("count column");
    assert_eq!(rows[0][count].as_deref(), Some("4"));

    drop(session);
    drop_tables(&db, &[table.as_str()]);
}

#[test]
fn geojson_with_uuid_key_is_idempotent() {
    let Some(db) = database() else { return };
    let table = scratch_table("sites");
    drop_tables(&db, &[table.as_str()]);

    let hook = SchemaHook::new(|session: &mut dyn Session, table: &str| {
        session.batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (_id uuid PRIMARY KEY, g__type text, \
             g__coordinates text, nome text)",
            Ident(table)
        ))
    });
    let writer = GeoJsonDbWriter::new(db.clone(), &table, None).with_predefined_schema(hook);
    let collection = json!({"type": "FeatureCollection", "features": [
        {"type": "Feature", "geometry": {"type": "Point", "coordinates": [1.5, 2]}, "properties": {"nome": "Açaí"}}
    ]});

    let first = writer.handle_collection(collection.clone()).expect("first");
    assert_eq!((first.inserted, first.failed), (1, 0), "{:?}", first.errors);
    let second = writer.handle_collection(collection).expect("second");
    assert_eq!((second.unchanged, second.failed), (1, 0), "{:?}", second.errors);

    let mut session = db.connect().expect("connect");
    let (_, rows) = schema::fetch_rows(session.as_mut(), &table).expect("fetch");
    assert_eq!(rows[0][0].as_deref(), Some("f8082489-d875-5d13-bf84-8b0e41a81d1c"));

    drop(session);
    drop_tables(&db, &[table.as_str()]);
}

#[test]
fn unreachable_server_is_a_connection_error() {
    if database().is_none() {
        return;
    }
    let db = PostgresDatabase::new("host=127.0.0.1 port=1 user=nobody dbname=nothing connect_timeout=1");
    match db.connect() {
        Err(err) => assert_eq!(err.kind, DbErrorKind::Connection),
        Ok(_) => panic!("port 1 should refuse connections"),
    }
}
