//! Column listing from a table's `__columns` mapping store.
//!
//! Renders each stored original key, the SQL column it maps to, and whether
//! that column currently exists on the table.

use anyhow::{Context, Result};
use log::info;

use crate::{
    cli::ColumnsArgs, identifier::table_name, mapping::MappingStore, open_target, schema,
    table::TextTable,
};

pub fn execute(args: &ColumnsArgs) -> Result<()> {
    let (db, _) = open_target(&args.target)?;
    let table = table_name(&args.table, args.suffix.as_deref());
    let store = MappingStore::for_table(&table);

    let mut session = db.connect().context("Connecting to database")?;
    if !schema::table_exists(session.as_mut(), store.table())? {
        info!("Table '{table}' has no mapping table '{}'", store.table());
        return Ok(());
    }
    let mapping = store
        .load(session.as_mut())
        .with_context(|| format!("Loading mappings for '{table}'"))?;
    let present = schema::inspect_columns(session.as_mut(), &table)?;

    let mut listing = TextTable::new(["#", "original", "column", "in table"]);
    for (idx, (original, column)) in mapping.iter().enumerate() {
        let flag = if present.contains(column) { "yes" } else { "no" };
        listing.push_row([(idx + 1).to_string(), original.to_string(), column.to_string(), flag.to_string()]);
    }
    listing.print();
    info!("Listed {} mapping(s) from '{}'", mapping.len(), store.table());
    Ok(())
}
