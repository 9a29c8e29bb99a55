//! The `ingest` command: read an input file and hand its records to the
//! structured or spatial writer.

use std::fs;

use anyhow::{Context, Result, anyhow};
use log::{info, warn};

use crate::{
    cli::IngestArgs,
    config::WriterSettings,
    geojson::GeoJsonDbWriter,
    io_utils::{self, InputFormat},
    open_target,
    writer::{StructuredDbWriter, WriteSummary},
};

pub fn execute(args: &IngestArgs) -> Result<()> {
    let (db, config) = open_target(&args.target)?;
    let settings = merge_settings(config.writer, args);
    let table = settings
        .table
        .clone()
        .ok_or_else(|| anyhow!("No table given; pass --table or set writer.table in the config"))?;
    let format = args
        .format
        .or_else(|| InputFormat::detect(&args.input))
        .ok_or_else(|| anyhow!("Cannot tell the format of {:?}; pass --format", args.input))?;
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;

    info!(
        "Ingesting {:?} as {format:?} into '{table}'",
        args.input
    );
    let summary = match format {
        InputFormat::Geojson => {
            let collection = io_utils::read_json_value(&args.input, encoding)?;
            GeoJsonDbWriter::new(db, &table, settings.suffix.as_deref())
                .handle_collection(collection)
                .with_context(|| format!("Writing features into '{table}'"))?
        }
        InputFormat::Csv | InputFormat::Json => {
            let records = if format == InputFormat::Csv {
                let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
                io_utils::read_csv_records(&args.input, delimiter, encoding, Some(args.id_column.as_str()))?
            } else {
                io_utils::read_json_records(&args.input, encoding)?
            };
            info!("Read {} record(s) from {:?}", records.len(), args.input);
            StructuredDbWriter::new(db, &table, settings.to_options())
                .handle_output(records)
                .with_context(|| format!("Writing records into '{table}'"))?
        }
    };

    println!("{}", summary_line(&summary));
    if args.delete_input {
        remove_input(args, &summary)?;
    }
    Ok(())
}

/// Command-line flags override the config file's `writer` section.
fn merge_settings(mut settings: WriterSettings, args: &IngestArgs) -> WriterSettings {
    if args.table.is_some() {
        settings.table = args.table.clone();
    }
    if args.suffix.is_some() {
        settings.suffix = args.suffix.clone();
    }
    if args.mapping_table {
        settings.use_mapping_table = true;
    }
    if args.reverse_separator.is_some() {
        settings.reverse_separator = args.reverse_separator.clone();
    }
    if !args.replacements.is_empty() {
        settings.replacements = Some(args.replacements.clone());
    }
    if args.maxlen.is_some() {
        settings.maxlen = args.maxlen;
    }
    settings
}

fn summary_line(summary: &WriteSummary) -> String {
    format!(
        "inserted={} updated={} unchanged={} failed={} new_columns={}",
        summary.inserted,
        summary.updated,
        summary.unchanged,
        summary.failed,
        summary.new_columns.len()
    )
}

fn remove_input(args: &IngestArgs, summary: &WriteSummary) -> Result<()> {
    if io_utils::is_dash(&args.input) {
        return Ok(());
    }
    if summary.failed > 0 {
        warn!(
            "Keeping {:?}: {} record(s) failed",
            args.input, summary.failed
        );
        return Ok(());
    }
    fs::remove_file(&args.input).with_context(|| format!("Deleting input file {:?}", args.input))?;
    info!("Deleted input file {:?}", args.input);
    Ok(())
}
