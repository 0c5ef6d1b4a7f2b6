//! Parquet output backend (feature `parquet`).
//!
//! Creates two files in the configured output directory:
//! - `events.parquet`
//! - `step_summaries.parquet`

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Builder, StringBuilder, UInt32Builder, UInt64Builder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::writer::OutputWriter;
use crate::{EventRow, OutputResult, StepSummaryRow};

fn event_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("time",          DataType::UInt32,  false),
        Field::new("type",          DataType::Utf8,    false),
        Field::new("person",        DataType::UInt32,  true),
        Field::new("vehicle",       DataType::UInt32,  true),
        Field::new("link",          DataType::UInt32,  true),
        Field::new("mode",          DataType::Utf8,    true),
        Field::new("act_type",      DataType::Utf8,    true),
        Field::new("stop",          DataType::UInt32,  true),
        Field::new("line",          DataType::UInt32,  true),
        Field::new("transit_route", DataType::UInt32,  true),
        Field::new("departure",     DataType::UInt32,  true),
        Field::new("delay",         DataType::Float64, true),
    ]))
}

fn summary_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("time",                DataType::UInt32, false),
        Field::new("events",              DataType::UInt64, false),
        Field::new("departures",          DataType::UInt64, false),
        Field::new("arrivals",            DataType::UInt64, false),
        Field::new("vehicles_on_network", DataType::UInt64, false),
        Field::new("agents_at_activity",  DataType::UInt64, false),
    ]))
}

fn snappy_props() -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build()
}

fn u32_column(rows: &[EventRow], f: impl Fn(&EventRow) -> Option<u32>) -> ArrayRef {
    let mut b = UInt32Builder::with_capacity(rows.len());
    for row in rows {
        b.append_option(f(row));
    }
    Arc::new(b.finish())
}

fn text_column<'a>(rows: &'a [EventRow], f: impl Fn(&'a EventRow) -> Option<&'a str>) -> ArrayRef {
    let mut b = StringBuilder::new();
    for row in rows {
        b.append_option(f(row));
    }
    Arc::new(b.finish())
}

/// Writes simulation output to two Parquet files.
///
/// `finish()` **must** be called to write the Parquet file footer; files
/// written without calling `finish()` cannot be opened by Parquet readers.
pub struct ParquetWriter {
    events:       Option<ArrowWriter<File>>,
    summaries:    Option<ArrowWriter<File>>,
    event_schema: Arc<Schema>,
    summ_schema:  Arc<Schema>,
}

impl ParquetWriter {
    /// Create both Parquet files in `dir`.
    pub fn new(dir: &Path) -> OutputResult<Self> {
        let event_schema = event_schema();
        let summ_schema = summary_schema();

        let event_file = File::create(dir.join("events.parquet"))?;
        let events = ArrowWriter::try_new(event_file, Arc::clone(&event_schema), Some(snappy_props()))?;

        let summ_file = File::create(dir.join("step_summaries.parquet"))?;
        let summaries = ArrowWriter::try_new(summ_file, Arc::clone(&summ_schema), Some(snappy_props()))?;

        Ok(Self {
            events: Some(events),
            summaries: Some(summaries),
            event_schema,
            summ_schema,
        })
    }
}

impl OutputWriter for ParquetWriter {
    fn write_events(&mut self, rows: &[EventRow]) -> OutputResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let Some(writer) = self.events.as_mut() else {
            return Ok(());
        };

        let mut delays = Float64Builder::with_capacity(rows.len());
        for row in rows {
            delays.append_option(row.delay);
        }

        let batch = RecordBatch::try_new(
            Arc::clone(&self.event_schema),
            vec![
                u32_column(rows, |r| Some(r.time)),
                text_column(rows, |r| Some(r.event_type.as_str())),
                u32_column(rows, |r| r.person),
                u32_column(rows, |r| r.vehicle),
                u32_column(rows, |r| r.link),
                text_column(rows, |r| r.mode.as_deref()),
                text_column(rows, |r| r.act_type.as_deref()),
                u32_column(rows, |r| r.stop),
                u32_column(rows, |r| r.line),
                u32_column(rows, |r| r.transit_route),
                u32_column(rows, |r| r.departure),
                Arc::new(delays.finish()),
            ],
        )?;
        writer.write(&batch)?;
        Ok(())
    }

    fn write_step_summary(&mut self, row: &StepSummaryRow) -> OutputResult<()> {
        let Some(writer) = self.summaries.as_mut() else {
            return Ok(());
        };

        let mut times = UInt32Builder::new();
        times.append_value(row.time);
        let column = |v: u64| -> ArrayRef {
            let mut b = UInt64Builder::new();
            b.append_value(v);
            Arc::new(b.finish())
        };

        let batch = RecordBatch::try_new(
            Arc::clone(&self.summ_schema),
            vec![
                Arc::new(times.finish()),
                column(row.events),
                column(row.departures),
                column(row.arrivals),
                column(row.vehicles_on_network),
                column(row.agents_at_activity),
            ],
        )?;
        writer.write(&batch)?;
        Ok(())
    }

    fn finish(&mut self) -> OutputResult<()> {
        if let Some(w) = self.events.take() {
            w.close()?;
        }
        if let Some(w) = self.summaries.take() {
            w.close()?;
        }
        Ok(())
    }
}
