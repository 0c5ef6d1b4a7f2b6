//! CSV output backend.
//!
//! Creates two files in the configured output directory:
//! - `events.csv`
//! - `step_summaries.csv`
//!
//! Empty fields are `None`.  Quoting of fields containing commas or quotes is
//! left to the csv writer.

use std::fs::File;
use std::path::Path;
use std::str::FromStr;

use csv::{StringRecord, Writer};

use crate::row::EVENT_COLUMNS;
use crate::writer::OutputWriter;
use crate::{EventRow, OutputError, OutputResult, StepSummaryRow};

/// Writes simulation output to two CSV files.
pub struct CsvWriter {
    events:    Writer<File>,
    summaries: Writer<File>,
    finished:  bool,
}

impl CsvWriter {
    /// Open (or create) the two CSV files in `dir` and write the header rows.
    pub fn new(dir: &Path) -> OutputResult<Self> {
        let mut events = Writer::from_path(dir.join("events.csv"))?;
        events.write_record(EVENT_COLUMNS)?;

        let mut summaries = Writer::from_path(dir.join("step_summaries.csv"))?;
        summaries.write_record([
            "time",
            "events",
            "departures",
            "arrivals",
            "vehicles_on_network",
            "agents_at_activity",
        ])?;

        Ok(Self {
            events,
            summaries,
            finished: false,
        })
    }
}

fn opt<T: ToString>(v: &Option<T>) -> String {
    v.as_ref().map(ToString::to_string).unwrap_or_default()
}

impl OutputWriter for CsvWriter {
    fn write_events(&mut self, rows: &[EventRow]) -> OutputResult<()> {
        for row in rows {
            self.events.write_record(&[
                row.time.to_string(),
                row.event_type.clone(),
                opt(&row.person),
                opt(&row.vehicle),
                opt(&row.link),
                opt(&row.mode),
                opt(&row.act_type),
                opt(&row.stop),
                opt(&row.line),
                opt(&row.transit_route),
                opt(&row.departure),
                opt(&row.delay),
            ])?;
        }
        Ok(())
    }

    fn write_step_summary(&mut self, row: &StepSummaryRow) -> OutputResult<()> {
        self.summaries.write_record(&[
            row.time.to_string(),
            row.events.to_string(),
            row.departures.to_string(),
            row.arrivals.to_string(),
            row.vehicles_on_network.to_string(),
            row.agents_at_activity.to_string(),
        ])?;
        Ok(())
    }

    fn finish(&mut self) -> OutputResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.events.flush()?;
        self.summaries.flush()?;
        Ok(())
    }
}

// ── Reading back ──────────────────────────────────────────────────────────────

/// Read an `events.csv` written by [`CsvWriter`].
pub fn read_events_csv(path: &Path) -> OutputResult<Vec<EventRow>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(parse_event(&record?)?);
    }
    Ok(rows)
}

fn parse_event(r: &StringRecord) -> OutputResult<EventRow> {
    let line = r.position().map_or(0, |p| p.line());
    let field = |i: usize| r.get(i).unwrap_or("");
    let text = |i: usize| Some(field(i)).filter(|s| !s.is_empty()).map(str::to_owned);
    let num = |i: usize| parse_opt::<u32>(field(i), EVENT_COLUMNS[i], line);

    let time = parse_opt::<u32>(field(0), "time", line)?.ok_or_else(|| OutputError::Parse {
        line,
        column: "time",
        value: String::new(),
    })?;
    Ok(EventRow {
        time,
        event_type:    field(1).to_owned(),
        person:        num(2)?,
        vehicle:       num(3)?,
        link:          num(4)?,
        mode:          text(5),
        act_type:      text(6),
        stop:          num(7)?,
        line:          num(8)?,
        transit_route: num(9)?,
        departure:     num(10)?,
        delay:         parse_opt::<f64>(field(11), "delay", line)?,
    })
}

fn parse_opt<T: FromStr>(s: &str, column: &'static str, line: u64) -> OutputResult<Option<T>> {
    if s.is_empty() {
        return Ok(None);
    }
    s.parse()
        .map(Some)
        .map_err(|_| OutputError::Parse { line, column, value: s.to_owned() })
}
