//! SQLite output backend (feature `sqlite`).
//!
//! Creates a single `output.db` file in the configured output directory with
//! two tables: `events` and `step_summaries`.  Absent event columns are NULL.

use std::path::Path;

use rusqlite::Connection;

use crate::writer::OutputWriter;
use crate::{EventRow, OutputResult, StepSummaryRow};

/// Writes simulation output to an SQLite database.
pub struct SqliteWriter {
    conn:     Connection,
    finished: bool,
}

impl SqliteWriter {
    /// Open (or create) `output.db` in `dir` and initialise the schema.
    pub fn new(dir: &Path) -> OutputResult<Self> {
        let conn = Connection::open(dir.join("output.db"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous  = NORMAL;
             CREATE TABLE IF NOT EXISTS events (
                 seq           INTEGER PRIMARY KEY,
                 time          INTEGER NOT NULL,
                 type          TEXT    NOT NULL,
                 person        INTEGER,
                 vehicle       INTEGER,
                 link          INTEGER,
                 mode          TEXT,
                 act_type      TEXT,
                 stop          INTEGER,
                 line          INTEGER,
                 transit_route INTEGER,
                 departure     INTEGER,
                 delay         REAL
             );
             CREATE TABLE IF NOT EXISTS step_summaries (
                 time                INTEGER PRIMARY KEY,
                 events              INTEGER NOT NULL,
                 departures          INTEGER NOT NULL,
                 arrivals            INTEGER NOT NULL,
                 vehicles_on_network INTEGER NOT NULL,
                 agents_at_activity  INTEGER NOT NULL
             );",
        )?;

        Ok(Self { conn, finished: false })
    }
}

impl OutputWriter for SqliteWriter {
    fn write_events(&mut self, rows: &[EventRow]) -> OutputResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO events \
                 (time, type, person, vehicle, link, mode, act_type, stop, line, transit_route, departure, delay) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            )?;
            for row in rows {
                stmt.execute(rusqlite::params![
                    row.time,
                    row.event_type,
                    row.person,
                    row.vehicle,
                    row.link,
                    row.mode,
                    row.act_type,
                    row.stop,
                    row.line,
                    row.transit_route,
                    row.departure,
                    row.delay,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn write_step_summary(&mut self, row: &StepSummaryRow) -> OutputResult<()> {
        self.conn.execute(
            "INSERT INTO step_summaries \
             (time, events, departures, arrivals, vehicles_on_network, agents_at_activity) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                row.time,
                row.events,
                row.departures,
                row.arrivals,
                row.vehicles_on_network,
                row.agents_at_activity,
            ],
        )?;
        Ok(())
    }

    fn finish(&mut self) -> OutputResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }
}
