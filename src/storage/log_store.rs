// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Log storage using SQLite.

use anyhow::Result;
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::error::ErrorCategory;
use crate::state::{LogEntry, Severity};

/// Timestamp format of the `data` column.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Append-only log sink.
pub trait LogSink: Send + Sync {
    fn append(&self, entry: &LogEntry) -> Result<()>;

    fn clear(&self) -> Result<()>;
}

/// A persisted log row.
#[derive(Debug, Clone)]
pub struct StoredLogEntry {
    pub id: i64,
    pub timestamp: String,
    pub message: String,
    pub severity: Severity,
    pub category: Option<ErrorCategory>,
}

/// Log database manager.
#[derive(Clone)]
pub struct LogStore {
    conn: Arc<Mutex<Connection>>,
}

impl LogStore {
    /// Create or open the log database.
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join("voltwatcher.db");
        info!("Opening log database: {:?}", db_path);

        let conn = Connection::open(&db_path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                data TEXT NOT NULL,
                message TEXT NOT NULL,
                type TEXT,
                category TEXT
            )",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Most recent rows, newest first.
    pub fn recent(&self, limit: u32) -> Result<Vec<StoredLogEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, data, message, type, category
             FROM log
             ORDER BY id DESC
             LIMIT ?1",
        )?;

        let entries = stmt
            .query_map([limit], |row| {
                let severity: Option<String> = row.get(3)?;
                let category: Option<String> = row.get(4)?;
                Ok(StoredLogEntry {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    message: row.get(2)?,
                    severity: Severity::from_tag(severity.as_deref().unwrap_or("I")),
                    category: category.as_deref().and_then(ErrorCategory::from_tag),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// Get total row count.
    pub fn count(&self) -> Result<u32> {
        let conn = self.conn.lock();
        let count: u32 = conn.query_row("SELECT COUNT(*) FROM log", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn format_timestamp(timestamp: &DateTime<Local>) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

impl LogSink for LogStore {
    fn append(&self, entry: &LogEntry) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO log (data, message, type, category) VALUES (?1, ?2, ?3, ?4)",
            params![
                format_timestamp(&entry.timestamp),
                entry.message,
                entry.severity.as_str(),
                entry.category.map(|c| c.as_str())
            ],
        )?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM log", [])?;
        info!("Log cleared");
        Ok(())
    }
}
