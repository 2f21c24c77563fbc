//! Manually logged training metadata (the ledger export).
//!
//! The ledger is a semicolon-separated file with a header row. Each row is
//! keyed by its locale start time, built from separate date (`YYYY-MM-DD`)
//! and time (`HH:MM:SS`) columns into an [`EntryKey`].

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::EntryKey;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to open ledger {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read ledger: {0}")]
    Csv(#[from] csv::Error),
    #[error("ledger has no {0:?} column")]
    MissingColumn(String),
    #[error("invalid {column} {value:?} on ledger line {line}")]
    InvalidValue {
        column: &'static str,
        value: String,
        line: u64,
    },
}

/// Header names of the ledger columns in use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerColumns {
    pub date: String,
    pub time: String,
    pub comment: String,
    pub training_type: String,
    pub sport_category: String,
    pub equipment: String,
}

impl Default for LedgerColumns {
    fn default() -> Self {
        Self {
            date: "Datum".to_string(),
            time: "Startzeit".to_string(),
            comment: "Kommentar".to_string(),
            training_type: "Trainingsart".to_string(),
            sport_category: "Sportart".to_string(),
            equipment: "Material".to_string(),
        }
    }
}

/// One ledger record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRow {
    pub key: EntryKey,
    pub comment: String,
    pub training_type: String,
    pub sport_category: String,
    /// Raw comma-separated equipment names.
    pub equipment: String,
}

/// Ledger rows indexed by key.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    rows: HashMap<EntryKey, LedgerRow>,
}

struct ColumnIndex {
    date: usize,
    time: usize,
    comment: usize,
    training_type: usize,
    sport_category: usize,
    equipment: usize,
}

impl ColumnIndex {
    fn from_headers(headers: &csv::StringRecord, columns: &LedgerColumns) -> Result<Self, LedgerError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| LedgerError::MissingColumn(name.to_string()))
        };
        Ok(Self {
            date: find(&columns.date)?,
            time: find(&columns.time)?,
            comment: find(&columns.comment)?,
            training_type: find(&columns.training_type)?,
            sport_category: find(&columns.sport_category)?,
            equipment: find(&columns.equipment)?,
        })
    }
}

impl Ledger {
    /// Reads a ledger file.
    pub fn open(path: &Path, columns: &LedgerColumns) -> Result<Self, LedgerError> {
        let file = File::open(path).map_err(|source| LedgerError::Open {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_reader(file, columns)
    }

    /// Reads a ledger from any source.
    ///
    /// When two rows share a key, the later one wins.
    pub fn from_reader<R: Read>(reader: R, columns: &LedgerColumns) -> Result<Self, LedgerError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b';')
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let index = ColumnIndex::from_headers(reader.headers()?, columns)?;
        let mut rows = HashMap::new();

        for record in reader.records() {
            let record = record?;
            let line = record.position().map_or(0, csv::Position::line);
            let cell = |i: usize| record.get(i).unwrap_or_default().trim().to_string();

            let date = cell(index.date);
            let time = cell(index.time);
            let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|_| {
                LedgerError::InvalidValue {
                    column: "date",
                    value: date.clone(),
                    line,
                }
            })?;
            let time = NaiveTime::parse_from_str(&time, "%H:%M:%S").map_err(|_| {
                LedgerError::InvalidValue {
                    column: "time",
                    value: time.clone(),
                    line,
                }
            })?;

            let row = LedgerRow {
                key: EntryKey::from_datetime(&date.and_time(time)),
                comment: cell(index.comment),
                training_type: cell(index.training_type),
                sport_category: cell(index.sport_category),
                equipment: cell(index.equipment),
            };
            if let Some(previous) = rows.insert(row.key.clone(), row) {
                tracing::debug!(key = %previous.key, line, "duplicate ledger key, keeping later row");
            }
        }

        tracing::debug!(rows = rows.len(), "read ledger");
        Ok(Self { rows })
    }

    pub fn get(&self, key: &EntryKey) -> Option<&LedgerRow> {
        self.rows.get(key)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl FromIterator<LedgerRow> for Ledger {
    fn from_iter<I: IntoIterator<Item = LedgerRow>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().map(|row| (row.key.clone(), row)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Datum;Startzeit;Sportart;Trainingsart;Material;Kommentar\n";

    fn key(s: &str) -> EntryKey {
        EntryKey::new(s).unwrap()
    }

    #[test]
    fn reads_rows_keyed_by_date_and_time() {
        let csv = format!(
            "{HEADER}2021-05-01;08:00:00;Mountainbike;Grundlage;Focus MTB, Garmin Edge;Trails\n\
             2021-05-02;17:30:05;Laufsport;Intervall;;\n"
        );
        let ledger = Ledger::from_reader(csv.as_bytes(), &LedgerColumns::default()).unwrap();

        assert_eq!(ledger.len(), 2);
        let row = ledger.get(&key("20210501-080000")).unwrap();
        assert_eq!(row.sport_category, "Mountainbike");
        assert_eq!(row.equipment, "Focus MTB, Garmin Edge");
        assert_eq!(row.comment, "Trails");
        assert_eq!(ledger.get(&key("20210502-173005")).unwrap().equipment, "");
    }

    #[test]
    fn later_duplicate_wins() {
        let csv = format!("{HEADER}2021-05-01;08:00:00;A;x;;first\n2021-05-01;08:00:00;B;y;;second\n");
        let ledger = Ledger::from_reader(csv.as_bytes(), &LedgerColumns::default()).unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get(&key("20210501-080000")).unwrap().comment, "second");
    }

    #[test]
    fn missing_column_is_reported() {
        let csv = "Datum;Startzeit\n2021-05-01;08:00:00\n";
        let err = Ledger::from_reader(csv.as_bytes(), &LedgerColumns::default()).unwrap_err();
        assert!(matches!(err, LedgerError::MissingColumn(ref c) if c == "Kommentar"));
    }

    #[test]
    fn invalid_time_names_the_line() {
        let csv = format!("{HEADER}2021-05-01;8 Uhr;A;x;;\n");
        let err = Ledger::from_reader(csv.as_bytes(), &LedgerColumns::default()).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InvalidValue {
                column: "time",
                line: 2,
                ..
            }
        ));
    }

    #[test]
    fn custom_column_names() {
        let columns = LedgerColumns {
            date: "date".to_string(),
            time: "start".to_string(),
            comment: "note".to_string(),
            training_type: "type".to_string(),
            sport_category: "sport".to_string(),
            equipment: "gear".to_string(),
        };
        let csv = "date;start;note;type;sport;gear\n2022-01-02;03:04:05;n;t;s;g\n";
        let ledger = Ledger::from_reader(csv.as_bytes(), &columns).unwrap();
        assert_eq!(ledger.get(&key("20220102-030405")).unwrap().equipment, "g");
    }

    #[test]
    fn open_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Ledger::open(&dir.path().join("none.csv"), &LedgerColumns::default()).unwrap_err();
        assert!(matches!(err, LedgerError::Open { .. }));
    }
}
