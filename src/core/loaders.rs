//! Data loaders for electrode movement logs and block tables.
//!
//! This module provides strict parsers for:
//! - Electrode movement CSV files (one file per subject and hemisphere)
//! - Block tables (one row per recording session)
//! - Block tables previously extended with per-channel depth columns
//!
//! Any unparseable value aborts the load with the file, data row and column
//! identified.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File};
use std::hash::{Hash, Hasher};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDateTime;
use csv::{ReaderBuilder, StringRecord};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::transforms::{self, date_from_ymd, parse_timestamp};
use crate::config::{NamingRules, TableConfig};

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("failed to open '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("no CSV files found in {0}")]
    EmptyDirectory(PathBuf),

    #[error("no block tables given")]
    NoBlockTables,

    #[error("file name '{0}' does not match the subject/hemisphere pattern")]
    FileName(String),

    #[error("{path}: missing required columns: {columns}")]
    MissingColumns { path: PathBuf, columns: String },

    #[error("{path}: row {row}: invalid {column} value '{value}'")]
    Malformed {
        path: PathBuf,
        row: usize,
        column: String,
        value: String,
    },

    #[error("{path}: columns [{found}] do not match [{expected}]")]
    SchemaMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Side of the brain an electrode array is implanted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Hemisphere {
    Left,
    Right,
}

impl Hemisphere {
    pub const ALL: [Hemisphere; 2] = [Hemisphere::Left, Hemisphere::Right];

    #[inline]
    pub fn letter(self) -> char {
        match self {
            Hemisphere::Left => 'L',
            Hemisphere::Right => 'R',
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Hemisphere::Left => "Left",
            Hemisphere::Right => "Right",
        }
    }

    /// Accepts `L`, `R`, `Left` or `Right`, ignoring case.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "l" | "left" => Some(Hemisphere::Left),
            "r" | "right" => Some(Hemisphere::Right),
            _ => None,
        }
    }
}

impl fmt::Display for Hemisphere {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Experimental subject, identified by the numeric part of its name.
///
/// Equality, ordering and hashing use only `key`; `label` is the short name
/// used in output file names (e.g. `F1808`).
#[derive(Debug, Clone)]
pub struct Subject {
    pub key: u32,
    pub label: String,
}

impl Subject {
    pub fn new(key: u32, label: impl Into<String>) -> Self {
        Self {
            key,
            label: label.into(),
        }
    }

    /// Extract a subject from `text` using a pattern with `subject` and `num` groups.
    pub fn parse(text: &str, pattern: &Regex) -> Option<Self> {
        let caps = pattern.captures(text.trim())?;
        let label = caps.name("subject")?.as_str();
        let key = caps.name("num")?.as_str().parse().ok()?;
        Some(Self::new(key, label))
    }
}

impl PartialEq for Subject {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Subject {}

impl Hash for Subject {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for Subject {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Subject {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// One logged electrode movement.
#[derive(Debug, Clone, PartialEq)]
pub struct MovementRecord {
    pub subject: Subject,
    pub hemisphere: Hemisphere,
    pub channel: usize,
    /// Date of the movement at midnight.
    pub timestamp: NaiveDateTime,
    pub position: f64,
    pub zero: f64,
    /// Remaining source columns in file order.
    pub extra: Vec<(String, String)>,
}

impl MovementRecord {
    #[inline]
    pub fn depth(&self) -> f64 {
        transforms::depth(self.position, self.zero)
    }
}

/// Column layout of a (possibly extended) block table after dropping columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    pub headers: Vec<String>,
    pub subject_index: usize,
    pub block_index: usize,
    pub datetime_index: usize,
}

/// One row of the block table.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub subject: Subject,
    pub block: String,
    pub timestamp: NaiveDateTime,
    /// Raw cell values aligned with [`TableLayout::headers`].
    pub values: Vec<String>,
}

/// Block table loaded into memory.
#[derive(Debug, Clone)]
pub struct SessionTable {
    pub layout: TableLayout,
    pub sessions: Vec<SessionRecord>,
}

/// A session annotated with the depth of every channel at its timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossReferencedSession {
    pub session: SessionRecord,
    pub left: Vec<Option<f64>>,
    pub right: Vec<Option<f64>>,
}

impl CrossReferencedSession {
    pub fn depths(&self, hemisphere: Hemisphere) -> &[Option<f64>] {
        match hemisphere {
            Hemisphere::Left => &self.left,
            Hemisphere::Right => &self.right,
        }
    }

    /// Depth of one channel; `None` when unset or out of range.
    pub fn depth(&self, hemisphere: Hemisphere, channel: usize) -> Option<f64> {
        self.depths(hemisphere).get(channel).copied().flatten()
    }
}

/// Block table with depth columns for `num_channels` channels per hemisphere.
#[derive(Debug, Clone)]
pub struct ExtendedTable {
    pub layout: TableLayout,
    pub num_channels: usize,
    pub sessions: Vec<CrossReferencedSession>,
}

/// Parse subject and hemisphere from a movement file name such as `F1808_Right.csv`.
pub fn parse_position_file_name(name: &str, rules: &NamingRules) -> Result<(Subject, Hemisphere)> {
    let bad_name = || LoaderError::FileName(name.to_string());

    let caps = rules.position_file.captures(name).ok_or_else(bad_name)?;
    let label = caps.name("subject").ok_or_else(bad_name)?.as_str();
    let key: u32 = caps
        .name("num")
        .ok_or_else(bad_name)?
        .as_str()
        .parse()
        .map_err(|_| bad_name())?;
    let hemisphere = caps
        .name("hemisphere")
        .and_then(|m| Hemisphere::parse(m.as_str()))
        .ok_or_else(bad_name)?;

    Ok((Subject::new(key, label), hemisphere))
}

fn open_csv(path: &Path) -> Result<csv::Reader<BufReader<File>>> {
    let file = File::open(path).map_err(|source| LoaderError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(BufReader::new(file)))
}

/// Parse one cell, failing with the file/row/column on bad input.
fn parse_field<T: FromStr>(
    record: &StringRecord,
    index: usize,
    column: &str,
    path: &Path,
    row: usize,
) -> Result<T> {
    let value = record.get(index).unwrap_or("");
    value.parse().map_err(|_| LoaderError::Malformed {
        path: path.to_path_buf(),
        row,
        column: column.to_string(),
        value: value.to_string(),
    })
}

/// Like [`parse_field`] but also rejects `NaN` and infinities.
fn parse_finite(record: &StringRecord, index: usize, column: &str, path: &Path, row: usize) -> Result<f64> {
    let value: f64 = parse_field(record, index, column, path, row)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(LoaderError::Malformed {
            path: path.to_path_buf(),
            row,
            column: column.to_string(),
            value: record.get(index).unwrap_or("").to_string(),
        })
    }
}

fn missing_columns(path: &Path, names: &[&str]) -> LoaderError {
    LoaderError::MissingColumns {
        path: path.to_path_buf(),
        columns: names.join(", "),
    }
}

/// Required columns of a movement log, matched case-insensitively.
const MOVEMENT_COLUMNS: [&str; 6] = ["Channel", "Year", "Month", "Day", "Position", "Zero"];

/// Load one electrode movement CSV.
///
/// Subject and hemisphere come from the file name. A `Depth` column, if
/// present, is ignored because depth is always recomputed from
/// `Position - Zero`.
///
/// # Errors
///
/// Returns an error if the file name does not match the naming rules, a
/// required column is missing, or any value (including the calendar date and
/// a channel outside `0..num_channels`) cannot be parsed.
pub fn load_movement_csv<P: AsRef<Path>>(
    path: P,
    rules: &NamingRules,
    num_channels: usize,
) -> Result<Vec<MovementRecord>> {
    let path = path.as_ref();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let (subject, hemisphere) = parse_position_file_name(&file_name, rules)?;

    let mut reader = open_csv(path)?;
    let headers = reader.headers()?.clone();
    let col_map: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, name)| (name.to_lowercase(), i))
        .collect();

    let missing: Vec<&str> = MOVEMENT_COLUMNS
        .iter()
        .copied()
        .filter(|name| !col_map.contains_key(&name.to_lowercase()))
        .collect();
    if !missing.is_empty() {
        return Err(missing_columns(path, &missing));
    }
    let idx = |name: &str| col_map[&name.to_lowercase()];
    let (channel_idx, year_idx, month_idx, day_idx, position_idx, zero_idx) = (
        idx("Channel"),
        idx("Year"),
        idx("Month"),
        idx("Day"),
        idx("Position"),
        idx("Zero"),
    );

    let extra_columns: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(_, name)| {
            let lower = name.to_lowercase();
            lower != "depth" && !MOVEMENT_COLUMNS.iter().any(|c| c.to_lowercase() == lower)
        })
        .map(|(i, name)| (i, name.to_string()))
        .collect();

    let mut records = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = result?;
        let row = i + 1;

        let channel: usize = parse_field(&record, channel_idx, "Channel", path, row)?;
        if channel >= num_channels {
            return Err(LoaderError::Malformed {
                path: path.to_path_buf(),
                row,
                column: "Channel".to_string(),
                value: channel.to_string(),
            });
        }

        let year: i32 = parse_field(&record, year_idx, "Year", path, row)?;
        let month: u32 = parse_field(&record, month_idx, "Month", path, row)?;
        let day: u32 = parse_field(&record, day_idx, "Day", path, row)?;
        let timestamp = date_from_ymd(year, month, day).ok_or_else(|| LoaderError::Malformed {
            path: path.to_path_buf(),
            row,
            column: "Year/Month/Day".to_string(),
            value: format!("{}-{}-{}", year, month, day),
        })?;

        let position = parse_finite(&record, position_idx, "Position", path, row)?;
        let zero = parse_finite(&record, zero_idx, "Zero", path, row)?;

        let extra = extra_columns
            .iter()
            .map(|(i, name)| (name.clone(), record.get(*i).unwrap_or("").to_string()))
            .collect();

        records.push(MovementRecord {
            subject: subject.clone(),
            hemisphere,
            channel,
            timestamp,
            position,
            zero,
            extra,
        });
    }

    log::debug!("{}: {} movement records", path.display(), records.len());
    Ok(records)
}

/// List `*.csv` files in a directory, sorted by name.
pub fn list_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|source| LoaderError::Open {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut csv_files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("csv"))
                    .unwrap_or(false)
        })
        .collect();

    csv_files.sort();
    Ok(csv_files)
}

/// Load and concatenate every movement CSV in `dir`.
pub fn load_movement_dir<P: AsRef<Path>>(
    dir: P,
    rules: &NamingRules,
    num_channels: usize,
) -> Result<Vec<MovementRecord>> {
    let dir = dir.as_ref();
    let files = list_csv_files(dir)?;
    if files.is_empty() {
        return Err(LoaderError::EmptyDirectory(dir.to_path_buf()));
    }

    let mut records = Vec::new();
    for path in &files {
        records.extend(load_movement_csv(path, rules, num_channels)?);
    }

    log::info!(
        "Loaded {} movement records from {} files in {}",
        records.len(),
        files.len(),
        dir.display()
    );
    Ok(records)
}

fn parse_session(
    record: &StringRecord,
    kept: &[usize],
    layout: &TableLayout,
    rules: &NamingRules,
    path: &Path,
    row: usize,
) -> Result<SessionRecord> {
    let values: Vec<String> = kept
        .iter()
        .map(|&i| record.get(i).unwrap_or("").to_string())
        .collect();

    let malformed = |index: usize| LoaderError::Malformed {
        path: path.to_path_buf(),
        row,
        column: layout.headers[index].clone(),
        value: values[index].clone(),
    };

    let subject = Subject::parse(&values[layout.subject_index], &rules.subject)
        .ok_or_else(|| malformed(layout.subject_index))?;
    let timestamp =
        parse_timestamp(&values[layout.datetime_index]).ok_or_else(|| malformed(layout.datetime_index))?;
    let block = values[layout.block_index].clone();

    Ok(SessionRecord {
        subject,
        block,
        timestamp,
        values,
    })
}

fn column_index(headers: &[String], name: &str) -> Option<usize> {
    headers.iter().position(|h| h == name)
}

fn locate_key_columns(path: &Path, headers: &[String], table: &TableConfig) -> Result<TableLayout> {
    let required = [
        table.subject_column.as_str(),
        table.block_column.as_str(),
        table.datetime_column.as_str(),
    ];
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|c| column_index(headers, c).is_none())
        .collect();

    match (
        column_index(headers, required[0]),
        column_index(headers, required[1]),
        column_index(headers, required[2]),
    ) {
        (Some(subject_index), Some(block_index), Some(datetime_index)) => Ok(TableLayout {
            headers: headers.to_vec(),
            subject_index,
            block_index,
            datetime_index,
        }),
        _ => Err(missing_columns(path, &missing)),
    }
}

/// Load a block table, dropping the configured columns.
///
/// Drop columns absent from the file are ignored.
pub fn load_block_table<P: AsRef<Path>>(
    path: P,
    table: &TableConfig,
    rules: &NamingRules,
) -> Result<SessionTable> {
    let path = path.as_ref();
    let mut reader = open_csv(path)?;
    let all_headers = reader.headers()?.clone();

    for drop in &table.drop_columns {
        if !all_headers.iter().any(|h| h == drop) {
            log::debug!("{}: column '{}' not present, nothing to drop", path.display(), drop);
        }
    }

    let kept: Vec<usize> = all_headers
        .iter()
        .enumerate()
        .filter(|(_, name)| !table.drop_columns.iter().any(|d| d == name))
        .map(|(i, _)| i)
        .collect();
    let headers: Vec<String> = kept.iter().map(|&i| all_headers[i].to_string()).collect();
    let layout = locate_key_columns(path, &headers, table)?;

    let mut sessions = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = result?;
        sessions.push(parse_session(&record, &kept, &layout, rules, path, i + 1)?);
    }

    log::info!("Loaded {} blocks from {}", sessions.len(), path.display());
    Ok(SessionTable { layout, sessions })
}

/// Load several block tables with identical columns and concatenate them.
pub fn load_block_tables<P: AsRef<Path>>(
    paths: &[P],
    table: &TableConfig,
    rules: &NamingRules,
) -> Result<SessionTable> {
    let mut tables = paths.iter().map(|p| (p.as_ref(), load_block_table(p, table, rules)));

    let (_, first) = tables.next().ok_or(LoaderError::NoBlockTables)?;
    let mut combined = first?;

    for (path, next) in tables {
        let next = next?;
        if next.layout != combined.layout {
            return Err(LoaderError::SchemaMismatch {
                path: path.to_path_buf(),
                expected: combined.layout.headers.join(", "),
                found: next.layout.headers.join(", "),
            });
        }
        combined.sessions.extend(next.sessions);
    }

    Ok(combined)
}

/// Load a block table written by [`crate::core::writers::write_extended_table`].
///
/// Every stored depth is read back as set, zero included. Unset channels are
/// written as zero, so use [`crate::processors::crossref::clear_unset_depths`]
/// to tell them apart from real zero depths.
pub fn load_extended_table<P: AsRef<Path>>(
    path: P,
    table: &TableConfig,
    rules: &NamingRules,
    num_channels: usize,
) -> Result<ExtendedTable> {
    let path = path.as_ref();
    let mut reader = open_csv(path)?;
    let all_headers = reader.headers()?.clone();

    let mut depth_cols: HashMap<(usize, usize), usize> = HashMap::new();
    let mut missing = Vec::new();
    for (h, hemisphere) in Hemisphere::ALL.iter().enumerate() {
        for channel in 0..num_channels {
            let name = transforms::depth_column_name(*hemisphere, channel);
            match all_headers.iter().position(|c| c == name) {
                Some(i) => {
                    depth_cols.insert((h, channel), i);
                }
                None => missing.push(name),
            }
        }
    }
    if !missing.is_empty() {
        let names: Vec<&str> = missing.iter().map(String::as_str).collect();
        return Err(missing_columns(path, &names));
    }

    let depth_indices: Vec<usize> = depth_cols.values().copied().collect();
    let kept: Vec<usize> = (0..all_headers.len())
        .filter(|i| !depth_indices.contains(i))
        .collect();
    let headers: Vec<String> = kept.iter().map(|&i| all_headers[i].to_string()).collect();
    let layout = locate_key_columns(path, &headers, table)?;

    let mut sessions = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = result?;
        let row = i + 1;
        let session = parse_session(&record, &kept, &layout, rules, path, row)?;

        let mut hemispheres: [Vec<Option<f64>>; 2] = [
            Vec::with_capacity(num_channels),
            Vec::with_capacity(num_channels),
        ];
        for (h, hemisphere) in Hemisphere::ALL.iter().enumerate() {
            for channel in 0..num_channels {
                let column = transforms::depth_column_name(*hemisphere, channel);
                let value = parse_finite(&record, depth_cols[&(h, channel)], &column, path, row)?;
                hemispheres[h].push(Some(value));
            }
        }
        let [left, right] = hemispheres;

        sessions.push(CrossReferencedSession {
            session,
            left,
            right,
        });
    }

    log::info!("Loaded {} extended blocks from {}", sessions.len(), path.display());
    Ok(ExtendedTable {
        layout,
        num_channels,
        sessions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NamingConfig, NamingRules};
    use std::io::Write;
    use tempfile::tempdir;

    fn rules() -> NamingRules {
        NamingRules::compile(&NamingConfig::default()).unwrap()
    }

    fn write_file(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        path
    }

    #[test]
    fn test_parse_position_file_name() {
        let rules = rules();
        let (subject, hemisphere) = parse_position_file_name("F1808_Right.csv", &rules).unwrap();
        assert_eq!(subject.key, 1808);
        assert_eq!(subject.label, "F1808");
        assert_eq!(hemisphere, Hemisphere::Right);

        let (subject, hemisphere) = parse_position_file_name("F0180_L.csv", &rules).unwrap();
        assert_eq!(subject.key, 180);
        assert_eq!(hemisphere, Hemisphere::Left);
    }

    #[test]
    fn test_parse_position_file_name_rejects_garbage() {
        let rules = rules();
        for name in ["positions.csv", "F18_Left.csv", "F1808-Left.csv", "F1808_Top.csv"] {
            assert!(
                matches!(parse_position_file_name(name, &rules), Err(LoaderError::FileName(_))),
                "{} should be rejected",
                name
            );
        }
    }

    #[test]
    fn test_subject_identity_uses_numeric_key() {
        let rules = rules();
        let a = Subject::parse("F1808_Skittles", &rules.subject).unwrap();
        let b = Subject::new(1808, "F1808");
        assert_eq!(a, b);
        assert_eq!(a.label, "F1808");
        assert!(Subject::parse("Skittles", &rules.subject).is_none());
    }

    #[test]
    fn test_load_movement_csv() {
        let dir = tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "F1808_Left.csv",
            &[
                "Channel,Year,Month,Day,Position,Zero,Depth,Note",
                "5,2020,1,1,3.5,2.5,99,first",
                "5,2020,3,1,4.5,2.5,,second",
            ],
        );

        let records = load_movement_csv(&path, &rules(), 32).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].subject.key, 1808);
        assert_eq!(records[0].hemisphere, Hemisphere::Left);
        assert_eq!(records[0].channel, 5);
        assert_eq!(records[0].timestamp, date_from_ymd(2020, 1, 1).unwrap());
        assert!((records[0].depth() - 1.0).abs() < 1e-12);
        assert!((records[1].depth() - 2.0).abs() < 1e-12);
        assert_eq!(records[0].extra, vec![("Note".to_string(), "first".to_string())]);
    }

    #[test]
    fn test_load_movement_csv_reports_malformed_row() {
        let dir = tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "F1808_Left.csv",
            &[
                "Channel,Year,Month,Day,Position,Zero",
                "5,2020,1,1,3.5,2.5",
                "5,2020,1,2,abc,2.5",
            ],
        );

        match load_movement_csv(&path, &rules(), 32) {
            Err(LoaderError::Malformed { row, column, value, .. }) => {
                assert_eq!(row, 2);
                assert_eq!(column, "Position");
                assert_eq!(value, "abc");
            }
            other => panic!("expected Malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_load_movement_csv_rejects_bad_date_and_channel() {
        let dir = tempdir().unwrap();
        let bad_date = write_file(
            dir.path(),
            "F1808_Left.csv",
            &["Channel,Year,Month,Day,Position,Zero", "5,2020,2,30,3.5,2.5"],
        );
        assert!(matches!(
            load_movement_csv(&bad_date, &rules(), 32),
            Err(LoaderError::Malformed { .. })
        ));

        let bad_channel = write_file(
            dir.path(),
            "F1808_Right.csv",
            &["Channel,Year,Month,Day,Position,Zero", "32,2020,2,3,3.5,2.5"],
        );
        assert!(matches!(
            load_movement_csv(&bad_channel, &rules(), 32),
            Err(LoaderError::Malformed { .. })
        ));
    }

    #[test]
    fn test_load_movement_csv_missing_columns() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "F1808_Left.csv", &["Channel,Year,Position", "1,2020,3.0"]);

        match load_movement_csv(&path, &rules(), 32) {
            Err(LoaderError::MissingColumns { columns, .. }) => {
                assert_eq!(columns, "Month, Day, Zero");
            }
            other => panic!("expected MissingColumns, got {:?}", other),
        }
    }

    #[test]
    fn test_load_movement_dir() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "F1808_Left.csv", &["Channel,Year,Month,Day,Position,Zero", "1,2020,1,1,1,0"]);
        write_file(dir.path(), "F1808_Right.csv", &["Channel,Year,Month,Day,Position,Zero", "2,2020,1,1,1,0"]);
        write_file(dir.path(), "notes.txt", &["ignored"]);

        let records = load_movement_dir(dir.path(), &rules(), 32).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].hemisphere, Hemisphere::Left);
        assert_eq!(records[1].hemisphere, Hemisphere::Right);

        let empty = tempdir().unwrap();
        assert!(matches!(
            load_movement_dir(empty.path(), &rules(), 32),
            Err(LoaderError::EmptyDirectory(_))
        ));
    }

    #[test]
    fn test_load_block_table_drops_columns() {
        let dir = tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "blocks.csv",
            &[
                "Ferret,Block,DateNum,datetime,Duration",
                "F1808_Skittles,Block_J3-5,737000.4,2020-02-01 10:30:00,120",
            ],
        );

        let table = load_block_table(&path, &TableConfig::default(), &rules()).unwrap();
        assert_eq!(table.layout.headers, vec!["Ferret", "Block", "datetime"]);
        assert_eq!(table.layout.datetime_index, 2);
        assert_eq!(table.sessions.len(), 1);
        let session = &table.sessions[0];
        assert_eq!(session.subject.key, 1808);
        assert_eq!(session.block, "Block_J3-5");
        assert_eq!(
            session.timestamp,
            date_from_ymd(2020, 2, 1).unwrap().date().and_hms_opt(10, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_load_block_table_malformed_datetime() {
        let dir = tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "blocks.csv",
            &["Ferret,Block,datetime", "F1808_Skittles,Block_J3-5,yesterday"],
        );

        match load_block_table(&path, &TableConfig::default(), &rules()) {
            Err(LoaderError::Malformed { row, column, .. }) => {
                assert_eq!(row, 1);
                assert_eq!(column, "datetime");
            }
            other => panic!("expected Malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_load_block_tables_concatenates_and_checks_schema() {
        let dir = tempdir().unwrap();
        let a = write_file(dir.path(), "a.csv", &["Ferret,Block,datetime", "F1808_S,B1,2020-01-02 10:00:00"]);
        let b = write_file(dir.path(), "b.csv", &["Ferret,Block,datetime", "F1808_S,B2,2020-01-03 10:00:00"]);
        let c = write_file(dir.path(), "c.csv", &["Block,Ferret,datetime", "B3,F1808_S,2020-01-04 10:00:00"]);

        let table = load_block_tables(&[&a, &b], &TableConfig::default(), &rules()).unwrap();
        assert_eq!(table.sessions.len(), 2);

        assert!(matches!(
            load_block_tables(&[&a, &c], &TableConfig::default(), &rules()),
            Err(LoaderError::SchemaMismatch { .. })
        ));

        let none: [&Path; 0] = [];
        assert!(matches!(
            load_block_tables(&none, &TableConfig::default(), &rules()),
            Err(LoaderError::NoBlockTables)
        ));
    }

    #[test]
    fn test_load_extended_table() {
        let dir = tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "extended.csv",
            &[
                "Ferret,Block,datetime,L0,L1,R0,R1",
                "F1808_S,B1,2020-01-02 10:00:00,1.250,0.000,0.000,2.000",
            ],
        );

        let table = load_extended_table(&path, &TableConfig::default(), &rules(), 2).unwrap();
        assert_eq!(table.layout.headers, vec!["Ferret", "Block", "datetime"]);
        let session = &table.sessions[0];
        assert_eq!(session.depth(Hemisphere::Left, 0), Some(1.25));
        assert_eq!(session.depth(Hemisphere::Left, 1), Some(0.0));
        assert_eq!(session.depth(Hemisphere::Right, 1), Some(2.0));

        assert!(matches!(
            load_extended_table(&path, &TableConfig::default(), &rules(), 3),
            Err(LoaderError::MissingColumns { .. })
        ));
    }
}
