//! Data writers for site descriptors and block tables.
//!
//! This module provides functions for writing:
//! - Per-site JSON descriptors (one file per depth interval)
//! - The block table extended with `L0..` / `R0..` depth columns
//! - Per-site CSV lists of the blocks recorded at that site

use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use super::loaders::{ExtendedTable, Hemisphere};
use super::transforms::{depth_column_name, format_timestamp, round_to};
use crate::processors::sites::{SiteDescriptor, SiteKey, SiteSession};

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// JSON serialization error.
    #[error("JSON write error for '{path}': {source}")]
    JsonError {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.as_os_str().is_empty() && !dir.exists() {
        fs::create_dir_all(dir).map_err(|e| WriteError::CreateDirectory {
            path: dir.display().to_string(),
            source: e,
        })?;
    }
    Ok(())
}

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) => ensure_dir(parent),
        None => Ok(()),
    }
}

/// Creates a buffered writer for the given path.
fn create_buffered_writer(path: &Path) -> Result<BufWriter<File>> {
    ensure_parent_dirs(path)?;
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(BufWriter::new(file))
}

/// Write one site descriptor as JSON indented by three spaces.
///
/// The file is named `{subject}_{hemisphere}{channel:02}_{depth:.3}mm.json`
/// inside `dir`.
///
/// # Example
///
/// ```no_run
/// use electrode_sites::core::writers::write_site_json;
/// use electrode_sites::processors::intervals::derive_intervals;
/// use electrode_sites::processors::sites::site_descriptors;
/// use std::path::Path;
///
/// let records = Vec::new();
/// for site in site_descriptors(&derive_intervals(&records), None) {
///     write_site_json(Path::new("json"), &site).unwrap();
/// }
/// ```
pub fn write_site_json(dir: &Path, site: &SiteDescriptor) -> Result<PathBuf> {
    let path = dir.join(site.file_name());
    let path_str = path.display().to_string();
    let mut writer = create_buffered_writer(&path)?;

    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"   ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut writer, formatter);
    site.serialize(&mut serializer)
        .map_err(|e| WriteError::JsonError {
            path: path_str.clone(),
            source: e,
        })?;

    writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(path)
}

/// Write every descriptor into `dir`, returning the distinct files written.
///
/// A channel that returns to an earlier depth produces a second descriptor
/// with the same file name; the later interval replaces the earlier file and
/// a warning is logged.
pub fn write_site_jsons(dir: &Path, sites: &[SiteDescriptor]) -> Result<Vec<PathBuf>> {
    ensure_dir(dir)?;
    let mut written: Vec<PathBuf> = Vec::with_capacity(sites.len());
    let mut seen: HashSet<PathBuf> = HashSet::with_capacity(sites.len());
    for site in sites {
        let path = write_site_json(dir, site)?;
        if seen.insert(path.clone()) {
            written.push(path);
        } else {
            log::warn!(
                "{} written again: {} returned to a previous depth (interval from {})",
                path.display(),
                site.key.stem(),
                site.start_dt
            );
        }
    }
    Ok(written)
}

/// Write the extended block table.
///
/// Columns are the table's own columns followed by `L0..L{n-1}` and
/// `R0..R{n-1}`. Depths are written with `decimals` places; unset channels
/// are written as zero. Timestamps are normalised to `YYYY-MM-DD HH:MM:SS`.
pub fn write_extended_table(path: &Path, table: &ExtendedTable, decimals: u32) -> Result<()> {
    let path_str = path.display().to_string();
    let buf_writer = create_buffered_writer(path)?;
    let mut csv_writer = csv::Writer::from_writer(buf_writer);

    let csv_err = |e| WriteError::CsvError {
        path: path_str.clone(),
        source: e,
    };

    let mut header: Vec<String> = table.layout.headers.clone();
    for hemisphere in Hemisphere::ALL {
        header.extend((0..table.num_channels).map(|c| depth_column_name(hemisphere, c)));
    }
    csv_writer.write_record(&header).map_err(csv_err)?;

    let precision = decimals as usize;
    for row in &table.sessions {
        let mut record = row.session.values.clone();
        if let Some(cell) = record.get_mut(table.layout.datetime_index) {
            *cell = format_timestamp(&row.session.timestamp);
        }
        for hemisphere in Hemisphere::ALL {
            record.extend((0..table.num_channels).map(|channel| {
                let depth = row.depth(hemisphere, channel).unwrap_or(0.0);
                format!("{:.*}", precision, round_to(depth, decimals))
            }));
        }
        csv_writer.write_record(&record).map_err(csv_err)?;
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str.clone(),
        source: e,
    })?;

    Ok(())
}

/// Write the blocks recorded at one site to `{subject}_{hemisphere}{channel:02}_{depth:.3}.csv`.
pub fn write_site_csv(dir: &Path, key: &SiteKey, sessions: &[SiteSession]) -> Result<PathBuf> {
    let path = dir.join(key.csv_file_name());
    let path_str = path.display().to_string();
    let buf_writer = create_buffered_writer(&path)?;
    let mut csv_writer = csv::Writer::from_writer(buf_writer);

    let csv_err = |e| WriteError::CsvError {
        path: path_str.clone(),
        source: e,
    };

    csv_writer.write_record(["Block", "datetime"]).map_err(csv_err)?;
    for session in sessions {
        let datetime = format_timestamp(&session.datetime);
        csv_writer
            .write_record([session.block.as_str(), datetime.as_str()])
            .map_err(csv_err)?;
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str.clone(),
        source: e,
    })?;

    Ok(path)
}

/// Write one session list per site into `dir`.
pub fn write_site_csvs(dir: &Path, sites: &BTreeMap<SiteKey, Vec<SiteSession>>) -> Result<Vec<PathBuf>> {
    ensure_dir(dir)?;
    sites
        .iter()
        .map(|(key, sessions)| write_site_csv(dir, key, sessions))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NamingConfig, NamingRules, TableConfig};
    use crate::core::loaders::{
        load_extended_table, CrossReferencedSession, SessionRecord, SessionTable, Subject,
        TableLayout,
    };
    use crate::processors::crossref::{clear_unset_depths, extend_block_table, DepthIndex};
    use crate::core::transforms::date_from_ymd;
    use crate::processors::intervals::derive_intervals;
    use crate::processors::intervals::tests::movement;
    use crate::processors::sites::{partition_sites, site_descriptors};
    use tempfile::tempdir;

    fn extended_table() -> ExtendedTable {
        let timestamp = date_from_ymd(2020, 2, 1).unwrap().date().and_hms_opt(9, 5, 0).unwrap();
        ExtendedTable {
            layout: TableLayout {
                headers: vec!["Ferret".into(), "Block".into(), "datetime".into()],
                subject_index: 0,
                block_index: 1,
                datetime_index: 2,
            },
            num_channels: 2,
            sessions: vec![CrossReferencedSession {
                session: SessionRecord {
                    subject: Subject::new(1808, "F1808"),
                    block: "Block_J1".to_string(),
                    timestamp,
                    values: vec![
                        "F1808_Skittles".to_string(),
                        "Block_J1".to_string(),
                        "2020-02-01T09:05:00".to_string(),
                    ],
                },
                left: vec![Some(1.25), None],
                right: vec![None, Some(2.0004)],
            }],
        }
    }

    #[test]
    fn test_write_extended_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("extended.csv");

        write_extended_table(&path, &extended_table(), 3).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "Ferret,Block,datetime,L0,L1,R0,R1");
        assert_eq!(
            lines[1],
            "F1808_Skittles,Block_J1,2020-02-01 09:05:00,1.250,0.000,0.000,2.000"
        );
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_extended_table_reloads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("extended.csv");
        let table = extended_table();
        write_extended_table(&path, &table, 3).unwrap();

        let rules = NamingRules::compile(&NamingConfig::default()).unwrap();
        let reloaded = load_extended_table(&path, &TableConfig::default(), &rules, 2).unwrap();
        let row = &reloaded.sessions[0];
        assert_eq!(row.session.timestamp, table.sessions[0].session.timestamp);
        assert_eq!(row.left, vec![Some(1.25), Some(0.0)]);
        assert_eq!(row.right, vec![Some(0.0), Some(2.0)]);
    }

    #[test]
    fn test_zero_depth_site_survives_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("extended.csv");
        let movements = vec![movement(1808, Hemisphere::Left, 0, (2020, 1, 1), 0.0)];
        let sessions = vec![SessionRecord {
            subject: Subject::new(1808, "F1808"),
            block: "Block_J1".to_string(),
            timestamp: date_from_ymd(2020, 2, 1).unwrap(),
            values: vec![
                "F1808_Skittles".to_string(),
                "Block_J1".to_string(),
                "2020-02-01 00:00:00".to_string(),
            ],
        }];
        let block_table = SessionTable {
            layout: extended_table().layout,
            sessions,
        };

        let (extended, _) = extend_block_table(block_table, &movements, 2, 3);
        let in_memory = partition_sites(&extended.sessions, 2);
        write_extended_table(&path, &extended, 3).unwrap();

        let rules = NamingRules::compile(&NamingConfig::default()).unwrap();
        let mut reloaded = load_extended_table(&path, &TableConfig::default(), &rules, 2).unwrap();
        let index = DepthIndex::from_movements(&movements);
        assert_eq!(clear_unset_depths(&mut reloaded.sessions, &index), 3);

        let from_disk = partition_sites(&reloaded.sessions, 2);
        assert_eq!(from_disk.len(), 1);
        assert_eq!(
            from_disk.keys().collect::<Vec<_>>(),
            in_memory.keys().collect::<Vec<_>>()
        );

        let paths = write_site_csvs(dir.path(), &from_disk).unwrap();
        assert!(paths[0].ends_with("F1808_L00_0.000.csv"));
        let sites = site_descriptors(&derive_intervals(&movements), None);
        assert_eq!(sites[0].file_name(), "F1808_L00_0.000mm.json");
    }

    #[test]
    fn test_write_site_csvs() {
        let dir = tempdir().unwrap();
        let table = extended_table();
        let sites = partition_sites(&table.sessions, table.num_channels);

        let paths = write_site_csvs(dir.path(), &sites).unwrap();
        assert_eq!(paths.len(), 2);

        let left = dir.path().join("F1808_L00_1.250.csv");
        let content = fs::read_to_string(&left).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines, vec!["Block,datetime", "Block_J1,2020-02-01 09:05:00"]);
        assert!(dir.path().join("F1808_R01_2.000.csv").exists());
    }

    #[test]
    fn test_write_site_json() {
        let dir = tempdir().unwrap();
        let records = vec![
            movement(1808, Hemisphere::Left, 5, (2020, 1, 1), 1.0),
            movement(1808, Hemisphere::Left, 5, (2020, 3, 1), 2.0),
        ];
        let sites = site_descriptors(&derive_intervals(&records), None);

        let paths = write_site_jsons(&dir.path().join("json"), &sites).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("F1808_L05_1.000mm.json"));

        let content = fs::read_to_string(&paths[1]).unwrap();
        assert!(content.starts_with("{\n   \"Channel\": 5,"));
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["end_dt"], 0);
        assert_eq!(value["duration"], 0);
    }

    #[test]
    fn test_returning_depth_is_written_once() {
        let dir = tempdir().unwrap();
        let records = vec![
            movement(1808, Hemisphere::Left, 5, (2020, 1, 1), 1.0),
            movement(1808, Hemisphere::Left, 5, (2020, 2, 1), 2.0),
            movement(1808, Hemisphere::Left, 5, (2020, 3, 1), 1.0),
        ];
        let sites = site_descriptors(&derive_intervals(&records), None);
        assert_eq!(sites.len(), 3);

        let paths = write_site_jsons(dir.path(), &sites).unwrap();
        assert_eq!(paths.len(), 2);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);

        let content = fs::read_to_string(dir.path().join("F1808_L05_1.000mm.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["end_dt"], 0);
    }
}
