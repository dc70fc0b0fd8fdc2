//! Electrode depth bookkeeping for chronically implanted recording arrays.
//!
//! This crate provides tools for:
//! - Loading per-hemisphere electrode movement logs and recording block tables
//! - Deriving the depth interval each channel held between movements
//! - Writing one descriptor per recording site
//! - Annotating every recording block with the depth of every channel
//! - Partitioning annotated blocks by recording site
//!
//! # Example
//!
//! ```no_run
//! use electrode_sites::config::PipelineConfig;
//! use electrode_sites::core::loaders::{load_block_table, load_movement_dir};
//! use electrode_sites::processors::crossref::extend_block_table;
//!
//! let config = PipelineConfig::default();
//! let rules = config.validate().unwrap();
//! let movements = load_movement_dir("positions", &rules, 32).unwrap();
//! let table = load_block_table("blocks.csv", &config.table, &rules).unwrap();
//! let (extended, stats) = extend_block_table(table, &movements, 32, 3);
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;
pub mod visualization;

pub use config::{CrossRefConfig, NamingRules, PipelineConfig, TableConfig};
pub use core::loaders::{ExtendedTable, Hemisphere, MovementRecord, SessionRecord, Subject};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
