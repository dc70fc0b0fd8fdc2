//! Configuration types for the electrode site tools.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or validating a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid pattern for {field}: {source}")]
    Pattern {
        field: &'static str,
        #[source]
        source: regex::Error,
    },

    #[error("pattern for {field} is missing the named group '{group}'")]
    MissingGroup { field: &'static str, group: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Input and output locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    /// Directory holding one movement CSV per subject and hemisphere
    #[serde(default = "default_positions_dir")]
    pub positions_dir: PathBuf,

    /// Block tables; several tables are concatenated and deduplicated
    #[serde(default = "default_block_tables")]
    pub block_tables: Vec<PathBuf>,

    /// Output directory for per-site JSON descriptors
    #[serde(default = "default_json_dir")]
    pub json_dir: PathBuf,

    /// Output path of the block table extended with depth columns
    #[serde(default = "default_extended_table")]
    pub extended_table: PathBuf,

    /// Output directory for per-site session lists
    #[serde(default = "default_site_csv_dir")]
    pub site_csv_dir: PathBuf,

    /// Output directory for PNG plots
    #[serde(default = "default_plot_dir")]
    pub plot_dir: PathBuf,
}

fn default_positions_dir() -> PathBuf {
    PathBuf::from("ElectrodePositions/Data/csv")
}

fn default_block_tables() -> Vec<PathBuf> {
    vec![PathBuf::from("Metadata/Block_Table.csv")]
}

fn default_json_dir() -> PathBuf {
    PathBuf::from("ElectrodePositions/Data/json")
}

fn default_extended_table() -> PathBuf {
    PathBuf::from("Metadata/Block_Table_extended.csv")
}

fn default_site_csv_dir() -> PathBuf {
    PathBuf::from("Metadata/site_blocks")
}

fn default_plot_dir() -> PathBuf {
    PathBuf::from("plots")
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            positions_dir: default_positions_dir(),
            block_tables: default_block_tables(),
            json_dir: default_json_dir(),
            extended_table: default_extended_table(),
            site_csv_dir: default_site_csv_dir(),
            plot_dir: default_plot_dir(),
        }
    }
}

/// Rules for extracting subject and hemisphere from names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamingConfig {
    /// Applied to movement file names; needs `subject`, `num` and `hemisphere` groups
    #[serde(default = "default_position_file_pattern")]
    pub position_file_pattern: String,

    /// Applied to the block table subject column; needs `subject` and `num` groups
    #[serde(default = "default_subject_pattern")]
    pub subject_pattern: String,
}

fn default_position_file_pattern() -> String {
    r"^(?P<subject>[A-Za-z](?P<num>\d{4}))_(?P<hemisphere>[LR])".to_string()
}

fn default_subject_pattern() -> String {
    r"^(?P<subject>[A-Za-z](?P<num>\d{4}))".to_string()
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            position_file_pattern: default_position_file_pattern(),
            subject_pattern: default_subject_pattern(),
        }
    }
}

/// Compiled form of [`NamingConfig`], built once by [`PipelineConfig::validate`].
#[derive(Debug, Clone)]
pub struct NamingRules {
    pub position_file: Regex,
    pub subject: Regex,
}

impl NamingRules {
    pub fn compile(config: &NamingConfig) -> Result<Self, ConfigError> {
        let position_file = compile_pattern(
            "naming.position_file_pattern",
            &config.position_file_pattern,
            &["subject", "num", "hemisphere"],
        )?;
        let subject = compile_pattern(
            "naming.subject_pattern",
            &config.subject_pattern,
            &["subject", "num"],
        )?;
        Ok(Self {
            position_file,
            subject,
        })
    }
}

fn compile_pattern(
    field: &'static str,
    pattern: &str,
    groups: &[&'static str],
) -> Result<Regex, ConfigError> {
    let regex = Regex::new(pattern).map_err(|source| ConfigError::Pattern { field, source })?;
    for &group in groups {
        if !regex.capture_names().flatten().any(|name| name == group) {
            return Err(ConfigError::MissingGroup { field, group });
        }
    }
    Ok(regex)
}

/// Column layout of the block table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    #[serde(default = "default_subject_column")]
    pub subject_column: String,

    #[serde(default = "default_block_column")]
    pub block_column: String,

    #[serde(default = "default_datetime_column")]
    pub datetime_column: String,

    /// Columns removed before cross-referencing
    #[serde(default = "default_drop_columns")]
    pub drop_columns: Vec<String>,
}

fn default_subject_column() -> String {
    "Ferret".to_string()
}

fn default_block_column() -> String {
    "Block".to_string()
}

fn default_datetime_column() -> String {
    "datetime".to_string()
}

fn default_drop_columns() -> Vec<String> {
    vec!["DateNum".to_string(), "Duration".to_string()]
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            subject_column: default_subject_column(),
            block_column: default_block_column(),
            datetime_column: default_datetime_column(),
            drop_columns: default_drop_columns(),
        }
    }
}

/// Cross-referencing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossRefConfig {
    /// Channels per electrode array
    #[serde(default = "default_num_channels")]
    pub num_channels: usize,

    /// Decimal places kept for depths in the extended table
    #[serde(default = "default_depth_decimals")]
    pub depth_decimals: u32,
}

fn default_num_channels() -> usize {
    32
}

fn default_depth_decimals() -> u32 {
    3
}

impl Default for CrossRefConfig {
    fn default() -> Self {
        Self {
            num_channels: default_num_channels(),
            depth_decimals: default_depth_decimals(),
        }
    }
}

/// Interactive spot-check parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotCheckConfig {
    #[serde(default = "default_spot_check_rows")]
    pub rows: usize,

    #[serde(default = "default_spot_check_seed")]
    pub seed: u64,
}

fn default_spot_check_rows() -> usize {
    10
}

fn default_spot_check_seed() -> u64 {
    168_345
}

impl Default for SpotCheckConfig {
    fn default() -> Self {
        Self {
            rows: default_spot_check_rows(),
            seed: default_spot_check_seed(),
        }
    }
}

/// Main configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub paths: PathConfig,

    #[serde(default)]
    pub naming: NamingConfig,

    #[serde(default)]
    pub table: TableConfig,

    #[serde(default)]
    pub crossref: CrossRefConfig,

    #[serde(default)]
    pub spot_check: SpotCheckConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check the configuration once and compile the naming rules.
    pub fn validate(&self) -> Result<NamingRules, ConfigError> {
        if self.crossref.num_channels == 0 {
            return Err(ConfigError::InvalidValue {
                field: "crossref.num_channels",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.crossref.depth_decimals > 6 {
            return Err(ConfigError::InvalidValue {
                field: "crossref.depth_decimals",
                reason: format!("{} exceeds 6", self.crossref.depth_decimals),
            });
        }
        if self.table.subject_column.is_empty()
            || self.table.block_column.is_empty()
            || self.table.datetime_column.is_empty()
        {
            return Err(ConfigError::InvalidValue {
                field: "table",
                reason: "column names must not be empty".to_string(),
            });
        }
        NamingRules::compile(&self.naming)
    }
}
