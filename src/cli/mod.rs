//! Command-line interface for the electrode site tools.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};

use crate::config::{NamingRules, PipelineConfig};
use crate::core::{loaders, writers};

#[derive(Parser)]
#[command(name = "electrode-sites")]
#[command(about = "Electrode depth logs, recording sites and block-table cross-referencing", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write one JSON descriptor per recording site from electrode movement logs
    SiteJson {
        /// Directory containing movement CSV files
        #[arg(long)]
        positions: Option<PathBuf>,
        /// Output directory for JSON files
        #[arg(long)]
        json_dir: Option<PathBuf>,
        /// List the blocks recorded at each site (reads the block tables)
        #[arg(long)]
        with_blocks: bool,
        /// Block table(s) listed with --with-blocks (repeatable)
        #[arg(long = "block-table")]
        block_tables: Vec<PathBuf>,
    },

    /// Annotate the block table with the depth of every channel
    ExtendTable {
        /// Directory containing movement CSV files
        #[arg(long)]
        positions: Option<PathBuf>,
        /// Block table(s) to cross-reference (repeatable)
        #[arg(long = "block-table")]
        block_tables: Vec<PathBuf>,
        /// Output CSV for the extended table
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write one CSV of blocks per recording site from an extended table
    SiteBlocks {
        /// Extended block table
        #[arg(long)]
        extended: Option<PathBuf>,
        /// Directory containing movement CSV files
        #[arg(long)]
        positions: Option<PathBuf>,
        /// Output directory for site CSVs
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Plot depth against date for one movement CSV (PNG)
    PlotDepths {
        /// Movement CSV file
        positions_csv: PathBuf,
        /// Output PNG file path (defaults to the plot directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Plot the channel depths of every block as a heatmap (PNG)
    Heatmap {
        /// Extended block table
        #[arg(long)]
        extended: Option<PathBuf>,
        /// Directory containing movement CSV files
        #[arg(long)]
        positions: Option<PathBuf>,
        /// Output PNG file path (defaults to the plot directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Blind manual check of random depths in an extended table
    SpotCheck {
        /// Extended block table
        #[arg(long)]
        extended: Option<PathBuf>,
        /// Number of cells to check
        #[arg(long)]
        rows: Option<usize>,
        /// Random seed
        #[arg(long)]
        seed: Option<u64>,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<60} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 37 {
            let head: String = value.chars().take(34).collect();
            format!("{}...", head)
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<37} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let config = match load_config(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    };

    let rules = match config.validate() {
        Ok(rules) => rules,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Dispatch to subcommands
    let result = match cli.command {
        Commands::SiteJson {
            positions,
            json_dir,
            with_blocks,
            block_tables,
        } => cmd_site_json(positions, json_dir, with_blocks, block_tables, &config, &rules),
        Commands::ExtendTable {
            positions,
            block_tables,
            output,
        } => cmd_extend_table(positions, block_tables, output, &config, &rules),
        Commands::SiteBlocks {
            extended,
            positions,
            output_dir,
        } => cmd_site_blocks(extended, positions, output_dir, &config, &rules),
        Commands::PlotDepths {
            positions_csv,
            output,
        } => cmd_plot_depths(&positions_csv, output, &config, &rules),
        Commands::Heatmap {
            extended,
            positions,
            output,
        } => cmd_heatmap(extended, positions, output, &config, &rules),
        Commands::SpotCheck {
            extended,
            rows,
            seed,
        } => cmd_spot_check(extended, rows, seed, &config, &rules),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

/// Defaults apply only when no config file is given; a named file must load.
fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => {
            let config = PipelineConfig::from_yaml(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?;
            info!("Loaded config from: {}", path.display());
            Ok(config)
        }
        None => Ok(PipelineConfig::default()),
    }
}

fn load_extended(path: &Path, config: &PipelineConfig, rules: &NamingRules) -> Result<loaders::ExtendedTable> {
    loaders::load_extended_table(path, &config.table, rules, config.crossref.num_channels)
        .with_context(|| format!("failed to load extended table {}", path.display()))
}

/// Load an extended table and unset the zero depths the movement logs do not explain.
fn load_extended_with_movements(
    path: &Path,
    positions: &Path,
    config: &PipelineConfig,
    rules: &NamingRules,
) -> Result<loaders::ExtendedTable> {
    let mut table = load_extended(path, config, rules)?;
    let records = loaders::load_movement_dir(positions, rules, config.crossref.num_channels)?;
    let index = crate::processors::DepthIndex::from_movements(&records);
    let cleared = crate::processors::clear_unset_depths(&mut table.sessions, &index);
    log::debug!("{} stored zero depths are unset channels", cleared);
    Ok(table)
}

fn cmd_site_json(
    positions: Option<PathBuf>,
    json_dir: Option<PathBuf>,
    with_blocks: bool,
    block_tables: Vec<PathBuf>,
    config: &PipelineConfig,
    rules: &NamingRules,
) -> Result<()> {
    use crate::processors::{intervals, sites};

    let start = Instant::now();
    let positions = positions.unwrap_or_else(|| config.paths.positions_dir.clone());
    let json_dir = json_dir.unwrap_or_else(|| config.paths.json_dir.clone());

    let spinner = create_spinner("Loading electrode movements...");
    let records = loaders::load_movement_dir(&positions, rules, config.crossref.num_channels)?;

    let blocks = if with_blocks {
        spinner.set_message("Loading block tables...");
        let block_tables = if block_tables.is_empty() {
            config.paths.block_tables.clone()
        } else {
            block_tables
        };
        let table = loaders::load_block_tables(&block_tables, &config.table, rules)?;
        Some(crate::processors::deduplicate_sessions(table.sessions))
    } else {
        None
    };

    spinner.set_message("Writing site descriptors...");
    let intervals = intervals::derive_intervals(&records);
    let descriptors = sites::site_descriptors(&intervals, blocks.as_deref());
    let written = writers::write_site_jsons(&json_dir, &descriptors);
    spinner.finish_and_clear();
    let written = written?;

    print_summary(
        "Site JSON Complete",
        &[
            ("Positions", positions.display().to_string()),
            ("Output directory", json_dir.display().to_string()),
            ("Movements", records.len().to_string()),
            ("Sites written", written.len().to_string()),
            ("With blocks", with_blocks.to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
    Ok(())
}

fn cmd_extend_table(
    positions: Option<PathBuf>,
    block_tables: Vec<PathBuf>,
    output: Option<PathBuf>,
    config: &PipelineConfig,
    rules: &NamingRules,
) -> Result<()> {
    use crate::processors::crossref;

    let start = Instant::now();
    let positions = positions.unwrap_or_else(|| config.paths.positions_dir.clone());
    let block_tables = if block_tables.is_empty() {
        config.paths.block_tables.clone()
    } else {
        block_tables
    };
    let output = output.unwrap_or_else(|| config.paths.extended_table.clone());

    let spinner = create_spinner("Loading block tables and electrode movements...");
    let table = loaders::load_block_tables(&block_tables, &config.table, rules)?;
    let records = loaders::load_movement_dir(&positions, rules, config.crossref.num_channels)?;

    spinner.set_message("Cross-referencing electrode depths...");
    let (extended, stats) = crossref::extend_block_table(
        table,
        &records,
        config.crossref.num_channels,
        config.crossref.depth_decimals,
    );
    let written = writers::write_extended_table(&output, &extended, config.crossref.depth_decimals);
    spinner.finish_and_clear();
    written?;

    print_summary(
        "Extend Block Table Complete",
        &[
            ("Block tables", block_tables.len().to_string()),
            ("Blocks loaded", stats.loaded.to_string()),
            ("After dedup", stats.unique.to_string()),
            ("After implant", stats.after_implant.to_string()),
            ("Output", output.display().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
    Ok(())
}

fn cmd_site_blocks(
    extended: Option<PathBuf>,
    positions: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    config: &PipelineConfig,
    rules: &NamingRules,
) -> Result<()> {
    use crate::processors::sites;

    let start = Instant::now();
    let extended = extended.unwrap_or_else(|| config.paths.extended_table.clone());
    let positions = positions.unwrap_or_else(|| config.paths.positions_dir.clone());
    let output_dir = output_dir.unwrap_or_else(|| config.paths.site_csv_dir.clone());

    let table = load_extended_with_movements(&extended, &positions, config, rules)?;
    let site_map = sites::partition_sites(&table.sessions, table.num_channels);
    let written = writers::write_site_csvs(&output_dir, &site_map)?;

    print_summary(
        "Site Blocks Complete",
        &[
            ("Extended table", extended.display().to_string()),
            ("Output directory", output_dir.display().to_string()),
            ("Blocks", table.sessions.len().to_string()),
            ("Sites written", written.len().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
    Ok(())
}

fn cmd_plot_depths(
    positions_csv: &Path,
    output: Option<PathBuf>,
    config: &PipelineConfig,
    rules: &NamingRules,
) -> Result<()> {
    use crate::visualization;

    let start = Instant::now();
    let output_path = output.unwrap_or_else(|| {
        let stem = positions_csv
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "depths".to_string());
        config.paths.plot_dir.join(format!("{}.png", stem))
    });
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }

    let records = loaders::load_movement_csv(positions_csv, rules, config.crossref.num_channels)?;

    let spinner = create_spinner("Generating plot...");
    let plotted = visualization::plot_depth_history(&output_path, &records);
    spinner.finish_and_clear();
    plotted?;

    print_summary(
        "Depth Plot Complete",
        &[
            ("Input file", positions_csv.display().to_string()),
            ("Output PNG", output_path.display().to_string()),
            ("Movements", records.len().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
    Ok(())
}

fn cmd_heatmap(
    extended: Option<PathBuf>,
    positions: Option<PathBuf>,
    output: Option<PathBuf>,
    config: &PipelineConfig,
    rules: &NamingRules,
) -> Result<()> {
    use crate::visualization;

    let start = Instant::now();
    let extended = extended.unwrap_or_else(|| config.paths.extended_table.clone());
    let positions = positions.unwrap_or_else(|| config.paths.positions_dir.clone());
    let output_path = output.unwrap_or_else(|| config.paths.plot_dir.join("depth_heatmap.png"));
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }

    let table = load_extended_with_movements(&extended, &positions, config, rules)?;

    let spinner = create_spinner("Generating heatmap...");
    let plotted = visualization::plot_depth_heatmap(&output_path, &table.sessions, table.num_channels);
    spinner.finish_and_clear();
    plotted?;

    print_summary(
        "Heatmap Complete",
        &[
            ("Extended table", extended.display().to_string()),
            ("Output PNG", output_path.display().to_string()),
            ("Blocks", table.sessions.len().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
    Ok(())
}

fn cmd_spot_check(
    extended: Option<PathBuf>,
    rows: Option<usize>,
    seed: Option<u64>,
    config: &PipelineConfig,
    rules: &NamingRules,
) -> Result<()> {
    use crate::processors::spot_check;

    let extended = extended.unwrap_or_else(|| config.paths.extended_table.clone());
    let rows = rows.unwrap_or(config.spot_check.rows);
    let seed = seed.unwrap_or(config.spot_check.seed);

    let table = load_extended(&extended, config, rules)?;
    let stdin = io::stdin();
    let summary = spot_check::run_spot_check(&table, rows, seed, stdin.lock(), io::stdout())?;

    print_summary(
        "Spot Check Complete",
        &[
            ("Extended table", extended.display().to_string()),
            ("Checked", summary.checked.to_string()),
            ("Correct", summary.correct.to_string()),
            ("Seed", seed.to_string()),
        ],
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_config_defaults_without_path() {
        let config = load_config(None).unwrap();
        assert_eq!(config.crossref.num_channels, 32);
    }

    #[test]
    fn test_load_config_rejects_unreadable_file() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.yaml");
        assert!(load_config(Some(missing.as_path())).is_err());

        let bad = dir.path().join("bad.yaml");
        std::fs::write(&bad, "crossref: [not, a, map\n").unwrap();
        assert!(load_config(Some(bad.as_path())).is_err());

        let good = dir.path().join("good.yaml");
        std::fs::write(&good, "crossref:\n  num_channels: 16\n").unwrap();
        assert_eq!(load_config(Some(good.as_path())).unwrap().crossref.num_channels, 16);
    }

    #[test]
    fn test_site_json_accepts_block_tables() {
        let cli = Cli::try_parse_from([
            "electrode-sites",
            "site-json",
            "--with-blocks",
            "--block-table",
            "a.csv",
            "--block-table",
            "b.csv",
        ])
        .unwrap();
        match cli.command {
            Commands::SiteJson {
                with_blocks,
                block_tables,
                ..
            } => {
                assert!(with_blocks);
                assert_eq!(block_tables, vec![PathBuf::from("a.csv"), PathBuf::from("b.csv")]);
            }
            _ => panic!("expected site-json"),
        }
    }
}
