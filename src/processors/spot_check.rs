//! Blind manual validation of an extended block table.
//!
//! Random (block, hemisphere, channel) cells are shown to the operator, who
//! looks the depth up in the lab notes and types it in; the answer is compared
//! with the table at three decimals.

use std::io::{BufRead, Write};

use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::core::loaders::{ExtendedTable, Hemisphere};
use crate::core::transforms::depth_key;

/// One cell selected for checking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpotCheck {
    pub row: usize,
    pub hemisphere: Hemisphere,
    pub channel: usize,
}

/// Outcome of a spot-check session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpotCheckSummary {
    pub checked: usize,
    pub correct: usize,
}

/// Draw `count` cells with a seeded generator; the same seed gives the same cells.
pub fn draw_checks(table: &ExtendedTable, count: usize, seed: u64) -> Vec<SpotCheck> {
    if table.sessions.is_empty() || table.num_channels == 0 {
        return Vec::new();
    }

    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let row = rng.gen_range(0..table.sessions.len());
            let channel = rng.gen_range(0..table.num_channels);
            let hemisphere = if rng.gen_bool(0.5) {
                Hemisphere::Left
            } else {
                Hemisphere::Right
            };
            SpotCheck {
                row,
                hemisphere,
                channel,
            }
        })
        .collect()
}

/// Run an interactive spot check, reading answers from `input`.
///
/// Unparseable answers count as incorrect. The session ends early if input
/// is exhausted.
pub fn run_spot_check<R: BufRead, W: Write>(
    table: &ExtendedTable,
    count: usize,
    seed: u64,
    mut input: R,
    mut output: W,
) -> Result<SpotCheckSummary> {
    if table.sessions.is_empty() {
        bail!("extended table has no blocks to check");
    }

    let mut summary = SpotCheckSummary::default();
    for check in draw_checks(table, count, seed) {
        let row = &table.sessions[check.row];
        let subject_name = &row.session.values[table.layout.subject_index];
        let expected = row.depth(check.hemisphere, check.channel).unwrap_or(0.0);

        writeln!(
            output,
            "\n{}\t{}\t{}\tC{:02}",
            subject_name,
            row.session.block,
            check.hemisphere.name(),
            check.channel
        )?;
        write!(output, "What do you think the depth should be? (to 3 decimal places)  ")?;
        output.flush()?;

        let mut line = String::new();
        let read = input.read_line(&mut line).context("failed to read answer")?;
        if read == 0 {
            log::warn!("Input closed after {} checks", summary.checked);
            break;
        }
        summary.checked += 1;

        match line.trim().parse::<f64>() {
            Ok(answer) if depth_key(answer) == depth_key(expected) => {
                summary.correct += 1;
                writeln!(output, "Correct! You said {}, the file said {}", answer, expected)?;
            }
            Ok(answer) => {
                writeln!(output, "No, sorry... You said {}, the file said {}", answer, expected)?;
            }
            Err(_) => {
                writeln!(
                    output,
                    "No, sorry... '{}' is not a depth, the file said {}",
                    line.trim(),
                    expected
                )?;
            }
        }
    }

    Ok(summary)
}
