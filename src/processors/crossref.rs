//! Point-in-time join of recording sessions against electrode depth histories.
//!
//! For each session and each (hemisphere, channel), the depth in effect is the
//! interval `[start, end)` containing the session timestamp. Sessions before a
//! subject's first movement are removed upstream by
//! [`remove_sessions_before_implant`].

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDateTime;

use super::intervals::{derive_intervals, DepthInterval};
use crate::core::loaders::{
    CrossReferencedSession, ExtendedTable, Hemisphere, MovementRecord, SessionRecord,
    SessionTable, Subject,
};
use crate::core::transforms::round_to;

/// Remove repeated (subject, block, timestamp) rows, keeping the first.
///
/// Duplicates arise when block tables collected from several disks overlap.
pub fn deduplicate_sessions(sessions: Vec<SessionRecord>) -> Vec<SessionRecord> {
    let mut seen: HashSet<(u32, String, NaiveDateTime)> = HashSet::with_capacity(sessions.len());
    sessions
        .into_iter()
        .filter(|s| seen.insert((s.subject.key, s.block.clone(), s.timestamp)))
        .collect()
}

/// Earliest movement timestamp per subject.
pub fn first_movements(records: &[MovementRecord]) -> BTreeMap<Subject, NaiveDateTime> {
    let mut first: BTreeMap<Subject, NaiveDateTime> = BTreeMap::new();
    for record in records {
        first
            .entry(record.subject.clone())
            .and_modify(|ts| *ts = (*ts).min(record.timestamp))
            .or_insert(record.timestamp);
    }
    first
}

/// Keep only sessions recorded strictly after the subject's first movement.
///
/// Subjects without any movement record are removed entirely. The result is
/// assembled subject by subject (ascending key), preserving table order
/// within each subject.
pub fn remove_sessions_before_implant(
    sessions: Vec<SessionRecord>,
    first: &BTreeMap<Subject, NaiveDateTime>,
) -> Vec<SessionRecord> {
    let mut by_subject: BTreeMap<u32, Vec<SessionRecord>> = BTreeMap::new();
    for session in sessions {
        by_subject.entry(session.subject.key).or_default().push(session);
    }

    let mut kept = Vec::new();
    for (subject, implanted) in first {
        if let Some(rows) = by_subject.remove(&subject.key) {
            kept.extend(rows.into_iter().filter(|s| s.timestamp > *implanted));
        }
    }

    for (key, rows) in &by_subject {
        log::debug!("F{:04}: {} blocks dropped, no electrode movements", key, rows.len());
    }
    kept
}

type TimelineKey = (u32, Hemisphere, usize);

/// Sorted depth intervals per channel, queried by timestamp.
#[derive(Debug, Clone, Default)]
pub struct DepthIndex {
    timelines: HashMap<TimelineKey, Vec<DepthInterval>>,
}

impl DepthIndex {
    pub fn build(intervals: impl IntoIterator<Item = DepthInterval>) -> Self {
        let mut timelines: HashMap<TimelineKey, Vec<DepthInterval>> = HashMap::new();
        for interval in intervals {
            let key = (
                interval.record.subject.key,
                interval.record.hemisphere,
                interval.record.channel,
            );
            timelines.entry(key).or_default().push(interval);
        }
        for timeline in timelines.values_mut() {
            timeline.sort_by(|a, b| a.start.cmp(&b.start));
        }
        Self { timelines }
    }

    /// Derive intervals from raw movements and index them.
    pub fn from_movements(records: &[MovementRecord]) -> Self {
        Self::build(derive_intervals(records))
    }

    /// Number of indexed channels.
    pub fn len(&self) -> usize {
        self.timelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timelines.is_empty()
    }

    /// The interval containing `ts`.
    ///
    /// If several intervals contain it (inconsistent input), the one with the
    /// most recent start wins.
    pub fn interval_at(
        &self,
        subject: &Subject,
        hemisphere: Hemisphere,
        channel: usize,
        ts: NaiveDateTime,
    ) -> Option<&DepthInterval> {
        let timeline = self.timelines.get(&(subject.key, hemisphere, channel))?;
        let started = timeline.partition_point(|iv| iv.start <= ts);
        timeline[..started].iter().rev().find(|iv| iv.contains(ts))
    }

    /// Depth in effect at `ts`, `None` if no movement precedes it.
    pub fn depth_at(
        &self,
        subject: &Subject,
        hemisphere: Hemisphere,
        channel: usize,
        ts: NaiveDateTime,
    ) -> Option<f64> {
        self.interval_at(subject, hemisphere, channel, ts)
            .map(DepthInterval::depth)
    }
}

/// Resolve every channel depth of one session.
pub fn cross_reference_session(
    session: &SessionRecord,
    index: &DepthIndex,
    num_channels: usize,
    decimals: u32,
) -> CrossReferencedSession {
    let resolve = |hemisphere: Hemisphere| -> Vec<Option<f64>> {
        (0..num_channels)
            .map(|channel| {
                index
                    .depth_at(&session.subject, hemisphere, channel, session.timestamp)
                    .map(|d| round_to(d, decimals))
            })
            .collect()
    };

    CrossReferencedSession {
        session: session.clone(),
        left: resolve(Hemisphere::Left),
        right: resolve(Hemisphere::Right),
    }
}

/// Resolve channel depths for every session, in order.
pub fn cross_reference(
    sessions: &[SessionRecord],
    index: &DepthIndex,
    num_channels: usize,
    decimals: u32,
) -> Vec<CrossReferencedSession> {
    sessions
        .iter()
        .map(|session| cross_reference_session(session, index, num_channels, decimals))
        .collect()
}

/// Row counts at each stage of [`extend_block_table`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtendStats {
    pub loaded: usize,
    pub unique: usize,
    pub after_implant: usize,
}

/// Deduplicate, drop pre-implant blocks and annotate with channel depths.
pub fn extend_block_table(
    table: SessionTable,
    movements: &[MovementRecord],
    num_channels: usize,
    decimals: u32,
) -> (ExtendedTable, ExtendStats) {
    let SessionTable { layout, sessions } = table;
    let loaded = sessions.len();

    let sessions = deduplicate_sessions(sessions);
    let unique = sessions.len();
    log::info!("Block table: {} rows, {} after removing duplicates", loaded, unique);

    let first = first_movements(movements);
    let sessions = remove_sessions_before_implant(sessions, &first);
    let after_implant = sessions.len();
    log::info!("{} blocks recorded after implantation", after_implant);

    let index = DepthIndex::from_movements(movements);
    log::debug!("Indexed {} electrode channels", index.len());

    let sessions = cross_reference(&sessions, &index, num_channels, decimals);

    (
        ExtendedTable {
            layout,
            num_channels,
            sessions,
        },
        ExtendStats {
            loaded,
            unique,
            after_implant,
        },
    )
}

/// Unset zero depths of a reloaded table that no movement accounts for.
///
/// The extended table stores unset channels as zero, so a reloaded zero is
/// either a real depth of zero or an unset channel. A zero stays set only
/// where `index` has an interval in effect. Returns the number of cells unset.
pub fn clear_unset_depths(sessions: &mut [CrossReferencedSession], index: &DepthIndex) -> usize {
    let mut cleared = 0;
    for row in sessions.iter_mut() {
        let CrossReferencedSession {
            session,
            left,
            right,
        } = row;
        for (hemisphere, depths) in [(Hemisphere::Left, left), (Hemisphere::Right, right)] {
            for (channel, depth) in depths.iter_mut().enumerate() {
                if *depth != Some(0.0) {
                    continue;
                }
                if index
                    .depth_at(&session.subject, hemisphere, channel, session.timestamp)
                    .is_none()
                {
                    *depth = None;
                    cleared += 1;
                }
            }
        }
    }
    cleared
}
