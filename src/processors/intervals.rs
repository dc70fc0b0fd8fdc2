//! Per-channel depth intervals derived from consecutive electrode movements.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::core::loaders::{Hemisphere, MovementRecord, Subject};

/// Identifies one channel of one electrode array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelKey {
    pub subject: Subject,
    pub hemisphere: Hemisphere,
    pub channel: usize,
}

impl ChannelKey {
    pub fn of(record: &MovementRecord) -> Self {
        Self {
            subject: record.subject.clone(),
            hemisphere: record.hemisphere,
            channel: record.channel,
        }
    }
}

/// A depth and the half-open period `[start, end)` it was in effect.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthInterval {
    pub record: MovementRecord,
    pub start: NaiveDateTime,
    /// `None` for the latest movement of a channel (unbounded).
    pub end: Option<NaiveDateTime>,
}

impl DepthInterval {
    #[inline]
    pub fn depth(&self) -> f64 {
        self.record.depth()
    }

    /// Whole days between start and end, 0 when unbounded.
    pub fn duration_days(&self) -> i64 {
        self.end.map_or(0, |end| (end - self.start).num_days())
    }

    #[inline]
    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        self.start <= ts && self.end.map_or(true, |end| ts < end)
    }
}

/// Group movement records by channel, keeping file order within each group.
pub fn group_by_channel(records: &[MovementRecord]) -> BTreeMap<ChannelKey, Vec<&MovementRecord>> {
    let mut groups: BTreeMap<ChannelKey, Vec<&MovementRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(ChannelKey::of(record)).or_default().push(record);
    }
    groups
}

/// Sort one channel's movements ascending by date.
///
/// Movements logged on the same date are ordered by descending position so
/// the shallower (final) setting of the day comes last.
pub fn sort_movements(events: &mut [&MovementRecord]) {
    events.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| b.position.total_cmp(&a.position))
    });
}

/// Derive the intervals of a single channel.
///
/// Each interval ends where the next movement starts; the last is unbounded.
/// Movements superseded on the same timestamp have zero duration and are
/// dropped, so the result is contiguous from the first movement onwards.
pub fn derive_channel_intervals(mut events: Vec<&MovementRecord>) -> Vec<DepthInterval> {
    sort_movements(&mut events);

    let mut intervals = Vec::with_capacity(events.len());
    for (i, event) in events.iter().enumerate() {
        let start = event.timestamp;
        let end = events.get(i + 1).map(|next| next.timestamp);

        if end == Some(start) {
            log::debug!(
                "{} {}{:02}: dropping depth {:.3} superseded on {}",
                event.subject,
                event.hemisphere,
                event.channel,
                event.depth(),
                start
            );
            continue;
        }

        intervals.push(DepthInterval {
            record: (*event).clone(),
            start,
            end,
        });
    }
    intervals
}

/// Derive intervals for every channel, ordered by channel then start.
pub fn derive_intervals(records: &[MovementRecord]) -> Vec<DepthInterval> {
    group_by_channel(records)
        .into_values()
        .flat_map(derive_channel_intervals)
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::transforms::date_from_ymd;

    pub(crate) fn movement(
        subject: u32,
        hemisphere: Hemisphere,
        channel: usize,
        (y, m, d): (i32, u32, u32),
        depth: f64,
    ) -> MovementRecord {
        MovementRecord {
            subject: Subject::new(subject, format!("F{:04}", subject)),
            hemisphere,
            channel,
            timestamp: date_from_ymd(y, m, d).unwrap(),
            position: depth + 1.0,
            zero: 1.0,
            extra: Vec::new(),
        }
    }

    #[test]
    fn test_intervals_are_contiguous_and_open_ended() {
        let records = vec![
            movement(180, Hemisphere::Left, 5, (2020, 3, 1), 2.0),
            movement(180, Hemisphere::Left, 5, (2020, 1, 1), 1.0),
            movement(180, Hemisphere::Left, 5, (2020, 5, 10), 2.5),
        ];

        let intervals = derive_intervals(&records);
        assert_eq!(intervals.len(), 3);
        assert_eq!(intervals[0].start, date_from_ymd(2020, 1, 1).unwrap());
        for pair in intervals.windows(2) {
            assert_eq!(pair[0].end, Some(pair[1].start));
            assert!(pair[0].start < pair[1].start);
        }
        let last = intervals.last().unwrap();
        assert_eq!(last.end, None);
        assert_eq!(last.duration_days(), 0);
        assert_eq!(intervals[0].duration_days(), 60);
    }

    #[test]
    fn test_same_day_movement_is_dropped() {
        let records = vec![
            movement(180, Hemisphere::Right, 2, (2020, 1, 1), 1.0),
            movement(180, Hemisphere::Right, 2, (2020, 2, 1), 1.5),
            movement(180, Hemisphere::Right, 2, (2020, 2, 1), 1.25),
        ];

        let intervals = derive_intervals(&records);
        assert_eq!(intervals.len(), 2);
        // Higher position sorts first on the same day and is superseded.
        assert!((intervals[1].depth() - 1.25).abs() < 1e-12);
        assert_eq!(intervals[0].end, Some(intervals[1].start));
    }

    #[test]
    fn test_channels_are_independent() {
        let records = vec![
            movement(180, Hemisphere::Left, 1, (2020, 1, 1), 1.0),
            movement(180, Hemisphere::Right, 1, (2020, 2, 1), 2.0),
            movement(181, Hemisphere::Left, 1, (2020, 3, 1), 3.0),
        ];

        let intervals = derive_intervals(&records);
        assert_eq!(intervals.len(), 3);
        assert!(intervals.iter().all(|iv| iv.end.is_none()));
    }

    #[test]
    fn test_empty_input() {
        assert!(derive_intervals(&[]).is_empty());
        assert!(derive_channel_intervals(Vec::new()).is_empty());
    }

    #[test]
    fn test_contains_is_half_open() {
        let records = vec![
            movement(180, Hemisphere::Left, 5, (2020, 1, 1), 1.0),
            movement(180, Hemisphere::Left, 5, (2020, 3, 1), 2.0),
        ];
        let intervals = derive_intervals(&records);
        let march = date_from_ymd(2020, 3, 1).unwrap();
        assert!(!intervals[0].contains(march));
        assert!(intervals[1].contains(march));
        assert!(intervals[0].contains(date_from_ymd(2020, 1, 1).unwrap()));
    }
}
