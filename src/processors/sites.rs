//! Recording sites: physically distinct (subject, hemisphere, channel, depth)
//! locations.
//!
//! Sites are keyed by the depth rounded to three decimals so floating noise
//! cannot split one physical site into several.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use super::intervals::DepthInterval;
use crate::core::loaders::{CrossReferencedSession, Hemisphere, SessionRecord, Subject};
use crate::core::transforms::{
    depth_key, format_ctime, format_depth, format_timestamp, key_depth, round_to, SITE_DECIMALS,
};

/// Identity of a recording site.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SiteKey {
    pub subject: Subject,
    pub hemisphere: Hemisphere,
    pub channel: usize,
    /// Depth in micrometres.
    pub depth_key: i64,
}

impl SiteKey {
    pub fn new(subject: Subject, hemisphere: Hemisphere, channel: usize, depth: f64) -> Self {
        Self {
            subject,
            hemisphere,
            channel,
            depth_key: depth_key(depth),
        }
    }

    pub fn depth(&self) -> f64 {
        key_depth(self.depth_key)
    }

    /// `F1808_L05_1.250`
    pub fn stem(&self) -> String {
        format!(
            "{}_{}{:02}_{}",
            self.subject,
            self.hemisphere,
            self.channel,
            format_depth(self.depth())
        )
    }

    /// Session list file, e.g. `F1808_L05_1.250.csv`.
    pub fn csv_file_name(&self) -> String {
        format!("{}.csv", self.stem())
    }

    /// Descriptor file, e.g. `F1808_L05_1.250mm.json`.
    pub fn json_file_name(&self) -> String {
        format!("{}mm.json", self.stem())
    }
}

/// A block recorded at a site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteSession {
    #[serde(rename = "Block")]
    pub block: String,
    #[serde(serialize_with = "serialize_timestamp")]
    pub datetime: NaiveDateTime,
}

impl From<&SessionRecord> for SiteSession {
    fn from(session: &SessionRecord) -> Self {
        Self {
            block: session.block.clone(),
            datetime: session.timestamp,
        }
    }
}

/// Group cross-referenced sessions into sites.
///
/// Channels without a resolved depth belong to no site.
pub fn partition_sites(
    sessions: &[CrossReferencedSession],
    num_channels: usize,
) -> BTreeMap<SiteKey, Vec<SiteSession>> {
    let mut sites: BTreeMap<SiteKey, Vec<SiteSession>> = BTreeMap::new();

    for row in sessions {
        for hemisphere in Hemisphere::ALL {
            for channel in 0..num_channels {
                if let Some(depth) = row.depth(hemisphere, channel) {
                    let key = SiteKey::new(row.session.subject.clone(), hemisphere, channel, depth);
                    sites.entry(key).or_default().push(SiteSession::from(&row.session));
                }
            }
        }
    }

    sites
}

/// JSON descriptor of one depth interval of one channel.
#[derive(Debug, Clone, Serialize)]
pub struct SiteDescriptor {
    #[serde(skip)]
    pub key: SiteKey,
    #[serde(rename = "Channel")]
    pub channel: usize,
    #[serde(rename = "Position")]
    pub position: f64,
    #[serde(rename = "Zero")]
    pub zero: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    pub depth: f64,
    #[serde(serialize_with = "serialize_ctime")]
    pub start_dt: NaiveDateTime,
    /// Written as `0` when unbounded.
    #[serde(serialize_with = "serialize_open_ctime")]
    pub end_dt: Option<NaiveDateTime>,
    /// Whole days, `0` when unbounded.
    pub duration: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocks: Option<Vec<SiteSession>>,
}

impl SiteDescriptor {
    pub fn file_name(&self) -> String {
        self.key.json_file_name()
    }
}

/// Source columns are emitted as numbers where they parse as such.
fn extra_value(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::from(i);
    }
    match raw.parse::<f64>() {
        Ok(f) if f.is_finite() => Value::from(f),
        _ => Value::String(raw.to_string()),
    }
}

/// Build the descriptor of one interval.
///
/// When `sessions` is given, the blocks of the same subject recorded within
/// `[start, end)` are listed.
pub fn site_descriptor(interval: &DepthInterval, sessions: Option<&[SessionRecord]>) -> SiteDescriptor {
    let record = &interval.record;
    let depth = round_to(interval.depth(), SITE_DECIMALS);

    let extra = record
        .extra
        .iter()
        .map(|(name, raw)| (name.clone(), extra_value(raw)))
        .collect();

    let blocks = sessions.map(|sessions| {
        sessions
            .iter()
            .filter(|s| s.subject == record.subject && interval.contains(s.timestamp))
            .map(SiteSession::from)
            .collect()
    });

    SiteDescriptor {
        key: SiteKey::new(record.subject.clone(), record.hemisphere, record.channel, depth),
        channel: record.channel,
        position: record.position,
        zero: record.zero,
        extra,
        depth,
        start_dt: interval.start,
        end_dt: interval.end,
        duration: interval.duration_days(),
        blocks,
    }
}

pub fn site_descriptors(
    intervals: &[DepthInterval],
    sessions: Option<&[SessionRecord]>,
) -> Vec<SiteDescriptor> {
    intervals
        .iter()
        .map(|interval| site_descriptor(interval, sessions))
        .collect()
}

fn serialize_timestamp<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_timestamp(ts))
}

fn serialize_ctime<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_ctime(ts))
}

fn serialize_open_ctime<S: Serializer>(
    ts: &Option<NaiveDateTime>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match ts {
        Some(ts) => serializer.serialize_str(&format_ctime(ts)),
        None => serializer.serialize_u8(0),
    }
}
