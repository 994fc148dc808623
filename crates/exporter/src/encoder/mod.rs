use core::fmt;

use chrono::DateTime;
use chrono::Utc;

use crate::record::ResourceRecord;

pub mod influx;

pub use self::influx::InfluxEncoder;

pub const MEASUREMENT: &str = "storagebox_stats";

/// Longest tag value written, in code points, escapes included.
pub const TAG_VALUE_LIMIT: usize = 1024;

const ELLIPSIS: &str = "...";

/// Represents a field value that can be encoded in metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue {
    Integer(i64),
    Boolean(bool),
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Integer(value.timestamp())
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(i) => write!(f, "{i}i"),
            FieldValue::Boolean(b) => write!(f, "{b}"),
        }
    }
}

/// Trait for encoding metrics data into a text line format
pub trait MetricsEncoder: Send + Sync {
    /// Encode one newline-terminated record. Tags with empty values are skipped,
    /// `fields` must not be empty.
    fn encode_metrics(
        &self,
        measurement: &str,
        tags: &[(&str, &str)],
        fields: &[(&str, FieldValue)],
        timestamp: i64,
    ) -> String;

    /// Encode one storage box observed at `observed_at`
    fn encode_record(&self, record: &ResourceRecord, observed_at: DateTime<Utc>) -> String {
        let id = record.id.to_string();
        let tags = [
            ("id", id.as_str()),
            ("name", record.name.as_str()),
            ("type", record.kind.as_str()),
            ("status", record.status.as_str()),
            ("location", record.location.as_str()),
            ("server", record.server.as_str()),
            ("host", record.host.as_str()),
        ];

        let mut fields: Vec<(&str, FieldValue)> = vec![
            ("size", record.capacity_bytes.into()),
            ("used", record.used_bytes.into()),
            ("used_data", record.used_data_bytes.into()),
            ("used_snapshot", record.used_snapshot_bytes.into()),
            ("samba", record.access.samba.into()),
            ("ssh", record.access.ssh.into()),
            ("webdav", record.access.webdav.into()),
            ("zfs", record.access.zfs.into()),
            ("external_reachability", record.access.reachable_externally.into()),
        ];
        if let Some(created) = record.created {
            fields.push(("created", created.into()));
        }
        if let Some(paid_until) = record.paid_until {
            fields.push(("paid_until", paid_until.into()));
        }

        self.encode_metrics(MEASUREMENT, &tags, &fields, observed_at.timestamp())
    }
}

/// Escape a tag value and bound its length.
///
/// Commas, equals signs and spaces get a backslash unless one already precedes
/// them, so escaping twice yields the same text. A trailing unpaired backslash
/// is doubled so it cannot swallow the separator after the value. Values
/// longer than [`TAG_VALUE_LIMIT`] code points after escaping are cut and end
/// in `...`.
pub fn escape_tag_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 1);
    let mut after_backslash = false;
    for ch in value.chars() {
        if matches!(ch, ',' | '=' | ' ') && !after_backslash {
            escaped.push('\\');
        }
        escaped.push(ch);
        after_backslash = ch == '\\' && !after_backslash;
    }
    if after_backslash {
        escaped.push('\\');
    }

    if escaped.chars().count() <= TAG_VALUE_LIMIT {
        return escaped;
    }
    let mut truncated: String = escaped
        .chars()
        .take(TAG_VALUE_LIMIT - ELLIPSIS.len())
        .collect();
    truncated.push_str(ELLIPSIS);
    truncated
}
