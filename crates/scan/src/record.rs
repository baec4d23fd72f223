//! The per-file message model.
//!
//! A [`FileRecord`] is both the in-memory result of metadata extraction and
//! the JSON document published for each file. Field names are part of the
//! wire contract with consumers; do not add fields without bumping it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use time::OffsetDateTime;
use time::error::ComponentRange;

/// Metadata for a single regular file discovered during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileRecord {
    /// Absolute path of the file
    pub path: PathBuf,
    /// Base filename, derived from `path`
    pub name: String,
    /// File size in bytes
    pub size_bytes: u64,
    /// Last modification time (UTC, microsecond precision)
    #[serde(with = "timestamp")]
    pub modified_ts: OffsetDateTime,
}
impl FileRecord {
    /// Build a record, deriving `name` from `path` and truncating the
    /// modification time to whole microseconds so the value survives a trip
    /// through the wire format unchanged.
    ///
    /// Fails only if the truncated time falls outside what [`OffsetDateTime`]
    /// can represent.
    pub fn new(path: impl Into<PathBuf>, size_bytes: u64, modified: OffsetDateTime) -> Result<Self, ComponentRange> {
        let path = path.into();
        let name = base_name(&path);
        let modified_ts = truncate_to_micros(modified)?;
        Ok(Self { path, name, size_bytes, modified_ts })
    }

    /// Encode the record as the JSON wire message.
    ///
    /// Fails if the path is not valid UTF-8.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Decode a JSON wire message.
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

fn base_name(path: &Path) -> String {
    path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default()
}

/// Rounds towards negative infinity; the result is always UTC.
fn truncate_to_micros(ts: OffsetDateTime) -> Result<OffsetDateTime, ComponentRange> {
    let micros = ts.unix_timestamp_nanos().div_euclid(1_000);
    OffsetDateTime::from_unix_timestamp_nanos(micros * 1_000)
}

/// Convert a filesystem timestamp. `None` when it lies outside the years
/// `time` can represent.
pub(crate) fn utc_from_system_time(ts: SystemTime) -> Option<OffsetDateTime> {
    let nanos = match ts.duration_since(UNIX_EPOCH) {
        Ok(after) => i128::try_from(after.as_nanos()).ok()?,
        Err(before) => -i128::try_from(before.duration().as_nanos()).ok()?,
    };
    OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()
}

/// Serde adapter for `modified_ts`: `YYYY-MM-DDTHH:MM:SS.ffffffZ`.
pub(crate) mod timestamp {
    use serde::de::Error as _;
    use serde::ser::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use time::format_description::BorrowedFormatItem;
    use time::macros::format_description;
    use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

    const FORMAT: &[BorrowedFormatItem<'static>] =
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z");

    pub fn serialize<S: Serializer>(ts: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        let formatted = ts.to_offset(UtcOffset::UTC).format(FORMAT).map_err(S::Error::custom)?;
        serializer.serialize_str(&formatted)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<OffsetDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        PrimitiveDateTime::parse(&raw, FORMAT).map(PrimitiveDateTime::assume_utc).map_err(D::Error::custom)
    }
}
