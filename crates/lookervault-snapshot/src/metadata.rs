use chrono::{DateTime, TimeZone, Utc};

use crate::error::SnapshotError;

/// Length of `YYYY-MM-DDTHH-MM-SS`.
const STAMP_LEN: usize = 19;

/// Describes one uploaded content-store snapshot. The filename
/// (`{prefix}-YYYY-MM-DDTHH-MM-SS.db[.gz]`) is itself the reference used by
/// `SnapshotSink::download`/`delete`.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotMetadata {
    pub filename: String,
    pub prefix: String,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub crc32c: u32,
    pub gzip: bool,
}

impl SnapshotMetadata {
    pub fn filename_for(prefix: &str, created_at: DateTime<Utc>, gzip: bool) -> String {
        let stamp = created_at.format("%Y-%m-%dT%H-%M-%S");
        if gzip {
            format!("{prefix}-{stamp}.db.gz")
        } else {
            format!("{prefix}-{stamp}.db")
        }
    }

    /// Recovers `prefix`, `created_at`, and `gzip` from a filename produced
    /// by [`Self::filename_for`]. The timestamp itself contains `-`
    /// separators, so the prefix is recovered by length rather than by
    /// splitting on the last `-`.
    pub fn parse_filename(filename: &str) -> Result<(String, DateTime<Utc>, bool), SnapshotError> {
        let malformed = || SnapshotError::Malformed(filename.to_string());

        let (stem, gzip) = match filename.strip_suffix(".db.gz") {
            Some(stem) => (stem, true),
            None => (filename.strip_suffix(".db").ok_or_else(malformed)?, false),
        };

        if stem.len() < STAMP_LEN + 1 {
            return Err(malformed());
        }
        let split_at = stem.len() - STAMP_LEN;
        let prefix = stem[..split_at - 1].to_string();
        let stamp = &stem[split_at..];

        let naive = chrono::NaiveDateTime::parse_from_str(stamp, "%Y-%m-%dT%H-%M-%S")
            .map_err(|_| malformed())?;
        let created_at = Utc.from_utc_datetime(&naive);
        Ok((prefix, created_at, gzip))
    }
}
