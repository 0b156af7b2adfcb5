//! Timestamp rendering for snapshot file names and log lines.

use chrono::{DateTime, SecondsFormat, Utc};

/// Render a timestamp for use inside a file name.
///
/// ISO 8601 at second precision with the `Z` designator and every `:`
/// replaced by `-`, e.g. `2023-05-01T00-15-30Z`. Fields are zero padded, so
/// names sort lexically in time order.
#[must_use]
pub fn format_for_filename(value: DateTime<Utc>) -> String {
    value.format("%Y-%m-%dT%H-%M-%SZ").to_string()
}

/// Render a timestamp for log output, e.g. `2023-05-01T00:15:30+00:00`.
#[must_use]
pub fn format_for_log(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// File name for the snapshot of `project` whose run started at `start`.
#[must_use]
pub fn snapshot_file_name(project: &str, start: DateTime<Utc>, extension: &str) -> String {
    format!("{project}-{}.{extension}", format_for_filename(start))
}
