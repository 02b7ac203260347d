//! Timestamp-derived names for versioned deploy directories.
//!
//! The layout matches directories already present on the content host:
//! the ISO-8601 date immediately followed by the time, with `:` replaced
//! by `_` (e.g. `2024-05-0112_30_45`). Second resolution only, so two runs
//! within the same second share a name.

use chrono::{DateTime, Utc};

const SEGMENT_FORMAT: &str = "%Y-%m-%d%H_%M_%S";

/// Path segment for a deploy started at `now`.
pub fn name(now: DateTime<Utc>) -> String {
    now.format(SEGMENT_FORMAT).to_string()
}

/// Remote directory for a segment, e.g. `/content/b2b-portal/2024-05-0112_30_45`.
pub fn dest_folder(remote_root: &str, segment: &str) -> String {
    format!("{}/{}", remote_root.trim_end_matches('/'), segment)
}

/// Public URL under which the versioned directory is served.
pub fn absolute_path(cdn_base: &str, dest_folder: &str) -> String {
    format!(
        "{}/{}",
        cdn_base.trim_end_matches('/'),
        dest_folder.trim_start_matches('/')
    )
}

/// True when every character is allowed in a remote path segment.
pub fn is_path_safe(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
