//! HTTP conditional request module
//!
//! `Last-Modified` generation and `If-Modified-Since` handling.

use chrono::{DateTime, Utc};
use std::time::SystemTime;

/// Format a timestamp as an IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`
pub fn format_http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// Parse an HTTP date header value
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Check whether the client's cached copy is still current
///
/// `If-Modified-Since` is ignored when the client also sent `If-None-Match`,
/// since entity tags are not generated here. The modification time is
/// compared at whole-second precision.
///
/// # Returns
/// Returns true if a 304 should be sent
pub fn is_not_modified(
    if_modified_since: Option<&str>,
    has_if_none_match: bool,
    modified: SystemTime,
) -> bool {
    if has_if_none_match {
        return false;
    }
    let Some(since) = if_modified_since.and_then(parse_http_date) else {
        return false;
    };
    DateTime::<Utc>::from(modified).timestamp() <= since.timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    // Sun, 06 Nov 1994 08:49:37 GMT
    const RFC_EXAMPLE: u64 = 784_111_777;

    #[test]
    fn test_format_http_date() {
        let time = UNIX_EPOCH + Duration::from_secs(RFC_EXAMPLE);
        assert_eq!(format_http_date(time), "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[test]
    fn test_parse_http_date() {
        let parsed = parse_http_date("Sun, 06 Nov 1994 08:49:37 GMT").unwrap();
        assert_eq!(parsed.timestamp(), 784_111_777);
        assert!(parse_http_date("yesterday").is_none());
    }

    #[test]
    fn test_not_modified() {
        let modified = UNIX_EPOCH + Duration::from_millis(RFC_EXAMPLE * 1000 + 250);
        let header = Some("Sun, 06 Nov 1994 08:49:37 GMT");
        assert!(is_not_modified(header, false, modified));
        assert!(is_not_modified(
            Some("Mon, 07 Nov 1994 08:49:37 GMT"),
            false,
            modified
        ));
    }

    #[test]
    fn test_modified_after_header() {
        let modified = UNIX_EPOCH + Duration::from_secs(RFC_EXAMPLE + 1);
        assert!(!is_not_modified(
            Some("Sun, 06 Nov 1994 08:49:37 GMT"),
            false,
            modified
        ));
    }

    #[test]
    fn test_ignored_cases() {
        let modified = UNIX_EPOCH + Duration::from_secs(RFC_EXAMPLE);
        let header = Some("Sun, 06 Nov 1994 08:49:37 GMT");
        assert!(!is_not_modified(header, true, modified));
        assert!(!is_not_modified(None, false, modified));
        assert!(!is_not_modified(Some("not a date"), false, modified));
    }
}
