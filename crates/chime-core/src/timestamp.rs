//! UTC timestamp helpers.
//!
//! Timestamps travel as RFC 3339 strings with millisecond precision,
//! the same shape clients already parse.

use chrono::{SecondsFormat, Utc};

/// Current UTC time as an RFC 3339 string, e.g. `2026-08-30T12:00:00.000Z`.
#[must_use]
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ends_with_utc_designator() {
        assert!(now_rfc3339().ends_with('Z'));
    }

    #[test]
    fn parses_back_as_rfc3339() {
        let ts = now_rfc3339();
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
