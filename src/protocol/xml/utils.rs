use std::io::Write;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};

use crate::Error;

/// Canonical wire spelling of `dateTime.iso8601`: compact date, no zone suffix.
pub const ISO8601: &str = "%Y%m%dT%H:%M:%S";

/// Hyphenated date spelling accepted on decode.
pub const ISO8601_HYPHENATED: &str = "%Y-%m-%dT%H:%M:%S";

/// Writes `text` with `&`, `<` and `>` replaced by their entities.
pub fn write_escaped(text: &str, dest: &mut impl Write) -> std::io::Result<()> {
    let mut last = 0;
    for (i, b) in text.bytes().enumerate() {
        let entity: &[u8] = match b {
            b'&' => b"&amp;",
            b'<' => b"&lt;",
            b'>' => b"&gt;",
            _ => continue,
        };
        dest.write_all(&text.as_bytes()[last..i])?;
        dest.write_all(entity)?;
        last = i + 1;
    }
    dest.write_all(&text.as_bytes()[last..])
}

/// Parses one of the eight accepted datetime spellings.
///
/// Dates may be compact (`20131209`) or hyphenated (`2013-12-09`), followed
/// by `Thh:mm:ss` and then nothing, `Z`, or an explicit `+HH:MM`/`-HH:MM`.
/// A missing zone means UTC.
pub fn parse_datetime(text: &str) -> Result<DateTime<FixedOffset>, Error> {
    let text = text.trim();
    let utc = FixedOffset::east_opt(0).ok_or_else(|| Error::parse("invalid UTC offset"))?;

    for layout in [ISO8601, ISO8601_HYPHENATED] {
        let naive_text = text.strip_suffix('Z').unwrap_or(text);
        if let Ok(naive) = NaiveDateTime::parse_from_str(naive_text, layout) {
            return Ok(utc.from_utc_datetime(&naive));
        }
        if let Ok(datetime) = DateTime::parse_from_str(text, &format!("{layout}%:z")) {
            return Ok(datetime);
        }
    }

    Err(Error::parse(format!("unrecognized dateTime.iso8601 value {text:?}")))
}
