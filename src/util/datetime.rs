use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Formats accepted with an explicit numeric offset.
const OFFSET_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S %:z",
    "%Y-%m-%d %H:%M:%S %z",
    "%b %d %Y %H:%M:%S %z",
    "%b %d %Y %H:%M %z",
];

/// Formats without an offset; read as wall-clock time of the configured zone.
const NAIVE_FORMATS: [&str; 8] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%b %d %Y %H:%M:%S",
    "%b %d %Y %H:%M",
    "%m/%d/%Y, %I:%M:%S %p",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y, %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

/// Whether two instants fall on the same calendar date in `tz`.
///
/// This compares year, month and day after conversion, not a 24 hour window.
pub fn same_calendar_day(a: DateTime<Utc>, b: DateTime<Utc>, tz: &Tz) -> bool {
    let a = a.with_timezone(tz);
    let b = b.with_timezone(tz);
    a.year() == b.year() && a.month() == b.month() && a.day() == b.day()
}

/// Renders `ts` as wall-clock time in `tz`, e.g. `Jan 5 2024 10:00:00 MST`.
///
/// [`parse_timestamp`] reads this form back.
pub fn render(ts: DateTime<Utc>, tz: &Tz) -> String {
    ts.with_timezone(tz).format("%b %-d %Y %H:%M:%S %Z").to_string()
}

/// Renders `ts` in `tz` in a form spreadsheets recognise as a date.
pub fn render_plain(ts: DateTime<Utc>, tz: &Tz) -> String {
    ts.with_timezone(tz).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Parses a timestamp written by this program or by a person into the sheet.
///
/// Text without a numeric offset is taken as wall-clock time in `tz`; a
/// trailing zone abbreviation such as `MST` is dropped first since
/// abbreviations are ambiguous. Numeric abbreviations such as `-03` or
/// `+0545`, which `%Z` prints for many zones, are applied as offsets.
/// Returns `None` when nothing matches.
pub fn parse_timestamp(text: &str, tz: &Tz) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(text, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    let (text, offset) = split_zone_suffix(text);
    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())?;

    let local = match offset {
        Some(offset) => offset.from_local_datetime(&naive).single(),
        None => tz
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.fixed_offset()),
    };
    local.map(|dt| dt.with_timezone(&Utc))
}

/// Splits a trailing zone token off `text`: an alphabetic abbreviation is
/// dropped, a numeric one comes back as its offset.
fn split_zone_suffix(text: &str) -> (&str, Option<FixedOffset>) {
    let Some((head, last)) = text.rsplit_once(char::is_whitespace) else {
        return (text, None);
    };

    if (2..=5).contains(&last.len())
        && last.chars().all(|c| c.is_ascii_alphabetic())
        && !last.eq_ignore_ascii_case("AM")
        && !last.eq_ignore_ascii_case("PM")
    {
        return (head.trim_end(), None);
    }

    match numeric_offset(last) {
        Some(offset) => (head.trim_end(), Some(offset)),
        None => (text, None),
    }
}

/// `+08`, `-03`, `+0545`
fn numeric_offset(token: &str) -> Option<FixedOffset> {
    let sign = match token.as_bytes().first()? {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let digits = &token[1..];
    if !matches!(digits.len(), 2 | 4) || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = if digits.len() == 4 {
        digits[2..].parse().ok()?
    } else {
        0
    };
    if hours > 23 || minutes > 59 {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
