use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};

// Observations are stamped in Moscow civil time (UTC+3, no DST).
const MSK_OFFSET_SECS: i32 = 3 * 3600;

const WRITE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f%:z";

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d.%m.%Y"];

const MSK: FixedOffset = match FixedOffset::east_opt(MSK_OFFSET_SECS) {
    Some(offset) => offset,
    None => panic!("offset out of range"),
};

pub fn msk_offset() -> FixedOffset {
    MSK
}

pub fn msk_now() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&msk_offset())
}

/// Parses a stored timestamp and normalizes it to the UTC+3 offset.
///
/// Values without an offset are taken as Moscow civil time; bare dates map to
/// midnight.
pub fn parse_checked_at(raw: &str) -> Option<DateTime<FixedOffset>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let msk = msk_offset();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&msk));
    }

    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&msk));
        }
    }

    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return msk.from_local_datetime(&naive).single();
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            let naive = date.and_hms_opt(0, 0, 0)?;
            return msk.from_local_datetime(&naive).single();
        }
    }

    None
}

pub fn format_checked_at(dt: &DateTime<FixedOffset>) -> String {
    dt.with_timezone(&msk_offset()).format(WRITE_FORMAT).to_string()
}
