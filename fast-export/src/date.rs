//! Timezone-aware dates, accepted in any of three textual formats and regenerable as any
//! of them.
//!

use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, FixedOffset, TimeZone};
use chrono_tz::Tz;

use crate::error::DateError;

const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];
const DAY_NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// A point in time together with the UTC offset it was recorded under.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Date {
    instant: DateTime<FixedOffset>,
}

impl Date {
    /// Parses a date string in any of the three accepted formats.
    pub fn parse(s: &str) -> Result<Date, DateError> {
        let s = s.trim();
        if let Some(d) = parse_dump(s) {
            return Ok(d);
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(Date { instant: dt });
        }
        if let Some(d) = parse_git_log(s) {
            return Ok(d);
        }
        Err(DateError(s.as_bytes().to_vec()))
    }

    pub fn from_fixed_offset(instant: DateTime<FixedOffset>) -> Date {
        Date { instant }
    }

    pub fn instant(&self) -> DateTime<FixedOffset> {
        self.instant
    }

    /// `<unix-seconds> ±HHMM`, the form fast-import streams use.
    pub fn to_dump(&self) -> String {
        format!("{} {}", self.instant.timestamp(), offset_hhmm(&self.instant))
    }

    pub fn to_rfc3339(&self) -> String {
        self.instant.to_rfc3339()
    }

    /// `Day Mon DD HH:MM:SS ±HHMM YYYY`, as used in `git log` output.
    pub fn to_git_log(&self) -> String {
        let dt = self.instant;
        use chrono::Datelike;
        use chrono::Timelike;
        format!(
            "{} {} {:02} {:02}:{:02}:{:02} {} {:04}",
            DAY_NAMES[dt.weekday().num_days_from_monday() as usize],
            MONTH_NAMES[dt.month0() as usize],
            dt.day(),
            dt.hour(),
            dt.minute(),
            dt.second(),
            offset_hhmm(&dt),
            dt.year(),
        )
    }

    /// Recomputes this date's textual offset against `tz` at the same instant,
    /// preserving the instant itself.
    pub fn with_zone(&self, tz: Tz) -> Date {
        let local = self.instant.with_timezone(&tz);
        let offset = *local.offset();
        Date { instant: self.instant.with_timezone(&offset.fix()) }
    }
}

impl Display for Date {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_dump())
    }
}

fn offset_hhmm(dt: &DateTime<FixedOffset>) -> String {
    let offset_secs = dt.offset().local_minus_utc();
    let sign = if offset_secs < 0 { '-' } else { '+' };
    let abs = offset_secs.unsigned_abs();
    format!("{sign}{:02}{:02}", abs / 3600, (abs % 3600) / 60)
}

fn parse_offset(s: &str) -> Option<FixedOffset> {
    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => return None,
    };
    if rest.len() != 4 || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hh: i32 = rest[0..2].parse().ok()?;
    let mm: i32 = rest[2..4].parse().ok()?;
    FixedOffset::east_opt(sign * (hh * 3600 + mm * 60))
}

fn parse_dump(s: &str) -> Option<Date> {
    let mut parts = s.split_whitespace();
    let secs: i64 = parts.next()?.parse().ok()?;
    let offset = parse_offset(parts.next()?)?;
    if parts.next().is_some() {
        return None;
    }
    let instant = offset.timestamp_opt(secs, 0).single()?;
    Some(Date { instant })
}

fn parse_git_log(s: &str) -> Option<Date> {
    // "Day Mon DD HH:MM:SS +HHMM YYYY"
    let parts: Vec<&str> = s.split_whitespace().collect();
    let [_day, mon, day, time, offset, year] = parts[..] else {
        return None;
    };
    let month = MONTH_NAMES.iter().position(|m| *m == mon)? as u32 + 1;
    let day: u32 = day.parse().ok()?;
    let year: i32 = year.parse().ok()?;
    let mut t = time.split(':');
    let hour: u32 = t.next()?.parse().ok()?;
    let minute: u32 = t.next()?.parse().ok()?;
    let second: u32 = t.next()?.parse().ok()?;
    if t.next().is_some() {
        return None;
    }
    let offset = parse_offset(offset)?;
    let instant = offset
        .with_ymd_and_hms(year, month, day, hour, minute, second)
        .single()?;
    Some(Date { instant })
}
