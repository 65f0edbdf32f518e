use crate::error::CliError;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Every "local day" is computed at this fixed offset (UTC+5), regardless of
/// the machine's timezone.
pub const LOCAL_UTC_OFFSET_SECS: i64 = 5 * 3600;

const MS_PER_DAY: i64 = 86_400_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CivilDate {
    y: i32,
    m: u32,
    d: u32,
}

fn is_valid_date(y: i32, m: u32, d: u32) -> bool {
    if !(1..=12).contains(&m) {
        return false;
    }
    if d < 1 {
        return false;
    }

    let dim = match m {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            let leap = (y % 4 == 0 && y % 100 != 0) || (y % 400 == 0);
            if leap { 29 } else { 28 }
        }
        _ => return false,
    };

    d <= dim
}

// Howard Hinnant's algorithm: days since 1970-01-01 (Unix epoch)
fn days_from_civil(mut y: i32, m: u32, d: u32) -> i32 {
    let m = m as i32;
    let d = d as i32;
    y -= if m <= 2 { 1 } else { 0 };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = m + if m > 2 { -3 } else { 9 };
    let doy = (153 * mp + 2) / 5 + d - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146097 + doe - 719468
}

fn civil_from_days(z: i32) -> CivilDate {
    let z = z + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = z - era * 146097; // [0, 146096]
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365; // [0, 399]
    let mut y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153; // [0, 11]
    let d = doy - (153 * mp + 2) / 5 + 1; // [1, 31]
    let m = mp + if mp < 10 { 3 } else { -9 }; // [1, 12]
    y += if m <= 2 { 1 } else { 0 };

    CivilDate {
        y,
        m: m as u32,
        d: d as u32,
    }
}

impl CivilDate {
    pub fn new(y: i32, m: u32, d: u32) -> Option<Self> {
        if is_valid_date(y, m, d) {
            Some(Self { y, m, d })
        } else {
            None
        }
    }

    /// For date literals that are known to be valid.
    pub const fn ymd(y: i32, m: u32, d: u32) -> Self {
        Self { y, m, d }
    }

    /// Strict `YYYY-MM-DD`.
    pub fn parse_iso(s: &str) -> Option<Self> {
        let ss = s.trim();
        if ss.len() != 10 {
            return None;
        }
        let bytes = ss.as_bytes();
        if bytes[4] != b'-' || bytes[7] != b'-' {
            return None;
        }
        let y: i32 = ss[0..4].parse().ok()?;
        let m: u32 = ss[5..7].parse().ok()?;
        let d: u32 = ss[8..10].parse().ok()?;
        Self::new(y, m, d)
    }

    pub fn day_number(&self) -> i32 {
        days_from_civil(self.y, self.m, self.d)
    }

    pub fn from_day_number(days: i32) -> Self {
        civil_from_days(days)
    }

    pub fn add_days(&self, delta_days: i32) -> Self {
        civil_from_days(self.day_number() + delta_days)
    }

    /// Whole days from `self` to `later` (negative when `later` is earlier).
    pub fn days_until(&self, later: &CivilDate) -> i32 {
        later.day_number() - self.day_number()
    }

    /// Local midnight (UTC+5) of this date, as Unix milliseconds.
    pub fn local_midnight_unix_ms(&self) -> i64 {
        self.day_number() as i64 * MS_PER_DAY - LOCAL_UTC_OFFSET_SECS * 1000
    }
}

impl fmt::Display for CivilDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.y, self.m, self.d)
    }
}

impl TryFrom<String> for CivilDate {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        CivilDate::parse_iso(&s).ok_or_else(|| format!("invalid date: {}", s))
    }
}

impl From<CivilDate> for String {
    fn from(d: CivilDate) -> Self {
        d.to_string()
    }
}

pub fn parse_date(s: &str, label: &str) -> Result<CivilDate, CliError> {
    CivilDate::parse_iso(s).ok_or_else(|| CliError::usage(format!("Invalid {}: {}", label, s)))
}

/// Calendar date of an instant, as seen at UTC+5.
pub fn local_date_from_unix_ms(unix_ms: i64) -> CivilDate {
    let shifted = unix_ms + LOCAL_UTC_OFFSET_SECS * 1000;
    CivilDate::from_day_number(shifted.div_euclid(MS_PER_DAY) as i32)
}

pub fn system_now_unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
