use std::sync::LazyLock;

use regex::Regex;

use crate::calendar::DAY;

/// A clock-time interval within a single day, e.g., `09:00-17:00`.
///
/// Both ends are inclusive: `09:00-17:00` contains `17:00:00` but not
/// `17:00:01`. The end may be written as `24:00` to cover the rest of the
/// day. Intervals never wrap around midnight. An overnight window is written
/// as two intervals, e.g., `22:00-24:00,00:00-06:00`.
///
/// A time range that failed to parse (or that is out of bounds) is kept
/// around so that it can be reported, but it never contains any time.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Timerange {
    raw: String,
    // seconds since midnight, inclusive on both ends
    span: Option<(i64, i64)>,
}

impl Timerange {
    /// Parse a single `HH:MM-HH:MM` interval.
    pub fn new(raw: &str) -> Timerange {
        static RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"^(\d{1,2}):(\d{2})-(\d{1,2}):(\d{2})$").unwrap()
        });

        let raw = raw.trim();
        let span = RE.captures(raw).and_then(|caps| {
            let number = |i: usize| caps[i].parse::<i64>().ok();
            let (hstart, mstart) = (number(1)?, number(2)?);
            let (hend, mend) = (number(3)?, number(4)?);
            if hstart > 24 || hend > 24 || mstart > 60 || mend > 60 {
                return None;
            }
            let start = hstart * 3600 + mstart * 60;
            let end = hend * 3600 + mend * 60;
            if start >= DAY || end > DAY || start > end {
                return None;
            }
            Some((start, end))
        });
        Timerange { raw: raw.to_string(), span }
    }

    /// Parse a comma separated list of intervals.
    pub fn parse_list(ranges: &str) -> Vec<Timerange> {
        ranges.split(',').map(Timerange::new).collect()
    }

    /// Returns true when this interval is well formed.
    pub fn is_correct(&self) -> bool {
        self.span.is_some()
    }

    /// Returns the inclusive `(start, end)` bounds of this interval in
    /// seconds since midnight, or `None` when it is malformed.
    pub fn span(&self) -> Option<(i64, i64)> {
        self.span
    }

    /// Returns true when the given second of the day falls in this interval.
    pub fn contains(&self, second: i64) -> bool {
        self.span.is_some_and(|(start, end)| start <= second && second <= end)
    }
}

impl std::fmt::Display for Timerange {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}
