// The grammar for time period entries.
//
// An entry is something like `monday 09:00-17:00` or `day 1 - 15 / 5
// 00:00-24:00`. There are thirteen recognized forms. They overlap quite a bit
// (a form-12 pattern matches many form-9 entries, for example), so they are
// tried in order from most to least specific and the first one that accepts
// the entry wins. A form can match textually and still decline the entry
// when its keywords don't classify, in which case the next form gets a shot.

use std::sync::LazyLock;

use jiff::civil::Weekday;
use regex::{Captures, Regex};

use crate::{
    calendar,
    daterange::{
        CalendarDay, DateKind, Daterange, Keyword, MonthOffset, MonthWeekday,
        NthWeekday,
    },
};

/// A single form of the grammar. It returns `None` when it declines.
type Form = fn(&str) -> Option<Daterange>;

const FORMS: [Form; 13] = [
    calendar_range_skip,
    calendar_day_skip,
    calendar_range,
    calendar_day,
    month_week_day_range_skip,
    keyword_range_skip,
    single_keyword_range_skip,
    month_week_day_range,
    single_keyword_range,
    keyword_range,
    month_week_day,
    keyword_day,
    standard,
];

/// Resolve a single time period entry into a recurrence rule.
///
/// Runs of whitespace are collapsed and the entry is lowercased before
/// matching. `None` is returned when no form of the grammar accepts the
/// entry.
pub fn resolve(entry: &str) -> Option<Daterange> {
    let line = normalize(entry);
    let dr = FORMS.iter().find_map(|form| form(&line));
    match dr {
        Some(ref dr) => {
            log::trace!("resolved `{line}` as {}", dr.kind().name())
        }
        None => log::trace!("no form matched `{line}`"),
    }
    dr
}

fn normalize(entry: &str) -> String {
    entry.split_whitespace().collect::<Vec<&str>>().join(" ").to_lowercase()
}

/// `YYYY-MM-DD - YYYY-MM-DD / N T`
fn calendar_range_skip(line: &str) -> Option<Daterange> {
    static RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"^(\d{4})-(\d{2})-(\d{2}) - (\d{4})-(\d{2})-(\d{2}) / (\d+) ([0-9:, -]+)$",
        )
        .unwrap()
    });
    let caps = RE.captures(line)?;
    let kind = DateKind::CalendarDate {
        start: calendar_day_at(&caps, 1)?,
        end: calendar_day_at(&caps, 4)?,
    };
    Some(Daterange::new(kind, number(&caps, 7)?, &caps[8]))
}

/// `YYYY-MM-DD / N T`
///
/// This is a single day. The skip interval has nothing to skip over.
fn calendar_day_skip(line: &str) -> Option<Daterange> {
    static RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^(\d{4})-(\d{2})-(\d{2}) / (\d+) ([0-9:, -]+)$").unwrap()
    });
    let caps = RE.captures(line)?;
    let day = calendar_day_at(&caps, 1)?;
    let kind = DateKind::CalendarDate { start: day, end: day };
    Some(Daterange::new(kind, number(&caps, 4)?, &caps[5]))
}

/// `YYYY-MM-DD - YYYY-MM-DD T`
fn calendar_range(line: &str) -> Option<Daterange> {
    static RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"^(\d{4})-(\d{2})-(\d{2}) - (\d{4})-(\d{2})-(\d{2}) ([0-9:, -]+)$",
        )
        .unwrap()
    });
    let caps = RE.captures(line)?;
    let kind = DateKind::CalendarDate {
        start: calendar_day_at(&caps, 1)?,
        end: calendar_day_at(&caps, 4)?,
    };
    Some(Daterange::new(kind, 0, &caps[7]))
}

/// `YYYY-MM-DD T`
fn calendar_day(line: &str) -> Option<Daterange> {
    static RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^(\d{4})-(\d{2})-(\d{2}) ([0-9:, -]+)$").unwrap()
    });
    let caps = RE.captures(line)?;
    let day = calendar_day_at(&caps, 1)?;
    let kind = DateKind::CalendarDate { start: day, end: day };
    Some(Daterange::new(kind, 0, &caps[4]))
}

/// `WD N MON - WD N MON / N T`
fn month_week_day_range_skip(line: &str) -> Option<Daterange> {
    static RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"^([a-z]+) ([\d-]+) ([a-z]+) - ([a-z]+) ([\d-]+) ([a-z]+) / (\d+) ([0-9:, -]+)$",
        )
        .unwrap()
    });
    let caps = RE.captures(line)?;
    let kind = DateKind::MonthWeekDay {
        start: month_weekday(&caps, 1)?,
        end: month_weekday(&caps, 4)?,
    };
    Some(Daterange::new(kind, number(&caps, 7)?, &caps[8]))
}

/// `K N - K N / N T`
fn keyword_range_skip(line: &str) -> Option<Daterange> {
    static RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"^([a-z]+) ([\d-]+) - ([a-z]+) ([\d-]+) / (\d+) ([0-9:, -]+)$",
        )
        .unwrap()
    });
    let caps = RE.captures(line)?;
    let kind = classify_range(
        (&caps[1], number(&caps, 2)?),
        (&caps[3], number(&caps, 4)?),
    )?;
    Some(Daterange::new(kind, number(&caps, 5)?, &caps[6]))
}

/// `K N - N / N T`
fn single_keyword_range_skip(line: &str) -> Option<Daterange> {
    static RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^([a-z]+) ([\d-]+) - ([\d-]+) / (\d+) ([0-9:, -]+)$")
            .unwrap()
    });
    let caps = RE.captures(line)?;
    let kind = classify_range(
        (&caps[1], number(&caps, 2)?),
        (&caps[1], number(&caps, 3)?),
    )?;
    Some(Daterange::new(kind, number(&caps, 4)?, &caps[5]))
}

/// `WD N MON - WD N MON T`
fn month_week_day_range(line: &str) -> Option<Daterange> {
    static RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"^([a-z]+) ([\d-]+) ([a-z]+) - ([a-z]+) ([\d-]+) ([a-z]+) ([0-9:, -]+)$",
        )
        .unwrap()
    });
    let caps = RE.captures(line)?;
    let kind = DateKind::MonthWeekDay {
        start: month_weekday(&caps, 1)?,
        end: month_weekday(&caps, 4)?,
    };
    Some(Daterange::new(kind, 0, &caps[7]))
}

/// `K N - N T`
fn single_keyword_range(line: &str) -> Option<Daterange> {
    static RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^([a-z]+) ([\d-]+) - ([\d-]+) ([0-9:, -]+)$").unwrap()
    });
    let caps = RE.captures(line)?;
    let kind = classify_range(
        (&caps[1], number(&caps, 2)?),
        (&caps[1], number(&caps, 3)?),
    )?;
    Some(Daterange::new(kind, 0, &caps[4]))
}

/// `K N - K N T`
fn keyword_range(line: &str) -> Option<Daterange> {
    static RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^([a-z]+) ([\d-]+) - ([a-z]+) ([\d-]+) ([0-9:, -]+)$")
            .unwrap()
    });
    let caps = RE.captures(line)?;
    let kind = classify_range(
        (&caps[1], number(&caps, 2)?),
        (&caps[3], number(&caps, 4)?),
    )?;
    Some(Daterange::new(kind, 0, &caps[5]))
}

/// `WD N MON T`
///
/// Unlike the range forms, both the weekday and the month must be
/// recognized here.
fn month_week_day(line: &str) -> Option<Daterange> {
    static RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^([a-z]+) ([\d-]+) ([a-z]+) ([0-9:, -]+)$").unwrap()
    });
    let caps = RE.captures(line)?;
    let day = MonthWeekday {
        weekday: Keyword::Known(calendar::weekday_by_name(&caps[1])?),
        nth: number(&caps, 2)?,
        month: Keyword::Known(calendar::month_by_name(&caps[3])?),
    };
    let kind = DateKind::MonthWeekDay { start: day.clone(), end: day };
    Some(Daterange::new(kind, 0, &caps[4]))
}

/// `K N T`
fn keyword_day(line: &str) -> Option<Daterange> {
    static RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^([a-z]+) ([\d-]+) ([0-9:, -]+)$").unwrap()
    });
    let caps = RE.captures(line)?;
    let n = number(&caps, 2)?;
    let kind = classify_range((&caps[1], n), (&caps[1], n))?;
    Some(Daterange::new(kind, 0, &caps[3]))
}

/// `WD T`
fn standard(line: &str) -> Option<Daterange> {
    static RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^([a-z]+) ([0-9:, -]+)$").unwrap());
    let caps = RE.captures(line)?;
    let weekday = calendar::weekday_by_name(&caps[1])?;
    Some(Daterange::new(DateKind::Standard { weekday }, 0, &caps[2]))
}

/// What a keyword in a `K N` pair refers to.
#[derive(Clone, Copy, Debug)]
enum Class {
    Weekday(Weekday),
    Month(i8),
    Day,
}

impl Class {
    fn of(keyword: &str) -> Option<Class> {
        if keyword == "day" {
            return Some(Class::Day);
        }
        if let Some(weekday) = calendar::weekday_by_name(keyword) {
            return Some(Class::Weekday(weekday));
        }
        calendar::month_by_name(keyword).map(Class::Month)
    }
}

/// Build a monthly or yearly rule from two `K N` pairs, or decline when the
/// keywords are not of the same class.
fn classify_range(
    (skeyword, sn): (&str, i8),
    (ekeyword, en): (&str, i8),
) -> Option<DateKind> {
    let kind = match (Class::of(skeyword)?, Class::of(ekeyword)?) {
        (Class::Weekday(sweekday), Class::Weekday(eweekday)) => {
            DateKind::WeekDay {
                start: NthWeekday { weekday: sweekday, nth: sn },
                end: NthWeekday { weekday: eweekday, nth: en },
            }
        }
        (Class::Month(smonth), Class::Month(emonth)) => DateKind::MonthDate {
            start: MonthOffset { month: smonth, day: sn },
            end: MonthOffset { month: emonth, day: en },
        },
        (Class::Day, Class::Day) => {
            DateKind::MonthDay { start: sn, end: en }
        }
        _ => return None,
    };
    Some(kind)
}

/// Read a `WD N MON` triple starting at capture group `i`, keeping
/// unrecognized keywords.
fn month_weekday(caps: &Captures, i: usize) -> Option<MonthWeekday> {
    let weekday = match calendar::weekday_by_name(&caps[i]) {
        Some(weekday) => Keyword::Known(weekday),
        None => Keyword::Unknown(caps[i].to_string()),
    };
    let month = match calendar::month_by_name(&caps[i + 2]) {
        Some(month) => Keyword::Known(month),
        None => Keyword::Unknown(caps[i + 2].to_string()),
    };
    Some(MonthWeekday { weekday, nth: number(caps, i + 1)?, month })
}

/// Read a `YYYY-MM-DD` triple starting at capture group `i`.
fn calendar_day_at(caps: &Captures, i: usize) -> Option<CalendarDay> {
    Some(CalendarDay {
        year: number(caps, i)?,
        month: number(caps, i + 1)?,
        day: number(caps, i + 2)?,
    })
}

/// Parse capture group `i` as an integer. Numbers that don't fit make the
/// form decline.
fn number<T: std::str::FromStr>(caps: &Captures, i: usize) -> Option<T> {
    caps[i].parse().ok()
}
