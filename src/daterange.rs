// Recurrence rules.
//
// A rule is made of two independent parts: a set of matching days and a set of
// time ranges within each matching day. The matching days are described by a
// `DateKind`, which for every variant boils down to a single question: "what
// is the first period (a closed range of days) that ends on or after this
// date?" Everything else, including skip intervals, is built on top of that.

use std::fmt;

use jiff::{
    civil::{Date, Weekday},
    tz::TimeZone,
};

use crate::{
    calendar::{self, DAY},
    timerange::Timerange,
};

/// The maximum number of periods visited when looking for the next matching
/// day. For yearly rules this covers decades, for weekly rules months.
const MAX_PERIODS: usize = 64;

/// The number of days examined when following contiguous coverage forward.
const HORIZON_DAYS: usize = 367;

/// A keyword that may or may not have been recognized.
///
/// Unrecognized keywords are kept so that they can be reported when the
/// configuration is checked for correctness.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Keyword<T> {
    Known(T),
    Unknown(String),
}

impl<T: Copy> Keyword<T> {
    fn known(&self) -> Option<T> {
        match *self {
            Keyword::Known(value) => Some(value),
            Keyword::Unknown(_) => None,
        }
    }
}

/// A year, month and day as written. This may not be a real date.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CalendarDay {
    pub year: i16,
    pub month: i8,
    pub day: i8,
}

impl CalendarDay {
    fn date(&self) -> Option<Date> {
        Date::new(self.year, self.month, self.day).ok()
    }
}

impl fmt::Display for CalendarDay {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// The `nth` occurrence of a weekday within a named month, e.g., the second
/// Tuesday of April.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MonthWeekday {
    pub weekday: Keyword<Weekday>,
    pub nth: i8,
    pub month: Keyword<i8>,
}

impl MonthWeekday {
    fn date(&self, year: i16) -> Option<Date> {
        let weekday = self.weekday.known()?;
        let month = self.month.known()?;
        calendar::day_by_weekday_offset(year, month, weekday, self.nth)
    }
}

impl fmt::Display for MonthWeekday {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.weekday {
            Keyword::Known(wd) => write!(f, "{}", calendar::weekday_name(wd))?,
            Keyword::Unknown(ref raw) => write!(f, "{raw}")?,
        }
        write!(f, " {} ", self.nth)?;
        match self.month {
            Keyword::Known(m) => write!(f, "{}", calendar::month_name(m)),
            Keyword::Unknown(ref raw) => write!(f, "{raw}"),
        }
    }
}

/// The `nth` occurrence of a weekday within any month.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NthWeekday {
    pub weekday: Weekday,
    pub nth: i8,
}

impl fmt::Display for NthWeekday {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", calendar::weekday_name(self.weekday), self.nth)
    }
}

/// A day offset within a named month, e.g., `february -1`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MonthOffset {
    pub month: i8,
    pub day: i8,
}

/// The set of days matched by a recurrence rule.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DateKind {
    /// An absolute range of dates, e.g., `2008-04-01 - 2008-05-01`.
    CalendarDate { start: CalendarDay, end: CalendarDay },
    /// A yearly range between weekdays of named months, e.g.,
    /// `tuesday 1 april - friday 2 may`.
    MonthWeekDay { start: MonthWeekday, end: MonthWeekday },
    /// A monthly range between weekday occurrences, e.g.,
    /// `monday 3 - thursday 4`.
    WeekDay { start: NthWeekday, end: NthWeekday },
    /// A yearly range between days of named months, e.g.,
    /// `april 10 - may 15`.
    MonthDate { start: MonthOffset, end: MonthOffset },
    /// A monthly range between days of the month, e.g., `day 1 - 15`.
    MonthDay { start: i8, end: i8 },
    /// Every week on the given weekday.
    Standard { weekday: Weekday },
}

impl DateKind {
    /// Returns a short lowercase name for this kind of rule.
    pub fn name(&self) -> &'static str {
        match *self {
            DateKind::CalendarDate { .. } => "calendar-date",
            DateKind::MonthWeekDay { .. } => "month-week-day",
            DateKind::WeekDay { .. } => "week-day",
            DateKind::MonthDate { .. } => "month-date",
            DateKind::MonthDay { .. } => "month-day",
            DateKind::Standard { .. } => "standard",
        }
    }

    /// Returns the first period that ends on or after `date`.
    ///
    /// The start of the returned period may precede `date`. `None` is
    /// returned when no such period exists, which happens for expired
    /// calendar ranges and for rules with unrecognized parts.
    fn period(&self, date: Date) -> Option<(Date, Date)> {
        match *self {
            DateKind::CalendarDate { start, end } => {
                let (start, end) = (start.date()?, end.date()?);
                (date <= end && start <= end).then_some((start, end))
            }
            DateKind::MonthWeekDay { ref start, ref end } => {
                yearly(date, |y| start.date(y), |y| end.date(y))
            }
            DateKind::WeekDay { start, end } => monthly(
                date,
                |y, m| {
                    calendar::day_by_weekday_offset(
                        y,
                        m,
                        start.weekday,
                        start.nth,
                    )
                },
                |y, m| {
                    calendar::day_by_weekday_offset(y, m, end.weekday, end.nth)
                },
            ),
            DateKind::MonthDate { start, end } => yearly(
                date,
                |y| calendar::day_by_offset(y, start.month, start.day),
                |y| calendar::day_by_offset(y, end.month, end.day),
            ),
            DateKind::MonthDay { start, end } => monthly(
                date,
                |y, m| calendar::day_by_offset(y, m, start),
                |y, m| calendar::day_by_offset(y, m, end),
            ),
            DateKind::Standard { weekday } => {
                let days = weekday.since(date.weekday());
                let day = calendar::add_days(date, i32::from(days))?;
                Some((day, day))
            }
        }
    }
}

/// Finds the first yearly period ending on or after `date`.
///
/// When the end of a period precedes its start within the same year, the
/// period wraps into the following year.
fn yearly(
    date: Date,
    start: impl Fn(i16) -> Option<Date>,
    end: impl Fn(i16) -> Option<Date>,
) -> Option<(Date, Date)> {
    for offset in -1..=8 {
        let Some(year) = date.year().checked_add(offset) else { continue };
        let Some(s) = start(year) else { continue };
        let e = match end(year) {
            Some(e) if e >= s => e,
            Some(_) => {
                let Some(next) = year.checked_add(1) else { continue };
                let Some(e) = end(next) else { continue };
                e
            }
            None => continue,
        };
        if e >= date {
            return Some((s, e));
        }
    }
    None
}

/// Finds the first monthly period ending on or after `date`.
///
/// When the end of a period precedes its start within the same month, the
/// period wraps into the following month.
fn monthly(
    date: Date,
    start: impl Fn(i16, i8) -> Option<Date>,
    end: impl Fn(i16, i8) -> Option<Date>,
) -> Option<(Date, Date)> {
    let (year, month) = (date.year(), date.month());
    for offset in -1..=14 {
        let Some((y, m)) = calendar::shift_month(year, month, offset) else {
            continue;
        };
        let Some(s) = start(y, m) else { continue };
        let e = match end(y, m) {
            Some(e) if e >= s => e,
            Some(_) => {
                let Some((ny, nm)) = calendar::shift_month(y, m, 1) else {
                    continue;
                };
                let Some(e) = end(ny, nm) else { continue };
                e
            }
            None => continue,
        };
        if e >= date {
            return Some((s, e));
        }
    }
    None
}

/// A single recurrence rule: a set of matching days plus the time ranges that
/// are active within each matching day.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Daterange {
    kind: DateKind,
    skip_interval: i32,
    timeranges: Vec<Timerange>,
}

impl Daterange {
    /// Create a new rule from its matching days, a skip interval and a comma
    /// separated list of `HH:MM-HH:MM` time ranges.
    ///
    /// A skip interval of `0` or `1` means every matching day. Larger values
    /// mean every Nth day counted from the first day of each period.
    pub fn new(kind: DateKind, skip_interval: i32, ranges: &str) -> Daterange {
        let timeranges = Timerange::parse_list(ranges);
        Daterange { kind, skip_interval, timeranges }
    }

    /// Returns the days matched by this rule.
    pub fn kind(&self) -> &DateKind {
        &self.kind
    }

    /// Returns the skip interval of this rule.
    pub fn skip_interval(&self) -> i32 {
        self.skip_interval
    }

    /// Returns the time ranges of this rule, including malformed ones.
    pub fn timeranges(&self) -> &[Timerange] {
        &self.timeranges
    }

    /// Returns true when this rule has no structural errors.
    pub fn is_correct(&self) -> bool {
        self.errors().is_empty()
    }

    /// Returns a human readable description of each structural error in
    /// this rule.
    ///
    /// A rule with errors can still be evaluated. Its degenerate parts
    /// simply never match.
    pub fn errors(&self) -> Vec<String> {
        let mut errs = vec![];
        match self.kind {
            DateKind::CalendarDate { start, end } => {
                for day in [start, end] {
                    if day.date().is_none() {
                        errs.push(format!("`{day}` is not a valid date"));
                    }
                }
            }
            DateKind::MonthWeekDay { ref start, ref end } => {
                for mwd in [start, end] {
                    if let Keyword::Unknown(ref raw) = mwd.weekday {
                        errs.push(format!("`{raw}` is not a valid weekday"));
                    }
                    if let Keyword::Unknown(ref raw) = mwd.month {
                        errs.push(format!("`{raw}` is not a valid month"));
                    }
                    check_nth(mwd.nth, &mut errs);
                }
            }
            DateKind::WeekDay { start, end } => {
                check_nth(start.nth, &mut errs);
                check_nth(end.nth, &mut errs);
            }
            DateKind::MonthDate { start, end } => {
                check_day(start.day, &mut errs);
                check_day(end.day, &mut errs);
            }
            DateKind::MonthDay { start, end } => {
                check_day(start, &mut errs);
                check_day(end, &mut errs);
            }
            DateKind::Standard { .. } => {}
        }
        if self.skip_interval < 0 {
            errs.push(format!(
                "skip interval `{}` must not be negative",
                self.skip_interval,
            ));
        }
        for tr in self.timeranges.iter() {
            if !tr.is_correct() {
                errs.push(format!("invalid time range `{tr}`"));
            }
        }
        // Single day rules repeat their start as their end.
        errs.dedup();
        errs
    }

    /// Returns true when `t` falls on a matching day and within one of this
    /// rule's time ranges.
    pub fn is_time_valid(&self, t: i64, tz: &TimeZone) -> bool {
        let Some(dt) = calendar::civil(t, tz) else { return false };
        self.contains_second(calendar::second_of_day(dt))
            && self.is_day_valid(dt.date())
    }

    /// Returns the smallest instant at or after `t` at which this rule is
    /// valid.
    pub fn next_valid_time_from(&self, t: i64, tz: &TimeZone) -> Option<i64> {
        let first = self.spans().map(|(start, _)| start).min()?;
        let dt = calendar::civil(t, tz)?;
        let (today, second) = (dt.date(), calendar::second_of_day(dt));
        if self.is_day_valid(today) {
            if self.contains_second(second) {
                return Some(t);
            }
            let later = self
                .spans()
                .map(|(start, _)| start)
                .filter(|&start| start > second)
                .min();
            // Inside a fold, the earlier instant of `start` may precede `t`.
            let at = later.and_then(|start| {
                calendar::instant_not_before(today, start, tz, t)
            });
            if at.is_some() {
                return at;
            }
        }
        let day = self.next_day_from(today.tomorrow().ok()?)?;
        calendar::instant(day, first, tz)
    }

    /// Returns the smallest instant at or after `t` at which this rule is
    /// not valid.
    ///
    /// Coverage that continues across midnight into another matching day is
    /// followed. `None` is returned when the rule stays valid for more than
    /// a year.
    pub fn next_invalid_time_from(
        &self,
        t: i64,
        tz: &TimeZone,
    ) -> Option<i64> {
        let dt = calendar::civil(t, tz)?;
        let mut date = dt.date();
        let mut second = calendar::second_of_day(dt);
        if !self.contains_second(second) || !self.is_day_valid(date) {
            return Some(t);
        }
        for _ in 0..HORIZON_DAYS {
            let until = self.covered_until(second)?;
            if until < DAY - 1 {
                return calendar::instant_not_before(date, until + 1, tz, t);
            }
            date = date.tomorrow().ok()?;
            second = 0;
            if !self.contains_second(second) || !self.is_day_valid(date) {
                return calendar::instant(date, second, tz);
            }
        }
        None
    }

    /// Returns true when `date` is one of the days matched by this rule,
    /// taking the skip interval into account.
    pub fn is_day_valid(&self, date: Date) -> bool {
        self.next_day_from(date) == Some(date)
    }

    /// Returns the first matching day on or after `date`.
    fn next_day_from(&self, mut date: Date) -> Option<Date> {
        for _ in 0..MAX_PERIODS {
            let (start, end) = self.kind.period(date)?;
            if date < start {
                date = start;
            }
            if self.skip_interval > 1 {
                let since = calendar::days_between(start, date)?;
                let rem = since % self.skip_interval;
                if rem != 0 {
                    date = calendar::add_days(date, self.skip_interval - rem)?;
                }
            }
            if date <= end {
                return Some(date);
            }
            // Every remaining day of this period is skipped, so start
            // looking in the next one.
            date = end.tomorrow().ok()?;
        }
        None
    }

    /// Returns the well formed time ranges as inclusive second bounds.
    fn spans(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        self.timeranges.iter().filter_map(|tr| tr.span())
    }

    fn contains_second(&self, second: i64) -> bool {
        self.timeranges.iter().any(|tr| tr.contains(second))
    }

    /// Returns the last second of the day, starting from `second`, that is
    /// covered without interruption by this rule's time ranges. Overlapping
    /// and adjacent ranges are merged.
    ///
    /// `None` is returned when `second` itself is not covered.
    fn covered_until(&self, second: i64) -> Option<i64> {
        if !self.contains_second(second) {
            return None;
        }
        let mut until = second;
        loop {
            let further = self
                .spans()
                .filter(|&(start, end)| start <= until + 1 && end > until)
                .map(|(_, end)| end)
                .max();
            match further {
                Some(end) => until = end,
                None => return Some(until),
            }
        }
    }
}

impl fmt::Display for Daterange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            DateKind::CalendarDate { start, end } => {
                if start == end {
                    write!(f, "{start}")?;
                } else {
                    write!(f, "{start} - {end}")?;
                }
            }
            DateKind::MonthWeekDay { ref start, ref end } => {
                if start == end {
                    write!(f, "{start}")?;
                } else {
                    write!(f, "{start} - {end}")?;
                }
            }
            DateKind::WeekDay { start, end } => {
                if start == end {
                    write!(f, "{start}")?;
                } else {
                    write!(f, "{start} - {end}")?;
                }
            }
            DateKind::MonthDate { start, end } => {
                let smonth = calendar::month_name(start.month);
                let emonth = calendar::month_name(end.month);
                if start == end {
                    write!(f, "{smonth} {}", start.day)?;
                } else if start.month == end.month {
                    write!(f, "{smonth} {} - {}", start.day, end.day)?;
                } else {
                    let (sday, eday) = (start.day, end.day);
                    write!(f, "{smonth} {sday} - {emonth} {eday}")?;
                }
            }
            DateKind::MonthDay { start, end } => {
                if start == end {
                    write!(f, "day {start}")?;
                } else {
                    write!(f, "day {start} - {end}")?;
                }
            }
            DateKind::Standard { weekday } => {
                write!(f, "{}", calendar::weekday_name(weekday))?;
            }
        }
        if self.skip_interval > 1 {
            write!(f, " / {}", self.skip_interval)?;
        }
        write!(f, " ")?;
        for (i, tr) in self.timeranges.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{tr}")?;
        }
        Ok(())
    }
}

fn check_nth(nth: i8, errs: &mut Vec<String>) {
    if nth == 0 || !(-5..=5).contains(&nth) {
        errs.push(format!(
            "weekday offset `{nth}` is out of range \
             (expected -5..=5, excluding 0)",
        ));
    }
}

fn check_day(day: i8, errs: &mut Vec<String>) {
    if day == 0 || !(-31..=31).contains(&day) {
        errs.push(format!(
            "day offset `{day}` is out of range \
             (expected -31..=31, excluding 0)",
        ));
    }
}
