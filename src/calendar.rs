// Calendar arithmetic shared by every recurrence rule.
//
// Everything here works on civil dates in a single time zone. Callers hand us
// epoch seconds and a `TimeZone`, and we convert to civil time once, do all of
// the day-level reasoning on `Date`, and then convert back. Conversions that
// fall outside of Jiff's supported range come back as `None` rather than as
// errors, since a query that can't be answered simply never matches.

use jiff::{
    Timestamp, ToSpan,
    civil::{Date, DateTime, Time, Weekday},
    tz::TimeZone,
};

/// The number of seconds in a civil day without any DST transitions.
pub const DAY: i64 = 86_400;

/// Returns the weekday corresponding to the given lowercase English name.
pub fn weekday_by_name(name: &str) -> Option<Weekday> {
    use jiff::civil::Weekday::*;

    let weekday = match name {
        "monday" => Monday,
        "tuesday" => Tuesday,
        "wednesday" => Wednesday,
        "thursday" => Thursday,
        "friday" => Friday,
        "saturday" => Saturday,
        "sunday" => Sunday,
        _ => return None,
    };
    Some(weekday)
}

/// Returns the month number (`1..=12`) for the given lowercase English name.
pub fn month_by_name(name: &str) -> Option<i8> {
    let month = match name {
        "january" => 1,
        "february" => 2,
        "march" => 3,
        "april" => 4,
        "may" => 5,
        "june" => 6,
        "july" => 7,
        "august" => 8,
        "september" => 9,
        "october" => 10,
        "november" => 11,
        "december" => 12,
        _ => return None,
    };
    Some(month)
}

/// The inverse of `weekday_by_name`.
pub fn weekday_name(weekday: Weekday) -> &'static str {
    use jiff::civil::Weekday::*;

    match weekday {
        Monday => "monday",
        Tuesday => "tuesday",
        Wednesday => "wednesday",
        Thursday => "thursday",
        Friday => "friday",
        Saturday => "saturday",
        Sunday => "sunday",
    }
}

/// The inverse of `month_by_name`.
///
/// Month numbers outside of `1..=12` render as `unknown`.
pub fn month_name(month: i8) -> &'static str {
    const NAMES: [&str; 12] = [
        "january",
        "february",
        "march",
        "april",
        "may",
        "june",
        "july",
        "august",
        "september",
        "october",
        "november",
        "december",
    ];
    usize::try_from(i32::from(month) - 1)
        .ok()
        .and_then(|i| NAMES.get(i).copied())
        .unwrap_or("unknown")
}

/// Returns the number of days in the given month, taking leap years into
/// account.
pub fn days_in_month(year: i16, month: i8) -> Option<i8> {
    Date::new(year, month, 1).ok().map(|first| first.days_in_month())
}

/// Returns the day of the month addressed by `offset`.
///
/// A positive offset counts from the start of the month and is clamped to
/// the last day. A negative offset counts from the end, so `-1` is the last
/// day of the month, and is clamped to the first day. An offset of `0` does
/// not address any day.
pub fn day_by_offset(year: i16, month: i8, offset: i8) -> Option<Date> {
    let len = days_in_month(year, month)?;
    let day = if offset > 0 {
        offset.min(len)
    } else if offset < 0 {
        // No overflow: `len <= 31` and `offset >= -128`.
        (len + offset + 1).max(1)
    } else {
        return None;
    };
    Date::new(year, month, day).ok()
}

/// Returns the `nth` occurrence of `weekday` in the given month.
///
/// Negative values of `nth` count from the end of the month, i.e., `-1` is
/// the last occurrence. When the month has no such occurrence (for example,
/// a fifth Monday), `None` is returned.
pub fn day_by_weekday_offset(
    year: i16,
    month: i8,
    weekday: Weekday,
    nth: i8,
) -> Option<Date> {
    if nth == 0 {
        return None;
    }
    Date::new(year, month, 1).ok()?.nth_weekday_of_month(nth, weekday).ok()
}

/// Moves a `(year, month)` pair by the given number of months.
pub fn shift_month(year: i16, month: i8, months: i32) -> Option<(i16, i8)> {
    let index = i32::from(year) * 12 + i32::from(month - 1) + months;
    let year = i16::try_from(index.div_euclid(12)).ok()?;
    let month = i8::try_from(index.rem_euclid(12) + 1).ok()?;
    Some((year, month))
}

/// Returns the number of days from `start` to `end`. This is negative when
/// `end` precedes `start`.
pub fn days_between(start: Date, end: Date) -> Option<i32> {
    start.until(end).ok().map(|span| span.get_days())
}

/// Returns the date that is the given number of days after `date`.
pub fn add_days(date: Date, days: i32) -> Option<Date> {
    date.checked_add(days.days()).ok()
}

/// Converts an epoch second to civil time in the given time zone.
pub fn civil(t: i64, tz: &TimeZone) -> Option<DateTime> {
    let ts = Timestamp::from_second(t).ok()?;
    Some(tz.to_datetime(ts))
}

/// Returns the number of seconds elapsed since midnight for the given civil
/// time. This is always in the range `0..86400`.
pub fn second_of_day(dt: DateTime) -> i64 {
    let time = dt.time();
    i64::from(time.hour()) * 3600
        + i64::from(time.minute()) * 60
        + i64::from(time.second())
}

/// Returns the epoch second of the civil time `second` seconds after
/// midnight on `date`.
///
/// `second` may be `86400` (or more), in which case the civil time rolls
/// over into the following day(s). Civil times that fall into a gap (e.g.,
/// a DST transition) are resolved in the "compatible" way, i.e., to the
/// later instant.
pub fn instant(date: Date, second: i64, tz: &TimeZone) -> Option<i64> {
    let dt = date
        .to_datetime(Time::midnight())
        .checked_add(second.seconds())
        .ok()?;
    let ts = tz.to_ambiguous_timestamp(dt).compatible().ok()?;
    Some(ts.as_second())
}

/// Like `instant`, but never returns an instant before `not_before`.
///
/// In a fold (e.g., when clocks are set back), the earlier of the two
/// instants is used unless it precedes `not_before`, in which case the later
/// one is. `None` is returned when both precede `not_before`.
pub fn instant_not_before(
    date: Date,
    second: i64,
    tz: &TimeZone,
    not_before: i64,
) -> Option<i64> {
    let dt = date
        .to_datetime(Time::midnight())
        .checked_add(second.seconds())
        .ok()?;
    let earlier = tz.to_ambiguous_timestamp(dt).compatible().ok()?;
    if earlier.as_second() >= not_before {
        return Some(earlier.as_second());
    }
    let later = tz.to_ambiguous_timestamp(dt).later().ok()?.as_second();
    (later >= not_before).then_some(later)
}
