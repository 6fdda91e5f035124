use {
    anyhow::Context,
    jiff::{Timestamp, Zoned, civil, fmt, tz::TimeZone},
};

use crate::{
    NOW, TZ,
    args::{Arg, Usage},
};

static TEMPORAL_PARSER: fmt::temporal::DateTimeParser =
    fmt::temporal::DateTimeParser::new();

/// An instant in time given on the command line.
///
/// Everything is reduced to a physical instant, since that is all a time
/// period query needs. Output is always rendered in the local time zone,
/// which can be overridden with the `TZ` environment variable.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DateTime {
    zdt: Zoned,
}

impl DateTime {
    pub const ARG: Usage = Usage::arg(
        "<datetime>...",
        "The instants to query, defaulting to `now`. Each is `now`, \
         `@<seconds>`, an RFC 9557 or RFC 3339 timestamp, or a civil \
         datetime like `2025-03-15T10:23` in the local time zone (which may \
         be overridden by the `TZ` environment variable). `now` is read \
         from `TIMEPERIOD_NOW` when it is set.",
    );

    /// Returns the current time in the local time zone.
    pub fn now() -> DateTime {
        DateTime { zdt: NOW.clone() }
    }

    /// Returns the instant at the given Unix timestamp in the local time
    /// zone.
    pub fn from_second(second: i64) -> anyhow::Result<DateTime> {
        let ts = Timestamp::from_second(second)
            .with_context(|| format!("invalid Unix timestamp {second}"))?;
        Ok(DateTime { zdt: ts.to_zoned(TZ.clone()) })
    }

    /// Returns this datetime as seconds since the Unix epoch.
    pub fn second(&self) -> i64 {
        self.zdt.timestamp().as_second()
    }
}

impl std::fmt::Display for DateTime {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.zdt, f)
    }
}

impl std::str::FromStr for DateTime {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<DateTime> {
        if s == "now" {
            return Ok(DateTime::now());
        }
        if let Some(epoch) = s.strip_prefix('@') {
            let second: i64 = epoch
                .parse()
                .with_context(|| format!("invalid Unix timestamp `{s}`"))?;
            return DateTime::from_second(second);
        }
        // We keep the error of the most specific format around, since if
        // a time zone annotation was present but something about it was
        // wrong, that is the error to report.
        let temporal_parse_err = match TEMPORAL_PARSER.parse_zoned(s) {
            Err(err) => err,
            Ok(zdt) => return Ok(DateTime { zdt }),
        };
        let Ok(pieces) = fmt::temporal::Pieces::parse(s) else {
            anyhow::bail!("unrecognized datetime `{s}`")
        };
        if pieces.time_zone_annotation().is_some() {
            return Err(temporal_parse_err.into());
        }
        let time = pieces.time().unwrap_or(civil::Time::midnight());
        let dt = pieces.date().to_datetime(time);
        let zdt = match pieces.offset() {
            None => dt.to_zoned(TZ.clone())?,
            Some(fmt::temporal::PiecesOffset::Zulu) => {
                dt.to_zoned(TimeZone::UTC)?
            }
            Some(fmt::temporal::PiecesOffset::Numeric(ref off)) => {
                dt.to_zoned(TimeZone::fixed(off.offset()))?
            }
            Some(unk) => {
                anyhow::bail!("unrecognized parsed offset: {unk:?}")
            }
        };
        Ok(DateTime { zdt })
    }
}

/// Zero or more positional datetimes, defaulting to `now`.
#[derive(Clone, Debug, Default)]
pub struct DateTimes {
    datetimes: Vec<DateTime>,
}

impl DateTimes {
    /// Returns the datetimes given, or the current time when there were
    /// none.
    pub fn get(&self) -> Vec<DateTime> {
        if self.datetimes.is_empty() {
            vec![DateTime::now()]
        } else {
            self.datetimes.clone()
        }
    }
}

impl crate::args::Configurable for DateTimes {
    fn configure(
        &mut self,
        _: &mut lexopt::Parser,
        arg: &mut Arg,
    ) -> anyhow::Result<bool> {
        let Some(value) = arg.take_value() else { return Ok(false) };
        let Some(s) = value.to_str() else {
            anyhow::bail!("datetime `{value:?}` is not valid UTF-8")
        };
        let dt = s.parse().context("invalid datetime")?;
        self.datetimes.push(dt);
        Ok(true)
    }

    fn usage(&self) -> &[Usage] {
        &[DateTime::ARG]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // `TZ` is resolved from the environment, so these tests stick to
    // formats that don't depend on it.

    #[test]
    fn parse_epoch() {
        let dt: DateTime = "@1700000000".parse().unwrap();
        assert_eq!(dt.second(), 1700000000);
        assert!("@nope".parse::<DateTime>().is_err());
    }

    #[test]
    fn parse_rfc3339() {
        let dt: DateTime = "2024-07-20T16:30:00Z".parse().unwrap();
        assert_eq!(dt.second(), 1721493000);
        let dt: DateTime = "2024-07-20T12:30:00-04:00".parse().unwrap();
        assert_eq!(dt.second(), 1721493000);
    }

    #[test]
    fn parse_rfc9557() {
        let dt: DateTime =
            "2024-07-20T12:30:00-04:00[America/New_York]".parse().unwrap();
        assert_eq!(dt.second(), 1721493000);
        insta::assert_snapshot!(
            dt,
            @"2024-07-20T12:30:00-04:00[America/New_York]",
        );
    }

    #[test]
    fn parse_garbage() {
        let err = "next tuesday".parse::<DateTime>().unwrap_err();
        insta::assert_snapshot!(err, @"unrecognized datetime `next tuesday`");
    }
}
