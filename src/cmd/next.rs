use std::{io::Write, process::ExitCode};

use timeperiod::Timeperiod;

use crate::{
    args::{
        self,
        flags::{ConfigFile, Period},
    },
    datetime::{DateTime, DateTimes},
};

const USAGE_VALID: &'static str = r#"
Print when a time period next opens.

For each datetime, this prints the earliest instant at or after it when the
time period is open. When the time period is already open, the datetime itself
is printed. When the time period doesn't open within the following year,
`none` is printed.

USAGE:
    timeperiod next-valid -c <path> -p <name> [<datetime>...]

EXAMPLES:
    Print when `workhours` next opens after a Friday evening:

        $ TZ=UTC timeperiod next-valid -c timeperiods.cfg -p workhours \
            2025-03-14T18:00
        2025-03-17T09:00:00+00:00[UTC]

ARGUMENTS:
%args%
OPTIONS:
%flags%
"#;

const USAGE_INVALID: &'static str = r#"
Print when a time period next closes.

For each datetime, this prints the earliest instant at or after it when the
time period is closed. When the time period is already closed, the datetime
itself is printed. When the time period stays open throughout the following
year, `none` is printed.

Coverage is followed across days, so `monday 20:00-24:00` together with
`tuesday 00:00-04:00` closes on Tuesday at 04:00:01.

USAGE:
    timeperiod next-invalid -c <path> -p <name> [<datetime>...]

EXAMPLES:
    Print when `workhours` closes on a Monday morning:

        $ TZ=UTC timeperiod next-invalid -c timeperiods.cfg -p workhours \
            2025-03-17T10:00
        2025-03-17T17:00:01+00:00[UTC]

ARGUMENTS:
%args%
OPTIONS:
%flags%
"#;

pub fn run_valid(p: &mut lexopt::Parser) -> anyhow::Result<ExitCode> {
    run(p, USAGE_VALID, Timeperiod::next_valid_time_from)
}

pub fn run_invalid(p: &mut lexopt::Parser) -> anyhow::Result<ExitCode> {
    run(p, USAGE_INVALID, Timeperiod::next_invalid_time_from)
}

fn run(
    p: &mut lexopt::Parser,
    usage: &str,
    search: fn(&Timeperiod, i64) -> Option<i64>,
) -> anyhow::Result<ExitCode> {
    let mut file = ConfigFile::default();
    let mut period = Period::default();
    let mut datetimes = DateTimes::default();
    args::configure(p, usage, &mut [&mut file, &mut period, &mut datetimes])?;

    let periods = file.load()?;
    let tp: &Timeperiod = period.find(&periods)?;
    let mut wtr = std::io::stdout().lock();
    for dt in datetimes.get() {
        match search(tp, dt.second()) {
            None => writeln!(wtr, "none")?,
            Some(second) => {
                writeln!(wtr, "{}", DateTime::from_second(second)?)?
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}
