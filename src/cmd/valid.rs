use std::{io::Write, process::ExitCode};

use crate::{
    args::{
        self,
        flags::{ConfigFile, Period},
    },
    datetime::DateTimes,
};

const USAGE: &'static str = r#"
Print whether a time period is open at each of the given datetimes.

For each datetime, `true` is printed when the time period is open at that
instant and `false` otherwise. A time period is open when at least one of its
entries covers the instant and none of its excluded time periods are open.

USAGE:
    timeperiod valid -c <path> -p <name> [<datetime>...]

EXAMPLES:
    Check whether `workhours` is open right now:

        $ timeperiod valid -c timeperiods.cfg -p workhours
        true

    Check a few points in time:

        $ timeperiod valid -c timeperiods.cfg -p workhours \
            2025-03-17T08:59:59 2025-03-17T09:00 2025-03-17T17:00:01
        false
        true
        false

ARGUMENTS:
%args%
OPTIONS:
%flags%
"#;

pub fn run(p: &mut lexopt::Parser) -> anyhow::Result<ExitCode> {
    let mut file = ConfigFile::default();
    let mut period = Period::default();
    let mut datetimes = DateTimes::default();
    args::configure(p, USAGE, &mut [&mut file, &mut period, &mut datetimes])?;

    let periods = file.load()?;
    let tp = period.find(&periods)?;
    let mut wtr = std::io::stdout().lock();
    for dt in datetimes.get() {
        writeln!(wtr, "{}", tp.is_time_valid(dt.second()))?;
    }
    Ok(ExitCode::SUCCESS)
}
