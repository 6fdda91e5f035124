use std::{io::Write, process::ExitCode};

use crate::{
    args::{self, flags::ConfigFile},
    datetime::{DateTime, DateTimes},
};

const USAGE: &'static str = r#"
Print the activation state of every time period.

Each time period starts out in an unknown state, so checking it for the first
time always produces a transition from `-1` to either `0` (closed) or `1`
(open). One line is printed per time period in the order they are defined:

    TIMEPERIOD TRANSITION: <name>;<from>;<to>

When more than one datetime is given, each is checked in turn and only the
time periods whose state changed since the previous datetime are printed.

USAGE:
    timeperiod transition -c <path> [<datetime>...]

EXAMPLES:
    Print the state of every time period at the start of a work day and just
    after it ends:

        $ timeperiod transition -c timeperiods.cfg \
            2025-03-17T09:00 2025-03-17T17:00:01
        TIMEPERIOD TRANSITION: always;-1;1
        TIMEPERIOD TRANSITION: workhours;-1;1
        TIMEPERIOD TRANSITION: workhours;1;0

ARGUMENTS:
%args%
OPTIONS:
%flags%
"#;

pub fn run(p: &mut lexopt::Parser) -> anyhow::Result<ExitCode> {
    let mut file = ConfigFile::default();
    let mut datetimes = DateTimes::default();
    args::configure(p, USAGE, &mut [&mut file, &mut datetimes])?;

    let periods = file.load()?;
    let mut wtr = std::io::stdout().lock();
    let mut datetimes: Vec<DateTime> = datetimes.get();
    datetimes.sort_by_key(|dt| dt.second());
    for dt in datetimes {
        let now = dt.second();
        for transition in periods.check_and_log_activation_changes(now) {
            writeln!(wtr, "{transition}")?;
        }
        periods.clean_caches(now);
    }
    Ok(ExitCode::SUCCESS)
}
