use std::{io::Write, process::ExitCode};

use crate::{
    args::{self, Arg, Usage, flags::ConfigFile},
    style::Theme,
};

const USAGE: &'static str = r#"
Report warnings and errors in a configuration.

Warnings are entries that don't match any recognized form. They are ignored
when evaluating a time period, but the configuration is still usable. Errors
are structural problems, like an unknown excluded time period, an out of range
day or a loop of excludes. When there is at least one error, this command
exits with a non-zero status.

Each problem is printed on its own line, followed by `OK` when the
configuration is correct.

USAGE:
    timeperiod check -c <path>

EXAMPLES:
    Check the time periods in a configuration file:

        $ timeperiod check -c timeperiods.cfg
        warning: [timeperiod::work] invalid entry `mondy 09:00-17:00`
        OK

    Get the same report as JSON:

        $ timeperiod check -c timeperiods.cfg --json
        {"warnings":["[timeperiod::work] invalid entry `mondy 09:00-17:00`"],
        "errors":[]}

    (The output above is wrapped. It is printed on a single line.)

OPTIONS:
%flags%
"#;

pub fn run(p: &mut lexopt::Parser) -> anyhow::Result<ExitCode> {
    let mut config = Config::default();
    let mut file = ConfigFile::default();
    args::configure(p, USAGE, &mut [&mut config, &mut file])?;

    let periods = file.load()?;
    let report = periods.report();
    let mut wtr = std::io::stdout().lock();
    if config.json {
        serde_json::to_writer(&mut wtr, &report)?;
        writeln!(wtr)?;
    } else {
        let theme = Theme::stdout();
        for warning in report.warnings.iter() {
            writeln!(wtr, "{}: {warning}", theme.warning("warning"))?;
        }
        for error in report.errors.iter() {
            writeln!(wtr, "{}: {error}", theme.error("error"))?;
        }
        if report.errors.is_empty() {
            writeln!(wtr, "OK")?;
        }
    }
    Ok(if report.errors.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

#[derive(Debug, Default)]
struct Config {
    json: bool,
}

impl Config {
    const JSON: Usage = Usage::flag(
        "json",
        "Print the report as a JSON object with `warnings` and `errors` \
         lists. The exit status is the same as without this flag.",
    );
}

impl args::Configurable for Config {
    fn configure(
        &mut self,
        _: &mut lexopt::Parser,
        arg: &mut Arg,
    ) -> anyhow::Result<bool> {
        if !arg.is(&Config::JSON) {
            return Ok(false);
        }
        self.json = true;
        Ok(true)
    }

    fn usage(&self) -> &[Usage] {
        &[Config::JSON]
    }
}
