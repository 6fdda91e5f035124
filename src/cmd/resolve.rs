use std::{io::Write, process::ExitCode};

use bstr::{ByteSlice, io::BufReadExt};

use crate::args::{self, Arg, Usage};

const USAGE: &'static str = r#"
Show how time period entries are interpreted.

Each entry is resolved into a recurrence rule, which is printed as the kind of
rule followed by a tab and the rule in canonical form. An entry that doesn't
match any recognized form is printed as `invalid` followed by a tab and the
entry as given. When a rule was recognized but is out of range, each problem
is printed on its own line as `error` followed by a tab and a message.

Entries can be passed as positional arguments or as line delimited data on
stdin, but not both. An entry usually contains spaces, so remember to quote
it.

USAGE:
    timeperiod resolve <entry>...
    timeperiod resolve < line delimited <entry>

EXAMPLES:
    Resolve a few entries:

        $ timeperiod resolve 'Monday 09:00-17:00' 'day  1 - 15 / 5 01:00-24:00'
        standard	monday 09:00-17:00
        month-day	day 1 - 15 / 5 01:00-24:00

    Find the entries in a configuration file that aren't recognized:

        $ grep -E '^\s+[a-z]+ [0-9]' timeperiods.cfg \
            | timeperiod resolve \
            | grep '^invalid'

ARGUMENTS:
%args%
OPTIONS:
%flags%
"#;

pub fn run(p: &mut lexopt::Parser) -> anyhow::Result<ExitCode> {
    let mut config = Config::default();
    args::configure(p, USAGE, &mut [&mut config])?;

    let mut wtr = std::io::stdout().lock();
    if !config.entries.is_empty() {
        for entry in config.entries.iter() {
            write_rule(&mut wtr, entry)?;
        }
        return Ok(ExitCode::SUCCESS);
    }
    std::io::stdin().lock().for_byte_line(|line| {
        let entry = line.to_str_lossy();
        if !entry.trim().is_empty() {
            write_rule(&mut wtr, &entry)?;
        }
        Ok(true)
    })?;
    Ok(ExitCode::SUCCESS)
}

fn write_rule<W: Write>(mut wtr: W, entry: &str) -> std::io::Result<()> {
    let Some(dr) = timeperiod::resolve(entry) else {
        return writeln!(wtr, "invalid\t{}", entry.trim());
    };
    writeln!(wtr, "{}\t{dr}", dr.kind().name())?;
    for err in dr.errors() {
        writeln!(wtr, "error\t{err}")?;
    }
    Ok(())
}

#[derive(Debug, Default)]
struct Config {
    entries: Vec<String>,
}

impl args::Configurable for Config {
    fn configure(
        &mut self,
        _: &mut lexopt::Parser,
        arg: &mut Arg,
    ) -> anyhow::Result<bool> {
        let Some(value) = arg.take_value() else { return Ok(false) };
        let entry = value.into_string().map_err(|value| {
            anyhow::anyhow!("time period entry `{value:?}` is not valid UTF-8")
        })?;
        self.entries.push(entry);
        Ok(true)
    }

    fn usage(&self) -> &[Usage] {
        const ENTRY: Usage = Usage::arg(
            "<entry>...",
            "A line from the body of a `define timeperiod { ... }` block, \
             e.g., `monday 09:00-17:00`. Runs of whitespace are collapsed \
             and case is ignored. Read from stdin when none are given.",
        );

        &[ENTRY]
    }
}
