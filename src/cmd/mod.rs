use std::process::ExitCode;

mod check;
mod next;
mod resolve;
mod transition;
mod valid;

const USAGE: &'static str = "\
A utility for validating and querying Nagios-style time periods.

USAGE:
    timeperiod <command> ...

COMMANDS:
    check         Report warnings and errors in a configuration
    next-invalid  Print when a time period next closes
    next-valid    Print when a time period next opens
    resolve       Show how time period entries are interpreted
    transition    Print the activation state of every time period
    valid         Print whether a time period is open at a datetime
";

pub fn run(p: &mut lexopt::Parser) -> anyhow::Result<ExitCode> {
    let cmd = crate::args::command(USAGE, p)?;
    match &*cmd {
        "check" => check::run(p),
        "next-invalid" => next::run_invalid(p),
        "next-valid" => next::run_valid(p),
        "resolve" => resolve::run(p),
        "transition" => transition::run(p),
        "valid" => valid::run(p),
        unk => anyhow::bail!("unrecognized command '{}'", unk),
    }
}
