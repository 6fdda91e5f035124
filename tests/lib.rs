use std::{ffi::OsStr, path::Path};

mod resolve;

/// The current time for every test: Monday 2024-07-15 at 12:00 UTC.
const NOW: &str = "2024-07-15T12:00:00Z";

/// A configuration exercising templates, excludes and coverage across
/// midnight.
const CONFIG: &str = "\
# Shared weekday hours.
define timeperiod {
    name            weekdays
    register        0
    monday          09:00-17:00
    tuesday         09:00-17:00
    wednesday       09:00-17:00
    thursday        09:00-17:00
    friday          09:00-17:00
}

define timeperiod {
    timeperiod_name workhours
    alias           Normal work hours
    use             weekdays
    exclude         holidays
}

define timeperiod {
    timeperiod_name holidays
    2024-07-16      00:00-24:00   ; a day off
    december 25     00:00-24:00
}

define timeperiod {
    timeperiod_name nights
    monday          20:00-24:00
    tuesday         00:00-04:00
}

define command {
    command_name    check_ping
    command_line    /bin/true
}

define timeperiod {
    timeperiod_name always
    day 1 - -1      00:00-24:00
}
";

/// A lightweight abstraction for managing temporary directories and the files
/// within it.
#[derive(Debug)]
struct TempDir(tempfile::TempDir);

impl TempDir {
    /// Create a new temporary directory.
    fn new() -> TempDir {
        TempDir(tempfile::tempdir().unwrap())
    }

    /// Create a new temporary directory containing `timeperiods.cfg` with
    /// the given contents.
    fn with_config(contents: &str) -> TempDir {
        let dir = TempDir::new();
        dir.create("timeperiods.cfg", contents);
        dir
    }

    /// Create a new `timeperiod` command whose CWD is this directory and
    /// the given arguments appended to it.
    fn timeperiod<T: AsRef<OsStr>>(
        &self,
        args: impl IntoIterator<Item = T>,
    ) -> crate::command::Command {
        timeperiod_bare().current_dir(self.0.path()).args(args)
    }

    /// Create a new file in this temporary directory with the given relative
    /// path and contents.
    fn create(
        &self,
        relative_path: impl AsRef<Path>,
        contents: impl AsRef<[u8]>,
    ) {
        let path = self.0.path().join(relative_path.as_ref());
        std::fs::write(&path, contents).unwrap();
    }
}

/// Return a command for the `timeperiod` binary and no argument.
fn timeperiod_bare() -> crate::command::Command {
    crate::command::bin("timeperiod")
        .env("TZ", "UTC")
        .env("TIMEPERIOD_NOW", NOW)
        .env("NO_COLOR", "1")
        .env("RUST_BACKTRACE", "0")
}

/// Return a command for the `timeperiod` binary with the given arguments
/// appended to it.
fn timeperiod<T: AsRef<OsStr>>(
    args: impl IntoIterator<Item = T>,
) -> crate::command::Command {
    timeperiod_bare().args(args)
}

#[test]
fn no_args() {
    crate::command::assert_cmd_snapshot!(
        timeperiod_bare(),
        @r"
    success: false
    exit_code: 1
    ----- stdout -----

    ----- stderr -----
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
    ",
    );
}

#[test]
fn unknown_command() {
    crate::command::assert_cmd_snapshot!(
        timeperiod(["frobnicate"]),
        @r"
    success: false
    exit_code: 1
    ----- stdout -----

    ----- stderr -----
    unrecognized command 'frobnicate'
    ",
    );
}

#[test]
fn bad_log_level() {
    crate::command::assert_cmd_snapshot!(
        timeperiod(["resolve", "monday 00:00-24:00"])
            .env("TIMEPERIOD_LOG", "loud"),
        @r"
    success: false
    exit_code: 1
    ----- stdout -----

    ----- stderr -----
    unrecognized log level 'loud'
    ",
    );
}
