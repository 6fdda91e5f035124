use crate::{command::assert_cmd_snapshot, timeperiod};

#[test]
fn positional() {
    assert_cmd_snapshot!(
        timeperiod([
            "resolve",
            "Monday   09:00-12:00, 13:00-17:00",
            "day -1 - 15 / 5 01:00-24:00",
            "2024-07-16 00:00-24:00",
            "tuesday 1 april - friday 2 may 00:00-24:00",
            "december 25 00:00-24:00",
            "mondy 09:00-17:00",
        ]),
        @r"
    success: true
    exit_code: 0
    ----- stdout -----
    standard	monday 09:00-12:00,13:00-17:00
    month-day	day -1 - 15 / 5 01:00-24:00
    calendar-date	2024-07-16 00:00-24:00
    month-week-day	tuesday 1 april - friday 2 may 00:00-24:00
    month-date	december 25 00:00-24:00
    invalid	mondy 09:00-17:00

    ----- stderr -----
    ",
    );
}

#[test]
fn stdin() {
    assert_cmd_snapshot!(
        timeperiod(["resolve"]).stdin(
            "\
friday 09:00-17:00

2008-04-01 / 7 00:00-24:00
monday 2 - thursday 3 / 2 00:00-24:00
",
        ),
        @r"
    success: true
    exit_code: 0
    ----- stdout -----
    standard	friday 09:00-17:00
    calendar-date	2008-04-01 / 7 00:00-24:00
    week-day	monday 2 - thursday 3 / 2 00:00-24:00

    ----- stderr -----
    ",
    );
}

#[test]
fn structural_errors() {
    assert_cmd_snapshot!(
        timeperiod([
            "resolve",
            "day 32 00:00-24:00",
            "monday 6 - friday 1 09:00-25:00",
            "someday 1 smarch - friday 2 may 00:00-24:00",
        ]),
        @r"
    success: true
    exit_code: 0
    ----- stdout -----
    month-day	day 32 00:00-24:00
    error	day offset `32` is out of range (expected -31..=31, excluding 0)
    week-day	monday 6 - friday 1 09:00-25:00
    error	weekday offset `6` is out of range (expected -5..=5, excluding 0)
    error	invalid time range `09:00-25:00`
    month-week-day	someday 1 smarch - friday 2 may 00:00-24:00
    error	`someday` is not a valid weekday
    error	`smarch` is not a valid month

    ----- stderr -----
    ",
    );
}
