/*!
A recurrence engine for Nagios-style time periods.

A time period is a named set of recurrence rules, like `monday 09:00-17:00`
or `day -1 - 15 / 5 01:00-24:00`, minus the time covered by other excluded
time periods. This crate resolves free-text rules into typed values and
answers three questions about any instant: is the period open, when does it
next open and when does it next close.

# Example

```
use jiff::tz::TimeZone;
use timeperiod::{Definition, Timeperiods};

let defs = vec![
    Definition::new("workhours")
        .entry("monday 09:00-17:00")
        .entry("tuesday 09:00-17:00")
        .exclude("holidays"),
    Definition::new("holidays").entry("2024-07-16 00:00-24:00"),
];
let periods = Timeperiods::new(&defs, TimeZone::UTC);
assert!(periods.is_correct());

let workhours = periods.find_by_name("workhours").unwrap();
// Monday 2024-07-15 at 12:00 UTC.
assert!(workhours.is_time_valid(1721044800));
// The next day is a holiday, so the next opening is a week later.
assert_eq!(
    workhours.next_valid_time_from(1721062801),
    Some(1721638800),
);
```

Configurations can also be read from `define timeperiod { ... }` object
definitions with [`config::read`] and [`config::parse`].
*/

pub mod calendar;
pub mod config;
pub mod daterange;
pub mod registry;
pub mod resolve;
pub mod timeperiod;
pub mod timerange;

pub use crate::{
    config::Definition,
    daterange::{DateKind, Daterange},
    registry::{Report, Timeperiods},
    resolve::resolve,
    timeperiod::{Timeperiod, Transition},
    timerange::Timerange,
};
