use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use jiff::tz::TimeZone;

use crate::{
    config::Definition,
    timeperiod::{Timeperiod, Transition},
};

/// Every time period of a configuration, by name.
///
/// Building a registry runs template inheritance, resolves every entry and
/// links excluded time periods by name. Problems found along the way (like
/// an unknown template) don't stop the registry from being built. They are
/// instead reported by `report`.
#[derive(Debug)]
pub struct Timeperiods {
    periods: Vec<Arc<Timeperiod>>,
    by_name: HashMap<String, usize>,
    link_errors: Vec<String>,
    // indices into `periods` of time periods that exclude themselves
    looped: Vec<usize>,
}

impl Timeperiods {
    /// Build a registry from configuration definitions. Every time period
    /// evaluates its rules in the given time zone.
    ///
    /// Definitions with `register 0` are only used as templates.
    pub fn new(defs: &[Definition], tz: TimeZone) -> Timeperiods {
        let mut link_errors = vec![];
        let templates: HashMap<&str, &Definition> = defs
            .iter()
            .filter_map(|def| def.name.as_deref().map(|name| (name, def)))
            .collect();

        let mut periods = vec![];
        let mut by_name = HashMap::new();
        for def in defs.iter().filter(|def| def.register) {
            let Some(ref name) = def.timeperiod_name else { continue };
            if by_name.contains_key(name) {
                link_errors.push(format!(
                    "[timeperiod::{name}] defined more than once, \
                     ignoring all but the first",
                ));
                continue;
            }
            let mut tp = Timeperiod::new(name, tz.clone());
            if let Some(ref alias) = def.alias {
                tp.set_alias(alias);
            }
            for entry in def.entries.iter() {
                tp.add_entry(entry);
            }
            for ex in def.exclude.iter() {
                tp.add_exclude(ex);
            }
            let mut seen = vec![];
            inherit(&mut tp, def, &templates, &mut seen, &mut link_errors);
            tp.explode();
            by_name.insert(name.clone(), periods.len());
            periods.push(Arc::new(tp));
        }

        let mut links = vec![];
        for tp in periods.iter() {
            let mut indices = vec![];
            for ex in tp.exclude_names() {
                match by_name.get(ex) {
                    Some(&i) => indices.push(i),
                    None => {
                        log::error!(
                            "[timeperiod::{}] unknown {ex} timeperiod",
                            tp.get_name(),
                        );
                        link_errors.push(format!(
                            "[timeperiod::{}] unknown time period `{ex}` \
                             in exclude",
                            tp.get_name(),
                        ));
                    }
                }
            }
            let weak = indices.iter().map(|&i| Arc::downgrade(&periods[i]));
            tp.link(weak.collect());
            links.push(indices);
        }
        let looped = find_exclude_cycles(&links);
        for &i in looped.iter() {
            log::error!(
                "[timeperiod::{}] is in a loop in exclude parameter",
                periods[i].get_name(),
            );
        }
        log::debug!("loaded {} time periods", periods.len());
        Timeperiods { periods, by_name, link_errors, looped }
    }

    /// Returns the time period with the given name, if it exists.
    pub fn find_by_name(&self, name: &str) -> Option<&Arc<Timeperiod>> {
        self.by_name.get(name).map(|&i| &self.periods[i])
    }

    /// Iterate over every time period in the order in which they were
    /// defined.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Timeperiod>> {
        self.periods.iter()
    }

    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    /// Returns the time periods that can reach themselves by following
    /// excludes, in definition order.
    ///
    /// Loops are found (and logged as errors) once, when the registry is
    /// built. They don't make queries hang, but their answers are
    /// meaningless.
    pub fn check_exclude_cycles(&self) -> Vec<&Arc<Timeperiod>> {
        self.looped.iter().map(|&i| &self.periods[i]).collect()
    }

    /// Returns true when this configuration has no errors. Warnings are
    /// fine.
    pub fn is_correct(&self) -> bool {
        let mut correct = self.link_errors.is_empty();
        correct &= self.check_exclude_cycles().is_empty();
        for tp in self.periods.iter() {
            correct &= tp.is_correct();
        }
        correct
    }

    /// Returns every problem found in this configuration.
    pub fn report(&self) -> Report {
        let mut report = Report::default();
        report.errors.extend(self.link_errors.iter().cloned());
        for tp in self.periods.iter() {
            let name = tp.get_name();
            for entry in tp.invalid_entries() {
                report.warnings.push(format!(
                    "[timeperiod::{name}] invalid entry `{entry}`"
                ));
            }
            for err in tp.errors() {
                report.errors.push(format!("[timeperiod::{name}] {err}"));
            }
        }
        for tp in self.check_exclude_cycles() {
            report.errors.push(format!(
                "[timeperiod::{}] is in a loop in exclude parameter",
                tp.get_name(),
            ));
        }
        report
    }

    /// Evict memoized search results for instants before `now` from every
    /// time period.
    pub fn clean_caches(&self, now: i64) {
        for tp in self.periods.iter() {
            tp.clean_cache(now);
        }
    }

    /// Check every time period for a change in activation at `now`, and
    /// return the transitions that happened.
    pub fn check_and_log_activation_changes(
        &self,
        now: i64,
    ) -> Vec<Transition> {
        self.periods
            .iter()
            .filter_map(|tp| tp.check_and_log_activation_change(now))
            .collect()
    }
}

/// Warnings and errors found in a configuration.
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Serialize)]
pub struct Report {
    /// Problems that don't affect correctness, like unrecognized entries.
    pub warnings: Vec<String>,
    /// Problems that make a configuration incorrect.
    pub errors: Vec<String>,
}

/// Returns the indices of the nodes that can reach themselves in the given
/// adjacency lists, in order.
fn find_exclude_cycles(links: &[Vec<usize>]) -> Vec<usize> {
    let mut looped = vec![];
    for start in 0..links.len() {
        let mut seen = BTreeSet::new();
        let mut stack = links[start].clone();
        while let Some(i) = stack.pop() {
            if i == start {
                looped.push(start);
                break;
            }
            if seen.insert(i) {
                stack.extend(links[i].iter().copied());
            }
        }
    }
    looped
}

/// Copy entries from the templates of `def` (and their templates) into `tp`.
///
/// Excludes are inherited only when `tp` has none of its own. The first
/// alias found wins.
fn inherit(
    tp: &mut Timeperiod,
    def: &Definition,
    templates: &HashMap<&str, &Definition>,
    seen: &mut Vec<String>,
    errors: &mut Vec<String>,
) {
    for name in def.uses.iter() {
        if seen.contains(name) {
            continue;
        }
        seen.push(name.clone());
        let Some(template) = templates.get(name.as_str()) else {
            log::error!(
                "[timeperiod::{}] unknown template `{name}`",
                tp.get_name(),
            );
            errors.push(format!(
                "[timeperiod::{}] unknown template `{name}`",
                tp.get_name(),
            ));
            continue;
        };
        log::trace!("[timeperiod::{}] inheriting from {name}", tp.get_name());
        for entry in template.entries.iter() {
            tp.add_entry(entry);
        }
        if tp.exclude_names().is_empty() {
            for ex in template.exclude.iter() {
                tp.add_exclude(ex);
            }
        }
        if tp.alias().is_none() {
            if let Some(ref alias) = template.alias {
                tp.set_alias(alias);
            }
        }
        inherit(tp, template, templates, seen, errors);
    }
}

#[cfg(test)]
mod tests {
    use jiff::civil::date;

    use crate::{calendar, config};

    use super::*;

    fn utc(year: i16, month: i8, day: i8, h: i8, m: i8) -> i64 {
        let date = date(year, month, day);
        let second = i64::from(h) * 3600 + i64::from(m) * 60;
        calendar::instant(date, second, &TimeZone::UTC).unwrap()
    }

    fn registry(config: &str) -> Timeperiods {
        let defs = config::parse(config.as_bytes()).unwrap();
        Timeperiods::new(&defs, TimeZone::UTC)
    }

    #[test]
    fn scenario_exclude() {
        let tps = Timeperiods::new(
            &[
                Definition::new("early-week")
                    .entry("monday 00:00-24:00")
                    .entry("tuesday 00:00-24:00")
                    .exclude("tuesdays"),
                Definition::new("tuesdays").entry("tuesday 00:00-24:00"),
            ],
            TimeZone::UTC,
        );
        assert!(tps.is_correct());
        let tp = tps.find_by_name("early-week").unwrap();
        // 2024-07-22 is a Monday.
        assert!(tp.is_time_valid(utc(2024, 7, 22, 12, 0)));
        assert!(!tp.is_time_valid(utc(2024, 7, 23, 12, 0)));
        assert!(!tp.is_time_valid(utc(2024, 7, 30, 0, 0)));
    }

    #[test]
    fn maintenance_window() {
        // February, minus the first Monday of each month.
        let tps = registry(
            "\
define timeperiod {
    timeperiod_name  maintenance
    february 1 - -1  00:00-24:00
    exclude          first-mondays
}
define timeperiod {
    timeperiod_name  first-mondays
    monday 1         00:00-24:00
}
",
        );
        let tp = tps.find_by_name("maintenance").unwrap();
        // 2024-02-05 is the first Monday of February 2024.
        assert!(tp.is_time_valid(utc(2024, 2, 4, 12, 0)));
        assert!(!tp.is_time_valid(utc(2024, 2, 5, 12, 0)));
        assert!(tp.is_time_valid(utc(2024, 2, 6, 12, 0)));
        assert!(tp.is_time_valid(utc(2024, 2, 29, 23, 59)));
        assert!(!tp.is_time_valid(utc(2024, 3, 1, 0, 0)));
        assert_eq!(
            tp.next_invalid_time_from(utc(2024, 2, 1, 0, 0)),
            Some(utc(2024, 2, 5, 0, 0)),
        );
        assert_eq!(
            tp.next_valid_time_from(utc(2024, 2, 5, 12, 0)),
            Some(utc(2024, 2, 6, 0, 0)),
        );
        assert_eq!(
            tp.next_valid_time_from(utc(2024, 3, 1, 0, 0)),
            Some(utc(2025, 2, 1, 0, 0)),
        );
    }

    #[test]
    fn overlapping_excludes_in_searches() {
        let tps = Timeperiods::new(
            &[
                Definition::new("daily")
                    .entry("day 1 - -1 00:00-24:00")
                    .exclude("mondays")
                    .exclude("monday-afternoons"),
                Definition::new("mondays").entry("monday 00:00-24:00"),
                Definition::new("monday-afternoons")
                    .entry("monday 12:00-24:00"),
            ],
            TimeZone::UTC,
        );
        let tp = tps.find_by_name("daily").unwrap();
        let t = utc(2024, 7, 22, 6, 0);
        assert!(!tp.is_time_valid(t));
        // A search accepts a candidate once any single exclude is closed.
        assert_eq!(tp.next_valid_time_from(t), Some(t));
    }

    #[test]
    fn templates() {
        let tps = registry(
            "\
define timeperiod {
    name      weekend
    alias     Weekend
    register  0
    saturday  00:00-24:00
    sunday    00:00-24:00
    exclude   holidays
}
define timeperiod {
    timeperiod_name  week
    use              weekend
    monday           09:00-17:00
}
define timeperiod {
    timeperiod_name  holidays
    2024-07-27       00:00-24:00
}
",
        );
        assert_eq!(tps.len(), 2);
        assert!(tps.find_by_name("weekend").is_none());
        let week = tps.find_by_name("week").unwrap();
        assert_eq!(week.alias(), Some("Weekend"));
        assert_eq!(week.dateranges().len(), 3);
        assert_eq!(week.exclude_names(), &["holidays"]);
        // Saturday the 27th is a holiday, Sunday the 28th is not.
        assert!(!week.is_time_valid(utc(2024, 7, 27, 12, 0)));
        assert!(week.is_time_valid(utc(2024, 7, 28, 12, 0)));
        assert!(tps.is_correct());
    }

    #[test]
    fn template_loops_are_harmless() {
        let tps = registry(
            "\
define timeperiod {
    name      a
    register  0
    use       b
    monday    00:00-24:00
}
define timeperiod {
    name             b
    timeperiod_name  b
    use              a
    tuesday          00:00-24:00
}
",
        );
        let b = tps.find_by_name("b").unwrap();
        // Its own entry, then `a`'s, then its own again through `a`.
        assert_eq!(b.dateranges().len(), 3);
    }

    #[test]
    fn report() {
        let tps = registry(
            "\
define timeperiod {
    timeperiod_name  broken
    use              nope
    exclude          missing
    monday           25:00-26:00
    not a valid spec !!
}
",
        );
        assert!(!tps.is_correct());
        insta::assert_json_snapshot!(tps.report(), @r#"
        {
          "warnings": [
            "[timeperiod::broken] invalid entry `not a valid spec !!`"
          ],
          "errors": [
            "[timeperiod::broken] unknown template `nope`",
            "[timeperiod::broken] unknown time period `missing` in exclude",
            "[timeperiod::broken] `monday 25:00-26:00`: invalid time range `25:00-26:00`"
          ]
        }
        "#);
    }

    #[test]
    fn invalid_entries_are_only_warnings() {
        let tps = registry(
            "\
define timeperiod {
    timeperiod_name  mixed
    not a valid spec !!
    monday 00:00-24:00
}
",
        );
        assert!(tps.is_correct());
        let report = tps.report();
        assert_eq!(report.warnings.len(), 1);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn exclude_loops() {
        const MONDAY: &str = "monday 09:00-17:00";
        let tps = Timeperiods::new(
            &[
                Definition::new("me").entry(MONDAY).exclude("me"),
                Definition::new("a").entry(MONDAY).exclude("b"),
                Definition::new("b").entry(MONDAY).exclude("a"),
                Definition::new("c").entry(MONDAY).exclude("a"),
            ],
            TimeZone::UTC,
        );
        let looped: Vec<&str> = tps
            .check_exclude_cycles()
            .into_iter()
            .map(|tp| tp.get_name())
            .collect();
        assert_eq!(looped, vec!["me", "a", "b"]);
        assert!(!tps.is_correct());

        // Queries still finish.
        let t = utc(2024, 7, 22, 12, 0);
        for tp in tps.iter() {
            let _ = tp.is_time_valid(t);
            let _ = tp.next_valid_time_from(t);
            let _ = tp.next_invalid_time_from(t);
        }
    }

    #[test]
    fn transitions() {
        let tps = Timeperiods::new(
            &[
                Definition::new("mondays").entry("monday 09:00-17:00"),
                Definition::new("tuesdays").entry("tuesday 09:00-17:00"),
            ],
            TimeZone::UTC,
        );
        let got: Vec<String> = tps
            .check_and_log_activation_changes(utc(2024, 7, 22, 12, 0))
            .iter()
            .map(|tr| tr.to_string())
            .collect();
        assert_eq!(
            got,
            vec![
                "TIMEPERIOD TRANSITION: mondays;-1;1",
                "TIMEPERIOD TRANSITION: tuesdays;-1;0",
            ],
        );
        let later = utc(2024, 7, 23, 12, 0);
        let got = tps.check_and_log_activation_changes(later);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].to, 0);
        assert_eq!(got[1].to, 1);
        assert!(tps.check_and_log_activation_changes(later).is_empty());
    }

    #[test]
    fn clean_caches() {
        let tps = Timeperiods::new(
            &[Definition::new("mondays").entry("monday 09:00-17:00")],
            TimeZone::UTC,
        );
        let tp = tps.find_by_name("mondays").unwrap();
        let t = utc(2024, 7, 22, 12, 0);
        let first = tp.next_invalid_time_from(t);
        tps.clean_caches(t + 1);
        assert_eq!(tp.next_invalid_time_from(t), first);
    }
}
