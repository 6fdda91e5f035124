use std::{
    cell::Cell,
    collections::BTreeMap,
    sync::{
        Arc, Mutex, OnceLock, Weak,
        atomic::{AtomicBool, Ordering},
    },
};

use jiff::tz::TimeZone;

use crate::{
    calendar::DAY,
    daterange::Daterange,
    resolve::resolve,
};

/// How far ahead transition searches look before giving up.
const HORIZON: i64 = 366 * DAY + 1;

/// Searches for the next invalid time step forward by a minute at a time
/// until this far away from the starting point, and by an hour afterwards.
const FINE_SEARCH: i64 = 30 * DAY;

/// A memo of transition search results, keyed by the instant searched from.
type Cache = Mutex<BTreeMap<i64, Option<i64>>>;

/// A named set of recurrence rules minus a set of excluded time periods.
///
/// A time period is built in two phases. First, it is populated with raw
/// entries (like `monday 09:00-17:00`) and the names of the time periods it
/// excludes, and then the entries are resolved via `explode`. Second, once
/// every time period of a configuration is shared behind an `Arc`, the
/// excluded names are linked to live time periods via `link`. A time period
/// that is never linked behaves as if it excludes nothing.
///
/// Queries never fail. They take `&self` and are safe to call from multiple
/// threads. Transition searches are memoized per time period until evicted
/// with `clean_cache`.
#[derive(Debug)]
pub struct Timeperiod {
    name: String,
    alias: Option<String>,
    tz: TimeZone,
    unresolved: Vec<String>,
    dateranges: Vec<Daterange>,
    invalid_entries: Vec<String>,
    exclude_names: Vec<String>,
    excludes: OnceLock<Vec<Weak<Timeperiod>>>,
    valid_cache: Cache,
    invalid_cache: Cache,
    is_active: Mutex<Option<bool>>,
    warned_loop: AtomicBool,
}

impl Timeperiod {
    /// Create a new empty time period whose rules are evaluated in the
    /// given time zone.
    pub fn new(name: impl Into<String>, tz: TimeZone) -> Timeperiod {
        Timeperiod {
            name: name.into(),
            alias: None,
            tz,
            unresolved: vec![],
            dateranges: vec![],
            invalid_entries: vec![],
            exclude_names: vec![],
            excludes: OnceLock::new(),
            valid_cache: Mutex::new(BTreeMap::new()),
            invalid_cache: Mutex::new(BTreeMap::new()),
            is_active: Mutex::new(None),
            warned_loop: AtomicBool::new(false),
        }
    }

    /// Returns the name of this time period.
    pub fn get_name(&self) -> &str {
        &self.name
    }

    /// Returns the human readable alias of this time period, if one was
    /// given.
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn set_alias(&mut self, alias: impl Into<String>) {
        self.alias = Some(alias.into());
    }

    /// Returns the time zone that rules are evaluated in.
    pub fn time_zone(&self) -> &TimeZone {
        &self.tz
    }

    /// Add a raw entry to be resolved by the next call to `explode`.
    pub fn add_entry(&mut self, entry: impl Into<String>) {
        self.unresolved.push(entry.into());
    }

    /// Add the name of a time period to exclude. It is resolved by `link`.
    pub fn add_exclude(&mut self, name: impl Into<String>) {
        self.exclude_names.push(name.into());
    }

    /// Resolve every raw entry added so far into a recurrence rule.
    ///
    /// Entries that no form of the grammar accepts are recorded in
    /// `invalid_entries`. They are never a source of validity.
    pub fn explode(&mut self) {
        for entry in std::mem::take(&mut self.unresolved) {
            match resolve(&entry) {
                Some(dr) => self.dateranges.push(dr),
                None => {
                    log::info!(
                        "[timeperiod::{}] no match for entry `{entry}`",
                        self.name,
                    );
                    self.invalid_entries.push(entry);
                }
            }
        }
    }

    /// Link the excluded time periods. This is done at most once, later
    /// calls are ignored.
    pub fn link(&self, excludes: Vec<Weak<Timeperiod>>) {
        if self.excludes.set(excludes).is_err() {
            log::debug!(
                "[timeperiod::{}] excludes already linked, ignoring",
                self.name,
            );
        }
    }

    /// Returns the entries that have been added but not yet resolved.
    pub fn unresolved(&self) -> &[String] {
        &self.unresolved
    }

    /// Returns the recurrence rules of this time period, in order.
    pub fn dateranges(&self) -> &[Daterange] {
        &self.dateranges
    }

    /// Returns the entries that no form of the grammar accepted.
    pub fn invalid_entries(&self) -> &[String] {
        &self.invalid_entries
    }

    /// Returns the names of the excluded time periods, as written.
    pub fn exclude_names(&self) -> &[String] {
        &self.exclude_names
    }

    /// Returns true when every recurrence rule is structurally sound.
    ///
    /// Invalid entries are logged as warnings but do not make a time period
    /// incorrect.
    pub fn is_correct(&self) -> bool {
        let mut correct = true;
        for dr in self.dateranges.iter() {
            if !dr.is_correct() {
                log::error!(
                    "[timeperiod::{}] invalid daterange `{dr}`",
                    self.name,
                );
                correct = false;
            }
        }
        for entry in self.invalid_entries.iter() {
            log::warn!(
                "[timeperiod::{}] invalid entry `{entry}`",
                self.name,
            );
        }
        correct
    }

    /// Returns a description of every structural error in the recurrence
    /// rules of this time period.
    pub fn errors(&self) -> Vec<String> {
        let mut errs = vec![];
        for dr in self.dateranges.iter() {
            for err in dr.errors() {
                errs.push(format!("`{dr}`: {err}"));
            }
        }
        errs
    }

    /// Returns true when `t` (in seconds since the Unix epoch) is inside
    /// this time period.
    pub fn is_time_valid(&self, t: i64) -> bool {
        let pruned = Cell::new(false);
        self.is_time_valid_at(t, &Path::root(self, &pruned))
    }

    /// Returns the smallest instant at or after `t` that is inside this time
    /// period. `None` is returned when there is none within about a year.
    pub fn next_valid_time_from(&self, t: i64) -> Option<i64> {
        let pruned = Cell::new(false);
        self.next_valid_at(t, &Path::root(self, &pruned))
    }

    /// Returns the smallest instant at or after `t` that is outside this
    /// time period. `None` is returned when there is none within about a
    /// year.
    pub fn next_invalid_time_from(&self, t: i64) -> Option<i64> {
        let pruned = Cell::new(false);
        self.next_invalid_at(t, &Path::root(self, &pruned))
    }

    /// Evict every memoized search result for instants before `now`.
    pub fn clean_cache(&self, now: i64) {
        for cache in [&self.valid_cache, &self.invalid_cache] {
            let mut cache = cache.lock().unwrap();
            *cache = cache.split_off(&now);
        }
    }

    /// Returns whether this time period was active at the last activation
    /// check, or `None` if it has never been checked.
    pub fn is_active(&self) -> Option<bool> {
        *self.is_active.lock().unwrap()
    }

    /// Compare the validity of this time period at `now` with the result of
    /// the previous check. When it changed, the transition is logged and
    /// returned.
    pub fn check_and_log_activation_change(
        &self,
        now: i64,
    ) -> Option<Transition> {
        let active = self.is_time_valid(now);
        let was = self.is_active.lock().unwrap().replace(active);
        if was == Some(active) {
            return None;
        }
        let transition = Transition {
            name: self.name.clone(),
            from: match was {
                None => -1,
                Some(false) => 0,
                Some(true) => 1,
            },
            to: i8::from(active),
        };
        log::info!("{transition}");
        Some(transition)
    }

    fn is_time_valid_at(&self, t: i64, path: &Path<'_>) -> bool {
        let mut excludes = self.excludes(path);
        if excludes.any(|ex| ex.is_time_valid_at(t, &path.push(&ex))) {
            return false;
        }
        self.dateranges.iter().any(|dr| dr.is_time_valid(t, &self.tz))
    }

    fn next_valid_at(&self, t: i64, path: &Path<'_>) -> Option<i64> {
        if let Some(&answer) = self.valid_cache.lock().unwrap().get(&t) {
            return answer;
        }
        let answer = self.search_next_valid(t, path);
        if !path.pruned.get() {
            self.valid_cache.lock().unwrap().insert(t, answer);
        }
        answer
    }

    fn search_next_valid(&self, t: i64, path: &Path<'_>) -> Option<i64> {
        let mut current = t;
        loop {
            let mut candidates: Vec<i64> = self
                .dateranges
                .iter()
                .filter_map(|dr| dr.next_valid_time_from(current, &self.tz))
                .collect();
            candidates.sort_unstable();
            let &first = candidates.first()?;
            if self.excludes(path).next().is_none() {
                return Some(first);
            }
            // A candidate is accepted as soon as any one of the excludes
            // is not valid at that instant.
            for &candidate in candidates.iter() {
                let open = self.excludes(path).any(|ex| {
                    !ex.is_time_valid_at(candidate, &path.push(&ex))
                });
                if open {
                    return Some(candidate);
                }
            }
            let next = self
                .excludes(path)
                .filter_map(|ex| ex.next_invalid_at(first, &path.push(&ex)))
                .min()?;
            current = next.max(current + 1);
            if current > t + HORIZON {
                return None;
            }
        }
    }

    fn next_invalid_at(&self, t: i64, path: &Path<'_>) -> Option<i64> {
        if let Some(&answer) = self.invalid_cache.lock().unwrap().get(&t) {
            return answer;
        }
        if !self.is_time_valid_at(t, path) {
            return Some(t);
        }
        let answer = self.search_next_invalid(t, path);
        if !path.pruned.get() {
            self.invalid_cache.lock().unwrap().insert(t, answer);
        }
        answer
    }

    fn search_next_invalid(&self, t: i64, path: &Path<'_>) -> Option<i64> {
        let mut current = t;
        loop {
            // This time period closes either when one of its open rules
            // closes or when one of its excludes opens.
            let closes = self
                .dateranges
                .iter()
                .filter(|dr| dr.is_time_valid(current, &self.tz))
                .filter_map(|dr| dr.next_invalid_time_from(current, &self.tz));
            let opens = self
                .excludes(path)
                .filter_map(|ex| ex.next_valid_at(current, &path.push(&ex)));
            let candidate = closes.chain(opens).min()?;
            if candidate > t + HORIZON {
                return None;
            }
            if !self.is_time_valid_at(candidate, path) {
                return Some(candidate);
            }
            // Another rule picks up where this one left off.
            let step = if candidate > t + FINE_SEARCH { 3600 } else { 60 };
            current = candidate + step;
            if !self.is_time_valid_at(current, path) {
                return Some(current);
            }
        }
    }

    /// Returns the linked excluded time periods that aren't already being
    /// evaluated further up `path`.
    ///
    /// An exclude on the path means the configuration has an exclusion loop.
    /// It is skipped, and the query is marked as pruned so that its answer
    /// isn't memoized.
    fn excludes<'a>(
        &'a self,
        path: &'a Path<'a>,
    ) -> impl Iterator<Item = Arc<Timeperiod>> + 'a {
        let links = self.excludes.get().into_iter().flatten();
        links.filter_map(Weak::upgrade).filter(move |ex| {
            if !path.contains(ex) {
                return true;
            }
            path.pruned.set(true);
            if !self.warned_loop.swap(true, Ordering::Relaxed) {
                log::warn!(
                    "[timeperiod::{}] excludes `{}` through a loop, \
                     ignoring it",
                    self.name,
                    ex.name,
                );
            }
            false
        })
    }

    #[cfg(test)]
    fn cached_next_valid(&self, t: i64) -> Option<Option<i64>> {
        self.valid_cache.lock().unwrap().get(&t).copied()
    }
}

impl std::fmt::Display for Timeperiod {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(ref alias) = self.alias {
            write!(f, " ({alias})")?;
        }
        Ok(())
    }
}

/// The chain of time periods whose excludes are being evaluated by a query,
/// innermost first.
struct Path<'a> {
    tp: &'a Timeperiod,
    parent: Option<&'a Path<'a>>,
    /// Set when an exclude was skipped anywhere in the query.
    pruned: &'a Cell<bool>,
}

impl<'a> Path<'a> {
    fn root(tp: &'a Timeperiod, pruned: &'a Cell<bool>) -> Path<'a> {
        Path { tp, parent: None, pruned }
    }

    fn push(&'a self, tp: &'a Timeperiod) -> Path<'a> {
        Path { tp, parent: Some(self), pruned: self.pruned }
    }

    fn contains(&self, tp: &Timeperiod) -> bool {
        let mut path = Some(self);
        while let Some(p) = path {
            if std::ptr::eq(p.tp, tp) {
                return true;
            }
            path = p.parent;
        }
        false
    }
}

/// A change in the activation state of a time period.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize)]
pub struct Transition {
    /// The name of the time period.
    pub name: String,
    /// `-1` when the previous state is unknown, otherwise `0` for inactive
    /// and `1` for active.
    pub from: i8,
    /// `0` for inactive and `1` for active.
    pub to: i8,
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "TIMEPERIOD TRANSITION: {};{};{}",
            self.name, self.from, self.to
        )
    }
}

#[cfg(test)]
mod tests {
    use jiff::civil::date;

    use crate::calendar;

    use super::*;

    fn utc(year: i16, month: i8, day: i8, h: i8, m: i8) -> i64 {
        let date = date(year, month, day);
        let second = i64::from(h) * 3600 + i64::from(m) * 60;
        calendar::instant(date, second, &TimeZone::UTC).unwrap()
    }

    fn period(name: &str, entries: &[&str]) -> Timeperiod {
        let mut tp = Timeperiod::new(name, TimeZone::UTC);
        for entry in entries {
            tp.add_entry(*entry);
        }
        tp.explode();
        tp
    }

    // 2024-07-22 is a Monday.
    const MONDAY: (i16, i8, i8) = (2024, 7, 22);

    #[test]
    fn scenario_monday() {
        let tp = period("mondays", &["monday 00:00-24:00"]);
        assert!(tp.is_correct());
        let (y, m, d) = MONDAY;
        assert!(tp.is_time_valid(utc(y, m, d, 0, 0)));
        assert!(tp.is_time_valid(utc(y, m, d, 12, 0)));
        assert!(!tp.is_time_valid(utc(y, m, d + 1, 12, 0)));
        assert_eq!(
            tp.next_invalid_time_from(utc(y, m, d, 12, 0)),
            Some(utc(y, m, d + 1, 0, 0)),
        );
        assert_eq!(
            tp.next_valid_time_from(utc(y, m, d + 1, 12, 0)),
            Some(utc(y, m, d + 7, 0, 0)),
        );
    }

    #[test]
    fn union_of_rules() {
        let tp = period(
            "workhours",
            &["monday 09:00-17:00", "tuesday 09:00-17:00"],
        );
        let (y, m, d) = MONDAY;
        assert!(tp.is_time_valid(utc(y, m, d, 9, 0)));
        assert!(!tp.is_time_valid(utc(y, m, d, 18, 0)));
        assert!(tp.is_time_valid(utc(y, m, d + 1, 17, 0)));
        assert!(!tp.is_time_valid(utc(y, m, d + 2, 10, 0)));
        assert_eq!(
            tp.next_valid_time_from(utc(y, m, d, 18, 0)),
            Some(utc(y, m, d + 1, 9, 0)),
        );
    }

    #[test]
    fn contiguous_rules() {
        let tp = period(
            "early-week",
            &["monday 00:00-24:00", "tuesday 00:00-24:00"],
        );
        let (y, m, d) = MONDAY;
        assert_eq!(
            tp.next_invalid_time_from(utc(y, m, d, 12, 0)),
            Some(utc(y, m, d + 2, 0, 0)),
        );
    }

    #[test]
    fn invalid_entries_are_not_fatal() {
        let tp = period(
            "mixed",
            &["not a valid spec !!", "monday 00:00-24:00"],
        );
        assert_eq!(tp.invalid_entries(), &["not a valid spec !!"]);
        assert_eq!(tp.dateranges().len(), 1);
        assert!(tp.is_correct());
        assert!(tp.errors().is_empty());
    }

    #[test]
    fn structural_errors() {
        let tp =
            period("broken", &["monday 25:00-26:00", "day 0 10:00-11:00"]);
        assert!(!tp.is_correct());
        insta::assert_debug_snapshot!(tp.errors(), @r#"
        [
            "`monday 25:00-26:00`: invalid time range `25:00-26:00`",
            "`day 0 10:00-11:00`: day offset `0` is out of range (expected -31..=31, excluding 0)",
        ]
        "#);
        // Queries still work, the broken parts never match.
        let (y, m, d) = MONDAY;
        let t = utc(y, m, d, 12, 0);
        assert!(!tp.is_time_valid(t));
        assert_eq!(tp.next_invalid_time_from(t), Some(t));
    }

    #[test]
    fn no_rules() {
        let tp = period("empty", &[]);
        let (y, m, d) = MONDAY;
        let t = utc(y, m, d, 12, 0);
        assert!(!tp.is_time_valid(t));
        assert_eq!(tp.next_valid_time_from(t), None);
        assert_eq!(tp.next_invalid_time_from(t), Some(t));
    }

    #[test]
    fn always() {
        let tp = period("24x7", &["day 1 - -1 00:00-24:00"]);
        let (y, m, d) = MONDAY;
        let t = utc(y, m, d, 12, 0);
        assert!(tp.is_time_valid(t));
        assert_eq!(tp.next_valid_time_from(t), Some(t));
        assert_eq!(tp.next_invalid_time_from(t), None);
    }

    #[test]
    fn cached_answers() {
        let tp = period("tuesdays", &["tuesday 09:00-17:00"]);
        let (y, m, d) = MONDAY;
        let t = utc(y, m, d, 12, 0);
        assert_eq!(tp.cached_next_valid(t), None);
        let first = tp.next_valid_time_from(t);
        assert_eq!(first, Some(utc(y, m, d + 1, 9, 0)));
        assert_eq!(tp.cached_next_valid(t), Some(first));
        assert_eq!(tp.next_valid_time_from(t), first);
    }

    #[test]
    fn clean_cache_evicts_the_past() {
        let tp = period("tuesdays", &["tuesday 09:00-17:00"]);
        let (y, m, d) = MONDAY;
        let past = utc(y, m, d, 12, 0);
        let future = utc(y, m, d, 13, 0);
        tp.next_valid_time_from(past);
        tp.next_valid_time_from(future);
        tp.clean_cache(future);
        assert_eq!(tp.cached_next_valid(past), None);
        assert!(tp.cached_next_valid(future).is_some());
        // Evicted answers are recomputed on demand.
        let next = tp.next_valid_time_from(past);
        assert_eq!(next, Some(utc(y, m, d + 1, 9, 0)));
        assert!(tp.cached_next_valid(past).is_some());
    }

    #[test]
    fn activation_changes() {
        let tp = period("mondays", &["monday 09:00-17:00"]);
        let (y, m, d) = MONDAY;
        assert_eq!(tp.is_active(), None);

        let tr = tp.check_and_log_activation_change(utc(y, m, d, 8, 0));
        assert_eq!(
            tr.unwrap().to_string(),
            "TIMEPERIOD TRANSITION: mondays;-1;0",
        );
        assert_eq!(tp.is_active(), Some(false));
        // No change, nothing to report.
        let tr = tp.check_and_log_activation_change(utc(y, m, d, 8, 30));
        assert_eq!(tr, None);

        let tr = tp.check_and_log_activation_change(utc(y, m, d, 9, 0));
        assert_eq!(
            tr.unwrap().to_string(),
            "TIMEPERIOD TRANSITION: mondays;0;1",
        );
        let tr = tp.check_and_log_activation_change(utc(y, m, d, 18, 0));
        assert_eq!(
            tr.unwrap().to_string(),
            "TIMEPERIOD TRANSITION: mondays;1;0",
        );
    }

    #[test]
    fn unlinked_excludes_are_ignored() {
        let mut tp = Timeperiod::new("mondays", TimeZone::UTC);
        tp.add_entry("monday 00:00-24:00");
        tp.add_exclude("nope");
        tp.explode();
        let (y, m, d) = MONDAY;
        assert!(tp.is_time_valid(utc(y, m, d, 12, 0)));
    }

    #[test]
    fn excludes() {
        let base = Arc::new({
            let mut tp = period(
                "early-week",
                &["monday 00:00-24:00", "tuesday 00:00-24:00"],
            );
            tp.add_exclude("tuesdays");
            tp
        });
        let tuesdays =
            Arc::new(period("tuesdays", &["tuesday 00:00-24:00"]));
        base.link(vec![Arc::downgrade(&tuesdays)]);
        tuesdays.link(vec![]);

        let (y, m, d) = MONDAY;
        assert!(base.is_time_valid(utc(y, m, d, 12, 0)));
        assert!(!base.is_time_valid(utc(y, m, d + 1, 12, 0)));
        // Closes when the exclude opens.
        assert_eq!(
            base.next_invalid_time_from(utc(y, m, d, 12, 0)),
            Some(utc(y, m, d + 1, 0, 0)),
        );
        // Skips over the excluded Tuesday.
        assert_eq!(
            base.next_valid_time_from(utc(y, m, d + 1, 12, 0)),
            Some(utc(y, m, d + 7, 0, 0)),
        );
    }

    #[test]
    fn self_exclusion_is_skipped() {
        let tp = Arc::new({
            let mut tp = period("loop", &["monday 00:00-24:00"]);
            tp.add_exclude("loop");
            tp
        });
        tp.link(vec![Arc::downgrade(&tp)]);
        let (y, m, d) = MONDAY;
        let t = utc(y, m, d, 12, 0);
        assert!(tp.is_time_valid(t));
        assert_eq!(tp.next_valid_time_from(t), Some(t));
        assert_eq!(tp.next_invalid_time_from(t), Some(utc(y, m, d + 1, 0, 0)));
        // Answers that depend on a loop aren't memoized.
        assert_eq!(tp.cached_next_valid(t), None);
    }

    #[test]
    fn fully_connected_exclusion_loop() {
        let names = ["a", "b", "c"];
        let tps: Vec<Arc<Timeperiod>> = names
            .iter()
            .map(|name| {
                let mut tp = period(name, &["monday 09:00-17:00"]);
                for ex in names {
                    tp.add_exclude(ex);
                }
                Arc::new(tp)
            })
            .collect();
        for tp in tps.iter() {
            tp.link(tps.iter().map(Arc::downgrade).collect());
        }
        let (y, m, d) = MONDAY;
        let t = utc(y, m, d, 12, 0);
        let a = &tps[0];
        // `a` excludes `b` and `c`. Each of them is closed because, with
        // `a` and itself skipped, it excludes the remaining open period.
        assert!(a.is_time_valid(t));
        assert_eq!(a.next_valid_time_from(t), Some(t));
        assert_eq!(
            a.next_invalid_time_from(t),
            Some(utc(y, m, d, 17, 0) + 1),
        );
    }
}
