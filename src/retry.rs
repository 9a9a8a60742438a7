//! Field-level retry: re-fetch a record and fill only what is missing.

use crate::config::{DelayRange, RetryBudget};
use crate::error::ScrapeResult;
use crate::fields::{self, AnimeField, RetryPolicy};
use crate::models::AnimeRecord;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

pub trait Sleeper: Sync {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldState {
    Missing,
    Retrying { attempts: u32 },
    Resolved,
    PermanentlyEmpty,
}

impl FieldState {
    pub fn is_pending(&self) -> bool {
        matches!(self, FieldState::Missing | FieldState::Retrying { .. })
    }
}

/// State of every field that was missing after the first fetch.
#[derive(Debug)]
pub struct FieldTracker {
    states: BTreeMap<AnimeField, FieldState>,
    budget: RetryBudget,
}

impl FieldTracker {
    pub fn new(missing: &[AnimeField], budget: RetryBudget) -> Self {
        let mut tracker = Self {
            states: BTreeMap::new(),
            budget,
        };
        for &field in missing {
            let state = if tracker.budget_for(field) == 0 {
                FieldState::PermanentlyEmpty
            } else {
                FieldState::Missing
            };
            tracker.states.insert(field, state);
        }
        tracker
    }

    pub fn budget_for(&self, field: AnimeField) -> u32 {
        match fields::rule_for(field).policy {
            RetryPolicy::SemiOptional => 0,
            RetryPolicy::Limited => self.budget.limited,
            RetryPolicy::Full => self.budget.full,
        }
    }

    pub fn state(&self, field: AnimeField) -> Option<FieldState> {
        self.states.get(&field).copied()
    }

    pub fn pending(&self) -> Vec<AnimeField> {
        self.fields_where(FieldState::is_pending)
    }

    pub fn resolve(&mut self, field: AnimeField) {
        self.states.insert(field, FieldState::Resolved);
    }

    /// A retry came back without a usable value for `field`.
    pub fn record_miss(&mut self, field: AnimeField) {
        let budget = self.budget_for(field);
        let attempts = match self.state(field) {
            Some(FieldState::Retrying { attempts }) => attempts + 1,
            _ => 1,
        };
        let next = if attempts >= budget {
            FieldState::PermanentlyEmpty
        } else {
            FieldState::Retrying { attempts }
        };
        self.states.insert(field, next);
    }

    pub fn abandon_pending(&mut self) {
        for state in self.states.values_mut() {
            if state.is_pending() {
                *state = FieldState::PermanentlyEmpty;
            }
        }
    }

    fn fields_where(&self, predicate: impl Fn(&FieldState) -> bool) -> Vec<AnimeField> {
        self.states
            .iter()
            .filter(|(_, state)| predicate(state))
            .map(|(field, _)| *field)
            .collect()
    }
}

#[derive(Debug)]
pub struct RetryReport {
    pub record: AnimeRecord,
    /// Extra fetches spent.
    pub attempts: u32,
    pub resolved: Vec<AnimeField>,
    /// Fields that ended empty and were cleared.
    pub permanently_empty: Vec<AnimeField>,
}

/// Re-fetches `record` through `refetch` until every missing field is
/// filled or out of budget. Only fields that were missing are ever
/// written, and only with valid values. Whatever is still missing at the
/// end is cleared, and the record is returned either way.
pub fn fill_missing<R>(
    mut record: AnimeRecord,
    budget: &RetryBudget,
    sleeper: &dyn Sleeper,
    mut refetch: R,
) -> RetryReport
where
    R: FnMut() -> ScrapeResult<AnimeRecord>,
{
    let id = record.myanimelist_id;
    let missing = fields::missing_fields(&record);
    let mut tracker = FieldTracker::new(&missing, *budget);
    let mut attempts = 0;

    if !missing.is_empty() {
        debug!("{}: missing {}", id, join_fields(&missing));
    }

    loop {
        let pending = tracker.pending();
        if pending.is_empty() {
            break;
        }

        attempts += 1;
        sleeper.sleep(budget.delay.pick());
        debug!("{}: retry {} for {}", id, attempts, join_fields(&pending));

        let fresh = match refetch() {
            Ok(fresh) => fresh,
            Err(e) => {
                warn!("{}: retry {} failed: {}", id, attempts, e);
                tracker.abandon_pending();
                break;
            }
        };

        for field in pending {
            if record.take_field_from(&fresh, field) {
                tracker.resolve(field);
            } else {
                tracker.record_miss(field);
            }
        }
    }

    let resolved = tracker.fields_where(|s| *s == FieldState::Resolved);
    let permanently_empty = tracker.fields_where(|s| *s == FieldState::PermanentlyEmpty);
    for &field in &permanently_empty {
        record.clear_field(field);
    }

    if !resolved.is_empty() {
        debug!("{}: filled {} after {} retries", id, join_fields(&resolved), attempts);
    }
    if !permanently_empty.is_empty() {
        warn!("{}: saving without {}", id, join_fields(&permanently_empty));
    }

    RetryReport {
        record,
        attempts,
        resolved,
        permanently_empty,
    }
}

/// Runs `op` up to `attempts` times. Not-found is returned immediately.
pub fn with_attempts<T, Op>(attempts: u32, delay: DelayRange, sleeper: &dyn Sleeper, mut op: Op) -> ScrapeResult<T>
where
    Op: FnMut() -> ScrapeResult<T>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_not_found() || attempt >= attempts => return Err(e),
            Err(e) => {
                debug!("attempt {}/{} failed: {}", attempt, attempts, e);
                attempt += 1;
                sleeper.sleep(delay.pick());
            }
        }
    }
}

fn join_fields(fields: &[AnimeField]) -> String {
    fields.iter().map(AnimeField::column).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScrapeError;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    struct NoSleep;

    impl Sleeper for NoSleep {
        fn sleep(&self, _: Duration) {}
    }

    fn budget() -> RetryBudget {
        RetryBudget {
            full: 3,
            limited: 1,
            delay: DelayRange::NONE,
        }
    }

    fn complete() -> AnimeRecord {
        crate::fields::tests::complete_record()
    }

    fn scripted(responses: Vec<ScrapeResult<AnimeRecord>>) -> impl FnMut() -> ScrapeResult<AnimeRecord> {
        let queue = RefCell::new(VecDeque::from(responses));
        move || {
            queue
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(ScrapeError::Status { url: "u".into(), status: 500 }))
        }
    }

    #[test]
    fn complete_record_needs_no_retry() {
        let report = fill_missing(complete(), &budget(), &NoSleep, scripted(vec![]));
        assert_eq!(report.attempts, 0);
        assert!(report.permanently_empty.is_empty());
    }

    #[test]
    fn fills_only_missing_fields() {
        let mut first = complete();
        first.genres = None;
        let mut retry = complete();
        retry.genres = Some("Action".into());
        retry.title = Some("Different title".into());

        let report = fill_missing(first, &budget(), &NoSleep, scripted(vec![Ok(retry)]));

        assert_eq!(report.attempts, 1);
        assert_eq!(report.resolved, vec![AnimeField::Genres]);
        assert_eq!(report.record.genres.as_deref(), Some("Action"));
        assert_eq!(report.record.title.as_deref(), Some("Cowboy Bebop"));
    }

    #[test]
    fn populated_fields_never_regress() {
        let mut first = complete();
        first.source = None;
        let mut retry = AnimeRecord::new(5, "");
        retry.source = Some("Manga".into());

        let report = fill_missing(first, &budget(), &NoSleep, scripted(vec![Ok(retry)]));

        assert_eq!(report.record.source.as_deref(), Some("Manga"));
        assert_eq!(report.record.title.as_deref(), Some("Cowboy Bebop"));
        assert!(!report.record.characters.is_empty());
    }

    #[test]
    fn semi_optional_fields_are_not_retried() {
        let mut first = complete();
        first.demographic = None;
        first.themes = Some("Unknown".into());

        let report = fill_missing(first, &budget(), &NoSleep, scripted(vec![]));

        assert_eq!(report.attempts, 0);
        assert_eq!(report.permanently_empty, vec![AnimeField::Themes, AnimeField::Demographic]);
        assert_eq!(report.record.themes, None, "placeholder is cleared to the empty marker");
    }

    #[test]
    fn limited_fields_stop_early_full_fields_continue() {
        let mut first = complete();
        first.characters.clear();
        first.rating = None;
        let mut empty = complete();
        empty.characters.clear();
        empty.rating = None;

        let responses = (0..5).map(|_| Ok(empty.clone())).collect();
        let report = fill_missing(first, &budget(), &NoSleep, scripted(responses));

        assert_eq!(report.attempts, 3);
        assert_eq!(report.permanently_empty, vec![AnimeField::Rating, AnimeField::Characters]);
        assert_eq!(report.record.rating, None);
    }

    #[test]
    fn failed_refetch_ends_the_loop() {
        let mut first = complete();
        first.rating = Some("N/A".into());

        let report = fill_missing(
            first,
            &budget(),
            &NoSleep,
            scripted(vec![Err(ScrapeError::NotFound { url: "u".into() })]),
        );

        assert_eq!(report.attempts, 1);
        assert_eq!(report.permanently_empty, vec![AnimeField::Rating]);
        assert_eq!(report.record.rating, None);
    }

    #[test]
    fn tracker_walks_states() {
        let mut tracker = FieldTracker::new(&[AnimeField::Genres, AnimeField::Characters, AnimeField::Premiered], budget());

        assert_eq!(tracker.state(AnimeField::Premiered), Some(FieldState::PermanentlyEmpty));
        assert_eq!(tracker.pending(), vec![AnimeField::Genres, AnimeField::Characters]);

        tracker.record_miss(AnimeField::Genres);
        tracker.record_miss(AnimeField::Characters);
        assert_eq!(tracker.state(AnimeField::Genres), Some(FieldState::Retrying { attempts: 1 }));
        assert_eq!(tracker.state(AnimeField::Characters), Some(FieldState::PermanentlyEmpty));

        tracker.resolve(AnimeField::Genres);
        assert!(tracker.pending().is_empty());
    }

    #[test]
    fn with_attempts_retries_transient_errors() {
        let mut calls = 0;
        let result = with_attempts(3, DelayRange::NONE, &NoSleep, || {
            calls += 1;
            if calls < 3 {
                Err(ScrapeError::Status { url: "u".into(), status: 503 })
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn with_attempts_stops_on_not_found() {
        let mut calls = 0;
        let result: ScrapeResult<()> = with_attempts(5, DelayRange::NONE, &NoSleep, || {
            calls += 1;
            Err(ScrapeError::NotFound { url: "u".into() })
        });
        assert!(result.unwrap_err().is_not_found());
        assert_eq!(calls, 1);
    }
}
