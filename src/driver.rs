//! Batch driver shared by every scrape job.
//!
//! Each item goes through one job call (fetch, parse and any field retry)
//! and its outcome is settled in one place: successes are appended to the
//! sink, everything else is counted by the consecutive-failure breaker.
//! In parallel mode the settling happens on the coordinating thread only,
//! so the sink and the breaker are never shared.

use crate::config::BatchOptions;
use crate::error::ScrapeResult;
use crate::models::{AnimeCandidate, CharacterListEntry, SeasonLink};
use crate::retry::Sleeper;
use crate::store::RecordSink;
use crate::tui::{ItemStatus, Progress};
use anyhow::Result;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use tracing::{debug, info, warn};

/// Something a batch works through.
pub trait WorkItem {
    fn label(&self) -> String;
}

impl WorkItem for u32 {
    fn label(&self) -> String {
        format!("anime {}", self)
    }
}

impl WorkItem for AnimeCandidate {
    fn label(&self) -> String {
        format!("{} ({})", self.title, self.url)
    }
}

impl WorkItem for CharacterListEntry {
    fn label(&self) -> String {
        format!("character {} {}", self.character_id, self.name)
    }
}

impl WorkItem for SeasonLink {
    fn label(&self) -> String {
        self.name.clone()
    }
}

/// Counts consecutive non-successes and trips at the threshold.
#[derive(Debug, Clone)]
pub struct FailureBreaker {
    threshold: usize,
    consecutive: usize,
    trips: usize,
}

impl FailureBreaker {
    /// A threshold of 0 never trips.
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            consecutive: 0,
            trips: 0,
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    /// Returns true when this failure reaches the threshold. The counter
    /// starts over after a trip.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive += 1;
        if self.threshold > 0 && self.consecutive >= self.threshold {
            self.consecutive = 0;
            self.trips += 1;
            return true;
        }
        false
    }

    pub fn consecutive(&self) -> usize {
        self.consecutive
    }

    pub fn trips(&self) -> usize {
        self.trips
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub saved: usize,
    pub not_found: usize,
    pub failed: usize,
    /// Items left out because the output already has them.
    pub skipped: usize,
    pub cooldowns: usize,
    pub stopped_early: bool,
}

pub struct Batch<'i, I> {
    pub name: &'i str,
    pub items: &'i [I],
    pub skipped: usize,
}

/// Drops items whose key is already known. Returns the rest, in order,
/// and how many were dropped.
pub fn skip_known<I>(items: Vec<I>, known: &HashSet<u32>, key: impl Fn(&I) -> Option<u32>) -> (Vec<I>, usize) {
    let before = items.len();
    let remaining: Vec<I> = items
        .into_iter()
        .filter(|item| key(item).map_or(true, |k| !known.contains(&k)))
        .collect();
    let skipped = before - remaining.len();
    (remaining, skipped)
}

pub struct BatchDriver<'a> {
    options: BatchOptions,
    sleeper: &'a dyn Sleeper,
    progress: &'a mut dyn Progress,
}

/// Per-run bookkeeping owned by whoever settles outcomes.
struct RunState {
    summary: BatchSummary,
    breaker: FailureBreaker,
    not_found_streak: usize,
    pending_cooldowns: usize,
}

impl<'a> BatchDriver<'a> {
    pub fn new(options: BatchOptions, sleeper: &'a dyn Sleeper, progress: &'a mut dyn Progress) -> Self {
        Self {
            options,
            sleeper,
            progress,
        }
    }

    pub fn run<I, T, S, J>(&mut self, batch: Batch<'_, I>, job: J, sink: &mut S) -> Result<BatchSummary>
    where
        I: WorkItem + Sync,
        T: Send,
        S: RecordSink<T>,
        J: Fn(&I) -> ScrapeResult<T> + Sync,
    {
        let mut state = RunState {
            summary: BatchSummary {
                total: batch.items.len(),
                skipped: batch.skipped,
                ..Default::default()
            },
            breaker: FailureBreaker::new(self.options.failure_threshold),
            not_found_streak: 0,
            pending_cooldowns: 0,
        };

        info!(
            "{}: {} items, {} skipped, {} worker(s)",
            batch.name,
            batch.items.len(),
            batch.skipped,
            self.options.workers.max(1)
        );
        self.progress.start(batch.name, batch.items.len(), batch.skipped);

        if self.options.workers <= 1 {
            self.run_sequential(batch.items, &job, sink, &mut state)?;
        } else {
            self.run_parallel(batch.items, &job, sink, &mut state)?;
        }

        info!(
            "{}: {} saved, {} not found, {} failed, {} cooldowns",
            batch.name, state.summary.saved, state.summary.not_found, state.summary.failed, state.summary.cooldowns
        );
        self.progress.finish(&state.summary);
        Ok(state.summary)
    }

    fn run_sequential<I, T, S, J>(&mut self, items: &[I], job: &J, sink: &mut S, state: &mut RunState) -> Result<()>
    where
        I: WorkItem,
        S: RecordSink<T>,
        J: Fn(&I) -> ScrapeResult<T>,
    {
        for (index, item) in items.iter().enumerate() {
            let label = item.label();
            self.progress.item_started(&label);

            let result = job(item);
            let stop = self.settle(&label, result, sink, state)?;
            self.take_cooldowns(state);
            if stop {
                break;
            }

            if index + 1 < items.len() {
                self.sleeper.sleep(self.options.delay.pick());
            }
        }
        Ok(())
    }

    /// Works through `items` in bounded batches. Workers pull indices from
    /// a shared counter and send outcomes back over a channel; cooldowns
    /// are taken between batches.
    fn run_parallel<I, T, S, J>(&mut self, items: &[I], job: &J, sink: &mut S, state: &mut RunState) -> Result<()>
    where
        I: WorkItem + Sync,
        T: Send,
        S: RecordSink<T>,
        J: Fn(&I) -> ScrapeResult<T> + Sync,
    {
        let workers = self.options.workers.max(1);
        let batch_size = self.options.batch_size.max(1);
        let sleeper = self.sleeper;
        let delay = self.options.delay;

        for (batch_index, chunk) in items.chunks(batch_size).enumerate() {
            debug!("batch {}: {} items", batch_index + 1, chunk.len());
            let next = AtomicUsize::new(0);
            let halt = AtomicBool::new(false);
            let mut stop = false;

            thread::scope(|scope| -> Result<()> {
                let (tx, rx) = mpsc::channel();

                for _ in 0..workers.min(chunk.len()) {
                    let tx = tx.clone();
                    let (next, halt) = (&next, &halt);
                    scope.spawn(move || {
                        while !halt.load(Ordering::Relaxed) {
                            let index = next.fetch_add(1, Ordering::Relaxed);
                            let Some(item) = chunk.get(index) else {
                                break;
                            };
                            let result = job(item);
                            if tx.send((index, result)).is_err() {
                                break;
                            }
                            sleeper.sleep(delay.pick());
                        }
                    });
                }
                drop(tx);

                for (index, result) in rx {
                    let label = chunk[index].label();
                    match self.settle(&label, result, sink, state) {
                        Ok(true) => {
                            stop = true;
                            halt.store(true, Ordering::Relaxed);
                        }
                        Ok(false) => {}
                        Err(e) => {
                            halt.store(true, Ordering::Relaxed);
                            return Err(e);
                        }
                    }
                }
                Ok(())
            })?;

            self.take_cooldowns(state);
            if stop {
                break;
            }
        }
        Ok(())
    }

    /// Books one outcome. Returns true when the run should stop.
    fn settle<T, S>(&mut self, label: &str, result: ScrapeResult<T>, sink: &mut S, state: &mut RunState) -> Result<bool>
    where
        S: RecordSink<T>,
    {
        let status = match result {
            Ok(record) => {
                sink.append(&record)?;
                state.summary.saved += 1;
                state.not_found_streak = 0;
                state.breaker.record_success();
                debug!("{}: saved", label);
                ItemStatus::Saved
            }
            Err(e) if e.is_not_found() => {
                state.summary.not_found += 1;
                state.not_found_streak += 1;
                debug!("{}: {}", label, e);
                ItemStatus::NotFound
            }
            Err(e) => {
                state.summary.failed += 1;
                state.not_found_streak = 0;
                warn!("{}: {}", label, e);
                ItemStatus::Failed { kind: e.kind() }
            }
        };
        self.progress.item_finished(label, status);

        if status != ItemStatus::Saved && state.breaker.record_failure() {
            state.pending_cooldowns += 1;
        }

        if let Some(limit) = self.options.stop_after_not_found {
            if limit > 0 && state.not_found_streak >= limit {
                info!("{} consecutive ids not found, stopping", state.not_found_streak);
                state.summary.stopped_early = true;
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn take_cooldowns(&mut self, state: &mut RunState) {
        while state.pending_cooldowns > 0 {
            state.pending_cooldowns -= 1;
            state.summary.cooldowns += 1;
            let threshold = self.options.failure_threshold;
            warn!(
                "{} consecutive failures, cooling down for {}s",
                threshold,
                self.options.cooldown.as_secs()
            );
            self.progress.cooldown(threshold, self.options.cooldown);
            self.sleeper.sleep(self.options.cooldown);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DelayRange;
    use crate::error::ScrapeError;
    use crate::tui::SilentProgress;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSleeper {
        sleeps: Mutex<Vec<Duration>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
        }
    }

    impl RecordingSleeper {
        fn count(&self, duration: Duration) -> usize {
            self.sleeps.lock().unwrap().iter().filter(|d| **d == duration).count()
        }
    }

    const COOLDOWN: Duration = Duration::from_secs(10);

    fn options(threshold: usize, workers: usize) -> BatchOptions {
        BatchOptions {
            failure_threshold: threshold,
            cooldown: COOLDOWN,
            delay: DelayRange::NONE,
            workers,
            batch_size: 4,
            stop_after_not_found: None,
        }
    }

    fn transient(id: u32) -> ScrapeError {
        ScrapeError::Status {
            url: format!("anime/{}", id),
            status: 503,
        }
    }

    #[test]
    fn breaker_trips_at_threshold_and_resets() {
        let mut breaker = FailureBreaker::new(3);
        assert!(!breaker.record_failure());
        assert!(!breaker.record_failure());
        assert!(breaker.record_failure());
        assert_eq!(breaker.consecutive(), 0);

        assert!(!breaker.record_failure());
        breaker.record_success();
        assert!(!breaker.record_failure());
        assert!(!breaker.record_failure());
        assert_eq!(breaker.trips(), 1);
    }

    #[test]
    fn zero_threshold_never_trips() {
        let mut breaker = FailureBreaker::new(0);
        assert!((0..100).all(|_| !breaker.record_failure()));
    }

    #[test]
    fn exactly_one_cooldown_at_threshold() {
        let sleeper = RecordingSleeper::default();
        let mut progress = SilentProgress;
        let mut driver = BatchDriver::new(options(3, 1), &sleeper, &mut progress);
        let ids: Vec<u32> = (1..=5).collect();
        let mut saved: Vec<u32> = Vec::new();

        // 3 failures trip once, then a success resets, then 1 more failure.
        let summary = driver
            .run(
                Batch { name: "test", items: &ids, skipped: 0 },
                |id| if *id == 4 { Ok(*id) } else { Err(transient(*id)) },
                &mut saved,
            )
            .unwrap();

        assert_eq!(summary.cooldowns, 1);
        assert_eq!(sleeper.count(COOLDOWN), 1);
        assert_eq!(saved, vec![4]);
        assert_eq!(summary.failed, 4);
    }

    #[test]
    fn not_found_counts_toward_the_breaker() {
        let sleeper = RecordingSleeper::default();
        let mut progress = SilentProgress;
        let mut driver = BatchDriver::new(options(2, 1), &sleeper, &mut progress);
        let ids = vec![1u32, 2];
        let mut saved: Vec<u32> = Vec::new();

        let summary = driver
            .run(
                Batch { name: "test", items: &ids, skipped: 0 },
                |id| Err::<u32, _>(ScrapeError::NotFound { url: id.to_string() }),
                &mut saved,
            )
            .unwrap();

        assert_eq!(summary.not_found, 2);
        assert_eq!(summary.cooldowns, 1);
    }

    #[test]
    fn sequential_appends_in_input_order() {
        let sleeper = RecordingSleeper::default();
        let mut progress = SilentProgress;
        let mut driver = BatchDriver::new(options(20, 1), &sleeper, &mut progress);
        let ids: Vec<u32> = vec![9, 3, 7];
        let mut saved: Vec<u32> = Vec::new();

        driver
            .run(Batch { name: "test", items: &ids, skipped: 0 }, |id| Ok(*id * 10), &mut saved)
            .unwrap();

        assert_eq!(saved, vec![90, 30, 70]);
    }

    #[test]
    fn stops_after_consecutive_not_found() {
        let sleeper = RecordingSleeper::default();
        let mut progress = SilentProgress;
        let mut opts = options(0, 1);
        opts.stop_after_not_found = Some(2);
        let mut driver = BatchDriver::new(opts, &sleeper, &mut progress);
        let ids: Vec<u32> = (1..=10).collect();
        let mut saved: Vec<u32> = Vec::new();

        let summary = driver
            .run(
                Batch { name: "scan", items: &ids, skipped: 0 },
                |id| {
                    if *id <= 2 || *id == 4 {
                        Ok(*id)
                    } else {
                        Err(ScrapeError::NotFound { url: id.to_string() })
                    }
                },
                &mut saved,
            )
            .unwrap();

        assert!(summary.stopped_early);
        assert_eq!(saved, vec![1, 2, 4]);
        assert_eq!(summary.not_found, 3);
    }

    #[test]
    fn parallel_saves_every_success() {
        let sleeper = RecordingSleeper::default();
        let mut progress = SilentProgress;
        let mut driver = BatchDriver::new(options(20, 3), &sleeper, &mut progress);
        let ids: Vec<u32> = (1..=10).collect();
        let mut saved: Vec<u32> = Vec::new();

        let summary = driver
            .run(
                Batch { name: "pool", items: &ids, skipped: 0 },
                |id| if id % 5 == 0 { Err(transient(*id)) } else { Ok(*id) },
                &mut saved,
            )
            .unwrap();

        saved.sort_unstable();
        assert_eq!(saved, vec![1, 2, 3, 4, 6, 7, 8, 9]);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.total, 10);
    }

    #[test]
    fn parallel_cooldown_waits_for_batch_end() {
        let sleeper = RecordingSleeper::default();
        let mut progress = SilentProgress;
        let mut driver = BatchDriver::new(options(4, 2), &sleeper, &mut progress);
        let ids: Vec<u32> = (1..=4).collect();
        let mut saved: Vec<u32> = Vec::new();

        let summary = driver
            .run(
                Batch { name: "pool", items: &ids, skipped: 0 },
                |id| Err::<u32, _>(transient(*id)),
                &mut saved,
            )
            .unwrap();

        assert_eq!(summary.cooldowns, 1);
        assert_eq!(sleeper.count(COOLDOWN), 1);
    }

    #[test]
    fn sink_errors_abort_the_run() {
        struct Broken;
        impl RecordSink<u32> for Broken {
            fn append(&mut self, _: &u32) -> Result<()> {
                anyhow::bail!("disk full")
            }
        }

        let sleeper = RecordingSleeper::default();
        let mut progress = SilentProgress;
        let ids: Vec<u32> = (1..=6).collect();
        for workers in [1, 3] {
            let mut driver = BatchDriver::new(options(20, workers), &sleeper, &mut progress);
            let err = driver
                .run(Batch { name: "t", items: &ids, skipped: 0 }, |id| Ok(*id), &mut Broken)
                .unwrap_err();
            assert!(err.to_string().contains("disk full"));
        }
    }

    #[test]
    fn skip_known_keeps_order() {
        let known: HashSet<u32> = [2, 4].into_iter().collect();
        let (rest, skipped) = skip_known(vec![1u32, 2, 3, 4, 5], &known, |id| Some(*id));
        assert_eq!(rest, vec![1, 3, 5]);
        assert_eq!(skipped, 2);
    }
}
