//! Watcher scheduling.
//!
//! A single event loop owns one timeline per watcher. Nothing runs until the
//! [`StartGate`] opens; then every watcher runs once immediately and afterwards at
//! its next cron occurrence (or fixed interval). The next run of a watcher is
//! computed only after its current run finishes, so runs of one watcher never
//! overlap while different watchers run concurrently.

pub mod clock;
pub mod gate;
pub mod readiness;
pub mod schedule;

use crate::config::{FileProcessingConfig, WatcherConfig};
use crate::processor::WatcherRunner;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use clock::{Clock, ManualClock, SystemClock};
pub use gate::StartGate;
pub use readiness::{HttpHealthCheck, ReadinessCheck, WmsPingCheck, run_readiness_probe};
pub use schedule::{WatcherSchedule, normalize_cron};

pub struct Scheduler {
    watchers: Vec<(WatcherConfig, WatcherSchedule)>,
    runner: Arc<dyn WatcherRunner>,
    clock: Arc<dyn Clock>,
    gate: StartGate,
}

impl Scheduler {
    pub fn new(
        config: &FileProcessingConfig,
        runner: Arc<dyn WatcherRunner>,
        clock: Arc<dyn Clock>,
        gate: StartGate,
    ) -> Self {
        let fallback = config.processing_interval();
        let watchers = config
            .file_watchers
            .iter()
            .map(|watcher| (watcher.clone(), WatcherSchedule::new(watcher, fallback)))
            .collect();
        Self {
            watchers,
            runner,
            clock,
            gate,
        }
    }

    pub fn gate(&self) -> &StartGate {
        &self.gate
    }

    /// Releases the start gate; the first pass of every watcher starts at once.
    pub fn start_processing(&self) {
        if self.gate.release() {
            info!("start gate released");
        }
    }

    /// Runs until `cancel` fires. In-flight watcher runs are awaited before returning.
    pub async fn run(&self, cancel: &CancellationToken) {
        if self.watchers.is_empty() {
            warn!("no file watchers configured, scheduler idle");
            return;
        }

        info!(watchers = self.watchers.len(), "waiting for start gate");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("cancelled before start gate opened");
                return;
            }
            _ = self.gate.wait() => {}
        }

        let start = self.clock.now();
        let mut due: BinaryHeap<Reverse<(DateTime<Utc>, usize)>> =
            (0..self.watchers.len()).map(|index| Reverse((start, index))).collect();
        let mut running = FuturesUnordered::new();

        loop {
            let now = self.clock.now();
            while let Some(&Reverse((at, index))) = due.peek() {
                if at > now {
                    break;
                }
                due.pop();
                running.push(self.launch(index, cancel));
            }
            let next_due = due.peek().map(|Reverse((at, _))| *at);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(index) = running.next(), if !running.is_empty() => {
                    let (watcher, schedule) = &self.watchers[index];
                    let next = schedule.next_after(self.clock.now());
                    debug!(watcher = %watcher.name, next_run = %next, "watcher re-armed");
                    due.push(Reverse((next, index)));
                }
                _ = self.sleep_until(next_due) => {}
            }
        }

        if !running.is_empty() {
            info!(in_flight = running.len(), "waiting for running watchers to finish");
        }
        while running.next().await.is_some() {}
        info!("scheduler stopped");
    }

    fn launch(&self, index: usize, cancel: &CancellationToken) -> impl Future<Output = usize> + use<> {
        let (watcher, _) = &self.watchers[index];
        let name = watcher.name.clone();
        let handle = {
            let runner = Arc::clone(&self.runner);
            let watcher = watcher.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { runner.run_watcher(&watcher, &cancel).await })
        };
        debug!(watcher = %name, "watcher run started");
        async move {
            match handle.await {
                Ok(Ok(())) => debug!(watcher = %name, "watcher run finished"),
                Ok(Err(err)) => error!(watcher = %name, error = %err, "watcher run failed"),
                Err(err) => error!(watcher = %name, error = %err, "watcher run aborted"),
            }
            index
        }
    }

    async fn sleep_until(&self, at: Option<DateTime<Utc>>) {
        match at {
            Some(at) => self.clock.sleep_until(at).await,
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EntityKind, Result};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records `(watcher, virtual time)` per run and cancels after `stop_after` runs.
    struct ScriptedRunner {
        clock: Arc<ManualClock>,
        runs: Mutex<Vec<(String, DateTime<Utc>)>>,
        active: Mutex<HashMap<String, usize>>,
        overlapped: Mutex<bool>,
        stop_after: usize,
        cancel: CancellationToken,
    }

    impl ScriptedRunner {
        fn new(clock: Arc<ManualClock>, stop_after: usize, cancel: CancellationToken) -> Self {
            Self {
                clock,
                runs: Mutex::new(Vec::new()),
                active: Mutex::new(HashMap::new()),
                overlapped: Mutex::new(false),
                stop_after,
                cancel,
            }
        }

        fn runs(&self) -> Vec<(String, DateTime<Utc>)> {
            self.runs.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WatcherRunner for ScriptedRunner {
        async fn run_watcher(&self, watcher: &WatcherConfig, _cancel: &CancellationToken) -> Result<()> {
            {
                let mut active = self.active.lock().unwrap();
                let count = active.entry(watcher.name.clone()).or_default();
                if *count > 0 {
                    *self.overlapped.lock().unwrap() = true;
                }
                *count += 1;
            }
            for _ in 0..3 {
                tokio::task::yield_now().await;
            }
            let total = {
                let mut runs = self.runs.lock().unwrap();
                runs.push((watcher.name.clone(), self.clock.now()));
                runs.len()
            };
            *self.active.lock().unwrap().get_mut(&watcher.name).unwrap() -= 1;
            if total >= self.stop_after {
                self.cancel.cancel();
            }
            Ok(())
        }
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, minute, 0).unwrap()
    }

    fn config(watchers: Vec<WatcherConfig>) -> FileProcessingConfig {
        FileProcessingConfig {
            file_watchers: watchers,
            ..FileProcessingConfig::default()
        }
    }

    fn watcher(name: &str, cron: &str) -> WatcherConfig {
        WatcherConfig::new(name, "/tmp/in", EntityKind::Customer).cron(cron)
    }

    #[tokio::test]
    async fn test_runs_immediately_then_on_cron_occurrences() {
        let clock = Arc::new(ManualClock::new(at(0, 1)));
        let cancel = CancellationToken::new();
        let runner = Arc::new(ScriptedRunner::new(clock.clone(), 3, cancel.clone()));
        let scheduler = Scheduler::new(
            &config(vec![watcher("customers", "*/5 * * * *")]),
            runner.clone(),
            clock.clone(),
            StartGate::new(),
        );
        scheduler.start_processing();

        tokio::time::timeout(Duration::from_secs(5), scheduler.run(&cancel))
            .await
            .unwrap();

        let times: Vec<_> = runner.runs().into_iter().map(|(_, at)| at).collect();
        assert_eq!(times, vec![at(0, 1), at(0, 5), at(0, 10)]);
    }

    #[tokio::test]
    async fn test_watchers_without_cron_use_processing_interval() {
        let clock = Arc::new(ManualClock::new(at(0, 1)));
        let cancel = CancellationToken::new();
        let runner = Arc::new(ScriptedRunner::new(clock.clone(), 3, cancel.clone()));
        let scheduler = Scheduler::new(
            &config(vec![watcher("customers", "")]),
            runner.clone(),
            clock.clone(),
            StartGate::new(),
        );
        scheduler.start_processing();

        tokio::time::timeout(Duration::from_secs(5), scheduler.run(&cancel))
            .await
            .unwrap();

        let times: Vec<_> = runner.runs().into_iter().map(|(_, at)| at).collect();
        assert_eq!(times, vec![at(0, 1), at(0, 6), at(0, 11)]);
    }

    #[tokio::test]
    async fn test_runs_of_one_watcher_never_overlap() {
        let clock = Arc::new(ManualClock::new(at(0, 0)));
        let cancel = CancellationToken::new();
        let runner = Arc::new(ScriptedRunner::new(clock.clone(), 12, cancel.clone()));
        let scheduler = Scheduler::new(
            &config(vec![
                watcher("customers", "* * * * *"),
                watcher("products", "*/2 * * * *"),
            ]),
            runner.clone(),
            clock.clone(),
            StartGate::new(),
        );
        scheduler.start_processing();

        tokio::time::timeout(Duration::from_secs(5), scheduler.run(&cancel))
            .await
            .unwrap();

        assert!(!*runner.overlapped.lock().unwrap());
        let runs = runner.runs();
        assert!(runs.len() >= 12);
        assert!(runs.iter().any(|(name, _)| name == "customers"));
        assert!(runs.iter().any(|(name, _)| name == "products"));
        for name in ["customers", "products"] {
            let times: Vec<_> = runs.iter().filter(|(n, _)| n == name).map(|(_, at)| *at).collect();
            assert!(times.windows(2).all(|pair| pair[0] < pair[1]), "{name}: {times:?}");
        }
    }

    #[tokio::test]
    async fn test_nothing_runs_before_gate_opens() {
        let clock = Arc::new(ManualClock::new(at(0, 1)));
        let cancel = CancellationToken::new();
        let runner = Arc::new(ScriptedRunner::new(clock.clone(), 1, cancel.clone()));
        let scheduler = Arc::new(Scheduler::new(
            &config(vec![watcher("customers", "*/5 * * * *")]),
            runner.clone(),
            clock.clone(),
            StartGate::new(),
        ));

        let task = {
            let scheduler = scheduler.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { scheduler.run(&cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(runner.runs().is_empty());

        scheduler.gate().release();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(runner.runs().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_before_gate_returns() {
        let clock = Arc::new(ManualClock::new(at(0, 1)));
        let cancel = CancellationToken::new();
        let runner = Arc::new(ScriptedRunner::new(clock.clone(), 1, cancel.clone()));
        let scheduler = Scheduler::new(
            &config(vec![watcher("customers", "*/5 * * * *")]),
            runner.clone(),
            clock,
            StartGate::new(),
        );
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), scheduler.run(&cancel))
            .await
            .unwrap();
        assert!(runner.runs().is_empty());
    }
}
