// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Polling engine driving the fetch-extract-match-aggregate-publish cycle.
//!
//! A [`Poller`] owns one background task that retrieves the project's labeled
//! tasks, evaluates them, and publishes a [`Snapshot`] through a watch
//! channel. Cycles run under single-flight discipline: at most one fetch is
//! outstanding, and a manual refresh abandons any in-flight cycle so a stale
//! response can never overwrite newer results. An explicit generation
//! counter is captured at the start of each cycle and checked before
//! publishing.

use crate::{
    Error,
    api::{Project, ProjectID, RawTask},
    client::Client,
    config::EvalConfig,
    eval::{Snapshot, evaluate_corpus},
};
use log::{debug, warn};
use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::{
    sync::{RwLock, mpsc, watch},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at},
};
use tokio_util::sync::CancellationToken;

/// Busy-indicator region covering the key statistics block.
pub const REGION_KEY_STATS: &str = "key-stats";
/// Busy-indicator region covering the per-image result table.
pub const REGION_TABLE: &str = "table";

/// Progress-indicator surface with named regions.
///
/// The poller brackets every fetch cycle with `begin`/`end` calls for the
/// [`REGION_KEY_STATS`] and [`REGION_TABLE`] regions. `end` is always
/// called — on success, failure, supersession, and shutdown alike — so the
/// interface never appears permanently busy.
pub trait StatusIndicator: Send + Sync {
    /// The named region entered a busy state.
    fn begin(&self, region: &str);

    /// The named region left the busy state.
    fn end(&self, region: &str);
}

/// Indicator that ignores all region transitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullIndicator;

impl StatusIndicator for NullIndicator {
    fn begin(&self, _region: &str) {}

    fn end(&self, _region: &str) {}
}

/// Source of project metadata and labeled tasks.
///
/// Implemented by [`Client`] for the live annotation server; tests substitute
/// controllable fakes to exercise the single-flight and staleness contracts
/// without a server.
pub trait TaskSource: Send + Sync + 'static {
    /// Retrieve project metadata.
    fn project(&self, project: ProjectID) -> impl Future<Output = Result<Project, Error>> + Send;

    /// Retrieve the project's labeled tasks as one bulk page.
    fn labeled_tasks(
        &self,
        project: ProjectID,
        page_size: u32,
    ) -> impl Future<Output = Result<Vec<RawTask>, Error>> + Send;
}

impl TaskSource for Client {
    fn project(&self, project: ProjectID) -> impl Future<Output = Result<Project, Error>> + Send {
        Client::project(self, project)
    }

    fn labeled_tasks(
        &self,
        project: ProjectID,
        page_size: u32,
    ) -> impl Future<Output = Result<Vec<RawTask>, Error>> + Send {
        Client::labeled_tasks(self, project, page_size)
    }
}

/// Handle to the background polling task.
///
/// Dropping the handle without calling [`shutdown`][Poller::shutdown] leaves
/// the task running until the runtime shuts down; call `shutdown` to cancel
/// the timer and any in-flight fetch and release all resources.
pub struct Poller {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
    refresh_tx: mpsc::Sender<()>,
    snapshot_rx: watch::Receiver<Option<Arc<Snapshot>>>,
    config: Arc<RwLock<EvalConfig>>,
    generation: Arc<AtomicU64>,
}

impl Poller {
    /// Spawn the polling task for one project.
    ///
    /// One fetch cycle runs immediately on activation; further cycles run on
    /// the configured refresh interval or on [`refresh`][Self::refresh].
    pub fn spawn<S, I>(source: S, project: ProjectID, config: EvalConfig, indicator: I) -> Poller
    where
        S: TaskSource,
        I: StatusIndicator + 'static,
    {
        let cancel = CancellationToken::new();
        let (refresh_tx, refresh_rx) = mpsc::channel(1);
        let (snapshot_tx, snapshot_rx) = watch::channel(None);
        let config = Arc::new(RwLock::new(config));
        let generation = Arc::new(AtomicU64::new(0));

        let handle = tokio::spawn(run(
            source,
            project,
            config.clone(),
            Arc::new(indicator) as Arc<dyn StatusIndicator>,
            cancel.clone(),
            refresh_rx,
            snapshot_tx,
            generation.clone(),
        ));

        Poller {
            handle,
            cancel,
            refresh_tx,
            snapshot_rx,
            config,
            generation,
        }
    }

    /// Subscribe to published snapshots.
    ///
    /// The receiver starts at `None` until the first cycle completes, then
    /// always holds the latest complete snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.snapshot_rx.clone()
    }

    /// Returns the most recently published snapshot, if any.
    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.snapshot_rx.borrow().clone()
    }

    /// Trigger an immediate fetch cycle.
    ///
    /// Any in-flight cycle is abandoned and the refresh cadence restarts.
    /// Rapid triggers coalesce into a single cycle.
    pub fn refresh(&self) {
        let _ = self.refresh_tx.try_send(());
    }

    /// Replace the evaluation parameters and trigger a refresh.
    ///
    /// The new parameters take effect on the next cycle; an in-flight cycle
    /// keeps the parameters it started with (and is abandoned by the
    /// refresh anyway).
    pub async fn update_config(&self, config: EvalConfig) {
        *self.config.write().await = config;
        self.refresh();
    }

    /// Returns the number of fetch cycles started so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Cancel the timer and any in-flight fetch, then wait for the polling
    /// task to exit.
    pub async fn shutdown(self) -> Result<(), Error> {
        self.cancel.cancel();
        self.handle.await?;
        Ok(())
    }
}

enum CycleOutcome {
    Cancelled,
    Superseded,
    Finished(Result<Snapshot, Error>),
}

#[allow(clippy::too_many_arguments)]
async fn run<S>(
    source: S,
    project: ProjectID,
    config: Arc<RwLock<EvalConfig>>,
    indicator: Arc<dyn StatusIndicator>,
    cancel: CancellationToken,
    mut refresh_rx: mpsc::Receiver<()>,
    snapshot_tx: watch::Sender<Option<Arc<Snapshot>>>,
    generation: Arc<AtomicU64>,
) where
    S: TaskSource,
{
    // Project title is fetched once per poller lifetime; a failure here is
    // not fatal, the snapshot just carries an empty name.
    let project_name = tokio::select! {
        _ = cancel.cancelled() => return,
        result = source.project(project) => match result {
            Ok(p) => p.title().to_string(),
            Err(e) => {
                warn!("Failed to fetch project {}: {}", project, e);
                String::new()
            }
        }
    };

    let mut period = config.read().await.refresh_interval();
    let mut ticker = new_ticker(period);

    // One immediate cycle on activation
    let mut fire_now = true;

    loop {
        let current_period = config.read().await.refresh_interval();
        if current_period != period {
            period = current_period;
            ticker = new_ticker(period);
        }

        if !fire_now {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
                Some(()) = refresh_rx.recv() => {
                    // Manual trigger restarts the cadence
                    ticker.reset();
                }
            }
        }
        fire_now = false;

        let r#gen = generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cfg = config.read().await.clone();

        indicator.begin(REGION_KEY_STATS);
        indicator.begin(REGION_TABLE);

        // Single-flight: a refresh or shutdown during the fetch drops the
        // cycle future, so its response is discarded before it can publish.
        let outcome = tokio::select! {
            _ = cancel.cancelled() => CycleOutcome::Cancelled,
            Some(()) = refresh_rx.recv() => CycleOutcome::Superseded,
            result = run_cycle(&source, project, &project_name, &cfg) => {
                CycleOutcome::Finished(result)
            }
        };

        indicator.end(REGION_KEY_STATS);
        indicator.end(REGION_TABLE);

        match outcome {
            CycleOutcome::Cancelled => break,
            CycleOutcome::Superseded => {
                debug!("Fetch cycle {} superseded before completion", r#gen);
                ticker.reset();
                fire_now = true;
            }
            CycleOutcome::Finished(Ok(snapshot)) => {
                if generation.load(Ordering::SeqCst) == r#gen && !cancel.is_cancelled() {
                    snapshot_tx.send_replace(Some(Arc::new(snapshot)));
                } else {
                    debug!("Discarding stale snapshot from cycle {}", r#gen);
                }
            }
            CycleOutcome::Finished(Err(e)) => {
                // Previous snapshot stays visible
                warn!("Fetch cycle {} failed: {}", r#gen, e);
            }
        }
    }
}

fn new_ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// One complete pull-extract-match-aggregate pass.
async fn run_cycle<S>(
    source: &S,
    project: ProjectID,
    project_name: &str,
    config: &EvalConfig,
) -> Result<Snapshot, Error>
where
    S: TaskSource,
{
    let mut tasks = source.labeled_tasks(project, config.page_size).await?;

    // Stable table order across cycles
    tasks.sort_by_key(|task| (task.completed_at, task.id.value()));

    let (images, stats) = evaluate_corpus(&tasks, config);
    debug!(
        "Evaluated {} tasks: TP={} FP={} FN={}",
        stats.tasks_completed,
        stats.totals.true_positives,
        stats.totals.false_positives,
        stats.totals.false_negatives
    );

    Ok(Snapshot {
        project_name: project_name.to_string(),
        stats,
        images,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::TaskData;
    use std::sync::{Mutex, atomic::AtomicUsize};
    use tokio::time::{sleep, timeout};

    fn fake_project() -> Project {
        serde_json::from_str(r#"{"id": 1, "title": "Fake Project"}"#).unwrap()
    }

    fn fake_task(name: &str) -> RawTask {
        RawTask {
            is_labeled: true,
            data: TaskData {
                image: format!("/data/upload/{}", name),
            },
            ..Default::default()
        }
    }

    /// Scripted task source: call `n` sleeps for `delays[n]` and then either
    /// yields one task named `cycle-{n}.jpg` or fails.
    struct FakeSource {
        delays: Vec<Duration>,
        failures: Vec<bool>,
        calls: Arc<AtomicUsize>,
    }

    impl FakeSource {
        fn new(delays: Vec<Duration>, failures: Vec<bool>) -> Self {
            Self {
                delays,
                failures,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn call_counter(&self) -> Arc<AtomicUsize> {
            self.calls.clone()
        }
    }

    impl TaskSource for FakeSource {
        fn project(
            &self,
            _project: ProjectID,
        ) -> impl Future<Output = Result<Project, Error>> + Send {
            async { Ok(fake_project()) }
        }

        fn labeled_tasks(
            &self,
            _project: ProjectID,
            _page_size: u32,
        ) -> impl Future<Output = Result<Vec<RawTask>, Error>> + Send {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = self.delays.get(call).copied().unwrap_or(Duration::ZERO);
            let fail = self.failures.get(call).copied().unwrap_or(false);
            async move {
                sleep(delay).await;
                if fail {
                    Err(Error::InvalidResponse)
                } else {
                    Ok(vec![fake_task(&format!("cycle-{}.jpg", call))])
                }
            }
        }
    }

    async fn wait_for_calls(calls: &Arc<AtomicUsize>, at_least: usize) {
        timeout(Duration::from_secs(5), async {
            while calls.load(Ordering::SeqCst) < at_least {
                sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("task source was never called");
    }

    async fn next_snapshot(
        rx: &mut watch::Receiver<Option<Arc<Snapshot>>>,
    ) -> Arc<Snapshot> {
        timeout(Duration::from_secs(5), async {
            loop {
                rx.changed().await.expect("poller dropped snapshot channel");
                if let Some(snapshot) = rx.borrow_and_update().clone() {
                    return snapshot;
                }
            }
        })
        .await
        .expect("no snapshot published")
    }

    #[tokio::test]
    async fn test_initial_cycle_publishes_snapshot() {
        let source = FakeSource::new(vec![Duration::ZERO], vec![]);
        let poller = Poller::spawn(
            source,
            ProjectID::from(1),
            EvalConfig::default(),
            NullIndicator,
        );
        let mut rx = poller.subscribe();

        let snapshot = next_snapshot(&mut rx).await;
        assert_eq!(snapshot.project_name, "Fake Project");
        assert_eq!(snapshot.images.len(), 1);
        assert_eq!(snapshot.images[0].image_name, "cycle-0.jpg");
        assert_eq!(snapshot.stats.tasks_completed, 1);

        poller.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_superseded_cycle_never_publishes() {
        // First fetch hangs; the refresh abandons it and the second fetch
        // provides the published snapshot.
        let source = FakeSource::new(
            vec![Duration::from_secs(60), Duration::from_millis(5)],
            vec![],
        );
        let calls = source.call_counter();
        let poller = Poller::spawn(
            source,
            ProjectID::from(1),
            EvalConfig::default(),
            NullIndicator,
        );
        let mut rx = poller.subscribe();

        // Let the first (hung) fetch get in flight, then supersede it
        wait_for_calls(&calls, 1).await;
        assert!(poller.latest().is_none());
        poller.refresh();

        let snapshot = next_snapshot(&mut rx).await;
        assert_eq!(snapshot.images[0].image_name, "cycle-1.jpg");

        // The superseded cycle's result must never surface
        sleep(Duration::from_millis(20)).await;
        let latest = poller.latest().unwrap();
        assert_eq!(latest.images[0].image_name, "cycle-1.jpg");
        assert_eq!(poller.generation(), 2);

        poller.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_cycle_retains_previous_snapshot() {
        let source = FakeSource::new(
            vec![Duration::ZERO, Duration::ZERO],
            vec![false, true],
        );
        let calls = source.call_counter();
        let poller = Poller::spawn(
            source,
            ProjectID::from(1),
            EvalConfig::default(),
            NullIndicator,
        );
        let mut rx = poller.subscribe();

        let snapshot = next_snapshot(&mut rx).await;
        assert_eq!(snapshot.images[0].image_name, "cycle-0.jpg");

        // Second cycle fails; the previous snapshot must stay visible
        poller.refresh();
        wait_for_calls(&calls, 2).await;
        sleep(Duration::from_millis(20)).await;

        let latest = poller.latest().unwrap();
        assert_eq!(latest.images[0].image_name, "cycle-0.jpg");

        poller.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_update_config_triggers_new_cycle() {
        let source = FakeSource::new(vec![Duration::ZERO, Duration::ZERO], vec![]);
        let poller = Poller::spawn(
            source,
            ProjectID::from(1),
            EvalConfig::default(),
            NullIndicator,
        );
        let mut rx = poller.subscribe();

        let snapshot = next_snapshot(&mut rx).await;
        assert_eq!(snapshot.images[0].image_name, "cycle-0.jpg");

        let config = EvalConfig {
            iou_threshold: 0.75,
            ..Default::default()
        };
        poller.update_config(config).await;

        let snapshot = next_snapshot(&mut rx).await;
        assert_eq!(snapshot.images[0].image_name, "cycle-1.jpg");

        poller.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_cancels_in_flight_fetch() {
        let source = FakeSource::new(vec![Duration::from_secs(60)], vec![]);
        let calls = source.call_counter();
        let poller = Poller::spawn(
            source,
            ProjectID::from(1),
            EvalConfig::default(),
            NullIndicator,
        );

        wait_for_calls(&calls, 1).await;

        // Shutdown must not wait for the hung fetch
        timeout(Duration::from_secs(1), poller.shutdown())
            .await
            .expect("shutdown timed out")
            .unwrap();
    }

    /// Records begin/end transitions per region.
    #[derive(Default)]
    struct RecordingIndicator {
        events: Mutex<Vec<(String, bool)>>,
    }

    impl StatusIndicator for Arc<RecordingIndicator> {
        fn begin(&self, region: &str) {
            self.events.lock().unwrap().push((region.to_string(), true));
        }

        fn end(&self, region: &str) {
            self.events.lock().unwrap().push((region.to_string(), false));
        }
    }

    #[tokio::test]
    async fn test_indicator_cleared_even_on_failure() {
        let indicator = Arc::new(RecordingIndicator::default());
        let source = FakeSource::new(vec![Duration::ZERO], vec![true]);
        let calls = source.call_counter();
        let poller = Poller::spawn(
            source,
            ProjectID::from(1),
            EvalConfig::default(),
            indicator.clone(),
        );

        wait_for_calls(&calls, 1).await;
        sleep(Duration::from_millis(20)).await;
        poller.shutdown().await.unwrap();

        let events = indicator.events.lock().unwrap();
        let begins = events.iter().filter(|(_, busy)| *busy).count();
        let ends = events.iter().filter(|(_, busy)| !*busy).count();
        assert_eq!(begins, ends, "every begin must be paired with an end");
        assert!(events.iter().any(|(r, _)| r == REGION_KEY_STATS));
        assert!(events.iter().any(|(r, _)| r == REGION_TABLE));
    }
}
