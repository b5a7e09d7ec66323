use std::{sync::Arc, time::Duration};

use serde::Serialize;
use tokio::{
    sync::watch,
    task::JoinSet,
    time::{self, Instant},
};

use crate::{
    client::{DeviceClient, Target},
    config::EngineSettings,
    engine::SceneState,
    state::LightState,
    target::ResolvedTargets,
};

/// Counts failed dispatches toward a cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DropoutCounter {
    count: u32,
    threshold: u32,
}

impl DropoutCounter {
    pub fn new(threshold: u32) -> Self {
        Self {
            count: 0,
            threshold,
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn record_failure(&mut self) {
        self.count = self.count.saturating_add(1);
    }

    pub fn is_tripped(&self) -> bool {
        self.count >= self.threshold
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }
}

/// Online mean of dispatch latency. No samples are retained.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningAverage {
    samples: u64,
    mean_ms: f64,
}

impl RunningAverage {
    pub fn record(&mut self, elapsed: Duration) {
        self.samples += 1;
        let value = elapsed.as_secs_f64() * 1_000.0;
        self.mean_ms += (value - self.mean_ms) / self.samples as f64;
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn mean_ms(&self) -> Option<f64> {
        (self.samples > 0).then_some(self.mean_ms)
    }
}

/// Snapshot published after every dispatch attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DispatchStats {
    pub delivered: u64,
    pub failed: u64,
    /// Dispatches skipped because the scene was already stopped.
    pub suppressed: u64,
    pub cooldowns: u64,
    pub dropouts: u32,
    pub average_latency_ms: Option<f64>,
}

/// Sends states to resolved targets on behalf of one scene.
///
/// A dispatch with any failed call counts as one dropout. Once dropouts reach
/// the threshold the next dispatch waits out a cooldown first.
pub struct Dispatcher {
    client: Arc<dyn DeviceClient>,
    lifecycle: watch::Receiver<SceneState>,
    settings: EngineSettings,
    dropouts: DropoutCounter,
    latency: RunningAverage,
    stats: DispatchStats,
    stats_tx: watch::Sender<DispatchStats>,
}

impl Dispatcher {
    pub fn new(
        client: Arc<dyn DeviceClient>,
        lifecycle: watch::Receiver<SceneState>,
        settings: EngineSettings,
    ) -> Self {
        let (stats_tx, _) = watch::channel(DispatchStats::default());
        Self {
            client,
            lifecycle,
            settings,
            dropouts: DropoutCounter::new(settings.dropout_threshold),
            latency: RunningAverage::default(),
            stats: DispatchStats::default(),
            stats_tx,
        }
    }

    pub fn client(&self) -> &Arc<dyn DeviceClient> {
        &self.client
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn dropouts(&self) -> u32 {
        self.dropouts.count()
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    pub fn subscribe_stats(&self) -> watch::Receiver<DispatchStats> {
        self.stats_tx.subscribe()
    }

    pub fn is_stopped(&self) -> bool {
        *self.lifecycle.borrow() == SceneState::Stopped
    }

    /// Clears the dropout counter regardless of recent activity.
    pub fn reset_dropouts(&mut self) {
        if self.dropouts.count() > 0 {
            tracing::debug!(dropouts = self.dropouts.count(), "resetting dropout counter");
        }
        self.dropouts.reset();
        self.publish();
    }

    /// Sends `state` to every target. Returns the elapsed time on success and
    /// `None` when the dispatch failed or was suppressed.
    pub async fn dispatch(
        &mut self,
        state: &LightState,
        targets: &ResolvedTargets,
    ) -> Option<Duration> {
        self.dispatch_batch(&[(state, targets)]).await
    }

    /// Sends several states at once. All calls run concurrently and the batch
    /// counts as a single dispatch.
    pub async fn dispatch_batch(
        &mut self,
        batch: &[(&LightState, &ResolvedTargets)],
    ) -> Option<Duration> {
        if self.suppress_if_stopped() {
            return None;
        }

        if self.dropouts.is_tripped() {
            tracing::warn!(
                dropouts = self.dropouts.count(),
                cooldown_ms = self.settings.cooldown_ms,
                "too many failed dispatches, cooling down"
            );
            time::sleep(self.settings.cooldown()).await;
            self.dropouts.reset();
            self.stats.cooldowns += 1;

            if self.suppress_if_stopped() {
                return None;
            }
        }

        let started = Instant::now();
        let mut sends = JoinSet::new();
        for (state, targets) in batch {
            let lights = targets.lights.iter().cloned().map(Target::Light);
            let groups = targets.groups.iter().cloned().map(Target::Group);
            for target in lights.chain(groups) {
                let client = Arc::clone(&self.client);
                let state = LightState::clone(state);
                sends.spawn(async move {
                    let result = client.set_state(&target, &state).await;
                    (target, result)
                });
            }
        }

        let mut failures = 0_usize;
        while let Some(joined) = sends.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((target, Err(err))) => {
                    failures += 1;
                    tracing::debug!(%target, error = %err, "device call failed");
                }
                Err(err) => {
                    failures += 1;
                    tracing::warn!(error = %err, "device call did not complete");
                }
            }
        }
        let elapsed = started.elapsed();

        if failures > 0 {
            self.dropouts.record_failure();
            self.stats.failed += 1;
            tracing::warn!(
                failures,
                dropouts = self.dropouts.count(),
                "dispatch failed"
            );
            self.publish();
            return None;
        }

        self.latency.record(elapsed);
        self.stats.delivered += 1;
        tracing::trace!(elapsed_ms = elapsed.as_millis() as u64, "dispatch delivered");
        self.publish();
        Some(elapsed)
    }

    fn suppress_if_stopped(&mut self) -> bool {
        if !self.is_stopped() {
            return false;
        }
        tracing::debug!("scene stopped, dropping dispatch");
        self.stats.suppressed += 1;
        self.publish();
        true
    }

    fn publish(&mut self) {
        self.stats.dropouts = self.dropouts.count();
        self.stats.average_latency_ms = self.latency.mean_ms();
        self.stats_tx.send_replace(self.stats);
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("settings", &self.settings)
            .field("dropouts", &self.dropouts)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SimulatedBridge;

    fn dispatcher(bridge: &Arc<SimulatedBridge>) -> (Dispatcher, watch::Sender<SceneState>) {
        let (lifecycle_tx, lifecycle_rx) = watch::channel(SceneState::Running);
        let client: Arc<dyn DeviceClient> = bridge.clone();
        (
            Dispatcher::new(client, lifecycle_rx, EngineSettings::default()),
            lifecycle_tx,
        )
    }

    fn targets() -> ResolvedTargets {
        ResolvedTargets {
            lights: vec!["1".into(), "2".into()],
            groups: vec!["8".into()],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fans_out_to_every_target() {
        let bridge = Arc::new(SimulatedBridge::new().with_latency(Duration::from_millis(100)));
        let (mut dispatcher, _lifecycle) = dispatcher(&bridge);
        let state = LightState::new().on();

        let elapsed = dispatcher.dispatch(&state, &targets()).await.unwrap();

        // Calls run concurrently, so the whole dispatch takes one latency.
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(200));
        let mut sent: Vec<Target> = bridge.commands().into_iter().map(|c| c.target).collect();
        sent.sort_by_key(|target| target.to_string());
        assert_eq!(
            sent,
            vec![
                Target::Group("8".into()),
                Target::Light("1".into()),
                Target::Light("2".into()),
            ]
        );
        assert_eq!(dispatcher.stats().delivered, 1);
        let average = dispatcher.stats().average_latency_ms.unwrap();
        assert!((100.0..200.0).contains(&average));
    }

    #[tokio::test]
    async fn one_failed_target_fails_the_dispatch() {
        let bridge = Arc::new(SimulatedBridge::new());
        bridge.fail_target(Target::Light("2".into()));
        let (mut dispatcher, _lifecycle) = dispatcher(&bridge);

        let result = dispatcher.dispatch(&LightState::new(), &targets()).await;

        assert!(result.is_none());
        assert_eq!(bridge.command_count(), 3);
        assert_eq!(dispatcher.dropouts(), 1);
        assert_eq!(dispatcher.stats().failed, 1);
        assert_eq!(dispatcher.stats().average_latency_ms, None);
    }

    #[tokio::test(start_paused = true)]
    async fn cools_down_after_threshold() {
        let bridge = Arc::new(SimulatedBridge::new());
        let (mut dispatcher, _lifecycle) = dispatcher(&bridge);
        let state = LightState::new();
        let single = ResolvedTargets::only_lights(["1"]);

        bridge.set_failing(true);
        for _ in 0..10 {
            assert!(dispatcher.dispatch(&state, &single).await.is_none());
        }
        assert_eq!(dispatcher.dropouts(), 10);
        assert_eq!(bridge.command_count(), 10);

        bridge.set_failing(false);
        let before = Instant::now();
        assert!(dispatcher.dispatch(&state, &single).await.is_some());

        let commands = bridge.commands();
        let resumed = commands.last().unwrap();
        assert!(resumed.at - before >= Duration::from_millis(5_000));
        assert_eq!(dispatcher.dropouts(), 0);
        assert_eq!(dispatcher.stats().cooldowns, 1);
    }

    #[tokio::test]
    async fn stopped_scene_dispatches_nothing() {
        let bridge = Arc::new(SimulatedBridge::new());
        let (mut dispatcher, lifecycle) = dispatcher(&bridge);
        lifecycle.send_replace(SceneState::Stopped);

        let result = dispatcher.dispatch(&LightState::new().on(), &targets()).await;

        assert!(result.is_none());
        assert_eq!(bridge.command_count(), 0);
        assert_eq!(dispatcher.stats().suppressed, 1);
        assert_eq!(dispatcher.dropouts(), 0);
    }

    #[tokio::test]
    async fn empty_targets_are_a_successful_no_op() {
        let bridge = Arc::new(SimulatedBridge::new());
        let (mut dispatcher, _lifecycle) = dispatcher(&bridge);

        let result = dispatcher
            .dispatch(&LightState::new(), &ResolvedTargets::default())
            .await;

        assert!(result.is_some());
        assert_eq!(bridge.command_count(), 0);
    }

    #[tokio::test]
    async fn publishes_stats_to_subscribers() {
        let bridge = Arc::new(SimulatedBridge::new());
        let (mut dispatcher, _lifecycle) = dispatcher(&bridge);
        let stats = dispatcher.subscribe_stats();

        bridge.set_failing(true);
        dispatcher.dispatch(&LightState::new(), &targets()).await;
        assert_eq!(stats.borrow().dropouts, 1);

        dispatcher.reset_dropouts();
        assert_eq!(stats.borrow().dropouts, 0);
        assert_eq!(stats.borrow().failed, 1);
    }

    #[test]
    fn running_average_is_incremental() {
        let mut average = RunningAverage::default();
        assert_eq!(average.mean_ms(), None);

        for ms in [100, 200, 300] {
            average.record(Duration::from_millis(ms));
        }
        assert_eq!(average.samples(), 3);
        assert!((average.mean_ms().unwrap() - 200.0).abs() < 1e-9);
    }
}
