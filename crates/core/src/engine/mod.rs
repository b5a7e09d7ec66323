use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{self, Instant, Interval, MissedTickBehavior},
};

use crate::{
    client::DeviceClient,
    config::{EngineSettings, Timing},
    dispatch::{DispatchStats, Dispatcher},
    Result,
};

/// Lifecycle of a running scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SceneState {
    Stopped,
    Initializing,
    Running,
}

/// A periodic animation. The engine calls [`Scene::init`] once and then
/// [`Scene::next`] once per tick.
#[async_trait]
pub trait Scene: Send {
    fn kind(&self) -> &'static str;

    fn timing(&self) -> Timing;

    /// One-time setup before the first tick.
    async fn init(&mut self, _dispatcher: &mut Dispatcher) -> Result<()> {
        Ok(())
    }

    /// Computes the next state and dispatches it.
    async fn next(&mut self, dispatcher: &mut Dispatcher) -> Result<()>;
}

/// Control surface of a started scene.
///
/// The scene runs on its own tokio task, which owns the scene and its
/// [`Dispatcher`], so ticks never overlap. Dropping the handle stops the
/// scene.
pub struct SceneHandle {
    name: String,
    lifecycle: Arc<watch::Sender<SceneState>>,
    stats: watch::Receiver<DispatchStats>,
    task: Option<JoinHandle<()>>,
}

impl SceneHandle {
    /// Spawns `scene` onto the current tokio runtime and starts ticking it.
    pub fn start(
        name: impl Into<String>,
        scene: Box<dyn Scene>,
        client: Arc<dyn DeviceClient>,
        settings: EngineSettings,
    ) -> Self {
        let name = name.into();
        let (lifecycle, lifecycle_rx) = watch::channel(SceneState::Initializing);
        let lifecycle = Arc::new(lifecycle);
        let dispatcher = Dispatcher::new(client, lifecycle_rx, settings);
        let stats = dispatcher.subscribe_stats();

        let task = tokio::spawn(run_scene(
            name.clone(),
            scene,
            dispatcher,
            Arc::clone(&lifecycle),
        ));

        Self {
            name,
            lifecycle,
            stats,
            task: Some(task),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SceneState {
        *self.lifecycle.borrow()
    }

    /// Latest dispatch statistics published by the scene.
    pub fn stats(&self) -> DispatchStats {
        *self.stats.borrow()
    }

    /// Requests the scene to stop. The pending tick timer is cancelled; an
    /// in-progress tick finishes but anything it still tries to send is
    /// dropped. Calling this more than once is harmless.
    pub fn stop(&self) {
        let changed = self.lifecycle.send_if_modified(|state| {
            if *state == SceneState::Stopped {
                false
            } else {
                *state = SceneState::Stopped;
                true
            }
        });
        if changed {
            tracing::info!(scene = %self.name, "stopping scene");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Waits until the scene task has exited.
    pub async fn stopped(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                tracing::error!(scene = %self.name, error = %err, "scene task ended abnormally");
            }
        }
    }
}

impl Drop for SceneHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for SceneHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneHandle")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

async fn run_scene(
    name: String,
    mut scene: Box<dyn Scene>,
    mut dispatcher: Dispatcher,
    lifecycle: Arc<watch::Sender<SceneState>>,
) {
    let _stopped = StopOnExit(Arc::clone(&lifecycle));
    let mut stop_rx = lifecycle.subscribe();
    let settings = *dispatcher.settings();
    let interval = scene.timing().tick_interval();

    if interval < settings.min_interval() {
        tracing::warn!(
            scene = %name,
            interval_ms = interval.as_millis() as u64,
            min_interval_ms = settings.min_interval_ms,
            "tick interval is shorter than the bridge can reliably keep up with"
        );
    }

    tracing::debug!(scene = %name, kind = scene.kind(), "initializing scene");
    if let Err(err) = scene.init(&mut dispatcher).await {
        tracing::error!(scene = %name, error = %err, "scene failed to initialize");
        return;
    }

    let promoted = lifecycle.send_if_modified(|state| {
        if *state == SceneState::Initializing {
            *state = SceneState::Running;
            true
        } else {
            false
        }
    });
    if !promoted {
        tracing::debug!(scene = %name, "scene stopped during initialization");
        return;
    }

    tracing::info!(
        scene = %name,
        kind = scene.kind(),
        interval_ms = interval.as_millis() as u64,
        "scene running"
    );

    let mut dropout_reset = dropout_reset_timer(&settings);
    if dropout_reset.is_none() {
        tracing::debug!(scene = %name, "periodic dropout reset disabled");
    }

    'ticks: loop {
        let timer = time::sleep(interval);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                () = &mut timer => break,
                () = next_reset(&mut dropout_reset) => dispatcher.reset_dropouts(),
                () = stop_requested(&mut stop_rx) => break 'ticks,
            }
        }

        if let Err(err) = scene.next(&mut dispatcher).await {
            tracing::warn!(scene = %name, error = %err, "scene tick failed");
        }
    }

    tracing::info!(scene = %name, stats = ?dispatcher.stats(), "scene stopped");
}

/// Marks the scene stopped however the task ends, panics included.
struct StopOnExit(Arc<watch::Sender<SceneState>>);

impl Drop for StopOnExit {
    fn drop(&mut self) {
        self.0.send_replace(SceneState::Stopped);
    }
}

/// A zero period, or one too large to schedule, disables the reset.
fn dropout_reset_timer(settings: &EngineSettings) -> Option<Interval> {
    let period = settings.dropout_reset_period();
    if period.is_zero() {
        return None;
    }
    let start = Instant::now().checked_add(period)?;
    let mut timer = time::interval_at(start, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(timer)
}

async fn next_reset(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn stop_requested(rx: &mut watch::Receiver<SceneState>) {
    loop {
        if *rx.borrow_and_update() == SceneState::Stopped {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
