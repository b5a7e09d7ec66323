use async_trait::async_trait;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    color::{ChannelRange, ColorRange, Rgb},
    config::Timing,
    dispatch::Dispatcher,
    engine::Scene,
    gradient::{self, OscillationCursor, DEFAULT_STEPS, DEFAULT_STOPS},
    state::LightState,
    target::{ResolvedTargets, TargetSet},
    Result, SceneError,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientOptions {
    #[serde(flatten)]
    pub targets: TargetSet,
    #[serde(flatten)]
    pub timing: Timing,
    #[serde(default, alias = "colorRange")]
    pub color_range: ColorRange,
    /// Brightness percentage bounds. Brightness is left alone when unset.
    #[serde(default, alias = "brightnessRange")]
    pub brightness_range: Option<ChannelRange>,
    #[serde(default = "default_stops")]
    pub stops: usize,
    #[serde(default = "default_steps")]
    pub steps: usize,
}

impl GradientOptions {
    pub fn new(targets: TargetSet, timing: Timing) -> Self {
        Self {
            targets,
            timing,
            color_range: ColorRange::default(),
            brightness_range: None,
            stops: DEFAULT_STOPS,
            steps: DEFAULT_STEPS,
        }
    }
}

fn default_stops() -> usize {
    DEFAULT_STOPS
}

fn default_steps() -> usize {
    DEFAULT_STEPS
}

/// Slow wander through a random closed gradient. Color and brightness each
/// breathe back and forth along their own sequence.
#[derive(Debug)]
pub struct GradientScene {
    options: GradientOptions,
    targets: ResolvedTargets,
    colors: Option<OscillationCursor<Rgb>>,
    brightness: Option<OscillationCursor<f32>>,
    rng: StdRng,
}

impl GradientScene {
    pub fn new(options: GradientOptions) -> Self {
        Self::with_rng(options, StdRng::from_entropy())
    }

    pub fn with_rng(options: GradientOptions, rng: StdRng) -> Self {
        let targets = options.targets.resolve();
        Self {
            options,
            targets,
            colors: None,
            brightness: None,
            rng,
        }
    }

    pub fn color_cursor(&self) -> Option<&OscillationCursor<Rgb>> {
        self.colors.as_ref()
    }

    pub fn brightness_cursor(&self) -> Option<&OscillationCursor<f32>> {
        self.brightness.as_ref()
    }
}

#[async_trait]
impl Scene for GradientScene {
    fn kind(&self) -> &'static str {
        "gradient"
    }

    fn timing(&self) -> Timing {
        self.options.timing
    }

    async fn init(&mut self, _dispatcher: &mut Dispatcher) -> Result<()> {
        let seeds = gradient::build_loop(&self.options.color_range, self.options.stops, &mut self.rng);
        self.colors = Some(OscillationCursor::new(gradient::expand(
            &seeds,
            self.options.steps,
        ))?);

        if let Some(range) = &self.options.brightness_range {
            let seeds = gradient::build_brightness_loop(range, self.options.stops, &mut self.rng);
            self.brightness = Some(OscillationCursor::new(gradient::expand_brightness(
                &seeds,
                self.options.steps,
            ))?);
        }

        tracing::debug!(
            steps = self.options.steps,
            stops = self.options.stops,
            brightness = self.brightness.is_some(),
            "gradient sequences built"
        );
        Ok(())
    }

    async fn next(&mut self, dispatcher: &mut Dispatcher) -> Result<()> {
        let colors = self
            .colors
            .as_mut()
            .ok_or_else(|| SceneError::msg("gradient scene ticked before init"))?;
        let color = *colors.advance();
        let brightness = self.brightness.as_mut().map(|cursor| *cursor.advance());

        let mut state = LightState::new()
            .on()
            .transition(self.options.timing.transition())
            .rgb(color)?;
        if let Some(percent) = brightness {
            state = state.brightness(percent);
        }

        dispatcher.dispatch(&state, &self.targets).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use tokio::{sync::watch, time};

    use super::*;
    use crate::{
        client::{DeviceClient, SimulatedBridge, Target},
        config::EngineSettings,
        engine::{SceneHandle, SceneState},
    };

    fn options() -> GradientOptions {
        GradientOptions::new(
            TargetSet::new(["1"], ["8"]),
            Timing::new(Duration::from_millis(1000)),
        )
    }

    fn dispatcher(bridge: &Arc<SimulatedBridge>) -> Dispatcher {
        let (_, lifecycle) = watch::channel(SceneState::Running);
        Dispatcher::new(bridge.clone(), lifecycle, EngineSettings::default())
    }

    #[tokio::test(start_paused = true)]
    async fn stop_before_first_tick_sends_nothing() {
        let bridge = Arc::new(SimulatedBridge::new());
        let client: Arc<dyn DeviceClient> = bridge.clone();
        let handle = SceneHandle::start(
            "gradient",
            Box::new(GradientScene::new(options())),
            client,
            EngineSettings::default(),
        );

        time::sleep(Duration::from_millis(1499)).await;
        handle.stop();
        time::sleep(Duration::from_secs(30)).await;

        assert_eq!(bridge.command_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_lands_after_headroom() {
        let bridge = Arc::new(SimulatedBridge::new());
        let client: Arc<dyn DeviceClient> = bridge.clone();
        let started = time::Instant::now();
        let _handle = SceneHandle::start(
            "gradient",
            Box::new(GradientScene::new(options())),
            client,
            EngineSettings::default(),
        );

        time::sleep(Duration::from_millis(1600)).await;

        let commands = bridge.commands();
        assert_eq!(commands.len(), 2);
        for command in &commands {
            let offset = command.at - started;
            assert!(offset >= Duration::from_millis(1500) && offset < Duration::from_millis(1600));
            assert_eq!(command.state.on, Some(true));
            assert_eq!(command.state.transition_ms, Some(1000));
            assert!(command.state.xy.is_some());
        }
        let mut targets: Vec<_> = commands.iter().map(|c| c.target.clone()).collect();
        targets.sort_by_key(|target| target.to_string());
        assert_eq!(targets, vec![Target::Group("8".into()), Target::Light("1".into())]);
    }

    #[tokio::test]
    async fn color_and_brightness_advance_together() {
        let bridge = Arc::new(SimulatedBridge::new());
        let mut dispatcher = dispatcher(&bridge);
        let mut options = options();
        options.brightness_range = Some(ChannelRange::new(50.0, 50.0));
        options.stops = 5;
        options.steps = 20;
        let mut scene = GradientScene::with_rng(options, StdRng::seed_from_u64(9));

        scene.init(&mut dispatcher).await.unwrap();
        for _ in 0..25 {
            scene.next(&mut dispatcher).await.unwrap();
        }

        let colors = scene.color_cursor().unwrap();
        let brightness = scene.brightness_cursor().unwrap();
        assert_eq!(colors.len(), 20);
        assert_eq!(colors.position(), brightness.position());
        assert_eq!(colors.is_reversing(), brightness.is_reversing());
        assert!(bridge
            .commands()
            .iter()
            .all(|command| command.state.brightness == Some(50)));
    }

    #[tokio::test]
    async fn brightness_is_untouched_without_a_range() {
        let bridge = Arc::new(SimulatedBridge::new());
        let mut dispatcher = dispatcher(&bridge);
        let mut scene = GradientScene::with_rng(options(), StdRng::seed_from_u64(1));

        scene.init(&mut dispatcher).await.unwrap();
        scene.next(&mut dispatcher).await.unwrap();

        assert!(scene.brightness_cursor().is_none());
        assert!(bridge.commands().iter().all(|c| c.state.brightness.is_none()));
    }

    #[tokio::test]
    async fn ticking_before_init_is_an_error() {
        let bridge = Arc::new(SimulatedBridge::new());
        let mut dispatcher = dispatcher(&bridge);
        let mut scene = GradientScene::new(options());

        assert!(scene.next(&mut dispatcher).await.is_err());
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: GradientOptions = serde_json::from_str(
            r#"{
                "groups": ["8"],
                "transition": 1000,
                "brightnessRange": [50, 50],
                "colorRange": {"rangeB": [200, 255]}
            }"#,
        )
        .unwrap();

        assert_eq!(options.stops, DEFAULT_STOPS);
        assert_eq!(options.steps, DEFAULT_STEPS);
        assert_eq!(options.timing.tick_interval(), Duration::from_millis(1500));
        assert_eq!(options.color_range.b, Some(ChannelRange::new(200.0, 255.0)));
    }
}
