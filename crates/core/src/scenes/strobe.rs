use async_trait::async_trait;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    color::{ColorRange, Rgb},
    config::Timing,
    dispatch::Dispatcher,
    engine::Scene,
    state::LightState,
    target::{resolve_lights, ResolvedTargets, TargetSet},
    Result,
};

/// Source of the colors a strobe flashes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorGenerator {
    Fixed(Rgb),
    Random(ColorRange),
}

impl Default for ColorGenerator {
    fn default() -> Self {
        ColorGenerator::Fixed(Rgb::WHITE)
    }
}

impl ColorGenerator {
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Rgb {
        match self {
            ColorGenerator::Fixed(color) => *color,
            ColorGenerator::Random(range) => range.sample(rng),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrobeOptions {
    #[serde(flatten)]
    pub targets: TargetSet,
    #[serde(flatten)]
    pub timing: Timing,
    #[serde(default, alias = "activeColorGenerator")]
    pub active_color: ColorGenerator,
    #[serde(default, alias = "inactiveColorGenerator")]
    pub inactive_color: ColorGenerator,
}

impl StrobeOptions {
    pub fn new(targets: TargetSet, timing: Timing) -> Self {
        Self {
            targets,
            timing,
            active_color: ColorGenerator::default(),
            inactive_color: ColorGenerator::default(),
        }
    }
}

/// Flashes one random light per tick while the previous one drops back.
#[derive(Debug)]
pub struct StrobeScene {
    options: StrobeOptions,
    targets: ResolvedTargets,
    lights: Vec<String>,
    current: Option<String>,
    rng: StdRng,
}

impl StrobeScene {
    pub fn new(options: StrobeOptions) -> Self {
        Self::with_rng(options, StdRng::from_entropy())
    }

    pub fn with_rng(options: StrobeOptions, rng: StdRng) -> Self {
        let targets = options.targets.resolve();
        Self {
            options,
            targets,
            lights: Vec::new(),
            current: None,
            rng,
        }
    }

    /// Individual lights the strobe picks from, known after init.
    pub fn lights(&self) -> &[String] {
        &self.lights
    }

    /// Light flashed by the most recent tick.
    pub fn current_light(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Reverted state for the previous flash. A color without chromaticity
    /// only drops the brightness.
    fn base_state(&mut self) -> LightState {
        let color = self.options.inactive_color.generate(&mut self.rng);
        let base = LightState::new().on().brightness(0.0).instant();
        match base.clone().rgb(color) {
            Ok(state) => state,
            Err(err) => {
                tracing::debug!(error = %err, "reverting strobe light without a color");
                base
            }
        }
    }

    fn flash_state(&mut self) -> Result<LightState> {
        let color = self.options.active_color.generate(&mut self.rng);
        LightState::new().brightness(100.0).instant().rgb(color)
    }
}

#[async_trait]
impl Scene for StrobeScene {
    fn kind(&self) -> &'static str {
        "strobe"
    }

    fn timing(&self) -> Timing {
        self.options.timing
    }

    async fn init(&mut self, dispatcher: &mut Dispatcher) -> Result<()> {
        let mut lights = resolve_lights(&self.options.targets.lights);
        for group_id in &self.targets.groups {
            let group = dispatcher.client().get_group(group_id).await?;
            tracing::debug!(group = %group_id, members = group.lights.len(), "expanded strobe group");
            lights.extend(group.lights);
        }
        self.lights = lights;

        let base = LightState::new()
            .on()
            .brightness(0.0)
            .instant()
            .rgb(Rgb::WHITE)?;
        dispatcher.dispatch(&base, &self.targets).await;
        tracing::debug!(lights = self.lights.len(), "strobe lights set to base");
        Ok(())
    }

    async fn next(&mut self, dispatcher: &mut Dispatcher) -> Result<()> {
        if self.lights.is_empty() {
            tracing::debug!("strobe has no lights to flash");
            return Ok(());
        }

        let picked = self.lights[self.rng.gen_range(0..self.lights.len())].clone();
        let flash = self.flash_state()?;
        let flash_target = ResolvedTargets::only_lights([picked.clone()]);

        match self.current.clone() {
            Some(previous) => {
                let base = self.base_state();
                let base_target = ResolvedTargets::only_lights([previous]);
                dispatcher
                    .dispatch_batch(&[(&base, &base_target), (&flash, &flash_target)])
                    .await;
            }
            None => {
                dispatcher.dispatch(&flash, &flash_target).await;
            }
        }
        self.current = Some(picked);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use tokio::sync::watch;

    use super::*;
    use crate::{
        client::{SimulatedBridge, Target},
        config::EngineSettings,
        engine::SceneState,
        target::GroupRef,
    };

    fn dispatcher(bridge: &Arc<SimulatedBridge>) -> Dispatcher {
        let (_, lifecycle) = watch::channel(SceneState::Running);
        Dispatcher::new(bridge.clone(), lifecycle, EngineSettings::default())
    }

    fn scene(targets: TargetSet) -> StrobeScene {
        StrobeScene::with_rng(
            StrobeOptions::new(targets, Timing::new(Duration::from_millis(200))),
            StdRng::seed_from_u64(17),
        )
    }

    #[tokio::test]
    async fn init_expands_groups_and_sets_base() {
        let bridge = Arc::new(SimulatedBridge::new().with_group("0", ["3", "4", "5"]));
        let mut dispatcher = dispatcher(&bridge);
        let mut strobe = scene(TargetSet::new(["1"], ["0"]));

        strobe.init(&mut dispatcher).await.unwrap();

        assert_eq!(strobe.lights(), ["1", "3", "4", "5"]);
        let commands = bridge.commands();
        assert_eq!(commands.len(), 2);
        for command in commands {
            assert_eq!(command.state.on, Some(true));
            assert_eq!(command.state.brightness, Some(0));
            assert_eq!(command.state.transition_ms, Some(0));
        }
    }

    #[tokio::test]
    async fn unknown_group_fails_init() {
        let bridge = Arc::new(SimulatedBridge::new());
        let mut dispatcher = dispatcher(&bridge);
        let mut strobe = scene(TargetSet::new(Vec::<String>::new(), ["42"]));

        assert!(strobe.init(&mut dispatcher).await.is_err());
    }

    #[tokio::test]
    async fn previous_flash_is_reverted_each_tick() {
        let bridge = Arc::new(SimulatedBridge::new().with_group("0", ["1", "2", "3", "4"]));
        let mut dispatcher = dispatcher(&bridge);
        let mut strobe = scene(TargetSet::new(Vec::<String>::new(), ["0"]));
        strobe.init(&mut dispatcher).await.unwrap();

        let mut previous: Option<Target> = None;
        for _ in 0..50 {
            bridge.clear();
            strobe.next(&mut dispatcher).await.unwrap();
            let commands = bridge.commands();

            let flashed: Vec<_> = commands
                .iter()
                .filter(|c| c.state.brightness == Some(100))
                .map(|c| c.target.clone())
                .collect();
            let reverted: Vec<_> = commands
                .iter()
                .filter(|c| c.state.brightness == Some(0))
                .map(|c| c.target.clone())
                .collect();

            assert_eq!(flashed.len(), 1);
            assert_eq!(reverted, previous.iter().cloned().collect::<Vec<_>>());
            assert_eq!(
                Some(&flashed[0]),
                strobe.current_light().map(|id| Target::Light(id.to_string())).as_ref()
            );
            previous = Some(flashed[0].clone());
        }
    }

    #[tokio::test]
    async fn flashes_use_configured_colors() {
        let bridge = Arc::new(SimulatedBridge::new());
        let mut dispatcher = dispatcher(&bridge);
        let red = Rgb::new(255.0, 0.0, 0.0);
        let mut options = StrobeOptions::new(
            TargetSet::new(["1"], Vec::<GroupRef>::new()),
            Timing::new(Duration::from_millis(200)),
        );
        options.active_color = ColorGenerator::Fixed(red);
        let mut strobe = StrobeScene::with_rng(options, StdRng::seed_from_u64(2));

        strobe.init(&mut dispatcher).await.unwrap();
        bridge.clear();
        strobe.next(&mut dispatcher).await.unwrap();

        let commands = bridge.commands();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].state.xy, Some(red.xy().unwrap()));
    }

    #[tokio::test]
    async fn empty_light_set_is_a_no_op() {
        let bridge = Arc::new(SimulatedBridge::new());
        let mut dispatcher = dispatcher(&bridge);
        let mut strobe = scene(TargetSet::default());

        strobe.init(&mut dispatcher).await.unwrap();
        strobe.next(&mut dispatcher).await.unwrap();

        assert_eq!(bridge.command_count(), 0);
        assert!(strobe.current_light().is_none());
    }

    #[test]
    fn generators_deserialize() {
        let options: StrobeOptions = serde_json::from_str(
            r#"{
                "lights": ["1"],
                "transition": 200,
                "activeColorGenerator": {"random": {}},
                "inactive_color": {"fixed": {"r": 0, "g": 0, "b": 255}}
            }"#,
        )
        .unwrap();

        assert_eq!(options.active_color, ColorGenerator::Random(ColorRange::default()));
        assert_eq!(
            options.inactive_color,
            ColorGenerator::Fixed(Rgb::new(0.0, 0.0, 255.0))
        );
    }

    #[tokio::test]
    async fn colorless_revert_still_darkens_the_previous_light() {
        let bridge = Arc::new(SimulatedBridge::new());
        let mut dispatcher = dispatcher(&bridge);
        let mut options = StrobeOptions::new(
            TargetSet::new(["1", "2", "3"], Vec::<GroupRef>::new()),
            Timing::new(Duration::from_millis(200)),
        );
        options.inactive_color = ColorGenerator::Fixed(Rgb::BLACK);
        let mut strobe = StrobeScene::with_rng(options, StdRng::seed_from_u64(3));
        strobe.init(&mut dispatcher).await.unwrap();

        let mut previous: Option<String> = None;
        for _ in 0..4 {
            bridge.clear();
            strobe.next(&mut dispatcher).await.unwrap();
            let commands = bridge.commands();

            let reverted: Vec<_> = commands
                .iter()
                .filter(|c| c.state.brightness == Some(0))
                .collect();
            match &previous {
                Some(id) => {
                    assert_eq!(reverted.len(), 1);
                    assert_eq!(reverted[0].target, Target::Light(id.clone()));
                    assert_eq!(reverted[0].state.xy, None);
                }
                None => assert!(reverted.is_empty()),
            }
            assert_eq!(
                commands.iter().filter(|c| c.state.brightness == Some(100)).count(),
                1
            );
            previous = strobe.current_light().map(str::to_string);
        }
    }

    #[tokio::test]
    async fn failed_flash_keeps_the_previous_light() {
        let bridge = Arc::new(SimulatedBridge::new());
        let mut dispatcher = dispatcher(&bridge);
        let mut strobe = scene(TargetSet::new(["1", "2"], Vec::<GroupRef>::new()));
        strobe.init(&mut dispatcher).await.unwrap();
        strobe.next(&mut dispatcher).await.unwrap();
        let flashed = strobe.current_light().map(str::to_string);

        strobe.options.active_color = ColorGenerator::Fixed(Rgb::BLACK);
        bridge.clear();
        assert!(strobe.next(&mut dispatcher).await.is_err());

        assert_eq!(bridge.command_count(), 0);
        assert_eq!(strobe.current_light().map(str::to_string), flashed);
    }
}
