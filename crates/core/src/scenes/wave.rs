use std::time::Duration;

use async_trait::async_trait;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::time;

use crate::{
    color::{ColorRange, Xy},
    config::Timing,
    dispatch::Dispatcher,
    engine::Scene,
    state::LightState,
    target::{resolve_groups, GroupRef, ResolvedTargets},
    Result,
};

/// Groups fade in one after another. Each state change takes this many
/// transitions.
pub const WAVE_SPAN: u32 = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveOptions {
    #[serde(default)]
    pub groups: Vec<GroupRef>,
    #[serde(flatten)]
    pub timing: Timing,
    #[serde(default, alias = "colorRange")]
    pub color_range: ColorRange,
}

impl WaveOptions {
    pub fn new(groups: impl IntoIterator<Item = impl Into<GroupRef>>, timing: Timing) -> Self {
        Self {
            groups: groups.into_iter().map(Into::into).collect(),
            timing,
            color_range: ColorRange::default(),
        }
    }
}

/// Sweeps one color across the groups in order, drawing a new color each time
/// the sweep starts over.
#[derive(Debug)]
pub struct WaveScene {
    options: WaveOptions,
    groups: Vec<String>,
    last_index: Option<usize>,
    color: Option<Xy>,
    draws: u64,
    rng: StdRng,
}

impl WaveScene {
    pub fn new(options: WaveOptions) -> Self {
        Self::with_rng(options, StdRng::from_entropy())
    }

    pub fn with_rng(options: WaveOptions, rng: StdRng) -> Self {
        let groups = resolve_groups(&options.groups);
        Self {
            options,
            groups,
            last_index: None,
            color: None,
            draws: 0,
            rng,
        }
    }

    /// Index of the group addressed by the most recent tick.
    pub fn last_index(&self) -> Option<usize> {
        self.last_index
    }

    /// Number of colors drawn so far.
    pub fn draws(&self) -> u64 {
        self.draws
    }

    fn span(&self) -> Duration {
        self.options.timing.transition() * WAVE_SPAN
    }

    fn draw_color(&mut self) -> Result<Xy> {
        let xy = self.options.color_range.sample(&mut self.rng).xy()?;
        self.draws += 1;
        Ok(xy)
    }
}

#[async_trait]
impl Scene for WaveScene {
    fn kind(&self) -> &'static str {
        "wave"
    }

    fn timing(&self) -> Timing {
        self.options.timing
    }

    async fn next(&mut self, dispatcher: &mut Dispatcher) -> Result<()> {
        if self.groups.is_empty() {
            tracing::debug!("wave has no groups");
            return Ok(());
        }

        let wrapping = self
            .last_index
            .map_or(true, |index| index + 1 >= self.groups.len());
        let index = match self.last_index {
            Some(index) if !wrapping => index + 1,
            _ => 0,
        };

        if wrapping && self.last_index.is_some() {
            // Let the last group finish its fade before the next sweep.
            time::sleep(self.span()).await;
        }

        let color = match self.color {
            Some(color) if !wrapping => color,
            _ => {
                let color = self.draw_color()?;
                self.color = Some(color);
                tracing::debug!(x = color.x, y = color.y, "wave color drawn");
                color
            }
        };
        self.last_index = Some(index);

        let state = LightState::new().on().xy(color).transition(self.span());
        let target = ResolvedTargets::only_groups([self.groups[index].clone()]);
        dispatcher.dispatch(&state, &target).await;
        Ok(())
    }
}
