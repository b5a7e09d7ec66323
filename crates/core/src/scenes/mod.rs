mod gradient;
mod strobe;
mod wave;

use serde::{Deserialize, Serialize};

pub use gradient::{GradientOptions, GradientScene};
pub use strobe::{ColorGenerator, StrobeOptions, StrobeScene};
pub use wave::{WaveOptions, WaveScene, WAVE_SPAN};

use crate::{config::Timing, engine::Scene};

/// Serialisable description of a scene, tagged by `scene`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scene", rename_all = "snake_case")]
pub enum SceneConfig {
    Gradient(GradientOptions),
    Strobe(StrobeOptions),
    Wave(WaveOptions),
}

impl SceneConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            SceneConfig::Gradient(_) => "gradient",
            SceneConfig::Strobe(_) => "strobe",
            SceneConfig::Wave(_) => "wave",
        }
    }

    pub fn timing(&self) -> Timing {
        match self {
            SceneConfig::Gradient(options) => options.timing,
            SceneConfig::Strobe(options) => options.timing,
            SceneConfig::Wave(options) => options.timing,
        }
    }

    /// Creates a fresh, uninitialised scene from this configuration.
    pub fn build(&self) -> Box<dyn Scene> {
        match self {
            SceneConfig::Gradient(options) => Box::new(GradientScene::new(options.clone())),
            SceneConfig::Strobe(options) => Box::new(StrobeScene::new(options.clone())),
            SceneConfig::Wave(options) => Box::new(WaveScene::new(options.clone())),
        }
    }
}

impl From<GradientOptions> for SceneConfig {
    fn from(value: GradientOptions) -> Self {
        SceneConfig::Gradient(value)
    }
}

impl From<StrobeOptions> for SceneConfig {
    fn from(value: StrobeOptions) -> Self {
        SceneConfig::Strobe(value)
    }
}

impl From<WaveOptions> for SceneConfig {
    fn from(value: WaveOptions) -> Self {
        SceneConfig::Wave(value)
    }
}
