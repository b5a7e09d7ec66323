use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};

use crate::scenes::SceneConfig;

/// Headroom applied to the transition when no modifier is configured, so the
/// device finishes its own fade before the next command arrives.
pub const DEFAULT_HEADROOM: f64 = 1.5;

/// Top-level configuration: engine tuning plus named scenes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub scenes: BTreeMap<String, SceneConfig>,
}

/// Dispatch and scheduling limits shared by every scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Failed dispatches tolerated before a cooldown.
    pub dropout_threshold: u32,
    pub cooldown_ms: u64,
    /// Period of the independent dropout counter reset.
    pub dropout_reset_ms: u64,
    /// Tick intervals below this log a warning.
    pub min_interval_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            dropout_threshold: 10,
            cooldown_ms: 5_000,
            dropout_reset_ms: 60_000,
            min_interval_ms: 150,
        }
    }
}

impl EngineSettings {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn dropout_reset_period(&self) -> Duration {
        Duration::from_millis(self.dropout_reset_ms)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

/// How the tick interval relates to the configured transition.
///
/// Deserialises from `true` (default headroom), `false` (no headroom) or a
/// number (explicit factor). A missing value means default headroom.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawModifier", into = "RawModifier")]
pub enum TransitionModifier {
    #[default]
    DefaultHeadroom,
    NoHeadroom,
    ScaledBy(f64),
}

impl TransitionModifier {
    pub fn apply(&self, transition: Duration) -> Duration {
        let factor = match *self {
            TransitionModifier::DefaultHeadroom => DEFAULT_HEADROOM,
            TransitionModifier::NoHeadroom => return transition,
            TransitionModifier::ScaledBy(factor) if factor.is_finite() && factor >= 0.0 => factor,
            TransitionModifier::ScaledBy(factor) => {
                tracing::warn!(factor, "ignoring invalid transition modifier");
                return transition;
            }
        };
        Duration::try_from_secs_f64(transition.as_secs_f64() * factor).unwrap_or(Duration::MAX)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawModifier {
    Flag(bool),
    Factor(f64),
}

impl From<RawModifier> for TransitionModifier {
    fn from(value: RawModifier) -> Self {
        match value {
            RawModifier::Flag(true) => TransitionModifier::DefaultHeadroom,
            RawModifier::Flag(false) => TransitionModifier::NoHeadroom,
            RawModifier::Factor(factor) => TransitionModifier::ScaledBy(factor),
        }
    }
}

impl From<TransitionModifier> for RawModifier {
    fn from(value: TransitionModifier) -> Self {
        match value {
            TransitionModifier::DefaultHeadroom => RawModifier::Flag(true),
            TransitionModifier::NoHeadroom => RawModifier::Flag(false),
            TransitionModifier::ScaledBy(factor) => RawModifier::Factor(factor),
        }
    }
}

/// Transition length and the cadence derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Timing {
    /// Device fade length in milliseconds.
    #[serde(rename = "transition")]
    pub transition_ms: u64,
    #[serde(
        default,
        rename = "transitionModifier",
        alias = "transition_modifier"
    )]
    pub modifier: TransitionModifier,
}

impl Timing {
    pub fn new(transition: Duration) -> Self {
        Self {
            transition_ms: transition.as_millis().min(u128::from(u64::MAX)) as u64,
            modifier: TransitionModifier::default(),
        }
    }

    pub fn with_modifier(mut self, modifier: TransitionModifier) -> Self {
        self.modifier = modifier;
        self
    }

    pub fn transition(&self) -> Duration {
        Duration::from_millis(self.transition_ms)
    }

    /// Delay between the end of one tick and the start of the next.
    pub fn tick_interval(&self) -> Duration {
        self.modifier.apply(self.transition())
    }
}
