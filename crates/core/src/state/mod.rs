use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    color::{Rgb, Xy},
    Result,
};

const WIRE_BRIGHTNESS_MAX: f32 = 254.0;

/// State payload pushed to a light or group.
///
/// Built fluently; unset fields are left untouched on the device. Colors are
/// always sent as chromaticity, so [`LightState::rgb`] converts locally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LightState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on: Option<bool>,
    /// Brightness percentage, `0..=100`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xy: Option<Xy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_ms: Option<u64>,
}

impl LightState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self) -> Self {
        self.power(true)
    }

    pub fn off(self) -> Self {
        self.power(false)
    }

    pub fn power(mut self, on: bool) -> Self {
        self.on = Some(on);
        self
    }

    /// Sets brightness from a percentage. Out of range values are clamped.
    pub fn brightness(mut self, percent: f32) -> Self {
        let clamped = if percent.is_nan() {
            0.0
        } else {
            percent.clamp(0.0, 100.0)
        };
        self.brightness = Some(clamped.round() as u8);
        self
    }

    pub fn xy(mut self, xy: Xy) -> Self {
        self.xy = Some(xy);
        self
    }

    /// Sets the color from RGB by converting it to chromaticity.
    pub fn rgb(self, color: Rgb) -> Result<Self> {
        Ok(self.xy(color.xy()?))
    }

    pub fn transition(mut self, duration: Duration) -> Self {
        self.transition_ms = Some(duration.as_millis().min(u128::from(u64::MAX)) as u64);
        self
    }

    /// Snap to the new state with no fade.
    pub fn instant(self) -> Self {
        self.transition(Duration::ZERO)
    }

    pub fn transition_time(&self) -> Option<Duration> {
        self.transition_ms.map(Duration::from_millis)
    }

    /// Bridge encoding: `bri` on a 0–254 scale and `transitiontime` in
    /// deciseconds.
    pub fn to_wire(&self) -> WireState {
        WireState {
            on: self.on,
            bri: self
                .brightness
                .map(|percent| (f32::from(percent) * WIRE_BRIGHTNESS_MAX / 100.0).round() as u8),
            xy: self.xy.map(Into::into),
            transitiontime: self
                .transition_ms
                .map(|ms| u16::try_from((ms + 50) / 100).unwrap_or(u16::MAX)),
        }
    }
}

/// [`LightState`] as the bridge expects it on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bri: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xy: Option<[f32; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transitiontime: Option<u16>,
}
