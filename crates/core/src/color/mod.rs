use std::{fmt, str::FromStr};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{Result, SceneError};

const GAMMA_THRESHOLD: f32 = 0.04045;

/// Full span of an unconstrained channel. The upper bound is exclusive.
pub const FULL_CHANNEL: ChannelRange = ChannelRange {
    min: 0.0,
    max: 256.0,
};

/// RGB color in the 8-bit channel range. Channels are not clamped; callers
/// shape them through the ranges they sample from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    /// Carried for completeness, never sent to a device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a: Option<f32>,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(255.0, 255.0, 255.0);
    pub const BLACK: Rgb = Rgb::new(0.0, 0.0, 0.0);

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: None }
    }

    /// Draws a color from the full channel range.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        ColorRange::default().sample(rng)
    }

    /// Linear CIE XYZ tristimulus values (D65 illuminant, 2° observer).
    pub fn xyz(&self) -> Xyz {
        let r = pivot(self.r / 255.0);
        let g = pivot(self.g / 255.0);
        let b = pivot(self.b / 255.0);

        Xyz {
            x: r * 0.4124 + g * 0.3576 + b * 0.1805,
            y: r * 0.2126 + g * 0.7152 + b * 0.0722,
            z: r * 0.0193 + g * 0.1192 + b * 0.9505,
        }
    }

    /// Converts to the device-native chromaticity coordinates.
    ///
    /// Black has no chromaticity and is reported as
    /// [`SceneError::DegenerateColor`] instead of producing NaN.
    pub fn xy(&self) -> Result<Xy> {
        self.xyz().xy().ok_or(SceneError::DegenerateColor {
            r: self.r,
            g: self.g,
            b: self.b,
        })
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb({:.0}, {:.0}, {:.0})", self.r, self.g, self.b)
    }
}

/// Parses `#rrggbb`, `rrggbb`, `rgb` shorthand or a decimal `r,g,b` triple.
impl FromStr for Rgb {
    type Err = SceneError;

    fn from_str(value: &str) -> Result<Self> {
        let invalid = || SceneError::InvalidColor(value.to_string());
        let trimmed = value.trim();

        if trimmed.contains(',') {
            let channels = trimmed
                .split(',')
                .map(|part| part.trim().parse::<f32>().map_err(|_| invalid()))
                .collect::<Result<Vec<_>>>()?;
            return match channels.as_slice() {
                [r, g, b] => Ok(Rgb::new(*r, *g, *b)),
                _ => Err(invalid()),
            };
        }

        let hex = trimmed.strip_prefix('#').unwrap_or(trimmed);
        if !hex.is_ascii() {
            return Err(invalid());
        }
        let channel = |digits: &str| {
            u8::from_str_radix(digits, 16)
                .map(f32::from)
                .map_err(|_| invalid())
        };

        match hex.len() {
            3 => {
                let expand = |i: usize| channel(hex[i..=i].repeat(2).as_str());
                Ok(Rgb::new(expand(0)?, expand(1)?, expand(2)?))
            }
            6 => Ok(Rgb::new(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            )),
            _ => Err(invalid()),
        }
    }
}

fn pivot(channel: f32) -> f32 {
    let linear = if channel > GAMMA_THRESHOLD {
        ((channel + 0.055) / 1.055).powf(2.4)
    } else {
        channel / 12.92
    };
    linear * 100.0
}

/// CIE XYZ tristimulus value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Xyz {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Xyz {
    /// Projects onto the xy plane. `None` when X+Y+Z is zero.
    pub fn xy(&self) -> Option<Xy> {
        let sum = self.x + self.y + self.z;
        if sum == 0.0 || !sum.is_finite() {
            return None;
        }
        Some(Xy {
            x: self.x / sum,
            y: self.y / sum,
        })
    }
}

/// Chromaticity point in the device's native color space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Xy {
    pub x: f32,
    pub y: f32,
}

impl From<Xy> for [f32; 2] {
    fn from(value: Xy) -> Self {
        [value.x, value.y]
    }
}

/// Inclusive `[min, max]` bound for one channel. Serialised as a two element
/// array. Reversed bounds are accepted and sampled as if ordered.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 2]", into = "[f32; 2]")]
pub struct ChannelRange {
    pub min: f32,
    pub max: f32,
}

impl ChannelRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        let (low, high) = if self.min <= self.max {
            (self.min, self.max)
        } else {
            (self.max, self.min)
        };

        // Also catches NaN bounds and spans that overflow.
        if !(high > low) || !(high - low).is_finite() {
            return low;
        }
        rng.gen_range(low..high)
    }
}

impl From<[f32; 2]> for ChannelRange {
    fn from([min, max]: [f32; 2]) -> Self {
        Self { min, max }
    }
}

impl From<ChannelRange> for [f32; 2] {
    fn from(value: ChannelRange) -> Self {
        [value.min, value.max]
    }
}

/// Per-channel sampling bounds. Unset channels use [`FULL_CHANNEL`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ColorRange {
    #[serde(default, alias = "rangeR", skip_serializing_if = "Option::is_none")]
    pub r: Option<ChannelRange>,
    #[serde(default, alias = "rangeG", skip_serializing_if = "Option::is_none")]
    pub g: Option<ChannelRange>,
    #[serde(default, alias = "rangeB", skip_serializing_if = "Option::is_none")]
    pub b: Option<ChannelRange>,
}

impl ColorRange {
    /// Returns a copy with every unset channel filled with the full range.
    pub fn filled(&self) -> [ChannelRange; 3] {
        [
            self.r.unwrap_or(FULL_CHANNEL),
            self.g.unwrap_or(FULL_CHANNEL),
            self.b.unwrap_or(FULL_CHANNEL),
        ]
    }

    /// Draws each channel independently and uniformly from its bound.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Rgb {
        let [r, g, b] = self.filled();
        Rgb::new(r.sample(rng), g.sample(rng), b.sample(rng))
    }
}
