use rand::Rng;

use crate::{
    color::{ChannelRange, ColorRange, Rgb},
    Result, SceneError,
};

/// Number of random seed points in a freshly built loop.
pub const DEFAULT_STOPS: usize = 50;
/// Number of interpolated steps a seed loop is expanded to.
pub const DEFAULT_STEPS: usize = 500;

const CHANNEL_MAX: f32 = 255.0;
const BRIGHTNESS_MAX: f32 = 100.0;

/// Values that can be interpolated along a Catmull-Rom segment.
pub trait Spline: Copy {
    /// Evaluates the segment between `p1` and `p2` at `t` in `[0, 1)`.
    fn catmull_rom(p0: Self, p1: Self, p2: Self, p3: Self, t: f32) -> Self;
}

impl Spline for f32 {
    fn catmull_rom(p0: f32, p1: f32, p2: f32, p3: f32, t: f32) -> f32 {
        let t2 = t * t;
        let t3 = t2 * t;
        0.5 * ((2.0 * p1)
            + (p2 - p0) * t
            + (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * t2
            + (3.0 * p1 - p0 - 3.0 * p2 + p3) * t3)
    }
}

impl Spline for Rgb {
    fn catmull_rom(p0: Rgb, p1: Rgb, p2: Rgb, p3: Rgb, t: f32) -> Rgb {
        let channel = |a: f32, b: f32, c: f32, d: f32| {
            f32::catmull_rom(a, b, c, d, t).clamp(0.0, CHANNEL_MAX)
        };
        Rgb::new(
            channel(p0.r, p1.r, p2.r, p3.r),
            channel(p0.g, p1.g, p2.g, p3.g),
            channel(p0.b, p1.b, p2.b, p3.b),
        )
    }
}

/// Draws `stops` independent random colors inside `range`. This is the raw
/// seed loop; pass it through [`expand`] before traversing it.
pub fn build_loop<R: Rng + ?Sized>(range: &ColorRange, stops: usize, rng: &mut R) -> Vec<Rgb> {
    (0..stops).map(|_| range.sample(rng)).collect()
}

/// Seed loop of brightness percentages drawn from `range`.
pub fn build_brightness_loop<R: Rng + ?Sized>(
    range: &ChannelRange,
    stops: usize,
    rng: &mut R,
) -> Vec<f32> {
    (0..stops).map(|_| range.sample(rng)).collect()
}

/// Resamples a closed spline through `seeds` to exactly `steps` values.
///
/// Step `i` sits at parameter `i * seeds.len() / steps`, so seeds are hit
/// exactly whenever that parameter is an integer.
pub fn expand<T: Spline>(seeds: &[T], steps: usize) -> Vec<T> {
    let count = seeds.len();
    match seeds {
        [] => return Vec::new(),
        [only] => return vec![*only; steps],
        _ => {}
    }

    let wrap = |index: usize, offset: isize| {
        let wrapped = (index as isize + offset).rem_euclid(count as isize);
        seeds[wrapped as usize]
    };

    (0..steps)
        .map(|step| {
            let position = step as f32 * count as f32 / steps as f32;
            let segment = (position.floor() as usize).min(count - 1);
            let t = position - segment as f32;
            T::catmull_rom(
                wrap(segment, -1),
                wrap(segment, 0),
                wrap(segment, 1),
                wrap(segment, 2),
                t,
            )
        })
        .collect()
}

/// Expands a brightness seed loop, keeping every step a valid percentage.
pub fn expand_brightness(seeds: &[f32], steps: usize) -> Vec<f32> {
    expand(seeds, steps)
        .into_iter()
        .map(|value| value.clamp(0.0, BRIGHTNESS_MAX))
        .collect()
}

/// Walks a fixed sequence back and forth.
///
/// At either end the direction flips and the cursor lands one step inside
/// (index 1 or `len - 2`), so the boundary value is emitted once rather than
/// twice. The traversal "breathes" instead of jumping back to the start.
#[derive(Debug, Clone)]
pub struct OscillationCursor<T> {
    steps: Vec<T>,
    position: usize,
    reversing: bool,
}

impl<T> OscillationCursor<T> {
    pub fn new(steps: Vec<T>) -> Result<Self> {
        if steps.is_empty() {
            return Err(SceneError::EmptySequence);
        }
        Ok(Self {
            steps,
            position: 0,
            reversing: false,
        })
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_reversing(&self) -> bool {
        self.reversing
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[T] {
        &self.steps
    }

    /// Value under the cursor without moving it.
    pub fn current(&self) -> &T {
        &self.steps[self.position]
    }

    /// Emits the value under the cursor and moves one step.
    pub fn advance(&mut self) -> &T {
        let emitted = self.position;
        self.step();
        &self.steps[emitted]
    }

    fn step(&mut self) {
        let len = self.steps.len();
        if len < 2 {
            return;
        }

        if self.reversing {
            if self.position == 0 {
                self.reversing = false;
                self.position = 1;
            } else {
                self.position -= 1;
            }
        } else if self.position + 1 >= len {
            self.reversing = true;
            self.position = len - 2;
        } else {
            self.position += 1;
        }
    }
}
