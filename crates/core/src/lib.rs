//! Core library for driving networked lights through periodic scenes.
//!
//! A scene is an animation that computes a new light state on every tick and
//! pushes it to a set of lights and groups. The modules split that work into
//! the color model, gradient synthesis, target resolution, dispatch with
//! dropout backoff, and the lifecycle engine that ties them to a timer. The
//! device itself sits behind the [`DeviceClient`] trait; [`SimulatedBridge`]
//! is an in-memory implementation for local runs and tests.

pub mod client;
pub mod color;
pub mod config;
pub mod director;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod gradient;
pub mod scenes;
pub mod state;
pub mod target;

pub use client::{ClientError, Command, DeviceClient, GroupInfo, SimulatedBridge, Target};
pub use color::{ChannelRange, ColorRange, Rgb, Xy};
pub use config::{AppConfig, EngineSettings, Timing, TransitionModifier};
pub use director::SceneDirector;
pub use dispatch::{DispatchStats, Dispatcher};
pub use engine::{Scene, SceneHandle, SceneState};
pub use error::{Result, SceneError};
pub use gradient::OscillationCursor;
pub use scenes::{
    ColorGenerator, GradientOptions, GradientScene, SceneConfig, StrobeOptions, StrobeScene,
    WaveOptions, WaveScene,
};
pub use state::{LightState, WireState};
pub use target::{GroupRef, LightRef, ResolvedTargets, TargetSet};
