use std::{collections::BTreeMap, str::FromStr, sync::Arc, time::Duration};

use clap::{Args, Parser, Subcommand};
use hue_scenes_core::{
    ChannelRange, ColorGenerator, ColorRange, DeviceClient, EngineSettings, GradientOptions,
    LightState, Rgb, SceneConfig, SceneDirector, SceneError, SimulatedBridge, StrobeOptions,
    TargetSet, Timing, TransitionModifier, WaveOptions,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> hue_scenes_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Gradient(args) => {
            let mut options = GradientOptions::new(args.targets.target_set(), args.timing.timing());
            options.color_range = args.colors.color_range();
            options.brightness_range = args.brightness;
            if let Some(stops) = args.stops {
                options.stops = stops;
            }
            if let Some(steps) = args.steps {
                options.steps = steps;
            }
            let bridge = args.targets.bridge(args.run.latency_ms);
            run_scene(bridge, &args.run, options.into()).await
        }
        Commands::Strobe(args) => {
            let mut options = StrobeOptions::new(args.targets.target_set(), args.timing.timing());
            if let Some(active) = args.active_color {
                options.active_color = active;
            }
            if let Some(inactive) = args.inactive_color {
                options.inactive_color = inactive;
            }
            let bridge = args.targets.bridge(args.run.latency_ms);
            run_scene(bridge, &args.run, options.into()).await
        }
        Commands::Wave(args) => {
            let mut options = WaveOptions::new(args.groups.clone(), args.timing.timing());
            options.color_range = args.colors.color_range();
            let bridge = simulated_bridge(&args.groups, args.run.latency_ms);
            run_scene(bridge, &args.run, options.into()).await
        }
        Commands::State(args) => set_state(args).await,
    }
}

async fn run_scene(
    bridge: SimulatedBridge,
    run: &RunArgs,
    config: SceneConfig,
) -> hue_scenes_core::Result<()> {
    let bridge = Arc::new(bridge);
    let settings = EngineSettings {
        dropout_threshold: run.dropout_threshold,
        cooldown_ms: run.cooldown_ms,
        ..EngineSettings::default()
    };

    tracing::info!(
        scene = config.kind(),
        interval_ms = config.timing().tick_interval().as_millis() as u64,
        "starting dry run against the simulated bridge"
    );

    let mut director = SceneDirector::new(bridge.clone(), settings);
    director.start(config.kind(), &config);

    match run.duration_secs {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => tokio::signal::ctrl_c().await?,
    }

    let stats: BTreeMap<_, _> = director
        .running()
        .into_iter()
        .filter_map(|name| director.get(name).map(|handle| (name.to_string(), handle.stats())))
        .collect();
    director.stop_all().await;

    tracing::info!(commands = bridge.command_count(), "dry run finished");
    println!("{}", to_json(&stats)?);
    Ok(())
}

async fn set_state(args: StateArgs) -> hue_scenes_core::Result<()> {
    let mut state = LightState::new();
    if args.on {
        state = state.on();
    }
    if args.off {
        state = state.off();
    }
    if let Some(percent) = args.brightness {
        state = state.brightness(percent);
    }
    if let Some(color) = args.color {
        state = state.rgb(color)?;
    }
    state = state.transition(Duration::from_millis(args.transition_ms));

    let bridge = args.targets.bridge(0);
    let resolved = args.targets.target_set().resolve();
    if resolved.is_empty() {
        tracing::warn!("no lights or groups given, nothing to send");
    }
    for light in &resolved.lights {
        bridge.set_light_state(light, &state).await?;
    }
    for group in &resolved.groups {
        bridge.set_group_light_state(group, &state).await?;
    }

    println!("{}", to_json(&state.to_wire())?);
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> hue_scenes_core::Result<String> {
    serde_json::to_string_pretty(value).map_err(|err| SceneError::msg(err.to_string()))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Run lighting scenes against a simulated bridge", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Wander through a random looping gradient.
    Gradient(GradientArgs),
    /// Flash one random light at a time.
    Strobe(StrobeArgs),
    /// Sweep a color across groups in order.
    Wave(WaveArgs),
    /// Send a single state and print its wire form.
    State(StateArgs),
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// Light ids to address.
    #[arg(short, long, value_delimiter = ',')]
    lights: Vec<String>,
    /// Group ids to address.
    #[arg(short, long, value_delimiter = ',')]
    groups: Vec<String>,
    /// Group membership known to the simulated bridge, as `group=light,light`.
    #[arg(long = "group-lights", value_parser = parse_membership)]
    group_lights: Vec<(String, Vec<String>)>,
}

impl TargetArgs {
    fn target_set(&self) -> TargetSet {
        TargetSet::new(self.lights.iter().cloned(), self.groups.iter().cloned())
    }

    fn bridge(&self, latency_ms: u64) -> SimulatedBridge {
        let mut bridge = simulated_bridge(&self.groups, latency_ms);
        for (group, lights) in &self.group_lights {
            bridge = bridge.with_group(group.clone(), lights.iter().cloned());
        }
        bridge
    }
}

/// Bridge that knows `groups`, each with no member lights.
fn simulated_bridge(groups: &[String], latency_ms: u64) -> SimulatedBridge {
    groups.iter().fold(
        SimulatedBridge::new().with_latency(Duration::from_millis(latency_ms)),
        |bridge, group| bridge.with_group(group.clone(), Vec::<String>::new()),
    )
}

#[derive(Args, Debug)]
struct TimingArgs {
    /// Device transition length in milliseconds.
    #[arg(short, long = "transition", default_value_t = 1000)]
    transition_ms: u64,
    /// `true` for default headroom, `false` for none, or a scale factor.
    #[arg(short, long, value_parser = parse_modifier)]
    modifier: Option<TransitionModifier>,
}

impl TimingArgs {
    fn timing(&self) -> Timing {
        Timing::new(Duration::from_millis(self.transition_ms))
            .with_modifier(self.modifier.unwrap_or_default())
    }
}

#[derive(Args, Debug)]
struct ColorRangeArgs {
    /// Red channel bounds as `min:max`.
    #[arg(long, value_parser = parse_range)]
    red: Option<ChannelRange>,
    /// Green channel bounds as `min:max`.
    #[arg(long, value_parser = parse_range)]
    green: Option<ChannelRange>,
    /// Blue channel bounds as `min:max`.
    #[arg(long, value_parser = parse_range)]
    blue: Option<ChannelRange>,
}

impl ColorRangeArgs {
    fn color_range(&self) -> ColorRange {
        ColorRange {
            r: self.red,
            g: self.green,
            b: self.blue,
        }
    }
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Stop after this many seconds instead of waiting for Ctrl-C.
    #[arg(short, long = "duration")]
    duration_secs: Option<u64>,
    /// Artificial latency of the simulated bridge.
    #[arg(long, default_value_t = 20)]
    latency_ms: u64,
    #[arg(long, default_value_t = EngineSettings::default().dropout_threshold)]
    dropout_threshold: u32,
    #[arg(long, default_value_t = EngineSettings::default().cooldown_ms)]
    cooldown_ms: u64,
}

#[derive(Args, Debug)]
struct GradientArgs {
    #[command(flatten)]
    targets: TargetArgs,
    #[command(flatten)]
    timing: TimingArgs,
    #[command(flatten)]
    colors: ColorRangeArgs,
    /// Brightness percentage bounds as `min:max`.
    #[arg(short, long, value_parser = parse_range)]
    brightness: Option<ChannelRange>,
    #[arg(long)]
    stops: Option<usize>,
    #[arg(long)]
    steps: Option<usize>,
    #[command(flatten)]
    run: RunArgs,
}

#[derive(Args, Debug)]
struct StrobeArgs {
    #[command(flatten)]
    targets: TargetArgs,
    #[command(flatten)]
    timing: TimingArgs,
    /// Flash color: `#rrggbb`, `r,g,b` or `random`.
    #[arg(long, value_parser = parse_generator)]
    active_color: Option<ColorGenerator>,
    /// Color of lights between flashes.
    #[arg(long, value_parser = parse_generator)]
    inactive_color: Option<ColorGenerator>,
    #[command(flatten)]
    run: RunArgs,
}

#[derive(Args, Debug)]
struct WaveArgs {
    /// Group ids to sweep, in order.
    #[arg(short, long, value_delimiter = ',', required = true)]
    groups: Vec<String>,
    #[command(flatten)]
    timing: TimingArgs,
    #[command(flatten)]
    colors: ColorRangeArgs,
    #[command(flatten)]
    run: RunArgs,
}

#[derive(Args, Debug)]
struct StateArgs {
    #[command(flatten)]
    targets: TargetArgs,
    #[arg(long, conflicts_with = "off")]
    on: bool,
    #[arg(long)]
    off: bool,
    /// Brightness percentage.
    #[arg(short, long)]
    brightness: Option<f32>,
    /// `#rrggbb` or `r,g,b`.
    #[arg(short, long, value_parser = Rgb::from_str)]
    color: Option<Rgb>,
    #[arg(short, long = "transition", default_value_t = 400)]
    transition_ms: u64,
}

fn parse_range(value: &str) -> Result<ChannelRange, String> {
    let (min, max) = value
        .split_once(':')
        .ok_or_else(|| format!("expected `min:max`, got `{value}`"))?;
    let parse = |part: &str| {
        part.trim()
            .parse::<f32>()
            .map_err(|err| format!("invalid bound `{part}`: {err}"))
    };
    Ok(ChannelRange::new(parse(min)?, parse(max)?))
}

fn parse_modifier(value: &str) -> Result<TransitionModifier, String> {
    match value {
        "true" => Ok(TransitionModifier::DefaultHeadroom),
        "false" => Ok(TransitionModifier::NoHeadroom),
        factor => factor
            .parse::<f64>()
            .map(TransitionModifier::ScaledBy)
            .map_err(|_| format!("expected `true`, `false` or a number, got `{value}`")),
    }
}

fn parse_generator(value: &str) -> Result<ColorGenerator, String> {
    if value.eq_ignore_ascii_case("random") {
        return Ok(ColorGenerator::Random(ColorRange::default()));
    }
    Rgb::from_str(value)
        .map(ColorGenerator::Fixed)
        .map_err(|err| err.to_string())
}

fn parse_membership(value: &str) -> Result<(String, Vec<String>), String> {
    let (group, lights) = value
        .split_once('=')
        .ok_or_else(|| format!("expected `group=light,light`, got `{value}`"))?;
    let lights = lights
        .split(',')
        .map(str::trim)
        .filter(|light| !light.is_empty())
        .map(str::to_string)
        .collect();
    Ok((group.trim().to_string(), lights))
}
