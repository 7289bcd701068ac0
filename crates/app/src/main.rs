use std::{path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use voice_effects_core::{
    AppConfig, AssetHandle, AssetStore, EffectError, EffectListener, EffectName, EffectScheduler,
    FileAssetStore, InstanceId, PlaybackClock, SimulatedHost,
};

fn main() -> voice_effects_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    match cli.command {
        Commands::Effects { json } => list_effects(&config, json),
        Commands::Apply {
            effect,
            input,
            duration_ms,
        } => run_apply(&config, effect, input, duration_ms),
    }
}

fn list_effects(config: &AppConfig, json: bool) -> voice_effects_core::Result<()> {
    let catalog = config.load_catalog()?;
    if json {
        println!("{}", catalog.to_json_pretty()?);
        return Ok(());
    }

    for definition in catalog.definitions() {
        let character = definition
            .primary()
            .map(|layer| layer.character().to_string())
            .unwrap_or_default();
        let modulation = if definition.modulation.is_some() {
            ", modulated"
        } else {
            ""
        };
        println!(
            "{:<11} {} layer(s), {character}{modulation}",
            definition.name,
            definition.layers.len()
        );
    }
    Ok(())
}

fn run_apply(
    config: &AppConfig,
    effect: EffectName,
    input: PathBuf,
    duration_ms: u64,
) -> voice_effects_core::Result<()> {
    tracing::info!(%effect, ?input, duration_ms, "applying effect");

    let store = FileAssetStore::new(std::env::current_dir()?);
    let asset = AssetHandle::new(input);
    let host = SimulatedHost::new();
    if store.exists(&asset) {
        host.add_asset(asset.clone(), duration_ms);
    }

    let mut scheduler = EffectScheduler::new(
        config.load_catalog()?,
        Box::new(host.clone()),
        Box::new(store),
    )
    .with_listener(Box::new(LogListener));
    if let Some(seed) = config.playback.random_seed {
        scheduler = scheduler.with_seed(seed);
    }

    let tick = Duration::from_millis(config.playback.tick_interval_ms.max(1));
    let clock = PlaybackClock::start();
    scheduler.apply_effect(effect, &asset, clock.elapsed_ms())?;

    while !scheduler.is_idle() {
        std::thread::sleep(tick);
        let now = clock.elapsed_ms();
        host.advance_to(now);
        scheduler.tick(now);
    }

    tracing::info!(
        players = host.player_count(),
        commands = host.records().len(),
        elapsed_ms = clock.elapsed_ms(),
        "effect played to completion"
    );
    Ok(())
}

/// Mirrors scheduler notifications into the log.
struct LogListener;

impl EffectListener for LogListener {
    fn on_effect_started(&mut self, name: EffectName) {
        tracing::info!(effect = %name, "now playing");
    }

    fn on_layer_completed(&mut self, id: InstanceId) {
        tracing::info!(instance = %id, "layer completed");
    }

    fn on_layer_failed(&mut self, layer: usize, error: &EffectError) {
        tracing::warn!(layer, %error, "layer skipped");
    }

    fn on_effect_failed(&mut self, error: &EffectError) {
        tracing::error!(%error, "effect failed");
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Voice effects for recorded takes", long_about = None)]
struct Cli {
    /// Optional JSON configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the available effects.
    Effects {
        /// Print the full catalog as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Play a recording through an effect on the simulated host.
    Apply {
        /// Effect to apply (normal, robot, squirrel, echo, distortion, ghost).
        effect: EffectName,
        /// Path to the recorded audio file.
        input: PathBuf,
        /// Length of the recording in milliseconds.
        #[arg(long, default_value_t = 3_000)]
        duration_ms: u64,
    },
}
