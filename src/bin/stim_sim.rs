// src/bin/stim_sim.rs
//! Dry-run a configuration against simulated devices
//!
//! ```bash
//! # built-in demo layout
//! stim-sim
//!
//! # your own layout, every intention playing for 20 s at full intensity
//! stim-sim config/stim.toml --seconds 20 --intensity 10
//!
//! # force one pattern for all intentions
//! stim-sim config/stim.toml --pattern whip
//! ```
//!
//! Every frame the simulated hardware receives is logged at `info`.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use stim_core::config::{ConfigLoader, EngineConfig};
use stim_core::dispatch::{Intention, IntentionBasedController, PlayRequest};
use stim_core::hal::simulator::{RecordedFrame, SimulatedTransport};
use stim_core::stimulation::{patterns, Intensity, Stimulation};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEMO_CONFIG: &str = r#"
[[devices]]
id = 1
name = "collar"
channels = [
    { name = "left", output = "estim", dependency = "partially_dependent" },
    { name = "right", output = "estim", dependency = "partially_dependent" },
]

[[devices]]
id = 2
name = "wand"
channels = [{ name = "motor", output = "vibration" }]

[[bindings]]
intention = "pace"
channels = ["wand/motor"]

[[bindings]]
intention = "tease"
channels = ["collar/left"]

[[bindings]]
intention = "pain"
channels = ["collar/right"]
"#;

/// Stimulation engine simulator
#[derive(Parser, Debug)]
#[command(name = "stim-sim")]
#[command(author, version, about = "Play intentions on simulated devices", long_about = None)]
struct Cli {
    /// Configuration file; standard locations are searched when omitted
    config: Option<String>,

    /// How long every intention plays
    #[arg(short, long, default_value = "5")]
    seconds: u64,

    /// Intensity 0-10; the configured default when omitted
    #[arg(short, long)]
    intensity: Option<u8>,

    /// Pattern played for every intention instead of the per-intention default
    #[arg(short, long)]
    pattern: Option<String>,

    /// Log filter used when RUST_LOG is unset
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    info!("{} v{}", stim_core::NAME, stim_core::VERSION);

    let config = load_config(cli.config.as_deref())?;
    let controller = Arc::new(IntentionBasedController::from_config(&config)?);
    if let Some(level) = cli.intensity {
        controller.set_intensity(Intensity::new(level)?);
    }

    let mut monitors = Vec::new();
    for device in &config.devices {
        let info = device.device_info();
        let name = info.name.clone();
        let (transport, frames) =
            SimulatedTransport::new(info, device.simulator.clone().unwrap_or_default()).with_monitor();
        controller.connect(transport)?;
        monitors.push(tokio::task::spawn_blocking(move || {
            for recorded in frames.iter() {
                log_frame(&name, &recorded);
            }
        }));
    }

    let duration = Duration::from_secs(cli.seconds);
    let mut requests = Vec::new();
    for binding in &config.bindings {
        let pattern = pattern_for(binding.intention, cli.pattern.as_deref())?;
        info!(intention = %binding.intention, pattern = pattern.name(), "queued");
        requests.push(PlayRequest::shared(binding.intention, pattern, duration));
    }

    for dispatch in controller.play(requests).await? {
        match dispatch.result {
            Ok(receipt) => info!(
                device = %dispatch.device,
                generation = receipt.generation,
                waited_ms = receipt.waited.as_millis() as u64,
                "dispatched"
            ),
            Err(e) => warn!(device = %dispatch.device, error = %e, "dispatch failed"),
        }
    }

    tokio::select! {
        result = controller.complete_all() => result?,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, stopping all devices");
            controller.stop_all().await?;
        }
    }

    for device in &config.devices {
        controller.disconnect(stim_core::DeviceId(device.id)).await?;
    }
    drop(controller);
    for monitor in monitors {
        monitor.await?;
    }

    info!("simulation finished");
    Ok(())
}

fn load_config(path: Option<&str>) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => ConfigLoader::load_file(path)?,
        None => ConfigLoader::new().load()?,
    };
    if config.devices.is_empty() {
        warn!("no devices configured, using the demo layout");
        return Ok(ConfigLoader::load_str(DEMO_CONFIG)?);
    }
    Ok(config)
}

fn pattern_for(
    intention: Intention,
    requested: Option<&str>,
) -> Result<Arc<dyn Stimulation>, Box<dyn std::error::Error>> {
    let name = requested.unwrap_or(match intention {
        Intention::Pace => "walk",
        Intention::Tease => "tease",
        Intention::Pain => "punish",
    });
    patterns::by_name(name).ok_or_else(|| {
        format!("unknown pattern '{}', expected one of {}", name, patterns::LIBRARY.join(", ")).into()
    })
}

fn log_frame(device: &str, recorded: &RecordedFrame) {
    let levels: Vec<String> = recorded.frame.levels.iter().map(|l| format!("{:.2}", l)).collect();
    info!(
        device,
        at_ms = recorded.at.as_millis() as u64,
        levels = %levels.join(" "),
        "frame"
    );
}
