//! livefx - live effects host
//!
//! Runs the default input through delay, reverb, distortion and chorus to
//! the default output, with a spectrum tap and line commands on stdin.
//!
//! Configuration is read from the JSON file named by `LIVEFX_CONFIG`, if set.
//! Log verbosity follows `RUST_LOG` (default `info`).

mod command;

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use livefx_core::{AudioEngine, EngineConfig, Event, VisualizationSink};
use livefx_dsp::{
    Chorus, ChorusConfig, Delay, DelayConfig, Distortion, Effect, Reverb, ReverbConfig,
    SpectrumAnalyzer, DEFAULT_FFT_SIZE,
};

use crate::command::Command;

const CONFIG_ENV: &str = "LIVEFX_CONFIG";

/// Log the spectrum peak once every this many blocks
const SPECTRUM_LOG_INTERVAL: u64 = 50;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_config()?;
    let sample_rate = config.stream.sample_rate as f32;
    let engine = Arc::new(AudioEngine::new(config).context("Failed to create audio engine")?);

    let spectrum_sink = engine
        .create_visualizer("spectrum")
        .context("Failed to attach spectrum tap")?;

    engine.start().context("Failed to start audio")?;

    let delay = DelayConfig {
        delay_ms: 200.0,
        feedback: 0.4,
        wet: 0.3,
    };
    engine.add_effect(Effect::new(Delay::new(delay, sample_rate)?));
    engine.add_effect(Effect::new(Reverb::new(ReverbConfig::default(), sample_rate)?).disabled());
    engine.add_effect(Effect::new(Distortion::default()).disabled());
    engine.add_effect(Effect::new(Chorus::new(ChorusConfig::default(), sample_rate)?).disabled());

    let running = Arc::new(AtomicBool::new(true));
    let workers = [
        spawn_spectrum_thread(spectrum_sink, sample_rate, Arc::clone(&running))?,
        spawn_event_thread(Arc::clone(&engine), Arc::clone(&running))?,
    ];

    println!("livefx running, latency {:.1} ms", engine.latency_ms());
    println!("{}", Command::HELP);

    let result = run_commands(&engine);

    running.store(false, Ordering::Relaxed);
    engine.stop();
    for worker in workers {
        if worker.join().is_err() {
            warn!("Worker thread panicked");
        }
    }

    result
}

fn load_config() -> Result<EngineConfig> {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) => {
            let path = std::path::PathBuf::from(path);
            EngineConfig::from_json_file(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))
        }
        None => Ok(EngineConfig::default()),
    }
}

/// Read and execute commands until `quit` or end of input
fn run_commands(engine: &AudioEngine) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = line.context("Failed to read stdin")?;

        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(command::ParseError::Empty) => continue,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        match command {
            Command::Toggle(name) => match engine.get_effect(&name) {
                Some(handle) => {
                    handle.toggle();
                    println!("{}", handle.status());
                }
                None => println!("no effect named '{}'", name),
            },
            Command::Wet { name, wet } => match engine.get_effect(&name) {
                Some(handle) => match handle.set_wet(wet) {
                    Some(applied) => println!("{} wet = {:.2}", handle.name(), applied),
                    None => println!("{} has no wet control", handle.name()),
                },
                None => println!("no effect named '{}'", name),
            },
            Command::Set { name, param, value } => match engine.get_effect(&name) {
                Some(handle) => match handle.set_param(&param, value) {
                    Some(applied) => println!("{} {} = {:.2}", handle.name(), param, applied),
                    None => println!(
                        "{} has no '{}' (try: {})",
                        handle.name(),
                        param,
                        handle.param_names().join(", ")
                    ),
                },
                None => println!("no effect named '{}'", name),
            },
            Command::List => {
                for status in engine.list_effects() {
                    println!("  {}", status);
                }
            }
            Command::Metrics => {
                println!("{}", serde_json::to_string_pretty(&engine.metrics())?);
            }
            Command::Reset => {
                engine.reset_effects();
                println!("effect state cleared");
            }
            Command::Help => println!("{}", Command::HELP),
            Command::Quit => break,
        }

        stdout.flush()?;
    }

    Ok(())
}

/// Consume the spectrum tap and log the dominant frequency
fn spawn_spectrum_thread(
    sink: VisualizationSink,
    sample_rate: f32,
    running: Arc<AtomicBool>,
) -> Result<JoinHandle<()>> {
    let mut analyzer = SpectrumAnalyzer::new(DEFAULT_FFT_SIZE)?;

    let handle = thread::Builder::new()
        .name("livefx-spectrum".into())
        .spawn(move || {
            let mut blocks = 0_u64;
            while running.load(Ordering::Relaxed) {
                let Some(block) = sink.pop_timeout(Duration::from_millis(100)) else {
                    continue;
                };
                analyzer.analyze(&block);
                drop(block);

                blocks += 1;
                if blocks % SPECTRUM_LOG_INTERVAL == 0 {
                    if let Some(bin) = analyzer.peak_bin() {
                        debug!(
                            peak_hz = analyzer.bin_frequency(bin, sample_rate),
                            level_db = analyzer.spectrum()[bin],
                            dropped = sink.dropped_count(),
                            "Spectrum peak"
                        );
                    }
                }
            }
        })?;

    Ok(handle)
}

/// Surface engine events in the log
fn spawn_event_thread(engine: Arc<AudioEngine>, running: Arc<AtomicBool>) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("livefx-events".into())
        .spawn(move || {
            while running.load(Ordering::Relaxed) {
                let Some(event) = engine.wait_event(Duration::from_millis(100)) else {
                    continue;
                };
                match event {
                    Event::EffectFault { name, error, .. } => {
                        warn!(effect = %name, %error, "Effect bypassed after failure");
                    }
                    Event::BufferUnderrun => debug!("Audio glitch (buffer under/overflow)"),
                    Event::StreamError { message } => error!(%message, "Audio stream error"),
                    other => info!(event = ?other, "Engine event"),
                }
            }
        })?;

    Ok(handle)
}
