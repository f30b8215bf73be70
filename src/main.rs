//! midiwave - Render MIDI files to WAV with the built-in wavetable synth.
//!
//! # Usage
//!
//! ```bash
//! midiwave song.mid song.wav
//! midiwave song.rmi song.wav --reverb hall --start 15000 --volume 80
//! midiwave song.mid song.wav --config engine.json
//! ```
//!
//! Set `RUST_LOG=debug` to see the stream lifecycle on stderr.

mod export;

use anyhow::{bail, Context, Result};
use export::export_to_wav;
use midiwave::{Engine, EngineConfig, ReverbPreset};
use std::path::PathBuf;

/// Command-line options for the application.
struct CliOptions {
    /// MIDI or RMID file to render.
    input: PathBuf,
    /// WAV file to write.
    output: PathBuf,
    /// Optional JSON engine configuration.
    config: Option<PathBuf>,
    /// Reverb preset; enables the reverb when given.
    reverb: Option<ReverbPreset>,
    /// Start position in milliseconds.
    start_ms: u32,
    /// Master volume (0-100).
    volume: Option<u8>,
}

fn print_help(program: &str) {
    eprintln!("midiwave - Render MIDI files to WAV");
    eprintln!();
    eprintln!("Usage: {} <INPUT> <OUTPUT.wav> [OPTIONS]", program);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config PATH     Load engine settings from a JSON file");
    eprintln!("  -r, --reverb PRESET   Enable reverb: large_hall, hall, chamber, room, plate");
    eprintln!("  -s, --start MS        Start rendering at this position");
    eprintln!("  -v, --volume N        Master volume, 0-100 (default 90)");
    eprintln!("  -h, --help            Print this help message");
}

impl CliOptions {
    /// Parses command-line arguments.
    ///
    /// Supports two positional paths (input, output) and:
    /// - `--config <path>` or `-c <path>`: engine configuration file
    /// - `--reverb <preset>` or `-r <preset>`: reverb preset
    /// - `--start <ms>` or `-s <ms>`: start position
    /// - `--volume <n>` or `-v <n>`: master volume
    /// - `--help` or `-h`: Print help and exit
    fn parse() -> Result<Self> {
        let args: Vec<String> = std::env::args().collect();
        let program = args.first().map(String::as_str).unwrap_or("midiwave");
        let mut positional = Vec::new();
        let mut config = None;
        let mut reverb = None;
        let mut start_ms = 0;
        let mut volume = None;
        let mut i = 1;

        while i < args.len() {
            let arg = args[i].as_str();
            let mut value = || -> Result<String> {
                i += 1;
                args.get(i)
                    .cloned()
                    .with_context(|| format!("{} requires a value", arg))
            };
            match arg {
                "--config" | "-c" => config = Some(PathBuf::from(value()?)),
                "--reverb" | "-r" => reverb = Some(value()?.parse::<ReverbPreset>()?),
                "--start" | "-s" => {
                    start_ms = value()?.parse().context("--start expects milliseconds")?
                }
                "--volume" | "-v" => {
                    volume = Some(value()?.parse().context("--volume expects 0-100")?)
                }
                "--help" | "-h" => {
                    print_help(program);
                    std::process::exit(0);
                }
                other if other.starts_with('-') => {
                    eprintln!("Unknown option: {}", other);
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
                other => positional.push(PathBuf::from(other)),
            }
            i += 1;
        }

        let mut positional = positional.into_iter();
        let (Some(input), Some(output), None) =
            (positional.next(), positional.next(), positional.next())
        else {
            print_help(program);
            std::process::exit(1);
        };

        Ok(Self {
            input,
            output,
            config,
            reverb,
            start_ms,
            volume,
        })
    }
}

/// Main entry point.
fn main() -> Result<()> {
    let cli = CliOptions::parse()?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut config = match cli.config {
        Some(ref path) => EngineConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(preset) = cli.reverb {
        config.reverb_preset = preset;
        config.reverb_bypass = false;
    }

    let mut engine = Engine::new(config).context("Failed to initialize engine")?;
    let stream = engine
        .open_file(&cli.input)
        .with_context(|| format!("Failed to open {}", cli.input.display()))?;
    engine.prepare(stream).context("Failed to prepare stream")?;
    let duration_ms = engine.parse_metadata(stream)?;

    if let Some(volume) = cli.volume {
        engine.set_volume(stream, volume)?;
    }
    if cli.start_ms > 0 {
        if cli.start_ms >= duration_ms {
            bail!(
                "Start position {} ms is not before the end ({} ms)",
                cli.start_ms,
                duration_ms
            );
        }
        engine.locate(stream, cli.start_ms)?;
    }

    eprintln!(
        "Rendering {} ({}.{:03} s)",
        cli.input.display(),
        duration_ms / 1000,
        duration_ms % 1000
    );
    let frames = export_to_wav(&mut engine, stream, &cli.output, None::<fn(f32)>)?;
    eprintln!("Wrote {} frames to {}", frames, cli.output.display());

    engine.close(stream)?;
    engine.shutdown();
    Ok(())
}
