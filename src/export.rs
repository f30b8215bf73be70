//! WAV export for the command-line front end.
//!
//! Pulls PCM from an engine stream block by block and writes it to a
//! 16-bit WAV file until the stream stops.

use anyhow::{Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use midiwave::{Engine, PlaybackState, StreamHandle};
use std::path::Path;

/// Frames requested per render call.
const RENDER_FRAMES: usize = 4096;

/// Renders `stream` from its current position to the end into a WAV file.
///
/// # Arguments
///
/// * `engine` - Engine owning the stream
/// * `stream` - A prepared stream
/// * `output_path` - Path for the output WAV file
/// * `progress_callback` - Optional callback for progress updates (0.0 to 1.0)
///
/// # Returns
///
/// The number of frames written.
///
/// # Errors
///
/// Returns error if the output file cannot be created or written, or if
/// rendering fails.
pub fn export_to_wav<P, F>(
    engine: &mut Engine,
    stream: StreamHandle,
    output_path: P,
    mut progress_callback: Option<F>,
) -> Result<u64>
where
    P: AsRef<Path>,
    F: FnMut(f32),
{
    let config = engine.config().clone();
    let duration_ms = engine.duration(stream)?;

    let spec = WavSpec {
        channels: config.channels,
        sample_rate: config.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(output_path.as_ref(), spec).with_context(|| {
        format!(
            "Failed to create output WAV file: {}",
            output_path.as_ref().display()
        )
    })?;

    let channels = config.channels as usize;
    let mut buffer = vec![0i16; RENDER_FRAMES * channels];
    let mut total_frames = 0u64;

    loop {
        let frames = engine
            .render(stream, &mut buffer)
            .context("Rendering failed")?;
        for &sample in &buffer[..frames * channels] {
            writer.write_sample(sample)?;
        }
        total_frames += frames as u64;

        if let Some(ref mut callback) = progress_callback {
            if duration_ms > 0 {
                callback(engine.location(stream)? as f32 / duration_ms as f32);
            }
        }

        if frames < RENDER_FRAMES || engine.state(stream)? == PlaybackState::Stopped {
            break;
        }
    }

    writer.finalize().context("Failed to finalize WAV file")?;
    Ok(total_frames)
}
