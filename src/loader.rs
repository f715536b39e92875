// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Decodes audio files into sample banks.
//!
//! Everything is decoded up front. Mono files are copied to both channels,
//! files with more than two channels keep the first two, and files at another
//! sample rate are resampled to the requested one.

use std::fs::File;
use std::path::Path;
use std::time::Instant;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info};

use crate::clip::{BankError, SampleBank};

/// Frames fed to the resampler per call.
const RESAMPLE_CHUNK_FRAMES: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode audio: {0}")]
    Decode(#[from] SymphoniaError),

    #[error("no audio track found")]
    NoAudioTrack,

    #[error("sample rate not specified")]
    UnknownSampleRate,

    #[error("resampling from {from} Hz to {to} Hz failed: {reason}")]
    Resample { from: u32, to: u32, reason: String },

    #[error(transparent)]
    Bank(#[from] BankError),
}

/// Decodes `path` into a stereo bank at `target_sample_rate`.
pub fn load_file<P: AsRef<Path>>(path: P, target_sample_rate: u32) -> Result<SampleBank, LoadError> {
    let path = path.as_ref();
    let started = Instant::now();

    let (interleaved, channels, source_rate) = decode(path)?;
    let mut planar = to_stereo_planar(&interleaved, channels);
    if source_rate != target_sample_rate && !planar[0].is_empty() {
        planar = resample(planar, source_rate, target_sample_rate)?;
    }

    let [left, right] = planar;
    let samples: Vec<f32> = left
        .iter()
        .zip(right.iter())
        .flat_map(|(&l, &r)| [l, r])
        .collect();
    let bank = SampleBank::from_interleaved_stereo(samples, target_sample_rate)?;

    info!(
        file = %path.display(),
        channels,
        source_rate,
        target_sample_rate,
        frames = bank.frame_count(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Loaded sample bank"
    );
    Ok(bank)
}

/// Decodes every packet of the first audio track. Returns interleaved samples,
/// the channel count and the sample rate.
fn decode(path: &Path) -> Result<(Vec<f32>, usize, u32), LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(LoadError::NoAudioTrack)?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or(LoadError::UnknownSampleRate)?;
    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples: Vec<f32> = Vec::new();
    let mut channels = track.codec_params.channels.map_or(0, |c| c.count());
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                debug!(file = %path.display(), err = e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        channels = spec.channels.count();
        let needed = decoded.capacity() * channels;
        if sample_buf.as_ref().map_or(true, |buf| buf.capacity() < needed) {
            sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
        }
        if let Some(buf) = sample_buf.as_mut() {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }
    }

    if channels == 0 || samples.is_empty() {
        return Err(BankError::Empty.into());
    }
    Ok((samples, channels, sample_rate))
}

/// Splits interleaved audio into left and right planes.
fn to_stereo_planar(interleaved: &[f32], channels: usize) -> [Vec<f32>; 2] {
    let frames = interleaved.len() / channels;
    let mut left = Vec::with_capacity(frames);
    let mut right = Vec::with_capacity(frames);
    for frame in interleaved.chunks_exact(channels) {
        left.push(frame[0]);
        right.push(if channels == 1 { frame[0] } else { frame[1] });
    }
    [left, right]
}

/// Resamples both planes with a sinc resampler, compensating for its delay so
/// the output lines up with the input and has the expected length.
fn resample(planar: [Vec<f32>; 2], from: u32, to: u32) -> Result<[Vec<f32>; 2], LoadError> {
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        oversampling_factor: 128,
        interpolation: SincInterpolationType::Linear,
        window: WindowFunction::BlackmanHarris2,
    };
    let ratio = f64::from(to) / f64::from(from);
    let mut resampler =
        SincFixedIn::<f32>::new(ratio, 1.0, params, RESAMPLE_CHUNK_FRAMES, planar.len())
            .map_err(|e| resample_error(from, to, e))?;

    let input_frames = planar[0].len();
    let expected = (input_frames as f64 * ratio).ceil() as usize;
    let delay = resampler.output_delay();
    let mut output: [Vec<f32>; 2] = [
        Vec::with_capacity(expected + delay),
        Vec::with_capacity(expected + delay),
    ];
    let append = |output: &mut [Vec<f32>; 2], chunk: Vec<Vec<f32>>| {
        for (out, samples) in output.iter_mut().zip(chunk) {
            out.extend_from_slice(&samples);
        }
    };

    let mut position = 0;
    loop {
        let needed = resampler.input_frames_next();
        if position + needed > input_frames {
            break;
        }
        let chunk: Vec<&[f32]> = planar
            .iter()
            .map(|plane| &plane[position..position + needed])
            .collect();
        let processed = resampler.process(&chunk, None).map_err(|e| resample_error(from, to, e))?;
        append(&mut output, processed);
        position += needed;
    }

    if position < input_frames {
        let chunk: Vec<&[f32]> = planar.iter().map(|plane| &plane[position..]).collect();
        let processed = resampler
            .process_partial(Some(chunk.as_slice()), None)
            .map_err(|e| resample_error(from, to, e))?;
        append(&mut output, processed);
    }

    // Flush what is still inside the filter.
    while output[0].len() < expected + delay {
        let processed = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(|e| resample_error(from, to, e))?;
        if processed[0].is_empty() {
            break;
        }
        append(&mut output, processed);
    }

    for plane in output.iter_mut() {
        plane.drain(..delay.min(plane.len()));
        plane.truncate(expected);
    }
    debug!(from, to, input_frames, output_frames = output[0].len(), "Resampled");
    Ok(output)
}

fn resample_error<E: std::fmt::Display>(from: u32, to: u32, e: E) -> LoadError {
    LoadError::Resample {
        from,
        to,
        reason: e.to_string(),
    }
}
