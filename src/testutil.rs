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
use std::{error::Error, f32::consts::PI, fs::File, path::Path};

use hound::{SampleFormat, WavSpec, WavWriter};

/// A cosine tone of `frame_count` mono samples at amplitude 0.8. For 1 kHz at
/// 44.1 kHz no sample lands on a zero crossing.
pub fn cos_tone(frequency: f32, sample_rate: u32, frame_count: usize) -> Vec<f32> {
    (0..frame_count)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            0.8 * (2.0 * PI * frequency * t).cos()
        })
        .collect()
}

/// Writes interleaved 16-bit samples to a WAV file.
pub fn write_wav_i16(
    path: &Path,
    channels: u16,
    sample_rate: u32,
    samples: &[i16],
) -> Result<(), Box<dyn Error>> {
    let mut writer = WavWriter::new(
        File::create(path)?,
        WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        },
    )?;
    for sample in samples {
        writer.write_sample(*sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Writes a mono 16-bit WAV of the given float samples.
pub fn write_wav_mono(
    path: &Path,
    sample_rate: u32,
    samples: &[f32],
) -> Result<(), Box<dyn Error>> {
    let samples: Vec<i16> = samples
        .iter()
        .map(|s| (s.clamp(-1.0, 1.0) * 32767.0).round() as i16)
        .collect();
    write_wav_i16(path, 1, sample_rate, &samples)
}
