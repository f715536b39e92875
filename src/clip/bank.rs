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

//! Fully decoded, immutable stereo PCM shared by every voice of a clip.

use std::fmt;

use super::error::BankError;

/// Scale for normalizing signed 16-bit input.
const I16_NORMALIZE: f32 = 1.0 / 32768.0;

/// Interleaved stereo samples in [-1.0, 1.0] plus their frame length.
#[derive(Clone)]
pub struct SampleBank {
    samples: Vec<f32>,
    frame_count: usize,
    sample_rate: u32,
}

impl SampleBank {
    /// Builds a bank from interleaved stereo floats.
    pub fn from_interleaved_stereo(samples: Vec<f32>, sample_rate: u32) -> Result<Self, BankError> {
        if sample_rate == 0 {
            return Err(BankError::InvalidSampleRate);
        }
        if samples.len() % 2 != 0 {
            return Err(BankError::OddSampleCount(samples.len()));
        }
        if samples.is_empty() {
            return Err(BankError::Empty);
        }

        let frame_count = samples.len() / 2;
        Ok(Self {
            samples,
            frame_count,
            sample_rate,
        })
    }

    /// Builds a bank from mono floats, copying each sample to both channels.
    pub fn from_mono(samples: &[f32], sample_rate: u32) -> Result<Self, BankError> {
        let interleaved = samples.iter().flat_map(|&s| [s, s]).collect();
        Self::from_interleaved_stereo(interleaved, sample_rate)
    }

    /// Builds a bank from interleaved stereo signed 16-bit samples.
    pub fn from_i16_stereo(samples: &[i16], sample_rate: u32) -> Result<Self, BankError> {
        let normalized = samples
            .iter()
            .map(|&s| f32::from(s) * I16_NORMALIZE)
            .collect();
        Self::from_interleaved_stereo(normalized, sample_rate)
    }

    /// Number of stereo frames.
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Index of the last frame, as a cursor position.
    pub fn last_frame(&self) -> f64 {
        (self.frame_count - 1) as f64
    }

    /// Sample rate the data was decoded at.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The raw interleaved samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Memory used by the sample data, in bytes.
    pub fn memory_usage(&self) -> usize {
        self.samples.len() * std::mem::size_of::<f32>()
    }

    /// Length of the bank in microseconds.
    pub fn microsecond_length(&self) -> u64 {
        self.frames_to_micros(self.frame_count as f64)
    }

    /// Converts a microsecond offset into a (fractional) frame position.
    pub fn micros_to_frames(&self, micros: u64) -> f64 {
        micros as f64 * f64::from(self.sample_rate) / 1_000_000.0
    }

    /// Converts a frame position into whole microseconds.
    pub fn frames_to_micros(&self, frames: f64) -> u64 {
        (frames * 1_000_000.0 / f64::from(self.sample_rate)).round() as u64
    }

    /// Returns the stereo frame at `index`. Callers keep `index < frame_count`.
    #[inline]
    pub fn frame(&self, index: usize) -> (f32, f32) {
        let i = index * 2;
        (self.samples[i], self.samples[i + 1])
    }

    /// Reads the stereo frame at a fractional cursor. Integral cursors read the
    /// frame directly; anything else blends the neighbouring frames linearly.
    #[inline]
    pub fn read(&self, cursor: f64) -> (f32, f32) {
        let floor = cursor.floor();
        let index = floor as usize;
        if cursor == floor {
            return self.frame(index);
        }

        let weight = (cursor - floor) as f32;
        let (l0, r0) = self.frame(index);
        let (l1, r1) = self.frame((index + 1).min(self.frame_count - 1));
        (
            l0 * (1.0 - weight) + l1 * weight,
            r0 * (1.0 - weight) + r1 * weight,
        )
    }
}

impl fmt::Debug for SampleBank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleBank")
            .field("frame_count", &self.frame_count)
            .field("sample_rate", &self.sample_rate)
            .field("memory_kb", &(self.memory_usage() / 1024))
            .finish()
    }
}
