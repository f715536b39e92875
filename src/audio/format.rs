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

use std::{fmt, str::FromStr};

use super::sink::SinkError;

/// Number of interleaved channels every sink receives.
pub const SINK_CHANNELS: u16 = 2;

/// Scale used when converting between normalized floats and 16-bit integers.
const I16_SCALE: f32 = 32767.0;

/// Sample format enumeration for the sink's native encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Integer samples (16-bit little endian)
    Int,
    /// Floating point samples (32-bit little endian)
    Float,
}

impl FromStr for SampleFormat {
    type Err = SinkError;

    /// Convert from string representation
    fn from_str(s: &str) -> Result<Self, SinkError> {
        match s {
            "float" | "Float" => Ok(SampleFormat::Float),
            "int" | "Int" => Ok(SampleFormat::Int),
            _ => Err(SinkError::UnsupportedFormat(format!(
                "unknown sample format: {}",
                s
            ))),
        }
    }
}

impl SampleFormat {
    /// Convert to string representation
    pub fn as_str(self) -> &'static str {
        match self {
            SampleFormat::Float => "float",
            SampleFormat::Int => "int",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The native, interleaved stereo format an output sink accepts.
///
/// The mixing core always works in normalized `f32`; the playback worker uses
/// [`SinkFormat::encode_into`] to produce the bytes handed to the sink.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Sample format (integer or float)
    pub sample_format: SampleFormat,
    /// Bits per sample
    pub bits_per_sample: u16,
}

impl SinkFormat {
    /// Creates a new SinkFormat. Only 16-bit integer and 32-bit float are supported.
    pub fn new(
        sample_rate: u32,
        sample_format: SampleFormat,
        bits_per_sample: u16,
    ) -> Result<Self, SinkError> {
        if sample_rate == 0 {
            return Err(SinkError::UnsupportedFormat(
                "sample rate must be greater than 0".to_string(),
            ));
        }

        match (sample_format, bits_per_sample) {
            (SampleFormat::Int, 16) | (SampleFormat::Float, 32) => Ok(SinkFormat {
                sample_rate,
                sample_format,
                bits_per_sample,
            }),
            _ => Err(SinkError::UnsupportedFormat(format!(
                "{}-bit {} samples",
                bits_per_sample, sample_format
            ))),
        }
    }

    /// Number of interleaved channels.
    pub fn channels(&self) -> u16 {
        SINK_CHANNELS
    }

    /// Bytes occupied by a single sample.
    pub fn bytes_per_sample(&self) -> usize {
        usize::from(self.bits_per_sample / 8)
    }

    /// Bytes occupied by one interleaved stereo frame.
    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_sample() * usize::from(SINK_CHANNELS)
    }

    /// Encodes normalized samples into the native byte layout, replacing the
    /// contents of `out`. Integer output is clamped to [-1.0, 1.0] first.
    pub fn encode_into(&self, samples: &[f32], out: &mut Vec<u8>) {
        out.clear();
        match self.sample_format {
            SampleFormat::Int => {
                for &sample in samples {
                    let value = (sample.clamp(-1.0, 1.0) * I16_SCALE) as i16;
                    out.extend_from_slice(&value.to_le_bytes());
                }
            }
            SampleFormat::Float => {
                for &sample in samples {
                    out.extend_from_slice(&sample.to_le_bytes());
                }
            }
        }
    }

    /// Decodes native bytes back into normalized samples, appending to `out`.
    /// A trailing partial sample is ignored.
    pub fn decode_into(&self, bytes: &[u8], out: &mut Vec<f32>) {
        match self.sample_format {
            SampleFormat::Int => out.extend(
                bytes
                    .chunks_exact(2)
                    .map(|b| f32::from(i16::from_le_bytes([b[0], b[1]])) / I16_SCALE),
            ),
            SampleFormat::Float => out.extend(
                bytes
                    .chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            ),
        }
    }
}

impl Default for SinkFormat {
    /// Creates a default sink format (44.1kHz, 16-bit integer)
    fn default() -> Self {
        SinkFormat {
            sample_rate: 44100,
            sample_format: SampleFormat::Int,
            bits_per_sample: 16,
        }
    }
}

impl fmt::Display for SinkFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Hz {}-bit {} stereo",
            self.sample_rate, self.bits_per_sample, self.sample_format
        )
    }
}
