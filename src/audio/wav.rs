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
use std::{
    fmt,
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

use hound::{WavSpec, WavWriter};
use tracing::info;

use super::{
    format::{SampleFormat, SinkFormat},
    sink::{OutputSink, SinkError},
};

/// A sink that renders the mix into a WAV file instead of a device.
///
/// File writes never apply back-pressure, so a clip rendering into a `WavSink`
/// runs as fast as it can mix.
pub struct WavSink {
    path: PathBuf,
    writer: Option<WavWriter<BufWriter<File>>>,
    format: Option<SinkFormat>,
    scratch: Vec<f32>,
}

impl WavSink {
    /// Creates a sink that will write to the given path once opened.
    pub fn new<P: AsRef<Path>>(path: P) -> WavSink {
        WavSink {
            path: path.as_ref().to_path_buf(),
            writer: None,
            format: None,
            scratch: Vec::new(),
        }
    }
}

impl OutputSink for WavSink {
    fn open(&mut self, format: &SinkFormat, buffer_frames: usize) -> Result<(), SinkError> {
        let spec = WavSpec {
            channels: format.channels(),
            sample_rate: format.sample_rate,
            bits_per_sample: format.bits_per_sample,
            sample_format: match format.sample_format {
                SampleFormat::Int => hound::SampleFormat::Int,
                SampleFormat::Float => hound::SampleFormat::Float,
            },
        };

        self.writer = Some(WavWriter::create(&self.path, spec)?);
        self.format = Some(format.clone());
        self.scratch = Vec::with_capacity(buffer_frames * usize::from(format.channels()));
        info!(path = ?self.path, %format, "Rendering to WAV file.");
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        let (writer, format) = match (self.writer.as_mut(), self.format.as_ref()) {
            (Some(writer), Some(format)) => (writer, format),
            _ => return Err(SinkError::Closed),
        };

        self.scratch.clear();
        format.decode_into(bytes, &mut self.scratch);
        match format.sample_format {
            SampleFormat::Int => {
                for &sample in &self.scratch {
                    writer.write_sample((sample * 32767.0).round() as i16)?;
                }
            }
            SampleFormat::Float => {
                for &sample in &self.scratch {
                    writer.write_sample(sample)?;
                }
            }
        }
        Ok(())
    }

    fn drain(&mut self) -> Result<(), SinkError> {
        match self.writer.as_mut() {
            Some(writer) => Ok(writer.flush()?),
            None => Err(SinkError::Closed),
        }
    }

    fn close(&mut self) -> Result<(), SinkError> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
            info!(path = ?self.path, "WAV file finalized.");
        }
        self.format = None;
        Ok(())
    }
}

impl Drop for WavSink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(path = ?self.path, err = %e, "Failed to finalize WAV file");
        }
    }
}

impl fmt::Display for WavSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (WAV)", self.path.display())
    }
}
