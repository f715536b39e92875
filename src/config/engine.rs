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
use std::{path::Path, str::FromStr};

use config::{Config, File};
use serde::Deserialize;

use crate::audio::{SampleFormat, SinkFormat};
use crate::clip::{RampSteps, DEFAULT_BUFFER_FRAMES};
use crate::clip::mixer::{DEFAULT_SPEED_RAMP_STEPS, DEFAULT_VOLUME_RAMP_STEPS};

use super::error::ConfigError;

const DEFAULT_DEVICE: &str = "default";
const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_POLYPHONY: usize = 8;

/// A YAML representation of the engine configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct EngineConfig {
    /// Output device: a cpal device name, "default", or "wav:<path>".
    device: Option<String>,

    /// Sample rate in Hz (default: 44100). Files are resampled to this rate.
    sample_rate: Option<u32>,

    /// "int" or "float" (default: "int").
    sample_format: Option<String>,

    /// Bits per sample (default: 16 for int, 32 for float).
    bits_per_sample: Option<u16>,

    /// Frames mixed per worker pass (default: 256).
    buffer_frames: Option<usize>,

    /// Voices per clip (default: 8).
    polyphony: Option<usize>,

    /// Mix steps a volume change is spread over (default: 1024).
    volume_ramp_steps: Option<u32>,

    /// Mix steps a speed change is spread over (default: 4096).
    speed_ramp_steps: Option<u32>,
}

impl EngineConfig {
    /// Creates a configuration for the given device with every other field defaulted.
    pub fn new(device: &str) -> EngineConfig {
        EngineConfig {
            device: Some(device.to_string()),
            ..Default::default()
        }
    }

    /// Loads a configuration file. The format is picked from the file extension.
    pub fn load(path: &Path) -> Result<EngineConfig, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<EngineConfig>()?)
    }

    pub fn with_device(mut self, device: &str) -> EngineConfig {
        self.device = Some(device.to_string());
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> EngineConfig {
        self.sample_rate = Some(sample_rate);
        self
    }

    pub fn with_sample_format(mut self, format: SampleFormat, bits_per_sample: u16) -> EngineConfig {
        self.sample_format = Some(format.as_str().to_string());
        self.bits_per_sample = Some(bits_per_sample);
        self
    }

    pub fn with_buffer_frames(mut self, buffer_frames: usize) -> EngineConfig {
        self.buffer_frames = Some(buffer_frames);
        self
    }

    pub fn with_polyphony(mut self, polyphony: usize) -> EngineConfig {
        self.polyphony = Some(polyphony);
        self
    }

    pub fn with_ramp_steps(mut self, volume: u32, speed: u32) -> EngineConfig {
        self.volume_ramp_steps = Some(volume);
        self.speed_ramp_steps = Some(speed);
        self
    }

    /// Returns the output device (default: "default").
    pub fn device(&self) -> &str {
        self.device.as_deref().unwrap_or(DEFAULT_DEVICE)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    pub fn sample_format(&self) -> Result<SampleFormat, ConfigError> {
        match self.sample_format.as_deref() {
            Some(format) => {
                SampleFormat::from_str(format).map_err(|e| ConfigError::Invalid(e.to_string()))
            }
            None => Ok(SampleFormat::Int),
        }
    }

    pub fn bits_per_sample(&self) -> Result<u16, ConfigError> {
        Ok(match self.bits_per_sample {
            Some(bits) => bits,
            None => match self.sample_format()? {
                SampleFormat::Int => 16,
                SampleFormat::Float => 32,
            },
        })
    }

    pub fn buffer_frames(&self) -> usize {
        self.buffer_frames.unwrap_or(DEFAULT_BUFFER_FRAMES)
    }

    pub fn polyphony(&self) -> usize {
        self.polyphony.unwrap_or(DEFAULT_POLYPHONY)
    }

    pub fn ramp_steps(&self) -> RampSteps {
        RampSteps::new(
            self.volume_ramp_steps.unwrap_or(DEFAULT_VOLUME_RAMP_STEPS),
            self.speed_ramp_steps.unwrap_or(DEFAULT_SPEED_RAMP_STEPS),
        )
    }

    /// The native format clips built from this config open their sink with.
    pub fn sink_format(&self) -> Result<SinkFormat, ConfigError> {
        SinkFormat::new(
            self.sample_rate(),
            self.sample_format()?,
            self.bits_per_sample()?,
        )
        .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Checks the values that parse fine but cannot be used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device().trim().is_empty() {
            return Err(ConfigError::Invalid("device must not be empty".to_string()));
        }
        if self.polyphony() == 0 {
            return Err(ConfigError::Invalid(
                "polyphony must be at least 1".to_string(),
            ));
        }
        if self.buffer_frames() == 0 {
            return Err(ConfigError::Invalid(
                "buffer_frames must be at least 1".to_string(),
            ));
        }
        self.sink_format()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use config::FileFormat;
    use tempfile::tempdir;

    use super::*;

    fn parse(yaml: &str) -> EngineConfig {
        Config::builder()
            .add_source(config::File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse("{}");
        assert_eq!(config.device(), "default");
        assert_eq!(config.sample_rate(), 44100);
        assert_eq!(config.sample_format().unwrap(), SampleFormat::Int);
        assert_eq!(config.bits_per_sample().unwrap(), 16);
        assert_eq!(config.buffer_frames(), 256);
        assert_eq!(config.polyphony(), 8);
        assert_eq!(config.ramp_steps(), RampSteps::new(1024, 4096));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_full_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("polyclip.yaml");
        fs::write(
            &path,
            r#"
            device: "wav:/tmp/out.wav"
            sample_rate: 48000
            sample_format: float
            buffer_frames: 512
            polyphony: 16
            volume_ramp_steps: 64
            speed_ramp_steps: 0
            "#,
        )
        .unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.device(), "wav:/tmp/out.wav");
        assert_eq!(config.buffer_frames(), 512);
        assert_eq!(config.polyphony(), 16);
        // Zero steps means "change immediately".
        assert_eq!(config.ramp_steps(), RampSteps::new(64, 1));

        let format = config.sink_format().unwrap();
        assert_eq!(format.sample_rate, 48000);
        assert_eq!(format.sample_format, SampleFormat::Float);
        assert_eq!(format.bits_per_sample, 32);
    }

    #[test]
    fn test_invalid_values() {
        let config = parse("polyphony: 0");
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = parse("buffer_frames: 0");
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = parse("sample_format: int\nbits_per_sample: 24");
        assert!(matches!(config.sink_format(), Err(ConfigError::Invalid(_))));

        let config = parse("sample_format: double");
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let result = EngineConfig::load(&dir.path().join("missing.yaml"));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_builder_overrides() {
        let config = EngineConfig::new("default")
            .with_device("wav:x.wav")
            .with_sample_rate(22050)
            .with_polyphony(2);
        assert_eq!(config.device(), "wav:x.wav");
        assert_eq!(config.sample_rate(), 22050);
        assert_eq!(config.polyphony(), 2);
    }
}
