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

//! Output side of the engine: the native sink format and the sinks that pace
//! the playback worker.

pub mod cpal;
pub mod format;
pub mod mock;
pub mod sink;
pub mod thread_priority;
pub mod wav;

pub use format::{SampleFormat, SinkFormat};
pub use sink::{OutputSink, SinkError};

/// Prefix selecting the WAV file sink in a device name.
const WAV_DEVICE_PREFIX: &str = "wav:";

/// Lists output devices known to cpal.
pub fn list_devices() -> Result<Vec<cpal::DeviceInfo>, SinkError> {
    cpal::CpalSink::list()
}

/// Gets a sink for the given device name. `wav:<path>` renders into a file,
/// anything else names a cpal device ("default" picks the host default).
pub fn get_sink(device: &str) -> Result<Box<dyn OutputSink>, SinkError> {
    let device = device.trim();
    if device.is_empty() {
        return Err(SinkError::DeviceNotFound(
            "there must be an audio device specified".to_string(),
        ));
    }

    if let Some(path) = device.strip_prefix(WAV_DEVICE_PREFIX) {
        return Ok(Box::new(wav::WavSink::new(path)));
    }

    Ok(Box::new(cpal::CpalSink::new(device)))
}
