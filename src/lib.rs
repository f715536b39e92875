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

//! A real-time polyphonic sample playback engine.
//!
//! A [`clip::SoundClip`] holds a fully decoded [`clip::SampleBank`] and a fixed
//! number of voices that play it concurrently, each with its own position,
//! speed, volume and loop count. Opening the clip on an [`audio::OutputSink`]
//! starts a worker thread that mixes the voices and is paced by the sink.

pub mod audio;
pub mod clip;
pub mod config;
pub mod loader;

#[cfg(test)]
mod testutil;

pub use clip::{ClipError, ClipEvent, SampleBank, SoundClip, VoiceId};
pub use config::{ConfigError, EngineConfig};
pub use loader::{load_file, LoadError};
