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
use std::fmt;

use super::format::SinkFormat;

/// Error types for output sink operations
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("no output device found with name {0}")]
    DeviceNotFound(String),

    #[error("unsupported sink format: {0}")]
    UnsupportedFormat(String),

    #[error("audio backend error: {0}")]
    Backend(String),

    #[error("sink is not open")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

/// A blocking byte sink that consumes interleaved stereo audio in its native format.
///
/// The playback worker owns the sink exclusively once a clip is open. `write` is
/// expected to block until the sink has accepted the bytes; that blocking is the
/// only thing pacing the mixing loop.
pub trait OutputSink: fmt::Display + Send {
    /// Acquires the underlying output in the given format. `buffer_frames` is the
    /// size of each buffer the worker will write.
    fn open(&mut self, format: &SinkFormat, buffer_frames: usize) -> Result<(), SinkError>;

    /// Writes encoded bytes, blocking until they have been accepted.
    fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError>;

    /// Blocks until everything written so far has been played or persisted.
    fn drain(&mut self) -> Result<(), SinkError>;

    /// Releases the underlying output. Closing a closed sink is a no-op.
    fn close(&mut self) -> Result<(), SinkError>;
}
