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
use crate::audio::SinkError;

use super::voice::VoiceId;

/// Errors raised by clip and voice operations. Per-voice errors are local: the
/// requested effect simply does not happen and the clip keeps running.
#[derive(Debug, thiserror::Error)]
pub enum ClipError {
    #[error("voice {0} is out of range")]
    InvalidVoiceId(VoiceId),

    #[error("voice {0} is not active")]
    VoiceInactive(VoiceId),

    #[error("voice {id}: {reason}")]
    InvalidState { id: VoiceId, reason: &'static str },

    #[error("polyphony must be at least 1")]
    InvalidPolyphony,

    #[error("clip is already open")]
    AlreadyOpen,

    #[error("output sink unavailable: {0}")]
    SinkUnavailable(#[from] SinkError),

    #[error("failed to spawn playback worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

/// Errors raised while building a sample bank.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum BankError {
    #[error("sample bank must contain at least one frame")]
    Empty,

    #[error("interleaved stereo data has an odd sample count ({0})")]
    OddSampleCount(usize),

    #[error("sample rate must be greater than 0")]
    InvalidSampleRate,
}
