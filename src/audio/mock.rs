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
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info};

use super::{format::SinkFormat, sink::OutputSink, sink::SinkError};

/// Where the mock sink sends the bytes it is given.
enum Output {
    /// Keeps every written buffer in memory. Never blocks.
    Recording(Arc<Mutex<Vec<Vec<u8>>>>),
    /// Hands buffers to a bounded channel, blocking while it is full. A
    /// disconnected consumer discards audio.
    Paced(Sender<Vec<u8>>),
    /// Refuses to open, like a device that has been unplugged.
    Unavailable,
}

/// Shared bookkeeping so tests can inspect a sink after it has been moved into a clip.
#[derive(Default)]
struct Stats {
    opened: AtomicBool,
    drained: AtomicBool,
    closed: AtomicBool,
    writes: AtomicUsize,
    format: Mutex<Option<SinkFormat>>,
    buffer_frames: AtomicUsize,
}

/// A mock sink. Doesn't actually play anything.
pub struct Sink {
    name: String,
    output: Output,
    stats: Arc<Stats>,
}

/// Read-only view of a mock sink's state.
#[derive(Clone)]
pub struct Handle {
    stats: Arc<Stats>,
    recorded: Option<Arc<Mutex<Vec<Vec<u8>>>>>,
}

impl Sink {
    /// Creates a mock sink that records every buffer written to it.
    pub fn recording(name: &str) -> Sink {
        Sink {
            name: name.to_string(),
            output: Output::Recording(Arc::new(Mutex::new(Vec::new()))),
            stats: Arc::new(Stats::default()),
        }
    }

    /// Creates a mock sink that blocks like a real device once `capacity` buffers
    /// are queued. The returned receiver plays the role of the device.
    pub fn paced(name: &str, capacity: usize) -> (Sink, Receiver<Vec<u8>>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (
            Sink {
                name: name.to_string(),
                output: Output::Paced(tx),
                stats: Arc::new(Stats::default()),
            },
            rx,
        )
    }

    /// Creates a mock sink whose `open` always fails.
    pub fn unavailable(name: &str) -> Sink {
        Sink {
            name: name.to_string(),
            output: Output::Unavailable,
            stats: Arc::new(Stats::default()),
        }
    }

    /// Returns a handle for inspecting this sink later.
    pub fn handle(&self) -> Handle {
        Handle {
            stats: self.stats.clone(),
            recorded: match &self.output {
                Output::Recording(recorded) => Some(recorded.clone()),
                _ => None,
            },
        }
    }
}

impl Handle {
    /// Returns true once the sink has been opened.
    pub fn is_opened(&self) -> bool {
        self.stats.opened.load(Ordering::Acquire)
    }

    /// Returns true once the sink has been drained.
    pub fn is_drained(&self) -> bool {
        self.stats.drained.load(Ordering::Acquire)
    }

    /// Returns true once the sink has been closed.
    pub fn is_closed(&self) -> bool {
        self.stats.closed.load(Ordering::Acquire)
    }

    /// Number of buffers accepted so far.
    pub fn write_count(&self) -> usize {
        self.stats.writes.load(Ordering::Acquire)
    }

    /// The format the sink was opened with.
    pub fn format(&self) -> Option<SinkFormat> {
        self.stats.format.lock().clone()
    }

    /// The buffer size the sink was opened with.
    pub fn buffer_frames(&self) -> usize {
        self.stats.buffer_frames.load(Ordering::Acquire)
    }

    /// A copy of every recorded buffer. Empty for paced sinks.
    pub fn recorded(&self) -> Vec<Vec<u8>> {
        self.recorded
            .as_ref()
            .map(|recorded| recorded.lock().clone())
            .unwrap_or_default()
    }
}

impl OutputSink for Sink {
    fn open(&mut self, format: &SinkFormat, buffer_frames: usize) -> Result<(), SinkError> {
        if let Output::Unavailable = self.output {
            return Err(SinkError::DeviceNotFound(self.name.clone()));
        }

        info!(sink = self.name, %format, buffer_frames, "Opening mock sink.");
        *self.stats.format.lock() = Some(format.clone());
        self.stats
            .buffer_frames
            .store(buffer_frames, Ordering::Release);
        self.stats.closed.store(false, Ordering::Release);
        self.stats.opened.store(true, Ordering::Release);
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        if !self.stats.opened.load(Ordering::Acquire) || self.stats.closed.load(Ordering::Acquire)
        {
            return Err(SinkError::Closed);
        }

        match &self.output {
            Output::Recording(recorded) => recorded.lock().push(bytes.to_vec()),
            Output::Paced(tx) => {
                if tx.send(bytes.to_vec()).is_err() {
                    debug!(sink = self.name, "Mock consumer gone, discarding audio");
                }
            }
            Output::Unavailable => return Err(SinkError::Closed),
        }
        self.stats.writes.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn drain(&mut self) -> Result<(), SinkError> {
        self.stats.drained.store(true, Ordering::Release);
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        self.stats.closed.store(true, Ordering::Release);
        Ok(())
    }
}

impl fmt::Display for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
