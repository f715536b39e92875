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

//! The dedicated thread that drives a clip's mixer into its output sink.
//!
//! The worker never sleeps. `OutputSink::write` blocks until the sink has room,
//! and that back-pressure is what paces the mixing loop.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, span, warn, Level};

use crate::audio::format::SINK_CHANNELS;
use crate::audio::thread_priority::{
    configure_worker_thread_priority, rt_audio_enabled, worker_thread_priority,
};
use crate::audio::{OutputSink, SinkFormat};

use super::error::ClipError;
use super::events::Listeners;
use super::mixer::ClipMixer;

/// Name given to every mixing thread.
const WORKER_THREAD_NAME: &str = "polyclip-mix";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// No thread is running.
    Stopped,
    /// The thread is mixing and writing buffers.
    Running,
    /// The sink failed; the thread has exited and the clip must be closed
    /// and reopened.
    Faulted,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WorkerState::Stopped => "stopped",
            WorkerState::Running => "running",
            WorkerState::Faulted => "faulted",
        })
    }
}

/// Everything the thread owns while it runs.
struct WorkerContext {
    clip: String,
    mixer: ClipMixer,
    listeners: Arc<Listeners>,
    sink: Box<dyn OutputSink>,
    format: SinkFormat,
    buffer_frames: usize,
    running: Arc<AtomicBool>,
    faulted: Arc<AtomicBool>,
    priority: u8,
    rt_audio: bool,
}

pub(crate) struct PlaybackWorker {
    running: Arc<AtomicBool>,
    faulted: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PlaybackWorker {
    /// Opens the sink on the calling thread, then spawns the mixing thread.
    /// Sink failures surface here and no thread is started.
    pub(crate) fn start(
        clip: &str,
        mixer: ClipMixer,
        listeners: Arc<Listeners>,
        mut sink: Box<dyn OutputSink>,
        format: SinkFormat,
        buffer_frames: usize,
    ) -> Result<Self, ClipError> {
        sink.open(&format, buffer_frames)?;
        info!(clip, sink = %sink, %format, buffer_frames, "Opened output sink");

        let running = Arc::new(AtomicBool::new(true));
        let faulted = Arc::new(AtomicBool::new(false));
        let context = WorkerContext {
            clip: clip.to_string(),
            mixer,
            listeners,
            sink,
            format,
            buffer_frames,
            running: running.clone(),
            faulted: faulted.clone(),
            // Read here so the environment is never touched on the worker.
            priority: worker_thread_priority(),
            rt_audio: rt_audio_enabled(),
        };

        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || context.run())
            .map_err(ClipError::WorkerSpawn)?;

        Ok(Self {
            running,
            faulted,
            handle: Some(handle),
        })
    }

    pub(crate) fn state(&self) -> WorkerState {
        if self.faulted.load(Ordering::Acquire) {
            WorkerState::Faulted
        } else if self.handle.is_some() && self.running.load(Ordering::Acquire) {
            WorkerState::Running
        } else {
            WorkerState::Stopped
        }
    }

    /// Asks the thread to stop after its current buffer and waits for it to
    /// drain and release the sink.
    pub(crate) fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Mix worker panicked");
            }
        }
    }
}

impl Drop for PlaybackWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl WorkerContext {
    fn run(mut self) {
        let span = span!(Level::INFO, "mix worker", clip = self.clip.as_str());
        let _enter = span.enter();

        configure_worker_thread_priority(self.priority, self.rt_audio);

        let mut buffer = vec![0.0f32; self.buffer_frames * usize::from(SINK_CHANNELS)];
        let mut bytes = Vec::with_capacity(buffer.len() * self.format.bytes_per_sample());
        let mut events = self.listeners.queue();

        debug!(buffer_frames = self.buffer_frames, "Mix worker started");
        while self.running.load(Ordering::Acquire) {
            self.mixer.process_into_output(&mut buffer, &mut events);
            self.listeners.try_deliver();
            self.format.encode_into(&buffer, &mut bytes);

            if let Err(e) = self.sink.write(&bytes) {
                error!(err = %e, sink = %self.sink, "Sink write failed, stopping playback");
                self.faulted.store(true, Ordering::Release);
                break;
            }
        }

        if !self.faulted.load(Ordering::Acquire) {
            if let Err(e) = self.sink.drain() {
                warn!(err = %e, "Failed to drain sink");
            }
        }
        if let Err(e) = self.sink.close() {
            warn!(err = %e, "Failed to close sink");
        }
        self.listeners.deliver();
        self.running.store(false, Ordering::Release);
        debug!("Mix worker exited");
    }
}
