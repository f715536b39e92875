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

//! Lifecycle and per-voice notifications.
//!
//! Every event is queued at the moment its state change takes effect, inside
//! the voice transition or mix commit that makes it, and listeners receive the
//! queue in order. Events caused by API calls are delivered on the calling
//! thread. Events the mixing loop raises (loop, natural stop, auto-release) are
//! delivered on the worker thread before the buffer that produced them is
//! written.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use super::voice::VoiceId;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClipEvent {
    Open,
    Close,
    ObtainInstance { id: VoiceId, frame: f64 },
    ReleaseInstance { id: VoiceId, frame: f64 },
    StartInstance { id: VoiceId, frame: f64 },
    StopInstance { id: VoiceId, frame: f64 },
    LoopInstance { id: VoiceId, frame: f64 },
}

impl ClipEvent {
    /// The voice the event concerns, if any.
    pub fn voice(&self) -> Option<VoiceId> {
        match *self {
            ClipEvent::Open | ClipEvent::Close => None,
            ClipEvent::ObtainInstance { id, .. }
            | ClipEvent::ReleaseInstance { id, .. }
            | ClipEvent::StartInstance { id, .. }
            | ClipEvent::StopInstance { id, .. }
            | ClipEvent::LoopInstance { id, .. } => Some(id),
        }
    }
}

impl fmt::Display for ClipEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClipEvent::Open => write!(f, "open"),
            ClipEvent::Close => write!(f, "close"),
            ClipEvent::ObtainInstance { id, frame } => write!(f, "obtain {} @ {}", id, frame),
            ClipEvent::ReleaseInstance { id, frame } => write!(f, "release {} @ {}", id, frame),
            ClipEvent::StartInstance { id, frame } => write!(f, "start {} @ {}", id, frame),
            ClipEvent::StopInstance { id, frame } => write!(f, "stop {} @ {}", id, frame),
            ClipEvent::LoopInstance { id, frame } => write!(f, "loop {} @ {}", id, frame),
        }
    }
}

/// Receives clip events. Implementations must not block for long: mix-loop
/// events are delivered on the playback worker.
pub trait ClipListener: Send + Sync {
    fn on_event(&self, event: &ClipEvent);
}

impl<F> ClipListener for F
where
    F: Fn(&ClipEvent) + Send + Sync,
{
    fn on_event(&self, event: &ClipEvent) {
        self(event)
    }
}

/// Forwards every event into a channel.
pub struct ChannelListener {
    tx: Sender<ClipEvent>,
}

impl ChannelListener {
    pub fn new(tx: Sender<ClipEvent>) -> Self {
        Self { tx }
    }
}

impl ClipListener for ChannelListener {
    fn on_event(&self, event: &ClipEvent) {
        if self.tx.try_send(*event).is_err() {
            debug!(%event, "Event channel closed or full, dropping event");
        }
    }
}

/// Handle returned by `add_listener`, used to remove the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Appends events to a clip's delivery queue. Handed to the mixer by the
/// worker so that events are queued as the mix commits them.
pub(crate) struct EventQueue {
    tx: Sender<ClipEvent>,
}

impl Extend<ClipEvent> for EventQueue {
    fn extend<I: IntoIterator<Item = ClipEvent>>(&mut self, events: I) {
        for event in events {
            // The receiver lives in the same `Listeners`.
            let _ = self.tx.send(event);
        }
    }
}

/// The set of registered listeners plus the queue of events waiting for them.
/// The locks are only taken to deliver or to change registrations, never while
/// mixing.
pub(crate) struct Listeners {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(ListenerId, Arc<dyn ClipListener>)>>,
    pending_tx: Sender<ClipEvent>,
    pending_rx: Receiver<ClipEvent>,
    /// Held while delivering so queued events reach listeners in queue order.
    delivery: Mutex<()>,
}

impl Default for Listeners {
    fn default() -> Self {
        let (pending_tx, pending_rx) = crossbeam_channel::unbounded();
        Self {
            next_id: AtomicU64::new(0),
            listeners: RwLock::new(Vec::new()),
            pending_tx,
            pending_rx,
            delivery: Mutex::new(()),
        }
    }
}

impl Listeners {
    pub(crate) fn add(&self, listener: Arc<dyn ClipListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub(crate) fn queue(&self) -> EventQueue {
        EventQueue {
            tx: self.pending_tx.clone(),
        }
    }

    /// Queues an event without delivering it.
    pub(crate) fn post(&self, event: ClipEvent) {
        let _ = self.pending_tx.send(event);
    }

    /// Queues an event and delivers everything queued so far.
    pub(crate) fn emit(&self, event: ClipEvent) {
        self.post(event);
        self.deliver();
    }

    /// Delivers every queued event, waiting for a delivery already in progress.
    pub(crate) fn deliver(&self) {
        let _delivery = self.delivery.lock();
        self.drain();
    }

    /// Delivers queued events unless another thread is already delivering. That
    /// thread, or the next delivery, picks up whatever is left.
    pub(crate) fn try_deliver(&self) {
        if let Some(_delivery) = self.delivery.try_lock() {
            self.drain();
        }
    }

    fn drain(&self) {
        if self.pending_rx.is_empty() {
            return;
        }
        let listeners = self.listeners.read();
        for event in self.pending_rx.try_iter() {
            for (_, listener) in listeners.iter() {
                listener.on_event(&event);
            }
        }
    }
}
