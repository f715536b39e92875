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

//! Fixed set of voices with a lock-free free-list.

use crossbeam_channel::{Receiver, Sender};
use tracing::debug;

use super::error::ClipError;
use super::voice::{Voice, VoiceId};

/// Owns `polyphony` voices, allocated once. Free ids travel through a bounded
/// channel sized to the polyphony, so obtain and release never allocate.
pub struct VoicePool {
    voices: Box<[Voice]>,
    free_tx: Sender<VoiceId>,
    free_rx: Receiver<VoiceId>,
}

impl VoicePool {
    pub fn new(polyphony: usize) -> Result<Self, ClipError> {
        if polyphony == 0 {
            return Err(ClipError::InvalidPolyphony);
        }

        let voices: Box<[Voice]> = (0..polyphony).map(|_| Voice::new()).collect();
        let (free_tx, free_rx) = crossbeam_channel::bounded(polyphony);
        for id in 0..polyphony {
            // The channel has exactly `polyphony` slots.
            let _ = free_tx.try_send(id);
        }

        Ok(Self {
            voices,
            free_tx,
            free_rx,
        })
    }

    /// Takes a free voice, resets it to defaults and marks it active. Returns
    /// None when every voice is in use.
    pub fn obtain(&self) -> Option<VoiceId> {
        let id = self.free_rx.try_recv().ok()?;
        let voice = &self.voices[id];
        voice.transition(|| {
            voice.reset();
            voice.activate();
        });
        Some(id)
    }

    /// Stops the voice and returns it to the free-list. Returns false if the id
    /// is out of range or the voice was not active, in which case nothing
    /// changes. Of several racing releases only one succeeds.
    pub fn release(&self, id: VoiceId) -> bool {
        self.release_with(id, |_| {})
    }

    /// Like `release`, calling `on_release` with the voice's final position
    /// before the id can be obtained again.
    pub fn release_with(&self, id: VoiceId, on_release: impl FnOnce(f64)) -> bool {
        let Some(voice) = self.voices.get(id) else {
            return false;
        };
        voice.transition(|| self.retire(id, voice, on_release))
    }

    /// Deactivates `voice` and frees its slot. Callers must be inside a
    /// transition or commit of that voice.
    pub(crate) fn retire(&self, id: VoiceId, voice: &Voice, on_release: impl FnOnce(f64)) -> bool {
        if !voice.deactivate() {
            return false;
        }

        voice.swap_playing(false);
        on_release(voice.cursor());
        if self.free_tx.try_send(id).is_err() {
            // Only reachable if the free-list accounting is broken.
            debug!(voice = id, "Free-list full on release");
        }
        true
    }

    /// Looks up a voice by id.
    pub fn get(&self, id: VoiceId) -> Result<&Voice, ClipError> {
        self.voices.get(id).ok_or(ClipError::InvalidVoiceId(id))
    }

    /// Looks up a voice that must currently be active.
    pub fn get_active(&self, id: VoiceId) -> Result<&Voice, ClipError> {
        let voice = self.get(id)?;
        if !voice.is_active() {
            return Err(ClipError::VoiceInactive(id));
        }
        Ok(voice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (VoiceId, &Voice)> {
        self.voices.iter().enumerate()
    }

    pub fn polyphony(&self) -> usize {
        self.voices.len()
    }

    /// Number of voices currently obtained.
    pub fn active_count(&self) -> usize {
        self.voices.iter().filter(|v| v.is_active()).count()
    }

    /// Number of voices that can still be obtained.
    pub fn available(&self) -> usize {
        self.free_rx.len()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_zero_polyphony_is_rejected() {
        assert!(matches!(
            VoicePool::new(0),
            Err(ClipError::InvalidPolyphony)
        ));
    }

    #[test]
    fn test_exhaustion_and_reuse() {
        let pool = VoicePool::new(4).unwrap();
        let ids: Vec<VoiceId> = (0..4).map(|_| pool.obtain().unwrap()).collect();
        let unique: HashSet<VoiceId> = ids.iter().copied().collect();
        assert_eq!(unique.len(), 4);
        assert_eq!(pool.active_count(), 4);
        assert_eq!(pool.available(), 0);

        assert!(pool.obtain().is_none());

        assert!(pool.release(ids[2]));
        assert_eq!(pool.obtain(), Some(ids[2]));
    }

    #[test]
    fn test_release_is_idempotent() {
        let pool = VoicePool::new(2).unwrap();
        let id = pool.obtain().unwrap();
        assert!(pool.release(id));
        assert!(!pool.release(id));
        assert!(!pool.release(99));
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_release_callback_runs_before_slot_is_reusable() {
        let pool = Arc::new(VoicePool::new(1).unwrap());
        let id = pool.obtain().unwrap();
        pool.get(id).unwrap().set_cursor(42.0);

        let mut seen = None;
        assert!(pool.release_with(id, |frame| {
            seen = Some(frame);
            assert_eq!(pool.available(), 0);
        }));
        assert_eq!(seen, Some(42.0));
        assert_eq!(pool.available(), 1);

        let mut called = false;
        assert!(!pool.release_with(id, |_| called = true));
        assert!(!called);
    }

    #[test]
    fn test_obtain_resets_voice() {
        let pool = VoicePool::new(1).unwrap();
        let id = pool.obtain().unwrap();
        let voice = pool.get(id).unwrap();
        voice.set_cursor(100.0);
        voice.set_loop_count(5);
        voice.swap_playing(true);
        assert!(pool.release(id));
        assert!(!voice.is_playing());

        let id = pool.obtain().unwrap();
        let voice = pool.get(id).unwrap();
        assert!(voice.is_active());
        assert_eq!(voice.cursor(), 0.0);
        assert_eq!(voice.loop_count(), 0);
    }

    #[test]
    fn test_lookup_errors() {
        let pool = VoicePool::new(2).unwrap();
        assert!(matches!(pool.get(2), Err(ClipError::InvalidVoiceId(2))));
        assert!(matches!(
            pool.get_active(1),
            Err(ClipError::VoiceInactive(1))
        ));
    }

    #[test]
    fn test_concurrent_release_only_frees_once() {
        let pool = Arc::new(VoicePool::new(1).unwrap());
        for _ in 0..50 {
            let id = pool.obtain().unwrap();
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let pool = pool.clone();
                    std::thread::spawn(move || pool.release(id))
                })
                .collect();
            let released = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|released| *released)
                .count();
            assert_eq!(released, 1);
            assert_eq!(pool.available(), 1);
        }
    }
}
