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

//! Polyphonic playback of a single in-memory sample bank.
//!
//! A [`SoundClip`] owns a fixed number of voices. Any thread may obtain, start,
//! stop and adjust voices at any time; those calls only touch per-voice atomics.
//! Once the clip is opened on an [`OutputSink`], a dedicated worker mixes every
//! playing voice and writes the result to the sink.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::audio::{OutputSink, SampleFormat, SinkFormat};
use crate::config::EngineConfig;

pub mod bank;
pub mod error;
pub mod events;
pub mod mixer;
pub mod pan;
pub mod pool;
pub mod voice;
pub mod worker;

pub use bank::SampleBank;
pub use error::{BankError, ClipError};
pub use events::{ChannelListener, ClipEvent, ClipListener, ListenerId};
pub use mixer::{ClipMixer, RampSteps};
pub use pan::PanLaw;
pub use voice::{VoiceId, LOOP_FOREVER, MAX_SPEED, MIN_SPEED};
pub use worker::WorkerState;

use events::Listeners;
use pool::VoicePool;
use voice::Voice;
use worker::PlaybackWorker;

/// Default number of frames mixed per worker pass.
pub const DEFAULT_BUFFER_FRAMES: usize = 256;

/// A sample bank plus the voices that play it.
pub struct SoundClip {
    name: String,
    bank: Arc<SampleBank>,
    pool: Arc<VoicePool>,
    mixer: ClipMixer,
    listeners: Arc<Listeners>,
    format: SinkFormat,
    buffer_frames: usize,
    worker: Mutex<Option<PlaybackWorker>>,
}

impl SoundClip {
    /// Creates a closed clip with `polyphony` voices. The native format defaults
    /// to 16-bit integer at the bank's sample rate.
    pub fn new(name: &str, bank: SampleBank, polyphony: usize) -> Result<SoundClip, ClipError> {
        let bank = Arc::new(bank);
        let pool = Arc::new(VoicePool::new(polyphony)?);
        let format = SinkFormat::new(bank.sample_rate(), SampleFormat::Int, 16)?;
        let mixer = ClipMixer::new(bank.clone(), pool.clone(), RampSteps::default());

        debug!(clip = name, polyphony, bank = ?bank, "Created clip");
        Ok(SoundClip {
            name: name.to_string(),
            bank,
            pool,
            mixer,
            listeners: Arc::new(Listeners::default()),
            format,
            buffer_frames: DEFAULT_BUFFER_FRAMES,
            worker: Mutex::new(None),
        })
    }

    /// Creates a clip using the polyphony, format, buffer size and ramp lengths
    /// from an engine configuration.
    pub fn from_config(
        name: &str,
        bank: SampleBank,
        config: &EngineConfig,
    ) -> Result<SoundClip, Box<dyn Error>> {
        config.validate()?;
        Ok(SoundClip::new(name, bank, config.polyphony())?
            .with_format(config.sink_format()?)
            .with_buffer_frames(config.buffer_frames())
            .with_ramp_steps(config.ramp_steps()))
    }

    /// Sets the format the sink is opened with. Takes effect on the next `open`.
    pub fn with_format(mut self, format: SinkFormat) -> SoundClip {
        self.format = format;
        self
    }

    /// Sets the worker buffer size in frames (at least 1).
    pub fn with_buffer_frames(mut self, buffer_frames: usize) -> SoundClip {
        self.buffer_frames = buffer_frames.max(1);
        self
    }

    /// Sets how many mix steps volume and speed changes are spread over.
    pub fn with_ramp_steps(mut self, ramp_steps: RampSteps) -> SoundClip {
        self.mixer = ClipMixer::new(self.bank.clone(), self.pool.clone(), ramp_steps);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bank(&self) -> &Arc<SampleBank> {
        &self.bank
    }

    /// A mixer over this clip's voices, for driving the mix without a worker.
    pub fn mixer(&self) -> &ClipMixer {
        &self.mixer
    }

    pub fn format(&self) -> &SinkFormat {
        &self.format
    }

    pub fn buffer_frames(&self) -> usize {
        self.buffer_frames
    }

    pub fn polyphony(&self) -> usize {
        self.pool.polyphony()
    }

    pub fn frame_count(&self) -> usize {
        self.bank.frame_count()
    }

    pub fn microsecond_length(&self) -> u64 {
        self.bank.microsecond_length()
    }

    /// Number of voices currently obtained.
    pub fn active_voices(&self) -> usize {
        self.pool.active_count()
    }

    // Lifecycle

    /// Opens `sink` in the clip's native format and starts the playback worker.
    /// A faulted worker left over from an earlier failure is cleaned up first.
    pub fn open(&self, sink: Box<dyn OutputSink>) -> Result<(), ClipError> {
        let mut worker = self.worker.lock();
        match worker.as_ref().map(PlaybackWorker::state) {
            Some(WorkerState::Running) => return Err(ClipError::AlreadyOpen),
            Some(state) => {
                debug!(clip = self.name, %state, "Reaping previous worker");
                *worker = None;
            }
            None => {}
        }

        *worker = Some(PlaybackWorker::start(
            &self.name,
            self.mixer.clone(),
            self.listeners.clone(),
            sink,
            self.format.clone(),
            self.buffer_frames,
        )?);
        drop(worker);

        info!(clip = self.name, "Clip opened");
        self.listeners.emit(ClipEvent::Open);
        Ok(())
    }

    /// Stops the worker and releases the sink. Closing a closed clip does nothing.
    pub fn close(&self) {
        let Some(mut worker) = self.worker.lock().take() else {
            return;
        };
        worker.stop();
        info!(clip = self.name, "Clip closed");
        self.listeners.emit(ClipEvent::Close);
    }

    /// True while the worker is running. False once closed or after a sink failure.
    pub fn is_open(&self) -> bool {
        self.worker_state() == WorkerState::Running
    }

    pub fn worker_state(&self) -> WorkerState {
        self.worker
            .lock()
            .as_ref()
            .map_or(WorkerState::Stopped, PlaybackWorker::state)
    }

    // Listeners

    pub fn add_listener(&self, listener: Arc<dyn ClipListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    /// Returns false if the listener was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    // Voice allocation

    /// Takes a free voice. None when every voice is in use.
    pub fn obtain_instance(&self) -> Option<VoiceId> {
        let Some(id) = self.pool.obtain() else {
            debug!(clip = self.name, "No free voice");
            return None;
        };
        self.listeners
            .emit(ClipEvent::ObtainInstance { id, frame: 0.0 });
        Some(id)
    }

    /// Stops a voice and hands it back to the pool.
    pub fn release_instance(&self, id: VoiceId) -> Result<(), ClipError> {
        self.pool.get(id)?;
        let released = self.pool.release_with(id, |frame| {
            self.listeners.post(ClipEvent::ReleaseInstance { id, frame });
        });
        self.listeners.deliver();
        if !released {
            return Err(ClipError::VoiceInactive(id));
        }
        Ok(())
    }

    /// Obtains a voice, applies the given parameters and starts it. The voice
    /// releases itself when it finishes. None when every voice is in use.
    pub fn play(
        &self,
        left: f32,
        right: f32,
        speed: f32,
        loop_count: i32,
    ) -> Result<Option<VoiceId>, ClipError> {
        let Some(id) = self.obtain_instance() else {
            return Ok(None);
        };
        self.set_recycle_on_finish(id, true)?;
        self.set_volume(id, left, right)?;
        self.set_speed(id, speed)?;
        self.set_looping(id, loop_count)?;
        self.start(id)?;
        Ok(Some(id))
    }

    // Transport

    /// Starts a stopped voice. Pending volume and speed targets apply at once.
    pub fn start(&self, id: VoiceId) -> Result<(), ClipError> {
        let voice = self.voice(id)?;
        voice.transition(|| {
            if !voice.is_active() {
                return Err(ClipError::VoiceInactive(id));
            }
            if voice.is_playing() {
                return Err(ClipError::InvalidState {
                    id,
                    reason: "voice is already playing",
                });
            }

            voice.left.snap_to_target();
            voice.right.snap_to_target();
            voice.speed.snap_to_target();
            voice.swap_playing(true);
            self.listeners.post(ClipEvent::StartInstance {
                id,
                frame: voice.cursor(),
            });
            Ok(())
        })?;
        self.listeners.deliver();
        Ok(())
    }

    /// Stops a voice where it is. Stopping a stopped voice is a no-op.
    pub fn stop(&self, id: VoiceId) -> Result<(), ClipError> {
        let voice = self.voice(id)?;
        voice.transition(|| {
            if voice.swap_playing(false) {
                self.listeners.post(ClipEvent::StopInstance {
                    id,
                    frame: voice.cursor(),
                });
            }
        });
        self.listeners.deliver();
        Ok(())
    }

    /// Moves a stopped voice to `position`, clamped into the bank.
    pub fn seek_frames(&self, id: VoiceId, position: f64) -> Result<(), ClipError> {
        let voice = self.voice(id)?;
        let position = if position.is_nan() { 0.0 } else { position };
        let position = position.clamp(0.0, self.bank.last_frame());
        voice.transition(|| {
            if voice.is_playing() {
                return Err(ClipError::InvalidState {
                    id,
                    reason: "cannot seek a playing voice",
                });
            }
            voice.set_cursor(position);
            Ok(())
        })
    }

    pub fn seek_microseconds(&self, id: VoiceId, micros: u64) -> Result<(), ClipError> {
        self.seek_frames(id, self.bank.micros_to_frames(micros))
    }

    /// Seeks to a fraction of the clip, 0.0 being the first frame and 1.0 the last.
    pub fn seek_fraction(&self, id: VoiceId, fraction: f64) -> Result<(), ClipError> {
        let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
        self.seek_frames(id, fraction * self.bank.last_frame())
    }

    // Parameters

    /// Sets target volumes, clamped to [0, 1]. A playing voice ramps toward them.
    pub fn set_volume(&self, id: VoiceId, left: f32, right: f32) -> Result<(), ClipError> {
        let voice = self.voice(id)?;
        voice.left.set_target(clamp_volume(left));
        voice.right.set_target(clamp_volume(right));
        Ok(())
    }

    /// Sets volumes from a master level and a pan position in [-1, 1].
    pub fn set_pan(&self, id: VoiceId, volume: f32, pan: f32, law: PanLaw) -> Result<(), ClipError> {
        let (left, right) = law.gains(volume, pan);
        self.set_volume(id, left, right)
    }

    /// The (left, right) volumes the mixer is currently producing.
    pub fn get_volume(&self, id: VoiceId) -> Result<(f32, f32), ClipError> {
        let voice = self.voice(id)?;
        Ok((voice.left.current(), voice.right.current()))
    }

    /// Sets the target speed, clamped to [MIN_SPEED, MAX_SPEED].
    pub fn set_speed(&self, id: VoiceId, speed: f32) -> Result<(), ClipError> {
        let voice = self.voice(id)?;
        let speed = if speed.is_nan() { 1.0 } else { speed.clamp(MIN_SPEED, MAX_SPEED) };
        voice.speed.set_target(speed);
        Ok(())
    }

    /// The speed the mixer is currently producing.
    pub fn get_speed(&self, id: VoiceId) -> Result<f32, ClipError> {
        Ok(self.voice(id)?.speed.current())
    }

    /// Sets the remaining loop count. -1 loops forever; lower values mean -1.
    pub fn set_looping(&self, id: VoiceId, count: i32) -> Result<(), ClipError> {
        self.voice(id)?.set_loop_count(count);
        Ok(())
    }

    pub fn get_looping(&self, id: VoiceId) -> Result<i32, ClipError> {
        Ok(self.voice(id)?.loop_count())
    }

    pub fn set_recycle_on_finish(&self, id: VoiceId, recycle: bool) -> Result<(), ClipError> {
        self.voice(id)?.set_recycle_on_finish(recycle);
        Ok(())
    }

    pub fn get_recycle_on_finish(&self, id: VoiceId) -> Result<bool, ClipError> {
        Ok(self.voice(id)?.recycle_on_finish())
    }

    pub fn get_frame_position(&self, id: VoiceId) -> Result<f64, ClipError> {
        Ok(self.voice(id)?.cursor())
    }

    /// Whether the voice is obtained. Only out-of-range ids are errors.
    pub fn is_active(&self, id: VoiceId) -> Result<bool, ClipError> {
        Ok(self.pool.get(id)?.is_active())
    }

    pub fn is_playing(&self, id: VoiceId) -> Result<bool, ClipError> {
        Ok(self.voice(id)?.is_playing())
    }

    /// Range-checks `id` and requires the voice to be obtained.
    fn voice(&self, id: VoiceId) -> Result<&Voice, ClipError> {
        self.pool.get_active(id)
    }
}

fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

impl Drop for SoundClip {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Display for SoundClip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} frames, {} voices)",
            self.name,
            self.frame_count(),
            self.polyphony()
        )
    }
}

impl fmt::Debug for SoundClip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoundClip")
            .field("name", &self.name)
            .field("bank", &self.bank)
            .field("polyphony", &self.polyphony())
            .field("active_voices", &self.active_voices())
            .field("format", &self.format)
            .field("buffer_frames", &self.buffer_frames)
            .field("worker", &self.worker_state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::{Duration, Instant};

    use crossbeam_channel::Receiver;

    use crate::audio::mock;
    use crate::testutil;

    use super::*;

    fn clip(polyphony: usize) -> SoundClip {
        let bank = SampleBank::from_mono(&[0.5; 1000], 44100).unwrap();
        SoundClip::new("test", bank, polyphony).unwrap()
    }

    fn listen(clip: &SoundClip) -> Receiver<ClipEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        clip.add_listener(Arc::new(ChannelListener::new(tx)));
        rx
    }

    #[test]
    fn test_pool_exhaustion_and_reuse() {
        let clip = clip(3);
        let ids: Vec<VoiceId> = (0..3).map(|_| clip.obtain_instance().unwrap()).collect();
        assert!(clip.obtain_instance().is_none());
        assert!(clip.play(1.0, 1.0, 1.0, 0).unwrap().is_none());

        clip.release_instance(ids[0]).unwrap();
        assert_eq!(clip.obtain_instance(), Some(ids[0]));
        assert!(clip.obtain_instance().is_none());
    }

    #[test]
    fn test_operations_on_inactive_or_invalid_voices() {
        let clip = clip(2);
        assert!(matches!(clip.start(0), Err(ClipError::VoiceInactive(0))));
        assert!(matches!(
            clip.set_volume(1, 1.0, 1.0),
            Err(ClipError::VoiceInactive(1))
        ));
        assert!(matches!(clip.stop(2), Err(ClipError::InvalidVoiceId(2))));
        assert!(matches!(
            clip.release_instance(0),
            Err(ClipError::VoiceInactive(0))
        ));
        assert!(!clip.is_active(0).unwrap());
        assert!(matches!(clip.is_active(7), Err(ClipError::InvalidVoiceId(7))));
    }

    #[test]
    fn test_start_applies_targets_immediately() {
        let clip = clip(1);
        let id = clip.obtain_instance().unwrap();
        clip.set_volume(id, 0.25, 2.0).unwrap();
        clip.set_speed(id, 100.0).unwrap();

        // Nothing is realised until the voice starts.
        assert_eq!(clip.get_volume(id).unwrap(), (0.0, 0.0));
        assert_eq!(clip.get_speed(id).unwrap(), 1.0);

        clip.start(id).unwrap();
        assert_eq!(clip.get_volume(id).unwrap(), (0.25, 1.0));
        assert_eq!(clip.get_speed(id).unwrap(), MAX_SPEED);
        assert!(clip.is_playing(id).unwrap());

        assert!(matches!(
            clip.start(id),
            Err(ClipError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let clip = clip(1);
        let rx = listen(&clip);
        let id = clip.obtain_instance().unwrap();
        clip.start(id).unwrap();
        clip.stop(id).unwrap();
        clip.stop(id).unwrap();
        assert!(!clip.is_playing(id).unwrap());

        let events: Vec<ClipEvent> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                ClipEvent::ObtainInstance { id, frame: 0.0 },
                ClipEvent::StartInstance { id, frame: 0.0 },
                ClipEvent::StopInstance { id, frame: 0.0 },
            ]
        );
    }

    #[test]
    fn test_seek_rules() {
        let clip = clip(1);
        let id = clip.obtain_instance().unwrap();

        clip.seek_frames(id, 5000.0).unwrap();
        assert_eq!(clip.get_frame_position(id).unwrap(), 999.0);
        clip.seek_frames(id, -3.0).unwrap();
        assert_eq!(clip.get_frame_position(id).unwrap(), 0.0);
        clip.seek_frames(id, 12.5).unwrap();
        assert_eq!(clip.get_frame_position(id).unwrap(), 12.5);

        clip.seek_microseconds(id, 10_000).unwrap();
        assert_eq!(clip.get_frame_position(id).unwrap(), 441.0);
        clip.seek_fraction(id, 2.0).unwrap();
        assert_eq!(clip.get_frame_position(id).unwrap(), 999.0);

        clip.start(id).unwrap();
        assert!(matches!(
            clip.seek_frames(id, 10.0),
            Err(ClipError::InvalidState { .. })
        ));
        assert_eq!(clip.get_frame_position(id).unwrap(), 999.0);
    }

    #[test]
    fn test_parameter_clamping() {
        let clip = clip(1);
        let id = clip.obtain_instance().unwrap();
        clip.set_volume(id, -1.0, f32::NAN).unwrap();
        clip.set_speed(id, 0.001).unwrap();
        clip.set_looping(id, -12).unwrap();
        clip.start(id).unwrap();

        assert_eq!(clip.get_volume(id).unwrap(), (0.0, 0.0));
        assert_eq!(clip.get_speed(id).unwrap(), MIN_SPEED);
        assert_eq!(clip.get_looping(id).unwrap(), LOOP_FOREVER);
    }

    #[test]
    fn test_set_pan() {
        let clip = clip(1);
        let id = clip.obtain_instance().unwrap();
        clip.set_pan(id, 0.8, -1.0, PanLaw::Linear).unwrap();
        clip.start(id).unwrap();
        assert_eq!(clip.get_volume(id).unwrap(), (0.8, 0.0));
    }

    #[test]
    fn test_play_sets_recycle_and_starts() {
        let clip = clip(2);
        let id = clip.play(0.5, 0.5, 2.0, 3).unwrap().unwrap();
        assert!(clip.is_playing(id).unwrap());
        assert!(clip.get_recycle_on_finish(id).unwrap());
        assert_eq!(clip.get_speed(id).unwrap(), 2.0);
        assert_eq!(clip.get_looping(id).unwrap(), 3);
    }

    #[test]
    fn test_open_twice_and_close() {
        let clip = clip(1);
        let rx = listen(&clip);
        let (sink, device) = mock::Sink::paced("device", 4);
        let handle = sink.handle();
        clip.open(Box::new(sink)).unwrap();
        assert!(clip.is_open());
        assert_eq!(handle.format(), Some(clip.format().clone()));
        assert_eq!(handle.buffer_frames(), DEFAULT_BUFFER_FRAMES);

        let (second, _second_device) = mock::Sink::paced("second", 4);
        assert!(matches!(
            clip.open(Box::new(second)),
            Err(ClipError::AlreadyOpen)
        ));

        drop(device);
        clip.close();
        clip.close();
        assert!(!clip.is_open());
        assert!(handle.is_closed());

        let events: Vec<ClipEvent> = rx.try_iter().collect();
        assert_eq!(events, vec![ClipEvent::Open, ClipEvent::Close]);
    }

    #[test]
    fn test_open_unavailable_sink() {
        let clip = clip(1);
        let result = clip.open(Box::new(mock::Sink::unavailable("gone")));
        assert!(matches!(result, Err(ClipError::SinkUnavailable(_))));
        assert!(!clip.is_open());
        assert_eq!(clip.worker_state(), WorkerState::Stopped);
    }

    #[test]
    fn test_one_second_tone_end_to_end() {
        let tone = testutil::cos_tone(1000.0, 44100, 44100);
        let bank = SampleBank::from_mono(&tone, 44100).unwrap();
        let format = SinkFormat::new(44100, SampleFormat::Float, 32).unwrap();
        let clip = SoundClip::new("tone", bank, 4)
            .unwrap()
            .with_format(format.clone())
            .with_buffer_frames(256);
        let events = listen(&clip);

        let id = clip.play(1.0, 1.0, 1.0, 0).unwrap().unwrap();
        let (sink, device) = mock::Sink::paced("device", 4);
        clip.open(Box::new(sink)).unwrap();

        // 200 buffers of 256 frames comfortably covers one second.
        let mut frames = Vec::new();
        let mut samples = Vec::new();
        for _ in 0..200 {
            let bytes = device.recv_timeout(Duration::from_secs(5)).unwrap();
            assert_eq!(bytes.len(), 256 * format.bytes_per_frame());
            samples.clear();
            format.decode_into(&bytes, &mut samples);
            frames.extend(samples.chunks_exact(2).map(|f| f[0] != 0.0 || f[1] != 0.0));
        }
        drop(device);
        clip.close();

        let non_silent = frames.iter().filter(|audible| **audible).count();
        assert_eq!(non_silent, 44100);
        // Audio first, then silence.
        assert!(frames[..44100].iter().all(|audible| *audible));
        assert!(frames[44100..].iter().all(|audible| !*audible));

        let events: Vec<ClipEvent> = events.try_iter().collect();
        let count = |pred: fn(&ClipEvent) -> bool| events.iter().filter(|e| pred(e)).count();
        assert_eq!(count(|e| matches!(e, ClipEvent::StopInstance { .. })), 1);
        assert_eq!(count(|e| matches!(e, ClipEvent::LoopInstance { .. })), 0);
        assert_eq!(count(|e| matches!(e, ClipEvent::ReleaseInstance { .. })), 1);
        assert!(!clip.is_active(id).unwrap());

        let stop = events
            .iter()
            .position(|e| matches!(e, ClipEvent::StopInstance { .. }));
        let release = events
            .iter()
            .position(|e| matches!(e, ClipEvent::ReleaseInstance { .. }));
        assert!(stop < release);
    }

    #[test]
    fn test_seek_after_stop_survives_overlapping_mix() {
        let clip = clip(1);
        let id = clip.obtain_instance().unwrap();
        clip.set_volume(id, 1.0, 1.0).unwrap();
        clip.set_looping(id, LOOP_FOREVER).unwrap();

        for _ in 0..20 {
            clip.start(id).unwrap();
            let mixer = clip.mixer().clone();
            let pass = thread::spawn(move || {
                let mut output = vec![0.0; 2 * 200_000];
                let mut events = Vec::new();
                mixer.process_into_output(&mut output, &mut events);
            });

            clip.stop(id).unwrap();
            clip.seek_frames(id, 0.0).unwrap();
            pass.join().unwrap();
            assert_eq!(clip.get_frame_position(id).unwrap(), 0.0);
        }
    }

    #[test]
    fn test_recycled_voice_reused_while_worker_blocks() {
        let bank = SampleBank::from_mono(&[0.5; 10], 44100).unwrap();
        let clip = SoundClip::new("short", bank, 1).unwrap();
        let rx = listen(&clip);

        // The clip ends inside the first buffer, after which the worker blocks
        // on a device that takes nothing until asked.
        let id = clip.play(1.0, 1.0, 1.0, 0).unwrap().unwrap();
        let (sink, device) = mock::Sink::paced("device", 0);
        clip.open(Box::new(sink)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let reused = loop {
            if let Some(reused) = clip.obtain_instance() {
                break reused;
            }
            assert!(Instant::now() < deadline, "voice was never recycled");
            thread::yield_now();
        };
        assert_eq!(reused, id);
        device.recv_timeout(Duration::from_secs(5)).unwrap();

        let events: Vec<ClipEvent> = rx.try_iter().filter(|e| e.voice() == Some(id)).collect();
        assert_eq!(
            events,
            vec![
                ClipEvent::ObtainInstance { id, frame: 0.0 },
                ClipEvent::StartInstance { id, frame: 0.0 },
                ClipEvent::StopInstance { id, frame: 9.0 },
                ClipEvent::ReleaseInstance { id, frame: 0.0 },
                ClipEvent::ObtainInstance { id, frame: 0.0 },
            ]
        );
        assert!(clip.is_active(id).unwrap());

        drop(device);
        clip.close();
    }

    #[test]
    fn test_transport_calls_against_running_worker() {
        let clip = clip(2);
        let rx = listen(&clip);
        let (sink, device) = mock::Sink::paced("device", 1);
        clip.open(Box::new(sink)).unwrap();
        let receive = |buffers: usize| {
            for _ in 0..buffers {
                device.recv_timeout(Duration::from_secs(5)).unwrap();
            }
        };

        let id = clip.obtain_instance().unwrap();
        clip.set_volume(id, 1.0, 1.0).unwrap();
        clip.set_looping(id, LOOP_FOREVER).unwrap();
        clip.start(id).unwrap();
        receive(16);

        clip.stop(id).unwrap();
        clip.seek_frames(id, 100.0).unwrap();
        receive(4);
        assert!(!clip.is_playing(id).unwrap());
        assert_eq!(clip.get_frame_position(id).unwrap(), 100.0);

        clip.start(id).unwrap();
        receive(4);
        clip.release_instance(id).unwrap();
        receive(2);
        assert!(!clip.is_active(id).unwrap());

        drop(device);
        clip.close();

        let events: Vec<ClipEvent> = rx.try_iter().filter(|e| e.voice() == Some(id)).collect();
        assert_eq!(events.first(), Some(&ClipEvent::ObtainInstance { id, frame: 0.0 }));
        assert!(matches!(
            events.last(),
            Some(ClipEvent::ReleaseInstance { .. })
        ));

        // Loops only ever arrive between a start and the stop that follows it.
        let mut playing = false;
        let mut starts = Vec::new();
        let mut loops = 0;
        let mut stops = 0;
        for event in &events {
            match *event {
                ClipEvent::StartInstance { frame, .. } => {
                    assert!(!playing, "started twice: {:?}", events);
                    playing = true;
                    starts.push(frame);
                }
                ClipEvent::LoopInstance { .. } => {
                    assert!(playing, "loop while stopped: {:?}", events);
                    loops += 1;
                }
                ClipEvent::StopInstance { .. } => {
                    assert!(playing, "stop while stopped: {:?}", events);
                    playing = false;
                    stops += 1;
                }
                _ => {}
            }
        }
        assert_eq!(starts, vec![0.0, 100.0]);
        assert_eq!(stops, 1);
        assert!(loops >= 2, "only {} loops", loops);
    }

    #[test]
    fn test_from_config() {
        let config: EngineConfig = small_config();
        let bank = SampleBank::from_mono(&[0.1; 64], 48000).unwrap();
        let clip = SoundClip::from_config("configured", bank, &config).unwrap();
        assert_eq!(clip.polyphony(), 3);
        assert_eq!(clip.buffer_frames(), 128);
        assert_eq!(clip.format().sample_format, SampleFormat::Float);
        assert_eq!(clip.mixer().ramp_steps(), RampSteps::new(32, 64));
        assert_eq!(clip.to_string(), "configured (64 frames, 3 voices)");
    }

    fn small_config() -> EngineConfig {
        EngineConfig::new("default")
            .with_polyphony(3)
            .with_buffer_frames(128)
            .with_sample_format(SampleFormat::Float, 32)
            .with_ramp_steps(32, 64)
    }
}
