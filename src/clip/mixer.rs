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
// Core voice mixing logic, shared by the playback worker and offline rendering.
use std::iter;
use std::sync::Arc;

use super::bank::SampleBank;
use super::events::ClipEvent;
use super::pool::VoicePool;
use super::voice::{Voice, VoiceId};

/// Default number of mix steps a volume change is spread over.
pub const DEFAULT_VOLUME_RAMP_STEPS: u32 = 1024;
/// Default number of mix steps a speed change is spread over.
pub const DEFAULT_SPEED_RAMP_STEPS: u32 = 4096;

/// How many mix steps (stereo frames) parameter ramps take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampSteps {
    volume: u32,
    speed: u32,
}

impl RampSteps {
    /// Step counts below 1 are raised to 1 (an immediate change).
    pub fn new(volume: u32, speed: u32) -> Self {
        Self {
            volume: volume.max(1),
            speed: speed.max(1),
        }
    }

    pub fn volume(&self) -> u32 {
        self.volume
    }

    pub fn speed(&self) -> u32 {
        self.speed
    }
}

impl Default for RampSteps {
    fn default() -> Self {
        Self::new(DEFAULT_VOLUME_RAMP_STEPS, DEFAULT_SPEED_RAMP_STEPS)
    }
}

/// Sums every playing voice of a clip into interleaved stereo buffers.
#[derive(Clone)]
pub struct ClipMixer {
    bank: Arc<SampleBank>,
    pool: Arc<VoicePool>,
    ramp_steps: RampSteps,
}

impl ClipMixer {
    pub fn new(bank: Arc<SampleBank>, pool: Arc<VoicePool>, ramp_steps: RampSteps) -> Self {
        Self {
            bank,
            pool,
            ramp_steps,
        }
    }

    /// Fills `output` (interleaved stereo) with one pass of the mix. Loop, stop
    /// and release events raised along the way are appended to `events` in
    /// per-voice order, at the moment each voice's pass is committed.
    pub fn process_into_output<E>(&self, output: &mut [f32], events: &mut E)
    where
        E: Extend<ClipEvent>,
    {
        output.fill(0.0);

        for (id, voice) in self.pool.iter() {
            let epoch = voice.epoch();
            if voice.is_active() && voice.is_playing() {
                self.mix_voice(id, voice, epoch, output, events);
            }
        }
    }

    /// Mixes a single voice into `output`. Ramp and cursor state is pulled into
    /// locals for the pass and committed at the end; targets are re-read every
    /// frame so changes made mid-buffer still ramp in. If a transport change
    /// lands during the pass, the commit is dropped along with its events.
    fn mix_voice<E>(
        &self,
        id: VoiceId,
        voice: &Voice,
        epoch: u32,
        output: &mut [f32],
        events: &mut E,
    ) where
        E: Extend<ClipEvent>,
    {
        let last_frame = self.bank.last_frame();
        let volume_steps = self.ramp_steps.volume;
        let speed_steps = self.ramp_steps.speed;

        let mut cursor = voice.cursor();
        let mut left = voice.left.load_ramp();
        let mut right = voice.right.load_ramp();
        let mut speed = voice.speed.load_ramp();
        let mut finished = false;
        let mut loops = 0;

        for frame in output.chunks_exact_mut(2) {
            let left_gain = left.tick(voice.left.target(), volume_steps);
            let right_gain = right.tick(voice.right.target(), volume_steps);
            let rate = speed.tick(voice.speed.target(), speed_steps);

            let (l, r) = self.bank.read(cursor);
            frame[0] += l * left_gain;
            frame[1] += r * right_gain;

            cursor += f64::from(rate);
            if cursor > last_frame {
                if voice.take_loop() {
                    cursor = 0.0;
                    loops += 1;
                } else {
                    finished = true;
                    break;
                }
            }
        }

        voice.commit(epoch, || {
            voice.left.store_ramp(&left);
            voice.right.store_ramp(&right);
            voice.speed.store_ramp(&speed);
            events.extend(iter::repeat(ClipEvent::LoopInstance { id, frame: 0.0 }).take(loops));

            if !finished {
                voice.set_cursor(cursor);
                return;
            }

            // Natural end of the clip. A restart plays from the top.
            voice.set_cursor(0.0);
            if voice.swap_playing(false) {
                events.extend(iter::once(ClipEvent::StopInstance {
                    id,
                    frame: last_frame,
                }));
            }
            if voice.recycle_on_finish() {
                self.pool.retire(id, voice, |frame| {
                    events.extend(iter::once(ClipEvent::ReleaseInstance { id, frame }));
                });
            }
        });
    }

    pub fn bank(&self) -> &Arc<SampleBank> {
        &self.bank
    }

    pub fn pool(&self) -> &Arc<VoicePool> {
        &self.pool
    }

    pub fn ramp_steps(&self) -> RampSteps {
        self.ramp_steps
    }
}
