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

//! Per-voice playback state.
//!
//! Every field is an atomic so control calls from arbitrary threads never block
//! the mixing worker. Targets are written by callers; current values, ramp
//! progress and the cursor are written by the worker while the voice plays.
//!
//! Transport changes (obtain, release, start, stop, seek) run as transitions
//! that bump the voice's epoch. The worker snapshots the epoch before a pass and
//! commits the pass only if it is unchanged, so a pass that overlapped a
//! transition never overwrites what the caller just did.

use std::fmt;
use std::hint;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, Ordering};

/// Index of a voice slot within its clip, `0..polyphony`.
pub type VoiceId = usize;

/// Slowest supported playback rate.
pub const MIN_SPEED: f32 = 0.125;
/// Fastest supported playback rate.
pub const MAX_SPEED: f32 = 8.0;
/// Loop count meaning "loop forever".
pub const LOOP_FOREVER: i32 = -1;

/// An f32 stored as its bit pattern.
pub(crate) struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub(crate) fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    pub(crate) fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub(crate) fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// An f64 stored as its bit pattern.
pub(crate) struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub(crate) fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    #[inline]
    pub(crate) fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub(crate) fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Worker-side snapshot of a ramped parameter, advanced once per mix step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Ramp {
    pub(crate) current: f32,
    pub(crate) seen_target: f32,
    pub(crate) step: f32,
    pub(crate) remaining: u32,
}

impl Ramp {
    /// A ramp at rest on `value`.
    pub(crate) fn settled(value: f32) -> Self {
        Self {
            current: value,
            seen_target: value,
            step: 0.0,
            remaining: 0,
        }
    }

    /// Advances one mix step toward `target` and returns the realised value.
    ///
    /// A target that differs from the last one seen restarts the ramp from the
    /// current value over `steps` steps. The final step lands exactly on the
    /// target so rounding never leaves the value short or past it.
    #[inline]
    pub(crate) fn tick(&mut self, target: f32, steps: u32) -> f32 {
        if target != self.seen_target {
            self.seen_target = target;
            self.step = (target - self.current) / steps as f32;
            self.remaining = steps;
        }

        if self.remaining > 0 {
            self.remaining -= 1;
            self.current = if self.remaining == 0 {
                self.seen_target
            } else {
                self.current + self.step
            };
        }

        self.current
    }
}

/// A parameter that callers set a target for and the mixer ramps toward.
pub(crate) struct RampedParam {
    target: AtomicF32,
    current: AtomicF32,
    seen_target: AtomicF32,
    step: AtomicF32,
    remaining: AtomicU32,
}

impl RampedParam {
    fn new(value: f32) -> Self {
        Self {
            target: AtomicF32::new(value),
            current: AtomicF32::new(value),
            seen_target: AtomicF32::new(value),
            step: AtomicF32::new(0.0),
            remaining: AtomicU32::new(0),
        }
    }

    #[inline]
    pub(crate) fn target(&self) -> f32 {
        self.target.load()
    }

    pub(crate) fn set_target(&self, value: f32) {
        self.target.store(value);
    }

    pub(crate) fn current(&self) -> f32 {
        self.current.load()
    }

    /// Jumps straight to the target with no ramp.
    pub(crate) fn snap_to_target(&self) {
        self.store_ramp(&Ramp::settled(self.target()));
    }

    /// Sets both target and current to `value`.
    fn reset(&self, value: f32) {
        self.target.store(value);
        self.store_ramp(&Ramp::settled(value));
    }

    pub(crate) fn load_ramp(&self) -> Ramp {
        Ramp {
            current: self.current.load(),
            seen_target: self.seen_target.load(),
            step: self.step.load(),
            remaining: self.remaining.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn store_ramp(&self, ramp: &Ramp) {
        self.current.store(ramp.current);
        self.seen_target.store(ramp.seen_target);
        self.step.store(ramp.step);
        self.remaining.store(ramp.remaining, Ordering::Relaxed);
    }
}

/// One slot of a clip's polyphony.
pub struct Voice {
    /// Holds a slot (obtained and not yet released).
    active: AtomicBool,
    /// Contributing to the mix.
    playing: AtomicBool,
    /// Fractional frame position.
    cursor: AtomicF64,
    pub(crate) speed: RampedParam,
    pub(crate) left: RampedParam,
    pub(crate) right: RampedParam,
    /// -1 loops forever, 0 plays out, >0 loops that many more times.
    loop_count: AtomicI32,
    /// Release back to the pool when playback ends by itself.
    recycle_on_finish: AtomicBool,
    /// Bumped by 2 on every transition. Odd while a transition or commit runs.
    epoch: AtomicU32,
}

impl Voice {
    pub(crate) fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            playing: AtomicBool::new(false),
            cursor: AtomicF64::new(0.0),
            speed: RampedParam::new(1.0),
            left: RampedParam::new(0.0),
            right: RampedParam::new(0.0),
            loop_count: AtomicI32::new(0),
            recycle_on_finish: AtomicBool::new(false),
            epoch: AtomicU32::new(0),
        }
    }

    /// Snapshot taken by the worker before mixing the voice.
    #[inline]
    pub(crate) fn epoch(&self) -> u32 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Runs a transport change. Waits out a commit in progress (a handful of
    /// stores), and invalidates every pass that started before it.
    pub(crate) fn transition<R>(&self, f: impl FnOnce() -> R) -> R {
        let epoch = loop {
            let epoch = self.epoch.load(Ordering::Relaxed);
            if epoch & 1 == 0
                && self
                    .epoch
                    .compare_exchange_weak(epoch, epoch | 1, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
            {
                break epoch;
            }
            hint::spin_loop();
        };
        let result = f();
        self.epoch.store(epoch.wrapping_add(2), Ordering::Release);
        result
    }

    /// Runs `f` to write back a mix pass if no transition has happened since
    /// `epoch` was read. Never waits; returns false when the pass is stale.
    #[inline]
    pub(crate) fn commit(&self, epoch: u32, f: impl FnOnce()) -> bool {
        if epoch & 1 != 0
            || self
                .epoch
                .compare_exchange(epoch, epoch | 1, Ordering::Acquire, Ordering::Relaxed)
                .is_err()
        {
            return false;
        }
        f();
        self.epoch.store(epoch, Ordering::Release);
        true
    }

    /// Restores defaults: silent, speed 1, no loop, cursor at the start, stopped.
    /// Leaves `active` alone; the pool owns that flag.
    pub(crate) fn reset(&self) {
        self.playing.store(false, Ordering::Release);
        self.cursor.store(0.0);
        self.speed.reset(1.0);
        self.left.reset(0.0);
        self.right.reset(0.0);
        self.loop_count.store(0, Ordering::Relaxed);
        self.recycle_on_finish.store(false, Ordering::Relaxed);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn activate(&self) {
        self.active.store(true, Ordering::Release);
    }

    /// Clears `active`, returning whether this call was the one that cleared it.
    pub(crate) fn deactivate(&self) -> bool {
        self.active.swap(false, Ordering::AcqRel)
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    /// Sets `playing` and returns the previous value.
    pub(crate) fn swap_playing(&self, playing: bool) -> bool {
        self.playing.swap(playing, Ordering::AcqRel)
    }

    pub fn cursor(&self) -> f64 {
        self.cursor.load()
    }

    pub(crate) fn set_cursor(&self, cursor: f64) {
        self.cursor.store(cursor);
    }

    pub fn loop_count(&self) -> i32 {
        self.loop_count.load(Ordering::Relaxed)
    }

    pub(crate) fn set_loop_count(&self, count: i32) {
        self.loop_count
            .store(count.max(LOOP_FOREVER), Ordering::Relaxed);
    }

    /// Consumes one loop iteration at the end of the clip. Returns true if the
    /// voice should wrap around and keep playing.
    pub(crate) fn take_loop(&self) -> bool {
        match self
            .loop_count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                (n > 0).then(|| n - 1)
            }) {
            Ok(_) => true,
            Err(n) => n == LOOP_FOREVER,
        }
    }

    pub fn recycle_on_finish(&self) -> bool {
        self.recycle_on_finish.load(Ordering::Relaxed)
    }

    pub(crate) fn set_recycle_on_finish(&self, recycle: bool) {
        self.recycle_on_finish.store(recycle, Ordering::Relaxed);
    }
}

impl fmt::Debug for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Voice")
            .field("active", &self.is_active())
            .field("playing", &self.is_playing())
            .field("cursor", &self.cursor())
            .field("speed", &self.speed.current())
            .field("volume", &(self.left.current(), self.right.current()))
            .field("loop_count", &self.loop_count())
            .finish()
    }
}
