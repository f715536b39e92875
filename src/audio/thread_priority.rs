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

use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{info, warn};

/// Default priority for the mixing worker when POLYCLIP_THREAD_PRIORITY is unset.
const DEFAULT_WORKER_THREAD_PRIORITY: u8 = 70;

/// Reads POLYCLIP_THREAD_PRIORITY (0-99). Read once when the worker starts so the
/// environment is never touched from the mixing loop.
pub fn worker_thread_priority() -> u8 {
    std::env::var("POLYCLIP_THREAD_PRIORITY")
        .ok()
        .and_then(|v| v.parse::<u8>().ok())
        .filter(|n| *n < 100)
        .unwrap_or(DEFAULT_WORKER_THREAD_PRIORITY)
}

pub(crate) fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| {
            v == "1"
                || v.eq_ignore_ascii_case("true")
                || v.eq_ignore_ascii_case("yes")
                || v.eq_ignore_ascii_case("on")
        })
        .unwrap_or(false)
}

/// Returns whether we should attempt RT (SCHED_FIFO) scheduling for the worker.
/// Default: enabled. Opt out with POLYCLIP_DISABLE_RT_AUDIO=1.
pub fn rt_audio_enabled() -> bool {
    !env_flag("POLYCLIP_DISABLE_RT_AUDIO")
}

/// Raises the calling thread's priority. Failures are logged and otherwise ignored;
/// playback still works at normal priority, just with less headroom.
pub fn configure_worker_thread_priority(priority: u8, rt_audio: bool) {
    let value = match ThreadPriorityValue::try_from(priority) {
        Ok(value) => value,
        Err(e) => {
            warn!(priority, error = %e, "Invalid worker thread priority");
            return;
        }
    };
    let tp = ThreadPriority::Crossplatform(value);
    if let Err(e) = set_current_thread_priority(tp) {
        warn!(priority, error = %e, "Failed to raise worker thread priority");
    }

    #[cfg(unix)]
    if rt_audio {
        use thread_priority::unix::{
            set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
            ThreadSchedulePolicy,
        };
        let tid = thread_native_id();
        match set_thread_priority_and_policy(
            tid,
            tp,
            ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
        ) {
            Ok(()) => {
                info!("Enabled RT SCHED_FIFO for mixing worker");
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "Failed to set RT SCHED_FIFO for mixing worker"
                );
            }
        }
    }

    #[cfg(not(unix))]
    let _ = rt_audio;
}
