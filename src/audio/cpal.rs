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
        atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::Sample;
use crossbeam_channel::Sender;
use parking_lot::{Condvar, Mutex};
use tracing::{error, info, span, Level};

use super::{
    format::SinkFormat,
    sink::{OutputSink, SinkError},
};

/// Upper bound on a single wait for ring space. The wait is re-armed until the
/// data fits; the bound only protects against a missed wakeup.
const SPACE_WAIT: Duration = Duration::from_millis(20);

/// Lock-free single-producer/single-consumer ring of samples shared between the
/// sink's `write` and the cpal callback. Samples are stored as f32 bit patterns.
struct CircularBuffer {
    /// Backing buffer
    buffer: Box<[AtomicU32]>,
    /// Capacity (must be power of 2)
    capacity: usize,
    /// Read position (consumer)
    read_pos: AtomicUsize,
    /// Write position (producer)
    write_pos: AtomicUsize,
    /// Signalled by the consumer whenever it frees space.
    space_lock: Mutex<()>,
    space_cond: Condvar,
}

impl CircularBuffer {
    fn new(capacity: usize) -> Self {
        // Round up to next power of 2 for efficient modulo
        let cap = capacity.next_power_of_two();
        Self {
            buffer: (0..cap).map(|_| AtomicU32::new(0)).collect(),
            capacity: cap,
            read_pos: AtomicUsize::new(0),
            write_pos: AtomicUsize::new(0),
            space_lock: Mutex::new(()),
            space_cond: Condvar::new(),
        }
    }

    /// Get number of samples available to read
    #[inline]
    fn available(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(read) & (self.capacity - 1)
    }

    /// Get space available to write
    #[inline]
    fn space(&self) -> usize {
        self.capacity - self.available() - 1
    }

    /// Writes as many samples as fit, returning how many were written.
    fn push(&self, samples: &[f32]) -> usize {
        let to_write = self.space().min(samples.len());
        let mask = self.capacity - 1;
        let write = self.write_pos.load(Ordering::Relaxed);

        for (offset, sample) in samples[..to_write].iter().enumerate() {
            self.buffer[(write + offset) & mask].store(sample.to_bits(), Ordering::Relaxed);
        }

        self.write_pos
            .store((write + to_write) & mask, Ordering::Release);
        to_write
    }

    /// Reads a single sample, if any is queued.
    #[inline]
    fn pop(&self) -> Option<f32> {
        let read = self.read_pos.load(Ordering::Relaxed);
        if read == self.write_pos.load(Ordering::Acquire) {
            return None;
        }

        let sample = f32::from_bits(self.buffer[read].load(Ordering::Relaxed));
        self.read_pos
            .store((read + 1) & (self.capacity - 1), Ordering::Release);
        Some(sample)
    }

    /// Wakes a producer waiting for space. Notifies under the lock so the
    /// wakeup cannot land between the producer's check and its wait.
    fn notify_space(&self) {
        let _guard = self.space_lock.lock();
        self.space_cond.notify_one();
    }

    /// Parks the producer until space may have been freed. Returns at once if
    /// `ready` already holds once the lock is taken.
    fn wait_for_space(&self, ready: impl Fn(&Self) -> bool) {
        let mut guard = self.space_lock.lock();
        if !ready(self) {
            self.space_cond.wait_for(&mut guard, SPACE_WAIT);
        }
    }
}

/// Describes an output device found on the system.
pub struct DeviceInfo {
    /// The name of the device.
    pub name: String,
    /// The maximum number of channels the device supports.
    pub max_channels: u16,
    /// The host ID of the device.
    pub host_id: cpal::HostId,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.max_channels,
            self.host_id.name()
        )
    }
}

/// State held while the stream is running.
struct OpenStream {
    ring: Arc<CircularBuffer>,
    format: SinkFormat,
    /// Set by the stream's error callback.
    failed: Arc<AtomicBool>,
    /// Dropping or signalling this stops the output thread.
    shutdown_tx: Sender<()>,
    /// Handle to the output thread (keeps the stream alive).
    output_thread: Option<thread::JoinHandle<()>>,
}

/// An output sink backed by a cpal device.
///
/// cpal streams are not `Send` on every platform, so the stream is created and
/// owned by a dedicated output thread. `write` feeds a lock-free ring that the
/// stream callback drains, and blocks while the ring is full.
pub struct CpalSink {
    /// The name of the device, or "default".
    name: String,
    stream: Option<OpenStream>,
    scratch: Vec<f32>,
}

impl CpalSink {
    /// Creates a sink for the named device. The device is looked up on `open`.
    pub fn new(name: &str) -> CpalSink {
        CpalSink {
            name: name.to_string(),
            stream: None,
            scratch: Vec::new(),
        }
    }

    /// Lists cpal output devices.
    pub fn list() -> Result<Vec<DeviceInfo>, SinkError> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut devices = Vec::new();
        for host_id in cpal::available_hosts() {
            let host = cpal::host_from_id(host_id).map_err(backend_error)?;
            let host_devices = match host.output_devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let configs = match device.supported_output_configs() {
                    Ok(configs) => configs,
                    Err(_) => continue,
                };
                let max_channels = configs.map(|c| c.channels()).max().unwrap_or(0);
                if max_channels == 0 {
                    continue;
                }

                devices.push(DeviceInfo {
                    name: device.name().map_err(backend_error)?,
                    max_channels,
                    host_id,
                });
            }
        }

        devices.sort_by_key(|device| device.name.to_string());
        Ok(devices)
    }

    /// Finds the cpal device for this sink.
    fn find_device(&self) -> Result<cpal::Device, SinkError> {
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        if self.name == "default" {
            return cpal::default_host()
                .default_output_device()
                .ok_or_else(|| SinkError::DeviceNotFound(self.name.clone()));
        }

        for host_id in cpal::available_hosts() {
            let host = cpal::host_from_id(host_id).map_err(backend_error)?;
            let Ok(devices) = host.output_devices() else {
                continue;
            };
            for device in devices {
                if device.name().is_ok_and(|name| name.trim() == self.name) {
                    return Ok(device);
                }
            }
        }

        Err(SinkError::DeviceNotFound(self.name.clone()))
    }
}

fn backend_error<E: fmt::Display>(e: E) -> SinkError {
    SinkError::Backend(e.to_string())
}

/// Builds a stream whose callback converts ring samples into the device's type.
fn build_typed_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    ring: Arc<CircularBuffer>,
    failed: Arc<AtomicBool>,
) -> Result<cpal::Stream, SinkError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                // Zero-fill any shortfall
                for dst in data.iter_mut() {
                    *dst = T::from_sample(ring.pop().unwrap_or(0.0));
                }
                ring.notify_space();
            },
            move |err| {
                error!("CPAL output stream error: {}", err);
                failed.store(true, Ordering::Release);
            },
            None,
        )
        .map_err(backend_error)
}

fn build_stream(
    device: &cpal::Device,
    format: &SinkFormat,
    ring: Arc<CircularBuffer>,
    failed: Arc<AtomicBool>,
) -> Result<cpal::Stream, SinkError> {
    let device_format = device
        .default_output_config()
        .map_err(backend_error)?
        .sample_format();

    // Let CPAL choose the buffer size; the ring absorbs the difference.
    let config = cpal::StreamConfig {
        channels: format.channels(),
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    match device_format {
        cpal::SampleFormat::F32 => build_typed_stream::<f32>(device, &config, ring, failed),
        cpal::SampleFormat::I16 => build_typed_stream::<i16>(device, &config, ring, failed),
        cpal::SampleFormat::I32 => build_typed_stream::<i32>(device, &config, ring, failed),
        cpal::SampleFormat::U16 => build_typed_stream::<u16>(device, &config, ring, failed),
        other => Err(SinkError::UnsupportedFormat(format!(
            "device sample format {:?}",
            other
        ))),
    }
}

/// Joins an output thread that gave up during `open`, logging a panic.
fn join_output_thread(thread: thread::JoinHandle<()>) {
    if thread.join().is_err() {
        error!("CPAL output thread panicked while opening the stream");
    }
}

impl OutputSink for CpalSink {
    fn open(&mut self, format: &SinkFormat, buffer_frames: usize) -> Result<(), SinkError> {
        let span = span!(Level::INFO, "open sink (cpal)");
        let _enter = span.enter();

        if self.stream.is_some() {
            self.close()?;
        }

        let device = self.find_device()?;

        // A few buffers of headroom between the worker and the callback.
        let capacity = (buffer_frames * usize::from(format.channels()) * 4).max(1024);
        let ring = Arc::new(CircularBuffer::new(capacity));
        let failed = Arc::new(AtomicBool::new(false));

        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), SinkError>>(1);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);

        let output_thread = {
            let ring = ring.clone();
            let failed = failed.clone();
            let format = format.clone();
            thread::Builder::new()
                .name("polyclip-cpal".to_string())
                .spawn(move || {
                    let stream = match build_stream(&device, &format, ring, failed) {
                        Ok(stream) => stream,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    if let Err(e) = stream.play() {
                        let _ = ready_tx.send(Err(backend_error(e)));
                        return;
                    }
                    let _ = ready_tx.send(Ok(()));

                    // Keep the stream alive until the sink closes.
                    let _ = shutdown_rx.recv();
                    drop(stream);
                })?
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                join_output_thread(output_thread);
                return Err(e);
            }
            Err(_) => {
                join_output_thread(output_thread);
                return Err(SinkError::Backend("output thread exited".to_string()));
            }
        }

        info!(device = self.name, %format, buffer_frames, "CPAL output stream started successfully");
        self.scratch = Vec::with_capacity(buffer_frames * usize::from(format.channels()));
        self.stream = Some(OpenStream {
            ring,
            format: format.clone(),
            failed,
            shutdown_tx,
            output_thread: Some(output_thread),
        });
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        let stream = self.stream.as_ref().ok_or(SinkError::Closed)?;

        self.scratch.clear();
        stream.format.decode_into(bytes, &mut self.scratch);

        let mut offset = 0;
        while offset < self.scratch.len() {
            if stream.failed.load(Ordering::Acquire) {
                return Err(SinkError::Backend("output stream failed".to_string()));
            }
            offset += stream.ring.push(&self.scratch[offset..]);
            if offset < self.scratch.len() {
                stream.ring.wait_for_space(|ring| ring.space() > 0);
            }
        }
        Ok(())
    }

    fn drain(&mut self) -> Result<(), SinkError> {
        let stream = self.stream.as_ref().ok_or(SinkError::Closed)?;
        while stream.ring.available() > 0 {
            if stream.failed.load(Ordering::Acquire) {
                return Err(SinkError::Backend("output stream failed".to_string()));
            }
            stream.ring.wait_for_space(|ring| ring.available() == 0);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown_tx.send(());
            if let Some(thread) = stream.output_thread.take() {
                if thread.join().is_err() {
                    return Err(SinkError::Backend("output thread panicked".to_string()));
                }
            }
            info!(device = self.name, "CPAL output stream closed");
        }
        Ok(())
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!(device = self.name, err = %e, "Failed to close output stream");
        }
    }
}

impl fmt::Display for CpalSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (CPAL)", self.name)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_circular_buffer_capacity_rounds_up() {
        let ring = CircularBuffer::new(1000);
        assert_eq!(ring.capacity, 1024);
        assert_eq!(ring.available(), 0);
        assert_eq!(ring.space(), 1023);
    }

    #[test]
    fn test_circular_buffer_push_pop_wraps() {
        let ring = CircularBuffer::new(8);
        let input: Vec<f32> = (0..7).map(|i| i as f32).collect();
        assert_eq!(ring.push(&input), 7);
        assert_eq!(ring.push(&[99.0]), 0);

        for expected in 0..5 {
            assert_eq!(ring.pop(), Some(expected as f32));
        }
        assert_eq!(ring.push(&[7.0, 8.0, 9.0]), 3);
        assert_eq!(ring.available(), 5);

        let drained: Vec<f32> = std::iter::from_fn(|| ring.pop()).collect();
        assert_eq!(drained, vec![5.0, 6.0, 7.0, 8.0, 9.0]);
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn test_wait_for_space_returns_when_ready() {
        let ring = CircularBuffer::new(8);
        let started = std::time::Instant::now();
        for _ in 0..50 {
            ring.wait_for_space(|ring| ring.space() > 0);
        }
        // Never parks, so nowhere near 50 full waits.
        assert!(started.elapsed() < SPACE_WAIT * 25);
    }

    #[test]
    fn test_producer_wakes_when_consumer_frees_space() {
        let ring = Arc::new(CircularBuffer::new(8));
        assert_eq!(ring.push(&[0.0; 7]), 7);

        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let producer = {
            let ring = ring.clone();
            thread::spawn(move || {
                while ring.push(&[1.0]) == 0 {
                    ring.wait_for_space(|ring| ring.space() > 0);
                }
                done_tx.send(()).unwrap();
            })
        };

        assert_eq!(ring.pop(), Some(0.0));
        ring.notify_space();
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        producer.join().unwrap();
        assert_eq!(ring.available(), 7);
    }

    #[test]
    fn test_output_thread_panic_is_contained() {
        let thread = thread::spawn(|| panic!("stream setup blew up"));
        join_output_thread(thread);
    }

    #[test]
    fn test_write_requires_open() {
        let mut sink = CpalSink::new("nonexistent");
        assert!(matches!(sink.write(&[0, 0]), Err(SinkError::Closed)));
        assert!(matches!(sink.drain(), Err(SinkError::Closed)));
        assert!(sink.close().is_ok());
    }
}
