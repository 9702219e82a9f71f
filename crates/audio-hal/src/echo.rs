//! Echo reference broker
//!
//! An [`EchoReference`] carries a copy of the low-latency playback signal to
//! a capture stream running echo cancellation. The writer (output stream)
//! pushes frames stamped with their playback delay; the reader (input
//! stream) pulls frames converted to its own channel count and rate, along
//! with the total echo path delay.
//!
//! The reference itself only buffers and converts. Which output writes to it
//! and when it is created or dropped is decided by the device coordinator,
//! which keeps at most one alive at a time.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::{HalError, HalResult};
use crate::hal::{LinearResampler, Resampler};

/// Longest stretch of reference audio retained, in milliseconds
pub const MAX_BUFFERED_MS: u64 = 200;

/// Result of a reference read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoRead {
    /// Frames copied to the caller
    pub frames: usize,
    /// Delay between the reference frames being rendered and the capture
    pub delay_ns: i64,
}

struct EchoState {
    /// Reference frames at the reader's channel count and rate
    buffer: VecDeque<i16>,
    playback_delay_ns: i64,
    writing: bool,
    reading: bool,
    resampler: Option<LinearResampler>,
    mixed: Vec<i16>,
    converted: Vec<i16>,
}

/// Shared echo reference between one writer and one reader
pub struct EchoReference {
    id: Uuid,
    read_channels: usize,
    read_rate: u32,
    write_channels: usize,
    write_rate: u32,
    state: Mutex<EchoState>,
}

impl std::fmt::Debug for EchoReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EchoReference")
            .field("id", &self.id)
            .field("read_channels", &self.read_channels)
            .field("read_rate", &self.read_rate)
            .field("write_channels", &self.write_channels)
            .field("write_rate", &self.write_rate)
            .finish()
    }
}

impl EchoReference {
    /// Create a reference converting (write_channels, write_rate) playback
    /// into (read_channels, read_rate) reference frames
    pub fn new(
        read_channels: usize,
        read_rate: u32,
        write_channels: usize,
        write_rate: u32,
    ) -> HalResult<Self> {
        if !(1..=2).contains(&read_channels) || !(1..=2).contains(&write_channels) {
            return Err(HalError::invalid_argument(format!(
                "echo reference supports mono or stereo only ({} -> {})",
                write_channels, read_channels
            )));
        }
        if read_rate == 0 || write_rate == 0 {
            return Err(HalError::invalid_argument("echo reference rates must be non-zero"));
        }

        let resampler = if read_rate != write_rate {
            Some(LinearResampler::new(write_rate, read_rate, read_channels)?)
        } else {
            None
        };

        let id = Uuid::new_v4();
        debug!(%id, read_channels, read_rate, write_channels, write_rate, "Created echo reference");
        Ok(Self {
            id,
            read_channels,
            read_rate,
            write_channels,
            write_rate,
            state: Mutex::new(EchoState {
                buffer: VecDeque::new(),
                playback_delay_ns: 0,
                writing: false,
                reading: true,
                resampler,
                mixed: Vec::new(),
                converted: Vec::new(),
            }),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn read_channels(&self) -> usize {
        self.read_channels
    }

    pub fn read_rate(&self) -> u32 {
        self.read_rate
    }

    fn max_buffered_samples(&self) -> usize {
        (self.read_rate as u64 * MAX_BUFFERED_MS / 1000) as usize * self.read_channels
    }

    /// Push rendered frames; `delay_ns` is the time until the last frame is heard
    pub fn write(&self, samples: &[i16], delay_ns: i64) {
        let mut state = self.state.lock();
        let state = &mut *state;
        state.writing = true;
        state.playback_delay_ns = delay_ns;
        if !state.reading {
            return;
        }

        let frames = samples.len() / self.write_channels;
        state.mixed.clear();
        match (self.write_channels, self.read_channels) {
            (2, 1) => state.mixed.extend(
                samples
                    .chunks_exact(2)
                    .map(|f| ((f[0] as i32 + f[1] as i32) / 2) as i16),
            ),
            (1, 2) => {
                for &s in &samples[..frames] {
                    state.mixed.push(s);
                    state.mixed.push(s);
                }
            }
            _ => state.mixed.extend_from_slice(&samples[..frames * self.write_channels]),
        }

        match state.resampler.as_mut() {
            Some(resampler) => {
                let out_frames = frames * self.read_rate as usize / self.write_rate as usize + 2;
                state.converted.resize(out_frames * self.read_channels, 0);
                let (_, produced) = resampler.resample(&state.mixed, &mut state.converted);
                state
                    .buffer
                    .extend(state.converted[..produced * self.read_channels].iter().copied());
            }
            None => state.buffer.extend(state.mixed.iter().copied()),
        }

        let max = self.max_buffered_samples();
        if state.buffer.len() > max {
            let excess = state.buffer.len() - max;
            state.buffer.drain(..excess);
            trace!(dropped_samples = excess, "Echo reference overflow");
        }
    }

    /// Pull up to `output.len()` samples of reference
    ///
    /// `capture_delay_ns` is the age of the first captured frame the caller is
    /// about to process. Fails when no writer is active.
    pub fn read(&self, output: &mut [i16], capture_delay_ns: i64) -> HalResult<EchoRead> {
        let mut state = self.state.lock();
        state.reading = true;
        if !state.writing {
            return Err(HalError::no_such_device("echo reference has no active writer"));
        }

        let wanted = output.len() / self.read_channels;
        let available = state.buffer.len() / self.read_channels;
        let frames = wanted.min(available);
        for (dst, src) in output.iter_mut().zip(state.buffer.drain(..frames * self.read_channels)) {
            *dst = src;
        }

        let buffered = (state.buffer.len() / self.read_channels) as i64;
        let buffered_ns = buffered * 1_000_000_000 / self.read_rate as i64;
        Ok(EchoRead {
            frames,
            delay_ns: state.playback_delay_ns + capture_delay_ns + buffered_ns,
        })
    }

    /// The writer stopped; buffered reference is discarded
    pub fn stop_write(&self) {
        let mut state = self.state.lock();
        state.writing = false;
        state.buffer.clear();
        if let Some(resampler) = state.resampler.as_mut() {
            resampler.reset();
        }
    }

    /// The reader stopped; further writes are dropped
    pub fn stop_read(&self) {
        let mut state = self.state.lock();
        state.reading = false;
        state.buffer.clear();
    }

    /// Buffered reference frames
    pub fn buffered_frames(&self) -> usize {
        self.state.lock().buffer.len() / self.read_channels
    }

    pub fn is_writing(&self) -> bool {
        self.state.lock().writing
    }
}
