//! PCM transport interface
//!
//! A [`Transport`] opens frame endpoints; the returned [`Pcm`] is closed when
//! dropped. All buffers are interleaved signed 16-bit samples.

use std::time::Duration;

use crate::error::HalResult;

/// Transport endpoints used by the core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Low-latency (tones) playback front end
    Tones,
    /// S/PDIF dock playback
    Spdif,
    /// HDMI playback
    Hdmi,
    /// Deep-buffer (multimedia) playback front end
    Multimedia,
    /// Multimedia capture uplink
    CaptureUplink,
    /// Modem voice link
    Modem,
}

/// Transfer direction of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Playback,
    Capture,
}

/// Endpoint configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmConfig {
    pub channels: usize,
    pub rate: u32,
    pub period_size: usize,
    pub period_count: usize,
    pub start_threshold: usize,
    pub avail_min: usize,
    /// Memory-mapped transfers
    pub mmap: bool,
}

impl PcmConfig {
    pub fn new(channels: usize, rate: u32, period_size: usize, period_count: usize) -> Self {
        Self {
            channels,
            rate,
            period_size,
            period_count,
            start_threshold: 0,
            avail_min: 0,
            mmap: false,
        }
    }

    /// Set start threshold and wake-up level
    pub fn with_thresholds(mut self, start_threshold: usize, avail_min: usize) -> Self {
        self.start_threshold = start_threshold;
        self.avail_min = avail_min;
        self
    }

    /// Use memory-mapped transfers
    pub fn with_mmap(mut self) -> Self {
        self.mmap = true;
        self
    }

    /// Total ring buffer size in frames
    pub fn buffer_frames(&self) -> usize {
        self.period_size * self.period_count
    }
}

/// Result of a timestamp query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmTimestamp {
    /// Frames available to the application: free space for playback, pending data for capture
    pub available: usize,
    /// Time at which `available` was sampled
    pub time: Duration,
}

/// An open transport endpoint
pub trait Pcm: Send {
    /// Write interleaved frames
    fn write(&mut self, samples: &[i16]) -> HalResult<()>;

    /// Fill `samples` with interleaved frames
    fn read(&mut self, samples: &mut [i16]) -> HalResult<()>;

    /// Buffer occupancy snapshot
    fn timestamp(&self) -> HalResult<PcmTimestamp>;

    /// Ring buffer size in frames
    fn buffer_size(&self) -> usize;

    /// Set the wake-up level in frames
    fn set_avail_min(&mut self, frames: usize) -> HalResult<()>;

    fn start(&mut self) -> HalResult<()>;

    fn stop(&mut self) -> HalResult<()>;
}

/// Opens transport endpoints
pub trait Transport: Send + Sync {
    /// Open an endpoint; the endpoint closes when the returned handle is dropped
    fn open(&self, endpoint: Endpoint, direction: Direction, config: &PcmConfig) -> HalResult<Box<dyn Pcm>>;
}
