//! Stream buffer pipeline
//!
//! Owned frame buffers, the capture-side frame provider feeding the input
//! resampler, and the playback-side rate converter. Buffers are sized when a
//! stream's configuration changes and reused across reads and writes.

use std::time::Duration;

use tracing::trace;

use crate::error::{HalError, HalResult};
use crate::hal::{FrameProvider, Pcm, Resampler};

/// Round a frame count up to the next multiple of 16
pub const fn round_up_16(frames: usize) -> usize {
    frames.div_ceil(16) * 16
}

/// Duration of `frames` at `rate`, in nanoseconds
pub fn frames_to_ns(frames: usize, rate: u32) -> i64 {
    if rate == 0 {
        return 0;
    }
    (frames as i64 * 1_000_000_000) / rate as i64
}

/// Nominal playback or capture duration of `frames` at `rate`
pub fn frames_duration(frames: usize, rate: u32) -> Duration {
    if rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_micros(frames as u64 * 1_000_000 / rate as u64)
}

/// Growable interleaved frame buffer with a filled prefix
#[derive(Debug, Clone, Default)]
pub struct FrameBuffer {
    data: Vec<i16>,
    frames: usize,
    channels: usize,
}

impl FrameBuffer {
    pub fn new(channels: usize) -> Self {
        Self {
            data: Vec::new(),
            frames: 0,
            channels,
        }
    }

    /// Drop content and switch channel count
    pub fn reset(&mut self, channels: usize) {
        self.frames = 0;
        if channels != self.channels {
            self.channels = channels;
            self.data.clear();
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Filled frames
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Make room for at least `frames` frames in total
    pub fn reserve_frames(&mut self, frames: usize) {
        let samples = frames * self.channels;
        if self.data.len() < samples {
            trace!(frames, channels = self.channels, "Growing frame buffer");
            self.data.resize(samples, 0);
        }
    }

    pub fn filled(&self) -> &[i16] {
        &self.data[..self.frames * self.channels]
    }

    /// Unfilled space after the filled prefix, `frames` frames long
    pub fn spare(&mut self, frames: usize) -> &mut [i16] {
        self.reserve_frames(self.frames + frames);
        let start = self.frames * self.channels;
        &mut self.data[start..start + frames * self.channels]
    }

    /// Mark `frames` frames of spare space as filled
    pub fn commit(&mut self, frames: usize) {
        self.frames += frames;
    }

    /// Drop `frames` frames from the front, moving the rest down
    pub fn consume(&mut self, frames: usize) {
        let frames = frames.min(self.frames);
        if frames == 0 {
            return;
        }
        let ch = self.channels;
        self.data.copy_within(frames * ch..self.frames * ch, 0);
        self.frames -= frames;
    }

    pub fn clear(&mut self) {
        self.frames = 0;
    }
}

/// An open capture endpoint with its period buffer
pub struct CaptureSource {
    pcm: Box<dyn Pcm>,
    read_buf: Vec<i16>,
    /// Frames of `read_buf` not yet handed out
    unread: usize,
    period_size: usize,
    channels: usize,
}

impl CaptureSource {
    pub fn new(pcm: Box<dyn Pcm>, period_size: usize, channels: usize) -> Self {
        Self {
            pcm,
            read_buf: vec![0; period_size * channels],
            unread: 0,
            period_size,
            channels,
        }
    }

    pub fn pcm(&self) -> &dyn Pcm {
        self.pcm.as_ref()
    }

    /// Read straight from the endpoint, bypassing the period buffer
    pub fn read_direct(&mut self, samples: &mut [i16]) -> HalResult<()> {
        self.pcm.read(samples)
    }

    /// Frames read from the endpoint but not yet consumed
    pub fn unread_frames(&self) -> usize {
        self.unread
    }

    /// Frames waiting in the endpoint's kernel buffer
    pub fn kernel_frames(&self) -> HalResult<usize> {
        Ok(self.pcm.timestamp()?.available)
    }
}

impl FrameProvider for CaptureSource {
    fn next_buffer(&mut self, max_frames: usize) -> HalResult<&[i16]> {
        if self.unread == 0 {
            self.pcm.read(&mut self.read_buf)?;
            self.unread = self.period_size;
        }
        let frames = max_frames.min(self.unread);
        let start = (self.period_size - self.unread) * self.channels;
        Ok(&self.read_buf[start..start + frames * self.channels])
    }

    fn release_buffer(&mut self, frames: usize) {
        self.unread -= frames.min(self.unread);
    }
}

/// Capture endpoint plus optional rate conversion to the requested rate
#[derive(Default)]
pub struct CapturePath {
    pub source: Option<CaptureSource>,
    pub resampler: Option<Box<dyn Resampler>>,
}

impl CapturePath {
    /// Fill `output` with frames at the requested rate
    pub fn read_frames(&mut self, output: &mut [i16], channels: usize) -> HalResult<usize> {
        let source = self
            .source
            .as_mut()
            .ok_or_else(|| HalError::no_such_device("capture endpoint closed"))?;

        if let Some(resampler) = self.resampler.as_mut() {
            return resampler.resample_from_provider(source, output);
        }

        let wanted = output.len() / channels;
        let mut written = 0;
        while written < wanted {
            let buffer = source.next_buffer(wanted - written)?;
            let frames = buffer.len() / channels;
            output[written * channels..(written + frames) * channels].copy_from_slice(buffer);
            source.release_buffer(frames);
            written += frames;
        }
        Ok(written)
    }

    /// Delay of frames captured but not yet returned, excluding the processing buffer
    pub fn pending_delay_ns(&self, capture_rate: u32) -> HalResult<i64> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| HalError::no_such_device("capture endpoint closed"))?;
        let kernel = frames_to_ns(source.kernel_frames()?, capture_rate);
        let unread = frames_to_ns(source.unread_frames(), capture_rate);
        let resampler = self.resampler.as_ref().map_or(0, |r| r.delay_ns());
        Ok(kernel + unread + resampler)
    }
}

/// Playback rate converter with its owned output buffer
#[derive(Default)]
pub struct PlaybackConverter {
    resampler: Option<Box<dyn Resampler>>,
    buffer: Vec<i16>,
}

impl PlaybackConverter {
    pub fn new(resampler: Box<dyn Resampler>, capacity_samples: usize) -> Self {
        Self {
            resampler: Some(resampler),
            buffer: vec![0; capacity_samples],
        }
    }

    pub fn is_active(&self) -> bool {
        self.resampler.is_some()
    }

    /// Convert `input`; returns frames available in [`Self::output`]
    pub fn convert(&mut self, input: &[i16], channels: usize) -> usize {
        let Some(resampler) = self.resampler.as_mut() else {
            return 0;
        };
        // Upsampling needs more room than the input
        let needed = input.len() * 2 + channels * 2;
        if self.buffer.len() < needed {
            self.buffer.resize(needed, 0);
        }
        let (_, produced) = resampler.resample(input, &mut self.buffer);
        produced
    }

    /// First `frames` converted frames
    pub fn output(&self, frames: usize, channels: usize) -> &[i16] {
        &self.buffer[..frames * channels]
    }

    pub fn reset(&mut self) {
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
        }
    }
}

/// Copy the leading `dst_channels` channels of each frame
pub fn strip_aux_channels(
    src: &[i16],
    src_channels: usize,
    dst: &mut [i16],
    dst_channels: usize,
    frames: usize,
) {
    for (d, s) in dst
        .chunks_exact_mut(dst_channels)
        .zip(src.chunks_exact(src_channels))
        .take(frames)
    {
        d.copy_from_slice(&s[..dst_channels]);
    }
}
