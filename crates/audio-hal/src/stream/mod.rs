//! Playback and capture stream engines
//!
//! - [`output`]: low-latency, deep-buffer and HDMI playback streams
//! - [`input`]: the capture stream with its pre-processing chain
//! - [`buffer`]: frame buffers and rate-conversion plumbing shared by both

pub mod buffer;
pub mod input;
pub mod output;

pub use input::InputStream;
pub use output::{
    OutputStream, activation_forces_standby, routing_change_forces_standby, standby_forces_standby,
};

use crate::config::CaptureConfig;
use crate::error::{HalError, HalResult};
use crate::types::{SampleFormat, StreamConfig};

use self::buffer::round_up_16;

/// Sample rates a capture stream may request
pub const SUPPORTED_INPUT_RATES: [u32; 8] = [8000, 11025, 16000, 22050, 24000, 32000, 44100, 48000];

/// Path a capture read takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadTier {
    /// Straight from the endpoint
    Direct,
    /// Rate conversion, no effects
    ResampleOnly,
    /// Rate conversion when needed, then the effect chain
    Preprocess,
}

/// Validate a capture request
pub fn check_input_parameters(config: &StreamConfig) -> HalResult<()> {
    if config.format != SampleFormat::Pcm16 {
        return Err(HalError::invalid_argument(format!("unsupported capture format {:?}", config.format)));
    }
    let channels = config.channel_count();
    if !(1..=2).contains(&channels) {
        return Err(HalError::invalid_argument(format!("unsupported capture channel count {}", channels)));
    }
    if !SUPPORTED_INPUT_RATES.contains(&config.sample_rate) {
        return Err(HalError::invalid_argument(format!(
            "unsupported capture rate {}",
            config.sample_rate
        )));
    }
    Ok(())
}

/// Capture buffer size in bytes for a request, or 0 when it is unsupported
///
/// One capture period rescaled to the requested rate, rounded up to 16 frames.
pub fn input_buffer_size(capture: &CaptureConfig, config: &StreamConfig) -> usize {
    if check_input_parameters(config).is_err() {
        return 0;
    }
    let frames = capture.period_size * config.sample_rate as usize / capture.rate as usize;
    round_up_16(frames) * config.channel_count() * std::mem::size_of::<i16>()
}
