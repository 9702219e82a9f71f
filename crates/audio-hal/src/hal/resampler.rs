//! Sample-rate conversion interface
//!
//! Two feeding styles are supported, matching the two directions:
//! - playback pushes whole buffers through [`Resampler::resample`]
//! - capture pulls from a [`FrameProvider`] until the requested number of
//!   output frames has been produced
//!
//! [`LinearResampler`] is a streaming linear-interpolation implementation
//! used by default and by the echo reference.

use tracing::debug;

use crate::error::{HalError, HalResult};

/// Resampling quality level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResamplingQuality {
    Low,
    #[default]
    Default,
    High,
}

/// Shorter alias used across the crate
pub type ResamplerQuality = ResamplingQuality;

/// Source of input frames for pull-mode resampling
pub trait FrameProvider {
    /// Borrow up to `max_frames` interleaved frames
    fn next_buffer(&mut self, max_frames: usize) -> HalResult<&[i16]>;

    /// Mark `frames` frames of the last buffer as consumed
    fn release_buffer(&mut self, frames: usize);
}

/// A sample-rate converter
pub trait Resampler: Send {
    /// Push-mode conversion; returns (input frames consumed, output frames produced)
    fn resample(&mut self, input: &[i16], output: &mut [i16]) -> (usize, usize);

    /// Pull-mode conversion filling all of `output`; returns output frames produced
    fn resample_from_provider(
        &mut self,
        provider: &mut dyn FrameProvider,
        output: &mut [i16],
    ) -> HalResult<usize>;

    /// Drop buffered state
    fn reset(&mut self);

    /// Delay introduced by buffered input, in nanoseconds
    fn delay_ns(&self) -> i64;
}

/// Creates resamplers
pub trait ResamplerFactory: Send + Sync {
    fn create(
        &self,
        in_rate: u32,
        out_rate: u32,
        channels: usize,
        quality: ResamplerQuality,
    ) -> HalResult<Box<dyn Resampler>>;
}

/// Streaming linear-interpolation resampler
#[derive(Debug, Clone)]
pub struct LinearResampler {
    in_rate: u32,
    out_rate: u32,
    channels: usize,
    /// Input frames advanced per output frame
    step: f64,
    /// Interleaved input frames not yet fully consumed
    pending: Vec<i16>,
    /// Fractional read position in `pending`, in frames
    pos: f64,
}

impl LinearResampler {
    /// Create a new resampler
    pub fn new(in_rate: u32, out_rate: u32, channels: usize) -> HalResult<Self> {
        if in_rate == 0 || out_rate == 0 {
            return Err(HalError::invalid_argument(format!(
                "resampler rates must be non-zero ({} -> {})",
                in_rate, out_rate
            )));
        }
        if channels == 0 {
            return Err(HalError::invalid_argument("resampler needs at least one channel"));
        }
        debug!(in_rate, out_rate, channels, "Created linear resampler");
        Ok(Self {
            in_rate,
            out_rate,
            channels,
            step: in_rate as f64 / out_rate as f64,
            pending: Vec::new(),
            pos: 0.0,
        })
    }

    pub fn in_rate(&self) -> u32 {
        self.in_rate
    }

    pub fn out_rate(&self) -> u32 {
        self.out_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    fn pending_frames(&self) -> usize {
        self.pending.len() / self.channels
    }

    /// Produce as many output frames as the buffered input allows
    fn produce(&mut self, output: &mut [i16]) -> usize {
        let ch = self.channels;
        let capacity = output.len() / ch;
        let available = self.pending_frames();
        let mut produced = 0;

        while produced < capacity {
            let idx = self.pos as usize;
            if idx + 1 >= available {
                break;
            }
            let frac = self.pos - idx as f64;
            for c in 0..ch {
                let a = self.pending[idx * ch + c] as f64;
                let b = self.pending[(idx + 1) * ch + c] as f64;
                output[produced * ch + c] = (a + (b - a) * frac).round() as i16;
            }
            produced += 1;
            self.pos += self.step;
        }

        self.compact();
        produced
    }

    fn compact(&mut self) {
        let consumed = (self.pos as usize).min(self.pending_frames());
        if consumed > 0 {
            self.pending.drain(..consumed * self.channels);
            self.pos -= consumed as f64;
        }
    }
}

impl Resampler for LinearResampler {
    fn resample(&mut self, input: &[i16], output: &mut [i16]) -> (usize, usize) {
        let consumed = input.len() / self.channels;
        self.pending
            .extend_from_slice(&input[..consumed * self.channels]);
        let produced = self.produce(output);
        (consumed, produced)
    }

    fn resample_from_provider(
        &mut self,
        provider: &mut dyn FrameProvider,
        output: &mut [i16],
    ) -> HalResult<usize> {
        let ch = self.channels;
        let wanted = output.len() / ch;
        let mut produced = self.produce(output);

        while produced < wanted {
            let missing = wanted - produced;
            let request = (missing as f64 * self.step).ceil() as usize + 1;

            let buffer = provider.next_buffer(request)?;
            let frames = buffer.len() / ch;
            if frames == 0 {
                return Err(HalError::no_such_device("resampler provider returned no frames"));
            }
            self.pending.extend_from_slice(&buffer[..frames * ch]);
            provider.release_buffer(frames);

            produced += self.produce(&mut output[produced * ch..]);
        }
        Ok(produced)
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.pos = 0.0;
    }

    fn delay_ns(&self) -> i64 {
        let buffered = (self.pending_frames() as f64 - self.pos).max(0.0);
        (buffered * 1_000_000_000.0 / self.in_rate as f64) as i64
    }
}

/// Factory producing [`LinearResampler`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearResamplerFactory;

impl ResamplerFactory for LinearResamplerFactory {
    fn create(
        &self,
        in_rate: u32,
        out_rate: u32,
        channels: usize,
        _quality: ResamplerQuality,
    ) -> HalResult<Box<dyn Resampler>> {
        Ok(Box::new(LinearResampler::new(in_rate, out_rate, channels)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Provider handing out a ramp in chunks of at most `chunk` frames
    struct RampProvider {
        data: Vec<i16>,
        offset: usize,
        chunk: usize,
        channels: usize,
    }

    impl FrameProvider for RampProvider {
        fn next_buffer(&mut self, max_frames: usize) -> HalResult<&[i16]> {
            let frames = max_frames.min(self.chunk);
            let start = self.offset * self.channels;
            let end = (start + frames * self.channels).min(self.data.len());
            Ok(&self.data[start..end])
        }

        fn release_buffer(&mut self, frames: usize) {
            self.offset += frames;
        }
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        assert!(LinearResampler::new(0, 48000, 2).is_err());
        assert!(LinearResampler::new(48000, 16000, 0).is_err());
    }

    #[test]
    fn test_push_mode_upsample_ratio() {
        let mut resampler = LinearResampler::new(44100, 48000, 2).unwrap();
        let input = vec![100i16; 441 * 2];
        let mut output = vec![0i16; 1000 * 2];

        let (consumed, produced) = resampler.resample(&input, &mut output);
        assert_eq!(consumed, 441);
        // One input frame is held back for interpolation
        assert!(produced >= 478 && produced <= 480, "produced {}", produced);
        assert!(output[..produced * 2].iter().all(|&s| s == 100));
    }

    #[test]
    fn test_pull_mode_produces_exact_count() {
        let data: Vec<i16> = (0..10_000).map(|i| (i % 1000) as i16).collect();
        let mut provider = RampProvider {
            data,
            offset: 0,
            chunk: 64,
            channels: 1,
        };
        let mut resampler = LinearResampler::new(48000, 16000, 1).unwrap();
        let mut output = vec![0i16; 160];

        for _ in 0..5 {
            let produced = resampler.resample_from_provider(&mut provider, &mut output).unwrap();
            assert_eq!(produced, 160);
        }
        // Decimation by three walks the ramp in steps of three
        assert_eq!(output[1] - output[0], 3);
    }

    #[test]
    fn test_pull_mode_empty_provider_fails() {
        let mut provider = RampProvider {
            data: Vec::new(),
            offset: 0,
            chunk: 64,
            channels: 2,
        };
        let mut resampler = LinearResampler::new(48000, 44100, 2).unwrap();
        let mut output = vec![0i16; 64];
        assert!(resampler.resample_from_provider(&mut provider, &mut output).is_err());
    }

    #[test]
    fn test_delay_and_reset() {
        let mut resampler = LinearResampler::new(48000, 48000, 1).unwrap();
        let mut output = vec![0i16; 8];
        resampler.resample(&[1, 2, 3, 4], &mut output[..0]);
        assert_eq!(resampler.delay_ns(), 4 * 1_000_000_000 / 48000);

        resampler.reset();
        assert_eq!(resampler.delay_ns(), 0);
    }
}
