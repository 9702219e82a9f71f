//! Scriptable pre-processing effect

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::effects::{EffectId, EffectKind, EffectParam, PreProcessor, ProcessOutcome};
use crate::error::{HalError, HalResult};
use crate::types::{ChannelConfig, ChannelMask};

/// Counters shared between a [`MockEffect`] and the test holding it
#[derive(Debug, Default)]
pub struct MockEffectStats {
    process_calls: AtomicUsize,
    reverse_frames: AtomicUsize,
    configured: Mutex<Vec<ChannelConfig>>,
    last_echo_delay: Mutex<Option<i32>>,
    reverse_config: Mutex<Option<(ChannelMask, u32)>>,
}

impl MockEffectStats {
    pub fn process_calls(&self) -> usize {
        self.process_calls.load(Ordering::SeqCst)
    }

    /// Reference frames fed through the reverse stream
    pub fn reverse_frames(&self) -> usize {
        self.reverse_frames.load(Ordering::SeqCst)
    }

    /// Channel configurations applied, in order
    pub fn configured(&self) -> Vec<ChannelConfig> {
        self.configured.lock().clone()
    }

    pub fn last_echo_delay(&self) -> Option<i32> {
        *self.last_echo_delay.lock()
    }

    pub fn reverse_config(&self) -> Option<(ChannelMask, u32)> {
        *self.reverse_config.lock()
    }
}

#[derive(Debug, Clone, Copy)]
enum Behavior {
    /// Copy input to output scaled by the gain
    Scale(i16),
    PassThrough,
}

/// Effect with declared channel layouts and a trivial signal transform
#[derive(Debug)]
pub struct MockEffect {
    id: EffectId,
    kind: EffectKind,
    /// `None` declares no auxiliary channel support at all
    channel_configs: Option<Vec<ChannelConfig>>,
    behavior: Behavior,
    fail_configure: bool,
    stats: Arc<MockEffectStats>,
}

impl MockEffect {
    fn new(kind: EffectKind) -> Self {
        Self {
            id: EffectId::new(),
            kind,
            channel_configs: Some(Vec::new()),
            behavior: Behavior::Scale(1),
            fail_configure: false,
            stats: Arc::new(MockEffectStats::default()),
        }
    }

    pub fn noise_suppressor() -> Self {
        Self::new(EffectKind::NoiseSuppressor)
    }

    /// Echo canceller consuming a reverse stream
    pub fn echo_canceller() -> Self {
        Self::new(EffectKind::AcousticEchoCanceler)
    }

    pub fn gain_control() -> Self {
        Self::new(EffectKind::AutomaticGainControl)
    }

    /// Declare supported (main, aux) layouts
    pub fn with_channel_configs(mut self, configs: Vec<ChannelConfig>) -> Self {
        self.channel_configs = Some(configs);
        self
    }

    /// Reject the channel configuration query
    pub fn without_aux_support(mut self) -> Self {
        self.channel_configs = None;
        self
    }

    /// Leave the signal to later stages
    pub fn passthrough(mut self) -> Self {
        self.behavior = Behavior::PassThrough;
        self
    }

    /// Scale samples by `gain`
    pub fn with_gain(mut self, gain: i16) -> Self {
        self.behavior = Behavior::Scale(gain);
        self
    }

    /// Fail every channel configuration
    pub fn failing_configuration(mut self) -> Self {
        self.fail_configure = true;
        self
    }

    pub fn id(&self) -> EffectId {
        self.id
    }

    pub fn stats(&self) -> Arc<MockEffectStats> {
        Arc::clone(&self.stats)
    }
}

impl PreProcessor for MockEffect {
    fn id(&self) -> EffectId {
        self.id
    }

    fn kind(&self) -> EffectKind {
        self.kind
    }

    fn channel_configs(&self) -> HalResult<Vec<ChannelConfig>> {
        self.channel_configs
            .clone()
            .ok_or_else(|| HalError::unsupported("auxiliary channel configurations"))
    }

    fn configure(&mut self, config: ChannelConfig) -> HalResult<()> {
        if self.fail_configure {
            return Err(HalError::invalid_argument("mock effect rejects configuration"));
        }
        self.stats.configured.lock().push(config);
        Ok(())
    }

    fn supports_reverse(&self) -> bool {
        self.kind == EffectKind::AcousticEchoCanceler
    }

    fn configure_reverse(&mut self, channels: ChannelMask, sample_rate: u32) -> HalResult<()> {
        if !self.supports_reverse() {
            return Err(HalError::unsupported("reverse stream"));
        }
        *self.stats.reverse_config.lock() = Some((channels, sample_rate));
        Ok(())
    }

    fn process(&mut self, input: &[i16], output: &mut [i16], channels: usize) -> ProcessOutcome {
        self.stats.process_calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::PassThrough => ProcessOutcome::PassThrough,
            Behavior::Scale(gain) => {
                let frames = (input.len() / channels).min(output.len() / channels);
                let samples = frames * channels;
                for (out, &sample) in output[..samples].iter_mut().zip(&input[..samples]) {
                    *out = sample.saturating_mul(gain);
                }
                ProcessOutcome::Processed {
                    consumed: frames,
                    produced: frames,
                }
            }
        }
    }

    fn process_reverse(&mut self, reference: &[i16], channels: usize) -> HalResult<()> {
        self.stats
            .reverse_frames
            .fetch_add(reference.len() / channels.max(1), Ordering::SeqCst);
        Ok(())
    }

    fn set_parameter(&mut self, param: EffectParam) -> HalResult<()> {
        match param {
            EffectParam::EchoDelay(delay_us) => *self.stats.last_echo_delay.lock() = Some(delay_us),
        }
        Ok(())
    }
}
