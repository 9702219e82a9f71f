//! Capture pre-processing
//!
//! An input stream carries an ordered, bounded [`PreprocessingChain`] of
//! [`PreProcessor`] effects (echo cancellation, noise suppression, gain
//! control). The chain negotiates auxiliary capture channels: an effect may
//! declare that it can use extra microphones on top of the requested main
//! channels, and the stream captures the richest layout every attached
//! effect and the driver agree on.

use std::fmt;

use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::error::{HalError, HalResult};
use crate::types::{ChannelConfig, ChannelMask, InputDevices};

/// Identifier of an attached effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectId(pub Uuid);

impl EffectId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EffectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Effect family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectKind {
    AcousticEchoCanceler,
    NoiseSuppressor,
    AutomaticGainControl,
    Other,
}

/// Effect parameters set by the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectParam {
    /// Echo path delay in microseconds
    EchoDelay(i32),
}

/// Outcome of one process call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Frames consumed from the input and produced into the output
    Processed { consumed: usize, produced: usize },
    /// The effect left the signal to later stages
    PassThrough,
}

/// A capture-side signal processing effect
pub trait PreProcessor: Send {
    fn id(&self) -> EffectId;

    fn kind(&self) -> EffectKind;

    /// (main, aux) layouts the effect can process. An error means the effect
    /// only handles the main channels.
    fn channel_configs(&self) -> HalResult<Vec<ChannelConfig>>;

    /// Configure input and output channels
    fn configure(&mut self, config: ChannelConfig) -> HalResult<()>;

    /// Whether the effect consumes a reverse (echo reference) stream
    fn supports_reverse(&self) -> bool {
        false
    }

    /// Configure the reverse stream format
    fn configure_reverse(&mut self, _channels: ChannelMask, _sample_rate: u32) -> HalResult<()> {
        Err(HalError::unsupported("reverse stream"))
    }

    /// Process interleaved frames of `channels` channels
    fn process(&mut self, input: &[i16], output: &mut [i16], channels: usize) -> ProcessOutcome;

    /// Feed reference frames
    fn process_reverse(&mut self, _reference: &[i16], _channels: usize) -> HalResult<()> {
        Ok(())
    }

    fn set_parameter(&mut self, param: EffectParam) -> HalResult<()>;
}

struct EffectEntry {
    effect: Box<dyn PreProcessor>,
    /// Empty when the effect supports no auxiliary channels
    channel_configs: Vec<ChannelConfig>,
}

/// Ordered effects attached to one input stream
pub struct PreprocessingChain {
    entries: Vec<EffectEntry>,
    capacity: usize,
    stage: Vec<i16>,
}

impl fmt::Debug for PreprocessingChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreprocessingChain")
            .field("effects", &self.ids())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl PreprocessingChain {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            stage: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Ids in processing order
    pub fn ids(&self) -> Vec<EffectId> {
        self.entries.iter().map(|e| e.effect.id()).collect()
    }

    /// True when any attached effect consumes a reverse stream
    pub fn has_reverse(&self) -> bool {
        self.entries.iter().any(|e| e.effect.supports_reverse())
    }

    /// Append an effect; returns its position
    pub fn attach(&mut self, effect: Box<dyn PreProcessor>) -> HalResult<usize> {
        if self.entries.len() >= self.capacity {
            return Err(HalError::resource_exhausted(format!(
                "pre-processing chain full ({} effects)",
                self.capacity
            )));
        }

        let channel_configs = match effect.channel_configs() {
            Ok(configs) => configs,
            Err(e) => {
                trace!(effect = %effect.id(), error = %e, "Effect declares no auxiliary channel support");
                Vec::new()
            }
        };
        debug!(effect = %effect.id(), kind = ?effect.kind(), configs = channel_configs.len(), "Attached effect");
        self.entries.push(EffectEntry {
            effect,
            channel_configs,
        });
        Ok(self.entries.len() - 1)
    }

    /// Remove an effect, keeping the order of the others
    pub fn detach(&mut self, id: EffectId) -> HalResult<Box<dyn PreProcessor>> {
        if self.entries.is_empty() {
            return Err(HalError::not_found(format!("effect {} (no effects attached)", id)));
        }
        let index = self
            .entries
            .iter()
            .position(|e| e.effect.id() == id)
            .ok_or_else(|| HalError::not_found(format!("effect {}", id)))?;
        debug!(effect = %id, index, "Detached effect");
        Ok(self.entries.remove(index).effect)
    }

    /// Kind of an attached effect
    pub fn kind_of(&self, index: usize) -> Option<EffectKind> {
        self.entries.get(index).map(|e| e.effect.kind())
    }

    /// Richest auxiliary channel set supported by the driver and every effect
    ///
    /// `candidates` are the driver's (main, aux) layouts in preference order;
    /// ties on auxiliary channel count keep the earlier candidate. Dual-mic
    /// layouts only apply to the built-in and back microphones.
    pub fn negotiate_aux(
        &self,
        main_channels: ChannelMask,
        device: InputDevices,
        candidates: &[ChannelConfig],
    ) -> ChannelMask {
        if self.entries.is_empty() {
            return ChannelMask::empty();
        }
        if !device.intersects(InputDevices::BUILTIN_MIC | InputDevices::BACK_MIC) {
            return ChannelMask::empty();
        }

        let mut best = ChannelMask::empty();
        for candidate in candidates.iter().filter(|c| c.main == main_channels) {
            let supported = self
                .entries
                .iter()
                .all(|e| e.channel_configs.contains(candidate));
            if supported && candidate.aux.count() > best.count() {
                best = candidate.aux;
            }
        }
        trace!(main = ?main_channels, aux = ?best, "Negotiated auxiliary channels");
        best
    }

    /// Push a channel configuration to the effects
    ///
    /// When `changed`, every effect is reconfigured; otherwise only the newly
    /// attached effect at `added`, and only when auxiliary channels are in use.
    /// Returns the last failure, after attempting every effect.
    pub fn reconfigure(&mut self, added: Option<usize>, config: ChannelConfig, changed: bool) -> HalResult<()> {
        let mut status = Ok(());
        if changed {
            for entry in &mut self.entries {
                if let Err(e) = entry.effect.configure(config) {
                    debug!(effect = %entry.effect.id(), error = %e, "Effect channel configuration failed");
                    status = Err(e);
                }
            }
        } else if let Some(index) = added {
            if !config.aux.is_empty() {
                if let Some(entry) = self.entries.get_mut(index) {
                    status = entry.effect.configure(config);
                }
            }
        }
        status
    }

    /// Configure the reverse stream of every effect that takes one
    pub fn configure_reverse(&mut self, channels: ChannelMask, sample_rate: u32) -> HalResult<()> {
        let mut status = Ok(());
        for entry in self.entries.iter_mut().filter(|e| e.effect.supports_reverse()) {
            if let Err(e) = entry.effect.configure_reverse(channels, sample_rate) {
                warn!(effect = %entry.effect.id(), error = %e, "Reverse stream configuration failed");
                status = Err(e);
            }
        }
        status
    }

    /// Feed reference frames and the current echo delay to reverse-capable effects
    pub fn process_reverse(&mut self, reference: &[i16], channels: usize, delay_us: i32) {
        for entry in self.entries.iter_mut().filter(|e| e.effect.supports_reverse()) {
            if let Err(e) = entry.effect.process_reverse(reference, channels) {
                trace!(effect = %entry.effect.id(), error = %e, "Reverse processing failed");
            }
            if let Err(e) = entry.effect.set_parameter(EffectParam::EchoDelay(delay_us)) {
                trace!(effect = %entry.effect.id(), error = %e, "Echo delay rejected");
            }
        }
    }

    /// Run the chain over `input`, writing into `output`
    ///
    /// The first effect that processes reads the stream input; each later
    /// effect that processes reads the previous stage's output. Effects that
    /// pass through are skipped. If no effect processes, input is copied.
    /// Returns (frames consumed from `input`, frames produced).
    pub fn process(&mut self, input: &[i16], output: &mut [i16], channels: usize) -> (usize, usize) {
        let mut consumed = None;
        let mut produced = 0;

        for entry in &mut self.entries {
            match consumed {
                None => {
                    if let ProcessOutcome::Processed { consumed: c, produced: p } =
                        entry.effect.process(input, output, channels)
                    {
                        consumed = Some(c);
                        produced = p;
                    }
                }
                Some(_) => {
                    self.stage.clear();
                    self.stage.extend_from_slice(&output[..produced * channels]);
                    if let ProcessOutcome::Processed { produced: p, .. } =
                        entry.effect.process(&self.stage, output, channels)
                    {
                        produced = p;
                    }
                }
            }
        }

        match consumed {
            Some(consumed) => (consumed, produced),
            None => {
                let frames = (input.len() / channels).min(output.len() / channels);
                output[..frames * channels].copy_from_slice(&input[..frames * channels]);
                (frames, frames)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockEffect;

    fn dual_mic() -> ChannelConfig {
        ChannelConfig::new(ChannelMask::IN_FRONT, ChannelMask::IN_BACK)
    }

    fn candidates() -> Vec<ChannelConfig> {
        vec![
            dual_mic(),
            ChannelConfig::new(ChannelMask::IN_STEREO, ChannelMask::IN_RIGHT),
        ]
    }

    #[test]
    fn test_attach_respects_capacity() {
        let mut chain = PreprocessingChain::new(2);
        chain.attach(Box::new(MockEffect::noise_suppressor())).unwrap();
        chain.attach(Box::new(MockEffect::noise_suppressor())).unwrap();
        let err = chain.attach(Box::new(MockEffect::noise_suppressor())).unwrap_err();
        assert!(matches!(err, HalError::ResourceExhausted { .. }));
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_detach_compacts_in_order() {
        let mut chain = PreprocessingChain::new(3);
        let effects: Vec<MockEffect> = (0..3).map(|_| MockEffect::noise_suppressor()).collect();
        let ids: Vec<EffectId> = effects.iter().map(|e| e.id()).collect();
        for effect in effects {
            chain.attach(Box::new(effect)).unwrap();
        }

        chain.detach(ids[1]).unwrap();
        assert_eq!(chain.ids(), vec![ids[0], ids[2]]);
        assert!(matches!(chain.detach(ids[1]), Err(HalError::NotFound { .. })));
    }

    #[test]
    fn test_detach_from_empty_chain() {
        let mut chain = PreprocessingChain::new(3);
        assert!(matches!(chain.detach(EffectId::new()), Err(HalError::NotFound { .. })));
    }

    #[test]
    fn test_negotiation_picks_common_dual_mic() {
        let mut chain = PreprocessingChain::new(3);
        chain
            .attach(Box::new(MockEffect::echo_canceller().with_channel_configs(vec![dual_mic()])))
            .unwrap();
        chain
            .attach(Box::new(MockEffect::noise_suppressor().with_channel_configs(vec![dual_mic()])))
            .unwrap();

        let aux = chain.negotiate_aux(ChannelMask::IN_FRONT, InputDevices::BUILTIN_MIC, &candidates());
        assert_eq!(aux, ChannelMask::IN_BACK);

        // Headset mic never gets dual-mic layouts
        let aux = chain.negotiate_aux(ChannelMask::IN_FRONT, InputDevices::WIRED_HEADSET, &candidates());
        assert!(aux.is_empty());
    }

    #[test]
    fn test_negotiation_without_common_layout() {
        let mut chain = PreprocessingChain::new(3);
        let stereo_aux = ChannelConfig::new(ChannelMask::IN_STEREO, ChannelMask::IN_RIGHT);
        chain
            .attach(Box::new(MockEffect::noise_suppressor().with_channel_configs(vec![stereo_aux])))
            .unwrap();
        chain
            .attach(Box::new(MockEffect::noise_suppressor().without_aux_support()))
            .unwrap();

        let aux = chain.negotiate_aux(ChannelMask::IN_STEREO, InputDevices::BUILTIN_MIC, &candidates());
        assert!(aux.is_empty());
    }

    #[test]
    fn test_tie_keeps_first_candidate() {
        let mut chain = PreprocessingChain::new(1);
        let first = ChannelConfig::new(ChannelMask::IN_FRONT, ChannelMask::IN_BACK);
        let second = ChannelConfig::new(ChannelMask::IN_FRONT, ChannelMask::IN_RIGHT);
        chain
            .attach(Box::new(MockEffect::noise_suppressor().with_channel_configs(vec![second, first])))
            .unwrap();

        let aux = chain.negotiate_aux(ChannelMask::IN_FRONT, InputDevices::BACK_MIC, &[first, second]);
        assert_eq!(aux, ChannelMask::IN_BACK);
    }

    #[test]
    fn test_passthrough_chain_copies_input() {
        let mut chain = PreprocessingChain::new(2);
        chain.attach(Box::new(MockEffect::noise_suppressor().passthrough())).unwrap();

        let input = [1i16, 2, 3, 4];
        let mut output = [0i16; 2];
        assert_eq!(chain.process(&input, &mut output, 1), (2, 2));
        assert_eq!(output, [1, 2]);
    }

    #[test]
    fn test_later_stage_reads_previous_output() {
        let mut chain = PreprocessingChain::new(2);
        chain.attach(Box::new(MockEffect::noise_suppressor().with_gain(2))).unwrap();
        chain.attach(Box::new(MockEffect::noise_suppressor().with_gain(3))).unwrap();

        let input = [1i16, 2, 3];
        let mut output = [0i16; 3];
        assert_eq!(chain.process(&input, &mut output, 1), (3, 3));
        assert_eq!(output, [6, 12, 18]);
    }

    #[test]
    fn test_reconfigure_reports_failure_after_trying_all() {
        let mut chain = PreprocessingChain::new(2);
        let good = MockEffect::noise_suppressor();
        let good_stats = good.stats();
        chain.attach(Box::new(MockEffect::noise_suppressor().failing_configuration())).unwrap();
        chain.attach(Box::new(good)).unwrap();

        assert!(chain.reconfigure(None, dual_mic(), true).is_err());
        assert_eq!(good_stats.configured(), vec![dual_mic()]);
    }
}
