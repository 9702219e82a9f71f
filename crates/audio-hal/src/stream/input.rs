//! Input stream engine
//!
//! The capture endpoint opens on the first read after standby. Reads take
//! one of three paths depending on what the stream needs: a direct endpoint
//! read, rate conversion only, or the full pre-processing chain with echo
//! reference feeding and auxiliary channel stripping.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::config::HalConfig;
use crate::device::{DeviceShared, DeviceState};
use crate::echo::EchoReference;
use crate::effects::{EffectId, EffectKind, PreProcessor, PreprocessingChain};
use crate::error::{HalError, HalResult};
use crate::hal::{Direction, Endpoint, PcmConfig, Resampler, ResamplerFactory, ResamplerQuality};
use crate::params::{KEY_INPUT_SOURCE, KEY_ROUTING, Parameters};
use crate::route::ActiveCapture;
use crate::stream::buffer::{CapturePath, CaptureSource, FrameBuffer, frames_duration, frames_to_ns, strip_aux_channels};
use crate::stream::{ReadTier, check_input_parameters, input_buffer_size};
use crate::types::{ChannelConfig, ChannelMask, InputDevices, InputSource, StreamConfig};

/// Consecutive chain passes without output before a read gives up
const MAX_PROCESS_STALLS: usize = 8;

/// Mutable state guarded by the stream lock
pub(crate) struct InputInner {
    path: CapturePath,
    config: PcmConfig,
    aux_channels: ChannelMask,
    /// Auxiliary channels changed since the endpoint was last opened
    aux_changed: bool,
    device: InputDevices,
    source: InputSource,
    chain: PreprocessingChain,
    need_echo_reference: bool,
    echo_reference: Option<Arc<EchoReference>>,
    proc_in: FrameBuffer,
    proc_out: Vec<i16>,
    ref_buf: Vec<i16>,
}

impl InputInner {
    fn capture_channels(&self, main: ChannelMask) -> usize {
        (main.count() + self.aux_channels.count()) as usize
    }
}

/// Shared part of an input stream, registered with the coordinator
pub(crate) struct InputCore {
    pub(crate) id: Uuid,
    requested_rate: u32,
    main_channels: ChannelMask,
    standby: AtomicBool,
    pub(crate) inner: Mutex<InputInner>,
}

fn create_resampler(
    factory: &dyn ResamplerFactory,
    capture_rate: u32,
    requested_rate: u32,
    channels: usize,
) -> HalResult<Option<Box<dyn Resampler>>> {
    if capture_rate == requested_rate {
        return Ok(None);
    }
    factory
        .create(capture_rate, requested_rate, channels, ResamplerQuality::Default)
        .map(Some)
        .map_err(|e| HalError::resource_exhausted(format!("capture resampler: {}", e)))
}

impl InputCore {
    pub(crate) fn new(
        config: &HalConfig,
        factory: &dyn ResamplerFactory,
        device: InputDevices,
        requested: &StreamConfig,
        source: InputSource,
    ) -> HalResult<Self> {
        check_input_parameters(requested)?;
        let channels = requested.channel_count();
        let capture = &config.capture;
        let pcm_config = PcmConfig::new(channels, capture.rate, capture.period_size, capture.period_count);
        let resampler = create_resampler(factory, capture.rate, requested.sample_rate, channels)?;

        Ok(Self {
            id: Uuid::new_v4(),
            requested_rate: requested.sample_rate,
            main_channels: requested.channel_mask,
            standby: AtomicBool::new(true),
            inner: Mutex::new(InputInner {
                path: CapturePath {
                    source: None,
                    resampler,
                },
                config: pcm_config,
                aux_channels: ChannelMask::empty(),
                aux_changed: false,
                device,
                source,
                chain: PreprocessingChain::new(config.max_preprocessors),
                need_echo_reference: false,
                echo_reference: None,
                proc_in: FrameBuffer::new(channels),
                proc_out: Vec::new(),
                ref_buf: Vec::new(),
            }),
        })
    }

    pub(crate) fn is_standby(&self) -> bool {
        self.standby.load(Ordering::Acquire)
    }

    fn main_channel_count(&self) -> usize {
        self.main_channels.count() as usize
    }

    fn read_tier(&self, inner: &InputInner) -> ReadTier {
        if !inner.chain.is_empty() {
            ReadTier::Preprocess
        } else if inner.path.resampler.is_some() {
            ReadTier::ResampleOnly
        } else {
            ReadTier::Direct
        }
    }
}

/// Open the capture endpoint; caller holds the device and stream locks
fn start_input(
    shared: &DeviceShared,
    dev: &mut DeviceState,
    core: &Arc<InputCore>,
    inner: &mut InputInner,
) -> HalResult<()> {
    if inner.aux_changed {
        let channels = inner.capture_channels(core.main_channels);
        inner.config.channels = channels;
        inner.path.resampler =
            create_resampler(shared.resamplers.as_ref(), inner.config.rate, core.requested_rate, channels)?;
        inner.aux_changed = false;
        debug!(stream = %core.id, channels, aux = ?inner.aux_channels, "Capture channel count changed");
    }

    let previous_device = dev.routing.in_device;
    dev.active_input = Some(Arc::clone(core));
    dev.routing.active_input = Some(ActiveCapture {
        source: inner.source,
        main_channels: core.main_channels,
        aux_channels: inner.aux_channels,
    });
    if !dev.routing.in_call() {
        dev.routing.in_device = inner.device;
        shared.apply_input_routing(dev);
    }

    if inner.need_echo_reference && inner.echo_reference.is_none() {
        inner.echo_reference =
            DeviceShared::get_echo_reference(shared, dev, core.main_channel_count(), core.requested_rate);
    }

    let pcm = match shared.transport.open(Endpoint::CaptureUplink, Direction::Capture, &inner.config) {
        Ok(pcm) => pcm,
        Err(e) => {
            error!(stream = %core.id, error = %e, "Cannot open capture endpoint");
            dev.active_input = None;
            dev.routing.active_input = None;
            if !dev.routing.in_call() {
                dev.routing.in_device = previous_device;
                shared.apply_input_routing(dev);
            }
            if let Some(reference) = inner.echo_reference.take() {
                reference.stop_read();
                DeviceShared::put_echo_reference(shared, dev, &reference);
            }
            return Err(HalError::resource_exhausted("capture endpoint"));
        }
    };

    inner.path.source = Some(CaptureSource::new(pcm, inner.config.period_size, inner.config.channels));
    if let Some(resampler) = inner.path.resampler.as_mut() {
        resampler.reset();
    }
    let channels = inner.config.channels;
    inner.proc_in.reset(channels);
    info!(
        stream = %core.id,
        rate = inner.config.rate,
        channels,
        source = ?inner.source,
        echo_reference = inner.echo_reference.is_some(),
        "Capture started"
    );
    Ok(())
}

/// Close the capture endpoint; caller holds the device and stream locks
pub(crate) fn do_input_standby(shared: &DeviceShared, dev: &mut DeviceState, core: &InputCore, inner: &mut InputInner) {
    if core.is_standby() {
        return;
    }
    inner.path.source = None;

    if dev
        .active_input
        .as_ref()
        .is_some_and(|active| std::ptr::eq(Arc::as_ptr(active), core))
    {
        dev.active_input = None;
        dev.routing.active_input = None;
    }
    if !dev.routing.in_call() {
        dev.routing.in_device = InputDevices::empty();
        shared.apply_input_routing(dev);
    }

    if let Some(reference) = inner.echo_reference.take() {
        reference.stop_read();
        DeviceShared::put_echo_reference(shared, dev, &reference);
    }
    core.standby.store(true, Ordering::Release);
    debug!(stream = %core.id, "Input standby");
}

/// Renegotiate auxiliary channels after an effect or device change
fn update_aux_channels(
    shared: &DeviceShared,
    dev: &mut DeviceState,
    core: &InputCore,
    inner: &mut InputInner,
    added: Option<usize>,
) {
    let mut aux = inner
        .chain
        .negotiate_aux(core.main_channels, inner.device, &shared.config.aux_channel_configs);
    let changed = aux != inner.aux_channels;
    if let Err(e) = inner
        .chain
        .reconfigure(added, ChannelConfig::new(core.main_channels, aux), changed)
    {
        warn!(stream = %core.id, error = %e, "Auxiliary channel configuration failed, falling back to none");
        aux = ChannelMask::empty();
        if let Err(e) = inner
            .chain
            .reconfigure(None, ChannelConfig::new(core.main_channels, aux), true)
        {
            warn!(stream = %core.id, error = %e, "Effects reject the main channel configuration");
        }
    }

    if aux != inner.aux_channels {
        info!(stream = %core.id, from = ?inner.aux_channels, to = ?aux, "Auxiliary channels renegotiated");
        inner.aux_channels = aux;
        inner.aux_changed = true;
        do_input_standby(shared, dev, core, inner);
    }
}

/// Feed the echo reference covering the frames about to be processed
fn push_echo_reference(core: &InputCore, inner: &mut InputInner, capture_rate: u32) {
    let InputInner {
        path,
        chain,
        echo_reference,
        proc_in,
        ref_buf,
        ..
    } = inner;
    let Some(reference) = echo_reference else {
        return;
    };

    let channels = core.main_channel_count();
    let frames = proc_in.frames();
    ref_buf.resize(frames * channels, 0);

    let pending = match path.pending_delay_ns(capture_rate) {
        Ok(ns) => ns,
        Err(e) => {
            trace!(error = %e, "Capture delay unavailable");
            0
        }
    };
    let capture_delay = pending + frames_to_ns(frames, core.requested_rate);

    match reference.read(ref_buf, capture_delay) {
        Ok(read) if read.frames > 0 => {
            let delay_us = i32::try_from(read.delay_ns / 1000).unwrap_or(i32::MAX);
            chain.process_reverse(&ref_buf[..read.frames * channels], channels, delay_us);
        }
        Ok(_) => trace!("Echo reference empty"),
        Err(e) => trace!(error = %e, "Echo reference read failed"),
    }
}

/// Fill `output` with `frames` processed frames at the main channel count
fn process_frames(core: &InputCore, inner: &mut InputInner, output: &mut [i16], frames: usize) -> HalResult<()> {
    let main = core.main_channel_count();
    let capture = inner.capture_channels(core.main_channels);
    let capture_rate = inner.config.rate;
    let mut produced = 0;
    let mut stalls = 0;

    while produced < frames {
        let wanted = frames - produced;
        if inner.proc_in.frames() < wanted {
            let missing = wanted - inner.proc_in.frames();
            let InputInner { path, proc_in, .. } = &mut *inner;
            let read = path.read_frames(proc_in.spare(missing), capture)?;
            proc_in.commit(read);
        }

        if inner.echo_reference.is_some() {
            push_echo_reference(core, inner, capture_rate);
        }

        let InputInner {
            chain,
            proc_in,
            proc_out,
            aux_channels,
            ..
        } = &mut *inner;
        let (consumed, out_frames) = if aux_channels.is_empty() {
            chain.process(proc_in.filled(), &mut output[produced * main..frames * main], main)
        } else {
            proc_out.resize(wanted * capture, 0);
            let (consumed, out_frames) = chain.process(proc_in.filled(), proc_out, capture);
            strip_aux_channels(proc_out.as_slice(), capture, &mut output[produced * main..], main, out_frames);
            (consumed, out_frames)
        };
        proc_in.consume(consumed);

        if out_frames == 0 {
            stalls += 1;
            if stalls >= MAX_PROCESS_STALLS {
                warn!(stream = %core.id, produced, frames, "Pre-processing produced no output");
                output[produced * main..frames * main].fill(0);
                break;
            }
        } else {
            stalls = 0;
        }
        produced += out_frames.min(wanted);
    }
    Ok(())
}

/// A capture stream
///
/// Dropping the stream puts it in standby and unregisters it from the device.
pub struct InputStream {
    core: Arc<InputCore>,
    shared: Arc<DeviceShared>,
}

impl InputStream {
    pub(crate) fn new(core: Arc<InputCore>, shared: Arc<DeviceShared>) -> Self {
        Self { core, shared }
    }

    pub fn id(&self) -> Uuid {
        self.core.id
    }

    /// Fill `buffer` with interleaved frames; returns its byte count
    ///
    /// `buffer` must hold whole frames. Endpoint failures produce silence
    /// paced at the nominal capture duration. Only a failure to activate the
    /// stream is returned.
    pub fn read(&self, buffer: &mut [i16]) -> HalResult<usize> {
        let bytes = std::mem::size_of_val(buffer);
        let channels = self.core.main_channel_count();
        if buffer.len() % channels != 0 {
            return Err(HalError::invalid_argument(format!(
                "read of {} samples is not a whole number of {}-channel frames",
                buffer.len(),
                channels
            )));
        }
        let frames = buffer.len() / channels;
        let samples = buffer.len();

        let mut dev = self.shared.state.lock();
        let mut inner = self.core.inner.lock();
        if self.core.is_standby() {
            if let Err(e) = start_input(&self.shared, &mut dev, &self.core, &mut inner) {
                drop(inner);
                drop(dev);
                thread::sleep(frames_duration(frames, self.core.requested_rate));
                return Err(e);
            }
            self.core.standby.store(false, Ordering::Release);
        }
        drop(dev);

        let inner = &mut *inner;
        let result = match self.core.read_tier(inner) {
            ReadTier::Direct => match inner.path.source.as_mut() {
                Some(source) => source.read_direct(&mut buffer[..samples]),
                None => Err(HalError::no_such_device("capture endpoint closed")),
            },
            ReadTier::ResampleOnly => inner.path.read_frames(&mut buffer[..samples], channels).map(|_| ()),
            ReadTier::Preprocess => process_frames(&self.core, inner, &mut buffer[..samples], frames),
        };

        match result {
            Ok(()) => {
                if self.shared.mic_mute.load(Ordering::Acquire) {
                    buffer.fill(0);
                }
            }
            Err(e) => {
                trace!(stream = %self.core.id, error = %e, "Capture read failed");
                buffer.fill(0);
                thread::sleep(frames_duration(frames, self.core.requested_rate));
            }
        }
        Ok(bytes)
    }

    /// Close the capture endpoint until the next read
    pub fn standby(&self) {
        let mut dev = self.shared.state.lock();
        let mut inner = self.core.inner.lock();
        do_input_standby(&self.shared, &mut dev, &self.core, &mut inner);
    }

    /// Apply `input_source` and `routing` changes
    pub fn set_parameters(&self, kvpairs: &str) -> HalResult<()> {
        let params = Parameters::parse(kvpairs);
        let source = params.get_parsed::<u32>(KEY_INPUT_SOURCE)?;
        let routing = params.get_parsed::<u32>(KEY_ROUTING)?;

        let mut dev = self.shared.state.lock();
        let mut inner = self.core.inner.lock();
        let mut standby = false;

        if let Some(raw) = source {
            let source = InputSource::from_raw(raw);
            if raw != 0 && source != inner.source {
                debug!(stream = %self.core.id, from = ?inner.source, to = ?source, "Input source change");
                inner.source = source;
                standby = true;
            }
        }
        if let Some(raw) = routing {
            let device = InputDevices::from_raw(raw);
            if !device.is_empty() && device != inner.device {
                debug!(stream = %self.core.id, from = ?inner.device, to = ?device, "Input device change");
                inner.device = device;
                update_aux_channels(&self.shared, &mut dev, &self.core, &mut inner, None);
                standby = true;
            }
        }

        if standby {
            do_input_standby(&self.shared, &mut dev, &self.core, &mut inner);
        }
        Ok(())
    }

    /// Attach a pre-processing effect
    pub fn add_effect(&self, effect: Box<dyn PreProcessor>) -> HalResult<EffectId> {
        let id = effect.id();
        let mut dev = self.shared.state.lock();
        let mut inner = self.core.inner.lock();

        let tier = self.core.read_tier(&inner);
        let index = inner.chain.attach(effect)?;
        let kind = inner.chain.kind_of(index);
        update_aux_channels(&self.shared, &mut dev, &self.core, &mut inner, Some(index));
        if self.core.read_tier(&inner) != tier {
            do_input_standby(&self.shared, &mut dev, &self.core, &mut inner);
        }

        if kind == Some(EffectKind::AcousticEchoCanceler) {
            inner.need_echo_reference = true;
            do_input_standby(&self.shared, &mut dev, &self.core, &mut inner);
            if let Err(e) = inner.chain.configure_reverse(self.core.main_channels, self.core.requested_rate) {
                warn!(stream = %self.core.id, error = %e, "Reverse stream not configured");
            }
        }
        info!(stream = %self.core.id, effect = %id, ?kind, "Effect added");
        Ok(id)
    }

    /// Detach a pre-processing effect and hand it back
    pub fn remove_effect(&self, id: EffectId) -> HalResult<Box<dyn PreProcessor>> {
        let mut dev = self.shared.state.lock();
        let mut inner = self.core.inner.lock();

        let tier = self.core.read_tier(&inner);
        let effect = inner.chain.detach(id)?;
        update_aux_channels(&self.shared, &mut dev, &self.core, &mut inner, None);
        // Buffered frames belong to the old read path
        if self.core.read_tier(&inner) != tier {
            do_input_standby(&self.shared, &mut dev, &self.core, &mut inner);
        }

        if effect.kind() == EffectKind::AcousticEchoCanceler {
            inner.need_echo_reference = false;
            do_input_standby(&self.shared, &mut dev, &self.core, &mut inner);
        }
        info!(stream = %self.core.id, effect = %id, "Effect removed");
        Ok(effect)
    }

    pub fn sample_rate(&self) -> u32 {
        self.core.requested_rate
    }

    pub fn channel_mask(&self) -> ChannelMask {
        self.core.main_channels
    }

    /// Auxiliary channels negotiated with the attached effects
    pub fn aux_channels(&self) -> ChannelMask {
        self.core.inner.lock().aux_channels
    }

    /// Preferred read size in bytes
    pub fn buffer_size(&self) -> usize {
        let config = StreamConfig::new(self.core.requested_rate, self.core.main_channels);
        input_buffer_size(&self.shared.config.capture, &config)
    }

    /// Path the next read takes
    pub fn read_tier(&self) -> ReadTier {
        let inner = self.core.inner.lock();
        self.core.read_tier(&inner)
    }

    pub fn is_standby(&self) -> bool {
        self.core.is_standby()
    }

    /// Overruns are not tracked
    pub fn frames_lost(&self) -> u32 {
        0
    }
}

impl Drop for InputStream {
    fn drop(&mut self) {
        let mut dev = self.shared.state.lock();
        {
            let mut inner = self.core.inner.lock();
            do_input_standby(&self.shared, &mut dev, &self.core, &mut inner);
        }
        if dev.input.as_ref().is_some_and(|c| Arc::ptr_eq(c, &self.core)) {
            dev.input = None;
        }
        info!(stream = %self.core.id, "Input stream closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::LinearResamplerFactory;

    fn core(rate: u32, mask: ChannelMask) -> InputCore {
        InputCore::new(
            &HalConfig::default(),
            &LinearResamplerFactory,
            InputDevices::BUILTIN_MIC,
            &StreamConfig::new(rate, mask),
            InputSource::Mic,
        )
        .unwrap()
    }

    #[test]
    fn test_tier_follows_configuration() {
        let native = core(48000, ChannelMask::IN_MONO);
        assert_eq!(native.read_tier(&native.inner.lock()), ReadTier::Direct);

        let resampled = core(16000, ChannelMask::IN_MONO);
        assert_eq!(resampled.read_tier(&resampled.inner.lock()), ReadTier::ResampleOnly);

        let mut inner = resampled.inner.lock();
        inner
            .chain
            .attach(Box::new(crate::mock::MockEffect::noise_suppressor()))
            .unwrap();
        assert_eq!(resampled.read_tier(&inner), ReadTier::Preprocess);
    }

    #[test]
    fn test_rejects_unsupported_request() {
        let result = InputCore::new(
            &HalConfig::default(),
            &LinearResamplerFactory,
            InputDevices::BUILTIN_MIC,
            &StreamConfig::new(12345, ChannelMask::IN_MONO),
            InputSource::Mic,
        );
        assert!(matches!(result, Err(HalError::InvalidArgument { .. })));
    }

    #[test]
    fn test_capture_channels_include_aux() {
        let stream = core(48000, ChannelMask::IN_MONO);
        let mut inner = stream.inner.lock();
        assert_eq!(inner.capture_channels(ChannelMask::IN_MONO), 1);
        inner.aux_channels = ChannelMask::IN_BACK;
        assert_eq!(inner.capture_channels(ChannelMask::IN_MONO), 2);
    }
}
