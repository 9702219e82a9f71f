//! Output stream engine
//!
//! Three variants share one engine:
//! - low latency: tones front end, duplicated to S/PDIF and HDMI when those
//!   sinks are selected; the only source of the echo reference
//! - deep buffer: multimedia front end with memory-mapped transfers, paced on
//!   kernel buffer occupancy
//! - HDMI: multichannel output on the digital card
//!
//! A stream sits in standby until its first write, which opens the endpoints
//! for the current routing. Activation and standby run with the device lock
//! held; the transfer itself only holds the stream lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::config::{HalConfig, PlaybackConfig};
use crate::device::{DeviceShared, DeviceState};
use crate::echo::EchoReference;
use crate::error::{HalError, HalResult};
use crate::hal::{Direction, Endpoint, Mixer, Pcm, PcmConfig, ResamplerQuality};
use crate::params::{KEY_ROUTING, KEY_SUP_CHANNELS, Parameters};
use crate::route::table;
use crate::stream::buffer::{PlaybackConverter, frames_duration, frames_to_ns, round_up_16};
use crate::types::{ChannelMask, InputSource, OutputDevices, OutputVariant, StreamConfig};

/// Whether activating `activating` forces `other` into standby
///
/// Multichannel HDMI takes the digital card away from the low-latency
/// stream's HDMI duplication.
pub fn activation_forces_standby(activating: OutputVariant, other: OutputVariant) -> bool {
    matches!((activating, other), (OutputVariant::Hdmi, OutputVariant::LowLatency))
}

/// Whether `entering` going to standby forces `other` into standby
///
/// When HDMI stops, the low-latency stream restarts so it can reclaim the
/// digital card for duplication.
pub fn standby_forces_standby(entering: OutputVariant, other: OutputVariant) -> bool {
    matches!((entering, other), (OutputVariant::Hdmi, OutputVariant::LowLatency))
}

/// Whether a device change on the active low-latency stream requires
/// reopening its endpoints
pub fn routing_change_forces_standby(current: OutputDevices, new: OutputDevices, in_call: bool) -> bool {
    let toggles = |mask: OutputDevices| (current & mask) != (new & mask);
    toggles(OutputDevices::AUX_DIGITAL)
        || toggles(OutputDevices::DGTL_DOCK_HEADSET)
        || current.intersects(OutputDevices::DIGITAL)
        || toggles(OutputDevices::SPEAKER)
        || in_call
}

/// Endpoint rate used for a stream's nominal rate
fn endpoint_rate(playback: &PlaybackConfig, stream_rate: u32) -> u32 {
    if !playback.variable_sampling_rate || stream_rate % 48 == 0 {
        playback.full_power_rate
    } else {
        playback.low_power_rate
    }
}

/// Rate used to convert kernel frame counts to time
fn timing_rate(playback: &PlaybackConfig, stream_rate: u32) -> u32 {
    if playback.variable_sampling_rate {
        stream_rate
    } else {
        playback.full_power_rate
    }
}

/// Supported multichannel layouts of the connected HDMI sink
pub fn hdmi_channel_masks(mixer: &dyn Mixer, control: &str) -> HalResult<Vec<ChannelMask>> {
    let ctl = mixer
        .control(control)
        .ok_or_else(|| HalError::unsupported(format!("HDMI control '{}' not found", control)))?;
    match mixer.value(ctl, 0)? {
        6 => Ok(vec![ChannelMask::OUT_5POINT1]),
        8 => Ok(vec![ChannelMask::OUT_5POINT1, ChannelMask::OUT_7POINT1]),
        other => Err(HalError::unsupported(format!(
            "HDMI sink reports {} LPCM channels",
            other
        ))),
    }
}

struct ActiveEndpoint {
    endpoint: Endpoint,
    pcm: Box<dyn Pcm>,
    rate: u32,
}

/// Mutable state guarded by the stream lock
pub(crate) struct OutputInner {
    endpoints: Vec<ActiveEndpoint>,
    converter: PlaybackConverter,
    pub(crate) echo_reference: Option<Arc<EchoReference>>,
    write_threshold: usize,
    use_long_periods: bool,
    muted: bool,
    /// Writes left before the HDMI endpoint is reopened
    restart_periods: usize,
    silence: Vec<i16>,
}

/// Shared part of an output stream, registered with the coordinator
pub(crate) struct OutputCore {
    pub(crate) id: Uuid,
    pub(crate) variant: OutputVariant,
    sample_rate: u32,
    channel_mask: ChannelMask,
    sup_channel_masks: Vec<ChannelMask>,
    hdmi_config: Option<PcmConfig>,
    standby: AtomicBool,
    pub(crate) inner: Mutex<OutputInner>,
}

impl OutputCore {
    /// Negotiate the stream configuration for `variant`
    pub(crate) fn new(
        config: &HalConfig,
        hdmi_mixer: Option<&dyn Mixer>,
        variant: OutputVariant,
        requested: &StreamConfig,
    ) -> HalResult<Self> {
        let playback = &config.playback;
        let mut restart_periods = 0;
        let mut hdmi_config = None;

        let (sample_rate, channel_mask, sup_channel_masks) = match variant {
            OutputVariant::LowLatency | OutputVariant::DeepBuffer => {
                let rate = if playback.variable_sampling_rate {
                    if requested.sample_rate != 0 {
                        requested.sample_rate
                    } else {
                        playback.low_power_rate
                    }
                } else {
                    playback.default_rate
                };
                (rate, ChannelMask::OUT_STEREO, vec![ChannelMask::OUT_STEREO])
            }
            OutputVariant::Hdmi => {
                let mixer = hdmi_mixer.ok_or_else(|| HalError::unsupported("no HDMI mixer"))?;
                let masks = hdmi_channel_masks(mixer, &config.hdmi.max_channels_control)?;
                let mask = if requested.channel_mask.is_empty() {
                    ChannelMask::OUT_5POINT1
                } else if masks.contains(&requested.channel_mask) {
                    requested.channel_mask
                } else {
                    return Err(HalError::invalid_argument(format!(
                        "unsupported HDMI channel mask {:?}",
                        requested.channel_mask
                    )));
                };
                let rate = if requested.sample_rate != 0 {
                    requested.sample_rate
                } else {
                    playback.full_power_rate
                };
                hdmi_config = Some(PcmConfig::new(
                    mask.count() as usize,
                    rate,
                    config.hdmi.period_size,
                    config.hdmi.period_count,
                ));
                restart_periods = config.hdmi.period_count * 2;
                (rate, mask, masks)
            }
        };

        Ok(Self {
            id: Uuid::new_v4(),
            variant,
            sample_rate,
            channel_mask,
            sup_channel_masks,
            hdmi_config,
            standby: AtomicBool::new(true),
            inner: Mutex::new(OutputInner {
                endpoints: Vec::new(),
                converter: PlaybackConverter::default(),
                echo_reference: None,
                write_threshold: 0,
                use_long_periods: false,
                muted: false,
                restart_periods,
                silence: Vec::new(),
            }),
        })
    }

    pub(crate) fn is_standby(&self) -> bool {
        self.standby.load(Ordering::Acquire)
    }

    fn channel_count(&self) -> usize {
        self.channel_mask.count() as usize
    }

    /// Negotiated configuration reported to the opener
    pub(crate) fn stream_config(&self) -> StreamConfig {
        StreamConfig::new(self.sample_rate, self.channel_mask)
    }
}

/// Open the endpoints for the current routing; caller holds the device and stream locks
fn start(shared: &DeviceShared, dev: &DeviceState, core: &OutputCore, inner: &mut OutputInner) -> HalResult<()> {
    for other in OutputVariant::ALL {
        if !activation_forces_standby(core.variant, other) {
            continue;
        }
        if let Some(other_core) = dev.output(other) {
            if !other_core.is_standby() {
                debug!(stream = %core.id, variant = %core.variant, other = %other, "Activation forces standby");
                let mut other_inner = other_core.inner.lock();
                do_output_standby(shared, dev, &other_core, &mut other_inner);
            }
        }
    }

    match core.variant {
        OutputVariant::LowLatency => start_low_latency(shared, dev, core, inner),
        OutputVariant::DeepBuffer => start_deep_buffer(shared, dev, core, inner),
        OutputVariant::Hdmi => start_hdmi(shared, core, inner),
    }
}

fn open_endpoints(
    shared: &DeviceShared,
    core: &OutputCore,
    wanted: &[(Endpoint, PcmConfig)],
) -> HalResult<Vec<ActiveEndpoint>> {
    let mut endpoints = Vec::with_capacity(wanted.len());
    for (endpoint, config) in wanted {
        match shared.transport.open(*endpoint, Direction::Playback, config) {
            Ok(pcm) => endpoints.push(ActiveEndpoint {
                endpoint: *endpoint,
                pcm,
                rate: config.rate,
            }),
            Err(e) => {
                error!(stream = %core.id, ?endpoint, error = %e, "Cannot open playback endpoint");
                // Already opened endpoints close on drop
                return Err(HalError::resource_exhausted(format!("{:?} playback endpoint", endpoint)));
            }
        }
    }
    Ok(endpoints)
}

/// Converter for endpoints not running at the nominal rate
fn converter_for(shared: &DeviceShared, core: &OutputCore, endpoints: &[ActiveEndpoint]) -> HalResult<PlaybackConverter> {
    let Some(rate) = endpoints.iter().map(|e| e.rate).find(|&r| r != core.sample_rate) else {
        return Ok(PlaybackConverter::default());
    };
    let resampler = shared
        .resamplers
        .create(core.sample_rate, rate, core.channel_count(), ResamplerQuality::Default)
        .map_err(|e| HalError::resource_exhausted(format!("output resampler: {}", e)))?;
    let period = shared.config.playback.deep_short_period_size.max(shared.config.playback.short_period_size);
    Ok(PlaybackConverter::new(resampler, period * 2 * core.channel_count()))
}

fn start_low_latency(
    shared: &DeviceShared,
    dev: &DeviceState,
    core: &OutputCore,
    inner: &mut OutputInner,
) -> HalResult<()> {
    if !dev.routing.in_call() {
        shared.apply_output_routing(dev);
    }

    let playback = &shared.config.playback;
    let tones = PcmConfig::new(
        core.channel_count(),
        endpoint_rate(playback, core.sample_rate),
        playback.short_period_size,
        playback.short_period_count,
    )
    .with_thresholds(playback.short_period_size, playback.short_period_size);

    let devices = dev.routing.out_device;
    let mut wanted = Vec::new();
    if !devices.without(OutputDevices::DIGITAL).is_empty() {
        wanted.push((Endpoint::Tones, tones));
    }
    if devices.contains(OutputDevices::DGTL_DOCK_HEADSET) {
        wanted.push((Endpoint::Spdif, tones));
    }
    // Multichannel HDMI has priority over duplication
    let hdmi_free = dev.output(OutputVariant::Hdmi).is_none_or(|hdmi| hdmi.is_standby());
    if devices.contains(OutputDevices::AUX_DIGITAL) && hdmi_free {
        let mut hdmi = tones;
        hdmi.rate = playback.low_power_rate;
        wanted.push((Endpoint::Hdmi, hdmi));
    }

    let endpoints = open_endpoints(shared, core, &wanted)?;
    let mut converter = converter_for(shared, core, &endpoints)?;
    converter.reset();

    info!(
        stream = %core.id,
        endpoints = ?endpoints.iter().map(|e| e.endpoint).collect::<Vec<_>>(),
        "Low-latency output started"
    );
    inner.endpoints = endpoints;
    inner.converter = converter;
    inner.echo_reference = dev.echo_reference.clone();
    Ok(())
}

fn apply_period_mode(playback: &PlaybackConfig, inner: &mut OutputInner, use_long_periods: bool) {
    let (avail_min, threshold) = if use_long_periods {
        (playback.deep_long_period_size, playback.deep_long_write_threshold)
    } else {
        (playback.deep_short_period_size, playback.deep_short_write_threshold)
    };
    for endpoint in &mut inner.endpoints {
        if let Err(e) = endpoint.pcm.set_avail_min(avail_min) {
            warn!(endpoint = ?endpoint.endpoint, error = %e, "Cannot set wake-up level");
        }
    }
    inner.write_threshold = threshold;
    inner.use_long_periods = use_long_periods;
    debug!(use_long_periods, threshold, "Deep-buffer period mode");
}

fn start_deep_buffer(
    shared: &DeviceShared,
    dev: &DeviceState,
    core: &OutputCore,
    inner: &mut OutputInner,
) -> HalResult<()> {
    if !dev.routing.in_call() {
        shared.apply_output_routing(dev);
    }

    let playback = &shared.config.playback;
    let config = PcmConfig::new(
        core.channel_count(),
        endpoint_rate(playback, core.sample_rate),
        playback.deep_long_period_size,
        playback.deep_long_period_count,
    )
    .with_thresholds(playback.deep_start_threshold, playback.deep_long_period_size)
    .with_mmap();

    let endpoints = open_endpoints(shared, core, &[(Endpoint::Multimedia, config)])?;
    let converter = converter_for(shared, core, &endpoints)?;
    inner.endpoints = endpoints;
    inner.converter = converter;

    let use_long_periods = dev.screen_off && dev.active_input.is_none();
    apply_period_mode(playback, inner, use_long_periods);
    info!(stream = %core.id, rate = config.rate, "Deep-buffer output started");
    Ok(())
}

fn start_hdmi(shared: &DeviceShared, core: &OutputCore, inner: &mut OutputInner) -> HalResult<()> {
    let config = core
        .hdmi_config
        .ok_or_else(|| HalError::unsupported("HDMI configuration missing"))?;
    inner.endpoints = open_endpoints(shared, core, &[(Endpoint::Hdmi, config)])?;
    info!(stream = %core.id, channels = config.channels, rate = config.rate, "HDMI output started");
    Ok(())
}

/// Close the stream's endpoints; caller holds the device and stream locks
pub(crate) fn do_output_standby(shared: &DeviceShared, dev: &DeviceState, core: &OutputCore, inner: &mut OutputInner) {
    if core.is_standby() {
        return;
    }
    core.standby.store(true, Ordering::Release);
    inner.endpoints.clear();
    inner.converter.reset();
    debug!(stream = %core.id, variant = %core.variant, "Output standby");

    let all_standby = dev.outputs.iter().flatten().all(|o| o.is_standby());
    // In call the output stages stay up until the call ends
    if all_standby && !dev.routing.in_call() {
        let applier = shared.applier();
        applier.apply_table(table::HS_OUTPUT, false);
        applier.apply_table(table::HF_OUTPUT, false);
    }

    for other in OutputVariant::ALL {
        if !standby_forces_standby(core.variant, other) {
            continue;
        }
        if let Some(other_core) = dev.output(other) {
            if !other_core.is_standby() {
                let mut other_inner = other_core.inner.lock();
                do_output_standby(shared, dev, &other_core, &mut other_inner);
            }
        }
    }

    if let Some(reference) = inner.echo_reference.take() {
        reference.stop_write();
    }
}

/// Delay until the last of `frames` newly written frames is rendered
fn playback_delay_ns(pcm: &dyn Pcm, frames: usize, rate: u32) -> i64 {
    match pcm.timestamp() {
        Ok(ts) => {
            let kernel = pcm.buffer_size().saturating_sub(ts.available);
            frames_to_ns(kernel + frames, rate)
        }
        Err(e) => {
            trace!(error = %e, "Playback timestamp unavailable");
            0
        }
    }
}

fn write_low_latency(playback: &PlaybackConfig, core: &OutputCore, inner: &mut OutputInner, samples: &[i16]) -> HalResult<()> {
    let channels = core.channel_count();
    let OutputInner {
        endpoints,
        converter,
        echo_reference,
        ..
    } = inner;

    let needs_conversion = endpoints.iter().any(|e| e.rate != core.sample_rate);
    let converted = if needs_conversion && converter.is_active() {
        converter.convert(samples, channels)
    } else {
        samples.len() / channels
    };

    if let Some(reference) = echo_reference {
        if let Some(primary) = endpoints.first() {
            let delay = playback_delay_ns(primary.pcm.as_ref(), converted, timing_rate(playback, core.sample_rate));
            reference.write(samples, delay);
        }
    }

    for endpoint in endpoints.iter_mut() {
        if endpoint.rate == core.sample_rate || !converter.is_active() {
            endpoint.pcm.write(samples)?;
        } else {
            endpoint.pcm.write(converter.output(converted, channels))?;
        }
    }
    Ok(())
}

fn write_deep_buffer(
    playback: &PlaybackConfig,
    core: &OutputCore,
    inner: &mut OutputInner,
    samples: &[i16],
    use_long_periods: bool,
) -> HalResult<()> {
    if use_long_periods != inner.use_long_periods {
        apply_period_mode(playback, inner, use_long_periods);
    }

    let channels = core.channel_count();
    let threshold = inner.write_threshold;
    let OutputInner {
        endpoints, converter, ..
    } = inner;
    let endpoint = endpoints
        .first_mut()
        .ok_or_else(|| HalError::no_such_device("deep-buffer endpoint closed"))?;

    let converted = if endpoint.rate != core.sample_rate && converter.is_active() {
        Some(converter.convert(samples, channels))
    } else {
        None
    };

    // Keep at most `threshold` frames queued in the kernel
    let rate = timing_rate(playback, core.sample_rate);
    loop {
        let Ok(ts) = endpoint.pcm.timestamp() else {
            break;
        };
        let kernel = endpoint.pcm.buffer_size().saturating_sub(ts.available);
        if kernel <= threshold {
            break;
        }
        let excess_us = ((kernel - threshold) as u64 * 1_000_000) / rate as u64;
        let sleep_us = excess_us.max(playback.min_write_sleep_us);
        trace!(kernel, threshold, sleep_us, "Deep-buffer write throttled");
        thread::sleep(Duration::from_micros(sleep_us));
    }

    match converted {
        Some(frames) => endpoint.pcm.write(converter.output(frames, channels)),
        None => endpoint.pcm.write(samples),
    }
}

fn write_hdmi(inner: &mut OutputInner, samples: &[i16]) -> HalResult<()> {
    let OutputInner {
        endpoints,
        muted,
        silence,
        ..
    } = inner;
    let endpoint = endpoints
        .first_mut()
        .ok_or_else(|| HalError::no_such_device("HDMI endpoint closed"))?;
    if *muted {
        silence.clear();
        silence.resize(samples.len(), 0);
        endpoint.pcm.write(silence)
    } else {
        endpoint.pcm.write(samples)
    }
}

/// A playback stream
///
/// Dropping the stream puts it in standby and unregisters it from the device.
pub struct OutputStream {
    core: Arc<OutputCore>,
    shared: Arc<DeviceShared>,
}

impl OutputStream {
    pub(crate) fn new(core: Arc<OutputCore>, shared: Arc<DeviceShared>) -> Self {
        Self { core, shared }
    }

    pub fn id(&self) -> Uuid {
        self.core.id
    }

    pub fn variant(&self) -> OutputVariant {
        self.core.variant
    }

    /// Write interleaved frames; returns the byte count of `samples`
    ///
    /// Endpoint failures are absorbed: the call sleeps for the buffer's
    /// duration and still reports every byte written. Only a failure to
    /// activate the stream is returned.
    pub fn write(&self, samples: &[i16]) -> HalResult<usize> {
        let bytes = std::mem::size_of_val(samples);
        let frames = samples.len() / self.core.channel_count();
        let mut force_input_standby = false;

        let dev = self.shared.state.lock();
        let mut inner = self.core.inner.lock();
        if self.core.is_standby() {
            if let Err(e) = start(&self.shared, &dev, &self.core, &mut inner) {
                drop(inner);
                drop(dev);
                thread::sleep(frames_duration(frames, self.core.sample_rate));
                return Err(e);
            }
            self.core.standby.store(false, Ordering::Release);
            // A device change may change the VoIP microphone selection
            force_input_standby = self.core.variant == OutputVariant::LowLatency
                && dev
                    .routing
                    .active_input
                    .is_some_and(|a| a.source == InputSource::VoiceCommunication);
        }
        let use_long_periods = dev.screen_off && dev.active_input.is_none();
        drop(dev);

        let playback = &self.shared.config.playback;
        let result = match self.core.variant {
            OutputVariant::LowLatency => write_low_latency(playback, &self.core, &mut inner, samples),
            OutputVariant::DeepBuffer => {
                write_deep_buffer(playback, &self.core, &mut inner, samples, use_long_periods)
            }
            OutputVariant::Hdmi => write_hdmi(&mut inner, samples),
        };

        let mut restart = false;
        if self.core.variant == OutputVariant::Hdmi && inner.restart_periods > 0 {
            inner.restart_periods -= 1;
            restart = inner.restart_periods == 0;
        }
        drop(inner);

        if let Err(e) = result {
            trace!(stream = %self.core.id, error = %e, "Playback write failed");
            thread::sleep(frames_duration(frames, self.core.sample_rate));
        }

        if force_input_standby {
            let mut dev = self.shared.state.lock();
            self.shared.force_input_standby(&mut dev);
        }

        // Reopen HDMI once to recover from the channel swap seen on first playback
        if restart {
            debug!(stream = %self.core.id, "Reopening HDMI endpoint");
            self.standby();
        }
        Ok(bytes)
    }

    /// Close the endpoints until the next write
    pub fn standby(&self) {
        let dev = self.shared.state.lock();
        let mut inner = self.core.inner.lock();
        do_output_standby(&self.shared, &dev, &self.core, &mut inner);
    }

    /// Apply `key=value` pairs; only `routing` is recognized
    pub fn set_parameters(&self, kvpairs: &str) -> HalResult<()> {
        let params = Parameters::parse(kvpairs);
        let Some(raw) = params.get_parsed::<u32>(KEY_ROUTING)? else {
            return Ok(());
        };
        let devices = OutputDevices::from_bits(raw);

        let mut dev = self.shared.state.lock();
        let mut inner = self.core.inner.lock();
        let mut force_input_standby = false;

        if !devices.is_empty() && devices != dev.routing.out_device {
            // Only the low-latency stream carries voice and duplicates to digital sinks
            if self.core.variant == OutputVariant::LowLatency && !self.core.is_standby() {
                force_input_standby = dev
                    .routing
                    .active_input
                    .is_some_and(|a| a.source == InputSource::VoiceCommunication);
                if routing_change_forces_standby(dev.routing.out_device, devices, dev.routing.in_call()) {
                    do_output_standby(&self.shared, &dev, &self.core, &mut inner);
                }
            }
            if self.core.variant != OutputVariant::Hdmi {
                info!(from = ?dev.routing.out_device, to = ?devices, "Output device change");
                dev.routing.out_device = devices;
                self.shared.apply_output_routing(&dev);
            }
        }
        drop(inner);

        if force_input_standby {
            self.shared.force_input_standby(&mut dev);
        }
        Ok(())
    }

    /// Answer `sup_channels` queries
    pub fn get_parameters(&self, keys: &str) -> String {
        let query = Parameters::parse(keys);
        let mut reply = Parameters::new();
        if query.contains(KEY_SUP_CHANNELS) {
            let names: Vec<&str> = self
                .core
                .sup_channel_masks
                .iter()
                .filter_map(|m| m.output_name())
                .collect();
            reply.add(KEY_SUP_CHANNELS, names.join("|"));
        }
        reply.to_string()
    }

    /// Only the HDMI stream supports volume, as a mute on a zero left gain
    pub fn set_volume(&self, left: f32, _right: f32) -> HalResult<()> {
        if self.core.variant != OutputVariant::Hdmi {
            return Err(HalError::unsupported("stream volume"));
        }
        self.core.inner.lock().muted = left == 0.0;
        Ok(())
    }

    pub fn sample_rate(&self) -> u32 {
        self.core.sample_rate
    }

    pub fn channel_mask(&self) -> ChannelMask {
        self.core.channel_mask
    }

    /// Channel masks supported by the stream
    pub fn supported_channel_masks(&self) -> &[ChannelMask] {
        &self.core.sup_channel_masks
    }

    /// Preferred write size in bytes
    pub fn buffer_size(&self) -> usize {
        let playback = &self.shared.config.playback;
        let frame_size = self.core.channel_count() * std::mem::size_of::<i16>();
        let frames = match self.core.variant {
            OutputVariant::LowLatency => round_up_16(
                playback.short_period_size * playback.default_rate as usize / playback.full_power_rate as usize,
            ),
            OutputVariant::DeepBuffer => round_up_16(
                playback.deep_short_period_size * playback.default_rate as usize
                    / playback.full_power_rate as usize,
            ),
            OutputVariant::Hdmi => self.shared.config.hdmi.period_size,
        };
        frames * frame_size
    }

    /// Nominal output latency
    pub fn latency_ms(&self) -> u32 {
        let playback = &self.shared.config.playback;
        let (frames, rate) = match self.core.variant {
            OutputVariant::LowLatency => (
                playback.short_period_size * playback.short_period_count,
                playback.full_power_rate,
            ),
            OutputVariant::DeepBuffer => (
                playback.deep_long_period_size * playback.deep_long_period_count,
                playback.full_power_rate,
            ),
            OutputVariant::Hdmi => (
                self.shared.config.hdmi.period_size * self.shared.config.hdmi.period_count,
                self.core.sample_rate,
            ),
        };
        (frames as u64 * 1000 / rate as u64) as u32
    }

    pub fn is_standby(&self) -> bool {
        self.core.is_standby()
    }
}

impl Drop for OutputStream {
    fn drop(&mut self) {
        let mut dev = self.shared.state.lock();
        {
            let mut inner = self.core.inner.lock();
            do_output_standby(&self.shared, &dev, &self.core, &mut inner);
        }
        let slot = &mut dev.outputs[self.core.variant.index()];
        if slot.as_ref().is_some_and(|c| Arc::ptr_eq(c, &self.core)) {
            *slot = None;
        }
        info!(stream = %self.core.id, variant = %self.core.variant, "Output stream closed");
    }
}
