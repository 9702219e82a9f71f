//! Device coordinator
//!
//! [`AudioHal`] owns the routing state, the registered streams, the call
//! controller and the echo reference. Streams keep a handle to the shared
//! device context and take its lock before their own.
//!
//! Lock order: device, then input stream, then output stream. Between
//! outputs, the HDMI stream's lock is taken before the low-latency one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::call::CallController;
use crate::config::HalConfig;
use crate::echo::EchoReference;
use crate::error::{HalError, HalResult};
use crate::hal::{
    CallPathControl, LinearResamplerFactory, Mixer, MixerControls, MixerCtl, ResamplerFactory, SoundKind,
    Transport,
};
use crate::params::{KEY_BT_NREC, KEY_SCREEN_STATE, KEY_TTY_MODE, Parameters, VALUE_OFF, VALUE_ON};
use crate::route::engine::{eq_filter, plan_input_routing, plan_output_routing};
use crate::route::gain::{ABE_GAIN_0DB, db_from_speaker_volume};
use crate::route::{ActiveCapture, RouteApplier, RoutePlan, RoutingState, table};
use crate::stream::input::{InputCore, do_input_standby};
use crate::stream::output::{OutputCore, do_output_standby};
use crate::stream::{InputStream, OutputStream, input_buffer_size};
use crate::types::{
    AudioMode, InputDevices, InputSource, OutputDevices, OutputFlags, OutputVariant, StreamConfig, TtyMode,
};

/// Coordinator state guarded by the device lock
pub(crate) struct DeviceState {
    pub(crate) routing: RoutingState,
    pub(crate) screen_off: bool,
    /// Modem audio is up
    pub(crate) in_call: bool,
    pub(crate) voice_volume: f32,
    pub(crate) outputs: [Option<Arc<OutputCore>>; 3],
    /// The open input stream
    pub(crate) input: Option<Arc<InputCore>>,
    /// The input stream holding the capture endpoint
    pub(crate) active_input: Option<Arc<InputCore>>,
    pub(crate) echo_reference: Option<Arc<EchoReference>>,
    pub(crate) call: CallController,
}

impl DeviceState {
    pub(crate) fn output(&self, variant: OutputVariant) -> Option<Arc<OutputCore>> {
        self.outputs[variant.index()].clone()
    }
}

/// Device context shared by the coordinator and its streams
pub(crate) struct DeviceShared {
    pub(crate) state: Mutex<DeviceState>,
    pub(crate) mic_mute: AtomicBool,
    mixer: Arc<dyn Mixer>,
    hdmi_mixer: Option<Arc<dyn Mixer>>,
    controls: MixerControls,
    pub(crate) transport: Arc<dyn Transport>,
    call_path: Arc<dyn CallPathControl>,
    pub(crate) resamplers: Arc<dyn ResamplerFactory>,
    pub(crate) config: HalConfig,
    /// Top of the speaker amplifier range in dB
    speaker_max_db: i32,
}

impl DeviceShared {
    pub(crate) fn applier(&self) -> RouteApplier<'_> {
        RouteApplier {
            mixer: self.mixer.as_ref(),
            controls: &self.controls,
            call_path: self.call_path.as_ref(),
        }
    }

    pub(crate) fn apply_output_routing(&self, dev: &DeviceState) {
        let plan = plan_output_routing(&dev.routing, &self.config.gains, self.speaker_max_db);
        debug!(
            mode = ?dev.routing.mode,
            devices = ?dev.routing.out_device,
            tty = ?dev.routing.tty_mode,
            steps = plan.steps().len(),
            "Applying output routing"
        );
        self.applier().apply(&plan);
        // The routing pass unmutes the uplink
        if dev.routing.in_call() && self.mic_mute.load(Ordering::Acquire) {
            self.apply_uplink_mute(true);
        }
    }

    pub(crate) fn apply_input_routing(&self, dev: &DeviceState) {
        let plan = plan_input_routing(&dev.routing, &self.config.gains);
        debug!(devices = ?dev.routing.in_device, active = ?dev.routing.active_input, "Applying input routing");
        self.applier().apply(&plan);
    }

    fn apply_uplink_mute(&self, mute: bool) {
        let mut plan = RoutePlan::new();
        plan.set_all(MixerCtl::VoiceUlVolume, if mute { 0 } else { ABE_GAIN_0DB });
        self.applier().apply(&plan);
    }

    /// Put the active input in standby; caller holds the device lock only
    pub(crate) fn force_input_standby(&self, dev: &mut DeviceState) {
        if let Some(input) = dev.active_input.clone() {
            let mut inner = input.inner.lock();
            do_input_standby(self, dev, &input, &mut inner);
        }
    }

    fn force_all_standby(&self, dev: &mut DeviceState) {
        if let Some(output) = dev.output(OutputVariant::LowLatency) {
            let mut inner = output.inner.lock();
            do_output_standby(self, dev, &output, &mut inner);
        }
        self.force_input_standby(dev);
    }

    /// Unbind `reference` from the low-latency output and drop the device's handle
    pub(crate) fn put_echo_reference(&self, dev: &mut DeviceState, reference: &Arc<EchoReference>) {
        if !dev
            .echo_reference
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, reference))
        {
            return;
        }
        if let Some(output) = dev.output(OutputVariant::LowLatency) {
            if !output.is_standby() {
                let mut inner = output.inner.lock();
                if inner
                    .echo_reference
                    .as_ref()
                    .is_some_and(|bound| Arc::ptr_eq(bound, reference))
                {
                    reference.stop_write();
                    inner.echo_reference = None;
                }
            }
        }
        dev.echo_reference = None;
        debug!(reference = %reference.id(), "Echo reference released");
    }

    /// Create the echo reference for a capture of `channels` at `rate`
    ///
    /// Only an active low-latency output can source it; any previous
    /// reference is released first.
    pub(crate) fn get_echo_reference(
        &self,
        dev: &mut DeviceState,
        channels: usize,
        rate: u32,
    ) -> Option<Arc<EchoReference>> {
        if let Some(current) = dev.echo_reference.clone() {
            self.put_echo_reference(dev, &current);
        }

        let output = dev.output(OutputVariant::LowLatency)?;
        if output.is_standby() {
            debug!("No active low-latency output to source the echo reference");
            return None;
        }

        let playback = output.stream_config();
        let reference = match EchoReference::new(channels, rate, playback.channel_count(), playback.sample_rate) {
            Ok(reference) => Arc::new(reference),
            Err(e) => {
                warn!(error = %e, "Cannot create echo reference");
                return None;
            }
        };
        output.inner.lock().echo_reference = Some(Arc::clone(&reference));
        dev.echo_reference = Some(Arc::clone(&reference));
        info!(reference = %reference.id(), channels, rate, "Echo reference bound to low-latency output");
        Some(reference)
    }

    fn on_wideband_change(&self, wideband: bool) {
        let mut dev = self.state.lock();
        if dev.routing.wideband == wideband {
            return;
        }
        info!(wideband, in_call = dev.in_call, "Call codec bandwidth changed");
        dev.routing.wideband = wideband;

        if dev.in_call {
            let mut plan = RoutePlan::new();
            plan.select(MixerCtl::Dl1Equalizer, eq_filter(&dev.routing));
            self.applier().apply(&plan);
            if let Err(e) = dev.call.restart(self.transport.as_ref(), &self.config.modem, wideband) {
                error!(error = %e, "Cannot restart modem audio at the new rate");
            }
        }
    }
}

/// Hardware collaborators of the audio core
pub struct HalBackends {
    pub mixer: Arc<dyn Mixer>,
    /// Mixer of the digital card, needed for multichannel HDMI
    pub hdmi_mixer: Option<Arc<dyn Mixer>>,
    pub transport: Arc<dyn Transport>,
    pub call_path: Arc<dyn CallPathControl>,
    pub resamplers: Arc<dyn ResamplerFactory>,
}

impl HalBackends {
    /// Backends with the linear resampler and no HDMI card
    pub fn new(mixer: Arc<dyn Mixer>, transport: Arc<dyn Transport>, call_path: Arc<dyn CallPathControl>) -> Self {
        Self {
            mixer,
            hdmi_mixer: None,
            transport,
            call_path,
            resamplers: Arc::new(LinearResamplerFactory),
        }
    }

    pub fn with_hdmi_mixer(mut self, mixer: Arc<dyn Mixer>) -> Self {
        self.hdmi_mixer = Some(mixer);
        self
    }

    pub fn with_resampler_factory(mut self, factory: Arc<dyn ResamplerFactory>) -> Self {
        self.resamplers = factory;
        self
    }
}

/// Read-only copy of the coordinator state
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSnapshot {
    pub mode: AudioMode,
    pub out_device: OutputDevices,
    pub in_device: InputDevices,
    pub tty_mode: TtyMode,
    pub bluetooth_nrec: bool,
    pub wideband: bool,
    pub screen_off: bool,
    pub in_call: bool,
    pub voice_volume: f32,
    pub mic_mute: bool,
    /// Modem rate while modem audio is up
    pub call_rate: Option<u32>,
    pub open_outputs: Vec<OutputVariant>,
    /// Outputs with open endpoints
    pub active_outputs: Vec<OutputVariant>,
    pub input_open: bool,
    pub active_capture: Option<ActiveCapture>,
    pub echo_reference: Option<Uuid>,
}

/// The audio device
pub struct AudioHal {
    shared: Arc<DeviceShared>,
}

impl AudioHal {
    /// Bring up the device
    ///
    /// Resolves every mixer control the core drives (a missing one is fatal),
    /// applies the default routes and routes output to the speaker.
    pub fn open(backends: HalBackends, config: HalConfig) -> HalResult<Self> {
        config.validate()?;
        let controls = MixerControls::resolve(backends.mixer.as_ref())?;
        let (_, speaker_max) = backends.mixer.value_range(controls.get(MixerCtl::SpeakerVolume));
        let speaker_max_db = db_from_speaker_volume(speaker_max);

        let routing = RoutingState {
            mode: AudioMode::Normal,
            out_device: OutputDevices::SPEAKER,
            in_device: InputDevices::BUILTIN_MIC,
            ..RoutingState::default()
        };
        let shared = Arc::new(DeviceShared {
            state: Mutex::new(DeviceState {
                routing,
                screen_off: false,
                in_call: false,
                voice_volume: 1.0,
                outputs: [None, None, None],
                input: None,
                active_input: None,
                echo_reference: None,
                call: CallController::new(),
            }),
            mic_mute: AtomicBool::new(false),
            mixer: backends.mixer,
            hdmi_mixer: backends.hdmi_mixer,
            controls,
            transport: backends.transport,
            call_path: backends.call_path,
            resamplers: backends.resamplers,
            config,
            speaker_max_db,
        });

        {
            let dev = shared.state.lock();
            shared.applier().apply_table(table::DEFAULTS, true);
            shared.apply_output_routing(&dev);
        }

        let weak: Weak<DeviceShared> = Arc::downgrade(&shared);
        shared.call_path.register_wideband_listener(Box::new(move |wideband| {
            if let Some(shared) = weak.upgrade() {
                shared.on_wideband_change(wideband);
            }
        }));

        info!(speaker_max_db, hdmi = shared.hdmi_mixer.is_some(), "Audio device opened");
        Ok(Self { shared })
    }

    /// Switch operating mode, starting or ending modem audio on call transitions
    ///
    /// A modem failure while entering a call is returned after the
    /// transition completes; the device is in call mode either way.
    pub fn set_mode(&self, mode: AudioMode) -> HalResult<()> {
        let mut dev = self.shared.state.lock();
        if dev.routing.mode == mode {
            return Ok(());
        }
        info!(from = ?dev.routing.mode, to = ?mode, "Mode change");
        dev.routing.mode = mode;
        let shared = &self.shared;

        if dev.routing.in_call() {
            if dev.in_call {
                return Ok(());
            }
            shared.force_all_standby(&mut dev);
            // The call path cannot reach the speaker alone; use the earpiece
            if dev.routing.out_device == OutputDevices::SPEAKER {
                dev.routing.out_device = OutputDevices::EARPIECE;
                dev.routing.in_device = InputDevices::BUILTIN_MIC;
            } else {
                dev.routing.out_device = dev.routing.out_device.without(OutputDevices::SPEAKER);
            }
            shared.apply_output_routing(&dev);

            let wideband = dev.routing.wideband;
            let started = dev.call.start(shared.transport.as_ref(), &shared.config.modem, wideband);
            if let Err(e) = &started {
                error!(error = %e, "Modem audio failed to start");
            }
            if let Err(e) = shared.call_path.set_call_volume(SoundKind::Voice, dev.voice_volume) {
                warn!(error = %e, "Cannot set call volume");
            }
            dev.in_call = true;
            started
        } else if dev.in_call {
            dev.in_call = false;
            dev.call.end();
            shared.force_all_standby(&mut dev);
            shared.apply_output_routing(&dev);
            shared.apply_input_routing(&dev);
            Ok(())
        } else {
            // Output gains and capture gains both depend on the mode
            shared.apply_output_routing(&dev);
            if dev.routing.active_input.is_some() {
                shared.apply_input_routing(&dev);
            }
            Ok(())
        }
    }

    /// Apply `tty_mode`, `bt_headset_nrec` and `screen_state`; other keys are ignored
    ///
    /// Every value is validated before any is applied.
    pub fn set_parameters(&self, kvpairs: &str) -> HalResult<()> {
        let params = Parameters::parse(kvpairs);
        let tty_mode = params.get_parsed::<TtyMode>(KEY_TTY_MODE)?;
        let nrec = params.get_switch(KEY_BT_NREC)?;
        let screen_on = params.get_switch(KEY_SCREEN_STATE)?;

        let mut dev = self.shared.state.lock();
        if let Some(tty_mode) = tty_mode {
            if tty_mode != dev.routing.tty_mode {
                info!(from = ?dev.routing.tty_mode, to = ?tty_mode, "TTY mode change");
                dev.routing.tty_mode = tty_mode;
                if dev.routing.in_call() {
                    self.shared.apply_output_routing(&dev);
                }
            }
        }
        if let Some(nrec) = nrec {
            if nrec != dev.routing.bluetooth_nrec {
                dev.routing.bluetooth_nrec = nrec;
                if dev.routing.in_call() {
                    self.shared.apply_output_routing(&dev);
                }
            }
        }
        if let Some(screen_on) = screen_on {
            dev.screen_off = !screen_on;
        }
        Ok(())
    }

    /// Answer queries for the keys `set_parameters` accepts
    pub fn get_parameters(&self, keys: &str) -> String {
        let query = Parameters::parse(keys);
        let dev = self.shared.state.lock();
        let switch = |on: bool| if on { VALUE_ON } else { VALUE_OFF };

        let mut reply = Parameters::new();
        if query.contains(KEY_TTY_MODE) {
            reply.add(KEY_TTY_MODE, dev.routing.tty_mode.as_str());
        }
        if query.contains(KEY_BT_NREC) {
            reply.add(KEY_BT_NREC, switch(dev.routing.bluetooth_nrec));
        }
        if query.contains(KEY_SCREEN_STATE) {
            reply.add(KEY_SCREEN_STATE, switch(!dev.screen_off));
        }
        reply.to_string()
    }

    /// Call volume, 0.0 to 1.0
    pub fn set_voice_volume(&self, volume: f32) -> HalResult<()> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(HalError::invalid_argument(format!("voice volume {} out of range", volume)));
        }
        let mut dev = self.shared.state.lock();
        dev.voice_volume = volume;
        if dev.routing.in_call() {
            self.shared.call_path.set_call_volume(SoundKind::Voice, volume)?;
        }
        Ok(())
    }

    pub fn set_master_volume(&self, _volume: f32) -> HalResult<()> {
        Err(HalError::unsupported("master volume"))
    }

    /// Mute capture; in a call the voice uplink is muted as well
    pub fn set_mic_mute(&self, mute: bool) -> HalResult<()> {
        let dev = self.shared.state.lock();
        self.shared.mic_mute.store(mute, Ordering::Release);
        if dev.routing.in_call() {
            self.shared.apply_uplink_mute(mute);
        }
        debug!(mute, "Microphone mute");
        Ok(())
    }

    pub fn mic_mute(&self) -> bool {
        self.shared.mic_mute.load(Ordering::Acquire)
    }

    /// Capture buffer size in bytes for a request, or 0 when it is unsupported
    pub fn input_buffer_size(&self, config: &StreamConfig) -> usize {
        input_buffer_size(&self.shared.config.capture, config)
    }

    /// Open the output stream variant matching `devices` and `flags`
    ///
    /// Returns the stream with its negotiated configuration. Only one stream
    /// per variant may be open.
    pub fn open_output_stream(
        &self,
        devices: OutputDevices,
        flags: OutputFlags,
        config: &StreamConfig,
    ) -> HalResult<(OutputStream, StreamConfig)> {
        let variant = OutputVariant::for_request(devices, flags);
        let mut dev = self.shared.state.lock();
        if dev.outputs[variant.index()].is_some() {
            return Err(HalError::unsupported(format!("{} output already open", variant)));
        }

        let core = Arc::new(OutputCore::new(
            &self.shared.config,
            self.shared.hdmi_mixer.as_deref(),
            variant,
            config,
        )?);
        let negotiated = core.stream_config();
        dev.outputs[variant.index()] = Some(Arc::clone(&core));
        info!(stream = %core.id, %variant, rate = negotiated.sample_rate, channels = ?negotiated.channel_mask, "Output stream opened");
        Ok((OutputStream::new(core, Arc::clone(&self.shared)), negotiated))
    }

    /// Close an output stream, putting it in standby first
    pub fn close_output_stream(&self, stream: OutputStream) {
        drop(stream);
    }

    /// Open the capture stream; only one may be open
    pub fn open_input_stream(
        &self,
        devices: InputDevices,
        config: &StreamConfig,
        source: InputSource,
    ) -> HalResult<InputStream> {
        let mut dev = self.shared.state.lock();
        if dev.input.is_some() {
            return Err(HalError::unsupported("an input stream is already open"));
        }
        let core = Arc::new(InputCore::new(
            &self.shared.config,
            self.shared.resamplers.as_ref(),
            devices,
            config,
            source,
        )?);
        dev.input = Some(Arc::clone(&core));
        info!(stream = %core.id, rate = config.sample_rate, channels = ?config.channel_mask, ?source, "Input stream opened");
        Ok(InputStream::new(core, Arc::clone(&self.shared)))
    }

    /// Close an input stream, putting it in standby first
    pub fn close_input_stream(&self, stream: InputStream) {
        drop(stream);
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        let dev = self.shared.state.lock();
        let open_outputs: Vec<OutputVariant> = OutputVariant::ALL
            .into_iter()
            .filter(|v| dev.outputs[v.index()].is_some())
            .collect();
        let active_outputs = open_outputs
            .iter()
            .copied()
            .filter(|v| dev.output(*v).is_some_and(|o| !o.is_standby()))
            .collect();

        DeviceSnapshot {
            mode: dev.routing.mode,
            out_device: dev.routing.out_device,
            in_device: dev.routing.in_device,
            tty_mode: dev.routing.tty_mode,
            bluetooth_nrec: dev.routing.bluetooth_nrec,
            wideband: dev.routing.wideband,
            screen_off: dev.screen_off,
            in_call: dev.in_call,
            voice_volume: dev.voice_volume,
            mic_mute: self.shared.mic_mute.load(Ordering::Acquire),
            call_rate: dev.call.rate(),
            open_outputs,
            active_outputs,
            input_open: dev.input.is_some(),
            active_capture: dev.routing.active_input,
            echo_reference: dev.echo_reference.as_ref().map(|r| r.id()),
        }
    }
}
