//! Routing engine
//!
//! Output and input routing are composed from small pure functions, one per
//! decision axis, applied in a fixed order:
//!
//! 1. classify the selected devices
//! 2. apply the TTY receive override (calls not on Bluetooth)
//! 3. derive front-end mixer enables and back-end switches
//! 4. derive gains
//! 5. in a call, apply the TTY transmit override and pick the voice microphone
//!
//! The voice uplink is muted at the start of an in-call pass and unmuted as
//! its last write, so path switches never reach the far end as pops.

use crate::config::GainTable;
use crate::hal::{CallAudioPath, MixerCtl};
use crate::route::gain::{self, ABE_GAIN_0DB};
use crate::route::table;
use crate::route::RoutePlan;
use crate::types::{AudioMode, ChannelMask, InputDevices, InputSource, OutputDevices, TtyMode};

/// Snapshot of the capture stream currently holding the microphone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveCapture {
    pub source: InputSource,
    pub main_channels: ChannelMask,
    pub aux_channels: ChannelMask,
}

/// Coordinator state the routing engine reads
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoutingState {
    pub mode: AudioMode,
    pub out_device: OutputDevices,
    pub in_device: InputDevices,
    pub tty_mode: TtyMode,
    pub bluetooth_nrec: bool,
    pub wideband: bool,
    pub active_input: Option<ActiveCapture>,
}

impl Default for RoutingState {
    fn default() -> Self {
        Self {
            mode: AudioMode::Normal,
            out_device: OutputDevices::SPEAKER,
            in_device: InputDevices::BUILTIN_MIC,
            tty_mode: TtyMode::Off,
            bluetooth_nrec: true,
            wideband: false,
            active_input: None,
        }
    }
}

impl RoutingState {
    pub fn in_call(&self) -> bool {
        self.mode == AudioMode::InCall
    }
}

/// Physical sink classification of an output selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputClass {
    pub headset: bool,
    pub headphone: bool,
    pub speaker: bool,
    pub earpiece: bool,
    pub bluetooth: bool,
}

impl OutputClass {
    /// Anything fed by the primary (DL1) downlink
    pub fn dl1(&self) -> bool {
        self.headset || self.headphone || self.earpiece || self.bluetooth
    }

    /// Analog sinks on the DL1 pin
    pub fn dl1_analog(&self) -> bool {
        self.headset || self.headphone || self.earpiece
    }

    fn only_headphone() -> Self {
        Self {
            headphone: true,
            ..Self::default()
        }
    }

    fn only_headset() -> Self {
        Self {
            headset: true,
            ..Self::default()
        }
    }

    fn only_speaker() -> Self {
        Self {
            speaker: true,
            ..Self::default()
        }
    }
}

/// Front-end mixer enables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrontEnd {
    pub mm_dl1: bool,
    pub tones_dl1: bool,
    pub vx_dl1: bool,
    pub mm_dl2: bool,
    pub tones_dl2: bool,
    pub vx_dl2: bool,
}

/// Back-end pin switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackEnd {
    pub dl1_headset: bool,
    pub dl1_bt: bool,
    pub dl2_mono: bool,
    pub earpiece_enable: bool,
}

/// Classify the selected output devices
pub fn classify_output(devices: OutputDevices) -> OutputClass {
    OutputClass {
        headset: devices.contains(OutputDevices::WIRED_HEADSET),
        headphone: devices.contains(OutputDevices::WIRED_HEADPHONE),
        speaker: devices.contains(OutputDevices::SPEAKER),
        earpiece: devices.contains(OutputDevices::EARPIECE),
        bluetooth: devices.intersects(OutputDevices::ALL_SCO),
    }
}

/// Receive-path override while in a call; returns the class and whether the
/// fixed TTY headset gain applies
pub fn rx_override(
    class: OutputClass,
    in_call: bool,
    tty: TtyMode,
    devices: OutputDevices,
) -> (OutputClass, bool) {
    if !in_call || class.bluetooth {
        return (class, false);
    }
    match tty {
        TtyMode::Full | TtyMode::Vco => (OutputClass::only_headphone(), true),
        TtyMode::Hco => (OutputClass::only_speaker(), false),
        TtyMode::Off => {
            // The voice downlink cannot reach HDMI or the dock
            let mut class = class;
            if devices.intersects(OutputDevices::DIGITAL) {
                class.speaker = true;
            }
            (class, false)
        }
    }
}

/// Transmit-path override while in a call, off Bluetooth
pub fn tx_override(class: OutputClass, tty: TtyMode) -> OutputClass {
    match tty {
        TtyMode::Full | TtyMode::Hco => OutputClass::only_headset(),
        TtyMode::Vco => OutputClass::only_speaker(),
        TtyMode::Off => class,
    }
}

pub fn front_end(class: OutputClass, in_call: bool) -> FrontEnd {
    let dl1 = class.dl1();
    FrontEnd {
        mm_dl1: dl1,
        tones_dl1: dl1,
        vx_dl1: dl1 && in_call,
        mm_dl2: class.speaker,
        tones_dl2: class.speaker,
        vx_dl2: class.speaker && in_call,
    }
}

pub fn back_end(class: OutputClass, in_call: bool) -> BackEnd {
    BackEnd {
        dl1_headset: class.dl1_analog(),
        dl1_bt: class.bluetooth,
        dl2_mono: !in_call && class.speaker,
        earpiece_enable: class.earpiece,
    }
}

/// Modem audio path for the selected output; unsupported selections use the handset
pub fn incall_path(devices: OutputDevices, bluetooth_nrec: bool) -> CallAudioPath {
    match devices {
        OutputDevices::EARPIECE => CallAudioPath::Handset,
        OutputDevices::SPEAKER | OutputDevices::AUX_DIGITAL | OutputDevices::DGTL_DOCK_HEADSET => {
            CallAudioPath::Speaker
        }
        OutputDevices::WIRED_HEADSET => CallAudioPath::Headset,
        OutputDevices::WIRED_HEADPHONE => CallAudioPath::Headphone,
        OutputDevices::BLUETOOTH_SCO
        | OutputDevices::BLUETOOTH_SCO_HEADSET
        | OutputDevices::BLUETOOTH_SCO_CARKIT => {
            if bluetooth_nrec {
                CallAudioPath::Bluetooth
            } else {
                CallAudioPath::BluetoothNoNr
            }
        }
        _ => CallAudioPath::Handset,
    }
}

/// DL1 equalizer: 4 kHz low-pass for narrowband calls on analog DL1 sinks
pub fn eq_filter(state: &RoutingState) -> &'static str {
    let dl1_applicable = state.out_device.intersects(
        OutputDevices::WIRED_HEADSET | OutputDevices::WIRED_HEADPHONE | OutputDevices::EARPIECE,
    );
    if state.in_call() && dl1_applicable && state.tty_mode == TtyMode::Off && !state.wideband {
        table::EQ_4KHZ_LPF
    } else {
        table::EQ_FLAT
    }
}

/// Microphones selected for a capture pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MicSelection {
    pub main: bool,
    pub headset: bool,
    pub sub: bool,
    pub bluetooth: bool,
}

/// Pick microphones for the multimedia uplink
///
/// The sub mic serves camcorder capture and speakerphone VoIP; during a call
/// the capture source is not consulted.
pub fn select_mics(state: &RoutingState) -> MicSelection {
    let bluetooth = state.in_device.intersects(InputDevices::ALL_SCO);
    if bluetooth {
        return MicSelection {
            bluetooth,
            ..MicSelection::default()
        };
    }

    let sub = match state.active_input {
        Some(active) if !state.in_call() => {
            active.source == InputSource::Camcorder
                || (state.out_device.contains(OutputDevices::SPEAKER)
                    && active.source == InputSource::VoiceCommunication)
        }
        _ => false,
    };

    if sub {
        MicSelection {
            sub,
            ..MicSelection::default()
        }
    } else {
        MicSelection {
            main: state.in_device.contains(InputDevices::BUILTIN_MIC),
            headset: state.in_device.contains(InputDevices::WIRED_HEADSET),
            sub: false,
            bluetooth: false,
        }
    }
}

/// True when the active capture needs both analog microphones
pub fn needs_dual_mic(active: Option<ActiveCapture>) -> bool {
    match active {
        Some(active) => {
            !active.aux_channels.is_empty() || active.main_channels == ChannelMask::IN_FRONT_BACK
        }
        None => false,
    }
}

fn append_gains(plan: &mut RoutePlan, gains: &gain::OutputGains) {
    plan.set_all(MixerCtl::SpeakerVolume, gains.speaker_register());
    plan.set_all(MixerCtl::HeadsetVolume, gains.headset_register());
    plan.set(MixerCtl::Dl1TonesVolume, gains.tones_dl1);
    if let Some(vx_dl2) = gains.vx_dl2 {
        plan.set(MixerCtl::Dl2VoiceVolume, vx_dl2);
    }
    plan.set(MixerCtl::Dl2TonesVolume, gains.tones_dl2);
    plan.set(MixerCtl::Dl1MediaVolume, gains.mm_dl1);
    plan.set(MixerCtl::Dl2MediaVolume, gains.mm_dl2);
    plan.set(MixerCtl::EarpieceVolume, gains.earpiece_register());
}

/// Full output routing pass
///
/// `speaker_max_db` is the top of the speaker amplifier range in dB.
pub fn plan_output_routing(state: &RoutingState, gains: &GainTable, speaker_max_db: i32) -> RoutePlan {
    let mut plan = RoutePlan::new();
    let in_call = state.in_call();

    if in_call {
        plan.set_all(MixerCtl::VoiceUlVolume, 0);
    }

    let selected = classify_output(state.out_device);
    let (class, tty_volume) = rx_override(selected, in_call, state.tty_mode, state.out_device);

    let fe = front_end(class, in_call);
    plan.switch(MixerCtl::Dl2MixerMultimedia, fe.mm_dl2);
    plan.switch(MixerCtl::Dl2MixerTones, fe.tones_dl2);
    plan.switch(MixerCtl::Dl2MixerVoice, fe.vx_dl2);
    plan.switch(MixerCtl::Dl1MixerMultimedia, fe.mm_dl1);
    plan.switch(MixerCtl::Dl1MixerTones, fe.tones_dl1);
    plan.switch(MixerCtl::Dl1MixerVoice, fe.vx_dl1);

    let be = back_end(class, in_call);
    plan.switch(MixerCtl::Dl1PdmSwitch, be.dl1_headset);
    plan.switch(MixerCtl::Dl1BtVxSwitch, be.dl1_bt);
    plan.switch(MixerCtl::Dl2MonoMixer, be.dl2_mono);
    plan.switch(MixerCtl::EarphoneEnable, be.earpiece_enable);

    plan.route(table::HS_OUTPUT, class.headset || class.headphone);
    plan.route(table::HF_OUTPUT, class.speaker);

    plan.select(MixerCtl::Dl1Equalizer, eq_filter(state));
    let output = gain::output_gains(gains, state.mode, state.out_device, tty_volume, speaker_max_db);
    append_gains(&mut plan, &output);

    let mut sidetone = false;
    if in_call {
        if class.bluetooth {
            plan.route(table::VX_UL_BT, true);
        } else {
            let tx = tx_override(class, state.tty_mode);

            if tx.dl1_analog() {
                plan.route(table::VX_UL_AMIC_LEFT, true);
            } else if tx.speaker {
                plan.route(table::VX_UL_AMIC_RIGHT, true);
            } else {
                plan.route(table::VX_UL_AMIC_LEFT, false);
            }

            let main_mic = tx.earpiece || tx.headphone;
            let left = if main_mic {
                table::MAIN_MIC
            } else if tx.headset {
                table::HEADSET_MIC
            } else {
                table::OFF
            };
            plan.select(MixerCtl::LeftCaptureRoute, left);
            plan.select(
                MixerCtl::RightCaptureRoute,
                if tx.speaker { table::SUB_MIC } else { table::OFF },
            );

            let source = state.active_input.map(|a| a.source);
            let volume = gain::input_gain(gains, state.mode, source, main_mic, tx.headset, tx.speaker);
            plan.set_all(MixerCtl::AmicUlVolume, volume);

            sidetone = tx.earpiece;
        }

        plan.call_path(incall_path(state.out_device, state.bluetooth_nrec));
        plan.set_all(MixerCtl::VoiceUlVolume, ABE_GAIN_0DB);
    }

    plan.switch(MixerCtl::SidetoneCapture, sidetone);
    plan
}

/// Full input routing pass
pub fn plan_input_routing(state: &RoutingState, gains: &GainTable) -> RoutePlan {
    let mut plan = RoutePlan::new();
    let mut mics = select_mics(state);

    if mics.bluetooth {
        plan.route(table::MM_UL2_BT, true);
    } else {
        if needs_dual_mic(state.active_input) {
            if mics.main {
                plan.route(table::MM_UL2_AMIC_DUAL_MAIN_SUB, true);
                mics.sub = true;
            } else if mics.sub {
                plan.route(table::MM_UL2_AMIC_DUAL_SUB_MAIN, true);
                mics.main = true;
            } else {
                plan.route(table::MM_UL2_AMIC_DUAL_MAIN_SUB, false);
            }
        } else if mics.main || mics.headset {
            plan.route(table::MM_UL2_AMIC_LEFT, true);
        } else if mics.sub {
            plan.route(table::MM_UL2_AMIC_RIGHT, true);
        } else {
            plan.route(table::MM_UL2_AMIC_LEFT, false);
        }

        plan.select(
            MixerCtl::RightCaptureRoute,
            if mics.sub { table::SUB_MIC } else { table::OFF },
        );
        let left = if mics.main {
            table::MAIN_MIC
        } else if mics.headset {
            table::HEADSET_MIC
        } else {
            table::OFF
        };
        plan.select(MixerCtl::LeftCaptureRoute, left);
    }

    let source = state.active_input.map(|a| a.source);
    let volume = gain::input_gain(gains, state.mode, source, mics.main, mics.headset, mics.sub);
    plan.set_all(MixerCtl::AmicUlVolume, volume);
    plan
}
