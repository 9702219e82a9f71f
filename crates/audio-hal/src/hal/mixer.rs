//! Hardware mixer control interface
//!
//! The core addresses controls by name. The fixed set of controls it drives
//! directly ([`MixerCtl`]) is resolved once at startup into [`MixerControls`];
//! controls only referenced from route tables are looked up on use.

use tracing::error;

use crate::error::{HalError, HalResult};

/// Opaque handle of a resolved mixer control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlId(pub usize);

/// A hardware mixer exposing named controls
pub trait Mixer: Send + Sync {
    /// Look up a control by name
    fn control(&self, name: &str) -> Option<ControlId>;

    /// Number of values (channels) carried by an integer control
    fn num_values(&self, ctl: ControlId) -> usize;

    /// Select an enumerated value by its name
    fn set_enum(&self, ctl: ControlId, value: &str) -> HalResult<()>;

    /// Set one value of an integer control
    fn set_value(&self, ctl: ControlId, index: usize, value: i32) -> HalResult<()>;

    /// Read one value of an integer control
    fn value(&self, ctl: ControlId, index: usize) -> HalResult<i32>;

    /// Inclusive (min, max) range of an integer control
    fn value_range(&self, ctl: ControlId) -> (i32, i32);
}

/// Controls the routing engine drives directly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MixerCtl {
    Dl1Equalizer,
    Dl1MediaVolume,
    Dl1TonesVolume,
    Dl2MediaVolume,
    Dl2VoiceVolume,
    Dl2TonesVolume,
    Dl1MixerMultimedia,
    Dl1MixerVoice,
    Dl1MixerTones,
    Dl2MixerMultimedia,
    Dl2MixerVoice,
    Dl2MixerTones,
    Dl2MonoMixer,
    Dl1PdmSwitch,
    Dl1BtVxSwitch,
    EarphoneEnable,
    LeftCaptureRoute,
    RightCaptureRoute,
    AmicUlVolume,
    VoiceUlVolume,
    SidetoneCapture,
    HeadsetVolume,
    SpeakerVolume,
    EarpieceVolume,
}

impl MixerCtl {
    pub const ALL: [MixerCtl; 24] = [
        Self::Dl1Equalizer,
        Self::Dl1MediaVolume,
        Self::Dl1TonesVolume,
        Self::Dl2MediaVolume,
        Self::Dl2VoiceVolume,
        Self::Dl2TonesVolume,
        Self::Dl1MixerMultimedia,
        Self::Dl1MixerVoice,
        Self::Dl1MixerTones,
        Self::Dl2MixerMultimedia,
        Self::Dl2MixerVoice,
        Self::Dl2MixerTones,
        Self::Dl2MonoMixer,
        Self::Dl1PdmSwitch,
        Self::Dl1BtVxSwitch,
        Self::EarphoneEnable,
        Self::LeftCaptureRoute,
        Self::RightCaptureRoute,
        Self::AmicUlVolume,
        Self::VoiceUlVolume,
        Self::SidetoneCapture,
        Self::HeadsetVolume,
        Self::SpeakerVolume,
        Self::EarpieceVolume,
    ];

    /// Hardware control name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Dl1Equalizer => "DL1 Equalizer",
            Self::Dl1MediaVolume => "DL1 Media Playback Volume",
            Self::Dl1TonesVolume => "DL1 Tones Playback Volume",
            Self::Dl2MediaVolume => "DL2 Media Playback Volume",
            Self::Dl2VoiceVolume => "DL2 Voice Playback Volume",
            Self::Dl2TonesVolume => "DL2 Tones Playback Volume",
            Self::Dl1MixerMultimedia => "DL1 Mixer Multimedia",
            Self::Dl1MixerVoice => "DL1 Mixer Voice",
            Self::Dl1MixerTones => "DL1 Mixer Tones",
            Self::Dl2MixerMultimedia => "DL2 Mixer Multimedia",
            Self::Dl2MixerVoice => "DL2 Mixer Voice",
            Self::Dl2MixerTones => "DL2 Mixer Tones",
            Self::Dl2MonoMixer => "DL2 Mono Mixer",
            Self::Dl1PdmSwitch => "DL1 PDM Switch",
            Self::Dl1BtVxSwitch => "DL1 BT_VX Switch",
            Self::EarphoneEnable => "Earphone Enable Switch",
            Self::LeftCaptureRoute => "Analog Left Capture Route",
            Self::RightCaptureRoute => "Analog Right Capture Route",
            Self::AmicUlVolume => "AMIC UL Volume",
            Self::VoiceUlVolume => "AUDUL Voice UL Volume",
            Self::SidetoneCapture => "Sidetone Mixer Capture",
            Self::HeadsetVolume => "Headset Playback Volume",
            Self::SpeakerVolume => "Handsfree Playback Volume",
            Self::EarpieceVolume => "Earphone Playback Volume",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// The directly-driven controls, resolved once at startup
#[derive(Debug, Clone)]
pub struct MixerControls {
    ids: [ControlId; 24],
}

impl MixerControls {
    /// Resolve every [`MixerCtl`]; any absent control is fatal
    pub fn resolve(mixer: &dyn Mixer) -> HalResult<Self> {
        let mut ids = [ControlId(0); 24];
        let mut missing = Vec::new();

        for ctl in MixerCtl::ALL {
            match mixer.control(ctl.name()) {
                Some(id) => ids[ctl.index()] = id,
                None => missing.push(ctl.name()),
            }
        }

        if !missing.is_empty() {
            error!(?missing, "Unable to locate all mixer controls, aborting");
            return Err(HalError::missing_control(missing.join(", ")));
        }
        Ok(Self { ids })
    }

    /// Handle of a directly-driven control
    pub fn get(&self, ctl: MixerCtl) -> ControlId {
        self.ids[ctl.index()]
    }
}
