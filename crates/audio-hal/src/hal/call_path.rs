//! Modem call-audio path control

use std::fmt;

use crate::error::HalResult;

/// Modem-side audio path for the active call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallAudioPath {
    Handset,
    Speaker,
    Headset,
    Headphone,
    Bluetooth,
    /// Bluetooth headset doing its own noise reduction
    BluetoothNoNr,
}

/// Volume kinds understood by the modem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundKind {
    Voice,
    Speaker,
    Headset,
    Bluetooth,
}

/// Callback invoked by the modem when the call codec switches between
/// narrowband and wideband (`true` = wideband)
pub type WidebandListener = Box<dyn Fn(bool) + Send + Sync>;

/// Control interface of the modem's call audio
pub trait CallPathControl: Send + Sync {
    /// Select the modem audio path
    fn set_call_audio_path(&self, path: CallAudioPath) -> HalResult<()>;

    /// Set the modem-side call volume (0.0 - 1.0)
    fn set_call_volume(&self, kind: SoundKind, volume: f32) -> HalResult<()>;

    /// Register the wideband notification callback
    fn register_wideband_listener(&self, listener: WidebandListener);
}

impl fmt::Display for CallAudioPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Handset => "handset",
            Self::Speaker => "speaker",
            Self::Headset => "headset",
            Self::Headphone => "headphone",
            Self::Bluetooth => "bluetooth",
            Self::BluetoothNoNr => "bluetooth-no-nr",
        };
        f.write_str(name)
    }
}
