//! Core value types shared by the routing, stream and call layers
//!
//! Device and channel selections are bitmasks whose numeric values match the
//! platform audio policy, so masks received through the textual parameter
//! protocol can be used without translation.

use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{HalError, HalResult};

macro_rules! bitmask {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$cmeta:meta])* $cname:ident = $val:expr; )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u32);

        impl $name {
            $( $(#[$cmeta])* pub const $cname: Self = Self($val); )*

            /// The empty mask
            pub const fn empty() -> Self {
                Self(0)
            }

            /// Build a mask from raw bits
            pub const fn from_bits(bits: u32) -> Self {
                Self(bits)
            }

            /// Raw bits
            pub const fn bits(self) -> u32 {
                self.0
            }

            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }

            /// True when every bit of `other` is set in `self`
            pub const fn contains(self, other: Self) -> bool {
                other.0 != 0 && self.0 & other.0 == other.0
            }

            /// True when `self` and `other` share at least one bit
            pub const fn intersects(self, other: Self) -> bool {
                self.0 & other.0 != 0
            }

            /// Number of bits set
            pub const fn count(self) -> u32 {
                self.0.count_ones()
            }

            /// `self` with every bit of `other` cleared
            pub const fn without(self, other: Self) -> Self {
                Self(self.0 & !other.0)
            }
        }

        impl BitOr for $name {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }

        impl BitAnd for $name {
            type Output = Self;
            fn bitand(self, rhs: Self) -> Self {
                Self(self.0 & rhs.0)
            }
        }

        impl BitAndAssign for $name {
            fn bitand_assign(&mut self, rhs: Self) {
                self.0 &= rhs.0;
            }
        }

        impl Not for $name {
            type Output = Self;
            fn not(self) -> Self {
                Self(!self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:#06x})", stringify!($name), self.0)
            }
        }
    };
}

bitmask! {
    /// Selected output (playback) devices
    OutputDevices {
        EARPIECE = 0x1;
        SPEAKER = 0x2;
        WIRED_HEADSET = 0x4;
        WIRED_HEADPHONE = 0x8;
        BLUETOOTH_SCO = 0x10;
        BLUETOOTH_SCO_HEADSET = 0x20;
        BLUETOOTH_SCO_CARKIT = 0x40;
        /// HDMI
        AUX_DIGITAL = 0x400;
        /// S/PDIF dock
        DGTL_DOCK_HEADSET = 0x1000;
        ALL_SCO = 0x70;
    }
}

impl OutputDevices {
    /// Digital sinks the voice downlink cannot reach
    pub const DIGITAL: Self = Self(0x400 | 0x1000);
}

bitmask! {
    /// Selected input (capture) devices, stored without the direction bit
    InputDevices {
        BUILTIN_MIC = 0x4;
        BLUETOOTH_SCO_HEADSET = 0x8;
        WIRED_HEADSET = 0x10;
        BACK_MIC = 0x80;
        ALL_SCO = 0x8;
    }
}

impl InputDevices {
    /// Direction bit carried by input device values in the parameter protocol
    pub const DIRECTION_BIT: u32 = 0x8000_0000;

    /// Build from a raw protocol value, stripping the direction bit
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw & !Self::DIRECTION_BIT)
    }
}

bitmask! {
    /// Channel layout mask for both playback and capture streams
    ChannelMask {
        OUT_FRONT_LEFT = 0x1;
        OUT_FRONT_RIGHT = 0x2;
        OUT_STEREO = 0x3;
        OUT_5POINT1 = 0x3f;
        OUT_7POINT1 = 0x63f;
        IN_LEFT = 0x4;
        IN_RIGHT = 0x8;
        IN_FRONT = 0x10;
        IN_BACK = 0x20;
        IN_MONO = 0x10;
        IN_STEREO = 0xc;
        IN_FRONT_BACK = 0x30;
    }
}

impl ChannelMask {
    /// Protocol name of an output channel mask
    pub fn output_name(self) -> Option<&'static str> {
        match self {
            Self::OUT_STEREO => Some("AUDIO_CHANNEL_OUT_STEREO"),
            Self::OUT_5POINT1 => Some("AUDIO_CHANNEL_OUT_5POINT1"),
            Self::OUT_7POINT1 => Some("AUDIO_CHANNEL_OUT_7POINT1"),
            _ => None,
        }
    }
}

bitmask! {
    /// Flags attached to an output stream open request
    OutputFlags {
        DIRECT = 0x1;
        PRIMARY = 0x2;
        FAST = 0x4;
        DEEP_BUFFER = 0x8;
    }
}

/// Device operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AudioMode {
    #[default]
    Normal,
    Ringtone,
    InCall,
    /// VoIP
    InCommunication,
}

/// TTY (teletypewriter) accessory mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TtyMode {
    #[default]
    Off,
    /// Voice carry-over: user speaks, reads text
    Vco,
    /// Hearing carry-over: user listens, types text
    Hco,
    Full,
}

impl FromStr for TtyMode {
    type Err = HalError;

    fn from_str(s: &str) -> HalResult<Self> {
        match s {
            "tty_off" | "off" => Ok(Self::Off),
            "tty_vco" | "vco" => Ok(Self::Vco),
            "tty_hco" | "hco" => Ok(Self::Hco),
            "tty_full" | "full" => Ok(Self::Full),
            other => Err(HalError::invalid_argument(format!("unknown tty mode '{}'", other))),
        }
    }
}

impl TtyMode {
    /// Parameter protocol value
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "tty_off",
            Self::Vco => "tty_vco",
            Self::Hco => "tty_hco",
            Self::Full => "tty_full",
        }
    }
}

/// Capture use case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InputSource {
    #[default]
    Default,
    Mic,
    VoiceUplink,
    VoiceDownlink,
    VoiceCall,
    Camcorder,
    VoiceRecognition,
    /// VoIP
    VoiceCommunication,
    Other(u32),
}

impl InputSource {
    /// Decode a protocol source value
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::Default,
            1 => Self::Mic,
            2 => Self::VoiceUplink,
            3 => Self::VoiceDownlink,
            4 => Self::VoiceCall,
            5 => Self::Camcorder,
            6 => Self::VoiceRecognition,
            7 => Self::VoiceCommunication,
            other => Self::Other(other),
        }
    }

    /// Protocol source value
    pub fn raw(self) -> u32 {
        match self {
            Self::Default => 0,
            Self::Mic => 1,
            Self::VoiceUplink => 2,
            Self::VoiceDownlink => 3,
            Self::VoiceCall => 4,
            Self::Camcorder => 5,
            Self::VoiceRecognition => 6,
            Self::VoiceCommunication => 7,
            Self::Other(raw) => raw,
        }
    }
}

/// Output stream variants; at most one stream of each may exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputVariant {
    LowLatency,
    DeepBuffer,
    /// Multichannel HDMI
    Hdmi,
}

impl OutputVariant {
    pub const ALL: [OutputVariant; 3] = [Self::LowLatency, Self::DeepBuffer, Self::Hdmi];

    /// Slot index in the coordinator's output table
    pub const fn index(self) -> usize {
        match self {
            Self::LowLatency => 0,
            Self::DeepBuffer => 1,
            Self::Hdmi => 2,
        }
    }

    /// Choose the variant for an open request
    pub fn for_request(devices: OutputDevices, flags: OutputFlags) -> Self {
        if flags.contains(OutputFlags::DIRECT) && devices == OutputDevices::AUX_DIGITAL {
            Self::Hdmi
        } else if flags.contains(OutputFlags::DEEP_BUFFER) {
            Self::DeepBuffer
        } else {
            Self::LowLatency
        }
    }
}

impl fmt::Display for OutputVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LowLatency => write!(f, "low-latency"),
            Self::DeepBuffer => write!(f, "deep-buffer"),
            Self::Hdmi => write!(f, "hdmi"),
        }
    }
}

/// Sample format of stream buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SampleFormat {
    Pcm8,
    #[default]
    Pcm16,
    Pcm24Packed,
    Pcm32,
    Float,
}

impl SampleFormat {
    /// Bytes per sample
    pub fn bytes(self) -> usize {
        match self {
            Self::Pcm8 => 1,
            Self::Pcm16 => 2,
            Self::Pcm24Packed => 3,
            Self::Pcm32 | Self::Float => 4,
        }
    }
}

/// Requested or negotiated stream configuration; zero fields mean "use the default"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreamConfig {
    pub sample_rate: u32,
    pub channel_mask: ChannelMask,
    pub format: SampleFormat,
}

impl StreamConfig {
    pub fn new(sample_rate: u32, channel_mask: ChannelMask) -> Self {
        Self {
            sample_rate,
            channel_mask,
            format: SampleFormat::Pcm16,
        }
    }

    /// Set the sample format
    pub fn with_format(mut self, format: SampleFormat) -> Self {
        self.format = format;
        self
    }

    pub fn channel_count(&self) -> usize {
        self.channel_mask.count() as usize
    }
}

/// A (main, auxiliary) capture channel pair supported by an effect or the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub main: ChannelMask,
    pub aux: ChannelMask,
}

impl ChannelConfig {
    pub const fn new(main: ChannelMask, aux: ChannelMask) -> Self {
        Self { main, aux }
    }
}
