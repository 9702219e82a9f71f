//! Static route tables
//!
//! Each table lists the controls that together enable one signal path.
//! Disabling a table sets enumerated controls to `"Off"` and integer
//! controls to 0.

use crate::route::gain::ABE_GAIN_0DB;

/// Value a route applies to its control when enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteValue {
    Enum(&'static str),
    /// Applied to every value of the control so stereo pairs move together
    Int(i32),
}

/// One control of a route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteSetting {
    pub control: &'static str,
    pub value: RouteValue,
}

const fn en(control: &'static str, value: &'static str) -> RouteSetting {
    RouteSetting {
        control,
        value: RouteValue::Enum(value),
    }
}

const fn int(control: &'static str, value: i32) -> RouteSetting {
    RouteSetting {
        control,
        value: RouteValue::Int(value),
    }
}

// Enumerated control values
pub const OFF: &str = "Off";
pub const MAIN_MIC: &str = "Main Mic";
pub const SUB_MIC: &str = "Sub Mic";
pub const HEADSET_MIC: &str = "Headset Mic";
pub const EQ_4KHZ_LPF: &str = "4Khz LPF   0dB";
pub const EQ_FLAT: &str = "Flat response";
pub const EQ_450HZ_HPF: &str = "450Hz High-pass 0dB";
pub const AMIC0: &str = "AMic0";
pub const AMIC1: &str = "AMic1";
pub const BT_LEFT: &str = "BT Left";
pub const BT_RIGHT: &str = "BT Right";

/// Applied once at startup before any stream opens
pub const DEFAULTS: &[RouteSetting] = &[
    en("DL2 Left Equalizer", EQ_450HZ_HPF),
    en("DL2 Right Equalizer", EQ_450HZ_HPF),
    en("DL1 Equalizer", EQ_FLAT),
    int("DL1 Media Playback Volume", ABE_GAIN_0DB - 2),
    int("DL2 Media Playback Volume", ABE_GAIN_0DB),
    int("DL1 Voice Playback Volume", ABE_GAIN_0DB),
    int("DL2 Voice Playback Volume", ABE_GAIN_0DB),
    int("SDT DL Volume", ABE_GAIN_0DB),
    int("AUDUL Voice UL Volume", ABE_GAIN_0DB),
    int("Capture Preamplifier Volume", 1),
    int("Capture Volume", 4),
    int("SDT UL Volume", ABE_GAIN_0DB - 30),
    int("Sidetone Mixer Capture", 0),
];

/// Headset/headphone output stage
pub const HS_OUTPUT: &[RouteSetting] = &[
    en("Headset Left Playback", "HS DAC"),
    en("Headset Right Playback", "HS DAC"),
    en("Headset Power Mode", "Low-Power"),
];

/// Handsfree speaker output stage
pub const HF_OUTPUT: &[RouteSetting] = &[
    en("Handsfree Left Playback", "HF DAC"),
    en("Handsfree Right Playback", "HF DAC"),
];

/// Multimedia uplink from a Bluetooth headset
pub const MM_UL2_BT: &[RouteSetting] = &[en("MUX_UL10", BT_LEFT), en("MUX_UL11", BT_LEFT)];

/// Multimedia uplink from the left analog mic
pub const MM_UL2_AMIC_LEFT: &[RouteSetting] = &[en("MUX_UL10", AMIC0), en("MUX_UL11", AMIC0)];

/// Multimedia uplink from the right analog mic
pub const MM_UL2_AMIC_RIGHT: &[RouteSetting] = &[en("MUX_UL10", AMIC1), en("MUX_UL11", AMIC1)];

/// Dual-mic uplink, main mic first
pub const MM_UL2_AMIC_DUAL_MAIN_SUB: &[RouteSetting] =
    &[en("MUX_UL10", AMIC0), en("MUX_UL11", AMIC1)];

/// Dual-mic uplink, sub mic first
pub const MM_UL2_AMIC_DUAL_SUB_MAIN: &[RouteSetting] =
    &[en("MUX_UL10", AMIC1), en("MUX_UL11", AMIC0)];

/// Voice uplink from the left analog mic
pub const VX_UL_AMIC_LEFT: &[RouteSetting] = &[en("MUX_VX0", AMIC0), en("MUX_VX1", AMIC0)];

/// Voice uplink from the right analog mic
pub const VX_UL_AMIC_RIGHT: &[RouteSetting] = &[en("MUX_VX0", AMIC1), en("MUX_VX1", AMIC1)];

/// Voice uplink from Bluetooth
pub const VX_UL_BT: &[RouteSetting] = &[en("MUX_VX0", BT_LEFT), en("MUX_VX1", BT_RIGHT)];

/// Every table, for tooling that needs the full control inventory
pub const ALL_TABLES: &[(&str, &[RouteSetting])] = &[
    ("defaults", DEFAULTS),
    ("hs_output", HS_OUTPUT),
    ("hf_output", HF_OUTPUT),
    ("mm_ul2_bt", MM_UL2_BT),
    ("mm_ul2_amic_left", MM_UL2_AMIC_LEFT),
    ("mm_ul2_amic_right", MM_UL2_AMIC_RIGHT),
    ("mm_ul2_amic_dual_main_sub", MM_UL2_AMIC_DUAL_MAIN_SUB),
    ("mm_ul2_amic_dual_sub_main", MM_UL2_AMIC_DUAL_SUB_MAIN),
    ("vx_ul_amic_left", VX_UL_AMIC_LEFT),
    ("vx_ul_amic_right", VX_UL_AMIC_RIGHT),
    ("vx_ul_bt", VX_UL_BT),
];
