//! Tunable constants of the audio core
//!
//! Everything board-specific lives here: PCM period geometry, sample rates,
//! the deep-buffer power thresholds, the analog/digital gain tables and the
//! auxiliary channel layouts the capture driver can deliver. Defaults match
//! the reference handset; a board can override any of them from JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HalError, HalResult};
use crate::types::{ChannelConfig, ChannelMask};

/// Playback PCM geometry and rates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Rate of the mixer front ends when running at full power
    pub full_power_rate: u32,
    /// Rate used for 44.1 kHz family content
    pub low_power_rate: u32,
    /// Nominal rate exposed by the low-latency and deep-buffer streams
    pub default_rate: u32,
    /// Derive the endpoint rate from the stream rate instead of always using full power
    pub variable_sampling_rate: bool,
    pub short_period_size: usize,
    pub short_period_count: usize,
    pub deep_short_period_size: usize,
    pub deep_long_period_size: usize,
    pub deep_long_period_count: usize,
    pub deep_start_threshold: usize,
    /// Kernel occupancy above which deep-buffer writes wait (screen on or capture active)
    pub deep_short_write_threshold: usize,
    /// Kernel occupancy above which deep-buffer writes wait (screen off, no capture)
    pub deep_long_write_threshold: usize,
    pub min_write_sleep_us: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            full_power_rate: 48000,
            low_power_rate: 44100,
            default_rate: 44100,
            variable_sampling_rate: false,
            short_period_size: 192,
            short_period_count: 2,
            deep_short_period_size: 1056,
            deep_long_period_size: 4224,
            deep_long_period_count: 2,
            deep_start_threshold: 1056,
            deep_short_write_threshold: 4224,
            deep_long_write_threshold: 7392,
            min_write_sleep_us: 5000,
        }
    }
}

/// Capture PCM geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub rate: u32,
    pub period_size: usize,
    pub period_count: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            rate: 48000,
            period_size: 384,
            period_count: 2,
        }
    }
}

/// Multichannel HDMI PCM geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HdmiConfig {
    pub period_size: usize,
    pub period_count: usize,
    pub default_channels: usize,
    /// Control on the HDMI card reporting the sink's LPCM channel capability
    pub max_channels_control: String,
}

impl Default for HdmiConfig {
    fn default() -> Self {
        Self {
            period_size: 336,
            period_count: 8,
            default_channels: 6,
            max_channels_control: "Maximum LPCM channels".to_string(),
        }
    }
}

/// Modem voice PCM geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModemConfig {
    pub narrowband_rate: u32,
    pub wideband_rate: u32,
    pub period_size: usize,
    pub period_count: usize,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            narrowband_rate: 8000,
            wideband_rate: 16000,
            period_size: 160,
            period_count: 2,
        }
    }
}

/// Per-microphone capture gains in dB
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MicGains {
    pub main: i32,
    pub sub: i32,
    pub headset: i32,
}

impl MicGains {
    pub const fn new(main: i32, sub: i32, headset: i32) -> Self {
        Self { main, sub, headset }
    }
}

/// Analog output gains for one operating mode, in dB
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeGains {
    pub speaker: i32,
    pub headset: i32,
    pub earpiece: i32,
}

/// All gain tables, in dB
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GainTable {
    pub normal_speaker: i32,
    pub normal_headset: i32,
    pub normal_headphone: i32,
    pub normal_earpiece: i32,
    pub voice_call: ModeGains,
    pub voip: ModeGains,
    /// Fixed headset gain while a TTY device drives the downlink
    pub headphone_tty: i32,
    pub ringtone_headset_offset: i32,
    pub capture_mic: MicGains,
    pub voice_recognition_mic: MicGains,
    pub camcorder_mic: MicGains,
    pub voip_mic: MicGains,
    pub voice_call_mic: MicGains,
}

impl Default for GainTable {
    fn default() -> Self {
        Self {
            normal_speaker: 6,
            normal_headset: -12,
            normal_headphone: -12,
            normal_earpiece: -2,
            voice_call: ModeGains {
                speaker: 6,
                headset: 0,
                earpiece: 2,
            },
            voip: ModeGains {
                speaker: 7,
                headset: -6,
                earpiece: 6,
            },
            headphone_tty: -2,
            ringtone_headset_offset: -14,
            capture_mic: MicGains::new(16, 18, 12),
            voice_recognition_mic: MicGains::new(5, 18, 14),
            camcorder_mic: MicGains::new(15, 15, 12),
            voip_mic: MicGains::new(14, 14, 14),
            voice_call_mic: MicGains::new(10, 10, 8),
        }
    }
}

/// Complete configuration of the audio core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HalConfig {
    pub playback: PlaybackConfig,
    pub capture: CaptureConfig,
    pub hdmi: HdmiConfig,
    pub modem: ModemConfig,
    pub gains: GainTable,
    /// Capacity of each input stream's pre-processing chain
    pub max_preprocessors: usize,
    /// (main, aux) capture layouts the driver can deliver, in preference order
    pub aux_channel_configs: Vec<ChannelConfig>,
}

impl Default for HalConfig {
    fn default() -> Self {
        Self {
            playback: PlaybackConfig::default(),
            capture: CaptureConfig::default(),
            hdmi: HdmiConfig::default(),
            modem: ModemConfig::default(),
            gains: GainTable::default(),
            max_preprocessors: 3,
            aux_channel_configs: vec![
                ChannelConfig::new(ChannelMask::IN_FRONT, ChannelMask::IN_BACK),
                ChannelConfig::new(ChannelMask::IN_STEREO, ChannelMask::IN_RIGHT),
            ],
        }
    }
}

impl HalConfig {
    /// Parse a configuration from JSON; absent fields take their defaults
    pub fn from_json_str(json: &str) -> HalResult<Self> {
        let config: HalConfig = serde_json::from_str(json)
            .map_err(|e| HalError::config(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> HalResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Override the pre-processing chain capacity
    pub fn with_max_preprocessors(mut self, max: usize) -> Self {
        self.max_preprocessors = max;
        self
    }

    /// Enable or disable variable output sampling rate
    pub fn with_variable_sampling_rate(mut self, enabled: bool) -> Self {
        self.playback.variable_sampling_rate = enabled;
        self
    }

    /// Replace the gain tables
    pub fn with_gains(mut self, gains: GainTable) -> Self {
        self.gains = gains;
        self
    }

    /// Reject configurations the stream engines cannot run with
    pub fn validate(&self) -> HalResult<()> {
        let rates = [
            ("playback.full_power_rate", self.playback.full_power_rate),
            ("playback.low_power_rate", self.playback.low_power_rate),
            ("playback.default_rate", self.playback.default_rate),
            ("capture.rate", self.capture.rate),
            ("modem.narrowband_rate", self.modem.narrowband_rate),
            ("modem.wideband_rate", self.modem.wideband_rate),
        ];
        for (name, rate) in rates {
            if rate == 0 {
                return Err(HalError::config(format!("{} must be non-zero", name)));
            }
        }

        let periods = [
            ("playback.short_period_size", self.playback.short_period_size),
            ("playback.short_period_count", self.playback.short_period_count),
            ("playback.deep_short_period_size", self.playback.deep_short_period_size),
            ("playback.deep_long_period_size", self.playback.deep_long_period_size),
            ("playback.deep_long_period_count", self.playback.deep_long_period_count),
            ("capture.period_size", self.capture.period_size),
            ("capture.period_count", self.capture.period_count),
            ("hdmi.period_size", self.hdmi.period_size),
            ("hdmi.period_count", self.hdmi.period_count),
            ("modem.period_size", self.modem.period_size),
        ];
        for (name, value) in periods {
            if value == 0 {
                return Err(HalError::config(format!("{} must be non-zero", name)));
            }
        }

        if self.max_preprocessors == 0 {
            return Err(HalError::config("max_preprocessors must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = HalConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_preprocessors, 3);
        assert_eq!(config.aux_channel_configs.len(), 2);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{ "max_preprocessors": 5, "playback": { "variable_sampling_rate": true } }"#;
        let config = HalConfig::from_json_str(json).unwrap();
        assert_eq!(config.max_preprocessors, 5);
        assert!(config.playback.variable_sampling_rate);
        assert_eq!(config.playback.full_power_rate, 48000);
        assert_eq!(config.gains, GainTable::default());
    }

    #[test]
    fn test_zero_rate_rejected() {
        let json = r#"{ "capture": { "rate": 0 } }"#;
        let err = HalConfig::from_json_str(json).unwrap_err();
        assert!(matches!(err, HalError::Config { .. }));
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(HalConfig::from_json_str("{ not json").is_err());
    }

    #[test]
    fn test_builder_overrides() {
        let config = HalConfig::default()
            .with_max_preprocessors(1)
            .with_variable_sampling_rate(true);
        assert_eq!(config.max_preprocessors, 1);
        assert!(config.playback.variable_sampling_rate);
    }
}
