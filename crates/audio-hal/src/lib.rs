//! # Audio-HAL: Routing and Stream Management for Mobile Voice Hardware
//!
//! This library is the policy core of a phone's audio hardware layer. It
//! decides which mixer paths, gains and modem audio paths are active for the
//! current mode and devices, and it runs the playback and capture streams
//! that move PCM frames between applications and the hardware.
//!
//! ## Components
//!
//! - **Routing**: pure route plans computed from the device state, applied
//!   to a [`hal::Mixer`]; loudness-preserving gain model with overrange
//!   compensation
//! - **Output streams**: low-latency (with S/PDIF and HDMI duplication),
//!   power-saving deep buffer, and multichannel HDMI
//! - **Input stream**: direct, resample-only and pre-processing read paths
//!   with auxiliary microphone channel negotiation
//! - **Echo reference**: delay-annotated copy of the low-latency playback fed
//!   to capture-side echo cancellers
//! - **Call control**: modem audio endpoints at narrowband or wideband rate
//!
//! The hardware itself (mixer, PCM transport, modem call-path control,
//! resampler) is reached through the traits in [`hal`]; [`mock`] implements
//! them in memory.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use rvoip_audio_hal::prelude::*;
//! use rvoip_audio_hal::mock::{MockCallPath, MockMixer, MockTransport};
//!
//! let backends = HalBackends::new(
//!     Arc::new(MockMixer::new()),
//!     Arc::new(MockTransport::new()),
//!     Arc::new(MockCallPath::new()),
//! );
//! let hal = AudioHal::open(backends, HalConfig::default())?;
//!
//! let (output, config) = hal.open_output_stream(
//!     OutputDevices::SPEAKER,
//!     OutputFlags::PRIMARY,
//!     &StreamConfig::default(),
//! )?;
//! let samples = vec![0i16; 441 * config.channel_count()];
//! output.write(&samples)?;
//! # Ok::<(), HalError>(())
//! ```

pub mod call;
pub mod config;
pub mod device;
pub mod echo;
pub mod effects;
pub mod error;
pub mod hal;
pub mod logging;
pub mod mock;
pub mod params;
pub mod route;
pub mod stream;
pub mod types;

// Re-export commonly used types
pub use config::HalConfig;
pub use device::{AudioHal, DeviceSnapshot, HalBackends};
pub use effects::{EffectId, EffectKind, PreProcessor};
pub use error::{HalError, HalResult};
pub use stream::{InputStream, OutputStream, ReadTier};
pub use types::{
    AudioMode, ChannelConfig, ChannelMask, InputDevices, InputSource, OutputDevices, OutputFlags,
    OutputVariant, SampleFormat, StreamConfig, TtyMode,
};

/// Version information for the audio HAL library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export of common types and functions
pub mod prelude {
    pub use super::{
        AudioHal, AudioMode, ChannelMask, DeviceSnapshot, HalBackends, HalConfig, HalError, HalResult,
        InputDevices, InputSource, InputStream, OutputDevices, OutputFlags, OutputStream, OutputVariant,
        StreamConfig, TtyMode,
    };
}
