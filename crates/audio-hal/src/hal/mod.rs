//! Interfaces to the collaborators the core drives but does not implement
//!
//! - [`mixer`]: named hardware mixer controls
//! - [`transport`]: PCM frame transport endpoints
//! - [`call_path`]: the modem's call-audio path control
//! - [`resampler`]: sample-rate conversion, with a linear reference implementation

pub mod call_path;
pub mod mixer;
pub mod resampler;
pub mod transport;

pub use call_path::{CallAudioPath, CallPathControl, SoundKind, WidebandListener};
pub use mixer::{ControlId, Mixer, MixerControls, MixerCtl};
pub use resampler::{
    FrameProvider, LinearResampler, LinearResamplerFactory, Resampler, ResamplerFactory,
    ResamplerQuality,
};
pub use transport::{Direction, Endpoint, Pcm, PcmConfig, PcmTimestamp, Transport};
