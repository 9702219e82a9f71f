//! Shared fixtures for the audio HAL integration tests
//!
//! A [`Rig`] wires an [`AudioHal`] to the in-memory mixer, transport and
//! call-path control and keeps handles to all three so tests can inspect
//! what the core asked of the hardware.

#![allow(dead_code)]

use std::sync::Arc;

use rvoip_audio_hal::hal::ResamplerFactory;
use rvoip_audio_hal::logging::{LoggingConfig, setup_logging};
use rvoip_audio_hal::mock::{MockCallPath, MockMixer, MockTransport};
use rvoip_audio_hal::prelude::*;
use rvoip_audio_hal::route::table::RouteSetting;
use rvoip_audio_hal::route::table::RouteValue;

/// Install the captured test subscriber once per test binary; `RUST_LOG` overrides
pub fn init_tracing() {
    let _ = setup_logging(LoggingConfig::for_tests());
}

pub struct Rig {
    pub hal: AudioHal,
    pub mixer: Arc<MockMixer>,
    pub hdmi_mixer: Option<Arc<MockMixer>>,
    pub transport: MockTransport,
    pub call_path: Arc<MockCallPath>,
}

/// Builder for a [`Rig`]
pub struct RigBuilder {
    mixer: MockMixer,
    hdmi_mixer: Option<MockMixer>,
    config: HalConfig,
    resamplers: Option<Arc<dyn ResamplerFactory>>,
}

impl RigBuilder {
    pub fn mixer(mut self, mixer: MockMixer) -> Self {
        self.mixer = mixer;
        self
    }

    /// Attach a digital card reporting `max_channels` LPCM channels
    pub fn hdmi(mut self, max_channels: i32) -> Self {
        self.hdmi_mixer = Some(MockMixer::hdmi(max_channels));
        self
    }

    pub fn config(mut self, config: HalConfig) -> Self {
        self.config = config;
        self
    }

    pub fn resamplers(mut self, factory: Arc<dyn ResamplerFactory>) -> Self {
        self.resamplers = Some(factory);
        self
    }

    pub fn build(self) -> Rig {
        init_tracing();
        let mixer = Arc::new(self.mixer);
        let transport = MockTransport::new();
        let call_path = Arc::new(MockCallPath::new());

        let mut backends = HalBackends::new(mixer.clone(), Arc::new(transport.clone()), call_path.clone());
        let hdmi_mixer = self.hdmi_mixer.map(Arc::new);
        if let Some(hdmi) = &hdmi_mixer {
            backends = backends.with_hdmi_mixer(hdmi.clone());
        }
        if let Some(factory) = self.resamplers {
            backends = backends.with_resampler_factory(factory);
        }

        let hal = AudioHal::open(backends, self.config).expect("device opens");
        Rig {
            hal,
            mixer,
            hdmi_mixer,
            transport,
            call_path,
        }
    }
}

impl Rig {
    pub fn builder() -> RigBuilder {
        RigBuilder {
            mixer: MockMixer::new(),
            hdmi_mixer: None,
            config: HalConfig::default(),
            resamplers: None,
        }
    }

    /// Device with default configuration and no HDMI card
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Open the low-latency stream on `devices`
    pub fn low_latency(&self, devices: OutputDevices) -> OutputStream {
        let (stream, _) = self
            .hal
            .open_output_stream(devices, OutputFlags::PRIMARY, &StreamConfig::default())
            .expect("low-latency stream opens");
        if devices != OutputDevices::SPEAKER {
            stream
                .set_parameters(&format!("routing={}", devices.bits()))
                .expect("routing accepted");
        }
        stream
    }

    pub fn deep_buffer(&self) -> OutputStream {
        let (stream, _) = self
            .hal
            .open_output_stream(OutputDevices::SPEAKER, OutputFlags::DEEP_BUFFER, &StreamConfig::default())
            .expect("deep-buffer stream opens");
        stream
    }

    /// Open the multichannel HDMI stream with the sink's default layout
    pub fn hdmi_stream(&self) -> (OutputStream, StreamConfig) {
        self.hal
            .open_output_stream(OutputDevices::AUX_DIGITAL, OutputFlags::DIRECT, &StreamConfig::default())
            .expect("HDMI stream opens")
    }

    pub fn input(&self, rate: u32, mask: ChannelMask, source: InputSource) -> InputStream {
        self.hal
            .open_input_stream(InputDevices::BUILTIN_MIC, &StreamConfig::new(rate, mask), source)
            .expect("input stream opens")
    }

    /// True when every setting of `table` is in its enabled state
    pub fn route_enabled(&self, table: &[RouteSetting]) -> bool {
        table.iter().all(|setting| match setting.value {
            RouteValue::Enum(value) => self.mixer.enum_value(setting.control).as_deref() == Some(value),
            RouteValue::Int(value) => self.mixer.int_value(setting.control, 0) == Some(value),
        })
    }
}

/// One period of silence for a stream with `channels` channels
pub fn period(frames: usize, channels: usize) -> Vec<i16> {
    vec![0; frames * channels]
}
