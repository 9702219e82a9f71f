//! Input stream engine integration tests

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rvoip_audio_hal::hal::{
    Direction, Endpoint, FrameProvider, LinearResamplerFactory, MixerCtl, Resampler, ResamplerFactory,
    ResamplerQuality,
};
use rvoip_audio_hal::mock::MockEffect;
use rvoip_audio_hal::prelude::*;
use rvoip_audio_hal::route::table;
use rvoip_audio_hal::{ChannelConfig, ReadTier};

use common::Rig;

/// Resampler wrapper counting the frames it hands out
struct CountingResampler {
    inner: Box<dyn Resampler>,
    produced: Arc<AtomicUsize>,
}

impl Resampler for CountingResampler {
    fn resample(&mut self, input: &[i16], output: &mut [i16]) -> (usize, usize) {
        self.inner.resample(input, output)
    }

    fn resample_from_provider(&mut self, provider: &mut dyn FrameProvider, output: &mut [i16]) -> HalResult<usize> {
        let frames = self.inner.resample_from_provider(provider, output)?;
        self.produced.fetch_add(frames, Ordering::SeqCst);
        Ok(frames)
    }

    fn reset(&mut self) {
        self.inner.reset();
    }

    fn delay_ns(&self) -> i64 {
        self.inner.delay_ns()
    }
}

#[derive(Default)]
struct CountingFactory {
    produced: Arc<AtomicUsize>,
}

impl ResamplerFactory for CountingFactory {
    fn create(
        &self,
        in_rate: u32,
        out_rate: u32,
        channels: usize,
        quality: ResamplerQuality,
    ) -> HalResult<Box<dyn Resampler>> {
        Ok(Box::new(CountingResampler {
            inner: LinearResamplerFactory.create(in_rate, out_rate, channels, quality)?,
            produced: Arc::clone(&self.produced),
        }))
    }
}

fn dual_mic_effect() -> MockEffect {
    MockEffect::noise_suppressor().with_channel_configs(vec![ChannelConfig::new(
        ChannelMask::IN_FRONT,
        ChannelMask::IN_BACK,
    )])
}

#[cfg(test)]
mod read_path_tests {
    use super::*;

    #[test]
    fn test_direct_read() {
        let rig = Rig::new();
        rig.transport.set_capture_value(321);
        let input = rig.input(48000, ChannelMask::IN_MONO, InputSource::Mic);
        assert_eq!(input.read_tier(), ReadTier::Direct);

        let mut buffer = vec![0i16; 480];
        assert_eq!(input.read(&mut buffer).unwrap(), 960);
        assert!(buffer.iter().all(|&s| s == 321));

        let open = rig.transport.opens().pop().unwrap();
        assert_eq!(open.endpoint, Endpoint::CaptureUplink);
        assert_eq!(open.direction, Direction::Capture);
        assert_eq!(open.config.rate, 48000);
        assert_eq!(open.config.channels, 1);
    }

    #[test]
    fn test_resample_only_returns_exact_frame_count() {
        let factory = Arc::new(CountingFactory::default());
        let produced = Arc::clone(&factory.produced);
        let rig = Rig::builder().resamplers(factory).build();
        rig.transport.set_capture_value(1000);

        let input = rig.input(16000, ChannelMask::IN_MONO, InputSource::Mic);
        assert_eq!(input.read_tier(), ReadTier::ResampleOnly);

        let mut buffer = vec![0i16; 160];
        assert_eq!(input.read(&mut buffer).unwrap(), 320);
        assert_eq!(produced.load(Ordering::SeqCst), 160);
        input.read(&mut buffer).unwrap();
        assert_eq!(produced.load(Ordering::SeqCst), 320);
        // Interpolating a constant signal gives the same constant
        assert!(buffer.iter().all(|&s| s == 1000));
    }

    #[test]
    fn test_mic_mute_outside_call() {
        let rig = Rig::new();
        rig.transport.set_capture_value(500);
        let input = rig.input(48000, ChannelMask::IN_MONO, InputSource::Mic);
        let mut buffer = vec![0i16; 480];

        rig.hal.set_mic_mute(true).unwrap();
        input.read(&mut buffer).unwrap();
        assert!(buffer.iter().all(|&s| s == 0));

        rig.hal.set_mic_mute(false).unwrap();
        input.read(&mut buffer).unwrap();
        assert!(buffer.iter().all(|&s| s == 500));
    }

    #[test]
    fn test_read_failure_returns_silence() {
        let rig = Rig::new();
        rig.transport.set_capture_value(500);
        rig.transport.fail_io(Endpoint::CaptureUplink);
        let input = rig.input(48000, ChannelMask::IN_MONO, InputSource::Mic);

        let mut buffer = vec![1i16; 480];
        assert_eq!(input.read(&mut buffer).unwrap(), 960);
        assert!(buffer.iter().all(|&s| s == 0));
        assert!(!input.is_standby());
    }

    #[test]
    fn test_activation_failure() {
        let rig = Rig::new();
        rig.transport.fail_open(Endpoint::CaptureUplink, Direction::Capture);
        let input = rig.input(48000, ChannelMask::IN_MONO, InputSource::Mic);

        let mut buffer = vec![0i16; 480];
        assert!(matches!(input.read(&mut buffer), Err(HalError::ResourceExhausted { .. })));
        assert!(input.is_standby());

        let snapshot = rig.hal.snapshot();
        assert_eq!(snapshot.active_capture, None);
        assert_eq!(snapshot.in_device, InputDevices::empty());
        assert_eq!(
            rig.mixer.enum_value(MixerCtl::LeftCaptureRoute.name()).as_deref(),
            Some(table::OFF)
        );
        assert!(!rig.route_enabled(table::MM_UL2_AMIC_LEFT));
    }

    #[test]
    fn test_partial_frame_rejected() {
        let rig = Rig::new();
        let input = rig.input(48000, ChannelMask::IN_STEREO, InputSource::Mic);

        let mut buffer = vec![0i16; 481];
        assert!(matches!(input.read(&mut buffer), Err(HalError::InvalidArgument { .. })));
        assert!(input.is_standby());

        let mut buffer = vec![0i16; 480];
        assert_eq!(input.read(&mut buffer).unwrap(), 960);
    }

    #[test]
    fn test_buffer_sizes() {
        let rig = Rig::new();
        assert_eq!(rig.hal.input_buffer_size(&StreamConfig::new(16000, ChannelMask::IN_MONO)), 256);
        assert_eq!(rig.hal.input_buffer_size(&StreamConfig::new(96000, ChannelMask::IN_MONO)), 0);

        let input = rig.input(16000, ChannelMask::IN_MONO, InputSource::Mic);
        assert_eq!(input.buffer_size(), 256);
        assert_eq!(input.sample_rate(), 16000);
        assert_eq!(input.frames_lost(), 0);
    }

    #[test]
    fn test_unsupported_request_rejected() {
        let rig = Rig::new();
        let result = rig.hal.open_input_stream(
            InputDevices::BUILTIN_MIC,
            &StreamConfig::new(12000, ChannelMask::IN_MONO),
            InputSource::Mic,
        );
        assert!(matches!(result, Err(HalError::InvalidArgument { .. })));
        assert!(!rig.hal.snapshot().input_open);
    }
}

#[cfg(test)]
mod routing_tests {
    use super::*;

    #[test]
    fn test_capture_routes_selected_microphone() {
        let rig = Rig::new();
        let input = rig
            .hal
            .open_input_stream(
                InputDevices::WIRED_HEADSET,
                &StreamConfig::new(48000, ChannelMask::IN_MONO),
                InputSource::Mic,
            )
            .unwrap();
        let mut buffer = vec![0i16; 480];
        input.read(&mut buffer).unwrap();

        let snapshot = rig.hal.snapshot();
        assert_eq!(snapshot.in_device, InputDevices::WIRED_HEADSET);
        assert!(snapshot.active_capture.is_some());
        assert_eq!(
            rig.mixer.enum_value(MixerCtl::LeftCaptureRoute.name()).as_deref(),
            Some(table::HEADSET_MIC)
        );

        input.standby();
        assert_eq!(rig.hal.snapshot().in_device, InputDevices::empty());
        assert_eq!(
            rig.mixer.enum_value(MixerCtl::LeftCaptureRoute.name()).as_deref(),
            Some(table::OFF)
        );
    }

    #[test]
    fn test_call_routing_wins() {
        let rig = Rig::new();
        rig.hal.set_mode(AudioMode::InCall).unwrap();
        let input = rig
            .hal
            .open_input_stream(
                InputDevices::WIRED_HEADSET,
                &StreamConfig::new(8000, ChannelMask::IN_MONO),
                InputSource::VoiceCall,
            )
            .unwrap();
        let mut buffer = vec![0i16; 80];
        input.read(&mut buffer).unwrap();

        let snapshot = rig.hal.snapshot();
        assert_eq!(snapshot.in_device, InputDevices::BUILTIN_MIC);
        assert_eq!(snapshot.active_capture.map(|a| a.source), Some(InputSource::VoiceCall));
    }

    #[test]
    fn test_source_change_forces_standby() {
        let rig = Rig::new();
        let input = rig.input(48000, ChannelMask::IN_MONO, InputSource::Mic);
        let mut buffer = vec![0i16; 480];
        input.read(&mut buffer).unwrap();

        input.set_parameters("input_source=1").unwrap();
        assert!(!input.is_standby());
        input.set_parameters("input_source=0").unwrap();
        assert!(!input.is_standby());

        input.set_parameters("input_source=5").unwrap();
        assert!(input.is_standby());
        assert_eq!(rig.hal.snapshot().active_capture, None);

        input.read(&mut buffer).unwrap();
        assert_eq!(
            rig.hal.snapshot().active_capture.map(|a| a.source),
            Some(InputSource::Camcorder)
        );
    }

    #[test]
    fn test_device_change_forces_standby() {
        let rig = Rig::new();
        let input = rig.input(48000, ChannelMask::IN_MONO, InputSource::Mic);
        let mut buffer = vec![0i16; 480];
        input.read(&mut buffer).unwrap();

        let headset = InputDevices::DIRECTION_BIT | InputDevices::WIRED_HEADSET.bits();
        input.set_parameters(&format!("routing={}", headset)).unwrap();
        assert!(input.is_standby());
        input.read(&mut buffer).unwrap();
        assert_eq!(rig.hal.snapshot().in_device, InputDevices::WIRED_HEADSET);
    }
}

#[cfg(test)]
mod effect_tests {
    use super::*;

    #[test]
    fn test_dual_mic_negotiation() {
        let rig = Rig::new();
        let input = rig.input(48000, ChannelMask::IN_MONO, InputSource::Mic);

        let dual = dual_mic_effect();
        let stats = dual.stats();
        let dual_id = input.add_effect(Box::new(dual)).unwrap();
        assert_eq!(input.aux_channels(), ChannelMask::IN_BACK);
        assert_eq!(
            stats.configured(),
            vec![ChannelConfig::new(ChannelMask::IN_MONO, ChannelMask::IN_BACK)]
        );

        // One effect without auxiliary support disables them for the chain
        let plain = MockEffect::gain_control().without_aux_support();
        let plain_id = input.add_effect(Box::new(plain)).unwrap();
        assert_eq!(input.aux_channels(), ChannelMask::empty());

        input.remove_effect(plain_id).unwrap();
        assert_eq!(input.aux_channels(), ChannelMask::IN_BACK);

        input.remove_effect(dual_id).unwrap();
        assert_eq!(input.aux_channels(), ChannelMask::empty());
        assert_eq!(input.read_tier(), ReadTier::Direct);
    }

    #[test]
    fn test_stereo_negotiation() {
        let rig = Rig::new();
        let input = rig.input(48000, ChannelMask::IN_STEREO, InputSource::Mic);
        let stereo = MockEffect::noise_suppressor().with_channel_configs(vec![ChannelConfig::new(
            ChannelMask::IN_STEREO,
            ChannelMask::IN_RIGHT,
        )]);
        input.add_effect(Box::new(stereo)).unwrap();
        assert_eq!(input.aux_channels(), ChannelMask::IN_RIGHT);

        let mono_only = MockEffect::noise_suppressor().with_channel_configs(vec![ChannelConfig::new(
            ChannelMask::IN_FRONT,
            ChannelMask::IN_BACK,
        )]);
        input.add_effect(Box::new(mono_only)).unwrap();
        assert_eq!(input.aux_channels(), ChannelMask::empty());
    }

    #[test]
    fn test_aux_channels_captured_and_stripped() {
        let rig = Rig::new();
        rig.transport.set_capture_value(100);
        let input = rig.input(48000, ChannelMask::IN_MONO, InputSource::Mic);
        input.add_effect(Box::new(dual_mic_effect().with_gain(2))).unwrap();
        assert_eq!(input.read_tier(), ReadTier::Preprocess);

        let mut buffer = vec![0i16; 480];
        assert_eq!(input.read(&mut buffer).unwrap(), 960);
        assert!(buffer.iter().all(|&s| s == 200));

        let open = rig.transport.opens().pop().unwrap();
        assert_eq!(open.endpoint, Endpoint::CaptureUplink);
        assert_eq!(open.config.channels, 2);
        assert!(rig.route_enabled(table::MM_UL2_AMIC_DUAL_MAIN_SUB));
        assert_eq!(
            rig.hal.snapshot().active_capture.map(|a| a.aux_channels),
            Some(ChannelMask::IN_BACK)
        );
    }

    #[test]
    fn test_headset_mic_has_no_aux_channels() {
        let rig = Rig::new();
        let input = rig.input(48000, ChannelMask::IN_MONO, InputSource::Mic);
        input.add_effect(Box::new(dual_mic_effect())).unwrap();
        assert_eq!(input.aux_channels(), ChannelMask::IN_BACK);

        let headset = InputDevices::DIRECTION_BIT | InputDevices::WIRED_HEADSET.bits();
        input.set_parameters(&format!("routing={}", headset)).unwrap();
        assert_eq!(input.aux_channels(), ChannelMask::empty());
    }

    #[test]
    fn test_configuration_failure_falls_back() {
        let rig = Rig::new();
        let input = rig.input(48000, ChannelMask::IN_MONO, InputSource::Mic);
        input
            .add_effect(Box::new(dual_mic_effect().failing_configuration()))
            .unwrap();
        assert_eq!(input.aux_channels(), ChannelMask::empty());

        let mut buffer = vec![0i16; 480];
        input.read(&mut buffer).unwrap();
        assert_eq!(rig.transport.opens().pop().unwrap().config.channels, 1);
    }

    #[test]
    fn test_chain_capacity() {
        let rig = Rig::builder()
            .config(HalConfig::default().with_max_preprocessors(2))
            .build();
        let input = rig.input(16000, ChannelMask::IN_MONO, InputSource::Mic);
        input.add_effect(Box::new(MockEffect::noise_suppressor())).unwrap();
        input.add_effect(Box::new(MockEffect::gain_control())).unwrap();

        let third = input.add_effect(Box::new(MockEffect::noise_suppressor()));
        assert!(matches!(third, Err(HalError::ResourceExhausted { .. })));
    }

    #[test]
    fn test_remove_unknown_effect() {
        let rig = Rig::new();
        let input = rig.input(16000, ChannelMask::IN_MONO, InputSource::Mic);
        let stray = MockEffect::noise_suppressor();
        assert!(matches!(
            input.remove_effect(stray.id()),
            Err(HalError::NotFound { .. })
        ));

        let id = input.add_effect(Box::new(MockEffect::noise_suppressor())).unwrap();
        assert!(matches!(input.remove_effect(stray.id()), Err(HalError::NotFound { .. })));
        let removed = input.remove_effect(id).unwrap();
        assert_eq!(removed.id(), id);
    }

    #[test]
    fn test_effects_run_in_order() {
        let rig = Rig::new();
        rig.transport.set_capture_value(10);
        let input = rig.input(48000, ChannelMask::IN_MONO, InputSource::Mic);

        let first = MockEffect::noise_suppressor().with_gain(3);
        let skipped = MockEffect::gain_control().passthrough();
        let last = MockEffect::noise_suppressor().with_gain(2);
        let skipped_stats = skipped.stats();
        input.add_effect(Box::new(first)).unwrap();
        input.add_effect(Box::new(skipped)).unwrap();
        input.add_effect(Box::new(last)).unwrap();

        let mut buffer = vec![0i16; 480];
        input.read(&mut buffer).unwrap();
        assert!(buffer.iter().all(|&s| s == 60));
        assert!(skipped_stats.process_calls() > 0);
    }

    #[test]
    fn test_read_path_change_forces_standby() {
        let rig = Rig::new();
        let input = rig.input(48000, ChannelMask::IN_MONO, InputSource::Mic);
        let mut buffer = vec![0i16; 480];
        input.read(&mut buffer).unwrap();
        assert_eq!(input.read_tier(), ReadTier::Direct);

        let id = input.add_effect(Box::new(MockEffect::noise_suppressor())).unwrap();
        assert_eq!(input.read_tier(), ReadTier::Preprocess);
        assert!(input.is_standby());

        input.read(&mut buffer).unwrap();
        assert!(!input.is_standby());
        input.remove_effect(id).unwrap();
        assert_eq!(input.read_tier(), ReadTier::Direct);
        assert!(input.is_standby());
    }
}
