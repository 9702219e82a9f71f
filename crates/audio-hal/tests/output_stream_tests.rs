//! Output stream engine integration tests
//!
//! Covers activation and endpoint selection per variant, digital sink
//! duplication, the HDMI and low-latency interplay, write failure handling
//! and the deep-buffer period modes.

mod common;

use std::time::{Duration, Instant};

use serial_test::serial;

use rvoip_audio_hal::hal::{Direction, Endpoint, MixerCtl};
use rvoip_audio_hal::mock::MockMixer;
use rvoip_audio_hal::prelude::*;
use rvoip_audio_hal::route::gain::ABE_GAIN_0DB;
use rvoip_audio_hal::route::table::{self, RouteValue};

use common::{Rig, period};

fn open_count(rig: &Rig, endpoint: Endpoint) -> usize {
    rig.transport.opens().iter().filter(|o| o.endpoint == endpoint).count()
}

fn stage_off(rig: &Rig, stage: &[table::RouteSetting]) -> bool {
    stage.iter().all(|setting| match setting.value {
        RouteValue::Enum(_) => rig.mixer.enum_value(setting.control).as_deref() == Some(table::OFF),
        RouteValue::Int(_) => rig.mixer.int_value(setting.control, 0) == Some(0),
    })
}

#[cfg(test)]
mod low_latency_tests {
    use super::*;

    #[test]
    fn test_speaker_playback() {
        let rig = Rig::new();
        let stream = rig.low_latency(OutputDevices::SPEAKER);
        assert!(stream.is_standby());

        let written = stream.write(&period(441, 2)).unwrap();
        assert_eq!(written, 441 * 2 * 2);
        assert!(!stream.is_standby());
        assert_eq!(rig.transport.open_endpoints(), vec![(Endpoint::Tones, Direction::Playback)]);
        assert_eq!(rig.transport.opens()[0].config.rate, 48000);

        assert!(rig.route_enabled(table::HF_OUTPUT));
        assert!(stage_off(&rig, table::HS_OUTPUT));
        assert_eq!(rig.mixer.int_value(MixerCtl::SpeakerVolume.name(), 0), Some(29));
        assert_eq!(rig.mixer.int_value(MixerCtl::Dl2MediaVolume.name(), 0), Some(ABE_GAIN_0DB));
        assert_eq!(rig.hal.snapshot().active_outputs, vec![OutputVariant::LowLatency]);
    }

    #[test]
    fn test_speaker_overrange_compensated_digitally() {
        // Amplifier tops out at 2 dB while the table asks for 6 dB
        let rig = Rig::builder()
            .mixer(MockMixer::new().with_range(MixerCtl::SpeakerVolume.name(), 0, 27))
            .build();
        assert_eq!(rig.mixer.int_value(MixerCtl::SpeakerVolume.name(), 0), Some(27));
        assert_eq!(rig.mixer.int_value(MixerCtl::Dl2MediaVolume.name(), 0), Some(ABE_GAIN_0DB + 4));
    }

    #[test]
    fn test_negotiated_configuration() {
        let rig = Rig::new();
        let stream = rig.low_latency(OutputDevices::SPEAKER);
        assert_eq!(stream.sample_rate(), 44100);
        assert_eq!(stream.channel_mask(), ChannelMask::OUT_STEREO);
        assert_eq!(stream.supported_channel_masks(), &[ChannelMask::OUT_STEREO]);
        // 192 frames at 48 kHz rescaled to 44.1 kHz, rounded to 16
        assert_eq!(stream.buffer_size(), 176 * 4);
        assert_eq!(
            stream.get_parameters("sup_channels"),
            "sup_channels=AUDIO_CHANNEL_OUT_STEREO"
        );
    }

    #[test]
    fn test_activation_failure_leaves_standby() {
        let rig = Rig::new();
        let stream = rig.low_latency(OutputDevices::SPEAKER);
        rig.transport.fail_open(Endpoint::Tones, Direction::Playback);

        let result = stream.write(&period(441, 2));
        assert!(matches!(result, Err(HalError::ResourceExhausted { .. })));
        assert!(stream.is_standby());
        assert!(rig.transport.open_endpoints().is_empty());

        rig.transport.heal();
        assert!(stream.write(&period(441, 2)).is_ok());
        assert!(!stream.is_standby());
    }

    #[test]
    fn test_dock_duplication() {
        let rig = Rig::new();
        let stream = rig.low_latency(OutputDevices::SPEAKER | OutputDevices::DGTL_DOCK_HEADSET);
        stream.write(&period(441, 2)).unwrap();

        assert!(rig.transport.is_open(Endpoint::Tones, Direction::Playback));
        assert!(rig.transport.is_open(Endpoint::Spdif, Direction::Playback));
        assert_eq!(rig.transport.frames_written(Endpoint::Spdif), rig.transport.frames_written(Endpoint::Tones));
    }

    #[test]
    fn test_partial_activation_rolls_back() {
        let rig = Rig::new();
        let stream = rig.low_latency(OutputDevices::SPEAKER | OutputDevices::DGTL_DOCK_HEADSET);
        rig.transport.fail_open(Endpoint::Spdif, Direction::Playback);

        assert!(stream.write(&period(441, 2)).is_err());
        assert_eq!(open_count(&rig, Endpoint::Tones), 1);
        assert!(rig.transport.open_endpoints().is_empty());
        assert!(stream.is_standby());
    }

    #[test]
    #[serial]
    fn test_write_failure_is_paced() {
        let rig = Rig::new();
        let stream = rig.low_latency(OutputDevices::SPEAKER);
        stream.write(&period(441, 2)).unwrap();
        rig.transport.fail_io(Endpoint::Tones);

        let started = Instant::now();
        let written = stream.write(&period(441, 2)).unwrap();
        assert_eq!(written, 441 * 4);
        assert!(started.elapsed() >= Duration::from_millis(10));
        assert!(!stream.is_standby());
    }

    #[test]
    fn test_routing_change_standby_rules() {
        let rig = Rig::new();
        let stream = rig.low_latency(OutputDevices::SPEAKER);
        stream.write(&period(441, 2)).unwrap();

        // Leaving the speaker reopens the endpoints
        stream
            .set_parameters(&format!("routing={}", OutputDevices::WIRED_HEADSET.bits()))
            .unwrap();
        assert!(stream.is_standby());
        stream.write(&period(441, 2)).unwrap();
        assert!(rig.route_enabled(table::HS_OUTPUT));
        assert!(stage_off(&rig, table::HF_OUTPUT));

        // Headset to headphone only reroutes
        stream
            .set_parameters(&format!("routing={}", OutputDevices::WIRED_HEADPHONE.bits()))
            .unwrap();
        assert!(!stream.is_standby());
        assert_eq!(rig.hal.snapshot().out_device, OutputDevices::WIRED_HEADPHONE);

        // Zero is ignored
        stream.set_parameters("routing=0").unwrap();
        assert_eq!(rig.hal.snapshot().out_device, OutputDevices::WIRED_HEADPHONE);
        assert!(stream.set_parameters("routing=speaker").is_err());
    }

    #[test]
    fn test_last_standby_disables_output_stages() {
        let rig = Rig::new();
        let stream = rig.low_latency(OutputDevices::SPEAKER);
        stream.write(&period(441, 2)).unwrap();
        assert!(rig.route_enabled(table::HF_OUTPUT));

        stream.standby();
        assert!(stage_off(&rig, table::HF_OUTPUT));
        assert!(rig.transport.open_endpoints().is_empty());
        assert!(rig.hal.snapshot().active_outputs.is_empty());
    }

    #[test]
    fn test_volume_unsupported() {
        let rig = Rig::new();
        let stream = rig.low_latency(OutputDevices::SPEAKER);
        assert!(matches!(
            stream.set_volume(0.5, 0.5),
            Err(HalError::UnsupportedOperation { .. })
        ));
    }

    #[test]
    fn test_voip_capture_restarts_with_playback() {
        let rig = Rig::new();
        let input = rig.input(16000, ChannelMask::IN_MONO, InputSource::VoiceCommunication);
        let mut buffer = vec![0i16; 160];
        input.read(&mut buffer).unwrap();
        assert!(!input.is_standby());

        let output = rig.low_latency(OutputDevices::SPEAKER);
        output.write(&period(441, 2)).unwrap();
        assert!(input.is_standby());
        assert_eq!(rig.hal.snapshot().active_capture, None);
    }

    #[test]
    fn test_close_allows_reopen() {
        let rig = Rig::new();
        let stream = rig.low_latency(OutputDevices::SPEAKER);
        stream.write(&period(441, 2)).unwrap();
        rig.hal.close_output_stream(stream);
        assert!(rig.hal.snapshot().open_outputs.is_empty());

        let again = rig.low_latency(OutputDevices::SPEAKER);
        assert!(again.is_standby());
    }
}

#[cfg(test)]
mod hdmi_tests {
    use super::*;

    #[test]
    fn test_low_latency_duplicates_to_hdmi() {
        let rig = Rig::builder().hdmi(8).build();
        let stream = rig.low_latency(OutputDevices::SPEAKER | OutputDevices::AUX_DIGITAL);
        stream.write(&period(441, 2)).unwrap();

        assert!(rig.transport.is_open(Endpoint::Tones, Direction::Playback));
        assert!(rig.transport.is_open(Endpoint::Hdmi, Direction::Playback));
        let hdmi = rig
            .transport
            .opens()
            .into_iter()
            .find(|o| o.endpoint == Endpoint::Hdmi)
            .unwrap();
        assert_eq!(hdmi.config.rate, 44100);
        assert_eq!(hdmi.config.channels, 2);
    }

    #[test]
    fn test_multichannel_takes_over_the_card() {
        let rig = Rig::builder().hdmi(8).build();
        let low_latency = rig.low_latency(OutputDevices::SPEAKER | OutputDevices::AUX_DIGITAL);
        low_latency.write(&period(441, 2)).unwrap();

        let (hdmi, config) = rig.hdmi_stream();
        assert_eq!(config.channel_mask, ChannelMask::OUT_5POINT1);
        assert_eq!(config.sample_rate, 48000);
        hdmi.write(&period(336, 6)).unwrap();

        assert!(low_latency.is_standby());
        let open_hdmi = rig
            .transport
            .open_endpoints()
            .into_iter()
            .filter(|(e, _)| *e == Endpoint::Hdmi)
            .count();
        assert_eq!(open_hdmi, 1);

        // While HDMI plays, the low-latency stream leaves the card alone
        low_latency.write(&period(441, 2)).unwrap();
        assert!(rig.transport.is_open(Endpoint::Tones, Direction::Playback));
        assert_eq!(open_count(&rig, Endpoint::Hdmi), 2);
        assert_eq!(
            rig.hal.snapshot().active_outputs,
            vec![OutputVariant::LowLatency, OutputVariant::Hdmi]
        );

        // HDMI standby restarts the low-latency stream so it can duplicate again
        hdmi.standby();
        assert!(low_latency.is_standby());
        low_latency.write(&period(441, 2)).unwrap();
        assert_eq!(open_count(&rig, Endpoint::Hdmi), 3);
    }

    #[test]
    fn test_reopens_once_after_startup() {
        let rig = Rig::builder().hdmi(6).build();
        let (hdmi, _) = rig.hdmi_stream();
        let samples = period(336, 6);

        for _ in 0..15 {
            hdmi.write(&samples).unwrap();
        }
        assert!(!hdmi.is_standby());
        hdmi.write(&samples).unwrap();
        assert!(hdmi.is_standby());

        for _ in 0..20 {
            hdmi.write(&samples).unwrap();
        }
        assert!(!hdmi.is_standby());
        assert_eq!(open_count(&rig, Endpoint::Hdmi), 2);
    }

    #[test]
    fn test_mute_writes_silence() {
        let rig = Rig::builder().hdmi(6).build();
        let (hdmi, _) = rig.hdmi_stream();
        let samples = vec![7i16; 336 * 6];

        hdmi.set_volume(0.0, 0.0).unwrap();
        hdmi.write(&samples).unwrap();
        assert!(rig.transport.last_write(Endpoint::Hdmi).unwrap().iter().all(|&s| s == 0));

        hdmi.set_volume(1.0, 1.0).unwrap();
        hdmi.write(&samples).unwrap();
        assert_eq!(rig.transport.last_write(Endpoint::Hdmi).unwrap(), samples);
    }

    #[test]
    fn test_sink_capabilities() {
        let rig = Rig::builder().hdmi(8).build();
        let (hdmi, _) = rig.hdmi_stream();
        assert_eq!(
            hdmi.get_parameters("sup_channels"),
            "sup_channels=AUDIO_CHANNEL_OUT_5POINT1|AUDIO_CHANNEL_OUT_7POINT1"
        );
        assert_eq!(hdmi.get_parameters("routing"), "");
        rig.hal.close_output_stream(hdmi);

        let (hdmi, config) = rig
            .hal
            .open_output_stream(
                OutputDevices::AUX_DIGITAL,
                OutputFlags::DIRECT,
                &StreamConfig::new(0, ChannelMask::OUT_7POINT1),
            )
            .unwrap();
        assert_eq!(config.channel_mask, ChannelMask::OUT_7POINT1);
        hdmi.write(&period(336, 8)).unwrap();
        assert_eq!(rig.transport.opens().last().unwrap().config.channels, 8);
        rig.hal.close_output_stream(hdmi);

        let stereo = rig.hal.open_output_stream(
            OutputDevices::AUX_DIGITAL,
            OutputFlags::DIRECT,
            &StreamConfig::new(0, ChannelMask::OUT_STEREO),
        );
        assert!(matches!(stereo, Err(HalError::InvalidArgument { .. })));
    }

    #[test]
    fn test_unusable_sink_rejected() {
        let rig = Rig::builder().hdmi(2).build();
        let result =
            rig.hal
                .open_output_stream(OutputDevices::AUX_DIGITAL, OutputFlags::DIRECT, &StreamConfig::default());
        assert!(matches!(result, Err(HalError::UnsupportedOperation { .. })));

        let rig = Rig::new();
        let result =
            rig.hal
                .open_output_stream(OutputDevices::AUX_DIGITAL, OutputFlags::DIRECT, &StreamConfig::default());
        assert!(matches!(result, Err(HalError::UnsupportedOperation { .. })));
        assert!(rig.hal.snapshot().open_outputs.is_empty());
    }
}

#[cfg(test)]
mod deep_buffer_tests {
    use super::*;

    #[test]
    fn test_uses_multimedia_endpoint() {
        let rig = Rig::new();
        let stream = rig.deep_buffer();
        stream.write(&period(1024, 2)).unwrap();

        let open = rig.transport.opens().pop().unwrap();
        assert_eq!(open.endpoint, Endpoint::Multimedia);
        assert!(open.config.mmap);
        assert_eq!(open.config.period_size, 4224);
    }

    #[test]
    fn test_period_mode_follows_screen() {
        let rig = Rig::new();
        let stream = rig.deep_buffer();

        rig.hal.set_parameters("screen_state=off").unwrap();
        stream.write(&period(1024, 2)).unwrap();
        assert_eq!(rig.transport.avail_min(Endpoint::Multimedia), Some(4224));

        rig.hal.set_parameters("screen_state=on").unwrap();
        stream.write(&period(1024, 2)).unwrap();
        assert_eq!(rig.transport.avail_min(Endpoint::Multimedia), Some(1056));
    }

    #[test]
    fn test_active_capture_keeps_short_periods() {
        let rig = Rig::new();
        rig.hal.set_parameters("screen_state=off").unwrap();
        let input = rig.input(48000, ChannelMask::IN_MONO, InputSource::Mic);
        let mut buffer = vec![0i16; 480];
        input.read(&mut buffer).unwrap();

        let stream = rig.deep_buffer();
        stream.write(&period(1024, 2)).unwrap();
        assert_eq!(rig.transport.avail_min(Endpoint::Multimedia), Some(1056));

        rig.hal.close_input_stream(input);
        stream.write(&period(1024, 2)).unwrap();
        assert_eq!(rig.transport.avail_min(Endpoint::Multimedia), Some(4224));
    }

    #[test]
    fn test_routing_change_does_not_interrupt() {
        let rig = Rig::new();
        let stream = rig.deep_buffer();
        stream.write(&period(1024, 2)).unwrap();
        stream
            .set_parameters(&format!("routing={}", OutputDevices::WIRED_HEADSET.bits()))
            .unwrap();
        assert!(!stream.is_standby());
        assert_eq!(rig.hal.snapshot().out_device, OutputDevices::WIRED_HEADSET);
    }
}
