//! Gain model
//!
//! Pure functions from (mode, devices, TTY) to analog and digital gains.
//! Analog gains that differ from the media gain only because of the mode are
//! compensated on the digital mix stage feeding the same path, so overall
//! loudness does not depend on the mode. Speaker gain beyond the amplifier's
//! range moves onto the digital speaker mix ("overrange").

use crate::config::{GainTable, MicGains};
use crate::types::{AudioMode, InputSource, OutputDevices};

/// Digital mixer register value for 0 dB
pub const ABE_GAIN_0DB: i32 = 120;

/// dB to digital mixer register
pub const fn db_to_abe_gain(db: i32) -> i32 {
    db + ABE_GAIN_0DB
}

/// dB to speaker amplifier register
pub const fn db_to_speaker_volume(db: i32) -> i32 {
    (db + 52) / 2
}

/// Speaker amplifier register to dB
pub const fn db_from_speaker_volume(raw: i32) -> i32 {
    raw * 2 - 52
}

/// dB to headset amplifier register
pub const fn db_to_headset_volume(db: i32) -> i32 {
    (db + 30) / 2
}

/// dB to earpiece amplifier register
pub const fn db_to_earpiece_volume(db: i32) -> i32 {
    (db + 24) / 2
}

/// Output gains for one routing pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputGains {
    /// Analog gains in dB, after clamping
    pub speaker_db: i32,
    pub headset_db: i32,
    pub earpiece_db: i32,
    /// Digital mix registers
    pub mm_dl1: i32,
    pub tones_dl1: i32,
    pub mm_dl2: i32,
    pub tones_dl2: i32,
    /// Only driven during a voice call
    pub vx_dl2: Option<i32>,
}

impl OutputGains {
    pub fn speaker_register(&self) -> i32 {
        db_to_speaker_volume(self.speaker_db)
    }

    pub fn headset_register(&self) -> i32 {
        db_to_headset_volume(self.headset_db)
    }

    pub fn earpiece_register(&self) -> i32 {
        db_to_earpiece_volume(self.earpiece_db)
    }
}

/// Compute output gains
///
/// `devices` is the selected output set before any TTY override;
/// `tty_volume` is set when a TTY device owns the downlink.
pub fn output_gains(
    table: &GainTable,
    mode: AudioMode,
    devices: OutputDevices,
    tty_volume: bool,
    speaker_max_db: i32,
) -> OutputGains {
    let headphone_on = devices.contains(OutputDevices::WIRED_HEADPHONE);
    let speaker_on = devices.contains(OutputDevices::SPEAKER);

    let (mut speaker, mut headset, earpiece) = match mode {
        AudioMode::InCall => (
            table.voice_call.speaker,
            table.voice_call.headset,
            table.voice_call.earpiece,
        ),
        AudioMode::InCommunication => (table.voip.speaker, table.voip.headset, table.voip.earpiece),
        AudioMode::Normal | AudioMode::Ringtone => {
            let headset = if headphone_on {
                table.normal_headphone
            } else {
                table.normal_headset
            };
            (table.normal_speaker, headset, table.normal_earpiece)
        }
    };

    if tty_volume {
        headset = table.headphone_tty;
    } else if mode == AudioMode::Ringtone {
        headset += table.ringtone_headset_offset;
    }

    let dl1_correction = if headphone_on {
        table.normal_headphone - headset
    } else if devices.contains(OutputDevices::WIRED_HEADSET) {
        table.normal_headset - headset
    } else {
        table.normal_earpiece - earpiece
    };

    let dl2_correction = if speaker_on {
        table.normal_speaker - speaker
    } else {
        0
    };

    let mut overrange = ABE_GAIN_0DB;
    if speaker > speaker_max_db {
        overrange += speaker - speaker_max_db;
        speaker = speaker_max_db;
    }
    if !speaker_on {
        overrange = ABE_GAIN_0DB;
    }

    let mm_dl1 = ABE_GAIN_0DB + dl1_correction;
    let mm_dl2 = overrange + dl2_correction;

    let (tones_dl1, tones_dl2, vx_dl2) = match mode {
        AudioMode::InCall => (mm_dl1, mm_dl2, Some(overrange)),
        AudioMode::InCommunication | AudioMode::Ringtone => (ABE_GAIN_0DB, overrange, None),
        AudioMode::Normal => (mm_dl1, mm_dl2, None),
    };

    OutputGains {
        speaker_db: speaker,
        headset_db: headset,
        earpiece_db: earpiece,
        mm_dl1,
        tones_dl1,
        mm_dl2,
        tones_dl2,
        vx_dl2,
    }
}

fn pick(gains: &MicGains, main_on: bool, headset_on: bool, sub_on: bool) -> i32 {
    if main_on {
        gains.main
    } else if headset_on {
        gains.headset
    } else if sub_on {
        gains.sub
    } else {
        0
    }
}

/// Capture gain register for the active microphone
///
/// During a call the capture source is ignored. Outside a call with no
/// active capture, or with a source that has no table, the gain is 0 dB.
pub fn input_gain(
    table: &GainTable,
    mode: AudioMode,
    source: Option<InputSource>,
    main_on: bool,
    headset_on: bool,
    sub_on: bool,
) -> i32 {
    if mode == AudioMode::InCall {
        return db_to_abe_gain(pick(&table.voice_call_mic, main_on, headset_on, sub_on));
    }

    let gains = match source {
        Some(InputSource::Mic) => &table.capture_mic,
        Some(InputSource::Camcorder) => &table.camcorder_mic,
        Some(InputSource::VoiceRecognition) => &table.voice_recognition_mic,
        Some(InputSource::VoiceCommunication) => &table.voip_mic,
        _ => return ABE_GAIN_0DB,
    };
    db_to_abe_gain(pick(gains, main_on, headset_on, sub_on))
}
