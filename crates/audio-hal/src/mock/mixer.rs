//! Memory-backed mixer

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::error::{HalError, HalResult};
use crate::hal::{ControlId, Mixer, MixerCtl};
use crate::route::table::ALL_TABLES;

/// Default values per control
const DEFAULT_VALUES: usize = 2;

/// Value written by the core
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockValue {
    Enum(String),
    Int { index: usize, value: i32 },
}

/// One recorded control write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub control: String,
    pub value: MockValue,
}

/// Current state of a control
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ControlState {
    pub enum_value: Option<String>,
    pub values: Vec<i32>,
}

#[derive(Debug, Clone)]
struct MockControl {
    name: String,
    range: (i32, i32),
    state: ControlState,
}

impl MockControl {
    fn new(name: impl Into<String>, values: usize) -> Self {
        Self {
            name: name.into(),
            range: (0, 255),
            state: ControlState {
                enum_value: None,
                values: vec![0; values],
            },
        }
    }
}

#[derive(Debug, Default)]
struct MixerState {
    controls: Vec<MockControl>,
    writes: Vec<RecordedWrite>,
}

/// Mixer exposing every control the core references
#[derive(Debug)]
pub struct MockMixer {
    state: Mutex<MixerState>,
}

impl Default for MockMixer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMixer {
    /// A mixer with the full control inventory of the reference handset
    pub fn new() -> Self {
        let mut controls: Vec<MockControl> = Vec::new();
        let names = MixerCtl::ALL
            .iter()
            .map(|ctl| ctl.name())
            .chain(ALL_TABLES.iter().flat_map(|(_, table)| table.iter().map(|s| s.control)));
        for name in names {
            if !controls.iter().any(|c| c.name == name) {
                controls.push(MockControl::new(name, DEFAULT_VALUES));
            }
        }
        Self {
            state: Mutex::new(MixerState {
                controls,
                writes: Vec::new(),
            }),
        }
        .with_range(MixerCtl::SpeakerVolume.name(), 0, 31)
    }

    /// A digital-card mixer reporting the sink's LPCM channel capability
    pub fn hdmi(max_channels: i32) -> Self {
        let mut control = MockControl::new("Maximum LPCM channels", 1);
        control.state.values[0] = max_channels;
        Self {
            state: Mutex::new(MixerState {
                controls: vec![control],
                writes: Vec::new(),
            }),
        }
    }

    /// Remove a control
    pub fn without_control(self, name: &str) -> Self {
        self.state.lock().controls.retain(|c| c.name != name);
        self
    }

    /// Override a control's value range
    pub fn with_range(self, name: &str, min: i32, max: i32) -> Self {
        if let Some(control) = self.state.lock().controls.iter_mut().find(|c| c.name == name) {
            control.range = (min, max);
        }
        self
    }

    /// Add or replace a control with the given initial values
    pub fn with_control(self, name: &str, values: Vec<i32>) -> Self {
        {
            let mut state = self.state.lock();
            state.controls.retain(|c| c.name != name);
            let mut control = MockControl::new(name, values.len());
            control.state.values = values;
            state.controls.push(control);
        }
        self
    }

    /// Current enumerated value of a control
    pub fn enum_value(&self, name: &str) -> Option<String> {
        let state = self.state.lock();
        state
            .controls
            .iter()
            .find(|c| c.name == name)
            .and_then(|c| c.state.enum_value.clone())
    }

    /// Current integer value of a control
    pub fn int_value(&self, name: &str, index: usize) -> Option<i32> {
        let state = self.state.lock();
        state
            .controls
            .iter()
            .find(|c| c.name == name)
            .and_then(|c| c.state.values.get(index).copied())
    }

    /// Every write so far, in order
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.state.lock().writes.clone()
    }

    /// Writes to one control, in order
    pub fn writes_to(&self, name: &str) -> Vec<MockValue> {
        self.state
            .lock()
            .writes
            .iter()
            .filter(|w| w.control == name)
            .map(|w| w.value.clone())
            .collect()
    }

    pub fn clear_writes(&self) {
        self.state.lock().writes.clear();
    }

    /// State of every control keyed by name
    pub fn control_states(&self) -> BTreeMap<String, ControlState> {
        self.state
            .lock()
            .controls
            .iter()
            .map(|c| (c.name.clone(), c.state.clone()))
            .collect()
    }
}

impl Mixer for MockMixer {
    fn control(&self, name: &str) -> Option<ControlId> {
        self.state
            .lock()
            .controls
            .iter()
            .position(|c| c.name == name)
            .map(ControlId)
    }

    fn num_values(&self, ctl: ControlId) -> usize {
        self.state
            .lock()
            .controls
            .get(ctl.0)
            .map_or(0, |c| c.state.values.len())
    }

    fn set_enum(&self, ctl: ControlId, value: &str) -> HalResult<()> {
        let mut state = self.state.lock();
        let control = state
            .controls
            .get_mut(ctl.0)
            .ok_or_else(|| HalError::not_found(format!("mixer control {}", ctl.0)))?;
        control.state.enum_value = Some(value.to_string());
        let control = control.name.clone();
        state.writes.push(RecordedWrite {
            control,
            value: MockValue::Enum(value.to_string()),
        });
        Ok(())
    }

    fn set_value(&self, ctl: ControlId, index: usize, value: i32) -> HalResult<()> {
        let mut state = self.state.lock();
        let control = state
            .controls
            .get_mut(ctl.0)
            .ok_or_else(|| HalError::not_found(format!("mixer control {}", ctl.0)))?;
        let slot = control.state.values.get_mut(index).ok_or_else(|| {
            HalError::invalid_argument(format!("value index {} out of range", index))
        })?;
        *slot = value;
        let control = control.name.clone();
        state.writes.push(RecordedWrite {
            control,
            value: MockValue::Int { index, value },
        });
        Ok(())
    }

    fn value(&self, ctl: ControlId, index: usize) -> HalResult<i32> {
        let state = self.state.lock();
        state
            .controls
            .get(ctl.0)
            .and_then(|c| c.state.values.get(index).copied())
            .ok_or_else(|| HalError::not_found(format!("mixer control {} value {}", ctl.0, index)))
    }

    fn value_range(&self, ctl: ControlId) -> (i32, i32) {
        self.state
            .lock()
            .controls
            .get(ctl.0)
            .map_or((0, 0), |c| c.range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inventory_covers_known_controls() {
        let mixer = MockMixer::new();
        for ctl in MixerCtl::ALL {
            assert!(mixer.control(ctl.name()).is_some(), "{} missing", ctl.name());
        }
        let speaker = mixer.control(MixerCtl::SpeakerVolume.name()).unwrap();
        assert_eq!(mixer.value_range(speaker), (0, 31));
    }

    #[test]
    fn test_writes_are_recorded() {
        let mixer = MockMixer::new();
        let eq = mixer.control(MixerCtl::Dl1Equalizer.name()).unwrap();
        mixer.set_enum(eq, "Flat response").unwrap();
        assert_eq!(mixer.enum_value("DL1 Equalizer").as_deref(), Some("Flat response"));
        assert_eq!(mixer.writes().len(), 1);
        assert!(mixer.set_value(eq, 5, 1).is_err());
    }

    #[test]
    fn test_hdmi_card() {
        let mixer = MockMixer::hdmi(8);
        let ctl = mixer.control("Maximum LPCM channels").unwrap();
        assert_eq!(mixer.value(ctl, 0).unwrap(), 8);
        assert!(mixer.control(MixerCtl::Dl1Equalizer.name()).is_none());
    }
}
