//! Device routing
//!
//! Routing is computed as a [`RoutePlan`], an ordered list of control writes
//! and modem path selections derived purely from the coordinator state, and
//! then applied to the hardware. Keeping planning pure makes every override
//! (TTY, call, Bluetooth, dual mic) testable without a mixer.

pub mod engine;
pub mod gain;
pub mod table;

use tracing::{trace, warn};

use crate::error::{HalError, HalResult};
use crate::hal::{CallAudioPath, CallPathControl, Mixer, MixerControls, MixerCtl};
use table::{RouteSetting, RouteValue};

pub use engine::{ActiveCapture, RoutingState, plan_input_routing, plan_output_routing};

/// Control addressed by a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlTarget {
    /// One of the controls resolved at startup
    Known(MixerCtl),
    /// A route-table control, looked up on use
    Named(&'static str),
}

impl ControlTarget {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Known(ctl) => ctl.name(),
            Self::Named(name) => name,
        }
    }
}

/// Value written to a control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlValue {
    Enum(&'static str),
    /// A single value index
    Value { index: usize, value: i32 },
    /// Every value of the control
    All(i32),
}

/// A single control write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlWrite {
    pub target: ControlTarget,
    pub value: ControlValue,
}

/// One step of a routing pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteStep {
    Write(ControlWrite),
    /// Select the modem call-audio path
    CallPath(CallAudioPath),
}

/// Ordered routing actions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutePlan {
    steps: Vec<RouteStep>,
}

impl RoutePlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one value of a known control
    pub fn set(&mut self, ctl: MixerCtl, value: i32) {
        self.write(ControlTarget::Known(ctl), ControlValue::Value { index: 0, value });
    }

    /// Set a boolean switch
    pub fn switch(&mut self, ctl: MixerCtl, on: bool) {
        self.set(ctl, on as i32);
    }

    /// Set every value of a known control
    pub fn set_all(&mut self, ctl: MixerCtl, value: i32) {
        self.write(ControlTarget::Known(ctl), ControlValue::All(value));
    }

    /// Select an enumerated value of a known control
    pub fn select(&mut self, ctl: MixerCtl, value: &'static str) {
        self.write(ControlTarget::Known(ctl), ControlValue::Enum(value));
    }

    /// Enable or disable a route table
    pub fn route(&mut self, table: &'static [RouteSetting], enable: bool) {
        for setting in table {
            let value = match (setting.value, enable) {
                (RouteValue::Enum(v), true) => ControlValue::Enum(v),
                (RouteValue::Enum(_), false) => ControlValue::Enum(table::OFF),
                (RouteValue::Int(v), true) => ControlValue::All(v),
                (RouteValue::Int(_), false) => ControlValue::All(0),
            };
            self.write(ControlTarget::Named(setting.control), value);
        }
    }

    pub fn call_path(&mut self, path: CallAudioPath) {
        self.steps.push(RouteStep::CallPath(path));
    }

    fn write(&mut self, target: ControlTarget, value: ControlValue) {
        self.steps.push(RouteStep::Write(ControlWrite { target, value }));
    }

    pub fn steps(&self) -> &[RouteStep] {
        &self.steps
    }

    /// Control writes, in order
    pub fn writes(&self) -> impl Iterator<Item = &ControlWrite> {
        self.steps.iter().filter_map(|step| match step {
            RouteStep::Write(write) => Some(write),
            RouteStep::CallPath(_) => None,
        })
    }

    /// Last value written to a control in this plan
    pub fn last_value(&self, target: ControlTarget) -> Option<ControlValue> {
        self.writes()
            .filter(|w| w.target == target)
            .last()
            .map(|w| w.value)
    }

    /// Modem path selected by this plan, if any
    pub fn selected_call_path(&self) -> Option<CallAudioPath> {
        self.steps.iter().find_map(|step| match step {
            RouteStep::CallPath(path) => Some(*path),
            RouteStep::Write(_) => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Executes route plans against the hardware
pub struct RouteApplier<'a> {
    pub mixer: &'a dyn Mixer,
    pub controls: &'a MixerControls,
    pub call_path: &'a dyn CallPathControl,
}

impl RouteApplier<'_> {
    /// Apply every step; individual failures are logged and do not stop the pass
    pub fn apply(&self, plan: &RoutePlan) {
        for step in plan.steps() {
            let result = match step {
                RouteStep::Write(write) => self.write(write),
                RouteStep::CallPath(path) => self.call_path.set_call_audio_path(*path),
            };
            if let Err(e) = result {
                warn!(?step, error = %e, "Routing step failed");
            }
        }
    }

    /// Apply a route table directly
    pub fn apply_table(&self, table: &'static [RouteSetting], enable: bool) {
        let mut plan = RoutePlan::new();
        plan.route(table, enable);
        self.apply(&plan);
    }

    fn write(&self, write: &ControlWrite) -> HalResult<()> {
        let id = match write.target {
            ControlTarget::Known(ctl) => self.controls.get(ctl),
            ControlTarget::Named(name) => self
                .mixer
                .control(name)
                .ok_or_else(|| HalError::not_found(format!("mixer control '{}'", name)))?,
        };

        trace!(control = write.target.name(), value = ?write.value, "Mixer write");
        match write.value {
            ControlValue::Enum(value) => self.mixer.set_enum(id, value),
            ControlValue::Value { index, value } => self.mixer.set_value(id, index, value),
            ControlValue::All(value) => {
                for index in 0..self.mixer.num_values(id) {
                    self.mixer.set_value(id, index, value)?;
                }
                Ok(())
            }
        }
    }
}
