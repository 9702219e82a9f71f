//! Textual `key=value;key=value` parameter sets
//!
//! Used by the device and stream `set_parameters`/`get_parameters` calls.
//! Unknown keys are carried but ignored by the consumers; malformed values of
//! known keys are rejected with [`HalError::InvalidArgument`].

use std::fmt;
use std::str::FromStr;

use crate::error::{HalError, HalResult};

/// Output or input device routing bitmask
pub const KEY_ROUTING: &str = "routing";
/// Capture use case
pub const KEY_INPUT_SOURCE: &str = "input_source";
pub const KEY_TTY_MODE: &str = "tty_mode";
/// Bluetooth headset noise reduction
pub const KEY_BT_NREC: &str = "bt_headset_nrec";
pub const KEY_SCREEN_STATE: &str = "screen_state";
/// Supported output channel masks query
pub const KEY_SUP_CHANNELS: &str = "sup_channels";

pub const VALUE_ON: &str = "on";
pub const VALUE_OFF: &str = "off";

/// An ordered parameter set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters {
    pairs: Vec<(String, String)>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `key=value` pairs separated by `;`
    ///
    /// A bare key (no `=`) has an empty value; empty segments are skipped.
    pub fn parse(input: &str) -> Self {
        let pairs = input
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|segment| match segment.split_once('=') {
                Some((key, value)) => (key.trim().to_string(), value.trim().to_string()),
                None => (segment.to_string(), String::new()),
            })
            .collect();
        Self { pairs }
    }

    /// Value of `key`; the last occurrence wins
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    /// Value of `key` parsed as `T`
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> HalResult<Option<T>> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => value.parse::<T>().map(Some).map_err(|_| {
                HalError::invalid_argument(format!("malformed value '{}' for '{}'", value, key))
            }),
        }
    }

    /// Value of an `on`/`off` key
    pub fn get_switch(&self, key: &str) -> HalResult<Option<bool>> {
        match self.get(key) {
            None => Ok(None),
            Some(VALUE_ON) => Ok(Some(true)),
            Some(VALUE_OFF) => Ok(Some(false)),
            Some(other) => Err(HalError::invalid_argument(format!(
                "expected on/off for '{}', got '{}'",
                key, other
            ))),
        }
    }

    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|(k, _)| k.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl fmt::Display for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.pairs.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{}={}", key, value)?;
        }
        Ok(())
    }
}
