//! In-memory collaborators for tests and host-side simulation
//!
//! These implement the [`crate::hal`] and [`crate::effects`] interfaces
//! without hardware, record what the core asked of them and allow failures
//! to be injected per endpoint or control.

pub mod call_path;
pub mod effect;
pub mod mixer;
pub mod transport;

pub use call_path::MockCallPath;
pub use effect::{MockEffect, MockEffectStats};
pub use mixer::{ControlState, MockMixer, MockValue, RecordedWrite};
pub use transport::{MockTransport, OpenRecord};
