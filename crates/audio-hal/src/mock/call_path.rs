//! Recording modem call-path control

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::HalResult;
use crate::hal::{CallAudioPath, CallPathControl, SoundKind, WidebandListener};

type SharedListener = Arc<dyn Fn(bool) + Send + Sync>;

#[derive(Debug, Default)]
struct CallPathState {
    paths: Vec<CallAudioPath>,
    volumes: Vec<(SoundKind, f32)>,
}

/// Call-path control recording every request
#[derive(Default)]
pub struct MockCallPath {
    state: Mutex<CallPathState>,
    listener: Mutex<Option<SharedListener>>,
}

impl MockCallPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Paths selected so far
    pub fn paths(&self) -> Vec<CallAudioPath> {
        self.state.lock().paths.clone()
    }

    pub fn last_path(&self) -> Option<CallAudioPath> {
        self.state.lock().paths.last().copied()
    }

    /// Volumes set so far
    pub fn volumes(&self) -> Vec<(SoundKind, f32)> {
        self.state.lock().volumes.clone()
    }

    pub fn has_listener(&self) -> bool {
        self.listener.lock().is_some()
    }

    /// Deliver a wideband notification; false when nothing is registered
    pub fn fire_wideband(&self, wideband: bool) -> bool {
        let listener = self.listener.lock().clone();
        match listener {
            Some(listener) => {
                listener(wideband);
                true
            }
            None => false,
        }
    }
}

impl CallPathControl for MockCallPath {
    fn set_call_audio_path(&self, path: CallAudioPath) -> HalResult<()> {
        self.state.lock().paths.push(path);
        Ok(())
    }

    fn set_call_volume(&self, kind: SoundKind, volume: f32) -> HalResult<()> {
        self.state.lock().volumes.push((kind, volume));
        Ok(())
    }

    fn register_wideband_listener(&self, listener: WidebandListener) {
        *self.listener.lock() = Some(Arc::from(listener));
    }
}
