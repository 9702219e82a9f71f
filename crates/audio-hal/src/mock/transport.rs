//! Memory-backed PCM transport
//!
//! Playback endpoints count the frames written to them; capture endpoints
//! deliver a constant sample value. Clones share state, so a test keeps one
//! handle while the core owns another.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::trace;

use crate::error::{HalError, HalResult};
use crate::hal::{Direction, Endpoint, Pcm, PcmConfig, PcmTimestamp, Transport};

/// One successful open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenRecord {
    pub endpoint: Endpoint,
    pub direction: Direction,
    pub config: PcmConfig,
}

#[derive(Debug)]
struct TransportState {
    started: Instant,
    next_id: u64,
    opens: Vec<OpenRecord>,
    active: Vec<(u64, Endpoint, Direction)>,
    fail_open: HashSet<(Endpoint, Direction)>,
    fail_io: HashSet<Endpoint>,
    available: Option<usize>,
    capture_value: i16,
    frames_written: HashMap<Endpoint, usize>,
    last_write: HashMap<Endpoint, Vec<i16>>,
    avail_min: HashMap<Endpoint, usize>,
}

impl Default for TransportState {
    fn default() -> Self {
        Self {
            started: Instant::now(),
            next_id: 0,
            opens: Vec::new(),
            active: Vec::new(),
            fail_open: HashSet::new(),
            fail_io: HashSet::new(),
            available: None,
            capture_value: 0,
            frames_written: HashMap::new(),
            last_write: HashMap::new(),
            avail_min: HashMap::new(),
        }
    }
}

/// Transport recording every open and write
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<TransportState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make opens of `endpoint` in `direction` fail
    pub fn fail_open(&self, endpoint: Endpoint, direction: Direction) {
        self.state.lock().fail_open.insert((endpoint, direction));
    }

    /// Make reads, writes and timestamps on `endpoint` fail
    pub fn fail_io(&self, endpoint: Endpoint) {
        self.state.lock().fail_io.insert(endpoint);
    }

    /// Clear every injected failure
    pub fn heal(&self) {
        let mut state = self.state.lock();
        state.fail_open.clear();
        state.fail_io.clear();
    }

    /// Frames reported available by timestamps; `None` reports an idle ring
    pub fn set_available(&self, available: Option<usize>) {
        self.state.lock().available = available;
    }

    /// Sample value delivered by capture endpoints
    pub fn set_capture_value(&self, value: i16) {
        self.state.lock().capture_value = value;
    }

    /// Every successful open, in order
    pub fn opens(&self) -> Vec<OpenRecord> {
        self.state.lock().opens.clone()
    }

    /// Endpoints currently open
    pub fn open_endpoints(&self) -> Vec<(Endpoint, Direction)> {
        self.state.lock().active.iter().map(|&(_, e, d)| (e, d)).collect()
    }

    pub fn is_open(&self, endpoint: Endpoint, direction: Direction) -> bool {
        self.state
            .lock()
            .active
            .iter()
            .any(|&(_, e, d)| e == endpoint && d == direction)
    }

    /// Frames written to a playback endpoint since the transport was created
    pub fn frames_written(&self, endpoint: Endpoint) -> usize {
        self.state.lock().frames_written.get(&endpoint).copied().unwrap_or(0)
    }

    /// Samples of the latest write to `endpoint`
    pub fn last_write(&self, endpoint: Endpoint) -> Option<Vec<i16>> {
        self.state.lock().last_write.get(&endpoint).cloned()
    }

    /// Latest wake-up level set on `endpoint`
    pub fn avail_min(&self, endpoint: Endpoint) -> Option<usize> {
        self.state.lock().avail_min.get(&endpoint).copied()
    }
}

impl Transport for MockTransport {
    fn open(&self, endpoint: Endpoint, direction: Direction, config: &PcmConfig) -> HalResult<Box<dyn Pcm>> {
        let mut state = self.state.lock();
        if state.fail_open.contains(&(endpoint, direction)) {
            return Err(HalError::transport(endpoint, "injected open failure"));
        }
        let id = state.next_id;
        state.next_id += 1;
        state.active.push((id, endpoint, direction));
        state.opens.push(OpenRecord {
            endpoint,
            direction,
            config: *config,
        });
        trace!(?endpoint, ?direction, rate = config.rate, "Mock PCM opened");
        Ok(Box::new(MockPcm {
            id,
            endpoint,
            direction,
            config: *config,
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockPcm {
    id: u64,
    endpoint: Endpoint,
    direction: Direction,
    config: PcmConfig,
    state: Arc<Mutex<TransportState>>,
}

impl MockPcm {
    fn check_io(&self, state: &TransportState) -> HalResult<()> {
        if state.fail_io.contains(&self.endpoint) {
            return Err(HalError::transport(self.endpoint, "injected I/O failure"));
        }
        Ok(())
    }
}

impl Pcm for MockPcm {
    fn write(&mut self, samples: &[i16]) -> HalResult<()> {
        let mut state = self.state.lock();
        self.check_io(&state)?;
        let frames = samples.len() / self.config.channels.max(1);
        *state.frames_written.entry(self.endpoint).or_default() += frames;
        state.last_write.insert(self.endpoint, samples.to_vec());
        Ok(())
    }

    fn read(&mut self, samples: &mut [i16]) -> HalResult<()> {
        let state = self.state.lock();
        self.check_io(&state)?;
        samples.fill(state.capture_value);
        Ok(())
    }

    fn timestamp(&self) -> HalResult<PcmTimestamp> {
        let state = self.state.lock();
        self.check_io(&state)?;
        let idle = match self.direction {
            Direction::Playback => self.buffer_size(),
            Direction::Capture => 0,
        };
        Ok(PcmTimestamp {
            available: state.available.unwrap_or(idle),
            time: state.started.elapsed(),
        })
    }

    fn buffer_size(&self) -> usize {
        self.config.buffer_frames()
    }

    fn set_avail_min(&mut self, frames: usize) -> HalResult<()> {
        self.state.lock().avail_min.insert(self.endpoint, frames);
        Ok(())
    }

    fn start(&mut self) -> HalResult<()> {
        Ok(())
    }

    fn stop(&mut self) -> HalResult<()> {
        Ok(())
    }
}

impl Drop for MockPcm {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.active.retain(|&(id, _, _)| id != self.id);
        trace!(endpoint = ?self.endpoint, direction = ?self.direction, "Mock PCM closed");
    }
}
