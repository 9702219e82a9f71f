//! Call controller
//!
//! Owns the duplex modem voice link. Both directions are opened together at
//! the rate selected by the wideband flag; a failure on either side leaves
//! nothing open.

use tracing::{debug, error, info};

use crate::config::ModemConfig;
use crate::error::{HalError, HalResult};
use crate::hal::{Direction, Endpoint, Pcm, PcmConfig, Transport};

/// Modem voice link state
#[derive(Default)]
pub struct CallController {
    downlink: Option<Box<dyn Pcm>>,
    uplink: Option<Box<dyn Pcm>>,
    rate: Option<u32>,
}

impl std::fmt::Debug for CallController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallController")
            .field("downlink", &self.downlink.is_some())
            .field("uplink", &self.uplink.is_some())
            .field("rate", &self.rate)
            .finish()
    }
}

impl CallController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Modem rate for the given codec bandwidth
    pub fn rate_for(modem: &ModemConfig, wideband: bool) -> u32 {
        if wideband {
            modem.wideband_rate
        } else {
            modem.narrowband_rate
        }
    }

    /// Open and start both modem endpoints
    pub fn start(&mut self, transport: &dyn Transport, modem: &ModemConfig, wideband: bool) -> HalResult<()> {
        let rate = Self::rate_for(modem, wideband);
        let config = PcmConfig::new(2, rate, modem.period_size, modem.period_count);
        info!(rate, wideband, "Opening modem PCMs");

        if self.downlink.is_none() {
            match transport.open(Endpoint::Modem, Direction::Playback, &config) {
                Ok(pcm) => self.downlink = Some(pcm),
                Err(e) => {
                    error!(error = %e, "Cannot open modem downlink");
                    self.close();
                    return Err(HalError::resource_exhausted("modem downlink"));
                }
            }
        }

        if self.uplink.is_none() {
            match transport.open(Endpoint::Modem, Direction::Capture, &config) {
                Ok(pcm) => self.uplink = Some(pcm),
                Err(e) => {
                    error!(error = %e, "Cannot open modem uplink");
                    self.close();
                    return Err(HalError::resource_exhausted("modem uplink"));
                }
            }
        }

        for pcm in [self.downlink.as_mut(), self.uplink.as_mut()].into_iter().flatten() {
            if let Err(e) = pcm.start() {
                debug!(error = %e, "Modem PCM start failed");
            }
        }
        self.rate = Some(rate);
        Ok(())
    }

    /// Stop and close both modem endpoints
    pub fn end(&mut self) {
        if self.is_active() {
            info!("Closing modem PCMs");
        }
        for pcm in [self.downlink.as_mut(), self.uplink.as_mut()].into_iter().flatten() {
            if let Err(e) = pcm.stop() {
                debug!(error = %e, "Modem PCM stop failed");
            }
        }
        self.close();
    }

    /// Reopen both endpoints at the rate for `wideband`
    pub fn restart(&mut self, transport: &dyn Transport, modem: &ModemConfig, wideband: bool) -> HalResult<()> {
        self.end();
        self.start(transport, modem, wideband)
    }

    fn close(&mut self) {
        self.downlink = None;
        self.uplink = None;
        self.rate = None;
    }

    /// True while both modem endpoints are open
    pub fn is_active(&self) -> bool {
        self.downlink.is_some() && self.uplink.is_some()
    }

    /// Rate of the open modem link
    pub fn rate(&self) -> Option<u32> {
        self.rate
    }
}
