//! Software watchdog for hosted builds and test harnesses.
//!
//! Models a windowed hardware watchdog against an externally advanced clock.
//! Instead of resetting the device it latches a reset request that the harness
//! can observe.

use crate::hal::Watchdog;

/// Reset condition raised when the watchdog window elapses without service.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ResetRequest {
    /// Time since the last service when the window expired.
    pub starved_for_us: u32,
}

#[derive(Clone, Debug, Default)]
pub struct SoftwareWatchdog {
    window_us: Option<u32>,
    since_service_us: u32,
    reset: Option<ResetRequest>,
    services: u32,
}

impl SoftwareWatchdog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the simulated clock. Returns the reset request once the window has
    /// been exceeded; the request stays latched until [`clear_reset`].
    ///
    /// [`clear_reset`]: Self::clear_reset
    pub fn elapse(&mut self, us: u32) -> Result<(), ResetRequest> {
        if let Some(reset) = self.reset {
            return Err(reset);
        }
        let Some(window) = self.window_us else {
            return Ok(());
        };
        self.since_service_us = self.since_service_us.saturating_add(us);
        if self.since_service_us > window {
            let reset = ResetRequest {
                starved_for_us: self.since_service_us,
            };
            error!("watchdog expired after {=u32} us", reset.starved_for_us);
            self.reset = Some(reset);
            return Err(reset);
        }
        Ok(())
    }

    pub fn is_armed(&self) -> bool {
        self.window_us.is_some()
    }

    pub fn window_us(&self) -> Option<u32> {
        self.window_us
    }

    pub fn reset_requested(&self) -> Option<ResetRequest> {
        self.reset
    }

    /// Simulate the device coming back from reset: disarmed, nothing latched.
    pub fn clear_reset(&mut self) {
        *self = Self::default();
    }

    pub fn service_count(&self) -> u32 {
        self.services
    }
}

impl Watchdog for SoftwareWatchdog {
    fn arm(&mut self, window_us: u32) {
        self.window_us = Some(window_us);
        self.since_service_us = 0;
    }

    fn service(&mut self) {
        // A latched reset cannot be serviced away.
        if self.reset.is_none() {
            self.since_service_us = 0;
            self.services = self.services.wrapping_add(1);
        }
    }
}
