//! Seams to the board: sensing, actuation, watchdog, timers and status LEDs,
//! plus adapters over `embedded-hal` PWM channels and GPIO pins.

use embedded_hal::digital::{OutputPin, PinState};
use embedded_hal::pwm::SetDutyCycle;

use crate::calibration::ChannelSet;
use crate::data_types::{Cadence, OutputId, PvInput, SensorChannel};
use crate::error::Error;

/// Converted sensor readings.
pub trait Sensors {
    type Error: core::fmt::Debug;

    /// Latest converted value of a channel, in volts or amps.
    fn read_sensor(&mut self, channel: SensorChannel) -> Result<f32, Self::Error>;

    /// Start conversions for every channel in `group`.
    fn trigger_conversion(&mut self, group: ChannelSet);

    /// Every channel in `group` has completed since it was last triggered.
    fn conversion_ready(&mut self, group: ChannelSet) -> bool;
}

/// PWM duty-cycle actuation, in percent.
pub trait DutyCycles {
    type Error: core::fmt::Debug;

    fn set_duty_cycle(&mut self, output: OutputId, percent: f32) -> Result<(), Self::Error>;

    /// Last duty cycle commanded on `output`.
    fn duty_cycle(&self, output: OutputId) -> f32;
}

/// Hardware watchdog. Expiry resets the device.
pub trait Watchdog {
    fn arm(&mut self, window_us: u32);
    fn service(&mut self);
}

/// Periodic timers whose interrupts raise the activation flags.
pub trait CadenceTimers {
    fn on_timer(&mut self, cadence: Cadence, period_us: u32);
}

/// Status outputs. Failures to drive them are ignored by the core.
pub trait Indicators {
    /// Called once per completed MPPT pass.
    fn heartbeat(&mut self) {}

    /// Direction of the last step applied to the charging converter.
    fn tracking_direction(&mut self, _input: PvInput, _increasing: bool) {}
}

impl Indicators for () {}

/// Heartbeat and tracking-direction LEDs on two GPIO pins.
pub struct PinIndicators<H, D> {
    heartbeat: H,
    direction: D,
    heartbeat_level: bool,
}

impl<H, D> PinIndicators<H, D>
where
    H: OutputPin,
    D: OutputPin,
{
    pub fn new(heartbeat: H, direction: D) -> Self {
        Self {
            heartbeat,
            direction,
            heartbeat_level: true,
        }
    }

    /// Give the pins back.
    pub fn release(self) -> (H, D) {
        (self.heartbeat, self.direction)
    }
}

impl<H, D> Indicators for PinIndicators<H, D>
where
    H: OutputPin,
    D: OutputPin,
{
    fn heartbeat(&mut self) {
        let _ = self.heartbeat.set_state(PinState::from(self.heartbeat_level));
        self.heartbeat_level = !self.heartbeat_level;
    }

    fn tracking_direction(&mut self, _input: PvInput, increasing: bool) {
        let _ = self.direction.set_state(PinState::from(increasing));
    }
}

/// Four PWM channels, indexed by [`OutputId`], behind `embedded-hal`'s `SetDutyCycle`.
///
/// `SetDutyCycle` has no getter, so the last commanded percentage is cached.
pub struct PwmOutputs<C> {
    channels: [C; OutputId::COUNT],
    duty: [f32; OutputId::COUNT],
}

impl<C> PwmOutputs<C>
where
    C: SetDutyCycle,
{
    /// Channels in [`OutputId::ALL`] order: 5.0 V buck, 3.3 V buck, MPPT 1, MPPT 2.
    pub fn new(channels: [C; OutputId::COUNT]) -> Self {
        Self {
            channels,
            duty: [0.0; OutputId::COUNT],
        }
    }

    pub fn channel_mut(&mut self, output: OutputId) -> &mut C {
        &mut self.channels[output.index()]
    }

    pub fn free(self) -> [C; OutputId::COUNT] {
        self.channels
    }
}

impl<C> DutyCycles for PwmOutputs<C>
where
    C: SetDutyCycle,
{
    type Error = Error<C::Error>;

    fn set_duty_cycle(&mut self, output: OutputId, percent: f32) -> Result<(), Self::Error> {
        if percent.is_nan() {
            return Err(Error::OutOfRange);
        }
        let percent = percent.clamp(0.0, 100.0);
        let channel = &mut self.channels[output.index()];
        let max = channel.max_duty_cycle();
        let duty = ((percent / 100.0) * max as f32) as u16;
        channel.set_duty_cycle(duty.min(max)).map_err(Error::Hal)?;
        self.duty[output.index()] = percent;
        Ok(())
    }

    fn duty_cycle(&self, output: OutputId) -> f32 {
        self.duty[output.index()]
    }
}
