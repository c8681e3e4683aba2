//! Error definitions for the charge-controller core.

use core::convert::Infallible;

use crate::calibration::ChannelSet;
use crate::data_types::{OutputId, SensorChannel};

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, PartialEq)]
pub enum Error<HalError = Infallible> {
    /// Underlying peripheral operation failed.
    Hal(HalError),
    /// Numeric sensor channel identifier does not name a channel.
    UnknownChannel(u8),
    /// Numeric output identifier does not name a PWM output.
    UnknownOutput(u8),
    /// Channel has not produced a conversion since start-up.
    NoSample(SensorChannel),
    /// Provided parameter was outside its permitted range.
    OutOfRange,
    /// Configuration violates an ordering or positivity constraint.
    InvalidConfig,
}

impl<HalError: core::fmt::Debug> core::fmt::Display for Error<HalError> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Hal(e) => write!(f, "peripheral error: {:?}", e),
            Error::UnknownChannel(id) => write!(f, "unknown sensor channel {}", id),
            Error::UnknownOutput(id) => write!(f, "unknown PWM output {}", id),
            Error::NoSample(channel) => write!(f, "no conversion available for {:?}", channel),
            Error::OutOfRange => write!(f, "parameter out of range"),
            Error::InvalidConfig => write!(f, "invalid controller configuration"),
        }
    }
}

/// Non-fatal fault that caused a control pass to be skipped.
///
/// Faults never cross the scheduler boundary as errors; they are reported in
/// the poll result and the loop carries on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Fault {
    /// Reading a channel failed.
    SensorRead(SensorChannel),
    /// Conversions for the group did not complete inside the polling budget.
    ConversionTimeout(ChannelSet),
    /// Writing a duty cycle failed.
    Actuation(OutputId),
}

#[cfg(feature = "defmt")]
impl defmt::Format for Fault {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Fault::SensorRead(channel) => defmt::write!(f, "SensorRead({})", channel),
            Fault::ConversionTimeout(group) => defmt::write!(f, "ConversionTimeout({=u8:#x})", group.bits()),
            Fault::Actuation(output) => defmt::write!(f, "Actuation({})", output),
        }
    }
}
