//! Logical identities for sensors, outputs and cadences, plus the charge-state enums.

use crate::calibration::{
    BATT_SENSE_R1, BATT_SENSE_R2, BUCK_3V3_R1, BUCK_3V3_R2, BUCK_5V0_R1, BUCK_5V0_R2, CURRENT_SENSE_QUIESCENT_V,
    CURRENT_SENSE_V_PER_A, Calibration, ChannelSet, DueFlags, PV_SENSE_R1, PV_SENSE_R2,
};
use crate::error::Error;

/// Sensor channels sampled by the conversion layer.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SensorChannel {
    Pv1Voltage,
    Pv1Current,
    Pv2Voltage,
    Pv2Current,
    Buck5v0Voltage,
    Buck3v3Voltage,
    BatteryVoltage,
    BatteryCurrent,
}

impl SensorChannel {
    pub const COUNT: usize = 8;

    pub const ALL: [SensorChannel; Self::COUNT] = [
        SensorChannel::Pv1Voltage,
        SensorChannel::Pv1Current,
        SensorChannel::Pv2Voltage,
        SensorChannel::Pv2Current,
        SensorChannel::Buck5v0Voltage,
        SensorChannel::Buck3v3Voltage,
        SensorChannel::BatteryVoltage,
        SensorChannel::BatteryCurrent,
    ];

    /// Slot of this channel in per-channel arrays.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Single-bit set for this channel.
    pub const fn mask(self) -> ChannelSet {
        ChannelSet::from_bits_truncate(1 << self as u8)
    }

    /// Front-end calibration for this channel.
    pub const fn calibration(self) -> Calibration {
        const PV: Calibration = Calibration::Divider {
            r1: PV_SENSE_R1,
            r2: PV_SENSE_R2,
        };
        const HALL: Calibration = Calibration::HallCurrent {
            quiescent_v: CURRENT_SENSE_QUIESCENT_V,
            volts_per_amp: CURRENT_SENSE_V_PER_A,
        };
        match self {
            SensorChannel::Pv1Voltage | SensorChannel::Pv2Voltage => PV,
            SensorChannel::Pv1Current | SensorChannel::Pv2Current | SensorChannel::BatteryCurrent => HALL,
            SensorChannel::Buck5v0Voltage => Calibration::Divider {
                r1: BUCK_5V0_R1,
                r2: BUCK_5V0_R2,
            },
            SensorChannel::Buck3v3Voltage => Calibration::Divider {
                r1: BUCK_3V3_R1,
                r2: BUCK_3V3_R2,
            },
            SensorChannel::BatteryVoltage => Calibration::Divider {
                r1: BATT_SENSE_R1,
                r2: BATT_SENSE_R2,
            },
        }
    }
}

impl TryFrom<u8> for SensorChannel {
    type Error = Error;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        SensorChannel::ALL
            .get(id as usize)
            .copied()
            .ok_or_else(|| {
                warn!("unknown sensor channel id {=u8}", id);
                Error::UnknownChannel(id)
            })
    }
}

/// PWM outputs driven by the core.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OutputId {
    /// 5.0 V output buck.
    Buck5v0,
    /// 3.3 V output buck.
    Buck3v3,
    /// Charger converter fed by PV input 1.
    Mppt1,
    /// Charger converter fed by PV input 2.
    Mppt2,
}

impl OutputId {
    pub const COUNT: usize = 4;

    pub const ALL: [OutputId; Self::COUNT] = [
        OutputId::Buck5v0,
        OutputId::Buck3v3,
        OutputId::Mppt1,
        OutputId::Mppt2,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<u8> for OutputId {
    type Error = Error;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        OutputId::ALL
            .get(id as usize)
            .copied()
            .ok_or_else(|| {
                warn!("unknown PWM output id {=u8}", id);
                Error::UnknownOutput(id)
            })
    }
}

/// Photovoltaic inputs. Each owns a voltage/current channel pair and a charger converter.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PvInput {
    Pv1,
    Pv2,
}

impl PvInput {
    pub const fn voltage_channel(self) -> SensorChannel {
        match self {
            PvInput::Pv1 => SensorChannel::Pv1Voltage,
            PvInput::Pv2 => SensorChannel::Pv2Voltage,
        }
    }

    pub const fn current_channel(self) -> SensorChannel {
        match self {
            PvInput::Pv1 => SensorChannel::Pv1Current,
            PvInput::Pv2 => SensorChannel::Pv2Current,
        }
    }

    pub const fn output(self) -> OutputId {
        match self {
            PvInput::Pv1 => OutputId::Mppt1,
            PvInput::Pv2 => OutputId::Mppt2,
        }
    }
}

/// Timer-driven control cadences.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Cadence {
    /// Fast cadence driving the output PID loops.
    Pid,
    /// Slow cadence driving MPPT, battery refresh and CC/CV arbitration.
    Mppt,
}

impl Cadence {
    pub const COUNT: usize = 2;

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn flag(self) -> DueFlags {
        match self {
            Cadence::Pid => DueFlags::PID,
            Cadence::Mppt => DueFlags::MPPT,
        }
    }
}

/// Whether the battery is being charged or is supplying the load.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ChargeState {
    #[default]
    Supply,
    Charge,
}

/// PV input currently charging the battery.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ChargeSource {
    Pv1,
    Pv2,
    #[default]
    NotCharging,
}

impl ChargeSource {
    pub const fn input(self) -> Option<PvInput> {
        match self {
            ChargeSource::Pv1 => Some(PvInput::Pv1),
            ChargeSource::Pv2 => Some(PvInput::Pv2),
            ChargeSource::NotCharging => None,
        }
    }
}

impl From<PvInput> for ChargeSource {
    fn from(input: PvInput) -> Self {
        match input {
            PvInput::Pv1 => ChargeSource::Pv1,
            PvInput::Pv2 => ChargeSource::Pv2,
        }
    }
}

/// CC/CV charge phase.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ChargePhase {
    #[default]
    Inactive,
    ConstantCurrent,
    ConstantVoltage,
    /// Charge current has tapered off at the voltage limit.
    Full,
}

/// What to do with a converter's duty cycle on this pass.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DutyCommand {
    /// Add this many percent to the current duty cycle.
    Step(f32),
    /// Drive the duty cycle to zero.
    Shutdown,
}

impl DutyCommand {
    /// Duty cycle that results from applying this command to `current`.
    pub fn apply(self, current: f32) -> f32 {
        match self {
            DutyCommand::Step(delta) => current + delta,
            DutyCommand::Shutdown => 0.0,
        }
    }
}
