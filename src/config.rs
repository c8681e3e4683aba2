//! Reference configuration for the charger board and the typed config structs
//! the core is built from.

use crate::data_types::PvInput;
use crate::error::Error;

/// Battery voltage above which charging leaves constant-current (2S Li-ion pack).
pub const V_BATTERY_MAX: f32 = 7.95;
/// Hard ceiling used by the constant-voltage phase.
pub const V_BATTERY_CHG_LIMIT: f32 = 8.2;
/// Deep-discharge threshold.
pub const V_BATTERY_MIN: f32 = 6.0;
pub const I_BATTERY_MAX: f32 = 3.0;
/// Taper current at which the pack is considered full (5 % of `I_BATTERY_MAX`).
pub const I_BATTERY_MIN: f32 = 0.05 * I_BATTERY_MAX;

pub const KP: f32 = 3.2;
pub const KI: f32 = 2.1;
pub const KD: f32 = 2.3;

pub const BUCK_5V0_SETPOINT_V: f32 = 5.0;
pub const BUCK_3V3_SETPOINT_V: f32 = 3.3;
/// PID time quantum, in milliseconds.
pub const PID_ITERATION_PERIOD_MS: f32 = 10.0;

pub const MPPT_1_DELTA_D: f32 = 0.1;
pub const MPPT_1_DELTA_MAX: f32 = 5.0;
pub const MPPT_2_DELTA_D: f32 = 2.5;
pub const MPPT_2_DELTA_MAX: f32 = 5.0;

/// Multiplier applied to `delta_d` for CC/CV down-corrections.
pub const CC_CV_CORRECTION_GAIN: f32 = 5.0;

/// Fast (PID) cadence period: 100 Hz.
pub const PID_PERIOD_US: u32 = 10_000;
/// Slow (MPPT) cadence period: 500 Hz.
pub const MPPT_PERIOD_US: u32 = 2_000;

/// Duty cycle ceiling kept below 100 % so the high-side switch can recharge its bootstrap.
pub const DUTY_CEILING_PERCENT: f32 = 90.0;
pub const INITIAL_DUTY_PERCENT: f32 = 25.0;

/// Battery voltage and current limits.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BatteryLimits {
    pub v_max: f32,
    pub v_min: f32,
    pub v_chg_limit: f32,
    pub i_max: f32,
    pub i_min: f32,
}

impl Default for BatteryLimits {
    fn default() -> Self {
        Self {
            v_max: V_BATTERY_MAX,
            v_min: V_BATTERY_MIN,
            v_chg_limit: V_BATTERY_CHG_LIMIT,
            i_max: I_BATTERY_MAX,
            i_min: I_BATTERY_MIN,
        }
    }
}

/// Proportional, integral and derivative gains.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

impl Default for PidGains {
    fn default() -> Self {
        Self { kp: KP, ki: KI, kd: KD }
    }
}

/// One regulated output.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PidConfig {
    pub gains: PidGains,
    pub setpoint: f32,
    pub iteration_period: f32,
}

impl PidConfig {
    pub fn new(gains: PidGains, setpoint: f32, iteration_period: f32) -> Self {
        Self {
            gains,
            setpoint,
            iteration_period,
        }
    }
}

/// Perturbation step sizes of one tracker, in duty-cycle percent.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackerConfig {
    pub delta_d: f32,
    pub delta_max: f32,
}

/// Timer periods of the two cadences, in microseconds.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CadenceConfig {
    pub pid_period_us: u32,
    pub mppt_period_us: u32,
}

impl CadenceConfig {
    /// Watchdog window: 1.3 fast-cadence periods.
    pub fn watchdog_window_us(&self) -> u32 {
        self.pid_period_us.saturating_mul(13) / 10
    }
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            pid_period_us: PID_PERIOD_US,
            mppt_period_us: MPPT_PERIOD_US,
        }
    }
}

/// Range every commanded duty cycle is clamped into.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DutyLimits {
    pub floor: f32,
    pub ceiling: f32,
}

impl DutyLimits {
    /// Bound `percent` into `[floor, ceiling]`.
    ///
    /// NaN maps to the floor. The ceiling wins if the limits are swapped, so an
    /// unvalidated `DutyLimits` can never push a duty cycle above it.
    pub fn clamp(&self, percent: f32) -> f32 {
        percent.max(self.floor).min(self.ceiling)
    }
}

impl Default for DutyLimits {
    fn default() -> Self {
        Self {
            floor: 0.0,
            ceiling: DUTY_CEILING_PERCENT,
        }
    }
}

/// Which PV input wins when both exceed the battery voltage by the same amount.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ArbitrationPolicy {
    pub prefer_on_tie: PvInput,
}

impl Default for ArbitrationPolicy {
    fn default() -> Self {
        Self {
            prefer_on_tie: PvInput::Pv1,
        }
    }
}

/// Complete configuration of the control core.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CoreConfig {
    pub battery: BatteryLimits,
    pub arbitration: ArbitrationPolicy,
    pub buck_5v0: PidConfig,
    pub buck_3v3: PidConfig,
    pub mppt_1: TrackerConfig,
    pub mppt_2: TrackerConfig,
    pub cc_cv_correction_gain: f32,
    pub cadence: CadenceConfig,
    pub duty: DutyLimits,
    pub initial_duty: f32,
    pub watchdog_enabled: bool,
    /// Number of readiness checks before an MPPT pass gives up on its conversions.
    pub conversion_poll_limit: u32,
    /// Delay between readiness checks.
    pub conversion_poll_interval_us: u32,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            battery: BatteryLimits::default(),
            arbitration: ArbitrationPolicy::default(),
            buck_5v0: PidConfig::new(PidGains::default(), BUCK_5V0_SETPOINT_V, PID_ITERATION_PERIOD_MS),
            buck_3v3: PidConfig::new(PidGains::default(), BUCK_3V3_SETPOINT_V, PID_ITERATION_PERIOD_MS),
            mppt_1: TrackerConfig {
                delta_d: MPPT_1_DELTA_D,
                delta_max: MPPT_1_DELTA_MAX,
            },
            mppt_2: TrackerConfig {
                delta_d: MPPT_2_DELTA_D,
                delta_max: MPPT_2_DELTA_MAX,
            },
            cc_cv_correction_gain: CC_CV_CORRECTION_GAIN,
            cadence: CadenceConfig::default(),
            duty: DutyLimits::default(),
            initial_duty: INITIAL_DUTY_PERCENT,
            watchdog_enabled: true,
            conversion_poll_limit: 200,
            conversion_poll_interval_us: 1,
        }
    }
}

impl CoreConfig {
    /// Check ordering and positivity constraints.
    pub fn validate(&self) -> Result<(), Error> {
        let b = &self.battery;
        if !(b.v_min < b.v_max && b.v_max <= b.v_chg_limit) {
            return Err(Error::InvalidConfig);
        }
        if !(0.0 <= b.i_min && b.i_min < b.i_max) {
            return Err(Error::InvalidConfig);
        }
        for pid in [&self.buck_5v0, &self.buck_3v3] {
            if !(pid.iteration_period > 0.0) {
                return Err(Error::InvalidConfig);
            }
        }
        for tracker in [&self.mppt_1, &self.mppt_2] {
            if !(tracker.delta_d > 0.0 && tracker.delta_max >= tracker.delta_d) {
                return Err(Error::InvalidConfig);
            }
        }
        if !(self.cc_cv_correction_gain > 0.0) {
            return Err(Error::InvalidConfig);
        }
        if self.cadence.pid_period_us == 0 || self.cadence.mppt_period_us == 0 {
            return Err(Error::InvalidConfig);
        }
        if !(0.0 <= self.duty.floor && self.duty.floor < self.duty.ceiling && self.duty.ceiling <= 100.0) {
            return Err(Error::OutOfRange);
        }
        if !(self.duty.floor..=self.duty.ceiling).contains(&self.initial_duty) {
            return Err(Error::OutOfRange);
        }
        if self.conversion_poll_limit == 0 {
            return Err(Error::InvalidConfig);
        }
        Ok(())
    }
}
