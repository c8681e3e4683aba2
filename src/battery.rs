//! Battery charge-state tracking and the CC/CV safety interlock.

use crate::config::{ArbitrationPolicy, BatteryLimits};
use crate::data_types::{ChargePhase, ChargeSource, ChargeState, DutyCommand, PvInput};

/// Charger half of the battery state.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Charger {
    pub source: ChargeSource,
    pub phase: ChargePhase,
}

/// Commands for the two charger converters produced by [`Battery::apply_cc_cv`].
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CcCvCommand {
    /// Converter of the PV input selected as charge source.
    pub active: DutyCommand,
    /// The other converter.
    pub inactive: DutyCommand,
}

impl CcCvCommand {
    pub const SHUTDOWN: CcCvCommand = CcCvCommand {
        active: DutyCommand::Shutdown,
        inactive: DutyCommand::Shutdown,
    };
}

/// Battery measurements and derived charge state.
#[derive(Clone, Debug, PartialEq)]
pub struct Battery {
    limits: BatteryLimits,
    policy: ArbitrationPolicy,
    voltage: f32,
    current: f32,
    state: ChargeState,
    charger: Charger,
}

impl Battery {
    /// Create from an initial reading. Starts in `Supply` until the first refresh
    /// sees PV voltages.
    pub fn new(limits: BatteryLimits, policy: ArbitrationPolicy, voltage: f32, current: f32) -> Self {
        Self {
            limits,
            policy,
            voltage,
            current,
            state: ChargeState::Supply,
            charger: Charger::default(),
        }
    }

    /// Update from fresh readings: arbitrate the charge source, then derive the phase.
    pub fn refresh(&mut self, voltage: f32, current: f32, pv1_voltage: f32, pv2_voltage: f32) {
        self.voltage = voltage;
        self.current = current;

        match self.arbitrate(pv1_voltage, pv2_voltage) {
            Some(input) => {
                self.state = ChargeState::Charge;
                self.charger.source = input.into();
                self.charger.phase = self.phase_for_readings();
            }
            None => {
                self.state = ChargeState::Supply;
                self.charger.source = ChargeSource::NotCharging;
                self.charger.phase = ChargePhase::Inactive;
            }
        }
    }

    fn arbitrate(&self, pv1_voltage: f32, pv2_voltage: f32) -> Option<PvInput> {
        let pv1_ok = pv1_voltage > self.voltage;
        let pv2_ok = pv2_voltage > self.voltage;
        match (pv1_ok, pv2_ok) {
            (true, true) if pv1_voltage > pv2_voltage => Some(PvInput::Pv1),
            (true, true) if pv2_voltage > pv1_voltage => Some(PvInput::Pv2),
            (true, true) => Some(self.policy.prefer_on_tie),
            (true, false) => Some(PvInput::Pv1),
            (false, true) => Some(PvInput::Pv2),
            (false, false) => None,
        }
    }

    fn phase_for_readings(&self) -> ChargePhase {
        let l = &self.limits;
        if self.current <= l.i_min && self.voltage >= l.v_max {
            ChargePhase::Full
        } else if self.voltage < l.v_max {
            ChargePhase::ConstantCurrent
        } else {
            ChargePhase::ConstantVoltage
        }
    }

    /// Gate the active tracker's perturb-and-observe step through the CC/CV limits.
    ///
    /// `correction` is the magnitude of the down-step applied when the active
    /// limit is exceeded. The inactive converter is always shut down, and both
    /// are shut down when the pack is full or nothing is charging.
    pub fn apply_cc_cv(&self, mppt_step: f32, correction: f32) -> CcCvCommand {
        let l = &self.limits;
        let over_limit = match self.charger.phase {
            ChargePhase::Inactive | ChargePhase::Full => return CcCvCommand::SHUTDOWN,
            ChargePhase::ConstantCurrent => self.current > l.i_max,
            ChargePhase::ConstantVoltage => self.voltage > l.v_chg_limit,
        };
        let active = if over_limit {
            DutyCommand::Step(-correction)
        } else {
            DutyCommand::Step(mppt_step)
        };
        CcCvCommand {
            active,
            inactive: DutyCommand::Shutdown,
        }
    }

    /// Pack is below its deep-discharge threshold.
    pub fn is_depleted(&self) -> bool {
        self.voltage < self.limits.v_min
    }

    pub fn voltage(&self) -> f32 {
        self.voltage
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn state(&self) -> ChargeState {
        self.state
    }

    pub fn charger(&self) -> Charger {
        self.charger
    }

    pub fn source(&self) -> ChargeSource {
        self.charger.source
    }

    pub fn phase(&self) -> ChargePhase {
        self.charger.phase
    }

    pub fn limits(&self) -> &BatteryLimits {
        &self.limits
    }

    pub fn policy(&self) -> ArbitrationPolicy {
        self.policy
    }
}
