//! The control state owned by the scheduler: two output PID loops, two MPPT
//! trackers and the battery. Pure computation, no I/O.

use crate::battery::Battery;
use crate::config::{CoreConfig, DutyLimits};
use crate::data_types::{DutyCommand, PvInput};
use crate::mppt::MpptTracker;
use crate::pid::PidController;

/// Clamped duty-cycle targets for the output bucks.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PidTargets {
    pub buck_5v0: f32,
    pub buck_3v3: f32,
}

/// Every reading consumed by one MPPT pass, captured before any delta is taken.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MpptSample {
    pub pv1_voltage: f32,
    pub pv1_current: f32,
    pub pv2_voltage: f32,
    pub pv2_current: f32,
    pub battery_voltage: f32,
    pub battery_current: f32,
}

/// Charger converter commands for one MPPT pass.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MpptCommands {
    pub mppt_1: DutyCommand,
    pub mppt_2: DutyCommand,
    /// Input charging the battery, if any.
    pub active: Option<PvInput>,
}

impl MpptCommands {
    pub fn for_input(&self, input: PvInput) -> DutyCommand {
        match input {
            PvInput::Pv1 => self.mppt_1,
            PvInput::Pv2 => self.mppt_2,
        }
    }
}

pub struct ControlCore {
    buck_5v0: PidController,
    buck_3v3: PidController,
    mppt_1: MpptTracker,
    mppt_2: MpptTracker,
    battery: Battery,
    duty: DutyLimits,
    correction_gain: f32,
}

impl ControlCore {
    /// Build the control state. `config` is not validated here; see
    /// [`CoreConfig::validate`].
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            buck_5v0: PidController::from_config(&config.buck_5v0),
            buck_3v3: PidController::from_config(&config.buck_3v3),
            mppt_1: MpptTracker::from_config(PvInput::Pv1, &config.mppt_1),
            mppt_2: MpptTracker::from_config(PvInput::Pv2, &config.mppt_2),
            battery: Battery::new(config.battery, config.arbitration, 0.0, 0.0),
            duty: config.duty,
            correction_gain: config.cc_cv_correction_gain,
        }
    }

    /// Seed the battery from the start-up reading.
    pub fn init_battery(&mut self, voltage: f32, current: f32) {
        self.battery = Battery::new(*self.battery.limits(), self.battery.policy(), voltage, current);
    }

    /// Run both output PID loops against their measured voltages.
    pub fn pid_pass(&mut self, buck_5v0_voltage: f32, buck_3v3_voltage: f32) -> PidTargets {
        PidTargets {
            buck_5v0: self.duty.clamp(self.buck_5v0.calculate(buck_5v0_voltage)),
            buck_3v3: self.duty.clamp(self.buck_3v3.calculate(buck_3v3_voltage)),
        }
    }

    /// Refresh the battery, feed both trackers, and gate the charging tracker's
    /// step through the CC/CV interlock.
    pub fn mppt_pass(&mut self, sample: &MpptSample) -> MpptCommands {
        self.battery.refresh(
            sample.battery_voltage,
            sample.battery_current,
            sample.pv1_voltage,
            sample.pv2_voltage,
        );
        self.mppt_1.update_samples(sample.pv1_voltage, sample.pv1_current);
        self.mppt_2.update_samples(sample.pv2_voltage, sample.pv2_current);

        let active = self.battery.source().input();
        let (step, correction) = match active {
            Some(input) => {
                let tracker = self.tracker(input);
                // Priming tick: hold the duty cycle, the interlock still applies.
                (tracker.step().unwrap_or(0.0), tracker.correction_limit(self.correction_gain))
            }
            None => (0.0, 0.0),
        };
        let command = self.battery.apply_cc_cv(step, correction);

        let (mppt_1, mppt_2) = match active {
            Some(PvInput::Pv1) | None => (command.active, command.inactive),
            Some(PvInput::Pv2) => (command.inactive, command.active),
        };
        MpptCommands { mppt_1, mppt_2, active }
    }

    pub fn duty_limits(&self) -> &DutyLimits {
        &self.duty
    }

    pub fn buck_5v0(&self) -> &PidController {
        &self.buck_5v0
    }

    pub fn buck_3v3(&self) -> &PidController {
        &self.buck_3v3
    }

    pub fn tracker(&self, input: PvInput) -> &MpptTracker {
        match input {
            PvInput::Pv1 => &self.mppt_1,
            PvInput::Pv2 => &self.mppt_2,
        }
    }

    pub fn battery(&self) -> &Battery {
        &self.battery
    }
}
