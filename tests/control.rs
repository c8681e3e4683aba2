mod common;

use common::assert_close;
use solar_mppt_rs::config::DutyLimits;
use solar_mppt_rs::control::MpptSample;
use solar_mppt_rs::data_types::{DutyCommand, PvInput};
use solar_mppt_rs::{ControlCore, CoreConfig};

#[test]
fn duty_limits_clamp() {
    let limits = DutyLimits::default();
    assert_eq!(limits.clamp(-5.0), 0.0);
    assert_eq!(limits.clamp(42.0), 42.0);
    assert_eq!(limits.clamp(120.0), 90.0);
    assert_eq!(limits.clamp(f32::NAN), 0.0);
    assert_eq!(limits.clamp(f32::INFINITY), 90.0);
}

#[test]
fn swapped_duty_limits_never_exceed_ceiling() {
    let limits = DutyLimits {
        floor: 60.0,
        ceiling: 40.0,
    };
    assert_eq!(limits.clamp(10.0), 40.0);
    assert_eq!(limits.clamp(80.0), 40.0);
    assert_eq!(limits.clamp(f32::NAN), 40.0);
}

#[test]
fn unvalidated_core_runs_pid_pass() {
    let mut config = CoreConfig::default();
    config.duty = DutyLimits {
        floor: 60.0,
        ceiling: 40.0,
    };
    assert!(config.validate().is_err());

    let mut core = ControlCore::new(&config);
    let targets = core.pid_pass(4.0, 3.3);
    assert_eq!(targets.buck_5v0, 40.0);
    assert_eq!(targets.buck_3v3, 40.0);
}

#[test]
fn pid_pass_advances_both_loops() {
    let mut core = ControlCore::new(&CoreConfig::default());
    let targets = core.pid_pass(4.0, 3.3);
    assert_close(targets.buck_5v0, 24.43);
    assert_eq!(targets.buck_3v3, 0.0);
    assert_close(core.buck_5v0().integral(), 10.0);
}

#[test]
fn mppt_pass_routes_commands_to_the_charging_input() {
    let mut core = ControlCore::new(&CoreConfig::default());
    core.init_battery(7.5, 1.0);
    let sample = MpptSample {
        pv1_voltage: 5.0,
        pv1_current: 0.0,
        pv2_voltage: 18.0,
        pv2_current: 1.0,
        battery_voltage: 7.5,
        battery_current: 1.0,
    };

    let commands = core.mppt_pass(&sample);
    assert_eq!(commands.active, Some(PvInput::Pv2));
    assert_eq!(commands.mppt_1, DutyCommand::Shutdown);
    // Priming tick holds the duty cycle.
    assert_eq!(commands.mppt_2, DutyCommand::Step(0.0));
    assert_eq!(commands.for_input(PvInput::Pv2), commands.mppt_2);
}
