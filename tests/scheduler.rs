mod common;

use common::{FakeOutputs, FakeSensors, FakeTimers, assert_close};
use embedded_hal_mock::eh1::delay::NoopDelay;
use solar_mppt_rs::calibration::ChannelSet;
use solar_mppt_rs::data_types::{Cadence, ChargePhase, ChargeSource, OutputId, PvInput, SensorChannel};
use solar_mppt_rs::mppt::TrackerState;
use solar_mppt_rs::watchdog::{ResetRequest, SoftwareWatchdog};
use solar_mppt_rs::{ActivationFlags, Activity, CoreConfig, Error, Fault, Hardware, PassOutcome, Scheduler};

type TestScheduler<'a> = Scheduler<'a, FakeSensors, FakeOutputs, SoftwareWatchdog, NoopDelay>;

fn hardware(sensors: FakeSensors) -> Hardware<FakeSensors, FakeOutputs, SoftwareWatchdog, NoopDelay> {
    Hardware {
        sensors,
        outputs: FakeOutputs::default(),
        watchdog: SoftwareWatchdog::new(),
        delay: NoopDelay::new(),
    }
}

fn default_sensors() -> FakeSensors {
    let mut sensors = FakeSensors::new();
    sensors
        .charging((18.0, 1.0), (5.0, 0.0), (7.5, 1.0))
        .set(SensorChannel::Buck5v0Voltage, 4.0)
        .set(SensorChannel::Buck3v3Voltage, 3.3);
    sensors
}

/// Started scheduler with default config and a PV1-charging board.
fn started(flags: &ActivationFlags) -> TestScheduler<'_> {
    let mut sched = Scheduler::new(flags, CoreConfig::default(), hardware(default_sensors())).unwrap();
    sched.start(&mut FakeTimers::default()).unwrap();
    sched
}

fn sensors<'s>(sched: &'s mut TestScheduler<'_>) -> &'s mut FakeSensors {
    &mut sched.hardware_mut().sensors
}

fn duty(sched: &TestScheduler<'_>, output: OutputId) -> f32 {
    sched.hardware().outputs.get(output)
}

fn tick(sched: &mut TestScheduler<'_>, cadence: Cadence) -> Activity {
    sched.flags().raise(cadence);
    sched.poll()
}

#[test]
fn start_seeds_outputs_timers_and_watchdog() {
    let flags = ActivationFlags::new();
    let mut sched = Scheduler::new(&flags, CoreConfig::default(), hardware(default_sensors())).unwrap();
    let mut timers = FakeTimers::default();
    sched.start(&mut timers).unwrap();

    assert_eq!(timers.registered, vec![(Cadence::Pid, 10_000), (Cadence::Mppt, 2_000)]);
    assert_eq!(sched.hardware().sensors.triggered, vec![ChannelSet::BATTERY]);
    assert_eq!(sched.hardware().watchdog.window_us(), Some(13_000));
    for output in OutputId::ALL {
        assert_eq!(duty(&sched, output), 25.0);
    }
    assert_eq!(sched.core().battery().voltage(), 7.5);
    assert_eq!(sched.core().battery().current(), 1.0);
}

#[test]
fn start_without_watchdog_leaves_it_disarmed() {
    let flags = ActivationFlags::new();
    let config = CoreConfig {
        watchdog_enabled: false,
        ..CoreConfig::default()
    };
    let mut sched = Scheduler::new(&flags, config, hardware(default_sensors())).unwrap();
    sched.start(&mut FakeTimers::default()).unwrap();
    assert!(!sched.hardware().watchdog.is_armed());

    sched.poll();
    assert_eq!(sched.hardware().watchdog.service_count(), 0);
}

#[test]
fn start_times_out_without_battery_conversion() {
    let flags = ActivationFlags::new();
    let mut sensors = default_sensors();
    sensors.converts = false;
    let mut sched = Scheduler::new(&flags, CoreConfig::default(), hardware(sensors)).unwrap();
    let mut timers = FakeTimers::default();

    assert_eq!(
        sched.start(&mut timers),
        Err(Fault::ConversionTimeout(ChannelSet::BATTERY))
    );
    assert!(timers.registered.is_empty());
}

#[test]
fn invalid_config_is_rejected() {
    let flags = ActivationFlags::new();
    let mut config = CoreConfig::default();
    config.battery.v_min = 9.0;
    let result = Scheduler::new(&flags, config, hardware(FakeSensors::new()));
    assert_eq!(result.err(), Some(Error::InvalidConfig));

    let mut config = CoreConfig::default();
    config.initial_duty = 95.0;
    let result = Scheduler::new(&flags, config, hardware(FakeSensors::new()));
    assert_eq!(result.err(), Some(Error::OutOfRange));
}

#[test]
fn poll_with_nothing_due_is_idle() {
    let flags = ActivationFlags::new();
    let mut sched = started(&flags);
    let writes = sched.hardware().outputs.writes.len();

    assert_eq!(sched.poll(), Activity::Idle);
    assert_eq!(sched.hardware().outputs.writes.len(), writes);
    assert_eq!(sched.hardware().watchdog.service_count(), 1);
}

#[test]
fn raised_flags_coalesce_and_persist_until_run() {
    let flags = ActivationFlags::new();
    let mut sched = started(&flags);

    flags.raise(Cadence::Pid);
    flags.raise(Cadence::Pid);
    assert_eq!(flags.raised(Cadence::Pid), 2);
    assert_eq!(flags.coalesced(Cadence::Pid), 1);
    assert!(flags.is_due(Cadence::Pid));
    assert!(!flags.is_due(Cadence::Mppt));

    assert_eq!(
        sched.poll(),
        Activity::Ran {
            pid: PassOutcome::Completed,
            mppt: PassOutcome::NotDue,
        }
    );
    assert!(flags.pending().is_empty());
    // One pass for two raises.
    assert_close(sched.core().buck_5v0().integral(), 10.0);
}

#[test]
fn pid_pass_drives_bucks() {
    let flags = ActivationFlags::new();
    let mut sched = started(&flags);

    tick(&mut sched, Cadence::Pid);
    assert_close(duty(&sched, OutputId::Buck5v0), 24.43);
    assert_eq!(duty(&sched, OutputId::Buck3v3), 0.0);
    // Charger converters untouched.
    assert_eq!(duty(&sched, OutputId::Mppt1), 25.0);
}

#[test]
fn pid_output_is_clamped_to_ceiling() {
    let flags = ActivationFlags::new();
    let mut sched = started(&flags);
    sensors(&mut sched).set(SensorChannel::Buck5v0Voltage, 0.0);

    tick(&mut sched, Cadence::Pid);
    assert_eq!(duty(&sched, OutputId::Buck5v0), 90.0);
}

#[test]
fn pid_runs_before_mppt_in_one_poll() {
    let flags = ActivationFlags::new();
    let mut sched = started(&flags);
    let before = sched.hardware().outputs.writes.len();

    flags.raise(Cadence::Mppt);
    flags.raise(Cadence::Pid);
    assert_eq!(
        sched.poll(),
        Activity::Ran {
            pid: PassOutcome::Completed,
            mppt: PassOutcome::Completed,
        }
    );

    let order: Vec<OutputId> = sched.hardware().outputs.writes[before..]
        .iter()
        .map(|(output, _)| *output)
        .collect();
    assert_eq!(
        order,
        vec![OutputId::Buck5v0, OutputId::Buck3v3, OutputId::Mppt1, OutputId::Mppt2]
    );
    assert!(flags.pending().is_empty());
}

#[test]
fn mppt_priming_then_tracking() {
    let flags = ActivationFlags::new();
    let mut sched = started(&flags);

    tick(&mut sched, Cadence::Mppt);
    assert_eq!(sched.core().tracker(PvInput::Pv1).state(), TrackerState::Primed);
    assert_eq!(sched.core().battery().source(), ChargeSource::Pv1);
    assert_eq!(sched.core().battery().phase(), ChargePhase::ConstantCurrent);
    assert_eq!(duty(&sched, OutputId::Mppt1), 25.0);
    assert_eq!(duty(&sched, OutputId::Mppt2), 0.0);

    // Voltage and power both rose: reverse.
    sensors(&mut sched).set(SensorChannel::Pv1Voltage, 18.5);
    tick(&mut sched, Cadence::Mppt);
    assert_close(duty(&sched, OutputId::Mppt1), 24.9);
    assert_eq!(duty(&sched, OutputId::Mppt2), 0.0);
}

#[test]
fn pv2_charging_drives_second_converter() {
    let flags = ActivationFlags::new();
    let mut sched = started(&flags);
    sensors(&mut sched).charging((5.0, 0.0), (18.0, 1.0), (7.5, 1.0));

    tick(&mut sched, Cadence::Mppt);
    sensors(&mut sched).set(SensorChannel::Pv2Voltage, 17.0);
    tick(&mut sched, Cadence::Mppt);

    // Voltage fell and power fell: reverse by the coarse step.
    assert_eq!(sched.core().battery().source(), ChargeSource::Pv2);
    assert_eq!(duty(&sched, OutputId::Mppt1), 0.0);
    assert_close(duty(&sched, OutputId::Mppt2), 22.5);
}

#[test]
fn overcurrent_forces_correction_even_while_priming() {
    let flags = ActivationFlags::new();
    let mut sched = started(&flags);
    sensors(&mut sched).set(SensorChannel::BatteryCurrent, 3.5);

    tick(&mut sched, Cadence::Mppt);
    assert_close(duty(&sched, OutputId::Mppt1), 24.5);
}

#[test]
fn full_pack_shuts_both_converters() {
    let flags = ActivationFlags::new();
    let mut sched = started(&flags);
    sensors(&mut sched).charging((18.0, 1.0), (12.0, 1.0), (8.0, 0.1));

    tick(&mut sched, Cadence::Mppt);
    assert_eq!(sched.core().battery().phase(), ChargePhase::Full);
    assert_eq!(duty(&sched, OutputId::Mppt1), 0.0);
    assert_eq!(duty(&sched, OutputId::Mppt2), 0.0);
}

#[test]
fn no_pv_shuts_both_converters() {
    let flags = ActivationFlags::new();
    let mut sched = started(&flags);
    sensors(&mut sched).charging((5.0, 0.0), (5.0, 0.0), (7.5, -0.5));

    tick(&mut sched, Cadence::Mppt);
    assert_eq!(sched.core().battery().source(), ChargeSource::NotCharging);
    assert_eq!(duty(&sched, OutputId::Mppt1), 0.0);
    assert_eq!(duty(&sched, OutputId::Mppt2), 0.0);
}

#[test]
fn conversion_timeout_skips_mppt_and_clears_flag() {
    let flags = ActivationFlags::new();
    let mut sched = started(&flags);
    sensors(&mut sched).converts = false;

    assert_eq!(
        tick(&mut sched, Cadence::Mppt),
        Activity::Ran {
            pid: PassOutcome::NotDue,
            mppt: PassOutcome::Skipped(Fault::ConversionTimeout(ChannelSet::MPPT_PASS)),
        }
    );
    assert!(flags.pending().is_empty());
    assert_eq!(sched.core().tracker(PvInput::Pv1).state(), TrackerState::Unprimed);
    assert_eq!(duty(&sched, OutputId::Mppt1), 25.0);

    // Next tick retries normally.
    sensors(&mut sched).converts = true;
    assert_eq!(
        tick(&mut sched, Cadence::Mppt),
        Activity::Ran {
            pid: PassOutcome::NotDue,
            mppt: PassOutcome::Completed,
        }
    );
}

#[test]
fn sensor_failure_skips_pid_without_advancing_state() {
    let flags = ActivationFlags::new();
    let mut sched = started(&flags);
    sensors(&mut sched).failing = Some(SensorChannel::Buck5v0Voltage);

    assert_eq!(
        tick(&mut sched, Cadence::Pid),
        Activity::Ran {
            pid: PassOutcome::Skipped(Fault::SensorRead(SensorChannel::Buck5v0Voltage)),
            mppt: PassOutcome::NotDue,
        }
    );
    assert!(flags.pending().is_empty());
    assert_eq!(sched.core().buck_5v0().integral(), 0.0);
    assert_eq!(sched.core().buck_3v3().integral(), 0.0);
    assert_eq!(duty(&sched, OutputId::Buck5v0), 25.0);
}

#[test]
fn polling_keeps_watchdog_fed() {
    let flags = ActivationFlags::new();
    let mut sched = started(&flags);

    for _ in 0..20 {
        sched.hardware_mut().watchdog.elapse(10_000).unwrap();
        tick(&mut sched, Cadence::Pid);
    }
    assert!(sched.hardware().watchdog.reset_requested().is_none());

    // A stalled loop misses the window.
    assert_eq!(
        sched.hardware_mut().watchdog.elapse(14_000),
        Err(ResetRequest { starved_for_us: 14_000 })
    );
    sched.poll();
    assert!(sched.hardware().watchdog.reset_requested().is_some());
}

#[test]
fn failed_converter_write_still_shuts_the_other_down() {
    let flags = ActivationFlags::new();
    let mut sched = started(&flags);
    sensors(&mut sched).charging((18.0, 1.0), (12.0, 1.0), (8.0, 0.1));
    sched.hardware_mut().outputs.failing = Some(OutputId::Mppt1);

    assert_eq!(
        tick(&mut sched, Cadence::Mppt),
        Activity::Ran {
            pid: PassOutcome::NotDue,
            mppt: PassOutcome::Skipped(Fault::Actuation(OutputId::Mppt1)),
        }
    );
    assert_eq!(sched.core().battery().phase(), ChargePhase::Full);
    assert_eq!(duty(&sched, OutputId::Mppt2), 0.0);
    assert!(flags.pending().is_empty());
}

#[test]
fn failed_inactive_write_keeps_active_converter_tracking() {
    let flags = ActivationFlags::new();
    let mut sched = started(&flags);
    sensors(&mut sched).charging((5.0, 0.0), (18.0, 1.0), (7.5, 3.5));
    sched.hardware_mut().outputs.failing = Some(OutputId::Mppt1);

    let activity = tick(&mut sched, Cadence::Mppt);
    assert_eq!(
        activity,
        Activity::Ran {
            pid: PassOutcome::NotDue,
            mppt: PassOutcome::Skipped(Fault::Actuation(OutputId::Mppt1)),
        }
    );
    // Overcurrent correction on PV2 is still applied, capped at delta_max.
    assert_close(duty(&sched, OutputId::Mppt2), 20.0);
}

#[test]
fn failed_buck_write_still_drives_the_other_buck() {
    let flags = ActivationFlags::new();
    let mut sched = started(&flags);
    sensors(&mut sched).set(SensorChannel::Buck3v3Voltage, 3.0);
    sched.hardware_mut().outputs.failing = Some(OutputId::Buck5v0);

    assert_eq!(
        tick(&mut sched, Cadence::Pid),
        Activity::Ran {
            pid: PassOutcome::Skipped(Fault::Actuation(OutputId::Buck5v0)),
            mppt: PassOutcome::NotDue,
        }
    );
    assert_eq!(duty(&sched, OutputId::Buck5v0), 25.0);
    assert_close(duty(&sched, OutputId::Buck3v3), 0.96 + 6.3 + 0.069);
}
