//! Cooperative control scheduler.
//!
//! Timer interrupts raise [`ActivationFlags`]; the main loop calls
//! [`Scheduler::poll`], which services the watchdog, runs the PID pass and then
//! the MPPT pass for whichever cadences are due, and clears each flag only after
//! its pass has run. A blocking API is provided; an async mirror of `poll`
//! lives behind the `async` feature.

use portable_atomic::{AtomicU8, AtomicU32, Ordering};

use crate::calibration::{ChannelSet, DueFlags};
use crate::config::CoreConfig;
use crate::control::{ControlCore, MpptSample};
use crate::data_types::{Cadence, DutyCommand, OutputId, PvInput, SensorChannel};
use crate::error::{Error, Fault};
use crate::hal::{CadenceTimers, DutyCycles, Indicators, Sensors, Watchdog};

/// Activation flags shared between timer interrupts and the main loop.
///
/// Interrupts may only [`raise`](Self::raise). Clearing is reserved to the
/// scheduler, after the corresponding pass has executed. Raising an already
/// pending flag is idempotent and counted as coalesced.
pub struct ActivationFlags {
    due: AtomicU8,
    raised: [AtomicU32; Cadence::COUNT],
    coalesced: [AtomicU32; Cadence::COUNT],
}

impl ActivationFlags {
    pub const fn new() -> Self {
        Self {
            due: AtomicU8::new(0),
            raised: [AtomicU32::new(0), AtomicU32::new(0)],
            coalesced: [AtomicU32::new(0), AtomicU32::new(0)],
        }
    }

    /// Mark a cadence as due. Call from the timer interrupt.
    pub fn raise(&self, cadence: Cadence) {
        let bit = cadence.flag().bits();
        let prior = self.due.fetch_or(bit, Ordering::Release);
        self.raised[cadence.index()].fetch_add(1, Ordering::Relaxed);
        if prior & bit != 0 {
            self.coalesced[cadence.index()].fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn pending(&self) -> DueFlags {
        DueFlags::from_bits_truncate(self.due.load(Ordering::Acquire))
    }

    pub fn is_due(&self, cadence: Cadence) -> bool {
        self.pending().contains(cadence.flag())
    }

    pub(crate) fn clear(&self, cadence: Cadence) {
        self.due.fetch_and(!cadence.flag().bits(), Ordering::AcqRel);
    }

    /// Interrupts raised for `cadence` since start-up.
    pub fn raised(&self, cadence: Cadence) -> u32 {
        self.raised[cadence.index()].load(Ordering::Relaxed)
    }

    /// Raises that landed while the flag was still pending.
    pub fn coalesced(&self, cadence: Cadence) -> u32 {
        self.coalesced[cadence.index()].load(Ordering::Relaxed)
    }
}

impl Default for ActivationFlags {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of one control pass within a poll.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PassOutcome {
    NotDue,
    Completed,
    /// Pass abandoned; its flag is still cleared and the next tick retries.
    Skipped(Fault),
}

/// What a call to [`Scheduler::poll`] did.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Activity {
    /// Nothing was due; the caller may enter low-power wait.
    Idle,
    Ran { pid: PassOutcome, mppt: PassOutcome },
}

/// Board collaborators driven by the scheduler.
pub struct Hardware<S, P, W, D> {
    pub sensors: S,
    pub outputs: P,
    pub watchdog: W,
    /// Paces the conversion-ready spin-wait.
    pub delay: D,
}

pub struct Scheduler<'a, S, P, W, D, I = ()> {
    flags: &'a ActivationFlags,
    config: CoreConfig,
    core: ControlCore,
    hw: Hardware<S, P, W, D>,
    indicators: I,
}

impl<'a, S, P, W, D> Scheduler<'a, S, P, W, D, ()> {
    /// Build a scheduler after validating `config`.
    pub fn new(flags: &'a ActivationFlags, config: CoreConfig, hw: Hardware<S, P, W, D>) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            flags,
            core: ControlCore::new(&config),
            config,
            hw,
            indicators: (),
        })
    }
}

impl<'a, S, P, W, D, I> Scheduler<'a, S, P, W, D, I> {
    /// Attach status indicators.
    pub fn with_indicators<J: Indicators>(self, indicators: J) -> Scheduler<'a, S, P, W, D, J> {
        Scheduler {
            flags: self.flags,
            config: self.config,
            core: self.core,
            hw: self.hw,
            indicators,
        }
    }

    pub fn flags(&self) -> &'a ActivationFlags {
        self.flags
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn core(&self) -> &ControlCore {
        &self.core
    }

    pub fn hardware(&self) -> &Hardware<S, P, W, D> {
        &self.hw
    }

    pub fn hardware_mut(&mut self) -> &mut Hardware<S, P, W, D> {
        &mut self.hw
    }

    /// Tear down, returning the collaborators.
    pub fn free(self) -> (Hardware<S, P, W, D>, I) {
        (self.hw, self.indicators)
    }
}

impl<S, P, W, D, I> Scheduler<'_, S, P, W, D, I>
where
    S: Sensors,
    P: DutyCycles,
    W: Watchdog,
    I: Indicators,
{
    fn read(&mut self, channel: SensorChannel) -> Result<f32, Fault> {
        self.hw.sensors.read_sensor(channel).map_err(|_e| {
            warn!("read of {} failed", channel);
            Fault::SensorRead(channel)
        })
    }

    /// Clamp and write an absolute duty cycle.
    fn actuate(&mut self, output: OutputId, percent: f32) -> Result<(), Fault> {
        let percent = self.config.duty.clamp(percent);
        self.hw
            .outputs
            .set_duty_cycle(output, percent)
            .map_err(|_e| Fault::Actuation(output))
    }

    fn apply(&mut self, output: OutputId, command: DutyCommand) -> Result<(), Fault> {
        let current = self.hw.outputs.duty_cycle(output);
        self.actuate(output, command.apply(current))
    }

    fn service_watchdog(&mut self) {
        if self.config.watchdog_enabled {
            self.hw.watchdog.service();
        }
    }

    fn seed_battery(&mut self) -> Result<(), Fault> {
        let voltage = self.read(SensorChannel::BatteryVoltage)?;
        let current = self.read(SensorChannel::BatteryCurrent)?;
        self.core.init_battery(voltage, current);
        debug!("battery seeded at {} V, {} A", voltage, current);
        Ok(())
    }

    fn finish_start(&mut self, timers: &mut impl CadenceTimers) -> Result<(), Fault> {
        self.seed_battery()?;
        for output in OutputId::ALL {
            self.actuate(output, self.config.initial_duty)?;
        }
        if self.config.watchdog_enabled {
            self.hw.watchdog.arm(self.config.cadence.watchdog_window_us());
        }
        timers.on_timer(Cadence::Pid, self.config.cadence.pid_period_us);
        timers.on_timer(Cadence::Mppt, self.config.cadence.mppt_period_us);
        info!(
            "control loops started: pid every {=u32} us, mppt every {=u32} us",
            self.config.cadence.pid_period_us,
            self.config.cadence.mppt_period_us
        );
        Ok(())
    }

    fn pid_pass(&mut self) -> Result<(), Fault> {
        // Both readings are taken before either controller advances.
        let buck_5v0 = self.read(SensorChannel::Buck5v0Voltage)?;
        let buck_3v3 = self.read(SensorChannel::Buck3v3Voltage)?;
        let targets = self.core.pid_pass(buck_5v0, buck_3v3);
        trace!("pid targets {} / {}", targets.buck_5v0, targets.buck_3v3);
        // Every output is written even if an earlier write failed; the first fault is reported.
        let written_5v0 = self.actuate(OutputId::Buck5v0, targets.buck_5v0);
        let written_3v3 = self.actuate(OutputId::Buck3v3, targets.buck_3v3);
        written_5v0.and(written_3v3)
    }

    fn read_input(&mut self, input: PvInput) -> Result<(f32, f32), Fault> {
        let voltage = self.read(input.voltage_channel())?;
        let current = self.read(input.current_channel())?;
        Ok((voltage, current))
    }

    fn capture_mppt_sample(&mut self) -> Result<MpptSample, Fault> {
        let (pv1_voltage, pv1_current) = self.read_input(PvInput::Pv1)?;
        let (pv2_voltage, pv2_current) = self.read_input(PvInput::Pv2)?;
        Ok(MpptSample {
            pv1_voltage,
            pv1_current,
            pv2_voltage,
            pv2_current,
            battery_voltage: self.read(SensorChannel::BatteryVoltage)?,
            battery_current: self.read(SensorChannel::BatteryCurrent)?,
        })
    }

    /// MPPT pass body, run once the pass's conversions are complete.
    fn mppt_pass(&mut self) -> Result<(), Fault> {
        let sample = self.capture_mppt_sample()?;
        let commands = self.core.mppt_pass(&sample);

        let battery = self.core.battery();
        if battery.is_depleted() {
            warn!("battery below minimum: {} V", battery.voltage());
        }
        trace!("battery {} phase {}", battery.source(), battery.phase());

        // Both converters are commanded before an actuation fault is reported.
        let mppt_1 = self.apply(OutputId::Mppt1, commands.for_input(PvInput::Pv1));
        let mppt_2 = self.apply(OutputId::Mppt2, commands.for_input(PvInput::Pv2));
        mppt_1.and(mppt_2)?;

        if let Some(input) = commands.active {
            if let DutyCommand::Step(delta) = commands.for_input(input) {
                if delta != 0.0 {
                    self.indicators.tracking_direction(input, delta > 0.0);
                }
            }
        }
        self.indicators.heartbeat();
        Ok(())
    }

    fn run_pid_pass(&mut self) -> PassOutcome {
        let outcome = outcome(Cadence::Pid, self.pid_pass());
        self.flags.clear(Cadence::Pid);
        outcome
    }
}

fn outcome(cadence: Cadence, result: Result<(), Fault>) -> PassOutcome {
    match result {
        Ok(()) => PassOutcome::Completed,
        Err(fault) => {
            warn!("{} pass skipped: {}", cadence, fault);
            PassOutcome::Skipped(fault)
        }
    }
}

impl<S, P, W, D, I> Scheduler<'_, S, P, W, D, I>
where
    S: Sensors,
    P: DutyCycles,
    W: Watchdog,
    D: embedded_hal::delay::DelayNs,
    I: Indicators,
{
    /// Seed the battery from an initial reading, apply the initial duty cycle,
    /// arm the watchdog and start both cadence timers.
    pub fn start(&mut self, timers: &mut impl CadenceTimers) -> Result<(), Fault> {
        self.hw.sensors.trigger_conversion(ChannelSet::BATTERY);
        self.wait_for_conversion(ChannelSet::BATTERY)?;
        self.finish_start(timers)
    }

    /// One main-loop iteration.
    pub fn poll(&mut self) -> Activity {
        self.service_watchdog();
        if self.flags.pending().is_empty() {
            return Activity::Idle;
        }

        let pid = if self.flags.is_due(Cadence::Pid) {
            self.run_pid_pass()
        } else {
            PassOutcome::NotDue
        };
        let mppt = if self.flags.is_due(Cadence::Mppt) {
            self.run_mppt_pass()
        } else {
            PassOutcome::NotDue
        };
        Activity::Ran { pid, mppt }
    }

    /// Run forever, calling `idle` whenever nothing is due. Only a reset ends this.
    pub fn run(&mut self, mut idle: impl FnMut()) -> ! {
        loop {
            if let Activity::Idle = self.poll() {
                idle();
            }
        }
    }

    /// Spin until every channel in `group` has converted, within the poll budget.
    fn wait_for_conversion(&mut self, group: ChannelSet) -> Result<(), Fault> {
        for _ in 0..self.config.conversion_poll_limit {
            if self.hw.sensors.conversion_ready(group) {
                return Ok(());
            }
            self.hw.delay.delay_us(self.config.conversion_poll_interval_us);
        }
        if self.hw.sensors.conversion_ready(group) {
            Ok(())
        } else {
            Err(Fault::ConversionTimeout(group))
        }
    }

    fn run_mppt_pass(&mut self) -> PassOutcome {
        self.hw.sensors.trigger_conversion(ChannelSet::MPPT_PASS);
        let result = self
            .wait_for_conversion(ChannelSet::MPPT_PASS)
            .and_then(|()| self.mppt_pass());
        let outcome = outcome(Cadence::Mppt, result);
        self.flags.clear(Cadence::Mppt);
        outcome
    }
}

#[cfg(feature = "async")]
impl<S, P, W, D, I> Scheduler<'_, S, P, W, D, I>
where
    S: Sensors,
    P: DutyCycles,
    W: Watchdog,
    D: embedded_hal_async::delay::DelayNs,
    I: Indicators,
{
    /// Async version of [`start`](Self::start).
    pub async fn start_async(&mut self, timers: &mut impl CadenceTimers) -> Result<(), Fault> {
        self.hw.sensors.trigger_conversion(ChannelSet::BATTERY);
        self.wait_for_conversion_async(ChannelSet::BATTERY).await?;
        self.finish_start(timers)
    }

    /// Async version of [`poll`](Self::poll); the conversion wait yields to the executor.
    pub async fn poll_async(&mut self) -> Activity {
        self.service_watchdog();
        if self.flags.pending().is_empty() {
            return Activity::Idle;
        }

        let pid = if self.flags.is_due(Cadence::Pid) {
            self.run_pid_pass()
        } else {
            PassOutcome::NotDue
        };
        let mppt = if self.flags.is_due(Cadence::Mppt) {
            self.run_mppt_pass_async().await
        } else {
            PassOutcome::NotDue
        };
        Activity::Ran { pid, mppt }
    }

    async fn wait_for_conversion_async(&mut self, group: ChannelSet) -> Result<(), Fault> {
        for _ in 0..self.config.conversion_poll_limit {
            if self.hw.sensors.conversion_ready(group) {
                return Ok(());
            }
            self.hw.delay.delay_us(self.config.conversion_poll_interval_us).await;
        }
        if self.hw.sensors.conversion_ready(group) {
            Ok(())
        } else {
            Err(Fault::ConversionTimeout(group))
        }
    }

    async fn run_mppt_pass_async(&mut self) -> PassOutcome {
        self.hw.sensors.trigger_conversion(ChannelSet::MPPT_PASS);
        let result = match self.wait_for_conversion_async(ChannelSet::MPPT_PASS).await {
            Ok(()) => self.mppt_pass(),
            Err(fault) => Err(fault),
        };
        let outcome = outcome(Cadence::Mppt, result);
        self.flags.clear(Cadence::Mppt);
        outcome
    }
}
