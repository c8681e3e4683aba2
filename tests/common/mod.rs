#![allow(dead_code)]

use solar_mppt_rs::calibration::ChannelSet;
use solar_mppt_rs::data_types::{Cadence, OutputId, SensorChannel};
use solar_mppt_rs::hal::{CadenceTimers, DutyCycles, Sensors};

/// Sensor bank with directly settable engineering values.
#[derive(Debug)]
pub struct FakeSensors {
    pub values: [f32; SensorChannel::COUNT],
    pub failing: Option<SensorChannel>,
    pub converts: bool,
    pub triggered: Vec<ChannelSet>,
}

impl FakeSensors {
    pub fn new() -> Self {
        Self {
            values: [0.0; SensorChannel::COUNT],
            failing: None,
            converts: true,
            triggered: Vec::new(),
        }
    }

    pub fn set(&mut self, channel: SensorChannel, value: f32) -> &mut Self {
        self.values[channel.index()] = value;
        self
    }

    /// PV1, PV2 and battery readings in one go.
    pub fn charging(&mut self, pv1: (f32, f32), pv2: (f32, f32), battery: (f32, f32)) -> &mut Self {
        self.set(SensorChannel::Pv1Voltage, pv1.0)
            .set(SensorChannel::Pv1Current, pv1.1)
            .set(SensorChannel::Pv2Voltage, pv2.0)
            .set(SensorChannel::Pv2Current, pv2.1)
            .set(SensorChannel::BatteryVoltage, battery.0)
            .set(SensorChannel::BatteryCurrent, battery.1)
    }
}

impl Sensors for FakeSensors {
    type Error = ();

    fn read_sensor(&mut self, channel: SensorChannel) -> Result<f32, Self::Error> {
        if self.failing == Some(channel) {
            return Err(());
        }
        Ok(self.values[channel.index()])
    }

    fn trigger_conversion(&mut self, group: ChannelSet) {
        self.triggered.push(group);
    }

    fn conversion_ready(&mut self, _group: ChannelSet) -> bool {
        self.converts
    }
}

/// PWM bank that records every write. Writes to `failing` are rejected and not recorded.
#[derive(Debug, Default)]
pub struct FakeOutputs {
    pub duty: [f32; OutputId::COUNT],
    pub writes: Vec<(OutputId, f32)>,
    pub failing: Option<OutputId>,
}

impl FakeOutputs {
    pub fn get(&self, output: OutputId) -> f32 {
        self.duty[output.index()]
    }
}

impl DutyCycles for FakeOutputs {
    type Error = ();

    fn set_duty_cycle(&mut self, output: OutputId, percent: f32) -> Result<(), Self::Error> {
        if self.failing == Some(output) {
            return Err(());
        }
        self.duty[output.index()] = percent;
        self.writes.push((output, percent));
        Ok(())
    }

    fn duty_cycle(&self, output: OutputId) -> f32 {
        self.duty[output.index()]
    }
}

#[derive(Debug, Default)]
pub struct FakeTimers {
    pub registered: Vec<(Cadence, u32)>,
}

impl CadenceTimers for FakeTimers {
    fn on_timer(&mut self, cadence: Cadence, period_us: u32) {
        self.registered.push((cadence, period_us));
    }
}

pub fn assert_close(actual: f32, expected: f32) {
    assert!(
        (actual - expected).abs() < 1e-4,
        "expected {expected}, got {actual}"
    );
}
