//! Perturb-and-observe maximum power point tracker.

use crate::config::TrackerConfig;
use crate::data_types::{OutputId, PvInput};

/// Sampling history of a tracker.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TrackerState {
    /// No sample taken since construction.
    Unprimed,
    /// One sample taken. Its deltas are measured against zero and carry no
    /// information about the power curve.
    Primed,
    /// At least two samples taken; deltas are meaningful.
    Tracking,
}

/// Tracker bound to one PV input and its charger converter.
///
/// Units: volts, amps, watts; step sizes in duty-cycle percent.
#[derive(Clone, Debug, PartialEq)]
pub struct MpptTracker {
    input: PvInput,
    state: TrackerState,
    v: f32,
    i: f32,
    v_prev: f32,
    i_prev: f32,
    power: f32,
    power_prev: f32,
    delta_v: f32,
    delta_i: f32,
    delta_p: f32,
    delta_d: f32,
    delta_max: f32,
}

impl MpptTracker {
    pub fn new(input: PvInput, delta_d: f32, delta_max: f32) -> Self {
        Self {
            input,
            state: TrackerState::Unprimed,
            v: 0.0,
            i: 0.0,
            v_prev: 0.0,
            i_prev: 0.0,
            power: 0.0,
            power_prev: 0.0,
            delta_v: 0.0,
            delta_i: 0.0,
            delta_p: 0.0,
            delta_d,
            delta_max,
        }
    }

    pub fn from_config(input: PvInput, config: &TrackerConfig) -> Self {
        Self::new(input, config.delta_d, config.delta_max)
    }

    /// Record a new voltage/current sample and compute the deltas against the
    /// previous one. Call exactly once per MPPT tick, before [`compute_step`].
    ///
    /// [`compute_step`]: Self::compute_step
    pub fn update_samples(&mut self, v: f32, i: f32) {
        self.v = v;
        self.i = i;
        self.power = v * i;

        self.delta_v = self.v - self.v_prev;
        self.delta_i = self.i - self.i_prev;
        self.delta_p = self.power - self.power_prev;

        self.v_prev = self.v;
        self.i_prev = self.i;
        self.power_prev = self.power;

        self.state = match self.state {
            TrackerState::Unprimed => TrackerState::Primed,
            TrackerState::Primed | TrackerState::Tracking => TrackerState::Tracking,
        };
    }

    /// Perturb-and-observe decision: reverse when power and voltage moved in
    /// the same direction, otherwise keep going.
    pub fn compute_step(&self) -> f32 {
        if self.delta_p * self.delta_v > 0.0 {
            -self.delta_d
        } else {
            self.delta_d
        }
    }

    /// Step for this tick, or `None` while the last sample was the priming one.
    pub fn step(&self) -> Option<f32> {
        match self.state {
            TrackerState::Tracking => Some(self.compute_step()),
            TrackerState::Unprimed | TrackerState::Primed => None,
        }
    }

    /// Magnitude of a CC/CV down-correction: `delta_d * gain`, bounded by `delta_max`.
    pub fn correction_limit(&self, gain: f32) -> f32 {
        (self.delta_d * gain).min(self.delta_max)
    }

    pub fn input(&self) -> PvInput {
        self.input
    }

    pub fn output(&self) -> OutputId {
        self.input.output()
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn voltage(&self) -> f32 {
        self.v
    }

    pub fn current(&self) -> f32 {
        self.i
    }

    pub fn power(&self) -> f32 {
        self.power
    }

    pub fn power_prev(&self) -> f32 {
        self.power_prev
    }

    pub fn delta_v(&self) -> f32 {
        self.delta_v
    }

    pub fn delta_i(&self) -> f32 {
        self.delta_i
    }

    pub fn delta_p(&self) -> f32 {
        self.delta_p
    }

    pub fn delta_d(&self) -> f32 {
        self.delta_d
    }

    pub fn delta_max(&self) -> f32 {
        self.delta_max
    }
}
