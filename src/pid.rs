//! Discrete PID regulator for the output bucks.

use crate::config::{PidConfig, PidGains};

/// PID controller with a fixed iteration period.
///
/// The output is unbounded; callers clamp it into the duty-cycle range before
/// actuating.
#[derive(Clone, Debug, PartialEq)]
pub struct PidController {
    kp: f32,
    ki: f32,
    kd: f32,
    reference: f32,
    iteration_period: f32,
    error: f32,
    prior_error: f32,
    integral: f32,
    prior_integral: f32,
    derivative: f32,
}

impl PidController {
    /// Create a controller with zeroed running state.
    ///
    /// `iteration_period` is the time quantum used both to accumulate the
    /// integral and to scale the derivative, so it must be non-zero.
    pub fn new(gains: PidGains, reference: f32, iteration_period: f32) -> Self {
        Self {
            kp: gains.kp,
            ki: gains.ki,
            kd: gains.kd,
            reference,
            iteration_period,
            error: 0.0,
            prior_error: 0.0,
            integral: 0.0,
            prior_integral: 0.0,
            derivative: 0.0,
        }
    }

    pub fn from_config(config: &PidConfig) -> Self {
        Self::new(config.gains, config.setpoint, config.iteration_period)
    }

    /// Run one iteration against a measured value and return the control output.
    pub fn calculate(&mut self, actual_value: f32) -> f32 {
        self.error = self.reference - actual_value;

        self.integral = self.prior_integral + self.error * self.iteration_period;
        self.prior_integral = self.integral;

        // Uses the previous error; prior_error rolls forward only after this.
        self.derivative = (self.error - self.prior_error) / self.iteration_period;
        self.prior_error = self.error;

        self.kp * self.error + self.ki * self.integral + self.kd * self.derivative
    }

    pub fn reference(&self) -> f32 {
        self.reference
    }

    pub fn gains(&self) -> PidGains {
        PidGains {
            kp: self.kp,
            ki: self.ki,
            kd: self.kd,
        }
    }

    pub fn iteration_period(&self) -> f32 {
        self.iteration_period
    }

    pub fn error(&self) -> f32 {
        self.error
    }

    pub fn prior_error(&self) -> f32 {
        self.prior_error
    }

    pub fn integral(&self) -> f32 {
        self.integral
    }

    pub fn derivative(&self) -> f32 {
        self.derivative
    }
}
