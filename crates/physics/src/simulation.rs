use std::f64::consts::FRAC_PI_4;

use serde::{Deserialize, Serialize};
use splitcube_protocol::SimulationState;

/// Integrator constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Radians per second.
    pub angular_speed: f64,
    /// Step used when a request carries no usable elapsed time.
    pub default_step: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            angular_speed: FRAC_PI_4,
            default_step: 1.0 / 60.0,
        }
    }
}

/// The authoritative simulation state.
///
/// One scalar, advanced once per `step`. The angle is unbounded; trigonometry
/// downstream takes care of periodicity.
#[derive(Debug, Clone, Default)]
pub struct Simulation {
    state: SimulationState,
    config: SimulationConfig,
    steps: u64,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn state(&self) -> SimulationState {
        self.state
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Number of integration steps taken so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Elapsed time actually integrated for a request.
    ///
    /// Absent, negative and non-finite inputs fall back to the default step.
    /// Zero is honoured as "no time passed" rather than treated as missing, so
    /// a zero-length tick leaves the angle unchanged. Large values pass through.
    pub fn effective_step(&self, elapsed: Option<f64>) -> f64 {
        match elapsed {
            Some(dt) if dt.is_finite() && dt >= 0.0 => dt,
            _ => self.config.default_step,
        }
    }

    /// Advance by `elapsed` seconds and return a copy of the new state.
    pub fn step(&mut self, elapsed: Option<f64>) -> SimulationState {
        let dt = self.effective_step(elapsed);
        self.state.rotation_angle += self.config.angular_speed * dt;
        self.steps += 1;
        tracing::trace!(dt, angle = self.state.rotation_angle, "simulation stepped");
        self.state
    }
}
