use serde::{Deserialize, Serialize};

use crate::InputError;

/// The simulation's only state variable, sent by value after every step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationState {
    /// Accumulated rotation in radians. Never reduced modulo 2π.
    pub rotation_angle: f64,
}

/// What the graphics pipeline needs to draw one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneData {
    pub cube_rotation_y: f64,
}

impl SceneData {
    pub fn new(cube_rotation_y: f64) -> Self {
        Self { cube_rotation_y }
    }

    pub fn validate(&self) -> Result<(), InputError> {
        if !self.cube_rotation_y.is_finite() {
            return Err(InputError::InvalidField {
                field: "cubeRotationY",
                reason: format!("{} is not a finite angle", self.cube_rotation_y),
            });
        }
        Ok(())
    }
}

impl From<SimulationState> for SceneData {
    fn from(state: SimulationState) -> Self {
        Self {
            cube_rotation_y: state.rotation_angle,
        }
    }
}
