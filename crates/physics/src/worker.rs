//! The simulation as a worker: request decoding, handling and replies.

use serde_json::json;
use splitcube_protocol::{
    Envelope, InputError, SimulationState, TransportError, Worker, WorkerHandle, spawn_worker,
};

use crate::{Simulation, SimulationConfig};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PhysicsRequest {
    Init,
    /// `tick` is echoed back so the coordinator can order replies.
    UpdateState { tick: u64, elapsed: Option<f64> },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PhysicsResponse {
    Ready,
    StateUpdated { tick: u64, state: SimulationState },
}

impl PhysicsRequest {
    /// Decode `{"type": "init"}` or `{"type": "updateState", "payload": {"deltaTime": ..}}`.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, InputError> {
        match envelope.kind.as_str() {
            "init" => Ok(Self::Init),
            "updateState" => {
                let elapsed = envelope.optional_f64("deltaTime")?;
                let tick = match envelope.optional_f64("tick")? {
                    Some(t) if t >= 0.0 && t.fract() == 0.0 => t as u64,
                    Some(t) => {
                        return Err(InputError::InvalidField {
                            field: "tick",
                            reason: format!("{t} is not a frame number"),
                        });
                    }
                    None => 0,
                };
                Ok(Self::UpdateState { tick, elapsed })
            }
            _ => Err(envelope.unknown_kind()),
        }
    }

    pub fn to_envelope(&self) -> Envelope {
        match self {
            Self::Init => Envelope::new("init", json!({})),
            Self::UpdateState { tick, elapsed } => Envelope::new(
                "updateState",
                json!({ "tick": tick, "deltaTime": elapsed }),
            ),
        }
    }
}

impl PhysicsResponse {
    pub fn to_envelope(&self) -> Envelope {
        match self {
            Self::Ready => Envelope::new("status", json!({ "status": "Physics initialized" })),
            Self::StateUpdated { tick, state } => Envelope::new(
                "physicsUpdate",
                json!({ "tick": tick, "state": { "cubeRotationY": state.rotation_angle } }),
            ),
        }
    }
}

/// Worker wrapper around [`Simulation`].
#[derive(Debug, Default)]
pub struct PhysicsWorker {
    simulation: Simulation,
}

impl PhysicsWorker {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            simulation: Simulation::new(config),
        }
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }
}

impl Worker for PhysicsWorker {
    type Request = PhysicsRequest;
    type Response = PhysicsResponse;

    fn handle(&mut self, request: PhysicsRequest, replies: &mut Vec<PhysicsResponse>) {
        match request {
            PhysicsRequest::Init => {
                tracing::info!(
                    angular_speed = self.simulation.config().angular_speed,
                    "physics initialized"
                );
                replies.push(PhysicsResponse::Ready);
            }
            PhysicsRequest::UpdateState { tick, elapsed } => {
                let state = self.simulation.step(elapsed);
                tracing::trace!(tick, ?elapsed, angle = state.rotation_angle, "update handled");
                replies.push(PhysicsResponse::StateUpdated { tick, state });
            }
        }
    }
}

/// Start the simulation on its own thread.
pub fn spawn(
    config: SimulationConfig,
) -> Result<WorkerHandle<PhysicsRequest, PhysicsResponse>, TransportError> {
    spawn_worker("physics", PhysicsWorker::new(config))
}
