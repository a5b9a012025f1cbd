//! Simulation Process: owns the rotation angle and integrates it over time.
//!
//! # Invariants
//! - The angle only changes in response to an `updateState` request.
//! - The integrator never fails and never clamps; see [`Simulation::effective_step`].
//! - State leaves the worker as a copy, never by reference.

pub mod simulation;
pub mod worker;

pub use simulation::{Simulation, SimulationConfig};
pub use worker::{PhysicsRequest, PhysicsResponse, PhysicsWorker, spawn};
