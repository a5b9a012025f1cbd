//! Message transport: typed payloads and the worker plumbing that carries them.
//!
//! # Invariants
//! - Workers share no mutable memory; every payload is moved or copied by value.
//! - Delivery is ordered per sender/receiver pair.
//! - A terminated worker handles no further messages; queued ones are dropped.

pub mod diagnostics;
mod error;
mod payload;
pub mod wire;
pub mod worker;

pub use diagnostics::{Diagnostic, DiagnosticsSink, Level, MemorySink, TracingSink};
pub use error::{InputError, TransportError};
pub use payload::{SceneData, SimulationState};
pub use wire::Envelope;
pub use worker::{Port, Worker, WorkerHandle, spawn_worker};
