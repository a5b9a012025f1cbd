//! Coordinator: owns the tick loop, the surface hand-off and message relay.
//!
//! # Invariants
//! - One `updateState` per tick; the coordinator never blocks on a reply.
//! - Only the newest simulation state is forwarded; stale replies are dropped.
//! - The surface is handed off once per init cycle and never touched again.
//! - After shutdown every operation fails with [`CoordinatorError::ShutDown`].

mod clock;
pub mod config;
mod coordinator;

pub use clock::{FrameClock, run_fixed_rate};
pub use config::{AppConfig, ConfigError, CoordinatorConfig, WindowConfig};
pub use coordinator::{
    Coordinator, CoordinatorError, CoordinatorStats, DisplaySource, HandOff, HandOffMode,
    PumpReport, RendererStatus,
};
