use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use splitcube_physics::{PhysicsRequest, PhysicsResponse};
use splitcube_protocol::{DiagnosticsSink, Port};
use splitcube_render::{RenderRequest, RenderResponse, Surface};

use crate::coordinator::{Coordinator, CoordinatorError, CoordinatorStats};

/// Elapsed seconds between consecutive ticks, capped so a stalled loop
/// does not produce one enormous step.
#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    last: Option<Instant>,
    max_delta: f64,
}

impl FrameClock {
    pub fn new(max_delta: f64) -> Self {
        Self {
            last: None,
            max_delta,
        }
    }

    pub fn reset(&mut self, now: Instant) {
        self.last = Some(now);
    }

    /// Seconds since the previous call (or reset). The first call without a
    /// reset reports zero.
    pub fn tick(&mut self, now: Instant) -> f64 {
        let elapsed = self.last.map_or(0.0, |prev| {
            now.saturating_duration_since(prev).as_secs_f64()
        });
        self.last = Some(now);
        elapsed.min(self.max_delta)
    }
}

/// Drive a started coordinator at `rate_hz` until `ticks` have run (if given)
/// or `stop` is raised, then let outstanding work settle.
pub fn run_fixed_rate<S, P, R, D>(
    coordinator: &mut Coordinator<S, P, R, D>,
    ticks: Option<u64>,
    rate_hz: f64,
    stop: &AtomicBool,
) -> Result<CoordinatorStats, CoordinatorError>
where
    S: Surface,
    P: Port<Request = PhysicsRequest, Response = PhysicsResponse>,
    R: Port<Request = RenderRequest<S>, Response = RenderResponse>,
    D: DiagnosticsSink,
{
    let period = Duration::from_secs_f64(1.0 / rate_hz.max(f64::EPSILON));
    let mut next = Instant::now();
    let mut done = 0u64;
    tracing::info!(rate_hz, ?ticks, "fixed-rate loop started");

    while ticks.is_none_or(|limit| done < limit) && !stop.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now < next {
            std::thread::sleep(next - now);
        }
        coordinator.tick(Instant::now())?;
        coordinator.pump()?;
        done += 1;
        next += period;
    }

    if !coordinator.settle(Duration::from_secs(2))? {
        tracing::warn!("workers did not settle before the deadline");
    }
    Ok(coordinator.stats())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_tick_after_reset_measures_from_reset() {
        let t0 = Instant::now();
        let mut clock = FrameClock::new(1.0);
        clock.reset(t0);
        let dt = clock.tick(t0 + Duration::from_millis(500));
        assert!((dt - 0.5).abs() < 1e-9);
    }

    #[test]
    fn large_gaps_are_capped() {
        let t0 = Instant::now();
        let mut clock = FrameClock::new(1.0);
        clock.reset(t0);
        assert_eq!(clock.tick(t0 + Duration::from_secs(30)), 1.0);
    }

    #[test]
    fn unreset_clock_starts_at_zero_and_never_goes_negative() {
        let t0 = Instant::now();
        let mut clock = FrameClock::new(1.0);
        assert_eq!(clock.tick(t0 + Duration::from_secs(1)), 0.0);
        assert_eq!(clock.tick(t0), 0.0);
    }
}
