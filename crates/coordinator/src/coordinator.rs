use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use splitcube_physics::{PhysicsRequest, PhysicsResponse};
use splitcube_protocol::{DiagnosticsSink, Port, SceneData, SimulationState, TransportError};
use splitcube_render::{RenderRequest, RenderResponse, Surface, SurfaceHandle};

use crate::clock::FrameClock;
use crate::config::CoordinatorConfig;

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("coordinator has been shut down")]
    ShutDown,
    #[error("coordinator has not been started")]
    NotStarted,
    #[error("coordinator is already running")]
    AlreadyStarted,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// What the platform offers for the display surface.
#[derive(Debug)]
pub enum DisplaySource<S> {
    /// Exclusive ownership can be moved to the pipeline.
    Transferable(S),
    /// Only a shared reference is available.
    SharedOnly(Arc<Mutex<S>>),
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HandOffMode {
    Transferred,
    Shared,
    Missing,
}

/// Outcome of a surface hand-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HandOff {
    pub mode: HandOffMode,
    /// Set when the pipeline runs on a shared handle.
    pub degraded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RendererStatus {
    /// Init posted, no verdict yet.
    Pending,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CoordinatorStats {
    pub ticks: u64,
    pub states_received: u64,
    pub frames_forwarded: u64,
    pub frames_rendered: u64,
    /// Newer state arrived, or the pipeline was busy or down.
    pub frames_skipped: u64,
    pub frames_rejected: u64,
    pub frame_errors: u64,
    /// Out-of-order states and frame replies from an earlier render cycle.
    pub stale_replies: u64,
    pub overloads: u64,
    pub last_angle: f64,
}

/// Replies handled by one [`Coordinator::pump`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpReport {
    pub physics_replies: usize,
    pub render_replies: usize,
    pub forwarded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Running,
    ShutDown,
}

/// Drives the simulation and relays its output to the pipeline.
///
/// Single-threaded and non-blocking: `tick` posts, `pump` drains whatever
/// replies have arrived. Workers sit behind [`Port`]s so tests can swap in
/// scripted transports.
pub struct Coordinator<S, P, R, D> {
    physics: P,
    render: R,
    sink: D,
    config: CoordinatorConfig,
    clock: FrameClock,
    lifecycle: Lifecycle,
    renderer: RendererStatus,
    handoff: Option<HandOff>,
    next_tick: u64,
    newest_state_tick: u64,
    physics_outstanding: u64,
    /// Frames posted since the latest `Init`, oldest first.
    render_in_flight: Vec<u64>,
    /// `Init` requests whose `Ready`/`Failed` has not arrived yet.
    inits_unanswered: u32,
    stats: CoordinatorStats,
    _surface: std::marker::PhantomData<fn(S)>,
}

impl<S, P, R, D> Coordinator<S, P, R, D>
where
    S: Surface,
    P: Port<Request = PhysicsRequest, Response = PhysicsResponse>,
    R: Port<Request = RenderRequest<S>, Response = RenderResponse>,
    D: DiagnosticsSink,
{
    pub fn new(physics: P, render: R, sink: D, config: CoordinatorConfig) -> Self {
        Self {
            physics,
            render,
            sink,
            clock: FrameClock::new(config.max_frame_delta),
            config,
            lifecycle: Lifecycle::Created,
            renderer: RendererStatus::Pending,
            handoff: None,
            next_tick: 0,
            newest_state_tick: 0,
            physics_outstanding: 0,
            render_in_flight: Vec::new(),
            inits_unanswered: 0,
            stats: CoordinatorStats::default(),
            _surface: std::marker::PhantomData,
        }
    }

    pub fn stats(&self) -> CoordinatorStats {
        self.stats
    }

    pub fn handoff(&self) -> Option<HandOff> {
        self.handoff
    }

    pub fn renderer_status(&self) -> RendererStatus {
        self.renderer
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle == Lifecycle::Running
    }

    pub fn sink(&self) -> &D {
        &self.sink
    }

    /// Requests in flight to either worker.
    pub fn outstanding(&self) -> (u64, usize) {
        (self.physics_outstanding, self.render_in_flight.len())
    }

    fn ensure_running(&self) -> Result<(), CoordinatorError> {
        match self.lifecycle {
            Lifecycle::Running => Ok(()),
            Lifecycle::Created => Err(CoordinatorError::NotStarted),
            Lifecycle::ShutDown => Err(CoordinatorError::ShutDown),
        }
    }

    /// Initialize the simulation and hand the surface to the pipeline.
    pub fn start(
        &mut self,
        source: DisplaySource<S>,
        now: Instant,
    ) -> Result<HandOff, CoordinatorError> {
        match self.lifecycle {
            Lifecycle::Created => {}
            Lifecycle::Running => return Err(CoordinatorError::AlreadyStarted),
            Lifecycle::ShutDown => return Err(CoordinatorError::ShutDown),
        }
        self.physics.post(PhysicsRequest::Init)?;
        let handoff = self.hand_off(source)?;
        self.lifecycle = Lifecycle::Running;
        self.clock.reset(now);
        tracing::info!(mode = ?handoff.mode, degraded = handoff.degraded, "coordinator started");
        Ok(handoff)
    }

    /// Start a fresh pipeline init cycle, for recovery after a failure.
    pub fn reinitialize_renderer(
        &mut self,
        source: DisplaySource<S>,
    ) -> Result<HandOff, CoordinatorError> {
        self.ensure_running()?;
        tracing::info!("reinitializing renderer");
        self.hand_off(source)
    }

    fn hand_off(&mut self, source: DisplaySource<S>) -> Result<HandOff, CoordinatorError> {
        let (surface, handoff) = match source {
            DisplaySource::Transferable(surface) => (
                Some(SurfaceHandle::Owned(surface)),
                HandOff {
                    mode: HandOffMode::Transferred,
                    degraded: false,
                },
            ),
            DisplaySource::SharedOnly(surface) => {
                self.sink.warning(
                    "coordinator",
                    "surface ownership transfer unsupported; rendering through a shared handle",
                );
                (
                    Some(SurfaceHandle::Shared(surface)),
                    HandOff {
                        mode: HandOffMode::Shared,
                        degraded: true,
                    },
                )
            }
            DisplaySource::Missing => {
                self.sink
                    .error("coordinator", "no display surface available");
                (
                    None,
                    HandOff {
                        mode: HandOffMode::Missing,
                        degraded: false,
                    },
                )
            }
        };
        self.render.post(RenderRequest::Init { surface })?;
        self.renderer = RendererStatus::Pending;
        self.inits_unanswered += 1;
        self.render_in_flight.clear();
        self.handoff = Some(handoff);
        Ok(handoff)
    }

    /// Measure elapsed time since the previous tick and post one update.
    pub fn tick(&mut self, now: Instant) -> Result<u64, CoordinatorError> {
        self.ensure_running()?;
        let elapsed = self.clock.tick(now);
        self.tick_with_elapsed(elapsed)
    }

    /// Post one update carrying `elapsed` seconds. Returns the tick number.
    pub fn tick_with_elapsed(&mut self, elapsed: f64) -> Result<u64, CoordinatorError> {
        self.ensure_running()?;
        self.next_tick += 1;
        let tick = self.next_tick;
        self.physics.post(PhysicsRequest::UpdateState {
            tick,
            elapsed: Some(elapsed),
        })?;
        self.physics_outstanding += 1;
        self.stats.ticks += 1;

        let limit = self.config.max_physics_in_flight as u64;
        if self.physics_outstanding > limit {
            self.stats.overloads += 1;
            tracing::warn!(
                outstanding = self.physics_outstanding,
                backlog = self.physics.backlog(),
                "physics backlog"
            );
            self.sink.warning(
                "coordinator",
                &format!(
                    "physics overloaded: {} updates outstanding (limit {limit})",
                    self.physics_outstanding
                ),
            );
        }
        Ok(tick)
    }

    /// Handle every reply that has arrived, forwarding the newest state.
    pub fn pump(&mut self) -> Result<PumpReport, CoordinatorError> {
        self.ensure_running()?;
        let mut report = PumpReport::default();

        while let Some(reply) = self.recv_render()? {
            report.render_replies += 1;
            self.on_render_reply(reply);
        }

        let mut newest: Option<(u64, SimulationState)> = None;
        while let Some(reply) = self.recv_physics()? {
            report.physics_replies += 1;
            match reply {
                PhysicsResponse::Ready => self.sink.status("physics", "Physics initialized"),
                PhysicsResponse::StateUpdated { tick, state } => {
                    self.physics_outstanding = self.physics_outstanding.saturating_sub(1);
                    self.stats.states_received += 1;
                    if tick <= self.newest_state_tick {
                        self.stats.stale_replies += 1;
                        tracing::debug!(
                            tick,
                            newest = self.newest_state_tick,
                            "stale state dropped"
                        );
                        continue;
                    }
                    if newest.is_some() {
                        self.stats.frames_skipped += 1;
                    }
                    self.newest_state_tick = tick;
                    newest = Some((tick, state));
                }
            }
        }

        if let Some((tick, state)) = newest {
            report.forwarded = self.forward(tick, state)?;
        }
        Ok(report)
    }

    fn forward(&mut self, tick: u64, state: SimulationState) -> Result<bool, CoordinatorError> {
        let busy = self.render_in_flight.len() >= self.config.max_render_in_flight;
        if self.renderer == RendererStatus::Failed || busy {
            self.stats.frames_skipped += 1;
            tracing::trace!(tick, busy, "frame skipped");
            return Ok(false);
        }
        self.render.post(RenderRequest::RenderScene {
            frame: tick,
            scene: SceneData::from(state),
        })?;
        self.render_in_flight.push(tick);
        self.stats.frames_forwarded += 1;
        self.stats.last_angle = state.rotation_angle;
        Ok(true)
    }

    fn recv_physics(&mut self) -> Result<Option<PhysicsResponse>, CoordinatorError> {
        self.physics
            .try_recv()
            .map_err(|e| self.transport_failure("physics", e))
    }

    fn recv_render(&mut self) -> Result<Option<RenderResponse>, CoordinatorError> {
        self.render
            .try_recv()
            .map_err(|e| self.transport_failure("render", e))
    }

    fn transport_failure(&self, worker: &str, error: TransportError) -> CoordinatorError {
        tracing::error!(worker, %error, "worker unreachable");
        self.sink.error(worker, &error.to_string());
        error.into()
    }

    /// Release the slot held by `frame`. False when the frame belongs to an
    /// earlier render cycle.
    fn complete_frame(&mut self, frame: u64) -> bool {
        match self.render_in_flight.iter().position(|&f| f == frame) {
            Some(index) => {
                self.render_in_flight.remove(index);
                true
            }
            None => {
                self.stats.stale_replies += 1;
                tracing::debug!(frame, "reply from an earlier render cycle ignored");
                false
            }
        }
    }

    /// Count down pending inits. Only the answer to the latest `Init` decides
    /// the renderer status.
    fn answers_latest_init(&mut self) -> bool {
        self.inits_unanswered = self.inits_unanswered.saturating_sub(1);
        self.inits_unanswered == 0
    }

    fn on_render_reply(&mut self, reply: RenderResponse) {
        match reply {
            RenderResponse::Status(status) => self.sink.status("render", &status),
            RenderResponse::Ready => {
                if self.answers_latest_init() {
                    self.renderer = RendererStatus::Ready;
                    self.sink.status("render", "pipeline ready");
                }
            }
            RenderResponse::Failed(error) => {
                let class = error.class();
                self.sink
                    .error("render", &format!("pipeline failed ({class:?}): {error}"));
                if self.answers_latest_init() {
                    self.renderer = RendererStatus::Failed;
                    self.render_in_flight.clear();
                }
            }
            RenderResponse::Rejected { frame, error } => {
                if self.complete_frame(frame) {
                    self.stats.frames_rejected += 1;
                    self.sink
                        .warning("render", &format!("frame {frame} rejected: {error}"));
                }
            }
            RenderResponse::FrameDone { frame } => {
                if self.complete_frame(frame) {
                    self.stats.frames_rendered += 1;
                }
            }
            RenderResponse::FrameError { frame, message } => {
                if self.complete_frame(frame) {
                    self.stats.frame_errors += 1;
                    self.sink
                        .error("render", &format!("frame {frame} failed: {message}"));
                }
            }
        }
    }

    /// Pump until nothing is outstanding or `timeout` passes. Returns whether
    /// everything settled.
    pub fn settle(&mut self, timeout: Duration) -> Result<bool, CoordinatorError> {
        let deadline = Instant::now() + timeout;
        loop {
            self.pump()?;
            let idle = self.physics_outstanding == 0
                && self.render_in_flight.is_empty()
                && self.renderer != RendererStatus::Pending;
            if idle {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Terminate both workers. Queued messages are dropped.
    pub fn shutdown(&mut self) -> Result<CoordinatorStats, CoordinatorError> {
        if self.lifecycle == Lifecycle::ShutDown {
            return Err(CoordinatorError::ShutDown);
        }
        self.physics.terminate();
        self.render.terminate();
        self.lifecycle = Lifecycle::ShutDown;
        tracing::info!(
            ticks = self.stats.ticks,
            rendered = self.stats.frames_rendered,
            "coordinator shut down"
        );
        Ok(self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use splitcube_protocol::{InputError, Level, MemorySink};
    use splitcube_render::{PipelineError, RecordingSurface, SurfaceSize};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    struct Script<Req, Resp> {
        sent: Vec<Req>,
        replies: VecDeque<Result<Resp, TransportError>>,
        terminated: bool,
        backlog: usize,
    }

    /// A port whose replies are queued by the test.
    struct FakePort<Req, Resp>(Rc<RefCell<Script<Req, Resp>>>);

    impl<Req, Resp> FakePort<Req, Resp> {
        fn new() -> (Self, Rc<RefCell<Script<Req, Resp>>>) {
            let script = Rc::new(RefCell::new(Script {
                sent: Vec::new(),
                replies: VecDeque::new(),
                terminated: false,
                backlog: 0,
            }));
            (Self(Rc::clone(&script)), script)
        }
    }

    impl<Req, Resp> Port for FakePort<Req, Resp> {
        type Request = Req;
        type Response = Resp;

        fn post(&self, request: Req) -> Result<(), TransportError> {
            let mut script = self.0.borrow_mut();
            if script.terminated {
                return Err(TransportError::Terminated("fake".into()));
            }
            script.sent.push(request);
            Ok(())
        }

        fn try_recv(&self) -> Result<Option<Resp>, TransportError> {
            self.0.borrow_mut().replies.pop_front().transpose()
        }

        fn backlog(&self) -> usize {
            self.0.borrow().backlog
        }

        fn terminate(&mut self) {
            self.0.borrow_mut().terminated = true;
        }
    }

    type PhysicsScript = Rc<RefCell<Script<PhysicsRequest, PhysicsResponse>>>;
    type RenderScript = Rc<RefCell<Script<RenderRequest<RecordingSurface>, RenderResponse>>>;
    type TestCoordinator = Coordinator<
        RecordingSurface,
        FakePort<PhysicsRequest, PhysicsResponse>,
        FakePort<RenderRequest<RecordingSurface>, RenderResponse>,
        Arc<MemorySink>,
    >;

    fn coordinator(
        config: CoordinatorConfig,
    ) -> (TestCoordinator, PhysicsScript, RenderScript, Arc<MemorySink>) {
        let (physics, physics_script) = FakePort::new();
        let (render, render_script) = FakePort::new();
        let sink = Arc::new(MemorySink::new());
        let coordinator = Coordinator::new(physics, render, Arc::clone(&sink), config);
        (coordinator, physics_script, render_script, sink)
    }

    fn surface() -> RecordingSurface {
        RecordingSurface::new(SurfaceSize::new(8, 8))
    }

    fn state(tick: u64, angle: f64) -> Result<PhysicsResponse, TransportError> {
        Ok(PhysicsResponse::StateUpdated {
            tick,
            state: SimulationState {
                rotation_angle: angle,
            },
        })
    }

    fn started() -> (TestCoordinator, PhysicsScript, RenderScript, Arc<MemorySink>) {
        let (mut c, p, r, sink) = coordinator(CoordinatorConfig::default());
        c.start(DisplaySource::Transferable(surface()), Instant::now())
            .unwrap();
        r.borrow_mut().replies.push_back(Ok(RenderResponse::Ready));
        c.pump().unwrap();
        (c, p, r, sink)
    }

    fn render_frames(script: &RenderScript) -> Vec<(u64, f64)> {
        script
            .borrow()
            .sent
            .iter()
            .filter_map(|r| match r {
                RenderRequest::RenderScene { frame, scene } => {
                    Some((*frame, scene.cube_rotation_y))
                }
                RenderRequest::Init { .. } => None,
            })
            .collect()
    }

    fn init_surfaces(script: &RenderScript) -> Vec<&'static str> {
        script
            .borrow()
            .sent
            .iter()
            .filter_map(|r| match r {
                RenderRequest::Init { surface } => Some(match surface {
                    Some(SurfaceHandle::Owned(_)) => "owned",
                    Some(SurfaceHandle::Shared(_)) => "shared",
                    None => "none",
                }),
                RenderRequest::RenderScene { .. } => None,
            })
            .collect()
    }

    #[test]
    fn start_transfers_the_surface() {
        let (mut c, p, r, _) = coordinator(CoordinatorConfig::default());
        let handoff = c
            .start(DisplaySource::Transferable(surface()), Instant::now())
            .unwrap();
        assert_eq!(handoff.mode, HandOffMode::Transferred);
        assert!(!handoff.degraded);
        assert_eq!(p.borrow().sent, vec![PhysicsRequest::Init]);
        assert_eq!(r.borrow().sent.len(), 1);
        assert_eq!(init_surfaces(&r), vec!["owned"]);
        assert_eq!(c.renderer_status(), RendererStatus::Pending);
    }

    #[test]
    fn shared_surface_is_degraded_and_flagged() {
        let (mut c, _, r, sink) = coordinator(CoordinatorConfig::default());
        let shared = Arc::new(Mutex::new(surface()));
        let handoff = c
            .start(DisplaySource::SharedOnly(shared), Instant::now())
            .unwrap();
        assert_eq!(handoff.mode, HandOffMode::Shared);
        assert!(handoff.degraded);
        assert!(sink.contains(Level::Warning, "shared handle"));
        assert_eq!(init_surfaces(&r), vec!["shared"]);
    }

    #[test]
    fn missing_surface_is_still_handed_to_the_pipeline() {
        let (mut c, _, r, sink) = coordinator(CoordinatorConfig::default());
        let handoff = c.start(DisplaySource::Missing, Instant::now()).unwrap();
        assert_eq!(handoff.mode, HandOffMode::Missing);
        assert!(sink.contains(Level::Error, "no display surface"));
        assert_eq!(r.borrow().sent.len(), 1);
        assert_eq!(init_surfaces(&r), vec!["none"]);
    }

    #[test]
    fn calls_before_start_fail() {
        let (mut c, _, _, _) = coordinator(CoordinatorConfig::default());
        assert!(matches!(
            c.tick_with_elapsed(0.1),
            Err(CoordinatorError::NotStarted)
        ));
        assert!(matches!(c.pump(), Err(CoordinatorError::NotStarted)));
    }

    #[test]
    fn start_twice_fails() {
        let (mut c, _, _, _) = started();
        assert!(matches!(
            c.start(DisplaySource::Missing, Instant::now()),
            Err(CoordinatorError::AlreadyStarted)
        ));
    }

    #[test]
    fn tick_posts_measured_elapsed_time() {
        let (mut c, p, _, _) = coordinator(CoordinatorConfig::default());
        let t0 = Instant::now();
        c.start(DisplaySource::Transferable(surface()), t0).unwrap();
        let tick = c.tick(t0 + Duration::from_millis(500)).unwrap();
        assert_eq!(tick, 1);
        match p.borrow().sent.last() {
            Some(PhysicsRequest::UpdateState {
                tick: 1,
                elapsed: Some(dt),
            }) => assert!((dt - 0.5).abs() < 1e-9),
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[test]
    fn state_reply_is_forwarded_as_scene() {
        let (mut c, p, r, sink) = started();
        c.tick_with_elapsed(0.5).unwrap();
        p.borrow_mut().replies.push_back(Ok(PhysicsResponse::Ready));
        p.borrow_mut().replies.push_back(state(1, 0.39));
        let report = c.pump().unwrap();
        assert!(report.forwarded);
        assert_eq!(render_frames(&r), vec![(1, 0.39)]);
        assert_eq!(c.outstanding(), (0, 1));
        assert!(sink.contains(Level::Status, "Physics initialized"));

        r.borrow_mut()
            .replies
            .push_back(Ok(RenderResponse::FrameDone { frame: 1 }));
        c.pump().unwrap();
        assert_eq!(c.stats().frames_rendered, 1);
        assert_eq!(c.stats().last_angle, 0.39);
    }

    #[test]
    fn out_of_order_replies_forward_only_the_newest() {
        let (mut c, p, r, _) = started();
        c.tick_with_elapsed(0.1).unwrap();
        c.tick_with_elapsed(0.1).unwrap();
        p.borrow_mut().replies.push_back(state(2, 0.2));
        p.borrow_mut().replies.push_back(state(1, 0.1));
        c.pump().unwrap();
        assert_eq!(render_frames(&r), vec![(2, 0.2)]);
        assert_eq!(c.stats().stale_replies, 1);
    }

    #[test]
    fn superseded_state_in_one_pump_is_skipped() {
        let (mut c, p, r, _) = started();
        c.tick_with_elapsed(0.1).unwrap();
        c.tick_with_elapsed(0.1).unwrap();
        p.borrow_mut().replies.push_back(state(1, 0.1));
        p.borrow_mut().replies.push_back(state(2, 0.2));
        c.pump().unwrap();
        assert_eq!(render_frames(&r), vec![(2, 0.2)]);
        assert_eq!(c.stats().frames_skipped, 1);
        assert_eq!(c.stats().stale_replies, 0);
    }

    #[test]
    fn busy_pipeline_skips_frames() {
        let (mut c, p, r, _) = started();
        for tick in 1..=3 {
            c.tick_with_elapsed(0.1).unwrap();
            p.borrow_mut().replies.push_back(state(tick, tick as f64));
            c.pump().unwrap();
        }
        assert_eq!(render_frames(&r), vec![(1, 1.0)]);
        assert_eq!(c.stats().frames_skipped, 2);

        r.borrow_mut()
            .replies
            .push_back(Ok(RenderResponse::FrameDone { frame: 1 }));
        c.tick_with_elapsed(0.1).unwrap();
        p.borrow_mut().replies.push_back(state(4, 4.0));
        c.pump().unwrap();
        assert_eq!(render_frames(&r), vec![(1, 1.0), (4, 4.0)]);
    }

    #[test]
    fn physics_backlog_is_reported_not_dropped() {
        let (mut c, p, _, sink) = coordinator(CoordinatorConfig {
            max_physics_in_flight: 2,
            ..Default::default()
        });
        c.start(DisplaySource::Transferable(surface()), Instant::now())
            .unwrap();
        for _ in 0..4 {
            c.tick_with_elapsed(0.1).unwrap();
        }
        assert_eq!(c.stats().overloads, 2);
        assert_eq!(sink.count(Level::Warning), 2);
        let updates = p
            .borrow()
            .sent
            .iter()
            .filter(|r| matches!(r, PhysicsRequest::UpdateState { .. }))
            .count();
        assert_eq!(updates, 4);
    }

    #[test]
    fn failed_pipeline_stops_forwarding_until_reinitialized() {
        let (mut c, p, r, sink) = coordinator(CoordinatorConfig::default());
        c.start(DisplaySource::Missing, Instant::now()).unwrap();
        r.borrow_mut()
            .replies
            .push_back(Ok(RenderResponse::Failed(PipelineError::SurfaceMissing)));
        c.tick_with_elapsed(0.1).unwrap();
        p.borrow_mut().replies.push_back(state(1, 0.1));
        c.pump().unwrap();
        assert_eq!(c.renderer_status(), RendererStatus::Failed);
        assert!(render_frames(&r).is_empty());
        let reported = "no display surface was provided";
        assert!(sink.contains(Level::Error, reported));

        let handoff = c
            .reinitialize_renderer(DisplaySource::Transferable(surface()))
            .unwrap();
        assert_eq!(handoff.mode, HandOffMode::Transferred);
        assert_eq!(c.renderer_status(), RendererStatus::Pending);
        r.borrow_mut().replies.push_back(Ok(RenderResponse::Ready));
        c.tick_with_elapsed(0.1).unwrap();
        p.borrow_mut().replies.push_back(state(2, 0.2));
        c.pump().unwrap();
        assert_eq!(render_frames(&r), vec![(2, 0.2)]);
    }

    #[test]
    fn rejected_frames_free_the_slot_and_are_counted() {
        let (mut c, p, r, sink) = started();
        c.tick_with_elapsed(0.1).unwrap();
        p.borrow_mut().replies.push_back(state(1, 0.1));
        c.pump().unwrap();
        r.borrow_mut().replies.push_back(Ok(RenderResponse::Rejected {
            frame: 1,
            error: InputError::MissingField("sceneData.cubeRotationY"),
        }));
        c.pump().unwrap();
        assert_eq!(c.stats().frames_rejected, 1);
        assert_eq!(c.outstanding().1, 0);
        assert!(sink.contains(Level::Warning, "frame 1 rejected"));
    }

    #[test]
    fn late_reply_from_previous_cycle_does_not_free_a_slot() {
        let (mut c, p, r, _) = started();
        c.tick_with_elapsed(0.1).unwrap();
        p.borrow_mut().replies.push_back(state(1, 0.1));
        c.pump().unwrap();

        c.reinitialize_renderer(DisplaySource::Transferable(surface()))
            .unwrap();
        c.tick_with_elapsed(0.1).unwrap();
        p.borrow_mut().replies.push_back(state(2, 0.2));
        c.pump().unwrap();

        r.borrow_mut()
            .replies
            .push_back(Ok(RenderResponse::FrameDone { frame: 1 }));
        c.tick_with_elapsed(0.1).unwrap();
        p.borrow_mut().replies.push_back(state(3, 0.3));
        c.pump().unwrap();

        assert_eq!(render_frames(&r), vec![(1, 0.1), (2, 0.2)]);
        assert_eq!(c.outstanding(), (0, 1));
        assert_eq!(c.stats().frames_rendered, 0);
        assert_eq!(c.stats().stale_replies, 1);
        assert_eq!(c.stats().frames_skipped, 1);

        r.borrow_mut()
            .replies
            .push_back(Ok(RenderResponse::FrameDone { frame: 2 }));
        c.pump().unwrap();
        assert_eq!(c.outstanding(), (0, 0));
        assert_eq!(c.stats().frames_rendered, 1);
    }

    #[test]
    fn only_the_latest_init_sets_renderer_status() {
        let (mut c, _, r, _) = coordinator(CoordinatorConfig::default());
        c.start(DisplaySource::Missing, Instant::now()).unwrap();
        c.reinitialize_renderer(DisplaySource::Transferable(surface()))
            .unwrap();

        r.borrow_mut()
            .replies
            .push_back(Ok(RenderResponse::Failed(PipelineError::SurfaceMissing)));
        c.pump().unwrap();
        assert_eq!(c.renderer_status(), RendererStatus::Pending);

        r.borrow_mut().replies.push_back(Ok(RenderResponse::Ready));
        c.pump().unwrap();
        assert_eq!(c.renderer_status(), RendererStatus::Ready);
    }

    #[test]
    fn worker_crash_reaches_the_sink() {
        let (mut c, p, _, sink) = started();
        p.borrow_mut()
            .replies
            .push_back(Err(TransportError::WorkerPanicked {
                worker: "physics".into(),
                message: "boom".into(),
            }));
        assert!(matches!(c.pump(), Err(CoordinatorError::Transport(_))));
        assert!(sink.contains(Level::Error, "boom"));
    }

    #[test]
    fn shutdown_terminates_workers_and_refuses_further_calls() {
        let (mut c, p, r, _) = started();
        c.tick_with_elapsed(0.1).unwrap();
        let stats = c.shutdown().unwrap();
        assert_eq!(stats.ticks, 1);
        assert!(p.borrow().terminated);
        assert!(r.borrow().terminated);
        assert!(!c.is_running());

        assert!(matches!(
            c.tick_with_elapsed(0.1),
            Err(CoordinatorError::ShutDown)
        ));
        assert!(matches!(
            c.tick(Instant::now()),
            Err(CoordinatorError::ShutDown)
        ));
        assert!(matches!(c.pump(), Err(CoordinatorError::ShutDown)));
        assert!(matches!(
            c.reinitialize_renderer(DisplaySource::Missing),
            Err(CoordinatorError::ShutDown)
        ));
        assert!(matches!(
            c.start(DisplaySource::Missing, Instant::now()),
            Err(CoordinatorError::ShutDown)
        ));
        assert!(matches!(c.shutdown(), Err(CoordinatorError::ShutDown)));
    }
}
