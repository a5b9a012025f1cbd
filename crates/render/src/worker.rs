//! The graphics pipeline as a worker.

use serde_json::json;
use splitcube_protocol::{
    Envelope, InputError, SceneData, TransportError, Worker, WorkerHandle, spawn_worker,
};

use crate::pipeline::{Pipeline, PipelineConfig, PipelineError, RenderError};
use crate::surface::{Surface, SurfaceHandle, SurfaceSize};

#[derive(Debug)]
pub enum RenderRequest<S> {
    /// Hand the pipeline its surface. `None` models a missing surface.
    Init { surface: Option<SurfaceHandle<S>> },
    RenderScene { frame: u64, scene: SceneData },
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderResponse {
    Status(String),
    Ready,
    Failed(PipelineError),
    Rejected { frame: u64, error: InputError },
    FrameDone { frame: u64 },
    FrameError { frame: u64, message: String },
}

impl<S> RenderRequest<S> {
    /// Decode a wire request.
    ///
    /// An `init` payload may carry `{"surface": {"width": w, "height": h}}`;
    /// `make_surface` turns that into a handle. Without it the request models
    /// a missing surface.
    pub fn from_envelope(
        envelope: &Envelope,
        make_surface: impl FnOnce(SurfaceSize) -> SurfaceHandle<S>,
    ) -> Result<Self, InputError> {
        match envelope.kind.as_str() {
            "init" => {
                let surface = match envelope.field("surface") {
                    None => None,
                    Some(_) => {
                        let width = dimension(envelope, "surface.width")?;
                        let height = dimension(envelope, "surface.height")?;
                        Some(make_surface(SurfaceSize::new(width, height)))
                    }
                };
                Ok(Self::Init { surface })
            }
            "renderScene" => {
                if envelope.field("sceneData").is_none() {
                    return Err(InputError::MissingField("sceneData"));
                }
                let cube_rotation_y = envelope.required_f64("sceneData.cubeRotationY")?;
                let frame = envelope
                    .optional_f64("frame")?
                    .map_or(0, |f| f.max(0.0) as u64);
                Ok(Self::RenderScene {
                    frame,
                    scene: SceneData { cube_rotation_y },
                })
            }
            _ => Err(envelope.unknown_kind()),
        }
    }
}

fn dimension(envelope: &Envelope, path: &'static str) -> Result<u32, InputError> {
    let value = envelope.required_f64(path)?;
    if value < 1.0 || value.fract() != 0.0 || value > f64::from(u32::MAX) {
        return Err(InputError::InvalidField {
            field: path,
            reason: format!("{value} is not a pixel size"),
        });
    }
    Ok(value as u32)
}

impl RenderResponse {
    pub fn to_envelope(&self) -> Envelope {
        match self {
            Self::Status(status) => Envelope::new("status", json!({ "status": status })),
            Self::Ready => Envelope::new("ready", json!({})),
            Self::Failed(error) => Envelope::new(
                "failed",
                json!({ "error": error.to_string(), "class": format!("{:?}", error.class()) }),
            ),
            Self::Rejected { frame, error } => Envelope::new(
                "rejected",
                json!({ "frame": frame, "error": error.to_string() }),
            ),
            Self::FrameDone { frame } => Envelope::new("frameDone", json!({ "frame": frame })),
            Self::FrameError { frame, message } => Envelope::new(
                "frameError",
                json!({ "frame": frame, "error": message }),
            ),
        }
    }
}

/// Worker wrapper around [`Pipeline`].
pub struct RenderWorker<S: Surface> {
    pipeline: Pipeline<S>,
}

impl<S: Surface> RenderWorker<S> {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            pipeline: Pipeline::new(config),
        }
    }

    pub fn pipeline(&self) -> &Pipeline<S> {
        &self.pipeline
    }
}

impl<S: Surface> Worker for RenderWorker<S> {
    type Request = RenderRequest<S>;
    type Response = RenderResponse;

    fn handle(&mut self, request: RenderRequest<S>, replies: &mut Vec<RenderResponse>) {
        match request {
            RenderRequest::Init { surface } => {
                let _span = tracing::info_span!("render_init").entered();
                let shared = surface.as_ref().is_some_and(SurfaceHandle::is_shared);
                if shared {
                    tracing::warn!("rendering through a shared surface handle");
                }
                let result = self.pipeline.init(surface, |status| {
                    replies.push(RenderResponse::Status(status.to_owned()));
                });
                replies.push(match result {
                    Ok(()) => RenderResponse::Ready,
                    Err(e) => RenderResponse::Failed(e),
                });
            }
            RenderRequest::RenderScene { frame, scene } => {
                let _span = tracing::trace_span!("render_frame", frame).entered();
                match self.pipeline.render(&scene) {
                    Ok(_) => replies.push(RenderResponse::FrameDone { frame }),
                    Err(RenderError::Input(error)) => {
                        tracing::warn!(frame, %error, "render request rejected");
                        replies.push(RenderResponse::Rejected { frame, error });
                    }
                    Err(RenderError::Frame(message)) => {
                        tracing::warn!(frame, %message, "frame failed");
                        replies.push(RenderResponse::FrameError { frame, message });
                    }
                }
            }
        }
    }
}

/// Start a pipeline on its own thread. The surface arrives later with `Init`.
pub fn spawn<S: Surface>(
    config: PipelineConfig,
) -> Result<WorkerHandle<RenderRequest<S>, RenderResponse>, TransportError> {
    spawn_worker("render", RenderWorker::<S>::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::RecordingSurface;
    use serde_json::json;

    fn owned(size: SurfaceSize) -> SurfaceHandle<RecordingSurface> {
        SurfaceHandle::Owned(RecordingSurface::new(size))
    }

    fn recording_worker() -> RenderWorker<RecordingSurface> {
        RenderWorker::new(PipelineConfig::default())
    }

    fn handle(
        worker: &mut RenderWorker<RecordingSurface>,
        request: RenderRequest<RecordingSurface>,
    ) -> Vec<RenderResponse> {
        let mut replies = Vec::new();
        worker.handle(request, &mut replies);
        replies
    }

    #[test]
    fn init_reports_statuses_then_ready() {
        let mut worker = recording_worker();
        let surface = Some(owned(SurfaceSize::new(640, 480)));
        let replies = handle(&mut worker, RenderRequest::Init { surface });
        assert!(matches!(replies.last(), Some(RenderResponse::Ready)));
        let statuses = replies
            .iter()
            .filter(|r| matches!(r, RenderResponse::Status(_)))
            .count();
        assert_eq!(statuses, 2);
    }

    #[test]
    fn init_without_surface_fails() {
        let mut worker = recording_worker();
        let replies = handle(&mut worker, RenderRequest::Init { surface: None });
        assert_eq!(
            replies,
            vec![RenderResponse::Failed(PipelineError::SurfaceMissing)]
        );
    }

    #[test]
    fn frames_before_init_are_rejected() {
        let mut worker = recording_worker();
        let request = RenderRequest::RenderScene {
            frame: 3,
            scene: SceneData::new(0.0),
        };
        let replies = handle(&mut worker, request);
        let error = InputError::NotReady {
            state: "uninitialized",
        };
        assert_eq!(replies, vec![RenderResponse::Rejected { frame: 3, error }]);
    }

    #[test]
    fn decodes_init_with_and_without_surface() {
        let env = Envelope::new(
            "init",
            json!({ "surface": { "width": 320, "height": 240 } }),
        );
        let mut seen = None;
        let req = RenderRequest::from_envelope(&env, |size| {
            seen = Some(size);
            owned(size)
        })
        .unwrap();
        assert!(matches!(req, RenderRequest::Init { surface: Some(_) }));
        assert_eq!(seen, Some(SurfaceSize::new(320, 240)));

        let env = Envelope::new("init", json!({ "canvas": null }));
        let req = RenderRequest::from_envelope(&env, owned).unwrap();
        assert!(matches!(req, RenderRequest::Init { surface: None }));

        let env = Envelope::new(
            "init",
            json!({ "surface": { "width": 0, "height": 240 } }),
        );
        let err = RenderRequest::from_envelope(&env, owned).unwrap_err();
        let InputError::InvalidField { field, .. } = &err else {
            panic!("unexpected error {err:?}");
        };
        assert_eq!(*field, "surface.width");
    }

    #[test]
    fn decodes_render_scene() {
        let env = Envelope::new(
            "renderScene",
            json!({ "frame": 12, "sceneData": { "cubeRotationY": 0.25 } }),
        );
        match RenderRequest::from_envelope(&env, owned).unwrap() {
            RenderRequest::RenderScene { frame, scene } => {
                assert_eq!(frame, 12);
                assert_eq!(scene.cube_rotation_y, 0.25);
            }
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[test]
    fn render_scene_requires_the_rotation_field() {
        let env = Envelope::new("renderScene", json!({}));
        assert_eq!(
            RenderRequest::from_envelope(&env, owned).unwrap_err(),
            InputError::MissingField("sceneData")
        );
        let env = Envelope::new("renderScene", json!({ "sceneData": { "angle": 1 } }));
        assert_eq!(
            RenderRequest::from_envelope(&env, owned).unwrap_err(),
            InputError::MissingField("sceneData.cubeRotationY")
        );
    }

    #[test]
    fn responses_encode_kind_and_detail() {
        let env = RenderResponse::Failed(PipelineError::Link("bad".into())).to_envelope();
        assert_eq!(env.kind, "failed");
        assert_eq!(env.payload["class"], "Link");
        let env = RenderResponse::FrameDone { frame: 4 }.to_envelope();
        assert_eq!(env.required_f64("frame").unwrap(), 4.0);
    }
}
