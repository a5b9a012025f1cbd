use std::sync::Arc;

use splitcube_render::{GpuError, Surface, SurfaceSize};
use winit::window::Window;

use crate::context::{Target, WgpuContext};

/// A winit window the pipeline presents to.
#[derive(Debug)]
pub struct WindowSurface {
    window: Arc<Window>,
    bound: bool,
}

impl WindowSurface {
    pub fn new(window: Arc<Window>) -> Self {
        Self {
            window,
            bound: false,
        }
    }
}

impl Surface for WindowSurface {
    type Context = WgpuContext;

    fn size(&self) -> SurfaceSize {
        let size = self.window.inner_size();
        SurfaceSize::new(size.width, size.height)
    }

    fn create_context(&mut self) -> Result<WgpuContext, GpuError> {
        if self.bound {
            return Err(GpuError::AlreadyBound);
        }
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(self.window.clone())
            .map_err(|e| GpuError::SurfaceUnavailable(e.to_string()))?;
        let (adapter, device, queue) = crate::context::request_device(&instance, Some(&surface))?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or(caps.formats.first())
            .copied()
            .ok_or_else(|| {
                GpuError::SurfaceUnavailable("surface reports no formats".into())
            })?;
        let size = self.size();
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        self.bound = true;
        tracing::info!(
            backend = adapter.get_info().backend.to_str(),
            width = config.width,
            height = config.height,
            "window context created"
        );
        let target = Target::Window { surface, config };
        Ok(WgpuContext::new(device, queue, target))
    }
}

/// A render target texture with no window behind it.
#[derive(Debug, Clone)]
pub struct OffscreenSurface {
    size: SurfaceSize,
    bound: bool,
}

impl OffscreenSurface {
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

    pub fn new(size: SurfaceSize) -> Self {
        Self { size, bound: false }
    }
}

impl Surface for OffscreenSurface {
    type Context = WgpuContext;

    fn size(&self) -> SurfaceSize {
        self.size
    }

    fn create_context(&mut self) -> Result<WgpuContext, GpuError> {
        if self.bound {
            return Err(GpuError::AlreadyBound);
        }
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let (adapter, device, queue) = crate::context::request_device(&instance, None)?;
        let target = Target::offscreen(&device, Self::FORMAT, self.size);
        self.bound = true;
        tracing::info!(
            backend = adapter.get_info().backend.to_str(),
            width = self.size.width,
            height = self.size.height,
            "offscreen context created"
        );
        Ok(WgpuContext::new(device, queue, target))
    }
}
