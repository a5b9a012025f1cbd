use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::{GpuContext, GpuError};

/// Pixel dimensions of a display surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// `width / height`, treating a zero height as one pixel.
    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

/// Something a GPU context can be bound to.
///
/// A surface yields at most one context; later attempts fail with
/// [`GpuError::AlreadyBound`].
pub trait Surface: Send + 'static {
    type Context: GpuContext;

    /// Current pixel size. May change between frames.
    fn size(&self) -> SurfaceSize;

    fn create_context(&mut self) -> Result<Self::Context, GpuError>;
}

/// How the pipeline holds its surface.
///
/// `Owned` is the result of an ownership transfer: nobody else can reach the
/// surface. `Shared` is the fallback when transfer is not possible; the
/// original holder keeps a reference.
#[derive(Debug)]
pub enum SurfaceHandle<S> {
    Owned(S),
    Shared(Arc<Mutex<S>>),
}

impl<S: Surface> SurfaceHandle<S> {
    pub fn is_shared(&self) -> bool {
        matches!(self, Self::Shared(_))
    }

    pub fn size(&self) -> SurfaceSize {
        match self {
            Self::Owned(s) => s.size(),
            Self::Shared(s) => s.lock().unwrap_or_else(PoisonError::into_inner).size(),
        }
    }

    pub fn create_context(&mut self) -> Result<S::Context, GpuError> {
        match self {
            Self::Owned(s) => s.create_context(),
            Self::Shared(s) => s
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .create_context(),
        }
    }
}
