use lumen_core::{CameraError, ConfigError};
use thiserror::Error;

use crate::cluster::ClusterError;
use crate::gpu::BufferError;
use crate::light::LightRegistryError;
use crate::sync::SyncError;

#[derive(Debug, Error)]
pub enum RendererError {
    #[error("failed to create surface: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),
    #[error("no suitable GPU adapter: {0}")]
    NoAdapter(#[from] wgpu::RequestAdapterError),
    #[error("failed to open GPU device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("GPU is missing a required capability: {0}")]
    MissingCapability(String),
    #[error("no mesh with id {index} (renderer holds {len})")]
    UnknownMesh { index: usize, len: usize },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Light(#[from] LightRegistryError),
    #[error(transparent)]
    Cluster(#[from] ClusterError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

impl RendererError {
    /// Initialization failures the application cannot recover from.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RendererError::CreateSurface(_)
                | RendererError::NoAdapter(_)
                | RendererError::RequestDevice(_)
                | RendererError::MissingCapability(_)
                | RendererError::Config(_)
        )
    }
}
