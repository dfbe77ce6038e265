pub mod camera;
pub mod config;
pub mod time;

pub use camera::{Camera, CameraError, ProjectionKey};
pub use config::{ClusterGridConfig, ConfigError, CullingBackend, RendererConfig};
pub use time::{FrameReport, FrameStats, Time};
