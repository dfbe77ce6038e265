//! Clustered forward renderer on wgpu.
//!
//! [`Renderer`] owns the GPU context, the light registry, the frustum
//! partitioner and a ring of per-frame slots. Light-to-cluster assignment runs
//! either in a compute shader or on the CPU ([`cluster::SerialAssigner`],
//! [`cluster::ParallelAssigner`]).

pub mod cluster;
pub mod error;
pub mod frame_ring;
pub mod gpu;
pub mod light;
pub mod renderer;
pub mod sync;

pub use cluster::{ClusterError, ClusterGridParams, CullingReport};
pub use error::RendererError;
pub use frame_ring::{ActiveFrame, FrameRing};
pub use gpu::MeshData;
pub use light::{GpuPointLight, LightId, LightRegistry, LightRegistryError, PointLight};
pub use renderer::{FrameOutcome, MeshId, Renderer};
pub use sync::{FenceSignal, FrameFence, SyncError};
