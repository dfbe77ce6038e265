//! wgpu backend: device setup, typed buffers, per-frame slots and the two
//! programs (cluster culling compute, clustered forward shading).

pub mod buffer;
pub mod context;
pub mod cull_pass;
pub mod forward_program;
pub mod frame_slot;
pub mod mesh;
pub mod uniforms;

pub use buffer::{BufferError, GpuBuffer};
pub use context::{DEPTH_FORMAT, GpuContext};
pub use cull_pass::ClusterCullPass;
pub use forward_program::ForwardProgram;
pub use frame_slot::{FrameLayouts, FrameSlot, SlotSizes};
pub use mesh::{GpuMesh, MeshData, MeshUniform, Vertex};
pub use uniforms::{CullingLimits, ScreenToView, TransformUniform};

/// Holds common WGPU references to simplify function signatures.
pub struct GpuProgramRenderContext<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub format: wgpu::TextureFormat, // The output format (Swapchain)
}

pub trait GpuProgram {
    /// Data required to initialize the pipeline (e.g., shared layouts)
    type InitData;

    /// Data required to draw a frame
    type DrawData<'a>
    where
        Self: 'a;

    /// Compiles shaders, creates pipeline layouts and the pipeline itself.
    fn new(ctx: &GpuProgramRenderContext, init_data: &Self::InitData) -> Self;

    /// Encodes commands into the RenderPass.
    fn record<'a>(&'a self, rpass: &mut wgpu::RenderPass<'a>, data: Self::DrawData<'a>);
}
