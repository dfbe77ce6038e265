use std::time::Duration;

use glam::{Mat4, UVec2, UVec3, Vec4};
use lumen_core::{Camera, CullingBackend, RendererConfig};

use crate::cluster::{
    ClusterAssigner, ClusterGridParams, ClusterLightLists, CullingInput, CullingReport,
    FrustumPartitioner, GpuClusterAabb, ParallelAssigner, SerialAssigner,
};
use crate::error::RendererError;
use crate::frame_ring::FrameRing;
use crate::gpu::{
    ClusterCullPass, CullingLimits, ForwardProgram, FrameLayouts, FrameSlot, GpuBuffer,
    GpuContext, GpuMesh, GpuProgram, GpuProgramRenderContext, MeshData, ScreenToView, SlotSizes,
    TransformUniform,
};
use crate::light::{LightId, LightRegistry, PointLight};
use crate::sync::FrameFence;

/// Handle to a mesh added with [`Renderer::add_mesh`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MeshId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented {
        slot: usize,
        /// Present when a CPU backend did the culling.
        report: Option<CullingReport>,
    },
    /// Nothing was drawn (minimized window, surface timeout).
    Skipped,
    /// The surface went stale; swapchain-sized resources were rebuilt.
    Rebuilt,
}

/// Clustered forward renderer.
///
/// Each frame: refresh cluster bounds if the projection changed, assign lights
/// to clusters (compute shader or CPU), then run one forward pass that reads
/// the per-cluster lists. Per-frame buffers rotate through a [`FrameRing`].
pub struct Renderer {
    config: RendererConfig,
    context: GpuContext,
    layouts: FrameLayouts,
    forward: ForwardProgram,
    cull_pass: ClusterCullPass,

    registry: LightRegistry,
    meshes: Vec<GpuMesh>,

    partitioner: FrustumPartitioner,
    cluster_aabbs: GpuBuffer<GpuClusterAabb>,
    /// Partitioner generation currently in `cluster_aabbs`.
    uploaded_generation: Option<u64>,

    ring: FrameRing<FrameSlot>,
    cpu_lists: ClusterLightLists,
    serial: SerialAssigner,
    parallel: ParallelAssigner,

    backend: CullingBackend,
    clustered_shading: bool,
    max_lights_per_cluster: u32,
    fence_timeout: Option<Duration>,
    minimized: bool,
    degraded: bool,
    last_report: Option<CullingReport>,
}

fn create_ring(
    device: &wgpu::Device,
    layouts: &FrameLayouts,
    sizes: SlotSizes,
    cluster_aabbs: &GpuBuffer<GpuClusterAabb>,
    frames_in_flight: u32,
    fence_timeout: Option<Duration>,
) -> Result<FrameRing<FrameSlot>, RendererError> {
    FrameRing::from_fn(frames_in_flight as usize, fence_timeout, |index| {
        Ok(FrameSlot::new(device, layouts, sizes, cluster_aabbs, index))
    })
}

fn lookup_mesh<T>(meshes: &[T], id: MeshId) -> Result<&T, RendererError> {
    meshes.get(id.0).ok_or(RendererError::UnknownMesh {
        index: id.0,
        len: meshes.len(),
    })
}

fn create_cluster_aabbs(device: &wgpu::Device, cluster_count: u32) -> GpuBuffer<GpuClusterAabb> {
    GpuBuffer::new(
        device,
        "Cluster AABBs",
        cluster_count as u64,
        wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
    )
}

impl Renderer {
    pub fn new(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
        config: RendererConfig,
    ) -> Result<Self, RendererError> {
        config.validate()?;

        let context = GpuContext::new(target, width, height, config.vsync)?;
        let layouts = FrameLayouts::new(&context.device);

        let render_context = GpuProgramRenderContext {
            device: &context.device,
            queue: &context.queue,
            format: context.config.format,
        };
        let forward = ForwardProgram::new(&render_context, &layouts.shading);
        let cull_pass = ClusterCullPass::new(&context.device, &layouts.culling);
        log::info!("Pipelines compiled");

        let mut max_lights_per_cluster = config.max_lights_per_cluster;
        if max_lights_per_cluster > ClusterCullPass::MAX_LOCAL_LIGHTS {
            log::warn!(
                "max_lights_per_cluster {} exceeds the shader limit, clamping to {}",
                max_lights_per_cluster,
                ClusterCullPass::MAX_LOCAL_LIGHTS
            );
            max_lights_per_cluster = ClusterCullPass::MAX_LOCAL_LIGHTS;
        }

        let grid = &config.cluster_grid;
        let dims = UVec3::new(grid.tiles_x, grid.tiles_y, grid.depth_slices);
        let (width, height) = context.size();
        let cluster_count = ClusterGridParams::clamp_dims(UVec2::new(width, height), dims)
            .element_product();
        let index_capacity = config.light_index_capacity();
        let fence_timeout = config.fence_timeout_ms.map(Duration::from_millis);

        let cluster_aabbs = create_cluster_aabbs(&context.device, cluster_count);
        let ring = create_ring(
            &context.device,
            &layouts,
            SlotSizes {
                max_lights: config.max_lights,
                cluster_count,
                index_capacity,
            },
            &cluster_aabbs,
            config.frames_in_flight,
            fence_timeout,
        )?;

        let parallel = ParallelAssigner::new(config.culling_threads, max_lights_per_cluster)?;

        log::info!(
            "Renderer ready: {} frames in flight, {}x{}x{} clusters, {} light indices, {:?} culling",
            config.frames_in_flight,
            dims.x,
            dims.y,
            dims.z,
            index_capacity,
            config.culling_backend
        );

        Ok(Self {
            registry: LightRegistry::new(config.max_lights),
            meshes: Vec::new(),
            partitioner: FrustumPartitioner::new(dims),
            cluster_aabbs,
            uploaded_generation: None,
            ring,
            cpu_lists: ClusterLightLists::new(cluster_count, index_capacity),
            serial: SerialAssigner::new(max_lights_per_cluster),
            parallel,
            backend: config.culling_backend,
            clustered_shading: config.clustered_shading,
            max_lights_per_cluster,
            fence_timeout,
            minimized: false,
            degraded: false,
            last_report: None,
            config,
            context,
            layouts,
            forward,
            cull_pass,
        })
    }

    pub fn add_light(&mut self, light: &PointLight) -> Result<LightId, RendererError> {
        Ok(self.registry.add_light(light)?)
    }

    pub fn update_light(&mut self, id: LightId, light: &PointLight) -> Result<(), RendererError> {
        Ok(self.registry.update_light(id, light)?)
    }

    pub fn set_light_enabled(&mut self, id: LightId, enabled: bool) -> Result<(), RendererError> {
        Ok(self.registry.set_light_enabled(id, enabled)?)
    }

    pub fn clear_lights(&mut self) {
        self.registry.clear();
    }

    /// Lights are scene-scoped; leaving a scene drops all of them.
    pub fn on_scene_exit(&mut self) {
        log::info!("Scene exit: releasing {} lights", self.registry.len());
        self.clear_lights();
    }

    pub fn lights(&self) -> &LightRegistry {
        &self.registry
    }

    pub fn add_mesh(&mut self, data: &MeshData, transform: Mat4, base_color: Vec4) -> MeshId {
        self.meshes.push(GpuMesh::new(
            &self.context.device,
            &self.forward.mesh_layout,
            data,
            transform,
            base_color,
        ));
        MeshId(self.meshes.len() - 1)
    }

    pub fn set_mesh_transform(
        &mut self,
        id: MeshId,
        transform: Mat4,
        base_color: Vec4,
    ) -> Result<(), RendererError> {
        let mesh = lookup_mesh(&self.meshes, id)?;
        mesh.set_transform(&self.context.queue, transform, base_color)?;
        Ok(())
    }

    pub fn set_clustered_shading(&mut self, enabled: bool) {
        log::info!(
            "Clustered shading {}",
            if enabled { "enabled" } else { "disabled" }
        );
        self.clustered_shading = enabled;
    }

    pub fn clustered_shading(&self) -> bool {
        self.clustered_shading
    }

    pub fn set_culling_backend(&mut self, backend: CullingBackend) {
        log::info!("Culling backend: {:?}", backend);
        self.backend = backend;
        self.last_report = None;
    }

    pub fn culling_backend(&self) -> CullingBackend {
        self.backend
    }

    pub fn last_report(&self) -> Option<CullingReport> {
        self.last_report
    }

    pub fn frame_number(&self) -> u64 {
        self.ring.frame_number()
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn size(&self) -> (u32, u32) {
        self.context.size()
    }

    /// Resizes the surface. A zero size (minimized window) pauses rendering.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), RendererError> {
        if width == 0 || height == 0 {
            self.minimized = true;
            return Ok(());
        }
        self.minimized = false;
        if (width, height) == self.context.size() {
            return Ok(());
        }
        log::debug!("Resizing to {}x{}", width, height);
        self.wait_idle()?;
        self.context.resize(width, height);
        self.partitioner.invalidate();
        Ok(())
    }

    /// Rebuilds everything sized by the swapchain after the surface went stale.
    fn rebuild(&mut self) -> Result<(), RendererError> {
        self.wait_idle()?;
        self.context.reconfigure();
        self.partitioner.invalidate();
        let cluster_count = self.cpu_lists.cluster_count();
        self.rebuild_slots(cluster_count)
    }

    fn rebuild_slots(&mut self, cluster_count: u32) -> Result<(), RendererError> {
        let context = &self.context;
        self.ring.wait_all(|| context.poll())?;

        let index_capacity = self.config.light_index_capacity();
        self.cluster_aabbs = create_cluster_aabbs(&self.context.device, cluster_count);
        self.ring = create_ring(
            &self.context.device,
            &self.layouts,
            SlotSizes {
                max_lights: self.config.max_lights,
                cluster_count,
                index_capacity,
            },
            &self.cluster_aabbs,
            self.config.frames_in_flight,
            self.fence_timeout,
        )?;
        self.cpu_lists.resize(cluster_count);
        self.uploaded_generation = None;
        log::debug!("Frame slots rebuilt for {} clusters", cluster_count);
        Ok(())
    }

    /// Blocks until the GPU has finished all submitted work.
    pub fn wait_idle(&self) -> Result<(), RendererError> {
        let fence = FrameFence::new();
        let signal = fence.arm();
        self.context
            .queue
            .submit(std::iter::empty::<wgpu::CommandBuffer>());
        self.context
            .queue
            .on_submitted_work_done(move || signal.signal());
        fence.wait(|| self.context.poll(), self.fence_timeout)?;
        self.ring.wait_all(|| self.context.poll())?;
        Ok(())
    }

    pub fn render(&mut self, camera: &Camera) -> Result<FrameOutcome, RendererError> {
        if self.minimized {
            return Ok(FrameOutcome::Skipped);
        }

        // Cluster tiles are in surface pixels, so project with the surface size.
        let (width, height) = self.context.size();
        let mut camera = camera.clone();
        camera.set_viewport(width, height)?;

        let surface_texture = match self.context.acquire() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => {
                log::warn!("Surface outdated or lost, rebuilding");
                self.rebuild()?;
                return Ok(FrameOutcome::Rebuilt);
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("Timed out acquiring the next surface texture, skipping frame");
                return Ok(FrameOutcome::Skipped);
            }
            Err(e) => {
                log::error!("Failed to acquire surface texture: {e}");
                return Ok(FrameOutcome::Skipped);
            }
        };

        // --- Partition (only when the projection changed) ---
        self.partitioner.update(&camera)?;
        let Some(params) = self.partitioner.params().copied() else {
            return Ok(FrameOutcome::Skipped);
        };
        if params.cluster_count() != self.cpu_lists.cluster_count() {
            self.rebuild_slots(params.cluster_count())?;
        }
        if self.uploaded_generation != Some(self.partitioner.generation()) {
            self.cluster_aabbs
                .write(&self.context.queue, 0, &self.partitioner.gpu_bounds())?;
            self.uploaded_generation = Some(self.partitioner.generation());
        }

        // --- CPU culling runs while the GPU still works on earlier frames ---
        let view = camera.view_matrix();
        let report = match self.backend {
            CullingBackend::Gpu => None,
            backend => {
                let assigner: &dyn ClusterAssigner = if backend == CullingBackend::CpuParallel {
                    &self.parallel
                } else {
                    &self.serial
                };
                let input = CullingInput {
                    view,
                    lights: self.registry.lights(),
                    bounds: self.partitioner.bounds(),
                };
                Some(assigner.assign(&input, &mut self.cpu_lists)?)
            }
        };

        let light_count = self.registry.len();
        let screen_to_view = ScreenToView::new(
            &params,
            camera.inverse_projection(),
            view,
            &CullingLimits {
                light_count,
                max_lights_per_cluster: self.max_lights_per_cluster,
                index_capacity: self.config.light_index_capacity(),
            },
        );
        let transforms = TransformUniform::new(
            camera.view_projection(),
            view,
            camera.position,
            light_count,
            self.clustered_shading,
        );

        // --- Claim the slot; blocks while the GPU still reads it ---
        let context = &self.context;
        let mut frame = self.ring.begin_frame(|| context.poll())?;
        let slot_index = frame.slot_index();
        let slot = frame.resources_mut();
        slot.upload_lights(&context.queue, &self.registry)?;
        slot.write_uniforms(&context.queue, &screen_to_view, &transforms)?;
        if report.is_some() {
            slot.upload_light_lists(&context.queue, &self.cpu_lists)?;
        }

        let target_view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        // Compute writes the lists before the render pass reads them.
        if self.backend == CullingBackend::Gpu {
            self.cull_pass
                .record(&mut encoder, slot, params.cluster_count());
        }

        {
            let [r, g, b, a] = self.config.clear_color;
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Clustered Forward Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target_view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &context.depth_texture,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0), // Clear to "Far" (1.0)
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });

            self.forward.record(
                &mut render_pass,
                (slot.shading_bind_group(), &self.meshes),
            );
        }

        let signal = frame.finish();
        context.queue.submit(std::iter::once(encoder.finish()));
        context
            .queue
            .on_submitted_work_done(move || signal.signal());
        surface_texture.present();

        if let Some(report) = report {
            if report.is_degraded() && !self.degraded {
                log::warn!(
                    "Light lists degraded: {} of {} clusters truncated, index list overflow: {}",
                    report.truncated_clusters,
                    report.clusters,
                    report.index_overflow
                );
            }
            self.degraded = report.is_degraded();
        }
        self.last_report = report;

        Ok(FrameOutcome::Presented {
            slot: slot_index,
            report,
        })
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // Buffers must outlive the work that reads them.
        if let Err(e) = self.wait_idle() {
            log::warn!("Failed to drain the GPU queue on shutdown: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_mesh_is_an_error() {
        let meshes = ["plane", "cube"];
        assert_eq!(lookup_mesh(&meshes, MeshId(1)).ok(), Some(&"cube"));

        let err = lookup_mesh(&meshes, MeshId(2)).unwrap_err();
        assert!(matches!(err, RendererError::UnknownMesh { index: 2, len: 2 }));
        assert!(!err.is_fatal());
    }
}
