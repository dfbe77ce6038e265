use super::frame_slot::FrameSlot;

/// GPU light assignment: one compute invocation per cluster, writing straight
/// into the slot's light grid and index list.
pub struct ClusterCullPass {
    pipeline: wgpu::ComputePipeline,
}

impl ClusterCullPass {
    /// Must match `@workgroup_size` in `cluster_cull.wgsl`.
    pub const WORKGROUP_SIZE: u32 = 64;
    /// Length of the shader's local light array; caps per-cluster capacity on this path.
    pub const MAX_LOCAL_LIGHTS: u32 = 256;

    pub fn new(device: &wgpu::Device, culling_layout: &wgpu::BindGroupLayout) -> Self {
        let shader = device.create_shader_module(wgpu::include_wgsl!("../shaders/cluster_cull.wgsl"));

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Cluster Cull Pipeline Layout"),
            bind_group_layouts: &[culling_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Cluster Cull Pipeline"),
            layout: Some(&layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        Self { pipeline }
    }

    pub fn workgroup_count(cluster_count: u32) -> u32 {
        cluster_count.div_ceil(Self::WORKGROUP_SIZE)
    }

    /// Resets the slot's index counter and dispatches the culling shader.
    /// Must be recorded before the forward pass that reads the lists.
    pub fn record(&self, encoder: &mut wgpu::CommandEncoder, slot: &FrameSlot, cluster_count: u32) {
        encoder.clear_buffer(slot.index_counter(), 0, None);

        let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Cluster Cull Pass"),
            timestamp_writes: None,
        });
        cpass.set_pipeline(&self.pipeline);
        cpass.set_bind_group(0, slot.culling_bind_group(), &[]);
        cpass.dispatch_workgroups(Self::workgroup_count(cluster_count), 1, 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_cluster_gets_an_invocation() {
        assert_eq!(ClusterCullPass::workgroup_count(1), 1);
        assert_eq!(ClusterCullPass::workgroup_count(64), 1);
        assert_eq!(ClusterCullPass::workgroup_count(65), 2);
        assert_eq!(ClusterCullPass::workgroup_count(16 * 9 * 24), 54);
    }

    #[test]
    fn shader_constants_match() {
        let source = include_str!("../shaders/cluster_cull.wgsl");
        assert!(source.contains(&format!("@workgroup_size({})", ClusterCullPass::WORKGROUP_SIZE)));
        assert!(source.contains(&format!(
            "const MAX_LOCAL_LIGHTS: u32 = {}u;",
            ClusterCullPass::MAX_LOCAL_LIGHTS
        )));
    }

    #[test]
    fn shader_parses_and_validates() {
        use wgpu::naga;

        let source = include_str!("../shaders/cluster_cull.wgsl");
        let module = naga::front::wgsl::parse_str(source).unwrap_or_else(|e| panic!("{}", e.emit_to_string(source)));
        naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::default())
            .validate(&module)
            .unwrap_or_else(|e| panic!("{}", e.emit_to_string(source)));

        let entry = module.entry_points.iter().find(|ep| ep.name == "main").unwrap();
        assert_eq!(entry.stage, naga::ShaderStage::Compute);
        assert_eq!(entry.workgroup_size, [ClusterCullPass::WORKGROUP_SIZE, 1, 1]);
    }
}
