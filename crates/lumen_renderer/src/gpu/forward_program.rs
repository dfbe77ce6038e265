use wgpu::RenderPipeline;

use super::{
    GpuProgram, GpuProgramRenderContext,
    context::DEPTH_FORMAT,
    mesh::{GpuMesh, Vertex},
};

/// Forward pass that shades each fragment with the lights of its cluster
/// (or with every light when clustered shading is off).
pub struct ForwardProgram {
    pipeline: RenderPipeline,
    pub mesh_layout: wgpu::BindGroupLayout,
}

impl GpuProgram for ForwardProgram {
    type InitData = wgpu::BindGroupLayout;
    type DrawData<'a> = (
        &'a wgpu::BindGroup, // Frame slot (transforms, clusters, lights) - Group 0
        &'a [GpuMesh],       // The meshes - Group 1
    );

    fn new(ctx: &GpuProgramRenderContext, shading_layout: &Self::InitData) -> Self {
        let shader = ctx
            .device
            .create_shader_module(wgpu::include_wgsl!("../shaders/clustered_forward.wgsl"));

        let mesh_layout = ctx
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Mesh Bind Group Layout"),
                entries: &[
                    // --- BINDING 0: Model / Normal Matrix / Color ---
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                ],
            });

        let pipeline_layout = ctx
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Clustered Forward Pipeline Layout"),
                bind_group_layouts: &[shading_layout, &mesh_layout],
                push_constant_ranges: &[],
            });

        let pipeline = ctx
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                cache: None,
                label: Some("Clustered Forward Pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    compilation_options: Default::default(),
                    buffers: &[Vertex::desc()],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: ctx.format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: Some(wgpu::Face::Back),
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            });

        Self {
            pipeline,
            mesh_layout,
        }
    }

    fn record<'a>(&'a self, render_pass: &mut wgpu::RenderPass<'a>, data: Self::DrawData<'a>) {
        let (frame_bind_group, meshes) = data;

        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, frame_bind_group, &[]);
        for mesh in meshes {
            mesh.record(render_pass);
        }
    }
}

#[cfg(test)]
mod tests {
    use wgpu::naga;

    use crate::cluster::{GpuClusterAabb, LightGridEntry};
    use crate::gpu::{MeshUniform, ScreenToView, TransformUniform};
    use crate::light::GpuPointLight;

    fn parse(source: &str) -> naga::Module {
        let module = naga::front::wgsl::parse_str(source).unwrap_or_else(|e| panic!("{}", e.emit_to_string(source)));
        naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::default())
            .validate(&module)
            .unwrap_or_else(|e| panic!("{}", e.emit_to_string(source)));
        module
    }

    fn struct_size(module: &naga::Module, name: &str) -> u32 {
        module
            .types
            .iter()
            .find_map(|(_, ty)| match &ty.inner {
                naga::TypeInner::Struct { span, .. } if ty.name.as_deref() == Some(name) => Some(*span),
                _ => None,
            })
            .unwrap_or_else(|| panic!("no struct {name}"))
    }

    #[test]
    fn shader_parses_and_validates() {
        let module = parse(include_str!("../shaders/clustered_forward.wgsl"));

        let stages: Vec<_> = module.entry_points.iter().map(|ep| (ep.name.as_str(), ep.stage)).collect();
        assert!(stages.contains(&("vs_main", naga::ShaderStage::Vertex)));
        assert!(stages.contains(&("fs_main", naga::ShaderStage::Fragment)));
    }

    #[test]
    fn shader_structs_match_host_layouts() {
        let forward = parse(include_str!("../shaders/clustered_forward.wgsl"));
        let cull = parse(include_str!("../shaders/cluster_cull.wgsl"));
        let size = |bytes: usize| bytes as u32;

        for module in [&forward, &cull] {
            assert_eq!(struct_size(module, "PointLight"), size(size_of::<GpuPointLight>()));
            assert_eq!(struct_size(module, "ScreenToView"), size(size_of::<ScreenToView>()));
            assert_eq!(struct_size(module, "LightGridEntry"), size(size_of::<LightGridEntry>()));
        }
        assert_eq!(struct_size(&forward, "Transforms"), size(size_of::<TransformUniform>()));
        assert_eq!(struct_size(&forward, "MeshUniform"), size(size_of::<MeshUniform>()));
        assert_eq!(struct_size(&cull, "ClusterAabb"), size(size_of::<GpuClusterAabb>()));
    }
}
