use super::buffer::{BufferError, GpuBuffer};
use super::uniforms::{ScreenToView, TransformUniform};
use crate::cluster::{ClusterLightLists, GpuClusterAabb, LightGridEntry};
use crate::light::{GpuPointLight, LightRegistry};

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn storage_entry(binding: u32, visibility: wgpu::ShaderStages, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Bind group layouts shared by every slot.
pub struct FrameLayouts {
    /// Group 0 of the forward pass.
    pub shading: wgpu::BindGroupLayout,
    /// Group 0 of the cull pass.
    pub culling: wgpu::BindGroupLayout,
}

impl FrameLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let fragment = wgpu::ShaderStages::FRAGMENT;
        let shading = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Shading Bind Group Layout"),
            entries: &[
                // --- BINDING 0: Transforms ---
                uniform_entry(0, wgpu::ShaderStages::VERTEX | fragment),
                // --- BINDING 1: Screen To View ---
                uniform_entry(1, fragment),
                // --- BINDING 2: Lights ---
                storage_entry(2, fragment, true),
                // --- BINDING 3: Light Grid ---
                storage_entry(3, fragment, true),
                // --- BINDING 4: Light Indices ---
                storage_entry(4, fragment, true),
            ],
        });

        let compute = wgpu::ShaderStages::COMPUTE;
        let culling = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Culling Bind Group Layout"),
            entries: &[
                storage_entry(0, compute, true),  // cluster AABBs
                uniform_entry(1, compute),        // screen to view
                storage_entry(2, compute, true),  // lights
                storage_entry(3, compute, false), // light indices
                storage_entry(4, compute, false), // light grid
                storage_entry(5, compute, false), // index counter
            ],
        });

        Self { shading, culling }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotSizes {
    pub max_lights: u32,
    pub cluster_count: u32,
    pub index_capacity: u32,
}

/// One member of the frame ring: every buffer a frame writes, plus the bind
/// groups pointing at them.
pub struct FrameSlot {
    lights: GpuBuffer<GpuPointLight>,
    light_grid: GpuBuffer<LightGridEntry>,
    light_indices: GpuBuffer<u32>,
    index_counter: GpuBuffer<u32>,
    screen_to_view: GpuBuffer<ScreenToView>,
    transforms: GpuBuffer<TransformUniform>,
    shading_bind_group: wgpu::BindGroup,
    culling_bind_group: wgpu::BindGroup,
    /// Registry version last uploaded into `lights`.
    light_version: Option<u64>,
    /// Scratch for snapshotting the CPU index list before upload.
    index_scratch: Vec<u32>,
}

impl FrameSlot {
    pub fn new(
        device: &wgpu::Device,
        layouts: &FrameLayouts,
        sizes: SlotSizes,
        cluster_aabbs: &GpuBuffer<GpuClusterAabb>,
        index: usize,
    ) -> Self {
        let storage = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST;
        let uniform = wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST;

        let lights = GpuBuffer::new(device, &format!("Lights #{index}"), sizes.max_lights as u64, storage);
        let light_grid = GpuBuffer::new(
            device,
            &format!("Light Grid #{index}"),
            sizes.cluster_count as u64,
            storage,
        );
        let light_indices = GpuBuffer::new(
            device,
            &format!("Light Indices #{index}"),
            sizes.index_capacity as u64,
            storage,
        );
        let index_counter = GpuBuffer::new(device, &format!("Index Counter #{index}"), 1, storage);
        let screen_to_view = GpuBuffer::new(device, &format!("Screen To View #{index}"), 1, uniform);
        let transforms = GpuBuffer::new(device, &format!("Transforms #{index}"), 1, uniform);

        let shading_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("Shading Bind Group #{index}")),
            layout: &layouts.shading,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: transforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: screen_to_view.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: lights.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: light_grid.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: light_indices.as_entire_binding(),
                },
            ],
        });

        let culling_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("Culling Bind Group #{index}")),
            layout: &layouts.culling,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: cluster_aabbs.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: screen_to_view.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: lights.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: light_indices.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: light_grid.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: index_counter.as_entire_binding(),
                },
            ],
        });

        Self {
            lights,
            light_grid,
            light_indices,
            index_counter,
            screen_to_view,
            transforms,
            shading_bind_group,
            culling_bind_group,
            light_version: None,
            index_scratch: Vec::new(),
        }
    }

    /// Uploads the registry if this slot holds an older version of it.
    pub fn upload_lights(&mut self, queue: &wgpu::Queue, registry: &LightRegistry) -> Result<bool, BufferError> {
        if self.light_version == Some(registry.version()) {
            return Ok(false);
        }
        self.lights.write(queue, 0, registry.lights())?;
        self.light_version = Some(registry.version());
        Ok(true)
    }

    pub fn write_uniforms(
        &self,
        queue: &wgpu::Queue,
        screen_to_view: &ScreenToView,
        transforms: &TransformUniform,
    ) -> Result<(), BufferError> {
        self.screen_to_view.write_one(queue, screen_to_view)?;
        self.transforms.write_one(queue, transforms)
    }

    /// Uploads the result of a CPU assigner.
    pub fn upload_light_lists(&mut self, queue: &wgpu::Queue, lists: &ClusterLightLists) -> Result<(), BufferError> {
        self.light_grid.write(queue, 0, lists.grid())?;
        lists.indices().copy_used_into(&mut self.index_scratch);
        self.light_indices.write(queue, 0, &self.index_scratch)
    }

    pub fn shading_bind_group(&self) -> &wgpu::BindGroup {
        &self.shading_bind_group
    }

    pub fn culling_bind_group(&self) -> &wgpu::BindGroup {
        &self.culling_bind_group
    }

    pub fn index_counter(&self) -> &wgpu::Buffer {
        self.index_counter.buffer()
    }
}
