use std::mem;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use super::buffer::{BufferError, GpuBuffer};

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct MeshUniform {
    pub model: [[f32; 4]; 4],
    // Transpose(Inverse(Model)): keeps normals perpendicular under non-uniform scale.
    pub normal_matrix: [[f32; 4]; 4],
    pub base_color: [f32; 4],
}

impl MeshUniform {
    pub fn from_transform(model: Mat4, base_color: Vec4) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            normal_matrix: model.inverse().transpose().to_cols_array_2d(),
            base_color: base_color.to_array(),
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0, // @location(0) in shader
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: (mem::size_of::<[f32; 3]>() * 2) as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}

/// CPU-side indexed triangle list, counter-clockwise front faces.
#[derive(Clone, Debug, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Square in the XZ plane, facing +Y.
    pub fn plane(size: f32) -> Self {
        let mut mesh = Self::default();
        mesh.push_quad(Vec3::ZERO, Vec3::Y, Vec3::Z * size * 0.5, Vec3::X * size * 0.5);
        mesh
    }

    /// Axis-aligned cube centered on the origin.
    pub fn cube(size: f32) -> Self {
        let h = size * 0.5;
        // (normal, u, v) with u x v == normal.
        let faces = [
            (Vec3::X, Vec3::Y, Vec3::Z),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::Z, Vec3::X),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::Y, Vec3::X),
        ];
        let mut mesh = Self::default();
        for (normal, u, v) in faces {
            mesh.push_quad(normal * h, normal, u * h, v * h);
        }
        mesh
    }

    fn push_quad(&mut self, center: Vec3, normal: Vec3, u: Vec3, v: Vec3) {
        let base = self.vertices.len() as u32;
        let corners = [
            (center - u - v, [0.0, 0.0]),
            (center + u - v, [1.0, 0.0]),
            (center + u + v, [1.0, 1.0]),
            (center - u + v, [0.0, 1.0]),
        ];
        self.vertices
            .extend(corners.into_iter().map(|(position, uv)| Vertex {
                position: position.to_array(),
                normal: normal.to_array(),
                uv,
            }));
        self.indices
            .extend([base, base + 1, base + 2, base, base + 2, base + 3]);
    }
}

/// Uploaded geometry plus its per-object uniform and bind group (group 1).
pub struct GpuMesh {
    vertex_buffer: GpuBuffer<Vertex>,
    index_buffer: GpuBuffer<u32>,
    index_count: u32,
    uniform: GpuBuffer<MeshUniform>,
    bind_group: wgpu::BindGroup,
}

impl GpuMesh {
    pub fn new(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        data: &MeshData,
        transform: Mat4,
        base_color: Vec4,
    ) -> Self {
        let vertex_buffer = GpuBuffer::with_data(
            device,
            "Mesh Vertex Buffer",
            &data.vertices,
            wgpu::BufferUsages::VERTEX,
        );
        let index_buffer = GpuBuffer::with_data(
            device,
            "Mesh Index Buffer",
            &data.indices,
            wgpu::BufferUsages::INDEX,
        );
        let uniform = GpuBuffer::with_data(
            device,
            "Mesh Uniform Buffer",
            &[MeshUniform::from_transform(transform, base_color)],
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        );
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Mesh Bind Group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform.as_entire_binding(),
            }],
        });

        Self {
            vertex_buffer,
            index_buffer,
            index_count: data.indices.len() as u32,
            uniform,
            bind_group,
        }
    }

    pub fn set_transform(
        &self,
        queue: &wgpu::Queue,
        transform: Mat4,
        base_color: Vec4,
    ) -> Result<(), BufferError> {
        self.uniform
            .write_one(queue, &MeshUniform::from_transform(transform, base_color))
    }

    pub fn record<'a>(&'a self, rpass: &mut wgpu::RenderPass<'a>) {
        if self.index_count == 0 {
            return;
        }
        rpass.set_bind_group(1, &self.bind_group, &[]);
        rpass.set_vertex_buffer(0, self.vertex_buffer.buffer().slice(..));
        rpass.set_index_buffer(self.index_buffer.buffer().slice(..), wgpu::IndexFormat::Uint32);
        rpass.draw_indexed(0..self.index_count, 0, 0..1);
    }
}
