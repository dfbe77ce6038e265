use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::cluster::ClusterGridParams;

/// Everything the culling and shading shaders need to map between screen,
/// view space and clusters. Mirrors `ScreenToView` in both WGSL files.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct ScreenToView {
    pub inverse_projection: [[f32; 4]; 4],
    pub view_matrix: [[f32; 4]; 4],
    pub tile_sizes: [u32; 4],
    /// Nx, Ny, Nz, cluster count.
    pub grid_dims: [u32; 4],
    /// Light count, per-cluster capacity, index list capacity, unused.
    pub culling: [u32; 4],
    pub screen_dimensions: [u32; 2],
    pub z_near: f32,
    pub z_far: f32,
}

pub struct CullingLimits {
    pub light_count: u32,
    pub max_lights_per_cluster: u32,
    pub index_capacity: u32,
}

impl ScreenToView {
    pub fn new(params: &ClusterGridParams, inverse_projection: Mat4, view: Mat4, limits: &CullingLimits) -> Self {
        Self {
            inverse_projection: inverse_projection.to_cols_array_2d(),
            view_matrix: view.to_cols_array_2d(),
            tile_sizes: [params.tile_size.x, params.tile_size.y, 0, 0],
            grid_dims: [params.dims.x, params.dims.y, params.dims.z, params.cluster_count()],
            culling: [
                limits.light_count,
                limits.max_lights_per_cluster,
                limits.index_capacity,
                0,
            ],
            screen_dimensions: params.screen.to_array(),
            z_near: params.z_near,
            z_far: params.z_far,
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct TransformUniform {
    pub view_proj: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub camera_position: [f32; 4],
    pub light_count: u32,
    /// Non-zero: iterate the fragment's cluster list. Zero: iterate every light.
    pub clustered: u32,
    pub _padding: [u32; 2],
}

impl TransformUniform {
    pub fn new(view_proj: Mat4, view: Mat4, camera_position: Vec3, light_count: u32, clustered: bool) -> Self {
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            view: view.to_cols_array_2d(),
            camera_position: camera_position.extend(1.0).to_array(),
            light_count,
            clustered: clustered as u32,
            _padding: [0; 2],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{UVec2, UVec3};

    #[test]
    fn layouts_match_shaders() {
        assert_eq!(std::mem::size_of::<ScreenToView>(), 192);
        assert_eq!(std::mem::size_of::<TransformUniform>(), 160);
        // Uniform buffers bind in 16-byte multiples.
        assert_eq!(std::mem::size_of::<ScreenToView>() % 16, 0);
        assert_eq!(std::mem::size_of::<TransformUniform>() % 16, 0);
    }

    #[test]
    fn screen_to_view_packs_grid() {
        let params = ClusterGridParams::new(UVec2::new(1280, 720), UVec3::new(16, 9, 24), 0.1, 1000.0).unwrap();
        let limits = CullingLimits {
            light_count: 3,
            max_lights_per_cluster: 100,
            index_capacity: 5000,
        };
        let stv = ScreenToView::new(&params, Mat4::IDENTITY, Mat4::IDENTITY, &limits);
        assert_eq!(stv.grid_dims, [16, 9, 24, 3456]);
        assert_eq!(stv.tile_sizes[..2], [80, 80]);
        assert_eq!(stv.culling, [3, 100, 5000, 0]);
        assert_eq!(stv.screen_dimensions, [1280, 720]);
    }
}
