use bytemuck::{Pod, Zeroable};
use glam::{Mat4, UVec2, UVec3, Vec2, Vec3, Vec4};
use lumen_core::{Camera, ProjectionKey};
use rayon::prelude::*;

use super::{ClusterError, ClusterGridParams};

/// View-space bounding box of one cluster.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClusterAabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl ClusterAabb {
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }
}

/// Shader-side AABB (`ClusterAabb` in `cluster_cull.wgsl`), padded to two vec4s.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuClusterAabb {
    pub min_point: [f32; 4],
    pub max_point: [f32; 4],
}

impl From<&ClusterAabb> for GpuClusterAabb {
    fn from(aabb: &ClusterAabb) -> Self {
        Self {
            min_point: aabb.min.extend(0.0).to_array(),
            max_point: aabb.max.extend(0.0).to_array(),
        }
    }
}

/// Point where the line through `a` and `b` crosses the plane `z = z_distance`.
pub fn line_intersection_to_z_plane(a: Vec3, b: Vec3, z_distance: f32) -> Vec3 {
    let ab = b - a;
    let t = (z_distance - a.z) / ab.z;
    a + t * ab
}

/// Unprojects a pixel (origin top-left, y down) onto the near plane in view space.
pub fn screen_to_view(pixel: Vec2, screen: UVec2, inverse_projection: &Mat4) -> Vec3 {
    let uv = pixel / screen.as_vec2();
    let ndc = Vec4::new(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0, 0.0, 1.0);
    let view = *inverse_projection * ndc;
    view.truncate() / view.w
}

/// Builds the AABB of every cluster, indexed by [`ClusterGridParams::linear_index`].
pub fn compute_cluster_bounds(
    params: &ClusterGridParams,
    projection: &Mat4,
) -> Result<Vec<ClusterAabb>, ClusterError> {
    // A perspective matrix copies -z into w; an orthographic one keeps w = 1.
    if projection.w_axis.w != 0.0 || projection.z_axis.w == 0.0 {
        return Err(ClusterError::NotPerspective);
    }
    let inverse_projection = projection.inverse();

    let tiles = params.dims.x * params.dims.y;
    let screen = params.screen;
    let tile_corners: Vec<[Vec3; 4]> = (0..tiles)
        .map(|tile| {
            let x = tile % params.dims.x;
            let y = tile / params.dims.x;
            let min = (UVec2::new(x, y) * params.tile_size).min(screen).as_vec2();
            let max = (UVec2::new(x + 1, y + 1) * params.tile_size).min(screen).as_vec2();
            [
                Vec2::new(min.x, min.y),
                Vec2::new(max.x, min.y),
                Vec2::new(min.x, max.y),
                Vec2::new(max.x, max.y),
            ]
            .map(|corner| screen_to_view(corner, screen, &inverse_projection))
        })
        .collect();

    let bounds = (0..params.cluster_count())
        .into_par_iter()
        .map(|index| {
            let coords = params.coords(index);
            let tile_near = params.slice_depth(coords.z);
            let tile_far = params.slice_depth(coords.z + 1);

            let mut min = Vec3::splat(f32::MAX);
            let mut max = Vec3::splat(f32::MIN);
            for corner in tile_corners[(coords.x + coords.y * params.dims.x) as usize] {
                // Eye is at the view-space origin.
                for plane in [tile_near, tile_far] {
                    let point = line_intersection_to_z_plane(Vec3::ZERO, corner, plane);
                    min = min.min(point);
                    max = max.max(point);
                }
            }
            ClusterAabb { min, max }
        })
        .collect();

    Ok(bounds)
}

/// Caches cluster bounds against the camera's projection.
///
/// Bounds depend only on the projection and the grid, so they are rebuilt when
/// either changes and reused otherwise. `generation` increments on every
/// rebuild, letting GPU copies refresh exactly when needed.
#[derive(Debug)]
pub struct FrustumPartitioner {
    dims: UVec3,
    key: Option<ProjectionKey>,
    params: Option<ClusterGridParams>,
    bounds: Vec<ClusterAabb>,
    generation: u64,
}

impl FrustumPartitioner {
    pub fn new(dims: UVec3) -> Self {
        Self {
            dims,
            key: None,
            params: None,
            bounds: Vec::new(),
            generation: 0,
        }
    }

    /// Rebuilds the bounds if the camera's projection changed since the last
    /// call. Returns whether a rebuild happened.
    pub fn update(&mut self, camera: &Camera) -> Result<bool, ClusterError> {
        let key = camera.projection_key();
        if self.key == Some(key) {
            return Ok(false);
        }

        let params = ClusterGridParams::for_projection(&key, self.dims)?;
        self.bounds = compute_cluster_bounds(&params, &camera.projection_matrix())?;
        self.params = Some(params);
        self.key = Some(key);
        self.generation += 1;

        log::debug!(
            "Partitioned frustum into {}x{}x{} clusters (tile {}x{} px, generation {})",
            params.dims.x,
            params.dims.y,
            params.dims.z,
            params.tile_size.x,
            params.tile_size.y,
            self.generation
        );
        Ok(true)
    }

    /// Forces a rebuild on the next [`FrustumPartitioner::update`].
    pub fn invalidate(&mut self) {
        self.key = None;
    }

    pub fn set_dims(&mut self, dims: UVec3) {
        if dims != self.dims {
            self.dims = dims;
            self.invalidate();
        }
    }

    pub fn params(&self) -> Option<&ClusterGridParams> {
        self.params.as_ref()
    }

    pub fn bounds(&self) -> &[ClusterAabb] {
        &self.bounds
    }

    pub fn gpu_bounds(&self) -> Vec<GpuClusterAabb> {
        self.bounds.iter().map(GpuClusterAabb::from).collect()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}
