use glam::{UVec2, UVec3, Vec2};
use lumen_core::ProjectionKey;

use super::ClusterError;

/// Resolution and depth distribution of the cluster grid.
///
/// X/Y split the screen into pixel tiles, Z splits `[near, far]` into slices
/// whose depth grows exponentially. The same parameters drive both the
/// partitioner and the fragment-side lookup; [`ClusterGridParams::cluster_for_fragment`]
/// mirrors `cluster_index` in `clustered_forward.wgsl`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClusterGridParams {
    pub dims: UVec3,
    pub tile_size: UVec2,
    pub screen: UVec2,
    pub z_near: f32,
    pub z_far: f32,
}

impl ClusterGridParams {
    /// Fixed tile counts; tile size is `ceil(screen / tiles)`.
    pub fn new(
        screen: UVec2,
        dims: UVec3,
        z_near: f32,
        z_far: f32,
    ) -> Result<Self, ClusterError> {
        if dims.min_element() == 0 {
            return Err(ClusterError::EmptyGrid(dims));
        }
        if screen.min_element() == 0 {
            return Err(ClusterError::EmptyScreen(screen));
        }
        if !(z_near > 0.0 && z_far > z_near) {
            return Err(ClusterError::InvalidDepthRange { z_near, z_far });
        }
        let dims = Self::clamp_dims(screen, dims);
        let tile_size = UVec2::new(screen.x.div_ceil(dims.x), screen.y.div_ceil(dims.y));

        Ok(Self {
            dims,
            tile_size,
            screen,
            z_near,
            z_far,
        })
    }

    /// Fixed pixel tile size; tile counts are derived from the screen.
    pub fn from_tile_size(
        screen: UVec2,
        tile_size: UVec2,
        depth_slices: u32,
        z_near: f32,
        z_far: f32,
    ) -> Result<Self, ClusterError> {
        if tile_size.min_element() == 0 {
            return Err(ClusterError::EmptyGrid(tile_size.extend(depth_slices)));
        }
        let dims = UVec3::new(
            screen.x.div_ceil(tile_size.x),
            screen.y.div_ceil(tile_size.y),
            depth_slices,
        );
        Self::new(screen, dims, z_near, z_far)
    }

    /// Tile counts actually used for `screen`: at most one tile per pixel, and
    /// recounted from the rounded-up tile size so the last column and row
    /// still start on screen.
    pub fn clamp_dims(screen: UVec2, dims: UVec3) -> UVec3 {
        let screen = screen.max(UVec2::ONE);
        let tiles = dims.truncate().clamp(UVec2::ONE, screen);
        let tile_size = UVec2::new(screen.x.div_ceil(tiles.x), screen.y.div_ceil(tiles.y));
        UVec3::new(
            screen.x.div_ceil(tile_size.x),
            screen.y.div_ceil(tile_size.y),
            dims.z,
        )
    }

    pub fn for_projection(key: &ProjectionKey, dims: UVec3) -> Result<Self, ClusterError> {
        Self::new(UVec2::new(key.width, key.height), dims, key.near, key.far)
    }

    pub fn cluster_count(&self) -> u32 {
        self.dims.x * self.dims.y * self.dims.z
    }

    pub fn linear_index(&self, x: u32, y: u32, z: u32) -> u32 {
        x + y * self.dims.x + z * self.dims.x * self.dims.y
    }

    /// Inverse of [`ClusterGridParams::linear_index`].
    pub fn coords(&self, index: u32) -> UVec3 {
        let per_slice = self.dims.x * self.dims.y;
        UVec3::new(
            index % self.dims.x,
            (index % per_slice) / self.dims.x,
            index / per_slice,
        )
    }

    /// View-space Z (negative, the camera looks down -Z) of the near plane of
    /// slice `z`. `slice_depth(z + 1)` is the far plane of slice `z`.
    pub fn slice_depth(&self, z: u32) -> f32 {
        let exponent = z as f32 / self.dims.z as f32;
        -self.z_near * (self.z_far / self.z_near).powf(exponent)
    }

    /// Depth slice containing view-space `view_z`, clamped to the grid.
    pub fn slice_for_depth(&self, view_z: f32) -> u32 {
        let depth = (-view_z).max(self.z_near);
        let scale = self.dims.z as f32 / (self.z_far / self.z_near).ln();
        let slice = ((depth / self.z_near).ln() * scale).floor();
        (slice.max(0.0) as u32).min(self.dims.z - 1)
    }

    /// Screen tile containing pixel position `frag` (origin top-left).
    pub fn tile_for_pixel(&self, frag: Vec2) -> UVec2 {
        let tile = (frag.max(Vec2::ZERO) / self.tile_size.as_vec2()).floor().as_uvec2();
        tile.min(self.dims.truncate() - UVec2::ONE)
    }

    /// Linear cluster id for a fragment at pixel `frag` with view-space depth `view_z`.
    pub fn cluster_for_fragment(&self, frag: Vec2, view_z: f32) -> u32 {
        let tile = self.tile_for_pixel(frag);
        self.linear_index(tile.x, tile.y, self.slice_for_depth(view_z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grid() -> ClusterGridParams {
        ClusterGridParams::new(UVec2::new(1280, 720), UVec3::new(16, 9, 24), 0.1, 10_000.0).unwrap()
    }

    #[test]
    fn tile_size_covers_the_screen() {
        let grid = grid();
        assert_eq!(grid.tile_size, UVec2::new(80, 80));
        assert_eq!(grid.cluster_count(), 16 * 9 * 24);

        let odd = ClusterGridParams::new(UVec2::new(1000, 700), UVec3::new(16, 9, 4), 0.1, 10.0).unwrap();
        assert!(odd.tile_size.x * odd.dims.x >= 1000);
        assert!(odd.tile_size.y * odd.dims.y >= 700);
    }

    #[test]
    fn tiny_screens_shrink_the_grid() {
        let grid = ClusterGridParams::new(UVec2::new(4, 2), UVec3::new(16, 9, 4), 0.1, 10.0).unwrap();
        assert_eq!(grid.dims, UVec3::new(4, 2, 4));
        assert_eq!(grid.tile_size, UVec2::ONE);
    }

    #[test]
    fn every_tile_starts_on_screen() {
        // 17 px over 16 tiles rounds up to 2 px tiles; only 9 columns fit.
        let narrow = ClusterGridParams::new(UVec2::new(17, 720), UVec3::new(16, 9, 4), 0.1, 10.0).unwrap();
        assert_eq!(narrow.tile_size.x, 2);
        assert_eq!(narrow.dims.x, 9);

        for width in 1..200 {
            for tiles in 1..40 {
                let screen = UVec2::new(width, 100);
                let dims = ClusterGridParams::clamp_dims(screen, UVec3::new(tiles, 4, 1));
                let grid = ClusterGridParams::new(screen, UVec3::new(tiles, 4, 1), 0.1, 10.0).unwrap();
                assert_eq!(grid.dims, dims);
                assert!((grid.dims.x - 1) * grid.tile_size.x < width, "{width} px / {tiles}");
                assert!(grid.dims.x * grid.tile_size.x >= width, "{width} px / {tiles}");
            }
        }
    }

    #[test]
    fn from_tile_size_derives_counts() {
        let grid = ClusterGridParams::from_tile_size(
            UVec2::new(1920, 1080),
            UVec2::new(64, 64),
            16,
            0.1,
            500.0,
        )
        .unwrap();
        assert_eq!(grid.dims, UVec3::new(30, 17, 16));
    }

    #[test]
    fn rejects_degenerate_inputs() {
        let screen = UVec2::new(100, 100);
        assert!(ClusterGridParams::new(screen, UVec3::new(0, 1, 1), 0.1, 1.0).is_err());
        assert!(ClusterGridParams::new(UVec2::ZERO, UVec3::ONE, 0.1, 1.0).is_err());
        assert!(ClusterGridParams::new(screen, UVec3::ONE, 1.0, 1.0).is_err());
        assert!(ClusterGridParams::new(screen, UVec3::ONE, 0.0, 1.0).is_err());
    }

    #[test]
    fn linear_index_round_trips() {
        let grid = grid();
        for index in [0, 1, 15, 16, 143, 144, 3455] {
            let c = grid.coords(index);
            assert_eq!(grid.linear_index(c.x, c.y, c.z), index);
        }
    }

    #[test]
    fn slices_span_near_to_far() {
        let grid = grid();
        assert_relative_eq!(grid.slice_depth(0), -0.1, epsilon = 1e-6);
        assert_relative_eq!(grid.slice_depth(24), -10_000.0, max_relative = 1e-5);
    }

    #[test]
    fn slice_lookup_inverts_slice_depth() {
        let grid = grid();
        for z in 0..grid.dims.z {
            let near = grid.slice_depth(z);
            let far = grid.slice_depth(z + 1);
            // Geometric midpoint is safely inside an exponential slice.
            let mid = -(near * far).sqrt();
            assert_eq!(grid.slice_for_depth(mid), z, "slice {z}");
        }
    }

    #[test]
    fn lookup_clamps_outside_the_frustum() {
        let grid = grid();
        assert_eq!(grid.slice_for_depth(-0.01), 0);
        assert_eq!(grid.slice_for_depth(-1e9), grid.dims.z - 1);
        assert_eq!(grid.tile_for_pixel(Vec2::new(5000.0, 5000.0)), UVec2::new(15, 8));
        assert_eq!(grid.tile_for_pixel(Vec2::new(-3.0, 79.9)), UVec2::new(0, 0));
    }

    #[test]
    fn fragment_lookup_combines_tile_and_slice() {
        let grid = grid();
        let view_z = -(grid.slice_depth(3) * grid.slice_depth(4)).sqrt();
        let id = grid.cluster_for_fragment(Vec2::new(165.0, 90.0), view_z);
        assert_eq!(grid.coords(id), UVec3::new(2, 1, 3));
    }
}
