use glam::{Mat4, Vec3};
use rayon::prelude::*;

use super::{ClusterAabb, ClusterError, ClusterLightLists, LightGridEntry, LightIndexList};
use crate::light::GpuPointLight;

/// Squared distance from `point` to the closest point of `aabb`; zero inside.
pub fn sq_dist_point_aabb(point: Vec3, aabb: &ClusterAabb) -> f32 {
    let closest = point.clamp(aabb.min, aabb.max);
    point.distance_squared(closest)
}

/// Bounded list of the lights visible from one cluster.
#[derive(Debug)]
pub struct LocalLightList {
    lights: Vec<u32>,
    capacity: u32,
}

impl LocalLightList {
    pub fn new(capacity: u32) -> Self {
        Self {
            lights: Vec::with_capacity(capacity as usize),
            capacity,
        }
    }

    pub fn push(&mut self, light: u32) -> Result<(), ClusterError> {
        if self.lights.len() as u32 >= self.capacity {
            return Err(ClusterError::LocalListFull {
                capacity: self.capacity,
            });
        }
        self.lights.push(light);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.lights.clear();
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.lights
    }

    pub fn len(&self) -> u32 {
        self.lights.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }
}

/// Everything light assignment reads. All of it stays immutable while clusters run.
#[derive(Clone, Copy, Debug)]
pub struct CullingInput<'a> {
    pub view: Mat4,
    pub lights: &'a [GpuPointLight],
    pub bounds: &'a [ClusterAabb],
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CullingReport {
    pub clusters: u32,
    /// Enabled lights considered.
    pub lights: u32,
    /// Entries written to the index list.
    pub total_indices: u32,
    /// Clusters whose local list filled up and dropped lights.
    pub truncated_clusters: u32,
    /// The shared index list ran out of space.
    pub index_overflow: bool,
}

impl CullingReport {
    pub fn is_degraded(&self) -> bool {
        self.truncated_clusters > 0 || self.index_overflow
    }
}

/// Computes per-cluster light lists.
///
/// Implementations must agree on the light *set* of every cluster; the order
/// of regions inside the index list is unspecified.
pub trait ClusterAssigner: Send + Sync {
    fn name(&self) -> &'static str;

    fn assign(
        &self,
        input: &CullingInput,
        out: &mut ClusterLightLists,
    ) -> Result<CullingReport, ClusterError>;
}

#[derive(Clone, Copy)]
struct ViewLight {
    index: u32,
    center: Vec3,
    radius_sq: f32,
}

/// Enabled lights moved into view space, keeping their registry index.
fn view_space_lights(view: Mat4, lights: &[GpuPointLight]) -> Vec<ViewLight> {
    lights
        .iter()
        .enumerate()
        .filter(|(_, light)| light.is_enabled())
        .map(|(index, light)| ViewLight {
            index: index as u32,
            center: view.transform_point3(light.center()),
            radius_sq: light.radius * light.radius,
        })
        .collect()
}

/// Culls one cluster and publishes its list. Returns whether lights were dropped.
fn assign_cluster(
    aabb: &ClusterAabb,
    lights: &[ViewLight],
    local: &mut LocalLightList,
    indices: &LightIndexList,
    entry: &mut LightGridEntry,
) -> bool {
    local.clear();
    let mut truncated = false;
    for light in lights {
        if sq_dist_point_aabb(light.center, aabb) <= light.radius_sq
            && local.push(light.index).is_err()
        {
            truncated = true;
            break;
        }
    }

    let (offset, stored) = indices.reserve(local.len());
    indices.write(offset, &local.as_slice()[..stored as usize]);
    *entry = LightGridEntry {
        offset,
        count: stored,
    };
    truncated
}

fn prepare<'a>(
    input: &CullingInput,
    out: &'a mut ClusterLightLists,
) -> Result<(Vec<ViewLight>, &'a mut [LightGridEntry], &'a LightIndexList), ClusterError> {
    let expected = input.bounds.len() as u32;
    if out.cluster_count() != expected {
        return Err(ClusterError::ClusterCountMismatch {
            expected,
            actual: out.cluster_count(),
        });
    }
    // Counter goes back to zero before any cluster reserves.
    out.reset();
    let lights = view_space_lights(input.view, input.lights);
    let (grid, indices) = out.split_mut();
    Ok((lights, grid, indices))
}

fn report(input: &CullingInput, lights: usize, indices: &LightIndexList, truncated: u32) -> CullingReport {
    CullingReport {
        clusters: input.bounds.len() as u32,
        lights: lights as u32,
        total_indices: indices.used(),
        truncated_clusters: truncated,
        index_overflow: indices.overflowed(),
    }
}

/// Single-threaded reference assigner.
#[derive(Debug)]
pub struct SerialAssigner {
    max_lights_per_cluster: u32,
}

impl SerialAssigner {
    pub fn new(max_lights_per_cluster: u32) -> Self {
        Self {
            max_lights_per_cluster,
        }
    }
}

impl ClusterAssigner for SerialAssigner {
    fn name(&self) -> &'static str {
        "cpu-serial"
    }

    fn assign(
        &self,
        input: &CullingInput,
        out: &mut ClusterLightLists,
    ) -> Result<CullingReport, ClusterError> {
        let (lights, grid, indices) = prepare(input, out)?;
        let mut local = LocalLightList::new(self.max_lights_per_cluster);

        let mut truncated = 0;
        for (entry, aabb) in grid.iter_mut().zip(input.bounds) {
            truncated += assign_cluster(aabb, &lights, &mut local, indices, entry) as u32;
        }

        Ok(report(input, lights.len(), indices, truncated))
    }
}

/// Rayon assigner: one task per cluster on a dedicated pool.
pub struct ParallelAssigner {
    pool: rayon::ThreadPool,
    max_lights_per_cluster: u32,
}

impl ParallelAssigner {
    /// `threads == 0` lets rayon pick the thread count.
    pub fn new(threads: usize, max_lights_per_cluster: u32) -> Result<Self, ClusterError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("lumen-cull-{i}"))
            .build()
            .map_err(|e| ClusterError::ThreadPool(e.to_string()))?;
        log::info!(
            "Culling pool ready with {} threads",
            pool.current_num_threads()
        );
        Ok(Self {
            pool,
            max_lights_per_cluster,
        })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl ClusterAssigner for ParallelAssigner {
    fn name(&self) -> &'static str {
        "cpu-parallel"
    }

    fn assign(
        &self,
        input: &CullingInput,
        out: &mut ClusterLightLists,
    ) -> Result<CullingReport, ClusterError> {
        let (lights, grid, indices) = prepare(input, out)?;
        let capacity = self.max_lights_per_cluster;

        let truncated = self.pool.install(|| {
            grid.par_iter_mut()
                .zip(input.bounds.par_iter())
                .map_init(
                    || LocalLightList::new(capacity),
                    |local, (entry, aabb)| {
                        assign_cluster(aabb, &lights, local, indices, entry) as u32
                    },
                )
                .sum::<u32>()
        });

        Ok(report(input, lights.len(), indices, truncated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{ClusterGridParams, partition::compute_cluster_bounds};
    use crate::light::PointLight;
    use glam::{UVec2, UVec3};
    use lumen_core::Camera;

    struct Scene {
        camera: Camera,
        bounds: Vec<ClusterAabb>,
        lights: Vec<GpuPointLight>,
    }

    /// Deterministic pseudo-random lights spread in front of the camera.
    fn scene(light_count: u32) -> Scene {
        let camera = Camera::new(320, 180)
            .unwrap()
            .with_clip_planes(0.1, 200.0)
            .unwrap()
            .looking_at(Vec3::new(0.0, 10.0, 40.0), Vec3::ZERO);
        let params = ClusterGridParams::new(UVec2::new(320, 180), UVec3::new(8, 4, 12), 0.1, 200.0).unwrap();
        let bounds = compute_cluster_bounds(&params, &camera.projection_matrix()).unwrap();

        let mut seed = 0x2545_f491_u32;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            (seed % 10_000) as f32 / 10_000.0
        };
        let lights = (0..light_count)
            .map(|_| {
                let position = Vec3::new(next() * 80.0 - 40.0, next() * 20.0, next() * 80.0 - 60.0);
                GpuPointLight::from(&PointLight::new(position, 1.0 + next() * 12.0))
            })
            .collect();

        Scene {
            camera,
            bounds,
            lights,
        }
    }

    fn input(scene: &Scene) -> CullingInput<'_> {
        CullingInput {
            view: scene.camera.view_matrix(),
            lights: &scene.lights,
            bounds: &scene.bounds,
        }
    }

    fn lists_for(scene: &Scene, index_capacity: u32) -> ClusterLightLists {
        ClusterLightLists::new(scene.bounds.len() as u32, index_capacity)
    }

    fn assert_regions_disjoint(lists: &ClusterLightLists) {
        let mut regions: Vec<_> = lists.grid().iter().filter(|e| e.count > 0).collect();
        regions.sort_by_key(|e| e.offset);
        for pair in regions.windows(2) {
            assert!(pair[0].offset + pair[0].count <= pair[1].offset);
        }
        for entry in &regions {
            assert!(entry.offset + entry.count <= lists.indices().capacity());
        }
    }

    #[test]
    fn closest_point_distance() {
        let aabb = ClusterAabb {
            min: Vec3::ZERO,
            max: Vec3::splat(10.0),
        };
        assert_eq!(sq_dist_point_aabb(Vec3::splat(5.0), &aabb), 0.0);
        assert_eq!(sq_dist_point_aabb(Vec3::new(12.0, 5.0, 5.0), &aabb), 4.0);
        assert_eq!(sq_dist_point_aabb(Vec3::splat(11.0), &aabb), 3.0);
        assert_eq!(sq_dist_point_aabb(Vec3::new(-1.0, -2.0, 5.0), &aabb), 5.0);
    }

    #[test]
    fn local_list_reports_overflow() {
        let mut local = LocalLightList::new(2);
        local.push(1).unwrap();
        local.push(2).unwrap();
        assert_eq!(
            local.push(3).unwrap_err(),
            ClusterError::LocalListFull { capacity: 2 }
        );
        assert_eq!(local.as_slice(), &[1, 2]);
    }

    #[test]
    fn membership_matches_exhaustive_sphere_test() {
        let scene = scene(64);
        let input = input(&scene);
        let mut lists = lists_for(&scene, 64 * scene.bounds.len() as u32);
        let report = SerialAssigner::new(64).assign(&input, &mut lists).unwrap();
        assert!(!report.is_degraded());
        assert!(report.total_indices > 0);

        for (cluster, aabb) in scene.bounds.iter().enumerate() {
            let set = lists.light_set(cluster as u32);
            for (index, light) in scene.lights.iter().enumerate() {
                let center = input.view.transform_point3(light.center());
                let visible = sq_dist_point_aabb(center, aabb) <= light.radius * light.radius;
                assert_eq!(
                    set.binary_search(&(index as u32)).is_ok(),
                    visible,
                    "cluster {cluster}, light {index}"
                );
            }
        }
    }

    #[test]
    fn serial_and_parallel_agree_on_sets() {
        let scene = scene(100);
        let input = input(&scene);
        let capacity = 100 * scene.bounds.len() as u32;

        let mut serial = lists_for(&scene, capacity);
        let mut parallel = lists_for(&scene, capacity);
        let a = SerialAssigner::new(100).assign(&input, &mut serial).unwrap();
        let b = ParallelAssigner::new(4, 100)
            .unwrap()
            .assign(&input, &mut parallel)
            .unwrap();

        assert_eq!(a, b);
        for cluster in 0..serial.cluster_count() {
            assert_eq!(serial.light_set(cluster), parallel.light_set(cluster));
        }
        assert_regions_disjoint(&parallel);
    }

    #[test]
    fn repeated_runs_are_idempotent() {
        let scene = scene(32);
        let input = input(&scene);
        let assigner = ParallelAssigner::new(0, 32).unwrap();
        let mut lists = lists_for(&scene, 32 * scene.bounds.len() as u32);

        assigner.assign(&input, &mut lists).unwrap();
        let first: Vec<_> = (0..lists.cluster_count()).map(|c| lists.light_set(c)).collect();
        let report = assigner.assign(&input, &mut lists).unwrap();
        let second: Vec<_> = (0..lists.cluster_count()).map(|c| lists.light_set(c)).collect();

        assert_eq!(first, second);
        assert_eq!(report.total_indices, lists.indices().used());
    }

    #[test]
    fn disabled_lights_are_never_assigned() {
        let mut scene = scene(16);
        for light in scene.lights.iter_mut().step_by(2) {
            light.enabled = 0;
        }
        let input = input(&scene);
        let mut lists = lists_for(&scene, 16 * scene.bounds.len() as u32);
        let report = SerialAssigner::new(16).assign(&input, &mut lists).unwrap();

        assert_eq!(report.lights, 8);
        for cluster in 0..lists.cluster_count() {
            assert!(lists.cluster_lights(cluster).iter().all(|i| i % 2 == 1));
        }
    }

    #[test]
    fn full_local_list_truncates_without_touching_neighbours() {
        // Every light covers the whole frustum.
        let mut scene = scene(10);
        for light in &mut scene.lights {
            light.radius = 10_000.0;
        }
        let input = input(&scene);
        let mut lists = lists_for(&scene, 10 * scene.bounds.len() as u32);
        let report = ParallelAssigner::new(2, 3)
            .unwrap()
            .assign(&input, &mut lists)
            .unwrap();

        assert_eq!(report.truncated_clusters, report.clusters);
        assert!(!report.index_overflow);
        for entry in lists.grid() {
            assert_eq!(entry.count, 3);
        }
        assert_eq!(report.total_indices, 3 * report.clusters);
        assert_regions_disjoint(&lists);
    }

    #[test]
    fn exhausted_index_list_is_reported() {
        let mut scene = scene(4);
        for light in &mut scene.lights {
            light.radius = 10_000.0;
        }
        let input = input(&scene);
        let mut lists = lists_for(&scene, 25);
        let report = SerialAssigner::new(4).assign(&input, &mut lists).unwrap();

        assert!(report.index_overflow);
        assert!(report.is_degraded());
        assert_eq!(report.total_indices, 25);
        let stored: u32 = lists.grid().iter().map(|e| e.count).sum();
        assert_eq!(stored, 25);
        assert_regions_disjoint(&lists);
    }

    #[test]
    fn mismatched_output_is_rejected() {
        let scene = scene(1);
        let mut lists = ClusterLightLists::new(3, 8);
        let err = SerialAssigner::new(4)
            .assign(&input(&scene), &mut lists)
            .unwrap_err();
        assert!(matches!(err, ClusterError::ClusterCountMismatch { .. }));
    }
}
