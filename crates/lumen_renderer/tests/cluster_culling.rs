use glam::{UVec3, Vec2, Vec3};
use lumen_core::Camera;
use lumen_renderer::cluster::{
    ClusterAssigner, ClusterLightLists, CullingInput, FrustumPartitioner, ParallelAssigner,
    SerialAssigner, sq_dist_point_aabb,
};
use lumen_renderer::{LightRegistry, LightRegistryError, PointLight};

const DIMS: UVec3 = UVec3::new(16, 9, 24);

fn scene_camera() -> Camera {
    Camera::new(1280, 720)
        .unwrap()
        .looking_at(Vec3::new(1027.0, 183.0, 46.0), Vec3::new(-96.0, 155.0, -14.0))
        .with_clip_planes(0.1, 10_000.0)
        .unwrap()
        .with_fov(45f32.to_radians())
        .unwrap()
}

fn partition(camera: &Camera) -> FrustumPartitioner {
    let mut partitioner = FrustumPartitioner::new(DIMS);
    assert!(partitioner.update(camera).unwrap());
    partitioner
}

fn lattice(count: u32) -> Vec<PointLight> {
    (0..count)
        .map(|i| {
            let (x, y, z) = (i / 4, i % 2, (i / 2) % 2);
            PointLight::new(
                Vec3::new(
                    -1200.0 + 800.0 * x as f32,
                    100.0 + 400.0 * y as f32,
                    -250.0 + 500.0 * z as f32,
                ),
                1000.0,
            )
            .with_intensities(0.1, 1.0, 0.2)
            .with_attenuation(1.0, 0.0, 1e-5)
        })
        .collect()
}

fn registry(lights: &[PointLight]) -> LightRegistry {
    let mut registry = LightRegistry::new(lights.len() as u32);
    for light in lights {
        registry.add_light(light).unwrap();
    }
    registry
}

#[test]
fn light_at_origin_reaches_the_cluster_under_its_projection() {
    let camera = scene_camera();
    let partitioner = partition(&camera);
    let params = *partitioner.params().unwrap();
    let registry = registry(&[PointLight::new(Vec3::ZERO, 1000.0)]);

    let view = camera.view_matrix();
    let mut lists = ClusterLightLists::new(params.cluster_count(), params.cluster_count());
    let input = CullingInput {
        view,
        lights: registry.lights(),
        bounds: partitioner.bounds(),
    };
    SerialAssigner::new(100).assign(&input, &mut lists).unwrap();

    let clip = camera.view_projection() * Vec3::ZERO.extend(1.0);
    let ndc = clip.truncate() / clip.w;
    assert!(ndc.x.abs() < 1.0 && ndc.y.abs() < 1.0, "light should be on screen");
    let pixel = Vec2::new((ndc.x + 1.0) * 0.5 * 1280.0, (1.0 - ndc.y) * 0.5 * 720.0);
    let view_z = view.transform_point3(Vec3::ZERO).z;

    let cluster = params.cluster_for_fragment(pixel, view_z);
    let entry = lists.grid()[cluster as usize];
    assert!(entry.count >= 1);
    assert_eq!(lists.cluster_lights(cluster), vec![0]);
}

#[test]
fn no_cluster_misses_a_light_that_touches_it() {
    let camera = scene_camera();
    let partitioner = partition(&camera);
    let lights = lattice(32);
    let registry = registry(&lights);
    let view = camera.view_matrix();

    let cluster_count = partitioner.bounds().len() as u32;
    let mut lists = ClusterLightLists::new(cluster_count, cluster_count * 32);
    let input = CullingInput {
        view,
        lights: registry.lights(),
        bounds: partitioner.bounds(),
    };
    let report = SerialAssigner::new(256).assign(&input, &mut lists).unwrap();
    assert!(!report.is_degraded());

    for (cluster, aabb) in partitioner.bounds().iter().enumerate() {
        let assigned = lists.light_set(cluster as u32);
        for (index, light) in lights.iter().enumerate() {
            let center = view.transform_point3(light.position);
            let touches = sq_dist_point_aabb(center, aabb) <= light.radius * light.radius;
            assert_eq!(
                touches,
                assigned.contains(&(index as u32)),
                "cluster {cluster}, light {index}"
            );
        }
    }
}

#[test]
fn parallel_and_serial_assignment_agree_on_the_scene() {
    let camera = scene_camera();
    let partitioner = partition(&camera);
    let registry = registry(&lattice(64));
    let cluster_count = partitioner.bounds().len() as u32;
    let input = CullingInput {
        view: camera.view_matrix(),
        lights: registry.lights(),
        bounds: partitioner.bounds(),
    };

    let mut serial = ClusterLightLists::new(cluster_count, cluster_count * 64);
    let mut parallel = ClusterLightLists::new(cluster_count, cluster_count * 64);
    let serial_report = SerialAssigner::new(256).assign(&input, &mut serial).unwrap();
    let parallel_report = ParallelAssigner::new(4, 256)
        .unwrap()
        .assign(&input, &mut parallel)
        .unwrap();

    assert_eq!(serial_report, parallel_report);
    for cluster in 0..cluster_count {
        assert_eq!(serial.light_set(cluster), parallel.light_set(cluster));
    }
}

#[test]
fn camera_motion_keeps_the_partition() {
    let mut camera = scene_camera();
    let mut partitioner = partition(&camera);
    let generation = partitioner.generation();

    camera.orbit(0.3, 0.1);
    camera.zoom(50.0);
    assert!(!partitioner.update(&camera).unwrap());
    assert_eq!(partitioner.generation(), generation);

    camera.set_viewport(1920, 1080).unwrap();
    assert!(partitioner.update(&camera).unwrap());
    assert_eq!(partitioner.generation(), generation + 1);
}

#[test]
fn registry_rejects_lights_past_capacity() {
    let lights = lattice(3);
    let mut registry = LightRegistry::new(2);
    let first = registry.add_light(&lights[0]).unwrap();
    registry.add_light(&lights[1]).unwrap();
    let before = *registry.get(first).unwrap();

    assert_eq!(
        registry.add_light(&lights[2]),
        Err(LightRegistryError::CapacityExceeded { capacity: 2 })
    );
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.get(first), Some(&before));
}
