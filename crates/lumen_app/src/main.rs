use std::sync::Arc;

use glam::{Mat4, Vec3, Vec4};
use lumen_core::{Camera, FrameStats, RendererConfig, time::Time};
use lumen_renderer::{FrameOutcome, MeshData, PointLight, Renderer, RendererError};
use lumen_window::{AppControl, WindowApp, WindowConfig, run_app};
use winit::{
    event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent},
    keyboard::{KeyCode, PhysicalKey},
    window::Window,
};

const CONFIG_PATH: &str = "lumen.json";
const LATTICE_LIGHTS: u32 = 24;

const ORBIT_SENSITIVITY: f32 = 0.005;
const ZOOM_STEP: f32 = 60.0;

struct LumenApp {
    config: RendererConfig,
    renderer: Option<Renderer>,
    camera: Camera,
    stats: FrameStats,

    orbiting: bool,
    last_cursor: Option<(f64, f64)>,
}

impl LumenApp {
    fn new(config: RendererConfig) -> Result<Self, RendererError> {
        let camera = Camera::default()
            .looking_at(Vec3::new(1027.0, 183.0, 46.0), Vec3::new(-96.0, 155.0, -14.0))
            .with_clip_planes(0.1, 10_000.0)?
            .with_fov(45f32.to_radians())?;

        Ok(Self {
            config,
            renderer: None,
            camera,
            stats: FrameStats::default(),
            orbiting: false,
            last_cursor: None,
        })
    }

    fn handle_key(&mut self, code: KeyCode) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        match code {
            KeyCode::KeyC => {
                let enabled = !renderer.clustered_shading();
                renderer.set_clustered_shading(enabled);
            }
            KeyCode::KeyB => {
                let backend = renderer.culling_backend().next();
                renderer.set_culling_backend(backend);
            }
            _ => (),
        }
    }
}

/// The light lattice: two rows high, two deep, marching along X.
fn lattice_light(i: u32) -> PointLight {
    let (x, y, z) = (i / 4, i % 2, (i / 2) % 2);
    let hue = i as f32 / LATTICE_LIGHTS as f32 * std::f32::consts::TAU;
    let color = Vec3::new(
        0.6 + 0.4 * hue.cos(),
        0.6 + 0.4 * (hue + 2.1).cos(),
        0.6 + 0.4 * (hue + 4.2).cos(),
    );

    PointLight::new(
        Vec3::new(
            -1200.0 + 800.0 * x as f32,
            100.0 + 400.0 * y as f32,
            -250.0 + 500.0 * z as f32,
        ),
        1000.0,
    )
    .with_color(color)
    .with_intensities(0.1, 1.0, 0.2)
    .with_attenuation(1.0, 0.0, 1e-5)
}

fn setup_scene(renderer: &mut Renderer) -> Result<(), RendererError> {
    renderer.add_mesh(
        &MeshData::plane(6000.0),
        Mat4::IDENTITY,
        Vec4::new(0.8, 0.8, 0.8, 1.0),
    );

    let cube = MeshData::cube(150.0);
    for x in -4..=4 {
        for z in -1..=1 {
            let position = Vec3::new(x as f32 * 400.0, 75.0, z as f32 * 450.0);
            renderer.add_mesh(
                &cube,
                Mat4::from_translation(position),
                Vec4::new(0.9, 0.85, 0.75, 1.0),
            );
        }
    }

    for i in 0..LATTICE_LIGHTS {
        renderer.add_light(&lattice_light(i))?;
    }

    log::info!(
        "Scene ready: {} lights, clustered shading {}",
        renderer.lights().len(),
        renderer.clustered_shading()
    );
    Ok(())
}

/// Per-frame failures skip the frame; only fatal errors stop the app.
fn handle_frame_result(
    result: Result<FrameOutcome, RendererError>,
    stats: &mut FrameStats,
) -> AppControl {
    match result {
        Ok(FrameOutcome::Presented { .. }) => AppControl::Continue,
        Ok(FrameOutcome::Skipped | FrameOutcome::Rebuilt) => {
            stats.record_skipped();
            AppControl::Continue
        }
        Err(e) if !e.is_fatal() => {
            log::warn!("Frame skipped: {e}");
            stats.record_skipped();
            AppControl::Continue
        }
        Err(e) => {
            log::error!("Renderer failed: {e}");
            AppControl::Exit
        }
    }
}

impl WindowApp for LumenApp {
    fn init(&mut self, window: Arc<Window>) -> Result<(), String> {
        let size = window.inner_size();
        let mut renderer = Renderer::new(window, size.width, size.height, self.config.clone())
            .map_err(|e| e.to_string())?;
        setup_scene(&mut renderer).map_err(|e| e.to_string())?;

        log::info!("Controls: drag with the left mouse button to orbit, wheel to zoom");
        log::info!("C toggles clustered shading, B cycles the culling backend");
        self.renderer = Some(renderer);
        Ok(())
    }

    fn window_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => self.handle_key(*code),
            WindowEvent::MouseInput {
                button: MouseButton::Left,
                state,
                ..
            } => {
                self.orbiting = *state == ElementState::Pressed;
                self.last_cursor = None;
            }
            WindowEvent::CursorMoved { position, .. } => {
                let current = (position.x, position.y);
                if self.orbiting {
                    if let Some((x, y)) = self.last_cursor {
                        let dx = (current.0 - x) as f32;
                        let dy = (current.1 - y) as f32;
                        self.camera
                            .orbit(-dx * ORBIT_SENSITIVITY, -dy * ORBIT_SENSITIVITY);
                    }
                }
                self.last_cursor = Some(current);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32 / 40.0,
                };
                self.camera.zoom(lines * ZOOM_STEP);
            }
            _ => (),
        }
    }

    fn resized(&mut self, width: u32, height: u32) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        if let Err(e) = renderer.resize(width, height) {
            log::error!("Resize failed: {e}");
        }
    }

    fn frame(&mut self, time: &Time) -> AppControl {
        let Some(renderer) = self.renderer.as_mut() else {
            return AppControl::Continue;
        };

        let result = renderer.render(&self.camera);
        if handle_frame_result(result, &mut self.stats) == AppControl::Exit {
            return AppControl::Exit;
        }

        if let Some(report) = self.stats.record(time.delta()) {
            let culling = match renderer.last_report() {
                Some(r) => format!(
                    "{} indices, {} truncated clusters",
                    r.total_indices, r.truncated_clusters
                ),
                None => "on GPU".to_string(),
            };
            log::info!(
                "{:.1} fps ({:.2} ms), {} skipped, backend {:?}, culling {}",
                report.fps,
                report.avg_frame_ms,
                report.skipped,
                renderer.culling_backend(),
                culling
            );
        }
        AppControl::Continue
    }

    fn exiting(&mut self) {
        if let Some(mut renderer) = self.renderer.take() {
            renderer.on_scene_exit();
            if let Err(e) = renderer.wait_idle() {
                log::warn!("GPU did not drain before exit: {e}");
            }
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match RendererConfig::load_or_default(CONFIG_PATH) {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration in {CONFIG_PATH}: {e}");
            std::process::exit(1);
        }
    };

    let app = match LumenApp::new(config) {
        Ok(app) => app,
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run_app(app, WindowConfig::default()) {
        log::error!("{e}");
        std::process::exit(1);
    }
}
