//! Renderer configuration, loaded from JSON.
//!
//! Every field has a default, so a config file only needs to list what it
//! changes:
//!
//! ```json
//! { "frames_in_flight": 3, "culling_backend": "cpu_parallel" }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_FRAMES_IN_FLIGHT: u32 = 4;

/// wgpu's default `max_storage_buffer_binding_size` (128 MiB).
pub const STORAGE_BINDING_LIMIT: u64 = 128 << 20;

/// Largest grid whose 32-byte cluster AABBs fit in one storage binding.
pub const MAX_CLUSTERS: u32 = (STORAGE_BINDING_LIMIT / 32) as u32;

/// Largest registry whose 64-byte GPU lights fit in one storage binding.
pub const MAX_LIGHTS: u32 = (STORAGE_BINDING_LIMIT / 64) as u32;

/// Largest `u32` light index list that fits in one storage binding.
pub const MAX_LIGHT_INDICES: u32 = (STORAGE_BINDING_LIMIT / 4) as u32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Where per-cluster light lists are computed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CullingBackend {
    /// Compute shader, one invocation per cluster.
    #[default]
    Gpu,
    /// Rayon parallel-for on the CPU, results uploaded each frame.
    CpuParallel,
    /// Single-threaded reference implementation.
    CpuSerial,
}

impl CullingBackend {
    /// Cycles Gpu -> CpuParallel -> CpuSerial -> Gpu.
    pub fn next(self) -> Self {
        match self {
            CullingBackend::Gpu => CullingBackend::CpuParallel,
            CullingBackend::CpuParallel => CullingBackend::CpuSerial,
            CullingBackend::CpuSerial => CullingBackend::Gpu,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterGridConfig {
    pub tiles_x: u32,
    pub tiles_y: u32,
    pub depth_slices: u32,
}

impl Default for ClusterGridConfig {
    fn default() -> Self {
        Self {
            tiles_x: 16,
            tiles_y: 9,
            depth_slices: 24,
        }
    }
}

impl ClusterGridConfig {
    /// `None` when the product does not fit in a `u32`.
    pub fn cluster_count(&self) -> Option<u32> {
        self.tiles_x
            .checked_mul(self.tiles_y)?
            .checked_mul(self.depth_slices)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub frames_in_flight: u32,
    pub cluster_grid: ClusterGridConfig,
    /// Capacity of the light registry.
    pub max_lights: u32,
    /// Capacity of one cluster's local light list; extra lights are dropped.
    pub max_lights_per_cluster: u32,
    /// Total light indices shared by all clusters.
    /// Defaults to `cluster_count * max_lights_per_cluster`.
    pub light_index_budget: Option<u32>,
    pub culling_backend: CullingBackend,
    /// When false, fragments iterate every light instead of their cluster's list.
    pub clustered_shading: bool,
    pub vsync: bool,
    pub clear_color: [f64; 4],
    /// `None` waits on frame fences without a deadline.
    pub fence_timeout_ms: Option<u64>,
    /// Threads for the CPU culling pool; 0 lets rayon decide.
    pub culling_threads: usize,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            cluster_grid: ClusterGridConfig::default(),
            max_lights: 256,
            max_lights_per_cluster: 100,
            light_index_budget: None,
            culling_backend: CullingBackend::Gpu,
            clustered_shading: true,
            vsync: true,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            fence_timeout_ms: None,
            culling_threads: 0,
        }
    }
}

impl RendererConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_json(&text)?;
        log::info!("Loaded renderer config from {}", path.display());
        Ok(config)
    }

    /// Loads `path` if it exists, otherwise falls back to defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            log::info!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn light_index_capacity(&self) -> u32 {
        self.light_index_budget.unwrap_or_else(|| {
            self.cluster_grid
                .cluster_count()
                .unwrap_or(u32::MAX)
                .saturating_mul(self.max_lights_per_cluster)
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frames_in_flight == 0 || self.frames_in_flight > MAX_FRAMES_IN_FLIGHT {
            return Err(ConfigError::Invalid(format!(
                "frames_in_flight must be in 1..={MAX_FRAMES_IN_FLIGHT}, got {}",
                self.frames_in_flight
            )));
        }
        let grid = &self.cluster_grid;
        if grid.tiles_x == 0 || grid.tiles_y == 0 || grid.depth_slices == 0 {
            return Err(ConfigError::Invalid(format!(
                "cluster grid dimensions must be non-zero, got {}x{}x{}",
                grid.tiles_x, grid.tiles_y, grid.depth_slices
            )));
        }
        match grid.cluster_count() {
            Some(count) if count <= MAX_CLUSTERS => {}
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "cluster grid {}x{}x{} exceeds {MAX_CLUSTERS} clusters",
                    grid.tiles_x, grid.tiles_y, grid.depth_slices
                )));
            }
        }
        if self.max_lights == 0 || self.max_lights > MAX_LIGHTS {
            return Err(ConfigError::Invalid(format!(
                "max_lights must be in 1..={MAX_LIGHTS}, got {}",
                self.max_lights
            )));
        }
        if self.max_lights_per_cluster == 0 {
            return Err(ConfigError::Invalid(
                "max_lights_per_cluster must be non-zero".into(),
            ));
        }
        let index_capacity = self.light_index_capacity();
        if index_capacity == 0 {
            return Err(ConfigError::Invalid(
                "light_index_budget must be non-zero".into(),
            ));
        }
        if index_capacity > MAX_LIGHT_INDICES {
            return Err(ConfigError::Invalid(format!(
                "light index list of {index_capacity} entries exceeds {MAX_LIGHT_INDICES}; \
                 lower max_lights_per_cluster or set light_index_budget"
            )));
        }
        Ok(())
    }
}
