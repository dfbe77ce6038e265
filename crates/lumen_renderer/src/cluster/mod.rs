//! Clustered light culling.
//!
//! The view frustum is cut into `Nx * Ny * Nz` clusters: screen tiles in X/Y
//! and exponentially growing depth slices in Z. Each frame every cluster gets
//! the list of lights whose sphere touches its view-space AABB, stored as an
//! `(offset, count)` slice of one shared index list.

use glam::{UVec2, UVec3};
use thiserror::Error;

pub mod assign;
pub mod grid;
pub mod lists;
pub mod partition;

pub use assign::{
    ClusterAssigner, CullingInput, CullingReport, LocalLightList, ParallelAssigner, SerialAssigner,
    sq_dist_point_aabb,
};
pub use grid::ClusterGridParams;
pub use lists::{ClusterLightLists, LightGridEntry, LightIndexList};
pub use partition::{ClusterAabb, FrustumPartitioner, GpuClusterAabb};

#[derive(Debug, Error, PartialEq)]
pub enum ClusterError {
    #[error("cluster grid dimensions must be non-zero, got {0}")]
    EmptyGrid(UVec3),
    #[error("screen must be non-zero, got {0}")]
    EmptyScreen(UVec2),
    #[error("invalid depth range: near = {z_near}, far = {z_far}")]
    InvalidDepthRange { z_near: f32, z_far: f32 },
    #[error("projection is not a perspective projection")]
    NotPerspective,
    #[error("local light list is full ({capacity} lights)")]
    LocalListFull { capacity: u32 },
    #[error("output sized for {expected} clusters, got {actual}")]
    ClusterCountMismatch { expected: u32, actual: u32 },
    #[error("failed to build culling thread pool: {0}")]
    ThreadPool(String),
}
