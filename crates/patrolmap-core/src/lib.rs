//! patrolmap-core — multi-camera detection fusion and inspection routing.
//!
//! Fuses object detections from several fixed, independently calibrated
//! cameras into one shared ground-plane frame and plans an inspection
//! route over the fused points. The pipeline stages are:
//!
//! 1. **Homography** – read-only table of per-camera 3×3 pixel→world
//!    projective transforms, produced by an external calibration tool.
//! 2. **Project** – per-detection ground-contact pixel pushed through the
//!    camera homography into world coordinates.
//! 3. **Merge** – same-class world points chained within a per-class
//!    radius collapse into confidence-weighted consensus points.
//! 4. **Route** – fixed-endpoint shortest open path visiting every
//!    consensus point exactly once (exact for small N, heuristic beyond).
//! 5. **Export** – stable row-oriented and JSON output shapes for
//!    downstream persistence and visualization.
//!
//! Image acquisition, the detection model, and the calibration GUI are
//! external collaborators; the core consumes their outputs as
//! already-materialized data and performs no blocking I/O apart from the
//! explicit table/batch loaders used by the pipeline driver.

pub mod export;
pub mod homography;
pub mod merge;
pub mod pipeline;
pub mod project;
pub mod route;

pub use homography::{CalibrationError, CalibrationTable, Homography};
pub use merge::{merge_points, MergeConfig};
pub use pipeline::{fuse, FusionConfig, FusionResult};
pub use project::{
    project_cameras, project_detections, BatchError, DetectionBatches, GroundContact,
    ProjectConfig, ProjectionReport,
};
pub use route::{
    nearest_point_index, plan_route, FirstSolutionStrategy, PlannedRoute, RouteConfig,
    RouteError, Termination,
};

/// Identifier of a fixed camera, matching the calibration table keys.
pub type CameraId = u32;

/// One raw detection from the (external) detector, in pixel space.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Detection {
    /// Detector class index.
    pub class_id: u32,
    /// Bounding box corners `[x1, y1, x2, y2]` in image pixels.
    pub bbox: [f64; 4],
    /// Detector confidence in [0, 1].
    pub confidence: f32,
}

/// A detection projected onto the shared ground plane.
///
/// Ephemeral: produced by the projector, consumed by the merger.
#[derive(Debug, Clone)]
pub struct WorldPoint {
    pub class_id: u32,
    pub x: f64,
    pub y: f64,
    pub confidence: f32,
}

/// Consensus representative of one cluster of same-class world points.
///
/// Serializes with the interchange field name `class` that downstream
/// consumers expect.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ConsensusPoint {
    #[serde(rename = "class")]
    pub class_id: u32,
    /// World-frame coordinates (confidence-weighted cluster mean).
    pub x: f64,
    pub y: f64,
    /// Arithmetic mean of member confidences, in [0, 1].
    pub confidence: f32,
}

impl ConsensusPoint {
    /// Squared Euclidean distance to a world coordinate.
    #[inline]
    pub fn dist2(&self, x: f64, y: f64) -> f64 {
        let dx = self.x - x;
        let dy = self.y - y;
        dx * dx + dy * dy
    }
}
