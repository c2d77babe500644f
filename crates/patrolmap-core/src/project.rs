//! Detection projector: pixel bounding boxes → ground-plane world points.

use std::collections::BTreeMap;
use std::path::Path;

use crate::homography::{CalibrationTable, Homography};
use crate::{CameraId, Detection, WorldPoint};

// ── Ground-contact convention ────────────────────────────────────────────

/// Vertical reference used to pick a detection's ground-contact pixel.
///
/// The horizontal reference is always the bounding-box midpoint. For
/// objects standing on the ground seen from an oblique camera, the box
/// bottom edge is where the object touches the plane; `BoxCenter` suits
/// overhead or near-orthographic viewpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GroundContact {
    #[default]
    BottomEdge,
    BoxCenter,
}

impl GroundContact {
    /// Ground-contact pixel `(cx, cy)` of a bounding box `[x1, y1, x2, y2]`.
    pub fn ground_pixel(self, bbox: &[f64; 4]) -> [f64; 2] {
        let cx = (bbox[0] + bbox[2]) / 2.0;
        let cy = match self {
            Self::BottomEdge => bbox[3],
            Self::BoxCenter => (bbox[1] + bbox[3]) / 2.0,
        };
        [cx, cy]
    }
}

// ── Config & report ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct ProjectConfig {
    pub ground_contact: GroundContact,
    /// Detections below this confidence are ignored before projection.
    pub min_confidence: f32,
}

/// Per-invocation accounting for multi-camera projection.
///
/// The pipeline driver reports skipped cameras and drop counts to the
/// user from here; per-item failures never abort the batch.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ProjectionReport {
    pub cameras_processed: Vec<CameraId>,
    /// Cameras skipped for lack of a calibration entry (legitimately
    /// uncalibrated or disabled; not an error).
    pub cameras_skipped: Vec<CameraId>,
    /// Detections whose projection landed at infinity.
    pub dropped_degenerate: usize,
    /// Detections below the configured confidence floor.
    pub dropped_low_confidence: usize,
}

// ── Detection batches ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum BatchError {
    Io(std::io::Error),
    Json(serde_json::Error),
    /// Batch key that does not parse as a camera id.
    BadCameraId(String),
}

impl std::fmt::Display for BatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "detection batch read failed: {}", e),
            Self::Json(e) => write!(f, "detection batch parse failed: {}", e),
            Self::BadCameraId(key) => write!(f, "bad camera id key: {:?}", key),
        }
    }
}

impl std::error::Error for BatchError {}

impl From<std::io::Error> for BatchError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for BatchError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

/// Detection lists keyed by camera id, one frame per camera.
///
/// Iteration is ascending by camera id so the concatenated world points
/// are reproducible for a fixed input.
#[derive(Debug, Clone, Default)]
pub struct DetectionBatches {
    batches: BTreeMap<CameraId, Vec<Detection>>,
}

impl DetectionBatches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, camera: CameraId, detections: Vec<Detection>) {
        self.batches.insert(camera, detections);
    }

    pub fn get(&self, camera: CameraId) -> Option<&[Detection]> {
        self.batches.get(&camera).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CameraId, &[Detection])> {
        self.batches.iter().map(|(&id, dets)| (id, dets.as_slice()))
    }

    /// Parse the detector interchange JSON: a map from decimal camera-id
    /// strings to detection lists.
    pub fn from_json_str(json: &str) -> Result<Self, BatchError> {
        let raw: BTreeMap<String, Vec<Detection>> = serde_json::from_str(json)?;

        let mut batches = BTreeMap::new();
        for (key, dets) in raw {
            let camera: CameraId = key.parse().map_err(|_| BatchError::BadCameraId(key))?;
            batches.insert(camera, dets);
        }

        Ok(Self { batches })
    }

    pub fn from_json_file(path: &Path) -> Result<Self, BatchError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

// ── Projection ───────────────────────────────────────────────────────────

/// Project one camera's detections through its homography.
///
/// Pure function of its inputs. Degenerate projections (homogeneous
/// weight at zero) and sub-threshold detections are dropped and counted
/// in the report.
pub fn project_detections(
    detections: &[Detection],
    h: &Homography,
    config: &ProjectConfig,
) -> (Vec<WorldPoint>, ProjectionReport) {
    let mut report = ProjectionReport::default();
    let mut points = Vec::with_capacity(detections.len());
    project_into(detections, h, config, &mut points, &mut report);
    (points, report)
}

fn project_into(
    detections: &[Detection],
    h: &Homography,
    config: &ProjectConfig,
    points: &mut Vec<WorldPoint>,
    report: &mut ProjectionReport,
) {
    for det in detections {
        if det.confidence < config.min_confidence {
            report.dropped_low_confidence += 1;
            continue;
        }

        let [cx, cy] = config.ground_contact.ground_pixel(&det.bbox);
        match h.project(cx, cy) {
            Some([x, y]) => points.push(WorldPoint {
                class_id: det.class_id,
                x,
                y,
                confidence: det.confidence,
            }),
            None => {
                tracing::warn!(
                    "dropping class {} detection at ({:.1}, {:.1}): projects to infinity",
                    det.class_id,
                    cx,
                    cy,
                );
                report.dropped_degenerate += 1;
            }
        }
    }
}

/// Project all cameras' detections into one world-point list.
///
/// Cameras are visited in ascending id order; a camera with no
/// calibration entry is skipped and recorded, not treated as an error.
pub fn project_cameras(
    table: &CalibrationTable,
    batches: &DetectionBatches,
    config: &ProjectConfig,
) -> (Vec<WorldPoint>, ProjectionReport) {
    let mut report = ProjectionReport::default();
    let mut points = Vec::new();

    for (camera, detections) in batches.iter() {
        let Some(h) = table.get(camera) else {
            tracing::warn!("camera {}: no calibration entry, skipping {} detections", camera, detections.len());
            report.cameras_skipped.push(camera);
            continue;
        };

        report.cameras_processed.push(camera);
        project_into(detections, h, config, &mut points, &mut report);
    }

    tracing::info!(
        "{} world points from {} cameras ({} skipped)",
        points.len(),
        report.cameras_processed.len(),
        report.cameras_skipped.len(),
    );

    (points, report)
}

// ── Tests ────────────────────────────────────────────────────────────────
