//! Per-camera pixel→world homographies and the calibration table.
//!
//! Calibration itself is external: an interactive tool derives each 3×3
//! matrix from clicked point correspondences and writes the table as JSON.
//! The core loads that table once per session and treats it as read-only;
//! invertibility is a calibration-time guarantee and is not re-validated
//! here.

use nalgebra::{Matrix3, Vector3};
use std::collections::BTreeMap;
use std::path::Path;

use crate::CameraId;

/// Homogeneous weights below this magnitude are treated as points at
/// infinity; such projections are reported, never turned into NaN.
pub const HOMOGENEOUS_EPS: f64 = 1e-12;

// ── Error type ───────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum CalibrationError {
    Io(std::io::Error),
    Json(serde_json::Error),
    /// Table key that does not parse as a camera id.
    BadCameraId(String),
    /// `H` array with the wrong element count.
    BadMatrix { camera: String, len: usize },
}

impl std::fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "calibration table read failed: {}", e),
            Self::Json(e) => write!(f, "calibration table parse failed: {}", e),
            Self::BadCameraId(key) => write!(f, "bad camera id key: {:?}", key),
            Self::BadMatrix { camera, len } => {
                write!(f, "camera {}: H has {} elements, expected 9", camera, len)
            }
        }
    }
}

impl std::error::Error for CalibrationError {}

impl From<std::io::Error> for CalibrationError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for CalibrationError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

// ── Homography ───────────────────────────────────────────────────────────

/// A 3×3 projective transform mapping image pixels to world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    m: Matrix3<f64>,
}

impl Homography {
    /// Build from a 9-element row-major array (the interchange layout).
    pub fn from_row_major(v: [f64; 9]) -> Self {
        Self {
            m: Matrix3::new(v[0], v[1], v[2], v[3], v[4], v[5], v[6], v[7], v[8]),
        }
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.m
    }

    /// Map a pixel point to world coordinates: H * [x, y, 1]^T, normalized
    /// by the homogeneous weight.
    ///
    /// Returns `None` when the weight vanishes (the point maps to
    /// infinity); callers drop such detections instead of propagating NaN.
    pub fn project(&self, x: f64, y: f64) -> Option<[f64; 2]> {
        let p = self.m * Vector3::new(x, y, 1.0);
        if p[2].abs() < HOMOGENEOUS_EPS {
            return None;
        }
        Some([p[0] / p[2], p[1] / p[2]])
    }

    /// Inverse transform (world → pixel), if the matrix is invertible.
    pub fn try_inverse(&self) -> Option<Homography> {
        self.m.try_inverse().map(|m| Self { m })
    }
}

impl From<Matrix3<f64>> for Homography {
    fn from(m: Matrix3<f64>) -> Self {
        Self { m }
    }
}

// ── Calibration table ────────────────────────────────────────────────────

/// JSON entry shape: `{ "H": [9 floats], ... }`. The calibration tool also
/// stores the clicked point correspondences under extra keys; those are
/// ignored at runtime.
#[derive(Debug, serde::Deserialize)]
struct CalibrationRecord {
    #[serde(rename = "H")]
    h: Vec<f64>,
}

/// Read-only homography table keyed by camera id.
///
/// Iteration is ascending by camera id, which fixes the concatenation
/// order of projected points across cameras.
#[derive(Debug, Clone, Default)]
pub struct CalibrationTable {
    entries: BTreeMap<CameraId, Homography>,
}

impl CalibrationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, camera: CameraId, h: Homography) {
        self.entries.insert(camera, h);
    }

    pub fn get(&self, camera: CameraId) -> Option<&Homography> {
        self.entries.get(&camera)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn camera_ids(&self) -> impl Iterator<Item = CameraId> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CameraId, &Homography)> {
        self.entries.iter().map(|(&id, h)| (id, h))
    }

    /// Parse the calibration interchange JSON: a map from decimal camera-id
    /// strings to records carrying the row-major `H` array.
    pub fn from_json_str(json: &str) -> Result<Self, CalibrationError> {
        let raw: BTreeMap<String, CalibrationRecord> = serde_json::from_str(json)?;

        let mut entries = BTreeMap::new();
        for (key, record) in raw {
            let camera: CameraId = key
                .parse()
                .map_err(|_| CalibrationError::BadCameraId(key.clone()))?;
            let h: [f64; 9] =
                record
                    .h
                    .as_slice()
                    .try_into()
                    .map_err(|_| CalibrationError::BadMatrix {
                        camera: key,
                        len: record.h.len(),
                    })?;
            entries.insert(camera, Homography::from_row_major(h));
        }

        Ok(Self { entries })
    }

    pub fn from_json_file(path: &Path) -> Result<Self, CalibrationError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn make_test_homography() -> Homography {
        // Scale + translate + mild perspective
        Homography::from_row_major([
            3.5, 0.1, 640.0, //
            -0.05, 3.3, 480.0, //
            0.0001, -0.00005, 1.0,
        ])
    }

    #[test]
    fn project_roundtrip() {
        let h = make_test_homography();
        let h_inv = h.try_inverse().unwrap();

        let p = [50.0, 75.0];
        let q = h.project(p[0], p[1]).unwrap();
        let p_back = h_inv.project(q[0], q[1]).unwrap();

        assert_relative_eq!(p[0], p_back[0], epsilon = 1e-8);
        assert_relative_eq!(p[1], p_back[1], epsilon = 1e-8);
    }

    #[test]
    fn project_degenerate_is_none() {
        // Bottom row sends (1, 1) to the line at infinity: w = 1 - 1 = 0.
        let h = Homography::from_row_major([
            1.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, //
            1.0, -1.0, 0.0,
        ]);
        assert!(h.project(1.0, 1.0).is_none());
        assert!(h.project(2.0, 1.0).is_some());
    }

    #[test]
    fn table_from_json() {
        let json = r#"{
            "0": { "H": [1, 0, 10, 0, 1, 20, 0, 0, 1], "points": [[0, 0], [1, 1]] },
            "2": { "H": [2, 0, 0, 0, 2, 0, 0, 0, 1] }
        }"#;
        let table = CalibrationTable::from_json_str(json).unwrap();

        assert_eq!(table.len(), 2);
        assert!(table.get(1).is_none());
        assert_eq!(table.camera_ids().collect::<Vec<_>>(), vec![0, 2]);

        let p = table.get(0).unwrap().project(5.0, 5.0).unwrap();
        assert_relative_eq!(p[0], 15.0);
        assert_relative_eq!(p[1], 25.0);
    }

    #[test]
    fn table_rejects_bad_key() {
        let json = r#"{ "cam-a": { "H": [1, 0, 0, 0, 1, 0, 0, 0, 1] } }"#;
        assert!(matches!(
            CalibrationTable::from_json_str(json),
            Err(CalibrationError::BadCameraId(_))
        ));
    }

    #[test]
    fn table_rejects_short_matrix() {
        let json = r#"{ "0": { "H": [1, 0, 0, 0, 1, 0] } }"#;
        assert!(matches!(
            CalibrationTable::from_json_str(json),
            Err(CalibrationError::BadMatrix { len: 6, .. })
        ));
    }
}
