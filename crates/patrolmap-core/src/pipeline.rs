//! Batch fusion pipeline: project every camera's detections, then merge.
//!
//! One synchronous pass per invocation; the only state shared across runs
//! is the read-only calibration table owned by the caller.

use crate::homography::CalibrationTable;
use crate::merge::{merge_points, MergeConfig};
use crate::project::{project_cameras, DetectionBatches, ProjectConfig, ProjectionReport};
use crate::ConsensusPoint;

#[derive(Debug, Clone, Default)]
pub struct FusionConfig {
    pub project: ProjectConfig,
    pub merge: MergeConfig,
}

/// Fused output plus the per-camera accounting the driver reports.
#[derive(Debug, Clone)]
pub struct FusionResult {
    pub consensus: Vec<ConsensusPoint>,
    pub report: ProjectionReport,
}

/// Run projection and merging over all cameras' detection batches.
pub fn fuse(
    table: &CalibrationTable,
    batches: &DetectionBatches,
    config: &FusionConfig,
) -> FusionResult {
    let (world, report) = project_cameras(table, batches, &config.project);
    let consensus = merge_points(&world, &config.merge);

    tracing::info!(
        "{} world points merged into {} consensus points",
        world.len(),
        consensus.len(),
    );

    FusionResult { consensus, report }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::homography::Homography;
    use crate::route::{plan_route, RouteConfig};
    use crate::Detection;
    use approx::assert_relative_eq;

    /// Two overlapping cameras with translated views of the same scene.
    fn two_camera_setup() -> (CalibrationTable, DetectionBatches) {
        let mut table = CalibrationTable::new();
        // Camera 0 sees world coordinates directly.
        table.insert(
            0,
            Homography::from_row_major([1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]),
        );
        // Camera 1's image is shifted 100px right of the world origin.
        table.insert(
            1,
            Homography::from_row_major([1.0, 0.0, -100.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]),
        );

        let mut batches = DetectionBatches::new();
        batches.insert(
            0,
            vec![
                Detection {
                    class_id: 1,
                    bbox: [48.0, 40.0, 52.0, 50.0],
                    confidence: 0.6,
                },
                Detection {
                    class_id: 3,
                    bbox: [198.0, 190.0, 202.0, 200.0],
                    confidence: 0.9,
                },
            ],
        );
        batches.insert(
            1,
            vec![Detection {
                // Same physical object as camera 0's class-1 detection.
                class_id: 1,
                bbox: [150.0, 39.0, 154.0, 49.0],
                confidence: 0.8,
            }],
        );

        (table, batches)
    }

    #[test]
    fn fuse_deduplicates_across_cameras() {
        let (table, batches) = two_camera_setup();
        let result = fuse(&table, &batches, &FusionConfig::default());

        // Camera 0: (50, 50) class 1 and (200, 200) class 3.
        // Camera 1: (152 - 100, 49) = (52, 49) class 1 → merges with the first.
        assert_eq!(result.consensus.len(), 2);

        let class1 = result.consensus.iter().find(|p| p.class_id == 1).unwrap();
        assert_relative_eq!(class1.confidence, 0.7, epsilon = 1e-6);
        assert_relative_eq!(class1.x, (50.0 * 0.6 + 52.0 * 0.8) / 1.4, epsilon = 1e-9);
        assert_relative_eq!(class1.y, (50.0 * 0.6 + 49.0 * 0.8) / 1.4, epsilon = 1e-9);

        assert_eq!(result.report.cameras_processed, vec![0, 1]);
        assert!(result.report.cameras_skipped.is_empty());
    }

    #[test]
    fn fused_points_feed_the_route_planner() {
        let (table, mut batches) = two_camera_setup();
        batches.insert(
            2,
            vec![Detection {
                class_id: 5,
                bbox: [0.0, 0.0, 2.0, 2.0],
                confidence: 0.5,
            }],
        );

        let result = fuse(&table, &batches, &FusionConfig::default());
        // Camera 2 has no calibration: skipped, fusion unaffected.
        assert_eq!(result.report.cameras_skipped, vec![2]);
        assert_eq!(result.consensus.len(), 2);

        let route = plan_route(&result.consensus, 0, 1, &RouteConfig::default()).unwrap();
        assert_eq!(route.order.len(), 2);
        assert_eq!(route.order[0], 0);
        assert_eq!(route.order[1], 1);
    }

    #[test]
    fn empty_batches_yield_empty_consensus() {
        let (table, _) = two_camera_setup();
        let result = fuse(&table, &DetectionBatches::new(), &FusionConfig::default());

        assert!(result.consensus.is_empty());
        assert!(result.report.cameras_processed.is_empty());
    }
}
