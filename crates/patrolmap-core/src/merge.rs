//! Cross-camera merging of same-class world points.
//!
//! Two points of one class belong to the same cluster when a chain of
//! pairwise distances, each within the class radius, connects them
//! (density reachability with a minimum cluster size of one: every point
//! seeds or joins a cluster, none is discarded as noise). Each cluster
//! collapses into a single confidence-weighted consensus point.

use std::collections::BTreeMap;

use crate::{ConsensusPoint, WorldPoint};

// ── Config ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// Per-class merge radius in world units.
    pub radius_by_class: BTreeMap<u32, f64>,
    /// Radius for classes without an explicit entry.
    pub default_radius: f64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            radius_by_class: BTreeMap::new(),
            default_radius: 10.0,
        }
    }
}

impl MergeConfig {
    pub fn radius_for(&self, class_id: u32) -> f64 {
        self.radius_by_class
            .get(&class_id)
            .copied()
            .unwrap_or(self.default_radius)
    }
}

// ── Union-find ───────────────────────────────────────────────────────────

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            // path halving
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            // attach the larger root under the smaller to keep cluster
            // identity tied to the earliest member
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}

// ── Merge ────────────────────────────────────────────────────────────────

/// Merge world points into per-cluster consensus points.
///
/// Classes are processed in ascending `class_id`; within a class, cluster
/// output order follows the input order of each cluster's first member.
/// Deterministic for a fixed input ordering and fixed radii.
pub fn merge_points(points: &[WorldPoint], config: &MergeConfig) -> Vec<ConsensusPoint> {
    let mut by_class: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    for (i, p) in points.iter().enumerate() {
        by_class.entry(p.class_id).or_default().push(i);
    }

    let mut merged = Vec::new();
    for (&class_id, members) in &by_class {
        merge_class(points, class_id, members, config.radius_for(class_id), &mut merged);
    }
    merged
}

fn merge_class(
    points: &[WorldPoint],
    class_id: u32,
    members: &[usize],
    radius: f64,
    out: &mut Vec<ConsensusPoint>,
) {
    let n = members.len();
    let r2 = radius * radius;

    let mut set = DisjointSet::new(n);
    for a in 0..n {
        let pa = &points[members[a]];
        for b in (a + 1)..n {
            let pb = &points[members[b]];
            let dx = pa.x - pb.x;
            let dy = pa.y - pb.y;
            if dx * dx + dy * dy <= r2 {
                set.union(a, b);
            }
        }
    }

    // Collect clusters keyed by root; first-seen order preserves the
    // input order of each cluster's earliest member.
    let mut clusters: Vec<Vec<usize>> = Vec::new();
    let mut slot_of_root: BTreeMap<usize, usize> = BTreeMap::new();
    for a in 0..n {
        let root = set.find(a);
        let slot = *slot_of_root.entry(root).or_insert_with(|| {
            clusters.push(Vec::new());
            clusters.len() - 1
        });
        clusters[slot].push(members[a]);
    }

    for cluster in &clusters {
        if let Some(point) = consensus_of(points, class_id, cluster) {
            out.push(point);
        }
    }
}

/// Confidence-weighted consensus of one cluster.
///
/// With an all-zero weight sum the coordinates fall back to the unweighted
/// mean and the consensus confidence is 0.0; otherwise the confidence is
/// the arithmetic mean of member confidences, keeping it in [0, 1].
fn consensus_of(points: &[WorldPoint], class_id: u32, cluster: &[usize]) -> Option<ConsensusPoint> {
    if cluster.is_empty() {
        // Unreachable with the union-find pass above; a hit means a
        // clustering bug, reported but not fatal.
        tracing::warn!("class {}: empty cluster skipped", class_id);
        return None;
    }

    let len = cluster.len() as f64;
    let total_weight: f64 = cluster.iter().map(|&i| points[i].confidence as f64).sum();

    let (x, y, confidence) = if total_weight == 0.0 {
        let x = cluster.iter().map(|&i| points[i].x).sum::<f64>() / len;
        let y = cluster.iter().map(|&i| points[i].y).sum::<f64>() / len;
        (x, y, 0.0)
    } else {
        let x = cluster
            .iter()
            .map(|&i| points[i].x * points[i].confidence as f64)
            .sum::<f64>()
            / total_weight;
        let y = cluster
            .iter()
            .map(|&i| points[i].y * points[i].confidence as f64)
            .sum::<f64>()
            / total_weight;
        (x, y, (total_weight / len) as f32)
    };

    Some(ConsensusPoint {
        class_id,
        x,
        y,
        confidence,
    })
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn wp(class_id: u32, x: f64, y: f64, confidence: f32) -> WorldPoint {
        WorldPoint {
            class_id,
            x,
            y,
            confidence,
        }
    }

    fn with_radius(class_id: u32, radius: f64) -> MergeConfig {
        let mut config = MergeConfig::default();
        config.radius_by_class.insert(class_id, radius);
        config
    }

    #[test]
    fn two_cameras_one_object() {
        // The same physical object seen by two overlapping cameras.
        let points = vec![wp(1, 50.0, 50.0, 0.6), wp(1, 52.0, 49.0, 0.8)];
        let merged = merge_points(&points, &with_radius(1, 10.0));

        assert_eq!(merged.len(), 1);
        let p = &merged[0];
        assert_eq!(p.class_id, 1);
        assert_relative_eq!(p.x, (50.0 * 0.6 + 52.0 * 0.8) / 1.4, epsilon = 1e-9);
        assert_relative_eq!(p.y, (50.0 * 0.6 + 49.0 * 0.8) / 1.4, epsilon = 1e-9);
        assert_relative_eq!(p.confidence, 0.7, epsilon = 1e-6);
    }

    #[test]
    fn chain_linking_merges_transitively() {
        // a-b and b-c are within the radius, a-c is not; still one cluster.
        let points = vec![
            wp(0, 0.0, 0.0, 0.5),
            wp(0, 8.0, 0.0, 0.5),
            wp(0, 16.0, 0.0, 0.5),
        ];
        let merged = merge_points(&points, &with_radius(0, 10.0));

        assert_eq!(merged.len(), 1);
        assert_relative_eq!(merged[0].x, 8.0, epsilon = 1e-9);
    }

    #[test]
    fn distinct_classes_never_merge() {
        let points = vec![wp(0, 0.0, 0.0, 0.9), wp(1, 0.1, 0.0, 0.9)];
        let merged = merge_points(&points, &MergeConfig::default());

        assert_eq!(merged.len(), 2);
        // Ascending class order in the output.
        assert_eq!(merged[0].class_id, 0);
        assert_eq!(merged[1].class_id, 1);
    }

    #[test]
    fn far_points_stay_singletons() {
        let points = vec![
            wp(2, 0.0, 0.0, 0.4),
            wp(2, 100.0, 0.0, 0.5),
            wp(2, 0.0, 100.0, 0.6),
        ];
        let merged = merge_points(&points, &with_radius(2, 10.0));

        assert_eq!(merged.len(), points.len());
    }

    #[test]
    fn merge_is_idempotent_on_separated_output() {
        let points = vec![
            wp(0, 0.0, 0.0, 0.6),
            wp(0, 3.0, 0.0, 0.8),
            wp(0, 50.0, 50.0, 0.9),
        ];
        let config = with_radius(0, 5.0);
        let merged = merge_points(&points, &config);
        assert_eq!(merged.len(), 2);

        // Re-merging the consensus set leaves every point a singleton.
        let as_world: Vec<WorldPoint> = merged
            .iter()
            .map(|p| wp(p.class_id, p.x, p.y, p.confidence))
            .collect();
        let remerged = merge_points(&as_world, &config);

        assert_eq!(remerged.len(), merged.len());
        for (a, b) in merged.iter().zip(&remerged) {
            assert_relative_eq!(a.x, b.x, epsilon = 1e-9);
            assert_relative_eq!(a.y, b.y, epsilon = 1e-9);
            assert_relative_eq!(a.confidence, b.confidence, epsilon = 1e-6);
        }
    }

    #[test]
    fn zero_confidence_cluster_uses_unweighted_mean() {
        let points = vec![wp(0, 0.0, 0.0, 0.0), wp(0, 4.0, 2.0, 0.0)];
        let merged = merge_points(&points, &with_radius(0, 10.0));

        assert_eq!(merged.len(), 1);
        assert_relative_eq!(merged[0].x, 2.0, epsilon = 1e-9);
        assert_relative_eq!(merged[0].y, 1.0, epsilon = 1e-9);
        assert_eq!(merged[0].confidence, 0.0);
    }

    #[test]
    fn default_radius_applies_to_unlisted_classes() {
        let mut config = MergeConfig::default();
        config.radius_by_class.insert(0, 1.0);
        config.default_radius = 20.0;

        // Class 0 has a tight radius: stays split. Class 9 falls back to
        // the default and merges.
        let points = vec![
            wp(0, 0.0, 0.0, 0.5),
            wp(0, 5.0, 0.0, 0.5),
            wp(9, 0.0, 0.0, 0.5),
            wp(9, 5.0, 0.0, 0.5),
        ];
        let merged = merge_points(&points, &config);

        let class0 = merged.iter().filter(|p| p.class_id == 0).count();
        let class9 = merged.iter().filter(|p| p.class_id == 9).count();
        assert_eq!(class0, 2);
        assert_eq!(class9, 1);
    }

    #[test]
    fn confidence_stays_in_unit_interval() {
        // Mean (not sum) of member confidences keeps the bound.
        let points = vec![
            wp(0, 0.0, 0.0, 0.9),
            wp(0, 1.0, 0.0, 0.9),
            wp(0, 2.0, 0.0, 0.9),
        ];
        let merged = merge_points(&points, &with_radius(0, 5.0));

        assert_eq!(merged.len(), 1);
        assert!(merged[0].confidence >= 0.0 && merged[0].confidence <= 1.0);
        assert_relative_eq!(merged[0].confidence, 0.9, epsilon = 1e-6);
    }

    #[test]
    fn consensus_count_never_exceeds_input_count() {
        let points: Vec<WorldPoint> = (0..20)
            .map(|i| wp(i % 3, (i as f64) * 7.0, (i as f64) * 3.0, 0.5))
            .collect();
        let merged = merge_points(&points, &MergeConfig::default());

        assert!(merged.len() <= points.len());
        assert!(!merged.is_empty());
    }
}
