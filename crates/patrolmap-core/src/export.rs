//! Output shapes consumed by downstream persistence and visualization.
//!
//! Two row-oriented tables with fixed headers plus JSON twins. The column
//! order and precision are interchange contracts; external consumers
//! parse them, so changes here are breaking.

use std::fmt::Write as _;

use crate::route::{PlannedRoute, Termination};
use crate::ConsensusPoint;

/// Consensus table: header `class,x,y,confidence`, coordinates and
/// confidence at four decimal places.
pub fn consensus_csv(points: &[ConsensusPoint]) -> String {
    let mut out = String::from("class,x,y,confidence\n");
    for p in points {
        let _ = writeln!(out, "{},{:.4},{:.4},{:.4}", p.class_id, p.x, p.y, p.confidence);
    }
    out
}

/// Consensus points as a self-describing JSON array of
/// `{class, x, y, confidence}` objects.
pub fn consensus_json(points: &[ConsensusPoint]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(points)
}

/// Route table: header `index,cls,x,y,confidence`, one row per visited
/// point in route order; `index` is the consensus-point index.
pub fn route_csv(points: &[ConsensusPoint], route: &PlannedRoute) -> String {
    let mut out = String::from("index,cls,x,y,confidence\n");
    for &i in &route.order {
        let p = &points[i];
        let _ = writeln!(
            out,
            "{},{},{:.2},{:.2},{:.4}",
            i, p.class_id, p.x, p.y, p.confidence
        );
    }
    out
}

/// One visited point of a route document.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RouteStop {
    /// Consensus-point index.
    pub index: usize,
    #[serde(rename = "class")]
    pub class_id: u32,
    pub x: f64,
    pub y: f64,
    pub confidence: f32,
}

/// Structured route output: anchors, stops in visit order, total length,
/// and how the search ended.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RouteDocument {
    pub start: usize,
    pub end: usize,
    pub length: f64,
    pub termination: Termination,
    pub stops: Vec<RouteStop>,
}

pub fn route_document(points: &[ConsensusPoint], route: &PlannedRoute) -> RouteDocument {
    RouteDocument {
        start: route.start,
        end: route.end,
        length: route.length,
        termination: route.termination,
        stops: route
            .order
            .iter()
            .map(|&i| {
                let p = &points[i];
                RouteStop {
                    index: i,
                    class_id: p.class_id,
                    x: p.x,
                    y: p.y,
                    confidence: p.confidence,
                }
            })
            .collect(),
    }
}

pub fn route_json(points: &[ConsensusPoint], route: &PlannedRoute) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&route_document(points, route))
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_points() -> Vec<ConsensusPoint> {
        vec![
            ConsensusPoint {
                class_id: 2,
                x: 8.7812,
                y: 34.481,
                confidence: 0.52464,
            },
            ConsensusPoint {
                class_id: 4,
                x: 51.153,
                y: 63.906,
                confidence: 0.62784,
            },
        ]
    }

    #[test]
    fn consensus_csv_format() {
        let csv = consensus_csv(&sample_points());
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], "class,x,y,confidence");
        assert_eq!(lines[1], "2,8.7812,34.4810,0.5246");
        assert_eq!(lines[2], "4,51.1530,63.9060,0.6278");
    }

    #[test]
    fn consensus_json_field_names() {
        let json = consensus_json(&sample_points()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed[0]["class"], 2);
        assert!(parsed[0]["confidence"].is_number());
        assert!(parsed[0].get("class_id").is_none());
    }

    #[test]
    fn route_csv_follows_visit_order() {
        let points = sample_points();
        let route = PlannedRoute {
            order: vec![1, 0],
            length: 51.9,
            start: 1,
            end: 0,
            termination: Termination::Optimal,
        };
        let csv = route_csv(&points, &route);
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], "index,cls,x,y,confidence");
        assert_eq!(lines[1], "1,4,51.15,63.91,0.6278");
        assert_eq!(lines[2], "0,2,8.78,34.48,0.5246");
    }

    #[test]
    fn route_document_carries_anchors_and_termination() {
        let points = sample_points();
        let route = PlannedRoute {
            order: vec![0, 1],
            length: 51.9,
            start: 0,
            end: 1,
            termination: Termination::BudgetExhausted,
        };
        let json = route_json(&points, &route).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["start"], 0);
        assert_eq!(parsed["end"], 1);
        assert_eq!(parsed["termination"], "budget_exhausted");
        assert_eq!(parsed["stops"].as_array().unwrap().len(), 2);
        assert_eq!(parsed["stops"][0]["index"], 0);
    }

    #[test]
    fn consensus_round_trips_through_json() {
        let points = sample_points();
        let json = consensus_json(&points).unwrap();
        let back: Vec<ConsensusPoint> = serde_json::from_str(&json).unwrap();

        assert_eq!(back.len(), points.len());
        assert_eq!(back[0].class_id, points[0].class_id);
        assert_eq!(back[1].x, points[1].x);
    }
}
