//! Fixed-endpoint shortest inspection route over consensus points.
//!
//! Open Hamiltonian path: visit every point exactly once, first node
//! pinned to `start`, last to `end`, minimizing total Euclidean length.
//! The return-to-start edge is not part of the path or its length.
//!
//! Distances are quantized to integer micro-units for the solvers; the
//! reported route length is recomputed in f64 from the chosen
//! permutation, so quantization affects tie selection only.

mod exact;
mod local_search;

use std::time::{Duration, Instant};

use crate::ConsensusPoint;

// ── Error type ───────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum RouteError {
    /// A route needs at least two points.
    TooFewPoints { got: usize },
    /// Start and end must name different points.
    EndpointsEqual { index: usize },
    /// Start or end index outside `[0, n_points)`.
    EndpointOutOfRange { index: usize, n_points: usize },
    /// The solver produced no valid permutation; retrying with a larger
    /// budget or a different strategy may help.
    SolverFailure { detail: String },
}

impl RouteError {
    /// True for precondition failures (bad input), false for solver
    /// failures. Callers use this to phrase user-facing messages.
    pub fn is_infeasible_input(&self) -> bool {
        !matches!(self, Self::SolverFailure { .. })
    }
}

impl std::fmt::Display for RouteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooFewPoints { got } => {
                write!(f, "route needs at least 2 points, got {}", got)
            }
            Self::EndpointsEqual { index } => {
                write!(f, "start and end must differ (both are {})", index)
            }
            Self::EndpointOutOfRange { index, n_points } => {
                write!(f, "endpoint index {} out of range for {} points", index, n_points)
            }
            Self::SolverFailure { detail } => write!(f, "route solver failed: {}", detail),
        }
    }
}

impl std::error::Error for RouteError {}

// ── Config ───────────────────────────────────────────────────────────────

/// Construction strategy for the first heuristic solution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FirstSolutionStrategy {
    /// Insert the point whose best insertion position increases the path
    /// length the least.
    #[default]
    CheapestInsertion,
    /// Greedy chain from the start node; the end node is appended last.
    NearestNeighbor,
}

#[derive(Debug, Clone)]
pub struct RouteConfig {
    /// Wall-clock budget for the search. `None` runs construction plus a
    /// single local-search convergence and skips restarts.
    pub time_budget: Option<Duration>,
    pub first_solution: FirstSolutionStrategy,
    /// Largest point count handed to the exact dynamic program, capped at
    /// [`MAX_EXACT_POINTS`] (the subset table grows as 2^N).
    pub exact_threshold: usize,
    /// Upper bound on perturb-and-reoptimize rounds after the first local
    /// optimum (budget permitting).
    pub max_restarts: usize,
    /// Seed for restart perturbation.
    pub seed: u64,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            time_budget: None,
            first_solution: FirstSolutionStrategy::default(),
            exact_threshold: 13,
            max_restarts: 8,
            seed: 0,
        }
    }
}

/// Hard ceiling on the exact solver's input size; beyond it the subset
/// table would dominate memory, so the heuristic takes over regardless of
/// `exact_threshold`.
pub const MAX_EXACT_POINTS: usize = 16;

/// How the route search ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Exact solver: the route is a true minimum.
    Optimal,
    /// Heuristic search converged before the budget ran out.
    LocalOptimum,
    /// The time budget expired; the best route found so far is returned.
    BudgetExhausted,
}

/// A solved route: permutation, endpoints, and how the search ended.
#[derive(Debug, Clone)]
pub struct PlannedRoute {
    /// Visit order; a permutation of `[0, N)` with `order[0] == start`
    /// and `order[N-1] == end`.
    pub order: Vec<usize>,
    /// Total Euclidean length of the open path.
    pub length: f64,
    pub start: usize,
    pub end: usize,
    pub termination: Termination,
}

// ── Distance matrix ──────────────────────────────────────────────────────

/// Pairwise Euclidean distances in integer micro-units (world × 1000).
pub(crate) struct DistanceMatrix {
    n: usize,
    d: Vec<i64>,
}

impl DistanceMatrix {
    fn from_points(points: &[ConsensusPoint]) -> Self {
        let n = points.len();
        let mut d = vec![0i64; n * n];
        for i in 0..n {
            for j in (i + 1)..n {
                let dx = points[i].x - points[j].x;
                let dy = points[i].y - points[j].y;
                let micro = ((dx * dx + dy * dy).sqrt() * 1000.0).round() as i64;
                d[i * n + j] = micro;
                d[j * n + i] = micro;
            }
        }
        Self { n, d }
    }

    pub(crate) fn n(&self) -> usize {
        self.n
    }

    #[inline]
    pub(crate) fn at(&self, i: usize, j: usize) -> i64 {
        self.d[i * self.n + j]
    }

    pub(crate) fn path_cost(&self, order: &[usize]) -> i64 {
        order.windows(2).map(|w| self.at(w[0], w[1])).sum()
    }
}

/// Wall-clock cutoff derived from the caller's budget.
pub(crate) struct Deadline(Option<Instant>);

impl Deadline {
    fn from_budget(budget: Option<Duration>) -> Self {
        Self(budget.map(|b| Instant::now() + b))
    }

    pub(crate) fn exceeded(&self) -> bool {
        self.0.is_some_and(|t| Instant::now() >= t)
    }
}

// ── Planner ──────────────────────────────────────────────────────────────

/// Plan the shortest open route visiting every point once, pinned to
/// `start` and `end`.
///
/// Exact (Held–Karp) up to `config.exact_threshold` points, heuristic
/// construction plus 2-opt beyond. A single call is atomic: either a
/// validated route comes back or a typed error does; a budget expiry
/// returns the best route found so far flagged `BudgetExhausted`, never a
/// partial path.
pub fn plan_route(
    points: &[ConsensusPoint],
    start: usize,
    end: usize,
    config: &RouteConfig,
) -> Result<PlannedRoute, RouteError> {
    let n = points.len();
    if n < 2 {
        return Err(RouteError::TooFewPoints { got: n });
    }
    for index in [start, end] {
        if index >= n {
            return Err(RouteError::EndpointOutOfRange { index, n_points: n });
        }
    }
    if start == end {
        return Err(RouteError::EndpointsEqual { index: start });
    }

    let matrix = DistanceMatrix::from_points(points);
    let deadline = Deadline::from_budget(config.time_budget);

    let (order, termination) = if n <= config.exact_threshold.min(MAX_EXACT_POINTS) {
        (exact::solve(&matrix, start, end), Termination::Optimal)
    } else {
        local_search::solve(&matrix, start, end, config, &deadline)
    };

    validate(&order, n, start, end)
        .map_err(|detail| RouteError::SolverFailure { detail })?;

    let length = euclidean_length(points, &order);
    tracing::info!(
        "route over {} points: length {:.3} ({:?})",
        n,
        length,
        termination,
    );

    Ok(PlannedRoute {
        order,
        length,
        start,
        end,
        termination,
    })
}

/// Check the pinned-endpoint permutation invariant on a solver result.
fn validate(order: &[usize], n: usize, start: usize, end: usize) -> Result<(), String> {
    if order.len() != n {
        return Err(format!("route has {} entries, expected {}", order.len(), n));
    }
    if order[0] != start || order[n - 1] != end {
        return Err(format!(
            "route endpoints ({}, {}) do not match requested ({}, {})",
            order[0],
            order[n - 1],
            start,
            end,
        ));
    }
    let mut seen = vec![false; n];
    for &v in order {
        if v >= n || seen[v] {
            return Err(format!("route is not a permutation: index {}", v));
        }
        seen[v] = true;
    }
    Ok(())
}

fn euclidean_length(points: &[ConsensusPoint], order: &[usize]) -> f64 {
    order
        .windows(2)
        .map(|w| {
            let a = &points[w[0]];
            let b = &points[w[1]];
            ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
        })
        .sum()
}

/// Index of the point nearest a world coordinate (ties favor the lowest
/// index). `None` on an empty set. Used to anchor route endpoints by
/// position instead of index.
pub fn nearest_point_index(points: &[ConsensusPoint], x: f64, y: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, p) in points.iter().enumerate() {
        let d2 = p.dist2(x, y);
        if best.map_or(true, |(_, bd)| d2 < bd) {
            best = Some((i, d2));
        }
    }
    best.map(|(i, _)| i)
}

// ── Tests ────────────────────────────────────────────────────────────────
