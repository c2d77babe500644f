//! Heuristic route search for point counts beyond the exact solver.
//!
//! Greedy construction (cheapest insertion or nearest neighbor), then
//! endpoint-preserving 2-opt to a local optimum, then seeded
//! double-bridge restarts while the time budget allows. The budget is
//! the cancellation mechanism: the best route so far is always kept
//! valid, so an expiry returns a usable result flagged as such.

use rand::prelude::*;

use super::{Deadline, DistanceMatrix, FirstSolutionStrategy, RouteConfig, Termination};

pub(super) fn solve(
    matrix: &DistanceMatrix,
    start: usize,
    end: usize,
    config: &RouteConfig,
    deadline: &Deadline,
) -> (Vec<usize>, Termination) {
    let mut order = match config.first_solution {
        FirstSolutionStrategy::CheapestInsertion => cheapest_insertion(matrix, start, end),
        FirstSolutionStrategy::NearestNeighbor => nearest_neighbor(matrix, start, end),
    };

    let mut termination = two_opt(matrix, &mut order, deadline);
    let mut best_cost = matrix.path_cost(&order);

    // Restarts are only worth it when the caller funded them.
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut restarts = 0;
    while termination == Termination::LocalOptimum
        && config.time_budget.is_some()
        && restarts < config.max_restarts
        && !deadline.exceeded()
    {
        let mut candidate = order.clone();
        double_bridge(&mut candidate, &mut rng);
        let t = two_opt(matrix, &mut candidate, deadline);

        let cost = matrix.path_cost(&candidate);
        if cost < best_cost {
            best_cost = cost;
            order = candidate;
        }
        if t == Termination::BudgetExhausted {
            termination = Termination::BudgetExhausted;
        }
        restarts += 1;
    }

    tracing::debug!(
        "local search: cost {} micro-units after {} restarts ({:?})",
        best_cost,
        restarts,
        termination,
    );

    (order, termination)
}

/// Start from the two pinned endpoints and repeatedly insert the
/// remaining point whose cheapest insertion position adds the least
/// length. Ties resolve to the earliest candidate and position, keeping
/// construction deterministic.
fn cheapest_insertion(matrix: &DistanceMatrix, start: usize, end: usize) -> Vec<usize> {
    let n = matrix.n();
    let mut order = vec![start, end];
    let mut remaining: Vec<usize> = (0..n).filter(|&v| v != start && v != end).collect();

    while !remaining.is_empty() {
        let mut best_slot = 0;
        let mut best_pos = 1;
        let mut best_delta = i64::MAX;

        for (slot, &v) in remaining.iter().enumerate() {
            for pos in 1..order.len() {
                let a = order[pos - 1];
                let b = order[pos];
                let delta = matrix.at(a, v) + matrix.at(v, b) - matrix.at(a, b);
                if delta < best_delta {
                    best_slot = slot;
                    best_pos = pos;
                    best_delta = delta;
                }
            }
        }

        let v = remaining.remove(best_slot);
        order.insert(best_pos, v);
    }

    order
}

/// Greedy chain from `start` over the interior points; `end` is reserved
/// for the terminal slot.
fn nearest_neighbor(matrix: &DistanceMatrix, start: usize, end: usize) -> Vec<usize> {
    let n = matrix.n();
    let mut order = Vec::with_capacity(n);
    let mut visited = vec![false; n];
    order.push(start);
    visited[start] = true;
    visited[end] = true;

    let mut current = start;
    for _ in 0..n.saturating_sub(2) {
        let mut best = usize::MAX;
        let mut best_dist = i64::MAX;
        for v in 0..n {
            if !visited[v] && matrix.at(current, v) < best_dist {
                best = v;
                best_dist = matrix.at(current, v);
            }
        }
        visited[best] = true;
        order.push(best);
        current = best;
    }

    order.push(end);
    order
}

/// 2-opt restricted to interior segment reversals, so the pinned
/// endpoints never move. Loops until no improving move remains or the
/// deadline expires.
fn two_opt(matrix: &DistanceMatrix, order: &mut [usize], deadline: &Deadline) -> Termination {
    let n = order.len();
    if n < 4 {
        return Termination::LocalOptimum;
    }

    loop {
        if deadline.exceeded() {
            return Termination::BudgetExhausted;
        }

        let mut improved = false;
        for i in 1..n - 2 {
            for j in (i + 1)..n - 1 {
                let a = order[i - 1];
                let b = order[i];
                let c = order[j];
                let d = order[j + 1];
                if matrix.at(a, c) + matrix.at(b, d) < matrix.at(a, b) + matrix.at(c, d) {
                    order[i..=j].reverse();
                    improved = true;
                }
            }
            if deadline.exceeded() {
                return Termination::BudgetExhausted;
            }
        }

        if !improved {
            return Termination::LocalOptimum;
        }
    }
}

/// Double-bridge perturbation over the interior: swap two interior
/// slices, leaving both endpoints fixed. A degenerate draw (repeated cut
/// points) leaves the order unchanged.
fn double_bridge(order: &mut Vec<usize>, rng: &mut StdRng) {
    let n = order.len();
    if n < 5 {
        return;
    }

    let mut cuts = [0usize; 3];
    for c in &mut cuts {
        *c = rng.gen_range(1..n - 1);
    }
    cuts.sort_unstable();
    let [p1, p2, p3] = cuts;
    if p1 == p2 || p2 == p3 {
        return;
    }

    let mut next = Vec::with_capacity(n);
    next.extend_from_slice(&order[..p1]);
    next.extend_from_slice(&order[p2..p3]);
    next.extend_from_slice(&order[p1..p2]);
    next.extend_from_slice(&order[p3..]);
    *order = next;
}

// ── Tests ────────────────────────────────────────────────────────────────
