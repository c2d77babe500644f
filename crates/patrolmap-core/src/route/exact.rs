//! Exact fixed-endpoint path solver: Held–Karp dynamic program.
//!
//! State is (subset of non-start nodes, last node); feasible to roughly
//! 13 points, which covers the exhaustively checkable range. The caller
//! guarantees `n >= 2`, `start != end`, both in range.

use super::DistanceMatrix;

const UNREACHED: i64 = i64::MAX / 4;

pub(super) fn solve(matrix: &DistanceMatrix, start: usize, end: usize) -> Vec<usize> {
    let n = matrix.n();
    let others: Vec<usize> = (0..n).filter(|&v| v != start).collect();
    let m = others.len();
    let end_slot = others
        .iter()
        .position(|&v| v == end)
        .expect("end differs from start");

    let full: usize = 1 << m;
    let mut cost = vec![UNREACHED; full * m];
    let mut parent = vec![usize::MAX; full * m];

    for j in 0..m {
        cost[(1 << j) * m + j] = matrix.at(start, others[j]);
    }

    for mask in 1..full {
        for j in 0..m {
            if mask & (1 << j) == 0 {
                continue;
            }
            let c = cost[mask * m + j];
            if c >= UNREACHED {
                continue;
            }
            for k in 0..m {
                if mask & (1 << k) != 0 {
                    continue;
                }
                let next = mask | (1 << k);
                let candidate = c + matrix.at(others[j], others[k]);
                let slot = next * m + k;
                if candidate < cost[slot] {
                    cost[slot] = candidate;
                    parent[slot] = j;
                }
            }
        }
    }

    // Walk parents back from (full set, end).
    let mut order = Vec::with_capacity(n);
    let mut mask = full - 1;
    let mut j = end_slot;
    loop {
        order.push(others[j]);
        let p = parent[mask * m + j];
        mask ^= 1 << j;
        if mask == 0 {
            break;
        }
        j = p;
    }
    order.push(start);
    order.reverse();
    order
}
