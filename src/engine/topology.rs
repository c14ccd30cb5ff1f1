// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Deterministic topological ordering of the unit graph.
//!
//! # Algorithm
//!
//! Kahn's algorithm with a min-heap of ready nodes. Nodes are indices in
//! declaration order, so whenever several units are ready at once the one
//! declared first is scheduled first. The resulting order depends only on
//! the graph, never on hash iteration order.
//!
//! When Kahn's algorithm stalls, the nodes left over contain at least one
//! cycle; [`find_cycle`] extracts one with the three-colour DFS and returns
//! it closed (first node repeated at the end).

use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Order `node_count` nodes so that for every edge `(from, to)`, `from`
/// comes before `to`. Returns a cycle on failure.
pub fn topological_order(node_count: usize, edges: &[(usize, usize)]) -> Result<Vec<usize>, Vec<usize>> {
    let mut dependents = vec![Vec::new(); node_count];
    let mut in_degree = vec![0usize; node_count];
    for &(from, to) in edges {
        dependents[from].push(to);
        in_degree[to] += 1;
    }

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(node, _)| Reverse(node))
        .collect();

    let mut order = Vec::with_capacity(node_count);
    while let Some(Reverse(node)) = ready.pop() {
        order.push(node);
        for &dependent in &dependents[node] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.push(Reverse(dependent));
            }
        }
    }

    if order.len() == node_count {
        Ok(order)
    } else {
        Err(find_cycle(&dependents).unwrap_or_default())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Colour {
    White,
    Grey,
    Black,
}

/// One cycle of the graph given as adjacency lists, if any.
pub fn find_cycle(dependents: &[Vec<usize>]) -> Option<Vec<usize>> {
    let mut colours = vec![Colour::White; dependents.len()];
    let mut path = Vec::new();
    for start in 0..dependents.len() {
        if colours[start] == Colour::White {
            if let Some(cycle) = visit(start, dependents, &mut colours, &mut path) {
                return Some(cycle);
            }
        }
    }
    None
}

fn visit(
    node: usize,
    dependents: &[Vec<usize>],
    colours: &mut [Colour],
    path: &mut Vec<usize>,
) -> Option<Vec<usize>> {
    colours[node] = Colour::Grey;
    path.push(node);

    for &next in &dependents[node] {
        match colours[next] {
            Colour::White => {
                if let Some(cycle) = visit(next, dependents, colours, path) {
                    return Some(cycle);
                }
            }
            Colour::Grey => {
                let start = path.iter().position(|n| *n == next)?;
                let mut cycle = path[start..].to_vec();
                cycle.push(next);
                return Some(cycle);
            }
            Colour::Black => {}
        }
    }

    colours[node] = Colour::Black;
    path.pop();
    None
}
