//! Importance ranker: degree centrality + PageRank over a compact CSR
//! adjacency, combined into one score per node and a handful of relevance
//! tags. Deterministic for a fixed graph; pathological inputs (singletons,
//! cycles, disconnected components) degrade gracefully.

use std::collections::HashMap;

use tracing::debug;

use crate::{CodeNode, NodeKind, Relationship};

const DAMPING: f64 = 0.85;
const TOLERANCE: f64 = 1e-6;
const MAX_ITERATIONS: usize = 100;

/// In-degree above which a node is tagged "highly-used".
const HIGHLY_USED_THRESHOLD: usize = 3;
/// Out-degree above which a node is tagged "complex".
const COMPLEX_THRESHOLD: usize = 3;

/// Score weights: 0.4 in-degree, 0.2 out-degree, 0.4 PageRank.
const W_IN: f64 = 0.4;
const W_OUT: f64 = 0.2;
const W_PAGERANK: f64 = 0.4;

/// Annotate every node with an importance score in [0, 1] and relevance tags.
pub fn rank(nodes: &mut [CodeNode], edges: &[Relationship]) {
    let n = nodes.len();
    if n == 0 {
        return;
    }

    let index: HashMap<i64, usize> = nodes.iter().enumerate().map(|(i, n)| (n.id, i)).collect();

    // CSR out-adjacency plus degree counts.
    let mut out_degree = vec![0usize; n];
    let mut in_degree = vec![0usize; n];
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
    for edge in edges {
        let (Some(&src), Some(&dst)) = (index.get(&edge.source), index.get(&edge.target)) else {
            continue;
        };
        out_degree[src] += 1;
        in_degree[dst] += 1;
        adjacency[src].push(dst);
    }

    let pagerank = match compute_pagerank(&adjacency, &out_degree, n) {
        Some(pr) => pr,
        None => {
            debug!("PageRank did not converge, falling back to centrality-only scores");
            vec![0.0; n]
        }
    };

    let degree_norm = if n > 1 { (n - 1) as f64 } else { 1.0 };
    for (i, node) in nodes.iter_mut().enumerate() {
        let in_norm = in_degree[i] as f64 / degree_norm;
        let out_norm = out_degree[i] as f64 / degree_norm;

        // Degree terms are normalized; the PageRank term is used raw.
        let score = W_IN * in_norm + W_OUT * out_norm + W_PAGERANK * pagerank[i];
        node.importance_score = score.clamp(0.0, 1.0);
        node.frequency_score = in_norm.clamp(0.0, 1.0);

        apply_tags(node, in_degree[i], out_degree[i]);
    }
}

/// Standard power iteration with dangling-mass redistribution. Returns None
/// on divergence or non-finite intermediate values.
fn compute_pagerank(adjacency: &[Vec<usize>], out_degree: &[usize], n: usize) -> Option<Vec<f64>> {
    let inv_n = 1.0 / n as f64;
    let mut pr = vec![inv_n; n];
    let mut next = vec![0.0f64; n];

    for _ in 0..MAX_ITERATIONS {
        let dangling_mass: f64 =
            (0..n).filter(|&i| out_degree[i] == 0).map(|i| pr[i]).sum::<f64>();

        for slot in next.iter_mut() {
            *slot = (1.0 - DAMPING) * inv_n + DAMPING * dangling_mass * inv_n;
        }
        for (src, targets) in adjacency.iter().enumerate() {
            if targets.is_empty() {
                continue;
            }
            let share = DAMPING * pr[src] / targets.len() as f64;
            for &dst in targets {
                next[dst] += share;
            }
        }

        if next.iter().any(|v| !v.is_finite()) {
            return None;
        }

        let delta: f64 = pr.iter().zip(&next).map(|(a, b)| (a - b).abs()).sum();
        std::mem::swap(&mut pr, &mut next);
        if delta < TOLERANCE {
            return Some(pr);
        }
    }
    None
}

fn apply_tags(node: &mut CodeNode, in_degree: usize, out_degree: usize) {
    let mut push = |tag: &str, node: &mut CodeNode| {
        if !node.relevance_tags.iter().any(|t| t == tag) {
            node.relevance_tags.push(tag.to_string());
        }
    };

    if node.kind == NodeKind::Class {
        push("structural", node);
    }
    if in_degree > HIGHLY_USED_THRESHOLD {
        push("highly-used", node);
    }
    if out_degree > COMPLEX_THRESHOLD {
        push("complex", node);
    }
    if node.name.to_lowercase().contains("test") {
        push("test", node);
    }
    if node.kind == NodeKind::File {
        push("module", node);
    }
}
