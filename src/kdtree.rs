//! Static k-d tree for nearest-neighbor lookup in feature space.
//!
//! Built once over the normalized corpus vectors and never mutated; the
//! query path is a standard depth-first descent with hyperplane pruning.
//! Dimensionality is fixed at build time (one corpus, one layout).

/// Static k-d tree over equal-length `f64` points.
#[derive(Debug, Clone)]
pub struct KdTree {
    points: Vec<Vec<f64>>,
    nodes: Vec<Node>,
    root: Option<usize>,
    dim: usize,
}

#[derive(Debug, Clone, Copy)]
struct Node {
    /// Index into `points` (doubles as the payload index).
    point: usize,
    axis: usize,
    left: Option<usize>,
    right: Option<usize>,
}

impl KdTree {
    /// Build a tree over `points`. All points must share one length.
    ///
    /// # Panics
    ///
    /// Debug-asserts equal point lengths.
    #[must_use]
    pub fn build(points: Vec<Vec<f64>>) -> Self {
        let dim = points.first().map_or(0, Vec::len);
        debug_assert!(points.iter().all(|p| p.len() == dim));

        let mut tree = Self {
            nodes: Vec::with_capacity(points.len()),
            root: None,
            dim,
            points,
        };
        let mut indices: Vec<usize> = (0..tree.points.len()).collect();
        tree.root = tree.build_node(&mut indices, 0);
        tree
    }

    fn build_node(&mut self, indices: &mut [usize], depth: usize) -> Option<usize> {
        if indices.is_empty() {
            return None;
        }
        let axis = depth % self.dim.max(1);
        indices.sort_by(|&a, &b| {
            self.points[a][axis]
                .partial_cmp(&self.points[b][axis])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let median = indices.len() / 2;
        let point = indices[median];

        let node_idx = self.nodes.len();
        self.nodes.push(Node {
            point,
            axis,
            left: None,
            right: None,
        });

        // Split around the median; the sort makes this O(n log^2 n) overall,
        // fine for a one-shot offline build.
        let (left_slice, rest) = indices.split_at_mut(median);
        let right_slice = &mut rest[1..];
        let left = self.build_node(left_slice, depth + 1);
        let right = self.build_node(right_slice, depth + 1);
        self.nodes[node_idx].left = left;
        self.nodes[node_idx].right = right;

        Some(node_idx)
    }

    /// Number of indexed points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the tree holds no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Stored point by payload index.
    #[must_use]
    pub fn point(&self, idx: usize) -> &[f64] {
        &self.points[idx]
    }

    /// Nearest neighbor of `query`: `(euclidean_distance, payload_index)`.
    ///
    /// Returns `None` on an empty tree.
    #[must_use]
    pub fn nearest(&self, query: &[f64]) -> Option<(f64, usize)> {
        let root = self.root?;
        let mut best = (f64::INFINITY, usize::MAX);
        self.search(root, query, &mut best);
        Some((best.0.sqrt(), best.1))
    }

    fn search(&self, node_idx: usize, query: &[f64], best: &mut (f64, usize)) {
        let node = self.nodes[node_idx];
        let dist_sq = squared_distance(query, &self.points[node.point]);
        if dist_sq < best.0 {
            *best = (dist_sq, node.point);
        }

        let delta = query[node.axis] - self.points[node.point][node.axis];
        let (near, far) = if delta < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };

        if let Some(near) = near {
            self.search(near, query, best);
        }
        // Cross the splitting plane only if it can still hold a closer point.
        if delta * delta < best.0 {
            if let Some(far) = far {
                self.search(far, query, best);
            }
        }
    }
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
