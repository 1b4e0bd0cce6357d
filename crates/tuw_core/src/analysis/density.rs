//! # Density clustering
//!
//! Partitions feature points into dense groups with an outlier class.
//!
//! [`PointClusterer`] is the seam the trajectory grouping talks to. The
//! built-in [`DensityClusterer`] follows the usual hierarchical density
//! approach:
//! 1. core distance = distance to the `min_cluster_size`-th nearest point
//!    (the point itself included)
//! 2. minimum spanning tree over mutual reachability distances
//! 3. single-linkage hierarchy from the sorted tree edges
//! 4. hierarchy condensed so that splits leaving fewer than
//!    `min_cluster_size` points count as points falling out
//! 5. clusters picked by excess of mass (stability); the root is never a
//!    cluster, so points that only ever belong to it are noise

use crate::error::ClusterError;

/// Label given to points outside every cluster
pub const NOISE: i32 = -1;

/// Per-point labels plus one centroid per cluster.
///
/// Labels run `0..centroids.len()`; [`NOISE`] marks unclustered points.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Clustering {
    pub labels: Vec<i32>,
    pub centroids: Vec<Vec<f64>>,
}

impl Clustering {
    pub fn cluster_count(&self) -> usize {
        self.centroids.len()
    }

    pub fn noise_count(&self) -> usize {
        self.labels.iter().filter(|&&l| l == NOISE).count()
    }

    pub fn members(&self, label: i32) -> impl Iterator<Item = usize> + '_ {
        self.labels
            .iter()
            .enumerate()
            .filter(move |(_, &l)| l == label && l != NOISE)
            .map(|(i, _)| i)
    }

    pub fn centroid(&self, label: i32) -> Option<&[f64]> {
        usize::try_from(label).ok().and_then(|i| self.centroids.get(i)).map(Vec::as_slice)
    }
}

/// Capability: partition points into groups with an outlier class
pub trait PointClusterer: Send + Sync {
    fn cluster(&self, points: &[Vec<f64>]) -> Result<Clustering, ClusterError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DensityClusterer {
    pub min_cluster_size: usize,
}

impl Default for DensityClusterer {
    fn default() -> Self {
        Self { min_cluster_size: 2 }
    }
}

impl DensityClusterer {
    pub fn new(min_cluster_size: usize) -> Self {
        Self { min_cluster_size: min_cluster_size.max(2) }
    }

    fn validate(&self, points: &[Vec<f64>], min_size: usize) -> Result<(), ClusterError> {
        if points.len() < min_size {
            return Err(ClusterError::InsufficientData { points: points.len(), required: min_size });
        }

        let dim = points[0].len();
        if dim == 0 || points.iter().any(|p| p.len() != dim) {
            return Err(ClusterError::Degenerate("inconsistent point dimensions".to_string()));
        }
        if points.iter().flatten().any(|v| !v.is_finite()) {
            return Err(ClusterError::Degenerate("non-finite coordinate".to_string()));
        }

        Ok(())
    }
}

impl PointClusterer for DensityClusterer {
    fn cluster(&self, points: &[Vec<f64>]) -> Result<Clustering, ClusterError> {
        let m = self.min_cluster_size.max(2);
        self.validate(points, m)?;

        let n = points.len();

        let core = core_distances(points, m);
        let mut edges = minimum_spanning_tree(points, &core);
        edges.sort_by(|a, b| a.2.total_cmp(&b.2));

        let linkage = single_linkage(n, &edges);
        let tree = CondensedTree::build(n, &linkage, m);
        let selected = tree.select_clusters();

        // Selected condensed-tree ids → dense labels, in id order
        let mut label_of = vec![NOISE; tree.clusters.len()];
        let mut next = 0;
        for (id, _) in selected.iter().enumerate().filter(|(_, &s)| s) {
            label_of[id] = next;
            next += 1;
        }

        let labels: Vec<i32> = (0..n)
            .map(|p| {
                let mut cluster = Some(tree.point_parent[p]);
                while let Some(c) = cluster {
                    if selected[c] {
                        return label_of[c];
                    }
                    cluster = tree.clusters[c].parent;
                }
                NOISE
            })
            .collect();

        let centroids = centroids(points, &labels, next as usize);
        let clustering = Clustering { labels, centroids };

        log::debug!(
            "{} clusters from {} points ({} noise)",
            clustering.cluster_count(),
            n,
            clustering.noise_count()
        );

        Ok(clustering)
    }
}

// ============================================================================
// Distances
// ============================================================================

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f64>().sqrt()
}

fn core_distances(points: &[Vec<f64>], min_samples: usize) -> Vec<f64> {
    let k = (min_samples - 1).min(points.len() - 1);

    points
        .iter()
        .map(|p| {
            let mut dists: Vec<f64> = points.iter().map(|q| euclidean(p, q)).collect();
            dists.sort_by(f64::total_cmp);
            dists[k]
        })
        .collect()
}

/// Prim's algorithm over the complete mutual-reachability graph
fn minimum_spanning_tree(points: &[Vec<f64>], core: &[f64]) -> Vec<(usize, usize, f64)> {
    let n = points.len();
    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    let mut from = vec![0usize; n];
    let mut edges = Vec::with_capacity(n - 1);

    let mut current = 0;
    in_tree[0] = true;

    for _ in 1..n {
        for j in 0..n {
            if in_tree[j] {
                continue;
            }
            let reach = euclidean(&points[current], &points[j]).max(core[current]).max(core[j]);
            if reach < best[j] {
                best[j] = reach;
                from[j] = current;
            }
        }

        let next = (0..n)
            .filter(|&j| !in_tree[j])
            .min_by(|&a, &b| best[a].total_cmp(&best[b]))
            .unwrap_or(current);

        edges.push((from[next], next, best[next]));
        in_tree[next] = true;
        current = next;
    }

    edges
}

// ============================================================================
// Hierarchy
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct LinkageNode {
    left: usize,
    right: usize,
    distance: f64,
    size: usize,
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self { parent: (0..n).collect() }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) -> usize {
        self.parent[b] = a;
        a
    }
}

/// Merge nodes in edge order. Node ids `< n` are points, `n + k` is the
/// k-th merge.
fn single_linkage(n: usize, sorted_edges: &[(usize, usize, f64)]) -> Vec<LinkageNode> {
    let mut uf = UnionFind::new(n);
    let mut node_of: Vec<usize> = (0..n).collect();
    let mut nodes: Vec<LinkageNode> = Vec::with_capacity(n.saturating_sub(1));

    for &(a, b, distance) in sorted_edges {
        let (ra, rb) = (uf.find(a), uf.find(b));
        if ra == rb {
            continue;
        }

        let (left, right) = (node_of[ra], node_of[rb]);
        let size = node_size(n, &nodes, left) + node_size(n, &nodes, right);
        nodes.push(LinkageNode { left, right, distance, size });

        let root = uf.union(ra, rb);
        node_of[root] = n + nodes.len() - 1;
    }

    nodes
}

fn node_size(n: usize, nodes: &[LinkageNode], id: usize) -> usize {
    if id < n {
        1
    } else {
        nodes[id - n].size
    }
}

#[derive(Debug, Clone, Copy)]
struct CondensedCluster {
    parent: Option<usize>,
    /// Lambda at which the cluster split off its parent
    birth: f64,
}

/// Condensed tree: clusters plus every (parent, child, lambda, size) exit.
struct CondensedTree {
    clusters: Vec<CondensedCluster>,
    /// (parent cluster, lambda, size) of every child leaving a cluster
    exits: Vec<(usize, f64, usize)>,
    /// Cluster each point fell out of
    point_parent: Vec<usize>,
}

impl CondensedTree {
    fn build(n: usize, linkage: &[LinkageNode], min_size: usize) -> Self {
        let mut tree = CondensedTree {
            clusters: vec![CondensedCluster { parent: None, birth: 0.0 }],
            exits: Vec::new(),
            point_parent: vec![0; n],
        };

        let Some(root) = linkage.len().checked_sub(1).map(|k| n + k) else {
            return tree;
        };

        let mut stack = vec![(root, 0usize)];
        while let Some((node, cluster)) = stack.pop() {
            let link = linkage[node - n];
            let lambda = 1.0 / link.distance.max(1e-12);
            let left_size = node_size(n, linkage, link.left);
            let right_size = node_size(n, linkage, link.right);

            match (left_size >= min_size, right_size >= min_size) {
                (true, true) => {
                    for (child, size) in [(link.left, left_size), (link.right, right_size)] {
                        let id = tree.clusters.len();
                        tree.clusters.push(CondensedCluster { parent: Some(cluster), birth: lambda });
                        tree.exits.push((cluster, lambda, size));
                        stack.push((child, id));
                    }
                }
                (true, false) => {
                    tree.drop_points(n, linkage, link.right, cluster, lambda);
                    stack.push((link.left, cluster));
                }
                (false, true) => {
                    tree.drop_points(n, linkage, link.left, cluster, lambda);
                    stack.push((link.right, cluster));
                }
                (false, false) => {
                    tree.drop_points(n, linkage, link.left, cluster, lambda);
                    tree.drop_points(n, linkage, link.right, cluster, lambda);
                }
            }
        }

        tree
    }

    fn drop_points(&mut self, n: usize, linkage: &[LinkageNode], node: usize, cluster: usize, lambda: f64) {
        let mut pending = vec![node];
        while let Some(id) = pending.pop() {
            if id < n {
                self.point_parent[id] = cluster;
                self.exits.push((cluster, lambda, 1));
            } else {
                let link = linkage[id - n];
                pending.push(link.left);
                pending.push(link.right);
            }
        }
    }

    /// Excess-of-mass selection. Child ids are always larger than their
    /// parent's, so a reverse sweep sees children first.
    fn select_clusters(&self) -> Vec<bool> {
        let count = self.clusters.len();

        let mut stability = vec![0.0f64; count];
        for &(parent, lambda, size) in &self.exits {
            stability[parent] += (lambda - self.clusters[parent].birth) * size as f64;
        }

        let mut children: Vec<Vec<usize>> = vec![Vec::new(); count];
        for (id, cluster) in self.clusters.iter().enumerate() {
            if let Some(parent) = cluster.parent {
                children[parent].push(id);
            }
        }

        let mut selected = vec![true; count];
        selected[0] = false;

        for id in (1..count).rev() {
            let subtree: f64 = children[id].iter().map(|&c| stability[c]).sum();
            if subtree > stability[id] {
                selected[id] = false;
                stability[id] = subtree;
            } else {
                let mut pending = children[id].clone();
                while let Some(c) = pending.pop() {
                    selected[c] = false;
                    pending.extend_from_slice(&children[c]);
                }
            }
        }

        selected
    }
}

fn centroids(points: &[Vec<f64>], labels: &[i32], count: usize) -> Vec<Vec<f64>> {
    let dim = points.first().map_or(0, Vec::len);
    let mut sums = vec![vec![0.0; dim]; count];
    let mut sizes = vec![0usize; count];

    for (point, &label) in points.iter().zip(labels) {
        let Ok(label) = usize::try_from(label) else {
            continue;
        };
        sizes[label] += 1;
        for (sum, v) in sums[label].iter_mut().zip(point) {
            *sum += v;
        }
    }

    for (sum, size) in sums.iter_mut().zip(&sizes) {
        for v in sum.iter_mut() {
            *v /= (*size).max(1) as f64;
        }
    }

    sums
}
