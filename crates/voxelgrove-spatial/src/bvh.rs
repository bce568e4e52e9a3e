//! Bounding volume hierarchy built by greedy pairwise merging.
//!
//! Construction works in passes. Each pass walks the list of unpaired nodes:
//! the leftmost one is merged with the partner whose union has the smallest
//! surface area, and the new parent goes to the list for the next pass. A
//! node left without a partner is carried over unchanged. Passes repeat until
//! a single root remains.
//!
//! A pass costs O(n²) surface-area evaluations, which is fine for the few
//! hundred models visible in a frame but not for whole-scene indexing.

use glam::Vec3;
use voxelgrove_core::{Aabb, Frustum};

/// One node in the flat node array.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BvhNode {
    pub bounds: Aabb,
    /// Distance from the root (root is 0).
    pub depth: u32,
    /// Index of the input box, set on leaves only.
    pub data: Option<usize>,
    pub parent: Option<usize>,
    pub left: Option<usize>,
    pub right: Option<usize>,
}

impl BvhNode {
    fn leaf(bounds: Aabb, data: usize) -> Self {
        Self {
            bounds,
            depth: 0,
            data: Some(data),
            parent: None,
            left: None,
            right: None,
        }
    }

    /// Returns true if the node carries an input box
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.data.is_some()
    }
}

/// Flat-array BVH over a slice of boxes.
#[derive(Clone, Debug, Default)]
pub struct Bvh {
    nodes: Vec<BvhNode>,
    root: Option<usize>,
}

impl Bvh {
    /// Build a hierarchy over `items`. Leaf `i` carries `data == Some(i)`.
    pub fn construct(items: &[Aabb]) -> Self {
        let mut nodes: Vec<BvhNode> = items
            .iter()
            .enumerate()
            .map(|(i, bounds)| BvhNode::leaf(*bounds, i))
            .collect();

        let mut unpaired: Vec<usize> = (0..nodes.len()).collect();
        let mut merged: Vec<usize> = Vec::with_capacity(unpaired.len() / 2 + 1);

        while unpaired.len() > 1 {
            while unpaired.len() >= 2 {
                let first = unpaired[0];
                let first_bounds = nodes[first].bounds;

                let mut best = 1;
                let mut best_area = f32::INFINITY;
                for (pos, &candidate) in unpaired.iter().enumerate().skip(1) {
                    let area = first_bounds.merge(&nodes[candidate].bounds).surface_area();
                    // Strict comparison keeps the first candidate on ties.
                    if area < best_area {
                        best_area = area;
                        best = pos;
                    }
                }

                let partner = unpaired.remove(best);
                unpaired.remove(0);

                let parent = nodes.len();
                nodes.push(BvhNode {
                    bounds: first_bounds.merge(&nodes[partner].bounds),
                    depth: 0,
                    data: None,
                    parent: None,
                    left: Some(first),
                    right: Some(partner),
                });
                nodes[first].parent = Some(parent);
                nodes[partner].parent = Some(parent);
                merged.push(parent);
            }
            merged.append(&mut unpaired);
            std::mem::swap(&mut unpaired, &mut merged);
        }

        let root = unpaired.first().copied();
        let mut bvh = Self { nodes, root };
        bvh.assign_depths();
        bvh
    }

    fn assign_depths(&mut self) {
        let Some(root) = self.root else {
            return;
        };
        self.nodes[root].depth = 0;
        let mut stack = vec![root];
        while let Some(index) = stack.pop() {
            let node = self.nodes[index];
            for child in [node.left, node.right].into_iter().flatten() {
                self.nodes[child].depth = node.depth + 1;
                stack.push(child);
            }
        }
    }

    /// Root node index, `None` for an empty hierarchy.
    pub fn root(&self) -> Option<usize> {
        self.root
    }

    /// All nodes. Leaves come first, in input order.
    pub fn nodes(&self) -> &[BvhNode] {
        &self.nodes
    }

    /// Number of input boxes
    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Returns true if the hierarchy has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Deepest node depth
    pub fn max_depth(&self) -> u32 {
        self.nodes.iter().map(|n| n.depth).max().unwrap_or(0)
    }

    /// Leaf payloads in depth-first, left-first order.
    ///
    /// With a frustum, subtrees whose bounds fail the frustum test are skipped.
    pub fn leaves_in_order(&self, frustum: Option<&Frustum>) -> Vec<usize> {
        let mut out = Vec::new();
        let Some(root) = self.root else {
            return out;
        };
        let mut stack = vec![root];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if frustum.is_some_and(|f| !f.test_aabb(&node.bounds)) {
                continue;
            }
            if let Some(data) = node.data {
                out.push(data);
                continue;
            }
            stack.extend(node.right);
            stack.extend(node.left);
        }
        out
    }

    /// Leaf payloads visiting the child nearer to `point` first.
    pub fn front_to_back(&self, point: Vec3, frustum: Option<&Frustum>) -> Vec<usize> {
        let mut out = Vec::new();
        let Some(root) = self.root else {
            return out;
        };
        let mut stack = vec![root];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if frustum.is_some_and(|f| !f.test_aabb(&node.bounds)) {
                continue;
            }
            if let Some(data) = node.data {
                out.push(data);
                continue;
            }
            match (node.left, node.right) {
                (Some(left), Some(right)) => {
                    let dl = self.nodes[left].bounds.distance_squared(point);
                    let dr = self.nodes[right].bounds.distance_squared(point);
                    let (near, far) = if dr < dl { (right, left) } else { (left, right) };
                    stack.push(far);
                    stack.push(near);
                }
                (Some(only), None) | (None, Some(only)) => stack.push(only),
                (None, None) => {}
            }
        }
        out
    }
}
