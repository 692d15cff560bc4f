//! Quadtree over embedding points for Barnes-Hut force sums.
//!
//! Nodes live in a flat arena and every node carries the mass and center of
//! mass of its subtree, so a traversal can stop at any cell that looks
//! small enough from the query point and bill the whole cell at once.

/// Square cell centered on `(cx, cy)` with half-width `half`.
#[derive(Debug, Clone, Copy)]
struct Cell {
    cx: f64,
    cy: f64,
    half: f64,
}

impl Cell {
    /// Quadrant of a point inside this cell: bit 0 east, bit 1 north.
    fn quadrant(&self, x: f64, y: f64) -> usize {
        (x >= self.cx) as usize | (((y >= self.cy) as usize) << 1)
    }

    fn child(&self, q: usize) -> Cell {
        let h = self.half / 2.0;
        Cell {
            cx: if q & 1 == 1 { self.cx + h } else { self.cx - h },
            cy: if q & 2 == 2 { self.cy + h } else { self.cy - h },
            half: h,
        }
    }

    fn width(&self) -> f64 {
        self.half * 2.0
    }
}

/// Cells narrower than this hold near-coincident points as one pile
/// instead of subdividing further.
const MIN_HALF: f64 = 1e-10;

struct Node {
    cell: Cell,
    /// Point count in this subtree.
    mass: f64,
    /// Center of mass of this subtree.
    com: (f64, f64),
    /// Arena indices of the four children once subdivided.
    children: Option<[usize; 4]>,
    /// Representative point of an undivided leaf. Coincident inserts pile
    /// up here, tracked through `mass`.
    leaf: Option<(f64, f64)>,
}

impl Node {
    fn empty(cell: Cell) -> Self {
        Node {
            cell,
            mass: 0.0,
            com: (0.0, 0.0),
            children: None,
            leaf: None,
        }
    }
}

pub struct QuadTree {
    nodes: Vec<Node>,
}

impl QuadTree {
    /// Build a tree over the given points.
    pub fn build(points: &[(f64, f64)]) -> Self {
        let mut min_x = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        for &(x, y) in points {
            min_x = min_x.min(x);
            max_x = max_x.max(x);
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }
        let (cx, cy, half) = if points.is_empty() {
            (0.0, 0.0, 1.0)
        } else {
            let spread = (max_x - min_x).max(max_y - min_y);
            // Widen slightly so boundary points land strictly inside.
            let half = (spread / 2.0).max(1e-6) * (1.0 + 1e-9);
            ((min_x + max_x) / 2.0, (min_y + max_y) / 2.0, half)
        };

        let root = Cell { cx, cy, half };
        let mut tree = QuadTree {
            nodes: vec![Node::empty(root)],
        };
        for &p in points {
            tree.insert(p);
        }
        tree
    }

    fn insert(&mut self, p: (f64, f64)) {
        let mut idx = 0;
        loop {
            let node = &mut self.nodes[idx];
            node.com = (
                (node.com.0 * node.mass + p.0) / (node.mass + 1.0),
                (node.com.1 * node.mass + p.1) / (node.mass + 1.0),
            );
            node.mass += 1.0;

            if let Some(children) = node.children {
                idx = children[node.cell.quadrant(p.0, p.1)];
                continue;
            }

            let existing = match node.leaf {
                None => {
                    node.leaf = Some(p);
                    return;
                }
                Some(existing) => existing,
            };
            if existing == p || node.cell.half <= MIN_HALF {
                // Coincident pile; mass is already counted.
                return;
            }

            // Subdivide, moving the resident pile into its quadrant, then
            // keep walking down with the new point.
            let cell = node.cell;
            let pile_mass = node.mass - 1.0;
            node.leaf = None;
            let base = self.nodes.len();
            for q in 0..4 {
                self.nodes.push(Node::empty(cell.child(q)));
            }
            self.nodes[idx].children = Some([base, base + 1, base + 2, base + 3]);

            let resident = &mut self.nodes[base + cell.quadrant(existing.0, existing.1)];
            resident.mass = pile_mass;
            resident.com = existing;
            resident.leaf = Some(existing);

            idx = base + cell.quadrant(p.0, p.1);
        }
    }

    /// Total mass in the tree.
    pub fn mass(&self) -> f64 {
        self.nodes[0].mass
    }

    /// Center of mass of all points.
    pub fn center_of_mass(&self) -> (f64, f64) {
        self.nodes[0].com
    }

    /// Walk a Barnes-Hut summary of all mass as seen from `target`.
    ///
    /// A cell whose width over distance falls below `theta` is reported
    /// whole through its center of mass; otherwise the walk descends to its
    /// children. The visitor receives `(mass, dist2, delta)` with
    /// `delta = target - com`. Mass piled exactly on the target is treated
    /// as the target itself and skipped.
    pub fn for_each_summary<F>(&self, target: (f64, f64), theta: f64, visit: &mut F)
    where
        F: FnMut(f64, f64, (f64, f64)),
    {
        let mut stack = vec![0usize];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            if node.mass == 0.0 {
                continue;
            }
            let delta = (target.0 - node.com.0, target.1 - node.com.1);
            let dist2 = delta.0 * delta.0 + delta.1 * delta.1;
            match node.children {
                None => {
                    if dist2 > 0.0 {
                        visit(node.mass, dist2, delta);
                    }
                }
                Some(children) => {
                    let width = node.cell.width();
                    if width * width < theta * theta * dist2 {
                        visit(node.mass, dist2, delta);
                    } else {
                        stack.extend_from_slice(&children);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn scatter(n: usize) -> Vec<(f64, f64)> {
        // Deterministic blob with irrational strides so no two points
        // coincide.
        (0..n)
            .map(|i| {
                let t = i as f64;
                ((t * 0.618_034).fract() * 8.0 - 4.0, (t * 0.414_214).fract() * 6.0 - 3.0)
            })
            .collect()
    }

    #[test]
    fn test_root_tracks_count_and_mean() {
        let points = scatter(57);
        let tree = QuadTree::build(&points);
        assert_relative_eq!(tree.mass(), 57.0);
        let mx = points.iter().map(|p| p.0).sum::<f64>() / 57.0;
        let my = points.iter().map(|p| p.1).sum::<f64>() / 57.0;
        let com = tree.center_of_mass();
        assert_relative_eq!(com.0, mx, epsilon = 1e-9);
        assert_relative_eq!(com.1, my, epsilon = 1e-9);
    }

    #[test]
    fn test_zero_theta_walk_is_exact() {
        let points = scatter(40);
        let tree = QuadTree::build(&points);
        let target = points[7];

        let mut mass_seen = 0.0;
        let mut z = 0.0;
        tree.for_each_summary(target, 0.0, &mut |mass, dist2, _| {
            mass_seen += mass;
            z += mass / (1.0 + dist2);
        });

        let brute: f64 = points
            .iter()
            .enumerate()
            .filter(|&(j, _)| j != 7)
            .map(|(_, p)| {
                let dx = target.0 - p.0;
                let dy = target.1 - p.1;
                1.0 / (1.0 + dx * dx + dy * dy)
            })
            .sum();
        assert_relative_eq!(mass_seen, 39.0);
        assert_relative_eq!(z, brute, epsilon = 1e-12);
    }

    #[test]
    fn test_moderate_theta_stays_close_to_exact() {
        let points = scatter(200);
        let tree = QuadTree::build(&points);
        for &i in &[0usize, 50, 199] {
            let target = points[i];
            let mut approx_z = 0.0;
            tree.for_each_summary(target, 0.5, &mut |mass, dist2, _| {
                approx_z += mass / (1.0 + dist2);
            });
            let exact: f64 = points
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(_, p)| {
                    let dx = target.0 - p.0;
                    let dy = target.1 - p.1;
                    1.0 / (1.0 + dx * dx + dy * dy)
                })
                .sum();
            let rel = (approx_z - exact).abs() / exact;
            assert!(rel < 0.05, "relative error {rel} at point {i}");
        }
    }

    #[test]
    fn test_coincident_points_do_not_recurse_forever() {
        let mut points = vec![(1.25, -0.5); 100];
        points.push((2.0, 2.0));
        let tree = QuadTree::build(&points);
        assert_relative_eq!(tree.mass(), 101.0);

        // Seen from the lone point, the pile is a single visit of mass 100.
        let mut total = 0.0;
        let mut visits = 0;
        tree.for_each_summary((2.0, 2.0), 0.0, &mut |mass, _, _| {
            total += mass;
            visits += 1;
        });
        assert_relative_eq!(total, 100.0);
        assert_eq!(visits, 1);
    }
}
