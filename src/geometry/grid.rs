//! Recursive cubic subdivision. A `CubicGrid` splits its root box into
//! `r * s * t` children; each leaf cell owns the `(r,s,t)` index path that
//! locates it and an interval tree of cost contributions (owned by the grid
//! environment, not here — this module is purely geometric).

use super::Aabb3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellIndex {
    pub r: i32,
    pub s: i32,
    pub t: i32,
}

#[derive(Clone, Debug)]
pub struct CubicGrid {
    pub root: Aabb3,
    pub counts: (i32, i32, i32),
}

impl CubicGrid {
    pub fn new(root: Aabb3, counts: (i32, i32, i32)) -> Self {
        CubicGrid { root, counts }
    }

    pub fn normalizer(&self) -> f64 {
        self.root.longest_edge()
    }

    fn cell_size(&self) -> [f64; 3] {
        [
            (self.root.max[0] - self.root.min[0]) / self.counts.0 as f64,
            (self.root.max[1] - self.root.min[1]) / self.counts.1 as f64,
            (self.root.max[2] - self.root.min[2]) / self.counts.2 as f64,
        ]
    }

    pub fn cell_bound(&self, idx: CellIndex) -> Aabb3 {
        let size = self.cell_size();
        let min = [
            self.root.min[0] + idx.r as f64 * size[0],
            self.root.min[1] + idx.s as f64 * size[1],
            self.root.min[2] + idx.t as f64 * size[2],
        ];
        let max = [min[0] + size[0], min[1] + size[1], min[2] + size[2]];
        Aabb3::new(min, max)
    }

    /// Finest-level cell index containing `point`, or `None` if outside the
    /// root box.
    pub fn lookup_cell(&self, point: [f64; 3]) -> Option<CellIndex> {
        if !self.root.contains_point(point) {
            return None;
        }
        let size = self.cell_size();
        let r = (((point[0] - self.root.min[0]) / size[0]) as i32).min(self.counts.0 - 1);
        let s = (((point[1] - self.root.min[1]) / size[1]) as i32).min(self.counts.1 - 1);
        let t = (((point[2] - self.root.min[2]) / size[2]) as i32).min(self.counts.2 - 1);
        Some(CellIndex { r, s, t })
    }

    /// All cells whose box intersects `bound` -- used by `embed`/`unembed` to
    /// push an obstacle or cost interval into every affected leaf.
    pub fn lookup_cells(&self, bound: &Aabb3) -> Vec<CellIndex> {
        let mut out = Vec::new();
        for r in 0..self.counts.0 {
            for s in 0..self.counts.1 {
                for t in 0..self.counts.2 {
                    let idx = CellIndex { r, s, t };
                    if self.cell_bound(idx).intersects(bound) {
                        out.push(idx);
                    }
                }
            }
        }
        out
    }

    /// Up to 6 axis-neighbours of `cell`.
    pub fn neighbors(&self, cell: CellIndex) -> Vec<CellIndex> {
        let deltas = [
            (1, 0, 0),
            (-1, 0, 0),
            (0, 1, 0),
            (0, -1, 0),
            (0, 0, 1),
            (0, 0, -1),
        ];
        deltas
            .iter()
            .map(|&(dr, ds, dt)| CellIndex {
                r: cell.r + dr,
                s: cell.s + ds,
                t: cell.t + dt,
            })
            .filter(|c| {
                c.r >= 0
                    && c.r < self.counts.0
                    && c.s >= 0
                    && c.s < self.counts.1
                    && c.t >= 0
                    && c.t < self.counts.2
            })
            .collect()
    }

    pub fn are_neighbors(&self, a: CellIndex, b: CellIndex) -> bool {
        let dr = (a.r - b.r).abs();
        let ds = (a.s - b.s).abs();
        let dt = (a.t - b.t).abs();
        dr + ds + dt == 1
    }

    pub fn corners(&self, cell: CellIndex) -> Vec<[f64; 3]> {
        self.cell_bound(cell).corners()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> CubicGrid {
        CubicGrid::new(Aabb3::new([0.0, 0.0, 0.0], [10.0, 10.0, 10.0]), (10, 10, 10))
    }

    #[test]
    fn lookup_cell_finds_finest_level() {
        let g = grid();
        let idx = g.lookup_cell([5.5, 5.5, 5.5]).unwrap();
        assert_eq!(idx, CellIndex { r: 5, s: 5, t: 5 });
    }

    #[test]
    fn neighbors_returns_up_to_six() {
        let g = grid();
        let center = CellIndex { r: 5, s: 5, t: 5 };
        assert_eq!(g.neighbors(center).len(), 6);

        let corner = CellIndex { r: 0, s: 0, t: 0 };
        assert_eq!(g.neighbors(corner).len(), 3);
    }

    #[test]
    fn are_neighbors_requires_single_axis_step() {
        let g = grid();
        assert!(g.are_neighbors(CellIndex { r: 1, s: 1, t: 1 }, CellIndex { r: 2, s: 1, t: 1 }));
        assert!(!g.are_neighbors(CellIndex { r: 1, s: 1, t: 1 }, CellIndex { r: 2, s: 2, t: 1 }));
    }

    #[test]
    fn normalizer_is_longest_root_edge() {
        let g = CubicGrid::new(Aabb3::new([0.0, 0.0, 0.0], [10.0, 20.0, 5.0]), (1, 1, 1));
        assert_eq!(g.normalizer(), 20.0);
    }
}
