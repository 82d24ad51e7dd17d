//! Uniform-grid spatial hash over vertex positions.
//!
//! Keeps non-adjacent vertices at least `min_separation` apart by gating
//! every committed move through [`CollisionIndex::attempt_update`].

use crate::config::{Config, MIN_COLLISION_CELL_FACTOR};
use crate::error::SimError;
use crate::mesh::SurfaceMesh;
use crate::types::VertexId;
use glam::Vec3;
use std::collections::{HashMap, HashSet};

type Cell = (i32, i32, i32);

#[derive(Debug, Clone)]
pub struct CollisionIndex {
    cell_size: f32,
    min_separation: f32,
    cells: HashMap<Cell, HashSet<VertexId>>,
    collided: Vec<bool>,
    entries: usize,
}

impl CollisionIndex {
    pub fn new(cell_size: f32, min_separation: f32, capacity: usize) -> Result<Self, SimError> {
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(SimError::InvalidConfig("collision cell size must be positive"));
        }
        if !(min_separation.is_finite() && min_separation > 0.0) {
            return Err(SimError::InvalidConfig("min_separation must be positive"));
        }
        if cell_size < MIN_COLLISION_CELL_FACTOR * min_separation {
            return Err(SimError::InvalidConfig(
                "collision cell size must be at least half of min_separation",
            ));
        }
        Ok(Self {
            cell_size,
            min_separation,
            cells: HashMap::new(),
            collided: vec![false; capacity],
            entries: 0,
        })
    }

    /// Builds an index holding every vertex of `mesh`.
    pub fn from_mesh(mesh: &SurfaceMesh, cfg: &Config) -> Result<Self, SimError> {
        let mut index = Self::new(
            cfg.collision_cell_size(),
            cfg.min_separation,
            mesh.max_vertices(),
        )?;
        for v in mesh.vertices() {
            index.insert(v.id, v.position);
        }
        Ok(index)
    }

    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    #[inline]
    pub fn min_separation(&self) -> f32 {
        self.min_separation
    }

    /// Number of ids currently stored.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    #[inline]
    fn cell_of(&self, p: Vec3) -> Cell {
        let c = (p / self.cell_size).floor();
        (c.x as i32, c.y as i32, c.z as i32)
    }

    pub fn insert(&mut self, id: VertexId, position: Vec3) {
        let cell = self.cell_of(position);
        if self.cells.entry(cell).or_default().insert(id) {
            self.entries += 1;
        }
        if id >= self.collided.len() {
            self.collided.resize(id + 1, false);
        }
    }

    /// Removes `id` from the cell containing `position`.
    ///
    /// ### Returns
    /// `true` if the id was stored there.
    pub fn remove(&mut self, id: VertexId, position: Vec3) -> bool {
        let cell = self.cell_of(position);
        let Some(set) = self.cells.get_mut(&cell) else {
            return false;
        };
        let removed = set.remove(&id);
        if set.is_empty() {
            self.cells.remove(&cell);
        }
        if removed {
            self.entries -= 1;
        }
        removed
    }

    /// Moves `id` from the cell of `from` to the cell of `to`. No-op when
    /// both positions share a cell.
    pub fn relocate(&mut self, id: VertexId, from: Vec3, to: Vec3) {
        if self.cell_of(from) == self.cell_of(to) {
            return;
        }
        self.remove(id, from);
        self.insert(id, to);
    }

    /// All ids stored in cells overlapping the axis-aligned box of
    /// half-size `radius` around `position`.
    pub fn nearby(&self, position: Vec3, radius: f32) -> Vec<VertexId> {
        let lo = self.cell_of(position - Vec3::splat(radius));
        let hi = self.cell_of(position + Vec3::splat(radius));
        let mut out = Vec::new();
        for x in lo.0..=hi.0 {
            for y in lo.1..=hi.1 {
                for z in lo.2..=hi.2 {
                    if let Some(set) = self.cells.get(&(x, y, z)) {
                        out.extend(set.iter().copied());
                    }
                }
            }
        }
        out
    }

    /// Tries to move vertex `id` to `candidate`.
    ///
    /// The move is rejected if any vertex other than `id` and its one-ring
    /// neighbors lies strictly closer than `min_separation` to `candidate`.
    /// On acceptance both the index and the mesh position are updated; on
    /// rejection the vertex stays put and its collision flag is set.
    ///
    /// ### Returns
    /// `true` if the move was committed.
    pub fn attempt_update(
        &mut self,
        mesh: &mut SurfaceMesh,
        id: VertexId,
        candidate: Vec3,
    ) -> bool {
        let ring = mesh.neighbors(id);
        let r2 = self.min_separation * self.min_separation;

        let blocked = self
            .nearby(candidate, self.min_separation)
            .into_iter()
            .filter(|&other| other != id && !ring.contains(&other))
            .any(|other| mesh.position(other).distance_squared(candidate) < r2);

        if blocked {
            self.collided[id] = true;
            return false;
        }

        let old = mesh.position(id);
        self.relocate(id, old, candidate);
        mesh.set_position(id, candidate);
        true
    }

    #[inline]
    pub fn collided(&self, id: VertexId) -> bool {
        self.collided.get(id).copied().unwrap_or(false)
    }

    pub fn collided_count(&self) -> usize {
        self.collided.iter().filter(|c| **c).count()
    }

    pub fn clear_collisions(&mut self) {
        self.collided.fill(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn flat_cfg() -> Config {
        Config {
            min_separation: 0.1,
            collision_cell_factor: 1.0,
            ..Config::default()
        }
    }

    #[test]
    fn insert_nearby_and_remove() {
        let mut index = CollisionIndex::new(1.0, 0.5, 4).unwrap();
        index.insert(0, Vec3::new(0.2, 0.2, 0.2));
        index.insert(1, Vec3::new(5.0, 5.0, 5.0));
        index.insert(2, Vec3::new(-0.3, 0.1, 0.1));
        assert_eq!(index.len(), 3);

        let mut near = index.nearby(Vec3::ZERO, 0.5);
        near.sort();
        assert_eq!(near, vec![0, 2]);

        assert!(index.remove(2, Vec3::new(-0.3, 0.1, 0.1)));
        assert!(!index.remove(2, Vec3::new(-0.3, 0.1, 0.1)));
        assert_eq!(index.nearby(Vec3::ZERO, 0.5), vec![0]);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn relocate_moves_between_cells() {
        let mut index = CollisionIndex::new(1.0, 0.5, 2).unwrap();
        let a = Vec3::new(0.1, 0.1, 0.1);
        let b = Vec3::new(0.9, 0.9, 0.9);
        let far = Vec3::new(3.5, 0.1, 0.1);
        index.insert(0, a);

        index.relocate(0, a, b);
        assert_eq!(index.nearby(a, 0.0), vec![0]);

        index.relocate(0, b, far);
        assert!(index.nearby(a, 0.0).is_empty());
        assert_eq!(index.nearby(far, 0.0), vec![0]);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn rejects_invalid_cell_size() {
        assert!(CollisionIndex::new(0.0, 0.1, 1).is_err());
        assert!(CollisionIndex::new(1.0, f32::NAN, 1).is_err());
        assert!(CollisionIndex::new(1e-5, 0.1, 1).is_err());
        assert!(CollisionIndex::new(0.05, 0.1, 1).is_ok());
    }

    #[test]
    fn move_into_non_neighbor_is_rejected() {
        // Two disconnected triangles; vertex 0 tries to move onto vertex 3.
        let positions = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.05, 0.0, 0.0),
            Vec3::new(0.0, 0.0, -0.05),
            Vec3::new(0.5, 0.0, 0.0),
            Vec3::new(0.6, 0.0, 0.0),
            Vec3::new(0.5, 0.0, -0.1),
        ];
        let mut mesh =
            SurfaceMesh::from_triangles(&positions, &[[0, 1, 2], [3, 4, 5]], 8).unwrap();
        let mut index = CollisionIndex::from_mesh(&mesh, &flat_cfg()).unwrap();

        let candidate = Vec3::new(0.45, 0.0, 0.0);
        assert!(!index.attempt_update(&mut mesh, 0, candidate));
        assert_eq!(mesh.position(0), Vec3::ZERO);
        assert!(index.collided(0));
        assert_eq!(index.collided_count(), 1);

        // Adjacent vertices may come closer than the separation distance.
        assert!(index.attempt_update(&mut mesh, 0, Vec3::new(0.04, 0.0, 0.0)));
        assert_eq!(mesh.position(0), Vec3::new(0.04, 0.0, 0.0));

        index.clear_collisions();
        assert!(!index.collided(0));
    }

    #[test]
    fn random_moves_preserve_separation() {
        let mut rng = SmallRng::seed_from_u64(7);
        let cfg = flat_cfg();

        // Scatter isolated triangles so no vertex starts too close to a
        // non-neighbor.
        let mut positions = Vec::new();
        let mut triangles = Vec::new();
        for i in 0..6 {
            for j in 0..6 {
                let o = Vec3::new(i as f32 * 0.5, 0.0, j as f32 * 0.5);
                let base = positions.len();
                positions.push(o);
                positions.push(o + Vec3::new(0.15, 0.0, 0.0));
                positions.push(o + Vec3::new(0.0, 0.0, -0.15));
                triangles.push([base, base + 1, base + 2]);
            }
        }
        let n = positions.len();
        let mut mesh = SurfaceMesh::from_triangles(&positions, &triangles, n).unwrap();
        let mut index = CollisionIndex::from_mesh(&mesh, &cfg).unwrap();

        for _ in 0..2_000 {
            let id = rng.random_range(0..n);
            let step = Vec3::new(
                rng.random_range(-0.2..0.2),
                rng.random_range(-0.05..0.05),
                rng.random_range(-0.2..0.2),
            );
            let candidate = mesh.position(id) + step;
            index.attempt_update(&mut mesh, id, candidate);
        }

        for a in 0..n {
            let ring = mesh.neighbors(a);
            for b in (a + 1)..n {
                if ring.contains(&b) {
                    continue;
                }
                let d = mesh.position(a).distance(mesh.position(b));
                assert!(d >= cfg.min_separation, "{a} and {b} are {d} apart");
            }
        }
        assert_eq!(index.len(), n);
    }
}
