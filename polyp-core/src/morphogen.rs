//! Boundary to the morphogen (reaction-diffusion) field.
//!
//! The kernel reads per-vertex concentrations, forwards deposit actions, and
//! calls [`MorphogenField::update`] once per step. The update rule itself
//! belongs to the implementation.

use crate::mesh::SurfaceMesh;
use crate::types::VertexId;

pub trait MorphogenField {
    fn n_channels(&self) -> usize;

    /// Concentration of `channel` at `vertex`, in `[0, 1]`.
    fn concentration(&self, channel: usize, vertex: VertexId) -> f32;

    /// Records that `vertex` chose to emit into `channel` this step.
    fn deposit(&mut self, channel: usize, vertex: VertexId);

    /// Advances the field by `steps` internal iterations against the
    /// current mesh. Called once per growth step, never at organism
    /// construction.
    fn update(&mut self, mesh: &SurfaceMesh, steps: usize);
}

/// Zero-channel field for configurations without morphogens.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoMorphogens;

impl MorphogenField for NoMorphogens {
    fn n_channels(&self) -> usize {
        0
    }

    fn concentration(&self, _channel: usize, _vertex: VertexId) -> f32 {
        0.0
    }

    fn deposit(&mut self, _channel: usize, _vertex: VertexId) {}

    fn update(&mut self, _mesh: &SurfaceMesh, _steps: usize) {}
}

/// Field whose concentrations only change through deposits.
///
/// Each channel starts at a uniform level; every deposit raises that
/// vertex's value by `deposit_amount`, clamped to `1`. Vertices created
/// after construction start at the channel's base level.
#[derive(Clone, Debug)]
pub struct StaticMorphogens {
    base: Vec<f32>,
    deposit_amount: f32,
    /// Per channel, per vertex.
    values: Vec<Vec<f32>>,
    updates: usize,
}

impl StaticMorphogens {
    pub fn uniform(base: Vec<f32>, deposit_amount: f32) -> Self {
        let values = vec![Vec::new(); base.len()];
        Self {
            base,
            deposit_amount,
            values,
            updates: 0,
        }
    }

    /// Number of `update` calls received so far.
    pub fn updates(&self) -> usize {
        self.updates
    }
}

impl MorphogenField for StaticMorphogens {
    fn n_channels(&self) -> usize {
        self.base.len()
    }

    fn concentration(&self, channel: usize, vertex: VertexId) -> f32 {
        self.values[channel]
            .get(vertex)
            .copied()
            .unwrap_or(self.base[channel])
    }

    fn deposit(&mut self, channel: usize, vertex: VertexId) {
        let base = self.base[channel];
        let column = &mut self.values[channel];
        if column.len() <= vertex {
            column.resize(vertex + 1, base);
        }
        column[vertex] = (column[vertex] + self.deposit_amount).min(1.0);
    }

    fn update(&mut self, mesh: &SurfaceMesh, _steps: usize) {
        for (ch, column) in self.values.iter_mut().enumerate() {
            column.resize(mesh.vertex_count(), self.base[ch]);
        }
        self.updates += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_field_tracks_deposits() {
        let mesh = SurfaceMesh::octahedron(1.0, 8).unwrap();
        let mut field = StaticMorphogens::uniform(vec![0.2, 0.9], 0.5);
        assert_eq!(field.n_channels(), 2);
        assert_eq!(field.concentration(0, 3), 0.2);

        field.deposit(0, 3);
        field.deposit(1, 3);
        assert!((field.concentration(0, 3) - 0.7).abs() < 1e-6);
        assert_eq!(field.concentration(1, 3), 1.0);
        assert_eq!(field.concentration(0, 2), 0.2);

        field.update(&mesh, 100);
        assert_eq!(field.updates(), 1);
        assert!((field.concentration(0, 3) - 0.7).abs() < 1e-6);
        assert_eq!(field.concentration(0, 5), 0.2);
    }

    #[test]
    fn no_morphogens_is_inert() {
        let mesh = SurfaceMesh::octahedron(1.0, 8).unwrap();
        let mut field = NoMorphogens;
        field.deposit(0, 0);
        field.update(&mesh, 1);
        assert_eq!(field.n_channels(), 0);
    }
}
