//! Per-polyp state and the scalar fields derived from geometry.

use crate::config::{Config, EnergyNormalization};
use crate::mesh::SurfaceMesh;
use crate::morphogen::MorphogenField;
use crate::types::VertexId;

/// Volumes at or below this are treated as degenerate for normalization.
const MIN_VOLUME: f32 = 1e-6;

/// Parallel per-vertex arrays owned by one organism.
///
/// Every buffer is sized to the mesh capacity up front and indexed by
/// [`VertexId`]. Entries past the current vertex count are unused.
#[derive(Debug, Clone)]
pub struct PolypState {
    n_memory_bits: usize,
    n_signals: usize,
    n_morphogens: usize,
    pub light: Vec<f32>,
    pub gravity: Vec<f32>,
    pub collection: Vec<f32>,
    /// Weighted light plus collection per vertex, before normalization.
    pub energy: Vec<f32>,
    memory: Vec<u64>,
    signals: Vec<f32>,
    morphogens: Vec<f32>,
    /// Normalized sum of `energy` after the last field refresh.
    pub total_energy: f32,
}

impl PolypState {
    pub fn new(cfg: &Config) -> Self {
        let cap = cfg.max_vertices;
        Self {
            n_memory_bits: cfg.n_memory_bits,
            n_signals: cfg.n_signal_channels,
            n_morphogens: cfg.n_morphogen_channels,
            light: vec![0.0; cap],
            gravity: vec![0.0; cap],
            collection: vec![0.0; cap],
            energy: vec![0.0; cap],
            memory: vec![0; cap],
            signals: vec![0.0; cap * cfg.n_signal_channels],
            morphogens: vec![0.0; cap * cfg.n_morphogen_channels],
            total_energy: 0.0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.light.len()
    }

    #[inline]
    pub fn n_memory_bits(&self) -> usize {
        self.n_memory_bits
    }

    #[inline]
    pub fn n_signals(&self) -> usize {
        self.n_signals
    }

    #[inline]
    pub fn n_morphogens(&self) -> usize {
        self.n_morphogens
    }

    #[inline]
    pub fn memory(&self, v: VertexId) -> u64 {
        self.memory[v]
    }

    #[inline]
    pub fn memory_bit(&self, v: VertexId, bit: usize) -> bool {
        self.memory[v] & (1 << bit) != 0
    }

    #[inline]
    pub fn set_memory_bit(&mut self, v: VertexId, bit: usize, on: bool) {
        if on {
            self.memory[v] |= 1 << bit;
        } else {
            self.memory[v] &= !(1 << bit);
        }
    }

    #[inline]
    pub fn signals(&self, v: VertexId) -> &[f32] {
        &self.signals[v * self.n_signals..(v + 1) * self.n_signals]
    }

    #[inline]
    pub fn signals_mut(&mut self, v: VertexId) -> &mut [f32] {
        &mut self.signals[v * self.n_signals..(v + 1) * self.n_signals]
    }

    /// Morphogen concentration seen by `v` at the last refresh.
    #[inline]
    pub fn morphogen(&self, v: VertexId, channel: usize) -> f32 {
        self.morphogens[v * self.n_morphogens + channel]
    }

    /// Copies current concentrations out of `field` for the first `count`
    /// vertices.
    pub fn snapshot_morphogens<M: MorphogenField + ?Sized>(&mut self, count: usize, field: &M) {
        for v in 0..count {
            for ch in 0..self.n_morphogens {
                self.morphogens[v * self.n_morphogens + ch] = field.concentration(ch, v);
            }
        }
    }

    /// Seeds a freshly inserted vertex from its already-initialized
    /// neighbors: per-bit majority vote for memory (ties clear the bit),
    /// arithmetic mean for signals.
    pub fn inherit(&mut self, v: VertexId, parents: &[VertexId]) {
        self.memory[v] = 0;
        self.signals_mut(v).fill(0.0);
        if parents.is_empty() {
            return;
        }

        for bit in 0..self.n_memory_bits {
            let votes = parents.iter().filter(|&&p| self.memory_bit(p, bit)).count();
            self.set_memory_bit(v, bit, 2 * votes > parents.len());
        }

        let inv = 1.0 / parents.len() as f32;
        for ch in 0..self.n_signals {
            let mean = parents
                .iter()
                .map(|&p| self.signals[p * self.n_signals + ch])
                .sum::<f32>()
                * inv;
            self.signals[v * self.n_signals + ch] = mean;
        }
    }
}

/// Light received by each vertex: `light_amount * max(0, normal · dir)`.
pub fn compute_light(mesh: &SurfaceMesh, cfg: &Config, out: &mut [f32]) {
    let dir = cfg.light_direction.normalize_or_zero();
    for (v, slot) in mesh.vertices().iter().zip(out.iter_mut()) {
        *slot = cfg.light_amount * v.normal.dot(dir).max(0.0);
    }
}

/// Gravity alignment of each vertex, `0` facing straight up and `1`
/// facing straight down.
pub fn compute_gravity(mesh: &SurfaceMesh, out: &mut [f32]) {
    for (v, slot) in mesh.vertices().iter().zip(out.iter_mut()) {
        *slot = 0.5 * (1.0 - v.normal.y);
    }
}

/// Fills `polyps.energy` with the weighted sum of light and collection
/// for every vertex and returns their total, normalized per
/// [`EnergyNormalization`].
pub fn compute_energy(mesh: &SurfaceMesh, polyps: &mut PolypState, cfg: &Config) -> f32 {
    let n = mesh.vertex_count();
    let mut raw = 0.0;
    let inputs = polyps.light[..n].iter().zip(&polyps.collection[..n]);
    for (slot, (&light, &collection)) in polyps.energy[..n].iter_mut().zip(inputs) {
        *slot = cfg.light_weight * light + cfg.collection_weight * collection;
        raw += *slot;
    }

    let norm = match cfg.energy_normalization {
        EnergyNormalization::Baseline(b) => b,
        EnergyNormalization::Volume => {
            let vol = if mesh.is_closed() { mesh.volume() } else { 0.0 };
            if vol > MIN_VOLUME { vol } else { 1.0 }
        }
    };
    raw / norm
}
