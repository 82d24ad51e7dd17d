//! Sensory/action vector layout and the per-vertex decision boundary.
//!
//! The kernel never looks inside a decision function. It only needs the
//! vector lengths to match the [`SensoryLayout`] derived from [`Config`],
//! which [`crate::organism::Organism::new`] checks once.

use crate::config::Config;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Maps a per-vertex sensory vector to an action vector.
///
/// `inputs.len() == input_len()` and `outputs.len() == output_len()` on
/// every call. Implementations must not retain state between calls that
/// would make results depend on vertex visiting order.
pub trait DecisionFunction {
    /// Identifier used in logs.
    fn kind(&self) -> &'static str;

    fn input_len(&self) -> usize;

    fn output_len(&self) -> usize;

    /// Writes one action vector for one sensory vector.
    fn evaluate(&self, inputs: &[f32], outputs: &mut [f32]);
}

impl<T: DecisionFunction + ?Sized> DecisionFunction for Box<T> {
    fn kind(&self) -> &'static str {
        (**self).kind()
    }

    fn input_len(&self) -> usize {
        (**self).input_len()
    }

    fn output_len(&self) -> usize {
        (**self).output_len()
    }

    fn evaluate(&self, inputs: &[f32], outputs: &mut [f32]) {
        (**self).evaluate(inputs, outputs)
    }
}

/// Offsets of every channel inside the sensory and action vectors.
///
/// Sensory vector, every entry in `[-1, 1]`:
///
/// | range | meaning |
/// |-------|---------|
/// | `0` | light |
/// | `1` | curvature |
/// | `2` | collection |
/// | `morphogen_inputs()` | `morphogen_thresholds` bins per morphogen channel |
/// | `memory_inputs()` | one entry per memory bit |
/// | `signal_inputs()` | neighbor-mean of each signal channel |
/// | `bias()` | constant `1` |
///
/// Action vector: growth magnitude, one deposit flag per morphogen
/// channel, one write per memory bit, one value per signal channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensoryLayout {
    pub n_memory_bits: usize,
    pub n_signals: usize,
    pub n_morphogens: usize,
    pub morphogen_thresholds: usize,
}

impl SensoryLayout {
    pub const LIGHT: usize = 0;
    pub const CURVATURE: usize = 1;
    pub const COLLECTION: usize = 2;
    pub const GROWTH: usize = 0;

    pub fn from_config(cfg: &Config) -> Self {
        Self {
            n_memory_bits: cfg.n_memory_bits,
            n_signals: cfg.n_signal_channels,
            n_morphogens: cfg.n_morphogen_channels,
            morphogen_thresholds: cfg.morphogen_thresholds,
        }
    }

    pub fn morphogen_inputs(&self) -> std::ops::Range<usize> {
        let start = Self::COLLECTION + 1;
        start..start + self.n_morphogens * self.morphogen_thresholds
    }

    pub fn memory_inputs(&self) -> std::ops::Range<usize> {
        let start = self.morphogen_inputs().end;
        start..start + self.n_memory_bits
    }

    pub fn signal_inputs(&self) -> std::ops::Range<usize> {
        let start = self.memory_inputs().end;
        start..start + self.n_signals
    }

    pub fn bias(&self) -> usize {
        self.signal_inputs().end
    }

    pub fn input_len(&self) -> usize {
        self.bias() + 1
    }

    pub fn deposit_outputs(&self) -> std::ops::Range<usize> {
        let start = Self::GROWTH + 1;
        start..start + self.n_morphogens
    }

    pub fn memory_outputs(&self) -> std::ops::Range<usize> {
        let start = self.deposit_outputs().end;
        start..start + self.n_memory_bits
    }

    pub fn signal_outputs(&self) -> std::ops::Range<usize> {
        let start = self.memory_outputs().end;
        start..start + self.n_signals
    }

    pub fn output_len(&self) -> usize {
        self.signal_outputs().end
    }
}

/// Emits the same action vector for every vertex.
#[derive(Clone, Debug)]
pub struct ConstantGrowth {
    input_len: usize,
    outputs: Vec<f32>,
}

impl ConstantGrowth {
    /// Growth magnitude `growth`; every other action is zero.
    pub fn new(layout: &SensoryLayout, growth: f32) -> Self {
        let mut outputs = vec![0.0; layout.output_len()];
        outputs[SensoryLayout::GROWTH] = growth;
        Self {
            input_len: layout.input_len(),
            outputs,
        }
    }

    /// Fixed full action vector, or `None` when its length does not match
    /// `layout`.
    pub fn with_outputs(layout: &SensoryLayout, outputs: Vec<f32>) -> Option<Self> {
        (outputs.len() == layout.output_len()).then(|| Self {
            input_len: layout.input_len(),
            outputs,
        })
    }
}

impl DecisionFunction for ConstantGrowth {
    fn kind(&self) -> &'static str {
        "constant"
    }

    fn input_len(&self) -> usize {
        self.input_len
    }

    fn output_len(&self) -> usize {
        self.outputs.len()
    }

    fn evaluate(&self, _inputs: &[f32], outputs: &mut [f32]) {
        outputs.copy_from_slice(&self.outputs);
    }
}

/// Single dense layer with `tanh` activation: `out = tanh(W · in)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinearDecision {
    input_len: usize,
    output_len: usize,
    /// Row-major `output_len x input_len`.
    weights: Vec<f32>,
}

impl LinearDecision {
    /// Returns `None` when `weights` does not have `input_len * output_len`
    /// entries.
    pub fn new(input_len: usize, output_len: usize, weights: Vec<f32>) -> Option<Self> {
        (weights.len() == input_len * output_len).then_some(Self {
            input_len,
            output_len,
            weights,
        })
    }

    /// Weights drawn uniformly from `[-scale, scale]`.
    pub fn random(layout: &SensoryLayout, scale: f32, rng: &mut impl Rng) -> Self {
        let (input_len, output_len) = (layout.input_len(), layout.output_len());
        let weights = (0..input_len * output_len)
            .map(|_| rng.random_range(-scale..=scale))
            .collect();
        Self {
            input_len,
            output_len,
            weights,
        }
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }
}

impl DecisionFunction for LinearDecision {
    fn kind(&self) -> &'static str {
        "linear"
    }

    fn input_len(&self) -> usize {
        self.input_len
    }

    fn output_len(&self) -> usize {
        self.output_len
    }

    fn evaluate(&self, inputs: &[f32], outputs: &mut [f32]) {
        for (row, out) in self.weights.chunks_exact(self.input_len).zip(outputs.iter_mut()) {
            let z: f32 = row.iter().zip(inputs).map(|(w, x)| w * x).sum();
            *out = z.tanh();
        }
    }
}

/// Adapts a closure to [`DecisionFunction`].
pub struct FnDecision<F> {
    input_len: usize,
    output_len: usize,
    f: F,
}

impl<F> FnDecision<F>
where
    F: Fn(&[f32], &mut [f32]),
{
    pub fn new(layout: &SensoryLayout, f: F) -> Self {
        Self {
            input_len: layout.input_len(),
            output_len: layout.output_len(),
            f,
        }
    }
}

impl<F> DecisionFunction for FnDecision<F>
where
    F: Fn(&[f32], &mut [f32]),
{
    fn kind(&self) -> &'static str {
        "fn"
    }

    fn input_len(&self) -> usize {
        self.input_len
    }

    fn output_len(&self) -> usize {
        self.output_len
    }

    fn evaluate(&self, inputs: &[f32], outputs: &mut [f32]) {
        (self.f)(inputs, outputs)
    }
}
