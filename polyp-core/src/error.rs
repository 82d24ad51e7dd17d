//! Error taxonomy for the growth kernel.
//!
//! Soft conditions (capacity reached while remeshing, rejected collision
//! moves) never surface through these types from [`crate::organism::Organism::step`];
//! they are recorded as counters and per-vertex flags instead.

use crate::types::{OrganismId, VertexId};
use thiserror::Error;

/// Errors raised by local mesh edits and mesh construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeshError {
    /// The mesh already holds `max_vertices` vertices.
    #[error("vertex capacity of {max_vertices} reached")]
    CapacityExceeded { max_vertices: usize },
    /// Seed input is not a consistently oriented manifold triangle mesh.
    #[error("invalid topology: {0}")]
    InvalidTopology(String),
    /// An id referenced an element that does not exist.
    #[error("{kind} index {index} out of range")]
    InvalidIndex { kind: &'static str, index: usize },
}

/// Errors surfaced to the caller driving an organism.
#[derive(Debug, Error)]
pub enum SimError {
    /// A configuration value that cannot be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// Vector length or channel count disagreement detected at construction.
    #[error("configuration mismatch for {what}: expected {expected}, got {actual}")]
    ConfigurationMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    /// A NaN or infinite value appeared after a step. `vertex` is `None` when
    /// the offending value is an aggregate such as energy.
    #[error("non-finite state in organism {organism} at step {step} (vertex {vertex:?})")]
    NonFiniteState {
        organism: OrganismId,
        step: usize,
        vertex: Option<VertexId>,
    },
    /// The organism already failed and cannot be stepped again.
    #[error("organism {organism} aborted at step {step}")]
    Aborted { organism: OrganismId, step: usize },
    #[error(transparent)]
    Mesh(#[from] MeshError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Malformed line in an OBJ seed file.
    #[error("parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
}

impl SimError {
    /// Returns `true` for conditions that terminate an organism's run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SimError::NonFiniteState { .. } | SimError::Aborted { .. }
        )
    }
}
