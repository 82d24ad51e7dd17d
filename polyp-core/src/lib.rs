//! Surface-growth kernel for polyp meshes.
//!
//! Main components:
//! - [`mesh`]: half-edge triangle mesh, traversal and geometry.
//! - [`remesh`]: local edge/face splits and edge flips.
//! - [`collision`]: spatial hash that keeps the surface from self-intersecting.
//! - [`flow`]: voxel resource-transport field rebuilt every step.
//! - [`fields`]: per-polyp state, light, gravity and energy.
//! - [`decision`]: sensory/action layout and the decision-function trait.
//! - [`morphogen`]: the morphogen-field trait.
//! - [`buffer`]: per-vertex scratch rows for inputs and actions.
//! - [`phases`]: the growth-step pipeline.
//! - [`organism`]: one organism and its step state machine.
//! - [`export`]: annotated OBJ output and OBJ seed input.
//! - [`config`]: per-organism configuration.
//! - [`error`]: error types.
//! - [`types`]: shared id aliases.

pub mod buffer;
pub mod collision;
pub mod config;
pub mod decision;
pub mod error;
pub mod export;
pub mod fields;
pub mod flow;
pub mod mesh;
pub mod morphogen;
pub mod organism;
pub mod phases;
pub mod remesh;
pub mod types;

pub use config::Config;
pub use error::{MeshError, SimError};
pub use mesh::SurfaceMesh;
pub use organism::{Organism, StepPhase, StepReport};
