//! Growth-step phases for a single organism.
//!
//! One step runs, in order:
//! 1. [`build_inputs_phase`]: assemble a sensory vector per eligible vertex
//!    into a [`PolypBuffer`].
//! 2. [`decision_phase`]: evaluate the [`DecisionFunction`] on every
//!    active row, producing action vectors.
//! 3. [`apply_moves_phase`]: displace vertices through the
//!    [`CollisionIndex`] and apply memory, signal and morphogen writes.
//! 4. [`remesh_phase`]: split oversized faces, flip long edges, seed new
//!    vertices from their neighbors.
//! 5. [`refresh_fields_phase`]: recompute normals, curvature, morphogens,
//!    light, gravity, resource collection and energy.
//!
//! [`crate::organism::Organism::step`] drives these in sequence.

use crate::{
    buffer::PolypBuffer,
    collision::CollisionIndex,
    config::Config,
    decision::{DecisionFunction, SensoryLayout},
    error::{MeshError, SimError},
    fields::{PolypState, compute_energy, compute_gravity, compute_light},
    flow::{FlowParams, ResourceFlowField},
    mesh::SurfaceMesh,
    morphogen::MorphogenField,
    types::VertexId,
};
use glam::Vec3;
use serde::Serialize;
use std::f32::consts::PI;
use tracing::trace;

/// Counters from [`apply_moves_phase`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MoveStats {
    pub accepted: usize,
    pub rejected: usize,
    /// Vertices that decided on zero displacement.
    pub stationary: usize,
}

/// Counters from [`remesh_phase`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RemeshStats {
    pub splits: usize,
    pub flips: usize,
    pub new_vertices: usize,
    /// A split was refused because the mesh is full.
    pub capacity_reached: bool,
}

/// Maps a value in `[0, 1]` to `[-1, 1]`, clamping first.
#[inline]
fn signed_unit(x: f32) -> f32 {
    x.clamp(0.0, 1.0) * 2.0 - 1.0
}

/// Fills one sensory row per vertex that may grow this step.
///
/// For every vertex (skipping those strictly below `cfg.ground_y` when
/// `cfg.has_ground` is set), writes, in [`SensoryLayout`] order:
///
/// 1. Light, curvature (`κ / π`) and collection, mapped to `[-1, 1]`.
/// 2. `morphogen_thresholds` thermometer bins per morphogen channel: bin
///    `j` is `1` when the concentration reaches `(j + 1) / (t + 1)`, else
///    `-1`.
/// 3. One `±1` entry per memory bit.
/// 4. The mean of each signal channel over the vertex's one-ring, mapped
///    to `[-1, 1]` (`-1` for an isolated vertex).
/// 5. A constant bias of `1`.
///
/// The buffer is resized (and cleared) to the current vertex count at the
/// start of this phase via [`PolypBuffer::ensure_len`].
///
/// ### Parameters
/// - `mesh` - Current geometry; only read access is required.
/// - `polyps` - Cached per-vertex fields from the previous refresh.
/// - `layout` - Vector layout shared with the decision function.
/// - `cfg` - Provides the ground-plane policy.
/// - `inputs` - Output buffer of width `layout.input_len()`.
///
/// ### Returns
/// The number of vertices skipped by the ground policy.
pub fn build_inputs_phase(
    mesh: &SurfaceMesh,
    polyps: &PolypState,
    layout: &SensoryLayout,
    cfg: &Config,
    inputs: &mut PolypBuffer,
) -> usize {
    inputs.ensure_len(mesh.vertex_count());
    let bins = layout.morphogen_thresholds;
    let mut skipped = 0;

    for v in mesh.vertices() {
        let id = v.id;
        if cfg.has_ground && v.position.y < cfg.ground_y {
            skipped += 1;
            continue;
        }
        let ring = mesh.neighbors(id);
        let row = inputs.row_mut(id);

        row[SensoryLayout::LIGHT] = signed_unit(polyps.light[id]);
        row[SensoryLayout::CURVATURE] = (v.curvature / PI).clamp(-1.0, 1.0);
        row[SensoryLayout::COLLECTION] = signed_unit(polyps.collection[id]);

        let morph = layout.morphogen_inputs();
        for ch in 0..layout.n_morphogens {
            let u = polyps.morphogen(id, ch);
            for j in 0..bins {
                let threshold = (j + 1) as f32 / (bins + 1) as f32;
                row[morph.start + ch * bins + j] = if u >= threshold { 1.0 } else { -1.0 };
            }
        }

        for (bit, slot) in layout.memory_inputs().enumerate() {
            row[slot] = if polyps.memory_bit(id, bit) { 1.0 } else { -1.0 };
        }

        for (ch, slot) in layout.signal_inputs().enumerate() {
            let mean = if ring.is_empty() {
                0.0
            } else {
                ring.iter().map(|&n| polyps.signals(n)[ch]).sum::<f32>() / ring.len() as f32
            };
            row[slot] = signed_unit(mean);
        }

        row[layout.bias()] = 1.0;
    }

    skipped
}

/// Evaluates the decision function once for every active input row.
///
/// The action buffer is resized (and cleared) to match `inputs`; rows
/// whose input row was inactive stay inactive.
pub fn decision_phase<D: DecisionFunction + ?Sized>(
    decision: &D,
    inputs: &PolypBuffer,
    actions: &mut PolypBuffer,
) {
    actions.ensure_len(inputs.len());
    for id in inputs.active_indices() {
        decision.evaluate(inputs.row(id), actions.row_mut(id));
    }
}

/// Spring rest position for `id`: the mean over its neighbors `n` of the
/// point `rest_len` away from `n` toward `id`.
fn spring_target(mesh: &SurfaceMesh, id: VertexId, rest_len: f32) -> Option<Vec3> {
    let ring = mesh.neighbors(id);
    if ring.is_empty() {
        return None;
    }
    let p = mesh.position(id);
    let sum: Vec3 = ring
        .iter()
        .map(|&n| {
            let q = mesh.position(n);
            q + (p - q).normalize_or_zero() * rest_len
        })
        .sum();
    Some(sum / ring.len() as f32)
}

/// Applies decided actions vertex by vertex, in ascending id order.
///
/// For each active action row:
///
/// 1. Applies memory-bit writes (`> 0.5` sets the bit), signal writes
///    (clamped to `[0, 1]`) and morphogen deposits (`> 0.5`). These happen
///    whether or not the move below is accepted.
/// 2. Computes `candidate = p + growth * cfg.growth_scale * normal`. With
///    non-zero growth the candidate is then pulled toward the spring
///    target by `cfg.spring_strength`.
/// 3. Passes the candidate to [`CollisionIndex::attempt_update`].
///
/// Moves are committed immediately, so later vertices see earlier
/// vertices' new positions.
///
/// ### Parameters
/// - `mesh` - Geometry to displace.
/// - `collisions` - Index gating every move.
/// - `polyps` - Receives memory and signal writes.
/// - `morphogens` - Receives deposit actions.
/// - `layout` - Vector layout shared with the decision function.
/// - `cfg` - Growth, spring and rest-length parameters.
/// - `actions` - Action vectors from [`decision_phase`].
#[allow(clippy::too_many_arguments)]
pub fn apply_moves_phase<M: MorphogenField + ?Sized>(
    mesh: &mut SurfaceMesh,
    collisions: &mut CollisionIndex,
    polyps: &mut PolypState,
    morphogens: &mut M,
    layout: &SensoryLayout,
    cfg: &Config,
    actions: &PolypBuffer,
) -> MoveStats {
    let mut stats = MoveStats::default();

    for id in actions.active_indices() {
        let out = actions.row(id);

        for (ch, slot) in layout.deposit_outputs().enumerate() {
            if out[slot] > 0.5 {
                morphogens.deposit(ch, id);
            }
        }
        for (bit, slot) in layout.memory_outputs().enumerate() {
            polyps.set_memory_bit(id, bit, out[slot] > 0.5);
        }
        let signals = layout.signal_outputs();
        for (dst, &src) in polyps.signals_mut(id).iter_mut().zip(&out[signals]) {
            *dst = src.clamp(0.0, 1.0);
        }

        let growth = out[SensoryLayout::GROWTH] * cfg.growth_scale;
        if growth == 0.0 {
            stats.stationary += 1;
            continue;
        }

        let p = mesh.position(id);
        let mut candidate = p + mesh.vertex(id).normal * growth;
        if cfg.spring_strength > 0.0
            && let Some(target) = spring_target(mesh, id, cfg.target_edge_len)
        {
            candidate += (target - candidate) * cfg.spring_strength;
        }

        if collisions.attempt_update(mesh, id, candidate) {
            stats.accepted += 1;
        } else {
            stats.rejected += 1;
        }
    }

    stats
}

/// Runs one remeshing pass.
///
/// 1. Visits every face that existed at the start of the pass once and
///    calls [`SurfaceMesh::split_face_if_oversized`]. Faces created by
///    those splits are not revisited. Capacity exhaustion ends the split
///    loop without failing the step.
/// 2. Visits every edge once and calls
///    [`SurfaceMesh::flip_edge_if_better`].
/// 3. Seeds each new vertex from its neighbors that were already resolved
///    (lower ids) via [`PolypState::inherit`] and registers it with the
///    collision index.
pub fn remesh_phase(
    mesh: &mut SurfaceMesh,
    collisions: &mut CollisionIndex,
    polyps: &mut PolypState,
    cfg: &Config,
) -> Result<RemeshStats, SimError> {
    let mut stats = RemeshStats::default();
    let first_new = mesh.vertex_count();

    let face_count = mesh.face_count();
    for f in 0..face_count {
        match mesh.split_face_if_oversized(f, cfg.max_edge_len, cfg.max_face_area) {
            Ok(Some(v)) => {
                stats.splits += 1;
                trace!(face = f, vertex = v, "split");
            }
            Ok(None) => {}
            Err(MeshError::CapacityExceeded { .. }) => {
                stats.capacity_reached = true;
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    for e in 0..mesh.edge_count() {
        if mesh.flip_edge_if_better(e, cfg.flip_epsilon)? {
            stats.flips += 1;
            trace!(edge = e, "flip");
        }
    }

    for v in first_new..mesh.vertex_count() {
        let parents: Vec<VertexId> = mesh.neighbors(v).into_iter().filter(|&n| n < v).collect();
        polyps.inherit(v, &parents);
        collisions.insert(v, mesh.position(v));
    }
    stats.new_vertices = mesh.vertex_count() - first_new;

    Ok(stats)
}

/// Recomputes every derived per-vertex field against the current geometry.
///
/// 1. Normals and curvature on the mesh.
/// 2. [`MorphogenField::update`] with `cfg.morphogen_steps`, then a
///    concentration snapshot into `polyps`.
/// 3. Light and gravity from the new normals.
/// 4. A fresh [`ResourceFlowField`], sampled into `polyps.collection`.
/// 5. Per-vertex and total energy.
///
/// ### Returns
/// The new total energy.
pub fn refresh_fields_phase<M: MorphogenField + ?Sized>(
    mesh: &mut SurfaceMesh,
    polyps: &mut PolypState,
    morphogens: &mut M,
    cfg: &Config,
) -> Result<f32, SimError> {
    mesh.recompute_normals_and_curvature();
    morphogens.update(mesh, cfg.morphogen_steps);
    sample_fields(mesh, polyps, &*morphogens, cfg)
}

/// Field setup for a seed mesh: [`refresh_fields_phase`] without advancing
/// the morphogen field.
pub fn initial_fields_phase<M: MorphogenField + ?Sized>(
    mesh: &mut SurfaceMesh,
    polyps: &mut PolypState,
    morphogens: &M,
    cfg: &Config,
) -> Result<f32, SimError> {
    mesh.recompute_normals_and_curvature();
    sample_fields(mesh, polyps, morphogens, cfg)
}

fn sample_fields<M: MorphogenField + ?Sized>(
    mesh: &SurfaceMesh,
    polyps: &mut PolypState,
    morphogens: &M,
    cfg: &Config,
) -> Result<f32, SimError> {
    polyps.snapshot_morphogens(mesh.vertex_count(), morphogens);

    compute_light(mesh, cfg, &mut polyps.light);
    compute_gravity(mesh, &mut polyps.gravity);

    let field = ResourceFlowField::from_mesh(mesh, FlowParams::from(cfg))?;
    field.sample_vertices(mesh, &mut polyps.collection);
    trace!(
        dims = ?field.dims(),
        obstacles = field.obstacle_count(),
        "flow field rebuilt"
    );

    polyps.total_energy = compute_energy(mesh, polyps, cfg);
    Ok(polyps.total_energy)
}

/// First non-finite value among vertex positions, per-vertex fields and
/// energy.
///
/// ### Returns
/// `None` when everything is finite, `Some(Some(v))` for a bad vertex,
/// `Some(None)` for a bad aggregate.
pub fn find_non_finite(mesh: &SurfaceMesh, polyps: &PolypState) -> Option<Option<VertexId>> {
    for v in mesh.vertices() {
        let id = v.id;
        let scalars_ok = polyps.light[id].is_finite()
            && polyps.gravity[id].is_finite()
            && polyps.collection[id].is_finite()
            && polyps.energy[id].is_finite()
            && v.curvature.is_finite()
            && polyps.signals(id).iter().all(|s| s.is_finite());
        if !v.position.is_finite() || !v.normal.is_finite() || !scalars_ok {
            return Some(Some(id));
        }
    }
    (!polyps.total_energy.is_finite()).then_some(None)
}
