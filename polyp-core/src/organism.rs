//! One growing organism and its step state machine.

use crate::{
    buffer::PolypBuffer,
    collision::CollisionIndex,
    config::Config,
    decision::{DecisionFunction, SensoryLayout},
    error::SimError,
    export,
    fields::PolypState,
    mesh::SurfaceMesh,
    morphogen::{MorphogenField, NoMorphogens},
    phases,
    types::OrganismId,
};
use serde::Serialize;
use std::io::Write;
use tracing::{debug, error, info, warn};

/// Where an organism is inside its step cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum StepPhase {
    Idle,
    BuildingInputs,
    AwaitingDecision,
    ApplyingMoves,
    Remeshing,
    RefreshingFields,
    /// Budget, capacity or volume limit reached. Further steps are allowed
    /// but change nothing topologically once the mesh is full.
    Finished,
    /// A hard error occurred; every later step returns [`SimError::Aborted`].
    Failed,
}

/// Why a run stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum StopReason {
    StepBudget,
    VertexCapacity,
    MaxVolume,
}

/// Per-step diagnostics.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StepReport {
    /// Age after the step.
    pub step: usize,
    pub vertices: usize,
    pub faces: usize,
    pub skipped_below_ground: usize,
    pub moves: phases::MoveStats,
    pub remesh: phases::RemeshStats,
    pub energy: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunSummary {
    pub organism: OrganismId,
    pub steps: usize,
    pub vertices: usize,
    pub energy: f32,
    pub volume: f32,
    pub stop: StopReason,
}

/// A single organism: mesh, collision index, per-polyp state, and its two
/// external collaborators.
///
/// Organisms share nothing, so independent organisms can be stepped on
/// separate threads.
pub struct Organism<D, M = NoMorphogens> {
    id: OrganismId,
    cfg: Config,
    layout: SensoryLayout,
    mesh: SurfaceMesh,
    collisions: CollisionIndex,
    polyps: PolypState,
    decision: D,
    morphogens: M,
    inputs: PolypBuffer,
    actions: PolypBuffer,
    age: usize,
    phase: StepPhase,
    capacity_warned: bool,
}

impl<D: DecisionFunction> Organism<D, NoMorphogens> {
    /// Organism without morphogen channels.
    pub fn without_morphogens(
        id: OrganismId,
        mesh: SurfaceMesh,
        cfg: Config,
        decision: D,
    ) -> Result<Self, SimError> {
        Self::new(id, mesh, cfg, decision, NoMorphogens)
    }
}

impl<D: DecisionFunction, M: MorphogenField> Organism<D, M> {
    /// Validates the configuration against both collaborators and runs the
    /// initial field refresh.
    ///
    /// ### Errors
    /// - [`SimError::InvalidConfig`] for unusable parameters.
    /// - [`SimError::ConfigurationMismatch`] when the decision function's
    ///   vector lengths, the morphogen channel count or the mesh capacity
    ///   disagree with `cfg`.
    /// - [`SimError::NonFiniteState`] when the seed mesh is not finite.
    pub fn new(
        id: OrganismId,
        mut mesh: SurfaceMesh,
        cfg: Config,
        decision: D,
        mut morphogens: M,
    ) -> Result<Self, SimError> {
        cfg.validate()?;
        let layout = SensoryLayout::from_config(&cfg);

        let checks = [
            ("decision input length", layout.input_len(), decision.input_len()),
            ("decision output length", layout.output_len(), decision.output_len()),
            ("morphogen channels", cfg.n_morphogen_channels, morphogens.n_channels()),
            ("mesh capacity", cfg.max_vertices, mesh.max_vertices()),
        ];
        for (what, expected, actual) in checks {
            if expected != actual {
                return Err(SimError::ConfigurationMismatch {
                    what,
                    expected,
                    actual,
                });
            }
        }

        let collisions = CollisionIndex::from_mesh(&mesh, &cfg)?;
        let mut polyps = PolypState::new(&cfg);
        phases::initial_fields_phase(&mut mesh, &mut polyps, &morphogens, &cfg)?;
        if let Some(vertex) = phases::find_non_finite(&mesh, &polyps) {
            return Err(SimError::NonFiniteState {
                organism: id,
                step: 0,
                vertex,
            });
        }

        info!(
            organism = id,
            decision = decision.kind(),
            vertices = mesh.vertex_count(),
            max_vertices = cfg.max_vertices,
            "organism created"
        );

        Ok(Self {
            id,
            inputs: PolypBuffer::with_len(mesh.vertex_count(), layout.input_len()),
            actions: PolypBuffer::with_len(mesh.vertex_count(), layout.output_len()),
            cfg,
            layout,
            mesh,
            collisions,
            polyps,
            decision,
            morphogens,
            age: 0,
            phase: StepPhase::Idle,
            capacity_warned: false,
        })
    }

    pub fn id(&self) -> OrganismId {
        self.id
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn layout(&self) -> &SensoryLayout {
        &self.layout
    }

    pub fn mesh(&self) -> &SurfaceMesh {
        &self.mesh
    }

    pub fn collisions(&self) -> &CollisionIndex {
        &self.collisions
    }

    pub fn polyps(&self) -> &PolypState {
        &self.polyps
    }

    pub fn decision(&self) -> &D {
        &self.decision
    }

    pub fn morphogens(&self) -> &M {
        &self.morphogens
    }

    /// Number of completed steps.
    pub fn age(&self) -> usize {
        self.age
    }

    pub fn phase(&self) -> StepPhase {
        self.phase
    }

    pub fn energy(&self) -> f32 {
        self.polyps.total_energy
    }

    /// Why the organism should stop growing, if it should.
    pub fn stop_reason(&self) -> Option<StopReason> {
        if self.mesh.is_full() {
            Some(StopReason::VertexCapacity)
        } else if self.age >= self.cfg.step_budget {
            Some(StopReason::StepBudget)
        } else if self
            .cfg
            .max_volume
            .is_some_and(|max| self.mesh.is_closed() && self.mesh.volume() > max)
        {
            Some(StopReason::MaxVolume)
        } else {
            None
        }
    }

    pub fn is_finished(&self) -> bool {
        self.stop_reason().is_some()
    }

    /// Runs one full growth step.
    ///
    /// Soft conditions (rejected moves, capacity reached while remeshing)
    /// are reported in the [`StepReport`]. A hard error moves the organism
    /// to [`StepPhase::Failed`]; every later call returns
    /// [`SimError::Aborted`].
    pub fn step(&mut self) -> Result<StepReport, SimError> {
        if self.phase == StepPhase::Failed {
            return Err(SimError::Aborted {
                organism: self.id,
                step: self.age,
            });
        }

        match self.run_phases() {
            Ok(report) => Ok(report),
            Err(err) => {
                self.phase = StepPhase::Failed;
                error!(organism = self.id, step = self.age, error = %err, "organism failed");
                Err(err)
            }
        }
    }

    fn run_phases(&mut self) -> Result<StepReport, SimError> {
        let mut report = StepReport::default();

        self.phase = StepPhase::BuildingInputs;
        report.skipped_below_ground = phases::build_inputs_phase(
            &self.mesh,
            &self.polyps,
            &self.layout,
            &self.cfg,
            &mut self.inputs,
        );

        self.phase = StepPhase::AwaitingDecision;
        phases::decision_phase(&self.decision, &self.inputs, &mut self.actions);

        self.phase = StepPhase::ApplyingMoves;
        self.collisions.clear_collisions();
        report.moves = phases::apply_moves_phase(
            &mut self.mesh,
            &mut self.collisions,
            &mut self.polyps,
            &mut self.morphogens,
            &self.layout,
            &self.cfg,
            &self.actions,
        );

        self.phase = StepPhase::Remeshing;
        report.remesh = phases::remesh_phase(
            &mut self.mesh,
            &mut self.collisions,
            &mut self.polyps,
            &self.cfg,
        )?;
        if report.remesh.capacity_reached && !self.capacity_warned {
            self.capacity_warned = true;
            warn!(
                organism = self.id,
                step = self.age,
                max_vertices = self.cfg.max_vertices,
                "vertex capacity reached; topology growth stops"
            );
        }

        self.phase = StepPhase::RefreshingFields;
        report.energy = phases::refresh_fields_phase(
            &mut self.mesh,
            &mut self.polyps,
            &mut self.morphogens,
            &self.cfg,
        )?;

        self.age += 1;
        if let Some(vertex) = phases::find_non_finite(&self.mesh, &self.polyps) {
            return Err(SimError::NonFiniteState {
                organism: self.id,
                step: self.age,
                vertex,
            });
        }

        report.step = self.age;
        report.vertices = self.mesh.vertex_count();
        report.faces = self.mesh.face_count();
        self.phase = if self.is_finished() {
            StepPhase::Finished
        } else {
            StepPhase::Idle
        };

        debug!(
            organism = self.id,
            step = report.step,
            vertices = report.vertices,
            accepted = report.moves.accepted,
            rejected = report.moves.rejected,
            splits = report.remesh.splits,
            flips = report.remesh.flips,
            energy = report.energy,
            "step complete"
        );
        Ok(report)
    }

    /// Steps until a stop condition holds.
    pub fn run(&mut self) -> Result<RunSummary, SimError> {
        let stop = loop {
            if let Some(reason) = self.stop_reason() {
                break reason;
            }
            self.step()?;
        };
        self.phase = StepPhase::Finished;

        let summary = RunSummary {
            organism: self.id,
            steps: self.age,
            vertices: self.mesh.vertex_count(),
            energy: self.polyps.total_energy,
            volume: self.mesh.volume(),
            stop,
        };
        info!(
            organism = self.id,
            steps = summary.steps,
            vertices = summary.vertices,
            stop = ?summary.stop,
            "run finished"
        );
        Ok(summary)
    }

    /// Writes the current mesh and per-polyp attributes as an annotated
    /// OBJ file (see [`export::write_coral_obj`]).
    pub fn export<W: Write>(&self, out: &mut W) -> Result<(), SimError> {
        export::write_coral_obj(out, &self.mesh, &self.polyps)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{ConstantGrowth, FnDecision, LinearDecision};
    use crate::morphogen::StaticMorphogens;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn cfg() -> Config {
        Config {
            max_vertices: 128,
            has_ground: false,
            step_budget: 5,
            ..Config::default()
        }
    }

    fn seed(cfg: &Config) -> SurfaceMesh {
        SurfaceMesh::octahedron(0.5, cfg.max_vertices).unwrap()
    }

    #[test]
    fn mismatched_decision_is_rejected_at_construction() {
        let cfg = cfg();
        let wrong = SensoryLayout {
            n_memory_bits: cfg.n_memory_bits + 1,
            ..SensoryLayout::from_config(&cfg)
        };
        let err = Organism::without_morphogens(
            1,
            seed(&cfg),
            cfg.clone(),
            ConstantGrowth::new(&wrong, 0.0),
        )
        .err()
        .unwrap();
        assert!(matches!(
            err,
            SimError::ConfigurationMismatch {
                what: "decision input length",
                ..
            }
        ));
    }

    #[test]
    fn mismatched_morphogens_are_rejected() {
        let cfg = Config {
            n_morphogen_channels: 2,
            ..cfg()
        };
        let layout = SensoryLayout::from_config(&cfg);
        let result = Organism::new(
            1,
            seed(&cfg),
            cfg.clone(),
            ConstantGrowth::new(&layout, 0.0),
            StaticMorphogens::uniform(vec![0.0], 0.1),
        );
        assert!(matches!(
            result.err(),
            Some(SimError::ConfigurationMismatch {
                what: "morphogen channels",
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn mismatched_capacity_is_rejected() {
        let cfg = cfg();
        let layout = SensoryLayout::from_config(&cfg);
        let mesh = SurfaceMesh::octahedron(0.5, 64).unwrap();
        let result =
            Organism::without_morphogens(1, mesh, cfg.clone(), ConstantGrowth::new(&layout, 0.0));
        assert!(matches!(
            result.err(),
            Some(SimError::ConfigurationMismatch { what: "mesh capacity", .. })
        ));
    }

    #[test]
    fn zero_growth_is_a_fixed_point() {
        let cfg = cfg();
        let layout = SensoryLayout::from_config(&cfg);
        let mut org =
            Organism::without_morphogens(3, seed(&cfg), cfg, ConstantGrowth::new(&layout, 0.0))
                .unwrap();
        let before: Vec<_> = org.mesh().positions().collect();

        let summary = org.run().unwrap();
        assert_eq!(summary.steps, 5);
        assert_eq!(summary.stop, StopReason::StepBudget);
        assert_eq!(org.mesh().vertex_count(), 6);
        assert_eq!(org.mesh().positions().collect::<Vec<_>>(), before);
        assert_eq!(org.phase(), StepPhase::Finished);
    }

    #[test]
    fn growth_adds_vertices_and_keeps_mesh_valid() {
        let cfg = Config {
            step_budget: 8,
            ..cfg()
        };
        let layout = SensoryLayout::from_config(&cfg);
        let mut org =
            Organism::without_morphogens(4, seed(&cfg), cfg, ConstantGrowth::new(&layout, 1.0))
                .unwrap();

        for _ in 0..8 {
            let report = org.step().unwrap();
            org.mesh().validate().unwrap();
            assert_eq!(report.vertices, org.mesh().vertex_count());
            assert!(report.energy.is_finite());
        }
        assert!(org.mesh().vertex_count() > 6);
        assert!(org.mesh().is_closed());
        assert_eq!(org.age(), 8);
    }

    #[test]
    fn nan_output_fails_and_then_aborts() {
        let cfg = cfg();
        let layout = SensoryLayout::from_config(&cfg);
        let decide = FnDecision::new(&layout, |_: &[f32], out: &mut [f32]| {
            out.fill(0.0);
            out[0] = f32::NAN;
        });
        let mut org = Organism::without_morphogens(9, seed(&cfg), cfg, decide).unwrap();

        let err = org.step().unwrap_err();
        assert!(matches!(
            err,
            SimError::NonFiniteState {
                organism: 9,
                step: 1,
                vertex: Some(_)
            }
        ));
        assert_eq!(org.phase(), StepPhase::Failed);

        let again = org.step().unwrap_err();
        assert!(matches!(again, SimError::Aborted { organism: 9, step: 1 }));
    }

    #[test]
    fn capacity_stops_the_run() {
        let cfg = Config {
            max_vertices: 20,
            step_budget: 1_000,
            ..cfg()
        };
        let layout = SensoryLayout::from_config(&cfg);
        let mut org =
            Organism::without_morphogens(5, seed(&cfg), cfg, ConstantGrowth::new(&layout, 1.0))
                .unwrap();
        let summary = org.run().unwrap();
        assert_eq!(summary.stop, StopReason::VertexCapacity);
        assert_eq!(org.mesh().vertex_count(), 20);
        org.mesh().validate().unwrap();
    }

    #[test]
    fn max_volume_stops_the_run() {
        let cfg = Config {
            max_volume: Some(0.1),
            step_budget: 1_000,
            ..cfg()
        };
        let layout = SensoryLayout::from_config(&cfg);
        let mut org =
            Organism::without_morphogens(6, seed(&cfg), cfg, ConstantGrowth::new(&layout, 1.0))
                .unwrap();
        let summary = org.run().unwrap();
        assert!(matches!(
            summary.stop,
            StopReason::MaxVolume | StopReason::VertexCapacity
        ));
        assert!(summary.steps < 1_000);
    }

    #[test]
    fn organisms_run_on_separate_threads() {
        let cfg = cfg();
        let layout = SensoryLayout::from_config(&cfg);
        let mut orgs: Vec<_> = (0..4u64)
            .map(|i| {
                let mut rng = SmallRng::seed_from_u64(i);
                let brain = LinearDecision::random(&layout, 0.5, &mut rng);
                Organism::without_morphogens(i, seed(&cfg), cfg.clone(), brain).unwrap()
            })
            .collect();

        std::thread::scope(|s| {
            for org in orgs.iter_mut() {
                s.spawn(move || org.run().unwrap());
            }
        });

        for org in &orgs {
            assert_eq!(org.age(), 5);
            org.mesh().validate().unwrap();
        }
    }
}
