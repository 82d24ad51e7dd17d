use crate::error::SimError;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Smallest collision cell size, as a multiple of `min_separation`. Smaller
/// cells make every neighbor query scan a cube of many empty cells.
pub const MIN_COLLISION_CELL_FACTOR: f32 = 0.5;

/// How the aggregate energy value is normalized.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum EnergyNormalization {
    /// Divide by the enclosed mesh volume; falls back to `1.0` on open or
    /// degenerate meshes.
    Volume,
    /// Divide by a fixed constant.
    Baseline(f32),
}

/// Per-organism simulation configuration.
///
/// Missing fields fall back to [`Config::default`] when deserialized.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Hard cap on the number of vertices (polyps).
    pub max_vertices: usize,
    /// Minimum distance between non-adjacent vertices after a committed move.
    pub min_separation: f32,
    /// Collision hash cell size as a multiple of `min_separation`.
    pub collision_cell_factor: f32,

    /// Faces whose longest edge exceeds this are split along that edge.
    pub max_edge_len: f32,
    /// Faces whose area exceeds this are split at their centroid.
    pub max_face_area: f32,
    /// Margin an apex-to-apex diagonal must win by before an edge flips.
    pub flip_epsilon: f32,

    /// Displacement per unit of decided growth magnitude.
    pub growth_scale: f32,
    /// Blend factor toward the spring target position, in `[0, 1]`.
    pub spring_strength: f32,
    /// Rest length of the spring term.
    pub target_edge_len: f32,

    pub voxel_length: f32,
    /// Radius (world units) averaged over when sampling collection.
    pub collection_radius: f32,
    /// Fraction of advancing mass absorbed per adjacent obstacle voxel.
    pub capture_percent: f32,
    /// Empty voxels kept around the organism's bounding box.
    pub flow_padding: usize,
    /// Concentration injected at the open boundary slice.
    pub inflow: f32,
    /// Same-slice neighbor weight of the diffusion stencil, in `[0, 0.25]`.
    pub diffusion_weight: f32,
    /// Multiplier applied to sampled collection values.
    pub collection_scale: f32,

    pub light_direction: Vec3,
    pub light_amount: f32,

    pub n_memory_bits: usize,
    pub n_signal_channels: usize,
    pub n_morphogen_channels: usize,
    /// Thermometer bins per morphogen channel in the sensory vector.
    pub morphogen_thresholds: usize,
    /// Argument handed to the morphogen field's `update` each step.
    pub morphogen_steps: usize,

    pub has_ground: bool,
    pub ground_y: f32,

    pub light_weight: f32,
    pub collection_weight: f32,
    pub energy_normalization: EnergyNormalization,

    /// Maximum number of growth steps.
    pub step_budget: usize,
    /// Optional volume bound; the run stops once the mesh encloses more.
    pub max_volume: Option<f32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_vertices: 5_000,
            min_separation: 0.1,
            collision_cell_factor: 1.0,
            max_edge_len: 0.6,
            max_face_area: 0.12,
            flip_epsilon: 1e-4,
            growth_scale: 0.2,
            spring_strength: 0.3,
            target_edge_len: 0.4,
            voxel_length: 0.25,
            collection_radius: 0.25,
            capture_percent: 0.2,
            flow_padding: 2,
            inflow: 1.0,
            diffusion_weight: 0.15,
            collection_scale: 1.0,
            light_direction: Vec3::Y,
            light_amount: 1.0,
            n_memory_bits: 2,
            n_signal_channels: 1,
            n_morphogen_channels: 0,
            morphogen_thresholds: 3,
            morphogen_steps: 100,
            has_ground: true,
            ground_y: 0.0,
            light_weight: 0.5,
            collection_weight: 0.5,
            energy_normalization: EnergyNormalization::Volume,
            step_budget: 100,
            max_volume: None,
        }
    }
}

impl Config {
    /// Rejects values the kernel cannot run with.
    pub fn validate(&self) -> Result<(), SimError> {
        let positive = |v: f32| v.is_finite() && v > 0.0;

        if self.max_vertices == 0 {
            return Err(SimError::InvalidConfig("max_vertices must be non-zero"));
        }
        if !positive(self.min_separation) {
            return Err(SimError::InvalidConfig("min_separation must be positive"));
        }
        if !positive(self.collision_cell_factor)
            || self.collision_cell_factor < MIN_COLLISION_CELL_FACTOR
        {
            return Err(SimError::InvalidConfig(
                "collision_cell_factor must be at least 0.5",
            ));
        }
        if !positive(self.max_edge_len) || !positive(self.max_face_area) {
            return Err(SimError::InvalidConfig(
                "max_edge_len and max_face_area must be positive",
            ));
        }
        if !self.flip_epsilon.is_finite() || self.flip_epsilon < 0.0 {
            return Err(SimError::InvalidConfig("flip_epsilon must be non-negative"));
        }
        if !self.growth_scale.is_finite() {
            return Err(SimError::InvalidConfig("growth_scale must be finite"));
        }
        if !(0.0..=1.0).contains(&self.spring_strength) {
            return Err(SimError::InvalidConfig("spring_strength must lie in [0, 1]"));
        }
        if !positive(self.target_edge_len) {
            return Err(SimError::InvalidConfig("target_edge_len must be positive"));
        }
        if !positive(self.voxel_length) {
            return Err(SimError::InvalidConfig("voxel_length must be positive"));
        }
        if !self.collection_radius.is_finite() || self.collection_radius < 0.0 {
            return Err(SimError::InvalidConfig(
                "collection_radius must be non-negative",
            ));
        }
        if !(0.0..=1.0).contains(&self.capture_percent) {
            return Err(SimError::InvalidConfig("capture_percent must lie in [0, 1]"));
        }
        if self.flow_padding == 0 {
            return Err(SimError::InvalidConfig("flow_padding must be at least 1"));
        }
        if !positive(self.inflow) {
            return Err(SimError::InvalidConfig("inflow must be positive"));
        }
        if !(0.0..=0.25).contains(&self.diffusion_weight) {
            return Err(SimError::InvalidConfig(
                "diffusion_weight must lie in [0, 0.25]",
            ));
        }
        if !self.collection_scale.is_finite() || !self.light_amount.is_finite() {
            return Err(SimError::InvalidConfig(
                "collection_scale and light_amount must be finite",
            ));
        }
        if !self.light_direction.is_finite() || self.light_direction.length_squared() == 0.0 {
            return Err(SimError::InvalidConfig(
                "light_direction must be a finite non-zero vector",
            ));
        }
        if self.n_memory_bits > 64 {
            return Err(SimError::InvalidConfig("n_memory_bits must be at most 64"));
        }
        if self.n_morphogen_channels > 0 && self.morphogen_thresholds == 0 {
            return Err(SimError::InvalidConfig(
                "morphogen_thresholds must be non-zero when morphogens are enabled",
            ));
        }
        if let EnergyNormalization::Baseline(b) = self.energy_normalization
            && !positive(b)
        {
            return Err(SimError::InvalidConfig("energy baseline must be positive"));
        }
        if let Some(v) = self.max_volume
            && !positive(v)
        {
            return Err(SimError::InvalidConfig("max_volume must be positive"));
        }
        Ok(())
    }

    /// Edge length of one collision hash cell.
    #[inline]
    pub fn collision_cell_size(&self) -> f32 {
        self.min_separation * self.collision_cell_factor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut cfg = Config::default();
        cfg.capture_percent = 1.5;
        assert!(matches!(cfg.validate(), Err(SimError::InvalidConfig(_))));

        let mut cfg = Config::default();
        cfg.n_memory_bits = 65;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.flow_padding = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.energy_normalization = EnergyNormalization::Baseline(0.0);
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.min_separation = f32::NAN;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.collision_cell_factor = 1e-4;
        assert!(matches!(cfg.validate(), Err(SimError::InvalidConfig(_))));
        cfg.collision_cell_factor = MIN_COLLISION_CELL_FACTOR;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let cfg: Config =
            serde_json::from_str(r#"{ "max_vertices": 64, "has_ground": false }"#).unwrap();
        assert_eq!(cfg.max_vertices, 64);
        assert!(!cfg.has_ground);
        assert_eq!(cfg.min_separation, Config::default().min_separation);
        assert_eq!(cfg.energy_normalization, EnergyNormalization::Volume);
    }

    #[test]
    fn collision_cell_size_scales_with_separation() {
        let mut cfg = Config::default();
        cfg.min_separation = 0.2;
        cfg.collision_cell_factor = 2.0;
        assert!((cfg.collision_cell_size() - 0.4).abs() < 1e-6);
    }
}
