//! Voxelized resource transport around an organism.
//!
//! Resource enters at the top slice of a padded grid and is advected
//! downward (−Y), one horizontal slice at a time. Voxels touched by the
//! mesh are obstacles; fluid voxels next to an obstacle deposit a fraction
//! of their mass into it, which becomes the obstacle's `collection` value.
//!
//! The grid is rebuilt from scratch every step; nothing carries over.

use crate::config::Config;
use crate::error::SimError;
use crate::mesh::SurfaceMesh;
use glam::Vec3;
use std::collections::VecDeque;

/// Upper bound on grid cells, to keep a runaway organism from allocating
/// unbounded memory.
pub const MAX_VOXELS: usize = 1 << 24;

const NEIGHBORS_2D: [(isize, isize); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlowParams {
    pub voxel_length: f32,
    pub padding: usize,
    pub inflow: f32,
    pub capture_percent: f32,
    pub diffusion_weight: f32,
    pub collection_radius: f32,
    pub collection_scale: f32,
}

impl From<&Config> for FlowParams {
    fn from(cfg: &Config) -> Self {
        Self {
            voxel_length: cfg.voxel_length,
            padding: cfg.flow_padding,
            inflow: cfg.inflow,
            capture_percent: cfg.capture_percent,
            diffusion_weight: cfg.diffusion_weight,
            collection_radius: cfg.collection_radius,
            collection_scale: cfg.collection_scale,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ResourceFlowField {
    params: FlowParams,
    origin: Vec3,
    /// Grid size along x, y, z.
    dims: [usize; 3],
    obstacle: Vec<bool>,
    can_flow: Vec<bool>,
    flow: Vec<f32>,
    collection: Vec<f32>,
}

impl ResourceFlowField {
    /// Voxelizes `points` (mesh vertices) and `extra` (face centers) and
    /// runs both passes.
    ///
    /// Non-finite samples are skipped. With no finite samples the grid is
    /// a minimal padded block around the origin with no obstacles.
    pub fn compute(points: &[Vec3], extra: &[Vec3], params: FlowParams) -> Result<Self, SimError> {
        let finite = || points.iter().chain(extra).copied().filter(|p| p.is_finite());

        let vl = params.voxel_length;
        let pad = params.padding;
        let (min, max) = finite().fold((None::<Vec3>, None::<Vec3>), |(lo, hi), p| {
            (
                Some(lo.map_or(p, |l| l.min(p))),
                Some(hi.map_or(p, |h| h.max(p))),
            )
        });

        // Cells along one axis for a span of `s` voxels, or None past the limit.
        let extent = |s: f32| -> Option<usize> {
            if s.is_nan() || s >= MAX_VOXELS as f32 {
                return None;
            }
            (s as usize).checked_add(1)?.checked_add(pad.checked_mul(2)?)
        };

        let (origin, dims) = match (min, max) {
            (Some(lo), Some(hi)) => {
                let span = ((hi - lo) / vl).floor();
                let dims = extent(span.x)
                    .zip(extent(span.y))
                    .zip(extent(span.z))
                    .map(|((x, y), z)| [x, y, z]);
                (lo - Vec3::splat(pad as f32 * vl), dims)
            }
            _ => {
                let n = extent(0.0);
                (
                    Vec3::splat(-((pad as f32) + 0.5) * vl),
                    n.map(|n| [n, n, n]),
                )
            }
        };

        let too_large =
            || SimError::InvalidConfig("flow grid exceeds voxel limit; increase voxel_length");
        let dims = dims.ok_or_else(too_large)?;
        let total = dims[0]
            .checked_mul(dims[1])
            .and_then(|v| v.checked_mul(dims[2]))
            .filter(|&v| v <= MAX_VOXELS)
            .ok_or_else(too_large)?;

        let mut field = Self {
            params,
            origin,
            dims,
            obstacle: vec![false; total],
            can_flow: vec![false; total],
            flow: vec![0.0; total],
            collection: vec![0.0; total],
        };

        for p in finite() {
            if let Some([x, y, z]) = field.voxel_of(p) {
                let i = field.index(x, y, z);
                field.obstacle[i] = true;
            }
        }

        field.reachability_pass();
        field.transport_pass();
        Ok(field)
    }

    pub fn from_mesh(mesh: &SurfaceMesh, params: FlowParams) -> Result<Self, SimError> {
        let points: Vec<Vec3> = mesh.positions().collect();
        let centers: Vec<Vec3> = (0..mesh.face_count()).map(|f| mesh.face_center(f)).collect();
        Self::compute(&points, &centers, params)
    }

    #[inline]
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    #[inline]
    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        (y * self.dims[2] + z) * self.dims[0] + x
    }

    /// Voxel containing `p`, or `None` outside the grid.
    pub fn voxel_of(&self, p: Vec3) -> Option<[usize; 3]> {
        if !p.is_finite() {
            return None;
        }
        let g = ((p - self.origin) / self.params.voxel_length).floor();
        let coords = [g.x, g.y, g.z];
        let mut out = [0usize; 3];
        for k in 0..3 {
            if coords[k] < 0.0 || coords[k] as usize >= self.dims[k] {
                return None;
            }
            out[k] = coords[k] as usize;
        }
        Some(out)
    }

    pub fn is_obstacle(&self, x: usize, y: usize, z: usize) -> bool {
        self.obstacle[self.index(x, y, z)]
    }

    pub fn can_flow(&self, x: usize, y: usize, z: usize) -> bool {
        self.can_flow[self.index(x, y, z)]
    }

    pub fn flow_at(&self, x: usize, y: usize, z: usize) -> f32 {
        self.flow[self.index(x, y, z)]
    }

    pub fn collection_at(&self, x: usize, y: usize, z: usize) -> f32 {
        self.collection[self.index(x, y, z)]
    }

    pub fn obstacle_count(&self) -> usize {
        self.obstacle.iter().filter(|o| **o).count()
    }

    /// Same-slice neighbor of `(x, z)` offset by `(dx, dz)`, if in bounds.
    #[inline]
    fn offset(&self, x: usize, z: usize, dx: isize, dz: isize) -> Option<(usize, usize)> {
        let nx = x.checked_add_signed(dx)?;
        let nz = z.checked_add_signed(dz)?;
        (nx < self.dims[0] && nz < self.dims[2]).then_some((nx, nz))
    }

    /// Marks every fluid voxel reachable from the open top slice.
    ///
    /// A voxel is seeded when the voxel directly above it can flow; seeds
    /// then flood laterally within their slice.
    fn reachability_pass(&mut self) {
        let [nx, ny, nz] = self.dims;
        let top = ny - 1;
        for z in 0..nz {
            for x in 0..nx {
                let i = self.index(x, top, z);
                self.can_flow[i] = !self.obstacle[i];
            }
        }

        let mut queue = VecDeque::new();
        for y in (0..top).rev() {
            for z in 0..nz {
                for x in 0..nx {
                    let i = self.index(x, y, z);
                    let above = self.index(x, y + 1, z);
                    if !self.obstacle[i] && self.can_flow[above] && !self.can_flow[i] {
                        self.can_flow[i] = true;
                        queue.push_back((x, z));
                    }
                }
            }

            while let Some((x, z)) = queue.pop_front() {
                for (dx, dz) in NEIGHBORS_2D {
                    if let Some((x2, z2)) = self.offset(x, z, dx, dz) {
                        let j = self.index(x2, y, z2);
                        if !self.obstacle[j] && !self.can_flow[j] {
                            self.can_flow[j] = true;
                            queue.push_back((x2, z2));
                        }
                    }
                }
            }
        }
    }

    /// For every cell of slice `y`, the nearest (BFS) cell that can flow,
    /// or `usize::MAX` when the slice has none. Indices are slice-local.
    fn nearest_open(&self, y: usize, target: &mut [usize], queue: &mut VecDeque<(usize, usize)>) {
        let [nx, _, nz] = self.dims;
        target.fill(usize::MAX);
        queue.clear();
        for z in 0..nz {
            for x in 0..nx {
                if self.can_flow[self.index(x, y, z)] {
                    let s = z * nx + x;
                    target[s] = s;
                    queue.push_back((x, z));
                }
            }
        }
        while let Some((x, z)) = queue.pop_front() {
            let src = target[z * nx + x];
            for (dx, dz) in NEIGHBORS_2D {
                if let Some((x2, z2)) = self.offset(x, z, dx, dz) {
                    let s = z2 * nx + x2;
                    if target[s] == usize::MAX {
                        target[s] = src;
                        queue.push_back((x2, z2));
                    }
                }
            }
        }
    }

    /// Advects mass slice by slice from the top.
    ///
    /// Per slice: take mass from the slice above (inflow at the top),
    /// reroute mass landing on blocked cells to the nearest open cell,
    /// saturate at `inflow`, diffuse within the slice over open cells, then
    /// let each open cell deposit into its adjacent obstacles.
    fn transport_pass(&mut self) {
        let [nx, ny, nz] = self.dims;
        let slice = nx * nz;
        let FlowParams {
            inflow,
            capture_percent,
            diffusion_weight: w,
            ..
        } = self.params;

        let mut staged = vec![0.0f32; slice];
        let mut diffused = vec![0.0f32; slice];
        let mut target = vec![usize::MAX; slice];
        let mut queue = VecDeque::new();

        for y in (0..ny).rev() {
            let base = y * slice;
            staged.fill(0.0);
            self.nearest_open(y, &mut target, &mut queue);

            for s in 0..slice {
                let incoming = if y == ny - 1 {
                    inflow
                } else {
                    self.flow[base + slice + s]
                };
                if incoming <= 0.0 {
                    continue;
                }
                if self.can_flow[base + s] {
                    staged[s] += incoming;
                } else if target[s] != usize::MAX {
                    staged[target[s]] += incoming;
                }
            }
            for v in &mut staged {
                *v = v.min(inflow);
            }

            for z in 0..nz {
                for x in 0..nx {
                    let s = z * nx + x;
                    if !self.can_flow[base + s] {
                        diffused[s] = 0.0;
                        continue;
                    }
                    let c = staged[s];
                    let sum: f32 = NEIGHBORS_2D
                        .iter()
                        .map(|&(dx, dz)| match self.offset(x, z, dx, dz) {
                            Some((x2, z2)) if self.can_flow[base + z2 * nx + x2] => {
                                staged[z2 * nx + x2]
                            }
                            _ => c,
                        })
                        .sum();
                    diffused[s] = (1.0 - 4.0 * w) * c + w * sum;
                }
            }

            for z in 0..nz {
                for x in 0..nx {
                    let s = z * nx + x;
                    let mut mass = diffused[s];
                    if mass > 0.0 {
                        let mut sinks: [Option<usize>; 5] = [None; 5];
                        for (k, &(dx, dz)) in NEIGHBORS_2D.iter().enumerate() {
                            sinks[k] = self
                                .offset(x, z, dx, dz)
                                .map(|(x2, z2)| base + z2 * nx + x2);
                        }
                        if y > 0 {
                            sinks[4] = Some(base - slice + s);
                        }
                        for j in sinks.into_iter().flatten() {
                            if self.obstacle[j] {
                                let deposit = capture_percent * mass;
                                self.collection[j] = (self.collection[j] + deposit).min(inflow);
                                mass -= deposit;
                            }
                        }
                    }
                    self.flow[base + s] = mass;
                }
            }
        }
    }

    /// Mean collection over obstacle voxels within `collection_radius` of
    /// `p` (a cube of voxels), times `collection_scale`.
    ///
    /// Returns `0.0` for points outside the grid.
    pub fn sample(&self, p: Vec3) -> f32 {
        let Some([cx, cy, cz]) = self.voxel_of(p) else {
            return 0.0;
        };
        let max_dim = self.dims.iter().copied().max().unwrap_or(1);
        let r = ((self.params.collection_radius / self.params.voxel_length).ceil() as usize)
            .min(max_dim);
        let lo = |c: usize| c.saturating_sub(r);
        let hi = |c: usize, k: usize| c.saturating_add(r).min(self.dims[k] - 1);

        let mut sum = 0.0;
        let mut count = 0usize;
        for y in lo(cy)..=hi(cy, 1) {
            for z in lo(cz)..=hi(cz, 2) {
                for x in lo(cx)..=hi(cx, 0) {
                    let i = self.index(x, y, z);
                    if self.obstacle[i] {
                        sum += self.collection[i];
                        count += 1;
                    }
                }
            }
        }
        let mean = if count == 0 {
            self.collection[self.index(cx, cy, cz)]
        } else {
            sum / count as f32
        };
        mean * self.params.collection_scale
    }

    /// Samples collection for every vertex of `mesh` into `out[vertex]`.
    pub fn sample_vertices(&self, mesh: &SurfaceMesh, out: &mut [f32]) {
        for (v, slot) in mesh.vertices().iter().zip(out.iter_mut()) {
            *slot = self.sample(v.position);
        }
    }
}
