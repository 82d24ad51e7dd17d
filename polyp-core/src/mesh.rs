//! Half-edge triangle mesh for a single growing organism.
//!
//! All links are indices into flat, append-only arenas. A boundary edge
//! owns exactly one half-edge (whose `twin` is `None`); an interior edge
//! owns two half-edges that are mutual twins in two distinct faces. Every
//! half-edge belongs to a face, and every face is a closed 3-cycle.
//!
//! Local edit operations live in [`crate::remesh`].

use crate::error::MeshError;
use crate::types::{EdgeId, FaceId, HalfEdgeId, VertexId};
use glam::Vec3;
use std::collections::HashMap;
use std::f32::consts::{FRAC_1_SQRT_2, PI, TAU};

#[derive(Clone, Debug, PartialEq)]
pub struct Vertex {
    pub id: VertexId,
    pub position: Vec3,
    pub normal: Vec3,
    /// Angular defect at this vertex (see [`SurfaceMesh::recompute_normals_and_curvature`]).
    pub curvature: f32,
    pub boundary: bool,
    /// One outgoing half-edge, `None` for a vertex with no incident face.
    pub he: Option<HalfEdgeId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HalfEdge {
    /// Opposite half-edge, `None` on the mesh boundary.
    pub twin: Option<HalfEdgeId>,
    /// Next half-edge inside the same face.
    pub next: HalfEdgeId,
    /// Origin vertex.
    pub vertex: VertexId,
    pub edge: EdgeId,
    pub face: FaceId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Edge {
    pub he: HalfEdgeId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Face {
    pub he: HalfEdgeId,
}

#[derive(Clone, Debug)]
pub struct SurfaceMesh {
    pub(crate) max_vertices: usize,
    pub(crate) vertices: Vec<Vertex>,
    pub(crate) half_edges: Vec<HalfEdge>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) faces: Vec<Face>,
}

impl SurfaceMesh {
    /// Creates an empty mesh that accepts up to `max_vertices` vertices.
    pub fn with_capacity(max_vertices: usize) -> Self {
        Self {
            max_vertices,
            vertices: Vec::with_capacity(max_vertices),
            half_edges: Vec::new(),
            edges: Vec::new(),
            faces: Vec::new(),
        }
    }

    /// Builds a mesh from an indexed triangle list.
    ///
    /// Triangles must be consistently oriented and form a manifold (every
    /// directed edge used at most once, every vertex fan connected).
    ///
    /// ### Parameters
    /// - `positions` - Vertex positions; vertex ids follow this order.
    /// - `triangles` - Counter-clockwise vertex index triples.
    /// - `max_vertices` - Capacity of the mesh for later splits.
    ///
    /// ### Returns
    /// The mesh with normals and curvature already computed, or
    /// [`MeshError::InvalidTopology`] / [`MeshError::CapacityExceeded`].
    pub fn from_triangles(
        positions: &[Vec3],
        triangles: &[[VertexId; 3]],
        max_vertices: usize,
    ) -> Result<Self, MeshError> {
        if positions.len() > max_vertices {
            return Err(MeshError::CapacityExceeded { max_vertices });
        }

        let mut mesh = Self::with_capacity(max_vertices);
        for &p in positions {
            mesh.create_vertex(p)?;
        }

        let mut directed: HashMap<(VertexId, VertexId), HalfEdgeId> =
            HashMap::with_capacity(triangles.len() * 3);

        for (f, tri) in triangles.iter().enumerate() {
            if let Some(&bad) = tri.iter().find(|&&v| v >= positions.len()) {
                return Err(MeshError::InvalidIndex {
                    kind: "vertex",
                    index: bad,
                });
            }
            if tri[0] == tri[1] || tri[1] == tri[2] || tri[0] == tri[2] {
                return Err(MeshError::InvalidTopology(format!(
                    "triangle {f} repeats a vertex"
                )));
            }

            let base = mesh.half_edges.len();
            for k in 0..3 {
                let a = tri[k];
                let b = tri[(k + 1) % 3];
                if directed.insert((a, b), base + k).is_some() {
                    return Err(MeshError::InvalidTopology(format!(
                        "directed edge {a}->{b} used twice (non-manifold or inconsistent orientation)"
                    )));
                }
                mesh.half_edges.push(HalfEdge {
                    twin: None,
                    next: base + (k + 1) % 3,
                    vertex: a,
                    edge: usize::MAX,
                    face: f,
                });
            }
            mesh.faces.push(Face { he: base });
        }

        for h in 0..mesh.half_edges.len() {
            let a = mesh.half_edges[h].vertex;
            let b = mesh.dest(h);
            let twin = directed.get(&(b, a)).copied();
            mesh.half_edges[h].twin = twin;

            match twin {
                Some(t) if t < h => {
                    mesh.half_edges[h].edge = mesh.half_edges[t].edge;
                }
                _ => {
                    mesh.half_edges[h].edge = mesh.edges.len();
                    mesh.edges.push(Edge { he: h });
                }
            }

            let va = &mut mesh.vertices[a];
            // Prefer a boundary half-edge so the vertex is easy to identify.
            if va.he.is_none() || twin.is_none() {
                va.he = Some(h);
            }
            if twin.is_none() {
                mesh.vertices[a].boundary = true;
                mesh.vertices[b].boundary = true;
            }
        }

        let mut outgoing = vec![0usize; mesh.vertices.len()];
        for he in &mesh.half_edges {
            outgoing[he.vertex] += 1;
        }
        for v in 0..mesh.vertices.len() {
            if mesh.walk_one_ring(v).0.len() != outgoing[v] {
                return Err(MeshError::InvalidTopology(format!(
                    "vertex {v} has a disconnected fan"
                )));
            }
        }

        mesh.recompute_normals_and_curvature();
        Ok(mesh)
    }

    /// Fan-triangulates a seed polygon around its centroid.
    ///
    /// The ring should be counter-clockwise when seen from the side the
    /// surface is meant to face. The centroid becomes the last vertex.
    pub fn from_polygon(ring: &[Vec3], max_vertices: usize) -> Result<Self, MeshError> {
        if ring.len() < 3 {
            return Err(MeshError::InvalidTopology(
                "seed polygon needs at least 3 vertices".to_string(),
            ));
        }
        let center = ring.iter().copied().sum::<Vec3>() / ring.len() as f32;
        let mut positions = ring.to_vec();
        positions.push(center);
        let c = ring.len();
        let triangles: Vec<[VertexId; 3]> =
            (0..ring.len()).map(|i| [i, (i + 1) % ring.len(), c]).collect();
        Self::from_triangles(&positions, &triangles, max_vertices)
    }

    /// Regular octahedron centered on the origin with the given edge length.
    ///
    /// Vertex order is `+x, -x, +y, -y, +z, -z`.
    pub fn octahedron(edge_len: f32, max_vertices: usize) -> Result<Self, MeshError> {
        let r = edge_len * FRAC_1_SQRT_2;
        let positions = [
            Vec3::new(r, 0.0, 0.0),
            Vec3::new(-r, 0.0, 0.0),
            Vec3::new(0.0, r, 0.0),
            Vec3::new(0.0, -r, 0.0),
            Vec3::new(0.0, 0.0, r),
            Vec3::new(0.0, 0.0, -r),
        ];
        let mut triangles = Vec::with_capacity(8);
        for (x, sx) in [(0, 1.0), (1, -1.0)] {
            for (y, sy) in [(2, 1.0), (3, -1.0)] {
                for (z, sz) in [(4, 1.0), (5, -1.0)] {
                    if sx * sy * sz > 0.0 {
                        triangles.push([x, y, z]);
                    } else {
                        triangles.push([x, z, y]);
                    }
                }
            }
        }
        Self::from_triangles(&positions, &triangles, max_vertices)
    }

    /// Appends a vertex with no incident topology.
    ///
    /// Fails with [`MeshError::CapacityExceeded`] once `max_vertices` is
    /// reached. Callers splitting edges or faces wire `he` afterwards.
    pub fn create_vertex(&mut self, position: Vec3) -> Result<VertexId, MeshError> {
        if self.is_full() {
            return Err(MeshError::CapacityExceeded {
                max_vertices: self.max_vertices,
            });
        }
        let id = self.vertices.len();
        self.vertices.push(Vertex {
            id,
            position,
            normal: Vec3::ZERO,
            curvature: 0.0,
            boundary: false,
            he: None,
        });
        Ok(id)
    }

    #[inline]
    pub fn max_vertices(&self) -> usize {
        self.max_vertices
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.vertices.len() >= self.max_vertices
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    #[inline]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    #[inline]
    pub fn half_edge_count(&self) -> usize {
        self.half_edges.len()
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn half_edges(&self) -> &[HalfEdge] {
        &self.half_edges
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    #[inline]
    pub fn vertex(&self, id: VertexId) -> &Vertex {
        &self.vertices[id]
    }

    #[inline]
    pub fn position(&self, id: VertexId) -> Vec3 {
        self.vertices[id].position
    }

    /// Moves a vertex without touching any spatial index. Committed moves go
    /// through [`crate::collision::CollisionIndex::attempt_update`].
    #[inline]
    pub(crate) fn set_position(&mut self, id: VertexId, position: Vec3) {
        self.vertices[id].position = position;
    }

    pub fn positions(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.vertices.iter().map(|v| v.position)
    }

    /// Destination vertex of a half-edge.
    #[inline]
    pub fn dest(&self, he: HalfEdgeId) -> VertexId {
        self.half_edges[self.half_edges[he].next].vertex
    }

    /// Previous half-edge inside the same (triangular) face.
    #[inline]
    pub fn prev(&self, he: HalfEdgeId) -> HalfEdgeId {
        self.half_edges[self.half_edges[he].next].next
    }

    pub fn face_half_edges(&self, face: FaceId) -> [HalfEdgeId; 3] {
        let h0 = self.faces[face].he;
        let h1 = self.half_edges[h0].next;
        let h2 = self.half_edges[h1].next;
        [h0, h1, h2]
    }

    pub fn face_vertices(&self, face: FaceId) -> [VertexId; 3] {
        self.face_half_edges(face).map(|h| self.half_edges[h].vertex)
    }

    pub fn face_positions(&self, face: FaceId) -> [Vec3; 3] {
        self.face_vertices(face).map(|v| self.vertices[v].position)
    }

    pub fn edge_vertices(&self, edge: EdgeId) -> (VertexId, VertexId) {
        let h = self.edges[edge].he;
        (self.half_edges[h].vertex, self.dest(h))
    }

    pub fn edge_length(&self, edge: EdgeId) -> f32 {
        let (a, b) = self.edge_vertices(edge);
        self.vertices[a].position.distance(self.vertices[b].position)
    }

    #[inline]
    pub fn is_boundary_edge(&self, edge: EdgeId) -> bool {
        self.half_edges[self.edges[edge].he].twin.is_none()
    }

    #[inline]
    pub fn is_boundary_vertex(&self, vertex: VertexId) -> bool {
        self.vertices[vertex].boundary
    }

    /// Un-normalized face normal; its length is twice the face area.
    pub fn face_normal(&self, face: FaceId) -> Vec3 {
        let [a, b, c] = self.face_positions(face);
        (b - a).cross(c - a)
    }

    pub fn face_area(&self, face: FaceId) -> f32 {
        0.5 * self.face_normal(face).length()
    }

    pub fn face_center(&self, face: FaceId) -> Vec3 {
        let [a, b, c] = self.face_positions(face);
        (a + b + c) / 3.0
    }

    /// Apex vertices opposite an edge: one per incident face.
    pub fn opposite_apexes(&self, edge: EdgeId) -> (VertexId, Option<VertexId>) {
        let h = self.edges[edge].he;
        let apex = self.half_edges[self.prev(h)].vertex;
        let other = self.half_edges[h]
            .twin
            .map(|t| self.half_edges[self.prev(t)].vertex);
        (apex, other)
    }

    /// Outgoing half-edges of `vertex`, plus the incoming boundary
    /// half-edge that closes an open fan (if any).
    fn walk_one_ring(&self, vertex: VertexId) -> (Vec<HalfEdgeId>, Option<HalfEdgeId>) {
        let Some(start) = self.vertices[vertex].he else {
            return (Vec::new(), None);
        };
        let limit = self.half_edges.len();
        let mut out = vec![start];

        let mut h = start;
        while let Some(t) = self.half_edges[h].twin {
            h = self.half_edges[t].next;
            if h == start || out.len() > limit {
                return (out, None);
            }
            out.push(h);
        }

        // Open fan: rotate the other way from the start.
        let mut h = start;
        loop {
            let p = self.prev(h);
            match self.half_edges[p].twin {
                Some(t) => {
                    h = t;
                    if h == start || out.len() > limit {
                        return (out, None);
                    }
                    out.push(h);
                }
                None => return (out, Some(p)),
            }
        }
    }

    /// One-ring neighbors of `vertex`, each listed once.
    pub fn neighbors(&self, vertex: VertexId) -> Vec<VertexId> {
        let (out, closing) = self.walk_one_ring(vertex);
        let mut ns: Vec<VertexId> = out.iter().map(|&h| self.dest(h)).collect();
        if let Some(p) = closing {
            ns.push(self.half_edges[p].vertex);
        }
        ns
    }

    /// Faces incident to `vertex`.
    pub fn vertex_faces(&self, vertex: VertexId) -> Vec<FaceId> {
        self.walk_one_ring(vertex)
            .0
            .into_iter()
            .map(|h| self.half_edges[h].face)
            .collect()
    }

    pub fn degree(&self, vertex: VertexId) -> usize {
        self.neighbors(vertex).len()
    }

    pub fn are_adjacent(&self, a: VertexId, b: VertexId) -> bool {
        self.neighbors(a).contains(&b)
    }

    /// Half-edges without a twin.
    pub fn boundary_half_edges(&self) -> impl Iterator<Item = HalfEdgeId> + '_ {
        self.half_edges
            .iter()
            .enumerate()
            .filter(|(_, he)| he.twin.is_none())
            .map(|(i, _)| i)
    }

    /// Walks the boundary loop containing the twinless half-edge `start`.
    ///
    /// Returns an empty vector when `start` is not on the boundary.
    pub fn boundary_loop(&self, start: HalfEdgeId) -> Vec<HalfEdgeId> {
        if start >= self.half_edges.len() || self.half_edges[start].twin.is_some() {
            return Vec::new();
        }
        let limit = self.half_edges.len();
        let mut out = vec![start];
        let mut b = start;
        loop {
            let mut h = self.half_edges[b].next;
            while let Some(t) = self.half_edges[h].twin {
                h = self.half_edges[t].next;
            }
            if h == start || out.len() > limit {
                return out;
            }
            out.push(h);
            b = h;
        }
    }

    pub fn is_closed(&self) -> bool {
        !self.faces.is_empty() && self.half_edges.iter().all(|h| h.twin.is_some())
    }

    /// Signed enclosed volume (divergence theorem). Only meaningful for
    /// closed meshes.
    pub fn volume(&self) -> f32 {
        (0..self.faces.len())
            .map(|f| {
                let [a, b, c] = self.face_positions(f);
                a.dot(b.cross(c))
            })
            .sum::<f32>()
            / 6.0
    }

    pub fn surface_area(&self) -> f32 {
        (0..self.faces.len()).map(|f| self.face_area(f)).sum()
    }

    /// Recomputes vertex normals and curvature from the current positions.
    ///
    /// Vertex normals are the area-weighted average of incident face
    /// normals. Curvature is the angular defect: `2π` (or `π` on the
    /// boundary) minus the sum of incident corner angles.
    pub fn recompute_normals_and_curvature(&mut self) {
        let mut angle_sum = vec![0.0f32; self.vertices.len()];
        let mut normals = vec![Vec3::ZERO; self.vertices.len()];

        for f in 0..self.faces.len() {
            let ids = self.face_vertices(f);
            let ps = ids.map(|v| self.vertices[v].position);
            let n = (ps[1] - ps[0]).cross(ps[2] - ps[0]);
            for k in 0..3 {
                let p = ps[k];
                let u = ps[(k + 1) % 3] - p;
                let w = ps[(k + 2) % 3] - p;
                normals[ids[k]] += n;
                angle_sum[ids[k]] += u.cross(w).length().atan2(u.dot(w));
            }
        }

        for (v, vert) in self.vertices.iter_mut().enumerate() {
            vert.normal = normals[v].normalize_or_zero();
            vert.curvature = if vert.he.is_none() {
                0.0
            } else if vert.boundary {
                PI - angle_sum[v]
            } else {
                TAU - angle_sum[v]
            };
        }
    }

    /// Checks every structural invariant of the half-edge graph.
    pub fn validate(&self) -> Result<(), MeshError> {
        let bad = |msg: String| Err(MeshError::InvalidTopology(msg));

        if self.vertices.len() > self.max_vertices {
            return bad(format!(
                "{} vertices exceed capacity {}",
                self.vertices.len(),
                self.max_vertices
            ));
        }

        for (h, he) in self.half_edges.iter().enumerate() {
            if he.next >= self.half_edges.len()
                || he.vertex >= self.vertices.len()
                || he.edge >= self.edges.len()
                || he.face >= self.faces.len()
            {
                return bad(format!("half-edge {h} has a dangling link"));
            }
            if let Some(t) = he.twin {
                if t >= self.half_edges.len() || self.half_edges[t].twin != Some(h) {
                    return bad(format!("twin of half-edge {h} does not point back"));
                }
                if self.half_edges[t].face == he.face {
                    return bad(format!("half-edge {h} and its twin share face {}", he.face));
                }
                if self.half_edges[t].edge != he.edge {
                    return bad(format!("half-edge {h} and its twin disagree on edge"));
                }
                if self.half_edges[t].vertex != self.dest(h) {
                    return bad(format!("twin of half-edge {h} is not reversed"));
                }
            }
            if self.half_edges[he.next].face != he.face {
                return bad(format!("half-edge {h} and its next disagree on face"));
            }
        }

        for (f, face) in self.faces.iter().enumerate() {
            let h = face.he;
            if h >= self.half_edges.len() || self.half_edges[h].face != f {
                return bad(format!("face {f} points at a foreign half-edge"));
            }
            let [h0, h1, h2] = self.face_half_edges(f);
            if self.half_edges[h2].next != h0 {
                return bad(format!("face {f} is not a 3-cycle"));
            }
            let [a, b, c] = [h0, h1, h2].map(|x| self.half_edges[x].vertex);
            if a == b || b == c || a == c {
                return bad(format!("face {f} does not have 3 distinct vertices"));
            }
        }

        for (e, edge) in self.edges.iter().enumerate() {
            if edge.he >= self.half_edges.len() || self.half_edges[edge.he].edge != e {
                return bad(format!("edge {e} points at a foreign half-edge"));
            }
        }

        for (v, vert) in self.vertices.iter().enumerate() {
            if vert.id != v {
                return bad(format!("vertex {v} carries id {}", vert.id));
            }
            if let Some(h) = vert.he
                && (h >= self.half_edges.len() || self.half_edges[h].vertex != v)
            {
                return bad(format!("vertex {v} points at a half-edge it does not own"));
            }
        }

        Ok(())
    }
}
