//! Local remeshing edits on [`SurfaceMesh`].
//!
//! Every edit either completes and leaves the half-edge graph valid, or
//! returns an error before touching anything.

use crate::error::MeshError;
use crate::mesh::{Edge, Face, HalfEdge, SurfaceMesh};
use crate::types::{EdgeId, FaceId, VertexId};

impl SurfaceMesh {
    fn check_edge(&self, edge: EdgeId) -> Result<(), MeshError> {
        if edge >= self.edges.len() {
            return Err(MeshError::InvalidIndex {
                kind: "edge",
                index: edge,
            });
        }
        Ok(())
    }

    fn check_face(&self, face: FaceId) -> Result<(), MeshError> {
        if face >= self.faces.len() {
            return Err(MeshError::InvalidIndex {
                kind: "face",
                index: face,
            });
        }
        Ok(())
    }

    /// Inserts a vertex at the midpoint of `edge`.
    ///
    /// Each incident face is split in two, so an interior edge adds two
    /// faces and a boundary edge adds one. The new vertex is on the
    /// boundary exactly when the split edge was.
    ///
    /// ### Parameters
    /// - `edge` - Edge to split.
    ///
    /// ### Returns
    /// The id of the new vertex, or [`MeshError::CapacityExceeded`] with the
    /// mesh unchanged.
    pub fn split_edge(&mut self, edge: EdgeId) -> Result<VertexId, MeshError> {
        self.check_edge(edge)?;

        let h_ab = self.edges[edge].he;
        let HalfEdge {
            twin,
            next: h_bc,
            vertex: a,
            face: f1,
            ..
        } = self.half_edges[h_ab];
        let h_ca = self.half_edges[h_bc].next;
        let b = self.half_edges[h_bc].vertex;
        let c = self.half_edges[h_ca].vertex;

        let pa = self.vertices[a].position;
        let pb = self.vertices[b].position;
        let m = self.create_vertex((pa + pb) * 0.5)?;
        {
            let na = self.vertices[a].normal;
            let nb = self.vertices[b].normal;
            let vm = &mut self.vertices[m];
            vm.normal = (na + nb).normalize_or_zero();
            vm.boundary = twin.is_none();
        }

        // Side of f1: (a, b, c) becomes (a, m, c) + (m, b, c).
        let h_mc = self.half_edges.len();
        let h_cm = h_mc + 1;
        let h_mb = h_mc + 2;
        let e_mc = self.edges.len();
        let e_mb = e_mc + 1;
        let f3 = self.faces.len();

        self.half_edges.push(HalfEdge {
            twin: Some(h_cm),
            next: h_ca,
            vertex: m,
            edge: e_mc,
            face: f1,
        });
        self.half_edges.push(HalfEdge {
            twin: Some(h_mc),
            next: h_mb,
            vertex: c,
            edge: e_mc,
            face: f3,
        });
        self.half_edges.push(HalfEdge {
            twin: None,
            next: h_bc,
            vertex: m,
            edge: e_mb,
            face: f3,
        });
        self.half_edges[h_ab].next = h_mc;
        self.half_edges[h_bc].next = h_cm;
        self.half_edges[h_bc].face = f3;

        self.edges.push(Edge { he: h_mc });
        self.edges.push(Edge { he: h_mb });
        self.faces[f1].he = h_ab;
        self.faces.push(Face { he: h_mb });
        self.vertices[m].he = Some(h_mb);

        // Side of f2: (b, a, d) becomes (b, m, d) + (m, a, d).
        if let Some(h_ba) = twin {
            let h_ad = self.half_edges[h_ba].next;
            let h_db = self.half_edges[h_ad].next;
            let d = self.half_edges[h_db].vertex;
            let f2 = self.half_edges[h_ba].face;

            let h_md = self.half_edges.len();
            let h_dm = h_md + 1;
            let h_ma = h_md + 2;
            let e_md = self.edges.len();
            let f4 = self.faces.len();

            self.half_edges.push(HalfEdge {
                twin: Some(h_dm),
                next: h_db,
                vertex: m,
                edge: e_md,
                face: f2,
            });
            self.half_edges.push(HalfEdge {
                twin: Some(h_md),
                next: h_ma,
                vertex: d,
                edge: e_md,
                face: f4,
            });
            self.half_edges.push(HalfEdge {
                twin: Some(h_ab),
                next: h_ad,
                vertex: m,
                edge,
                face: f4,
            });

            let hba = &mut self.half_edges[h_ba];
            hba.next = h_md;
            hba.edge = e_mb;
            hba.twin = Some(h_mb);
            self.half_edges[h_mb].twin = Some(h_ba);
            self.half_edges[h_ab].twin = Some(h_ma);
            self.half_edges[h_ad].next = h_dm;
            self.half_edges[h_ad].face = f4;

            self.edges.push(Edge { he: h_md });
            self.faces[f2].he = h_ba;
            self.faces.push(Face { he: h_ma });
        }

        Ok(m)
    }

    /// Inserts a vertex at the centroid of `face`, replacing it with three
    /// faces.
    pub fn split_face(&mut self, face: FaceId) -> Result<VertexId, MeshError> {
        self.check_face(face)?;

        let [h_ab, h_bc, h_ca] = self.face_half_edges(face);
        let [a, b, c] = [h_ab, h_bc, h_ca].map(|h| self.half_edges[h].vertex);
        let center = self.face_center(face);
        let normal = self.face_normal(face).normalize_or_zero();
        let m = self.create_vertex(center)?;
        self.vertices[m].normal = normal;

        let base = self.half_edges.len();
        let (h_bm, h_mb, h_cm, h_mc, h_am, h_ma) =
            (base, base + 1, base + 2, base + 3, base + 4, base + 5);
        let e0 = self.edges.len();
        let (e_bm, e_cm, e_am) = (e0, e0 + 1, e0 + 2);
        let f2 = self.faces.len();
        let f3 = f2 + 1;

        let link = |twin, next, vertex, edge, face| HalfEdge {
            twin: Some(twin),
            next,
            vertex,
            edge,
            face,
        };
        let new_half_edges = [
            link(h_mb, h_ma, b, e_bm, face),
            link(h_bm, h_bc, m, e_bm, f2),
            link(h_mc, h_mb, c, e_cm, f2),
            link(h_cm, h_ca, m, e_cm, f3),
            link(h_ma, h_mc, a, e_am, f3),
            link(h_am, h_ab, m, e_am, face),
        ];
        self.half_edges.extend(new_half_edges);

        self.half_edges[h_ab].next = h_bm;
        self.half_edges[h_bc].next = h_cm;
        self.half_edges[h_bc].face = f2;
        self.half_edges[h_ca].next = h_am;
        self.half_edges[h_ca].face = f3;

        self.edges.push(Edge { he: h_bm });
        self.edges.push(Edge { he: h_cm });
        self.edges.push(Edge { he: h_am });
        self.faces[face].he = h_ab;
        self.faces.push(Face { he: h_bc });
        self.faces.push(Face { he: h_ca });
        self.vertices[m].he = Some(h_ma);

        Ok(m)
    }

    /// Splits `face` if it is too large.
    ///
    /// A face whose longest edge exceeds `max_edge_len` is split along that
    /// edge; otherwise a face whose area exceeds `max_area` is split at its
    /// centroid.
    ///
    /// ### Returns
    /// `Ok(Some(vertex))` when a split happened, `Ok(None)` when the face
    /// was within bounds.
    pub fn split_face_if_oversized(
        &mut self,
        face: FaceId,
        max_edge_len: f32,
        max_area: f32,
    ) -> Result<Option<VertexId>, MeshError> {
        self.check_face(face)?;

        let (longest, len) = self
            .face_half_edges(face)
            .into_iter()
            .map(|h| {
                let e = self.half_edges[h].edge;
                (e, self.edge_length(e))
            })
            .fold((usize::MAX, f32::NEG_INFINITY), |best, cur| {
                if cur.1 > best.1 { cur } else { best }
            });

        if len > max_edge_len {
            return self.split_edge(longest).map(Some);
        }
        if self.face_area(face) > max_area {
            return self.split_face(face).map(Some);
        }
        Ok(None)
    }

    /// Flips an interior edge to the opposite diagonal of its two faces when
    /// that diagonal is shorter by more than `epsilon`.
    ///
    /// No-op on boundary edges, when the apexes coincide, when the new
    /// diagonal already exists, or when either endpoint would be left with
    /// fewer than three neighbors.
    ///
    /// ### Returns
    /// `Ok(true)` when the edge was flipped.
    pub fn flip_edge_if_better(&mut self, edge: EdgeId, epsilon: f32) -> Result<bool, MeshError> {
        self.check_edge(edge)?;

        let h_ab = self.edges[edge].he;
        let Some(h_ba) = self.half_edges[h_ab].twin else {
            return Ok(false);
        };
        let h_bc = self.half_edges[h_ab].next;
        let h_ca = self.half_edges[h_bc].next;
        let h_ad = self.half_edges[h_ba].next;
        let h_db = self.half_edges[h_ad].next;

        let a = self.half_edges[h_ab].vertex;
        let b = self.half_edges[h_ba].vertex;
        let c = self.half_edges[h_ca].vertex;
        let d = self.half_edges[h_db].vertex;
        if c == d {
            return Ok(false);
        }

        let pos = |v: VertexId| self.vertices[v].position;
        let current = pos(a).distance(pos(b));
        let diagonal = pos(c).distance(pos(d));
        if !(diagonal < current - epsilon) || diagonal <= f32::EPSILON {
            return Ok(false);
        }
        if self.degree(a) <= 3 || self.degree(b) <= 3 || self.are_adjacent(c, d) {
            return Ok(false);
        }

        let f1 = self.half_edges[h_ab].face;
        let f2 = self.half_edges[h_ba].face;

        // f1 becomes (d, c, a), f2 becomes (c, d, b).
        self.half_edges[h_ab].vertex = d;
        self.half_edges[h_ab].next = h_ca;
        self.half_edges[h_ca].next = h_ad;
        self.half_edges[h_ad].next = h_ab;
        self.half_edges[h_ad].face = f1;

        self.half_edges[h_ba].vertex = c;
        self.half_edges[h_ba].next = h_db;
        self.half_edges[h_db].next = h_bc;
        self.half_edges[h_bc].next = h_ba;
        self.half_edges[h_bc].face = f2;

        self.faces[f1].he = h_ab;
        self.faces[f2].he = h_ba;
        self.vertices[a].he = Some(h_ad);
        self.vertices[b].he = Some(h_bc);

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn single_triangle(max_vertices: usize) -> SurfaceMesh {
        let positions = [Vec3::ZERO, Vec3::X, Vec3::new(0.0, 0.0, -1.0)];
        SurfaceMesh::from_triangles(&positions, &[[0, 1, 2]], max_vertices).unwrap()
    }

    /// Two triangles sharing a long diagonal, with a ring of extra faces so
    /// both diagonal endpoints have more than three neighbors.
    fn kite_with_long_diagonal() -> (SurfaceMesh, EdgeId) {
        let positions = [
            Vec3::new(-2.0, 0.0, 0.0), // a
            Vec3::new(2.0, 0.0, 0.0),  // b
            Vec3::new(0.0, 0.0, -0.5), // c
            Vec3::new(0.0, 0.0, 0.5),  // d
            Vec3::new(-3.0, 0.0, -1.0),
            Vec3::new(-3.0, 0.0, 1.0),
            Vec3::new(3.0, 0.0, -1.0),
            Vec3::new(3.0, 0.0, 1.0),
        ];
        let triangles = [
            [0, 1, 2],
            [1, 0, 3],
            [4, 0, 2],
            [5, 3, 0],
            [4, 5, 0],
            [2, 1, 6],
            [3, 7, 1],
            [6, 1, 7],
        ];
        let mesh = SurfaceMesh::from_triangles(&positions, &triangles, 16).unwrap();
        let edge = (0..mesh.edge_count())
            .find(|&e| {
                let (u, v) = mesh.edge_vertices(e);
                (u, v) == (0, 1) || (u, v) == (1, 0)
            })
            .unwrap();
        (mesh, edge)
    }

    #[test]
    fn split_interior_edge_updates_counts() {
        let mut mesh = SurfaceMesh::octahedron(1.0, 16).unwrap();
        let (v0, f0, e0) = (mesh.vertex_count(), mesh.face_count(), mesh.edge_count());
        let (a, b) = mesh.edge_vertices(0);

        let m = mesh.split_edge(0).unwrap();
        mesh.validate().unwrap();

        assert_eq!(mesh.vertex_count(), v0 + 1);
        assert_eq!(mesh.face_count(), f0 + 2);
        assert_eq!(mesh.edge_count(), e0 + 3);
        assert!(mesh.is_closed());
        assert!(!mesh.is_boundary_vertex(m));
        assert_eq!(mesh.degree(m), 4);
        assert!(mesh.are_adjacent(m, a) && mesh.are_adjacent(m, b));
        assert!(!mesh.are_adjacent(a, b));

        let mid = (mesh.position(a) + mesh.position(b)) * 0.5;
        assert!(mesh.position(m).distance(mid) < 1e-6);
    }

    #[test]
    fn split_boundary_edge_adds_one_face() {
        let mut mesh = single_triangle(8);
        let boundary_edge = 0;
        assert!(mesh.is_boundary_edge(boundary_edge));

        let m = mesh.split_edge(boundary_edge).unwrap();
        mesh.validate().unwrap();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.face_count(), 2);
        assert_eq!(mesh.edge_count(), 5);
        assert!(mesh.is_boundary_vertex(m));

        let start = mesh.boundary_half_edges().next().unwrap();
        assert_eq!(mesh.boundary_loop(start).len(), 4);
    }

    #[test]
    fn split_at_capacity_leaves_mesh_untouched() {
        let mut mesh = SurfaceMesh::octahedron(1.0, 6).unwrap();
        let before = mesh.clone();

        assert_eq!(
            mesh.split_edge(3),
            Err(MeshError::CapacityExceeded { max_vertices: 6 })
        );
        assert_eq!(
            mesh.split_face(2),
            Err(MeshError::CapacityExceeded { max_vertices: 6 })
        );
        assert_eq!(mesh.half_edges(), before.half_edges());
        assert_eq!(mesh.faces(), before.faces());
        assert_eq!(mesh.vertex_count(), 6);
    }

    #[test]
    fn split_face_inserts_centroid() {
        let mut mesh = SurfaceMesh::octahedron(1.0, 16).unwrap();
        let center = mesh.face_center(5);
        let m = mesh.split_face(5).unwrap();
        mesh.validate().unwrap();

        assert_eq!(mesh.face_count(), 10);
        assert_eq!(mesh.edge_count(), 15);
        assert_eq!(mesh.degree(m), 3);
        assert!(mesh.position(m).distance(center) < 1e-6);
        assert!(mesh.is_closed());
    }

    #[test]
    fn oversized_face_prefers_edge_split() {
        let mut mesh = single_triangle(8);
        // Longest edge is the hypotenuse (1 -> 2).
        let m = mesh.split_face_if_oversized(0, 1.2, 10.0).unwrap().unwrap();
        let expected = Vec3::new(0.5, 0.0, -0.5);
        assert!(mesh.position(m).distance(expected) < 1e-6);

        // Small edges but a large area threshold breach splits at the centroid.
        let mut mesh = single_triangle(8);
        let m = mesh.split_face_if_oversized(0, 5.0, 0.1).unwrap().unwrap();
        assert_eq!(mesh.face_count(), 3);
        assert_eq!(mesh.degree(m), 3);

        let mut mesh = single_triangle(8);
        assert_eq!(mesh.split_face_if_oversized(0, 5.0, 5.0).unwrap(), None);
        assert!(matches!(
            mesh.split_face_if_oversized(9, 5.0, 5.0),
            Err(MeshError::InvalidIndex { kind: "face", .. })
        ));
    }

    #[test]
    fn flip_replaces_long_diagonal() {
        let (mut mesh, edge) = kite_with_long_diagonal();
        let (v0, f0, e0) = (mesh.vertex_count(), mesh.face_count(), mesh.edge_count());
        let untouched: Vec<_> = (0..mesh.face_count())
            .map(|f| {
                let mut vs = mesh.face_vertices(f);
                vs.sort();
                vs
            })
            .collect();

        assert!(mesh.flip_edge_if_better(edge, 1e-4).unwrap());
        mesh.validate().unwrap();

        assert_eq!((mesh.vertex_count(), mesh.face_count(), mesh.edge_count()), (v0, f0, e0));
        let (u, v) = mesh.edge_vertices(edge);
        assert!((u, v) == (2, 3) || (u, v) == (3, 2));
        assert!(mesh.are_adjacent(2, 3));
        assert!(!mesh.are_adjacent(0, 1));

        // Only the two faces around the edge changed.
        let changed = (0..mesh.face_count())
            .filter(|&f| {
                let mut vs = mesh.face_vertices(f);
                vs.sort();
                vs != untouched[f]
            })
            .count();
        assert_eq!(changed, 2);

        mesh.recompute_normals_and_curvature();
        for vert in mesh.vertices() {
            assert!(vert.normal.dot(Vec3::Y) > 0.999);
        }
    }

    #[test]
    fn flip_skips_boundary_and_short_edges() {
        let (mut mesh, edge) = kite_with_long_diagonal();
        let boundary = (0..mesh.edge_count())
            .find(|&e| mesh.is_boundary_edge(e))
            .unwrap();
        assert!(!mesh.flip_edge_if_better(boundary, 1e-4).unwrap());

        // A huge epsilon makes the diagonal never good enough.
        assert!(!mesh.flip_edge_if_better(edge, 10.0).unwrap());
        mesh.validate().unwrap();
    }

    #[test]
    fn flip_keeps_low_valence_vertices() {
        // In a bare octahedron every edge has equal diagonals, so nothing flips.
        let mut mesh = SurfaceMesh::octahedron(1.0, 16).unwrap();
        for e in 0..mesh.edge_count() {
            assert!(!mesh.flip_edge_if_better(e, 1e-4).unwrap());
        }
    }

    #[test]
    fn random_edit_sequence_keeps_mesh_valid() {
        let mut rng = SmallRng::seed_from_u64(11);
        let mut mesh = SurfaceMesh::octahedron(1.0, 200).unwrap();

        for _ in 0..150 {
            match rng.random_range(0..3) {
                0 => {
                    let e = rng.random_range(0..mesh.edge_count());
                    let _ = mesh.split_edge(e);
                }
                1 => {
                    let f = rng.random_range(0..mesh.face_count());
                    let _ = mesh.split_face(f);
                }
                _ => {
                    let e = rng.random_range(0..mesh.edge_count());
                    mesh.flip_edge_if_better(e, 0.0).unwrap();
                }
            }
            mesh.validate().unwrap();
            assert!(mesh.is_closed());
        }

        let euler = mesh.vertex_count() as i64 - mesh.edge_count() as i64
            + mesh.face_count() as i64;
        assert_eq!(euler, 2);
        assert!(mesh.vertex_count() <= 200);
    }
}
