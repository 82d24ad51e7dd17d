/// Identifier for a vertex (polyp) in a [`crate::mesh::SurfaceMesh`].
///
/// This is an index into the mesh's vertex arena and into every per-vertex
/// buffer owned by the same organism. Ids are append-only and never reused.
pub type VertexId = usize;

/// Index into the half-edge arena of a [`crate::mesh::SurfaceMesh`].
pub type HalfEdgeId = usize;

/// Index into the edge arena of a [`crate::mesh::SurfaceMesh`].
pub type EdgeId = usize;

/// Index into the face arena of a [`crate::mesh::SurfaceMesh`].
pub type FaceId = usize;

/// Identifier the external loop assigns to an organism, carried in errors.
pub type OrganismId = u64;
