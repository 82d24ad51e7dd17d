//! Annotated OBJ output and plain OBJ seed input.
//!
//! The annotated format is a superset of Wavefront OBJ: a `#coral` header
//! names the per-polyp attributes, and one `c` line per vertex carries
//! their values in vertex order. Ordinary OBJ readers ignore both.

use crate::error::SimError;
use crate::fields::PolypState;
use crate::mesh::SurfaceMesh;
use crate::types::VertexId;
use glam::Vec3;
use std::io::{BufRead, Write};

/// Attribute names in `c`-line order.
pub fn attribute_names(polyps: &PolypState) -> Vec<String> {
    let mut names: Vec<String> = ["light", "collection", "curvature", "gravity", "energy"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    names.extend((0..polyps.n_morphogens()).map(|i| format!("mu_{i}")));
    names.extend((0..polyps.n_memory_bits()).map(|i| format!("mem_{i}")));
    names.extend((0..polyps.n_signals()).map(|i| format!("sig_{i}")));
    names
}

/// Writes `mesh` and its per-polyp attributes.
///
/// Layout: a comment line, the `#coral` header, `v` lines, `vn` lines,
/// `c` lines, then 1-based `f` lines.
pub fn write_coral_obj<W: Write>(
    out: &mut W,
    mesh: &SurfaceMesh,
    polyps: &PolypState,
) -> std::io::Result<()> {
    writeln!(out, "#Exported from polyp_growth")?;
    writeln!(out, "#coral {}", attribute_names(polyps).join(" "))?;

    for v in mesh.vertices() {
        let p = v.position;
        writeln!(out, "v {:.6} {:.6} {:.6}", p.x, p.y, p.z)?;
    }
    writeln!(out)?;
    for v in mesh.vertices() {
        let n = v.normal;
        writeln!(out, "vn {:.6} {:.6} {:.6}", n.x, n.y, n.z)?;
    }
    writeln!(out)?;

    for v in mesh.vertices() {
        let id = v.id;
        write!(
            out,
            "c {:.6} {:.6} {:.6} {:.6} {:.6}",
            polyps.light[id],
            polyps.collection[id],
            v.curvature,
            polyps.gravity[id],
            polyps.energy[id]
        )?;
        for ch in 0..polyps.n_morphogens() {
            write!(out, " {:.6}", polyps.morphogen(id, ch))?;
        }
        for bit in 0..polyps.n_memory_bits() {
            write!(out, " {}", u8::from(polyps.memory_bit(id, bit)))?;
        }
        for s in polyps.signals(id) {
            write!(out, " {s:.6}")?;
        }
        writeln!(out)?;
    }
    writeln!(out)?;

    for f in 0..mesh.face_count() {
        let [a, b, c] = mesh.face_vertices(f);
        writeln!(out, "f {} {} {}", a + 1, b + 1, c + 1)?;
    }
    out.flush()
}

/// Vertex positions and triangles read from an OBJ file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjData {
    pub positions: Vec<Vec3>,
    pub triangles: Vec<[VertexId; 3]>,
}

impl ObjData {
    pub fn into_mesh(self, max_vertices: usize) -> Result<SurfaceMesh, SimError> {
        Ok(SurfaceMesh::from_triangles(
            &self.positions,
            &self.triangles,
            max_vertices,
        )?)
    }
}

/// Parses `v` and `f` records; every other record is ignored.
///
/// Face corners may use `v`, `v/vt`, `v//vn` or `v/vt/vn` forms and
/// negative (relative) indices. Polygons are fan-triangulated from their
/// first corner.
pub fn read_obj<R: BufRead>(reader: R) -> Result<ObjData, SimError> {
    let mut data = ObjData::default();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let lineno = i + 1;
        let parse_err = |message: String| SimError::Parse {
            line: lineno,
            message,
        };

        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("v") => {
                let coords = tokens
                    .take(3)
                    .map(|t| {
                        t.parse::<f32>()
                            .map_err(|e| parse_err(format!("bad coordinate {t:?}: {e}")))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                if coords.len() != 3 {
                    return Err(parse_err("vertex needs three coordinates".to_string()));
                }
                data.positions.push(Vec3::new(coords[0], coords[1], coords[2]));
            }
            Some("f") => {
                let corners = tokens
                    .map(|t| resolve_index(t, data.positions.len()).map_err(&parse_err))
                    .collect::<Result<Vec<_>, _>>()?;
                if corners.len() < 3 {
                    return Err(parse_err("face needs at least three corners".to_string()));
                }
                for k in 1..corners.len() - 1 {
                    data.triangles.push([corners[0], corners[k], corners[k + 1]]);
                }
            }
            _ => {}
        }
    }

    Ok(data)
}

/// Converts one face corner token to a 0-based vertex index.
fn resolve_index(token: &str, vertex_count: usize) -> Result<VertexId, String> {
    let head = token.split('/').next().unwrap_or(token);
    let raw: i64 = head
        .parse()
        .map_err(|e| format!("bad face index {token:?}: {e}"))?;
    let idx = match raw {
        0 => return Err("face index 0 is not valid".to_string()),
        r if r > 0 => r - 1,
        r => vertex_count as i64 + r,
    };
    if idx < 0 || idx as usize >= vertex_count {
        return Err(format!("face index {raw} out of range"));
    }
    Ok(idx as usize)
}

/// Reads a seed mesh from an OBJ source.
pub fn load_seed_mesh<R: BufRead>(reader: R, max_vertices: usize) -> Result<SurfaceMesh, SimError> {
    read_obj(reader)?.into_mesh(max_vertices)
}
