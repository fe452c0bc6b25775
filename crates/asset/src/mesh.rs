//! Flat, per-corner vertex streams ready for GPU upload.
//!
//! Every triangulated corner becomes its own vertex: nothing is shared, and
//! the index buffer is simply `0..N`.

use corelib::{RenderFlags, Vec2, Vec3};

use crate::error::ParseError;
use crate::obj::ObjDocument;

/// One emitted vertex, gathered from the parallel streams.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tangent: [f32; 3],
    pub barycentric: [f32; 3],
    pub texcoord: [f32; 2],
    pub color: [f32; 4],
}

/// Parallel attribute arrays; all describe the same `vertex_count()` vertices.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlattenedMesh {
    pub positions: Vec<f32>,
    pub normals: Vec<f32>,
    pub tangents: Vec<f32>,
    pub barycentrics: Vec<f32>,
    pub texcoords: Vec<f32>,
    pub colors: Vec<f32>,
    pub indices: Vec<u32>,
}

/// One-hot marker per triangle corner, for edge/wireframe shading.
const BARYCENTRIC: [[f32; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

impl FlattenedMesh {
    /// Streams sized for `corners` vertices.
    pub fn with_capacity(corners: usize) -> Self {
        Self {
            positions: Vec::with_capacity(corners * 3),
            normals: Vec::with_capacity(corners * 3),
            tangents: Vec::with_capacity(corners * 3),
            barycentrics: Vec::with_capacity(corners * 3),
            texcoords: Vec::with_capacity(corners * 2),
            colors: Vec::with_capacity(corners * 4),
            indices: Vec::with_capacity(corners),
        }
    }

    /// Walk groups, faces and corners in parse order and emit one vertex per
    /// corner. Vertex normals/texcoords are used only when present and enabled
    /// by `flags`; otherwise the face normal and (0, 0) are emitted.
    pub fn build(doc: &ObjDocument, flags: RenderFlags) -> Result<Self, ParseError> {
        let total = doc.corner_count();
        if u32::try_from(total).is_err() {
            return Err(ParseError::TooManyCorners(total));
        }

        let mut mesh = Self::with_capacity(total);
        let positions = doc.positions();
        let normals = doc.normals();
        let texcoords = doc.texcoords();

        for group in doc.groups() {
            for face in group.faces() {
                let color = doc.find_color(&face.material);

                for (k, corner) in face.corners.iter().enumerate() {
                    let index = mesh.indices.len() as u32;
                    mesh.indices.push(index);

                    let position = positions.get(corner.vertex).copied().unwrap_or(Vec3::ZERO);
                    mesh.positions.extend_from_slice(&position.to_array());

                    mesh.barycentrics.extend_from_slice(&BARYCENTRIC[k % 3]);

                    let texcoord = corner
                        .texcoord
                        .filter(|_| flags.use_texture)
                        .and_then(|i| texcoords.get(i).copied())
                        .unwrap_or(Vec2::ZERO);
                    mesh.texcoords.extend_from_slice(&texcoord.to_array());

                    mesh.colors.extend_from_slice(&color.to_array());

                    let normal = corner
                        .normal
                        .filter(|_| flags.use_normal)
                        .and_then(|i| normals.get(i).copied())
                        .unwrap_or(face.normal);
                    mesh.normals.extend_from_slice(&normal.to_array());

                    mesh.tangents.extend_from_slice(&face.tangent.to_array());
                }
            }
        }

        log::info!(
            "Flattened {}: {} vertices ({} triangles)",
            doc.name(),
            mesh.vertex_count(),
            mesh.vertex_count() / 3
        );
        Ok(mesh)
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.indices.len()
    }

    /// Returns `true` if there is at least one triangle and all streams agree
    /// on the vertex count.
    pub fn is_valid(&self) -> bool {
        let n = self.indices.len();
        n > 0
            && n % 3 == 0
            && self.positions.len() == n * 3
            && self.normals.len() == n * 3
            && self.tangents.len() == n * 3
            && self.barycentrics.len() == n * 3
            && self.texcoords.len() == n * 2
            && self.colors.len() == n * 4
    }

    /// Gather vertex `i` from the streams.
    pub fn vertex(&self, i: usize) -> Option<MeshVertex> {
        if i >= self.vertex_count() {
            return None;
        }
        let v3 = |s: &[f32]| [s[i * 3], s[i * 3 + 1], s[i * 3 + 2]];
        Some(MeshVertex {
            position: v3(&self.positions),
            normal: v3(&self.normals),
            tangent: v3(&self.tangents),
            barycentric: v3(&self.barycentrics),
            texcoord: [self.texcoords[i * 2], self.texcoords[i * 2 + 1]],
            color: [
                self.colors[i * 4],
                self.colors[i * 4 + 1],
                self.colors[i * 4 + 2],
                self.colors[i * 4 + 3],
            ],
        })
    }
}
