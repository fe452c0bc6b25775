//! Per-face derived data: face normal, face tangent, fan triangulation.

use corelib::{UP_NORMAL, Vec2, Vec3};
use thiserror::Error;

/// Below this |det| the UV parallelogram is treated as singular.
const UV_DET_EPSILON: f32 = 1e-8;

/// One (vertex, texcoord, normal) reference of a face, 0-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Corner {
    pub vertex: usize,
    pub texcoord: Option<usize>,
    pub normal: Option<usize>,
}

impl Corner {
    pub fn new(vertex: usize, texcoord: Option<usize>, normal: Option<usize>) -> Self {
        Self {
            vertex,
            texcoord,
            normal,
        }
    }
}

#[derive(Clone, Copy, Debug, Error, PartialEq)]
pub enum TangentError {
    #[error("face has fewer than three corners with texcoords")]
    MissingTexcoords,
    #[error("UV determinant {det} is singular")]
    SingularUv { det: f32 },
    #[error("corner references missing position {0}")]
    MissingPosition(usize),
    #[error("tangent has zero length")]
    ZeroLength,
}

/// A triangulated polygon. `corners.len()` is always a multiple of 3 and
/// every triangle shares the face's single normal and tangent.
#[derive(Clone, Debug, PartialEq)]
pub struct Face {
    pub material: String,
    pub corners: Vec<Corner>,
    pub normal: Vec3,
    pub tangent: Vec3,
}

impl Face {
    /// Derive normal and tangent from the polygon's first corners, then fan it.
    /// Corner indices must already be valid for `positions` / `texcoords`.
    pub fn assemble(
        material: impl Into<String>,
        polygon: &[Corner],
        positions: &[Vec3],
        texcoords: &[Vec2],
        reverse: bool,
    ) -> Self {
        let material = material.into();
        let normal = face_normal(positions, polygon, reverse);
        let tangent = match face_tangent(positions, texcoords, polygon) {
            Ok(t) => t,
            Err(TangentError::MissingTexcoords) => Vec3::ZERO,
            Err(err) => {
                log::warn!("face ({material:?}): {err}; using zero tangent");
                Vec3::ZERO
            }
        };
        if polygon.len() < 3 {
            log::warn!(
                "face ({material:?}) has {} corners; nothing to draw",
                polygon.len()
            );
        }

        Self {
            material,
            corners: triangulate_fan(polygon),
            normal,
            tangent,
        }
    }

    /// Triangulated corner count.
    #[inline]
    pub fn corner_count(&self) -> usize {
        self.corners.len()
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.corners.len() / 3
    }
}

/// Unit normal of (p0, p1, p2): normalize((p0 - p1) x (p2 - p1)).
pub fn triangle_normal(p0: Vec3, p1: Vec3, p2: Vec3) -> Option<Vec3> {
    (p0 - p1).cross(p2 - p1).try_normalize()
}

/// Normal from corners 0,1,2; falls back to 1,2,3 for polygons, then to the
/// up vector. `reverse` negates whichever one was chosen.
pub fn face_normal(positions: &[Vec3], polygon: &[Corner], reverse: bool) -> Vec3 {
    let at = |i: usize| polygon.get(i).and_then(|c| positions.get(c.vertex)).copied();
    let from = |a: usize| match (at(a), at(a + 1), at(a + 2)) {
        (Some(p0), Some(p1), Some(p2)) => triangle_normal(p0, p1, p2),
        _ => None,
    };

    let normal = from(0)
        .or_else(|| if polygon.len() >= 4 { from(1) } else { None })
        .unwrap_or(UP_NORMAL);
    if reverse { -normal } else { normal }
}

/// Tangent of the first triangle from positions and texcoords, solving the
/// 2x2 UV system.
pub fn face_tangent(
    positions: &[Vec3],
    texcoords: &[Vec2],
    polygon: &[Corner],
) -> Result<Vec3, TangentError> {
    let mut p = [Vec3::ZERO; 3];
    let mut t = [Vec2::ZERO; 3];
    for i in 0..3 {
        let corner = polygon.get(i).ok_or(TangentError::MissingTexcoords)?;
        let uv = corner
            .texcoord
            .and_then(|ti| texcoords.get(ti))
            .ok_or(TangentError::MissingTexcoords)?;
        p[i] = positions
            .get(corner.vertex)
            .copied()
            .ok_or(TangentError::MissingPosition(corner.vertex))?;
        t[i] = *uv;
    }

    let e0 = p[1] - p[0];
    let e1 = p[2] - p[0];
    let d0 = t[1] - t[0];
    let d1 = t[2] - t[0];

    let det = d0.x * d1.y - d1.x * d0.y;
    if det.abs() < UV_DET_EPSILON || !det.is_finite() {
        return Err(TangentError::SingularUv { det });
    }

    let f = 1.0 / det;
    (f * (d1.y * e0 - d0.y * e1))
        .try_normalize()
        .ok_or(TangentError::ZeroLength)
}

/// Split a polygon into `n - 2` triangles that all share corner 0, keeping
/// winding. Fewer than three corners yield nothing.
pub fn triangulate_fan(polygon: &[Corner]) -> Vec<Corner> {
    if polygon.len() < 3 {
        return Vec::new();
    }
    let first = polygon[0];
    polygon
        .windows(2)
        .skip(1)
        .flat_map(|pair| [first, pair[0], pair[1]])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use corelib::{vec2, vec3};

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-6
    }

    fn corners(n: usize) -> Vec<Corner> {
        (0..n).map(|i| Corner::new(i, Some(i), None)).collect()
    }

    fn quad() -> (Vec<Vec3>, Vec<Vec2>) {
        (
            vec![
                vec3(0.0, 0.0, 0.0),
                vec3(1.0, 0.0, 0.0),
                vec3(1.0, 1.0, 0.0),
                vec3(0.0, 1.0, 0.0),
            ],
            vec![
                vec2(0.0, 0.0),
                vec2(1.0, 0.0),
                vec2(1.0, 1.0),
                vec2(0.0, 1.0),
            ],
        )
    }

    #[test]
    fn normal_of_ccw_triangle() {
        let n = triangle_normal(
            vec3(0.0, 0.0, 0.0),
            vec3(1.0, 0.0, 0.0),
            vec3(0.0, 1.0, 0.0),
        )
        .unwrap();
        assert!(close(n, vec3(0.0, 0.0, -1.0)));
    }

    #[test]
    fn reverse_negates() {
        let (pos, _) = quad();
        let a = face_normal(&pos, &corners(3), false);
        let b = face_normal(&pos, &corners(3), true);
        assert!(close(a, -b));
    }

    #[test]
    fn degenerate_first_triangle_uses_next() {
        // Corners 0,1,2 are collinear; 1,2,3 are not.
        let pos = vec![
            vec3(0.0, 0.0, 0.0),
            vec3(1.0, 0.0, 0.0),
            vec3(2.0, 0.0, 0.0),
            vec3(2.0, 1.0, 0.0),
        ];
        let n = face_normal(&pos, &corners(4), false);
        let expected = triangle_normal(pos[1], pos[2], pos[3]).unwrap();
        assert!(close(n, expected));
    }

    #[test]
    fn unresolvable_normal_is_up() {
        let pos = vec![vec3(0.0, 0.0, 0.0), vec3(1.0, 0.0, 0.0)];
        assert_eq!(face_normal(&pos, &corners(2), false), UP_NORMAL);
        assert_eq!(face_normal(&pos, &corners(2), true), -UP_NORMAL);

        let collinear = vec![Vec3::ZERO, Vec3::X, 2.0 * Vec3::X];
        assert_eq!(face_normal(&collinear, &corners(3), false), UP_NORMAL);
    }

    #[test]
    fn tangent_follows_u_axis() {
        let (pos, uv) = quad();
        let t = face_tangent(&pos, &uv, &corners(3)).unwrap();
        assert!(close(t, Vec3::X));
    }

    #[test]
    fn tangent_follows_rotated_uv() {
        // u runs along +y in object space.
        let (pos, _) = quad();
        let uv = vec![
            vec2(0.0, 0.0),
            vec2(0.0, -1.0),
            vec2(1.0, -1.0),
        ];
        let t = face_tangent(&pos, &uv, &corners(3)).unwrap();
        assert!(close(t, Vec3::Y));
    }

    #[test]
    fn tangent_failures() {
        let (pos, uv) = quad();
        let no_uv: Vec<_> = (0..3).map(|i| Corner::new(i, None, None)).collect();
        assert_eq!(
            face_tangent(&pos, &uv, &no_uv),
            Err(TangentError::MissingTexcoords)
        );

        let flat_uv = vec![vec2(0.5, 0.5); 3];
        assert!(matches!(
            face_tangent(&pos, &flat_uv, &corners(3)),
            Err(TangentError::SingularUv { .. })
        ));

        let dangling = [
            Corner::new(0, Some(0), None),
            Corner::new(1, Some(1), None),
            Corner::new(7, Some(2), None),
        ];
        assert_eq!(
            face_tangent(&pos, &uv, &dangling),
            Err(TangentError::MissingPosition(7))
        );
    }

    #[test]
    fn fan_keeps_corner_zero_and_winding() {
        let fan = triangulate_fan(&corners(5));
        let v: Vec<_> = fan.iter().map(|c| c.vertex).collect();
        assert_eq!(v, [0, 1, 2, 0, 2, 3, 0, 3, 4]);
        assert_eq!(triangulate_fan(&corners(3)), corners(3));
        assert!(triangulate_fan(&corners(2)).is_empty());
    }

    #[test]
    fn assembled_quad() {
        let (pos, uv) = quad();
        let face = Face::assemble("wall", &corners(4), &pos, &uv, false);
        assert_eq!(face.corner_count(), 6);
        assert_eq!(face.triangle_count(), 2);
        assert!(close(face.normal, vec3(0.0, 0.0, -1.0)));
        assert!(close(face.tangent, Vec3::X));
        assert_eq!(face.material, "wall");
    }

    #[test]
    fn assembled_without_uv_has_zero_tangent() {
        let (pos, uv) = quad();
        let polygon: Vec<_> = (0..3).map(|i| Corner::new(i, None, None)).collect();
        let face = Face::assemble("", &polygon, &pos, &uv, false);
        assert_eq!(face.tangent, Vec3::ZERO);
        assert!(face.tangent.is_finite());
    }
}
