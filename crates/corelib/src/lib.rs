//! Core shared types: math re-exports, load/render configuration, errors.
//! Renderer-agnostic; used by both the asset pipeline and the renderer.

pub use glam::{Vec2, Vec3, Vec4, vec2, vec3, vec4};

pub mod error;
pub mod options;

pub use error::{CoreError, CoreResult};
pub use options::{LoadOptions, RenderFlags};

/// Diffuse color used when a face's material cannot be resolved (opaque green).
pub const FALLBACK_COLOR: Vec4 = Vec4::new(0.0, 0.8, 0.0, 1.0);

/// Face normal used when none can be derived from the face's positions.
pub const UP_NORMAL: Vec3 = Vec3::Y;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_color_is_opaque_green() {
        assert_eq!(FALLBACK_COLOR.to_array(), [0.0, 0.8, 0.0, 1.0]);
    }

    #[test]
    fn up_normal_is_unit_y() {
        assert_eq!(UP_NORMAL, vec3(0.0, 1.0, 0.0));
        assert!((UP_NORMAL.length() - 1.0).abs() < 1e-6);
    }
}
