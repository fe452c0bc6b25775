//! Configuration consumed by the load pipeline and the flattener.

use crate::error::{CoreError, CoreResult};

/// Options applied while a model is parsed and its materials are resolved.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadOptions {
    /// Uniform scale applied to every `v` position.
    pub scale: f32,
    /// Negate every computed face normal.
    pub reverse: bool,
    /// Fetch this url for every `map_Kd` instead of the path named in the MTL.
    pub diffuse_override: Option<String>,
    /// Fetch this url for every `map_Bump` instead of the path named in the MTL.
    pub bump_override: Option<String>,
}

impl LoadOptions {
    pub fn new(scale: f32, reverse: bool) -> Self {
        Self {
            scale,
            reverse,
            ..Self::default()
        }
    }

    #[inline]
    pub fn with_overrides(mut self, diffuse: Option<String>, bump: Option<String>) -> Self {
        self.diffuse_override = diffuse;
        self.bump_override = bump;
        self
    }

    /// Rejects scales that would collapse or poison the geometry.
    pub fn validate(&self) -> CoreResult<()> {
        if !self.scale.is_finite() || self.scale == 0.0 {
            return Err(CoreError::InvalidOption(format!(
                "scale must be finite and non-zero, got {}",
                self.scale
            )));
        }
        Ok(())
    }
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            scale: 1.0,
            reverse: false,
            diffuse_override: None,
            bump_override: None,
        }
    }
}

/// Per-flatten switches for optional vertex attributes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderFlags {
    /// Emit per-vertex texcoords when the face provides them.
    pub use_texture: bool,
    /// Emit per-vertex normals when the face provides them.
    pub use_normal: bool,
}

impl Default for RenderFlags {
    fn default() -> Self {
        Self {
            use_texture: true,
            use_normal: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = LoadOptions::default();
        assert_eq!(opts.scale, 1.0);
        assert!(!opts.reverse);
        assert!(opts.validate().is_ok());

        let flags = RenderFlags::default();
        assert!(flags.use_texture && flags.use_normal);
    }

    #[test]
    fn rejects_degenerate_scale() {
        assert!(LoadOptions::new(0.0, false).validate().is_err());
        assert!(LoadOptions::new(f32::NAN, false).validate().is_err());
        assert!(LoadOptions::new(f32::INFINITY, true).validate().is_err());
        assert!(LoadOptions::new(-0.5, true).validate().is_ok());
    }

    #[test]
    fn overrides_are_kept() {
        let opts = LoadOptions::new(0.3, true)
            .with_overrides(Some("/t/diffuse.jpg".into()), None);
        assert_eq!(opts.diffuse_override.as_deref(), Some("/t/diffuse.jpg"));
        assert!(opts.bump_override.is_none());
        assert_eq!(opts.scale, 0.3);
    }
}
