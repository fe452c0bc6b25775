//! MTL material library parser (`newmtl`, `Kd`, `map_Kd`, `map_Bump`).
//!
//! A `Kd` line only counts when a `newmtl` name is pending; committing the
//! material clears the pending name. Texture maps are not loaded here: they are
//! reported as [`TextureRequest`]s for the owner of the texture registry.

use corelib::{LoadOptions, Vec4};

use crate::error::ParseError;
use crate::loader::resolve_sibling;
use crate::scanner::{Scanner, strip_bom};

/// A named diffuse color.
#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    pub name: String,
    pub color: Vec4,
}

impl Material {
    pub fn new(name: impl Into<String>, r: f32, g: f32, b: f32) -> Self {
        Self {
            name: name.into(),
            color: Vec4::new(r, g, b, 1.0),
        }
    }
}

/// Which shader slot a texture map feeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureKind {
    Diffuse,
    Bump,
}

/// Emitted for every `map_Kd` / `map_Bump` line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureRequest {
    pub kind: TextureKind,
    pub url: String,
}

/// Materials from one `.mtl` document plus its readiness flag.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MaterialLibrary {
    ready: bool,
    materials: Vec<Material>,
    texture_requests: Vec<TextureRequest>,
}

impl MaterialLibrary {
    /// A library whose document has not arrived yet.
    pub fn pending() -> Self {
        Self::default()
    }

    /// A library whose document could not be fetched or parsed: ready, empty.
    pub fn missing() -> Self {
        Self {
            ready: true,
            ..Self::default()
        }
    }

    /// Parse MTL text. `base_url` is the url the document was fetched from;
    /// texture paths are resolved against its directory.
    pub fn parse(src: &str, base_url: &str, options: &LoadOptions) -> Result<Self, ParseError> {
        let mut lib = Self::pending();
        let mut pending_name: Option<String> = None;

        for (line_no, line) in strip_bom(src).lines().enumerate() {
            let line_no = line_no + 1;
            let mut sc = Scanner::new(line);
            let Some(command) = sc.next_word() else {
                continue;
            };

            match command {
                "newmtl" => {
                    pending_name = sc.next_word().map(str::to_owned);
                    if pending_name.is_none() {
                        log::warn!("{base_url}:{line_no}: newmtl without a name");
                    }
                }
                "Kd" => {
                    let Some(name) = pending_name.take() else {
                        log::debug!("{base_url}:{line_no}: Kd without pending newmtl, ignored");
                        continue;
                    };
                    let r = sc.next_float().map_err(ParseError::scan(line_no, "Kd red"))?;
                    let g = sc.next_float().map_err(ParseError::scan(line_no, "Kd green"))?;
                    let b = sc.next_float().map_err(ParseError::scan(line_no, "Kd blue"))?;
                    lib.materials.push(Material::new(name, r, g, b));
                }
                "map_Kd" => {
                    lib.request_texture(
                        TextureKind::Diffuse,
                        sc.next_word(),
                        options.diffuse_override.as_deref(),
                        base_url,
                    );
                }
                "map_Bump" => {
                    lib.request_texture(
                        TextureKind::Bump,
                        sc.next_word(),
                        options.bump_override.as_deref(),
                        base_url,
                    );
                }
                _ => {
                    // Comments and unsupported statements (Ka, Ks, Ns, illum, ...).
                }
            }
        }

        lib.ready = true;
        log::debug!(
            "{base_url}: {} materials, {} texture maps",
            lib.materials.len(),
            lib.texture_requests.len()
        );
        Ok(lib)
    }

    fn request_texture(
        &mut self,
        kind: TextureKind,
        path: Option<&str>,
        override_url: Option<&str>,
        base_url: &str,
    ) {
        let url = match (override_url, path) {
            (Some(url), _) => url.to_owned(),
            (None, Some(path)) => resolve_sibling(base_url, path),
            (None, None) => {
                log::warn!("{base_url}: {kind:?} map without a path, ignored");
                return;
            }
        };
        self.texture_requests.push(TextureRequest { kind, url });
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    /// Exact match after trimming both names.
    pub fn find(&self, name: &str) -> Option<&Material> {
        let name = name.trim();
        self.materials.iter().find(|m| m.name.trim() == name)
    }

    /// Texture maps referenced by this library; drained by the caller.
    pub fn take_texture_requests(&mut self) -> Vec<TextureRequest> {
        std::mem::take(&mut self.texture_requests)
    }
}
