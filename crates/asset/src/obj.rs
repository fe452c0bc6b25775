//! OBJ parser: groups of faces over shared position/normal/texcoord pools.
//!
//! Supported statements: `mtllib`, `o`, `g`, `v`, `vn`, `vt`, `usemtl`, `f`.
//! Everything else (comments, `s`, `l`, ...) is skipped. Material libraries
//! referenced by `mtllib` are only recorded here; fetching them is the
//! caller's job (see [`crate::session`]).

use std::{fs, path::Path};

use anyhow::{Context, Result};
use corelib::{FALLBACK_COLOR, LoadOptions, Vec2, Vec3, Vec4};

use crate::error::ParseError;
use crate::geometry::{Corner, Face};
use crate::loader::resolve_sibling;
use crate::mtl::{MaterialLibrary, TextureRequest};
use crate::scanner::{Scanner, strip_bom};

const DEFAULT_GROUP: &str = "default";

/// Named run of faces (`o` and `g` are treated alike).
#[derive(Clone, Debug, PartialEq)]
pub struct Group {
    pub name: String,
    faces: Vec<Face>,
    corner_count: usize,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            faces: Vec::new(),
            corner_count: 0,
        }
    }

    pub fn add_face(&mut self, face: Face) {
        self.corner_count += face.corner_count();
        self.faces.push(face);
    }

    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    /// Running total of triangulated corners.
    #[inline]
    pub fn corner_count(&self) -> usize {
        self.corner_count
    }
}

/// A `mtllib` reference and the library it resolved to (pending until loaded).
#[derive(Clone, Debug, PartialEq)]
pub struct LibrarySlot {
    pub url: String,
    pub library: MaterialLibrary,
}

/// Pool and group sizes of a parsed document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ObjStats {
    pub positions: usize,
    pub normals: usize,
    pub texcoords: usize,
    pub groups: usize,
    pub faces: usize,
    pub corners: usize,
}

/// A parsed OBJ file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjDocument {
    name: String,
    libraries: Vec<LibrarySlot>,
    groups: Vec<Group>,
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    texcoords: Vec<Vec2>,
}

/// Parse OBJ text without resolving its material libraries.
pub fn load_obj_from_str(contents: &str, options: &LoadOptions) -> Result<ObjDocument> {
    Ok(ObjDocument::parse(contents, "<memory>", options)?)
}

/// Load an OBJ file and its material libraries from disk. A library that
/// cannot be read or parsed is kept as an empty, ready library.
pub fn load_obj_from_path(path: impl AsRef<Path>, options: &LoadOptions) -> Result<ObjDocument> {
    let path = path.as_ref();
    let src = fs::read_to_string(path)
        .with_context(|| format!("Failed to open OBJ file: {}", path.display()))?;
    let url = path.to_string_lossy();
    let mut doc = ObjDocument::parse(&src, &url, options)
        .with_context(|| format!("Failed to parse OBJ file: {}", path.display()))?;

    for index in 0..doc.libraries.len() {
        let lib_url = doc.libraries[index].url.clone();
        let text = fs::read_to_string(&lib_url)
            .map_err(|e| log::warn!("Material library {lib_url} unavailable: {e}"))
            .ok();
        doc.complete_library(index, text.as_deref(), options);
    }
    Ok(doc)
}

impl ObjDocument {
    /// Single pass over `src`. `url` names the document; `mtllib` paths are
    /// resolved against its directory.
    pub fn parse(src: &str, url: &str, options: &LoadOptions) -> Result<Self, ParseError> {
        let mut doc = Self {
            name: url.to_owned(),
            ..Self::default()
        };
        let mut material = String::new();
        // Index into `doc.groups` of the group receiving faces.
        let mut current: Option<usize> = None;

        for (line_no, line) in strip_bom(src).lines().enumerate() {
            let line_no = line_no + 1;
            let mut sc = Scanner::new(line);
            let Some(command) = sc.next_word() else {
                continue;
            };

            match command {
                "mtllib" => match sc.next_word() {
                    Some(name) => {
                        let lib_url = resolve_sibling(url, name);
                        log::debug!("{url}:{line_no}: mtllib {lib_url}");
                        doc.libraries.push(LibrarySlot {
                            url: lib_url,
                            library: MaterialLibrary::pending(),
                        });
                    }
                    None => log::warn!("{url}:{line_no}: mtllib without a file name"),
                },
                "o" | "g" => {
                    let name = sc.next_word().unwrap_or_default();
                    doc.groups.push(Group::new(name));
                    current = Some(doc.groups.len() - 1);
                }
                "v" => {
                    if doc.groups.is_empty() {
                        doc.groups.push(Group::new(DEFAULT_GROUP));
                        current = Some(0);
                    }
                    let p = read_vec3(&mut sc, line_no, "vertex")?;
                    doc.positions.push(p * options.scale);
                }
                "vn" => {
                    let n = read_vec3(&mut sc, line_no, "normal")?;
                    doc.normals.push(n);
                }
                "vt" => {
                    let u = sc.next_float().map_err(ParseError::scan(line_no, "texcoord u"))?;
                    let v = sc.next_float().map_err(ParseError::scan(line_no, "texcoord v"))?;
                    doc.texcoords.push(Vec2::new(u, v));
                }
                "usemtl" => {
                    material = sc.next_word().unwrap_or_default().to_owned();
                }
                "f" => {
                    let mut polygon = Vec::new();
                    while let Some(token) = sc.next_word() {
                        polygon.push(doc.parse_corner(token, line_no)?);
                    }
                    let face = Face::assemble(
                        material.as_str(),
                        &polygon,
                        &doc.positions,
                        &doc.texcoords,
                        options.reverse,
                    );
                    let group = match current {
                        Some(i) => i,
                        None => {
                            doc.groups.push(Group::new(DEFAULT_GROUP));
                            doc.groups.len() - 1
                        }
                    };
                    current = Some(group);
                    doc.groups[group].add_face(face);
                }
                _ => {
                    // Comments and unsupported statements.
                }
            }
        }

        log::debug!(
            "{url}: {} groups, {} positions, {} material libraries",
            doc.groups.len(),
            doc.positions.len(),
            doc.libraries.len()
        );
        Ok(doc)
    }

    /// `v`, `v/t`, `v/t/n` or `v//n`.
    fn parse_corner(&self, token: &str, line: usize) -> Result<Corner, ParseError> {
        let mut split = token.split('/');
        let vertex = match split.next() {
            Some(v) if !v.is_empty() => resolve_index(v, self.positions.len(), line, "vertex")?,
            _ => {
                return Err(ParseError::MalformedCorner {
                    line,
                    token: token.to_owned(),
                });
            }
        };
        let texcoord = match split.next() {
            Some(t) if !t.is_empty() => {
                Some(resolve_index(t, self.texcoords.len(), line, "texcoord")?)
            }
            _ => None,
        };
        let normal = match split.next() {
            Some(n) if !n.is_empty() => Some(resolve_index(n, self.normals.len(), line, "normal")?),
            _ => None,
        };
        if split.next().is_some() {
            return Err(ParseError::MalformedCorner {
                line,
                token: token.to_owned(),
            });
        }
        Ok(Corner::new(vertex, texcoord, normal))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn normals(&self) -> &[Vec3] {
        &self.normals
    }

    pub fn texcoords(&self) -> &[Vec2] {
        &self.texcoords
    }

    pub fn libraries(&self) -> &[LibrarySlot] {
        &self.libraries
    }

    /// True when every referenced material library has settled.
    pub fn libraries_ready(&self) -> bool {
        self.libraries.iter().all(|slot| slot.library.is_ready())
    }

    /// Settle library `index` from its fetched text, or as missing when `text`
    /// is `None` or fails to parse. Returns the texture maps it references.
    pub fn complete_library(
        &mut self,
        index: usize,
        text: Option<&str>,
        options: &LoadOptions,
    ) -> Vec<TextureRequest> {
        let Some(slot) = self.libraries.get_mut(index) else {
            log::warn!("{}: no material library #{index}", self.name);
            return Vec::new();
        };

        slot.library = match text.map(|src| MaterialLibrary::parse(src, &slot.url, options)) {
            Some(Ok(lib)) => lib,
            Some(Err(err)) => {
                log::warn!("Material library {} is malformed: {err}", slot.url);
                MaterialLibrary::missing()
            }
            None => MaterialLibrary::missing(),
        };
        log::info!(
            "Material library {} ready ({} materials)",
            slot.url,
            slot.library.materials().len()
        );
        slot.library.take_texture_requests()
    }

    /// Diffuse color of `material`: first match across libraries, in order.
    pub fn find_color(&self, material: &str) -> Vec4 {
        self.libraries
            .iter()
            .find_map(|slot| slot.library.find(material))
            .map(|m| m.color)
            .unwrap_or(FALLBACK_COLOR)
    }

    /// Triangulated corners across all groups.
    pub fn corner_count(&self) -> usize {
        self.groups.iter().map(Group::corner_count).sum()
    }

    pub fn stats(&self) -> ObjStats {
        ObjStats {
            positions: self.positions.len(),
            normals: self.normals.len(),
            texcoords: self.texcoords.len(),
            groups: self.groups.len(),
            faces: self.groups.iter().map(|g| g.faces.len()).sum(),
            corners: self.corner_count(),
        }
    }
}

fn read_vec3(sc: &mut Scanner<'_>, line: usize, what: &'static str) -> Result<Vec3, ParseError> {
    let x = sc.next_float().map_err(ParseError::scan(line, what))?;
    let y = sc.next_float().map_err(ParseError::scan(line, what))?;
    let z = sc.next_float().map_err(ParseError::scan(line, what))?;
    Ok(Vec3::new(x, y, z))
}

/// 1-based (or negative, relative to the end) OBJ index to a 0-based one.
fn resolve_index(token: &str, len: usize, line: usize, kind: &'static str) -> Result<usize, ParseError> {
    let raw = Scanner::new(token)
        .next_int()
        .map_err(ParseError::scan(line, kind))?;
    if raw == 0 {
        return Err(ParseError::ZeroIndex { line });
    }

    let idx = if raw > 0 { raw - 1 } else { len as i64 + raw };
    if idx < 0 || idx as usize >= len {
        return Err(ParseError::IndexOutOfRange {
            line,
            kind,
            index: raw,
            len,
        });
    }
    Ok(idx as usize)
}
