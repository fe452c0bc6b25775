//! Asset loading/parsers: OBJ/MTL models, textures, async load sessions.
//!
//! Raw OBJ text -> [`ObjDocument`] (groups of triangulated faces over shared
//! pools) -> once its material libraries and textures are in ->
//! [`FlattenedMesh`] (unshared per-corner vertex streams).

pub mod error;
pub mod geometry;
pub mod loader;
pub mod mesh;
pub mod mtl;
pub mod obj;
pub mod scanner;
pub mod session;
pub mod texture;

pub use error::ParseError;
pub use loader::{Fetch, FsFetcher, Generation, MemoryFetcher};
pub use mesh::FlattenedMesh;
pub use mtl::{Material, MaterialLibrary, TextureKind, TextureRequest};
pub use obj::{ObjDocument, ObjStats, load_obj_from_path, load_obj_from_str};
pub use session::{LoadStatus, LoadedModel, Session};
pub use texture::{LoadedTexture, TextureData};
