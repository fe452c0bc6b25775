//! Renderer side of the load pipeline: turn a finished load into GPU
//! resources exactly once.
//!
//! [`Scene::update`] is called every frame. It polls the [`Session`]; the
//! frame on which the model becomes ready, the mesh streams and the first
//! diffuse/bump textures are uploaded through a [`MeshUploader`].

use anyhow::Result;
use asset::{FlattenedMesh, Generation, LoadStatus, LoadedTexture, Session, TextureKind};

pub mod gpu;

pub use gpu::{GpuTexture, GpuUploader, MeshBuffers};

/// Seam between the scene and the graphics API.
pub trait MeshUploader {
    type Mesh;
    type Texture;

    fn upload_mesh(&mut self, mesh: &FlattenedMesh) -> Result<Self::Mesh>;
    fn upload_texture(&mut self, texture: &LoadedTexture) -> Result<Self::Texture>;
}

/// GPU-resident model.
pub struct UploadedModel<M, T> {
    pub name: String,
    pub mesh: M,
    pub index_count: u32,
    pub diffuse: Option<T>,
    pub bump: Option<T>,
}

pub struct Scene<U: MeshUploader> {
    session: Session,
    uploader: U,
    model: Option<UploadedModel<U::Mesh, U::Texture>>,
    last_error: Option<String>,
}

impl<U: MeshUploader> Scene<U> {
    pub fn new(session: Session, uploader: U) -> Self {
        Self {
            session,
            uploader,
            model: None,
            last_error: None,
        }
    }

    /// Replace the displayed model with `url` once it has loaded.
    pub fn load(&mut self, url: &str) -> Generation {
        self.model = None;
        self.last_error = None;
        self.session.load(url)
    }

    /// Poll the load; returns `true` on the frame a new model was uploaded.
    pub fn update(&mut self) -> Result<bool> {
        let loaded = match self.session.poll() {
            LoadStatus::Ready(loaded) => loaded,
            LoadStatus::Failed(msg) => {
                self.last_error = Some(msg);
                return Ok(false);
            }
            LoadStatus::Idle | LoadStatus::Loading => return Ok(false),
        };

        let mesh = self.uploader.upload_mesh(&loaded.mesh)?;
        let diffuse = self.upload_first(loaded.texture(TextureKind::Diffuse))?;
        let bump = self.upload_first(loaded.texture(TextureKind::Bump))?;

        self.model = Some(UploadedModel {
            name: loaded.name,
            mesh,
            index_count: loaded.mesh.vertex_count() as u32,
            diffuse,
            bump,
        });
        Ok(true)
    }

    fn upload_first(&mut self, texture: Option<&LoadedTexture>) -> Result<Option<U::Texture>> {
        texture
            .map(|t| self.uploader.upload_texture(t))
            .transpose()
    }

    pub fn model(&self) -> Option<&UploadedModel<U::Mesh, U::Texture>> {
        self.model.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn uploader(&self) -> &U {
        &self.uploader
    }
}
