//! wgpu upload of flattened meshes and material textures.
//! wgpu = 26.x

use anyhow::{Context, Result};
use asset::{FlattenedMesh, LoadedTexture, TextureKind};
use wgpu::{
    Buffer, BufferUsages, Device, DeviceDescriptor, Extent3d, Features, IndexFormat, Instance,
    InstanceDescriptor, Limits, PowerPreference, Queue, TextureDescriptor, TextureDimension,
    TextureFormat, TextureUsages, TextureView, TextureViewDescriptor, VertexBufferLayout,
    VertexStepMode, util::DeviceExt,
};

use crate::MeshUploader;

/// One vertex buffer per attribute stream, plus the index buffer.
pub struct MeshBuffers {
    pub position: Buffer,
    pub normal: Buffer,
    pub tangent: Buffer,
    pub barycentric: Buffer,
    pub texcoord: Buffer,
    pub color: Buffer,
    pub index: Buffer,
    pub index_count: u32,
}

impl MeshBuffers {
    pub const INDEX_FORMAT: IndexFormat = IndexFormat::Uint32;

    /// Buffer layouts in slot order: position, normal, tangent, barycentric,
    /// texcoord, color (shader locations 0..=5).
    pub const LAYOUTS: [VertexBufferLayout<'static>; 6] = [
        VertexBufferLayout {
            array_stride: 12,
            step_mode: VertexStepMode::Vertex,
            attributes: &wgpu::vertex_attr_array![0 => Float32x3],
        },
        VertexBufferLayout {
            array_stride: 12,
            step_mode: VertexStepMode::Vertex,
            attributes: &wgpu::vertex_attr_array![1 => Float32x3],
        },
        VertexBufferLayout {
            array_stride: 12,
            step_mode: VertexStepMode::Vertex,
            attributes: &wgpu::vertex_attr_array![2 => Float32x3],
        },
        VertexBufferLayout {
            array_stride: 12,
            step_mode: VertexStepMode::Vertex,
            attributes: &wgpu::vertex_attr_array![3 => Float32x3],
        },
        VertexBufferLayout {
            array_stride: 8,
            step_mode: VertexStepMode::Vertex,
            attributes: &wgpu::vertex_attr_array![4 => Float32x2],
        },
        VertexBufferLayout {
            array_stride: 16,
            step_mode: VertexStepMode::Vertex,
            attributes: &wgpu::vertex_attr_array![5 => Float32x4],
        },
    ];

    /// Vertex buffers in the same order as [`Self::LAYOUTS`].
    pub fn vertex_buffers(&self) -> [&Buffer; 6] {
        [
            &self.position,
            &self.normal,
            &self.tangent,
            &self.barycentric,
            &self.texcoord,
            &self.color,
        ]
    }
}

/// A sampled 2D texture on the GPU.
pub struct GpuTexture {
    pub kind: TextureKind,
    pub texture: wgpu::Texture,
    pub view: TextureView,
}

/// Uploads through an owned device/queue pair.
pub struct GpuUploader {
    device: Device,
    queue: Queue,
}

impl GpuUploader {
    pub fn new(device: Device, queue: Queue) -> Self {
        Self { device, queue }
    }

    /// Create a device without a surface (uploads only, no presentation).
    pub fn request_headless(backends: wgpu::Backends) -> Result<Self> {
        pollster::block_on(async {
            let instance = Instance::new(&InstanceDescriptor {
                backends,
                ..Default::default()
            });
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: PowerPreference::HighPerformance,
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await
                .context("No suitable GPU adapter")?;
            log::info!("Using adapter: {:?}", adapter.get_info().name);

            let (device, queue) = adapter
                .request_device(&DeviceDescriptor {
                    label: Some("Upload Device"),
                    required_features: Features::empty(),
                    required_limits: Limits::downlevel_webgl2_defaults()
                        .using_resolution(adapter.limits()),
                    ..Default::default()
                })
                .await
                .context("request_device failed")?;
            Ok::<_, anyhow::Error>(Self::new(device, queue))
        })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    fn stream(&self, label: &str, contents: &[u8], usage: BufferUsages) -> Buffer {
        self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents,
            usage,
        })
    }
}

impl MeshUploader for GpuUploader {
    type Mesh = MeshBuffers;
    type Texture = GpuTexture;

    fn upload_mesh(&mut self, mesh: &FlattenedMesh) -> Result<MeshBuffers> {
        anyhow::ensure!(mesh.is_valid(), "mesh has inconsistent or empty streams");
        let index_count = u32::try_from(mesh.indices.len()).context("index count exceeds u32")?;

        let vertex = |label: &str, data: &[f32]| {
            self.stream(label, bytemuck::cast_slice(data), BufferUsages::VERTEX)
        };
        let buffers = MeshBuffers {
            position: vertex("Position VB", &mesh.positions),
            normal: vertex("Normal VB", &mesh.normals),
            tangent: vertex("Tangent VB", &mesh.tangents),
            barycentric: vertex("Barycentric VB", &mesh.barycentrics),
            texcoord: vertex("Texcoord VB", &mesh.texcoords),
            color: vertex("Color VB", &mesh.colors),
            index: self.stream(
                "Mesh IB",
                bytemuck::cast_slice(&mesh.indices),
                BufferUsages::INDEX,
            ),
            index_count,
        };
        log::info!("Uploaded mesh: {index_count} indices");
        Ok(buffers)
    }

    fn upload_texture(&mut self, texture: &LoadedTexture) -> Result<GpuTexture> {
        anyhow::ensure!(texture.data.is_valid(), "texture {} is empty", texture.url);
        // OBJ texcoords put v = 0 at the bottom row.
        let data = texture.data.flipped_vertically();
        let size = Extent3d {
            width: data.width,
            height: data.height,
            depth_or_array_layers: 1,
        };
        // Normal maps hold vectors, not colors.
        let format = match texture.kind {
            TextureKind::Diffuse => TextureFormat::Rgba8UnormSrgb,
            TextureKind::Bump => TextureFormat::Rgba8Unorm,
        };

        let tex = self.device.create_texture(&TextureDescriptor {
            label: Some(texture.url.as_str()),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format,
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &tex,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &data.data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(data.width * data.bytes_per_pixel()),
                rows_per_image: Some(data.height),
            },
            size,
        );
        let view = tex.create_view(&TextureViewDescriptor::default());
        log::info!(
            "Uploaded {:?} texture {} ({}x{})",
            texture.kind,
            texture.url,
            data.width,
            data.height
        );

        Ok(GpuTexture {
            kind: texture.kind,
            texture: tex,
            view,
        })
    }
}
