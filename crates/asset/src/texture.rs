//! Texture data and the per-load texture registry.

use anyhow::{Context, Result};

use crate::mtl::{TextureKind, TextureRequest};

/// Texture data in CPU-friendly format before GPU upload.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureData {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

/// Supported texture formats.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TextureFormat {
    Rgba8,
}

impl TextureData {
    /// Create a new texture with given dimensions and RGBA8 format.
    pub fn new_rgba8(width: u32, height: u32, data: Vec<u8>) -> Self {
        assert_eq!(
            data.len(),
            (width * height * 4) as usize,
            "Data size doesn't match RGBA8 format"
        );
        Self {
            data,
            width,
            height,
            format: TextureFormat::Rgba8,
        }
    }

    /// Decode an encoded image (PNG/JPEG) into RGBA8.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let img = image::load_from_memory(bytes).context("Failed to decode texture image")?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(Self::new_rgba8(width, height, rgba.into_raw()))
    }

    /// Copy with the row order reversed (OBJ texcoords have v pointing up).
    pub fn flipped_vertically(&self) -> Self {
        let row = (self.width * self.bytes_per_pixel()) as usize;
        if row == 0 {
            return self.clone();
        }
        let data = self.data.chunks_exact(row).rev().flatten().copied().collect();
        Self {
            data,
            width: self.width,
            height: self.height,
            format: self.format,
        }
    }

    /// Get the number of bytes per pixel for the format.
    pub fn bytes_per_pixel(&self) -> u32 {
        match self.format {
            TextureFormat::Rgba8 => 4,
        }
    }

    /// Check if the texture data is valid.
    pub fn is_valid(&self) -> bool {
        let expected_size = (self.width * self.height * self.bytes_per_pixel()) as usize;
        self.data.len() == expected_size && self.width > 0 && self.height > 0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TextureState {
    Pending,
    Ready(TextureData),
    /// Fetch or decode failed; counts as settled.
    Failed,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextureSlot {
    pub kind: TextureKind,
    pub url: String,
    pub state: TextureState,
}

/// A decoded texture handed to the renderer.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadedTexture {
    pub kind: TextureKind,
    pub url: String,
    pub data: TextureData,
}

/// Textures requested by the material libraries of one load, in request order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TextureRegistry {
    slots: Vec<TextureSlot>,
}

impl TextureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending texture; returns its slot index.
    pub fn request(&mut self, request: TextureRequest) -> usize {
        self.slots.push(TextureSlot {
            kind: request.kind,
            url: request.url,
            state: TextureState::Pending,
        });
        self.slots.len() - 1
    }

    /// Settle slot `index` from fetched bytes (or the fetch error).
    pub fn complete(&mut self, index: usize, bytes: Result<Vec<u8>>) {
        let Some(slot) = self.slots.get_mut(index) else {
            log::warn!("No texture slot #{index}");
            return;
        };
        slot.state = match bytes.and_then(|b| TextureData::decode(&b)) {
            Ok(tex) => {
                log::info!(
                    "Loaded {:?} texture {} ({}x{})",
                    slot.kind,
                    slot.url,
                    tex.width,
                    tex.height
                );
                TextureState::Ready(tex)
            }
            Err(err) => {
                log::warn!("Texture {} unavailable: {err:#}", slot.url);
                TextureState::Failed
            }
        };
    }

    /// True when no slot is still pending.
    pub fn all_settled(&self) -> bool {
        self.slots
            .iter()
            .all(|s| !matches!(s.state, TextureState::Pending))
    }

    pub fn slots(&self) -> &[TextureSlot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Successfully decoded textures, in request order.
    pub fn into_loaded(self) -> Vec<LoadedTexture> {
        self.slots
            .into_iter()
            .filter_map(|slot| match slot.state {
                TextureState::Ready(data) => Some(LoadedTexture {
                    kind: slot.kind,
                    url: slot.url,
                    data,
                }),
                TextureState::Pending | TextureState::Failed => None,
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]));
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(kind: TextureKind, url: &str) -> TextureRequest {
        TextureRequest {
            kind,
            url: url.into(),
        }
    }

    #[test]
    fn decodes_png() {
        let tex = TextureData::decode(&png_bytes(4, 2)).expect("decode");
        assert_eq!((tex.width, tex.height), (4, 2));
        assert!(tex.is_valid());
        assert_eq!(&tex.data[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn vertical_flip_reverses_rows() {
        let tex = TextureData::new_rgba8(1, 2, vec![1, 1, 1, 1, 2, 2, 2, 2]);
        let flipped = tex.flipped_vertically();
        assert_eq!(flipped.data, [2, 2, 2, 2, 1, 1, 1, 1]);
        assert_eq!((flipped.width, flipped.height), (1, 2));
        assert_eq!(flipped.flipped_vertically(), tex);
    }

    #[test]
    fn garbage_does_not_decode() {
        assert!(TextureData::decode(b"not an image").is_err());
    }

    #[test]
    fn registry_settles_on_success_and_failure() {
        let mut reg = TextureRegistry::new();
        assert!(reg.all_settled());

        let a = reg.request(request(TextureKind::Diffuse, "/t/a.png"));
        let b = reg.request(request(TextureKind::Bump, "/t/b.png"));
        assert_eq!(reg.len(), 2);
        assert!(!reg.all_settled());

        reg.complete(a, Ok(png_bytes(2, 2)));
        assert!(!reg.all_settled());
        reg.complete(b, Err(anyhow::anyhow!("404")));
        assert!(reg.all_settled());
        assert_eq!(reg.slots()[1].state, TextureState::Failed);

        let loaded = reg.into_loaded();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].kind, TextureKind::Diffuse);
        assert_eq!(loaded[0].url, "/t/a.png");
    }

    #[test]
    fn undecodable_bytes_fail_the_slot() {
        let mut reg = TextureRegistry::new();
        let i = reg.request(request(TextureKind::Diffuse, "/t/a.png"));
        reg.complete(i, Ok(vec![1, 2, 3]));
        assert!(reg.all_settled());
        assert!(reg.into_loaded().is_empty());
    }
}
