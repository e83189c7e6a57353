//! Texture loading and the reference-counted texture cache

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use image::{imageops::FilterType, DynamicImage, GenericImageView, RgbaImage};

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::{RenderError, RenderResult};

/// Decoded RGBA8 texture data
#[derive(Debug, Clone)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    /// Whether the source image carried an alpha channel
    pub has_alpha: bool,
    pub name: String,
}

impl TextureData {
    /// Load texture from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, image::ImageError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let img = image::open(path)?;
        Ok(Self::from_image(img, &name))
    }

    /// Load texture from bytes
    pub fn from_bytes(bytes: &[u8], name: &str) -> Result<Self, image::ImageError> {
        let img = image::load_from_memory(bytes)?;
        Ok(Self::from_image(img, name))
    }

    /// Create texture from image
    pub fn from_image(img: DynamicImage, name: &str) -> Self {
        let (width, height) = img.dimensions();
        let has_alpha = img.color().has_alpha();
        let data = img.to_rgba8().into_raw();

        Self {
            width,
            height,
            data,
            has_alpha,
            name: name.to_string(),
        }
    }

    /// Create a solid color texture
    pub fn solid_color(color: [u8; 4], name: &str) -> Self {
        Self {
            width: 1,
            height: 1,
            data: color.to_vec(),
            has_alpha: color[3] != 255,
            name: name.to_string(),
        }
    }

    /// 1x1 opaque white, bound in place of missing textures
    pub fn white() -> Self {
        Self::solid_color([255, 255, 255, 255], "white")
    }

    /// Vertical ramp from white (lit) at the top to `shadow` at the bottom
    pub fn toon_ramp(height: u32, shadow: [u8; 3]) -> Self {
        let height = height.max(2);
        let mut data = Vec::with_capacity((height * 4) as usize);
        for y in 0..height {
            // Hard two-tone step, as toon ramps usually are
            let lit = y < height / 2;
            let rgb = if lit { [255, 255, 255] } else { shadow };
            data.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
        }
        Self {
            width: 1,
            height,
            data,
            has_alpha: false,
            name: "toon_ramp".to_string(),
        }
    }

    /// Create a checkerboard texture
    pub fn checkerboard(size: u32, color1: [u8; 4], color2: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity((size * size * 4) as usize);

        for y in 0..size {
            for x in 0..size {
                let is_even = ((x / 8) + (y / 8)) % 2 == 0;
                let color = if is_even { color1 } else { color2 };
                data.extend_from_slice(&color);
            }
        }

        Self {
            width: size,
            height: size,
            data,
            has_alpha: color1[3] != 255 || color2[3] != 255,
            name: "checkerboard".to_string(),
        }
    }

    /// Number of levels in a full mip chain down to 1x1
    pub fn mip_level_count(&self) -> u32 {
        32 - self.width.max(self.height).max(1).leading_zeros()
    }

    /// Full mip chain, level 0 first, each level RGBA8 with its size
    pub fn mip_chain(&self) -> Vec<(u32, u32, Vec<u8>)> {
        let mut levels = vec![(self.width, self.height, self.data.clone())];
        let Some(base) = RgbaImage::from_raw(self.width, self.height, self.data.clone()) else {
            return levels;
        };

        let (mut width, mut height) = (self.width, self.height);
        while width > 1 || height > 1 {
            width = (width / 2).max(1);
            height = (height / 2).max(1);
            let level = image::imageops::resize(&base, width, height, FilterType::Triangle);
            levels.push((width, height, level.into_raw()));
        }
        levels
    }
}

/// Cache key. The same file requested with different flags is a different texture.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureKey {
    pub path: String,
    pub generate_mipmaps: bool,
    pub srgb: bool,
}

impl TextureKey {
    pub fn new(path: &str, generate_mipmaps: bool, srgb: bool) -> Self {
        Self {
            path: path.to_string(),
            generate_mipmaps,
            srgb,
        }
    }

    /// Base colour textures: mipmapped, sRGB
    pub fn color(path: &str) -> Self {
        Self::new(path, true, true)
    }

    /// Sphere and toon textures: mipmapped, linear
    pub fn linear(path: &str) -> Self {
        Self::new(path, true, false)
    }
}

impl std::fmt::Display for TextureKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.path, self.generate_mipmaps, self.srgb)
    }
}

/// Decodes texture files for the cache
pub trait TextureLoader {
    fn load(&self, path: &str) -> RenderResult<TextureData>;
}

/// Loads textures with the `image` crate, relative to an optional root directory
#[derive(Debug, Clone, Default)]
pub struct ImageFileLoader {
    root: Option<PathBuf>,
}

impl ImageFileLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }
}

impl TextureLoader for ImageFileLoader {
    fn load(&self, path: &str) -> RenderResult<TextureData> {
        let full = match &self.root {
            Some(root) => root.join(path),
            None => PathBuf::from(path),
        };
        TextureData::from_file(&full).map_err(|e| RenderError::TextureLoadFailed {
            path: full.display().to_string(),
            message: e.to_string(),
        })
    }
}

/// Arena index of a cached texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(usize);

/// GPU texture shared by every material that requested the same key
#[derive(Debug)]
pub struct CachedTexture {
    pub key: TextureKey,
    pub handle: TextureHandle,
    pub view: TextureViewHandle,
    pub width: u32,
    pub height: u32,
    pub has_alpha: bool,
    ref_count: usize,
}

impl CachedTexture {
    pub fn ref_count(&self) -> usize {
        self.ref_count
    }
}

/// Reference-counted texture arena.
///
/// [`acquire`](Self::acquire) loads on first use and bumps the count on every
/// hit; [`release`](Self::release) destroys the GPU texture when the last
/// reference goes away.
pub struct TextureCache {
    loader: Box<dyn TextureLoader>,
    slots: Vec<Option<CachedTexture>>,
    free: Vec<usize>,
    lookup: HashMap<TextureKey, TextureId>,
}

impl TextureCache {
    pub fn new(loader: Box<dyn TextureLoader>) -> Self {
        Self {
            loader,
            slots: Vec::new(),
            free: Vec::new(),
            lookup: HashMap::new(),
        }
    }

    /// Cache backed by [`ImageFileLoader`] with no root directory
    pub fn with_file_loader() -> Self {
        Self::new(Box::new(ImageFileLoader::new()))
    }

    /// Number of live textures
    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }

    pub fn get(&self, id: TextureId) -> Option<&CachedTexture> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub fn find(&self, key: &TextureKey) -> Option<TextureId> {
        self.lookup.get(key).copied()
    }

    pub fn ref_count(&self, id: TextureId) -> usize {
        self.get(id).map_or(0, CachedTexture::ref_count)
    }

    /// Resolve `key` to a texture, loading and uploading it on a miss
    pub fn acquire<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        key: TextureKey,
    ) -> RenderResult<TextureId> {
        if let Some(id) = self.lookup.get(&key).copied() {
            if let Some(entry) = self.slots.get_mut(id.0).and_then(Option::as_mut) {
                entry.ref_count += 1;
                log::trace!("Texture cache hit {} (refs: {})", key, entry.ref_count);
                return Ok(id);
            }
        }

        let data = self.loader.load(&key.path)?;
        let entry = Self::upload(backend, key.clone(), &data)?;
        log::debug!("Loaded texture {} ({}x{})", key, entry.width, entry.height);

        let id = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(entry);
                TextureId(slot)
            }
            None => {
                self.slots.push(Some(entry));
                TextureId(self.slots.len() - 1)
            }
        };
        self.lookup.insert(key, id);
        Ok(id)
    }

    /// Drop one reference, destroying the GPU texture with the last one
    pub fn release<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B, id: TextureId) {
        let Some(entry) = self.slots.get_mut(id.0).and_then(Option::as_mut) else {
            log::warn!("Release of unknown texture {:?}", id);
            return;
        };

        entry.ref_count -= 1;
        if entry.ref_count > 0 {
            return;
        }

        if let Some(entry) = self.slots[id.0].take() {
            log::debug!("Destroying texture {}", entry.key);
            backend.destroy_texture_view(entry.view);
            backend.destroy_texture(entry.handle);
            self.lookup.remove(&entry.key);
            self.free.push(id.0);
        }
    }

    fn upload<B: GraphicsBackend + ?Sized>(
        backend: &mut B,
        key: TextureKey,
        data: &TextureData,
    ) -> RenderResult<CachedTexture> {
        let levels = if key.generate_mipmaps {
            data.mip_chain()
        } else {
            vec![(data.width, data.height, data.data.clone())]
        };

        let handle = backend.create_texture(&TextureDescriptor {
            label: Some(key.path.clone()),
            width: data.width,
            height: data.height,
            mip_levels: levels.len() as u32,
            format: if key.srgb {
                TextureFormat::Rgba8UnormSrgb
            } else {
                TextureFormat::Rgba8Unorm
            },
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        })?;

        let view = match backend.create_texture_view(handle) {
            Ok(view) => view,
            Err(e) => {
                backend.destroy_texture(handle);
                return Err(e.into());
            }
        };

        for (mip, (width, height, pixels)) in levels.iter().enumerate() {
            backend.write_texture(handle, mip as u32, pixels, *width, *height);
        }

        Ok(CachedTexture {
            key,
            handle,
            view,
            width: data.width,
            height: data.height,
            has_alpha: data.has_alpha,
            ref_count: 1,
        })
    }
}
