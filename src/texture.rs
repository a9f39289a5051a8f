//! Decoding of `Texture2D` pixel data and writing it out as PNG.

use std::borrow::Cow;
use std::fs::{DirBuilder, File};
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context as _, Result, bail, ensure};
use byteorder::{ByteOrder as _, LittleEndian};
use image::{ImageFormat, RgbaImage};
use rabex::objects::pptr::PathId;
use regex::Regex;
use rustc_hash::FxHashSet;
use serde::Deserialize as _;
use serde_derive::Serialize;
use serde_json::Value;

use crate::index::ObjectIndex;
use crate::object::{SceneObject, TypeTag};
use crate::unity::types::Texture2D;

mod block;

pub use block::BlockFormat;

pub const MANIFEST_FILE: &str = "font_textures_manifest.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    Pixel(PixelFormat),
    Block(BlockFormat),
}

/// Uncompressed formats, one pixel after the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Alpha8,
    ARGB4444,
    RGB24,
    RGBA32,
    ARGB32,
    RGB565,
    R16,
    RGBA4444,
    BGRA32,
    RG16,
    R8,
}

impl TextureFormat {
    pub fn from_id(id: i32) -> Option<Self> {
        Some(match id {
            1 => TextureFormat::Pixel(PixelFormat::Alpha8),
            2 => TextureFormat::Pixel(PixelFormat::ARGB4444),
            3 => TextureFormat::Pixel(PixelFormat::RGB24),
            4 => TextureFormat::Pixel(PixelFormat::RGBA32),
            5 => TextureFormat::Pixel(PixelFormat::ARGB32),
            7 => TextureFormat::Pixel(PixelFormat::RGB565),
            9 => TextureFormat::Pixel(PixelFormat::R16),
            10 => TextureFormat::Block(BlockFormat::DXT1),
            12 => TextureFormat::Block(BlockFormat::DXT5),
            13 => TextureFormat::Pixel(PixelFormat::RGBA4444),
            14 => TextureFormat::Pixel(PixelFormat::BGRA32),
            62 => TextureFormat::Pixel(PixelFormat::RG16),
            63 => TextureFormat::Pixel(PixelFormat::R8),
            _ => return None,
        })
    }

    /// Size of one mip level, `None` if it does not fit into `usize`.
    pub fn data_size(self, width: u32, height: u32) -> Option<usize> {
        match self {
            TextureFormat::Pixel(format) => (width as usize)
                .checked_mul(height as usize)?
                .checked_mul(format.bytes_per_pixel()),
            TextureFormat::Block(format) => format.data_size(width, height),
        }
    }

    /// RGBA rows in the order they are stored.
    fn decode(self, data: &[u8], width: u32, height: u32) -> Vec<u8> {
        match self {
            TextureFormat::Pixel(format) => data
                .chunks_exact(format.bytes_per_pixel())
                .flat_map(|px| format.pixel(px))
                .collect(),
            TextureFormat::Block(format) => format.decode(data, width, height),
        }
    }
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Alpha8 | PixelFormat::R8 => 1,
            PixelFormat::ARGB4444
            | PixelFormat::RGBA4444
            | PixelFormat::RGB565
            | PixelFormat::R16
            | PixelFormat::RG16 => 2,
            PixelFormat::RGB24 => 3,
            PixelFormat::RGBA32 | PixelFormat::ARGB32 | PixelFormat::BGRA32 => 4,
        }
    }

    fn pixel(self, px: &[u8]) -> [u8; 4] {
        let expand4 = |v: u16| (v & 0xF) as u8 * 17;
        match self {
            PixelFormat::Alpha8 => [255, 255, 255, px[0]],
            PixelFormat::R8 => [px[0], 0, 0, 255],
            PixelFormat::RG16 => [px[0], px[1], 0, 255],
            PixelFormat::R16 => [(LittleEndian::read_u16(px) >> 8) as u8, 0, 0, 255],
            PixelFormat::ARGB4444 => {
                let v = LittleEndian::read_u16(px);
                [expand4(v >> 8), expand4(v >> 4), expand4(v), expand4(v >> 12)]
            }
            PixelFormat::RGBA4444 => {
                let v = LittleEndian::read_u16(px);
                [expand4(v >> 12), expand4(v >> 8), expand4(v >> 4), expand4(v)]
            }
            PixelFormat::RGB565 => {
                let [r, g, b] = rgb565(LittleEndian::read_u16(px));
                [r, g, b, 255]
            }
            PixelFormat::RGB24 => [px[0], px[1], px[2], 255],
            PixelFormat::RGBA32 => [px[0], px[1], px[2], px[3]],
            PixelFormat::ARGB32 => [px[1], px[2], px[3], px[0]],
            PixelFormat::BGRA32 => [px[2], px[1], px[0], px[3]],
        }
    }
}

fn rgb565(v: u16) -> [u8; 3] {
    let r = ((v >> 11) & 0x1F) as u8;
    let g = ((v >> 5) & 0x3F) as u8;
    let b = (v & 0x1F) as u8;
    [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2)]
}

/// Decodes the first mip level of a `Texture2D`.
/// Pixel data comes from `image data`, or from the stream data file if that is empty.
pub fn decode_texture<O: SceneObject>(object: &O, tree: &Value) -> Result<RgbaImage> {
    let texture = Texture2D::deserialize(tree).context("malformed Texture2D")?;
    let (width, height) = (texture.m_Width, texture.m_Height);
    ensure!(
        width > 0 && height > 0,
        "texture has no size ({width}x{height})"
    );
    let format = TextureFormat::from_id(texture.m_TextureFormat)
        .with_context(|| format!("unsupported texture format {}", texture.m_TextureFormat))?;
    let expected = format
        .data_size(width, height)
        .filter(|_| {
            (width as usize)
                .checked_mul(height as usize)
                .and_then(|pixels| pixels.checked_mul(4))
                .is_some()
        })
        .with_context(|| format!("texture size {width}x{height} is too large"))?;

    let data = match &texture.m_StreamData {
        _ if !texture.image_data.is_empty() => Cow::Borrowed(texture.image_data.as_slice()),
        Some(stream) if !stream.is_empty() => Cow::Owned(
            object
                .read_resource(&stream.path, stream.offset, stream.size as usize)
                .with_context(|| format!("could not read stream data from '{}'", stream.path))?,
        ),
        _ => bail!("texture has no pixel data"),
    };

    ensure!(
        data.len() >= expected,
        "expected {expected} bytes of {format:?} pixel data for {width}x{height}, got {}",
        data.len()
    );

    let pixels = format.decode(&data[..expected], width, height);
    let image = RgbaImage::from_raw(width, height, pixels).context("invalid image buffer")?;

    // unity stores rows bottom to top
    Ok(image::imageops::flip_vertical(&image))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManifestEntry {
    pub name: String,
    pub path_id: PathId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub w: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub h: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Decoded textures waiting to be written, plus their manifest.
#[derive(Default)]
pub struct TextureExport {
    pub manifest: Vec<ManifestEntry>,
    images: Vec<(String, RgbaImage)>,
    used_file_names: FxHashSet<String>,
}

impl TextureExport {
    pub fn len(&self) -> usize {
        self.manifest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifest.is_empty()
    }

    /// Records a decode result. Failures end up in the manifest instead of aborting.
    pub fn add(&mut self, path_id: PathId, name: &str, decoded: Result<RgbaImage>) -> &ManifestEntry {
        let entry = match decoded {
            Ok(image) => {
                let file_name = self.file_name(name, path_id);
                tracing::debug!("decoded {name} ({}x{})", image.width(), image.height());
                let entry = ManifestEntry {
                    name: name.to_owned(),
                    path_id,
                    w: Some(image.width()),
                    h: Some(image.height()),
                    out: Some(file_name.clone()),
                    error: None,
                };
                self.images.push((file_name, image));
                entry
            }
            Err(e) => {
                tracing::warn!("could not decode texture {name} ({path_id}): {e:#}");
                ManifestEntry {
                    name: name.to_owned(),
                    path_id,
                    w: None,
                    h: None,
                    out: None,
                    error: Some(format!("{e:#}")),
                }
            }
        };
        let index = self.manifest.len();
        self.manifest.push(entry);
        &self.manifest[index]
    }

    fn file_name(&mut self, name: &str, path_id: PathId) -> String {
        let stem: String = name
            .chars()
            .map(|c| match c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                true => c,
                false => '_',
            })
            .collect();
        let mut file_name = match stem.is_empty() {
            true => format!("{path_id}.png"),
            false => format!("{stem}.png"),
        };
        if self.used_file_names.contains(&file_name) {
            file_name = format!("{stem}_{path_id}.png");
        }
        self.used_file_names.insert(file_name.clone());
        file_name
    }

    /// Writes every decoded image and the manifest into `dir`.
    pub fn write(&self, dir: &Path) -> Result<()> {
        DirBuilder::new()
            .recursive(true)
            .create(dir)
            .with_context(|| format!("Could not create texture directory '{}'", dir.display()))?;

        for (file_name, image) in &self.images {
            let path = dir.join(file_name);
            image
                .save_with_format(&path, ImageFormat::Png)
                .with_context(|| format!("Failed to write '{}'", path.display()))?;
        }

        let manifest = BufWriter::new(File::create(dir.join(MANIFEST_FILE))?);
        serde_json::to_writer_pretty(manifest, &self.manifest)?;
        Ok(())
    }
}

/// Decodes every `Texture2D` whose name matches `name_filter`.
pub fn export_textures<O: SceneObject>(
    index: &ObjectIndex<O>,
    name_filter: Option<&Regex>,
) -> TextureExport {
    let mut export = TextureExport::default();

    for object in index.iter() {
        if object.type_tag() != TypeTag::Texture2D {
            continue;
        }
        let tree = match object.field_tree() {
            Ok(tree) => tree,
            Err(e) => {
                tracing::debug!("skipping unreadable texture {}: {e}", object.local_id());
                continue;
            }
        };
        let name = crate::fields::name_of(&tree);
        if name_filter.is_some_and(|filter| !filter.is_match(&name)) {
            continue;
        }

        let decoded = decode_texture(object, &tree);
        export.add(object.local_id(), &name, decoded);
    }

    export
}
