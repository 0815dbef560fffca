//! Texture ingest: DDS files with BC1–BC7 mip chains.
//!
//! The DDS container is parsed by the `ddsfile` crate; this module derives a
//! concrete block format, validates the shape (2D, non-cubemap, non-volume)
//! and computes compressed mip sizes for the upload path.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use ddsfile::{Caps2, D3D10ResourceDimension, D3DFormat, Dds, DxgiFormat};
use rustc_hash::FxHashMap;

use crate::engine_warn;
use crate::error::{EngineError, EngineResult};
use crate::limits::MAX_TEXTURE_COUNT;

/// Block-compressed pixel formats the engine uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockFormat {
    Bc1 { srgb: bool },
    Bc2 { srgb: bool },
    Bc3 { srgb: bool },
    Bc4 { signed: bool },
    Bc5 { signed: bool },
    Bc6h { signed: bool },
    Bc7 { srgb: bool },
}

impl BlockFormat {
    /// Bytes per 4×4 block
    pub fn block_size(&self) -> u32 {
        match self {
            BlockFormat::Bc1 { .. } | BlockFormat::Bc4 { .. } => 8,
            _ => 16,
        }
    }
}

/// A decoded, host-side texture ready for upload.
#[derive(Debug, Clone)]
pub struct TextureAsset {
    pub width: u32,
    pub height: u32,
    pub mip_count: u32,
    pub format: BlockFormat,
    /// All mips, tightly packed largest-first
    pub data: Vec<u8>,
}

impl TextureAsset {
    /// Total compressed byte size of the mip chain.
    pub fn byte_size(&self) -> u64 {
        bc_mip_chain_size(self.width, self.height, self.mip_count, self.format.block_size())
    }
}

/// Byte size of a block-compressed mip chain: each level is
/// `ceil(w/4) * ceil(h/4) * block`, halving both dimensions per level with a
/// floor of 1.
pub fn bc_mip_chain_size(width: u32, height: u32, levels: u32, block_size: u32) -> u64 {
    let mut result: u64 = 0;
    let mut w = width;
    let mut h = height;
    for _ in 0..levels {
        result += u64::from((w + 3) / 4) * u64::from((h + 3) / 4) * u64::from(block_size);
        w = (w / 2).max(1);
        h = (h / 2).max(1);
    }
    result
}

fn format_from_dxgi(format: DxgiFormat) -> Option<BlockFormat> {
    match format {
        DxgiFormat::BC1_UNorm => Some(BlockFormat::Bc1 { srgb: false }),
        DxgiFormat::BC1_UNorm_sRGB => Some(BlockFormat::Bc1 { srgb: true }),
        DxgiFormat::BC2_UNorm => Some(BlockFormat::Bc2 { srgb: false }),
        DxgiFormat::BC2_UNorm_sRGB => Some(BlockFormat::Bc2 { srgb: true }),
        DxgiFormat::BC3_UNorm => Some(BlockFormat::Bc3 { srgb: false }),
        DxgiFormat::BC3_UNorm_sRGB => Some(BlockFormat::Bc3 { srgb: true }),
        DxgiFormat::BC4_UNorm => Some(BlockFormat::Bc4 { signed: false }),
        DxgiFormat::BC4_SNorm => Some(BlockFormat::Bc4 { signed: true }),
        DxgiFormat::BC5_UNorm => Some(BlockFormat::Bc5 { signed: false }),
        DxgiFormat::BC5_SNorm => Some(BlockFormat::Bc5 { signed: true }),
        DxgiFormat::BC6H_UF16 => Some(BlockFormat::Bc6h { signed: false }),
        DxgiFormat::BC6H_SF16 => Some(BlockFormat::Bc6h { signed: true }),
        DxgiFormat::BC7_UNorm => Some(BlockFormat::Bc7 { srgb: false }),
        DxgiFormat::BC7_UNorm_sRGB => Some(BlockFormat::Bc7 { srgb: true }),
        _ => None,
    }
}

fn format_from_fourcc(format: D3DFormat) -> Option<BlockFormat> {
    match format {
        D3DFormat::DXT1 => Some(BlockFormat::Bc1 { srgb: false }),
        D3DFormat::DXT3 => Some(BlockFormat::Bc2 { srgb: false }),
        D3DFormat::DXT5 => Some(BlockFormat::Bc3 { srgb: false }),
        _ => None,
    }
}

/// Interpret a parsed DDS container as an uploadable 2D texture.
pub fn texture_from_dds(dds: &Dds, origin: &str) -> EngineResult<TextureAsset> {
    if dds.header.caps2.contains(Caps2::CUBEMAP) {
        return Err(EngineError::UnsupportedFormat(format!(
            "{}: cubemap DDS is not supported",
            origin
        )));
    }
    if dds.header.caps2.contains(Caps2::VOLUME) {
        return Err(EngineError::UnsupportedFormat(format!(
            "{}: volume DDS is not supported",
            origin
        )));
    }
    if let Some(header10) = &dds.header10 {
        if header10.resource_dimension != D3D10ResourceDimension::Texture2D {
            return Err(EngineError::UnsupportedFormat(format!(
                "{}: only 2D DDS resources are supported",
                origin
            )));
        }
    }

    let format = dds
        .get_dxgi_format()
        .and_then(format_from_dxgi)
        .or_else(|| dds.get_d3d_format().and_then(format_from_fourcc))
        .ok_or_else(|| {
            EngineError::UnsupportedFormat(format!(
                "{}: not a BC1-BC7 compressed DDS",
                origin
            ))
        })?;

    let width = dds.header.width;
    let height = dds.header.height;
    if width == 0 || height == 0 {
        return Err(EngineError::AssetParse(format!("{}: zero-sized DDS", origin)));
    }

    let mip_count = dds.header.mip_map_count.unwrap_or(1).max(1);
    let expected = bc_mip_chain_size(width, height, mip_count, format.block_size());
    if (dds.data.len() as u64) < expected {
        return Err(EngineError::AssetParse(format!(
            "{}: DDS payload is {} bytes, mip chain needs {}",
            origin,
            dds.data.len(),
            expected
        )));
    }

    Ok(TextureAsset {
        width,
        height,
        mip_count,
        format,
        data: dds.data[..expected as usize].to_vec(),
    })
}

/// Load a DDS texture from disk.
pub fn load_dds(path: &Path) -> EngineResult<TextureAsset> {
    let file = File::open(path)
        .map_err(|e| EngineError::AssetParse(format!("{}: {}", path.display(), e)))?;
    let mut reader = BufReader::new(file);
    let dds = Dds::read(&mut reader)
        .map_err(|e| EngineError::AssetParse(format!("{}: {}", path.display(), e)))?;
    texture_from_dds(&dds, &path.display().to_string())
}

/// Host-side record of an uploaded texture.
#[derive(Debug, Clone)]
pub struct TextureRecord {
    pub width: u32,
    pub height: u32,
    pub mip_count: u32,
    pub format: BlockFormat,
    /// Index into the bindless texture array
    pub tag: u32,
}

/// Append-only table of uploaded textures, capped at
/// [`MAX_TEXTURE_COUNT`]. Tag 0 resolves to the backend's built-in 1×1
/// default texture and is pre-seeded here.
pub struct TextureTable {
    records: Vec<TextureRecord>,
    names: FxHashMap<String, u32>,
}

impl TextureTable {
    pub fn new() -> Self {
        let default_record = TextureRecord {
            width: 1,
            height: 1,
            mip_count: 1,
            format: BlockFormat::Bc1 { srgb: false },
            tag: 0,
        };
        let mut names = FxHashMap::default();
        names.insert("default".to_string(), 0);
        Self {
            records: vec![default_record],
            names,
        }
    }

    /// Register an uploaded texture under `name`; returns its tag.
    pub fn add(&mut self, name: &str, asset: &TextureAsset) -> EngineResult<u32> {
        if self.records.len() >= MAX_TEXTURE_COUNT {
            return Err(EngineError::CapacityExhausted {
                what: "textures",
                capacity: MAX_TEXTURE_COUNT,
            });
        }
        let tag = self.records.len() as u32;
        self.records.push(TextureRecord {
            width: asset.width,
            height: asset.height,
            mip_count: asset.mip_count,
            format: asset.format,
            tag,
        });
        if self.names.insert(name.to_string(), tag).is_some() {
            engine_warn!("comet::texture", "texture name '{}' redefined", name);
        }
        Ok(tag)
    }

    pub fn tag_by_name(&self, name: &str) -> Option<u32> {
        self.names.get(name).copied()
    }

    pub fn get(&self, tag: u32) -> Option<&TextureRecord> {
        self.records.get(tag as usize)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for TextureTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "texture_tests.rs"]
mod tests;
