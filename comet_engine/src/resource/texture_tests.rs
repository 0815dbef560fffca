//! Unit tests for DDS interpretation and the texture table.

use ddsfile::{AlphaMode, D3D10ResourceDimension, Dds, DxgiFormat, NewDxgiParams};
use super::*;

fn make_dds(width: u32, height: u32, mips: u32, format: DxgiFormat) -> Dds {
    let mut dds = Dds::new_dxgi(NewDxgiParams {
        height,
        width,
        depth: None,
        format,
        mipmap_levels: Some(mips),
        array_layers: None,
        caps2: None,
        is_cubemap: false,
        resource_dimension: D3D10ResourceDimension::Texture2D,
        alpha_mode: AlphaMode::Unknown,
    })
    .expect("valid dds header");
    let block = match format {
        DxgiFormat::BC1_UNorm | DxgiFormat::BC4_UNorm => 8,
        _ => 16,
    };
    dds.data = vec![0u8; bc_mip_chain_size(width, height, mips, block) as usize];
    dds
}

// ============================================================================
// Mip-size arithmetic
// ============================================================================

#[test]
fn single_bc1_block_is_8_bytes() {
    assert_eq!(bc_mip_chain_size(4, 4, 1, 8), 8);
    assert_eq!(bc_mip_chain_size(4, 4, 1, 16), 16);
}

#[test]
fn partial_blocks_round_up() {
    // 5×5 needs 2×2 blocks
    assert_eq!(bc_mip_chain_size(5, 5, 1, 8), 32);
    // 1×1 still needs one block
    assert_eq!(bc_mip_chain_size(1, 1, 1, 16), 16);
}

#[test]
fn mip_chain_halves_down_to_one() {
    // 8×8: mips 8×8 (4 blocks), 4×4 (1), 2×2 (1), 1×1 (1)
    assert_eq!(bc_mip_chain_size(8, 8, 4, 8), (4 + 1 + 1 + 1) * 8);
}

#[test]
fn non_square_chains_clamp_each_axis() {
    // 16×4: mips 16×4, 8×2, 4×1, 2×1, 1×1
    let expected = (4 + 2 + 1 + 1 + 1) * 16;
    assert_eq!(bc_mip_chain_size(16, 4, 5, 16), expected);
}

// ============================================================================
// Format mapping and rejection
// ============================================================================

#[test]
fn dxgi_bc7_maps_to_bc7() {
    let dds = make_dds(16, 16, 1, DxgiFormat::BC7_UNorm);
    let asset = texture_from_dds(&dds, "test").unwrap();
    assert_eq!(asset.format, BlockFormat::Bc7 { srgb: false });
    assert_eq!(asset.format.block_size(), 16);
}

#[test]
fn dxgi_bc1_maps_to_bc1() {
    let dds = make_dds(16, 16, 1, DxgiFormat::BC1_UNorm);
    let asset = texture_from_dds(&dds, "test").unwrap();
    assert_eq!(asset.format, BlockFormat::Bc1 { srgb: false });
    assert_eq!(asset.format.block_size(), 8);
}

#[test]
fn uncompressed_dds_is_rejected() {
    let dds = make_dds(16, 16, 1, DxgiFormat::R8G8B8A8_UNorm);
    let result = texture_from_dds(&dds, "test");
    assert!(matches!(result, Err(EngineError::UnsupportedFormat(_))));
}

#[test]
fn cubemap_is_rejected() {
    let mut dds = make_dds(16, 16, 1, DxgiFormat::BC1_UNorm);
    dds.header.caps2 = Caps2::CUBEMAP;
    let result = texture_from_dds(&dds, "test");
    assert!(matches!(result, Err(EngineError::UnsupportedFormat(_))));
}

#[test]
fn truncated_payload_is_rejected() {
    let mut dds = make_dds(16, 16, 2, DxgiFormat::BC3_UNorm);
    dds.data.truncate(8);
    let result = texture_from_dds(&dds, "test");
    assert!(matches!(result, Err(EngineError::AssetParse(_))));
}

#[test]
fn mip_count_and_size_survive_ingest() {
    let dds = make_dds(32, 16, 3, DxgiFormat::BC3_UNorm);
    let asset = texture_from_dds(&dds, "test").unwrap();
    assert_eq!((asset.width, asset.height, asset.mip_count), (32, 16, 3));
    assert_eq!(asset.byte_size(), bc_mip_chain_size(32, 16, 3, 16));
    assert_eq!(asset.data.len() as u64, asset.byte_size());
}

// ============================================================================
// Texture table
// ============================================================================

#[test]
fn tag_zero_is_the_default_texture() {
    let table = TextureTable::new();
    assert_eq!(table.len(), 1);
    let default = table.get(0).unwrap();
    assert_eq!((default.width, default.height), (1, 1));
    assert_eq!(table.tag_by_name("default"), Some(0));
}

#[test]
fn added_textures_get_sequential_tags() {
    let mut table = TextureTable::new();
    let dds = make_dds(16, 16, 1, DxgiFormat::BC1_UNorm);
    let asset = texture_from_dds(&dds, "test").unwrap();
    let a = table.add("wall", &asset).unwrap();
    let b = table.add("floor", &asset).unwrap();
    assert_eq!((a, b), (1, 2));
    assert_eq!(table.tag_by_name("floor"), Some(2));
}
