//! Unit tests for format.rs

use crate::format::{mip_dimensions, ColorFormat, DepthStencilFormat};

// ============================================================================
// SIZE / LAYOUT TESTS
// ============================================================================

#[test]
fn test_bits_per_pixel() {
    assert_eq!(ColorFormat::A8.bits_per_pixel(), 8);
    assert_eq!(ColorFormat::Rgba.bits_per_pixel(), 32);
    assert_eq!(ColorFormat::Rgba16F.bits_per_pixel(), 64);
    assert_eq!(ColorFormat::Rgba32F.bits_per_pixel(), 128);
    assert_eq!(ColorFormat::Unknown.bits_per_pixel(), 0);
}

#[test]
fn test_byte_size_linear_formats() {
    assert_eq!(ColorFormat::Rgba.byte_size(256, 256), 256 * 256 * 4);
    assert_eq!(ColorFormat::R8.byte_size(16, 8), 128);
    assert_eq!(ColorFormat::Rg32F.byte_size(4, 4), 4 * 4 * 8);
}

#[test]
fn test_byte_size_compressed_rounds_to_blocks() {
    // 4x4 blocks: 5x5 occupies 2x2 blocks
    assert_eq!(ColorFormat::Dxt1.byte_size(5, 5), 4 * 8);
    assert_eq!(ColorFormat::Dxt5.byte_size(4, 4), 16);
    assert_eq!(ColorFormat::Dxt3.byte_size(8, 4), 32);
}

#[test]
fn test_is_compressed() {
    assert!(ColorFormat::Dxt1.is_compressed());
    assert!(ColorFormat::Dxt3.is_compressed());
    assert!(ColorFormat::Dxt5.is_compressed());
    assert!(!ColorFormat::Rgba.is_compressed());
}

#[test]
fn test_mip_dimensions_clamp_to_one() {
    assert_eq!(mip_dimensions(256, 128, 0), (256, 128));
    assert_eq!(mip_dimensions(256, 128, 1), (128, 64));
    assert_eq!(mip_dimensions(256, 128, 8), (1, 1));
    assert_eq!(mip_dimensions(256, 128, 20), (1, 1));
}

#[test]
fn test_depth_stencil_has_stencil() {
    assert!(DepthStencilFormat::Z24S8.has_stencil());
    assert!(DepthStencilFormat::Z32FS8X24.has_stencil());
    assert!(!DepthStencilFormat::Z16.has_stencil());
    assert!(!DepthStencilFormat::Z32F.has_stencil());
    assert!(!DepthStencilFormat::None.has_stencil());
}
