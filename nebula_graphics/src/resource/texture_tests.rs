use super::texture::*;
use crate::format::ColorFormat;
use crate::native::mock::{MockNative, MockState};
use std::sync::{Arc, Mutex};

// ============================================================================
// Helpers
// ============================================================================

fn mock() -> (MockNative, Arc<Mutex<MockState>>) {
    MockNative::new()
}

fn desc(width: u32, height: u32, levels: u32, flags: TextureFlags) -> TextureDesc {
    TextureDesc {
        width,
        height,
        format: ColorFormat::Rgba,
        levels,
        flags,
    }
}

fn image(width: u32, height: u32) -> Vec<u8> {
    vec![0u8; ColorFormat::Rgba.byte_size(width, height)]
}

// ============================================================================
// Validation tests
// ============================================================================

#[test]
fn test_rejects_degenerate_descriptions() {
    let (mut native, _) = mock();
    assert!(Texture2d::new(&mut native, desc(0, 4, 1, TextureFlags::empty()), vec![]).is_err());
    assert!(Texture2d::new(&mut native, desc(4, 0, 1, TextureFlags::empty()), vec![]).is_err());
    assert!(Texture2d::new(&mut native, desc(4, 4, 0, TextureFlags::empty()), vec![]).is_err());
}

#[test]
fn test_image_count_per_mip_chain() {
    let (mut native, _) = mock();
    let d = desc(4, 4, 2, TextureFlags::empty());
    assert!(Texture2d::new(&mut native, d.clone(), vec![image(4, 4)]).is_err());
    assert!(Texture2d::new(&mut native, d, vec![image(4, 4), image(2, 2)]).is_ok());
}

#[test]
fn test_gen_mipmaps_takes_only_level_zero() {
    let (mut native, _) = mock();
    let d = desc(4, 4, 3, TextureFlags::GEN_MIPMAPS);
    assert!(Texture2d::new(&mut native, d.clone(), vec![image(4, 4)]).is_ok());
    assert!(Texture2d::new(
        &mut native,
        d,
        vec![image(4, 4), image(2, 2), image(1, 1)]
    )
    .is_err());
}

#[test]
fn test_cube_map_needs_six_faces() {
    let (mut native, _) = mock();
    let d = desc(4, 4, 1, TextureFlags::CUBEMAP);
    assert!(Texture2d::new(&mut native, d.clone(), vec![image(4, 4); 5]).is_err());
    assert!(Texture2d::new(&mut native, d, vec![image(4, 4); 6]).is_ok());
}

#[test]
fn test_image_byte_size_checked_per_level() {
    let (mut native, _) = mock();
    let d = desc(4, 4, 2, TextureFlags::empty());
    // level 1 of a 4x4 texture is 2x2, not 4x4
    assert!(Texture2d::new(&mut native, d, vec![image(4, 4), image(4, 4)]).is_err());
}

#[test]
fn test_render_target_view_counts() {
    assert_eq!(desc(4, 4, 1, TextureFlags::empty()).render_target_count(), 0);
    assert_eq!(desc(4, 4, 1, TextureFlags::RENDER_TARGET).render_target_count(), 1);
    assert_eq!(
        desc(4, 4, 1, TextureFlags::RENDER_TARGET | TextureFlags::CUBEMAP).render_target_count(),
        6
    );
}

// ============================================================================
// Backing selection tests
// ============================================================================

#[test]
fn test_backing_follows_creation_inputs() {
    let (mut native, _) = mock();

    let with_data =
        Texture2d::new(&mut native, desc(4, 4, 1, TextureFlags::empty()), vec![image(4, 4)]).unwrap();
    assert!(matches!(with_data.backing(), TextureBacking::Data(_)));

    let target =
        Texture2d::new(&mut native, desc(4, 4, 1, TextureFlags::RENDER_TARGET), vec![]).unwrap();
    assert!(matches!(target.backing(), TextureBacking::Transient));

    let shared = Texture2d::new(&mut native, desc(4, 4, 1, TextureFlags::SHARED), vec![]).unwrap();
    assert!(matches!(shared.backing(), TextureBacking::Shared(_)));
    assert!(shared.shared_handle().is_some());
}

#[test]
fn test_open_shared_adopts_native_description() {
    let (mut native, _) = mock();
    let tex = Texture2d::open_shared(&mut native, 42).unwrap();
    assert_eq!(tex.width(), 64);
    assert_eq!(tex.height(), 64);
    assert_eq!(tex.format(), ColorFormat::Bgra);
    assert_eq!(tex.shared_handle(), Some(42));

    assert!(Texture2d::open_shared(&mut native, 0).is_err());
}

// ============================================================================
// Interop view tests
// ============================================================================

#[test]
fn test_gdi_compatible_texture_exposes_surface() {
    let (mut native, _) = mock();
    let tex =
        Texture2d::new(&mut native, desc(4, 4, 1, TextureFlags::GDI_COMPATIBLE), vec![]).unwrap();
    assert!(tex.gdi_surface().is_some());

    let plain = Texture2d::new(&mut native, desc(4, 4, 1, TextureFlags::empty()), vec![image(4, 4)])
        .unwrap();
    assert!(plain.gdi_surface().is_none());
}

// ============================================================================
// Dynamic update tests
// ============================================================================

#[test]
fn test_update_requires_dynamic_flag() {
    let (mut native, tracker) = mock();
    let mut tex =
        Texture2d::new(&mut native, desc(4, 4, 1, TextureFlags::empty()), vec![image(4, 4)]).unwrap();
    assert!(tex.update(&mut native, image(4, 4)).is_err());
    assert_eq!(tracker.lock().unwrap().texture_updates, 0);
}

#[test]
fn test_update_rejects_wrong_byte_count() {
    let (mut native, _) = mock();
    let mut tex =
        Texture2d::new(&mut native, desc(4, 4, 1, TextureFlags::DYNAMIC), vec![image(4, 4)]).unwrap();
    assert!(tex.update(&mut native, image(2, 2)).is_err());
}

#[test]
fn test_update_refreshes_retained_data() {
    let (mut native, tracker) = mock();
    let mut tex =
        Texture2d::new(&mut native, desc(4, 4, 1, TextureFlags::DYNAMIC), vec![image(4, 4)]).unwrap();

    let fresh = vec![0x7fu8; ColorFormat::Rgba.byte_size(4, 4)];
    tex.update(&mut native, fresh.clone()).unwrap();
    assert_eq!(tracker.lock().unwrap().texture_updates, 1);

    match tex.backing() {
        TextureBacking::Data(images) => assert_eq!(images[0], fresh),
        _ => panic!("expected retained data backing"),
    }
}

// ============================================================================
// Rebuild tests
// ============================================================================

#[test]
fn test_rebuild_recreates_from_retained_data() {
    let (mut native, tracker) = mock();
    let mut tex =
        Texture2d::new(&mut native, desc(4, 4, 1, TextureFlags::empty()), vec![image(4, 4)]).unwrap();
    assert_eq!(tracker.lock().unwrap().textures_created, 1);

    tex.rebuild(&mut native).unwrap();
    assert_eq!(tracker.lock().unwrap().textures_created, 2);
    assert!(tex.natives().is_ok());
    assert!(matches!(tex.backing(), TextureBacking::Data(_)));
}

#[test]
fn test_rebuild_recreates_transient_empty() {
    let (mut native, tracker) = mock();
    let mut tex =
        Texture2d::new(&mut native, desc(8, 8, 1, TextureFlags::RENDER_TARGET), vec![]).unwrap();
    tex.rebuild(&mut native).unwrap();
    assert_eq!(tracker.lock().unwrap().textures_created, 2);
    assert_eq!(tex.width(), 8);
    assert!(tex.render_target(0).is_ok());
}

#[test]
fn test_rebuild_reopens_shared_handle() {
    let (mut native, tracker) = mock();
    let mut tex = Texture2d::open_shared(&mut native, 42).unwrap();
    tex.rebuild(&mut native).unwrap();
    assert_eq!(tracker.lock().unwrap().textures_created, 2);
    assert_eq!(tex.shared_handle(), Some(42));
}

#[test]
fn test_rebuild_degrades_lost_shared_handle() {
    let (mut native, tracker) = mock();
    let mut tex = Texture2d::open_shared(&mut native, 42).unwrap();

    tracker.lock().unwrap().fail_shared_open = true;
    tex.rebuild(&mut native).unwrap();

    // the reopen failed but the texture stays usable as an empty stand-in
    let natives = tex.natives().unwrap();
    assert!(natives.shared_handle.is_none());
    assert_eq!(tex.width(), 64);
}
