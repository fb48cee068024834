use super::shader::LayoutExpectation;
use super::vertex_buffer::{TexCoords, VertexBuffer, VertexData};
use crate::native::mock::{MockNative, MockState};
use glam::Vec4;
use std::sync::{Arc, Mutex};

// ============================================================================
// Helpers
// ============================================================================

fn mock() -> (MockNative, Arc<Mutex<MockState>>) {
    MockNative::new()
}

fn points(n: usize) -> Vec<Vec4> {
    vec![Vec4::ZERO; n]
}

fn full_data(n: usize) -> VertexData {
    VertexData {
        points: points(n),
        normals: Some(vec![Vec4::Z; n]),
        tangents: Some(vec![Vec4::X; n]),
        colors: Some(vec![0xffffffff; n]),
        tex_coords: vec![TexCoords {
            width: 2,
            data: vec![0.5; n * 2],
        }],
    }
}

// ============================================================================
// Validation tests
// ============================================================================

#[test]
fn test_empty_position_stream_fails() {
    let (mut native, _) = mock();
    assert!(VertexBuffer::new(&mut native, VertexData::default(), false).is_err());
}

#[test]
fn test_mismatched_stream_lengths_fail() {
    let (mut native, _) = mock();
    let data = VertexData {
        points: points(3),
        normals: Some(vec![Vec4::Z; 2]),
        ..VertexData::default()
    };
    assert!(VertexBuffer::new(&mut native, data, false).is_err());

    let data = VertexData {
        points: points(3),
        colors: Some(vec![0; 4]),
        ..VertexData::default()
    };
    assert!(VertexBuffer::new(&mut native, data, false).is_err());
}

#[test]
fn test_texcoord_width_and_length_validated() {
    let (mut native, _) = mock();
    let data = VertexData {
        points: points(3),
        tex_coords: vec![TexCoords { width: 5, data: vec![0.0; 15] }],
        ..VertexData::default()
    };
    assert!(VertexBuffer::new(&mut native, data, false).is_err());

    let data = VertexData {
        points: points(3),
        tex_coords: vec![TexCoords { width: 2, data: vec![0.0; 5] }],
        ..VertexData::default()
    };
    assert!(VertexBuffer::new(&mut native, data, false).is_err());
}

#[test]
fn test_one_native_buffer_per_stream() {
    let (mut native, tracker) = mock();
    let vb = VertexBuffer::new(&mut native, full_data(3), false).unwrap();
    assert_eq!(vb.len(), 3);
    // position + normal + tangent + color + one texcoord stream
    assert_eq!(tracker.lock().unwrap().buffers_created, 5);
}

// ============================================================================
// Dynamic updates
// ============================================================================

#[test]
fn test_update_requires_dynamic() {
    let (mut native, _) = mock();
    let mut vb = VertexBuffer::new(&mut native, full_data(3), false).unwrap();
    assert!(vb.update(&mut native, full_data(3)).is_err());
}

#[test]
fn test_update_keeps_vertex_count() {
    let (mut native, tracker) = mock();
    let mut vb = VertexBuffer::new(&mut native, full_data(3), true).unwrap();
    assert!(vb.update(&mut native, full_data(4)).is_err());

    vb.update(&mut native, full_data(3)).unwrap();
    assert_eq!(tracker.lock().unwrap().buffer_updates, 5);
}

// ============================================================================
// buffer_list reconciliation
// ============================================================================

#[test]
fn test_buffer_list_orders_streams() {
    let (mut native, _) = mock();
    let vb = VertexBuffer::new(&mut native, full_data(3), false).unwrap();
    let expect = LayoutExpectation {
        normals: true,
        colors: true,
        tangents: true,
        tex_units: 1,
    };
    let mut buffers = Vec::new();
    let mut strides = Vec::new();
    vb.buffer_list(&expect, &mut buffers, &mut strides).unwrap();

    assert_eq!(buffers.len(), 5);
    assert!(buffers.iter().all(Option::is_some));
    // position, normal, color, tangent, texcoord(width 2)
    assert_eq!(strides, vec![16, 16, 4, 16, 8]);
}

#[test]
fn test_buffer_list_skips_undeclared_streams() {
    let (mut native, _) = mock();
    let vb = VertexBuffer::new(&mut native, full_data(3), false).unwrap();
    let mut buffers = Vec::new();
    let mut strides = Vec::new();
    vb.buffer_list(&LayoutExpectation::default(), &mut buffers, &mut strides).unwrap();
    assert_eq!(buffers.len(), 1);
    assert_eq!(strides, vec![16]);
}

#[test]
fn test_buffer_list_pads_missing_streams_with_placeholders() {
    let (mut native, _) = mock();
    let data = VertexData {
        points: points(3),
        ..VertexData::default()
    };
    let vb = VertexBuffer::new(&mut native, data, false).unwrap();
    let expect = LayoutExpectation {
        normals: true,
        colors: false,
        tangents: true,
        tex_units: 2,
    };
    let mut buffers = Vec::new();
    let mut strides = Vec::new();
    vb.buffer_list(&expect, &mut buffers, &mut strides).unwrap();

    assert_eq!(buffers.len(), 5);
    assert!(buffers[0].is_some());
    assert!(buffers[1..].iter().all(Option::is_none));
    assert_eq!(strides, vec![16, 0, 0, 0, 0]);
}

// ============================================================================
// Rebuild
// ============================================================================

#[test]
fn test_rebuild_recreates_all_streams() {
    let (mut native, tracker) = mock();
    let mut vb = VertexBuffer::new(&mut native, full_data(3), false).unwrap();
    assert_eq!(tracker.lock().unwrap().buffers_created, 5);

    vb.rebuild(&mut native).unwrap();
    assert_eq!(tracker.lock().unwrap().buffers_created, 10);
    assert_eq!(vb.len(), 3);

    // the new natives satisfy a fresh buffer_list
    let mut buffers = Vec::new();
    let mut strides = Vec::new();
    let expect = LayoutExpectation { normals: true, colors: true, tangents: true, tex_units: 1 };
    vb.buffer_list(&expect, &mut buffers, &mut strides).unwrap();
    assert!(buffers.iter().all(Option::is_some));
}
