use super::shader::*;
use crate::error::Error;
use crate::native::mock::{MockNative, MockState};
use glam::{Mat4, Vec2, Vec3, Vec4};
use std::sync::{Arc, Mutex};

// ============================================================================
// Helpers
// ============================================================================

fn mock() -> (MockNative, Arc<Mutex<MockState>>) {
    MockNative::new()
}

fn param(name: &str, ty: ShaderParamType) -> ShaderParamDesc {
    ShaderParamDesc {
        name: name.to_string(),
        ty,
        array_count: 1,
        default: None,
    }
}

fn vs_with(native: &mut MockNative, params: Vec<ShaderParamDesc>) -> VertexShader {
    VertexShader::new(
        native,
        VertexShaderDesc {
            source: "void main() {}".to_string(),
            file: "test.hlsl".to_string(),
            params,
            attributes: vec![VertexAttribute::Position],
        },
    )
    .unwrap()
}

fn positions(shader: &VertexShader) -> Vec<usize> {
    (0..shader.param_count()).map(|i| shader.param(i).unwrap().pos).collect()
}

// ============================================================================
// Constant layout tests
// ============================================================================

#[test]
fn test_scalars_pack_tightly_within_a_register() {
    let (mut native, _) = mock();
    let shader = vs_with(
        &mut native,
        vec![
            param("a", ShaderParamType::Float),
            param("b", ShaderParamType::Vec3),
        ],
    );
    // float at 0, vec3 ends exactly at the register boundary
    assert_eq!(positions(&shader), vec![0, 4]);
}

#[test]
fn test_param_never_straddles_a_register() {
    let (mut native, _) = mock();
    let shader = vs_with(
        &mut native,
        vec![
            param("a", ShaderParamType::Float),
            param("b", ShaderParamType::Float),
            param("c", ShaderParamType::Vec4),
        ],
    );
    // the vec4 would span bytes 8..24, so it skips to the next register
    assert_eq!(positions(&shader), vec![0, 4, 16]);

    let shader = vs_with(
        &mut native,
        vec![
            param("a", ShaderParamType::Vec3),
            param("b", ShaderParamType::Vec3),
        ],
    );
    assert_eq!(positions(&shader), vec![0, 16]);
}

#[test]
fn test_matrix_aligns_to_register() {
    let (mut native, _) = mock();
    let shader = vs_with(
        &mut native,
        vec![
            param("a", ShaderParamType::Float),
            param("m", ShaderParamType::Mat4),
        ],
    );
    assert_eq!(positions(&shader), vec![0, 16]);
}

#[test]
fn test_array_elements_use_register_stride() {
    let (mut native, _) = mock();
    let shader = vs_with(
        &mut native,
        vec![
            ShaderParamDesc {
                name: "arr".to_string(),
                ty: ShaderParamType::Vec2,
                array_count: 3,
                default: None,
            },
            param("tail", ShaderParamType::Float),
        ],
    );
    // 3 vec2 elements at 16-byte strides: bytes 0..40, tail fits at 40
    assert_eq!(positions(&shader), vec![0, 40]);
    assert_eq!(shader.param(0).unwrap().cur_value.len(), 40);
}

#[test]
fn test_total_size_rounds_up_to_register() {
    let (mut native, tracker) = mock();
    let mut shader = vs_with(&mut native, vec![param("a", ShaderParamType::Float)]);
    assert!(shader.upload_params(&mut native).unwrap());
    assert_eq!(tracker.lock().unwrap().last_update_len, 16);
}

#[test]
fn test_texture_params_take_units_not_space() {
    let (mut native, _) = mock();
    let shader = vs_with(
        &mut native,
        vec![
            param("img_a", ShaderParamType::Texture),
            param("color", ShaderParamType::Vec4),
            param("img_b", ShaderParamType::Texture),
        ],
    );
    assert_eq!(shader.param(0).unwrap().texture_unit, Some(0));
    assert_eq!(shader.param(2).unwrap().texture_unit, Some(1));
    assert_eq!(shader.param(1).unwrap().pos, 0);
    assert!(shader.param(0).unwrap().cur_value.is_empty());
}

// ============================================================================
// Value writes and change detection
// ============================================================================

#[test]
fn test_upload_only_when_changed() {
    let (mut native, _) = mock();
    let mut shader = vs_with(&mut native, vec![param("color", ShaderParamType::Vec4)]);

    // defaults are pending on a fresh shader
    assert!(shader.upload_params(&mut native).unwrap());
    assert!(!shader.upload_params(&mut native).unwrap());

    let idx = shader.param_index("color").unwrap();
    shader.set_param(idx, &ParamValue::Vec4(Vec4::ONE)).unwrap();
    assert!(shader.upload_params(&mut native).unwrap());

    // same value again: no change, no upload
    shader.set_param(idx, &ParamValue::Vec4(Vec4::ONE)).unwrap();
    assert!(!shader.upload_params(&mut native).unwrap());
}

#[test]
fn test_type_mismatch_rejected() {
    let (mut native, _) = mock();
    let mut shader = vs_with(&mut native, vec![param("color", ShaderParamType::Vec4)]);
    let idx = shader.param_index("color").unwrap();
    assert!(matches!(
        shader.set_param(idx, &ParamValue::Float(1.0)),
        Err(Error::InvalidResource(_))
    ));
    assert!(shader.set_param(idx, &ParamValue::Raw(vec![0u8; 16])).is_ok());
    assert!(shader.set_param(idx, &ParamValue::Raw(vec![0u8; 32])).is_err());
}

#[test]
fn test_declared_default_applies_and_resets() {
    let (mut native, _) = mock();
    let default = vec![0u8, 0, 128, 63]; // 1.0f32
    let mut shader = vs_with(
        &mut native,
        vec![ShaderParamDesc {
            name: "gamma".to_string(),
            ty: ShaderParamType::Float,
            array_count: 1,
            default: Some(default.clone()),
        }],
    );
    let idx = shader.param_index("gamma").unwrap();
    assert_eq!(shader.param(idx).unwrap().cur_value, default);

    shader.set_param(idx, &ParamValue::Float(2.0)).unwrap();
    assert_ne!(shader.param(idx).unwrap().cur_value, default);

    shader.reset_to_default(idx).unwrap();
    assert_eq!(shader.param(idx).unwrap().cur_value, default);
}

#[test]
fn test_value_encodings() {
    let (mut native, _) = mock();
    let mut shader = vs_with(
        &mut native,
        vec![
            param("flag", ShaderParamType::Bool),
            param("uv", ShaderParamType::Vec2),
            param("pos", ShaderParamType::Vec3),
            param("m", ShaderParamType::Mat4),
            param("trio", ShaderParamType::Int3),
        ],
    );
    shader.set_param(0, &ParamValue::Bool(true)).unwrap();
    assert_eq!(shader.param(0).unwrap().cur_value, vec![1, 0, 0, 0]);

    shader.set_param(1, &ParamValue::Vec2(Vec2::new(0.0, 1.0))).unwrap();
    shader.set_param(2, &ParamValue::Vec3(Vec3::ZERO)).unwrap();
    shader.set_param(3, &ParamValue::Mat4(Mat4::IDENTITY)).unwrap();
    shader.set_param(4, &ParamValue::Int3([1, 2, 3])).unwrap();
    assert_eq!(shader.param(4).unwrap().cur_value.len(), 12);
}

// ============================================================================
// Layout expectations
// ============================================================================

#[test]
fn test_position_attribute_is_mandatory() {
    let (mut native, _) = mock();
    let result = VertexShader::new(
        &mut native,
        VertexShaderDesc {
            source: String::new(),
            file: "nopos.hlsl".to_string(),
            params: vec![],
            attributes: vec![VertexAttribute::Normal],
        },
    );
    assert!(result.is_err());
}

#[test]
fn test_buffers_expected_counts_streams() {
    let (mut native, _) = mock();
    let shader = VertexShader::new(
        &mut native,
        VertexShaderDesc {
            source: String::new(),
            file: "lit.hlsl".to_string(),
            params: vec![],
            attributes: vec![
                VertexAttribute::Position,
                VertexAttribute::Normal,
                VertexAttribute::Tangent,
                VertexAttribute::TexCoord { unit: 0, width: 2 },
                VertexAttribute::TexCoord { unit: 1, width: 4 },
            ],
        },
    )
    .unwrap();
    assert_eq!(shader.buffers_expected(), 5);
}

// ============================================================================
// Built-in matrices and rebuild
// ============================================================================

#[test]
fn test_builtin_matrices_touch_only_declared_params() {
    let (mut native, _) = mock();
    let mut plain = vs_with(&mut native, vec![]);
    plain.set_builtin_matrices(&Mat4::IDENTITY, &Mat4::IDENTITY).unwrap();
    // no params at all means no constant buffer and no uploads
    assert!(!plain.upload_params(&mut native).unwrap());

    let mut shader = vs_with(&mut native, vec![param("ViewProj", ShaderParamType::Mat4)]);
    assert!(shader.upload_params(&mut native).unwrap());
    shader
        .set_builtin_matrices(&Mat4::from_translation(Vec3::X), &Mat4::from_translation(Vec3::Y))
        .unwrap();
    assert!(shader.upload_params(&mut native).unwrap());
}

#[test]
fn test_rebuild_recompiles_and_marks_params_pending() {
    let (mut native, tracker) = mock();
    let mut shader = vs_with(&mut native, vec![param("color", ShaderParamType::Vec4)]);
    let idx = shader.param_index("color").unwrap();
    shader.set_param(idx, &ParamValue::Vec4(Vec4::ONE)).unwrap();
    assert!(shader.upload_params(&mut native).unwrap());
    assert_eq!(tracker.lock().unwrap().vertex_shaders_created, 1);

    shader.rebuild(&mut native).unwrap();
    assert_eq!(tracker.lock().unwrap().vertex_shaders_created, 2);

    // the retained value re-uploads into the fresh constant buffer
    assert!(shader.upload_params(&mut native).unwrap());
    let expected: Vec<u8> = Vec4::ONE.to_array().iter().flat_map(|f| f.to_le_bytes()).collect();
    assert_eq!(shader.param(idx).unwrap().cur_value, expected);
}

// ============================================================================
// Pixel shader samplers
// ============================================================================

#[test]
fn test_sampler_pairing_requires_texture_param() {
    let (mut native, _) = mock();
    let mut shader = PixelShader::new(
        &mut native,
        PixelShaderDesc {
            source: String::new(),
            file: "ps.hlsl".to_string(),
            params: vec![
                param("image", ShaderParamType::Texture),
                param("color", ShaderParamType::Vec4),
            ],
            samplers: vec![],
        },
        vec![],
    )
    .unwrap();

    assert!(shader.set_param_sampler(1, dummy_sampler()).is_err());
    assert!(shader.set_param_sampler(0, dummy_sampler()).is_ok());

    let units: Vec<_> = shader.texture_params().map(|p| p.texture_unit).collect();
    assert_eq!(units, vec![Some(0)]);
}

fn dummy_sampler() -> crate::resource::SamplerHandle {
    crate::resource::SamplerHandle(Default::default())
}
