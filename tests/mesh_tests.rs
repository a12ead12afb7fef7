//! Integration tests for mesh drawing, bounds and baked transforms.

mod common;

use rstest::rstest;

use common::{device, shader, TRIANGLE};
use meshkit::math::{Mat3, Mat4, Vec2, Vec3};
use meshkit::{
    DeviceCall, GlDevice, GraphicsError, IndexBackingKind, Mesh, MeshDescriptor, PrimitiveType,
    VertexAttributes, VertexBackingKind, VertexUsage,
};

/// Eight corners of the cube spanning (-1, -1, -1) to (1, 1, 1).
fn cube_corners() -> Vec<f32> {
    let mut vertices = Vec::new();
    for x in [-1.0, 1.0] {
        for y in [-1.0, 1.0] {
            for z in [-1.0, 1.0] {
                vertices.extend_from_slice(&[x, y, z]);
            }
        }
    }
    vertices
}

// ============================================================================
// Rendering
// ============================================================================

#[test]
fn test_single_triangle_issues_one_indexed_draw() {
    let device = device();
    let mut shader = shader(&device);
    let mut mesh = Mesh::with_data(
        device.clone(),
        MeshDescriptor::new(VertexAttributes::position_only()).with_label("triangle"),
        &TRIANGLE,
        &[0, 1, 2],
    )
    .unwrap();

    shader.begin();
    mesh.render(&mut shader, PrimitiveType::Triangles, 0, 3).unwrap();
    shader.end();

    assert_eq!(
        device.draw_calls(),
        vec![DeviceCall::DrawElements {
            primitive: PrimitiveType::Triangles,
            count: 3,
            offset: 0,
            client: false,
        }]
    );
    assert!(device.errors().is_empty(), "{:?}", device.errors());
}

#[rstest]
#[case::client_array(VertexBackingKind::ClientArray, IndexBackingKind::ClientArray)]
#[case::static_buffer(VertexBackingKind::StaticBuffer, IndexBackingKind::StaticBuffer)]
#[case::sub_data_buffer(VertexBackingKind::SubDataBuffer, IndexBackingKind::SubDataBuffer)]
#[case::buffer_with_vao(VertexBackingKind::BufferWithVao, IndexBackingKind::StaticBuffer)]
fn test_render_every_backing(
    #[case] vertex_kind: VertexBackingKind,
    #[case] index_kind: IndexBackingKind,
) {
    let device = device();
    let mut shader = shader(&device);
    let descriptor = MeshDescriptor::new(VertexAttributes::position_only())
        .with_vertex_kind(vertex_kind)
        .with_index_kind(index_kind);
    let mut mesh = Mesh::with_data(
        device.clone(),
        descriptor,
        &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0],
        &[0, 1, 2, 2, 3, 0],
    )
    .unwrap();

    shader.begin();
    mesh.render(&mut shader, PrimitiveType::Triangles, 3, 3).unwrap();
    shader.end();

    let client = index_kind == IndexBackingKind::ClientArray;
    assert_eq!(
        device.draw_calls(),
        vec![DeviceCall::DrawElements {
            primitive: PrimitiveType::Triangles,
            count: 3,
            offset: 12,
            client,
        }]
    );
    assert!(device.errors().is_empty(), "{:?}", device.errors());
}

#[test]
fn test_render_without_indices_draws_arrays() {
    let device = device();
    let mut shader = shader(&device);
    let mut mesh = Mesh::with_data(
        device.clone(),
        MeshDescriptor::new(VertexAttributes::position_only()),
        &TRIANGLE,
        &[],
    )
    .unwrap();

    shader.begin();
    mesh.render(&mut shader, PrimitiveType::LineStrip, 1, 2).unwrap();
    shader.end();

    assert_eq!(
        device.draw_calls(),
        vec![DeviceCall::DrawArrays {
            primitive: PrimitiveType::LineStrip,
            first: 1,
            count: 2,
        }]
    );
}

#[test]
fn test_render_zero_count_is_noop() {
    let device = device();
    let mut shader = shader(&device);
    let mut mesh = Mesh::with_data(
        device.clone(),
        MeshDescriptor::new(VertexAttributes::position_only()),
        &TRIANGLE,
        &[0, 1, 2],
    )
    .unwrap();
    device.clear_calls();

    shader.begin();
    device.clear_calls();
    mesh.render(&mut shader, PrimitiveType::Triangles, 0, 0).unwrap();
    shader.end();

    assert!(device.draw_calls().is_empty());
    assert_eq!(device.upload_count(), 0);
}

#[test]
fn test_render_out_of_range_issues_nothing() {
    let device = device();
    let mut shader = shader(&device);
    let mut mesh = Mesh::with_data(
        device.clone(),
        MeshDescriptor::new(VertexAttributes::position_only()),
        &TRIANGLE,
        &[0, 1, 2],
    )
    .unwrap();

    shader.begin();
    let result = mesh.render(&mut shader, PrimitiveType::Triangles, 1, 3);
    shader.end();

    assert!(matches!(
        result,
        Err(GraphicsError::OutOfRange {
            offset: 1,
            count: 3,
            len: 3,
            ..
        })
    ));
    assert!(device.draw_calls().is_empty());
}

#[test]
fn test_client_array_mesh_indexes_grown_vertices() {
    let device = device();
    let mut shader = shader(&device);
    let mut mesh = Mesh::new(
        device.clone(),
        MeshDescriptor::new(VertexAttributes::position_only()).client_array(),
    )
    .unwrap();
    assert_eq!(mesh.max_vertices(), 0);

    mesh.set_vertices(&TRIANGLE).unwrap();
    mesh.set_indices(&[0, 1, 2]).unwrap();
    assert_eq!(mesh.num_vertices(), 3);
    assert_eq!(mesh.indices(), &[0, 1, 2]);

    let result = mesh.set_indices(&[0, 1, 3]);
    assert!(matches!(
        result,
        Err(GraphicsError::OutOfRange {
            offset: 3,
            len: 3,
            ..
        })
    ));
    assert_eq!(mesh.indices(), &[0, 1, 2]);

    shader.begin();
    mesh.render(&mut shader, PrimitiveType::Triangles, 0, 3).unwrap();
    shader.end();
    assert_eq!(
        device.draw_calls(),
        vec![DeviceCall::DrawElements {
            primitive: PrimitiveType::Triangles,
            count: 3,
            offset: 0,
            client: true,
        }]
    );
}

#[test]
fn test_render_recompiles_invalidated_shader() {
    let device = device();
    let mut shader = shader(&device);
    let mut mesh = Mesh::with_data(
        device.clone(),
        MeshDescriptor::new(VertexAttributes::position_only()),
        &TRIANGLE,
        &[0, 1, 2],
    )
    .unwrap();
    let old = shader.handle();

    device.lose_context();
    device.restore_context().unwrap();
    shader.invalidate();
    mesh.invalidate().unwrap();
    mesh.render(&mut shader, PrimitiveType::Triangles, 0, 3).unwrap();

    assert!(!shader.is_invalidated());
    assert!(shader.is_compiled(), "{}", shader.log());
    assert_ne!(shader.handle(), old);
    assert!(device.is_program(shader.handle()));
    assert_eq!(device.draw_calls().len(), 1);
}

#[test]
fn test_manual_bind_keeps_state_between_draws() {
    let device = device();
    let mut shader = shader(&device);
    let descriptor = MeshDescriptor::new(VertexAttributes::position_only()).with_auto_bind(false);
    let mut mesh = Mesh::with_data(device.clone(), descriptor, &TRIANGLE, &[0, 1, 2]).unwrap();
    assert!(!mesh.auto_bind());

    shader.begin();
    mesh.bind(&mut shader, None);
    device.clear_calls();
    mesh.render(&mut shader, PrimitiveType::Triangles, 0, 3).unwrap();
    mesh.render(&mut shader, PrimitiveType::Points, 0, 3).unwrap();
    assert_eq!(device.draw_calls().len(), 2);
    assert_eq!(device.upload_count(), 0);
    mesh.unbind(&mut shader, None);
    shader.end();
    assert!(device.errors().is_empty(), "{:?}", device.errors());
}

#[test]
fn test_mesh_survives_context_loss() {
    let device = device();
    let mut shader = shader(&device);
    let mut mesh = Mesh::with_data(
        device.clone(),
        MeshDescriptor::new(VertexAttributes::position_only()),
        &TRIANGLE,
        &[0, 1, 2],
    )
    .unwrap();
    shader.begin();
    mesh.render(&mut shader, PrimitiveType::Triangles, 0, 3).unwrap();
    shader.end();

    device.lose_context();
    device.restore_context().unwrap();
    shader.invalidate();
    mesh.invalidate().unwrap();
    device.clear_calls();

    shader.begin();
    assert!(shader.is_compiled(), "{}", shader.log());
    mesh.render(&mut shader, PrimitiveType::Triangles, 0, 3).unwrap();
    shader.end();

    assert_eq!(device.upload_count(), 2);
    assert_eq!(device.draw_calls().len(), 1);
    assert!(device.errors().is_empty(), "{:?}", device.errors());
}

#[test]
fn test_recovery_waits_for_restored_context() {
    let device = device();
    let mut shader = shader(&device);
    let mut mesh = Mesh::with_data(
        device.clone(),
        MeshDescriptor::new(VertexAttributes::position_only()),
        &TRIANGLE,
        &[0, 1, 2],
    )
    .unwrap();

    device.lose_context();
    assert!(matches!(
        mesh.invalidate(),
        Err(GraphicsError::ResourceCreationFailed(_))
    ));

    device.clear_calls();
    device.restore_context().unwrap();
    shader.invalidate();
    mesh.invalidate().unwrap();
    shader.begin();
    mesh.render(&mut shader, PrimitiveType::Triangles, 0, 3).unwrap();
    shader.end();

    let calls = device.calls();
    assert_eq!(calls.first(), Some(&DeviceCall::RestoreContext));
    assert!(shader.is_compiled(), "{}", shader.log());
    assert_eq!(device.draw_calls().len(), 1);
    assert!(device.errors().is_empty(), "{:?}", device.errors());
}

// ============================================================================
// Bounds
// ============================================================================

#[test]
fn test_bounding_box_of_cube() {
    let device = device();
    let mesh = Mesh::with_data(
        device,
        MeshDescriptor::new(VertexAttributes::position_only()),
        &cube_corners(),
        &[],
    )
    .unwrap();

    let bbox = mesh.calculate_bounding_box().unwrap();
    assert_eq!(bbox.min, Vec3::splat(-1.0));
    assert_eq!(bbox.max, Vec3::splat(1.0));
    assert_eq!(bbox.center(), Vec3::ZERO);
}

#[test]
fn test_bounding_box_range_walks_indices() {
    let device = device();
    let mesh = Mesh::with_data(
        device,
        MeshDescriptor::new(VertexAttributes::position_only()),
        &cube_corners(),
        &[0, 7, 1, 2],
    )
    .unwrap();

    // Indices 2..4 reference corners (-1, -1, 1) and (-1, 1, -1).
    let bbox = mesh.calculate_bounding_box_range(2, 2, None).unwrap();
    assert_eq!(bbox.min, Vec3::new(-1.0, -1.0, -1.0));
    assert_eq!(bbox.max, Vec3::new(-1.0, 1.0, 1.0));

    let moved = Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0));
    let bbox = mesh.calculate_bounding_box_range(0, 2, Some(&moved)).unwrap();
    assert_eq!(bbox.min, Vec3::new(9.0, -1.0, -1.0));
    assert_eq!(bbox.max, Vec3::new(11.0, 1.0, 1.0));
}

#[test]
fn test_radius_of_cube() {
    let device = device();
    let mesh = Mesh::with_data(
        device,
        MeshDescriptor::new(VertexAttributes::position_only()),
        &cube_corners(),
        &[],
    )
    .unwrap();

    let squared = mesh
        .calculate_radius_squared(Vec3::ZERO, 0, 8, None)
        .unwrap();
    assert!((squared - 3.0).abs() < 1e-6);
    let radius = mesh
        .calculate_radius(Vec3::new(-1.0, -1.0, -1.0), 0, 8, None)
        .unwrap();
    assert!((radius - 12.0f32.sqrt()).abs() < 1e-5);
}

#[test]
fn test_bounds_of_empty_mesh_fail() {
    let device = device();
    let mesh = Mesh::new(
        device,
        MeshDescriptor::new(VertexAttributes::position_only()).with_max_vertices(4),
    )
    .unwrap();

    assert_eq!(mesh.calculate_bounding_box(), Err(GraphicsError::EmptyMesh));
}

// ============================================================================
// Baked transforms
// ============================================================================

#[test]
fn test_scale_and_transform_positions() {
    let device = device();
    let mut shader = shader(&device);
    let mut mesh = Mesh::with_data(
        device.clone(),
        MeshDescriptor::new(VertexAttributes::position_only()),
        &TRIANGLE,
        &[0, 1, 2],
    )
    .unwrap();

    mesh.scale(2.0, 3.0, 1.0).unwrap();
    assert_eq!(mesh.vertices()[3..9], [2.0, 0.0, 0.0, 0.0, 3.0, 0.0]);

    mesh.transform(&Mat4::from_translation(Vec3::Z), 1, 1).unwrap();
    assert_eq!(mesh.vertices()[3..6], [2.0, 0.0, 1.0]);
    assert_eq!(mesh.vertices()[6..9], [0.0, 3.0, 0.0]);

    // The baked positions reach the device at the next draw.
    shader.begin();
    mesh.render(&mut shader, PrimitiveType::Triangles, 0, 3).unwrap();
    shader.end();
    let handle = mesh.vertex_data().handle();
    assert_eq!(device.buffer_f32(handle).unwrap(), mesh.vertices().to_vec());
}

#[test]
fn test_transform_uv_leaves_positions() {
    let device = device();
    let mut mesh = Mesh::with_data(
        device,
        MeshDescriptor::new(VertexAttributes::position_normal_uv()),
        &[
            1.0, 2.0, 3.0, 0.0, 0.0, 1.0, 0.25, 0.5, //
            4.0, 5.0, 6.0, 0.0, 0.0, 1.0, 1.0, 1.0,
        ],
        &[],
    )
    .unwrap();

    let flip = Mat3::from_scale_angle_translation(Vec2::new(1.0, -1.0), 0.0, Vec2::new(0.0, 1.0));
    mesh.transform_uv(&flip, 0, 2).unwrap();

    assert_eq!(mesh.vertices()[..8], [1.0, 2.0, 3.0, 0.0, 0.0, 1.0, 0.25, 0.5]);
    assert_eq!(mesh.vertices()[14..16], [1.0, 0.0]);
}

#[test]
fn test_transform_requires_attribute() {
    let device = device();
    let mut mesh = Mesh::with_data(
        device,
        MeshDescriptor::new(VertexAttributes::position_only()),
        &TRIANGLE,
        &[],
    )
    .unwrap();

    let result = mesh.transform_uv(&Mat3::IDENTITY, 0, 3);
    assert_eq!(
        result,
        Err(GraphicsError::MissingAttribute(
            VertexUsage::TEXTURE_COORDINATES
        ))
    );
}
