//! Integration tests for vertex and index storage across backing kinds.
//!
//! Every test runs against the dummy device, which records the calls each
//! backing kind issues so upload traffic can be asserted on.

mod common;

use rstest::rstest;

use common::{device, shader, TRIANGLE};
use meshkit::{
    BufferTarget, BufferUsage, DeviceCall, GlDevice, GraphicsError, IndexBackingKind, IndexData,
    VertexAttributes, VertexBackingKind, VertexData,
};

// ============================================================================
// Vertex data
// ============================================================================

#[rstest]
#[case::client_array(VertexBackingKind::ClientArray)]
#[case::static_buffer(VertexBackingKind::StaticBuffer)]
#[case::sub_data_buffer(VertexBackingKind::SubDataBuffer)]
#[case::buffer_with_vao(VertexBackingKind::BufferWithVao)]
fn test_vertex_contents_roundtrip(#[case] kind: VertexBackingKind) {
    let device = device();
    let mut vertices = VertexData::new(
        device.clone(),
        kind,
        BufferUsage::StaticDraw,
        4,
        VertexAttributes::position_only(),
    )
    .unwrap();

    vertices.set_contents(&TRIANGLE, 0, TRIANGLE.len()).unwrap();
    assert_eq!(vertices.num_vertices(), 3);
    assert_eq!(vertices.max_vertices(), 4);

    let mut out = [0.0f32; 9];
    vertices.get_contents(0, &mut out).unwrap();
    assert_eq!(out, TRIANGLE);
    assert_eq!(vertices.contents(), &TRIANGLE);
}

#[rstest]
#[case::static_buffer(VertexBackingKind::StaticBuffer)]
#[case::sub_data_buffer(VertexBackingKind::SubDataBuffer)]
#[case::buffer_with_vao(VertexBackingKind::BufferWithVao)]
fn test_vertex_bind_uploads_device_copy(#[case] kind: VertexBackingKind) {
    let device = device();
    let mut shader = shader(&device);
    let mut vertices = VertexData::new(
        device.clone(),
        kind,
        BufferUsage::StaticDraw,
        3,
        VertexAttributes::position_only(),
    )
    .unwrap();
    vertices.set_contents(&TRIANGLE, 0, TRIANGLE.len()).unwrap();
    assert!(vertices.is_dirty());

    vertices.bind(&mut shader, None);
    assert!(!vertices.is_dirty());
    assert_eq!(device.buffer_f32(vertices.handle()).unwrap(), TRIANGLE.to_vec());
    assert!(device.enabled_attributes().contains(&0));
    vertices.unbind(&mut shader, None);

    assert!(device.errors().is_empty(), "{:?}", device.errors());
}

#[rstest]
#[case::client_array(VertexBackingKind::ClientArray)]
#[case::static_buffer(VertexBackingKind::StaticBuffer)]
#[case::sub_data_buffer(VertexBackingKind::SubDataBuffer)]
#[case::buffer_with_vao(VertexBackingKind::BufferWithVao)]
fn test_vertex_rebind_without_changes_does_not_upload(#[case] kind: VertexBackingKind) {
    let device = device();
    let mut shader = shader(&device);
    let mut vertices = VertexData::new(
        device.clone(),
        kind,
        BufferUsage::StaticDraw,
        3,
        VertexAttributes::position_only(),
    )
    .unwrap();
    vertices.set_contents(&TRIANGLE, 0, TRIANGLE.len()).unwrap();

    vertices.bind(&mut shader, None);
    vertices.unbind(&mut shader, None);
    device.clear_calls();

    vertices.bind(&mut shader, None);
    vertices.unbind(&mut shader, None);
    assert_eq!(device.upload_count(), 0);
}

#[rstest]
#[case::static_buffer(VertexBackingKind::StaticBuffer)]
#[case::sub_data_buffer(VertexBackingKind::SubDataBuffer)]
#[case::buffer_with_vao(VertexBackingKind::BufferWithVao)]
fn test_vertex_invalidate_reuploads_to_fresh_handle(#[case] kind: VertexBackingKind) {
    let device = device();
    let mut shader = shader(&device);
    let mut vertices = VertexData::new(
        device.clone(),
        kind,
        BufferUsage::StaticDraw,
        3,
        VertexAttributes::position_only(),
    )
    .unwrap();
    vertices.set_contents(&TRIANGLE, 0, TRIANGLE.len()).unwrap();
    vertices.bind(&mut shader, None);
    vertices.unbind(&mut shader, None);
    let old_handle = vertices.handle();

    device.lose_context();
    device.restore_context().unwrap();
    shader.invalidate();
    shader.check_managed();
    vertices.invalidate().unwrap();

    let new_handle = vertices.handle();
    assert!(new_handle.is_valid());
    assert_ne!(new_handle, old_handle);
    assert!(vertices.is_dirty());
    assert_eq!(vertices.contents(), &TRIANGLE);

    device.clear_calls();
    vertices.bind(&mut shader, None);
    assert_eq!(device.upload_count(), 1);
    assert_eq!(device.buffer_f32(new_handle).unwrap(), TRIANGLE.to_vec());
    vertices.unbind(&mut shader, None);
    assert!(device.errors().is_empty(), "{:?}", device.errors());
}

#[test]
fn test_client_array_passes_bytes_at_bind() {
    let device = device();
    let mut shader = shader(&device);
    let mut vertices = VertexData::new(
        device.clone(),
        VertexBackingKind::ClientArray,
        BufferUsage::StaticDraw,
        3,
        VertexAttributes::position_only(),
    )
    .unwrap();
    vertices.set_contents(&TRIANGLE, 0, TRIANGLE.len()).unwrap();
    assert_eq!(vertices.handle(), meshkit::BufferId::NONE);

    vertices.bind(&mut shader, None);
    let client_pointers = device.count_calls(|call| {
        matches!(call, DeviceCall::VertexAttribPointer { client: true, .. })
    });
    assert_eq!(client_pointers, 1);
    assert_eq!(device.upload_count(), 0);
    vertices.unbind(&mut shader, None);
}

#[test]
fn test_sub_data_update_while_bound_uploads_range() {
    let device = device();
    let mut shader = shader(&device);
    let mut vertices = VertexData::new(
        device.clone(),
        VertexBackingKind::SubDataBuffer,
        BufferUsage::DynamicDraw,
        3,
        VertexAttributes::position_only(),
    )
    .unwrap();
    vertices.set_contents(&TRIANGLE, 0, TRIANGLE.len()).unwrap();
    vertices.bind(&mut shader, None);
    device.clear_calls();

    vertices.update_contents(3, &[5.0, 6.0, 7.0], 0, 3).unwrap();

    let handle = vertices.handle();
    assert_eq!(
        device.calls().last(),
        Some(&DeviceCall::BufferSubData {
            target: BufferTarget::Array,
            buffer: handle,
            offset: 12,
            len: 12,
        })
    );
    assert_eq!(
        device.buffer_f32(handle).unwrap()[3..6],
        [5.0, 6.0, 7.0]
    );
    vertices.unbind(&mut shader, None);
}

#[test]
fn test_explicit_locations_override_aliases() {
    let device = device();
    let mut shader = shader(&device);
    let mut vertices = VertexData::new(
        device.clone(),
        VertexBackingKind::StaticBuffer,
        BufferUsage::StaticDraw,
        3,
        VertexAttributes::position_only(),
    )
    .unwrap();
    vertices.set_contents(&TRIANGLE, 0, TRIANGLE.len()).unwrap();

    vertices.bind(&mut shader, Some(&[5][..]));
    assert_eq!(device.enabled_attributes(), vec![5]);
    vertices.unbind(&mut shader, Some(&[5][..]));
    assert!(device.enabled_attributes().is_empty());
}

#[test]
fn test_vertex_capacity_is_enforced() {
    let device = device();
    let mut vertices = VertexData::new(
        device,
        VertexBackingKind::StaticBuffer,
        BufferUsage::StaticDraw,
        2,
        VertexAttributes::position_only(),
    )
    .unwrap();

    let result = vertices.set_contents(&TRIANGLE, 0, TRIANGLE.len());
    assert_eq!(
        result,
        Err(GraphicsError::CapacityExceeded {
            requested: 9,
            capacity: 6,
        })
    );
    assert_eq!(vertices.num_vertices(), 0);
}

// ============================================================================
// Index data
// ============================================================================

#[rstest]
#[case::client_array(IndexBackingKind::ClientArray)]
#[case::static_buffer(IndexBackingKind::StaticBuffer)]
#[case::sub_data_buffer(IndexBackingKind::SubDataBuffer)]
fn test_index_contents_roundtrip(#[case] kind: IndexBackingKind) {
    let device = device();
    let mut indices = IndexData::new(device.clone(), kind, BufferUsage::StaticDraw, 6).unwrap();

    indices.set_contents(&[9, 0, 1, 2, 2, 3, 0], 1, 6).unwrap();
    assert_eq!(indices.num_indices(), 6);
    assert_eq!(indices.contents(), &[0, 1, 2, 2, 3, 0]);

    let mut out = [0u32; 3];
    indices.get_contents(3, &mut out).unwrap();
    assert_eq!(out, [2, 3, 0]);

    indices.bind();
    if kind != IndexBackingKind::ClientArray {
        assert_eq!(
            device.buffer_u32(indices.handle()).unwrap()[..6],
            [0, 1, 2, 2, 3, 0]
        );
        assert_eq!(
            device.bound_buffer(BufferTarget::ElementArray),
            indices.handle()
        );
    }
    indices.unbind();
    assert!(device.errors().is_empty(), "{:?}", device.errors());
}

#[rstest]
#[case::static_buffer(IndexBackingKind::StaticBuffer)]
#[case::sub_data_buffer(IndexBackingKind::SubDataBuffer)]
fn test_index_invalidate_reuploads_to_fresh_handle(#[case] kind: IndexBackingKind) {
    let device = device();
    let mut indices = IndexData::new(device.clone(), kind, BufferUsage::StaticDraw, 3).unwrap();
    indices.set_contents(&[0, 1, 2], 0, 3).unwrap();
    indices.bind();
    indices.unbind();
    let old_handle = indices.handle();

    device.lose_context();
    device.restore_context().unwrap();
    indices.invalidate().unwrap();
    assert_ne!(indices.handle(), old_handle);
    assert!(indices.is_dirty());

    device.clear_calls();
    indices.bind();
    indices.bind();
    assert_eq!(device.upload_count(), 1);
    assert_eq!(device.buffer_u32(indices.handle()).unwrap(), vec![0, 1, 2]);
    indices.unbind();
}

#[test]
fn test_index_update_out_of_range_leaves_contents() {
    let device = device();
    let mut indices = IndexData::new(
        device,
        IndexBackingKind::StaticBuffer,
        BufferUsage::StaticDraw,
        4,
    )
    .unwrap();
    indices.set_contents(&[0, 1, 2], 0, 3).unwrap();

    let result = indices.update_contents(2, &[7, 8], 0, 2);
    assert!(matches!(result, Err(GraphicsError::OutOfRange { .. })));
    assert_eq!(indices.contents(), &[0, 1, 2]);
}

#[test]
fn test_drop_releases_device_buffers() {
    let device = device();
    {
        let _vertices = VertexData::new(
            device.clone(),
            VertexBackingKind::BufferWithVao,
            BufferUsage::StaticDraw,
            3,
            VertexAttributes::position_only(),
        )
        .unwrap();
        let _indices = IndexData::new(
            device.clone(),
            IndexBackingKind::SubDataBuffer,
            BufferUsage::StaticDraw,
            3,
        )
        .unwrap();
        assert_eq!(device.live_buffers(), 2);
    }
    assert_eq!(device.live_buffers(), 0);
}
