//! End-to-end alpha pass tests against the recording mock device.

use std::sync::Arc;

use veil_device::{
    DeviceCall, DeviceState, DrawKind, MockRenderDevice, RenderDevice, RenderState, RenderStateId, StateSlot,
    TextureHandle, TransformedVertex,
};
use veil_render::{
    AlphaPipelineConfig, AlphaRenderer, BlendFunc, DrawCallback, OpaqueBaseline, QueueError, RenderStateKey,
    ViewParams,
};

fn setup(config: AlphaPipelineConfig) -> (Arc<MockRenderDevice>, AlphaRenderer) {
    let device = Arc::new(MockRenderDevice::new());
    let renderer = AlphaRenderer::new(device.clone(), config).unwrap();
    (device, renderer)
}

/// A fan whose vertices carry `tag` in x so draws can be traced back.
fn fan(tag: f32, count: usize) -> Vec<TransformedVertex> {
    (0..count)
        .map(|i| TransformedVertex::new([tag, i as f32, 0.5], 1.0, 0x80FF_FFFF, [0.0, 0.0]))
        .collect()
}

fn textured(id: u32) -> RenderStateKey {
    RenderStateKey {
        texture: TextureHandle::new(id),
        ..Default::default()
    }
}

fn far_100() -> ViewParams {
    ViewParams::from_clip(1.0, 100.0)
}

/// Tags of the drawn triangles, in draw order.
fn drawn_tags(device: &MockRenderDevice) -> Vec<f32> {
    device
        .draws()
        .iter()
        .flat_map(|draw| draw.triangles.iter().map(|tri| tri[0].position[0]))
        .collect()
}

#[test]
fn test_one_key_three_depths_single_batch() {
    let (device, mut renderer) = setup(AlphaPipelineConfig::default());
    renderer.begin_frame(&far_100());

    for depth in [10.0, 50.0, 5.0] {
        renderer
            .queue_polygon(&fan(depth, 3), RenderStateKey::default(), depth)
            .unwrap();
    }
    let stats = renderer.render_alpha_pass();

    let draws = device.draws();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].kind, DrawKind::Indexed);
    assert_eq!(draws[0].vertex_count, 9);
    assert_eq!(drawn_tags(&device), vec![50.0, 10.0, 5.0]);

    assert_eq!(stats.polygons_submitted, 3);
    assert_eq!(stats.polygons_batched, 3);
    assert_eq!(stats.batches_flushed, 1);
    assert_eq!(stats.draw_calls, 1);
    assert_eq!(stats.draw_calls_saved, 2);
    assert_eq!(stats.batch_efficiency(), 3.0);
}

#[test]
fn test_different_textures_same_depth_two_batches() {
    let (device, mut renderer) = setup(AlphaPipelineConfig::default());
    renderer.begin_frame(&far_100());

    renderer.queue_polygon(&fan(1.0, 3), textured(1), 20.0).unwrap();
    renderer.queue_polygon(&fan(2.0, 3), textured(2), 20.0).unwrap();
    let stats = renderer.render_alpha_pass();

    let draws = device.draws();
    assert_eq!(draws.len(), 2);
    assert_eq!(draws[0].texture, TextureHandle::new(1));
    assert_eq!(draws[1].texture, TextureHandle::new(2));
    assert_eq!(stats.batches_flushed, 2);
    assert_eq!(stats.draw_calls_saved, 0);
}

#[test]
fn test_batch_counts_are_sum_of_fans() {
    let (device, mut renderer) = setup(AlphaPipelineConfig::default());
    renderer.begin_frame(&far_100());

    renderer.queue_polygon(&fan(30.0, 4), RenderStateKey::default(), 30.0).unwrap();
    renderer.queue_polygon(&fan(20.0, 5), RenderStateKey::default(), 20.0).unwrap();
    renderer.queue_polygon(&fan(10.0, 3), RenderStateKey::default(), 10.0).unwrap();
    renderer.render_alpha_pass();

    let indexed: Vec<_> = device
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            DeviceCall::DrawIndexed(draw) => Some(draw),
            _ => None,
        })
        .collect();
    assert_eq!(indexed.len(), 1);
    assert_eq!(indexed[0].vertex_count, 12);
    assert_eq!(indexed[0].triangle_count, 6);
}

#[test]
fn test_traversal_is_back_to_front() {
    let (device, mut renderer) = setup(AlphaPipelineConfig::default());
    renderer.begin_frame(&far_100());

    // Deterministic scatter of distinct depths in [1, 100).
    let mut seed = 12345u32;
    for _ in 0..200 {
        seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
        let depth = 1.0 + (seed >> 8) as f32 / (1u32 << 24) as f32 * 99.0;
        renderer.queue_polygon(&fan(depth, 3), RenderStateKey::default(), depth).unwrap();
    }
    renderer.render_alpha_pass();

    let tags = drawn_tags(&device);
    assert_eq!(tags.len(), 200);
    assert!(tags.windows(2).all(|pair| pair[0] >= pair[1]));
}

#[test]
fn test_full_batch_flushes_and_continues() {
    let config = AlphaPipelineConfig::default().with_batch_limits(8, 18);
    let (device, mut renderer) = setup(config);
    renderer.begin_frame(&far_100());

    for depth in [40.0, 30.0, 20.0, 10.0] {
        renderer.queue_polygon(&fan(depth, 3), RenderStateKey::default(), depth).unwrap();
    }
    let stats = renderer.render_alpha_pass();

    assert_eq!(device.count_draws_of(DrawKind::Indexed), 2);
    assert_eq!(drawn_tags(&device), vec![40.0, 30.0, 20.0, 10.0]);
    assert_eq!(stats.draw_calls_saved, 2);
}

#[test]
fn test_key_change_preserves_order() {
    let (device, mut renderer) = setup(AlphaPipelineConfig::default());
    renderer.begin_frame(&far_100());

    renderer.queue_polygon(&fan(90.0, 3), textured(1), 90.0).unwrap();
    renderer.queue_polygon(&fan(60.0, 3), textured(2), 60.0).unwrap();
    renderer.queue_polygon(&fan(30.0, 3), textured(1), 30.0).unwrap();
    renderer.render_alpha_pass();

    let textures: Vec<_> = device.draws().iter().map(|draw| draw.texture).collect();
    assert_eq!(
        textures,
        vec![TextureHandle::new(1), TextureHandle::new(2), TextureHandle::new(1)]
    );
    assert_eq!(drawn_tags(&device), vec![90.0, 60.0, 30.0]);
}

#[test]
fn test_sort_object_splits_batches() {
    let (device, mut renderer) = setup(AlphaPipelineConfig::default());
    renderer.begin_frame(&far_100());

    renderer.queue_polygon(&fan(80.0, 3), RenderStateKey::default(), 80.0).unwrap();
    renderer.queue_polygon(&fan(10.0, 3), RenderStateKey::default(), 10.0).unwrap();
    renderer
        .submit_sort_object(DrawCallback::new(50.0, |device: &dyn RenderDevice| {
            device.draw_fan_immediate(&fan(50.0, 4));
        }))
        .unwrap();
    let stats = renderer.render_alpha_pass();

    let kinds: Vec<_> = device.draws().iter().map(|draw| draw.kind).collect();
    assert_eq!(kinds, vec![DrawKind::Indexed, DrawKind::FanImmediate, DrawKind::Indexed]);
    assert_eq!(drawn_tags(&device), vec![80.0, 50.0, 50.0, 10.0]);
    assert_eq!(stats.sort_objects_drawn, 1);
    assert_eq!(stats.batches_flushed, 2);
}

#[test]
fn test_sort_object_drawn_before_bucket_polygons() {
    let (device, mut renderer) = setup(AlphaPipelineConfig::default());
    renderer.begin_frame(&far_100());

    renderer.queue_polygon(&fan(20.0, 3), RenderStateKey::default(), 20.0).unwrap();
    renderer
        .submit_sort_object(DrawCallback::new(20.0, |device: &dyn RenderDevice| {
            device.draw_fan_immediate(&fan(99.0, 3));
        }))
        .unwrap();
    renderer.render_alpha_pass();

    assert_eq!(drawn_tags(&device), vec![99.0, 20.0]);
}

#[test]
fn test_baseline_restored_after_sort_object() {
    let (device, mut renderer) = setup(AlphaPipelineConfig::default());
    renderer.begin_frame(&far_100());

    renderer
        .submit_sort_object(DrawCallback::new(50.0, |device: &dyn RenderDevice| {
            device.apply_state(DeviceState::Render(RenderState::DepthWriteEnable(true)));
            device.draw_fan_immediate(&fan(50.0, 3));
        }))
        .unwrap();
    renderer.queue_polygon(&fan(10.0, 3), RenderStateKey::default(), 10.0).unwrap();
    renderer.render_alpha_pass();

    let calls = device.calls();
    let object_draw = calls
        .iter()
        .position(|call| matches!(call, DeviceCall::DrawFanImmediate { .. }))
        .unwrap();
    let batch_draw = calls
        .iter()
        .position(|call| matches!(call, DeviceCall::DrawIndexed(_)))
        .unwrap();
    let depth_write_off = DeviceCall::ApplyState(DeviceState::Render(RenderState::DepthWriteEnable(false)));

    assert!(calls[object_draw..batch_draw].contains(&depth_write_off));
}

#[test]
fn test_key_states_resent_after_sort_object() {
    let (device, mut renderer) = setup(AlphaPipelineConfig::default());
    renderer.begin_frame(&far_100());

    renderer.queue_polygon(&fan(80.0, 3), textured(1), 80.0).unwrap();
    renderer.queue_polygon(&fan(10.0, 3), textured(1), 10.0).unwrap();
    renderer
        .submit_sort_object(DrawCallback::new(50.0, |_: &dyn RenderDevice| {}))
        .unwrap();
    let stats = renderer.render_alpha_pass();

    // Same key on both sides of the object, sent once per batch.
    let calls = device.calls();
    let last_draw = calls
        .iter()
        .rposition(|call| matches!(call, DeviceCall::DrawIndexed(_)))
        .unwrap();
    let sent = |slot: StateSlot| {
        calls[..last_draw]
            .iter()
            .filter(|call| matches!(call, DeviceCall::ApplyState(state) if state.slot() == slot))
            .count()
    };
    assert_eq!(sent(StateSlot::Render(RenderStateId::SrcBlend)), 2);
    assert_eq!(sent(StateSlot::Texture(0)), 2);
    assert_eq!(stats.batches_flushed, 2);
}

#[test]
fn test_sort_object_rejects_zero_depth() {
    let (_device, mut renderer) = setup(AlphaPipelineConfig::default());
    renderer.begin_frame(&far_100());

    let result = renderer.submit_sort_object(DrawCallback::new(0.0, |_: &dyn RenderDevice| {}));
    assert!(matches!(result, Err(QueueError::ZeroDepth)));
}

#[test]
fn test_opaque_state_restored_after_pass() {
    let (device, mut renderer) = setup(AlphaPipelineConfig::default());
    renderer.begin_frame(&far_100());

    renderer.queue_polygon(&fan(10.0, 3), textured(4), 10.0).unwrap();
    renderer.render_alpha_pass();

    assert_eq!(
        device.current_state(StateSlot::Render(RenderStateId::DepthWriteEnable)),
        Some(DeviceState::Render(RenderState::DepthWriteEnable(true)))
    );
    assert_eq!(
        device.current_state(StateSlot::Render(RenderStateId::AlphaBlendEnable)),
        Some(DeviceState::Render(RenderState::AlphaBlendEnable(false)))
    );
    assert_eq!(
        device.current_state(StateSlot::Texture(0)),
        Some(DeviceState::Texture {
            stage: 0,
            texture: None
        })
    );
}

#[test]
fn test_custom_opaque_baseline() {
    let (device, mut renderer) = setup(AlphaPipelineConfig::default());
    renderer.set_opaque_baseline(OpaqueBaseline {
        depth_write: false,
        blend: BlendFunc::Alpha,
        ..Default::default()
    });
    renderer.begin_frame(&far_100());

    renderer.queue_polygon(&fan(10.0, 3), RenderStateKey::default(), 10.0).unwrap();
    renderer.render_alpha_pass();

    assert_eq!(
        device.current_state(StateSlot::Render(RenderStateId::DepthWriteEnable)),
        Some(DeviceState::Render(RenderState::DepthWriteEnable(false)))
    );
}

#[test]
fn test_queue_cleared_after_pass() {
    let (device, mut renderer) = setup(AlphaPipelineConfig::default());

    renderer.begin_frame(&far_100());
    renderer.queue_polygon(&fan(10.0, 3), RenderStateKey::default(), 10.0).unwrap();
    renderer.render_alpha_pass();

    renderer.begin_frame(&far_100());
    let stats = renderer.render_alpha_pass();

    assert!(renderer.queue().is_empty());
    assert_eq!(stats.draw_calls, 0);
    assert_eq!(device.count_draws(), 1);
}

#[test]
fn test_pool_exhaustion_drops_polygon() {
    let config = AlphaPipelineConfig::default().with_polygon_capacity(2);
    let (device, mut renderer) = setup(config);
    renderer.begin_frame(&far_100());

    renderer.queue_polygon(&fan(30.0, 3), RenderStateKey::default(), 30.0).unwrap();
    renderer.queue_polygon(&fan(20.0, 3), RenderStateKey::default(), 20.0).unwrap();
    assert_eq!(
        renderer.queue_polygon(&fan(10.0, 3), RenderStateKey::default(), 10.0),
        Err(QueueError::PoolExhausted)
    );
    assert!(renderer.allocate_polygon().is_none());

    let stats = renderer.render_alpha_pass();
    assert_eq!(stats.polygons_submitted, 2);
    assert_eq!(stats.polygons_dropped, 2);
    assert_eq!(drawn_tags(&device), vec![30.0, 20.0]);
}

#[test]
fn test_zero_depth_polygon_dropped() {
    let (device, mut renderer) = setup(AlphaPipelineConfig::default());
    renderer.begin_frame(&far_100());

    assert_eq!(
        renderer.queue_polygon(&fan(1.0, 3), RenderStateKey::default(), 0.0),
        Err(QueueError::ZeroDepth)
    );
    renderer.render_alpha_pass();

    assert_eq!(device.count_draws(), 0);
}

#[test]
fn test_depth_past_far_plane_drawn_first() {
    let (device, mut renderer) = setup(AlphaPipelineConfig::default());
    renderer.begin_frame(&far_100());

    renderer.queue_polygon(&fan(50.0, 3), textured(1), 50.0).unwrap();
    renderer.queue_polygon(&fan(5000.0, 3), textured(2), 5000.0).unwrap();
    renderer.render_alpha_pass();

    assert_eq!(drawn_tags(&device), vec![5000.0, 50.0]);
}

#[test]
fn test_submission_before_begin_frame_is_accepted() {
    let (device, mut renderer) = setup(AlphaPipelineConfig::default());

    renderer.queue_polygon(&fan(10.0, 3), RenderStateKey::default(), 10.0).unwrap();
    renderer.begin_frame(&far_100());
    renderer.render_alpha_pass();

    assert_eq!(device.count_draws(), 1);
}

#[test]
fn test_batching_disabled_draws_each_fan() {
    let config = AlphaPipelineConfig::default().with_batching(false);
    let (device, mut renderer) = setup(config);
    renderer.begin_frame(&far_100());

    for depth in [30.0, 20.0, 10.0] {
        renderer.queue_polygon(&fan(depth, 4), RenderStateKey::default(), depth).unwrap();
    }
    let stats = renderer.render_alpha_pass();

    assert_eq!(device.count_draws_of(DrawKind::FanImmediate), 3);
    assert_eq!(drawn_tags(&device), vec![30.0, 30.0, 20.0, 20.0, 10.0, 10.0]);
    assert_eq!(stats.polygons_immediate, 3);
    assert!(!stats.degraded);
}

#[test]
fn test_state_cache_skips_repeated_keys_across_frames() {
    let (device, mut renderer) = setup(AlphaPipelineConfig::default());

    renderer.begin_frame(&far_100());
    renderer.queue_polygon(&fan(10.0, 3), textured(1), 10.0).unwrap();
    renderer.render_alpha_pass();
    let texture_writes = device.count_state_calls_for(StateSlot::Texture(0));

    renderer.begin_frame(&far_100());
    renderer.queue_polygon(&fan(10.0, 3), textured(1), 10.0).unwrap();
    let stats = renderer.render_alpha_pass();

    // Texture 1 for the batch, then none for the opaque baseline.
    assert_eq!(device.count_state_calls_for(StateSlot::Texture(0)), texture_writes + 2);
    assert!(stats.cache_hits > 0);
    assert!(stats.cache_hit_ratio() > 0.0);
}
