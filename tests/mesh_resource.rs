//! Model update and texture sharing tests on the dummy backend.

#![cfg(feature = "dummy")]

mod common;

use glam::Vec3;

use common::{context, small_config, sphere_model};
use toon_renderer::animation::MAX_ELAPSED;
use toon_renderer::backend::dummy::DummyBackend;
use toon_renderer::backend::{BindGroupEntry, GraphicsBackend};
use toon_renderer::resources::{Material, StaticModel, TextureKey};
use toon_renderer::shader::ShaderFamily;
use toon_renderer::{PlayController, PlayMode, RenderContext, ToonModel};

fn buffer_sizes(ctx: &RenderContext<DummyBackend>, model: &ToonModel) -> [Option<u64>; 4] {
    [
        ctx.backend.buffer_size(model.mesh.position_buffer()),
        ctx.backend.buffer_size(model.mesh.normal_buffer()),
        ctx.backend.buffer_size(model.mesh.uv_buffer()),
        ctx.backend.buffer_size(model.mesh.index_buffer()),
    ]
}

#[test]
fn test_playback_updates_keep_buffer_sizes() {
    let mut ctx = context(small_config());
    let wave = StaticModel::uv_sphere(1.0, 8, 4)
        .with_sub_mesh(Material::default(), 0, 192)
        .with_deformer(Box::new(|frame: f32, p: Vec3| p * (1.0 + 0.01 * frame.sin())));
    let mut model = ToonModel::create(&mut ctx, Box::new(wave), None).unwrap();
    let before = buffer_sizes(&ctx, &model);

    let mut player = PlayController::new();
    for _ in 0..10 {
        // A long hitch is clipped before it reaches physics
        let tick = player.tick(0.5).unwrap();
        assert!(tick.elapsed <= MAX_ELAPSED);
        model.update(&mut ctx, tick).unwrap();
        assert_eq!(buffer_sizes(&ctx, &model), before);
    }
    assert!((model.mesh.anim_time() - 10.0 * MAX_ELAPSED).abs() < 1e-4);

    player.set_mode(PlayMode::Stop);
    assert!(player.tick(0.016).is_none());
    model.refresh_pose(&mut ctx).unwrap();
    assert_eq!(buffer_sizes(&ctx, &model), before);
}

#[test]
fn test_models_share_cached_textures() {
    let mut ctx = context(small_config());
    let first = ToonModel::create(&mut ctx, Box::new(sphere_model(true)), None).unwrap();
    let second = ToonModel::create(&mut ctx, Box::new(sphere_model(false)), None).unwrap();

    let hair = ctx.textures.find(&TextureKey::color("hair.bmp")).unwrap();
    assert_eq!(ctx.textures.ref_count(hair), 2);
    assert_eq!(ctx.textures.len(), 2);

    first.destroy(&mut ctx);
    assert_eq!(ctx.textures.ref_count(hair), 1);
    second.destroy(&mut ctx);
    assert!(ctx.textures.is_empty());
    assert_eq!(ctx.backend.live_buffer_count(), 0);
}

#[test]
fn test_missing_texture_binds_white_fallback() {
    let mut ctx = context(small_config());
    let quad = StaticModel::quad().with_sub_mesh(Material::new("m").with_texture("missing.bmp"), 0, 6);
    let model = ToonModel::create(&mut ctx, Box::new(quad), None).unwrap();

    assert!(model.mesh.materials()[0].texture.is_none());
    assert!(ctx.textures.is_empty());

    let group = model
        .drawer
        .binding(0, ShaderFamily::Opaque)
        .and_then(|b| b.bind_group)
        .unwrap();
    let entries = ctx.backend.bind_group_entries(group).unwrap();
    let white = BindGroupEntry::Texture(ctx.defaults.white_view);
    assert!(entries.iter().any(|(_, entry)| *entry == white));
}
