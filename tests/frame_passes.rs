//! Frame structure tests.
//!
//! These tests render through the dummy backend and check which passes were
//! opened and which submeshes each pass drew, in what order and with which
//! stencil reference.

#![cfg(feature = "dummy")]

mod common;

use glam::Vec3;
use rstest::rstest;

use common::{context, small_config, sphere_model, BODY, HAIR, HIDDEN};
use toon_renderer::backend::dummy::{DummyBackend, RecordedDraw};
use toon_renderer::backend::{BindGroupEntry, TextureViewHandle};
use toon_renderer::pipeline::{ModelUniforms, GROUND_SHADOW_STENCIL_REF};
use toon_renderer::resources::{Material, StaticModel};
use toon_renderer::scene::{Camera, DirectionalLight, Transform};
use toon_renderer::shadow::{CascadedShadowMap, ShadowMapProvider};
use toon_renderer::{RenderContext, ToonModel, ToonRenderer};

struct Scene {
    ctx: RenderContext<DummyBackend>,
    renderer: ToonRenderer,
    shadows: CascadedShadowMap,
    models: Vec<ToonModel>,
    camera: Camera,
    light: DirectionalLight,
}

impl Scene {
    fn new(ctx: RenderContext<DummyBackend>, models: Vec<StaticModel>) -> Self {
        let mut ctx = ctx;
        let shadows = CascadedShadowMap::new(&mut ctx.backend, ctx.config.shadow.clone()).unwrap();
        let renderer = ToonRenderer::new(&mut ctx).unwrap();
        let models = models
            .into_iter()
            .map(|m| ToonModel::create(&mut ctx, Box::new(m), Some(&shadows)).unwrap())
            .collect();
        Self {
            ctx,
            renderer,
            shadows,
            models,
            camera: Camera::new(Vec3::new(0.0, 2.0, 8.0), Vec3::ZERO),
            light: DirectionalLight::default(),
        }
    }

    fn render(&mut self) -> toon_renderer::FrameStats {
        self.ctx.backend.clear_recording();
        self.shadows.update(&self.camera, &self.light);
        self.renderer
            .render_frame(
                &mut self.ctx,
                &self.models,
                &self.camera,
                &self.light,
                Some(&self.shadows),
            )
            .unwrap()
    }

    fn draws(&self, family: &str) -> Vec<&RecordedDraw> {
        self.ctx
            .backend
            .draw_calls()
            .iter()
            .filter(|d| {
                d.pipeline_label
                    .as_deref()
                    .is_some_and(|label| label.split(' ').next() == Some(family))
            })
            .collect()
    }
}

/// Depth view the last colour draw of `model` bound as `shadow_map0`
fn sampled_cascade(scene: &Scene, model: usize) -> Option<TextureViewHandle> {
    let index_buffer = scene.models[model].mesh.index_buffer();
    let draw = scene
        .draws("opaque")
        .into_iter()
        .rev()
        .find(|d| d.index_buffer == Some(index_buffer))?;
    let entries = scene.ctx.backend.bind_group_entries(draw.bind_groups[0]?)?;
    // shadow_map0 follows the model block in group 0
    entries.iter().find_map(|(binding, entry)| match entry {
        BindGroupEntry::Texture(view) if *binding == 1 => Some(*view),
        _ => None,
    })
}

/// Model uniforms of `model` as last written
fn model_uniforms(scene: &Scene, model: usize) -> ModelUniforms {
    let buffer = scene.models[model].drawer.model_buffer();
    let data = scene.ctx.backend.buffer_data(buffer).expect("model buffer");
    bytemuck::pod_read_unaligned(&data[..std::mem::size_of::<ModelUniforms>()])
}

/// Index byte offset of a submesh range in the sphere's 16-bit index buffer
fn offset(range: (u32, u32)) -> u64 {
    range.0 as u64 * 2
}

// ============================================================================
// Pass order
// ============================================================================

#[test]
fn test_shadow_cascades_precede_main_pass() {
    let mut scene = Scene::new(context(small_config()), vec![sphere_model(true)]);
    scene.render();

    let labels: Vec<_> = scene
        .ctx
        .backend
        .passes()
        .iter()
        .map(|p| p.label.clone().unwrap_or_default())
        .collect();
    assert_eq!(labels, ["Shadow Cascade 0", "Shadow Cascade 1", "Main Pass"]);

    let passes = scene.ctx.backend.passes();
    assert_eq!(passes[0].color_attachments, 0);
    assert_eq!(passes[2].color_attachments, 1);
    assert_eq!(passes[2].stencil_clear_value, Some(0));
    assert_eq!(scene.ctx.backend.frame_count(), 1);
}

#[test]
fn test_disabled_shadows_skip_cascade_passes() {
    let mut scene = Scene::new(context(small_config()), vec![sphere_model(true)]);
    scene.shadows.set_enabled(false);
    let stats = scene.render();

    assert_eq!(scene.ctx.backend.passes().len(), 1);
    assert_eq!(stats.shadow_draws, 0);
    assert!(scene.draws("shadow-caster").is_empty());
    assert_eq!(stats.color_draws, 2);
}

// ============================================================================
// Per-pass draws
// ============================================================================

#[rstest]
#[case::hair_outlined(true, 2)]
#[case::hair_plain(false, 1)]
fn test_draws_per_pass(#[case] hair_edge: bool, #[case] edge_draws: usize) {
    let mut scene = Scene::new(context(small_config()), vec![sphere_model(hair_edge)]);
    let stats = scene.render();

    // Two visible casters in each of the two cascades
    assert_eq!(stats.shadow_draws, 4);
    assert_eq!(stats.color_draws, 2);
    assert_eq!(stats.edge_draws, edge_draws);
    assert_eq!(stats.ground_shadow_draws, 2);
    assert_eq!(stats.total(), scene.ctx.backend.draw_calls().len());

    let color: Vec<_> = scene.draws("opaque").iter().map(|d| d.index_byte_offset).collect();
    assert_eq!(color, [offset(BODY), offset(HAIR)]);
    let edge: Vec<_> = scene.draws("edge").iter().map(|d| d.index_byte_offset).collect();
    assert_eq!(edge.len(), edge_draws);
    assert_eq!(edge[0], offset(BODY));
}

#[test]
fn test_transparent_submesh_is_never_drawn() {
    let mut scene = Scene::new(context(small_config()), vec![sphere_model(true)]);
    scene.render();

    let draws = scene.ctx.backend.draw_calls();
    assert!(!draws.is_empty());
    assert!(draws.iter().all(|d| d.index_byte_offset != offset(HIDDEN)));
}

#[test]
fn test_submesh_draws_use_own_index_range() {
    let mut scene = Scene::new(context(small_config()), vec![sphere_model(false)]);
    scene.render();

    for draw in scene.draws("opaque") {
        let expected = if draw.index_byte_offset == offset(BODY) { BODY.1 } else { HAIR.1 };
        assert_eq!(draw.indices, 0..expected);
        assert_eq!(draw.index_buffer, Some(scene.models[0].mesh.index_buffer()));
    }
}

#[test]
fn test_main_pass_order_is_color_edge_ground() {
    let mut scene = Scene::new(context(small_config()), vec![sphere_model(true)]);
    scene.render();

    let families: Vec<_> = scene
        .ctx
        .backend
        .draw_calls()
        .iter()
        .filter(|d| d.pass_label.as_deref() == Some("Main Pass"))
        .filter_map(|d| d.pipeline_label.as_deref()?.split(' ').next().map(str::to_owned))
        .collect();
    assert_eq!(
        families,
        ["opaque", "opaque", "edge", "edge", "ground-shadow", "ground-shadow"]
    );
}

// ============================================================================
// Cascade bindings
// ============================================================================

#[test]
fn test_receivers_sample_cascades_bound_at_creation() {
    let mut scene = Scene::new(context(small_config()), vec![sphere_model(true)]);
    scene.render();

    let cascade = scene.shadows.cascade(0).map(|c| c.depth_view);
    assert_eq!(sampled_cascade(&scene, 0), cascade);
    let params = model_uniforms(&scene, 0).shadow_params;
    assert_eq!(params.x, 1.0);
    assert_eq!(params.z, 2.0);
}

#[test]
fn test_unbound_cascades_disable_receiver_shadows_until_rebound() {
    let mut scene = Scene::new(context(small_config()), vec![]);
    let model = ToonModel::create(&mut scene.ctx, Box::new(sphere_model(false)), None).unwrap();
    scene.models.push(model);
    let stats = scene.render();

    // Casters still fill both cascades, but the colour pass samples the dummy
    assert_eq!(stats.shadow_draws, 4);
    let dummy = scene.ctx.defaults.dummy_depth_view;
    assert_eq!(sampled_cascade(&scene, 0), Some(dummy));
    let params = model_uniforms(&scene, 0).shadow_params;
    assert_eq!(params.x, 0.0);
    assert_eq!(params.z, 0.0);

    let bind_groups = scene.ctx.backend.live_bind_group_count();
    scene.models[0]
        .rebind_shadows(&mut scene.ctx, Some(&scene.shadows))
        .unwrap();
    assert_eq!(scene.ctx.backend.live_bind_group_count(), bind_groups);
    scene.render();

    let cascade = scene.shadows.cascade(0).map(|c| c.depth_view);
    assert_eq!(sampled_cascade(&scene, 0), cascade);
    let params = model_uniforms(&scene, 0).shadow_params;
    assert_eq!(params.x, 1.0);
    assert_eq!(params.z, 2.0);

    // Already bound
    scene.models[0]
        .rebind_shadows(&mut scene.ctx, Some(&scene.shadows))
        .unwrap();
    assert_eq!(scene.ctx.backend.live_bind_group_count(), bind_groups);
}

// ============================================================================
// Ground shadow
// ============================================================================

#[test]
fn test_ground_shadow_uses_stencil_guard() {
    let mut scene = Scene::new(context(small_config()), vec![sphere_model(true)]);
    scene.render();

    let ground = scene.draws("ground-shadow");
    assert_eq!(ground.len(), 2);
    assert!(ground.iter().all(|d| d.stencil_reference == GROUND_SHADOW_STENCIL_REF));
    assert!(scene.draws("opaque").iter().all(|d| d.stencil_reference == 0));
}

#[test]
fn test_opaque_ground_shadow_skips_stencil() {
    let mut config = small_config();
    config.ground_shadow.color.w = 1.0;
    let mut scene = Scene::new(context(config), vec![sphere_model(true)]);
    scene.render();

    let ground = scene.draws("ground-shadow");
    assert_eq!(ground.len(), 2);
    assert!(ground.iter().all(|d| d.stencil_reference == 0));
}

#[test]
fn test_ground_shadow_toggles() {
    let mut scene = Scene::new(context(small_config()), vec![sphere_model(true)]);
    scene.models[0].mesh.ground_shadow_enabled = false;
    assert_eq!(scene.render().ground_shadow_draws, 0);

    scene.models[0].mesh.ground_shadow_enabled = true;
    scene.ctx.config.ground_shadow.enabled = false;
    assert_eq!(scene.render().ground_shadow_draws, 0);

    scene.ctx.config.ground_shadow.enabled = true;
    assert_eq!(scene.render().ground_shadow_draws, 2);
}

#[test]
fn test_state_is_reset_between_models() {
    let floor = StaticModel::quad().with_sub_mesh(
        Material::new("floor")
            .with_ground_shadow(false)
            .with_shadow_caster(false),
        0,
        6,
    );
    let mut scene = Scene::new(context(small_config()), vec![sphere_model(true), floor]);
    scene.models[1].transform = Transform::from_position(Vec3::new(0.0, -1.0, 0.0));
    let stats = scene.render();

    assert_eq!(stats.color_draws, 3);
    assert_eq!(stats.shadow_draws, 4);

    // The floor is drawn after the sphere's ground shadow set reference 1
    let floor_draw = scene
        .draws("opaque")
        .into_iter()
        .find(|d| d.index_buffer == Some(scene.models[1].mesh.index_buffer()))
        .expect("floor colour draw");
    assert_eq!(floor_draw.stencil_reference, 0);
    assert_eq!(floor_draw.bind_groups[2], None);
}

// ============================================================================
// Caching and cleanup
// ============================================================================

#[test]
fn test_pipelines_are_cached_across_frames() {
    let mut scene = Scene::new(context(small_config()), vec![sphere_model(true)]);
    scene.render();
    let pipelines = scene.ctx.backend.pipeline_count();
    let modules = scene.ctx.backend.shader_module_count();
    assert_eq!(pipelines, scene.ctx.pipelines.len());

    scene.render();
    scene.render();
    assert_eq!(scene.ctx.backend.pipeline_count(), pipelines);
    assert_eq!(scene.ctx.backend.shader_module_count(), modules);
    assert_eq!(scene.ctx.backend.frame_count(), 3);
}

#[test]
fn test_models_share_shader_variants() {
    let scene = Scene::new(
        context(small_config()),
        vec![sphere_model(true), sphere_model(false)],
    );
    // One variant per family
    assert_eq!(scene.ctx.shaders.len(), 4);
}

#[test]
fn test_destroy_releases_model_resources() {
    let mut scene = Scene::new(context(small_config()), vec![sphere_model(true)]);
    scene.render();

    for model in scene.models.drain(..) {
        model.destroy(&mut scene.ctx);
    }
    assert_eq!(scene.ctx.backend.live_buffer_count(), 0);
    assert_eq!(scene.ctx.backend.live_bind_group_count(), 0);
    assert!(scene.ctx.textures.is_empty());

    let textures = scene.ctx.backend.live_texture_count();
    scene.shadows.destroy(&mut scene.ctx.backend);
    assert_eq!(scene.ctx.backend.live_texture_count(), textures - 2);
}
