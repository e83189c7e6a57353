//! Headless toon renderer demo
//!
//! Renders a pulsing sphere over a floor for a fixed number of frames and
//! logs per-frame draw counts and mesh update timings.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example headless_frames -- --frames 120
//! cargo run --example headless_frames -- --dummy --no-shadows
//! RUST_LOG=debug cargo run --example headless_frames
//! ```

use std::error::Error;
use std::time::{Duration, Instant};

use clap::Parser;
use glam::{Quat, Vec3, Vec4};

use toon_renderer::backend::dummy::DummyBackend;
use toon_renderer::backend::GraphicsBackend;
use toon_renderer::resources::{Material, StaticModel};
use toon_renderer::scene::{Camera, DirectionalLight, Transform};
use toon_renderer::shadow::{CascadedShadowMap, ShadowMapProvider};
use toon_renderer::{
    PlayController, RenderContext, RendererConfig, ToonModel, ToonRenderer, WgpuBackend,
};

#[derive(Parser)]
#[command(name = "headless_frames")]
#[command(about = "Render toon-shaded frames without a window")]
struct Args {
    /// Number of frames to render
    #[arg(long, short = 'n', default_value = "60")]
    frames: usize,

    #[arg(long, default_value = "1280")]
    width: u32,

    #[arg(long, default_value = "720")]
    height: u32,

    /// Number of shadow cascades (1-4)
    #[arg(long, default_value = "4")]
    cascades: usize,

    /// Disable cascaded shadow maps
    #[arg(long)]
    no_shadows: bool,

    /// Disable the planar ground shadow
    #[arg(long)]
    no_ground_shadow: bool,

    /// Disable edge outlines
    #[arg(long)]
    no_edges: bool,

    /// Record draws on the dummy backend instead of a GPU
    #[arg(long)]
    dummy: bool,
}

fn skin(color: Vec3) -> Material {
    Material::new("skin")
        .with_diffuse(color, 1.0)
        .with_ambient(color * 0.5)
        .with_edge(1.0, Vec4::new(0.2, 0.1, 0.1, 1.0))
}

fn cloth(color: Vec3) -> Material {
    Material::new("cloth")
        .with_diffuse(color, 1.0)
        .with_ambient(color * 0.4)
        .with_specular(Vec3::splat(0.1), 8.0)
        .with_edge(0.8, Vec4::new(0.0, 0.0, 0.0, 1.0))
}

fn character() -> StaticModel {
    let body = skin(Vec3::new(1.0, 0.86, 0.78));
    let shirt = cloth(Vec3::new(0.2, 0.3, 0.7));

    StaticModel::uv_sphere(5.0, 32, 16)
        .with_sub_mesh(body, 0, 32 * 16 * 3)
        .with_sub_mesh(shirt, 32 * 16 * 3, 32 * 16 * 3)
        .with_deformer(Box::new(|frame: f32, p: Vec3| {
            p * (1.0 + 0.05 * (frame * 0.2).sin())
        }))
}

fn floor() -> StaticModel {
    let material = Material::new("floor")
        .with_diffuse(Vec3::splat(0.9), 1.0)
        .with_ambient(Vec3::splat(0.5))
        .with_ground_shadow(false)
        .with_shadow_caster(false);
    StaticModel::quad().with_sub_mesh(material, 0, 6)
}

fn run<B: GraphicsBackend>(backend: B, args: &Args) -> Result<(), Box<dyn Error>> {
    let mut config = RendererConfig {
        width: args.width,
        height: args.height,
        ..Default::default()
    };
    config.shadow.enabled = !args.no_shadows;
    config.shadow.cascade_count = args.cascades;
    config.shadow.far = 200.0;
    config.ground_shadow.enabled = !args.no_ground_shadow;

    let mut ctx = RenderContext::new(backend, config)?;
    let mut shadows = CascadedShadowMap::new(&mut ctx.backend, ctx.config.shadow.clone())?;
    let renderer = ToonRenderer::new(&mut ctx)?;

    let mut camera = Camera::new(Vec3::new(0.0, 10.0, 30.0), Vec3::new(0.0, 5.0, 0.0));
    camera.set_viewport(args.width, args.height);
    let light = DirectionalLight::new(Vec3::new(-0.5, -1.0, -0.5), Vec3::splat(0.6));

    let mut sphere = ToonModel::create(&mut ctx, Box::new(character()), Some(&shadows))?
        .with_transform(Transform::from_position(Vec3::new(0.0, 5.0, 0.0)));
    sphere.mesh.edge_enabled = !args.no_edges;
    let ground = ToonModel::create(&mut ctx, Box::new(floor()), Some(&shadows))?.with_transform(
        Transform::new()
            .with_rotation(Quat::from_rotation_x(-std::f32::consts::FRAC_PI_2))
            .with_scale(Vec3::splat(60.0)),
    );
    let mut models = vec![sphere, ground];

    let mut player = PlayController::new();

    let mut update_time = Duration::ZERO;
    let mut last = Instant::now();
    for frame in 0..args.frames {
        let now = Instant::now();
        let elapsed = now.duration_since(last).as_secs_f32();
        last = now;

        if let Some(tick) = player.tick(elapsed) {
            for model in &mut models {
                model.update(&mut ctx, tick)?;
                update_time += model.mesh.timings().total();
            }
        }

        shadows.update(&camera, &light);
        let provider: Option<&dyn ShadowMapProvider> = Some(&shadows);
        let stats = renderer.render_frame(&mut ctx, &models, &camera, &light, provider)?;
        log::debug!("Frame {}: {:?}", frame, stats);
    }

    log::info!(
        "Rendered {} frames, animation time {:.2}s, mesh updates {:?} ({} shader variants, {} pipelines)",
        args.frames,
        player.anim_time(),
        update_time,
        ctx.shaders.len(),
        ctx.pipelines.len()
    );

    for model in models {
        model.destroy(&mut ctx);
    }
    shadows.destroy(&mut ctx.backend);
    renderer.destroy(&mut ctx.backend);
    ctx.into_backend();

    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if args.dummy {
        log::info!("Starting headless toon demo on the dummy backend");
        run(DummyBackend::new(), &args)
    } else {
        log::info!("Starting headless toon demo on wgpu");
        run(WgpuBackend::new_headless()?, &args)
    }
}
