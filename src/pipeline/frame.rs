//! Frame driver: shadow cascades first, then colour, edge and ground shadow
//! per model in a single main pass

use crate::backend::*;
use crate::context::RenderContext;
use crate::error::RenderResult;
use crate::model::ToonModel;
use crate::scene::{Camera, DirectionalLight};
use crate::shadow::ShadowMapProvider;

use super::model_drawer::FrameView;

/// Draw calls issued by one frame, per pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub shadow_draws: usize,
    pub color_draws: usize,
    pub edge_draws: usize,
    pub ground_shadow_draws: usize,
}

impl FrameStats {
    pub fn total(&self) -> usize {
        self.shadow_draws + self.color_draws + self.edge_draws + self.ground_shadow_draws
    }
}

/// Owns the main pass attachments and records each frame
pub struct ToonRenderer {
    color_texture: TextureHandle,
    color_view: TextureViewHandle,
    depth_texture: TextureHandle,
    depth_view: TextureViewHandle,
    width: u32,
    height: u32,
}

impl ToonRenderer {
    pub fn new<B: GraphicsBackend>(ctx: &mut RenderContext<B>) -> RenderResult<Self> {
        let (width, height) = (ctx.config.width.max(1), ctx.config.height.max(1));
        let (color_texture, color_view, depth_texture, depth_view) =
            create_targets(&mut ctx.backend, &ctx.config, width, height)?;
        log::info!("Toon renderer targets created at {}x{}", width, height);
        Ok(Self {
            color_texture,
            color_view,
            depth_texture,
            depth_view,
            width,
            height,
        })
    }

    /// Recreate the attachments for a new framebuffer size. Zero sizes are ignored.
    pub fn resize<B: GraphicsBackend>(
        &mut self,
        ctx: &mut RenderContext<B>,
        width: u32,
        height: u32,
    ) -> RenderResult<()> {
        if width == 0 || height == 0 || (width, height) == (self.width, self.height) {
            return Ok(());
        }
        let (color_texture, color_view, depth_texture, depth_view) =
            create_targets(&mut ctx.backend, &ctx.config, width, height)?;
        self.release(&mut ctx.backend);
        self.color_texture = color_texture;
        self.color_view = color_view;
        self.depth_texture = depth_texture;
        self.depth_view = depth_view;
        self.width = width;
        self.height = height;
        ctx.config.width = width;
        ctx.config.height = height;
        log::debug!("Resized toon renderer to {}x{}", width, height);
        Ok(())
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Colour target the main pass renders into
    pub fn color_texture(&self) -> TextureHandle {
        self.color_texture
    }

    pub fn color_view(&self) -> TextureViewHandle {
        self.color_view
    }

    pub fn depth_view(&self) -> TextureViewHandle {
        self.depth_view
    }

    /// Record and submit one frame.
    ///
    /// All uniforms are written before the first pass begins. Shadow
    /// cascades are rendered only when `shadows` is enabled; every model then
    /// draws its colour, edge and ground-shadow submeshes in that order, with
    /// the bind state reset between models.
    pub fn render_frame<B: GraphicsBackend>(
        &self,
        ctx: &mut RenderContext<B>,
        models: &[ToonModel],
        camera: &Camera,
        light: &DirectionalLight,
        shadows: Option<&dyn ShadowMapProvider>,
    ) -> RenderResult<FrameStats> {
        let frame = FrameView {
            view: camera.view_matrix(),
            projection: camera.projection_matrix(),
            light: *light,
            width: self.width,
            height: self.height,
        };
        let mut stats = FrameStats::default();

        ctx.backend.begin_frame();

        for model in models {
            model
                .drawer
                .prepare(ctx, &model.mesh, model.transform.matrix(), &frame, shadows);
        }

        if let Some(shadows) = shadows.filter(|s| s.enabled()) {
            for index in 0..shadows.cascade_count() {
                let Some(cascade) = shadows.cascade(index) else {
                    continue;
                };
                ctx.backend.begin_render_pass(&RenderPassDescriptor {
                    label: Some(format!("Shadow Cascade {index}")),
                    color_attachment: None,
                    depth_stencil_attachment: DepthStencilAttachment {
                        view: cascade.depth_view,
                        depth_clear_value: 1.0,
                        stencil_clear_value: None,
                    },
                });
                ctx.state.begin_pass();
                let before = ctx.state.draw_count();
                let result = models
                    .iter()
                    .try_for_each(|model| model.drawer.draw_shadow_caster(ctx, &model.mesh, index));
                ctx.backend.end_render_pass();
                result?;
                stats.shadow_draws += ctx.state.draw_count() - before;
            }
        }

        let stencil_clear_value = ctx.config.depth_format.has_stencil().then_some(0);
        ctx.backend.begin_render_pass(&RenderPassDescriptor {
            label: Some("Main Pass".into()),
            color_attachment: Some(ColorAttachment {
                view: self.color_view,
                clear_color: ctx.config.clear_color,
            }),
            depth_stencil_attachment: DepthStencilAttachment {
                view: self.depth_view,
                depth_clear_value: 1.0,
                stencil_clear_value,
            },
        });
        ctx.state.begin_pass();
        ctx.backend
            .set_viewport(0.0, 0.0, self.width as f32, self.height as f32);

        let result = models
            .iter()
            .try_for_each(|model| Self::draw_model(ctx, model, &mut stats));
        ctx.backend.end_render_pass();
        result?;

        ctx.backend.end_frame()?;
        log::trace!("Frame recorded: {:?}", stats);
        Ok(stats)
    }

    fn draw_model<B: GraphicsBackend>(
        ctx: &mut RenderContext<B>,
        model: &ToonModel,
        stats: &mut FrameStats,
    ) -> RenderResult<()> {
        ctx.state.reset(&mut ctx.backend);

        let before = ctx.state.draw_count();
        model.drawer.draw_color(ctx, &model.mesh)?;
        let after_color = ctx.state.draw_count();
        model.drawer.draw_edge(ctx, &model.mesh)?;
        let after_edge = ctx.state.draw_count();
        model.drawer.draw_ground_shadow(ctx, &model.mesh)?;
        let after_ground = ctx.state.draw_count();

        stats.color_draws += after_color - before;
        stats.edge_draws += after_edge - after_color;
        stats.ground_shadow_draws += after_ground - after_edge;
        Ok(())
    }

    fn release<B: GraphicsBackend + ?Sized>(&self, backend: &mut B) {
        backend.destroy_texture_view(self.color_view);
        backend.destroy_texture(self.color_texture);
        backend.destroy_texture_view(self.depth_view);
        backend.destroy_texture(self.depth_texture);
    }

    pub fn destroy<B: GraphicsBackend + ?Sized>(self, backend: &mut B) {
        self.release(backend);
    }
}

fn create_targets<B: GraphicsBackend + ?Sized>(
    backend: &mut B,
    config: &crate::RendererConfig,
    width: u32,
    height: u32,
) -> RenderResult<(TextureHandle, TextureViewHandle, TextureHandle, TextureViewHandle)> {
    let color_texture = backend.create_texture(&TextureDescriptor {
        label: Some("Main Color".into()),
        width,
        height,
        mip_levels: 1,
        format: config.color_format,
        usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_SRC,
    })?;
    let color_view = match backend.create_texture_view(color_texture) {
        Ok(view) => view,
        Err(e) => {
            backend.destroy_texture(color_texture);
            return Err(e.into());
        }
    };

    let depth = backend
        .create_texture(&TextureDescriptor {
            label: Some("Main Depth Stencil".into()),
            width,
            height,
            mip_levels: 1,
            format: config.depth_format,
            usage: TextureUsage::RENDER_ATTACHMENT,
        })
        .and_then(|texture| match backend.create_texture_view(texture) {
            Ok(view) => Ok((texture, view)),
            Err(e) => {
                backend.destroy_texture(texture);
                Err(e)
            }
        });
    match depth {
        Ok((depth_texture, depth_view)) => Ok((color_texture, color_view, depth_texture, depth_view)),
        Err(e) => {
            backend.destroy_texture_view(color_view);
            backend.destroy_texture(color_texture);
            Err(e.into())
        }
    }
}
