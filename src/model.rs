//! A renderable model: GPU mesh, draw bindings and world transform

use crate::animation::FrameTick;
use crate::backend::GraphicsBackend;
use crate::context::RenderContext;
use crate::error::RenderResult;
use crate::pipeline::ModelDrawer;
use crate::resources::{AnimatedModel, GpuMeshResource};
use crate::scene::Transform;
use crate::shadow::ShadowMapProvider;

pub struct ToonModel {
    pub mesh: GpuMeshResource,
    pub drawer: ModelDrawer,
    pub transform: Transform,
}

impl ToonModel {
    /// Upload `model` and build its bindings.
    ///
    /// The colour pass samples the cascades `shadows` holds now. Frames
    /// rendered with a provider whose cascades were not bound here get
    /// receiver shadows switched off for those cascades until
    /// [`rebind_shadows`](Self::rebind_shadows) runs.
    pub fn create<B: GraphicsBackend>(
        ctx: &mut RenderContext<B>,
        model: Box<dyn AnimatedModel>,
        shadows: Option<&dyn ShadowMapProvider>,
    ) -> RenderResult<Self> {
        let mesh = GpuMeshResource::create(&mut ctx.backend, &mut ctx.textures, model)?;
        match ModelDrawer::create(ctx, &mesh, shadows) {
            Ok(drawer) => Ok(Self {
                mesh,
                drawer,
                transform: Transform::default(),
            }),
            Err(e) => {
                mesh.destroy(&mut ctx.backend, &mut ctx.textures);
                Err(e)
            }
        }
    }

    /// Sample the cascades of `shadows` from the next frame on
    pub fn rebind_shadows<B: GraphicsBackend>(
        &mut self,
        ctx: &mut RenderContext<B>,
        shadows: Option<&dyn ShadowMapProvider>,
    ) -> RenderResult<()> {
        self.drawer.rebind_shadows(ctx, shadows)
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// Advance to the tick's animation time
    pub fn update<B: GraphicsBackend>(
        &mut self,
        ctx: &mut RenderContext<B>,
        tick: FrameTick,
    ) -> RenderResult<()> {
        self.mesh.update(&mut ctx.backend, tick.anim_time, tick.elapsed)
    }

    pub fn refresh_pose<B: GraphicsBackend>(&mut self, ctx: &mut RenderContext<B>) -> RenderResult<()> {
        self.mesh.refresh_pose(&mut ctx.backend)
    }

    pub fn destroy<B: GraphicsBackend>(self, ctx: &mut RenderContext<B>) {
        self.drawer.destroy(&mut ctx.backend);
        self.mesh.destroy(&mut ctx.backend, &mut ctx.textures);
    }
}
