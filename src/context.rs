//! Render context threaded through every setup and draw call

use crate::backend::*;
use crate::error::RenderResult;
use crate::pipeline::{PipelineCache, RenderStateTracker, TargetFormats};
use crate::resources::{TextureCache, TextureData};
use crate::shader::{
    ShaderDefines, ShaderSourceResolver, ShaderVariantCache, SHADOW_CASCADE_COUNT_DEFINE,
    SHADOW_MAP_DEFINE,
};
use crate::shadow::{MAX_SHADOW_CASCADES, SHADOW_MAP_FORMAT};
use crate::RendererConfig;

/// Fallback textures and the shared samplers
pub struct DefaultResources {
    /// 1x1 opaque white, bound in every unbound colour slot
    pub white_texture: TextureHandle,
    pub white_view: TextureViewHandle,
    /// 1x1 depth texture, bound in every unused cascade slot
    pub dummy_depth: TextureHandle,
    pub dummy_depth_view: TextureViewHandle,
    pub base_sampler: SamplerHandle,
    pub sphere_sampler: SamplerHandle,
    pub toon_sampler: SamplerHandle,
    pub shadow_sampler: SamplerHandle,
}

impl DefaultResources {
    pub fn new<B: GraphicsBackend + ?Sized>(backend: &mut B) -> RenderResult<Self> {
        let white = TextureData::white();
        let white_texture = backend.create_texture(&TextureDescriptor {
            label: Some("Default White".into()),
            ..Default::default()
        })?;
        backend.write_texture(white_texture, 0, &white.data, white.width, white.height);
        let white_view = backend.create_texture_view(white_texture)?;

        let dummy_depth = backend.create_texture(&TextureDescriptor {
            label: Some("Default Shadow Depth".into()),
            format: SHADOW_MAP_FORMAT,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::RENDER_ATTACHMENT,
            ..Default::default()
        })?;
        let dummy_depth_view = backend.create_texture_view(dummy_depth)?;

        let base_sampler = backend.create_sampler(&SamplerDescriptor {
            label: Some("Base Sampler".into()),
            address_mode_u: AddressMode::Repeat,
            address_mode_v: AddressMode::Repeat,
            ..Default::default()
        })?;
        let sphere_sampler = backend.create_sampler(&SamplerDescriptor {
            label: Some("Sphere Sampler".into()),
            ..Default::default()
        })?;
        let toon_sampler = backend.create_sampler(&SamplerDescriptor {
            label: Some("Toon Sampler".into()),
            mipmap_filter: FilterMode::Nearest,
            ..Default::default()
        })?;
        let shadow_sampler = backend.create_sampler(&SamplerDescriptor {
            label: Some("Shadow Sampler".into()),
            mipmap_filter: FilterMode::Nearest,
            compare: Some(CompareFunction::LessEqual),
            ..Default::default()
        })?;

        Ok(Self {
            white_texture,
            white_view,
            dummy_depth,
            dummy_depth_view,
            base_sampler,
            sphere_sampler,
            toon_sampler,
            shadow_sampler,
        })
    }

    pub fn destroy<B: GraphicsBackend + ?Sized>(self, backend: &mut B) {
        backend.destroy_texture_view(self.white_view);
        backend.destroy_texture(self.white_texture);
        backend.destroy_texture_view(self.dummy_depth_view);
        backend.destroy_texture(self.dummy_depth);
    }
}

/// Everything a frame needs besides the models themselves.
///
/// There are no process-wide singletons; the backend, shader variants,
/// textures and pipelines all live here and are passed explicitly.
pub struct RenderContext<B: GraphicsBackend> {
    pub backend: B,
    pub shaders: ShaderVariantCache,
    pub textures: TextureCache,
    pub pipelines: PipelineCache,
    pub state: RenderStateTracker,
    pub defaults: DefaultResources,
    pub config: RendererConfig,
}

impl<B: GraphicsBackend> RenderContext<B> {
    /// Context with the built-in shaders and textures loaded from disk
    pub fn new(backend: B, config: RendererConfig) -> RenderResult<Self> {
        Self::with_sources(
            backend,
            config,
            ShaderVariantCache::with_builtin_sources(),
            TextureCache::with_file_loader(),
        )
    }

    pub fn with_sources(
        mut backend: B,
        config: RendererConfig,
        shaders: ShaderVariantCache,
        textures: TextureCache,
    ) -> RenderResult<Self> {
        let defaults = DefaultResources::new(&mut backend)?;
        log::info!(
            "Render context ready ({}x{}, shadows: {}, ground shadow: {})",
            config.width,
            config.height,
            config.shadow.enabled,
            config.ground_shadow.enabled
        );
        Ok(Self {
            backend,
            shaders,
            textures,
            pipelines: PipelineCache::new(),
            state: RenderStateTracker::new(),
            defaults,
            config,
        })
    }

    /// Context resolving shaders through `resolver`
    pub fn with_resolver(
        backend: B,
        config: RendererConfig,
        resolver: Box<dyn ShaderSourceResolver>,
    ) -> RenderResult<Self> {
        Self::with_sources(
            backend,
            config,
            ShaderVariantCache::new(resolver),
            TextureCache::with_file_loader(),
        )
    }

    /// Define set of the opaque family for the configured shadow settings
    pub fn opaque_defines(&self) -> ShaderDefines {
        let shadow = &self.config.shadow;
        if shadow.enabled {
            ShaderDefines::new().with(SHADOW_MAP_DEFINE, "").with(
                SHADOW_CASCADE_COUNT_DEFINE,
                shadow.cascade_count.clamp(1, MAX_SHADOW_CASCADES),
            )
        } else {
            ShaderDefines::new()
        }
    }

    /// Formats of the main colour pass
    pub fn main_targets(&self) -> TargetFormats {
        TargetFormats {
            color: Some(self.config.color_format),
            depth: self.config.depth_format,
        }
    }

    /// Formats of a shadow cascade pass
    pub fn shadow_targets(&self) -> TargetFormats {
        TargetFormats {
            color: None,
            depth: SHADOW_MAP_FORMAT,
        }
    }

    /// Release the default resources and hand the backend back
    pub fn into_backend(mut self) -> B {
        self.defaults.destroy(&mut self.backend);
        self.backend
    }
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;

    #[test]
    fn test_defaults_are_created() {
        let ctx = RenderContext::new(DummyBackend::new(), RendererConfig::default()).unwrap();
        assert_eq!(ctx.backend.live_texture_count(), 2);
        assert_eq!(ctx.backend.sampler_count(), 4);
        assert_eq!(ctx.backend.texture_writes(ctx.defaults.white_texture), vec![0]);
    }

    #[test]
    fn test_opaque_defines_follow_shadow_config() {
        let mut config = RendererConfig::default();
        let ctx = RenderContext::new(DummyBackend::new(), config.clone()).unwrap();
        let defines = ctx.opaque_defines();
        assert!(defines.is_defined(SHADOW_MAP_DEFINE));
        assert_eq!(defines.get(SHADOW_CASCADE_COUNT_DEFINE), Some("4"));

        config.shadow.enabled = false;
        let ctx = RenderContext::new(DummyBackend::new(), config).unwrap();
        assert!(ctx.opaque_defines().is_empty());
    }
}
