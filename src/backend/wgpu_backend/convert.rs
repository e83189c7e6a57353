//! Backend descriptor types to their wgpu counterparts

use crate::backend::types::*;
use crate::backend::{BindingType, IndexFormat};

impl From<TextureFormat> for wgpu::TextureFormat {
    fn from(format: TextureFormat) -> Self {
        match format {
            TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
            TextureFormat::Depth24PlusStencil8 => wgpu::TextureFormat::Depth24PlusStencil8,
        }
    }
}

impl From<BufferUsage> for wgpu::BufferUsages {
    fn from(usage: BufferUsage) -> Self {
        [
            (BufferUsage::COPY_DST, wgpu::BufferUsages::COPY_DST),
            (BufferUsage::INDEX, wgpu::BufferUsages::INDEX),
            (BufferUsage::VERTEX, wgpu::BufferUsages::VERTEX),
            (BufferUsage::UNIFORM, wgpu::BufferUsages::UNIFORM),
        ]
        .into_iter()
        .filter(|(flag, _)| usage.contains(*flag))
        .fold(wgpu::BufferUsages::empty(), |acc, (_, bits)| acc | bits)
    }
}

impl From<TextureUsage> for wgpu::TextureUsages {
    fn from(usage: TextureUsage) -> Self {
        [
            (TextureUsage::COPY_SRC, wgpu::TextureUsages::COPY_SRC),
            (TextureUsage::COPY_DST, wgpu::TextureUsages::COPY_DST),
            (TextureUsage::TEXTURE_BINDING, wgpu::TextureUsages::TEXTURE_BINDING),
            (TextureUsage::RENDER_ATTACHMENT, wgpu::TextureUsages::RENDER_ATTACHMENT),
        ]
        .into_iter()
        .filter(|(flag, _)| usage.contains(*flag))
        .fold(wgpu::TextureUsages::empty(), |acc, (_, bits)| acc | bits)
    }
}

impl From<VertexFormat> for wgpu::VertexFormat {
    fn from(format: VertexFormat) -> Self {
        match format {
            VertexFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
            VertexFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
            VertexFormat::Float32x4 => wgpu::VertexFormat::Float32x4,
        }
    }
}

impl From<IndexFormat> for wgpu::IndexFormat {
    fn from(format: IndexFormat) -> Self {
        match format {
            IndexFormat::Uint16 => wgpu::IndexFormat::Uint16,
            IndexFormat::Uint32 => wgpu::IndexFormat::Uint32,
        }
    }
}

impl From<CullMode> for Option<wgpu::Face> {
    fn from(mode: CullMode) -> Self {
        match mode {
            CullMode::None => None,
            CullMode::Front => Some(wgpu::Face::Front),
            CullMode::Back => Some(wgpu::Face::Back),
        }
    }
}

impl From<CompareFunction> for wgpu::CompareFunction {
    fn from(func: CompareFunction) -> Self {
        match func {
            CompareFunction::Less => wgpu::CompareFunction::Less,
            CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
            CompareFunction::NotEqual => wgpu::CompareFunction::NotEqual,
            CompareFunction::Always => wgpu::CompareFunction::Always,
        }
    }
}

impl From<StencilOperation> for wgpu::StencilOperation {
    fn from(op: StencilOperation) -> Self {
        match op {
            StencilOperation::Keep => wgpu::StencilOperation::Keep,
            StencilOperation::Replace => wgpu::StencilOperation::Replace,
        }
    }
}

impl From<StencilState> for wgpu::StencilState {
    fn from(state: StencilState) -> Self {
        let face = wgpu::StencilFaceState {
            compare: state.face.compare.into(),
            fail_op: state.face.fail_op.into(),
            depth_fail_op: state.face.depth_fail_op.into(),
            pass_op: state.face.pass_op.into(),
        };
        wgpu::StencilState {
            front: face,
            back: face,
            read_mask: state.read_mask,
            write_mask: state.write_mask,
        }
    }
}

impl From<BlendFactor> for wgpu::BlendFactor {
    fn from(factor: BlendFactor) -> Self {
        match factor {
            BlendFactor::Zero => wgpu::BlendFactor::Zero,
            BlendFactor::One => wgpu::BlendFactor::One,
            BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
            BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        }
    }
}

impl From<BlendState> for wgpu::BlendState {
    fn from(state: BlendState) -> Self {
        let component = |c: BlendComponent| wgpu::BlendComponent {
            src_factor: c.src_factor.into(),
            dst_factor: c.dst_factor.into(),
            operation: wgpu::BlendOperation::Add,
        };
        wgpu::BlendState {
            color: component(state.color),
            alpha: component(state.alpha),
        }
    }
}

impl From<FilterMode> for wgpu::FilterMode {
    fn from(mode: FilterMode) -> Self {
        match mode {
            FilterMode::Nearest => wgpu::FilterMode::Nearest,
            FilterMode::Linear => wgpu::FilterMode::Linear,
        }
    }
}

impl From<AddressMode> for wgpu::AddressMode {
    fn from(mode: AddressMode) -> Self {
        match mode {
            AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
            AddressMode::Repeat => wgpu::AddressMode::Repeat,
        }
    }
}

impl From<BindingType> for wgpu::BindingType {
    fn from(ty: BindingType) -> Self {
        match ty {
            BindingType::UniformBuffer => wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            BindingType::Texture { depth } => wgpu::BindingType::Texture {
                sample_type: if depth {
                    wgpu::TextureSampleType::Depth
                } else {
                    wgpu::TextureSampleType::Float { filterable: true }
                },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            BindingType::Sampler { comparison: true } => {
                wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison)
            }
            BindingType::Sampler { comparison: false } => {
                wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering)
            }
        }
    }
}

pub(super) fn clear_color(color: [f32; 4]) -> wgpu::Color {
    wgpu::Color {
        r: color[0] as f64,
        g: color[1] as f64,
        b: color[2] as f64,
        a: color[3] as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_flags_map_bit_by_bit() {
        let usage: wgpu::BufferUsages = (BufferUsage::UNIFORM | BufferUsage::COPY_DST).into();
        assert_eq!(usage, wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST);

        let usage: wgpu::TextureUsages =
            (TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING).into();
        assert!(usage.contains(wgpu::TextureUsages::TEXTURE_BINDING));
        assert!(!usage.contains(wgpu::TextureUsages::COPY_DST));
    }

    #[test]
    fn test_stencil_applies_to_both_faces() {
        let state = StencilState {
            face: StencilFaceState {
                compare: CompareFunction::NotEqual,
                fail_op: StencilOperation::Keep,
                depth_fail_op: StencilOperation::Keep,
                pass_op: StencilOperation::Replace,
            },
            read_mask: 0xff,
            write_mask: 0xff,
        };
        let converted: wgpu::StencilState = state.into();
        assert_eq!(converted.front, converted.back);
        assert_eq!(converted.front.pass_op, wgpu::StencilOperation::Replace);
    }
}
