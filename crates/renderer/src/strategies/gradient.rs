use std::sync::Arc;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use frameloop_rhi::command::CommandBuffer;
use frameloop_rhi::device::Device;
use frameloop_rhi::pipeline::{CullMode, GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use frameloop_rhi::shader::{Shader, ShaderStage, compile_wgsl};
use frameloop_rhi::{RhiError, RhiResult};
use tracing::debug;

use crate::frame::FrameInfo;
use crate::frame_manager::FrameManager;
use crate::strategy::{PipelineTarget, RenderStrategy, full_scissor, full_viewport};

const GRADIENT_SHADER: &str = r#"
struct GradientParams {
    time: f32,
    aspect: f32,
}

var<push_constant> params: GradientParams;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

// One triangle covering the whole viewport.
@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    let uv = vec2<f32>(f32((vertex_index << 1u) & 2u), f32(vertex_index & 2u));
    var output: VertexOutput;
    output.position = vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
    output.uv = uv;
    return output;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let p = vec2<f32>((input.uv.x - 0.5) * params.aspect, input.uv.y - 0.5);
    let t = params.time * 0.5 + length(p) * 3.0 + input.uv.x;
    let rgb = vec3<f32>(0.5) + 0.5 * cos(vec3<f32>(t) + vec3<f32>(0.0, 2.094, 4.189));
    return vec4<f32>(rgb, 1.0);
}
"#;

/// Push constants shared by both gradient stages.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
struct GradientParams {
    time: f32,
    aspect: f32,
}

impl GradientParams {
    fn for_frame(elapsed_secs: f32, extent: vk::Extent2D) -> Self {
        let aspect = if extent.height == 0 {
            1.0
        } else {
            extent.width as f32 / extent.height as f32
        };
        Self {
            time: elapsed_secs,
            aspect,
        }
    }
}

const PUSH_STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::from_raw(
    vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw(),
);

/// Graphics only: an animated color field drawn as one full-screen triangle.
#[derive(Default)]
pub struct GradientStrategy {
    device: Option<Arc<Device>>,
    vertex_code: Vec<u32>,
    fragment_code: Vec<u32>,
    layout: Option<PipelineLayout>,
    pipeline: Option<Pipeline>,
    params: GradientParams,
}

impl GradientStrategy {
    pub const NAME: &'static str = "gradient";

    pub fn new() -> Self {
        Self::default()
    }
}

impl RenderStrategy<FrameManager> for GradientStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn initialize(&mut self, backend: &FrameManager) -> RhiResult<()> {
        let device = backend.device().clone();

        self.vertex_code = compile_wgsl(GRADIENT_SHADER, ShaderStage::Vertex, "vs_main")?;
        self.fragment_code = compile_wgsl(GRADIENT_SHADER, ShaderStage::Fragment, "fs_main")?;

        let push_range = vk::PushConstantRange {
            stage_flags: PUSH_STAGES,
            offset: 0,
            size: std::mem::size_of::<GradientParams>() as u32,
        };
        self.layout = Some(PipelineLayout::new(device.clone(), &[], &[push_range])?);
        self.device = Some(device);

        debug!("Gradient strategy initialized");
        Ok(())
    }

    fn rebuild_pipeline(&mut self, target: &PipelineTarget) -> RhiResult<()> {
        let (Some(device), Some(layout)) = (&self.device, &self.layout) else {
            return Err(RhiError::InvalidHandle(
                "Gradient strategy is not initialized".to_string(),
            ));
        };

        let vertex = Shader::from_spirv(
            device.clone(),
            &self.vertex_code,
            ShaderStage::Vertex,
            "vs_main",
        )?;
        let fragment = Shader::from_spirv(
            device.clone(),
            &self.fragment_code,
            ShaderStage::Fragment,
            "fs_main",
        )?;

        let pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(&vertex)
            .fragment_shader(&fragment)
            .cull_mode(CullMode::None)
            .depth_test_enable(false)
            .depth_write_enable(false)
            .render_pass(target.render_pass)
            .rasterization_samples(target.samples)
            .build(device.clone(), layout)?;

        self.pipeline = Some(pipeline);
        debug!(
            "Gradient pipeline built for {:?} at {:?}",
            target.color_format, target.samples
        );
        Ok(())
    }

    fn step_update(&mut self, frame: &FrameInfo) -> RhiResult<()> {
        self.params = GradientParams::for_frame(frame.elapsed_secs, frame.extent);
        Ok(())
    }

    fn record_draw(&mut self, cmd: &CommandBuffer, frame: &FrameInfo) -> RhiResult<()> {
        let (Some(pipeline), Some(layout)) = (&self.pipeline, &self.layout) else {
            return Err(RhiError::InvalidHandle(
                "Gradient pipeline has not been built".to_string(),
            ));
        };

        cmd.bind_pipeline(pipeline.bind_point(), pipeline.handle());
        cmd.set_viewport(&full_viewport(frame.extent));
        cmd.set_scissor(&full_scissor(frame.extent));
        cmd.push_constants(layout.handle(), PUSH_STAGES, 0, &self.params);
        cmd.draw(3, 1, 0, 0);
        Ok(())
    }

    fn shutdown(&mut self, _backend: &FrameManager) {
        self.pipeline = None;
        self.layout = None;
        self.device = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gradient_shader_compiles() {
        assert!(compile_wgsl(GRADIENT_SHADER, ShaderStage::Vertex, "vs_main").is_ok());
        assert!(compile_wgsl(GRADIENT_SHADER, ShaderStage::Fragment, "fs_main").is_ok());
    }

    #[test]
    fn test_params_aspect_follows_extent() {
        let params = GradientParams::for_frame(
            2.5,
            vk::Extent2D {
                width: 1600,
                height: 800,
            },
        );
        assert_eq!(params.time, 2.5);
        assert_eq!(params.aspect, 2.0);
    }

    #[test]
    fn test_params_zero_height_keeps_unit_aspect() {
        let params = GradientParams::for_frame(
            0.0,
            vk::Extent2D {
                width: 640,
                height: 0,
            },
        );
        assert_eq!(params.aspect, 1.0);
    }

    #[test]
    fn test_push_constant_block_size() {
        assert_eq!(std::mem::size_of::<GradientParams>(), 8);
    }

    #[test]
    fn test_gradient_has_no_compute_phase() {
        let strategy = GradientStrategy::new();
        assert!(!RenderStrategy::<FrameManager>::needs_compute(&strategy));
        assert_eq!(
            RenderStrategy::<FrameManager>::descriptor_pool_needs(&strategy).max_sets,
            0
        );
    }

    #[test]
    fn test_rebuild_before_initialize_fails() {
        let mut strategy = GradientStrategy::new();
        let target = PipelineTarget {
            render_pass: vk::RenderPass::null(),
            color_format: vk::Format::B8G8R8A8_SRGB,
            depth_format: vk::Format::D32_SFLOAT,
            samples: vk::SampleCountFlags::TYPE_1,
            extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
        };
        assert!(matches!(
            RenderStrategy::<FrameManager>::rebuild_pipeline(&mut strategy, &target),
            Err(RhiError::InvalidHandle(_))
        ));
    }
}
