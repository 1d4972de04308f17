use std::sync::Arc;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use frameloop_rhi::buffer::{Buffer, BufferKind};
use frameloop_rhi::command::CommandBuffer;
use frameloop_rhi::descriptor::{
    DescriptorPoolRequirement, DescriptorSetLayout, buffer_info, storage_buffer_binding,
    uniform_buffer_binding, update_descriptor_sets,
};
use frameloop_rhi::device::Device;
use frameloop_rhi::pipeline::{
    BlendMode, CullMode, GraphicsPipelineBuilder, Pipeline, PipelineLayout,
};
use frameloop_rhi::shader::{Shader, ShaderStage, compile_wgsl};
use frameloop_rhi::{RhiError, RhiResult};
use glam::{Vec2, Vec3};
use tracing::{debug, error, info};

use crate::frame::FrameInfo;
use crate::frame_manager::FrameManager;
use crate::strategy::{PipelineTarget, RenderStrategy, full_scissor, full_viewport};

const PARTICLE_COUNT: u32 = 4096;

/// Must match `@workgroup_size` in [`SIMULATE_SHADER`].
const WORKGROUP_SIZE: u32 = 256;

/// Initial speed in NDC units per second.
const PARTICLE_SPEED: f32 = 0.25;

/// Radius of the disk the particles start in.
const SPAWN_RADIUS: f32 = 0.25;

/// Half the side of a particle quad, in NDC height units.
const POINT_SIZE: f32 = 0.006;

const GOLDEN_ANGLE: f32 = 2.399_963;

const SIMULATE_SHADER: &str = r#"
struct Particle {
    position: vec2<f32>,
    velocity: vec2<f32>,
    color: vec4<f32>,
}

struct SimParams {
    delta_time: f32,
    particle_count: u32,
    padding: vec2<f32>,
}

@group(0) @binding(0) var<uniform> params: SimParams;
@group(0) @binding(1) var<storage, read> particles_in: array<Particle>;
@group(0) @binding(2) var<storage, read_write> particles_out: array<Particle>;

@compute @workgroup_size(256)
fn cs_main(@builtin(global_invocation_id) id: vec3<u32>) {
    let index = id.x;
    if (index >= params.particle_count) {
        return;
    }

    var particle = particles_in[index];
    particle.position = particle.position + particle.velocity * params.delta_time;

    // Bounce off the viewport edges.
    if (abs(particle.position.x) >= 1.0) {
        particle.velocity.x = -particle.velocity.x;
        particle.position.x = clamp(particle.position.x, -1.0, 1.0);
    }
    if (abs(particle.position.y) >= 1.0) {
        particle.velocity.y = -particle.velocity.y;
        particle.position.y = clamp(particle.position.y, -1.0, 1.0);
    }

    particles_out[index] = particle;
}
"#;

const DRAW_SHADER: &str = r#"
struct ViewParams {
    aspect: f32,
    point_size: f32,
}

var<push_constant> view: ViewParams;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) color: vec4<f32>,
    @location(1) local: vec2<f32>,
}

@vertex
fn vs_main(
    @builtin(vertex_index) vertex_index: u32,
    @location(0) center: vec2<f32>,
    @location(1) color: vec4<f32>,
) -> VertexOutput {
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, 1.0),
    );
    let corner = corners[vertex_index];
    let offset = corner * view.point_size * vec2<f32>(1.0 / view.aspect, 1.0);

    var output: VertexOutput;
    output.position = vec4<f32>(center + offset, 0.0, 1.0);
    output.color = color;
    output.local = corner;
    return output;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let radius = length(input.local);
    if (radius > 1.0) {
        discard;
    }
    return vec4<f32>(input.color.rgb, input.color.a * (1.0 - radius));
}
"#;

/// One simulated particle, as laid out in the storage buffers and read as
/// per-instance vertex input.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Particle {
    pub position: [f32; 2],
    pub velocity: [f32; 2],
    pub color: [f32; 4],
}

impl Particle {
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Particle>() as u32,
            input_rate: vk::VertexInputRate::INSTANCE,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: std::mem::offset_of!(Particle, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: std::mem::offset_of!(Particle, color) as u32,
            },
        ]
    }
}

/// Uniform block read by the simulation pass.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
struct SimParams {
    delta_time: f32,
    particle_count: u32,
    _padding: [f32; 2],
}

/// Push constants for the draw pass.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
struct ViewParams {
    aspect: f32,
    point_size: f32,
}

/// Particles spread over a disk on a golden-angle spiral, each moving
/// straight away from the center.
fn initial_particles(count: u32) -> Vec<Particle> {
    (0..count)
        .map(|i| {
            let t = (i as f32 + 0.5) / count as f32;
            let direction = Vec2::from_angle(i as f32 * GOLDEN_ANGLE);
            let position = direction * SPAWN_RADIUS * t.sqrt();
            let velocity = direction * PARTICLE_SPEED;

            let phase = Vec3::splat(t * std::f32::consts::TAU) + Vec3::new(0.0, 2.094, 4.189);
            let rgb = Vec3::splat(0.5)
                + 0.5 * Vec3::new(phase.x.cos(), phase.y.cos(), phase.z.cos());

            Particle {
                position: position.to_array(),
                velocity: velocity.to_array(),
                color: rgb.extend(1.0).to_array(),
            }
        })
        .collect()
}

/// Slot whose storage buffer the compute pass of `slot` reads from.
fn input_slot(slot: usize, frames_in_flight: usize) -> usize {
    (slot + frames_in_flight - 1) % frames_in_flight
}

fn workgroup_count(particle_count: u32) -> u32 {
    particle_count.div_ceil(WORKGROUP_SIZE)
}

/// Compute-driven particle system.
///
/// Each frame slot owns one storage buffer. The compute pass of slot `i`
/// integrates the particles found in slot `i - 1`'s buffer and writes the
/// result into its own. The graphics pass binds that buffer as per-instance
/// vertex input and draws one quad per particle, so it waits on the compute
/// pass at `VERTEX_INPUT`.
pub struct ParticlesStrategy {
    frames_in_flight: usize,
    particle_count: u32,
    device: Option<Arc<Device>>,

    // Field order is drop order.
    draw_pipeline: Option<Pipeline>,
    draw_layout: Option<PipelineLayout>,
    compute_pipeline: Option<Pipeline>,
    compute_layout: Option<PipelineLayout>,
    set_layout: Option<DescriptorSetLayout>,
    descriptor_sets: Vec<vk::DescriptorSet>,
    storage_buffers: Vec<Buffer>,
    uniform_buffers: Vec<Buffer>,

    vertex_code: Vec<u32>,
    fragment_code: Vec<u32>,
    view: ViewParams,
}

impl ParticlesStrategy {
    pub const NAME: &'static str = "particles";

    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            frames_in_flight,
            particle_count: PARTICLE_COUNT,
            device: None,
            draw_pipeline: None,
            draw_layout: None,
            compute_pipeline: None,
            compute_layout: None,
            set_layout: None,
            descriptor_sets: Vec::new(),
            storage_buffers: Vec::new(),
            uniform_buffers: Vec::new(),
            vertex_code: Vec::new(),
            fragment_code: Vec::new(),
            view: ViewParams::default(),
        }
    }

    fn storage_size(&self) -> vk::DeviceSize {
        (self.particle_count as usize * std::mem::size_of::<Particle>()) as vk::DeviceSize
    }

    /// Fills every slot's storage buffer with the initial particles.
    fn upload_initial_particles(&self, backend: &FrameManager) -> RhiResult<()> {
        let particles = initial_particles(self.particle_count);
        let staging = Buffer::new(
            backend.device().clone(),
            BufferKind::Staging,
            self.storage_size(),
            "particle staging",
        )?;
        staging.write(0, bytemuck::cast_slice(&particles))?;

        backend.submit_single_time(|cmd| {
            for buffer in &self.storage_buffers {
                cmd.copy_buffer(staging.handle(), buffer.handle(), staging.size());
            }
            Ok(())
        })
    }

    fn write_descriptor_sets(&self, device: &Device) {
        let uniform_infos: Vec<_> = self
            .uniform_buffers
            .iter()
            .map(|buffer| buffer_info(buffer.handle(), 0, vk::WHOLE_SIZE))
            .collect();
        let storage_infos: Vec<_> = self
            .storage_buffers
            .iter()
            .map(|buffer| buffer_info(buffer.handle(), 0, vk::WHOLE_SIZE))
            .collect();

        let mut writes = Vec::with_capacity(self.descriptor_sets.len() * 3);
        for (slot, &set) in self.descriptor_sets.iter().enumerate() {
            let input = input_slot(slot, self.frames_in_flight);
            writes.push(
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(0)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(std::slice::from_ref(&uniform_infos[slot])),
            );
            writes.push(
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(1)
                    .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                    .buffer_info(std::slice::from_ref(&storage_infos[input])),
            );
            writes.push(
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(2)
                    .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                    .buffer_info(std::slice::from_ref(&storage_infos[slot])),
            );
        }
        update_descriptor_sets(device, &writes);
    }
}

impl RenderStrategy<FrameManager> for ParticlesStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn needs_compute(&self) -> bool {
        true
    }

    fn compute_consuming_stage(&self) -> vk::PipelineStageFlags {
        vk::PipelineStageFlags::VERTEX_INPUT
    }

    fn descriptor_pool_needs(&self) -> DescriptorPoolRequirement {
        let count = self.frames_in_flight as u32;
        DescriptorPoolRequirement::new(
            vec![
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::UNIFORM_BUFFER,
                    descriptor_count: count,
                },
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::STORAGE_BUFFER,
                    descriptor_count: count * 2,
                },
            ],
            count,
        )
    }

    fn initialize(&mut self, backend: &FrameManager) -> RhiResult<()> {
        let device = backend.device().clone();

        self.storage_buffers = (0..self.frames_in_flight)
            .map(|slot| {
                Buffer::new(
                    device.clone(),
                    BufferKind::Storage,
                    self.storage_size(),
                    &format!("particles slot {}", slot),
                )
            })
            .collect::<RhiResult<Vec<_>>>()?;

        self.uniform_buffers = (0..self.frames_in_flight)
            .map(|slot| {
                Buffer::new(
                    device.clone(),
                    BufferKind::Uniform,
                    std::mem::size_of::<SimParams>() as vk::DeviceSize,
                    &format!("particle params slot {}", slot),
                )
            })
            .collect::<RhiResult<Vec<_>>>()?;

        self.upload_initial_particles(backend)?;

        let set_layout = DescriptorSetLayout::new(
            device.clone(),
            &[
                uniform_buffer_binding(0, vk::ShaderStageFlags::COMPUTE),
                storage_buffer_binding(1, vk::ShaderStageFlags::COMPUTE),
                storage_buffer_binding(2, vk::ShaderStageFlags::COMPUTE),
            ],
        )?;

        let layouts = vec![set_layout.handle(); self.frames_in_flight];
        self.descriptor_sets = backend.descriptor_pool().allocate(&layouts)?;
        self.write_descriptor_sets(&device);

        let compute_layout = PipelineLayout::new(device.clone(), &[set_layout.handle()], &[])?;
        let simulate = Shader::from_wgsl(
            device.clone(),
            SIMULATE_SHADER,
            ShaderStage::Compute,
            "cs_main",
        )?;
        self.compute_pipeline = Some(Pipeline::compute(
            device.clone(),
            &simulate,
            &compute_layout,
        )?);

        let push_range = vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::VERTEX,
            offset: 0,
            size: std::mem::size_of::<ViewParams>() as u32,
        };
        self.draw_layout = Some(PipelineLayout::new(device.clone(), &[], &[push_range])?);
        self.vertex_code = compile_wgsl(DRAW_SHADER, ShaderStage::Vertex, "vs_main")?;
        self.fragment_code = compile_wgsl(DRAW_SHADER, ShaderStage::Fragment, "fs_main")?;

        self.compute_layout = Some(compute_layout);
        self.set_layout = Some(set_layout);
        self.device = Some(device);

        info!(
            "Particle strategy initialized: {} particles, {} slot(s)",
            self.particle_count, self.frames_in_flight
        );
        Ok(())
    }

    fn rebuild_pipeline(&mut self, target: &PipelineTarget) -> RhiResult<()> {
        let (Some(device), Some(layout)) = (&self.device, &self.draw_layout) else {
            return Err(RhiError::InvalidHandle(
                "Particle strategy is not initialized".to_string(),
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
            .vertex_binding(Particle::binding_description())
            .vertex_attributes(&Particle::attribute_descriptions())
            .cull_mode(CullMode::None)
            .depth_test_enable(false)
            .depth_write_enable(false)
            .blend_mode(BlendMode::Additive)
            .render_pass(target.render_pass)
            .rasterization_samples(target.samples)
            .build(device.clone(), layout)?;

        self.draw_pipeline = Some(pipeline);
        debug!(
            "Particle draw pipeline built for {:?} at {:?}",
            target.color_format, target.samples
        );
        Ok(())
    }

    fn step_update(&mut self, frame: &FrameInfo) -> RhiResult<()> {
        // The slot's previous graphics submission, and so its compute pass,
        // has completed by now.
        let params = SimParams {
            delta_time: frame.delta_secs,
            particle_count: self.particle_count,
            _padding: [0.0; 2],
        };
        let buffer = self.uniform_buffers.get(frame.slot).ok_or_else(|| {
            RhiError::InvalidHandle(format!("No particle params for slot {}", frame.slot))
        })?;
        buffer.write(0, bytemuck::bytes_of(&params))?;

        self.view = ViewParams {
            aspect: if frame.extent.height == 0 {
                1.0
            } else {
                frame.extent.width as f32 / frame.extent.height as f32
            },
            point_size: POINT_SIZE,
        };
        Ok(())
    }

    fn record_compute(&mut self, cmd: &CommandBuffer, frame: &FrameInfo) -> RhiResult<()> {
        let (Some(pipeline), Some(layout)) = (&self.compute_pipeline, &self.compute_layout) else {
            return Err(RhiError::InvalidHandle(
                "Particle compute pipeline is missing".to_string(),
            ));
        };
        let set = *self.descriptor_sets.get(frame.slot).ok_or_else(|| {
            RhiError::InvalidHandle(format!("No descriptor set for slot {}", frame.slot))
        })?;
        let input = self
            .storage_buffers
            .get(input_slot(frame.slot, self.frames_in_flight))
            .ok_or_else(|| RhiError::InvalidHandle("Particle buffers are missing".to_string()))?;

        // The previous slot's compute pass wrote this buffer in an earlier
        // submission.
        let read_after_write = vk::BufferMemoryBarrier::default()
            .src_access_mask(vk::AccessFlags::SHADER_WRITE)
            .dst_access_mask(vk::AccessFlags::SHADER_READ)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .buffer(input.handle())
            .offset(0)
            .size(vk::WHOLE_SIZE);
        cmd.pipeline_barrier_full(
            vk::PipelineStageFlags::COMPUTE_SHADER,
            vk::PipelineStageFlags::COMPUTE_SHADER,
            &[read_after_write],
            &[],
        );

        cmd.bind_pipeline(pipeline.bind_point(), pipeline.handle());
        cmd.bind_descriptor_sets(pipeline.bind_point(), layout.handle(), 0, &[set], &[]);
        cmd.dispatch(workgroup_count(self.particle_count), 1, 1);
        Ok(())
    }

    fn record_draw(&mut self, cmd: &CommandBuffer, frame: &FrameInfo) -> RhiResult<()> {
        let (Some(pipeline), Some(layout)) = (&self.draw_pipeline, &self.draw_layout) else {
            return Err(RhiError::InvalidHandle(
                "Particle draw pipeline has not been built".to_string(),
            ));
        };
        let particles = self.storage_buffers.get(frame.slot).ok_or_else(|| {
            RhiError::InvalidHandle(format!("No particle buffer for slot {}", frame.slot))
        })?;

        cmd.bind_pipeline(pipeline.bind_point(), pipeline.handle());
        cmd.set_viewport(&full_viewport(frame.extent));
        cmd.set_scissor(&full_scissor(frame.extent));
        cmd.push_constants(layout.handle(), vk::ShaderStageFlags::VERTEX, 0, &self.view);
        cmd.bind_vertex_buffers(0, &[particles.handle()], &[0]);
        cmd.draw(6, self.particle_count, 0, 0);
        Ok(())
    }

    fn shutdown(&mut self, backend: &FrameManager) {
        if let Err(e) = backend.descriptor_pool().free(&self.descriptor_sets) {
            error!("Failed to free particle descriptor sets: {}", e);
        }
        self.descriptor_sets.clear();
        self.draw_pipeline = None;
        self.draw_layout = None;
        self.compute_pipeline = None;
        self.compute_layout = None;
        self.set_layout = None;
        self.storage_buffers.clear();
        self.uniform_buffers.clear();
        self.device = None;
    }
}
