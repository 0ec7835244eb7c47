use bytemuck::{Pod, Zeroable};
use std::num::NonZeroU64;
use wgpu::util::DeviceExt;

use crate::error::{capture_resource_errors, LifeError};
use crate::grid::{BufferId, GridParams, GridState};

pub const SHADER_SOURCE: &str = include_str!("../render.wgsl");

/// Background every frame is cleared to before cells are drawn.
pub const CLEAR_COLOR: wgpu::Color = wgpu::Color { r: 0.0, g: 0.0, b: 0.4, a: 1.0 };

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 2],
}

impl Vertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Unit quad as two triangles, inset so neighboring cells keep a gap.
pub const QUAD_VERTICES: [Vertex; 6] = [
    Vertex { position: [-0.8, -0.8] },
    Vertex { position: [0.8, -0.8] },
    Vertex { position: [0.8, 0.8] },

    Vertex { position: [-0.8, -0.8] },
    Vertex { position: [0.8, 0.8] },
    Vertex { position: [-0.8, 0.8] },
];

pub fn create_render_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Render Bind Group Layout"),
        entries: &[
            // Grid dimensions (Binding 0)
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(std::mem::size_of::<GridParams>() as u64),
                },
                count: None,
            },
            // Current generation (Binding 1)
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
    })
}

/// Bind groups indexed by the buffer being displayed: `[reads A, reads B]`.
pub fn create_render_bind_groups(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    grid: &GridState,
) -> [wgpu::BindGroup; 2] {
    BufferId::ALL.map(|current| {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(match current {
                BufferId::A => "Render Bind Group A",
                BufferId::B => "Render Bind Group B",
            }),
            layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: grid.params_buffer().as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: grid.buffer(current).as_entire_binding() },
            ],
        })
    })
}

/// Draws one instanced quad per cell of a generation.
pub struct FrameRenderer {
    pipeline: wgpu::RenderPipeline,
    bind_groups: [wgpu::BindGroup; 2],
    vertex_buffer: wgpu::Buffer,
    instance_count: u32,
}

impl FrameRenderer {
    pub fn new(
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        grid: &GridState,
    ) -> Result<Self, LifeError> {
        let dims = grid.dimensions();
        let instance_count = u32::try_from(dims.cell_count()).map_err(|_| {
            LifeError::Resource(format!(
                "{}x{} grid exceeds the instance range of one draw call",
                dims.width(),
                dims.height()
            ))
        })?;

        capture_resource_errors(device, "render pipeline", || {
            let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Render Shader"),
                source: wgpu::ShaderSource::Wgsl(SHADER_SOURCE.into()),
            });
            let layout = create_render_bind_group_layout(device);
            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Render Pipeline Layout"),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });
            let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Render Pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader_module,
                    entry_point: "vs_main",
                    buffers: &[Vertex::layout()],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader_module,
                    entry_point: "fs_main",
                    targets: &[Some(format.into())],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            });
            let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Cell Quad Vertices"),
                contents: bytemuck::cast_slice(&QUAD_VERTICES),
                usage: wgpu::BufferUsages::VERTEX,
            });

            Self {
                pipeline,
                bind_groups: create_render_bind_groups(device, &layout, grid),
                vertex_buffer,
                instance_count,
            }
        })
    }

    /// Records the pass drawing generation `current` into `target`.
    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder, target: &wgpu::TextureView, current: BufferId) {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Render Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, &self.bind_groups[current.index()], &[]);
        render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        render_pass.draw(0..QUAD_VERTICES.len() as u32, 0..self.instance_count);
    }
}
