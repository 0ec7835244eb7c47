use std::num::NonZeroU64;

use crate::error::{capture_resource_errors, LifeError};
use crate::grid::{BufferId, GridDimensions, GridParams, GridState};

/// Tile edge of one compute workgroup. Must match `@workgroup_size` in the shader.
pub const WORKGROUP_SIZE: u32 = 8;

pub const SHADER_SOURCE: &str = include_str!("rules/conway_classic.wgsl");
pub const ENTRY_POINT: &str = "main";

/// Workgroups per axis covering the whole grid, partial edge tiles included.
pub fn workgroup_count(dims: GridDimensions) -> (u32, u32) {
    (
        dims.width().div_ceil(WORKGROUP_SIZE),
        dims.height().div_ceil(WORKGROUP_SIZE),
    )
}

pub fn create_compute_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Compute Bind Group Layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry { // Grid dimensions
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(std::mem::size_of::<GridParams>() as u64),
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry { // Source generation
                binding: 1,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry { // Destination generation
                binding: 2,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: false },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
    })
}

/// Bind groups indexed by the source buffer: `[A -> B, B -> A]`.
pub fn create_compute_bind_groups(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    grid: &GridState,
) -> [wgpu::BindGroup; 2] {
    BufferId::ALL.map(|source| {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(match source {
                BufferId::A => "Compute Bind Group A->B",
                BufferId::B => "Compute Bind Group B->A",
            }),
            layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: grid.params_buffer().as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: grid.buffer(source).as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: grid.buffer(source.other()).as_entire_binding() },
            ],
        })
    })
}

/// One generation of the rule as a single compute dispatch.
pub struct SimulationStep {
    pipeline: wgpu::ComputePipeline,
    bind_groups: [wgpu::BindGroup; 2],
    workgroups: (u32, u32),
}

impl SimulationStep {
    pub fn new(device: &wgpu::Device, grid: &GridState) -> Result<Self, LifeError> {
        log::info!("Compiling compute shader...");
        capture_resource_errors(device, "compute pipeline", || {
            let layout = create_compute_bind_group_layout(device);
            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Compute Pipeline Layout"),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Life Compute Shader"),
                source: wgpu::ShaderSource::Wgsl(SHADER_SOURCE.into()),
            });
            let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("Life Compute Pipeline"),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: ENTRY_POINT,
            });

            Self {
                pipeline,
                bind_groups: create_compute_bind_groups(device, &layout, grid),
                workgroups: workgroup_count(grid.dimensions()),
            }
        })
    }

    /// Records the pass computing `destination` from `source`.
    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder, source: BufferId, destination: BufferId) {
        debug_assert_eq!(destination, source.other(), "source and destination must differ");

        let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Game of Life Compute Pass"),
            timestamp_writes: None,
        });
        compute_pass.set_pipeline(&self.pipeline);
        compute_pass.set_bind_group(0, &self.bind_groups[source.index()], &[]);
        let (dispatch_x, dispatch_y) = self.workgroups;
        compute_pass.dispatch_workgroups(dispatch_x, dispatch_y, 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Seeding;
    use crate::rules::{self, Pattern};
    use crate::state::{test_gpu, GpuContext};

    #[test]
    fn workgroups_cover_partial_tiles() {
        let dims = |w, h| GridDimensions::new(w, h).unwrap();
        assert_eq!(workgroup_count(dims(32, 32)), (4, 4));
        assert_eq!(workgroup_count(dims(33, 8)), (5, 1));
        assert_eq!(workgroup_count(dims(1, 1)), (1, 1));
        assert_eq!(workgroup_count(dims(7, 17)), (1, 3));
    }

    #[test]
    fn shader_matches_host_contract() {
        let workgroup = format!("@workgroup_size({0}, {0})", WORKGROUP_SIZE);
        assert!(SHADER_SOURCE.contains(&workgroup));
        assert!(SHADER_SOURCE.contains(&format!("fn {ENTRY_POINT}(")));
        assert!(SHADER_SOURCE.contains("@binding(0) var<uniform>"));
        assert!(SHADER_SOURCE.contains("@binding(1) var<storage, read>"));
        assert!(SHADER_SOURCE.contains("@binding(2) var<storage, read_write>"));
    }

    fn run_steps(gpu: &GpuContext, step: &SimulationStep, count: u64) -> BufferId {
        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Test Encoder"),
        });
        for generation in 0..count {
            step.encode(&mut encoder, BufferId::from_parity(generation), BufferId::from_parity(generation + 1));
        }
        gpu.queue.submit(Some(encoder.finish()));
        BufferId::from_parity(count)
    }

    #[test]
    fn gpu_step_matches_reference_on_ragged_grid() {
        let Some(gpu) = test_gpu() else { return };
        // 37x21 leaves partial tiles on both axes.
        let dims = GridDimensions::new(37, 21).unwrap();
        let seeding = Seeding::Random { probability: 0.4, seed: Some(42) };
        let initial = seeding.generate(dims).unwrap();

        let grid = GridState::new(&gpu.device, &gpu.queue, dims, &seeding).unwrap();
        let step = SimulationStep::new(&gpu.device, &grid).unwrap();
        let current = run_steps(&gpu, &step, 1);
        assert_eq!(current, BufferId::B);

        let mut expected = vec![rules::DEAD; dims.cell_count()];
        rules::step(&initial, &mut expected, dims);
        let actual = grid.read_buffer(&gpu.device, &gpu.queue, BufferId::B).unwrap();
        assert_eq!(actual, expected);

        // The source generation is left untouched.
        let source = grid.read_buffer(&gpu.device, &gpu.queue, BufferId::A).unwrap();
        assert_eq!(source, initial);
    }

    #[test]
    fn gpu_blinker_returns_after_two_steps() {
        let Some(gpu) = test_gpu() else { return };
        let dims = GridDimensions::new(16, 16).unwrap();
        let seeding = Seeding::Pattern(Pattern::Blinker);
        let grid = GridState::new(&gpu.device, &gpu.queue, dims, &seeding).unwrap();
        let step = SimulationStep::new(&gpu.device, &grid).unwrap();

        let current = run_steps(&gpu, &step, 2);
        assert_eq!(current, BufferId::A);
        let cells = grid.read_buffer(&gpu.device, &gpu.queue, current).unwrap();
        assert_eq!(cells, rules::grid_with_pattern(dims, Pattern::Blinker));
    }
}
