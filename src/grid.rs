use std::sync::mpsc;

use bytemuck::{Pod, Zeroable};
use rand::{rngs::StdRng, Rng, SeedableRng};
use wgpu::util::DeviceExt;

use crate::compute::WORKGROUP_SIZE;
use crate::error::{capture_resource_errors, LifeError};
use crate::rules::{self, Pattern};

/// One of the two cell-state buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferId {
    A,
    B,
}

impl BufferId {
    pub const ALL: [BufferId; 2] = [BufferId::A, BufferId::B];

    /// `A` on even steps, `B` on odd ones.
    pub fn from_parity(step: u64) -> Self {
        if step % 2 == 0 {
            BufferId::A
        } else {
            BufferId::B
        }
    }

    /// Slot in the two-element arrays of buffers and bind groups.
    pub fn index(self) -> usize {
        match self {
            BufferId::A => 0,
            BufferId::B => 1,
        }
    }

    pub fn other(self) -> Self {
        match self {
            BufferId::A => BufferId::B,
            BufferId::B => BufferId::A,
        }
    }
}

/// Grid width and height, fixed for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridDimensions {
    width: u32,
    height: u32,
}

impl GridDimensions {
    pub fn new(width: u32, height: u32) -> Result<Self, LifeError> {
        if width == 0 || height == 0 {
            return Err(LifeError::Config(format!(
                "grid dimensions must be positive, got {width}x{height}"
            )));
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Size in bytes of one cell-state buffer.
    pub fn buffer_size(&self) -> u64 {
        self.width as u64 * self.height as u64 * std::mem::size_of::<u32>() as u64
    }

    pub fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }
}

/// Uniform block shared by the compute and render programs (binding 0).
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GridParams {
    pub width: u32,
    pub height: u32,
    pub _padding: [u32; 2], // Uniform blocks are sized in 16-byte units
}

impl From<GridDimensions> for GridParams {
    fn from(dims: GridDimensions) -> Self {
        Self {
            width: dims.width,
            height: dims.height,
            _padding: [0; 2],
        }
    }
}

/// How buffer `A` is filled before the first tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Seeding {
    /// Each cell is live with `probability`, drawn independently.
    /// `seed` makes the draw reproducible; `None` uses OS entropy.
    Random { probability: f64, seed: Option<u64> },
    /// A single pattern at the grid center on an otherwise dead grid.
    Pattern(Pattern),
}

impl Seeding {
    pub fn validate(&self) -> Result<(), LifeError> {
        match self {
            Seeding::Random { probability, .. } if !(0.0..=1.0).contains(probability) => {
                Err(LifeError::Config(format!(
                    "live-cell probability must be within [0, 1], got {probability}"
                )))
            }
            _ => Ok(()),
        }
    }

    /// The first generation for a grid of `dims`.
    pub fn generate(&self, dims: GridDimensions) -> Result<Vec<u32>, LifeError> {
        self.validate()?;
        let cells = match self {
            Seeding::Random { probability, seed } => {
                let mut rng = match seed {
                    Some(seed) => StdRng::seed_from_u64(*seed),
                    None => StdRng::from_os_rng(),
                };
                (0..dims.cell_count())
                    .map(|_| u32::from(rng.random_bool(*probability)))
                    .collect()
            }
            Seeding::Pattern(pattern) => rules::grid_with_pattern(dims, *pattern),
        };
        Ok(cells)
    }
}

/// Rejects grids whose buffers or dispatch would exceed the device limits.
pub fn check_fits(dims: GridDimensions, limits: &wgpu::Limits) -> Result<(), LifeError> {
    let size = dims.buffer_size();
    if size > limits.max_buffer_size || size > limits.max_storage_buffer_binding_size as u64 {
        return Err(LifeError::Resource(format!(
            "{}x{} grid needs {size} bytes per buffer, device allows {} (binding {})",
            dims.width, dims.height, limits.max_buffer_size, limits.max_storage_buffer_binding_size
        )));
    }

    let max_groups = limits.max_compute_workgroups_per_dimension;
    let groups_x = dims.width.div_ceil(WORKGROUP_SIZE);
    let groups_y = dims.height.div_ceil(WORKGROUP_SIZE);
    if groups_x > max_groups || groups_y > max_groups {
        return Err(LifeError::Resource(format!(
            "{}x{} grid needs {groups_x}x{groups_y} workgroups, device allows {max_groups} per axis",
            dims.width, dims.height
        )));
    }
    Ok(())
}

/// The two cell-state buffers and the dimensions uniform.
///
/// Only the compute and render passes touch the buffers after construction.
pub struct GridState {
    dims: GridDimensions,
    buffers: [wgpu::Buffer; 2],
    params_buffer: wgpu::Buffer,
}

impl GridState {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        dims: GridDimensions,
        seeding: &Seeding,
    ) -> Result<Self, LifeError> {
        check_fits(dims, &device.limits())?;
        let initial = seeding.generate(dims)?;

        let (buffers, params_buffer) = capture_resource_errors(device, "grid buffers", || {
            let buffers = [
                Self::create_cell_buffer(device, "Cell State A", dims),
                Self::create_cell_buffer(device, "Cell State B", dims),
            ];
            let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Grid Parameters"),
                contents: bytemuck::bytes_of(&GridParams::from(dims)),
                usage: wgpu::BufferUsages::UNIFORM,
            });
            (buffers, params_buffer)
        })?;

        // Only A is seeded. The first compute pass overwrites every cell of B
        // before anything reads it.
        queue.write_buffer(&buffers[BufferId::A.index()], 0, bytemuck::cast_slice(&initial));

        log::info!(
            "Grid {}x{} allocated ({} bytes per buffer, {} live cells seeded)",
            dims.width,
            dims.height,
            dims.buffer_size(),
            rules::population(&initial)
        );

        Ok(Self { dims, buffers, params_buffer })
    }

    fn create_cell_buffer(device: &wgpu::Device, label: &str, dims: GridDimensions) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: dims.buffer_size(),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        })
    }

    pub fn dimensions(&self) -> GridDimensions {
        self.dims
    }

    pub fn buffer(&self, id: BufferId) -> &wgpu::Buffer {
        &self.buffers[id.index()]
    }

    pub fn params_buffer(&self) -> &wgpu::Buffer {
        &self.params_buffer
    }

    /// Records a copy of `id` into a fresh mappable buffer. Pass the result
    /// to [`PendingReadback::new`] once `encoder` has been submitted.
    pub fn encode_readback(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        id: BufferId,
    ) -> wgpu::Buffer {
        let size = self.dims.buffer_size();
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Cell State Readback"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        encoder.copy_buffer_to_buffer(self.buffer(id), 0, &staging, 0, size);
        staging
    }

    /// Copies one cell-state buffer back to the host, blocking until the
    /// device has finished all prior work.
    pub fn read_buffer(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        id: BufferId,
    ) -> Result<Vec<u32>, LifeError> {
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
        let staging = self.encode_readback(device, &mut encoder, id);
        queue.submit(Some(encoder.finish()));
        PendingReadback::new(staging).wait(device)
    }
}

/// A submitted copy of a cell buffer that is being mapped for reading.
pub struct PendingReadback {
    staging: wgpu::Buffer,
    receiver: mpsc::Receiver<Result<(), wgpu::BufferAsyncError>>,
}

impl PendingReadback {
    /// Starts mapping `staging`. The copy into it must already be submitted.
    pub fn new(staging: wgpu::Buffer) -> Self {
        let (sender, receiver) = mpsc::channel();
        staging.slice(..).map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        Self { staging, receiver }
    }

    /// Returns the cells if the mapping has completed, without waiting for
    /// the device.
    pub fn try_take(&self, device: &wgpu::Device) -> Option<Result<Vec<u32>, LifeError>> {
        device.poll(wgpu::Maintain::Poll);
        match self.receiver.try_recv() {
            Ok(result) => Some(self.finish(result)),
            Err(mpsc::TryRecvError::Empty) => None,
            Err(mpsc::TryRecvError::Disconnected) => Some(Err(dropped_callback())),
        }
    }

    /// Blocks until the device has finished the copy.
    pub fn wait(self, device: &wgpu::Device) -> Result<Vec<u32>, LifeError> {
        device.poll(wgpu::Maintain::Wait);
        let result = self.receiver.recv().map_err(|_| dropped_callback())?;
        self.finish(result)
    }

    fn finish(&self, result: Result<(), wgpu::BufferAsyncError>) -> Result<Vec<u32>, LifeError> {
        result?;
        let cells = {
            let view = self.staging.slice(..).get_mapped_range();
            bytemuck::cast_slice::<u8, u32>(&view).to_vec()
        };
        self.staging.unmap();
        Ok(cells)
    }
}

fn dropped_callback() -> LifeError {
    LifeError::Submission("readback callback was dropped".to_string())
}
