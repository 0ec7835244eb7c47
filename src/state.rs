use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use winit::{dpi::PhysicalSize, event::WindowEvent, window::Window};

use crate::compute::SimulationStep;
use crate::config::LifeConfig;
use crate::error::LifeError;
use crate::grid::{GridState, PendingReadback};
use crate::overlay::{HudStats, Overlay};
use crate::render::FrameRenderer;
use crate::rules;
use crate::scheduler::{Scheduler, TickOutcome, TickPlan, TickTarget, Ticker};

/// Adapter, device and queue, plus the first error the device reported
/// outside of an error scope.
pub struct GpuContext {
    pub adapter: wgpu::Adapter,
    pub adapter_info: wgpu::AdapterInfo,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    device_error: Arc<Mutex<Option<String>>>,
}

impl GpuContext {
    pub async fn new(
        instance: &wgpu::Instance,
        compatible_surface: Option<&wgpu::Surface<'_>>,
    ) -> Result<Self, LifeError> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                force_fallback_adapter: false,
                compatible_surface,
            })
            .await
            .ok_or_else(|| LifeError::Capability("no suitable GPU adapter found".to_string()))?;

        let adapter_info = adapter.get_info();
        log::info!("Using adapter {} ({:?})", adapter_info.name, adapter_info.backend);

        // Compute passes, and storage buffers read from the vertex stage.
        let required = wgpu::DownlevelFlags::COMPUTE_SHADERS | wgpu::DownlevelFlags::VERTEX_STORAGE;
        if !adapter.get_downlevel_capabilities().flags.contains(required) {
            return Err(LifeError::Capability(format!(
                "adapter {} lacks compute shaders or vertex-stage storage buffers",
                adapter_info.name
            )));
        }

        let limits = wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits());
        let (device, queue) = request_device(&adapter, limits).await?;

        let device_error = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&device_error);
        device.on_uncaptured_error(Box::new(move |error: wgpu::Error| {
            log::error!("wgpu device error: {error}");
            if let Ok(mut slot) = sink.lock() {
                slot.get_or_insert_with(|| error.to_string());
            }
        }));

        Ok(Self {
            adapter,
            adapter_info,
            device,
            queue,
            device_error,
        })
    }

    /// A context without a presentation surface.
    pub async fn headless() -> Result<Self, LifeError> {
        Self::new(&wgpu::Instance::default(), None).await
    }

    pub fn take_device_error(&self) -> Option<String> {
        self.device_error.lock().ok().and_then(|mut slot| slot.take())
    }

    /// Submits one batch and reports any error the device raised while
    /// validating or executing it.
    pub fn submit(&self, commands: impl IntoIterator<Item = wgpu::CommandBuffer>) -> Result<(), LifeError> {
        self.queue.submit(commands);
        match self.take_device_error() {
            Some(err) => Err(LifeError::Submission(err)),
            None => Ok(()),
        }
    }
}

async fn request_device(
    adapter: &wgpu::Adapter,
    required_limits: wgpu::Limits,
) -> Result<(wgpu::Device, wgpu::Queue), LifeError> {
    let device = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Life Device"),
                required_features: wgpu::Features::empty(),
                required_limits,
            },
            None,
        )
        .await?;
    Ok(device)
}

/// Headless context for tests; `None` (with a note) where no adapter exists.
#[cfg(test)]
pub(crate) fn test_gpu() -> Option<GpuContext> {
    match pollster::block_on(GpuContext::headless()) {
        Ok(gpu) => Some(gpu),
        Err(err) => {
            eprintln!("skipping GPU test: {err}");
            None
        }
    }
}

/// Grid buffers with the compute and render passes bound to them.
pub struct LifePipeline {
    grid: GridState,
    step: SimulationStep,
    renderer: FrameRenderer,
}

impl LifePipeline {
    pub fn new(
        gpu: &GpuContext,
        format: wgpu::TextureFormat,
        config: &LifeConfig,
    ) -> Result<Self, LifeError> {
        let grid = GridState::new(&gpu.device, &gpu.queue, config.dimensions()?, &config.seeding)?;
        let step = SimulationStep::new(&gpu.device, &grid)?;
        let renderer = FrameRenderer::new(&gpu.device, format, &grid)?;
        Ok(Self { grid, step, renderer })
    }

    pub fn grid(&self) -> &GridState {
        &self.grid
    }

    /// Compute then render, in that order, into one encoder.
    pub fn encode_tick(&self, encoder: &mut wgpu::CommandEncoder, plan: &TickPlan, target: &wgpu::TextureView) {
        self.step.encode(encoder, plan.source, plan.destination);
        self.renderer.encode(encoder, target, plan.display);
    }
}

/// Borrowed view of [`State`] that presents one tick to the window surface.
struct FrameTarget<'a> {
    window: &'a Window,
    surface: &'a wgpu::Surface<'static>,
    config: &'a wgpu::SurfaceConfiguration,
    gpu: &'a GpuContext,
    pipeline: &'a LifePipeline,
    overlay: Option<&'a mut Overlay>,
    tick_interval: Duration,
    /// Copy the displayed buffer out for the live-cell count.
    count_cells: bool,
    readback: Option<PendingReadback>,
}

impl TickTarget for FrameTarget<'_> {
    fn run_tick(&mut self, plan: &TickPlan) -> Result<TickOutcome, LifeError> {
        if let Some(err) = self.gpu.take_device_error() {
            return Err(LifeError::Submission(err));
        }

        // Acquire before encoding anything so a missing frame skips the
        // whole tick instead of half of it.
        let output_frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("Surface lost, reconfiguring before generation {}", plan.generation);
                self.surface.configure(&self.gpu.device, self.config);
                return Ok(TickOutcome::Skipped);
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                return Err(LifeError::Submission("surface out of memory".to_string()));
            }
            Err(err) => {
                log::warn!("Skipping tick due to surface {err:?}");
                return Ok(TickOutcome::Skipped);
            }
        };

        let output_view = output_frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Tick Encoder") });
        self.pipeline.encode_tick(&mut encoder, plan, &output_view);

        let mut commands = Vec::new();
        if let Some(overlay) = self.overlay.as_deref_mut() {
            let stats = HudStats {
                generation: plan.generation,
                grid: self.pipeline.grid().dimensions(),
                tick_interval: self.tick_interval,
                adapter: self.gpu.adapter_info.name.clone(),
                live_cells: overlay.live_cells(),
            };
            commands = overlay.encode(
                self.window,
                &self.gpu.device,
                &self.gpu.queue,
                &mut encoder,
                &output_view,
                [self.config.width, self.config.height],
                &stats,
            );
        }
        let staging = self
            .count_cells
            .then(|| self.pipeline.grid().encode_readback(&self.gpu.device, &mut encoder, plan.display));
        commands.push(encoder.finish());

        // A rejected batch never reaches the screen.
        self.gpu.submit(commands)?;
        output_frame.present();
        self.readback = staging.map(PendingReadback::new);
        Ok(TickOutcome::Submitted)
    }
}

pub struct State {
    pub window: Arc<Window>,
    pub surface: wgpu::Surface<'static>,
    pub config: wgpu::SurfaceConfiguration,
    pub size: PhysicalSize<u32>,
    pub gpu: GpuContext,
    pub pipeline: LifePipeline,
    pub overlay: Option<Overlay>,
    pub scheduler: Scheduler,
    pub ticker: Ticker,
    tick_pending: bool,
    pending_count: Option<PendingReadback>,
}

impl State {
    pub async fn new(window: Arc<Window>, life_config: &LifeConfig) -> Result<Self, LifeError> {
        let size = window.inner_size();

        log::info!("Initializing wgpu...");

        let instance = wgpu::Instance::default();
        let surface = instance.create_surface(window.clone())?;
        let gpu = GpuContext::new(&instance, Some(&surface)).await?;

        let surface_caps = surface.get_capabilities(&gpu.adapter);
        let surface_format = surface_caps
            .formats
            .first()
            .copied()
            .ok_or_else(|| LifeError::Capability("surface is not supported by the adapter".to_string()))?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: surface_caps.present_modes.first().copied().unwrap_or(wgpu::PresentMode::Fifo),
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&gpu.device, &config);

        let pipeline = LifePipeline::new(&gpu, surface_format, life_config)?;
        let overlay = life_config
            .show_overlay
            .then(|| Overlay::new(&window, &gpu.device, surface_format));

        log::info!("wgpu initialized successfully.");

        Ok(Self {
            window,
            surface,
            config,
            size,
            gpu,
            pipeline,
            overlay,
            scheduler: Scheduler::new(),
            ticker: Ticker::new(life_config.tick_interval, Instant::now()),
            tick_pending: false,
            pending_count: None,
        })
    }

    /// Reconfigures the surface. The grid keeps its dimensions.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.size = new_size;
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.gpu.device, &self.config);
            log::info!("Reconfigured surface to: {}x{}", new_size.width, new_size.height);
        } else {
            log::warn!("Ignoring resize to zero dimensions: {}x{}", new_size.width, new_size.height);
        }
    }

    pub fn on_window_event(&mut self, event: &WindowEvent) {
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.on_window_event(&self.window, event);
        }
    }

    /// Marks a tick as due and asks the window for a redraw to run it in.
    pub fn request_tick(&mut self) {
        self.tick_pending = true;
        self.window.request_redraw();
    }

    pub fn take_pending_tick(&mut self) -> bool {
        std::mem::take(&mut self.tick_pending)
    }

    /// One scheduler tick against the window surface.
    pub fn tick(&mut self) -> Result<TickOutcome, LifeError> {
        self.collect_live_cells()?;

        let now = Instant::now();
        let count_cells = self.pending_count.is_none()
            && self.overlay.as_ref().is_some_and(|overlay| overlay.count_is_stale(now));
        let mut target = FrameTarget {
            window: &self.window,
            surface: &self.surface,
            config: &self.config,
            gpu: &self.gpu,
            pipeline: &self.pipeline,
            overlay: self.overlay.as_mut(),
            tick_interval: self.ticker.interval(),
            count_cells,
            readback: None,
        };
        let outcome = self.scheduler.tick(&mut target)?;
        if let Some(readback) = target.readback.take() {
            self.pending_count = Some(readback);
            if let Some(overlay) = self.overlay.as_mut() {
                overlay.mark_count_requested(now);
            }
        }
        Ok(outcome)
    }

    // Picks up a finished live-cell readback. Never waits on the device.
    fn collect_live_cells(&mut self) -> Result<(), LifeError> {
        let Some(pending) = self.pending_count.as_ref() else {
            return Ok(());
        };
        let Some(result) = pending.try_take(&self.gpu.device) else {
            return Ok(());
        };
        self.pending_count = None;
        let cells = result?;
        log::debug!("Live cell count updated from GPU readback");
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.set_live_cells(rules::population(&cells));
        }
        Ok(())
    }
}
