use std::time::{Duration, Instant};

use egui::Context as EguiContext;
use egui_wgpu::Renderer as EguiWgpuRenderer;
use egui_winit::State as EguiWinitState;
use winit::{event::WindowEvent, window::Window};

use crate::grid::GridDimensions;

/// Live-cell counts copy a whole cell buffer back to the host, so refresh
/// them sparingly.
pub const COUNT_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

fn count_is_stale(last_update: Option<Instant>, now: Instant) -> bool {
    last_update.map_or(true, |last| now.duration_since(last) >= COUNT_REFRESH_INTERVAL)
}

/// What the status panel shows for one frame.
#[derive(Debug, Clone)]
pub struct HudStats {
    pub generation: u64,
    pub grid: GridDimensions,
    pub tick_interval: Duration,
    pub adapter: String,
    pub live_cells: Option<usize>,
}

impl HudStats {
    pub fn lines(&self) -> Vec<String> {
        vec![
            format!("Generation: {}", self.generation),
            format!("Grid: {}x{}", self.grid.width(), self.grid.height()),
            format!("Tick: {} ms", self.tick_interval.as_millis()),
            format!(
                "Live Cells: {}",
                self.live_cells.map_or_else(|| "N/A".to_string(), |count| count.to_string())
            ),
            format!("Adapter: {}", self.adapter),
        ]
    }
}

/// Read-only egui status panel drawn on top of the cells.
pub struct Overlay {
    ctx: EguiContext,
    winit_state: EguiWinitState,
    renderer: EguiWgpuRenderer,
    live_cells: Option<usize>,
    last_count_request: Option<Instant>,
}

impl Overlay {
    pub fn new(window: &Window, device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        log::info!("Initializing egui...");
        let ctx = EguiContext::default();
        let winit_state = EguiWinitState::new(ctx.clone(), ctx.viewport_id(), window, None, None);
        let renderer = EguiWgpuRenderer::new(device, format, None, 1);
        Self {
            ctx,
            winit_state,
            renderer,
            live_cells: None,
            last_count_request: None,
        }
    }

    /// Feeds a window event to egui. Nothing in the panel is interactive, so
    /// events are never consumed.
    pub fn on_window_event(&mut self, window: &Window, event: &WindowEvent) {
        let _ = self.winit_state.on_window_event(window, event);
    }

    pub fn count_is_stale(&self, now: Instant) -> bool {
        count_is_stale(self.last_count_request, now)
    }

    pub fn mark_count_requested(&mut self, now: Instant) {
        self.last_count_request = Some(now);
    }

    pub fn set_live_cells(&mut self, count: usize) {
        self.live_cells = Some(count);
    }

    pub fn live_cells(&self) -> Option<usize> {
        self.live_cells
    }

    /// Records the overlay pass into `encoder`, loading what the cell pass drew.
    /// Returns command buffers egui needs submitted alongside the encoder.
    pub fn encode(
        &mut self,
        window: &Window,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        size_in_pixels: [u32; 2],
        stats: &HudStats,
    ) -> Vec<wgpu::CommandBuffer> {
        let raw_input = self.winit_state.take_egui_input(window);
        self.ctx.begin_frame(raw_input);

        egui::Area::new(egui::Id::new("status_area"))
            .anchor(egui::Align2::LEFT_TOP, egui::vec2(5.0, 5.0))
            .interactable(false)
            .show(&self.ctx, |ui| {
                egui::Frame::none()
                    .fill(egui::Color32::from_rgba_unmultiplied(25, 25, 25, 160))
                    .inner_margin(6.0)
                    .show(ui, |ui| {
                        for line in stats.lines() {
                            ui.label(line);
                        }
                    });
            });

        let full_output = self.ctx.end_frame();
        let pixels_per_point = window.scale_factor() as f32;
        let paint_jobs = self.ctx.tessellate(full_output.shapes, pixels_per_point);
        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels,
            pixels_per_point,
        };

        for (id, image_delta) in &full_output.textures_delta.set {
            self.renderer.update_texture(device, queue, *id, image_delta);
        }
        let extra_commands =
            self.renderer.update_buffers(device, queue, encoder, &paint_jobs, &screen_descriptor);
        self.winit_state.handle_platform_output(window, full_output.platform_output);

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("egui Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load, // Keep the cells underneath
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            self.renderer.render(&mut render_pass, &paint_jobs, &screen_descriptor);
        }

        for id in &full_output.textures_delta.free {
            self.renderer.free_texture(id);
        }

        extra_commands
    }
}
