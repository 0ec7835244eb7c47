// Declare modules directly in the binary crate root
pub mod compute;
pub mod config;
pub mod error;
pub mod grid;
pub mod overlay;
pub mod render;
pub mod rules;
pub mod scheduler;
pub mod state;

use crate::config::{LifeConfig, WINDOW_SIZE};
use crate::error::LifeError;
use crate::state::State;

use std::sync::Arc;
use std::time::Instant;
use winit::{
    event::{Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    window::{Window, WindowBuilder},
};

async fn run(event_loop: EventLoop<()>, window: Arc<Window>, config: LifeConfig) -> Result<(), LifeError> {
    let mut state = State::new(window, &config).await?;
    let mut fatal: Option<LifeError> = None;

    log::info!(
        "Running {}x{} grid, one generation every {} ms",
        config.grid_width,
        config.grid_height,
        config.tick_interval.as_millis()
    );

    event_loop
        .run(|event, window_target| match event {
            Event::WindowEvent { window_id, ref event } if window_id == state.window.id() => {
                state.on_window_event(event);

                match event {
                    WindowEvent::CloseRequested => {
                        state.ticker.stop();
                        window_target.exit();
                    }
                    WindowEvent::Resized(new_size) => {
                        state.resize(*new_size);
                    }
                    WindowEvent::RedrawRequested if state.take_pending_tick() && !state.ticker.is_stopped() => {
                        if let Err(err) = state.tick() {
                            // Any failure ends the run; a skipped generation
                            // would desynchronize the buffer roles.
                            fatal = Some(err);
                            state.ticker.stop();
                            window_target.exit();
                        }
                    }
                    _ => (),
                }
            }
            Event::AboutToWait => {
                if state.ticker.due(Instant::now()) {
                    state.request_tick();
                }
                match state.ticker.next_deadline() {
                    Some(deadline) => window_target.set_control_flow(ControlFlow::WaitUntil(deadline)),
                    None => window_target.exit(),
                }
            }
            _ => (),
        })
        .map_err(|err| LifeError::Capability(format!("event loop failed: {err}")))?;

    match fatal {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn start() -> Result<(), LifeError> {
    let config = LifeConfig::from_env()?;

    let event_loop = EventLoop::new()
        .map_err(|err| LifeError::Capability(format!("failed to create event loop: {err}")))?;

    let initial_size = winit::dpi::LogicalSize::new(WINDOW_SIZE as f64, WINDOW_SIZE as f64);
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("GPU Game of Life")
            .with_inner_size(initial_size)
            .build(&event_loop)
            .map_err(|err| LifeError::Capability(format!("failed to create window: {err}")))?,
    );

    pollster::block_on(run(event_loop, window, config))
}

fn main() {
    env_logger::init();

    if let Err(err) = start() {
        log::error!("{err}");
        std::process::exit(1);
    }
}
