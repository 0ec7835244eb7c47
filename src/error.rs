use thiserror::Error;

/// Every failure in the simulator is fatal: a skipped generation would break
/// the A/B buffer alternation for all later ticks.
#[derive(Debug, Error)]
pub enum LifeError {
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A required adapter, device or surface capability is missing.
    #[error("GPU capability unavailable: {0}")]
    Capability(String),

    /// Buffer or pipeline allocation was rejected by the device.
    #[error("GPU resource error: {0}")]
    Resource(String),

    /// The device was lost or rejected a batch during a tick.
    #[error("GPU submission failed: {0}")]
    Submission(String),

    #[error("buffer readback failed: {0}")]
    Readback(#[from] wgpu::BufferAsyncError),
}

impl From<wgpu::RequestDeviceError> for LifeError {
    fn from(err: wgpu::RequestDeviceError) -> Self {
        Self::Capability(format!("failed to request GPU device: {err}"))
    }
}

impl From<wgpu::CreateSurfaceError> for LifeError {
    fn from(err: wgpu::CreateSurfaceError) -> Self {
        Self::Capability(format!("failed to create presentation surface: {err}"))
    }
}

/// Runs `build` inside validation and out-of-memory error scopes and turns
/// anything the device reports into [`LifeError::Resource`].
pub fn capture_resource_errors<T>(
    device: &wgpu::Device,
    what: &str,
    build: impl FnOnce() -> T,
) -> Result<T, LifeError> {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = build();
    // Scopes pop in reverse order of pushing.
    let validation = pollster::block_on(device.pop_error_scope());
    let out_of_memory = pollster::block_on(device.pop_error_scope());

    match validation.or(out_of_memory) {
        Some(err) => Err(LifeError::Resource(format!("{what}: {err}"))),
        None => Ok(value),
    }
}
