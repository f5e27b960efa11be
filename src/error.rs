// error.rs — Error types surfaced by the analyzer.
//
// `GpuError` (device acquisition) lives in gpu/device.rs next to the code
// that produces it; everything the lifecycle controller can report is
// collected in `AnalyzerError`.

use std::time::Duration;

use thiserror::Error;

use crate::gpu::device::GpuError;

/// Invalid [`AnalyzerConfig`](crate::config::AnalyzerConfig) or
/// [`ClassifierConfig`](crate::config::ClassifierConfig) values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("analysis resolution must be non-zero, got {width}x{height}")]
    EmptyResolution { width: u32, height: u32 },

    #[error("analysis resolution {width}x{height} exceeds {max} on a side")]
    ResolutionTooLarge { width: u32, height: u32, max: u32 },

    #[error("pyramid must have between 1 and {max} levels, got {levels}")]
    PyramidLevels { levels: usize, max: usize },

    #[error("window radius must be between 1 and {max}, got {radius}")]
    WindowRadius { radius: u32, max: u32 },

    #[error("{name} must be a finite value > 0, got {value}")]
    NotPositive { name: &'static str, value: f32 },

    #[error("{name} must lie in [0, 1], got {value}")]
    NotUnit { name: &'static str, value: f32 },
}

/// Everything that can go wrong while initializing or running the analyzer.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("GPU initialization failed: {0}")]
    Gpu(#[from] GpuError),

    #[error("frame is {got_width}x{got_height}, analyzer expects {width}x{height}")]
    FrameSize {
        width: u32,
        height: u32,
        got_width: u32,
        got_height: u32,
    },

    #[error("RGBA buffer holds {got} bytes, {width}x{height} frame needs {expected}")]
    FrameBuffer {
        width: u32,
        height: u32,
        expected: usize,
        got: usize,
    },

    #[error("device reported an error during the frame batch: {0}")]
    Device(String),

    #[error("statistics readback failed: {0}")]
    ReadbackMap(#[from] wgpu::BufferAsyncError),

    #[error("statistics readback did not complete within {0:?}")]
    ReadbackTimeout(Duration),

    #[error("analyzer was destroyed; call initialize() before analyzing again")]
    Destroyed,
}
