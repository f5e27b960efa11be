// clip-motion: GPU pyramidal Lucas-Kanade motion analysis for video clips
//
// Per frame pair the analyzer estimates dense optical flow on the GPU,
// reduces it to fixed-point motion statistics and classifies them into
// total, global (camera) and local (subject) motion plus a scene-cut flag.
//
// The CPU modules (convert, pyramid, gradient, flow, stats, classify) are
// the reference implementation the GPU kernels are validated against.

pub mod analyzer;
pub mod classify;
pub mod config;
pub mod convert;
pub mod error;
pub mod flow;
pub mod frame;
pub mod gpu;
pub mod gradient;
pub mod image;
pub mod pyramid;
pub mod stats;

pub use analyzer::{FrameAnalysis, LifecycleState, MotionAnalyzer};
pub use classify::MotionResult;
pub use config::{AnalyzerConfig, ClassifierConfig};
pub use error::{AnalyzerError, ConfigError};
pub use frame::ColorFrame;
pub use gpu::device::{DeviceProfile, GpuDevice, GpuError};
pub use stats::StatisticsRecord;
