// analyzer.rs — Lifecycle controller of the GPU motion analyzer.
//
// `MotionAnalyzer` is the only holder of temporal state:
//
//   Uninitialized ──initialize()──▶ Ready{has_previous: false}
//   Ready{false} ──first successful frame──▶ Ready{true}
//   Ready{_} ──reset()──▶ Ready{false}
//   any ──destroy()──▶ Destroyed ──initialize()──▶ Ready{false}
//
// Frame N builds its pyramid in slot N % 2 and compares it against slot
// (N - 1) % 2. The frame counter advances only when a frame succeeds, so a
// failed frame leaves the previous pyramid as the comparison base for the
// next one.
//
// `analyze_frame` never fails: errors are logged and the zero result is
// returned. `try_analyze_frame` surfaces them. Methods take `&mut self`, so
// one analyzer cannot have two frames in flight; use one analyzer per clip.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::classify::{classify, MotionResult};
use crate::config::AnalyzerConfig;
use crate::error::AnalyzerError;
use crate::frame::ColorFrame;
use crate::gpu::arena::{ResourceArena, SLOT_COUNT};
use crate::gpu::device::GpuDevice;
use crate::gpu::pipeline::MotionPipeline;
use crate::stats::StatisticsRecord;

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Ready { has_previous: bool },
    Destroyed,
}

/// Frame counter and "previous frame exists" flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameClock {
    frame_index: u64,
    has_previous: bool,
}

impl FrameClock {
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn has_previous(&self) -> bool {
        self.has_previous
    }

    /// Slot the current frame's pyramid is written to.
    pub fn current_slot(&self) -> usize {
        (self.frame_index % SLOT_COUNT as u64) as usize
    }

    /// Slot holding the previous frame's pyramid.
    pub fn previous_slot(&self) -> usize {
        (self.current_slot() + 1) % SLOT_COUNT
    }

    /// Record a successfully analyzed frame.
    pub fn advance(&mut self) {
        self.frame_index += 1;
        self.has_previous = true;
    }

    pub fn reset(&mut self) {
        *self = FrameClock::default();
    }
}

/// A frame's result with the diagnostics behind it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameAnalysis {
    pub result: MotionResult,
    /// `None` for the first frame after initialize/reset.
    pub stats: Option<StatisticsRecord>,
    /// Wall time of the whole frame, including the readback wait.
    pub elapsed: Duration,
}

enum Backend {
    Uninitialized,
    Ready(MotionPipeline),
    Destroyed,
}

pub struct MotionAnalyzer {
    config: AnalyzerConfig,
    shared_device: Option<Arc<GpuDevice>>,
    backend: Backend,
    clock: FrameClock,
}

impl MotionAnalyzer {
    /// An uninitialized analyzer that will create its own device.
    pub fn new(config: AnalyzerConfig) -> Self {
        MotionAnalyzer {
            config,
            shared_device: None,
            backend: Backend::Uninitialized,
            clock: FrameClock::default(),
        }
    }

    /// An uninitialized analyzer that will run on a shared device.
    ///
    /// The device's own profile and workgroup size are used; the config's
    /// `profile` is ignored.
    pub fn with_device(gpu: Arc<GpuDevice>, config: AnalyzerConfig) -> Self {
        MotionAnalyzer {
            config,
            shared_device: Some(gpu),
            backend: Backend::Uninitialized,
            clock: FrameClock::default(),
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        match self.backend {
            Backend::Uninitialized => LifecycleState::Uninitialized,
            Backend::Ready(_) => LifecycleState::Ready { has_previous: self.clock.has_previous() },
            Backend::Destroyed => LifecycleState::Destroyed,
        }
    }

    /// Number of frames analyzed successfully since initialize/reset.
    pub fn frame_index(&self) -> u64 {
        self.clock.frame_index()
    }

    /// Validate the config, acquire the device if it is not shared, compile
    /// the kernels and allocate the arena. A no-op when already ready.
    pub fn initialize(&mut self) -> Result<(), AnalyzerError> {
        if matches!(self.backend, Backend::Ready(_)) {
            return Ok(());
        }
        match self.build_pipeline() {
            Ok(pipeline) => {
                info!(
                    adapter = %pipeline.gpu().adapter_info,
                    width = self.config.width,
                    height = self.config.height,
                    levels = self.config.pyramid_levels,
                    arena_bytes = pipeline.arena().byte_size(),
                    "motion analyzer initialized"
                );
                self.backend = Backend::Ready(pipeline);
                self.clock.reset();
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "motion analyzer initialization failed");
                Err(e)
            }
        }
    }

    fn build_pipeline(&self) -> Result<MotionPipeline, AnalyzerError> {
        self.config.validate()?;
        let gpu = match &self.shared_device {
            Some(gpu) => Arc::clone(gpu),
            None => Arc::new(GpuDevice::new_with_profile(self.config.profile)?),
        };
        MotionPipeline::new(gpu, &self.config)
    }

    /// Analyze one frame; any failure yields `MotionResult::ZERO`.
    pub fn analyze_frame(&mut self, frame: &ColorFrame) -> MotionResult {
        match self.try_analyze_frame(frame) {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, frame_index = self.clock.frame_index(), "frame analysis failed");
                MotionResult::ZERO
            }
        }
    }

    /// Analyze one frame, surfacing failures.
    pub fn try_analyze_frame(&mut self, frame: &ColorFrame) -> Result<MotionResult, AnalyzerError> {
        self.analyze_frame_detailed(frame).map(|a| a.result)
    }

    /// Analyze one frame and return the statistics and timing behind the
    /// result.
    ///
    /// Initializes the analyzer first if it has never been initialized. A
    /// destroyed analyzer must be re-initialized explicitly.
    pub fn analyze_frame_detailed(&mut self, frame: &ColorFrame) -> Result<FrameAnalysis, AnalyzerError> {
        let start = Instant::now();
        if matches!(self.backend, Backend::Destroyed) {
            return Err(AnalyzerError::Destroyed);
        }
        check_frame_size(frame, &self.config)?;
        if matches!(self.backend, Backend::Uninitialized) {
            self.initialize()?;
        }
        let Backend::Ready(pipeline) = &self.backend else {
            return Err(AnalyzerError::Destroyed);
        };

        let has_previous = self.clock.has_previous();
        let raw = pipeline.run_frame(
            frame,
            self.clock.current_slot(),
            has_previous,
            self.config.readback_timeout,
        )?;
        self.clock.advance();

        let stats = raw.map(StatisticsRecord::from);
        let result = frame_result(stats.as_ref(), &self.config);
        let elapsed = start.elapsed();
        debug!(
            frame_index = self.clock.frame_index(),
            total = result.total,
            global = result.global,
            local = result.local,
            scene_cut = result.is_scene_cut,
            mean_magnitude = stats.as_ref().map(StatisticsRecord::mean_magnitude),
            elapsed_us = elapsed.as_micros() as u64,
            "frame analyzed"
        );
        Ok(FrameAnalysis { result, stats, elapsed })
    }

    /// Forget the previous frame. The next frame returns the zero result.
    pub fn reset(&mut self) {
        self.clock.reset();
    }

    /// Release the arena, kernels and (unless shared) the device.
    pub fn destroy(&mut self) {
        if !matches!(self.backend, Backend::Destroyed) {
            debug!("motion analyzer destroyed");
        }
        self.backend = Backend::Destroyed;
        self.clock.reset();
    }

    /// The resource arena, for validating kernels. `None` unless ready.
    pub fn arena(&self) -> Option<&ResourceArena> {
        match &self.backend {
            Backend::Ready(pipeline) => Some(pipeline.arena()),
            _ => None,
        }
    }

    /// The device in use. `None` unless ready.
    pub fn device(&self) -> Option<&Arc<GpuDevice>> {
        match &self.backend {
            Backend::Ready(pipeline) => Some(pipeline.gpu()),
            _ => None,
        }
    }
}

fn check_frame_size(frame: &ColorFrame, config: &AnalyzerConfig) -> Result<(), AnalyzerError> {
    let (width, height) = (config.width, config.height);
    if frame.width() != width || frame.height() != height {
        return Err(AnalyzerError::FrameSize {
            width,
            height,
            got_width: frame.width(),
            got_height: frame.height(),
        });
    }
    Ok(())
}

/// Result reported for a frame: zero without statistics (no previous
/// frame), otherwise the classification of the statistics.
pub(crate) fn frame_result(stats: Option<&StatisticsRecord>, config: &AnalyzerConfig) -> MotionResult {
    match stats {
        Some(s) => classify(s, config.total_pixels(), &config.classifier),
        None => MotionResult::ZERO,
    }
}
