// gpu/device.rs — wgpu device abstraction.
//
// Responsibilities:
//   - Enumerate adapters on the primary backends and pick the best one.
//   - Expose a `DeviceProfile` that caps device limits, so an analyzer
//     developed on a desktop GPU is validated against the limits of the
//     smallest target (Raspberry Pi class hardware).
//   - Provide `WorkgroupSize`, validated against the active profile and
//     baked into every compute shader at pipeline creation.
//
// ADAPTER SELECTION:
// `request_adapter` with a power preference happily returns llvmpipe or
// another software rasterizer when one is listed first. We enumerate
// explicitly and prefer real hardware, falling back to whatever exists so
// CI machines with only a software adapter still run.
//
// DEVICE LIMITS:
// Under a non-Native profile we request *lower* limits than the hardware
// supports. wgpu validates every dispatch against the requested limits, so
// a workgroup that would be rejected on the target is rejected here too.
//
// ERROR REPORTING:
// wgpu's default uncaptured-error handler panics. The analyzer wraps every
// frame batch in error scopes and reports failures as values; anything
// that still escapes a scope is logged instead of taking the host down.
//
// The device is shared: one `Arc<GpuDevice>` may serve several analyzers
// (one per clip) and the host's other GPU work on the same queue.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

/// Hardware profile controlling device limits and the default workgroup size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeviceProfile {
    /// Use the adapter's own limits.
    #[default]
    Native,
    /// Cap limits to Raspberry Pi 4/5 (VideoCore VI/VII, V3DV) values:
    /// 256 invocations per workgroup, 4096² textures.
    RaspberryPi,
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceProfile::Native => write!(f, "Native"),
            DeviceProfile::RaspberryPi => write!(f, "RaspberryPi (simulated limits)"),
        }
    }
}

/// Workgroup size of every 2D compute dispatch.
///
/// The product must not exceed the profile's
/// `max_compute_invocations_per_workgroup`. The statistics reducer also
/// relies on it staying at or below 256 so its 32-bit workgroup partial
/// sums cannot overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkgroupSize {
    pub x: u32,
    pub y: u32,
}

/// Largest workgroup the statistics reducer accepts.
pub const MAX_WORKGROUP_INVOCATIONS: u32 = 256;

impl WorkgroupSize {
    /// Total invocations per workgroup (x * y). Widened so any pair of
    /// `u32` sides is representable.
    pub fn total(&self) -> u64 {
        u64::from(self.x) * u64::from(self.y)
    }

    /// An `x × y` workgroup checked against the profile's invocation limit
    /// and the reducer's cap.
    pub fn checked(profile: DeviceProfile, x: u32, y: u32) -> Result<Self, GpuError> {
        let ws = WorkgroupSize { x, y };
        let max = max_invocations_for_profile(profile).min(MAX_WORKGROUP_INVOCATIONS);
        let total = ws.total();
        if total == 0 || total > u64::from(max) {
            return Err(GpuError::WorkgroupTooLarge { total, max });
        }
        Ok(ws)
    }

    /// Default workgroup size for the given profile.
    ///
    /// - `Native`: 16×8 = 128 invocations (4 NVIDIA warps, 2 AMD waves).
    /// - `RaspberryPi`: 8×8 = 64 invocations, well inside V3DV's 256.
    pub fn for_profile(profile: DeviceProfile) -> Self {
        match profile {
            DeviceProfile::Native => WorkgroupSize { x: 16, y: 8 },
            DeviceProfile::RaspberryPi => WorkgroupSize { x: 8, y: 8 },
        }
    }

    /// Number of workgroups covering a `width × height` grid.
    ///
    /// Ceiling division; the shaders guard `gid >= dims`.
    pub fn dispatch_for(&self, width: u32, height: u32) -> (u32, u32) {
        (width.div_ceil(self.x), height.div_ceil(self.y))
    }

    /// Substitute `{{WG_X}}` / `{{WG_Y}}` in a WGSL template.
    ///
    /// naga does not accept `override` expressions in `@workgroup_size`,
    /// so the values are baked into the source text.
    pub fn bake(&self, template: &str) -> String {
        template
            .replace("{{WG_X}}", &self.x.to_string())
            .replace("{{WG_Y}}", &self.y.to_string())
    }
}

impl fmt::Display for WorkgroupSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}×{} ({} invocations)", self.x, self.y, self.total())
    }
}

/// Cached adapter information for logging.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub name: String,
    pub vendor: u32,
    pub device: u32,
    pub device_type: wgpu::DeviceType,
    pub backend: wgpu::Backend,
}

impl fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}, {:?})", self.name, self.backend, self.device_type)
    }
}

/// Adapter, device, queue and active profile.
///
/// # Field drop order
/// Fields drop top to bottom. `_instance` is declared last so the
/// `wgpu::Instance` outlives `device` and `queue`; some Vulkan layers
/// (dzn on WSL2) crash when the instance goes first.
pub struct GpuDevice {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub profile: DeviceProfile,
    pub adapter_info: AdapterInfo,
    pub workgroup_size: WorkgroupSize,
    _instance: wgpu::Instance,
}

impl GpuDevice {
    /// Create a device with `DeviceProfile::Native` limits.
    pub fn new() -> Result<Self, GpuError> {
        Self::new_with_profile(DeviceProfile::Native)
    }

    /// Create a device with an explicit hardware profile.
    pub fn new_with_profile(profile: DeviceProfile) -> Result<Self, GpuError> {
        pollster::block_on(Self::init_async(profile))
    }

    async fn init_async(profile: DeviceProfile) -> Result<Self, GpuError> {
        let flags = if cfg!(debug_assertions) {
            wgpu::InstanceFlags::VALIDATION
                | wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
        } else {
            wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
        };

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            flags,
            ..Default::default()
        });

        // Tiered selection:
        //   1. real or virtual hardware (Discrete / Integrated / Virtual / Other)
        //   2. anything, including CPU rasterizers
        let all_adapters = instance.enumerate_adapters(wgpu::Backends::PRIMARY);
        if all_adapters.is_empty() {
            return Err(GpuError::NoSuitableAdapter);
        }
        for a in &all_adapters {
            let info = a.get_info();
            debug!(name = %info.name, backend = ?info.backend, device_type = ?info.device_type, "adapter found");
        }

        let hardware = all_adapters
            .iter()
            .position(|a| !matches!(a.get_info().device_type, wgpu::DeviceType::Cpu))
            .unwrap_or(0);
        let adapter = all_adapters
            .into_iter()
            .nth(hardware)
            .ok_or(GpuError::NoSuitableAdapter)?;

        let raw_info = adapter.get_info();
        let adapter_info = AdapterInfo {
            name: raw_info.name.clone(),
            vendor: raw_info.vendor,
            device: raw_info.device,
            device_type: raw_info.device_type,
            backend: raw_info.backend,
        };

        // A V3D adapter under Native gets the RaspberryPi profile, so
        // `GpuDevice::new()` is correct on the Pi without every call site
        // knowing about profiles.
        let profile = match profile {
            DeviceProfile::Native if raw_info.name.to_ascii_lowercase().contains("v3d") => {
                info!("V3D adapter detected, using RaspberryPi profile");
                DeviceProfile::RaspberryPi
            }
            other => other,
        };

        let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("clip-motion"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits_for_profile(profile),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await?;

        device.on_uncaptured_error(Box::new(|e| {
            error!(error = %e, "uncaptured wgpu error");
        }));

        let workgroup_size = WorkgroupSize::for_profile(profile);
        info!(adapter = %adapter_info, %profile, workgroup = %workgroup_size, "GPU device ready");

        Ok(GpuDevice {
            device,
            queue,
            profile,
            adapter_info,
            workgroup_size,
            _instance: instance,
        })
    }

    /// Override the default workgroup size, validating against the active
    /// profile and the reducer's invocation cap.
    pub fn set_workgroup_size(&mut self, x: u32, y: u32) -> Result<(), GpuError> {
        self.workgroup_size = WorkgroupSize::checked(self.profile, x, y)?;
        Ok(())
    }

    /// Workgroups needed to cover a `width × height` grid with the active
    /// workgroup size.
    pub fn dispatch_size(&self, width: u32, height: u32) -> (u32, u32) {
        self.workgroup_size.dispatch_for(width, height)
    }
}

impl fmt::Display for GpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GpuDevice {{ adapter: {}, profile: {}, workgroup: {} }}",
            self.adapter_info, self.profile, self.workgroup_size
        )
    }
}

// ============================================================
// Limits helpers
// ============================================================

fn limits_for_profile(profile: DeviceProfile) -> wgpu::Limits {
    match profile {
        DeviceProfile::Native => wgpu::Limits::default(),

        DeviceProfile::RaspberryPi => wgpu::Limits {
            max_compute_invocations_per_workgroup: 256,
            max_compute_workgroup_size_x: 256,
            max_compute_workgroup_size_y: 256,
            max_compute_workgroup_size_z: 64,
            max_texture_dimension_2d: 4096,
            max_storage_buffer_binding_size: 128 << 20,
            ..wgpu::Limits::default()
        },
    }
}

fn max_invocations_for_profile(profile: DeviceProfile) -> u32 {
    match profile {
        DeviceProfile::Native => wgpu::Limits::default().max_compute_invocations_per_workgroup,
        DeviceProfile::RaspberryPi => 256,
    }
}

// ============================================================
// Error type
// ============================================================

/// Errors from GPU device initialization and configuration.
#[derive(Debug, Error)]
pub enum GpuError {
    /// No adapter at all on the primary backends.
    #[error("no GPU adapter found on the primary backends (Vulkan, Metal, DX12)")]
    NoSuitableAdapter,

    #[error("device request failed: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    #[error("workgroup size {total} is outside 1..={max} invocations")]
    WorkgroupTooLarge { total: u64, max: u32 },
}

// ============================================================
// Tests
// ============================================================
