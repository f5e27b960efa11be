// gpu/arena.rs — Fixed resource arena of the analyzer.
//
// Everything the per-frame batch touches is allocated here once, sized to
// the constant analysis resolution and pyramid depth, and indexed by
// (frame parity, pyramid level):
//
//   upload              Rgba8Unorm    the incoming frame (queue.write_texture)
//   slots[2].levels[L]  R32Float      luma pyramid per frame parity; level 0
//                                     is the grayscale image itself
//   gradients[L]        Rgba32Float   (Ix, Iy, It, 0) per level
//   flows[L]            Rg32Float     (u, v) per level
//   level_params[L]     uniform       LevelParams, written at creation
//   stats_params        uniform       StatsParams, written at creation
//   stats               storage       RawStatistics, cleared every frame
//   readback            MAP_READ      copy of `stats` for the host
//
// Slots alternate by parity of the frame counter, so the previous frame's
// pyramid is still intact while the current one is built. Dropping the
// arena releases every resource at once.
//
// The readback helpers at the bottom copy one texture to a fresh buffer and
// block; they exist for validating kernels against the CPU reference and
// are not used on the per-frame path.

use std::sync::mpsc::{self, TryRecvError};
use std::time::{Duration, Instant};

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::config::{AnalyzerConfig, FIXED_POINT_SCALE, MAX_ACCUMULATED_MAGNITUDE};
use crate::error::AnalyzerError;
use crate::flow::FlowField;
use crate::frame::{ColorFrame, RGBA_BYTES_PER_PIXEL};
use crate::gpu::device::GpuDevice;
use crate::gradient::GradientSet;
use crate::image::Image;
use crate::pyramid::level_dimensions;
use crate::stats::{RawStatistics, STATS_WORDS};

/// Frame slots: current and previous, selected by frame parity.
pub const SLOT_COUNT: usize = 2;

/// Size of the statistics buffer in bytes.
pub const STATS_BYTES: u64 = (STATS_WORDS * 4) as u64;

/// Host-side poll interval while waiting for the statistics map.
const POLL_INTERVAL: Duration = Duration::from_micros(200);

// ---------------------------------------------------------------------------
// Uniform layouts (must match the WGSL structs exactly)
// ---------------------------------------------------------------------------

/// `LevelParams` in solve.wgsl. 16 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct LevelParams {
    pub width: u32,
    pub height: u32,
    pub min_eigenvalue: f32,
    pub _pad: u32,
}

/// `StatsParams` in stats.wgsl. 32 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct StatsParams {
    pub width: u32,
    pub height: u32,
    pub significance: f32,
    pub scale: f32,
    pub max_magnitude: f32,
    pub _pad: [u32; 3],
}

// ---------------------------------------------------------------------------
// Textures
// ---------------------------------------------------------------------------

/// One 2D texture with its default view.
pub struct LevelTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
}

impl LevelTexture {
    fn new(
        device: &wgpu::Device,
        (width, height): (u32, u32),
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
        label: &str,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        LevelTexture { texture, view, width, height, format }
    }

    /// Working texture written by one kernel and read by the next.
    fn working(device: &wgpu::Device, dims: (u32, u32), format: wgpu::TextureFormat, label: &str) -> Self {
        Self::new(
            device,
            dims,
            format,
            wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            label,
        )
    }

    fn byte_size(&self) -> u64 {
        let bpp = self.format.block_copy_size(None).unwrap_or(4) as u64;
        self.width as u64 * self.height as u64 * bpp
    }
}

/// The luma pyramid of one frame parity.
pub struct FrameSlot {
    pub levels: Vec<LevelTexture>,
}

// ---------------------------------------------------------------------------
// ResourceArena
// ---------------------------------------------------------------------------

pub struct ResourceArena {
    pub width: u32,
    pub height: u32,
    pub upload: LevelTexture,
    pub slots: [FrameSlot; SLOT_COUNT],
    pub gradients: Vec<LevelTexture>,
    pub flows: Vec<LevelTexture>,
    pub level_params: Vec<wgpu::Buffer>,
    pub stats_params: wgpu::Buffer,
    pub stats: wgpu::Buffer,
    pub readback: wgpu::Buffer,
}

impl ResourceArena {
    /// Allocate every resource for `config`. The config must already be
    /// validated.
    pub fn new(gpu: &GpuDevice, config: &AnalyzerConfig) -> Self {
        let device = &gpu.device;
        let dims = level_dimensions(config.width, config.height, config.pyramid_levels);

        let upload = LevelTexture::new(
            device,
            (config.width, config.height),
            wgpu::TextureFormat::Rgba8Unorm,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            "arena upload",
        );

        let slot = |parity: usize| FrameSlot {
            levels: dims
                .iter()
                .enumerate()
                .map(|(l, &d)| {
                    LevelTexture::working(device, d, wgpu::TextureFormat::R32Float, &format!("slot {parity} level {l}"))
                })
                .collect(),
        };
        let slots = [slot(0), slot(1)];

        let gradients = dims
            .iter()
            .enumerate()
            .map(|(l, &d)| LevelTexture::working(device, d, wgpu::TextureFormat::Rgba32Float, &format!("gradients {l}")))
            .collect();
        let flows = dims
            .iter()
            .enumerate()
            .map(|(l, &d)| LevelTexture::working(device, d, wgpu::TextureFormat::Rg32Float, &format!("flow {l}")))
            .collect();

        let level_params = dims
            .iter()
            .map(|&(width, height)| {
                let params = LevelParams { width, height, min_eigenvalue: config.min_eigenvalue, _pad: 0 };
                device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("LevelParams"),
                    contents: bytemuck::bytes_of(&params),
                    usage: wgpu::BufferUsages::UNIFORM,
                })
            })
            .collect();

        let stats_params = StatsParams {
            width: config.width,
            height: config.height,
            significance: config.significance_threshold,
            scale: FIXED_POINT_SCALE,
            max_magnitude: MAX_ACCUMULATED_MAGNITUDE,
            _pad: [0; 3],
        };
        let stats_params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("StatsParams"),
            contents: bytemuck::bytes_of(&stats_params),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let stats = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("arena stats"),
            size: STATS_BYTES,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("arena stats readback"),
            size: STATS_BYTES,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        ResourceArena {
            width: config.width,
            height: config.height,
            upload,
            slots,
            gradients,
            flows,
            level_params,
            stats_params,
            stats,
            readback,
        }
    }

    pub fn num_levels(&self) -> usize {
        self.flows.len()
    }

    /// Approximate device memory held by the arena, in bytes.
    pub fn byte_size(&self) -> u64 {
        let textures = std::iter::once(&self.upload)
            .chain(self.slots.iter().flat_map(|s| s.levels.iter()))
            .chain(self.gradients.iter())
            .chain(self.flows.iter())
            .map(LevelTexture::byte_size)
            .sum::<u64>();
        textures + 2 * STATS_BYTES
    }

    /// Queue the frame's RGBA bytes for the upload texture. The write is
    /// ordered before the next submitted command buffer.
    pub fn upload_frame(&self, gpu: &GpuDevice, frame: &ColorFrame) {
        gpu.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &self.upload.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            frame.as_bytes(),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(frame.width() * RGBA_BYTES_PER_PIXEL as u32),
                rows_per_image: Some(frame.height()),
            },
            wgpu::Extent3d {
                width: frame.width(),
                height: frame.height(),
                depth_or_array_layers: 1,
            },
        );
    }

    /// Map the readback buffer (filled by the last submitted batch) and
    /// decode it.
    ///
    /// On timeout the pending map is aborted so the buffer can be reused by
    /// the next frame.
    pub fn read_statistics(&self, gpu: &GpuDevice, timeout: Option<Duration>) -> Result<RawStatistics, AnalyzerError> {
        let slice = self.readback.slice(..);
        if let Err(e) = wait_for_map(&gpu.device, slice, timeout) {
            self.readback.unmap();
            return Err(e);
        }
        let raw = {
            let mapped = slice.get_mapped_range();
            bytemuck::pod_read_unaligned::<RawStatistics>(&mapped)
        };
        self.readback.unmap();
        Ok(raw)
    }

    // -----------------------------------------------------------------------
    // Readback (validation only)
    // -----------------------------------------------------------------------

    /// Read pyramid level `level` of frame slot `slot` back to the host.
    pub fn readback_level(&self, gpu: &GpuDevice, slot: usize, level: usize) -> Result<Image<f32>, AnalyzerError> {
        let tex = &self.slots[slot].levels[level];
        let data = readback_texture(gpu, tex, 1)?;
        Ok(Image::from_vec(tex.width as usize, tex.height as usize, data))
    }

    /// Read the flow field of `level` back to the host.
    pub fn readback_flow(&self, gpu: &GpuDevice, level: usize) -> Result<FlowField, AnalyzerError> {
        let tex = &self.flows[level];
        let data = readback_texture(gpu, tex, 2)?;
        let (w, h) = (tex.width as usize, tex.height as usize);
        Ok(FlowField {
            u: Image::from_vec(w, h, data.iter().step_by(2).copied().collect()),
            v: Image::from_vec(w, h, data.iter().skip(1).step_by(2).copied().collect()),
        })
    }

    /// Read the packed gradients of `level` back to the host.
    pub fn readback_gradients(&self, gpu: &GpuDevice, level: usize) -> Result<GradientSet, AnalyzerError> {
        let tex = &self.gradients[level];
        let data = readback_texture(gpu, tex, 4)?;
        let (w, h) = (tex.width as usize, tex.height as usize);
        let channel = |c: usize| Image::from_vec(w, h, data.iter().skip(c).step_by(4).copied().collect());
        Ok(GradientSet { ix: channel(0), iy: channel(1), it: channel(2) })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Round `value` up to the next multiple of `alignment`.
#[inline]
pub(crate) fn align_to(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

/// Request a read map of `slice` and block until it completes.
///
/// `None` waits indefinitely (`Maintain::Wait`). With a limit the device is
/// polled until the callback fires or the limit expires; the caller must
/// `unmap` the buffer on `ReadbackTimeout` to cancel the pending map.
pub(crate) fn wait_for_map(
    device: &wgpu::Device,
    slice: wgpu::BufferSlice<'_>,
    timeout: Option<Duration>,
) -> Result<(), AnalyzerError> {
    let (tx, rx) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        // The receiver is gone only if the waiter already gave up.
        let _ = tx.send(result);
    });

    let dropped = || AnalyzerError::Device("buffer map callback was dropped".to_string());

    let Some(limit) = timeout else {
        device.poll(wgpu::Maintain::Wait);
        return Ok(rx.recv().map_err(|_| dropped())??);
    };

    let start = Instant::now();
    loop {
        device.poll(wgpu::Maintain::Poll);
        match rx.try_recv() {
            Ok(result) => return Ok(result?),
            Err(TryRecvError::Disconnected) => return Err(dropped()),
            Err(TryRecvError::Empty) => {}
        }
        if start.elapsed() >= limit {
            return Err(AnalyzerError::ReadbackTimeout(limit));
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Copy a float texture with `channels` f32 components per texel into a
/// tightly packed host vector.
fn readback_texture(gpu: &GpuDevice, tex: &LevelTexture, channels: u32) -> Result<Vec<f32>, AnalyzerError> {
    let bytes_per_pixel = 4 * channels;
    let row_bytes = tex.width * bytes_per_pixel;
    let aligned_bytes_per_row = align_to(row_bytes, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);

    let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("ResourceArena::readback_texture"),
        size: (aligned_bytes_per_row * tex.height) as u64,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("ResourceArena::readback_texture"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::ImageCopyTexture {
            texture: &tex.texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyBuffer {
            buffer: &buffer,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(aligned_bytes_per_row),
                rows_per_image: Some(tex.height),
            },
        },
        wgpu::Extent3d { width: tex.width, height: tex.height, depth_or_array_layers: 1 },
    );
    gpu.queue.submit(std::iter::once(encoder.finish()));

    let slice = buffer.slice(..);
    wait_for_map(&gpu.device, slice, None)?;

    // Strip the row padding.
    let mut out = Vec::with_capacity((tex.width * tex.height * channels) as usize);
    {
        let mapped = slice.get_mapped_range();
        for y in 0..tex.height as usize {
            let start = y * aligned_bytes_per_row as usize;
            let row = &mapped[start..start + row_bytes as usize];
            out.extend(row.chunks_exact(4).map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])));
        }
    }
    buffer.unmap();
    Ok(out)
}
