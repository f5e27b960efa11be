// gpu/pyramid.rs — GPU luma pyramid.
//
// GPU counterpart of `Pyramid::build`: level k of a frame slot is written
// from level k-1 of the same slot by one `downsample` dispatch (5-tap
// binomial at even source pixels, clamp-to-edge). Level 0 is written by the
// grayscale kernel beforehand.
//
// All levels live in the arena as R32Float textures with luma in [0, 1],
// the same range as the CPU `Image<f32>` levels, so a readback can be
// compared against the CPU reference directly.
//
// Bind groups are precreated for every (parity, level ≥ 1) pair; recording
// a pyramid is L-1 dispatches and no allocation.

use crate::gpu::arena::{ResourceArena, SLOT_COUNT};
use crate::gpu::device::GpuDevice;
use crate::gpu::{compute_pipeline, dispatch, storage_texture_entry, texture_entry};

pub struct PyramidKernel {
    pipeline: wgpu::ComputePipeline,
    bgl: wgpu::BindGroupLayout,
}

/// `groups[parity][k - 1]` reads level k-1 and writes level k.
pub struct PyramidBindings {
    groups: Vec<Vec<wgpu::BindGroup>>,
}

impl PyramidKernel {
    pub fn new(gpu: &GpuDevice) -> Self {
        let src = gpu.workgroup_size.bake(include_str!("../shaders/pyramid.wgsl"));
        let module = gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("pyramid.wgsl"),
            source: wgpu::ShaderSource::Wgsl(src.into()),
        });
        let bgl = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("pyramid BGL"),
            entries: &[
                texture_entry(0),
                storage_texture_entry(1, wgpu::TextureFormat::R32Float),
            ],
        });
        let pipeline = compute_pipeline(&gpu.device, &module, "downsample", &[&bgl]);
        PyramidKernel { pipeline, bgl }
    }

    pub fn bind(&self, gpu: &GpuDevice, arena: &ResourceArena) -> PyramidBindings {
        let groups = (0..SLOT_COUNT)
            .map(|parity| {
                let levels = &arena.slots[parity].levels;
                (1..levels.len())
                    .map(|k| {
                        gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                            label: Some("pyramid level bind group"),
                            layout: &self.bgl,
                            entries: &[
                                wgpu::BindGroupEntry {
                                    binding: 0,
                                    resource: wgpu::BindingResource::TextureView(&levels[k - 1].view),
                                },
                                wgpu::BindGroupEntry {
                                    binding: 1,
                                    resource: wgpu::BindingResource::TextureView(&levels[k].view),
                                },
                            ],
                        })
                    })
                    .collect()
            })
            .collect();
        PyramidBindings { groups }
    }

    /// Record levels 1.. of slot `parity`.
    pub fn encode(
        &self,
        gpu: &GpuDevice,
        encoder: &mut wgpu::CommandEncoder,
        bindings: &PyramidBindings,
        arena: &ResourceArena,
        parity: usize,
    ) {
        let levels = &arena.slots[parity].levels;
        for (i, group) in bindings.groups[parity].iter().enumerate() {
            let dst = &levels[i + 1];
            dispatch(
                encoder,
                "downsample",
                &self.pipeline,
                &[group],
                gpu.dispatch_size(dst.width, dst.height),
            );
        }
    }
}
