// gpu/grayscale.rs — RGBA upload texture → luma in pyramid level 0.
//
// GPU counterpart of `convert::luma_image`. One bind group per frame
// parity, each writing level 0 of that parity's slot.

use crate::gpu::arena::{ResourceArena, SLOT_COUNT};
use crate::gpu::device::GpuDevice;
use crate::gpu::{compute_pipeline, dispatch, storage_texture_entry, texture_entry};

pub struct GrayscaleKernel {
    pipeline: wgpu::ComputePipeline,
    bgl: wgpu::BindGroupLayout,
}

/// Precreated bind groups, indexed by frame parity.
pub struct GrayscaleBindings {
    groups: Vec<wgpu::BindGroup>,
}

impl GrayscaleKernel {
    pub fn new(gpu: &GpuDevice) -> Self {
        let src = gpu.workgroup_size.bake(include_str!("../shaders/grayscale.wgsl"));
        let module = gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("grayscale.wgsl"),
            source: wgpu::ShaderSource::Wgsl(src.into()),
        });
        let bgl = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("grayscale BGL"),
            entries: &[
                texture_entry(0),
                storage_texture_entry(1, wgpu::TextureFormat::R32Float),
            ],
        });
        let pipeline = compute_pipeline(&gpu.device, &module, "grayscale", &[&bgl]);
        GrayscaleKernel { pipeline, bgl }
    }

    pub fn bind(&self, gpu: &GpuDevice, arena: &ResourceArena) -> GrayscaleBindings {
        let groups = (0..SLOT_COUNT)
            .map(|parity| {
                gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("grayscale bind group"),
                    layout: &self.bgl,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(&arena.upload.view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::TextureView(&arena.slots[parity].levels[0].view),
                        },
                    ],
                })
            })
            .collect();
        GrayscaleBindings { groups }
    }

    /// Record the conversion into slot `parity`.
    pub fn encode(
        &self,
        gpu: &GpuDevice,
        encoder: &mut wgpu::CommandEncoder,
        bindings: &GrayscaleBindings,
        arena: &ResourceArena,
        parity: usize,
    ) {
        dispatch(
            encoder,
            "grayscale",
            &self.pipeline,
            &[&bindings.groups[parity]],
            gpu.dispatch_size(arena.width, arena.height),
        );
    }
}
