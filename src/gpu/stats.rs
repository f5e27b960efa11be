// gpu/stats.rs — Finest flow field → statistics buffer → readback buffer.
//
// GPU counterpart of `stats::accumulate`. Recorded as
//
//   clear_buffer(stats)            every accumulator back to zero
//   reduce                         flow[0] → stats (workgroup partials,
//                                  then 64-bit (lo, hi) global adds)
//   copy_buffer_to_buffer          stats → readback
//
// The host maps `readback` after the submit (`ResourceArena::read_statistics`).

use crate::gpu::arena::{ResourceArena, STATS_BYTES};
use crate::gpu::device::GpuDevice;
use crate::gpu::{compute_pipeline, dispatch, storage_buffer_entry, texture_entry, uniform_entry};

pub struct StatsKernel {
    pipeline: wgpu::ComputePipeline,
    bgl: wgpu::BindGroupLayout,
}

pub struct StatsBindings {
    group: wgpu::BindGroup,
}

impl StatsKernel {
    pub fn new(gpu: &GpuDevice) -> Self {
        let src = gpu.workgroup_size.bake(include_str!("../shaders/stats.wgsl"));
        let module = gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("stats.wgsl"),
            source: wgpu::ShaderSource::Wgsl(src.into()),
        });
        let bgl = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("stats BGL"),
            entries: &[texture_entry(0), storage_buffer_entry(1), uniform_entry(2)],
        });
        let pipeline = compute_pipeline(&gpu.device, &module, "reduce", &[&bgl]);
        StatsKernel { pipeline, bgl }
    }

    pub fn bind(&self, gpu: &GpuDevice, arena: &ResourceArena) -> StatsBindings {
        let group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("stats bind group"),
            layout: &self.bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&arena.flows[0].view),
                },
                wgpu::BindGroupEntry { binding: 1, resource: arena.stats.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: arena.stats_params.as_entire_binding() },
            ],
        });
        StatsBindings { group }
    }

    /// Record clear, reduction and copy into the readback buffer.
    pub fn encode(
        &self,
        gpu: &GpuDevice,
        encoder: &mut wgpu::CommandEncoder,
        bindings: &StatsBindings,
        arena: &ResourceArena,
    ) {
        encoder.clear_buffer(&arena.stats, 0, None);
        dispatch(
            encoder,
            "reduce",
            &self.pipeline,
            &[&bindings.group],
            gpu.dispatch_size(arena.width, arena.height),
        );
        encoder.copy_buffer_to_buffer(&arena.stats, 0, &arena.readback, 0, STATS_BYTES);
    }
}
