// gpu/flow.rs — Gradient and Lucas-Kanade solve passes, coarse to fine.
//
// GPU counterpart of `flow::estimate_flow_levels`. Per level, coarsest
// first:
//
//   gradients_{coarsest|refine}   slot[cur].level[l], slot[prev].level[l]
//                                 (+ flow[l+1])            → gradients[l]
//   solve_{coarsest|refine}       gradients[l] (+ flow[l+1]) → flow[l]
//
// The prior is optional. The coarsest level runs the `*_coarsest` entry
// points whose pipeline layout has no group 1; finer levels bind the
// coarser flow as group 1 and run `*_refine`. No placeholder texture is
// ever bound.
//
// The window radius is baked into solve.wgsl as a constant, so the loop
// bounds are known to the shader compiler.

use crate::gpu::arena::{ResourceArena, SLOT_COUNT};
use crate::gpu::device::GpuDevice;
use crate::gpu::{compute_pipeline, dispatch, storage_texture_entry, texture_entry, uniform_entry, COMMON_WGSL};

pub struct FlowKernels {
    gradients_coarsest: wgpu::ComputePipeline,
    gradients_refine: wgpu::ComputePipeline,
    solve_coarsest: wgpu::ComputePipeline,
    solve_refine: wgpu::ComputePipeline,
    gradient_bgl: wgpu::BindGroupLayout,
    solve_bgl: wgpu::BindGroupLayout,
    prior_bgl: wgpu::BindGroupLayout,
}

/// Precreated bind groups of the flow passes.
pub struct FlowBindings {
    /// `gradients[parity][l]`: current = slot[parity], previous = slot[1 - parity].
    gradients: Vec<Vec<wgpu::BindGroup>>,
    /// `solve[l]`: gradients[l] → flow[l].
    solve: Vec<wgpu::BindGroup>,
    /// `priors[l]`: flow[l + 1] as the prior of level l; `None` at the coarsest level.
    priors: Vec<Option<wgpu::BindGroup>>,
}

impl FlowKernels {
    pub fn new(gpu: &GpuDevice, window_radius: u32) -> Self {
        let device = &gpu.device;
        let ws = gpu.workgroup_size;

        let gradient_src = ws.bake(&format!("{COMMON_WGSL}\n{}", include_str!("../shaders/gradient.wgsl")));
        let solve_src = ws
            .bake(&format!("{COMMON_WGSL}\n{}", include_str!("../shaders/solve.wgsl")))
            .replace("{{RADIUS}}", &window_radius.to_string());

        let gradient_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("gradient.wgsl"),
            source: wgpu::ShaderSource::Wgsl(gradient_src.into()),
        });
        let solve_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("solve.wgsl"),
            source: wgpu::ShaderSource::Wgsl(solve_src.into()),
        });

        let gradient_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("gradient BGL"),
            entries: &[
                texture_entry(0),
                texture_entry(1),
                storage_texture_entry(2, wgpu::TextureFormat::Rgba32Float),
            ],
        });
        let solve_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("solve BGL"),
            entries: &[
                texture_entry(0),
                storage_texture_entry(1, wgpu::TextureFormat::Rg32Float),
                uniform_entry(2),
            ],
        });
        let prior_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("prior BGL"),
            entries: &[texture_entry(0)],
        });

        FlowKernels {
            gradients_coarsest: compute_pipeline(device, &gradient_module, "gradients_coarsest", &[&gradient_bgl]),
            gradients_refine: compute_pipeline(device, &gradient_module, "gradients_refine", &[&gradient_bgl, &prior_bgl]),
            solve_coarsest: compute_pipeline(device, &solve_module, "solve_coarsest", &[&solve_bgl]),
            solve_refine: compute_pipeline(device, &solve_module, "solve_refine", &[&solve_bgl, &prior_bgl]),
            gradient_bgl,
            solve_bgl,
            prior_bgl,
        }
    }

    pub fn bind(&self, gpu: &GpuDevice, arena: &ResourceArena) -> FlowBindings {
        let device = &gpu.device;
        let levels = arena.num_levels();
        fn view(v: &wgpu::TextureView) -> wgpu::BindingResource<'_> {
            wgpu::BindingResource::TextureView(v)
        }

        let gradients = (0..SLOT_COUNT)
            .map(|parity| {
                let current = &arena.slots[parity].levels;
                let previous = &arena.slots[(parity + 1) % SLOT_COUNT].levels;
                (0..levels)
                    .map(|l| {
                        device.create_bind_group(&wgpu::BindGroupDescriptor {
                            label: Some("gradient bind group"),
                            layout: &self.gradient_bgl,
                            entries: &[
                                wgpu::BindGroupEntry { binding: 0, resource: view(&current[l].view) },
                                wgpu::BindGroupEntry { binding: 1, resource: view(&previous[l].view) },
                                wgpu::BindGroupEntry { binding: 2, resource: view(&arena.gradients[l].view) },
                            ],
                        })
                    })
                    .collect()
            })
            .collect();

        let solve = (0..levels)
            .map(|l| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("solve bind group"),
                    layout: &self.solve_bgl,
                    entries: &[
                        wgpu::BindGroupEntry { binding: 0, resource: view(&arena.gradients[l].view) },
                        wgpu::BindGroupEntry { binding: 1, resource: view(&arena.flows[l].view) },
                        wgpu::BindGroupEntry { binding: 2, resource: arena.level_params[l].as_entire_binding() },
                    ],
                })
            })
            .collect();

        let priors = (0..levels)
            .map(|l| {
                arena.flows.get(l + 1).map(|coarser| {
                    device.create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some("prior bind group"),
                        layout: &self.prior_bgl,
                        entries: &[wgpu::BindGroupEntry { binding: 0, resource: view(&coarser.view) }],
                    })
                })
            })
            .collect();

        FlowBindings { gradients, solve, priors }
    }

    /// Record gradients and solve for every level, coarsest first, with the
    /// current frame in slot `parity`.
    pub fn encode(
        &self,
        gpu: &GpuDevice,
        encoder: &mut wgpu::CommandEncoder,
        bindings: &FlowBindings,
        arena: &ResourceArena,
        parity: usize,
    ) {
        for l in (0..arena.num_levels()).rev() {
            let dims = &arena.flows[l];
            let workgroups = gpu.dispatch_size(dims.width, dims.height);
            let gradients = &bindings.gradients[parity][l];
            let solve = &bindings.solve[l];

            match &bindings.priors[l] {
                None => {
                    dispatch(encoder, "gradients_coarsest", &self.gradients_coarsest, &[gradients], workgroups);
                    dispatch(encoder, "solve_coarsest", &self.solve_coarsest, &[solve], workgroups);
                }
                Some(prior) => {
                    dispatch(encoder, "gradients_refine", &self.gradients_refine, &[gradients, prior], workgroups);
                    dispatch(encoder, "solve_refine", &self.solve_refine, &[solve, prior], workgroups);
                }
            }
        }
    }
}
