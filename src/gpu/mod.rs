// gpu/mod.rs — wgpu compute pipeline of the motion analyzer.
//
// The CPU modules in the parent crate (convert, pyramid, gradient, flow,
// stats) are the authoritative reference; every kernel here is validated
// against them in the `#[ignore]` GPU tests.
//
// One frame is one command buffer:
//
//   write_texture(upload)
//   grayscale      upload            → slot[cur].level[0]
//   downsample     slot[cur].level[k-1] → slot[cur].level[k]
//   per level L-1 .. 0 (only when a previous frame exists):
//     gradients    slot[cur].level[l], slot[prev].level[l], flow[l+1]? → gradients[l]
//     solve        gradients[l], flow[l+1]?                            → flow[l]
//   clear_buffer(stats)
//   reduce         flow[0] → stats
//   copy           stats → readback
//
// The only host/device synchronisation point is mapping the readback
// buffer. All textures, buffers and bind groups are created once in
// `initialize()` and reused every frame.

pub mod arena;
pub mod device;
pub mod flow;
pub mod grayscale;
pub mod pipeline;
pub mod pyramid;
pub mod stats;

/// Helpers shared by gradient.wgsl and solve.wgsl, prepended to their source.
pub(crate) const COMMON_WGSL: &str = include_str!("../shaders/common.wgsl");

// ---------------------------------------------------------------------------
// Bind group layout entries
// ---------------------------------------------------------------------------

/// `texture_2d<f32>` read with `textureLoad`.
pub(crate) fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Texture {
            multisampled: false,
            view_dimension: wgpu::TextureViewDimension::D2,
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
        },
        count: None,
    }
}

/// `texture_storage_2d<format, write>`.
pub(crate) fn storage_texture_entry(binding: u32, format: wgpu::TextureFormat) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        count: None,
    }
}

pub(crate) fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

pub(crate) fn storage_buffer_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: false },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Compile a compute pipeline for one entry point of `module`.
pub(crate) fn compute_pipeline(
    device: &wgpu::Device,
    module: &wgpu::ShaderModule,
    entry_point: &str,
    layouts: &[&wgpu::BindGroupLayout],
) -> wgpu::ComputePipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(entry_point),
        bind_group_layouts: layouts,
        push_constant_ranges: &[],
    });
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(entry_point),
        layout: Some(&layout),
        module,
        entry_point,
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache: None,
    })
}

/// Record one compute dispatch in its own pass.
pub(crate) fn dispatch(
    encoder: &mut wgpu::CommandEncoder,
    label: &str,
    pipeline: &wgpu::ComputePipeline,
    bind_groups: &[&wgpu::BindGroup],
    workgroups: (u32, u32),
) {
    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some(label),
        timestamp_writes: None,
    });
    pass.set_pipeline(pipeline);
    for (i, group) in bind_groups.iter().enumerate() {
        pass.set_bind_group(i as u32, *group, &[]);
    }
    pass.dispatch_workgroups(workgroups.0, workgroups.1, 1);
}
