//! GPU operator: 批量填充 f32 缓冲区

use bytemuck::{Pod, Zeroable};
use wgpu::{ShaderStages, util::DeviceExt};

use crate::error::ComputeError;
use crate::fill::{FillPlan, MAX_TASKS};

/// 与 fill.wgsl 中 `@workgroup_size` 一致
pub const FILL_WORKGROUP_SIZE: usize = 256;

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct FillParams {
    pub len: u32,
    pub run_len: u32,
    pub value: f32,
    _padding: u32,
}

impl FillParams {
    pub fn new(len: u32, run_len: u32, value: f32) -> Self {
        Self {
            len,
            run_len,
            value,
            _padding: 0,
        }
    }
    pub fn min_binding_size() -> Option<wgpu::BufferSize> {
        wgpu::BufferSize::new(std::mem::size_of::<Self>() as u64)
    }
}

#[derive(Clone)]
pub struct FillKernel {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl FillKernel {
    pub fn new(device: &wgpu::Device) -> Result<Self, ComputeError> {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("fill.wgsl"),
            source: wgpu::ShaderSource::Wgsl(include_str!("fill.wgsl").into()),
        });
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("fill_layout"),
            entries: &[
                // binding 0: FillParams
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: FillParams::min_binding_size(),
                    },
                    count: None,
                },
                // binding 1: 目标缓冲区
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(4),
                    },
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("fill_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("fill_pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("cs_main"),
            compilation_options: Default::default(),
            cache: None,
        });
        Ok(Self {
            pipeline,
            bind_group_layout,
        })
    }

    /// 将 `dst` 前 `len` 个 f32 设为 `value`
    pub fn compute(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        dst: &wgpu::Buffer,
        len: u32,
        value: f32,
    ) -> Result<(), ComputeError> {
        if (len as u64) * 4 > dst.size() {
            return Err(ComputeError::ShapeMismatch {
                expected: vec![len as usize],
                actual: vec![(dst.size() / 4) as usize],
            });
        }
        let plan = FillPlan::with_limits(len as usize, MAX_TASKS, FILL_WORKGROUP_SIZE);
        if plan.tasks == 0 {
            return Ok(());
        }

        let params = FillParams::new(len, plan.run_len as u32, value);
        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("fill_params_buffer"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("fill_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: dst.as_entire_binding(),
                },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("fill_command_encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("fill_compute_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(plan.tasks as u32, 1, 1);
        }
        queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}
