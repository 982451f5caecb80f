//! GPU operator: 单帧 TSDF 积分
//!
//! 与 CPU 后端语义一致：每个 invocation 负责一个 (z, y) 行。

use bytemuck::{Pod, Zeroable};
use glam::{UVec3, Vec3, Vec4};
use wgpu::{ShaderStages, util::DeviceExt};

use crate::camera::CameraInfo;
use crate::error::ComputeError;
use crate::grid::VoxelGridParams;
use crate::integrate::MAX_DEPTH;

/// 与 integrate.wgsl 中 `@workgroup_size` 一致
pub const INTEGRATE_WORKGROUP_SIZE: u32 = 64;

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct IntegrateParams {
    pub pose_rows: [Vec4; 4], // camera-to-world 的 4 行
    pub intrinsics: Vec4,     // fx, fy, cx, cy
    pub origin: Vec3,
    pub vox_unit: f32,
    pub dims: UVec3,
    pub has_height: u32,
    pub frame_width: u32,
    pub frame_height: u32,
    pub vox_margin: f32,
    pub max_depth: f32,
}

impl IntegrateParams {
    pub fn new(camera: &CameraInfo, grid: &VoxelGridParams, has_height: bool) -> Self {
        let m = camera.pose.row_major();
        let row = |r: usize| Vec4::new(m[r * 4], m[r * 4 + 1], m[r * 4 + 2], m[r * 4 + 3]);
        let k = &camera.intrinsics;
        Self {
            pose_rows: [row(0), row(1), row(2), row(3)],
            intrinsics: Vec4::new(k.fx, k.fy, k.cx, k.cy),
            origin: grid.origin,
            vox_unit: grid.vox_unit,
            dims: grid.dims,
            has_height: has_height as u32,
            frame_width: k.width,
            frame_height: k.height,
            vox_margin: grid.vox_margin,
            max_depth: MAX_DEPTH,
        }
    }
    pub fn min_binding_size() -> Option<wgpu::BufferSize> {
        wgpu::BufferSize::new(std::mem::size_of::<Self>() as u64)
    }
}

/// 积分所需的设备端缓冲区
pub struct IntegrateBindings<'a> {
    pub depth: &'a wgpu::Buffer,
    pub tsdf: &'a wgpu::Buffer,
    pub weight: &'a wgpu::Buffer,
    /// 无高度场时绑定一个占位缓冲区
    pub height: &'a wgpu::Buffer,
}

#[derive(Clone)]
pub struct IntegrateKernel {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl IntegrateKernel {
    pub fn new(device: &wgpu::Device) -> Result<Self, ComputeError> {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("integrate.wgsl"),
            source: wgpu::ShaderSource::Wgsl(include_str!("integrate.wgsl").into()),
        });
        let desc = |i, read_only| wgpu::BindGroupLayoutEntry {
            binding: i,
            visibility: ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: wgpu::BufferSize::new(4),
            },
            count: None,
        };
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("integrate_layout"),
            entries: &[
                // binding 0: IntegrateParams
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: IntegrateParams::min_binding_size(),
                    },
                    count: None,
                },
                // binding 1: 深度图
                desc(1, true),
                // binding 2: tsdf
                desc(2, false),
                // binding 3: weight
                desc(3, false),
                // binding 4: height
                desc(4, false),
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("integrate_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("integrate_pipeline"),
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

    pub fn compute(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        params: &IntegrateParams,
        bindings: IntegrateBindings<'_>,
    ) -> Result<(), ComputeError> {
        let groups_x = params.dims.y.div_ceil(INTEGRATE_WORKGROUP_SIZE);
        let groups_y = params.dims.z;
        let limit = device.limits().max_compute_workgroups_per_dimension;
        for requested in [groups_x, groups_y] {
            if requested > limit {
                return Err(ComputeError::DispatchTooLarge { requested, limit });
            }
        }

        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("integrate_params_buffer"),
            contents: bytemuck::bytes_of(params),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("integrate_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: bindings.depth.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: bindings.tsdf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: bindings.weight.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: bindings.height.as_entire_binding(),
                },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("integrate_command_encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("integrate_compute_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            // x: y 行, y: z 切片
            pass.dispatch_workgroups(groups_x, groups_y, 1);
        }
        queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}
