// ===============================================================================
// GPU 后端 (wgpu compute)
// ===============================================================================

mod fill;
mod integrate;

pub use fill::{FILL_WORKGROUP_SIZE, FillKernel, FillParams};
pub use integrate::{INTEGRATE_WORKGROUP_SIZE, IntegrateBindings, IntegrateKernel, IntegrateParams};

use std::sync::{Arc, mpsc};

use glam::UVec3;
use wgpu::util::DeviceExt;

use crate::camera::CameraInfo;
use crate::depth::DepthFrame;
use crate::error::{ComputeError, ConfigError, FusionError};
use crate::grid::VoxelGridParams;
use crate::volume::VoxelVolume;

/// 一系列 GPU 算子
#[derive(Clone)]
pub struct FusionOps {
    pub integrate: IntegrateKernel,
    pub fill: FillKernel,
}

impl FusionOps {
    pub fn new(device: &wgpu::Device) -> Result<Self, ComputeError> {
        Ok(Self {
            integrate: IntegrateKernel::new(device)?,
            fill: FillKernel::new(device)?,
        })
    }
}

/// 设备端常驻体积，仅支持 f32 存储
#[derive(Debug)]
pub struct GpuVolume {
    dims: UVec3,
    len: u32,
    pub tsdf: wgpu::Buffer,
    pub weight: wgpu::Buffer,
    pub height: Option<wgpu::Buffer>,
}

impl GpuVolume {
    pub fn dims(&self) -> UVec3 {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// GPU 融合上下文：设备、队列与预编译的算子
#[derive(Clone)]
pub struct GpuFusion {
    /// wgpu 设备句柄，用于 GPU 操作
    pub device: Arc<wgpu::Device>,
    /// wgpu 队列句柄，用于提交 GPU 命令
    pub queue: Arc<wgpu::Queue>,
    pub ops: FusionOps,
}

impl GpuFusion {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Result<Self, ComputeError> {
        let ops = FusionOps::new(&device)?;
        Ok(Self { device, queue, ops })
    }

    /// 选择默认适配器并创建设备
    pub async fn request() -> Result<Self, ComputeError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| ComputeError::NoAdapter(e.to_string()))?;
        let info = adapter.get_info();
        log::info!("using GPU adapter {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                label: Some("suncg_fusion_device"),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| ComputeError::DeviceRequest(e.to_string()))?;

        Self::new(Arc::new(device), Arc::new(queue))
    }

    /// 分配设备端体积并用填充算子清零
    pub fn create_volume(
        &self,
        grid: &VoxelGridParams,
        with_height: bool,
    ) -> Result<GpuVolume, ComputeError> {
        let len = grid.num_voxels() as u32;
        check_storage_size(storage_size(len), &self.device.limits())?;
        let create = |label| {
            let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: storage_size(len),
                usage: volume_usages(),
                mapped_at_creation: false,
            });
            self.fill(&buffer, len, 0.0).map(|_| buffer)
        };
        Ok(GpuVolume {
            dims: grid.dims,
            len,
            tsdf: create("vox_tsdf")?,
            weight: create("vox_weight")?,
            height: if with_height {
                Some(create("vox_height")?)
            } else {
                None
            },
        })
    }

    /// 上传 CPU 体积
    pub fn upload(&self, volume: &VoxelVolume<f32>) -> Result<GpuVolume, ComputeError> {
        check_storage_size(storage_size(volume.len() as u32), &self.device.limits())?;
        let init = |label, data: &[f32]| {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents: bytemuck::cast_slice(non_empty(data)),
                    usage: volume_usages(),
                })
        };
        Ok(GpuVolume {
            dims: volume.dims(),
            len: volume.len() as u32,
            tsdf: init("vox_tsdf", volume.tsdf()),
            weight: init("vox_weight", volume.weight()),
            height: volume.height().map(|h| init("vox_height", h)),
        })
    }

    /// 读回为 CPU 体积
    pub fn download(
        &self,
        volume: &GpuVolume,
        grid: &VoxelGridParams,
    ) -> Result<VoxelVolume<f32>, FusionError> {
        let tsdf = self.read_buffer(&volume.tsdf, volume.len())?;
        let weight = self.read_buffer(&volume.weight, volume.len())?;
        let height = match &volume.height {
            Some(h) => Some(self.read_buffer(h, volume.len())?),
            None => None,
        };
        Ok(VoxelVolume::from_buffers(grid, tsdf, weight, height)?)
    }

    /// 将 `dst` 前 `len` 个 f32 设为 `value`
    pub fn fill(&self, dst: &wgpu::Buffer, len: u32, value: f32) -> Result<(), ComputeError> {
        self.ops.fill.compute(&self.device, &self.queue, dst, len, value)
    }

    pub fn reset(&self, volume: &GpuVolume) -> Result<(), ComputeError> {
        self.fill(&volume.tsdf, volume.len, 0.0)?;
        self.fill(&volume.weight, volume.len, 0.0)?;
        if let Some(h) = &volume.height {
            self.fill(h, volume.len, 0.0)?;
        }
        Ok(())
    }

    /// 将一帧深度积分进设备端体积
    pub fn integrate(
        &self,
        frame: &DepthFrame,
        camera: &CameraInfo,
        grid: &VoxelGridParams,
        volume: &mut GpuVolume,
    ) -> Result<(), FusionError> {
        let k = &camera.intrinsics;
        if (frame.width(), frame.height()) != (k.width, k.height) {
            return Err(ConfigError::ShapeMismatch {
                name: "depth frame",
                expected: vec![k.height as usize, k.width as usize],
                actual: vec![frame.height() as usize, frame.width() as usize],
            }
            .into());
        }
        if volume.dims != grid.dims {
            return Err(ConfigError::ShapeMismatch {
                name: "voxel volume",
                expected: grid.dims.to_array().map(|d| d as usize).to_vec(),
                actual: volume.dims.to_array().map(|d| d as usize).to_vec(),
            }
            .into());
        }

        let depth_bytes = (frame.data().len() as u64 * 4).max(4);
        check_storage_size(depth_bytes, &self.device.limits())?;
        let depth = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("depth_buffer"),
                contents: bytemuck::cast_slice(non_empty(frame.data())),
                usage: wgpu::BufferUsages::STORAGE,
            });
        let placeholder;
        let height = match &volume.height {
            Some(h) => h,
            None => {
                placeholder = self.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("vox_height_placeholder"),
                    size: 4,
                    usage: wgpu::BufferUsages::STORAGE,
                    mapped_at_creation: false,
                });
                &placeholder
            }
        };

        let params = IntegrateParams::new(camera, grid, volume.height.is_some());
        self.ops.integrate.compute(
            &self.device,
            &self.queue,
            &params,
            IntegrateBindings {
                depth: &depth,
                tsdf: &volume.tsdf,
                weight: &volume.weight,
                height,
            },
        )?;
        log::debug!("dispatched GPU integration over {} voxels", volume.len);
        Ok(())
    }

    /// CPU 体积走一遍 GPU 积分：上传、积分、读回
    pub fn integrate_volume(
        &self,
        frame: &DepthFrame,
        camera: &CameraInfo,
        grid: &VoxelGridParams,
        volume: &mut VoxelVolume<f32>,
    ) -> Result<(), FusionError> {
        volume.check_grid(grid)?;
        let mut gpu_volume = self.upload(volume)?;
        self.integrate(frame, camera, grid, &mut gpu_volume)?;
        *volume = self.download(&gpu_volume, grid)?;
        Ok(())
    }

    /// 从 GPU 读回前 `len` 个 f32
    pub fn read_buffer(&self, buffer: &wgpu::Buffer, len: usize) -> Result<Vec<f32>, ComputeError> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let size = (len * std::mem::size_of::<f32>()) as u64;
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("staging_buffer"),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback_encoder"),
            });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| ComputeError::Execution(e.to_string()))?;
        rx.recv()
            .map_err(|e| ComputeError::BufferMapping(e.to_string()))?
            .map_err(|e| ComputeError::BufferMapping(e.to_string()))?;

        let data = slice.get_mapped_range();
        let result: Vec<f32> = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        staging.unmap();
        Ok(result)
    }
}

fn volume_usages() -> wgpu::BufferUsages {
    wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST
}

/// 存储缓冲区大小须同时满足 `max_buffer_size` 与 `max_storage_buffer_binding_size`
///
/// 须在创建缓冲区之前调用。
pub fn check_storage_size(bytes: u64, limits: &wgpu::Limits) -> Result<(), ComputeError> {
    let limit = limits
        .max_buffer_size
        .min(limits.max_storage_buffer_binding_size as u64);
    if bytes > limit {
        return Err(ComputeError::BufferTooLarge {
            requested: bytes,
            limit,
        });
    }
    Ok(())
}

/// 存储缓冲区至少 4 字节
fn storage_size(len: u32) -> u64 {
    (len as u64 * 4).max(4)
}

fn non_empty(data: &[f32]) -> &[f32] {
    if data.is_empty() { &[0.0] } else { data }
}
