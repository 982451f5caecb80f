//! 单帧投影式 TSDF 积分（CPU 后端）
//!
//! 每个体素独立处理：世界点 -> 相机坐标 -> 像素 -> 采样深度 -> 沿视线的有符号距离
//! -> 运行加权平均。每个 (z, y) 行由一个 rayon 任务顺序遍历 x，
//! 任意两个体素不会写同一内存。

use std::ops::{Add, AddAssign};

use glam::Vec3;
use rayon::prelude::*;

use crate::camera::CameraInfo;
use crate::depth::DepthFrame;
use crate::error::ConfigError;
use crate::grid::VoxelGridParams;
use crate::storage::VoxelStorage;
use crate::volume::VoxelVolume;

/// 有效深度上限（米）
pub const MAX_DEPTH: f32 = 10.0;
/// 无有效表面估计
pub const TSDF_SENTINEL: f32 = -1.0;
pub const HEIGHT_OFFSET: f32 = 0.2;
pub const HEIGHT_RANGE: f32 = 2.5;

/// 单个体素在一帧中的观测结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VoxelObservation {
    /// 相机坐标 z <= 0
    BehindCamera,
    /// 投影落在画面外
    OutOfView,
    /// 采样深度不在 [0, MAX_DEPTH]
    DepthOutOfRange,
    /// 采样深度四舍五入为 0（传感器无回波）
    MissingDepth,
    /// 体素位于遮挡表面之后超过截断距离
    Occluded,
    Observed { sdf: f32 },
}

impl VoxelObservation {
    /// 不写任何缓冲区
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            Self::BehindCamera | Self::OutOfView | Self::DepthOutOfRange
        )
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IntegrationStats {
    pub updated: usize,
    pub sentinel: usize,
    pub skipped: usize,
}

impl Add for IntegrationStats {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            updated: self.updated + rhs.updated,
            sentinel: self.sentinel + rhs.sentinel,
            skipped: self.skipped + rhs.skipped,
        }
    }
}

impl AddAssign for IntegrationStats {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// 世界坐标竖直分量归一化到 [0, 1]
#[inline]
pub fn normalized_height(world: Vec3) -> f32 {
    ((world.z + HEIGHT_OFFSET) / HEIGHT_RANGE).clamp(0.0, 1.0)
}

/// 观测一个世界点
pub fn observe_voxel(
    world: Vec3,
    camera: &CameraInfo,
    frame: &DepthFrame,
    margin: f32,
) -> VoxelObservation {
    let p = camera.pose.world_to_camera(world);
    if p.z <= 0.0 {
        return VoxelObservation::BehindCamera;
    }
    let Some((px, py)) = camera.intrinsics.project(p) else {
        return VoxelObservation::OutOfView;
    };
    let depth = frame.get(px, py);
    if !(0.0..=MAX_DEPTH).contains(&depth) {
        return VoxelObservation::DepthOutOfRange;
    }
    if depth.round() == 0.0 {
        return VoxelObservation::MissingDepth;
    }

    // 轴向深度差换算为沿视线的欧氏距离
    let rx = p.x / p.z;
    let ry = p.y / p.z;
    let dist = (depth - p.z) * (1.0 + rx * rx + ry * ry).sqrt();
    if dist > -margin {
        VoxelObservation::Observed {
            sdf: (dist / margin).min(1.0),
        }
    } else {
        VoxelObservation::Occluded
    }
}

/// 运行加权平均，返回 `(tsdf_new, weight_new)`
#[inline]
pub fn fuse_sdf(tsdf_old: f32, weight_old: f32, sdf: f32) -> (f32, f32) {
    let weight_new = weight_old + 1.0;
    ((tsdf_old * weight_old + sdf) / weight_new, weight_new)
}

/// 积分前的输入校验：任何不一致都在修改体积之前报出
pub fn check_inputs<S: VoxelStorage>(
    frame: &DepthFrame,
    camera: &CameraInfo,
    grid: &VoxelGridParams,
    volume: &VoxelVolume<S>,
) -> Result<(), ConfigError> {
    let k = &camera.intrinsics;
    if (frame.width(), frame.height()) != (k.width, k.height) {
        return Err(ConfigError::ShapeMismatch {
            name: "depth frame",
            expected: vec![k.height as usize, k.width as usize],
            actual: vec![frame.height() as usize, frame.width() as usize],
        });
    }
    volume.check_grid(grid)
}

/// 将一帧深度积分进体积
///
/// 体积带 `height` 缓冲区时一并写入高度场。跳过的体素（相机后方、画面外、
/// 深度越界）三个缓冲区都保持原样。
pub fn integrate<S: VoxelStorage>(
    frame: &DepthFrame,
    camera: &CameraInfo,
    grid: &VoxelGridParams,
    volume: &mut VoxelVolume<S>,
) -> Result<IntegrationStats, ConfigError> {
    check_inputs(frame, camera, grid, volume)?;

    let nx = grid.nx();
    let ctx = RowContext {
        frame,
        camera,
        grid,
    };
    let buffers = volume.buffers_mut();
    let rows = buffers
        .tsdf
        .par_chunks_mut(nx)
        .zip(buffers.weight.par_chunks_mut(nx));

    let stats = match buffers.height {
        Some(height) => rows
            .zip(height.par_chunks_mut(nx))
            .enumerate()
            .map(|(row, ((tsdf, weight), height))| ctx.integrate_row(row, tsdf, weight, Some(height)))
            .reduce(IntegrationStats::default, Add::add),
        None => rows
            .enumerate()
            .map(|(row, (tsdf, weight))| ctx.integrate_row(row, tsdf, weight, None))
            .reduce(IntegrationStats::default, Add::add),
    };

    log::debug!(
        "integrated frame into {} ({}) voxels: {} updated, {} sentinel, {} skipped",
        grid.num_voxels(),
        S::NAME,
        stats.updated,
        stats.sentinel,
        stats.skipped
    );
    Ok(stats)
}

struct RowContext<'a> {
    frame: &'a DepthFrame,
    camera: &'a CameraInfo,
    grid: &'a VoxelGridParams,
}

impl RowContext<'_> {
    fn integrate_row<S: VoxelStorage>(
        &self,
        row: usize,
        tsdf: &mut [S],
        weight: &mut [f32],
        mut height: Option<&mut [S]>,
    ) -> IntegrationStats {
        let ny = self.grid.ny();
        let (z, y) = (row / ny, row % ny);
        let mut stats = IntegrationStats::default();

        for x in 0..tsdf.len() {
            let world = self.grid.world_point(z, y, x);
            match observe_voxel(world, self.camera, self.frame, self.grid.vox_margin) {
                obs if obs.is_skip() => {
                    stats.skipped += 1;
                    continue;
                }
                VoxelObservation::Observed { sdf } => {
                    let (t, w) = fuse_sdf(tsdf[x].to_working(), weight[x], sdf);
                    tsdf[x] = S::from_working(t);
                    weight[x] = w;
                    stats.updated += 1;
                }
                _ => {
                    tsdf[x] = S::from_working(TSDF_SENTINEL);
                    stats.sentinel += 1;
                }
            }
            if let Some(h) = height.as_deref_mut() {
                h[x] = S::from_working(normalized_height(world));
            }
        }
        stats
    }
}
