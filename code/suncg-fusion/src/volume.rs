use glam::UVec3;

use crate::error::ConfigError;
use crate::fill;
use crate::grid::VoxelGridParams;
use crate::storage::VoxelStorage;

// ===============================================================================
// 核心数据结构 - VoxelVolume
// ===============================================================================

/// 持久化体素体积
///
/// 三个数组共享同一扁平索引（z, y, x 由外到内）：
/// - `tsdf`: [-1, 1]，或哨兵 -1
/// - `weight`: 累计观测次数，单调不减
/// - `height`: 可选，[0, 1]
///
/// `tsdf`/`height` 以 `S` 存储，读写时与 `f32` 互转；`weight` 始终为 `f32`。
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelVolume<S: VoxelStorage = f32> {
    dims: UVec3,
    tsdf: Vec<S>,
    weight: Vec<f32>,
    height: Option<Vec<S>>,
}

/// 可变借用的三个缓冲区
pub(crate) struct VolumeBuffers<'a, S> {
    pub tsdf: &'a mut [S],
    pub weight: &'a mut [f32],
    pub height: Option<&'a mut [S]>,
}

impl<S: VoxelStorage> VoxelVolume<S> {
    /// 按网格尺寸分配，全零初始化
    pub fn new(grid: &VoxelGridParams, with_height: bool) -> Self {
        let n = grid.num_voxels();
        Self {
            dims: grid.dims,
            tsdf: vec![S::zeroed(); n],
            weight: vec![0.0; n],
            height: with_height.then(|| vec![S::zeroed(); n]),
        }
    }

    /// 从已有缓冲区构造，长度必须等于 nx * ny * nz
    pub fn from_buffers(
        grid: &VoxelGridParams,
        tsdf: Vec<S>,
        weight: Vec<f32>,
        height: Option<Vec<S>>,
    ) -> Result<Self, ConfigError> {
        let n = grid.num_voxels();
        let check = |name, len: usize| {
            if len == n {
                Ok(())
            } else {
                Err(ConfigError::ShapeMismatch {
                    name,
                    expected: vec![n],
                    actual: vec![len],
                })
            }
        };
        check("tsdf", tsdf.len())?;
        check("weight", weight.len())?;
        if let Some(h) = &height {
            check("height", h.len())?;
        }
        Ok(Self {
            dims: grid.dims,
            tsdf,
            weight,
            height,
        })
    }

    /// 所有缓冲区清零（分配后可反复复用）
    pub fn reset(&mut self) {
        fill::fill_zeros(&mut self.tsdf);
        fill::fill_zeros(&mut self.weight);
        if let Some(h) = &mut self.height {
            fill::fill_zeros(h);
        }
    }

    pub fn dims(&self) -> UVec3 {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.tsdf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tsdf.is_empty()
    }

    pub fn has_height(&self) -> bool {
        self.height.is_some()
    }

    pub fn tsdf(&self) -> &[S] {
        &self.tsdf
    }

    pub fn weight(&self) -> &[f32] {
        &self.weight
    }

    pub fn height(&self) -> Option<&[S]> {
        self.height.as_deref()
    }

    pub fn tsdf_at(&self, idx: usize) -> f32 {
        self.tsdf[idx].to_working()
    }

    pub fn weight_at(&self, idx: usize) -> f32 {
        self.weight[idx]
    }

    pub fn height_at(&self, idx: usize) -> Option<f32> {
        self.height.as_ref().map(|h| h[idx].to_working())
    }

    /// tsdf 转为工作精度
    pub fn tsdf_values(&self) -> Vec<f32> {
        self.tsdf.iter().map(|v| v.to_working()).collect()
    }

    pub fn height_values(&self) -> Option<Vec<f32>> {
        self.height
            .as_ref()
            .map(|h| h.iter().map(|v| v.to_working()).collect())
    }

    /// 体积与网格尺寸必须一致
    pub fn check_grid(&self, grid: &VoxelGridParams) -> Result<(), ConfigError> {
        if self.dims != grid.dims {
            return Err(ConfigError::ShapeMismatch {
                name: "voxel volume",
                expected: grid.dims.to_array().map(|d| d as usize).to_vec(),
                actual: self.dims.to_array().map(|d| d as usize).to_vec(),
            });
        }
        Ok(())
    }

    pub(crate) fn buffers_mut(&mut self) -> VolumeBuffers<'_, S> {
        VolumeBuffers {
            tsdf: &mut self.tsdf,
            weight: &mut self.weight,
            height: self.height.as_deref_mut(),
        }
    }

    pub fn into_parts(self) -> (Vec<S>, Vec<f32>, Option<Vec<S>>) {
        (self.tsdf, self.weight, self.height)
    }
}
