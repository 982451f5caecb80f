//! 体素网格几何参数与 `vox_info` 打包数组。
//!
//! `vox_info` 布局（共 8 项）：
//! `[vox_unit, vox_margin, nx, ny, nz, origin_x, origin_y, origin_z]`
//!
//! 扁平索引从外到内依次为 z, y, x：`idx = (z * ny + y) * nx + x`。

use glam::{UVec3, Vec3};

use crate::camera::packed_dim;
use crate::error::ConfigError;

pub const VOX_INFO_LEN: usize = 2 + 3 + 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoxelGridParams {
    /// 体素边长（世界单位）
    pub vox_unit: f32,
    /// 截断距离（世界单位）
    pub vox_margin: f32,
    /// (nx, ny, nz)
    pub dims: UVec3,
    /// 网格原点（世界坐标）
    pub origin: Vec3,
}

impl VoxelGridParams {
    pub fn new(
        vox_unit: f32,
        vox_margin: f32,
        dims: [u32; 3],
        origin: Vec3,
    ) -> Result<Self, ConfigError> {
        positive("vox_unit", vox_unit)?;
        positive("vox_margin", vox_margin)?;
        for (name, d) in ["nx", "ny", "nz"].into_iter().zip(dims) {
            if d == 0 {
                return Err(ConfigError::NotPositive {
                    name,
                    value: d as f32,
                });
            }
        }
        let total = (dims[0] as u64) * (dims[1] as u64) * (dims[2] as u64);
        if usize::try_from(total).is_err() || total > u32::MAX as u64 {
            return Err(ConfigError::GridTooLarge { dims });
        }
        Ok(Self {
            vox_unit,
            vox_margin,
            dims: UVec3::from_array(dims),
            origin,
        })
    }

    /// 解析宿主框架传入的 `vox_info`
    pub fn from_packed(vox_info: &[f32]) -> Result<Self, ConfigError> {
        if vox_info.len() != VOX_INFO_LEN {
            return Err(ConfigError::PackedLength {
                name: "vox_info",
                expected: VOX_INFO_LEN,
                actual: vox_info.len(),
            });
        }
        let dims = [
            packed_dim("nx", vox_info[2])?,
            packed_dim("ny", vox_info[3])?,
            packed_dim("nz", vox_info[4])?,
        ];
        let origin = Vec3::new(vox_info[5], vox_info[6], vox_info[7]);
        Self::new(vox_info[0], vox_info[1], dims, origin)
    }

    pub fn to_packed(&self) -> [f32; VOX_INFO_LEN] {
        [
            self.vox_unit,
            self.vox_margin,
            self.dims.x as f32,
            self.dims.y as f32,
            self.dims.z as f32,
            self.origin.x,
            self.origin.y,
            self.origin.z,
        ]
    }

    pub fn nx(&self) -> usize {
        self.dims.x as usize
    }

    pub fn ny(&self) -> usize {
        self.dims.y as usize
    }

    pub fn nz(&self) -> usize {
        self.dims.z as usize
    }

    /// nx * ny * nz，构造时已检查不溢出
    pub fn num_voxels(&self) -> usize {
        self.nx() * self.ny() * self.nz()
    }

    #[inline]
    pub fn index(&self, z: usize, y: usize, x: usize) -> usize {
        (z * self.ny() + y) * self.nx() + x
    }

    /// 扁平索引 -> (z, y, x)
    pub fn coords(&self, idx: usize) -> (usize, usize, usize) {
        let x = idx % self.nx();
        let row = idx / self.nx();
        (row / self.ny(), row % self.ny(), x)
    }

    /// 体素中心的世界坐标
    ///
    /// 存储轴与世界轴之间存在固定置换：`world = origin + unit * (z, x, y)`。
    /// 下游数据依赖该映射，不可"修正"。
    #[inline]
    pub fn world_point(&self, z: usize, y: usize, x: usize) -> Vec3 {
        self.origin + self.vox_unit * Vec3::new(z as f32, x as f32, y as f32)
    }
}

fn positive(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { name, value })
    }
}
