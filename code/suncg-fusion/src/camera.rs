//! 相机内参/外参，以及宿主框架传入的 `cam_info` 打包数组。
//!
//! `cam_info` 布局（共 27 项）：
//! `[frame_width, frame_height, K(3x3 行主序, 9 项), pose(4x4 行主序, 16 项)]`

use glam::{Mat3, Mat4, Vec3};

use crate::error::ConfigError;

pub const CAM_INFO_LEN: usize = 2 + 9 + 16;

/// 针孔相机内参
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
    /// K[0][1]，投影时不使用，仅为保持打包格式
    pub skew: f32,
    pub width: u32,
    pub height: u32,
}

impl CameraIntrinsics {
    pub fn new(fx: f32, fy: f32, cx: f32, cy: f32, width: u32, height: u32) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            skew: 0.0,
            width,
            height,
        }
    }

    /// 从 3x3 行主序矩阵读取
    pub fn from_matrix(k: &[f32; 9], width: u32, height: u32) -> Self {
        Self {
            fx: k[0],
            fy: k[4],
            cx: k[2],
            cy: k[5],
            skew: k[1],
            width,
            height,
        }
    }

    pub fn to_matrix(&self) -> [f32; 9] {
        [
            self.fx, self.skew, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        ]
    }

    /// 将相机坐标系中的点投影为像素坐标（四舍五入）
    ///
    /// 调用方需保证 `p.z > 0`。落在画面外时返回 `None`。
    pub fn project(&self, p: Vec3) -> Option<(u32, u32)> {
        let px = (self.fx * (p.x / p.z) + self.cx).round();
        let py = (self.fy * (p.y / p.z) + self.cy).round();
        if !(px >= 0.0 && px < self.width as f32 && py >= 0.0 && py < self.height as f32) {
            return None;
        }
        Some((px as u32, py as u32))
    }
}

/// 相机位姿：camera-to-world 刚体变换，4x4 行主序存储
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    m: [f32; 16],
}

impl Default for CameraPose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl CameraPose {
    pub const IDENTITY: Self = Self {
        m: [
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ],
    };

    pub fn from_row_major(m: [f32; 16]) -> Self {
        Self { m }
    }

    pub fn from_slice(m: &[f32]) -> Result<Self, ConfigError> {
        let m: [f32; 16] = m.try_into().map_err(|_| ConfigError::PackedLength {
            name: "camera pose",
            expected: 16,
            actual: m.len(),
        })?;
        Ok(Self { m })
    }

    pub fn from_translation(t: Vec3) -> Self {
        let mut pose = Self::IDENTITY;
        pose.m[3] = t.x;
        pose.m[7] = t.y;
        pose.m[11] = t.z;
        pose
    }

    pub fn from_mat4(m: Mat4) -> Self {
        // glam 为列主序，转置后按列展开即为行主序
        Self {
            m: m.transpose().to_cols_array(),
        }
    }

    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_cols_array(&self.m).transpose()
    }

    pub fn row_major(&self) -> &[f32; 16] {
        &self.m
    }

    pub fn translation(&self) -> Vec3 {
        Vec3::new(self.m[3], self.m[7], self.m[11])
    }

    /// 旋转块的转置 R^T
    pub fn rotation_transposed(&self) -> Mat3 {
        let m = &self.m;
        // 行主序的 R 按列主序读入，恰好得到 R^T
        Mat3::from_cols_array(&[m[0], m[1], m[2], m[4], m[5], m[6], m[8], m[9], m[10]])
    }

    /// 世界坐标 -> 相机坐标：先减平移，再乘 R^T
    pub fn world_to_camera(&self, p: Vec3) -> Vec3 {
        self.rotation_transposed() * (p - self.translation())
    }
}

/// 单帧积分所需的完整相机描述
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraInfo {
    pub intrinsics: CameraIntrinsics,
    pub pose: CameraPose,
}

impl CameraInfo {
    pub fn new(intrinsics: CameraIntrinsics, pose: CameraPose) -> Self {
        Self { intrinsics, pose }
    }

    /// 解析宿主框架传入的 `cam_info`
    pub fn from_packed(cam_info: &[f32]) -> Result<Self, ConfigError> {
        if cam_info.len() != CAM_INFO_LEN {
            return Err(ConfigError::PackedLength {
                name: "cam_info",
                expected: CAM_INFO_LEN,
                actual: cam_info.len(),
            });
        }
        let width = packed_dim("frame_width", cam_info[0])?;
        let height = packed_dim("frame_height", cam_info[1])?;
        let mut k = [0.0; 9];
        k.copy_from_slice(&cam_info[2..11]);
        let pose = CameraPose::from_slice(&cam_info[11..CAM_INFO_LEN])?;
        Ok(Self {
            intrinsics: CameraIntrinsics::from_matrix(&k, width, height),
            pose,
        })
    }

    pub fn to_packed(&self) -> [f32; CAM_INFO_LEN] {
        let mut out = [0.0; CAM_INFO_LEN];
        out[0] = self.intrinsics.width as f32;
        out[1] = self.intrinsics.height as f32;
        out[2..11].copy_from_slice(&self.intrinsics.to_matrix());
        out[11..].copy_from_slice(self.pose.row_major());
        out
    }
}

/// 打包数组中的尺寸字段：以 float 传入，必须是正整数
pub(crate) fn packed_dim(name: &'static str, value: f32) -> Result<u32, ConfigError> {
    if !(value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f32) {
        return Err(ConfigError::NotIntegral { name, value });
    }
    if value == 0.0 {
        return Err(ConfigError::NotPositive { name, value });
    }
    Ok(value as u32)
}
