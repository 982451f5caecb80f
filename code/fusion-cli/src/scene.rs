//! JSON 场景描述
//!
//! 相对路径以场景文件所在目录为基准。`frames[].pose` 与 `vox_origin` 可以省略，
//! 此时取真值流头部中的位姿与原点。

use std::error::Error;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use suncg_fusion::{CAM_INFO_LEN, CameraPose, ClassMap, VOX_INFO_LEN};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Cpu,
    Gpu,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    F32,
    Snorm16,
}

/// 运行时选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FusionOptions {
    pub storage: StorageKind,
    pub compute_height: bool,
    pub backend: Backend,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FrameSpec {
    pub depth: PathBuf,
    /// camera-to-world，行主序
    #[serde(default)]
    pub pose: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroundTruthSpec {
    pub path: PathBuf,
    pub class_map: ClassMap,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SceneConfig {
    /// 3x3 行主序
    pub intrinsics: [f32; 9],
    pub frame_width: u32,
    pub frame_height: u32,
    pub vox_unit: f32,
    pub vox_margin: f32,
    /// [nx, ny, nz]
    pub vox_size: [u32; 3],
    #[serde(default)]
    pub vox_origin: Option<[f32; 3]>,
    pub frames: Vec<FrameSpec>,
    #[serde(default)]
    pub ground_truth: Option<GroundTruthSpec>,
    #[serde(default)]
    pub compute_height: bool,
    #[serde(default)]
    pub backend: Backend,
    #[serde(default)]
    pub storage: StorageKind,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("out")
}

impl SceneConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn Error>> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read scene {}: {e}", path.display()))?;
        let mut scene: SceneConfig = serde_json::from_str(&text)?;
        if let Some(base) = path.parent() {
            scene.resolve_paths(base);
        }
        Ok(scene)
    }

    pub fn resolve_paths(&mut self, base: &Path) {
        for frame in &mut self.frames {
            frame.depth = base.join(&frame.depth);
        }
        if let Some(gt) = &mut self.ground_truth {
            gt.path = base.join(&gt.path);
        }
        self.output_dir = base.join(&self.output_dir);
    }

    pub fn options(&self) -> FusionOptions {
        FusionOptions {
            storage: self.storage,
            compute_height: self.compute_height,
            backend: self.backend,
        }
    }

    /// nx * ny * nz，溢出时报错
    pub fn voxel_count(&self) -> Result<usize, Box<dyn Error>> {
        let [nx, ny, nz] = self.vox_size.map(|d| d as usize);
        nx.checked_mul(ny)
            .and_then(|n| n.checked_mul(nz))
            .ok_or_else(|| format!("vox_size {:?} overflows", self.vox_size).into())
    }

    /// 帧位姿：优先取帧自带的，否则退回真值流头部
    pub fn frame_pose(
        &self,
        frame: &FrameSpec,
        fallback: Option<&CameraPose>,
    ) -> Result<CameraPose, Box<dyn Error>> {
        match (&frame.pose, fallback) {
            (Some(m), _) => Ok(CameraPose::from_slice(m)?),
            (None, Some(pose)) => Ok(*pose),
            (None, None) => Err(format!(
                "frame {} has no pose and no ground truth to take it from",
                frame.depth.display()
            )
            .into()),
        }
    }

    /// 打包为宿主框架的 `cam_info`
    pub fn cam_info(&self, pose: &CameraPose) -> [f32; CAM_INFO_LEN] {
        let mut out = [0.0; CAM_INFO_LEN];
        out[0] = self.frame_width as f32;
        out[1] = self.frame_height as f32;
        out[2..11].copy_from_slice(&self.intrinsics);
        out[11..].copy_from_slice(pose.row_major());
        out
    }

    /// 打包为宿主框架的 `vox_info`
    pub fn vox_info(&self, origin: [f32; 3]) -> [f32; VOX_INFO_LEN] {
        let [nx, ny, nz] = self.vox_size.map(|d| d as f32);
        [
            self.vox_unit,
            self.vox_margin,
            nx,
            ny,
            nz,
            origin[0],
            origin[1],
            origin[2],
        ]
    }
}
