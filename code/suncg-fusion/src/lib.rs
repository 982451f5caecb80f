//! 单帧深度 TSDF 融合与真值体素标签解码
//!
//! - [`depth`]: 2 字节/像素深度编码 -> 米
//! - [`labels`]: 游程编码真值流 -> 占据/语义体积
//! - [`integrate`]: 投影式 TSDF 积分（rayon）
//! - [`gpu`]: 同一积分与批量填充的 wgpu 计算实现
//! - [`fill`]: 批量填充

mod error;

pub mod camera;
pub mod depth;
pub mod fill;
pub mod gpu;
pub mod grid;
pub mod integrate;
pub mod labels;
pub mod storage;
pub mod volume;

pub use camera::{CAM_INFO_LEN, CameraInfo, CameraIntrinsics, CameraPose};
pub use depth::{
    DepthFrame, decode_depth_word, encode_depth, encode_depth_raw, read_depth_image,
};
pub use error::{ComputeError, ConfigError, DecodeError, FusionError};
pub use fill::FillPlan;
pub use gpu::{GpuFusion, GpuVolume};
pub use grid::{VOX_INFO_LEN, VoxelGridParams};
pub use integrate::{IntegrationStats, TSDF_SENTINEL, VoxelObservation, integrate};
pub use labels::{
    ClassMap, GroundTruth, LabelStream, RleRun, decode_label_stream, encode_label_stream,
    read_label_file,
};
pub use storage::{Snorm16, VoxelStorage};
pub use volume::VoxelVolume;
