// ===============================================================================
// 错误类型定义
// ===============================================================================

/// 解码错误
/// 深度图缓冲区或真值体素流格式损坏/截断
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Depth buffer too short: expected {expected} bytes, got {actual}")]
    DepthBufferTooShort { expected: usize, actual: usize },

    #[error("Label stream header truncated: expected {expected} bytes, got {actual}")]
    HeaderTruncated { expected: usize, actual: usize },

    #[error("Label stream ends with a partial record of {0} bytes")]
    PartialRecord(usize),

    #[error("Run of {count} voxels at index {cursor} overruns volume of {len} voxels")]
    Overrun { cursor: usize, count: u32, len: usize },

    #[error("Label stream covers {actual} voxels, volume has {expected}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("Raw label {value} has no entry in class map of {len} classes")]
    UnknownLabel { value: u32, len: usize },
}

/// 配置错误
/// 打包参数数组、网格尺寸与缓冲区长度不一致
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Packed {name} must have {expected} entries, got {actual}")]
    PackedLength {
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{name} must be a non-negative integer, got {value}")]
    NotIntegral { name: &'static str, value: f32 },

    #[error("{name} must be positive and finite, got {value}")]
    NotPositive { name: &'static str, value: f32 },

    #[error("Voxel grid {dims:?} has too many voxels")]
    GridTooLarge { dims: [u32; 3] },

    #[error("Shape mismatch for {name}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        name: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
}

/// GPU 计算错误类型
#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
    #[error("No suitable GPU adapter: {0}")]
    NoAdapter(String),

    #[error("Device request failed: {0}")]
    DeviceRequest(String),

    #[error("Buffer mapping failed: {0}")]
    BufferMapping(String),

    #[error("Dispatch of {requested} workgroups exceeds device limit {limit}")]
    DispatchTooLarge { requested: u32, limit: u32 },

    #[error("Buffer of {requested} bytes exceeds device limit {limit}")]
    BufferTooLarge { requested: u64, limit: u64 },

    #[error("GPU execution failed: {0}")]
    Execution(String),

    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
}

/// 对外统一错误
#[derive(Debug, thiserror::Error)]
pub enum FusionError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Compute(#[from] ComputeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image decode failed: {0}")]
    Image(#[from] image::ImageError),
}
