use bytemuck::{Pod, Zeroable};

// ============================================================================
// 1. Trait：存储表示 <-> 计算精度
// ============================================================================

/// 体素缓冲区的存储表示
///
/// 积分计算始终在 `f32` 工作精度下进行，只在读写缓冲区时做一次转换。
/// `-1.0`（哨兵值）、`0.0` 与 `1.0` 在所有实现中都必须可精确表示。
pub trait VoxelStorage: Pod + Zeroable + Send + Sync + 'static {
    /// 调试/日志用名称
    const NAME: &'static str;

    /// 存储值 -> 工作精度
    fn to_working(self) -> f32;
    /// 工作精度 -> 存储值
    fn from_working(v: f32) -> Self;
}

// ============================================================================
// 2. 全精度：直通转换
// ============================================================================
macro_rules! impl_passthrough {
    ($ty:ty, $name:literal) => {
        impl VoxelStorage for $ty {
            const NAME: &'static str = $name;
            #[inline]
            fn to_working(self) -> f32 {
                self as f32
            }
            #[inline]
            fn from_working(v: f32) -> Self {
                v as $ty
            }
        }
    };
}

impl_passthrough!(f32, "f32");
impl_passthrough!(f64, "f64");

// ============================================================================
// 3. 量化表示：有符号 16 位归一化
// ============================================================================

/// Signed 16-bit normalized value covering [-1, 1].
#[repr(transparent)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct Snorm16(pub i16);

impl Snorm16 {
    pub const SCALE: f32 = i16::MAX as f32;
}

impl VoxelStorage for Snorm16 {
    const NAME: &'static str = "snorm16";

    #[inline]
    fn to_working(self) -> f32 {
        self.0 as f32 / Self::SCALE
    }

    #[inline]
    fn from_working(v: f32) -> Self {
        Snorm16((v.clamp(-1.0, 1.0) * Self::SCALE).round() as i16)
    }
}
