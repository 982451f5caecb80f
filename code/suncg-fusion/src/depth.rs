//! 深度图解码
//!
//! 每像素 2 字节，按 `[low, high]` 排列。16 位字 `high << 8 | low` 循环左移 13 位后
//! 即为毫米数，除以 1000 得到米。

use std::path::Path;

use rayon::prelude::*;

use crate::error::{ConfigError, DecodeError, FusionError};

pub const DEPTH_ROTATION: u32 = 13;
pub const MILLIMETERS_PER_METER: f32 = 1000.0;

/// 单帧稠密深度图（米），行主序
#[derive(Debug, Clone, PartialEq)]
pub struct DepthFrame {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl DepthFrame {
    pub fn new(width: u32, height: u32, data: Vec<f32>) -> Result<Self, ConfigError> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(ConfigError::ShapeMismatch {
                name: "depth frame",
                expected: vec![expected],
                actual: vec![data.len()],
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// 常数深度帧
    pub fn filled(width: u32, height: u32, meters: f32) -> Self {
        Self {
            width,
            height,
            data: vec![meters; width as usize * height as usize],
        }
    }

    /// 解码原始 2 字节/像素缓冲区
    ///
    /// 缓冲区不足 `width * height * 2` 字节时报错；多余字节忽略。
    /// 数值不做合理性过滤，交给积分阶段处理。
    pub fn decode(bytes: &[u8], width: u32, height: u32) -> Result<Self, DecodeError> {
        let pixels = width as usize * height as usize;
        let expected = pixels * 2;
        if bytes.len() < expected {
            return Err(DecodeError::DepthBufferTooShort {
                expected,
                actual: bytes.len(),
            });
        }
        let data = bytes[..expected]
            .par_chunks_exact(2)
            .map(|px| decode_depth_word(px[0], px[1]))
            .collect();
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// 编码为原始 2 字节/像素缓冲区（米 -> 毫米，饱和到 u16）
    pub fn encode(&self) -> Vec<u8> {
        self.data
            .iter()
            .flat_map(|&m| encode_depth(m))
            .collect()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[y as usize * self.width as usize + x as usize]
    }
}

/// `[low, high]` -> 米
#[inline]
pub fn decode_depth_word(low: u8, high: u8) -> f32 {
    let mm = u16::from_le_bytes([low, high]).rotate_left(DEPTH_ROTATION);
    mm as f32 / MILLIMETERS_PER_METER
}

/// 毫米 -> `[low, high]`
#[inline]
pub fn encode_depth_raw(mm: u16) -> [u8; 2] {
    mm.rotate_right(DEPTH_ROTATION).to_le_bytes()
}

/// 米 -> `[low, high]`，毫米数四舍五入并饱和到 u16
#[inline]
pub fn encode_depth(meters: f32) -> [u8; 2] {
    let mm = (meters * MILLIMETERS_PER_METER)
        .round()
        .clamp(0.0, u16::MAX as f32) as u16;
    encode_depth_raw(mm)
}

/// 读取 16 位灰度 PNG 深度图
///
/// 图像解码交给 `image`，这里只把像素还原成 `[low, high]` 字节流再走统一解码。
pub fn read_depth_image(path: impl AsRef<Path>) -> Result<DepthFrame, FusionError> {
    let path = path.as_ref();
    let img = image::open(path)?.into_luma16();
    let (width, height) = img.dimensions();
    let bytes: Vec<u8> = img.as_raw().iter().flat_map(|v| v.to_le_bytes()).collect();
    log::debug!("read depth image {} ({width}x{height})", path.display());
    Ok(DepthFrame::decode(&bytes, width, height)?)
}
