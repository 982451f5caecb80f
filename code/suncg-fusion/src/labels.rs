//! 真值体素流解码
//!
//! 二进制布局（小端）：
//! ```text
//! float32 origin[3]
//! float32 pose[16]        // 行主序 4x4
//! repeat-to-EOF:
//!   uint32 value
//!   uint32 count
//! ```
//! 先完整解析并校验游程总数，再写目标体积；格式不符时不产生任何输出。

use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::camera::CameraPose;
use crate::error::{DecodeError, FusionError};

pub const HEADER_FLOATS: usize = 3 + 16;
pub const HEADER_BYTES: usize = HEADER_FLOATS * 4;
pub const RECORD_BYTES: usize = 8;

/// 原始标签 id -> 语义类别 id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassMap(Vec<u32>);

impl ClassMap {
    pub fn new(classes: Vec<u32>) -> Self {
        Self(classes)
    }

    /// 每个原始标签映射到自身
    pub fn identity(len: u32) -> Self {
        Self((0..len).collect())
    }

    pub fn get(&self, raw: u32) -> Option<u32> {
        self.0.get(raw as usize).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RleRun {
    pub value: u32,
    pub count: u32,
}

/// 已解析、尚未展开的真值流
#[derive(Debug, Clone, PartialEq)]
pub struct LabelStream {
    pub origin: Vec3,
    pub pose: CameraPose,
    pub runs: Vec<RleRun>,
}

/// 展开后的监督体积，与体素网格同一扁平索引
#[derive(Debug, Clone, PartialEq)]
pub struct GroundTruth {
    pub origin: Vec3,
    pub pose: CameraPose,
    /// 原始标签 > 0 处为 1.0，否则为 0.0
    pub occupancy: Vec<f32>,
    /// `ClassMap[value]`
    pub segmentation: Vec<u32>,
}

impl LabelStream {
    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < HEADER_BYTES {
            return Err(DecodeError::HeaderTruncated {
                expected: HEADER_BYTES,
                actual: bytes.len(),
            });
        }
        let (header, body) = bytes.split_at(HEADER_BYTES);
        let mut floats = [0.0f32; HEADER_FLOATS];
        for (dst, src) in floats.iter_mut().zip(header.chunks_exact(4)) {
            *dst = f32::from_le_bytes([src[0], src[1], src[2], src[3]]);
        }
        let origin = Vec3::new(floats[0], floats[1], floats[2]);
        let mut pose = [0.0; 16];
        pose.copy_from_slice(&floats[3..]);

        let records = body.chunks_exact(RECORD_BYTES);
        if !records.remainder().is_empty() {
            return Err(DecodeError::PartialRecord(records.remainder().len()));
        }
        let runs = records
            .map(|r| RleRun {
                value: u32::from_le_bytes([r[0], r[1], r[2], r[3]]),
                count: u32::from_le_bytes([r[4], r[5], r[6], r[7]]),
            })
            .collect();

        Ok(Self {
            origin,
            pose: CameraPose::from_row_major(pose),
            runs,
        })
    }

    /// 从稠密原始标签体积压缩（相邻相同值合并为一个游程）
    pub fn from_labels(origin: Vec3, pose: CameraPose, labels: &[u32]) -> Self {
        let mut runs: Vec<RleRun> = Vec::new();
        for &value in labels {
            match runs.last_mut() {
                Some(run) if run.value == value && run.count < u32::MAX => run.count += 1,
                _ => runs.push(RleRun { value, count: 1 }),
            }
        }
        Self { origin, pose, runs }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_BYTES + self.runs.len() * RECORD_BYTES);
        for v in self.origin.to_array().iter().chain(self.pose.row_major()) {
            out.extend_from_slice(&v.to_le_bytes());
        }
        for run in &self.runs {
            out.extend_from_slice(&run.value.to_le_bytes());
            out.extend_from_slice(&run.count.to_le_bytes());
        }
        out
    }

    pub fn total_count(&self) -> u64 {
        self.runs.iter().map(|r| r.count as u64).sum()
    }

    /// 校验后展开为 `voxel_count` 个体素
    ///
    /// 写游标越界、总数不足或标签不在 `class_map` 中均为 [`DecodeError`]。
    pub fn expand(
        &self,
        class_map: &ClassMap,
        voxel_count: usize,
    ) -> Result<GroundTruth, DecodeError> {
        let mut cursor = 0usize;
        for run in &self.runs {
            if class_map.get(run.value).is_none() {
                return Err(DecodeError::UnknownLabel {
                    value: run.value,
                    len: class_map.len(),
                });
            }
            let end = cursor
                .checked_add(run.count as usize)
                .filter(|&end| end <= voxel_count)
                .ok_or(DecodeError::Overrun {
                    cursor,
                    count: run.count,
                    len: voxel_count,
                })?;
            cursor = end;
        }
        if cursor != voxel_count {
            return Err(DecodeError::CountMismatch {
                expected: voxel_count,
                actual: cursor,
            });
        }

        let mut occupancy = vec![0.0f32; voxel_count];
        let mut segmentation = vec![0u32; voxel_count];
        let mut cursor = 0usize;
        for run in &self.runs {
            let end = cursor + run.count as usize;
            // 上面已校验，这里的查表必然成功
            let class = class_map.get(run.value).unwrap_or_default();
            let occupied = if run.value > 0 { 1.0 } else { 0.0 };
            occupancy[cursor..end].fill(occupied);
            segmentation[cursor..end].fill(class);
            cursor = end;
        }

        Ok(GroundTruth {
            origin: self.origin,
            pose: self.pose,
            occupancy,
            segmentation,
        })
    }
}

pub fn decode_label_stream(
    bytes: &[u8],
    class_map: &ClassMap,
    voxel_count: usize,
) -> Result<GroundTruth, DecodeError> {
    if class_map.is_empty() {
        log::warn!("empty class map, every non-empty label stream will be rejected");
    }
    LabelStream::parse(bytes)?.expand(class_map, voxel_count)
}

/// 稠密原始标签体积 -> 二进制真值流
pub fn encode_label_stream(origin: Vec3, pose: CameraPose, labels: &[u32]) -> Vec<u8> {
    LabelStream::from_labels(origin, pose, labels).encode()
}

pub fn read_label_file(
    path: impl AsRef<Path>,
    class_map: &ClassMap,
    voxel_count: usize,
) -> Result<GroundTruth, FusionError> {
    let path = path.as_ref();
    if class_map.is_empty() {
        log::warn!("empty class map for {}", path.display());
    }
    let bytes = std::fs::read(path)?;
    let stream = LabelStream::parse(&bytes)?;
    log::debug!(
        "read label stream {}: {} runs covering {} voxels",
        path.display(),
        stream.runs.len(),
        stream.total_count()
    );
    Ok(stream.expand(class_map, voxel_count)?)
}
