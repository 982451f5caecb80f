mod scene;

use std::error::Error;
use std::path::Path;

use serde::Serialize;
use suncg_fusion::{
    CameraInfo, DepthFrame, GpuFusion, GroundTruth, IntegrationStats, Snorm16,
    VoxelGridParams, VoxelStorage, VoxelVolume, integrate, read_depth_image, read_label_file,
};

use crate::scene::{Backend, FusionOptions, SceneConfig, StorageKind};

/// 写入输出目录的运行摘要
#[derive(Debug, Serialize)]
struct Summary {
    dims: [u32; 3],
    origin: [f32; 3],
    frames: usize,
    backend: &'static str,
    storage: &'static str,
    /// 仅 CPU 后端统计
    updated: Option<usize>,
    sentinel: Option<usize>,
    skipped: Option<usize>,
    ground_truth: bool,
}

/// 融合得到的体积，统一以 f32 输出
struct FusedVolume {
    tsdf: Vec<f32>,
    weight: Vec<f32>,
    height: Option<Vec<f32>>,
    stats: Option<IntegrationStats>,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let scene_path = std::env::args()
        .nth(1)
        .ok_or("usage: fusion-cli <scene.json>")?;
    let scene = SceneConfig::load(&scene_path)?;
    let options = scene.options();

    let ground_truth = match &scene.ground_truth {
        Some(gt) => Some(read_label_file(
            &gt.path,
            &gt.class_map,
            scene.voxel_count()?,
        )?),
        None => None,
    };

    let origin = match (scene.vox_origin, &ground_truth) {
        (Some(origin), _) => origin,
        (None, Some(gt)) => gt.origin.to_array(),
        (None, None) => return Err("vox_origin missing and no ground truth to take it from".into()),
    };
    let grid = VoxelGridParams::from_packed(&scene.vox_info(origin))?;
    log::info!(
        "voxel grid {:?} at {:?}, unit {} margin {}",
        grid.dims.to_array(),
        origin,
        grid.vox_unit,
        grid.vox_margin
    );

    let header_pose = ground_truth.as_ref().map(|gt| gt.pose);
    let mut cameras = Vec::with_capacity(scene.frames.len());
    for frame in &scene.frames {
        let pose = scene.frame_pose(frame, header_pose.as_ref())?;
        cameras.push(CameraInfo::from_packed(&scene.cam_info(&pose))?);
    }

    let gpu = if wants_gpu(options) {
        match pollster::block_on(GpuFusion::request()) {
            Ok(gpu) => Some(gpu),
            Err(e) => {
                log::warn!("GPU backend unavailable ({e}), falling back to CPU");
                None
            }
        }
    } else {
        None
    };

    let fused = match (&gpu, options.storage) {
        (Some(gpu), _) => fuse_gpu(gpu, &scene, &cameras, &grid, options)?,
        (None, StorageKind::F32) => fuse_cpu::<f32>(&scene, &cameras, &grid, options)?,
        (None, StorageKind::Snorm16) => fuse_cpu::<Snorm16>(&scene, &cameras, &grid, options)?,
    };

    write_outputs(&scene.output_dir, &fused, ground_truth.as_ref())?;

    let summary = Summary {
        dims: grid.dims.to_array(),
        origin,
        frames: scene.frames.len(),
        backend: if gpu.is_some() { "gpu" } else { "cpu" },
        storage: match (&gpu, options.storage) {
            (Some(_), _) | (None, StorageKind::F32) => <f32 as VoxelStorage>::NAME,
            (None, StorageKind::Snorm16) => Snorm16::NAME,
        },
        updated: fused.stats.map(|s| s.updated),
        sentinel: fused.stats.map(|s| s.sentinel),
        skipped: fused.stats.map(|s| s.skipped),
        ground_truth: ground_truth.is_some(),
    };
    std::fs::write(
        scene.output_dir.join("summary.json"),
        serde_json::to_string_pretty(&summary)?,
    )?;
    log::info!("wrote results to {}", scene.output_dir.display());
    Ok(())
}

/// GPU 只支持 f32 存储
fn wants_gpu(options: FusionOptions) -> bool {
    match (options.backend, options.storage) {
        (Backend::Cpu, _) => false,
        (Backend::Gpu, StorageKind::F32) => true,
        (Backend::Gpu, storage) => {
            log::warn!("GPU backend needs f32 storage, got {storage:?}; using CPU");
            false
        }
    }
}

fn load_frame(path: &Path, camera: &CameraInfo) -> Result<DepthFrame, Box<dyn Error>> {
    let frame = read_depth_image(path)?;
    let k = &camera.intrinsics;
    if (frame.width(), frame.height()) != (k.width, k.height) {
        return Err(format!(
            "{} is {}x{}, scene expects {}x{}",
            path.display(),
            frame.width(),
            frame.height(),
            k.width,
            k.height
        )
        .into());
    }
    Ok(frame)
}

fn fuse_cpu<S: VoxelStorage>(
    scene: &SceneConfig,
    cameras: &[CameraInfo],
    grid: &VoxelGridParams,
    options: FusionOptions,
) -> Result<FusedVolume, Box<dyn Error>> {
    let mut volume = VoxelVolume::<S>::new(grid, options.compute_height);
    let mut stats = IntegrationStats::default();
    for (frame, camera) in scene.frames.iter().zip(cameras) {
        let depth = load_frame(&frame.depth, camera)?;
        let frame_stats = integrate(&depth, camera, grid, &mut volume)?;
        log::info!(
            "{}: {} updated, {} sentinel, {} skipped",
            frame.depth.display(),
            frame_stats.updated,
            frame_stats.sentinel,
            frame_stats.skipped
        );
        stats += frame_stats;
    }
    Ok(FusedVolume {
        tsdf: volume.tsdf_values(),
        weight: volume.weight().to_vec(),
        height: volume.height_values(),
        stats: Some(stats),
    })
}

fn fuse_gpu(
    gpu: &GpuFusion,
    scene: &SceneConfig,
    cameras: &[CameraInfo],
    grid: &VoxelGridParams,
    options: FusionOptions,
) -> Result<FusedVolume, Box<dyn Error>> {
    let mut volume = gpu.create_volume(grid, options.compute_height)?;
    for (frame, camera) in scene.frames.iter().zip(cameras) {
        let depth = load_frame(&frame.depth, camera)?;
        gpu.integrate(&depth, camera, grid, &mut volume)?;
        log::info!("{}: integrated on GPU", frame.depth.display());
    }
    let (tsdf, weight, height) = gpu.download(&volume, grid)?.into_parts();
    Ok(FusedVolume {
        tsdf,
        weight,
        height,
        stats: None,
    })
}

fn write_outputs(
    dir: &Path,
    fused: &FusedVolume,
    ground_truth: Option<&GroundTruth>,
) -> Result<(), Box<dyn Error>> {
    std::fs::create_dir_all(dir)?;
    write_le(&dir.join("tsdf.bin"), &fused.tsdf)?;
    write_le(&dir.join("weight.bin"), &fused.weight)?;
    if let Some(height) = &fused.height {
        write_le(&dir.join("height.bin"), height)?;
    }
    if let Some(gt) = ground_truth {
        write_le(&dir.join("occupancy.bin"), &gt.occupancy)?;
        write_le(&dir.join("segmentation.bin"), &gt.segmentation)?;
    }
    Ok(())
}

/// 小端原始数组
fn write_le<T: LeBytes>(path: &Path, data: &[T]) -> std::io::Result<()> {
    let bytes: Vec<u8> = data.iter().flat_map(|v| v.le_bytes()).collect();
    log::debug!("writing {} ({} bytes)", path.display(), bytes.len());
    std::fs::write(path, bytes)
}

trait LeBytes: Copy {
    fn le_bytes(self) -> [u8; 4];
}

impl LeBytes for f32 {
    fn le_bytes(self) -> [u8; 4] {
        self.to_le_bytes()
    }
}

impl LeBytes for u32 {
    fn le_bytes(self) -> [u8; 4] {
        self.to_le_bytes()
    }
}
